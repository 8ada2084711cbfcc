//! Extractor-provided stream metadata consumed by the playback resolvers.

use serde::{Deserialize, Serialize};

use crate::list_helper::resolution_height;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamType {
  #[default]
  VideoStream,
  AudioStream,
  LiveStream,
  AudioLiveStream,
  PostLiveStream,
  PostLiveAudioStream,
}

impl StreamType {
  pub fn is_live(self) -> bool {
    matches!(self, StreamType::LiveStream | StreamType::AudioLiveStream)
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryMethod {
  #[default]
  Progressive,
  Hls,
  Dash,
  Torrent,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioStream {
  pub url: String,
  /// Container/codec name, e.g. `m4a`, `webm`, `opus`.
  pub format: String,
  /// Average bitrate in kbps; `0` when unknown.
  #[serde(default)]
  pub average_bitrate: u32,
  #[serde(default)]
  pub delivery: DeliveryMethod,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoStream {
  pub url: String,
  pub format: String,
  /// Resolution label as reported by the extractor, e.g. `720p` or `1080p60`.
  pub resolution: String,
  #[serde(default)]
  pub video_only: bool,
  #[serde(default)]
  pub delivery: DeliveryMethod,
}

impl VideoStream {
  pub fn height(&self) -> Option<u32> {
    resolution_height(&self.resolution)
  }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamInfo {
  pub url: String,
  pub name: String,
  pub uploader_name: Option<String>,
  pub uploader_url: Option<String>,
  pub thumbnail_url: Option<String>,
  pub duration_secs: u64,
  pub stream_type: StreamType,
  pub hls_url: Option<String>,
  pub dash_mpd_url: Option<String>,
  pub audio_streams: Vec<AudioStream>,
  pub video_streams: Vec<VideoStream>,
  pub video_only_streams: Vec<VideoStream>,
}

/// Video quality picked for a resolved source, as shown in a quality selector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Quality {
  pub sorted_resolutions: Vec<String>,
  pub selected_index: usize,
}

impl Quality {
  pub fn of(sorted_streams: &[VideoStream], selected_index: usize) -> Self {
    Self { sorted_resolutions: sorted_streams.iter().map(|s| s.resolution.clone()).collect(), selected_index }
  }

  pub fn selected(&self) -> Option<&str> {
    self.sorted_resolutions.get(self.selected_index).map(String::as_str)
  }
}

/// Metadata attached to a resolved source so the player can show what's playing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MediaItemTag {
  pub title: String,
  pub uploader_name: Option<String>,
  pub uploader_url: Option<String>,
  pub duration_secs: u64,
  pub stream_url: String,
  pub thumbnail_url: Option<String>,
  pub stream_type: StreamType,
  pub quality: Option<Quality>,
}

impl MediaItemTag {
  pub fn of(info: &StreamInfo) -> Self {
    Self {
      title: info.name.clone(),
      uploader_name: info.uploader_name.clone(),
      uploader_url: info.uploader_url.clone(),
      duration_secs: info.duration_secs,
      stream_url: info.url.clone(),
      thumbnail_url: info.thumbnail_url.clone(),
      stream_type: info.stream_type,
      quality: None,
    }
  }

  pub fn with_quality(mut self, quality: Quality) -> Self {
    self.quality = Some(quality);
    self
  }
}
