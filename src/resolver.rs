//! Playback resolution: choose a stream variant and hand it to the media engine.

use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error};

use crate::list_helper::{default_audio_index, default_video_index, non_torrent_audio, sorted_video_streams};
use crate::stream::{AudioStream, DeliveryMethod, MediaItemTag, Quality, StreamInfo, VideoStream};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ResolverError {
  #[error("unsupported delivery method: {0:?}")]
  UnsupportedDelivery(DeliveryMethod),

  #[error("stream has an empty url")]
  EmptyUrl,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
  Progressive,
  Hls,
  Dash,
  LiveHls,
  LiveDash,
  /// Video-only stream played alongside a separate audio stream.
  Merged,
}

/// A playable source as produced by the media engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MediaSource {
  pub kind: SourceKind,
  pub uri: String,
  pub audio_uri: Option<String>,
  pub cache_key: String,
  pub tag: MediaItemTag,
}

/// What the resolver asks the media engine to build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceRequest {
  pub uri: String,
  pub delivery: DeliveryMethod,
  pub live: bool,
  pub audio_uri: Option<String>,
  pub cache_key: String,
  pub tag: MediaItemTag,
}

/// The media engine's source factory.
#[cfg_attr(test, mockall::automock)]
pub trait MediaSourceBuilder: Send + Sync {
  fn build(&self, request: SourceRequest) -> Result<MediaSource, ResolverError>;
}

/// Builds plain [`MediaSource`] descriptors without touching the network.
#[derive(Debug, Clone, Copy, Default)]
pub struct DescriptorSourceBuilder;

impl MediaSourceBuilder for DescriptorSourceBuilder {
  fn build(&self, request: SourceRequest) -> Result<MediaSource, ResolverError> {
    if request.uri.is_empty() || request.audio_uri.as_deref() == Some("") {
      return Err(ResolverError::EmptyUrl);
    }
    let kind = match (request.delivery, request.live, request.audio_uri.is_some()) {
      (DeliveryMethod::Torrent, _, _) => return Err(ResolverError::UnsupportedDelivery(DeliveryMethod::Torrent)),
      (DeliveryMethod::Hls, true, _) => SourceKind::LiveHls,
      (DeliveryMethod::Dash, true, _) => SourceKind::LiveDash,
      (_, _, true) => SourceKind::Merged,
      (DeliveryMethod::Hls, false, _) => SourceKind::Hls,
      (DeliveryMethod::Dash, false, _) => SourceKind::Dash,
      (DeliveryMethod::Progressive, _, _) => SourceKind::Progressive,
    };
    Ok(MediaSource { kind, uri: request.uri, audio_uri: request.audio_uri, cache_key: request.cache_key, tag: request.tag })
  }
}

/// Turns extractor metadata into something the player can play.
pub trait PlaybackResolver {
  fn resolve(&self, info: &StreamInfo) -> Option<MediaSource>;
}

/// Cache key identifying one variant of one stream.
pub fn cache_key_of(info: &StreamInfo, quality: &str, format: &str) -> String {
  format!("{} {} {}", info.url, quality, format)
}

pub fn audio_cache_key(info: &StreamInfo, stream: &AudioStream) -> String {
  cache_key_of(info, &format!("{}kbps", stream.average_bitrate), &stream.format)
}

pub fn video_cache_key(info: &StreamInfo, stream: &VideoStream) -> String {
  cache_key_of(info, &stream.resolution, &stream.format)
}

/// For live streams, build a source from the HLS playlist (preferred) or DASH manifest.
pub fn maybe_build_live_source(builder: &dyn MediaSourceBuilder, info: &StreamInfo) -> Option<MediaSource> {
  if !info.stream_type.is_live() {
    return None;
  }
  let (uri, delivery) = match (&info.hls_url, &info.dash_mpd_url) {
    (Some(hls), _) if !hls.is_empty() => (hls.clone(), DeliveryMethod::Hls),
    (_, Some(dash)) if !dash.is_empty() => (dash.clone(), DeliveryMethod::Dash),
    _ => return None,
  };
  let request = SourceRequest {
    cache_key: cache_key_of(info, "live", &format!("{delivery:?}").to_lowercase()),
    uri,
    delivery,
    live: true,
    audio_uri: None,
    tag: MediaItemTag::of(info),
  };
  match builder.build(request) {
    Ok(source) => Some(source),
    Err(e) => {
      error!(url = %info.url, err = %e, "resolver: unable to create live source");
      None
    }
  }
}

/// Resolves the default audio stream.
pub struct AudioPlaybackResolver {
  builder: Arc<dyn MediaSourceBuilder>,
  preferred_format: Option<String>,
}

impl AudioPlaybackResolver {
  pub fn new(builder: Arc<dyn MediaSourceBuilder>, preferred_format: Option<String>) -> Self {
    Self { builder, preferred_format }
  }
}

impl PlaybackResolver for AudioPlaybackResolver {
  fn resolve(&self, info: &StreamInfo) -> Option<MediaSource> {
    if let Some(live) = maybe_build_live_source(self.builder.as_ref(), info) {
      return Some(live);
    }

    let streams = non_torrent_audio(&info.audio_streams);
    let index = default_audio_index(&streams, self.preferred_format.as_deref())?;
    let audio = streams.get(index)?;
    debug!(index, format = %audio.format, bitrate = audio.average_bitrate, "resolver: selected audio stream");

    let request = SourceRequest {
      uri: audio.url.clone(),
      delivery: audio.delivery,
      live: false,
      audio_uri: None,
      cache_key: audio_cache_key(info, audio),
      tag: MediaItemTag::of(info),
    };
    match self.builder.build(request) {
      Ok(source) => Some(source),
      Err(e) => {
        error!(url = %info.url, err = %e, "resolver: unable to create audio source");
        None
      }
    }
  }
}

/// Resolves the default video stream, pairing video-only streams with the default audio.
pub struct VideoPlaybackResolver {
  builder: Arc<dyn MediaSourceBuilder>,
  preferred_audio_format: Option<String>,
  preferred_video_format: Option<String>,
  max_height: Option<u32>,
}

impl VideoPlaybackResolver {
  pub fn new(
    builder: Arc<dyn MediaSourceBuilder>,
    preferred_audio_format: Option<String>,
    preferred_video_format: Option<String>,
    max_height: Option<u32>,
  ) -> Self {
    Self { builder, preferred_audio_format, preferred_video_format, max_height }
  }
}

impl PlaybackResolver for VideoPlaybackResolver {
  fn resolve(&self, info: &StreamInfo) -> Option<MediaSource> {
    if let Some(live) = maybe_build_live_source(self.builder.as_ref(), info) {
      return Some(live);
    }

    let sorted = sorted_video_streams(&info.video_streams, &info.video_only_streams);
    let index = default_video_index(&sorted, self.max_height, self.preferred_video_format.as_deref())?;
    let video = sorted.get(index)?;
    debug!(index, resolution = %video.resolution, video_only = video.video_only, "resolver: selected video stream");

    let audio_uri = if video.video_only {
      let audio_streams = non_torrent_audio(&info.audio_streams);
      let Some(audio) = default_audio_index(&audio_streams, self.preferred_audio_format.as_deref())
        .and_then(|i| audio_streams.get(i))
      else {
        error!(url = %info.url, "resolver: video-only stream without any audio stream to pair with");
        return None;
      };
      Some(audio.url.clone())
    } else {
      None
    };

    let request = SourceRequest {
      uri: video.url.clone(),
      delivery: video.delivery,
      live: false,
      audio_uri,
      cache_key: video_cache_key(info, video),
      tag: MediaItemTag::of(info).with_quality(Quality::of(&sorted, index)),
    };
    match self.builder.build(request) {
      Ok(source) => Some(source),
      Err(e) => {
        error!(url = %info.url, err = %e, "resolver: unable to create video source");
        None
      }
    }
  }
}
