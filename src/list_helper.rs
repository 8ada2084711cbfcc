//! Stream ranking helpers used to pick default variants.

use crate::stream::{AudioStream, DeliveryMethod, VideoStream};

/// Height in pixels from a resolution label: `"720p"` → 720, `"1080p60"` → 1080.
pub fn resolution_height(resolution: &str) -> Option<u32> {
  let digits: String = resolution.trim().chars().take_while(char::is_ascii_digit).collect();
  digits.parse().ok().filter(|h| *h > 0)
}

pub fn non_torrent_audio(streams: &[AudioStream]) -> Vec<AudioStream> {
  streams.iter().filter(|s| s.delivery != DeliveryMethod::Torrent).cloned().collect()
}

/// All non-torrent video streams (muxed and video-only), tallest first. The sort is stable.
pub fn sorted_video_streams(muxed: &[VideoStream], video_only: &[VideoStream]) -> Vec<VideoStream> {
  let mut streams: Vec<VideoStream> =
    muxed.iter().chain(video_only).filter(|s| s.delivery != DeliveryMethod::Torrent).cloned().collect();
  streams.sort_by_key(|s| std::cmp::Reverse(s.height().unwrap_or(0)));
  streams
}

fn format_matches(format: &str, preferred: Option<&str>) -> bool {
  preferred.is_some_and(|p| format.eq_ignore_ascii_case(p))
}

/// Index of the default audio stream: highest bitrate in the preferred format, falling
/// back to highest bitrate overall. Ties keep the earlier stream.
pub fn default_audio_index(streams: &[AudioStream], preferred_format: Option<&str>) -> Option<usize> {
  let best_of = |only_preferred: bool| {
    streams
      .iter()
      .enumerate()
      .filter(|(_, s)| !only_preferred || format_matches(&s.format, preferred_format))
      .fold(None, |best: Option<(usize, u32)>, (i, s)| match best {
        Some((_, bitrate)) if bitrate >= s.average_bitrate => best,
        _ => Some((i, s.average_bitrate)),
      })
      .map(|(i, _)| i)
  };
  best_of(true).or_else(|| best_of(false))
}

/// Index of the default video stream in `sorted` (as returned by [`sorted_video_streams`]).
///
/// Picks the tallest stream not exceeding `max_height`, preferring `preferred_format` among
/// equally tall streams. If every stream is too tall, the shortest one is used.
pub fn default_video_index(
  sorted: &[VideoStream],
  max_height: Option<u32>,
  preferred_format: Option<&str>,
) -> Option<usize> {
  let height = |s: &VideoStream| s.height().unwrap_or(0);
  let fits = |s: &VideoStream| max_height.is_none_or(|max| height(s) <= max);

  let best = sorted.iter().enumerate().filter(|(_, s)| fits(*s)).fold(None, |best: Option<usize>, (i, s)| {
    let Some(b) = best else { return Some(i) };
    let current = &sorted[b];
    if height(s) > height(current)
      || (height(s) == height(current)
        && format_matches(&s.format, preferred_format)
        && !format_matches(&current.format, preferred_format))
    {
      Some(i)
    } else {
      best
    }
  });

  best.or_else(|| {
    sorted.iter().enumerate().fold(None, |best: Option<usize>, (i, s)| match best {
      Some(b) if height(&sorted[b]) <= height(s) => best,
      _ => Some(i),
    })
  })
}
