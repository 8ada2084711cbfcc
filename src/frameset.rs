//! Storyboard frame sets.
//!
//! A frame set describes one resolution of a media item's timeline preview: a list of
//! sprite sheets, each a grid of `frames_per_page_x` × `frames_per_page_y` thumbnails,
//! where every thumbnail stands for `duration_per_frame` milliseconds of the timeline.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrameSetError {
  #[error("frame set has no sheet urls")]
  NoSheets,

  #[error("frame dimensions must be positive (got {width}x{height})")]
  EmptyFrame { width: u32, height: u32 },

  #[error("frames per sheet must be positive (got {x}x{y})")]
  EmptyGrid { x: u32, y: u32 },

  #[error("duration per frame must be positive")]
  ZeroDuration,

  #[error("frame set has no frames")]
  NoFrames,

  #[error("total count {total} exceeds sheet capacity {capacity}")]
  CountExceedsCapacity { total: u32, capacity: u64 },

  #[error("sheet of {x}x{y} frames at {width}x{height} px does not fit 32-bit coordinates")]
  SheetTooLarge { x: u32, y: u32, width: u32, height: u32 },
}

/// Pixel bounds of one frame inside its sprite sheet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameBounds {
  pub sheet_index: usize,
  pub left: u32,
  pub top: u32,
  pub right: u32,
  pub bottom: u32,
}

impl FrameBounds {
  pub fn width(&self) -> u32 {
    self.right - self.left
  }

  pub fn height(&self) -> u32 {
    self.bottom - self.top
  }
}

/// Raw shape used for (de)serialization; always validated into a [`FrameSet`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawFrameSet {
  urls: Vec<String>,
  frame_width: u32,
  frame_height: u32,
  total_count: u32,
  duration_per_frame: u64,
  frames_per_page_x: u32,
  frames_per_page_y: u32,
}

/// One sprite-sheet resolution of a timeline preview. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawFrameSet", into = "RawFrameSet")]
pub struct FrameSet {
  urls: Vec<String>,
  frame_width: u32,
  frame_height: u32,
  total_count: u32,
  duration_per_frame: u64,
  frames_per_page_x: u32,
  frames_per_page_y: u32,
}

impl FrameSet {
  #[allow(clippy::too_many_arguments)]
  pub fn new(
    urls: Vec<String>,
    frame_width: u32,
    frame_height: u32,
    total_count: u32,
    duration_per_frame: u64,
    frames_per_page_x: u32,
    frames_per_page_y: u32,
  ) -> Result<Self, FrameSetError> {
    if urls.is_empty() {
      return Err(FrameSetError::NoSheets);
    }
    if frame_width == 0 || frame_height == 0 {
      return Err(FrameSetError::EmptyFrame { width: frame_width, height: frame_height });
    }
    if frames_per_page_x == 0 || frames_per_page_y == 0 {
      return Err(FrameSetError::EmptyGrid { x: frames_per_page_x, y: frames_per_page_y });
    }
    if duration_per_frame == 0 {
      return Err(FrameSetError::ZeroDuration);
    }
    if total_count == 0 {
      return Err(FrameSetError::NoFrames);
    }
    let fits = |a: u32, b: u32| a.checked_mul(b).is_some();
    if !fits(frames_per_page_x, frames_per_page_y)
      || !fits(frames_per_page_x, frame_width)
      || !fits(frames_per_page_y, frame_height)
    {
      return Err(FrameSetError::SheetTooLarge {
        x: frames_per_page_x,
        y: frames_per_page_y,
        width: frame_width,
        height: frame_height,
      });
    }
    let capacity = urls.len() as u64 * frames_per_page_x as u64 * frames_per_page_y as u64;
    if total_count as u64 > capacity {
      return Err(FrameSetError::CountExceedsCapacity { total: total_count, capacity });
    }
    Ok(Self { urls, frame_width, frame_height, total_count, duration_per_frame, frames_per_page_x, frames_per_page_y })
  }

  pub fn urls(&self) -> &[String] {
    &self.urls
  }

  pub fn frame_width(&self) -> u32 {
    self.frame_width
  }

  pub fn frame_height(&self) -> u32 {
    self.frame_height
  }

  pub fn total_count(&self) -> u32 {
    self.total_count
  }

  pub fn duration_per_frame(&self) -> u64 {
    self.duration_per_frame
  }

  pub fn frames_per_page_x(&self) -> u32 {
    self.frames_per_page_x
  }

  pub fn frames_per_page_y(&self) -> u32 {
    self.frames_per_page_y
  }

  /// Number of frames a single sheet holds. Construction guarantees this fits `u32`, as do
  /// the pixel extents of a full sheet, so the bounds arithmetic below cannot overflow.
  pub fn frames_per_sheet(&self) -> u32 {
    self.frames_per_page_x * self.frames_per_page_y
  }

  /// Pixel area of a single frame; used to rank resolutions.
  pub fn area(&self) -> u64 {
    self.frame_width as u64 * self.frame_height as u64
  }

  /// Bounds of the frame covering `position_ms`. Positions past the end clamp to the last frame.
  pub fn frame_bounds_at(&self, position_ms: u64) -> FrameBounds {
    let last = self.total_count as u64 - 1;
    let absolute = (position_ms / self.duration_per_frame).min(last);
    self.bounds_of_frame(absolute as u32)
  }

  fn bounds_of_frame(&self, absolute: u32) -> FrameBounds {
    let per_sheet = self.frames_per_sheet();
    let relative = absolute % per_sheet;
    let row = relative / self.frames_per_page_x;
    let column = relative % self.frames_per_page_x;
    let left = column * self.frame_width;
    let top = row * self.frame_height;
    FrameBounds {
      sheet_index: (absolute / per_sheet) as usize,
      left,
      top,
      right: left + self.frame_width,
      bottom: top + self.frame_height,
    }
  }

  /// Every frame on sheet `sheet_index` as `(position_ms, bounds)`, in timeline order.
  /// Frames beyond `total_count` are skipped, so the last sheet may be partial.
  pub fn frames_on_sheet(&self, sheet_index: usize) -> impl Iterator<Item = (u64, FrameBounds)> + '_ {
    let per_sheet = self.frames_per_sheet() as u64;
    let start = (sheet_index as u64).saturating_mul(per_sheet);
    let end = start.saturating_add(per_sheet).min(self.total_count as u64);
    (start..end).map(move |frame| (frame.saturating_mul(self.duration_per_frame), self.bounds_of_frame(frame as u32)))
  }
}

impl TryFrom<RawFrameSet> for FrameSet {
  type Error = FrameSetError;

  fn try_from(raw: RawFrameSet) -> Result<Self, Self::Error> {
    FrameSet::new(
      raw.urls,
      raw.frame_width,
      raw.frame_height,
      raw.total_count,
      raw.duration_per_frame,
      raw.frames_per_page_x,
      raw.frames_per_page_y,
    )
  }
}

impl From<FrameSet> for RawFrameSet {
  fn from(fs: FrameSet) -> Self {
    RawFrameSet {
      urls: fs.urls,
      frame_width: fs.frame_width,
      frame_height: fs.frame_height,
      total_count: fs.total_count,
      duration_per_frame: fs.duration_per_frame,
      frames_per_page_x: fs.frames_per_page_x,
      frames_per_page_y: fs.frames_per_page_y,
    }
  }
}
