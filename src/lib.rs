//! Seekbar thumbnail previews from storyboard sprite sheets, plus playback stream resolution.

pub mod config;
pub mod constants;
pub mod display;
pub mod fetch;
pub mod frameset;
pub mod graphics;
pub mod list_helper;
pub mod logging;
pub mod preview;
pub mod resolver;
pub mod stream;

pub use fetch::{HttpImageFetcher, ImageFetcher};
pub use frameset::{FrameBounds, FrameSet, FrameSetError};
pub use preview::{PreviewQuality, SeekbarPreviewCache};
pub use resolver::{AudioPlaybackResolver, MediaSource, PlaybackResolver, VideoPlaybackResolver};
pub use stream::StreamInfo;
