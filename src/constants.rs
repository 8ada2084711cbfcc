//! Crate constants loaded from `constants.ron` at compile time.
//!
//! The RON file is embedded via `include_str!`, so there is no runtime file I/O.
//! It is parsed once on first access via `LazyLock`.

use serde::Deserialize;
use std::sync::LazyLock;

/// Tuneable constants shared by the library and the CLI.
#[derive(Debug, Deserialize)]
pub struct Constants {
  // HTTP
  pub fetch_timeout_secs: u64,
  pub user_agent: String,

  // Logging
  pub log_file_prefix: String,

  // Terminal rendering
  pub cell_width_px: u32,
  pub cell_height_px: u32,
  pub kitty_chunk_size: usize,
  pub sixel_max_colors: usize,
  pub default_cols: u16,
  pub default_rows: u16,
}

static CONSTANTS: LazyLock<Constants> = LazyLock::new(|| {
  // Safety: the RON file is embedded at compile time; if it's malformed this is a build-time error.
  ron::from_str(include_str!("../constants.ron")).expect("constants.ron must be valid RON (embedded at compile time)")
});

/// Returns a reference to the parsed constants.
pub fn constants() -> &'static Constants {
  &CONSTANTS
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn embedded_constants_parse() {
    let c = constants();
    assert_eq!(c.fetch_timeout_secs, 15);
    assert!(c.kitty_chunk_size > 0);
    assert!(c.sixel_max_colors <= 256);
  }
}
