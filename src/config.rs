use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::constants::constants;
use crate::preview::PreviewQuality;

/// Persisted user preferences (`prefs.toml` in the platform config dir).
#[derive(Serialize, Deserialize, Default, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
  /// `high`, `low` or `none`; unknown values mean `high`.
  pub preview_quality: Option<String>,
  pub fetch_timeout_secs: Option<u64>,
  pub preferred_audio_format: Option<String>,
  pub preferred_video_format: Option<String>,
  /// Tallest video stream to pick, e.g. `720`.
  pub max_resolution: Option<u32>,
  pub display_mode: Option<String>,
}

fn project_dirs() -> Option<ProjectDirs> {
  ProjectDirs::from("", "", "seekpreview")
}

impl Config {
  pub fn path() -> Option<PathBuf> {
    project_dirs().map(|dirs| dirs.config_dir().join("prefs.toml"))
  }

  /// Directory for rolling log files.
  pub fn log_dir() -> Option<PathBuf> {
    project_dirs().map(|dirs| dirs.data_local_dir().join("logs"))
  }

  pub fn load() -> Self {
    Self::path().and_then(|path| Self::load_from(&path).ok()).unwrap_or_default()
  }

  pub fn load_from(path: &Path) -> Result<Self> {
    let content = std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    toml::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))
  }

  pub fn save(&self) -> Result<()> {
    let path = Self::path().context("No config directory available on this platform")?;
    self.save_to(&path)
  }

  pub fn save_to(&self, path: &Path) -> Result<()> {
    if let Some(dir) = path.parent() {
      std::fs::create_dir_all(dir).with_context(|| format!("Failed to create {}", dir.display()))?;
    }
    let content = toml::to_string(self).context("Failed to serialize config")?;
    std::fs::write(path, content).with_context(|| format!("Failed to write {}", path.display()))
  }

  pub fn preview_quality(&self) -> PreviewQuality {
    self.preview_quality.as_deref().map(PreviewQuality::from_config).unwrap_or_default()
  }

  pub fn fetch_timeout(&self) -> Duration {
    Duration::from_secs(self.fetch_timeout_secs.unwrap_or(constants().fetch_timeout_secs))
  }
}
