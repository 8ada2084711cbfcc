use anyhow::{Context, Result, anyhow};
use futures::future::BoxFuture;
use image::DynamicImage;
use reqwest::Client;
use std::time::{Duration, Instant};
use tracing::debug;

use crate::constants::constants;

/// Downloads and decodes a sprite sheet.
///
/// Implementations enforce their own timeout; callers treat any error as a missing sheet.
pub trait ImageFetcher: Send + Sync {
  fn fetch<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<DynamicImage>>;
}

/// [`ImageFetcher`] backed by a shared `reqwest` client.
#[derive(Clone)]
pub struct HttpImageFetcher {
  client: Client,
}

impl HttpImageFetcher {
  pub fn new(timeout: Duration) -> Result<Self> {
    let client = Client::builder()
      .timeout(timeout)
      .user_agent(constants().user_agent.as_str())
      .build()
      .context("Failed to build HTTP client")?;
    Ok(Self { client })
  }

  pub fn with_default_timeout() -> Result<Self> {
    Self::new(Duration::from_secs(constants().fetch_timeout_secs))
  }

  async fn fetch_image(&self, url: &str) -> Result<DynamicImage> {
    let started = Instant::now();
    debug!(url = %url, "preview: downloading sheet");

    let response = self.client.get(url).send().await.with_context(|| format!("Failed to request {}", url))?;
    if !response.status().is_success() {
      return Err(anyhow!("Sheet request to {} failed with status {}", url, response.status()));
    }
    let bytes = response.bytes().await.with_context(|| format!("Failed to read image bytes from {}", url))?;
    let image =
      image::load_from_memory(&bytes).with_context(|| format!("Failed to decode image from memory (URL: {})", url))?;

    debug!(url = %url, elapsed_ms = started.elapsed().as_millis() as u64, "preview: sheet downloaded");
    Ok(image)
  }
}

impl ImageFetcher for HttpImageFetcher {
  fn fetch<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<DynamicImage>> {
    Box::pin(self.fetch_image(url))
  }
}
