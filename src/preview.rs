//! Seekbar preview cache.
//!
//! Builds a position → thumbnail table from one storyboard [`FrameSet`] in the background
//! and answers nearest-position lookups while the user scrubs.
//!
//! Every [`SeekbarPreviewCache::rebuild`] mints a new generation and clears the table. The
//! population task re-checks its generation under the table lock before committing each
//! sheet, so a superseded run never writes into the table even if it finishes last.
//!
//! Frames are not cropped up front: each key stores a producer that crops its frame out of
//! the shared sheet the first time it's queried.

use anyhow::{Result, anyhow};
use clap::ValueEnum;
use image::{DynamicImage, GenericImageView};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Instant;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::fetch::ImageFetcher;
use crate::frameset::{FrameBounds, FrameSet};

/// User preference for which storyboard resolution to load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum PreviewQuality {
  /// Largest frames available.
  #[default]
  High,
  /// Smallest frames available.
  Low,
  /// Preview disabled; rebuilds leave the table empty.
  None,
}

impl PreviewQuality {
  pub fn label(self) -> &'static str {
    match self {
      PreviewQuality::High => "high",
      PreviewQuality::Low => "low",
      PreviewQuality::None => "none",
    }
  }

  pub fn from_config(s: &str) -> Self {
    match s.to_lowercase().as_str() {
      "low" => PreviewQuality::Low,
      "none" => PreviewQuality::None,
      _ => PreviewQuality::High,
    }
  }
}

/// Deferred crop of one frame out of its sheet.
pub type FrameProducer = Arc<dyn Fn() -> Result<DynamicImage> + Send + Sync>;

fn frame_producer(sheet: Option<Arc<DynamicImage>>, bounds: FrameBounds) -> FrameProducer {
  Arc::new(move || {
    let sheet = sheet.as_ref().ok_or_else(|| anyhow!("sheet {} was not downloaded", bounds.sheet_index))?;
    let (w, h) = sheet.dimensions();
    if bounds.right > w || bounds.bottom > h {
      return Err(anyhow!(
        "frame {}x{}+{}+{} lies outside {}x{} sheet {}",
        bounds.width(),
        bounds.height(),
        bounds.left,
        bounds.top,
        w,
        h,
        bounds.sheet_index
      ));
    }
    Ok(sheet.crop_imm(bounds.left, bounds.top, bounds.width(), bounds.height()))
  })
}

/// Pick the frame set to load for `quality`. Ties keep the first candidate.
pub fn select_frame_set(frame_sets: &[FrameSet], quality: PreviewQuality) -> Option<&FrameSet> {
  match quality {
    PreviewQuality::None => None,
    PreviewQuality::High => frame_sets.iter().reduce(|best, fs| if fs.area() > best.area() { fs } else { best }),
    PreviewQuality::Low => frame_sets.iter().reduce(|best, fs| if fs.area() < best.area() { fs } else { best }),
  }
}

/// Nearest key to `position`. On an exact midpoint the later key wins.
fn nearest<V>(frames: &BTreeMap<u64, V>, position: u64) -> Option<(&u64, &V)> {
  let below = frames.range(..=position).next_back();
  let above = frames.range(position..).next();
  match (below, above) {
    (Some(b), Some(a)) => {
      if a.0 - position <= position - b.0 {
        Some(a)
      } else {
        Some(b)
      }
    }
    (b, a) => b.or(a),
  }
}

#[derive(Default)]
struct Table {
  generation: u64,
  frames: BTreeMap<u64, FrameProducer>,
}

struct Inner {
  fetcher: Arc<dyn ImageFetcher>,
  table: RwLock<Table>,
}

impl Inner {
  fn read(&self) -> RwLockReadGuard<'_, Table> {
    self.table.read().unwrap_or_else(PoisonError::into_inner)
  }

  fn write(&self) -> RwLockWriteGuard<'_, Table> {
    self.table.write().unwrap_or_else(PoisonError::into_inner)
  }

  fn is_current(&self, generation: u64) -> bool {
    self.read().generation == generation
  }

  /// Commit one sheet's producers. Returns `false` if `generation` has been superseded.
  fn commit(&self, generation: u64, batch: Vec<(u64, FrameProducer)>) -> bool {
    let mut table = self.write();
    if table.generation != generation {
      return false;
    }
    table.frames.extend(batch);
    true
  }

  async fn populate(&self, generation: u64, frame_sets: Vec<FrameSet>, quality: PreviewQuality) {
    if quality == PreviewQuality::None {
      debug!(generation, "preview: disabled by settings, table stays empty");
      return;
    }

    let Some(frame_set) = select_frame_set(&frame_sets, quality) else {
      debug!(generation, "preview: no frame set to build from");
      return;
    };

    info!(
      generation,
      quality = quality.label(),
      width = frame_set.frame_width(),
      height = frame_set.frame_height(),
      sheets = frame_set.urls().len(),
      "preview: selected frame set"
    );

    if !self.is_current(generation) {
      return;
    }

    let started = Instant::now();
    for (sheet_index, url) in frame_set.urls().iter().enumerate() {
      let sheet = match self.fetcher.fetch(url).await {
        Ok(image) => Some(Arc::new(image)),
        Err(e) => {
          warn!(url = %url, err = %e, "preview: failed to fetch sheet, frames will be empty");
          None
        }
      };

      let batch: Vec<(u64, FrameProducer)> = frame_set
        .frames_on_sheet(sheet_index)
        .map(|(position, bounds)| (position, frame_producer(sheet.clone(), bounds)))
        .collect();

      if !self.commit(generation, batch) {
        debug!(generation, sheet_index, "preview: superseded by a newer rebuild, aborting");
        return;
      }
    }

    debug!(generation, elapsed_ms = started.elapsed().as_millis() as u64, "preview: table populated");
  }
}

/// Position-indexed storyboard thumbnails for the media item currently playing.
///
/// Clones share the same table.
#[derive(Clone)]
pub struct SeekbarPreviewCache {
  inner: Arc<Inner>,
}

impl SeekbarPreviewCache {
  pub fn new(fetcher: Arc<dyn ImageFetcher>) -> Self {
    Self { inner: Arc::new(Inner { fetcher, table: RwLock::new(Table::default()) }) }
  }

  /// Start rebuilding the table from `frame_sets`.
  ///
  /// The table is cleared before this returns; population runs as a task on the current
  /// tokio runtime. Awaiting the handle waits for this run to settle, dropping it detaches
  /// the run. Outside a runtime nothing is spawned: the table stays empty and `None` is
  /// returned.
  pub fn rebuild(&self, frame_sets: Vec<FrameSet>, quality: PreviewQuality) -> Option<JoinHandle<()>> {
    let generation = {
      let mut table = self.inner.write();
      table.generation += 1;
      table.frames.clear();
      table.generation
    };
    debug!(generation, candidates = frame_sets.len(), "preview: cleared table for rebuild");

    let runtime = match Handle::try_current() {
      Ok(runtime) => runtime,
      Err(e) => {
        warn!(generation, err = %e, "preview: no tokio runtime, leaving table empty");
        return None;
      }
    };
    let inner = Arc::clone(&self.inner);
    Some(runtime.spawn(async move { inner.populate(generation, frame_sets, quality).await }))
  }

  /// Thumbnail nearest to `position_ms`, cropped on this call.
  ///
  /// Returns `None` if nothing is populated yet, or if the chosen frame can't be produced.
  pub fn query(&self, position_ms: u64) -> Option<DynamicImage> {
    let (key, producer) = {
      let table = self.inner.read();
      let (key, producer) = nearest(&table.frames, position_ms)?;
      (*key, Arc::clone(producer))
    };

    match producer() {
      Ok(image) => Some(image),
      Err(e) => {
        warn!(position_ms, key, err = %e, "preview: unable to produce frame");
        None
      }
    }
  }

  /// Drop all frames and discard any in-flight rebuild.
  pub fn clear(&self) {
    let mut table = self.inner.write();
    table.generation += 1;
    table.frames.clear();
  }

  pub fn len(&self) -> usize {
    self.inner.read().frames.len()
  }

  pub fn is_empty(&self) -> bool {
    self.inner.read().frames.is_empty()
  }

  /// Populated positions in ascending order.
  pub fn positions(&self) -> Vec<u64> {
    self.inner.read().frames.keys().copied().collect()
  }

  pub fn generation(&self) -> u64 {
    self.inner.read().generation
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use futures::future::BoxFuture;
  use image::{Rgb, RgbImage};
  use std::collections::HashMap;
  use std::sync::Mutex as StdMutex;
  use std::time::Duration;

  // --- Fake fetcher ---

  /// Serves prebuilt sheets per URL after an optional delay. Unknown URLs fail.
  #[derive(Default)]
  struct FakeFetcher {
    sheets: HashMap<String, (Duration, DynamicImage)>,
    requested: StdMutex<Vec<String>>,
  }

  impl FakeFetcher {
    fn with_sheet(mut self, url: &str, delay: Duration, image: DynamicImage) -> Self {
      self.sheets.insert(url.to_string(), (delay, image));
      self
    }

    fn requested(&self) -> Vec<String> {
      self.requested.lock().unwrap().clone()
    }
  }

  impl ImageFetcher for FakeFetcher {
    fn fetch<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<DynamicImage>> {
      Box::pin(async move {
        self.requested.lock().unwrap().push(url.to_string());
        let (delay, image) = self.sheets.get(url).ok_or_else(|| anyhow!("404 for {}", url))?;
        tokio::time::sleep(*delay).await;
        Ok(image.clone())
      })
    }
  }

  /// Sheet whose pixels encode `[tag, column, row]` of the frame they belong to.
  fn sheet(tag: u8, cols: u32, rows: u32, fw: u32, fh: u32) -> DynamicImage {
    DynamicImage::ImageRgb8(RgbImage::from_fn(cols * fw, rows * fh, |x, y| Rgb([tag, (x / fw) as u8, (y / fh) as u8])))
  }

  fn frame_set(urls: &[&str], fw: u32, fh: u32, total: u32, duration: u64, x: u32, y: u32) -> FrameSet {
    FrameSet::new(urls.iter().map(|u| u.to_string()).collect(), fw, fh, total, duration, x, y).unwrap()
  }

  fn tag_of(image: &DynamicImage) -> [u8; 3] {
    image.to_rgb8().get_pixel(0, 0).0
  }

  fn cache_with(fetcher: FakeFetcher) -> (SeekbarPreviewCache, Arc<FakeFetcher>) {
    let fetcher = Arc::new(fetcher);
    (SeekbarPreviewCache::new(fetcher.clone()), fetcher)
  }

  // --- PreviewQuality ---

  #[test]
  fn quality_from_config() {
    assert_eq!(PreviewQuality::from_config("LOW"), PreviewQuality::Low);
    assert_eq!(PreviewQuality::from_config("none"), PreviewQuality::None);
    assert_eq!(PreviewQuality::from_config("high"), PreviewQuality::High);
    assert_eq!(PreviewQuality::from_config("garbage"), PreviewQuality::High);
  }

  // --- select_frame_set ---

  #[test]
  fn select_by_area() {
    let sets = vec![
      frame_set(&["a"], 10, 10, 1, 1000, 1, 1),
      frame_set(&["b"], 20, 20, 1, 1000, 1, 1),
      frame_set(&["c"], 15, 15, 1, 1000, 1, 1),
    ];
    assert_eq!(select_frame_set(&sets, PreviewQuality::High).map(FrameSet::area), Some(400));
    assert_eq!(select_frame_set(&sets, PreviewQuality::Low).map(FrameSet::area), Some(100));
    assert!(select_frame_set(&sets, PreviewQuality::None).is_none());
    assert!(select_frame_set(&[], PreviewQuality::High).is_none());
  }

  #[test]
  fn select_ties_keep_first() {
    let sets = vec![frame_set(&["first"], 20, 10, 1, 1000, 1, 1), frame_set(&["second"], 10, 20, 1, 1000, 1, 1)];
    assert_eq!(select_frame_set(&sets, PreviewQuality::High).unwrap().urls()[0], "first");
    assert_eq!(select_frame_set(&sets, PreviewQuality::Low).unwrap().urls()[0], "first");
  }

  // --- nearest ---

  #[test]
  fn nearest_prefers_later_key_on_midpoint() {
    let frames: BTreeMap<u64, ()> = [(0, ()), (1000, ()), (2000, ())].into_iter().collect();
    assert_eq!(nearest(&frames, 1400).map(|(k, _)| *k), Some(1000));
    assert_eq!(nearest(&frames, 1500).map(|(k, _)| *k), Some(2000));
    assert_eq!(nearest(&frames, 1600).map(|(k, _)| *k), Some(2000));
    assert_eq!(nearest(&frames, 500).map(|(k, _)| *k), Some(1000));
    assert_eq!(nearest(&frames, 1000).map(|(k, _)| *k), Some(1000));
    assert_eq!(nearest(&frames, 90_000).map(|(k, _)| *k), Some(2000));
    assert!(nearest(&BTreeMap::<u64, ()>::new(), 10).is_none());
  }

  // --- rebuild / query ---

  #[tokio::test]
  async fn query_on_empty_table_is_none() {
    let (cache, _) = cache_with(FakeFetcher::default());
    assert!(cache.query(0).is_none());
    assert!(cache.query(123_456).is_none());
  }

  #[test]
  fn rebuild_outside_runtime_leaves_table_empty() {
    let fetcher = FakeFetcher::default().with_sheet("s", Duration::ZERO, sheet(1, 1, 1, 4, 4));
    let (cache, fetcher) = cache_with(fetcher);
    let generation = cache.generation();

    assert!(cache.rebuild(vec![frame_set(&["s"], 4, 4, 1, 1000, 1, 1)], PreviewQuality::High).is_none());
    assert!(cache.is_empty());
    assert_eq!(cache.generation(), generation + 1);
    assert!(fetcher.requested().is_empty());
  }

  #[tokio::test]
  async fn none_quality_yields_empty_table() {
    let fetcher = FakeFetcher::default().with_sheet("a", Duration::ZERO, sheet(1, 3, 1, 8, 6));
    let (cache, fetcher) = cache_with(fetcher);
    cache.rebuild(vec![frame_set(&["a"], 8, 6, 3, 1000, 3, 1)], PreviewQuality::None).unwrap().await.unwrap();
    assert!(cache.is_empty());
    assert!(fetcher.requested().is_empty());
  }

  #[tokio::test]
  async fn no_candidates_yields_empty_table() {
    let (cache, _) = cache_with(FakeFetcher::default());
    cache.rebuild(Vec::new(), PreviewQuality::High).unwrap().await.unwrap();
    assert!(cache.is_empty());
  }

  #[tokio::test]
  async fn rebuild_loads_selected_resolution() {
    let fetcher = FakeFetcher::default()
      .with_sheet("small", Duration::ZERO, sheet(1, 3, 1, 10, 10))
      .with_sheet("large", Duration::ZERO, sheet(2, 3, 1, 20, 20));
    let (cache, fetcher) = cache_with(fetcher);
    let sets = vec![frame_set(&["small"], 10, 10, 3, 1000, 3, 1), frame_set(&["large"], 20, 20, 3, 1000, 3, 1)];

    cache.rebuild(sets.clone(), PreviewQuality::Low).unwrap().await.unwrap();
    assert_eq!(fetcher.requested(), vec!["small".to_string()]);
    assert_eq!(cache.query(0).map(|img| img.dimensions()), Some((10, 10)));

    cache.rebuild(sets, PreviewQuality::High).unwrap().await.unwrap();
    assert_eq!(cache.query(0).map(|img| img.dimensions()), Some((20, 20)));
  }

  #[tokio::test]
  async fn query_returns_nearest_frame() {
    let fetcher = FakeFetcher::default().with_sheet("s", Duration::ZERO, sheet(7, 3, 1, 4, 4));
    let (cache, _) = cache_with(fetcher);
    cache.rebuild(vec![frame_set(&["s"], 4, 4, 3, 1000, 3, 1)], PreviewQuality::High).unwrap().await.unwrap();

    assert_eq!(cache.positions(), vec![0, 1000, 2000]);
    assert_eq!(cache.query(1400).map(|img| tag_of(&img)), Some([7, 1, 0]));
    assert_eq!(cache.query(1500).map(|img| tag_of(&img)), Some([7, 2, 0]));
    assert_eq!(cache.query(1600).map(|img| tag_of(&img)), Some([7, 2, 0]));
    assert_eq!(cache.query(0).map(|img| tag_of(&img)), Some([7, 0, 0]));
  }

  #[tokio::test]
  async fn frames_beyond_total_count_are_skipped() {
    let fetcher = FakeFetcher::default()
      .with_sheet("p0", Duration::ZERO, sheet(1, 2, 2, 4, 4))
      .with_sheet("p1", Duration::ZERO, sheet(2, 2, 2, 4, 4));
    let (cache, _) = cache_with(fetcher);
    cache.rebuild(vec![frame_set(&["p0", "p1"], 4, 4, 5, 500, 2, 2)], PreviewQuality::High).unwrap().await.unwrap();

    assert_eq!(cache.positions(), vec![0, 500, 1000, 1500, 2000]);
    assert_eq!(cache.query(1500).map(|img| tag_of(&img)), Some([1, 1, 1]));
    assert_eq!(cache.query(2000).map(|img| tag_of(&img)), Some([2, 0, 0]));
  }

  #[tokio::test]
  async fn failed_sheet_does_not_block_other_sheets() {
    // "broken" is unknown to the fetcher, so its download fails.
    let fetcher = FakeFetcher::default().with_sheet("ok", Duration::ZERO, sheet(3, 2, 1, 4, 4));
    let (cache, _) = cache_with(fetcher);
    let sets = vec![frame_set(&["broken", "ok"], 4, 4, 4, 1000, 2, 1)];
    cache.rebuild(sets, PreviewQuality::High).unwrap().await.unwrap();

    assert_eq!(cache.len(), 4);
    assert!(cache.query(0).is_none());
    assert!(cache.query(1000).is_none());
    assert_eq!(cache.query(2000).map(|img| tag_of(&img)), Some([3, 0, 0]));
    assert_eq!(cache.query(3000).map(|img| tag_of(&img)), Some([3, 1, 0]));
  }

  #[tokio::test]
  async fn undersized_sheet_yields_no_result() {
    // Declared 3 frames of 8px per row, but the sheet is only 10px wide.
    let fetcher = FakeFetcher::default().with_sheet("s", Duration::ZERO, sheet(1, 1, 1, 10, 8));
    let (cache, _) = cache_with(fetcher);
    cache.rebuild(vec![frame_set(&["s"], 8, 8, 3, 1000, 3, 1)], PreviewQuality::High).unwrap().await.unwrap();

    assert!(cache.query(0).is_some());
    assert!(cache.query(1000).is_none());
  }

  #[tokio::test(start_paused = true)]
  async fn stale_rebuild_never_reaches_table() {
    let fetcher = FakeFetcher::default()
      .with_sheet("old", Duration::from_secs(5), sheet(1, 4, 1, 4, 4))
      .with_sheet("new", Duration::ZERO, sheet(2, 2, 1, 4, 4));
    let (cache, _) = cache_with(fetcher);

    let old = cache.rebuild(vec![frame_set(&["old"], 4, 4, 4, 1000, 4, 1)], PreviewQuality::High).unwrap();
    // Let the old run get into its download before superseding it.
    tokio::time::sleep(Duration::from_millis(10)).await;
    let new = cache.rebuild(vec![frame_set(&["new"], 4, 4, 2, 250, 2, 1)], PreviewQuality::High).unwrap();

    // The new run settles first; the old one finishes afterwards and must be discarded.
    new.await.unwrap();
    old.await.unwrap();

    assert_eq!(cache.positions(), vec![0, 250]);
    assert_eq!(cache.query(3000).map(|img| tag_of(&img)), Some([2, 1, 0]));
  }

  #[tokio::test(start_paused = true)]
  async fn partially_committed_run_is_superseded() {
    let fetcher = FakeFetcher::default()
      .with_sheet("old0", Duration::ZERO, sheet(1, 1, 1, 4, 4))
      .with_sheet("old1", Duration::from_secs(5), sheet(1, 1, 1, 4, 4))
      .with_sheet("new", Duration::from_secs(1), sheet(2, 1, 1, 4, 4));
    let (cache, _) = cache_with(fetcher);

    let old = cache.rebuild(vec![frame_set(&["old0", "old1"], 4, 4, 2, 1000, 1, 1)], PreviewQuality::High).unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(cache.positions(), vec![0]);

    let new = cache.rebuild(vec![frame_set(&["new"], 4, 4, 1, 1000, 1, 1)], PreviewQuality::High).unwrap();
    assert!(cache.is_empty());

    new.await.unwrap();
    old.await.unwrap();
    assert_eq!(cache.positions(), vec![0]);
    assert_eq!(cache.query(1000).map(|img| tag_of(&img)), Some([2, 0, 0]));
  }

  #[tokio::test(start_paused = true)]
  async fn clear_discards_in_flight_rebuild() {
    let fetcher = FakeFetcher::default().with_sheet("s", Duration::from_secs(2), sheet(1, 1, 1, 4, 4));
    let (cache, _) = cache_with(fetcher);

    let run = cache.rebuild(vec![frame_set(&["s"], 4, 4, 1, 1000, 1, 1)], PreviewQuality::High).unwrap();
    let generation = cache.generation();
    cache.clear();
    run.await.unwrap();

    assert!(cache.is_empty());
    assert_eq!(cache.generation(), generation + 1);
  }
}
