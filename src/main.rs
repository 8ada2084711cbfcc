use anyhow::{Context, Result, anyhow};
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use image::GenericImageView;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

use seekpreview::config::Config;
use seekpreview::constants::constants;
use seekpreview::display::{CliDisplayMode, DisplayMode, TermEnv, resolve_display_mode};
use seekpreview::graphics::{CellArea, kitty_delete_all, render_image};
use seekpreview::logging;
use seekpreview::resolver::{DescriptorSourceBuilder, MediaSourceBuilder};
use seekpreview::{
  AudioPlaybackResolver, FrameSet, HttpImageFetcher, PlaybackResolver, PreviewQuality, SeekbarPreviewCache, StreamInfo,
  VideoPlaybackResolver,
};

// --- CLI ---

#[derive(Parser, Debug)]
#[command(author, version = env!("CARGO_PKG_VERSION"), about, long_about = None)]
struct Args {
  /// Mirror log output to stderr
  #[arg(short, long, global = true)]
  verbose: bool,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Build a seekbar preview from storyboard frame sets and show the frames nearest to the given positions
  Preview(PreviewArgs),
  /// Pick a playable stream from extractor stream info and print the resolved source as JSON
  Resolve {
    /// JSON file with the stream info
    stream: PathBuf,
    /// Resolve an audio-only source
    #[arg(long)]
    audio_only: bool,
  },
  /// Print the config file location and effective settings
  Config,
  /// Generate shell completions
  Completions { shell: Shell },
}

#[derive(clap::Args, Debug)]
struct PreviewArgs {
  /// JSON file with an array of frame sets
  frames: PathBuf,
  /// Preview quality (defaults to the configured value)
  #[arg(short, long)]
  quality: Option<PreviewQuality>,
  /// Positions in milliseconds, comma separated
  #[arg(long = "at", required = true, value_delimiter = ',')]
  positions: Vec<u64>,
  /// Display mode (defaults to the configured value, then auto-detect)
  #[arg(short, long)]
  display_mode: Option<CliDisplayMode>,
  /// Write frames as PNG files into this directory instead of drawing them
  #[arg(long)]
  save: Option<PathBuf>,
  #[arg(long)]
  cols: Option<u16>,
  #[arg(long)]
  rows: Option<u16>,
}

/// `mm:ss.mmm`, or `h:mm:ss.mmm` past the hour.
fn format_position(ms: u64) -> String {
  let (secs, millis) = (ms / 1000, ms % 1000);
  let (h, m, s) = (secs / 3600, (secs / 60) % 60, secs % 60);
  if h > 0 { format!("{}:{:02}:{:02}.{:03}", h, m, s, millis) } else { format!("{:02}:{:02}.{:03}", m, s, millis) }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
  let content = std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
  serde_json::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))
}

// --- Commands ---

async fn run_preview(config: &Config, args: PreviewArgs) -> Result<()> {
  let frame_sets: Vec<FrameSet> = read_json(&args.frames)?;
  let quality = args.quality.unwrap_or_else(|| config.preview_quality());

  let fetcher = HttpImageFetcher::new(config.fetch_timeout())?;
  let cache = SeekbarPreviewCache::new(Arc::new(fetcher));

  info!(candidates = frame_sets.len(), quality = quality.label(), "preview: building from {}", args.frames.display());
  let build = cache.rebuild(frame_sets, quality).ok_or_else(|| anyhow!("Preview build could not be started"))?;
  build.await.context("Preview build task failed")?;

  let mut stdout = std::io::stdout().lock();
  if cache.is_empty() {
    writeln!(stdout, "No preview frames available (quality: {})", quality.label())?;
    return Ok(());
  }

  let cli_mode = args
    .display_mode
    .or_else(|| config.display_mode.as_deref().map(CliDisplayMode::from_config))
    .unwrap_or(CliDisplayMode::Auto);
  let display_mode = resolve_display_mode(cli_mode, &TermEnv::from_env());
  let area = CellArea {
    cols: args.cols.unwrap_or(constants().default_cols),
    rows: args.rows.unwrap_or(constants().default_rows),
  };

  if let Some(dir) = &args.save {
    std::fs::create_dir_all(dir).with_context(|| format!("Failed to create {}", dir.display()))?;
  }

  for position in args.positions {
    let Some(frame) = cache.query(position) else {
      writeln!(stdout, "{}  no preview", format_position(position))?;
      continue;
    };
    let (w, h) = frame.dimensions();
    writeln!(stdout, "{}  {}x{}", format_position(position), w, h)?;

    match &args.save {
      Some(dir) => {
        let path = dir.join(format!("preview-{}.png", position));
        frame.save(&path).with_context(|| format!("Failed to save {}", path.display()))?;
        writeln!(stdout, "  saved {}", path.display())?;
      }
      None => {
        if display_mode == DisplayMode::Kitty {
          kitty_delete_all(&mut stdout)?;
        }
        render_image(&mut stdout, &frame, area, display_mode)?;
      }
    }
  }
  Ok(())
}

fn run_resolve(config: &Config, path: &Path, audio_only: bool) -> Result<()> {
  let info: StreamInfo = read_json(path)?;
  let builder: Arc<dyn MediaSourceBuilder> = Arc::new(DescriptorSourceBuilder);

  let resolver: Box<dyn PlaybackResolver> = if audio_only {
    Box::new(AudioPlaybackResolver::new(builder, config.preferred_audio_format.clone()))
  } else {
    Box::new(VideoPlaybackResolver::new(
      builder,
      config.preferred_audio_format.clone(),
      config.preferred_video_format.clone(),
      config.max_resolution,
    ))
  };

  let source = resolver.resolve(&info).ok_or_else(|| anyhow!("No playable stream found in {}", path.display()))?;
  println!("{}", serde_json::to_string_pretty(&source).context("Failed to serialize resolved source")?);
  Ok(())
}

fn run_config(config: &Config) -> Result<()> {
  match Config::path() {
    Some(path) => println!("# {}", path.display()),
    None => println!("# no config directory on this platform"),
  }
  print!("{}", toml::to_string(config).context("Failed to serialize config")?);
  println!("# effective preview quality: {}", config.preview_quality().label());
  Ok(())
}

// --- Main ---

#[tokio::main]
async fn main() -> Result<()> {
  let args = Args::parse();

  if let Command::Completions { shell } = args.command {
    clap_complete::generate(shell, &mut Args::command(), "seekpreview", &mut std::io::stdout());
    return Ok(());
  }

  let _log_guard = match Config::log_dir() {
    Some(dir) => Some(logging::init(&dir, args.verbose)?),
    None => None,
  };
  let config = Config::load();

  match args.command {
    Command::Preview(preview) => run_preview(&config, preview).await,
    Command::Resolve { stream, audio_only } => run_resolve(&config, &stream, audio_only),
    Command::Config => run_config(&config),
    Command::Completions { .. } => Ok(()),
  }
}
