use clap::ValueEnum;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum CliDisplayMode {
  Auto,
  Kitty,
  Sixel,
  Direct,
  Ascii,
}

impl CliDisplayMode {
  pub fn from_config(s: &str) -> Self {
    match s.to_lowercase().as_str() {
      "kitty" => CliDisplayMode::Kitty,
      "sixel" => CliDisplayMode::Sixel,
      "direct" => CliDisplayMode::Direct,
      "ascii" => CliDisplayMode::Ascii,
      _ => CliDisplayMode::Auto,
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayMode {
  Ascii,
  Direct,
  Sixel,
  Kitty,
}

impl DisplayMode {
  pub fn label(self) -> &'static str {
    match self {
      DisplayMode::Ascii => "ASCII",
      DisplayMode::Direct => "Half-block",
      DisplayMode::Sixel => "Sixel",
      DisplayMode::Kitty => "Kitty",
    }
  }
}

/// Terminal identification read from the environment.
#[derive(Debug, Default, Clone)]
pub struct TermEnv {
  pub term: String,
  pub term_program: String,
  pub colorterm: String,
}

const KITTY_PROGRAMS: &[&str] = &["kitty", "wezterm", "ghostty"];
const SIXEL_PROGRAMS: &[&str] = &["foot", "mlterm", "contour"];

impl TermEnv {
  pub fn from_env() -> Self {
    let var = |name: &str| std::env::var(name).unwrap_or_default();
    Self { term: var("TERM"), term_program: var("TERM_PROGRAM"), colorterm: var("COLORTERM") }
  }

  fn program_is_one_of(&self, programs: &[&str]) -> bool {
    programs.iter().any(|p| self.term_program.eq_ignore_ascii_case(p))
  }

  fn kitty_graphics(&self) -> bool {
    self.term == "xterm-kitty" || self.program_is_one_of(KITTY_PROGRAMS)
  }

  fn sixel(&self) -> bool {
    self.term.contains("sixel") || self.program_is_one_of(SIXEL_PROGRAMS)
  }

  fn truecolor(&self) -> bool {
    ["truecolor", "24bit"].iter().any(|v| self.colorterm.eq_ignore_ascii_case(v))
  }

  /// Richest mode this terminal supports: Kitty graphics, then Sixel, then truecolor half-blocks.
  pub fn best_mode(&self) -> DisplayMode {
    let candidates = [
      (self.kitty_graphics(), DisplayMode::Kitty),
      (self.sixel(), DisplayMode::Sixel),
      (self.truecolor(), DisplayMode::Direct),
    ];
    candidates
      .into_iter()
      .find_map(|(supported, mode)| supported.then_some(mode))
      .unwrap_or(DisplayMode::Ascii)
  }
}

impl CliDisplayMode {
  /// The mode requested explicitly, or `None` for auto-detection.
  pub fn forced(self) -> Option<DisplayMode> {
    match self {
      CliDisplayMode::Auto => None,
      CliDisplayMode::Kitty => Some(DisplayMode::Kitty),
      CliDisplayMode::Sixel => Some(DisplayMode::Sixel),
      CliDisplayMode::Direct => Some(DisplayMode::Direct),
      CliDisplayMode::Ascii => Some(DisplayMode::Ascii),
    }
  }
}

pub fn resolve_display_mode(cli: CliDisplayMode, env: &TermEnv) -> DisplayMode {
  cli.forced().unwrap_or_else(|| env.best_mode())
}
