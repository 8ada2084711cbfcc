//! Terminal rendering of preview frames.
//!
//! Every renderer writes to an `io::Write` so the escape sequences can be inspected in tests.

use anyhow::{Context, Result};
use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use color_quant::NeuQuant;
use image::{DynamicImage, ImageFormat, imageops::FilterType};
use std::io::{Cursor, Write};

use crate::constants::constants;
use crate::display::DisplayMode;

/// Size of the render target in terminal cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CellArea {
  pub cols: u16,
  pub rows: u16,
}

impl CellArea {
  pub fn is_empty(&self) -> bool {
    self.cols == 0 || self.rows == 0
  }
}

const ASCII_CHARS: [char; 10] = [' ', '.', ':', '-', '=', '+', '*', '#', '%', '@'];

pub fn render_image(out: &mut impl Write, image: &DynamicImage, area: CellArea, mode: DisplayMode) -> Result<()> {
  if area.is_empty() {
    return Ok(());
  }
  match mode {
    DisplayMode::Kitty => kitty_render_image(out, image, area),
    DisplayMode::Sixel => sixel_render_image(out, image, area),
    DisplayMode::Direct => direct_render_image(out, image, area),
    DisplayMode::Ascii => ascii_render_image(out, image, area),
  }
}

// --- Half-block / ASCII ---

/// Upper-half-block rows: foreground is the upper pixel, background the lower one.
fn direct_render_image(out: &mut impl Write, image: &DynamicImage, area: CellArea) -> Result<()> {
  let resized = image.resize(area.cols as u32, area.rows as u32 * 2, FilterType::Triangle).to_rgb8();
  let (w, h) = resized.dimensions();

  let mut buf = String::new();
  for y in (0..h).step_by(2) {
    for x in 0..w {
      let upper = resized.get_pixel(x, y);
      buf.push_str(&format!("\x1B[38;2;{};{};{}m", upper[0], upper[1], upper[2]));
      if y + 1 < h {
        let lower = resized.get_pixel(x, y + 1);
        buf.push_str(&format!("\x1B[48;2;{};{};{}m", lower[0], lower[1], lower[2]));
      } else {
        buf.push_str("\x1B[49m");
      }
      buf.push('▀');
    }
    buf.push_str("\x1B[0m\n");
  }

  out.write_all(buf.as_bytes()).context("Failed to write half-block image")?;
  out.flush().context("Failed to flush half-block image")?;
  Ok(())
}

fn ascii_render_image(out: &mut impl Write, image: &DynamicImage, area: CellArea) -> Result<()> {
  let resized = image.resize_exact(area.cols as u32, area.rows as u32, FilterType::Triangle).to_luma8();

  let mut buf = String::with_capacity((area.cols as usize + 1) * area.rows as usize);
  for row in resized.rows() {
    for pixel in row {
      let idx = ((pixel[0] as f32 / 255.0) * (ASCII_CHARS.len() - 1) as f32).round() as usize;
      buf.push(ASCII_CHARS[idx.min(ASCII_CHARS.len() - 1)]);
    }
    buf.push('\n');
  }

  out.write_all(buf.as_bytes()).context("Failed to write ASCII image")?;
  out.flush().context("Failed to flush ASCII image")?;
  Ok(())
}

// --- Kitty Graphics Protocol ---
//
//   Transmit:  \x1B_G a=T,f=100,t=d,i=1,p=1,c=<cols>,r=<rows>,q=2,m=1;<base64 chunk>\x1B\\
//   Continue:  \x1B_G m=1;<base64 chunk>\x1B\\
//   Last:      \x1B_G m=0;<base64 chunk>\x1B\\
//
// Reusing `i=1`/`p=1` replaces the previous preview in place while scrubbing.

/// Delete all Kitty images currently displayed.
pub fn kitty_delete_all(out: &mut impl Write) -> Result<()> {
  write!(out, "\x1B_Ga=d,d=a,q=2\x1B\\").context("Failed to write kitty delete all")?;
  out.flush().context("Failed to flush kitty delete")?;
  Ok(())
}

fn kitty_render_image(out: &mut impl Write, image: &DynamicImage, area: CellArea) -> Result<()> {
  let mut png_buf = Vec::new();
  image.write_to(&mut Cursor::new(&mut png_buf), ImageFormat::Png).context("Failed to encode frame as PNG for kitty")?;

  let b64 = BASE64.encode(&png_buf);
  let chunks: Vec<&[u8]> = b64.as_bytes().chunks(constants().kitty_chunk_size).collect();
  let last = chunks.len().saturating_sub(1);

  for (i, chunk) in chunks.iter().enumerate() {
    let data = std::str::from_utf8(chunk).context("base64 chunk was not valid UTF-8")?;
    let more = if i < last { 1 } else { 0 };

    if i == 0 {
      write!(out, "\x1B_Ga=T,f=100,t=d,i=1,p=1,c={},r={},q=2,m={};{}\x1B\\", area.cols, area.rows, more, data)
        .context("Failed to write kitty image header chunk")?;
    } else {
      write!(out, "\x1B_Gm={};{}\x1B\\", more, data).context("Failed to write kitty image continuation chunk")?;
    }
  }
  writeln!(out).context("Failed to finish kitty image")?;

  out.flush().context("Failed to flush kitty image")?;
  Ok(())
}

// --- Sixel Graphics Protocol ---
//
//   DCS q <data> ST, with DCS = \x1BP and ST = \x1B\\
//   Color register:  #<n>;2;<r%>;<g%>;<b%>
//   Data char: 0x3F + 6-bit column bitmap; `$` rewinds the row, `-` advances to the next one.
//
// Colors are quantized with NeuQuant.

fn sixel_render_image(out: &mut impl Write, image: &DynamicImage, area: CellArea) -> Result<()> {
  let c = constants();
  let max_colors = c.sixel_max_colors.clamp(2, 256);
  let pixel_w = area.cols as u32 * c.cell_width_px;
  let pixel_h = area.rows as u32 * c.cell_height_px;
  let resized = image.resize(pixel_w, pixel_h, FilterType::Lanczos3).into_rgb8();
  let (w, h) = (resized.width() as usize, resized.height() as usize);

  let rgba_pixels: Vec<u8> = resized.pixels().flat_map(|p| [p[0], p[1], p[2], 255]).collect();
  let nq = NeuQuant::new(3, max_colors, &rgba_pixels);
  let color_map = nq.color_map_rgb();
  let palette: Vec<[u8; 3]> = (0..max_colors)
    .map(|i| {
      let start = i * 3;
      color_map.get(start..start + 3).and_then(|s| s.try_into().ok()).unwrap_or([0, 0, 0])
    })
    .collect();

  // index_of() stays below max_colors, which is clamped to 256.
  let indices: Vec<u8> =
    resized.pixels().map(|p| nq.index_of(&[p[0], p[1], p[2], 255]).min(u8::MAX as usize) as u8).collect();

  let mut buf = String::with_capacity(w * h);
  buf.push_str("\x1BPq");
  buf.push_str(&format!("\"1;1;{};{}", w, h));

  for (i, c) in palette.iter().enumerate() {
    let r_pct = (c[0] as u32 * 100) / 255;
    let g_pct = (c[1] as u32 * 100) / 255;
    let b_pct = (c[2] as u32 * 100) / 255;
    buf.push_str(&format!("#{};2;{};{};{}", i, r_pct, g_pct, b_pct));
  }

  let mut row_data = vec![0u8; w];
  for y_base in (0..h).step_by(6) {
    for color_idx in 0..palette.len() {
      let color_idx_u8 = color_idx.min(u8::MAX as usize) as u8;
      let mut has_pixels = false;

      for (x, slot) in row_data.iter_mut().enumerate() {
        let mut sixel_val: u8 = 0;
        for bit in 0..6 {
          let y = y_base + bit;
          if y < h && indices.get(y * w + x) == Some(&color_idx_u8) {
            sixel_val |= 1 << bit;
            has_pixels = true;
          }
        }
        *slot = sixel_val;
      }

      if !has_pixels {
        continue;
      }

      buf.push_str(&format!("#{}", color_idx));
      push_sixel_runs(&mut buf, &row_data);
      buf.push('$');
    }
    buf.push('-');
  }
  buf.push_str("\x1B\\\n");

  out.write_all(buf.as_bytes()).context("Failed to write sixel image")?;
  out.flush().context("Failed to flush sixel image")?;
  Ok(())
}

/// Append sixel data chars, run-length encoding runs longer than three (`!<n><char>`).
fn push_sixel_runs(buf: &mut String, row: &[u8]) {
  let mut i = 0;
  while i < row.len() {
    let val = row[i];
    let ch = (val + 0x3F) as char;
    let run = row[i..].iter().take_while(|&&v| v == val).count();
    if run > 3 {
      buf.push_str(&format!("!{}{}", run, ch));
    } else {
      buf.extend(std::iter::repeat_n(ch, run));
    }
    i += run;
  }
}
