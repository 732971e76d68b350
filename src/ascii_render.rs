use anyhow::{anyhow, Result};
use image::imageops::{self, FilterType};
use image::{ImageBuffer, Rgb, RgbImage};

use crate::error_codes::PlaybackError;
use crate::frame::RawFrame;
use crate::geometry::DisplayGeometry;

const BT601_R_WEIGHT: u32 = 2990;
const BT601_G_WEIGHT: u32 = 5870;
const BT601_B_WEIGHT: u32 = 1140;
const BT601_WEIGHT_SUM: u32 = 10_000;
const ANSI_FOREGROUND_PREFIX: &str = "\x1b[38;2;";
const ANSI_RESET_LINE: &str = "\x1b[0m\n";
/// Above this source/target width ratio, box-filter downsampling avoids the
/// aliasing a triangle filter shows at large reductions.
const AREA_FILTER_RATIO: u32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorMode {
    Grayscale,
    TrueColor,
}

impl ColorMode {
    pub fn from_flag(color: bool) -> Self {
        if color {
            Self::TrueColor
        } else {
            Self::Grayscale
        }
    }

    pub fn is_color(self) -> bool {
        matches!(self, Self::TrueColor)
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Grayscale => "grayscale",
            Self::TrueColor => "color",
        }
    }
}

/// Turns one decoded picture into display-ready text. Implementations must
/// be pure: the same frame, geometry and mode always give the same text.
pub trait FrameRenderer: Send {
    fn render(&self, frame: &RawFrame, geometry: &DisplayGeometry, mode: ColorMode)
        -> Result<String>;
}

#[derive(Debug, Clone)]
pub struct AsciiRenderer {
    lookup: Vec<char>,
}

impl AsciiRenderer {
    /// Builds the 256-entry luma lookup table for `palette`, ordered from
    /// darkest to brightest glyph.
    pub fn new(palette: &str) -> Result<Self> {
        let glyphs = palette.chars().collect::<Vec<_>>();
        if glyphs.is_empty() {
            return Err(PlaybackError::config("glyph palette must not be empty").into());
        }
        let lookup = (0..256usize)
            .map(|luma| glyphs[luma * glyphs.len() / 256])
            .collect();
        Ok(Self { lookup })
    }

    pub fn glyph_for_luma(&self, luma: u8) -> char {
        self.lookup[usize::from(luma)]
    }

    fn resize(&self, frame: &RawFrame, columns: u32, rows: u32) -> Result<RgbImage> {
        let source: ImageBuffer<Rgb<u8>, &[u8]> =
            ImageBuffer::from_raw(frame.width(), frame.height(), frame.pixels())
                .ok_or_else(|| anyhow!("frame buffer does not match its dimensions"))?;

        if frame.width() == columns && frame.height() == rows {
            return RgbImage::from_raw(columns, rows, frame.pixels().to_vec())
                .ok_or_else(|| anyhow!("frame buffer does not match its dimensions"));
        }
        if frame.width() > columns.saturating_mul(AREA_FILTER_RATIO) && frame.height() >= rows {
            Ok(imageops::thumbnail(&source, columns, rows))
        } else {
            Ok(imageops::resize(&source, columns, rows, FilterType::Triangle))
        }
    }

    fn render_grayscale(&self, image: &RgbImage) -> String {
        let mut out = String::with_capacity((image.width() as usize + 1) * image.height() as usize);
        for row in image.rows() {
            for pixel in row {
                out.push(self.glyph_for_luma(bt601_luma_u8(pixel.0)));
            }
            out.push('\n');
        }
        out
    }

    fn render_truecolor(&self, image: &RgbImage) -> String {
        // ~20 bytes of escape sequence per cell
        let mut out = String::with_capacity(
            image.width() as usize * image.height() as usize * 20 + image.height() as usize * 5,
        );
        for row in image.rows() {
            for pixel in row {
                let [r, g, b] = pixel.0;
                out.push_str(ANSI_FOREGROUND_PREFIX);
                push_decimal(&mut out, r);
                out.push(';');
                push_decimal(&mut out, g);
                out.push(';');
                push_decimal(&mut out, b);
                out.push('m');
                out.push(self.glyph_for_luma(bt601_luma_u8(pixel.0)));
            }
            out.push_str(ANSI_RESET_LINE);
        }
        out
    }
}

impl FrameRenderer for AsciiRenderer {
    fn render(
        &self,
        frame: &RawFrame,
        geometry: &DisplayGeometry,
        mode: ColorMode,
    ) -> Result<String> {
        if frame.width() == 0 || frame.height() == 0 {
            return Err(PlaybackError::render(format!(
                "cannot render empty {}x{} frame",
                frame.width(),
                frame.height()
            ))
            .into());
        }

        let columns = geometry.ascii_width.max(1);
        let rows = geometry.ascii_height.max(1);
        let resized = self
            .resize(frame, columns, rows)
            .map_err(|error| PlaybackError::render(format!("resize failed: {error}")))?;

        Ok(match mode {
            ColorMode::Grayscale => self.render_grayscale(&resized),
            ColorMode::TrueColor => self.render_truecolor(&resized),
        })
    }
}

pub fn bt601_luma_u8([r, g, b]: [u8; 3]) -> u8 {
    let weighted = BT601_R_WEIGHT * u32::from(r)
        + BT601_G_WEIGHT * u32::from(g)
        + BT601_B_WEIGHT * u32::from(b);
    ((weighted + (BT601_WEIGHT_SUM / 2)) / BT601_WEIGHT_SUM) as u8
}

fn push_decimal(out: &mut String, value: u8) {
    if value >= 100 {
        out.push(char::from(b'0' + value / 100));
    }
    if value >= 10 {
        out.push(char::from(b'0' + (value / 10) % 10));
    }
    out.push(char::from(b'0' + value % 10));
}
