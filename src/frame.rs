use anyhow::Result;

use crate::error_codes::PlaybackError;

/// One decoded picture, tightly packed RGB24, row-major.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFrame {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
}

impl RawFrame {
    pub fn from_rgb(width: u32, height: u32, pixels: Vec<u8>) -> Result<Self> {
        let expected = (width as usize)
            .checked_mul(height as usize)
            .and_then(|area| area.checked_mul(3))
            .ok_or_else(|| PlaybackError::render(format!("frame {width}x{height} overflows")))?;
        if pixels.len() != expected {
            return Err(PlaybackError::render(format!(
                "frame {width}x{height} expects {expected} RGB bytes, got {}",
                pixels.len()
            ))
            .into());
        }
        Ok(Self {
            width,
            height,
            pixels,
        })
    }

    /// A frame filled with one color; handy for synthetic sources.
    pub fn solid(width: u32, height: u32, rgb: [u8; 3]) -> Self {
        let pixels = rgb
            .iter()
            .copied()
            .cycle()
            .take(width as usize * height as usize * 3)
            .collect();
        Self {
            width,
            height,
            pixels,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrameMetadata {
    /// Position of the frame in the pipeline, counting from 1.
    pub sequence: u64,
    /// Frames read from the source so far, including this one.
    pub source_frame_index: u64,
    pub columns: u32,
    pub rows: u32,
}

/// Display-ready text for one frame. Moves from the producer, through the
/// queue, to the consumer; never shared.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedFrame {
    text: String,
    pub metadata: FrameMetadata,
}

impl RenderedFrame {
    pub fn new(text: String) -> Self {
        Self {
            text,
            metadata: FrameMetadata::default(),
        }
    }

    pub fn with_metadata(mut self, metadata: FrameMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn sequence(&self) -> u64 {
        self.metadata.sequence
    }

    pub fn into_text(self) -> String {
        self.text
    }
}
