#![allow(dead_code)]

use std::io;
use std::thread;
use std::time::Duration;

use anyhow::Result;

use asciifilm::decoding::FrameSource;
use asciifilm::display::Display;
use asciifilm::error_codes::PlaybackError;
use asciifilm::frame::RawFrame;
use asciifilm::probe::StreamMetadata;

/// Emits `frames` gradient frames, then empty reads forever.
pub struct MockSource {
    pub metadata: StreamMetadata,
    pub remaining: usize,
    pub delay: Duration,
    pub fail_at: Option<usize>,
    pub produced: usize,
}

impl MockSource {
    pub fn new(frames: usize) -> Self {
        Self {
            metadata: StreamMetadata::new(200.0, 32, 16, frames as u64),
            remaining: frames,
            delay: Duration::ZERO,
            fail_at: None,
            produced: 0,
        }
    }

    pub fn with_fps(mut self, fps: f64) -> Self {
        let StreamMetadata {
            width,
            height,
            total_frames,
            ..
        } = self.metadata;
        self.metadata = StreamMetadata::new(fps, width, height, total_frames);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn failing_at(mut self, frame: usize) -> Self {
        self.fail_at = Some(frame);
        self
    }
}

impl FrameSource for MockSource {
    fn metadata(&self) -> StreamMetadata {
        self.metadata
    }

    fn next_frame(&mut self) -> Result<Option<RawFrame>> {
        thread::sleep(self.delay);
        if self.fail_at == Some(self.produced) {
            return Err(PlaybackError::source_read("decoder hiccup became fatal").into());
        }
        if self.remaining == 0 {
            return Ok(None);
        }
        self.remaining -= 1;
        self.produced += 1;
        let shade = (self.produced * 20 % 256) as u8;
        Ok(Some(RawFrame::solid(
            self.metadata.width,
            self.metadata.height,
            [shade, shade, shade],
        )))
    }
}

/// Records writes instead of touching a terminal.
pub struct RecordingDisplay {
    pub sizes: Vec<(u16, u16)>,
    pub size_queries: usize,
    pub writes: Vec<String>,
    pub clears: usize,
    pub fail_on_write: Option<usize>,
    /// Blocks the write with this index for the given time.
    pub slow_write: Option<(usize, Duration)>,
}

impl RecordingDisplay {
    pub fn new(columns: u16, rows: u16) -> Self {
        Self {
            sizes: vec![(columns, rows)],
            size_queries: 0,
            writes: Vec::new(),
            clears: 0,
            fail_on_write: None,
            slow_write: None,
        }
    }

    /// Reports each size in turn for one query, then sticks to the last.
    pub fn with_sizes(sizes: Vec<(u16, u16)>) -> Self {
        let mut display = Self::new(80, 24);
        display.sizes = sizes;
        display
    }
}

impl Display for RecordingDisplay {
    fn size(&mut self) -> Result<(u16, u16)> {
        let index = self.size_queries.min(self.sizes.len() - 1);
        self.size_queries += 1;
        Ok(self.sizes[index])
    }

    fn clear(&mut self) -> Result<()> {
        self.clears += 1;
        Ok(())
    }

    fn write_at_origin(&mut self, text: &str) -> Result<()> {
        if self.fail_on_write == Some(self.writes.len()) {
            let error = io::Error::new(io::ErrorKind::BrokenPipe, "terminal went away");
            return Err(anyhow::Error::new(error)
                .context(PlaybackError::display_write("failed to write frame")));
        }
        if let Some((index, delay)) = self.slow_write {
            if index == self.writes.len() {
                thread::sleep(delay);
            }
        }
        self.writes.push(text.to_owned());
        Ok(())
    }
}
