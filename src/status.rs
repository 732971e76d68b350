//! Operator-facing status line appended under every displayed frame.

use std::fmt::Write as _;

use crate::ascii_render::ColorMode;
use crate::geometry::DisplayGeometry;

pub const MIN_PROGRESS_WIDTH: usize = 10;
pub const UNKNOWN_PROGRESS: &str = "[unknown progress]";

#[derive(Debug, Clone, Copy)]
pub struct StatusSnapshot {
    pub average_fps: f64,
    pub source_frame_index: u64,
    /// Zero when the container does not report a length.
    pub total_frames: u64,
    pub frames_dropped: u64,
    pub mode: ColorMode,
    pub geometry: DisplayGeometry,
}

impl StatusSnapshot {
    pub fn render(&self) -> String {
        self.render_within(usize::MAX)
    }

    /// Fits the line into `max_width` columns. The progress bar shrinks
    /// first (down to its minimum width), then the description is cut; the
    /// bar and its percentage are always kept whole.
    pub fn render_within(&self, max_width: usize) -> String {
        let description = self.describe();
        let natural_width = progress_width(&self.geometry);
        let mut bar = progress_bar(self.source_frame_index, self.total_frames, natural_width);

        let overflow = (description.len() + 1 + bar.len()).saturating_sub(max_width);
        if overflow > 0 && self.total_frames > 0 {
            let narrower = natural_width.saturating_sub(overflow).max(MIN_PROGRESS_WIDTH);
            bar = progress_bar(self.source_frame_index, self.total_frames, narrower);
        }

        let room = max_width.saturating_sub(bar.len() + 1);
        let description = description
            .get(..description.len().min(room))
            .unwrap_or_default();
        format!("{description} {bar}")
    }

    fn describe(&self) -> String {
        let mut line = String::with_capacity(80);
        let _ = write!(
            line,
            "avg {:.1} fps | frame {}/{} | {} | {}",
            self.average_fps,
            self.source_frame_index,
            total_label(self.total_frames),
            self.mode.label(),
            self.geometry.label(),
        );
        if self.frames_dropped > 0 {
            let _ = write!(line, " | dropped {}", self.frames_dropped);
        }
        line
    }
}

fn total_label(total_frames: u64) -> String {
    if total_frames == 0 {
        "?".to_owned()
    } else {
        total_frames.to_string()
    }
}

pub fn progress_width(geometry: &DisplayGeometry) -> usize {
    (geometry.ascii_width as usize / 2).max(MIN_PROGRESS_WIDTH)
}

/// `[####------] 40.0%`. The filled share is clamped to the bar so a source
/// that overruns its advertised length still renders a full bar.
pub fn progress_bar(current: u64, total: u64, width: usize) -> String {
    if total == 0 {
        return UNKNOWN_PROGRESS.to_owned();
    }
    let progress = (current as f64 / total as f64).clamp(0.0, 1.0);
    let filled = ((width as f64 * progress) as usize).min(width);

    let mut bar = String::with_capacity(width + 10);
    bar.push('[');
    bar.extend(std::iter::repeat('#').take(filled));
    bar.extend(std::iter::repeat('-').take(width - filled));
    let _ = write!(bar, "] {:.1}%", progress * 100.0);
    bar
}
