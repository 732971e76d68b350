/// Terminal cells are roughly twice as tall as they are wide, so a row of
/// glyphs covers twice the vertical extent of a column.
pub const GLYPH_ASPECT_CORRECTION: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DisplayGeometry {
    pub terminal_width: u16,
    pub terminal_height: u16,
    pub ascii_width: u32,
    pub ascii_height: u32,
}

impl DisplayGeometry {
    /// Fits a `video_width x video_height` picture into the terminal,
    /// leaving the last column and row free for the cursor and status line.
    ///
    /// Never fails: degenerate terminals or videos clamp to a 1x1 grid.
    pub fn compute(terminal: (u16, u16), video_width: u32, video_height: u32) -> Self {
        let (terminal_width, terminal_height) = terminal;
        let video_width = video_width.max(1);
        let video_height = video_height.max(1);

        let max_width = u32::from(terminal_width.saturating_sub(1))
            .min(video_width)
            .max(1);
        let max_height = u32::from(terminal_height.saturating_sub(1))
            .min(video_height)
            .max(1);

        let terminal_aspect = max_height as f64 / (max_width as f64 * GLYPH_ASPECT_CORRECTION);
        let video_aspect = video_height as f64 / video_width as f64;

        let ascii_width = if video_aspect <= terminal_aspect {
            max_width
        } else {
            ((max_height as f64 / video_aspect) / GLYPH_ASPECT_CORRECTION) as u32
        }
        .clamp(1, max_width);

        let ascii_height = ((video_aspect * ascii_width as f64 * GLYPH_ASPECT_CORRECTION) as u32)
            .clamp(1, max_height);

        Self {
            terminal_width,
            terminal_height,
            ascii_width,
            ascii_height,
        }
    }

    pub fn terminal_size(&self) -> (u16, u16) {
        (self.terminal_width, self.terminal_height)
    }

    pub fn label(&self) -> String {
        format!("{}x{}", self.ascii_width, self.ascii_height)
    }
}
