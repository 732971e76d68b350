use std::io::{self, Stdout, Write};

use anyhow::{Error, Result};
use crossterm::cursor::{Hide, MoveTo, Show};
use crossterm::style::ResetColor;
use crossterm::terminal::{self, Clear, ClearType};
use crossterm::{execute, queue};

use crate::error_codes::PlaybackError;

/// Used when the output is not a terminal (pipes, CI logs).
pub const FALLBACK_TERMINAL_SIZE: (u16, u16) = (80, 24);

/// Output sink owned by the playback loop.
pub trait Display {
    /// Current size in character cells as `(columns, rows)`.
    fn size(&mut self) -> Result<(u16, u16)>;
    fn clear(&mut self) -> Result<()>;
    /// Homes the cursor and writes `text` over the previous frame in place.
    fn write_at_origin(&mut self, text: &str) -> Result<()>;
}

pub struct TerminalDisplay<W: Write> {
    out: W,
    cursor_hidden: bool,
}

impl TerminalDisplay<Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write> TerminalDisplay<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            cursor_hidden: false,
        }
    }

    /// Clears the screen and hides the cursor for the duration of playback.
    pub fn begin(&mut self) -> Result<()> {
        execute!(self.out, Hide, Clear(ClearType::All), MoveTo(0, 0))
            .map_err(|error| write_failure(error, "failed to prepare terminal"))?;
        self.cursor_hidden = true;
        Ok(())
    }

    /// Resets colors, shows the cursor and moves below the last frame.
    pub fn restore(&mut self) -> Result<()> {
        if !self.cursor_hidden {
            return Ok(());
        }
        self.cursor_hidden = false;
        execute!(self.out, ResetColor, Show)
            .and_then(|()| writeln!(self.out))
            .and_then(|()| self.out.flush())
            .map_err(|error| write_failure(error, "failed to restore terminal"))
    }

    pub fn get_ref(&self) -> &W {
        &self.out
    }
}

impl<W: Write> Display for TerminalDisplay<W> {
    fn size(&mut self) -> Result<(u16, u16)> {
        match terminal::size() {
            Ok((columns, rows)) if columns > 0 && rows > 0 => Ok((columns, rows)),
            Ok(_) => Ok(FALLBACK_TERMINAL_SIZE),
            Err(error) => {
                log::trace!("terminal size unavailable ({error}); assuming 80x24");
                Ok(FALLBACK_TERMINAL_SIZE)
            }
        }
    }

    fn clear(&mut self) -> Result<()> {
        execute!(self.out, Clear(ClearType::All), MoveTo(0, 0))
            .map_err(|error| write_failure(error, "failed to clear terminal"))
    }

    fn write_at_origin(&mut self, text: &str) -> Result<()> {
        queue!(self.out, MoveTo(0, 0))
            .and_then(|()| self.out.write_all(text.as_bytes()))
            .and_then(|()| self.out.flush())
            .map_err(|error| write_failure(error, "failed to write frame"))
    }
}

impl<W: Write> Drop for TerminalDisplay<W> {
    fn drop(&mut self) {
        let _ = self.restore();
    }
}

fn write_failure(error: io::Error, what: &str) -> Error {
    Error::new(error).context(PlaybackError::display_write(what))
}
