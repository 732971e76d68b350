//! Optional soundtrack played by an `ffplay` side process. Audio runs open
//! loop next to the video; nothing synchronises the two beyond starting at
//! the same moment.

use std::env;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};

use anyhow::{Context, Result};

const FFPLAY: &str = if cfg!(windows) { "ffplay.exe" } else { "ffplay" };

#[derive(Debug)]
pub struct AudioProcess {
    child: Child,
}

impl AudioProcess {
    /// Starts audio for `input_path`. A missing `ffplay` is not fatal:
    /// playback continues silently with a warning.
    pub fn spawn(input_path: &Path) -> Option<Self> {
        let program = ffplay_program();
        match Self::spawn_with(&program, input_path) {
            Ok(process) => Some(process),
            Err(error) => {
                log::warn!("audio disabled: {error:#}");
                None
            }
        }
    }

    pub fn spawn_with(program: &Path, input_path: &Path) -> Result<Self> {
        let child = Command::new(program)
            .arg("-nodisp")
            .arg("-autoexit")
            .arg("-vn")
            .arg("-loglevel")
            .arg("quiet")
            .arg(input_path)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|error| match error.kind() {
                ErrorKind::NotFound => anyhow::anyhow!("{} was not found", program.display()),
                _ => anyhow::Error::new(error),
            })
            .with_context(|| format!("failed to start {}", program.display()))?;
        log::debug!("audio started (pid {})", child.id());
        Ok(Self { child })
    }

    pub fn stop(&mut self) {
        if let Ok(Some(_)) = self.child.try_wait() {
            return;
        }
        if let Err(error) = self.child.kill() {
            log::debug!("failed to stop audio process: {error}");
        }
        let _ = self.child.wait();
    }
}

impl Drop for AudioProcess {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Prefers an `ffplay` shipped next to the executable over the one on PATH.
fn ffplay_program() -> PathBuf {
    env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|dir| dir.join(FFPLAY)))
        .filter(|candidate| candidate.is_file())
        .unwrap_or_else(|| PathBuf::from(FFPLAY))
}
