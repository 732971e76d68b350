use std::fmt;

use anyhow::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackErrorKind {
    SourceOpen,
    SourceRead,
    Render,
    DisplayWrite,
    Config,
}

impl PlaybackErrorKind {
    pub fn code(self) -> &'static str {
        match self {
            Self::SourceOpen => "SOURCE_OPEN",
            Self::SourceRead => "SOURCE_READ",
            Self::Render => "RENDER_FAILED",
            Self::DisplayWrite => "DISPLAY_WRITE",
            Self::Config => "CONFIG_INVALID",
        }
    }
}

/// A fatal playback condition. Travels inside an `anyhow::Error` chain so
/// call sites keep using `?` and `.context(..)`; the binary digs it back out
/// with [`find_playback_error`] to report a stable code.
#[derive(Debug, Clone)]
pub struct PlaybackError {
    pub kind: PlaybackErrorKind,
    pub message: String,
}

impl PlaybackError {
    pub fn new(kind: PlaybackErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn source_open(message: impl Into<String>) -> Self {
        Self::new(PlaybackErrorKind::SourceOpen, message)
    }

    pub fn source_read(message: impl Into<String>) -> Self {
        Self::new(PlaybackErrorKind::SourceRead, message)
    }

    pub fn render(message: impl Into<String>) -> Self {
        Self::new(PlaybackErrorKind::Render, message)
    }

    pub fn display_write(message: impl Into<String>) -> Self {
        Self::new(PlaybackErrorKind::DisplayWrite, message)
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::new(PlaybackErrorKind::Config, message)
    }

    pub fn code(&self) -> &'static str {
        self.kind.code()
    }
}

impl fmt::Display for PlaybackError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code(), self.message)
    }
}

impl std::error::Error for PlaybackError {}

/// Finds the outermost [`PlaybackError`], whether it was the root cause or
/// attached later as context.
pub fn find_playback_error(error: &Error) -> Option<&PlaybackError> {
    error.downcast_ref::<PlaybackError>().or_else(|| {
        error
            .chain()
            .find_map(|cause| cause.downcast_ref::<PlaybackError>())
    })
}

/// Formats a fatal error for the operator: the coded head line followed by
/// any context that was layered on top of it.
pub fn operator_report(error: &Error) -> String {
    let coded = find_playback_error(error);
    let head = match coded {
        Some(coded) => format!("error[{}]: {}", coded.code(), coded.message),
        None => format!("error: {error}"),
    };
    let coded_text = coded.map(ToString::to_string);

    let mut lines = vec![head];
    for cause in error.chain() {
        let text = cause.to_string();
        if coded_text.as_deref() == Some(text.as_str()) {
            continue;
        }
        if !lines.iter().any(|line| line.ends_with(&text)) {
            lines.push(format!("  caused by: {text}"));
        }
    }
    lines.join("\n")
}
