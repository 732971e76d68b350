use std::path::Path;
use std::process::Command;

use anyhow::Result;
use serde::Deserialize;

use crate::error_codes::PlaybackError;

pub const FALLBACK_FPS: f64 = 30.0;
/// Rates below one frame per 100 seconds are treated as unknown.
pub const MIN_FPS: f64 = 0.01;

/// Replaces a missing, non-finite or implausibly low rate with
/// [`FALLBACK_FPS`].
pub fn usable_fps(fps: f64) -> f64 {
    if fps.is_finite() && fps >= MIN_FPS {
        fps
    } else {
        FALLBACK_FPS
    }
}

/// Stream facts captured once when the source is opened.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StreamMetadata {
    pub fps: f64,
    pub width: u32,
    pub height: u32,
    /// 0 when the container does not say.
    pub total_frames: u64,
}

impl StreamMetadata {
    /// Applies the fps fallback; everything else is taken as reported.
    pub fn new(fps: f64, width: u32, height: u32, total_frames: u64) -> Self {
        Self {
            fps: usable_fps(fps),
            width,
            height,
            total_frames,
        }
    }
}

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    #[serde(default)]
    streams: Vec<FfprobeStream>,
    #[serde(default)]
    format: Option<FfprobeFormat>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    #[serde(default)]
    codec_type: Option<String>,
    #[serde(default)]
    width: Option<u32>,
    #[serde(default)]
    height: Option<u32>,
    #[serde(default)]
    r_frame_rate: Option<String>,
    #[serde(default)]
    avg_frame_rate: Option<String>,
    #[serde(default)]
    nb_frames: Option<String>,
    #[serde(default)]
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    #[serde(default)]
    duration: Option<String>,
}

pub fn probe_stream(path: &Path) -> Result<StreamMetadata> {
    if !path.is_file() {
        return Err(PlaybackError::source_open(format!(
            "video file '{}' does not exist",
            path.display()
        ))
        .into());
    }

    let output = Command::new("ffprobe")
        .arg("-v")
        .arg("error")
        .arg("-select_streams")
        .arg("v:0")
        .arg("-show_streams")
        .arg("-show_format")
        .arg("-print_format")
        .arg("json")
        .arg(path)
        .output()
        .map_err(|error| {
            PlaybackError::source_open(format!(
                "failed to spawn ffprobe for {} (is ffmpeg installed?): {error}",
                path.display()
            ))
        })?;

    if !output.status.success() {
        return Err(PlaybackError::source_open(format!(
            "ffprobe could not read {} (exit status: {})",
            path.display(),
            output.status
        ))
        .into());
    }

    parse_ffprobe_json(&output.stdout).map_err(|error| {
        PlaybackError::source_open(format!("{}: {error}", path.display())).into()
    })
}

fn parse_ffprobe_json(raw: &[u8]) -> std::result::Result<StreamMetadata, String> {
    let parsed: FfprobeOutput =
        serde_json::from_slice(raw).map_err(|error| format!("bad ffprobe JSON: {error}"))?;

    let stream = parsed
        .streams
        .iter()
        .find(|stream| stream.codec_type.as_deref() == Some("video"))
        .ok_or_else(|| "no video stream found".to_owned())?;

    let (width, height) = match (stream.width, stream.height) {
        (Some(width), Some(height)) if width > 0 && height > 0 => (width, height),
        _ => return Err("video stream has no usable dimensions".to_owned()),
    };

    let fps = stream
        .r_frame_rate
        .as_deref()
        .and_then(parse_ffprobe_rate)
        .or_else(|| stream.avg_frame_rate.as_deref().and_then(parse_ffprobe_rate))
        .unwrap_or(0.0);

    let duration = stream
        .duration
        .as_deref()
        .and_then(parse_ffprobe_float)
        .or_else(|| {
            parsed
                .format
                .as_ref()
                .and_then(|format| format.duration.as_deref())
                .and_then(parse_ffprobe_float)
        });

    let metadata = StreamMetadata::new(fps, width, height, 0);
    let total_frames = stream
        .nb_frames
        .as_deref()
        .and_then(parse_ffprobe_u64)
        .or_else(|| duration.map(|seconds| (seconds * metadata.fps).round().max(1.0) as u64))
        .unwrap_or(0);

    Ok(StreamMetadata {
        total_frames,
        ..metadata
    })
}

fn parse_ffprobe_rate(raw: &str) -> Option<f64> {
    let value = raw.trim();
    if let Some((numerator, denominator)) = value.split_once('/') {
        let numerator = numerator.trim().parse::<f64>().ok()?;
        let denominator = denominator.trim().parse::<f64>().ok()?;
        if denominator.abs() <= f64::EPSILON {
            return None;
        }
        let rate = numerator / denominator;
        return (rate.is_finite() && rate > 0.0).then_some(rate);
    }
    let parsed = value.parse::<f64>().ok()?;
    (parsed.is_finite() && parsed > 0.0).then_some(parsed)
}

fn parse_ffprobe_float(raw: &str) -> Option<f64> {
    let parsed = raw.trim().parse::<f64>().ok()?;
    (parsed.is_finite() && parsed > 0.0).then_some(parsed)
}

fn parse_ffprobe_u64(raw: &str) -> Option<u64> {
    raw.trim().parse::<u64>().ok().filter(|value| *value > 0)
}
