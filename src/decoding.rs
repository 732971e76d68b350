use std::io::{ErrorKind, Read};
use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};

use crate::config::SourceConfig;
use crate::error_codes::PlaybackError;
use crate::frame::RawFrame;
use crate::pipeline::StopSignal;
use crate::probe::{probe_stream, StreamMetadata};

const READER_CHANNEL_CAPACITY: usize = 2;

/// Where decoded pictures come from. Owned and driven by the producer
/// thread only.
pub trait FrameSource: Send {
    fn metadata(&self) -> StreamMetadata;

    /// `Ok(None)` is an empty read: either a transient gap or the end of the
    /// stream. The caller tells them apart by counting consecutive empties.
    fn next_frame(&mut self) -> Result<Option<RawFrame>>;

    fn close(&mut self) -> Result<()> {
        Ok(())
    }

    /// Lets a source that blocks while waiting for data give up once
    /// playback is being stopped.
    fn watch_stop(&mut self, _stop: StopSignal) {}
}

/// Decodes a video file by piping `ffmpeg` rawvideo output through a reader
/// thread.
pub struct FfmpegSource {
    metadata: StreamMetadata,
    decode_width: u32,
    decode_height: u32,
    receiver: Option<mpsc::Receiver<Vec<u8>>>,
    worker: Option<JoinHandle<Result<()>>>,
    child: Option<Child>,
    pending: Option<RawFrame>,
    read_timeout: Duration,
    stop: Option<StopSignal>,
}

impl FfmpegSource {
    pub fn open(input_path: &Path, config: &SourceConfig) -> Result<Self> {
        let metadata = probe_stream(input_path)?;
        let (decode_width, decode_height) =
            decode_dimensions(metadata.width, metadata.height, config.decode_max_width);
        log::debug!(
            "decoding {} at {}x{} (source {}x{}, {:.3} fps, {} frames)",
            input_path.display(),
            decode_width,
            decode_height,
            metadata.width,
            metadata.height,
            metadata.fps,
            metadata.total_frames
        );

        let mut child = Command::new("ffmpeg")
            .arg("-hide_banner")
            .arg("-loglevel")
            .arg("error")
            .arg("-nostdin")
            .arg("-i")
            .arg(input_path)
            .arg("-an")
            .arg("-f")
            .arg("rawvideo")
            .arg("-pix_fmt")
            .arg("rgb24")
            .arg("-s")
            .arg(format!("{}x{}", decode_width, decode_height))
            .arg("-sws_flags")
            .arg("area")
            .arg("-")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|error| {
                PlaybackError::source_open(format!("failed to spawn ffmpeg decoder: {error}"))
            })?;

        let stdout = match child.stdout.take() {
            Some(stdout) => stdout,
            None => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(anyhow!("failed to capture ffmpeg stdout"));
            }
        };

        let mut source = match Self::from_stream(
            metadata,
            (decode_width, decode_height),
            stdout,
            config.read_timeout(),
        ) {
            Ok(source) => source,
            Err(error) => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(error);
            }
        };
        source.child = Some(child);

        // ffmpeg reports unreadable input by exiting without output, so a
        // missing first frame means the file cannot be played at all.
        let first = source.receive(config.open_timeout());
        match first {
            Ok(Some(frame)) => source.pending = Some(frame),
            Ok(None) => {
                let _ = source.close();
                return Err(PlaybackError::source_open(format!(
                    "ffmpeg produced no frames for {}",
                    input_path.display()
                ))
                .into());
            }
            Err(error) => {
                let _ = source.close();
                return Err(error.context(PlaybackError::source_open(format!(
                    "ffmpeg failed while opening {}",
                    input_path.display()
                ))));
            }
        }

        Ok(source)
    }

    /// Reads `width x height` rgb24 frames from `stream` on a reader thread.
    /// The end of `stream` is the end of the video.
    pub fn from_stream<R>(
        metadata: StreamMetadata,
        (decode_width, decode_height): (u32, u32),
        mut stream: R,
        read_timeout: Duration,
    ) -> Result<Self>
    where
        R: Read + Send + 'static,
    {
        let frame_size = decode_width as usize * decode_height as usize * 3;
        let (sender, receiver) = mpsc::sync_channel::<Vec<u8>>(READER_CHANNEL_CAPACITY);

        let worker = thread::Builder::new()
            .name("asciifilm-ffmpeg-reader".to_owned())
            .spawn(move || {
                loop {
                    let mut buffer = vec![0u8; frame_size];
                    match stream.read_exact(&mut buffer) {
                        Ok(()) => {
                            if sender.send(buffer).is_err() {
                                break;
                            }
                        }
                        Err(e) if e.kind() == ErrorKind::UnexpectedEof => break,
                        Err(e) => return Err(anyhow!("failed to read from ffmpeg: {e}")),
                    }
                }
                Ok(())
            })
            .context("failed to spawn ffmpeg reader thread")?;

        Ok(Self {
            metadata,
            decode_width,
            decode_height,
            receiver: Some(receiver),
            worker: Some(worker),
            child: None,
            pending: None,
            read_timeout,
            stop: None,
        })
    }

    fn receive(&mut self, timeout: Duration) -> Result<Option<RawFrame>> {
        let Some(receiver) = &self.receiver else {
            return Ok(None);
        };
        match receiver.recv_timeout(timeout) {
            Ok(buffer) => RawFrame::from_rgb(self.decode_width, self.decode_height, buffer)
                .map(Some)
                .map_err(|error| error.context(PlaybackError::source_read("short frame"))),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => {
                self.receiver = None;
                self.join_worker()?;
                Ok(None)
            }
        }
    }

    fn stop_requested(&self) -> bool {
        self.stop.as_ref().is_some_and(StopSignal::is_raised)
    }

    fn join_worker(&mut self) -> Result<()> {
        let Some(handle) = self.worker.take() else {
            return Ok(());
        };
        match handle.join() {
            Ok(result) => result.map_err(|error| {
                PlaybackError::source_read(format!("{error:#}")).into()
            }),
            Err(_) => Err(PlaybackError::source_read("ffmpeg reader thread panicked").into()),
        }
    }
}

impl FrameSource for FfmpegSource {
    fn metadata(&self) -> StreamMetadata {
        self.metadata
    }

    /// Waits while ffmpeg is still running, however long it stalls. Only the
    /// end of its output (or a stop request) yields an empty read.
    fn next_frame(&mut self) -> Result<Option<RawFrame>> {
        if let Some(frame) = self.pending.take() {
            return Ok(Some(frame));
        }
        let mut stalled = false;
        while self.receiver.is_some() {
            if let Some(frame) = self.receive(self.read_timeout)? {
                return Ok(Some(frame));
            }
            if self.stop_requested() {
                break;
            }
            if !stalled && self.receiver.is_some() {
                stalled = true;
                log::debug!("decoder stalled for over {:?}; still waiting", self.read_timeout);
            }
        }
        Ok(None)
    }

    fn close(&mut self) -> Result<()> {
        // Unblock a reader parked on a full channel before joining it.
        self.receiver = None;
        if let Some(mut child) = self.child.take() {
            let _ = child.kill();
            let _ = child.wait();
        }
        match self.join_worker() {
            // Killing ffmpeg mid-stream makes the pipe read fail; that is
            // expected during shutdown.
            Err(error) => {
                log::debug!("ffmpeg reader ended with {error:#}");
                Ok(())
            }
            Ok(()) => Ok(()),
        }
    }

    fn watch_stop(&mut self, stop: StopSignal) {
        self.stop = Some(stop);
    }
}

impl Drop for FfmpegSource {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

/// Scales the decode size down to at most `max_width` columns of pixels,
/// keeping the aspect ratio. Rendering only needs a few hundred pixels per
/// row, and piping full-resolution RGB through stdout would dominate the
/// producer's time budget.
pub fn decode_dimensions(width: u32, height: u32, max_width: u32) -> (u32, u32) {
    let width = width.max(1);
    let height = height.max(1);
    if width <= max_width {
        return (width, height);
    }
    let scaled_height = (height as f64 * max_width as f64 / width as f64).round() as u32;
    (max_width.max(1), scaled_height.max(1))
}
