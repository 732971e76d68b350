//! The consumer side of playback: a small state machine that owns the
//! display, pulls rendered frames from the pipeline and paces them against
//! the source frame rate.

use std::fmt;
use std::path::Path;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Error, Result};

use crate::ascii_render::{AsciiRenderer, ColorMode, FrameRenderer};
use crate::audio::AudioProcess;
use crate::config::PlayerConfig;
use crate::decoding::{FfmpegSource, FrameSource};
use crate::display::Display;
use crate::geometry::DisplayGeometry;
use crate::pacing::{PacingController, PacingDecision, PacingPolicy};
use crate::pipeline::{FramePipeline, PipelineOptions, PopResult, StopSignal};
use crate::status::StatusSnapshot;

/// Longest pacing sleep between two looks at the stop signal.
const STOP_POLL_INTERVAL: Duration = Duration::from_millis(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Starting,
    Running,
    Finished,
    Aborted,
}

impl PlaybackState {
    pub fn label(self) -> &'static str {
        match self {
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Finished => "finished",
            Self::Aborted => "aborted",
        }
    }
}

impl fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Default)]
pub struct SessionOptions {
    pub color: bool,
    pub audio: bool,
    /// Palette name; `None` uses the configured default.
    pub charset: Option<String>,
}

/// Outcome of one playback. `error` is set exactly when `state` is
/// [`PlaybackState::Aborted`].
#[derive(Debug)]
pub struct PlaybackReport {
    pub state: PlaybackState,
    /// Frames shown plus frames skipped by catch-up.
    pub frames_displayed: u64,
    pub frames_shown: u64,
    pub frames_dropped: u64,
    pub elapsed: Duration,
    pub average_fps: f64,
    /// Playback ended because the stop signal was raised.
    pub stopped: bool,
    pub error: Option<Error>,
}

impl PlaybackReport {
    fn aborted(error: Error) -> Self {
        Self {
            state: PlaybackState::Aborted,
            frames_displayed: 0,
            frames_shown: 0,
            frames_dropped: 0,
            elapsed: Duration::ZERO,
            average_fps: 0.0,
            stopped: false,
            error: Some(error),
        }
    }

    /// Combines the playback outcome with the result of tearing the display
    /// down afterwards. A playback error always wins; a teardown failure on
    /// top of it is only logged so the first cause reaches the operator.
    pub fn into_result(mut self, teardown: Result<()>) -> Result<Self> {
        match (self.error.take(), teardown) {
            (Some(error), Err(secondary)) => {
                log::warn!("terminal restore also failed: {secondary:#}");
                Err(error)
            }
            (Some(error), Ok(())) => Err(error),
            (None, Err(error)) => Err(error),
            (None, Ok(())) => Ok(self),
        }
    }

    pub fn is_finished(&self) -> bool {
        self.state == PlaybackState::Finished
    }

    pub fn summary(&self) -> String {
        format!(
            "{}: {} frames shown, {} dropped in {:.1}s (avg {:.1} fps)",
            self.state,
            self.frames_shown,
            self.frames_dropped,
            self.elapsed.as_secs_f64(),
            self.average_fps
        )
    }
}

#[derive(Debug, Default)]
struct LoopCounters {
    shown: u64,
    dropped: u64,
    stopped: bool,
}

/// Everything one playback needs, created once by the entry point. The
/// configuration is borrowed; the audio side process is owned and stopped
/// when playback ends or the session is dropped.
pub struct PlaybackSession<'a> {
    config: &'a PlayerConfig,
    mode: ColorMode,
    renderer: AsciiRenderer,
    want_audio: bool,
    audio: Option<AudioProcess>,
    stop: StopSignal,
    state: PlaybackState,
}

impl<'a> PlaybackSession<'a> {
    pub fn new(config: &'a PlayerConfig, options: &SessionOptions) -> Result<Self> {
        let palette = config.resolve_palette(options.charset.as_deref())?;
        let renderer = AsciiRenderer::new(palette)?;
        Ok(Self {
            config,
            mode: ColorMode::from_flag(options.color),
            renderer,
            want_audio: options.audio,
            audio: None,
            stop: StopSignal::new(),
            state: PlaybackState::Starting,
        })
    }

    pub fn mode(&self) -> ColorMode {
        self.mode
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    /// Raising the returned signal ends playback as `Finished` within one
    /// bounded wait.
    pub fn stop_signal(&self) -> StopSignal {
        self.stop.clone()
    }

    /// Opens `path` with ffmpeg, starts audio if requested and plays to the
    /// end. Open failures abort before any frame is shown.
    pub fn play_file<D: Display>(&mut self, path: &Path, display: &mut D) -> PlaybackReport {
        self.transition(PlaybackState::Starting);
        let source = match FfmpegSource::open(path, &self.config.source) {
            Ok(source) => source,
            Err(error) => {
                self.transition(PlaybackState::Aborted);
                return PlaybackReport::aborted(error);
            }
        };
        if self.want_audio {
            self.audio = AudioProcess::spawn(path);
        }
        let report = self.play(source, display);
        self.stop_audio();
        report
    }

    pub fn play<S, D>(&mut self, source: S, display: &mut D) -> PlaybackReport
    where
        S: FrameSource + 'static,
        D: Display,
    {
        let renderer = self.renderer.clone();
        self.play_with(source, renderer, display)
    }

    pub fn play_with<S, R, D>(&mut self, source: S, renderer: R, display: &mut D) -> PlaybackReport
    where
        S: FrameSource + 'static,
        R: FrameRenderer + 'static,
        D: Display,
    {
        self.transition(PlaybackState::Starting);
        let metadata = source.metadata();
        let started = display.size().and_then(|terminal| {
            let geometry = DisplayGeometry::compute(terminal, metadata.width, metadata.height);
            let options = PipelineOptions::from_config(self.config, self.mode);
            log::debug!(
                "starting playback at {} ({}, queue capacity {})",
                geometry.label(),
                self.mode.label(),
                options.capacity
            );
            display.clear()?;
            let pipeline = FramePipeline::spawn(source, renderer, geometry, options)?;
            Ok((geometry, pipeline))
        });
        let (geometry, pipeline) = match started {
            Ok(started) => started,
            Err(error) => {
                self.transition(PlaybackState::Aborted);
                return PlaybackReport::aborted(error);
            }
        };

        let policy = PacingPolicy::from_config(&self.config.pacing);
        let mut pacing = PacingController::new(&metadata, geometry, policy, Instant::now());
        let mut counters = LoopCounters::default();
        self.transition(PlaybackState::Running);

        let loop_result = self.run_loop(
            &pipeline,
            display,
            &mut pacing,
            &mut counters,
            metadata.total_frames,
        );
        pipeline.signal_stop();
        let producer_result = pipeline.finish();

        let error = match (loop_result, producer_result) {
            (Err(error), producer) => {
                if let Err(secondary) = producer {
                    log::debug!("producer also failed: {secondary:#}");
                }
                Some(error)
            }
            (Ok(()), Err(error)) => Some(error),
            (Ok(()), Ok(summary)) => {
                log::debug!(
                    "producer read {} frames, pushed {}, {} empty reads",
                    summary.frames_read,
                    summary.frames_pushed,
                    summary.empty_reads
                );
                None
            }
        };

        let state = if error.is_some() {
            PlaybackState::Aborted
        } else {
            PlaybackState::Finished
        };
        self.transition(state);

        let now = Instant::now();
        let report = PlaybackReport {
            state,
            frames_displayed: pacing.clock().frames_displayed(),
            frames_shown: counters.shown,
            frames_dropped: counters.dropped,
            elapsed: pacing.clock().elapsed_at(now),
            average_fps: pacing.clock().average_fps(now),
            stopped: counters.stopped,
            error,
        };
        log::info!("{}", report.summary());
        report
    }

    fn run_loop<D: Display>(
        &self,
        pipeline: &FramePipeline,
        display: &mut D,
        pacing: &mut PacingController,
        counters: &mut LoopCounters,
        total_frames: u64,
    ) -> Result<()> {
        let pop_timeout = self.config.pacing.pop_timeout();
        let producer_stop = pipeline.stop_signal();

        loop {
            if self.stop.is_raised() {
                counters.stopped = true;
                return Ok(());
            }
            // The producer raises its flag only when it failed; its error
            // surfaces from `finish`.
            if producer_stop.is_raised() {
                return Ok(());
            }

            let terminal = display.size()?;
            if let Some(geometry) = pacing.check_resize(terminal) {
                display.clear()?;
                pipeline.update_geometry(geometry);
            }

            let frame = match pipeline.try_pop(pop_timeout) {
                PopResult::Frame(frame) => frame,
                PopResult::Empty => continue,
                PopResult::Finished => return Ok(()),
            };

            counters.shown += 1;
            pacing.record_displayed();
            let geometry = *pacing.geometry();
            let status = StatusSnapshot {
                average_fps: pacing.clock().average_fps(Instant::now()),
                source_frame_index: frame.metadata.source_frame_index,
                total_frames,
                frames_dropped: counters.dropped,
                mode: self.mode,
                geometry,
            }
            .render_within(status_width(geometry.terminal_width));

            let mut text = frame.into_text();
            text.push_str(&status);
            display.write_at_origin(&text)?;

            match pacing.decide(Instant::now(), pipeline.len()) {
                PacingDecision::Sleep(slack) => self.sleep_unless_stopped(slack, STOP_POLL_INTERVAL),
                PacingDecision::Display => {}
                PacingDecision::CatchUp { drop } => {
                    let dropped = pipeline.drain_up_to(drop);
                    pacing.record_dropped(dropped);
                    counters.dropped += dropped as u64;
                    log::debug!("behind schedule, dropped {dropped} queued frames");
                }
            }
        }
    }

    /// Sleeps in slices no longer than `slice` so a stop request is seen
    /// promptly even at very low frame rates.
    fn sleep_unless_stopped(&self, duration: Duration, slice: Duration) {
        let deadline = Instant::now() + duration;
        let slice = slice.max(Duration::from_millis(1));
        loop {
            if self.stop.is_raised() {
                return;
            }
            let Some(remaining) = deadline.checked_duration_since(Instant::now()) else {
                return;
            };
            if remaining.is_zero() {
                return;
            }
            thread::sleep(remaining.min(slice));
        }
    }

    fn stop_audio(&mut self) {
        if let Some(mut audio) = self.audio.take() {
            audio.stop();
        }
    }

    fn transition(&mut self, next: PlaybackState) {
        if self.state != next {
            log::debug!("playback {} -> {}", self.state, next);
            self.state = next;
        }
    }
}

impl Drop for PlaybackSession<'_> {
    fn drop(&mut self) {
        self.stop_audio();
    }
}

/// Keeps the status line on one row so it never scrolls the frame.
fn status_width(terminal_width: u16) -> usize {
    usize::from(terminal_width.saturating_sub(1)).max(1)
}
