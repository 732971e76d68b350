//! Bounded producer/consumer hand-off between decoding and display.
//!
//! One producer thread pulls from a [`FrameSource`], renders through a
//! [`FrameRenderer`] and pushes into a bounded channel. The playback loop is
//! the single consumer. Closing the channel (dropping the sender) is the
//! "producer done" signal; a shared [`StopSignal`] is the only other state
//! crossing the thread boundary.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use crossbeam_channel::{bounded, unbounded, Receiver, RecvTimeoutError, SendTimeoutError, Sender};

use crate::ascii_render::{ColorMode, FrameRenderer};
use crate::config::PlayerConfig;
use crate::decoding::FrameSource;
use crate::frame::{FrameMetadata, RenderedFrame};
use crate::geometry::DisplayGeometry;

/// Cooperative cancellation flag. Raising it is idempotent; both halves of
/// the pipeline poll it between bounded waits.
#[derive(Debug, Clone, Default)]
pub struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn raise(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_raised(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

#[derive(Debug)]
pub enum PopResult {
    Frame(RenderedFrame),
    /// Nothing arrived within the timeout; the producer is still running.
    Empty,
    /// The producer is done and every queued frame has been taken.
    Finished,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    Pushed,
    Stopped,
    ConsumerGone,
}

#[derive(Debug, Clone, Copy)]
pub struct PipelineOptions {
    pub capacity: usize,
    pub mode: ColorMode,
    pub max_empty_reads: u32,
    pub empty_read_backoff: Duration,
    pub push_retry: Duration,
}

impl PipelineOptions {
    pub fn from_config(config: &PlayerConfig, mode: ColorMode) -> Self {
        Self {
            capacity: config.buffer.capacity_for(mode.is_color()),
            mode,
            max_empty_reads: config.source.max_empty_reads,
            empty_read_backoff: config.source.empty_read_backoff(),
            push_retry: config.source.push_retry(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProducerSummary {
    pub frames_read: u64,
    pub frames_pushed: u64,
    pub empty_reads: u64,
    /// The stop signal ended production before the stream ran out.
    pub stopped_early: bool,
}

/// Producer half of the queue.
pub struct FrameSender {
    sender: Sender<RenderedFrame>,
    stop: StopSignal,
    retry: Duration,
}

impl FrameSender {
    /// Blocks while the queue is full, waking every `retry` to look at the
    /// stop signal. No lock is held while waiting.
    pub fn push(&self, mut frame: RenderedFrame) -> PushOutcome {
        loop {
            if self.stop.is_raised() {
                return PushOutcome::Stopped;
            }
            match self.sender.send_timeout(frame, self.retry) {
                Ok(()) => return PushOutcome::Pushed,
                Err(SendTimeoutError::Timeout(returned)) => frame = returned,
                Err(SendTimeoutError::Disconnected(_)) => return PushOutcome::ConsumerGone,
            }
        }
    }
}

/// Consumer half of the queue plus ownership of the producer thread.
pub struct FramePipeline {
    receiver: Receiver<RenderedFrame>,
    geometry_tx: Option<Sender<DisplayGeometry>>,
    stop: StopSignal,
    producer: Option<JoinHandle<Result<ProducerSummary>>>,
    capacity: usize,
}

impl FramePipeline {
    /// A bare queue with no producer thread attached; the caller drives the
    /// returned [`FrameSender`] itself.
    pub fn channel(capacity: usize, retry: Duration) -> (FrameSender, Self) {
        let capacity = capacity.max(1);
        let (sender, receiver) = bounded(capacity);
        let stop = StopSignal::new();
        let frame_sender = FrameSender {
            sender,
            stop: stop.clone(),
            retry,
        };
        let pipeline = Self {
            receiver,
            geometry_tx: None,
            stop,
            producer: None,
            capacity,
        };
        (frame_sender, pipeline)
    }

    pub fn spawn<S, R>(
        source: S,
        renderer: R,
        geometry: DisplayGeometry,
        options: PipelineOptions,
    ) -> Result<Self>
    where
        S: FrameSource + 'static,
        R: FrameRenderer + 'static,
    {
        let mut source = source;
        let (frame_sender, mut pipeline) = Self::channel(options.capacity, options.push_retry);
        source.watch_stop(pipeline.stop_signal());
        let (geometry_tx, geometry_rx) = unbounded();
        let producer = Producer {
            source,
            renderer,
            frames: frame_sender,
            geometry_rx,
            geometry,
            options,
        };

        let handle = thread::Builder::new()
            .name("asciifilm-producer".to_owned())
            .spawn(move || producer.run())
            .context("failed to spawn frame producer thread")?;

        pipeline.geometry_tx = Some(geometry_tx);
        pipeline.producer = Some(handle);
        Ok(pipeline)
    }

    /// Waits up to `timeout` for the oldest frame.
    pub fn try_pop(&self, timeout: Duration) -> PopResult {
        match self.receiver.recv_timeout(timeout) {
            Ok(frame) => PopResult::Frame(frame),
            Err(RecvTimeoutError::Timeout) => PopResult::Empty,
            Err(RecvTimeoutError::Disconnected) => PopResult::Finished,
        }
    }

    /// Discards up to `count` of the oldest queued frames and returns how
    /// many were actually removed. Only the consumer takes from the queue,
    /// so nothing can interleave with the drain.
    pub fn drain_up_to(&self, count: usize) -> usize {
        let mut dropped = 0;
        while dropped < count {
            if self.receiver.try_recv().is_err() {
                break;
            }
            dropped += 1;
        }
        dropped
    }

    pub fn signal_stop(&self) {
        self.stop.raise();
    }

    pub fn stop_signal(&self) -> StopSignal {
        self.stop.clone()
    }

    /// Frames rendered after this call use the new geometry; frames already
    /// queued keep the size they were rendered at.
    pub fn update_geometry(&self, geometry: DisplayGeometry) {
        if let Some(geometry_tx) = &self.geometry_tx {
            let _ = geometry_tx.send(geometry);
        }
    }

    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Stops the producer, joins it and returns its outcome. A render or
    /// source failure inside the producer surfaces here.
    pub fn finish(mut self) -> Result<ProducerSummary> {
        self.join_producer()
    }

    fn join_producer(&mut self) -> Result<ProducerSummary> {
        self.signal_stop();
        let Some(handle) = self.producer.take() else {
            return Ok(ProducerSummary::default());
        };
        match handle.join() {
            Ok(result) => result,
            Err(_) => Err(anyhow!("frame producer thread panicked")),
        }
    }
}

impl Drop for FramePipeline {
    fn drop(&mut self) {
        if self.producer.is_some() {
            if let Err(error) = self.join_producer() {
                log::debug!("producer ended with {error:#} during teardown");
            }
        }
    }
}

struct Producer<S, R> {
    source: S,
    renderer: R,
    frames: FrameSender,
    geometry_rx: Receiver<DisplayGeometry>,
    geometry: DisplayGeometry,
    options: PipelineOptions,
}

impl<S: FrameSource, R: FrameRenderer> Producer<S, R> {
    fn run(mut self) -> Result<ProducerSummary> {
        let result = self.produce();
        if let Err(error) = &result {
            log::error!("frame producer aborted: {error:#}");
            self.frames.stop.raise();
        }
        if let Err(error) = self.source.close() {
            log::warn!("failed to close frame source: {error:#}");
        }
        // Dropping `self.frames` here closes the channel.
        result
    }

    fn produce(&mut self) -> Result<ProducerSummary> {
        let mut summary = ProducerSummary::default();
        let mut consecutive_empty = 0u32;

        while !self.frames.stop.is_raised() {
            if let Some(latest) = self.geometry_rx.try_iter().last() {
                self.geometry = latest;
            }

            let Some(raw) = self.source.next_frame()? else {
                consecutive_empty += 1;
                summary.empty_reads += 1;
                if consecutive_empty >= self.options.max_empty_reads {
                    log::info!(
                        "stream exhausted after {} frames ({} consecutive empty reads)",
                        summary.frames_read,
                        consecutive_empty
                    );
                    return Ok(summary);
                }
                log::debug!(
                    "empty read {}/{} after frame {}",
                    consecutive_empty,
                    self.options.max_empty_reads,
                    summary.frames_read
                );
                thread::sleep(self.options.empty_read_backoff);
                continue;
            };

            consecutive_empty = 0;
            summary.frames_read += 1;
            let text = self
                .renderer
                .render(&raw, &self.geometry, self.options.mode)
                .with_context(|| format!("failed to render source frame {}", summary.frames_read))?;
            let frame = RenderedFrame::new(text).with_metadata(FrameMetadata {
                sequence: summary.frames_pushed + 1,
                source_frame_index: summary.frames_read,
                columns: self.geometry.ascii_width,
                rows: self.geometry.ascii_height,
            });

            match self.frames.push(frame) {
                PushOutcome::Pushed => summary.frames_pushed += 1,
                PushOutcome::Stopped => break,
                PushOutcome::ConsumerGone => {
                    log::debug!("consumer went away; producer exiting");
                    return Ok(summary);
                }
            }
        }

        summary.stopped_early = true;
        Ok(summary)
    }
}
