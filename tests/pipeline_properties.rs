mod common;

use std::thread;
use std::time::{Duration, Instant};

use asciifilm::ascii_render::{AsciiRenderer, ColorMode};
use asciifilm::config::PlayerConfig;
use asciifilm::frame::RenderedFrame;
use asciifilm::geometry::DisplayGeometry;
use asciifilm::pipeline::{FramePipeline, PipelineOptions, PopResult, PushOutcome};

use common::MockSource;

fn drain(pipeline: &FramePipeline) -> Vec<RenderedFrame> {
    let mut frames = Vec::new();
    loop {
        match pipeline.try_pop(Duration::from_millis(50)) {
            PopResult::Frame(frame) => frames.push(frame),
            PopResult::Empty => {}
            PopResult::Finished => return frames,
        }
    }
}

#[test]
fn queue_never_exceeds_capacity_and_stays_fifo() {
    for capacity in [1usize, 2, 5] {
        let (sender, pipeline) = FramePipeline::channel(capacity, Duration::from_millis(1));
        let producer = thread::spawn(move || {
            for index in 0..200u64 {
                let frame = RenderedFrame::new(index.to_string());
                assert_eq!(sender.push(frame), PushOutcome::Pushed);
            }
        });

        let mut expected = 0u64;
        loop {
            assert!(pipeline.len() <= capacity);
            match pipeline.try_pop(Duration::from_millis(20)) {
                PopResult::Frame(frame) => {
                    assert_eq!(frame.text(), expected.to_string());
                    expected += 1;
                    if expected % 17 == 0 {
                        thread::sleep(Duration::from_millis(2));
                    }
                }
                PopResult::Empty => {}
                PopResult::Finished => break,
            }
        }
        producer.join().unwrap();
        assert_eq!(expected, 200, "capacity {capacity}");
    }
}

#[test]
fn catch_up_drops_oldest_and_keeps_order_of_the_rest() {
    let (sender, pipeline) = FramePipeline::channel(5, Duration::from_millis(1));
    for index in 0..5 {
        sender.push(RenderedFrame::new(index.to_string()));
    }
    drop(sender);

    assert_eq!(pipeline.drain_up_to(3usize.min(pipeline.len() / 2)), 2);
    let rest = drain(&pipeline);
    let texts = rest.iter().map(RenderedFrame::text).collect::<Vec<_>>();
    assert_eq!(texts, vec!["2", "3", "4"]);
}

#[test]
fn mock_source_of_ten_frames_ends_without_error() {
    let config = PlayerConfig::default();
    let renderer = AsciiRenderer::new(config.resolve_palette(None).unwrap()).unwrap();
    let geometry = DisplayGeometry::compute((80, 24), 32, 16);
    let options = PipelineOptions::from_config(&config, ColorMode::Grayscale);
    assert_eq!(options.capacity, 5);

    let pipeline = FramePipeline::spawn(MockSource::new(10), renderer, geometry, options).unwrap();
    let frames = drain(&pipeline);

    assert_eq!(frames.len(), 10);
    let indices = frames
        .iter()
        .map(|frame| frame.metadata.source_frame_index)
        .collect::<Vec<_>>();
    assert_eq!(indices, (1..=10).collect::<Vec<_>>());

    let summary = pipeline.finish().unwrap();
    assert_eq!(summary.frames_read, 10);
    assert_eq!(summary.empty_reads, 5);
    assert!(!summary.stopped_early);
}

#[test]
fn color_mode_buffers_less() {
    let config = PlayerConfig::default();
    let options = PipelineOptions::from_config(&config, ColorMode::TrueColor);
    assert_eq!(options.capacity, 2);
}

#[test]
fn stop_reaches_a_slow_producer_within_one_wait() {
    let config = PlayerConfig::default();
    let renderer = AsciiRenderer::new(" .#").unwrap();
    let geometry = DisplayGeometry::compute((80, 24), 32, 16);
    let options = PipelineOptions::from_config(&config, ColorMode::Grayscale);
    let source = MockSource::new(100_000).with_delay(Duration::from_millis(20));

    let pipeline = FramePipeline::spawn(source, renderer, geometry, options).unwrap();
    // Let the queue fill so the producer is parked in `push`.
    thread::sleep(Duration::from_millis(200));

    let started = Instant::now();
    pipeline.signal_stop();
    let summary = pipeline.finish().unwrap();
    assert!(summary.stopped_early);
    assert!(started.elapsed() <= Duration::from_millis(50), "{:?}", started.elapsed());
}
