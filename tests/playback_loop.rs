mod common;

use std::thread;
use std::time::{Duration, Instant};

use anyhow::Result;

use asciifilm::ascii_render::{ColorMode, FrameRenderer};
use asciifilm::config::PlayerConfig;
use asciifilm::error_codes::{find_playback_error, PlaybackError, PlaybackErrorKind};
use asciifilm::frame::RawFrame;
use asciifilm::geometry::DisplayGeometry;
use asciifilm::player::{PlaybackSession, PlaybackState, SessionOptions};

use common::{MockSource, RecordingDisplay};

fn quiet_options() -> SessionOptions {
    SessionOptions {
        color: false,
        audio: false,
        charset: None,
    }
}

fn error_kind(report: &asciifilm::player::PlaybackReport) -> Option<PlaybackErrorKind> {
    report
        .error
        .as_ref()
        .and_then(find_playback_error)
        .map(|coded| coded.kind)
}

struct BrokenRenderer {
    fail_at: u32,
}

impl FrameRenderer for BrokenRenderer {
    fn render(&self, frame: &RawFrame, _: &DisplayGeometry, _: ColorMode) -> Result<String> {
        if u32::from(frame.pixels()[0]) >= self.fail_at {
            return Err(PlaybackError::render("palette lookup out of range").into());
        }
        Ok("ok\n".to_owned())
    }
}

#[test]
fn ten_frames_then_empty_reads_finish_cleanly() {
    let config = PlayerConfig::default();
    let mut session = PlaybackSession::new(&config, &quiet_options()).unwrap();
    let mut display = RecordingDisplay::new(80, 24);

    let report = session.play(MockSource::new(10), &mut display);

    assert_eq!(report.state, PlaybackState::Finished);
    assert!(report.error.is_none());
    assert!(!report.stopped);
    assert_eq!(report.frames_shown + report.frames_dropped, 10);
    assert_eq!(report.frames_displayed, 10);
    assert_eq!(display.writes.len() as u64, report.frames_shown);
    assert_eq!(session.state(), PlaybackState::Finished);
}

#[test]
fn every_write_carries_frame_and_status() {
    let config = PlayerConfig::default();
    let mut session = PlaybackSession::new(&config, &quiet_options()).unwrap();
    let mut display = RecordingDisplay::new(80, 24);

    let report = session.play(MockSource::new(3).with_fps(1000.0), &mut display);
    assert!(report.is_finished());

    let first = &display.writes[0];
    let lines = first.lines().collect::<Vec<_>>();
    // 32x16 video in an 80x24 terminal renders as 32x8.
    assert_eq!(lines.len(), 9);
    assert!(lines[..8].iter().all(|line| line.len() == 32));
    let status = lines[8];
    assert!(status.contains("frame 1/3"), "{status}");
    assert!(status.contains("grayscale"));
    assert!(status.contains("32x8"));
    assert!(status.contains('%'));
}

#[test]
fn color_mode_emits_truecolor_escapes() {
    let config = PlayerConfig::default();
    let options = SessionOptions {
        color: true,
        ..quiet_options()
    };
    let mut session = PlaybackSession::new(&config, &options).unwrap();
    let mut display = RecordingDisplay::new(80, 24);

    let report = session.play(MockSource::new(2).with_fps(1000.0), &mut display);
    assert!(report.is_finished());
    assert!(display.writes[0].contains("\x1b[38;2;"));
    assert!(display.writes[0].contains("| color |"));
}

#[test]
fn render_failure_aborts_with_render_code() {
    let config = PlayerConfig::default();
    let mut session = PlaybackSession::new(&config, &quiet_options()).unwrap();
    let mut display = RecordingDisplay::new(80, 24);

    // Frame shades step by 20, so the fourth frame (80) is the first to fail.
    let renderer = BrokenRenderer { fail_at: 80 };
    let report = session.play_with(MockSource::new(10), renderer, &mut display);

    assert_eq!(report.state, PlaybackState::Aborted);
    assert_eq!(error_kind(&report), Some(PlaybackErrorKind::Render));
    assert!(display.writes.len() <= 3);
    assert!(display.writes.iter().all(|text| text.starts_with("ok\n")));
}

#[test]
fn source_failure_aborts_with_read_code() {
    let config = PlayerConfig::default();
    let mut session = PlaybackSession::new(&config, &quiet_options()).unwrap();
    let mut display = RecordingDisplay::new(80, 24);

    let report = session.play(MockSource::new(10).failing_at(4), &mut display);

    assert_eq!(report.state, PlaybackState::Aborted);
    assert_eq!(error_kind(&report), Some(PlaybackErrorKind::SourceRead));
}

#[test]
fn display_failure_aborts_with_display_code() {
    let config = PlayerConfig::default();
    let mut session = PlaybackSession::new(&config, &quiet_options()).unwrap();
    let mut display = RecordingDisplay::new(80, 24);
    display.fail_on_write = Some(2);

    let report = session.play(MockSource::new(50), &mut display);

    assert_eq!(report.state, PlaybackState::Aborted);
    assert_eq!(error_kind(&report), Some(PlaybackErrorKind::DisplayWrite));
    assert_eq!(display.writes.len(), 2);
}

#[test]
fn resize_clears_and_later_frames_use_new_width() {
    let config = PlayerConfig::default();
    let mut session = PlaybackSession::new(&config, &quiet_options()).unwrap();
    let mut display = RecordingDisplay::with_sizes(vec![(80, 24), (80, 24), (80, 24), (20, 8)]);

    let report = session.play(MockSource::new(30), &mut display);
    assert!(report.is_finished());

    // Initial clear plus one for the resize.
    assert_eq!(display.clears, 2);
    let last = display.writes.last().unwrap();
    assert_eq!(last.lines().next().unwrap().len(), 19);
    assert!(last.lines().last().unwrap().len() <= 19);
}

#[test]
fn stop_signal_ends_playback_promptly() {
    let config = PlayerConfig::default();
    let mut session = PlaybackSession::new(&config, &quiet_options()).unwrap();
    let stop = session.stop_signal();
    let mut display = RecordingDisplay::new(80, 24);
    let source = MockSource::new(100_000)
        .with_fps(30.0)
        .with_delay(Duration::from_millis(10));

    let (report, latency) = thread::scope(|scope| {
        let player = scope.spawn(|| session.play(source, &mut display));
        thread::sleep(Duration::from_millis(200));
        let raised = Instant::now();
        stop.raise();
        let report = player.join().unwrap();
        (report, raised.elapsed())
    });

    assert_eq!(report.state, PlaybackState::Finished);
    assert!(report.stopped);
    assert!(report.frames_shown > 0);
    assert!(latency <= Duration::from_millis(50), "took {latency:?}");
}

fn dropped_so_far(write: &str) -> u64 {
    let status = write.lines().last().unwrap_or_default();
    status
        .split(" | ")
        .find_map(|field| field.strip_prefix("dropped "))
        .map(|count| count.split(' ').next().unwrap_or("0"))
        .and_then(|count| count.parse().ok())
        .unwrap_or(0)
}

#[test]
fn stalled_display_triggers_bounded_catch_up() {
    let config = PlayerConfig::default();
    let mut session = PlaybackSession::new(&config, &quiet_options()).unwrap();
    // Wide enough that the status line is never shortened.
    let mut display = RecordingDisplay::new(200, 24);
    display.slow_write = Some((3, Duration::from_millis(150)));

    let report = session.play(MockSource::new(60), &mut display);

    assert!(report.is_finished());
    assert!(report.frames_dropped > 0, "{}", report.summary());
    assert_eq!(report.frames_shown + report.frames_dropped, 60);
    assert_eq!(
        report.frames_displayed,
        report.frames_shown + report.frames_dropped
    );

    let mut previous = 0;
    for write in &display.writes {
        let dropped = dropped_so_far(write);
        assert!(dropped >= previous);
        assert!(dropped - previous <= 3, "dropped {} in one cycle", dropped - previous);
        previous = dropped;
    }
    assert!(previous <= report.frames_dropped);
}
