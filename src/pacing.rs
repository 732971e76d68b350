use std::time::{Duration, Instant};

use crate::config::PacingConfig;
use crate::geometry::DisplayGeometry;
use crate::probe::{usable_fps, StreamMetadata};

/// Anchor for presentation times. `frames_displayed` counts frames shown
/// plus frames skipped during catch-up, so the schedule never drifts from
/// `start`.
#[derive(Debug, Clone, Copy)]
pub struct PlaybackClock {
    start: Instant,
    frames_displayed: u64,
}

impl PlaybackClock {
    pub fn new(start: Instant) -> Self {
        Self {
            start,
            frames_displayed: 0,
        }
    }

    pub fn start(&self) -> Instant {
        self.start
    }

    pub fn frames_displayed(&self) -> u64 {
        self.frames_displayed
    }

    pub fn elapsed_at(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.start)
    }

    /// Counted frames per second of wall time, dropped frames included.
    pub fn average_fps(&self, now: Instant) -> f64 {
        let elapsed = self.elapsed_at(now).as_secs_f64();
        if elapsed > 0.0 {
            self.frames_displayed as f64 / elapsed
        } else {
            0.0
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacingPolicy {
    pub sleep_threshold: Duration,
    pub catch_up_threshold: Duration,
    pub max_drop_per_cycle: usize,
}

impl PacingPolicy {
    pub fn from_config(config: &PacingConfig) -> Self {
        Self {
            sleep_threshold: config.sleep_threshold(),
            catch_up_threshold: config.catch_up_threshold(),
            max_drop_per_cycle: config.max_drop_per_cycle,
        }
    }
}

impl Default for PacingPolicy {
    fn default() -> Self {
        Self::from_config(&PacingConfig::default())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacingDecision {
    /// Ahead of schedule by this much.
    Sleep(Duration),
    Display,
    /// Behind by more than the catch-up threshold; discard this many of the
    /// oldest queued frames.
    CatchUp { drop: usize },
}

#[derive(Debug, Clone)]
pub struct PacingController {
    clock: PlaybackClock,
    fps: f64,
    policy: PacingPolicy,
    video_size: (u32, u32),
    terminal_size: (u16, u16),
    geometry: DisplayGeometry,
}

impl PacingController {
    pub fn new(
        metadata: &StreamMetadata,
        geometry: DisplayGeometry,
        policy: PacingPolicy,
        start: Instant,
    ) -> Self {
        Self {
            clock: PlaybackClock::new(start),
            fps: usable_fps(metadata.fps),
            policy,
            video_size: (metadata.width, metadata.height),
            terminal_size: geometry.terminal_size(),
            geometry,
        }
    }

    pub fn clock(&self) -> &PlaybackClock {
        &self.clock
    }

    pub fn geometry(&self) -> &DisplayGeometry {
        &self.geometry
    }

    /// Returns the new geometry when the terminal changed size since the
    /// last check. The caller must clear the screen before the next write.
    pub fn check_resize(&mut self, terminal: (u16, u16)) -> Option<DisplayGeometry> {
        if terminal == self.terminal_size {
            return None;
        }
        self.terminal_size = terminal;
        self.geometry = DisplayGeometry::compute(terminal, self.video_size.0, self.video_size.1);
        log::debug!(
            "terminal resized to {}x{}, rendering at {}",
            terminal.0,
            terminal.1,
            self.geometry.label()
        );
        Some(self.geometry)
    }

    /// `start + frames_displayed / fps`. Computed from the frame count each
    /// time rather than accumulated.
    pub fn target_time(&self) -> Instant {
        self.clock.start
            + Duration::from_secs_f64(self.clock.frames_displayed as f64 / self.fps)
    }

    pub fn decide(&self, now: Instant, queued: usize) -> PacingDecision {
        let target = self.target_time();
        if let Some(ahead) = target.checked_duration_since(now) {
            if ahead > self.policy.sleep_threshold {
                return PacingDecision::Sleep(ahead);
            }
            return PacingDecision::Display;
        }

        let behind = now.saturating_duration_since(target);
        if behind > self.policy.catch_up_threshold {
            let drop = self.policy.max_drop_per_cycle.min(queued / 2);
            if drop > 0 {
                return PacingDecision::CatchUp { drop };
            }
        }
        PacingDecision::Display
    }

    pub fn record_displayed(&mut self) {
        self.clock.frames_displayed += 1;
    }

    /// Advances the anchor past frames removed by catch-up.
    pub fn record_dropped(&mut self, dropped: usize) {
        self.clock.frames_displayed += dropped as u64;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MS: Duration = Duration::from_millis(1);

    fn controller(start: Instant) -> PacingController {
        let metadata = StreamMetadata::new(30.0, 1920, 1080, 1000);
        let geometry = DisplayGeometry::compute((120, 40), 1920, 1080);
        PacingController::new(&metadata, geometry, PacingPolicy::default(), start)
    }

    /// Deterministic 0..=20ms delays.
    struct DelayGen(u64);

    impl DelayGen {
        fn next(&mut self) -> Duration {
            self.0 = self
                .0
                .wrapping_mul(6_364_136_223_846_793_005)
                .wrapping_add(1_442_695_040_888_963_407);
            Duration::from_micros((self.0 >> 33) % 20_001)
        }
    }

    fn abs_diff(a: Instant, b: Instant) -> Duration {
        a.checked_duration_since(b)
            .unwrap_or_else(|| b.duration_since(a))
    }

    #[test]
    fn target_stays_anchored_over_a_thousand_frames() {
        let start = Instant::now();
        let mut pacing = controller(start);
        let mut delays = DelayGen(7);
        let mut now = start;

        for k in 1..=1000u64 {
            now += delays.next();
            pacing.record_displayed();

            let expected = start + Duration::from_secs_f64(k as f64 / 30.0);
            assert!(abs_diff(pacing.target_time(), expected) <= 5 * MS, "frame {k}");

            match pacing.decide(now, 5) {
                PacingDecision::Sleep(slack) => now += slack,
                PacingDecision::Display => {}
                PacingDecision::CatchUp { .. } => panic!("never behind at frame {k}"),
            }
        }

        let ideal = start + Duration::from_secs_f64(1000.0 / 30.0);
        assert!(abs_diff(now, ideal) <= 5 * MS);
    }

    #[test]
    fn one_slow_frame_does_not_shift_the_schedule() {
        let start = Instant::now();
        let mut pacing = controller(start);
        pacing.record_displayed();
        let late = start + 60 * MS;
        assert_eq!(pacing.decide(late, 0), PacingDecision::Display);

        pacing.record_displayed();
        let expected = start + Duration::from_secs_f64(2.0 / 30.0);
        assert!(abs_diff(pacing.target_time(), expected) < MS);
    }

    #[test]
    fn small_slack_displays_immediately() {
        let start = Instant::now();
        let mut pacing = controller(start);
        pacing.record_displayed();
        let target = pacing.target_time();
        assert_eq!(pacing.decide(target, 4), PacingDecision::Display);
        assert_eq!(pacing.decide(target + 50 * MS, 4), PacingDecision::Display);
        assert_eq!(
            pacing.decide(target - 10 * MS, 4),
            PacingDecision::Sleep(10 * MS)
        );
    }

    #[test]
    fn catch_up_drops_at_most_three_and_at_most_half_the_queue() {
        let start = Instant::now();
        let mut pacing = controller(start);
        pacing.record_displayed();
        let behind = pacing.target_time() + 150 * MS;

        assert_eq!(pacing.decide(behind, 10), PacingDecision::CatchUp { drop: 3 });
        assert_eq!(pacing.decide(behind, 5), PacingDecision::CatchUp { drop: 2 });
        assert_eq!(pacing.decide(behind, 1), PacingDecision::Display);
    }

    #[test]
    fn drops_advance_the_anchor_by_exactly_the_count() {
        let start = Instant::now();
        let mut pacing = controller(start);
        for _ in 0..3 {
            pacing.record_displayed();
        }
        let behind = start + 400 * MS;
        let PacingDecision::CatchUp { drop } = pacing.decide(behind, 5) else {
            panic!("expected catch-up");
        };
        pacing.record_dropped(drop);
        assert_eq!(pacing.clock().frames_displayed(), 3 + drop as u64);

        let expected = start + Duration::from_secs_f64(5.0 / 30.0);
        assert!(abs_diff(pacing.target_time(), expected) < MS);
    }

    #[test]
    fn resize_is_reported_once_per_change() {
        let mut pacing = controller(Instant::now());
        assert_eq!(pacing.check_resize((120, 40)), None);

        let resized = pacing.check_resize((80, 24)).expect("size changed");
        assert!(resized.ascii_width <= 79 && resized.ascii_height <= 23);
        assert_eq!(pacing.geometry(), &resized);
        assert_eq!(pacing.check_resize((80, 24)), None);
    }

    #[test]
    fn degenerate_rate_in_hand_built_metadata_does_not_overflow() {
        let start = Instant::now();
        let metadata = StreamMetadata {
            fps: 1e-20,
            width: 64,
            height: 32,
            total_frames: 0,
        };
        let geometry = DisplayGeometry::compute((80, 24), 64, 32);
        let mut pacing = PacingController::new(&metadata, geometry, PacingPolicy::default(), start);
        pacing.record_displayed();
        let expected = start + Duration::from_secs_f64(1.0 / 30.0);
        assert!(abs_diff(pacing.target_time(), expected) < MS);
    }

    #[test]
    fn average_fps_counts_drops() {
        let start = Instant::now();
        let mut pacing = controller(start);
        pacing.record_displayed();
        pacing.record_dropped(3);
        let fps = pacing.clock().average_fps(start + Duration::from_secs(2));
        assert!((fps - 2.0).abs() < 1e-9);
        assert_eq!(pacing.clock().average_fps(start), 0.0);
    }
}
