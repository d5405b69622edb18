//! Visual countdown: a fixed-duration timer bound to a progress indicator
//! and the looping tick sound. Gates the answer reveal.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use tracing::debug;

use crate::playback::audio::AudioPlayer;

/// The on-air countdown length.
pub const COUNTDOWN_DURATION: Duration = Duration::from_secs(5);

/// Animation resolution. Small enough to read as continuous, not stepped.
const TICK_RESOLUTION: Duration = Duration::from_millis(50);

/// Progress indicator driven by the countdown.
pub trait CountdownDisplay: Send + Sync {
    /// Force the indicator back to full, discarding any in-flight animation
    /// state from a previous run. Called before every run.
    fn rearm(&self);

    /// Update the indicator; `fraction` goes from 1.0 (full) to 0.0 (empty).
    fn set_remaining(&self, fraction: f64);

    /// The run ended (elapsed or cancelled); release the indicator.
    fn finish(&self);
}

/// indicatif-backed countdown bar.
pub struct BarDisplay {
    bar: ProgressBar,
}

/// Indicator resolution in bar units.
const BAR_UNITS: u64 = 100;

impl BarDisplay {
    pub fn new() -> Self {
        let bar = ProgressBar::new(BAR_UNITS);
        bar.set_style(
            ProgressStyle::default_bar()
                .template("  ⏱  [{bar:40.yellow/black}]")
                .unwrap_or_else(|_| ProgressStyle::default_bar()),
        );
        Self { bar }
    }
}

impl Default for BarDisplay {
    fn default() -> Self {
        Self::new()
    }
}

impl CountdownDisplay for BarDisplay {
    fn rearm(&self) {
        self.bar.reset();
        self.bar.set_position(BAR_UNITS);
    }

    fn set_remaining(&self, fraction: f64) {
        self.bar
            .set_position((fraction.clamp(0.0, 1.0) * BAR_UNITS as f64) as u64);
    }

    fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

/// Runs the fixed-duration countdown. The tick sound is started and stopped
/// with the timer's lifetime, independent of any narration.
pub struct Countdown {
    duration: Duration,
    display: Arc<dyn CountdownDisplay>,
    player: Arc<dyn AudioPlayer>,
    cancelled: Arc<AtomicBool>,
}

impl Countdown {
    pub fn new(
        display: Arc<dyn CountdownDisplay>,
        player: Arc<dyn AudioPlayer>,
        cancelled: Arc<AtomicBool>,
    ) -> Self {
        Self {
            duration: COUNTDOWN_DURATION,
            display,
            player,
            cancelled,
        }
    }

    /// Override the duration (tests use short timers).
    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }

    /// Run one countdown to completion. Returns true when the full duration
    /// elapsed, false when cancelled mid-run. Always re-arms the display
    /// first, so back-to-back runs each animate the full range.
    pub async fn run(&self) -> bool {
        self.display.rearm();
        self.display.set_remaining(1.0);
        self.player.start_tick();

        let started = tokio::time::Instant::now();
        let mut interval = tokio::time::interval(TICK_RESOLUTION);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        let elapsed_fully = loop {
            interval.tick().await;

            if self.cancelled.load(Ordering::Relaxed) {
                debug!("Countdown cancelled");
                break false;
            }

            let elapsed = started.elapsed();
            if elapsed >= self.duration {
                break true;
            }

            let remaining = 1.0 - elapsed.as_secs_f64() / self.duration.as_secs_f64();
            self.display.set_remaining(remaining.max(0.0));
        };

        self.player.stop_tick();
        if elapsed_fully {
            self.display.set_remaining(0.0);
        }
        self.display.finish();

        elapsed_fully
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::AudioHandle;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingDisplay {
        rearms: AtomicUsize,
        fractions: Mutex<Vec<f64>>,
        finishes: AtomicUsize,
    }

    impl CountdownDisplay for RecordingDisplay {
        fn rearm(&self) {
            self.rearms.fetch_add(1, Ordering::SeqCst);
            self.fractions.lock().unwrap().clear();
        }

        fn set_remaining(&self, fraction: f64) {
            self.fractions.lock().unwrap().push(fraction);
        }

        fn finish(&self) {
            self.finishes.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[derive(Default)]
    struct NoopPlayer {
        tick_starts: AtomicUsize,
        tick_stops: AtomicUsize,
    }

    #[async_trait]
    impl AudioPlayer for NoopPlayer {
        async fn play(&self, _handle: &AudioHandle) {}
        fn stop_all(&self) {}
        fn start_tick(&self) {
            self.tick_starts.fetch_add(1, Ordering::SeqCst);
        }
        fn stop_tick(&self) {
            self.tick_stops.fetch_add(1, Ordering::SeqCst);
        }
        fn cue(&self, _cue: crate::playback::audio::Cue) {}
    }

    fn countdown(
        duration: Duration,
    ) -> (Countdown, Arc<RecordingDisplay>, Arc<NoopPlayer>, Arc<AtomicBool>) {
        let display = Arc::new(RecordingDisplay::default());
        let player = Arc::new(NoopPlayer::default());
        let cancelled = Arc::new(AtomicBool::new(false));
        let countdown = Countdown::new(
            Arc::clone(&display) as Arc<dyn CountdownDisplay>,
            Arc::clone(&player) as Arc<dyn AudioPlayer>,
            Arc::clone(&cancelled),
        )
        .with_duration(duration);
        (countdown, display, player, cancelled)
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_takes_exactly_the_configured_duration() {
        let (countdown, _display, player, _cancelled) = countdown(Duration::from_secs(5));

        let started = tokio::time::Instant::now();
        assert!(countdown.run().await);
        let elapsed = started.elapsed();

        assert!(elapsed >= Duration::from_secs(5));
        assert!(elapsed < Duration::from_secs(6));
        assert_eq!(player.tick_starts.load(Ordering::SeqCst), 1);
        assert_eq!(player.tick_stops.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_consecutive_runs_each_animate_full_range() {
        let (countdown, display, _player, _cancelled) = countdown(Duration::from_millis(500));

        for expected_rearms in 1..=2 {
            assert!(countdown.run().await);
            assert_eq!(display.rearms.load(Ordering::SeqCst), expected_rearms);

            let fractions = display.fractions.lock().unwrap();
            let first = *fractions.first().unwrap();
            let last = *fractions.last().unwrap();
            assert!(first >= 0.99, "run did not start full: {first}");
            assert!(last <= 0.01, "run did not drain: {last}");
        }
        assert_eq!(display.finishes.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_run_stops_tick_and_reports_not_elapsed() {
        let (countdown, _display, player, cancelled) = countdown(Duration::from_secs(5));

        cancelled.store(true, Ordering::Relaxed);
        assert!(!countdown.run().await);
        assert_eq!(player.tick_stops.load(Ordering::SeqCst), 1);
    }
}
