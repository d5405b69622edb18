//! The playback engine: drains the step queue sequentially, one step fully
//! finishing before the next begins, and tears everything down atomically on
//! cancellation.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::Notify;
use tracing::{debug, info, warn};

use crate::error::{QuizcastError, Result};
use crate::media::AudioKey;
use crate::playback::audio::{AudioPlayer, Cue};
use crate::playback::countdown::Countdown;
use crate::playback::steps::{build_steps, PlaybackStep};
use crate::screen::{describe_missing_audio, Screen, ScreenController};
use crate::session::GameSession;

/// Pacing between the narrated beats of the show. All pauses are interrupted
/// immediately by cancellation.
#[derive(Debug, Clone, Copy)]
pub struct TimingProfile {
    /// After the pre-game screen appears, before the welcome narration.
    pub welcome_settle: Duration,
    /// After a question scrolls into view, before its narration.
    pub focus_settle: Duration,
    /// After a non-final reveal narration, before the next question.
    pub between_questions: Duration,
    /// After the final reveal narration, before the outro.
    pub after_final_answer: Duration,
    /// After the finalization screen appears, before the closing CTA.
    pub outro_settle: Duration,
    /// After the closing CTA, before the show is declared finished.
    pub outro_trailing: Duration,
}

impl Default for TimingProfile {
    fn default() -> Self {
        Self {
            welcome_settle: Duration::from_millis(300),
            focus_settle: Duration::from_millis(500),
            between_questions: Duration::from_secs(2),
            after_final_answer: Duration::from_secs(1),
            outro_settle: Duration::from_millis(300),
            outro_trailing: Duration::from_secs(1),
        }
    }
}

impl TimingProfile {
    /// All pauses collapsed to zero; tests drain shows instantly.
    pub fn instant() -> Self {
        Self {
            welcome_settle: Duration::ZERO,
            focus_settle: Duration::ZERO,
            between_questions: Duration::ZERO,
            after_final_answer: Duration::ZERO,
            outro_settle: Duration::ZERO,
            outro_trailing: Duration::ZERO,
        }
    }
}

/// Recording lifecycle as the orchestrator sees it. Implemented by the
/// capture controller; the orchestrator never drives recording directly, it
/// only reports availability and forces a stop on cancel.
pub trait RecordingHook: Send + Sync {
    fn is_recording(&self) -> bool;
    fn force_stop(&self);
}

/// Snapshot of the engine, readable at any time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OrchestratorState {
    /// A drain is in flight.
    pub processing: bool,
    /// The step currently executing, if any.
    pub current_step: Option<PlaybackStep>,
    /// Steps still queued behind the current one.
    pub remaining: usize,
    /// A recording hook is attached and reports an active recording.
    pub recording: bool,
}

struct Inner {
    queue: VecDeque<PlaybackStep>,
    processing: bool,
    current_step: Option<PlaybackStep>,
}

/// Sequential playback engine. One instance presents one show at a time;
/// [`Orchestrator::cancel`] is callable from any thread (signal handlers
/// included) and is idempotent.
pub struct Orchestrator {
    player: Arc<dyn AudioPlayer>,
    screens: Arc<dyn ScreenController>,
    countdown: Countdown,
    timing: TimingProfile,
    cancelled: Arc<AtomicBool>,
    cancel_notify: Notify,
    inner: Mutex<Inner>,
    recording: Mutex<Option<Arc<dyn RecordingHook>>>,
}

impl Orchestrator {
    /// `cancelled` must be the same flag handed to `countdown`, so one store
    /// interrupts both the engine and any countdown mid-run.
    pub fn new(
        player: Arc<dyn AudioPlayer>,
        screens: Arc<dyn ScreenController>,
        countdown: Countdown,
        timing: TimingProfile,
        cancelled: Arc<AtomicBool>,
    ) -> Self {
        Self {
            player,
            screens,
            countdown,
            timing,
            cancelled,
            cancel_notify: Notify::new(),
            inner: Mutex::new(Inner {
                queue: VecDeque::new(),
                processing: false,
                current_step: None,
            }),
            recording: Mutex::new(None),
        }
    }

    /// Attach the recording lifecycle for this run.
    pub fn attach_recording(&self, hook: Arc<dyn RecordingHook>) {
        *self.recording.lock().unwrap() = Some(hook);
    }

    pub fn detach_recording(&self) {
        *self.recording.lock().unwrap() = None;
    }

    pub fn state(&self) -> OrchestratorState {
        let inner = self.inner.lock().unwrap();
        OrchestratorState {
            processing: inner.processing,
            current_step: inner.current_step,
            remaining: inner.queue.len(),
            recording: self
                .recording
                .lock()
                .unwrap()
                .as_ref()
                .is_some_and(|hook| hook.is_recording()),
        }
    }

    /// Present the session's show from intro to finalization. Returns
    /// [`QuizcastError::Cancelled`] when interrupted mid-run, and
    /// [`QuizcastError::ShowInProgress`] when a drain is already in flight.
    pub async fn present(&self, session: &GameSession) -> Result<()> {
        let quiz = session.quiz().cloned().ok_or_else(|| {
            QuizcastError::ContentMissing("generate a quiz before starting the show".to_string())
        })?;
        if !session.store().is_ready() {
            return Err(QuizcastError::ContentMissing(
                "no narration audio installed".to_string(),
            ));
        }

        {
            let mut inner = self.inner.lock().unwrap();
            if inner.processing {
                return Err(QuizcastError::ShowInProgress);
            }
            inner.processing = true;
            inner.current_step = None;
            inner.queue = build_steps(quiz.len());
        }
        self.cancelled.store(false, Ordering::SeqCst);

        info!(
            "Show starting: {} questions, {} steps",
            quiz.len(),
            2 * quiz.len() + 2
        );

        loop {
            let step = {
                let mut inner = self.inner.lock().unwrap();
                if self.cancelled.load(Ordering::SeqCst) {
                    inner.queue.clear();
                    inner.current_step = None;
                    None
                } else {
                    let step = inner.queue.pop_front();
                    inner.current_step = step;
                    step
                }
            };
            let Some(step) = step else { break };

            debug!("Step: {}", step);
            match step {
                PlaybackStep::Intro => self.run_intro(session).await,
                PlaybackStep::Question(i) => self.run_question(session, &quiz, i).await,
                PlaybackStep::Answer(i) => self.run_answer(session, &quiz, i).await,
                PlaybackStep::Outro => self.run_outro(session).await,
            }
        }

        let was_cancelled = self.cancelled.load(Ordering::SeqCst);
        {
            let mut inner = self.inner.lock().unwrap();
            inner.processing = false;
            inner.current_step = None;
            inner.queue.clear();
        }

        if was_cancelled {
            info!("Show cancelled");
            Err(QuizcastError::Cancelled)
        } else {
            info!("Show finished");
            Ok(())
        }
    }

    /// Tear the show down: interrupt the current clip and the tick loop,
    /// empty the queue, wake every pending pause, and force-stop recording.
    /// Safe to call from any thread, at any time, repeatedly.
    pub fn cancel(&self) {
        let already = self.cancelled.swap(true, Ordering::SeqCst);

        self.player.stop_all();
        self.player.stop_tick();
        {
            let mut inner = self.inner.lock().unwrap();
            inner.queue.clear();
        }
        let hook = self.recording.lock().unwrap().clone();
        if let Some(hook) = hook {
            hook.force_stop();
        }
        self.cancel_notify.notify_waiters();

        if !already {
            debug!("Cancellation requested, playback torn down");
        }
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    async fn run_intro(&self, session: &GameSession) {
        self.screens.show_screen(Screen::PreGame);
        self.settle(self.timing.welcome_settle).await;
        if self.is_cancelled() {
            return;
        }
        self.play_key(session, AudioKey::Welcome).await;
        if self.is_cancelled() {
            return;
        }
        self.screens.show_screen(Screen::Quiz);
        self.play_key(session, AudioKey::QuizTheme).await;
    }

    async fn run_question(&self, session: &GameSession, quiz: &crate::content::Quiz, index: usize) {
        self.screens.focus_question(index);
        self.settle(self.timing.focus_settle).await;
        if self.is_cancelled() {
            return;
        }
        self.play_key(session, AudioKey::Question(index)).await;
        if self.is_cancelled() {
            return;
        }

        // The reveal is gated on the countdown running to completion: it
        // fires exactly once, at the end, and never after a cancellation.
        let elapsed = self.countdown.run().await;
        if elapsed && !self.is_cancelled() {
            if let Some(item) = quiz.items.get(index) {
                self.screens.reveal_answer(index, item.correct_index);
                self.player.cue(Cue::Correct);
            }
        }
    }

    async fn run_answer(&self, session: &GameSession, quiz: &crate::content::Quiz, index: usize) {
        self.play_key(session, AudioKey::Reveal(index)).await;
        if self.is_cancelled() {
            return;
        }
        let is_last = index + 1 == quiz.len();
        let pause = if is_last {
            self.timing.after_final_answer
        } else {
            self.timing.between_questions
        };
        self.settle(pause).await;
    }

    async fn run_outro(&self, session: &GameSession) {
        self.screens.show_screen(Screen::Finalization);
        self.player.cue(Cue::Finalize);
        self.settle(self.timing.outro_settle).await;
        if self.is_cancelled() {
            return;
        }
        self.play_key(session, AudioKey::CtaFinal).await;
        self.settle(self.timing.outro_trailing).await;
        if self.is_cancelled() {
            return;
        }

        let video_available = self
            .recording
            .lock()
            .unwrap()
            .as_ref()
            .is_some_and(|hook| hook.is_recording());
        self.screens.ready_to_finalize(video_available);
    }

    /// Play one narration clip; a missing clip is logged and the step
    /// continues without audio.
    async fn play_key(&self, session: &GameSession, key: AudioKey) {
        match session.store().audio(key) {
            Some(handle) => self.player.play(handle).await,
            None => warn!("{}", describe_missing_audio(key)),
        }
    }

    /// A pause that a cancel wakes immediately.
    async fn settle(&self, duration: Duration) {
        if duration.is_zero() || self.is_cancelled() {
            return;
        }
        tokio::select! {
            _ = tokio::time::sleep(duration) => {}
            _ = self.cancel_notify.notified() => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Difficulty, GenerationConfig};
    use crate::content::{Answer, GeneratedContent, Quiz, QuizItem};
    use crate::media::AudioHandle;
    use crate::playback::countdown::CountdownDisplay;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::AtomicUsize;

    type EventLog = Arc<Mutex<Vec<String>>>;

    struct LogPlayer {
        log: EventLog,
    }

    #[async_trait]
    impl AudioPlayer for LogPlayer {
        async fn play(&self, handle: &AudioHandle) {
            // Clip bytes carry their key name, so the log shows ordering.
            let name = String::from_utf8_lossy(&handle.bytes()).to_string();
            self.log.lock().unwrap().push(format!("play:{name}"));
        }
        fn stop_all(&self) {
            self.log.lock().unwrap().push("stop_all".to_string());
        }
        fn start_tick(&self) {
            self.log.lock().unwrap().push("tick:start".to_string());
        }
        fn stop_tick(&self) {
            self.log.lock().unwrap().push("tick:stop".to_string());
        }
        fn cue(&self, cue: Cue) {
            self.log.lock().unwrap().push(format!("cue:{cue:?}"));
        }
    }

    struct LogScreens {
        log: EventLog,
    }

    impl ScreenController for LogScreens {
        fn show_screen(&self, screen: Screen) {
            self.log.lock().unwrap().push(format!("screen:{screen}"));
        }
        fn focus_question(&self, index: usize) {
            self.log.lock().unwrap().push(format!("focus:{index}"));
        }
        fn reveal_answer(&self, index: usize, answer: usize) {
            self.log
                .lock()
                .unwrap()
                .push(format!("reveal:{index}:{answer}"));
        }
        fn ready_to_finalize(&self, video_available: bool) {
            self.log
                .lock()
                .unwrap()
                .push(format!("finalize:{video_available}"));
        }
    }

    struct NullDisplay;

    impl CountdownDisplay for NullDisplay {
        fn rearm(&self) {}
        fn set_remaining(&self, _fraction: f64) {}
        fn finish(&self) {}
    }

    struct FakeRecording {
        active: AtomicBool,
        stops: AtomicUsize,
    }

    impl RecordingHook for FakeRecording {
        fn is_recording(&self) -> bool {
            self.active.load(Ordering::SeqCst)
        }
        fn force_stop(&self) {
            self.active.store(false, Ordering::SeqCst);
            self.stops.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn quiz(n: usize) -> Quiz {
        Quiz {
            items: (0..n)
                .map(|i| QuizItem {
                    question: format!("Pergunta {}?", i + 1),
                    answers: vec![
                        Answer { text: "A".to_string() },
                        Answer { text: "B".to_string() },
                        Answer { text: "C".to_string() },
                    ],
                    correct_index: i % 3,
                })
                .collect(),
        }
    }

    fn session(n: usize, skip_keys: &[AudioKey]) -> GameSession {
        let mut audio = HashMap::new();
        let mut keys = vec![AudioKey::Welcome, AudioKey::QuizTheme, AudioKey::CtaFinal];
        for i in 0..n {
            keys.push(AudioKey::Question(i));
            keys.push(AudioKey::Reveal(i));
        }
        for key in keys {
            if skip_keys.contains(&key) {
                continue;
            }
            audio.insert(key, AudioHandle::from_bytes(key.to_string().into_bytes()));
        }

        let mut session = GameSession::new(
            GenerationConfig {
                theme: "Cinema".to_string(),
                num_questions: n,
                num_answers: 3,
                difficulty: Difficulty::Medium,
            },
            false,
        );
        session.install(GeneratedContent {
            quiz: quiz(n),
            script: "roteiro".to_string(),
            audio,
            credits: "ok".to_string(),
        });
        session
    }

    fn orchestrator(log: EventLog) -> Orchestrator {
        let player: Arc<dyn AudioPlayer> = Arc::new(LogPlayer { log: log.clone() });
        let screens: Arc<dyn ScreenController> = Arc::new(LogScreens { log });
        let cancelled = Arc::new(AtomicBool::new(false));
        let countdown = Countdown::new(
            Arc::new(NullDisplay),
            Arc::clone(&player),
            Arc::clone(&cancelled),
        )
        .with_duration(Duration::from_millis(100));
        Orchestrator::new(player, screens, countdown, TimingProfile::instant(), cancelled)
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_show_event_order_for_one_question() {
        let log: EventLog = Arc::new(Mutex::new(Vec::new()));
        let orchestrator = orchestrator(log.clone());
        let session = session(1, &[]);

        orchestrator.present(&session).await.unwrap();

        let events = log.lock().unwrap().clone();
        assert_eq!(
            events,
            vec![
                "screen:pre-game",
                "play:welcome",
                "screen:quiz",
                "play:quiz_theme",
                "focus:0",
                "play:q0_q",
                "tick:start",
                "tick:stop",
                "reveal:0:0",
                "cue:Correct",
                "play:q0_r",
                "screen:finalization",
                "cue:Finalize",
                "play:cta_final",
                "finalize:false",
            ]
        );

        let state = orchestrator.state();
        assert!(!state.processing);
        assert_eq!(state.current_step, None);
        assert_eq!(state.remaining, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_clip_still_reveals_exactly_once() {
        let log: EventLog = Arc::new(Mutex::new(Vec::new()));
        let orchestrator = orchestrator(log.clone());
        let session = session(1, &[AudioKey::Question(0)]);

        orchestrator.present(&session).await.unwrap();

        let events = log.lock().unwrap().clone();
        assert!(!events.contains(&"play:q0_q".to_string()));
        let reveals = events.iter().filter(|e| e.starts_with("reveal:")).count();
        assert_eq!(reveals, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_present_without_content_fails() {
        let orchestrator = orchestrator(Arc::new(Mutex::new(Vec::new())));
        let session = GameSession::new(
            GenerationConfig {
                theme: "Cinema".to_string(),
                num_questions: 1,
                num_answers: 2,
                difficulty: Difficulty::Easy,
            },
            false,
        );

        let err = orchestrator.present(&session).await.unwrap_err();
        assert!(matches!(err, QuizcastError::ContentMissing(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_empties_queue_and_suppresses_late_events() {
        let log: EventLog = Arc::new(Mutex::new(Vec::new()));
        let orchestrator = Arc::new(orchestrator(log.clone()));
        let session = Arc::new(session(3, &[]));

        let engine = Arc::clone(&orchestrator);
        let run_session = Arc::clone(&session);
        let drain = tokio::spawn(async move { engine.present(&run_session).await });

        // Let the intro start, then cancel mid-show.
        tokio::time::sleep(Duration::from_millis(10)).await;
        orchestrator.cancel();

        let result = drain.await.unwrap();
        assert!(matches!(result, Err(QuizcastError::Cancelled)));

        let state = orchestrator.state();
        assert!(!state.processing);
        assert_eq!(state.remaining, 0);

        // No reveal or finalization leaked past the cancel.
        let events = log.lock().unwrap().clone();
        assert!(!events.iter().any(|e| e.starts_with("reveal:")));
        assert!(!events.iter().any(|e| e.starts_with("finalize:")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_is_idempotent_and_safe_when_idle() {
        let orchestrator = orchestrator(Arc::new(Mutex::new(Vec::new())));
        orchestrator.cancel();
        orchestrator.cancel();
        assert!(!orchestrator.state().processing);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_force_stops_recording() {
        let orchestrator = orchestrator(Arc::new(Mutex::new(Vec::new())));
        let hook = Arc::new(FakeRecording {
            active: AtomicBool::new(true),
            stops: AtomicUsize::new(0),
        });
        orchestrator.attach_recording(Arc::clone(&hook) as Arc<dyn RecordingHook>);
        assert!(orchestrator.state().recording);

        orchestrator.cancel();
        assert_eq!(hook.stops.load(Ordering::SeqCst), 1);
        assert!(!orchestrator.state().recording);
    }

    #[tokio::test(start_paused = true)]
    async fn test_finalize_reports_video_when_recording_active() {
        let log: EventLog = Arc::new(Mutex::new(Vec::new()));
        let orchestrator = orchestrator(log.clone());
        orchestrator.attach_recording(Arc::new(FakeRecording {
            active: AtomicBool::new(true),
            stops: AtomicUsize::new(0),
        }));

        orchestrator.present(&session(1, &[])).await.unwrap();

        let events = log.lock().unwrap().clone();
        assert!(events.contains(&"finalize:true".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_three_question_show_reveals_in_order() {
        let log: EventLog = Arc::new(Mutex::new(Vec::new()));
        let orchestrator = orchestrator(log.clone());

        orchestrator.present(&session(3, &[])).await.unwrap();

        let events = log.lock().unwrap().clone();
        let reveals: Vec<&String> = events.iter().filter(|e| e.starts_with("reveal:")).collect();
        assert_eq!(reveals, vec!["reveal:0:0", "reveal:1:1", "reveal:2:2"]);
        // Each question's narration precedes its reveal narration.
        for i in 0..3 {
            let q = events.iter().position(|e| e == &format!("play:q{i}_q"));
            let r = events.iter().position(|e| e == &format!("play:q{i}_r"));
            assert!(q.unwrap() < r.unwrap());
        }
    }
}
