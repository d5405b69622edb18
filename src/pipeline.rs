//! The game pipeline: generate content, start capture, run the orchestrated
//! show, save artifacts. One call per game run.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tracing::{info, warn};

use crate::artifacts::ArtifactSink;
use crate::capture::{CaptureController, CaptureRegion};
use crate::config::{Config, GenerationConfig};
use crate::content::{generate_content, ElevenLabsClient, GeminiQuizClient};
use crate::error::{QuizcastError, Result};
use crate::playback::{
    BarDisplay, Countdown, Orchestrator, RecordingHook, RodioPlayer, TimingProfile,
};
use crate::screen::TerminalScreens;
use crate::session::GameSession;

/// Configuration for one show run.
#[derive(Debug, Clone)]
pub struct ShowConfig {
    /// What to generate.
    pub generation: GenerationConfig,
    /// Record the show as a video artifact.
    pub record: bool,
    /// Screen region to capture when recording.
    pub capture_region: CaptureRegion,
    /// Show progress bars during generation.
    pub show_progress: bool,
}

/// Result of a completed show run.
#[derive(Debug)]
pub struct ShowResult {
    /// Where the narration script was written.
    pub script_path: PathBuf,
    /// Where the recording was written, when one was produced.
    pub video_path: Option<PathBuf>,
    /// Number of questions presented.
    pub questions: usize,
    /// TTS account balance summary after generation.
    pub credits: String,
    /// Total wall-clock time for the run.
    pub total_time: Duration,
}

/// Routes an interrupt to whatever stage of the run is active. Before the
/// engine exists, setting the shared flag aborts content generation between
/// TTS lines; once an engine is attached, its own cancel tears the show down.
struct CancelRelay {
    cancelled: Arc<AtomicBool>,
    engine: Mutex<Option<Arc<Orchestrator>>>,
}

impl CancelRelay {
    fn new(cancelled: Arc<AtomicBool>) -> Self {
        Self {
            cancelled,
            engine: Mutex::new(None),
        }
    }

    fn attach(&self, engine: Arc<Orchestrator>) {
        *self.engine.lock().unwrap() = Some(engine);
    }

    fn trigger(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        if let Some(engine) = self.engine.lock().unwrap().as_ref() {
            engine.cancel();
        }
    }
}

/// Run a full show with a private cancellation flag.
pub async fn run_show(config: &mut Config, show: ShowConfig) -> Result<ShowResult> {
    let cancelled = Arc::new(AtomicBool::new(false));
    run_show_with_cancel(config, show, cancelled).await
}

/// Run a full show. `cancelled` is shared with the Ctrl-C handler, installed
/// before any stage starts: content generation polls the flag between TTS
/// lines, and once the orchestrator exists the handler also reacts through
/// [`Orchestrator::cancel`].
pub async fn run_show_with_cancel(
    config: &mut Config,
    show: ShowConfig,
    cancelled: Arc<AtomicBool>,
) -> Result<ShowResult> {
    let start_time = Instant::now();
    config.validate()?;

    let relay = Arc::new(CancelRelay::new(Arc::clone(&cancelled)));
    let handler_relay = Arc::clone(&relay);
    if let Err(e) = ctrlc::set_handler(move || handler_relay.trigger()) {
        warn!("Could not install the Ctrl-C handler: {}", e);
    }

    let gemini_key = config.gemini_api_key.clone().ok_or_else(|| {
        QuizcastError::Config("GEMINI_API_KEY not set".to_string())
    })?;
    let elevenlabs_key = config.elevenlabs_api_key.clone().ok_or_else(|| {
        QuizcastError::Config("ELEVENLABS_API_KEY not set".to_string())
    })?;

    // ═══════════════════════════════════════════════════════════════════════
    // Stage 1: Content generation
    // ═══════════════════════════════════════════════════════════════════════
    info!(
        "Stage 1/3: Generating content for theme '{}' ({} questions)",
        show.generation.theme, show.generation.num_questions
    );

    let generator = GeminiQuizClient::new(gemini_key);
    let synthesizer = ElevenLabsClient::new(elevenlabs_key);
    let content = generate_content(
        &generator,
        &synthesizer,
        &show.generation,
        &cancelled,
        show.show_progress,
    )
    .await?;
    let credits = content.credits.clone();

    config.remember_theme(&show.generation.theme);
    if let Err(e) = config.save() {
        warn!("Could not persist recent themes: {}", e);
    }

    let mut session = GameSession::new(show.generation.clone(), show.record);
    session.install(content);
    let theme = session.theme().to_string();
    let quiz = session
        .quiz()
        .cloned()
        .ok_or_else(|| QuizcastError::ContentMissing("generation produced no quiz".to_string()))?;

    let sink = ArtifactSink::new(config.resolved_output_dir());
    let script = session
        .store()
        .script()
        .unwrap_or_default()
        .to_string();
    let script_path = sink.save_script(&theme, &script)?;

    // ═══════════════════════════════════════════════════════════════════════
    // Stage 2: Capture acquisition
    // ═══════════════════════════════════════════════════════════════════════
    let capture = if show.record {
        info!("Stage 2/3: Starting screen capture");
        let controller = Arc::new(CaptureController::new(show.capture_region));
        if controller.start_capture() {
            Some(controller)
        } else {
            // Denial downgrades to a plain, unrecorded run.
            warn!("Recording unavailable, presenting without capture");
            None
        }
    } else {
        info!("Stage 2/3: Recording not requested");
        None
    };

    // ═══════════════════════════════════════════════════════════════════════
    // Stage 3: The show
    // ═══════════════════════════════════════════════════════════════════════
    info!("Stage 3/3: Presenting the show");

    let player = Arc::new(RodioPlayer::new());
    let screens = Arc::new(TerminalScreens::new(quiz.clone(), theme.clone()));
    let countdown = Countdown::new(
        Arc::new(BarDisplay::new()),
        Arc::clone(&player) as _,
        Arc::clone(&cancelled),
    );
    let orchestrator = Arc::new(Orchestrator::new(
        player,
        screens,
        countdown,
        TimingProfile::default(),
        Arc::clone(&cancelled),
    ));
    if let Some(controller) = &capture {
        orchestrator.attach_recording(Arc::clone(controller) as Arc<dyn RecordingHook>);
    }
    relay.attach(Arc::clone(&orchestrator));

    let presentation = orchestrator.present(&session).await;
    orchestrator.detach_recording();

    let video_path = match (&presentation, capture) {
        (Ok(()), Some(controller)) => match controller.stop_capture() {
            Ok(bytes) => Some(sink.save_video(&theme, &bytes)?),
            Err(QuizcastError::EmptyCapture) => {
                warn!("Capture produced no data, no video artifact saved");
                None
            }
            Err(e) => {
                warn!("Could not finalize the recording: {}", e);
                None
            }
        },
        // Cancel already force-stopped the session; discard any partial data.
        (Err(_), Some(controller)) => {
            controller.force_stop_capture();
            None
        }
        (_, None) => None,
    };
    presentation?;

    Ok(ShowResult {
        script_path,
        video_path,
        questions: quiz.len(),
        credits,
        total_time: start_time.elapsed(),
    })
}

/// Print a closing summary of the run.
pub fn print_summary(result: &ShowResult) {
    println!();
    println!("═══════════════════════════════════════════════════════════════");
    println!("                        Quiz Show Complete                      ");
    println!("═══════════════════════════════════════════════════════════════");
    println!();
    println!("  Questions:  {}", result.questions);
    println!("  Script:     {}", result.script_path.display());
    match &result.video_path {
        Some(path) => println!("  Recording:  {}", path.display()),
        None => println!("  Recording:  (none)"),
    }
    println!("  Credits:    {}", result.credits);
    println!(
        "  Total:      {:.1}s",
        result.total_time.as_secs_f64()
    );
    println!();
    println!("═══════════════════════════════════════════════════════════════");
}
