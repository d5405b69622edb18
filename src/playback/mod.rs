//! Playback: the step queue, the audio player, the visual countdown, and the
//! orchestrator that sequences them into a show.

pub mod audio;
pub mod countdown;
pub mod orchestrator;
pub mod steps;

pub use audio::{AudioPlayer, Cue, RodioPlayer};
pub use countdown::{BarDisplay, Countdown, CountdownDisplay, COUNTDOWN_DURATION};
pub use orchestrator::{Orchestrator, OrchestratorState, RecordingHook, TimingProfile};
pub use steps::{build_steps, PlaybackStep};
