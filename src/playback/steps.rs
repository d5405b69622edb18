//! The step model: one tagged unit per narrated beat of the show, built once
//! per game start and drained front-to-back by the orchestrator.

use std::collections::VecDeque;

use crate::media::AudioKey;

/// One unit of the orchestrated sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackStep {
    /// Welcome narration on the pre-game screen, then the quiz screen and
    /// theme announcement.
    Intro,
    /// Question narration + countdown + answer reveal for quiz item `i`.
    Question(usize),
    /// Reveal narration for quiz item `i`.
    Answer(usize),
    /// Finalization screen and closing CTA.
    Outro,
}

impl PlaybackStep {
    /// The narration key for this step. This mapping is the single source of
    /// truth for step→key naming; nothing else builds key strings.
    pub fn audio_key(&self) -> AudioKey {
        match self {
            PlaybackStep::Intro => AudioKey::Welcome,
            PlaybackStep::Question(i) => AudioKey::Question(*i),
            PlaybackStep::Answer(i) => AudioKey::Reveal(*i),
            PlaybackStep::Outro => AudioKey::CtaFinal,
        }
    }
}

impl std::fmt::Display for PlaybackStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlaybackStep::Intro => write!(f, "intro"),
            PlaybackStep::Question(i) => write!(f, "question {}", i + 1),
            PlaybackStep::Answer(i) => write!(f, "answer {}", i + 1),
            PlaybackStep::Outro => write!(f, "outro"),
        }
    }
}

/// Build the full step queue for a quiz of `num_questions` items:
/// Intro, then Question(i)/Answer(i) per item, then Outro (2N + 2 steps).
pub fn build_steps(num_questions: usize) -> VecDeque<PlaybackStep> {
    let mut steps = VecDeque::with_capacity(2 * num_questions + 2);
    steps.push_back(PlaybackStep::Intro);
    for i in 0..num_questions {
        steps.push_back(PlaybackStep::Question(i));
        steps.push_back(PlaybackStep::Answer(i));
    }
    steps.push_back(PlaybackStep::Outro);
    steps
}
