//! Generated-content store: the quiz, the narration script, and the
//! audio-handle map the playback engine draws from.

use std::collections::HashMap;
use std::sync::Arc;

use crate::content::{GeneratedContent, Quiz};

/// Logical tag identifying which narration line an audio clip belongs to.
///
/// The canonical string forms (`welcome`, `quiz_theme`, `q{i}_q`, `q{i}_r`,
/// `cta_final`) are produced by [`std::fmt::Display`] and used everywhere a
/// key leaves the process (logs, script metadata). There is no second naming
/// scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AudioKey {
    Welcome,
    QuizTheme,
    /// Question narration for quiz item `i` (zero-based).
    Question(usize),
    /// Correct-answer reveal narration for quiz item `i`.
    Reveal(usize),
    CtaFinal,
}

impl std::fmt::Display for AudioKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AudioKey::Welcome => write!(f, "welcome"),
            AudioKey::QuizTheme => write!(f, "quiz_theme"),
            AudioKey::Question(i) => write!(f, "q{i}_q"),
            AudioKey::Reveal(i) => write!(f, "q{i}_r"),
            AudioKey::CtaFinal => write!(f, "cta_final"),
        }
    }
}

/// An opaque playable clip: encoded audio bytes as returned by the TTS
/// provider. Cloning is cheap; the underlying buffer is shared and freed when
/// the store releases the last reference.
#[derive(Debug, Clone)]
pub struct AudioHandle {
    bytes: Arc<[u8]>,
}

impl AudioHandle {
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self {
            bytes: Arc::from(bytes),
        }
    }

    /// Shared view of the encoded bytes, suitable for handing to a decoder.
    pub fn bytes(&self) -> Arc<[u8]> {
        Arc::clone(&self.bytes)
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Owns one generation's worth of content. Handles are written only here:
/// installed as a whole by content generation, released as a whole by the
/// next install or an explicit clear. During a show the store is read-only:
/// the orchestrator borrows it for the full drain, so a clip can never be
/// released mid-playback.
#[derive(Debug, Default)]
pub struct MediaStore {
    quiz: Option<Quiz>,
    script: Option<String>,
    audio: HashMap<AudioKey, AudioHandle>,
    credits: Option<String>,
}

impl MediaStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace everything with a fresh generation. Previous handles are
    /// dropped here.
    pub fn install(&mut self, content: GeneratedContent) {
        self.quiz = Some(content.quiz);
        self.script = Some(content.script);
        self.audio = content.audio;
        self.credits = Some(content.credits);
    }

    /// Drop all content and release every audio handle.
    pub fn clear(&mut self) {
        self.quiz = None;
        self.script = None;
        self.audio.clear();
        self.credits = None;
    }

    pub fn quiz(&self) -> Option<&Quiz> {
        self.quiz.as_ref()
    }

    pub fn script(&self) -> Option<&str> {
        self.script.as_deref()
    }

    pub fn credits(&self) -> Option<&str> {
        self.credits.as_deref()
    }

    pub fn audio(&self, key: AudioKey) -> Option<&AudioHandle> {
        self.audio.get(&key)
    }

    pub fn audio_count(&self) -> usize {
        self.audio.len()
    }

    /// Whether a show can start: a non-empty quiz and at least one clip.
    pub fn is_ready(&self) -> bool {
        self.quiz.as_ref().is_some_and(|q| !q.items.is_empty()) && !self.audio.is_empty()
    }
}
