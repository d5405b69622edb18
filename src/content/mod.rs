//! Content provider: quiz generation, narration planning, and per-line speech
//! synthesis. Everything the playback engine consumes is produced here and
//! handed over as one [`GeneratedContent`] bundle.

pub mod elevenlabs;
pub mod gemini;
pub mod script;

pub use elevenlabs::ElevenLabsClient;
pub use gemini::GeminiQuizClient;
pub use script::{build_narration, NarrationLine, NarrationPlan};

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use indicatif::{ProgressBar, ProgressStyle};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::GenerationConfig;
use crate::error::{GenerationErrorKind, QuizcastError, Result};
use crate::media::{AudioHandle, AudioKey};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Answer {
    pub text: String,
}

/// One quiz question as returned by the provider. `correct_index` must point
/// at one of `answers`; order is presentation order (lettered A, B, C...).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizItem {
    pub question: String,
    pub answers: Vec<Answer>,
    pub correct_index: usize,
}

impl QuizItem {
    pub fn correct_answer(&self) -> Option<&Answer> {
        self.answers.get(self.correct_index)
    }

    pub fn validate(&self) -> Result<()> {
        if self.question.trim().is_empty() {
            return Err(QuizcastError::generation(
                GenerationErrorKind::MalformedResponse,
                "Quiz item has an empty question",
            ));
        }
        if self.answers.is_empty() {
            return Err(QuizcastError::generation(
                GenerationErrorKind::MalformedResponse,
                format!("Question '{}' has no answers", self.question),
            ));
        }
        if self.correct_index >= self.answers.len() {
            return Err(QuizcastError::generation(
                GenerationErrorKind::MalformedResponse,
                format!(
                    "Question '{}' has correctIndex {} but only {} answers",
                    self.question,
                    self.correct_index,
                    self.answers.len()
                ),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Quiz {
    pub items: Vec<QuizItem>,
}

impl Quiz {
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn validate(&self) -> Result<()> {
        if self.items.is_empty() {
            return Err(QuizcastError::generation(
                GenerationErrorKind::MalformedResponse,
                "Provider returned an empty quiz",
            ));
        }
        for item in &self.items {
            item.validate()?;
        }
        Ok(())
    }
}

/// One generation's worth of content, ready to install into the media store.
#[derive(Debug, Clone)]
pub struct GeneratedContent {
    pub quiz: Quiz,
    pub script: String,
    pub audio: HashMap<AudioKey, AudioHandle>,
    pub credits: String,
}

#[async_trait]
pub trait QuizGenerator: Send + Sync {
    async fn generate(&self, config: &GenerationConfig) -> Result<Quiz>;
    fn name(&self) -> &'static str;
}

#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Synthesize one narration line into encoded audio bytes.
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>>;

    /// Human-readable account balance summary. Never fails; unavailable
    /// credit info degrades to a placeholder string.
    async fn remaining_credits(&self) -> String;

    fn name(&self) -> &'static str;
}

/// Run the full content stage: quiz, narration plan, serial TTS, credits.
///
/// Returns everything or nothing: any failure drops all intermediate state so
/// a retry starts clean. Cancellation is checked between TTS lines.
pub async fn generate_content(
    generator: &dyn QuizGenerator,
    synthesizer: &dyn SpeechSynthesizer,
    config: &GenerationConfig,
    cancelled: &Arc<AtomicBool>,
    show_progress: bool,
) -> Result<GeneratedContent> {
    config.validate()?;

    info!(
        "Generating {}-question quiz about '{}' ({}) with {}",
        config.num_questions,
        config.theme,
        config.difficulty,
        generator.name()
    );

    let quiz_pb = spinner(show_progress, "Generating quiz...");
    let quiz = generator.generate(config).await?;
    quiz.validate()?;
    if let Some(pb) = quiz_pb {
        pb.finish_with_message(format!("✓ Quiz generated ({} questions)", quiz.len()));
    }

    if cancelled.load(Ordering::Relaxed) {
        return Err(QuizcastError::Cancelled);
    }

    let plan = build_narration(&quiz, &config.theme);
    debug!("Narration plan: {} lines", plan.lines.len());

    let tts_pb = if show_progress {
        let pb = ProgressBar::new(plan.lines.len() as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} narration lines")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("#>-"),
        );
        Some(pb)
    } else {
        None
    };

    // Lines are synthesized serially; the client paces requests itself so we
    // stay under the provider's burst limits.
    let mut audio = HashMap::with_capacity(plan.lines.len());
    for line in &plan.lines {
        if cancelled.load(Ordering::Relaxed) {
            return Err(QuizcastError::Cancelled);
        }

        debug!("Synthesizing {}: \"{}\"", line.key, line.text);
        let bytes = synthesizer.synthesize(&line.text).await?;
        audio.insert(line.key, AudioHandle::from_bytes(bytes));

        if let Some(pb) = &tts_pb {
            pb.inc(1);
        }
    }
    if let Some(pb) = tts_pb {
        pb.finish_with_message("✓ Narration synthesized");
    }

    let credits = synthesizer.remaining_credits().await;
    info!("Content generation complete ({} clips, {})", audio.len(), credits);

    Ok(GeneratedContent {
        quiz,
        script: plan.transcript,
        audio,
        credits,
    })
}

fn spinner(enabled: bool, message: &str) -> Option<ProgressBar> {
    if !enabled {
        return None;
    }
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    Some(pb)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(answers: usize, correct: usize) -> QuizItem {
        QuizItem {
            question: "Pergunta?".to_string(),
            answers: (0..answers)
                .map(|i| Answer {
                    text: format!("Resposta {i}"),
                })
                .collect(),
            correct_index: correct,
        }
    }

    #[test]
    fn test_item_validation() {
        assert!(item(4, 0).validate().is_ok());
        assert!(item(4, 3).validate().is_ok());
        assert!(item(4, 4).validate().is_err());
        assert!(item(0, 0).validate().is_err());

        let mut blank = item(2, 0);
        blank.question = "  ".to_string();
        assert!(blank.validate().is_err());
    }

    #[test]
    fn test_quiz_validation() {
        let quiz = Quiz { items: vec![] };
        assert!(quiz.validate().is_err());

        let quiz = Quiz {
            items: vec![item(3, 1), item(3, 2)],
        };
        assert!(quiz.validate().is_ok());
        assert_eq!(quiz.len(), 2);

        let quiz = Quiz {
            items: vec![item(3, 1), item(3, 5)],
        };
        assert!(quiz.validate().is_err());
    }

    #[test]
    fn test_correct_answer_lookup() {
        let it = item(3, 2);
        assert_eq!(it.correct_answer().map(|a| a.text.as_str()), Some("Resposta 2"));
    }

    #[test]
    fn test_quiz_item_serde_uses_camel_case() {
        let json = r#"{"question":"Q?","answers":[{"text":"A"},{"text":"B"}],"correctIndex":1}"#;
        let it: QuizItem = serde_json::from_str(json).unwrap();
        assert_eq!(it.correct_index, 1);

        let out = serde_json::to_string(&it).unwrap();
        assert!(out.contains("correctIndex"));
    }
}
