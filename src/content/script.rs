//! Builds the narration plan for a generated quiz: the ordered list of lines
//! sent to text-to-speech, plus the human-readable transcript offered as a
//! download. All on-air copy is Brazilian Portuguese ("Tio do Quiz").

use rand::seq::SliceRandom;

use crate::content::{Quiz, QuizItem};
use crate::media::AudioKey;

const WELCOME_VARIANTS: [&str; 3] = [
    "Fala galera! Tio do Quiz na área, vamos ao quizz de hoje!",
    "E aí, tudo pronto? Tio do Quiz aqui! Vamos começar o desafio!",
    "Beleza, pessoal! Aqui é o Tio do Quiz. Prepare-se para o quiz!",
];

const CTA_VARIANTS: [&str; 3] = [
    "E aí? Qual foi o seu resultado? Se curtiu, desafia seus amigos. Te vejo na próxima!",
    "Mandou bem! Qual foi a pontuação? Comenta aí, desafie um amigo e me siga para mais!",
    "Quiz finalizado! Comenta o seu resultado e não esquece de seguir o Tio do Quiz!",
];

/// One line of narration destined for TTS.
#[derive(Debug, Clone)]
pub struct NarrationLine {
    pub key: AudioKey,
    pub text: String,
}

/// Everything the narration stage produces: TTS inputs in playback order and
/// the downloadable transcript.
#[derive(Debug, Clone)]
pub struct NarrationPlan {
    pub lines: Vec<NarrationLine>,
    pub transcript: String,
}

impl NarrationPlan {
    /// Number of TTS lines for a quiz of `n` questions: welcome + theme +
    /// per-question question/reveal pairs + final CTA.
    pub fn expected_line_count(n: usize) -> usize {
        2 * n + 3
    }
}

/// Announcement line played when the quiz screen appears.
pub fn theme_line(theme: &str) -> String {
    format!("O quiz de hoje é sobre {theme}!")
}

/// Reveal line for one quiz item.
pub fn reveal_line(item: &QuizItem) -> String {
    let correct = item
        .correct_answer()
        .map(|a| a.text.as_str())
        .unwrap_or_default();
    format!("A resposta correta é... {correct}!")
}

/// Presentation letter for answer position `j` (A, B, C, ...).
pub fn answer_letter(j: usize) -> char {
    (b'A' + (j as u8 % 26)) as char
}

/// Assemble the full narration plan for a quiz.
pub fn build_narration(quiz: &Quiz, theme: &str) -> NarrationPlan {
    let mut rng = rand::thread_rng();
    let welcome = WELCOME_VARIANTS
        .choose(&mut rng)
        .copied()
        .unwrap_or(WELCOME_VARIANTS[0]);
    let cta = CTA_VARIANTS
        .choose(&mut rng)
        .copied()
        .unwrap_or(CTA_VARIANTS[0]);

    let mut lines = Vec::with_capacity(NarrationPlan::expected_line_count(quiz.items.len()));
    let mut transcript: Vec<String> = Vec::new();

    transcript.push(format!("Roteiro do Quiz: {theme}\n"));
    transcript.push("--- INÍCIO ---\n".to_string());

    lines.push(NarrationLine {
        key: AudioKey::Welcome,
        text: welcome.to_string(),
    });
    transcript.push("(Começa a tela de pré-jogo)\n".to_string());
    transcript.push(format!("{welcome}\n"));
    transcript.push("PRONTO PARA O DESAFIO?\n".to_string());
    transcript.push("DUVIDO VOCÊ ACERTAR\n".to_string());
    transcript.push("\n(Inicia o quiz)\n".to_string());

    let theme_text = theme_line(theme);
    lines.push(NarrationLine {
        key: AudioKey::QuizTheme,
        text: theme_text.clone(),
    });
    transcript.push(format!("{theme_text}\n"));

    for (i, item) in quiz.items.iter().enumerate() {
        lines.push(NarrationLine {
            key: AudioKey::Question(i),
            text: item.question.clone(),
        });
        transcript.push(format!("Pergunta {}: {}", i + 1, item.question));

        // Lettered alternatives appear only in the transcript; on air they
        // are read as part of the question screen.
        for (j, answer) in item.answers.iter().enumerate() {
            transcript.push(format!("Alternativa {}. {}", answer_letter(j), answer.text));
        }

        transcript.push("\n(Inicia o timer de 5 segundos...)\n".to_string());

        let reveal = reveal_line(item);
        lines.push(NarrationLine {
            key: AudioKey::Reveal(i),
            text: reveal.clone(),
        });
        transcript.push(reveal);
        transcript.push("\n---\n".to_string());
    }

    transcript.push("\n(Tela final de CTA)\n".to_string());
    lines.push(NarrationLine {
        key: AudioKey::CtaFinal,
        text: cta.to_string(),
    });
    transcript.push(cta.to_string());
    transcript.push("\n--- FIM ---".to_string());

    NarrationPlan {
        lines,
        transcript: transcript.join("\n"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::Answer;

    fn sample_quiz() -> Quiz {
        Quiz {
            items: vec![
                QuizItem {
                    question: "Qual banda gravou 'Help!'?".to_string(),
                    answers: vec![
                        Answer {
                            text: "The Beatles".to_string(),
                        },
                        Answer {
                            text: "Queen".to_string(),
                        },
                        Answer {
                            text: "ABBA".to_string(),
                        },
                    ],
                    correct_index: 0,
                },
                QuizItem {
                    question: "Em que ano chegamos à Lua?".to_string(),
                    answers: vec![
                        Answer {
                            text: "1969".to_string(),
                        },
                        Answer {
                            text: "1972".to_string(),
                        },
                    ],
                    correct_index: 0,
                },
            ],
        }
    }

    #[test]
    fn test_line_count_and_order() {
        let quiz = sample_quiz();
        let plan = build_narration(&quiz, "Música");

        assert_eq!(
            plan.lines.len(),
            NarrationPlan::expected_line_count(quiz.items.len())
        );

        let keys: Vec<AudioKey> = plan.lines.iter().map(|l| l.key).collect();
        assert_eq!(
            keys,
            vec![
                AudioKey::Welcome,
                AudioKey::QuizTheme,
                AudioKey::Question(0),
                AudioKey::Reveal(0),
                AudioKey::Question(1),
                AudioKey::Reveal(1),
                AudioKey::CtaFinal,
            ]
        );
    }

    #[test]
    fn test_welcome_and_cta_come_from_variant_pools() {
        let plan = build_narration(&sample_quiz(), "Música");
        let welcome = &plan.lines[0].text;
        let cta = &plan.lines.last().map(|l| l.text.clone()).unwrap_or_default();

        assert!(WELCOME_VARIANTS.contains(&welcome.as_str()));
        assert!(CTA_VARIANTS.contains(&cta.as_str()));
    }

    #[test]
    fn test_reveal_line_names_correct_answer() {
        let quiz = sample_quiz();
        let reveal = reveal_line(&quiz.items[0]);
        assert_eq!(reveal, "A resposta correta é... The Beatles!");
    }

    #[test]
    fn test_theme_line() {
        assert_eq!(
            theme_line("Anos 80"),
            "O quiz de hoje é sobre Anos 80!"
        );
    }

    #[test]
    fn test_answer_letters() {
        assert_eq!(answer_letter(0), 'A');
        assert_eq!(answer_letter(1), 'B');
        assert_eq!(answer_letter(4), 'E');
    }

    #[test]
    fn test_transcript_shape() {
        let plan = build_narration(&sample_quiz(), "Música");
        let t = &plan.transcript;

        assert!(t.starts_with("Roteiro do Quiz: Música"));
        assert!(t.contains("--- INÍCIO ---"));
        assert!(t.contains("(Começa a tela de pré-jogo)"));
        assert!(t.contains("PRONTO PARA O DESAFIO?"));
        assert!(t.contains("O quiz de hoje é sobre Música!"));
        assert!(t.contains("Pergunta 1: Qual banda gravou 'Help!'?"));
        assert!(t.contains("Alternativa A. The Beatles"));
        assert!(t.contains("Alternativa C. ABBA"));
        assert!(t.contains("(Inicia o timer de 5 segundos...)"));
        assert!(t.contains("A resposta correta é... 1969!"));
        assert!(t.contains("(Tela final de CTA)"));
        assert!(t.ends_with("--- FIM ---"));
    }

    #[test]
    fn test_question_audio_matches_question_text() {
        let quiz = sample_quiz();
        let plan = build_narration(&quiz, "Música");
        let q1 = plan
            .lines
            .iter()
            .find(|l| l.key == AudioKey::Question(1))
            .map(|l| l.text.clone());
        assert_eq!(q1.as_deref(), Some("Em que ano chegamos à Lua?"));
    }
}
