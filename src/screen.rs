//! Screen/navigation controller: maps orchestrator events to visible terminal
//! state. The orchestrator only ever talks to the [`ScreenController`] trait
//! and never renders anything itself.

use console::style;
use tracing::debug;

use crate::content::Quiz;
use crate::media::AudioKey;

/// The screens a show can navigate between.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Screen {
    Lobby,
    Personalization,
    PreGame,
    Quiz,
    Finalization,
}

impl Screen {
    pub fn name(&self) -> &'static str {
        match self {
            Screen::Lobby => "lobby",
            Screen::Personalization => "personalization",
            Screen::PreGame => "pre-game",
            Screen::Quiz => "quiz",
            Screen::Finalization => "finalization",
        }
    }
}

impl std::fmt::Display for Screen {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Visible-state surface consumed by the orchestrator.
pub trait ScreenController: Send + Sync {
    /// Navigate to a screen.
    fn show_screen(&self, screen: Screen);

    /// Bring question `index` into view before its narration starts.
    fn focus_question(&self, index: usize);

    /// Highlight the correct answer of question `index`.
    fn reveal_answer(&self, index: usize, answer: usize);

    /// The show reached its terminal state; saving/restarting is now allowed.
    /// `video_available` is true when a recorded artifact can be offered.
    fn ready_to_finalize(&self, video_available: bool);
}

/// Console-backed screen controller rendering the quiz board in the terminal.
pub struct TerminalScreens {
    quiz: Quiz,
    theme: String,
}

impl TerminalScreens {
    pub fn new(quiz: Quiz, theme: String) -> Self {
        Self { quiz, theme }
    }

    fn print_banner(&self, title: &str) {
        println!();
        println!("{}", style("═".repeat(55)).cyan());
        println!("{}", style(format!("  {title}")).cyan().bold());
        println!("{}", style("═".repeat(55)).cyan());
    }

    fn print_board(&self) {
        for (i, item) in self.quiz.items.iter().enumerate() {
            println!();
            println!("  {}", style(format!("{}. {}", i + 1, item.question)).bold());
            for (j, answer) in item.answers.iter().enumerate() {
                let letter = crate::content::script::answer_letter(j);
                println!("     {}) {}", letter, answer.text);
            }
        }
        println!();
    }
}

impl ScreenController for TerminalScreens {
    fn show_screen(&self, screen: Screen) {
        debug!("Screen transition: {}", screen);
        match screen {
            Screen::Lobby => self.print_banner("Tio do Quiz"),
            Screen::Personalization => self.print_banner("Personalização"),
            Screen::PreGame => {
                self.print_banner("PRONTO PARA O DESAFIO?");
                println!("  {}", style("DUVIDO VOCÊ ACERTAR").yellow().bold());
            }
            Screen::Quiz => {
                self.print_banner(&format!("Quiz: {}", self.theme));
                self.print_board();
            }
            Screen::Finalization => {
                self.print_banner("Quiz finalizado!");
            }
        }
    }

    fn focus_question(&self, index: usize) {
        if let Some(item) = self.quiz.items.get(index) {
            println!();
            println!(
                "  {} {}",
                style("▶").green().bold(),
                style(format!("Pergunta {}: {}", index + 1, item.question)).bold()
            );
            for (j, answer) in item.answers.iter().enumerate() {
                let letter = crate::content::script::answer_letter(j);
                println!("     {}) {}", letter, answer.text);
            }
        }
    }

    fn reveal_answer(&self, index: usize, answer: usize) {
        let text = self
            .quiz
            .items
            .get(index)
            .and_then(|item| item.answers.get(answer))
            .map(|a| a.text.as_str())
            .unwrap_or("?");
        let letter = crate::content::script::answer_letter(answer);
        println!(
            "     {} {}",
            style("✓").green().bold(),
            style(format!("{letter}) {text}")).green().bold()
        );
    }

    fn ready_to_finalize(&self, video_available: bool) {
        println!();
        if video_available {
            println!(
                "  {} Show complete, recording ready to save",
                style("✓").green()
            );
        } else {
            println!("  {} Show complete", style("✓").green());
        }
    }
}

/// A key the orchestrator wanted but the store could not resolve; used only
/// for log context.
pub fn describe_missing_audio(key: AudioKey) -> String {
    format!("narration clip '{key}' is missing; playing the step without audio")
}
