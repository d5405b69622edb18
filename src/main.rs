use anyhow::{Context, Result};
use clap::Parser;
use quizcast::capture::CaptureRegion;
use quizcast::config::{Config, Difficulty, GenerationConfig};
use quizcast::error::QuizcastError;
use quizcast::interactive::run_personalization_wizard;
use quizcast::pipeline::{print_summary, run_show, ShowConfig};
use std::path::PathBuf;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "quizcast")]
#[command(version, about = "Automated quiz show generator and presenter")]
#[command(
    long_about = "Generate a themed quiz with Gemini, narrate it with ElevenLabs, and present it as an interruptible show with optional screen recording. Run without --theme for the interactive wizard."
)]
struct Cli {
    /// Quiz theme (skips the interactive wizard)
    #[arg(short, long)]
    theme: Option<String>,

    /// Number of questions (1-10)
    #[arg(short, long, default_value = "3")]
    questions: usize,

    /// Answers per question (2-5)
    #[arg(short, long, default_value = "4")]
    answers: usize,

    /// Difficulty: easy, medium, hard
    #[arg(short, long, default_value = "medium")]
    difficulty: String,

    /// Record the show as a video artifact
    #[arg(short, long)]
    record: bool,

    /// Screen region to capture, as X,Y,WxH
    #[arg(long, default_value = "0,0,1280x720")]
    capture_region: String,

    /// Directory for artifacts (script, video)
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn parse_capture_region(arg: &str) -> Result<CaptureRegion> {
    arg.parse().context("Invalid --capture-region")
}

fn init_logging(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::INFO };

    FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    let capture_region = parse_capture_region(&cli.capture_region)?;

    let (mut config, generation, record) = match &cli.theme {
        Some(theme) => {
            let difficulty: Difficulty = cli
                .difficulty
                .parse()
                .map_err(|e: String| anyhow::anyhow!(e))?;
            let generation = GenerationConfig {
                theme: theme.clone(),
                num_questions: cli.questions,
                num_answers: cli.answers,
                difficulty,
            };
            generation.validate()?;

            let config = Config::load().context("Failed to load configuration")?;
            config.validate().context("Configuration validation failed")?;
            (config, generation, cli.record)
        }
        None => {
            let wizard = run_personalization_wizard()?;
            (wizard.config, wizard.generation, wizard.record)
        }
    };

    if let Some(dir) = cli.output_dir {
        config.output_dir = Some(dir);
    }

    let show = ShowConfig {
        generation,
        record,
        capture_region,
        show_progress: true,
    };

    match run_show(&mut config, show).await {
        Ok(result) => {
            print_summary(&result);
            Ok(())
        }
        Err(QuizcastError::Cancelled) => {
            println!();
            println!("Show cancelled. No recording was kept.");
            Ok(())
        }
        Err(e) => Err(e).context("The show could not be completed"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capture_region_flag_parses() {
        let region = parse_capture_region("10,20,640x480").unwrap();
        assert_eq!(region.to_string(), "10,20,640x480");
    }

    #[test]
    fn test_invalid_capture_region_flag_is_reported() {
        let err = parse_capture_region("nonsense").unwrap_err();
        assert!(err.to_string().contains("--capture-region"));
    }
}
