//! The personalization wizard: collect API keys, theme, and show settings
//! interactively before a run.

use crate::config::{Config, Difficulty, GenerationConfig};
use console::style;
use dialoguer::{Confirm, FuzzySelect, Input, Select};

pub struct WizardResult {
    pub config: Config,
    pub generation: GenerationConfig,
    pub record: bool,
}

pub fn run_personalization_wizard() -> anyhow::Result<WizardResult> {
    print_header();

    // Step 1: Check/Setup API keys
    let mut config = setup_api_keys()?;

    // Step 2: Theme
    let theme = select_theme(&config)?;

    // Step 3: Show shape
    let num_questions = ask_count("How many questions?", config.last_generation.num_questions, 1, 10)?;
    let num_answers = ask_count("How many answers per question?", config.last_generation.num_answers, 2, 5)?;
    let difficulty = select_difficulty(config.last_generation.difficulty)?;

    // Step 4: Recording
    let record = Confirm::new()
        .with_prompt("Record the show as a video?")
        .default(true)
        .interact()?;

    let generation = GenerationConfig {
        theme,
        num_questions,
        num_answers,
        difficulty,
    };
    generation.validate()?;

    // Step 5: Confirm
    print_summary(&generation, record);

    if !Confirm::new()
        .with_prompt("Proceed with these settings?")
        .default(true)
        .interact()?
    {
        anyhow::bail!("Cancelled by user");
    }

    println!();

    config.last_generation = generation.clone();

    Ok(WizardResult {
        config,
        generation,
        record,
    })
}

fn print_header() {
    println!();
    println!(
        "{}",
        style("╔═══════════════════════════════════════════════════╗").cyan()
    );
    println!(
        "{}",
        style("║          quizcast - Automated Quiz Show           ║").cyan()
    );
    println!(
        "{}",
        style("╚═══════════════════════════════════════════════════╝").cyan()
    );
    println!();
}

fn setup_api_keys() -> anyhow::Result<Config> {
    let mut config = Config::load().unwrap_or_default();
    let mut entered_any = false;

    if config.gemini_api_key.is_none() {
        println!("{} Gemini API key not found", style("!").yellow());
        println!("  Get one at: https://aistudio.google.com/apikey\n");

        let api_key: String = Input::new()
            .with_prompt("Enter your Gemini API key")
            .interact_text()?;
        if api_key.trim().is_empty() {
            anyhow::bail!("Gemini API key is required");
        }
        config.gemini_api_key = Some(api_key.trim().to_string());
        entered_any = true;
    }

    if config.elevenlabs_api_key.is_none() {
        println!("{} ElevenLabs API key not found", style("!").yellow());
        println!("  Get one at: https://elevenlabs.io/app/settings/api-keys\n");

        let api_key: String = Input::new()
            .with_prompt("Enter your ElevenLabs API key")
            .interact_text()?;
        if api_key.trim().is_empty() {
            anyhow::bail!("ElevenLabs API key is required");
        }
        config.elevenlabs_api_key = Some(api_key.trim().to_string());
        entered_any = true;
    }

    if entered_any {
        if Confirm::new()
            .with_prompt("Save API keys to config file?")
            .default(true)
            .interact()?
        {
            config.save()?;
            println!("{} Keys saved to config\n", style("✓").green());
        }
    } else {
        println!("{} API keys configured", style("✓").green());
    }

    Ok(config)
}

fn select_theme(config: &Config) -> anyhow::Result<String> {
    println!("\n{}", style("Pick a theme:").bold());

    if !config.recent_themes.is_empty() {
        let mut items = config.recent_themes.clone();
        items.push("New theme...".to_string());

        let selection = FuzzySelect::new()
            .with_prompt("Recent themes")
            .items(&items)
            .default(0)
            .interact()?;

        if selection < config.recent_themes.len() {
            return Ok(config.recent_themes[selection].clone());
        }
    }

    let theme: String = Input::new()
        .with_prompt("Quiz theme (e.g. 'Cinema', 'Anos 80')")
        .interact_text()?;
    if theme.trim().is_empty() {
        anyhow::bail!("Theme is required");
    }
    Ok(theme.trim().to_string())
}

fn ask_count(prompt: &str, default: usize, min: usize, max: usize) -> anyhow::Result<usize> {
    let value: usize = Input::new()
        .with_prompt(prompt)
        .default(default)
        .validate_with(move |input: &usize| {
            if (min..=max).contains(input) {
                Ok(())
            } else {
                Err(format!("Enter a value between {} and {}", min, max))
            }
        })
        .interact_text()?;
    Ok(value)
}

fn select_difficulty(current: Difficulty) -> anyhow::Result<Difficulty> {
    let levels = [Difficulty::Easy, Difficulty::Medium, Difficulty::Hard];
    let items: Vec<String> = levels
        .iter()
        .map(|d| format!("{} ({})", d.label(), d))
        .collect();
    let default = levels.iter().position(|d| *d == current).unwrap_or(1);

    let selection = Select::new()
        .with_prompt("Select difficulty")
        .items(&items)
        .default(default)
        .interact()?;

    Ok(levels[selection])
}

fn print_summary(generation: &GenerationConfig, record: bool) {
    println!("\n{}", style("═══ Summary ═══").bold());
    println!("  Theme:       {}", style(&generation.theme).cyan());
    println!("  Questions:   {}", generation.num_questions);
    println!("  Answers:     {}", generation.num_answers);
    println!("  Difficulty:  {}", generation.difficulty.label());
    println!("  Recording:   {}", if record { "yes" } else { "no" });
    println!();
}
