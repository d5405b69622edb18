use crate::error::{QuizcastError, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// How many recent themes are kept for the personalization wizard.
pub const MAX_RECENT_THEMES: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    #[default]
    Medium,
    Hard,
}

impl Difficulty {
    /// Label used in prompts and on screen (the show is Brazilian Portuguese).
    pub fn label(&self) -> &'static str {
        match self {
            Difficulty::Easy => "Fácil",
            Difficulty::Medium => "Médio",
            Difficulty::Hard => "Difícil",
        }
    }
}

impl std::fmt::Display for Difficulty {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Difficulty::Easy => write!(f, "easy"),
            Difficulty::Medium => write!(f, "medium"),
            Difficulty::Hard => write!(f, "hard"),
        }
    }
}

impl std::str::FromStr for Difficulty {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "easy" | "facil" | "fácil" => Ok(Difficulty::Easy),
            "medium" | "medio" | "médio" => Ok(Difficulty::Medium),
            "hard" | "dificil" | "difícil" => Ok(Difficulty::Hard),
            _ => Err(format!(
                "Unknown difficulty: {}. Use 'easy', 'medium', or 'hard'",
                s
            )),
        }
    }
}

/// One quiz generation request: what the content provider is asked to produce.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    pub theme: String,
    pub num_questions: usize,
    pub num_answers: usize,
    pub difficulty: Difficulty,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            theme: String::new(),
            num_questions: 3,
            num_answers: 4,
            difficulty: Difficulty::default(),
        }
    }
}

impl GenerationConfig {
    pub fn validate(&self) -> Result<()> {
        if self.theme.trim().is_empty() {
            return Err(QuizcastError::Config(
                "Theme must not be empty".to_string(),
            ));
        }
        if self.num_questions == 0 || self.num_questions > 10 {
            return Err(QuizcastError::Config(format!(
                "Question count must be between 1 and 10 (got {})",
                self.num_questions
            )));
        }
        if self.num_answers < 2 || self.num_answers > 5 {
            return Err(QuizcastError::Config(format!(
                "Answer count must be between 2 and 5 (got {})",
                self.num_answers
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub gemini_api_key: Option<String>,
    pub elevenlabs_api_key: Option<String>,
    /// Where artifacts (script, video) are written. Defaults to the cwd.
    pub output_dir: Option<PathBuf>,
    pub last_generation: GenerationConfig,
    #[serde(default)]
    pub recent_themes: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            gemini_api_key: None,
            elevenlabs_api_key: None,
            output_dir: None,
            last_generation: GenerationConfig::default(),
            recent_themes: Vec::new(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let mut config = Self::default();

        // Load from config file if it exists
        if let Some(config_path) = Self::config_file_path() {
            if config_path.exists() {
                let contents = std::fs::read_to_string(&config_path)?;
                if let Ok(file_config) = toml::from_str::<Config>(&contents) {
                    config = file_config;
                }
            }
        }

        // Override with environment variables
        if let Ok(key) = std::env::var("GEMINI_API_KEY") {
            config.gemini_api_key = Some(key);
        }
        if let Ok(key) = std::env::var("ELEVENLABS_API_KEY") {
            config.elevenlabs_api_key = Some(key);
        }
        if let Ok(dir) = std::env::var("QUIZCAST_OUTPUT_DIR") {
            config.output_dir = Some(PathBuf::from(dir));
        }

        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        let config_path = Self::config_file_path().ok_or_else(|| {
            QuizcastError::Config("Could not determine the user config directory".to_string())
        })?;
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = toml::to_string_pretty(self)
            .map_err(|e| QuizcastError::Config(format!("Failed to serialize config: {e}")))?;
        std::fs::write(config_path, contents)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.gemini_api_key.is_none() {
            return Err(QuizcastError::Config(
                "GEMINI_API_KEY not set. Get one at https://aistudio.google.com/apikey"
                    .to_string(),
            ));
        }
        if self.elevenlabs_api_key.is_none() {
            return Err(QuizcastError::Config(
                "ELEVENLABS_API_KEY not set. Get one at https://elevenlabs.io".to_string(),
            ));
        }
        Ok(())
    }

    /// Record a theme as most recently used. Case-insensitive dedupe,
    /// newest first, capped at [`MAX_RECENT_THEMES`].
    pub fn remember_theme(&mut self, theme: &str) {
        let theme = theme.trim();
        if theme.is_empty() {
            return;
        }
        let lowered = theme.to_lowercase();
        self.recent_themes.retain(|t| t.to_lowercase() != lowered);
        self.recent_themes.insert(0, theme.to_string());
        self.recent_themes.truncate(MAX_RECENT_THEMES);
    }

    /// Directory artifacts are written to.
    pub fn resolved_output_dir(&self) -> PathBuf {
        self.output_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from("."))
    }

    fn config_file_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("quizcast").join("config.toml"))
    }
}
