//! Downloadable artifacts: the narration script and the recorded video,
//! written as named files into the output directory.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::Local;
use regex::Regex;
use tracing::info;

use crate::error::{QuizcastError, Result};

/// Writes named artifacts into one output directory, never overwriting an
/// existing file.
pub struct ArtifactSink {
    output_dir: PathBuf,
}

impl ArtifactSink {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Save the narration script as `roteiro_quiz_{theme}.txt`.
    pub fn save_script(&self, theme: &str, script: &str) -> Result<PathBuf> {
        let name = format!("roteiro_quiz_{}", sanitize_theme(theme));
        let path = self.place(&name, "txt")?;
        fs::write(&path, script)?;
        info!("Script saved to {}", path.display());
        Ok(path)
    }

    /// Save the recording as `quiz_{theme}_{date}.webm`. Empty video bytes
    /// are refused instead of written as a broken file.
    pub fn save_video(&self, theme: &str, bytes: &[u8]) -> Result<PathBuf> {
        if bytes.is_empty() {
            return Err(QuizcastError::EmptyCapture);
        }
        let date = Local::now().format("%Y-%m-%d");
        let name = format!("quiz_{}_{}", sanitize_theme(theme), date);
        let path = self.place(&name, "webm")?;
        fs::write(&path, bytes)?;
        info!("Recording saved to {} ({} bytes)", path.display(), bytes.len());
        Ok(path)
    }

    /// Resolve a non-colliding path for `{stem}.{ext}`, suffixing `_1`,
    /// `_2`, ... when the name is taken.
    fn place(&self, stem: &str, ext: &str) -> Result<PathBuf> {
        fs::create_dir_all(&self.output_dir)?;
        let candidate = self.output_dir.join(format!("{stem}.{ext}"));
        if !candidate.exists() {
            return Ok(candidate);
        }
        for n in 1..1000 {
            let candidate = self.output_dir.join(format!("{stem}_{n}.{ext}"));
            if !candidate.exists() {
                return Ok(candidate);
            }
        }
        Err(QuizcastError::Config(format!(
            "could not find a free filename for {stem}.{ext} in {}",
            self.output_dir.display()
        )))
    }
}

/// Lowercase the theme and collapse anything that is not alphanumeric into
/// single underscores, so themes like "Anos 80!" become safe filenames.
pub fn sanitize_theme(theme: &str) -> String {
    let collapse = Regex::new(r"[^a-z0-9]+").expect("valid regex");
    let sanitized = collapse
        .replace_all(&theme.to_lowercase(), "_")
        .trim_matches('_')
        .to_string();
    if sanitized.is_empty() {
        "quiz".to_string()
    } else {
        sanitized
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_sanitize_theme() {
        assert_eq!(sanitize_theme("Cinema"), "cinema");
        assert_eq!(sanitize_theme("Anos 80!"), "anos_80");
        assert_eq!(sanitize_theme("  História do Brasil  "), "hist_ria_do_brasil");
        assert_eq!(sanitize_theme("!!!"), "quiz");
    }

    #[test]
    fn test_save_script_writes_named_file() {
        let dir = tempdir().unwrap();
        let sink = ArtifactSink::new(dir.path());

        let path = sink.save_script("Cinema", "Roteiro do Quiz: Cinema").unwrap();
        assert_eq!(path.file_name().unwrap(), "roteiro_quiz_cinema.txt");
        assert_eq!(fs::read_to_string(&path).unwrap(), "Roteiro do Quiz: Cinema");
    }

    #[test]
    fn test_collisions_get_suffixed() {
        let dir = tempdir().unwrap();
        let sink = ArtifactSink::new(dir.path());

        let first = sink.save_script("Cinema", "a").unwrap();
        let second = sink.save_script("Cinema", "b").unwrap();
        assert_ne!(first, second);
        assert_eq!(second.file_name().unwrap(), "roteiro_quiz_cinema_1.txt");
    }

    #[test]
    fn test_save_video_names_by_theme_and_date() {
        let dir = tempdir().unwrap();
        let sink = ArtifactSink::new(dir.path());

        let path = sink.save_video("Anos 80", &[0x1a, 0x45, 0xdf, 0xa3]).unwrap();
        let name = path.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("quiz_anos_80_"));
        assert!(name.ends_with(".webm"));
    }

    #[test]
    fn test_save_video_refuses_empty_bytes() {
        let dir = tempdir().unwrap();
        let sink = ArtifactSink::new(dir.path());
        assert!(matches!(
            sink.save_video("Cinema", &[]),
            Err(QuizcastError::EmptyCapture)
        ));
    }

    #[test]
    fn test_output_dir_is_created_on_demand() {
        let dir = tempdir().unwrap();
        let nested = dir.path().join("shows/today");
        let sink = ArtifactSink::new(&nested);
        sink.save_script("Cinema", "x").unwrap();
        assert!(nested.is_dir());
    }
}
