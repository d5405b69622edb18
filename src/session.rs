//! Session context for one game run. Replaces any global settings state:
//! constructed at game start, handed to the pipeline, discarded at teardown.

use crate::config::GenerationConfig;
use crate::content::{GeneratedContent, Quiz};
use crate::media::MediaStore;

/// Everything one run of the show owns: the generation request that produced
/// the content, the content itself, and whether this run records video.
#[derive(Debug)]
pub struct GameSession {
    generation: GenerationConfig,
    record: bool,
    store: MediaStore,
}

impl GameSession {
    pub fn new(generation: GenerationConfig, record: bool) -> Self {
        Self {
            generation,
            record,
            store: MediaStore::new(),
        }
    }

    /// Install a fresh generation, releasing whatever the previous one held.
    pub fn install(&mut self, content: GeneratedContent) {
        self.store.install(content);
    }

    /// Release all generated content.
    pub fn clear(&mut self) {
        self.store.clear();
    }

    pub fn store(&self) -> &MediaStore {
        &self.store
    }

    pub fn quiz(&self) -> Option<&Quiz> {
        self.store.quiz()
    }

    pub fn theme(&self) -> &str {
        &self.generation.theme
    }

    pub fn generation(&self) -> &GenerationConfig {
        &self.generation
    }

    pub fn record_requested(&self) -> bool {
        self.record
    }
}
