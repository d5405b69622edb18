pub mod artifacts;
pub mod capture;
pub mod config;
pub mod content;
pub mod error;
pub mod interactive;
pub mod media;
pub mod pipeline;
pub mod playback;
pub mod screen;
pub mod session;

pub use config::{Config, GenerationConfig};
pub use error::{QuizcastError, Result};
pub use pipeline::{print_summary, run_show, ShowConfig, ShowResult};
