// Configuration management: TOML settings under the base directory plus the
// interactive setup flow

pub mod interactive;
pub mod settings;


pub use interactive::{run_interactive_config, show_config};
pub use settings::{Config, ConfigError, EmbeddingConfig, EmbeddingProvider, RetrievalConfig};

use std::path::PathBuf;

/// Environment variable overriding the default base directory; bound to the
/// global `--base-dir` flag by the CLI
pub const BASE_DIR_ENV: &str = "DOCS_RAG_HOME";

/// Resolve the base directory: an explicit path (flag or `DOCS_RAG_HOME`, as
/// parsed by the CLI) wins, then `~/.docs-rag`
#[inline]
pub fn resolve_base_dir(explicit: Option<PathBuf>) -> Result<PathBuf, ConfigError> {
    match explicit {
        Some(dir) => Ok(dir),
        None => Config::default_base_dir(),
    }
}
