use std::path::Path;

use serde::Deserialize;
use tracing::warn;

pub const CONFIG_FILE: &str = "qdriver.toml";
pub const DEFAULT_TIMEOUT_SECS: u64 = 15;

#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub run: RunConfig,
    #[serde(default)]
    pub discovery: DiscoveryConfig,
}

/// Which headless browser host opens the documents.
#[derive(Debug, Deserialize)]
pub struct EngineConfig {
    /// Command line of a PhantomJS-compatible host, split like a shell would.
    /// Example: "phantomjs --ignore-ssl-errors=true"
    #[serde(default = "default_engine_command")]
    pub command: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            command: default_engine_command(),
        }
    }
}

fn default_engine_command() -> String {
    "phantomjs".into()
}

#[derive(Debug, Deserialize)]
pub struct RunConfig {
    /// Seconds without protocol activity before a run is declared hung.
    #[serde(default = "default_timeout")]
    pub timeout: u64,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            timeout: default_timeout(),
        }
    }
}

fn default_timeout() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

/// Controls which documents a directory run picks up.
#[derive(Debug, Deserialize)]
pub struct DiscoveryConfig {
    /// Glob (relative to the directory being run) that selects test documents.
    #[serde(default = "default_pattern")]
    pub pattern: String,
    /// Glob patterns (relative to the same directory) of documents to skip.
    /// Example: ["vendor/**", "**/Slow*Test.html"]
    #[serde(default)]
    pub ignore: Vec<String>,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            pattern: default_pattern(),
            ignore: Vec::new(),
        }
    }
}

fn default_pattern() -> String {
    "**/*Test.html".into()
}

impl Config {
    /// Load `qdriver.toml` from `dir`, falling back to defaults if absent or invalid.
    pub fn load(dir: &Path) -> Self {
        Self::load_file(&dir.join(CONFIG_FILE))
    }

    pub fn load_file(path: &Path) -> Self {
        let Ok(content) = std::fs::read_to_string(path) else {
            return Self::default();
        };
        match toml::from_str(&content) {
            Ok(config) => config,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "ignoring invalid config");
                Self::default()
            }
        }
    }
}
