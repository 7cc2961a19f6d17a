pub mod phantom;

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::mpsc;

use crate::config::EngineConfig;

/// One stack frame reported with a script error.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TraceFrame {
    pub file: String,
    pub line: u32,
    #[serde(default)]
    pub function: Option<String>,
}

/// Events streamed from a page engine into the supervisor.
#[derive(Debug, Clone, PartialEq)]
pub enum PageEvent {
    /// The document finished opening.
    Opened { success: bool },
    /// A console message from the page. Protocol messages travel this way.
    Console { message: String },
    /// Uncaught error inside the page.
    ScriptError {
        message: String,
        trace: Vec<TraceFrame>,
    },
    /// Failure in the engine host or in the driver's own script.
    HostError {
        message: String,
        trace: Vec<TraceFrame>,
    },
    /// The engine process ended.
    Exited { code: Option<i32> },
}

/// A headless browser host able to open one document and report what happens on it.
#[async_trait]
pub trait PageEngine: Send + Sync {
    /// Open `url` and stream events until the page session ends.
    /// The returned future is dropped when the run finalizes; implementations
    /// must release the page when that happens.
    async fn open(&self, url: &str, tx: mpsc::UnboundedSender<PageEvent>) -> Result<()>;

    /// Display name for this engine (e.g., "phantomjs").
    fn name(&self) -> &str;
}

/// Construct the engine described by the configuration.
pub fn build(config: &EngineConfig) -> Result<Arc<dyn PageEngine>> {
    let words = shell_words::split(&config.command)
        .with_context(|| format!("invalid engine command `{}`", config.command))?;
    let (program, args) = words
        .split_first()
        .context("engine command is empty")?;

    Ok(Arc::new(phantom::PhantomEngine::new(
        program.clone(),
        args.to_vec(),
    )))
}

/// Render frames as `"    at <file>:<line>\n"` lines.
pub fn format_trace(frames: &[TraceFrame]) -> String {
    frames
        .iter()
        .map(|frame| format!("    at {}:{}\n", frame.file, frame.line))
        .collect()
}

/// Render an error chain in the same shape as a page stack trace.
pub fn format_error_chain(err: &anyhow::Error) -> String {
    err.chain().map(|cause| format!("    at {}\n", cause)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trace_has_one_line_per_frame() {
        let frames = vec![
            TraceFrame {
                file: "file:///tmp/app.js".into(),
                line: 12,
                function: Some("boot".into()),
            },
            TraceFrame {
                file: "file:///tmp/tests.js".into(),
                line: 3,
                function: None,
            },
        ];
        assert_eq!(
            format_trace(&frames),
            "    at file:///tmp/app.js:12\n    at file:///tmp/tests.js:3\n"
        );
        assert_eq!(format_trace(&[]), "");
    }

    #[test]
    fn error_chain_lists_every_cause() {
        let err = anyhow::anyhow!("no such file").context("failed to spawn phantomjs");
        assert_eq!(
            format_error_chain(&err),
            "    at failed to spawn phantomjs\n    at no such file\n"
        );
    }

    #[test]
    fn build_splits_command_words() {
        let config = EngineConfig {
            command: "phantomjs --ignore-ssl-errors=true".into(),
        };
        let engine = build(&config).unwrap();
        assert_eq!(engine.name(), "phantomjs");
    }

    #[test]
    fn build_rejects_empty_command() {
        let config = EngineConfig {
            command: "   ".into(),
        };
        assert!(build(&config).is_err());
    }
}
