use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::{PageEngine, PageEvent, TraceFrame};

/// A running page host. Until it has been reaped, dropping this kills the
/// host and every helper it forked.
struct HostProcess {
    child: tokio::process::Child,
    #[cfg(unix)]
    group: Option<libc::pid_t>,
    reaped: bool,
}

impl HostProcess {
    fn new(child: tokio::process::Child) -> Self {
        Self {
            #[cfg(unix)]
            group: child.id().map(|pid| pid as libc::pid_t),
            child,
            reaped: false,
        }
    }

    /// Wait for the host to exit on its own and return its exit code.
    async fn wait(&mut self) -> Result<Option<i32>> {
        let status = self
            .child
            .wait()
            .await
            .context("failed to wait for engine")?;
        self.reaped = true;
        Ok(status.code())
    }
}

impl Drop for HostProcess {
    fn drop(&mut self) {
        if self.reaped {
            return;
        }
        // The host leads its own group, so a negative pid reaches its helpers too.
        #[cfg(unix)]
        if let Some(group) = self.group {
            unsafe { libc::kill(-group, libc::SIGKILL) };
        }
        let _ = self.child.start_kill();
    }
}

const BRIDGE_SOURCE: &str = include_str!("../../bridge/page-bridge.js");

/// Engine backed by a PhantomJS-compatible host process.
///
/// The host runs an embedded bridge script that opens the document and
/// reports page activity as NDJSON on its stdout.
pub struct PhantomEngine {
    program: String,
    args: Vec<String>,
    name: String,
}

impl PhantomEngine {
    pub fn new(program: String, args: Vec<String>) -> Self {
        let name = Path::new(&program)
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or(&program)
            .to_string();
        Self {
            program,
            args,
            name,
        }
    }
}

/// Put the bridge script on disk for the host. The file is removed when the
/// handle drops, so the caller keeps it alive for the whole session.
fn bridge_script() -> Result<tempfile::NamedTempFile> {
    let mut script = tempfile::Builder::new()
        .prefix("qdriver-bridge-")
        .suffix(".js")
        .tempfile()
        .context("failed to create bridge script")?;
    script
        .write_all(BRIDGE_SOURCE.as_bytes())
        .and_then(|()| script.flush())
        .context("failed to write bridge script")?;
    Ok(script)
}

#[async_trait]
impl PageEngine for PhantomEngine {
    async fn open(&self, url: &str, tx: mpsc::UnboundedSender<PageEvent>) -> Result<()> {
        let bridge_file = bridge_script()?;

        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args).arg(bridge_file.path()).arg(url);

        debug!(command = ?cmd.as_std(), "spawning page engine");

        // Own process group, so HostProcess can kill everything the host forks.
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            cmd.as_std_mut().process_group(0);
        }

        let mut child = cmd
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .spawn()
            .with_context(|| format!("failed to spawn {}", self.program))?;

        let stdout = child.stdout.take().context("missing stdout")?;
        let stderr = child.stderr.take().context("missing stderr")?;

        // Aborting the session drops this future, and with it the host.
        let mut host = HostProcess::new(child);

        let stderr_handle = tokio::spawn(async move {
            let reader = BufReader::new(stderr);
            let mut lines = reader.lines();
            while let Ok(Some(line)) = lines.next_line().await {
                debug!(target: "qdriver::engine::stderr", "{}", line);
            }
        });

        let reader = BufReader::new(stdout);
        let mut lines = reader.lines();

        while let Some(line) = lines
            .next_line()
            .await
            .context("failed to read engine output")?
        {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            debug!(target: "qdriver::engine::stdout", "{}", line);

            match serde_json::from_str::<BridgeEvent>(line) {
                Ok(event) => {
                    if tx.send(event.into_page_event()).is_err() {
                        // Supervisor is gone; the run is over.
                        break;
                    }
                }
                Err(_) => {
                    debug!("ignoring non-bridge output from engine");
                }
            }
        }

        stderr_handle.await.ok();

        let code = host.wait().await?;

        if code != Some(0) {
            warn!(engine = %self.name, ?code, "page engine exited abnormally");
        }
        let _ = tx.send(PageEvent::Exited { code });

        // Keep the bridge file alive until the host exits.
        drop(bridge_file);

        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }
}

// --- Bridge NDJSON deserialization ---

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
enum BridgeEvent {
    Open {
        status: String,
    },
    Console {
        #[serde(default)]
        message: String,
    },
    PageError {
        message: String,
        #[serde(default)]
        trace: Vec<TraceFrame>,
    },
    HostError {
        message: String,
        #[serde(default)]
        trace: Vec<TraceFrame>,
    },
}

impl BridgeEvent {
    fn into_page_event(self) -> PageEvent {
        match self {
            BridgeEvent::Open { status } => PageEvent::Opened {
                success: status == "success",
            },
            BridgeEvent::Console { message } => PageEvent::Console { message },
            BridgeEvent::PageError { message, trace } => PageEvent::ScriptError { message, trace },
            BridgeEvent::HostError { message, trace } => PageEvent::HostError { message, trace },
        }
    }
}
