//! Supervises one test document from open to verdict.
//!
//! [`Run`] is the synchronous state machine (`Idle -> Loading -> Running ->
//! Done`); [`Supervisor`] feeds it engine events and watchdog expiries from
//! a single task, so handlers never run concurrently.

pub mod watchdog;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::aggregator::{Aggregator, Progress};
use crate::engine::{PageEngine, PageEvent, TraceFrame, format_trace};
use crate::models::{Payload, RunOutcome, RunVerdict};
use crate::protocol;

use watchdog::{Watchdog, expiry};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Loading,
    Running,
    Done,
}

/// What the supervisor must do after a handler ran.
#[derive(Debug, PartialEq)]
pub enum Step {
    /// Nothing changed; leave the watchdog alone.
    Ignored,
    /// Qualifying activity; restart the watchdog.
    Rearm,
    Finish {
        outcome: RunOutcome,
        payload: Payload,
    },
}

/// State of one document's execution.
#[derive(Debug)]
pub struct Run {
    document: PathBuf,
    url: String,
    timeout_secs: u64,
    state: RunState,
    aggregator: Aggregator,
}

impl Run {
    pub fn new(document: &Path, timeout_secs: u64) -> Self {
        Self {
            document: document.to_path_buf(),
            url: format!("file://{}", document.display()),
            timeout_secs,
            state: RunState::Idle,
            aggregator: Aggregator::new(),
        }
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// `Idle -> Loading`. The watchdog also guards a load that never reports back.
    pub fn begin(&mut self) -> Step {
        if self.state != RunState::Idle {
            return Step::Ignored;
        }
        self.state = RunState::Loading;
        Step::Rearm
    }

    pub fn handle(&mut self, event: PageEvent) -> Step {
        if self.state == RunState::Done {
            debug!(?event, "run finalized, ignoring event");
            return Step::Ignored;
        }

        match event {
            PageEvent::Opened { success: true } => {
                self.state = RunState::Running;
                Step::Rearm
            }
            PageEvent::Opened { success: false } => {
                self.state = RunState::Done;
                self.aggregator.seal();
                Step::Finish {
                    outcome: RunOutcome::LoadFailure,
                    payload: Payload::Text(format!("Unable to run test at {}", self.url)),
                }
            }
            PageEvent::Console { message } => self.on_console(&message),
            PageEvent::ScriptError { message, trace } | PageEvent::HostError { message, trace } => {
                self.fail(message, &trace)
            }
            PageEvent::Exited { code } => {
                let code = code.map_or_else(|| "none".to_string(), |c| c.to_string());
                self.fail(
                    format!("page engine exited before the run completed (exit code {code})"),
                    &[],
                )
            }
        }
    }

    /// The watchdog fired with no qualifying activity in the window.
    pub fn expire(&mut self) -> Step {
        if self.state == RunState::Done {
            return Step::Ignored;
        }
        let document = self.document.display();
        self.aggregator.record_global_failure(
            format!(
                "{document} timed out. No activity for {} seconds.",
                self.timeout_secs
            ),
            format!("    at {document}"),
        );
        self.finish(RunOutcome::Timeout)
    }

    fn on_console(&mut self, message: &str) -> Step {
        match protocol::parse(message) {
            Ok(None) => Step::Ignored,
            Ok(Some(wire)) => match self.aggregator.ingest(wire) {
                Progress::Continue => Step::Rearm,
                Progress::Complete => {
                    let outcome = if self.aggregator.any_failure() {
                        RunOutcome::AssertionFailure
                    } else {
                        RunOutcome::Success
                    };
                    self.finish(outcome)
                }
                Progress::Rejected => Step::Ignored,
            },
            Err(e) => {
                warn!(error = %e, "undecodable driver message");
                self.fail(e.to_string(), &[])
            }
        }
    }

    /// Page-level failure: partial results are not trustworthy, keep only this one.
    fn fail(&mut self, message: String, trace: &[TraceFrame]) -> Step {
        let source = if trace.is_empty() {
            format!("    at {}\n", self.url)
        } else {
            format_trace(trace)
        };
        self.aggregator.replace_with_failure(message, source);
        self.finish(RunOutcome::PageError)
    }

    fn finish(&mut self, outcome: RunOutcome) -> Step {
        self.state = RunState::Done;
        Step::Finish {
            outcome,
            payload: Payload::Report(self.aggregator.seal()),
        }
    }
}

enum Wake {
    Event(Option<PageEvent>),
    Expired,
}

/// Wait for the next engine event or the watchdog deadline. A message that
/// is ready together with the deadline counts as activity, not as a timeout.
async fn next_wake(rx: &mut mpsc::UnboundedReceiver<PageEvent>, deadline: Option<Instant>) -> Wake {
    tokio::select! {
        biased;
        event = rx.recv() => Wake::Event(event),
        () = expiry(deadline) => Wake::Expired,
    }
}

/// Runs documents through a page engine, one run per call.
pub struct Supervisor {
    engine: Arc<dyn PageEngine>,
    timeout_secs: u64,
}

impl Supervisor {
    pub fn new(engine: Arc<dyn PageEngine>, timeout_secs: u64) -> Self {
        Self {
            engine,
            timeout_secs,
        }
    }

    pub async fn run_document(&self, document: &Path) -> RunVerdict {
        let started = Instant::now();
        let mut run = Run::new(document, self.timeout_secs);
        let mut watchdog = Watchdog::new(Duration::from_secs(self.timeout_secs));
        let (tx, mut rx) = mpsc::unbounded_channel();

        info!(
            document = %document.display(),
            engine = self.engine.name(),
            timeout_secs = self.timeout_secs,
            "starting run"
        );

        let mut step = run.begin();
        let session = self.open_session(run.url().to_string(), tx);

        loop {
            match step {
                Step::Ignored => {}
                Step::Rearm => watchdog.arm(),
                Step::Finish { outcome, payload } => {
                    watchdog.cancel();
                    // Dropping the engine future releases the page.
                    session.abort();
                    let elapsed = started.elapsed();
                    info!(
                        document = %document.display(),
                        outcome = outcome.label(),
                        elapsed_ms = elapsed.as_millis() as u64,
                        "run finished"
                    );
                    return RunVerdict {
                        outcome,
                        payload,
                        elapsed,
                    };
                }
            }

            let wake = next_wake(&mut rx, watchdog.deadline()).await;

            step = match wake {
                Wake::Event(Some(event)) => {
                    if matches!(event, PageEvent::Opened { .. }) {
                        watchdog.cancel();
                    }
                    run.handle(event)
                }
                // Every sender is gone without a terminal event.
                Wake::Event(None) => run.handle(PageEvent::Exited { code: None }),
                Wake::Expired => {
                    debug!(window = ?watchdog.window(), "watchdog expired");
                    watchdog.cancel();
                    run.expire()
                }
            };
        }
    }

    fn open_session(&self, url: String, tx: mpsc::UnboundedSender<PageEvent>) -> JoinHandle<()> {
        let engine = Arc::clone(&self.engine);
        tokio::spawn(async move {
            if let Err(e) = engine.open(&url, tx.clone()).await {
                let _ = tx.send(PageEvent::HostError {
                    message: format!("{e:#}"),
                    trace: Vec::new(),
                });
            }
        })
    }
}
