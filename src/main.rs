use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use clap::error::ErrorKind;
use tracing::error;

use qdriver::aggregator::Aggregator;
use qdriver::config::Config;
use qdriver::reporter::{self, Format};
use qdriver::supervisor::Supervisor;
use qdriver::{batch, engine, logging};

const TIMEOUT_USAGE: &str = "Timeout value must be a number, if supplied!";

/// Run a browser-hosted QUnit suite headlessly and report its results as JSON.
#[derive(Debug, Parser)]
#[command(name = "qdriver", version, about)]
struct Cli {
    /// Test document (HTML), or a directory to search for test documents.
    path: PathBuf,

    /// Seconds without test activity before the run is declared hung [default: 15].
    timeout: Option<String>,

    /// Command line of the PhantomJS-compatible engine.
    #[arg(long, env = "QDRIVER_ENGINE")]
    engine: Option<String>,

    /// Output format.
    #[arg(long, value_enum, default_value_t = Format::Json)]
    format: Format,

    /// Config file to use instead of ./qdriver.toml.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log driver activity to stderr.
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            // Usage goes to stdout like every other driver message.
            print!("{}", e.render());
            let code = match e.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => 0,
                _ => 1,
            };
            return ExitCode::from(code);
        }
    };

    logging::init(cli.verbose);

    match run(cli).await {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            error!(error = %format!("{e:#}"), "driver failed");
            println!("{}", fault_report(&e));
            ExitCode::from(1)
        }
    }
}

async fn run(cli: Cli) -> Result<u8> {
    let cwd = std::env::current_dir().context("failed to read working directory")?;

    let config = match &cli.config {
        Some(path) => Config::load_file(&resolve(&cwd, path)),
        None => Config::load(&cwd),
    };

    let timeout = match parse_timeout(cli.timeout.as_deref(), config.run.timeout) {
        Some(timeout) => timeout,
        None => {
            println!("{TIMEOUT_USAGE}");
            return Ok(1);
        }
    };

    let path = resolve(&cwd, &cli.path);
    if !path.exists() {
        println!("Unable to run test at file://{}", path.display());
        return Ok(1);
    }

    let mut engine_config = config.engine;
    if let Some(command) = cli.engine {
        engine_config.command = command;
    }
    let engine = engine::build(&engine_config)?;
    let supervisor = Supervisor::new(engine, timeout);

    if path.is_dir() {
        let documents = batch::discover(&path, &config.discovery)?;
        if documents.is_empty() {
            println!(
                "No test documents matching {} under {}",
                config.discovery.pattern,
                path.display()
            );
            return Ok(1);
        }

        let runs = batch::run_all(&supervisor, documents).await;
        println!("{}", reporter::render_batch(cli.format, &runs)?);
        return Ok(if batch::any_failed(&runs) { 1 } else { 0 });
    }

    let verdict = supervisor.run_document(&path).await;
    let document = path.display().to_string();
    println!(
        "{}",
        reporter::render_single(cli.format, &document, &verdict)?
    );
    Ok(verdict.outcome.exit_code())
}

/// `None` when the supplied value is not a positive whole number of seconds.
fn parse_timeout(arg: Option<&str>, default: u64) -> Option<u64> {
    match arg {
        None => Some(default).filter(|&secs| secs > 0),
        Some(raw) if !raw.is_empty() && raw.bytes().all(|b| b.is_ascii_digit()) => {
            raw.parse::<u64>().ok().filter(|&secs| secs > 0)
        }
        Some(_) => None,
    }
}

fn resolve(cwd: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        cwd.join(path)
    }
}

/// A driver fault, shaped like any other failed run.
fn fault_report(err: &anyhow::Error) -> String {
    let mut aggregator = Aggregator::new();
    aggregator.record_global_failure(format!("{err:#}"), engine::format_error_chain(err));
    serde_json::to_string(&aggregator.seal())
        .unwrap_or_else(|_| format!("{{\"error\":{:?}}}", err.to_string()))
}
