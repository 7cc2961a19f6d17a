use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{debug, info};

use crate::config::DiscoveryConfig;
use crate::models::RunVerdict;
use crate::supervisor::Supervisor;

/// Verdict for one document of a directory run.
#[derive(Debug)]
pub struct DocumentRun {
    pub document: PathBuf,
    pub verdict: RunVerdict,
}

/// Find test documents under `root`, sorted, with ignore patterns applied.
pub fn discover(root: &Path, discovery: &DiscoveryConfig) -> Result<Vec<PathBuf>> {
    // The root is a literal path; only the configured pattern may glob.
    let pattern = Path::new(&glob::Pattern::escape(&root.to_string_lossy()))
        .join(&discovery.pattern)
        .to_string_lossy()
        .to_string();

    let ignore = discovery
        .ignore
        .iter()
        .map(|p| glob::Pattern::new(p).with_context(|| format!("invalid ignore pattern `{p}`")))
        .collect::<Result<Vec<_>>>()?;

    let mut documents = Vec::new();
    for entry in glob::glob(&pattern)
        .with_context(|| format!("invalid discovery pattern `{}`", discovery.pattern))?
        .flatten()
    {
        if !entry.is_file() {
            continue;
        }
        let relative = entry.strip_prefix(root).unwrap_or(&entry);
        if ignore.iter().any(|p| p.matches_path(relative)) {
            debug!(document = %entry.display(), "ignored by config");
            continue;
        }
        if !documents.contains(&entry) {
            documents.push(entry);
        }
    }

    documents.sort();
    Ok(documents)
}

/// Run every document in turn; each gets exactly one attempt and a fresh run.
pub async fn run_all(supervisor: &Supervisor, documents: Vec<PathBuf>) -> Vec<DocumentRun> {
    let total = documents.len();
    let mut runs = Vec::with_capacity(total);

    for (idx, document) in documents.into_iter().enumerate() {
        info!(document = %document.display(), "running document {}/{}", idx + 1, total);
        let verdict = supervisor.run_document(&document).await;
        runs.push(DocumentRun { document, verdict });
    }

    runs
}

pub fn any_failed(runs: &[DocumentRun]) -> bool {
    runs.iter().any(|r| r.verdict.failed())
}
