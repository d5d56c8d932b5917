//! Reads results logs back for resuming runs and recomputing summaries.

use std::collections::{HashMap, HashSet};
use std::io::{BufRead, BufReader};
use std::path::Path;

use crate::types::{EvaluationSummary, ProofSearchResult, SummaryAccumulator, Termination};

/// Static methods for reading JSONL results logs.
pub struct ResultsReader;

impl ResultsReader {
    /// Read every parseable row. Malformed lines (e.g. a row cut short by a
    /// crash) are skipped with a warning.
    pub fn read_all(path: &Path) -> anyhow::Result<Vec<ProofSearchResult>> {
        let file = std::fs::File::open(path)
            .map_err(|e| anyhow::anyhow!("failed to open {}: {e}", path.display()))?;

        let mut results = Vec::new();
        for (i, line) in BufReader::new(file).lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<ProofSearchResult>(&line) {
                Ok(result) => results.push(result),
                Err(e) => tracing::warn!(
                    line = i + 1,
                    error = %e,
                    path = %path.display(),
                    "Skipping malformed results row"
                ),
            }
        }

        tracing::debug!(count = results.len(), path = %path.display(), "Read results log");
        Ok(results)
    }

    /// One row per theorem: a later row for the same theorem replaces an earlier one.
    pub fn read_latest(path: &Path) -> anyhow::Result<Vec<ProofSearchResult>> {
        let mut index: HashMap<String, usize> = HashMap::new();
        let mut latest: Vec<ProofSearchResult> = Vec::new();
        for result in Self::read_all(path)? {
            match index.get(&result.theorem_name) {
                Some(&i) => latest[i] = result,
                None => {
                    index.insert(result.theorem_name.clone(), latest.len());
                    latest.push(result);
                }
            }
        }
        Ok(latest)
    }

    /// Theorems with a final row; interrupted rows are not final.
    pub fn completed_theorems(path: &Path) -> anyhow::Result<HashSet<String>> {
        Ok(Self::read_latest(path)?
            .into_iter()
            .filter(|r| r.termination != Termination::Interrupted)
            .map(|r| r.theorem_name)
            .collect())
    }

    /// Recompute the summary for a results log.
    pub fn read_summary(path: &Path, model: &str) -> anyhow::Result<EvaluationSummary> {
        let results = Self::read_latest(path)?;
        let interrupted = results
            .iter()
            .any(|r| r.termination == Termination::Interrupted);
        Ok(results
            .iter()
            .collect::<SummaryAccumulator>()
            .finish(model, interrupted))
    }
}
