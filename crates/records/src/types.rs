//! Data types for theorem datasets, per-theorem results and run summaries.

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

/// A theorem to attempt, identified by its repository and declaration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TheoremDescriptor {
    /// Git URL of the Lean project declaring the theorem.
    pub url: String,
    /// Commit of the project to check out.
    pub commit: String,
    /// Source file, relative to the project root.
    pub file_path: String,
    /// Fully-qualified declaration name (unique key).
    pub full_name: String,
}

/// Load a dataset: a JSON array of theorem objects. Extra fields are ignored.
///
/// With `limit`, only the first `limit` entries are kept.
pub fn load_dataset(path: &Path, limit: Option<usize>) -> anyhow::Result<Vec<TheoremDescriptor>> {
    let contents = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("failed to read dataset {}: {e}", path.display()))?;
    let mut theorems: Vec<TheoremDescriptor> = serde_json::from_str(&contents)
        .map_err(|e| anyhow::anyhow!("invalid dataset {}: {e}", path.display()))?;

    if let Some(limit) = limit {
        theorems.truncate(limit);
    }
    tracing::info!(count = theorems.len(), path = %path.display(), "Loaded theorem dataset");
    Ok(theorems)
}

/// Why the search for one theorem ended.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Termination {
    /// A complete proof was found.
    Proved,
    /// Frontier emptied or the expansion budget ran out.
    #[default]
    Exhausted,
    /// The wall-clock budget ran out.
    TimedOut,
    /// The run was cancelled while this search was in flight.
    Interrupted,
    /// The theorem's repository could not be resolved.
    SetupFailed,
    /// The proof session could not be opened.
    OracleInitFailed,
    /// The proof session died during search.
    OracleCrashed,
    /// Anything else, including a panicked worker.
    UnknownError,
}

impl Termination {
    pub fn as_str(&self) -> &'static str {
        match self {
            Termination::Proved => "proved",
            Termination::Exhausted => "exhausted",
            Termination::TimedOut => "timed_out",
            Termination::Interrupted => "interrupted",
            Termination::SetupFailed => "setup_failed",
            Termination::OracleInitFailed => "oracle_init_failed",
            Termination::OracleCrashed => "oracle_crashed",
            Termination::UnknownError => "unknown_error",
        }
    }

    /// Whether the search did not run to a normal conclusion.
    pub fn is_error(&self) -> bool {
        matches!(
            self,
            Termination::SetupFailed
                | Termination::OracleInitFailed
                | Termination::OracleCrashed
                | Termination::UnknownError
        )
    }
}

impl fmt::Display for Termination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of searching for a proof of one theorem; one JSONL row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProofSearchResult {
    pub success: bool,
    pub theorem_name: String,
    /// Tactic sequence from the root, present exactly when `success`.
    pub proof_steps: Option<Vec<String>>,
    /// `proof_steps.len()`, present exactly when `success`.
    pub proof_length: Option<usize>,
    /// Wall-clock seconds spent on this theorem.
    pub search_time: f64,
    #[serde(default)]
    pub termination: Termination,
    #[serde(default)]
    pub expansions: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ProofSearchResult {
    pub fn proved(theorem_name: &str, steps: Vec<String>, search_time: f64, expansions: u32) -> Self {
        Self {
            success: true,
            theorem_name: theorem_name.to_string(),
            proof_length: Some(steps.len()),
            proof_steps: Some(steps),
            search_time,
            termination: Termination::Proved,
            expansions,
            error: None,
        }
    }

    /// A search that ran but found nothing.
    pub fn unproved(
        theorem_name: &str,
        termination: Termination,
        search_time: f64,
        expansions: u32,
    ) -> Self {
        Self {
            success: false,
            theorem_name: theorem_name.to_string(),
            proof_steps: None,
            proof_length: None,
            search_time,
            termination,
            expansions,
            error: None,
        }
    }

    /// A theorem-level failure: the search could not run or did not finish.
    pub fn failed(
        theorem_name: &str,
        termination: Termination,
        message: impl Into<String>,
        search_time: f64,
    ) -> Self {
        Self {
            error: Some(message.into()),
            ..Self::unproved(theorem_name, termination, search_time, 0)
        }
    }
}

/// Aggregate statistics over a results log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationSummary {
    pub model: String,
    pub total_theorems: usize,
    pub successful: usize,
    pub failed: usize,
    /// `successful / total_theorems`, 0.0 for an empty run.
    pub accuracy: f64,
    /// Mean proof length over successful results, 0.0 if none.
    pub avg_proof_length: f64,
    /// Mean search time over successful results, 0.0 if none.
    pub avg_search_time: f64,
    #[serde(default)]
    pub interrupted: bool,
}

/// Running totals folded from results as they complete.
#[derive(Debug, Clone, Default)]
pub struct SummaryAccumulator {
    total: usize,
    successful: usize,
    proof_length_sum: usize,
    search_time_sum: f64,
}

impl SummaryAccumulator {
    pub fn add(&mut self, result: &ProofSearchResult) {
        self.total += 1;
        if result.success {
            self.successful += 1;
            self.proof_length_sum += result.proof_length.unwrap_or(0);
            self.search_time_sum += result.search_time;
        }
    }

    pub fn total(&self) -> usize {
        self.total
    }

    pub fn successful(&self) -> usize {
        self.successful
    }

    pub fn finish(&self, model: &str, interrupted: bool) -> EvaluationSummary {
        let mean = |sum: f64| {
            if self.successful == 0 {
                0.0
            } else {
                sum / self.successful as f64
            }
        };
        EvaluationSummary {
            model: model.to_string(),
            total_theorems: self.total,
            successful: self.successful,
            failed: self.total - self.successful,
            accuracy: if self.total == 0 {
                0.0
            } else {
                self.successful as f64 / self.total as f64
            },
            avg_proof_length: mean(self.proof_length_sum as f64),
            avg_search_time: mean(self.search_time_sum),
            interrupted,
        }
    }
}

impl<'a> FromIterator<&'a ProofSearchResult> for SummaryAccumulator {
    fn from_iter<I: IntoIterator<Item = &'a ProofSearchResult>>(iter: I) -> Self {
        let mut acc = Self::default();
        for result in iter {
            acc.add(result);
        }
        acc
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn load_dataset_ignores_extra_fields_and_applies_limit() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"[
                {{"url": "https://github.com/a/b", "commit": "abc", "file_path": "B/C.lean", "full_name": "B.c", "start": [1, 2]}},
                {{"url": "https://github.com/a/b", "commit": "abc", "file_path": "B/D.lean", "full_name": "B.d"}}
            ]"#
        )
        .unwrap();

        let all = load_dataset(file.path(), None).unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].full_name, "B.c");

        let limited = load_dataset(file.path(), Some(1)).unwrap();
        assert_eq!(limited.len(), 1);
    }

    #[test]
    fn load_dataset_rejects_missing_fields() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"[{{"full_name": "x"}}]"#).unwrap();
        assert!(load_dataset(file.path(), None).is_err());
    }

    #[test]
    fn termination_serializes_snake_case() {
        let json = serde_json::to_string(&Termination::OracleInitFailed).unwrap();
        assert_eq!(json, "\"oracle_init_failed\"");
        assert_eq!(Termination::TimedOut.to_string(), "timed_out");
        assert!(Termination::OracleCrashed.is_error());
        assert!(!Termination::Interrupted.is_error());
    }

    #[test]
    fn proved_result_fields() {
        let r = ProofSearchResult::proved("t", vec!["intro n".into(), "rfl".into()], 1.5, 3);
        assert!(r.success);
        assert_eq!(r.proof_length, Some(2));
        assert_eq!(r.termination, Termination::Proved);

        let json = serde_json::to_value(&r).unwrap();
        assert_eq!(json["proof_steps"][1], "rfl");
        assert!(json.get("error").is_none());
    }

    #[test]
    fn failed_result_has_no_proof() {
        let r = ProofSearchResult::failed("t", Termination::SetupFailed, "no checkout", 0.1);
        assert!(!r.success);
        assert!(r.proof_steps.is_none());
        assert!(r.proof_length.is_none());
        assert_eq!(r.error.as_deref(), Some("no checkout"));

        let json = serde_json::to_value(&r).unwrap();
        assert!(json["proof_steps"].is_null());
        assert_eq!(json["termination"], "setup_failed");
    }

    #[test]
    fn legacy_rows_without_supplementary_fields_parse() {
        let row = r#"{"success": false, "theorem_name": "x", "proof_steps": null, "proof_length": null, "search_time": 300.2}"#;
        let r: ProofSearchResult = serde_json::from_str(row).unwrap();
        assert_eq!(r.expansions, 0);
        assert!(r.error.is_none());
    }

    #[test]
    fn summary_of_empty_run_is_zero() {
        let summary = SummaryAccumulator::default().finish("m", false);
        assert_eq!(summary.total_theorems, 0);
        assert_eq!(summary.accuracy, 0.0);
        assert_eq!(summary.avg_proof_length, 0.0);
        assert_eq!(summary.avg_search_time, 0.0);
    }

    #[test]
    fn summary_averages_over_successes_only() {
        let results = [
            ProofSearchResult::proved("a", vec!["x".into()], 2.0, 1),
            ProofSearchResult::proved("b", vec!["x".into(), "y".into(), "z".into()], 4.0, 5),
            ProofSearchResult::unproved("c", Termination::TimedOut, 300.0, 40),
            ProofSearchResult::failed("d", Termination::OracleCrashed, "died", 1.0),
        ];
        let summary = results.iter().collect::<SummaryAccumulator>().finish("m", true);

        assert_eq!(summary.total_theorems, 4);
        assert_eq!(summary.successful, 2);
        assert_eq!(summary.failed, 2);
        assert_eq!(summary.accuracy, 0.5);
        assert_eq!(summary.avg_proof_length, 2.0);
        assert_eq!(summary.avg_search_time, 3.0);
        assert!(summary.interrupted);
    }
}
