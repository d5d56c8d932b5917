//! TOML config loading for the prover CLI.
//!
//! Deserializes `configs/eval.toml`, which has `[evaluation]`, `[search]`,
//! `[generator]` and `[oracle]` sections, then merges CLI overrides.

use std::path::{Path, PathBuf};

use lean_repl::SessionConfig;
use policy::{GeneratorConfig, Provider};
use search::SearchConfig;
use serde::Deserialize;

/// Top-level structure matching `configs/eval.toml`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EvalToml {
    #[serde(default)]
    pub evaluation: EvaluationConfig,
    /// Search budgets.
    #[serde(default)]
    pub search: SearchConfig,
    /// Sampling settings. `provider`, `model` and `num_samples` here are
    /// replaced by the `[evaluation]` values.
    #[serde(default)]
    pub generator: GeneratorConfig,
    #[serde(default)]
    pub oracle: OracleConfig,
}

/// What to evaluate, with which model, and where to write results.
#[derive(Debug, Clone, Deserialize)]
pub struct EvaluationConfig {
    #[serde(default)]
    pub provider: Provider,
    #[serde(default = "default_model")]
    pub model: String,
    /// Generator requests per proof state.
    #[serde(default = "default_num_samples")]
    pub num_samples: usize,
    #[serde(default = "default_dataset_path")]
    pub dataset_path: PathBuf,
    /// Directory receiving `results.jsonl` and `summary.json`.
    #[serde(default = "default_output_path")]
    pub output_path: PathBuf,
    /// Theorems searched concurrently.
    #[serde(default = "default_num_workers")]
    pub num_workers: usize,
    /// Evaluate only the first `limit` dataset entries.
    #[serde(default)]
    pub limit: Option<usize>,
}

fn default_model() -> String {
    GeneratorConfig::default().model
}
fn default_num_samples() -> usize {
    GeneratorConfig::default().num_samples
}
fn default_dataset_path() -> PathBuf {
    PathBuf::from("data/sample_theorems.json")
}
fn default_output_path() -> PathBuf {
    PathBuf::from("output/eval")
}
fn default_num_workers() -> usize {
    4
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            provider: Provider::default(),
            model: default_model(),
            num_samples: default_num_samples(),
            dataset_path: default_dataset_path(),
            output_path: default_output_path(),
            num_workers: default_num_workers(),
            limit: None,
        }
    }
}

/// Pantograph session settings plus where repository checkouts live.
#[derive(Debug, Clone, Deserialize)]
pub struct OracleConfig {
    #[serde(flatten)]
    pub session: SessionConfig,
    #[serde(default = "default_repos_dir")]
    pub repos_dir: PathBuf,
    /// Clone repositories that are not checked out yet.
    #[serde(default = "default_fetch_missing")]
    pub fetch_missing: bool,
}

fn default_repos_dir() -> PathBuf {
    PathBuf::from("repos")
}
fn default_fetch_missing() -> bool {
    true
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            session: SessionConfig::default(),
            repos_dir: default_repos_dir(),
            fetch_missing: default_fetch_missing(),
        }
    }
}

/// CLI flags that take priority over the TOML file.
#[derive(Debug, Clone, Default)]
pub struct EvalOverrides {
    pub dataset: Option<PathBuf>,
    pub output: Option<PathBuf>,
    pub num_workers: Option<usize>,
    pub limit: Option<usize>,
}

impl EvalToml {
    /// Apply CLI overrides and reject settings no run can use.
    pub fn with_overrides(mut self, overrides: &EvalOverrides) -> anyhow::Result<Self> {
        let eval = &mut self.evaluation;
        if let Some(path) = &overrides.dataset {
            eval.dataset_path = path.clone();
        }
        if let Some(path) = &overrides.output {
            eval.output_path = path.clone();
        }
        if let Some(n) = overrides.num_workers {
            eval.num_workers = n;
        }
        if overrides.limit.is_some() {
            eval.limit = overrides.limit;
        }

        if eval.num_workers == 0 {
            anyhow::bail!("num_workers must be at least 1");
        }
        if eval.num_samples == 0 {
            tracing::warn!("num_samples = 0; the generator will propose nothing");
        }
        Ok(self)
    }

    /// Generator settings with the `[evaluation]` provider, model and sample count.
    pub fn generator_config(&self) -> GeneratorConfig {
        GeneratorConfig {
            provider: self.evaluation.provider,
            model: self.evaluation.model.clone(),
            num_samples: self.evaluation.num_samples,
            ..self.generator.clone()
        }
    }
}

/// Load and deserialize an `EvalToml` from a TOML file.
pub fn load_eval_toml(path: &Path) -> anyhow::Result<EvalToml> {
    let contents = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("failed to read config {}: {e}", path.display()))?;
    let config: EvalToml = toml::from_str(&contents)
        .map_err(|e| anyhow::anyhow!("invalid config {}: {e}", path.display()))?;
    tracing::info!(path = %path.display(), "Loaded evaluation config");
    Ok(config)
}
