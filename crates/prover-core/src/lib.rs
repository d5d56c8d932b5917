//! Evaluation orchestration for LLM-guided Lean proof search.
//!
//! [`pipeline::Evaluator`] runs one breadth-first search per theorem on a
//! bounded pool of tokio tasks, appends every result to `results.jsonl` as it
//! completes and writes `summary.json` at the end. [`config`] loads
//! `configs/eval.toml` and merges CLI overrides.

pub mod config;
pub mod pipeline;

pub use config::{load_eval_toml, EvalOverrides, EvalToml, EvaluationConfig, OracleConfig};
pub use pipeline::{dedup_theorems, Evaluator};
