//! Breadth-first proof search over LLM-suggested tactics.
//!
//! Wires together lean-repl (proof sessions) and policy (tactic generation)
//! behind small traits so the search algorithm can be tested with mocks
//! (no Lean, no LLM).
//!
//! # Key types
//!
//! - [`SearchEngine`]: the BFS driver, one theorem per call
//! - [`SearchConfig`]: budgets loaded from TOML
//! - [`SearchNode`]: arena node with a parent index
//! - [`TacticGenerator`]: ranked candidates for a state
//! - [`ProofEnvironment`] / [`ProofOracle`]: opening and driving Lean sessions
//! - [`LeanEnvironment`]: Pantograph-backed environment over a [`lean_repl::RepoCache`]

pub mod adapters;
pub mod cancel;
pub mod config;
pub mod engine;
pub mod mocks;
pub mod node;

pub use adapters::LeanEnvironment;
pub use cancel::CancelFlag;
pub use config::SearchConfig;
pub use engine::{
    ProofEnvironment, ProofOracle, SearchEngine, SearchError, SearchStats, TacticGenerator,
};
pub use node::{extract_proof_path, extract_tactic_sequence, SearchNode};
