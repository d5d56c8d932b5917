//! LLM-based tactic generation for proof search.
//!
//! Uses a hosted chat-completions API (OpenRouter or Fireworks), sampling
//! several replies per proof state and ranking the extracted tactics.
//!
//! # Key types
//!
//! - [`ChatClient`] - HTTP client for the provider
//! - [`GeneratorConfig`] - provider, model and sampling settings
//! - [`TacticCandidate`] - a proposed tactic with its score

pub mod client;
pub mod prompt;
pub mod types;

pub use client::ChatClient;
pub use prompt::{extract_tactic, format_tactic_prompt};
pub use types::{dedup_candidates, GeneratorConfig, Provider, TacticCandidate};
