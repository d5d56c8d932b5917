//! Configuration and data types for the policy crate.

use std::collections::HashMap;

use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};

/// A proposed tactic with a generator-assigned score (higher is better).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TacticCandidate {
    pub text: String,
    pub score: f64,
}

impl TacticCandidate {
    pub fn new(text: impl Into<String>, score: f64) -> Self {
        Self {
            text: text.into(),
            score,
        }
    }
}

/// Merge candidates with identical text, keeping the maximum score.
///
/// Output is sorted by score descending; equal scores keep the order in which
/// their text first appeared.
pub fn dedup_candidates(candidates: Vec<TacticCandidate>) -> Vec<TacticCandidate> {
    let mut order: Vec<String> = Vec::new();
    let mut best: HashMap<String, f64> = HashMap::new();

    for c in candidates {
        match best.get_mut(&c.text) {
            Some(score) => *score = score.max(c.score),
            None => {
                order.push(c.text.clone());
                best.insert(c.text, c.score);
            }
        }
    }

    let mut merged: Vec<TacticCandidate> = order
        .into_iter()
        .map(|text| {
            let score = best[&text];
            TacticCandidate { text, score }
        })
        .collect();
    // Stable sort preserves first appearance among ties.
    merged.sort_by_key(|c| std::cmp::Reverse(OrderedFloat(c.score)));
    merged
}

/// Hosted chat-completions provider.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    #[default]
    OpenRouter,
    Fireworks,
}

impl Provider {
    /// Chat-completions endpoint.
    pub fn endpoint(&self) -> &'static str {
        match self {
            Provider::OpenRouter => "https://openrouter.ai/api/v1/chat/completions",
            Provider::Fireworks => "https://api.fireworks.ai/inference/v1/chat/completions",
        }
    }

    /// Environment variable holding the API key.
    pub fn api_key_env(&self) -> &'static str {
        match self {
            Provider::OpenRouter => "OPENROUTER_API_KEY",
            Provider::Fireworks => "FIREWORKS_API_KEY",
        }
    }
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Provider::OpenRouter => "openrouter",
            Provider::Fireworks => "fireworks",
        })
    }
}

/// Configuration for the tactic generator.
#[derive(Debug, Clone, Deserialize)]
pub struct GeneratorConfig {
    #[serde(default)]
    pub provider: Provider,
    /// Provider-side model identifier (e.g. `deepseek/deepseek-prover-v2`).
    #[serde(default = "default_model")]
    pub model: String,
    /// Requests issued per proof state. Defaults to 10.
    #[serde(default = "default_num_samples")]
    pub num_samples: usize,
    /// Sampling temperature. Defaults to 1.0.
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    /// Completion token limit. Defaults to 1024.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,
    /// Whether to ask the provider for a reasoning trace.
    #[serde(default)]
    pub reasoning: bool,
    /// Per-request timeout in seconds. Defaults to 45.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    /// Override for the provider endpoint (self-hosted gateways, tests).
    #[serde(default)]
    pub endpoint: Option<String>,
}

fn default_model() -> String {
    "deepseek/deepseek-prover-v2".to_string()
}
fn default_num_samples() -> usize {
    10
}
fn default_temperature() -> f64 {
    1.0
}
fn default_max_tokens() -> usize {
    1024
}
fn default_request_timeout() -> u64 {
    45
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            provider: Provider::default(),
            model: default_model(),
            num_samples: default_num_samples(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            reasoning: false,
            request_timeout_secs: default_request_timeout(),
            endpoint: None,
        }
    }
}
