//! Chat-completions HTTP client for hosted LLM providers.
//!
//! Provides [`ChatClient`], which turns a proof state into a ranked list of
//! tactic candidates by sampling an OpenAI-compatible chat endpoint
//! (OpenRouter or Fireworks) several times.

use std::time::Duration;

use reqwest::Client;
use serde::Serialize;
use url::Url;

use crate::prompt::{extract_tactic, format_tactic_prompt};
use crate::types::{dedup_candidates, GeneratorConfig, Provider, TacticCandidate};

// -- chat-completions request types --

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Serialize)]
struct ReasoningToggle {
    enabled: bool,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 1],
    temperature: f64,
    max_tokens: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    reasoning: Option<ReasoningToggle>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reasoning_effort: Option<bool>,
}

/// HTTP client for a hosted chat-completions provider.
///
/// Cheap to clone; clones share the connection pool.
#[derive(Clone)]
pub struct ChatClient {
    client: Client,
    endpoint: Url,
    api_key: String,
    config: GeneratorConfig,
}

impl ChatClient {
    /// Create a client with an explicit API key.
    pub fn new(config: GeneratorConfig, api_key: impl Into<String>) -> anyhow::Result<Self> {
        let raw = config
            .endpoint
            .clone()
            .unwrap_or_else(|| config.provider.endpoint().to_string());
        let endpoint =
            Url::parse(&raw).map_err(|e| anyhow::anyhow!("Invalid endpoint URL '{raw}': {e}"))?;

        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;

        Ok(Self {
            client,
            endpoint,
            api_key: api_key.into(),
            config,
        })
    }

    /// Create a client reading the provider's API key from the environment.
    pub fn from_env(config: GeneratorConfig) -> anyhow::Result<Self> {
        let var = config.provider.api_key_env();
        let api_key = std::env::var(var)
            .map_err(|_| anyhow::anyhow!("missing {var} for provider {}", config.provider))?;
        Self::new(config, api_key)
    }

    pub fn config(&self) -> &GeneratorConfig {
        &self.config
    }

    fn request_for<'a>(&'a self, prompt: &'a str) -> ChatRequest<'a> {
        let (reasoning, reasoning_effort) = match self.config.provider {
            Provider::OpenRouter => (
                Some(ReasoningToggle {
                    enabled: self.config.reasoning,
                }),
                None,
            ),
            Provider::Fireworks => (None, Some(self.config.reasoning)),
        };
        ChatRequest {
            model: &self.config.model,
            messages: [ChatMessage {
                role: "user",
                content: prompt,
            }],
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
            reasoning,
            reasoning_effort,
        }
    }

    /// Generate ranked tactic candidates for a proof state.
    ///
    /// Sends `num_samples` sequential requests. Sample `i` scores
    /// `num_samples - i`; failed samples and empty extractions are skipped,
    /// so a total outage yields an empty list rather than an error. Each
    /// sample is attempted on its own, so an earlier outage never
    /// suppresses later requests.
    pub async fn generate_candidates(&self, proof_state: &str) -> Vec<TacticCandidate> {
        let prompt = format_tactic_prompt(proof_state);
        let request = self.request_for(&prompt);
        let n = self.config.num_samples;

        let mut candidates = Vec::with_capacity(n);
        let mut failed = 0usize;
        for i in 0..n {
            let content = match self.sample(&request).await {
                Ok(content) => content,
                Err(e) => {
                    failed += 1;
                    tracing::debug!(sample = i, error = %e, "Provider request failed, skipping sample");
                    continue;
                }
            };

            let tactic = extract_tactic(&content);
            if tactic.is_empty() {
                tracing::debug!(
                    sample = i,
                    raw = %content.chars().take(80).collect::<String>(),
                    "Empty tactic after extraction, skipping"
                );
                continue;
            }
            candidates.push(TacticCandidate::new(tactic, (n - i) as f64));
        }

        if n > 0 && failed == n {
            tracing::warn!(
                requested = n,
                url = %self.endpoint,
                "Every provider request failed, expansion gets no candidates"
            );
        }

        let sampled = candidates.len();
        let ranked = dedup_candidates(candidates);
        tracing::debug!(
            requested = n,
            sampled,
            unique = ranked.len(),
            "Tactic generation complete"
        );
        ranked
    }

    /// One completion; returns the assistant message content.
    async fn sample(&self, request: &ChatRequest<'_>) -> anyhow::Result<String> {
        let resp = self.post_with_retry(request).await?;
        let body = resp.bytes().await?;
        let value: serde_json::Value = serde_json::from_slice(&body).map_err(|e| {
            let preview: String = String::from_utf8_lossy(&body).chars().take(200).collect();
            anyhow::anyhow!("undecodable provider response ({e}): {preview}")
        })?;

        value
            .pointer("/choices/0/message/content")
            .and_then(|c| c.as_str())
            .map(str::to_string)
            .ok_or_else(|| anyhow::anyhow!("response has no message content"))
    }

    /// POST with up to 3 attempts.
    ///
    /// 5xx replies and connection-level errors back off and retry. 4xx
    /// replies fail at once. A request that hit the client timeout is not
    /// resent, since it has already spent the whole per-request budget.
    async fn post_with_retry<T: Serialize>(&self, body: &T) -> anyhow::Result<reqwest::Response> {
        const MAX_ATTEMPTS: u32 = 3;

        let mut last_err = None;
        for attempt in 0..MAX_ATTEMPTS {
            if attempt > 0 {
                let delay = retry_delay(attempt);
                tracing::debug!(attempt, delay_ms = delay.as_millis() as u64, "Retrying provider request");
                tokio::time::sleep(delay).await;
            }

            let req = self
                .client
                .post(self.endpoint.clone())
                .bearer_auth(&self.api_key)
                .json(body);

            match req.send().await {
                Ok(resp) if resp.status().is_server_error() => {
                    let status = resp.status();
                    let body_text = resp.text().await.unwrap_or_default();
                    last_err = Some(anyhow::anyhow!("provider server error {status}: {body_text}"));
                }
                Ok(resp) if resp.status().is_client_error() => {
                    let status = resp.status();
                    let body_text = resp.text().await.unwrap_or_default();
                    anyhow::bail!("provider client error {status}: {body_text}");
                }
                Ok(resp) => return Ok(resp),
                Err(e) if e.is_timeout() => {
                    tracing::warn!(
                        timeout_secs = self.config.request_timeout_secs,
                        url = %self.endpoint,
                        "Provider request timed out"
                    );
                    anyhow::bail!("provider request timed out: {e}");
                }
                Err(e) => {
                    tracing::warn!(attempt, error = %e, url = %self.endpoint, "Provider transport error");
                    last_err = Some(anyhow::anyhow!("provider request failed: {e}"));
                }
            }
        }
        Err(last_err.unwrap_or_else(|| anyhow::anyhow!("provider request failed after retries")))
    }
}

/// Backoff before retry `attempt` (1-based): 1 s, then 2 s.
fn retry_delay(attempt: u32) -> Duration {
    Duration::from_millis(500 * (1 << attempt))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(provider: Provider, reasoning: bool) -> ChatClient {
        let config = GeneratorConfig {
            provider,
            model: "test-model".into(),
            reasoning,
            ..GeneratorConfig::default()
        };
        ChatClient::new(config, "key").unwrap()
    }

    #[test]
    fn openrouter_request_uses_reasoning_object() {
        let c = client(Provider::OpenRouter, true);
        let json = serde_json::to_value(c.request_for("state")).unwrap();
        assert_eq!(json["model"], "test-model");
        assert_eq!(json["messages"][0]["role"], "user");
        assert_eq!(json["messages"][0]["content"], "state");
        assert_eq!(json["temperature"], 1.0);
        assert_eq!(json["max_tokens"], 1024);
        assert_eq!(json["reasoning"]["enabled"], true);
        assert!(json.get("reasoning_effort").is_none());
    }

    #[test]
    fn fireworks_request_uses_reasoning_effort() {
        let c = client(Provider::Fireworks, false);
        let json = serde_json::to_value(c.request_for("state")).unwrap();
        assert_eq!(json["reasoning_effort"], false);
        assert!(json.get("reasoning").is_none());
        assert_eq!(c.endpoint.as_str(), Provider::Fireworks.endpoint());
    }

    #[test]
    fn endpoint_override_is_validated() {
        let config = GeneratorConfig {
            endpoint: Some("not a url".into()),
            ..GeneratorConfig::default()
        };
        assert!(ChatClient::new(config, "key").is_err());
    }

    #[test]
    fn retry_delay_doubles() {
        assert_eq!(retry_delay(1), Duration::from_secs(1));
        assert_eq!(retry_delay(2), Duration::from_secs(2));
    }
}
