//! Prompt formatting and tactic extraction utilities.
//!
//! These functions handle the translation between a Lean 4 proof state and
//! the single-turn chat prompt sent to the provider, and pull a usable tactic
//! back out of the free-form reply.

const LEAN_FENCE: &str = "```lean";

/// Format a proof state into the user message for the model.
pub fn format_tactic_prompt(proof_state: &str) -> String {
    format!(
        "Help me prove a theorem in Lean 4. Here is my current proof state:\n\
         {proof_state}\n\
         Based on this state, suggest the next tactic I should use in Lean 4 code. \
         Only output one tactic step in lean code and nothing else."
    )
}

/// Extract the tactic from a model reply.
///
/// Preference order:
/// 1. the body of the first ```` ```lean ```` fence, if that fence is closed;
/// 2. otherwise (only when no `lean` fence opens) the text between the first
///    pair of backticks;
/// 3. otherwise the whole reply, trimmed.
///
/// An unclosed `lean` fence falls straight through to the raw reply.
pub fn extract_tactic(response: &str) -> String {
    let text = response.trim();

    if let Some(open) = text.find(LEAN_FENCE) {
        let body_start = open + LEAN_FENCE.len();
        if let Some(len) = text[body_start..].find("```") {
            return text[body_start..body_start + len].trim().to_string();
        }
    } else if let Some(open) = text.find('`') {
        if let Some(len) = text[open + 1..].find('`') {
            return text[open + 1..open + 1 + len].trim().to_string();
        }
    }

    text.to_string()
}
