use std::path::PathBuf;

/// Errors that can occur during Lean REPL interaction.
#[derive(Debug, thiserror::Error)]
pub enum LeanError {
    /// Lean process exited unexpectedly.
    #[error("Lean process exited unexpectedly")]
    ProcessDied,

    /// A single request timed out after the specified number of seconds.
    ///
    /// The late response is discarded before the next request, so the
    /// session stays usable.
    #[error("Request timed out after {0}s")]
    Timeout(u64),

    /// The process stopped answering entirely (a stale response never arrived).
    #[error("Lean process unresponsive after {0}s")]
    Unresponsive(u64),

    /// JSON parse error or unexpected response format.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Lean reported an error (unknown identifier, elaboration failure, etc.).
    #[error("Lean error: {0}")]
    LeanMessage(String),

    /// IO error from process communication.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl LeanError {
    /// Whether the session that produced this error can no longer be used.
    ///
    /// Fatal errors mean the underlying process is gone or out of sync with
    /// us; every state ID it handed out is invalid.
    pub fn is_fatal(&self) -> bool {
        match self {
            LeanError::ProcessDied | LeanError::Unresponsive(_) | LeanError::Io(_) => true,
            LeanError::Timeout(_) | LeanError::Protocol(_) | LeanError::LeanMessage(_) => false,
        }
    }
}

/// A single goal in a proof state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Goal {
    /// Zero-indexed goal ID within the proof state.
    pub goal_id: usize,
    /// Hypothesis strings (e.g., "n : Nat").
    pub hypotheses: Vec<String>,
    /// The goal target (the part after `⊢`).
    pub target: String,
    /// The full raw pretty-printed string.
    pub raw: String,
}

impl Goal {
    /// Parse a goal from Lean's pretty-printed format.
    ///
    /// Format:
    /// ```text
    /// hyp1 : Type1
    /// hyp2 : Type2
    /// ⊢ target_type
    /// ```
    pub fn parse(goal_id: usize, raw: &str) -> Self {
        let raw = raw.to_string();

        if let Some(turnstile_pos) = raw.find('⊢') {
            let before = &raw[..turnstile_pos];
            let after = raw[turnstile_pos + '⊢'.len_utf8()..].trim();

            let hypotheses: Vec<String> = before
                .lines()
                .map(|l| l.trim())
                .filter(|l| !l.is_empty())
                .map(|l| l.to_string())
                .collect();

            Goal {
                goal_id,
                hypotheses,
                target: after.to_string(),
                raw,
            }
        } else {
            // No turnstile: the whole string is the target
            Goal {
                goal_id,
                hypotheses: Vec::new(),
                target: raw.clone(),
                raw,
            }
        }
    }

    /// Construct a Goal from Pantograph's structured response.
    ///
    /// Pantograph returns goals as structured JSON with separate `target` and
    /// `vars` fields rather than a single pretty-printed string.
    pub fn from_pantograph(goal_id: usize, pg: &crate::protocol::PantographGoal) -> Self {
        let target = pg
            .target
            .pp
            .as_deref()
            .unwrap_or("<no pp>")
            .to_string();

        let hypotheses: Vec<String> = pg
            .vars
            .iter()
            .map(|v| {
                let type_str = v
                    .type_expr
                    .as_ref()
                    .and_then(|e| e.pp.as_deref())
                    .unwrap_or("?");
                format!("{} : {}", v.user_name, type_str)
            })
            .collect();

        let raw = if hypotheses.is_empty() {
            format!("⊢ {target}")
        } else {
            format!("{}\n⊢ {target}", hypotheses.join("\n"))
        };

        Goal {
            goal_id,
            hypotheses,
            target,
            raw,
        }
    }
}

/// A proof state handed out by a session.
///
/// `pp` is the canonical text form: every goal's raw text joined by a blank
/// line. Two states with equal `pp` are the same state for search purposes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProofState {
    /// Pantograph state ID, scoped to the process that produced it.
    pub state_id: u64,
    /// Open goals in this state.
    pub goals: Vec<Goal>,
    pp: String,
}

impl ProofState {
    pub fn new(state_id: u64, goals: Vec<Goal>) -> Self {
        let pp = goals
            .iter()
            .map(|g| g.raw.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");
        Self {
            state_id,
            goals,
            pp,
        }
    }

    /// Build a state from pretty-printed text, one goal per blank-line-separated block.
    pub fn from_pp(state_id: u64, pp: &str) -> Self {
        let goals = pp
            .split("\n\n")
            .map(str::trim)
            .filter(|block| !block.is_empty())
            .enumerate()
            .map(|(i, block)| Goal::parse(i, block))
            .collect();
        Self::new(state_id, goals)
    }

    /// Canonical pretty-printed text (deduplication key).
    pub fn pp(&self) -> &str {
        &self.pp
    }
}

/// Result of applying a tactic to a proof state.
#[derive(Debug, Clone)]
pub enum TacticResult {
    /// No goals remain; the proof is complete.
    Finished { state_id: u64 },
    /// The tactic produced a new state with open goals.
    NewState(ProofState),
    /// Lean rejected the tactic.
    Error { message: String },
    /// The tactic closed goals with `sorry` (or similar), abandoning the proof.
    GivenUp { state_id: u64 },
}

/// Configuration for Pantograph sessions.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct SessionConfig {
    /// Path to `lake`, used as `lake env <repl_path> <module>` inside the checkout.
    #[serde(default = "default_lake_path")]
    pub lake_path: PathBuf,

    /// Path to the Pantograph `repl` binary.
    #[serde(default = "default_repl_path")]
    pub repl_path: PathBuf,

    /// Timeout in seconds for a single tactic application.
    #[serde(default = "default_tactic_timeout")]
    pub tactic_timeout_secs: u64,

    /// Timeout in seconds for the process to print its `ready.` line.
    #[serde(default = "default_startup_timeout")]
    pub startup_timeout_secs: u64,
}

fn default_lake_path() -> PathBuf {
    PathBuf::from("lake")
}
fn default_repl_path() -> PathBuf {
    std::env::var_os("PANTOGRAPH_REPL")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("repl"))
}
fn default_tactic_timeout() -> u64 {
    30
}
fn default_startup_timeout() -> u64 {
    120
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            lake_path: default_lake_path(),
            repl_path: default_repl_path(),
            tactic_timeout_secs: default_tactic_timeout(),
            startup_timeout_secs: default_startup_timeout(),
        }
    }
}

/// Convert a Lean source path to its module name.
///
/// `Mathlib/Algebra/Group/Basic.lean` becomes `Mathlib.Algebra.Group.Basic`.
pub fn module_name(file_path: &str) -> String {
    let trimmed = file_path.trim_start_matches("./");
    let stem = trimmed.strip_suffix(".lean").unwrap_or(trimmed);
    stem.replace(['/', '\\'], ".")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_goal_with_one_hypothesis() {
        let raw = "n : Nat\n⊢ n + 0 = n";
        let goal = Goal::parse(0, raw);

        assert_eq!(goal.goal_id, 0);
        assert_eq!(goal.hypotheses, vec!["n : Nat"]);
        assert_eq!(goal.target, "n + 0 = n");
        assert_eq!(goal.raw, raw);
    }

    #[test]
    fn parse_goal_multiple_hypotheses() {
        let raw = "h : p\nh2 : q\n⊢ p ∧ q";
        let goal = Goal::parse(0, raw);

        assert_eq!(goal.hypotheses, vec!["h : p", "h2 : q"]);
        assert_eq!(goal.target, "p ∧ q");
    }

    #[test]
    fn parse_goal_no_turnstile() {
        let goal = Goal::parse(0, "something unexpected");
        assert!(goal.hypotheses.is_empty());
        assert_eq!(goal.target, "something unexpected");
    }

    #[test]
    fn proof_state_pp_joins_goals() {
        let state = ProofState::new(
            3,
            vec![Goal::parse(0, "⊢ P"), Goal::parse(1, "h : P\n⊢ Q")],
        );
        assert_eq!(state.pp(), "⊢ P\n\nh : P\n⊢ Q");
        assert_eq!(state.state_id, 3);
    }

    #[test]
    fn proof_state_from_pp_roundtrips_text() {
        let pp = "n : Nat\n⊢ n = n\n\n⊢ True";
        let state = ProofState::from_pp(0, pp);
        assert_eq!(state.goals.len(), 2);
        assert_eq!(state.goals[1].goal_id, 1);
        assert_eq!(state.pp(), pp);
    }

    #[test]
    fn fatal_errors_are_classified() {
        assert!(LeanError::ProcessDied.is_fatal());
        assert!(LeanError::Unresponsive(30).is_fatal());
        assert!(!LeanError::Timeout(30).is_fatal());
        assert!(!LeanError::Protocol("bad line".into()).is_fatal());
        assert!(!LeanError::LeanMessage("unknown tactic".into()).is_fatal());
    }

    #[test]
    fn module_name_from_file_path() {
        assert_eq!(
            module_name("Mathlib/Algebra/Group/Basic.lean"),
            "Mathlib.Algebra.Group.Basic"
        );
        assert_eq!(module_name("./Foo/Bar.lean"), "Foo.Bar");
        assert_eq!(module_name("Single"), "Single");
    }

    #[test]
    fn session_config_defaults() {
        let config: SessionConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.lake_path, PathBuf::from("lake"));
        assert_eq!(config.tactic_timeout_secs, 30);
        assert_eq!(config.startup_timeout_secs, 120);
    }
}
