use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::types::LeanError;

/// A request to send to Pantograph via JSON lines.
///
/// Pantograph expects `{"cmd": "<command>", "payload": {<args>}}` format.
#[derive(Debug, Clone)]
pub enum PantographRequest {
    /// Start a proof from the type of an existing constant.
    GoalStartCopyFrom { name: String },
    /// Apply a tactic to a goal within a proof state.
    GoalTactic {
        state_id: u64,
        goal_id: Option<u64>,
        tactic: String,
    },
    /// Print the goals of an existing proof state.
    GoalPrint { state_id: u64 },
}

/// Wire format for the outer command envelope.
#[derive(Serialize)]
struct CommandWire {
    cmd: &'static str,
    payload: serde_json::Value,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CopyFromPayload<'a> {
    copy_from: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GoalTacticPayload<'a> {
    state_id: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    goal_id: Option<u64>,
    tactic: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GoalPrintPayload {
    state_id: u64,
    goals: bool,
}

impl PantographRequest {
    fn command(&self) -> &'static str {
        match self {
            PantographRequest::GoalStartCopyFrom { .. } => "goal.start",
            PantographRequest::GoalTactic { .. } => "goal.tactic",
            PantographRequest::GoalPrint { .. } => "goal.print",
        }
    }

    /// Serialize this request to a JSON string suitable for Pantograph.
    ///
    /// Format: `{"cmd": "goal.start", "payload": {"copyFrom": "..."}}`
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        let payload = match self {
            PantographRequest::GoalStartCopyFrom { name } => {
                serde_json::to_value(CopyFromPayload { copy_from: name })?
            }
            PantographRequest::GoalTactic {
                state_id,
                goal_id,
                tactic,
            } => serde_json::to_value(GoalTacticPayload {
                state_id: *state_id,
                goal_id: *goal_id,
                tactic,
            })?,
            PantographRequest::GoalPrint { state_id } => serde_json::to_value(GoalPrintPayload {
                state_id: *state_id,
                goals: true,
            })?,
        };
        serde_json::to_string(&CommandWire {
            cmd: self.command(),
            payload,
        })
    }
}

// --- Response types ---

/// A goal variable (hypothesis) in a Pantograph response.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PantographVariable {
    /// Internal name.
    pub name: String,
    /// User-facing name.
    pub user_name: String,
    #[serde(default)]
    pub is_inaccessible: bool,
    /// Type expression.
    #[serde(rename = "type")]
    pub type_expr: Option<PantographExpression>,
    /// Value expression (for let-bindings).
    pub value: Option<PantographExpression>,
}

/// An expression in a Pantograph response.
#[derive(Debug, Clone, Deserialize)]
pub struct PantographExpression {
    /// Pretty-printed expression.
    pub pp: Option<String>,
    pub sexp: Option<String>,
}

/// A structured goal in a Pantograph response.
#[derive(Debug, Clone, Deserialize)]
pub struct PantographGoal {
    /// Metavariable name.
    pub name: String,
    pub target: PantographExpression,
    /// Variables (hypotheses) in scope.
    #[serde(default)]
    pub vars: Vec<PantographVariable>,
}

/// A compiler message attached to a tactic result.
#[derive(Debug, Clone, Deserialize)]
pub struct PantographMessage {
    #[serde(default)]
    pub severity: String,
    #[serde(default)]
    pub data: String,
}

/// Response from `goal.start`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoalStartResult {
    /// The state ID for this proof.
    pub state_id: u64,
    /// Root metavariable name.
    pub root: String,
}

/// Response from `goal.tactic`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoalTacticResult {
    /// Next state ID (present on success).
    pub next_state_id: Option<u64>,
    /// Goals after tactic application (empty = proof complete).
    #[serde(default)]
    pub goals: Option<Vec<PantographGoal>>,
    /// Parse error message (tactic parsing failed).
    pub parse_error: Option<String>,
    /// Elaboration errors reported by older Pantograph releases.
    pub tactic_errors: Option<Vec<String>>,
    #[serde(default)]
    pub messages: Vec<PantographMessage>,
    /// The tactic closed a goal with `sorry`.
    #[serde(default)]
    pub has_sorry: bool,
}

impl GoalTacticResult {
    /// Collect every error reported for this tactic, or `None` if it elaborated.
    pub fn error_message(&self) -> Option<String> {
        if let Some(parse_error) = &self.parse_error {
            return Some(parse_error.clone());
        }
        let mut errors: Vec<&str> = self
            .tactic_errors
            .iter()
            .flatten()
            .map(String::as_str)
            .collect();
        errors.extend(
            self.messages
                .iter()
                .filter(|m| m.severity == "error")
                .map(|m| m.data.as_str()),
        );
        if errors.is_empty() && self.next_state_id.is_none() {
            return Some("tactic produced no next state".to_string());
        }
        (!errors.is_empty()).then(|| errors.join("\n"))
    }
}

/// Response from `goal.print`.
#[derive(Debug, Clone, Deserialize)]
pub struct GoalPrintResult {
    #[serde(default)]
    pub goals: Vec<PantographGoal>,
}

/// Error response from Pantograph.
#[derive(Debug, Clone, Deserialize)]
pub struct PantographError {
    /// Error category (e.g., "command", "index", "parse", "elab").
    pub error: String,
    /// Error description.
    pub desc: String,
}

/// A response received from Pantograph.
///
/// The response type depends on the command sent; any command may instead
/// come back as a `PantographError`.
#[derive(Debug, Clone)]
pub enum PantographResponse {
    /// Response to `goal.start`.
    GoalStarted(GoalStartResult),
    /// Response to `goal.tactic`.
    TacticResult(GoalTacticResult),
    /// Response to `goal.print`.
    GoalPrinted(GoalPrintResult),
    /// An error from Pantograph.
    Error(PantographError),
}

/// Parse one response line, routing Pantograph's `{"error", "desc"}` shape to `Err(PantographError)`.
fn parse_line<T: DeserializeOwned>(
    json: &str,
    command: &str,
) -> Result<Result<T, PantographError>, LeanError> {
    let value: serde_json::Value = serde_json::from_str(json)
        .map_err(|e| LeanError::Protocol(format!("Invalid JSON: {e}. Raw: {json}")))?;

    if value.get("error").is_some() && value.get("desc").is_some() {
        let err: PantographError = serde_json::from_value(value)
            .map_err(|e| LeanError::Protocol(format!("Failed to parse error: {e}")))?;
        return Ok(Err(err));
    }

    serde_json::from_value(value).map(Ok).map_err(|e| {
        LeanError::Protocol(format!(
            "Failed to parse {command} response: {e}. Raw: {json}"
        ))
    })
}

impl PantographResponse {
    /// Parse a JSON response line from Pantograph as a `goal.start` response.
    pub fn parse_goal_start(json: &str) -> Result<Self, LeanError> {
        Ok(match parse_line(json, "goal.start")? {
            Ok(result) => PantographResponse::GoalStarted(result),
            Err(err) => PantographResponse::Error(err),
        })
    }

    /// Parse a JSON response line from Pantograph as a `goal.tactic` response.
    pub fn parse_goal_tactic(json: &str) -> Result<Self, LeanError> {
        Ok(match parse_line(json, "goal.tactic")? {
            Ok(result) => PantographResponse::TacticResult(result),
            Err(err) => PantographResponse::Error(err),
        })
    }

    /// Parse a JSON response line from Pantograph as a `goal.print` response.
    pub fn parse_goal_print(json: &str) -> Result<Self, LeanError> {
        Ok(match parse_line(json, "goal.print")? {
            Ok(result) => PantographResponse::GoalPrinted(result),
            Err(err) => PantographResponse::Error(err),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serialize_goal_start_copy_from() {
        let req = PantographRequest::GoalStartCopyFrom {
            name: "Nat.add_comm".to_string(),
        };
        let json = req.to_json().unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert_eq!(parsed["cmd"], "goal.start");
        assert_eq!(parsed["payload"]["copyFrom"], "Nat.add_comm");
        assert!(parsed["payload"].get("expr").is_none());
    }

    #[test]
    fn serialize_goal_tactic() {
        let req = PantographRequest::GoalTactic {
            state_id: 5,
            goal_id: None,
            tactic: "simp".to_string(),
        };
        let json = req.to_json().unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert_eq!(parsed["cmd"], "goal.tactic");
        assert_eq!(parsed["payload"]["stateId"], 5);
        assert_eq!(parsed["payload"]["tactic"], "simp");
        // goalId should be absent when None
        assert!(parsed["payload"].get("goalId").is_none());
        assert!(!json.contains("\"state_id\""));
    }

    #[test]
    fn serialize_goal_tactic_with_goal_id() {
        let req = PantographRequest::GoalTactic {
            state_id: 0,
            goal_id: Some(1),
            tactic: "intro n".to_string(),
        };
        let json = req.to_json().unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert_eq!(parsed["payload"]["goalId"], 1);
    }

    #[test]
    fn serialize_goal_print() {
        let req = PantographRequest::GoalPrint { state_id: 7 };
        let parsed: serde_json::Value = serde_json::from_str(&req.to_json().unwrap()).unwrap();

        assert_eq!(parsed["cmd"], "goal.print");
        assert_eq!(parsed["payload"]["stateId"], 7);
        assert_eq!(parsed["payload"]["goals"], true);
    }

    #[test]
    fn deserialize_goal_start_success() {
        let json = r#"{"root":"_uniq.7","stateId":0}"#;
        match PantographResponse::parse_goal_start(json).unwrap() {
            PantographResponse::GoalStarted(r) => {
                assert_eq!(r.state_id, 0);
                assert_eq!(r.root, "_uniq.7");
            }
            other => panic!("Expected GoalStarted, got {other:?}"),
        }
    }

    #[test]
    fn deserialize_goal_tactic_success_with_goals() {
        let json = r#"{"goals":[{"fragment":"tactic","name":"_uniq.9","target":{"pp":"n = n"},"vars":[{"isInaccessible":false,"name":"_uniq.8","type":{"pp":"Nat"},"userName":"n"}]}],"hasSorry":false,"hasUnsafe":false,"messages":[],"nextStateId":1}"#;
        match PantographResponse::parse_goal_tactic(json).unwrap() {
            PantographResponse::TacticResult(r) => {
                assert_eq!(r.next_state_id, Some(1));
                assert!(r.error_message().is_none());
                let goals = r.goals.unwrap();
                assert_eq!(goals.len(), 1);
                assert_eq!(goals[0].target.pp.as_deref(), Some("n = n"));
                assert_eq!(goals[0].vars[0].user_name, "n");
            }
            other => panic!("Expected TacticResult, got {other:?}"),
        }
    }

    #[test]
    fn deserialize_goal_tactic_with_sorry() {
        let json = r#"{"goals":[],"hasSorry":true,"hasUnsafe":false,"messages":[],"nextStateId":4}"#;
        match PantographResponse::parse_goal_tactic(json).unwrap() {
            PantographResponse::TacticResult(r) => {
                assert!(r.has_sorry);
                assert!(r.goals.unwrap().is_empty());
            }
            other => panic!("Expected TacticResult, got {other:?}"),
        }
    }

    #[test]
    fn deserialize_goal_tactic_parse_error() {
        let json = r#"{"hasSorry":false,"hasUnsafe":false,"parseError":"<Pantograph>:1:1: unknown tactic"}"#;
        match PantographResponse::parse_goal_tactic(json).unwrap() {
            PantographResponse::TacticResult(r) => {
                assert!(r.next_state_id.is_none());
                assert!(r.error_message().unwrap().contains("unknown tactic"));
            }
            other => panic!("Expected TacticResult, got {other:?}"),
        }
    }

    #[test]
    fn tactic_error_messages_are_joined() {
        let json = r#"{"messages":[{"severity":"warning","data":"unused"},{"severity":"error","data":"type mismatch"}],"tacticErrors":["linarith failed"]}"#;
        match PantographResponse::parse_goal_tactic(json).unwrap() {
            PantographResponse::TacticResult(r) => {
                assert_eq!(r.error_message().unwrap(), "linarith failed\ntype mismatch");
            }
            other => panic!("Expected TacticResult, got {other:?}"),
        }
    }

    #[test]
    fn deserialize_goal_print() {
        let json = r#"{"goals":[{"name":"_uniq.3","target":{"pp":"True"},"vars":[]}]}"#;
        match PantographResponse::parse_goal_print(json).unwrap() {
            PantographResponse::GoalPrinted(r) => {
                assert_eq!(r.goals.len(), 1);
                assert_eq!(r.goals[0].target.pp.as_deref(), Some("True"));
            }
            other => panic!("Expected GoalPrinted, got {other:?}"),
        }
    }

    #[test]
    fn deserialize_pantograph_error() {
        let json = r#"{"error":"index","desc":"Unknown constant Foo.bar"}"#;
        match PantographResponse::parse_goal_start(json).unwrap() {
            PantographResponse::Error(e) => {
                assert_eq!(e.error, "index");
                assert!(e.desc.contains("Foo.bar"));
            }
            other => panic!("Expected Error, got {other:?}"),
        }
    }

    #[test]
    fn deserialize_malformed_json() {
        assert!(PantographResponse::parse_goal_start("not valid json {{{").is_err());
    }
}
