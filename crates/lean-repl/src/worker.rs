use std::path::Path;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, BufWriter};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};

use crate::protocol::{PantographRequest, PantographResponse};
use crate::types::{Goal, LeanError, ProofState, SessionConfig, TacticResult};

/// A single Pantograph child process.
///
/// Communicates via JSON lines over stdin/stdout. A request that times out
/// leaves its response in flight; the worker remembers how many such stale
/// lines are owed and drains them before the next request.
pub struct LeanWorker {
    child: Child,
    stdin: BufWriter<ChildStdin>,
    stdout: BufReader<ChildStdout>,
    requests_handled: u64,
    stale_responses: usize,
    tactic_timeout_secs: u64,
}

impl LeanWorker {
    /// Spawn Pantograph inside a Lean project checkout.
    ///
    /// Runs `lake env <repl_path> <module>` from `project_dir`, which puts the
    /// project's build outputs on `LEAN_PATH` and loads `module` into the
    /// environment. Consumes the initial "ready." line.
    pub async fn spawn(
        config: &SessionConfig,
        project_dir: &Path,
        module: &str,
    ) -> Result<Self, LeanError> {
        let mut cmd = Command::new(&config.lake_path);
        cmd.arg("env")
            .arg(&config.repl_path)
            .arg(module)
            .current_dir(project_dir);

        let worker = Self::spawn_command(cmd, config).await?;

        tracing::debug!(
            project_dir = %project_dir.display(),
            module,
            "Spawned Lean worker"
        );
        Ok(worker)
    }

    /// Spawn a worker from an explicit command line speaking the Pantograph protocol.
    pub async fn spawn_command(mut cmd: Command, config: &SessionConfig) -> Result<Self, LeanError> {
        let mut child = cmd
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::null())
            .kill_on_drop(true)
            .spawn()?;

        let stdin = BufWriter::new(
            child
                .stdin
                .take()
                .ok_or_else(|| LeanError::Protocol("Failed to capture stdin".into()))?,
        );
        let stdout = BufReader::new(
            child
                .stdout
                .take()
                .ok_or_else(|| LeanError::Protocol("Failed to capture stdout".into()))?,
        );

        let mut worker = Self {
            child,
            stdin,
            stdout,
            requests_handled: 0,
            stale_responses: 0,
            tactic_timeout_secs: config.tactic_timeout_secs,
        };

        // Loading a large environment like Mathlib takes 60-90s on first spawn.
        worker.consume_ready_line(config.startup_timeout_secs).await?;
        Ok(worker)
    }

    async fn consume_ready_line(&mut self, startup_timeout_secs: u64) -> Result<(), LeanError> {
        let mut line = String::new();
        let timeout = Duration::from_secs(startup_timeout_secs);

        match tokio::time::timeout(timeout, self.stdout.read_line(&mut line)).await {
            Ok(Ok(0)) => Err(LeanError::ProcessDied),
            Ok(Ok(_)) => {
                let trimmed = line.trim();
                if trimmed != "ready." {
                    tracing::warn!(line = trimmed, "Unexpected first line from Pantograph");
                }
                Ok(())
            }
            Ok(Err(e)) => Err(LeanError::Io(e)),
            Err(_) => {
                self.kill().await;
                Err(LeanError::Unresponsive(startup_timeout_secs))
            }
        }
    }

    /// Number of requests answered by this process.
    pub fn requests_handled(&self) -> u64 {
        self.requests_handled
    }

    /// Read one line with the tactic timeout. `None` means the timeout expired.
    async fn read_response(&mut self) -> Result<Option<String>, LeanError> {
        let mut line = String::new();
        let timeout = Duration::from_secs(self.tactic_timeout_secs);

        match tokio::time::timeout(timeout, self.stdout.read_line(&mut line)).await {
            Ok(Ok(0)) => Err(LeanError::ProcessDied),
            Ok(Ok(_)) => Ok(Some(line)),
            Ok(Err(e)) => Err(LeanError::Io(e)),
            Err(_) => Ok(None),
        }
    }

    /// Drain responses to requests that previously timed out.
    async fn discard_stale(&mut self) -> Result<(), LeanError> {
        while self.stale_responses > 0 {
            match self.read_response().await? {
                Some(line) => {
                    self.stale_responses -= 1;
                    tracing::debug!(
                        remaining = self.stale_responses,
                        bytes = line.len(),
                        "Discarded stale Pantograph response"
                    );
                }
                None => {
                    tracing::warn!(
                        timeout_secs = self.tactic_timeout_secs,
                        "Stale Pantograph response never arrived, killing worker"
                    );
                    self.kill().await;
                    return Err(LeanError::Unresponsive(self.tactic_timeout_secs));
                }
            }
        }
        Ok(())
    }

    /// Send a request and read one response line.
    ///
    /// CRITICAL: Appends `\n` after the JSON; Pantograph blocks without it.
    async fn send(&mut self, request: &PantographRequest) -> Result<String, LeanError> {
        let json = request
            .to_json()
            .map_err(|e| LeanError::Protocol(format!("Serialization error: {e}")))?;

        self.discard_stale().await?;

        self.stdin.write_all(json.as_bytes()).await?;
        self.stdin.write_all(b"\n").await?;
        self.stdin.flush().await?;

        match self.read_response().await? {
            Some(line) => {
                self.requests_handled += 1;
                Ok(line)
            }
            None => {
                tracing::warn!(
                    timeout_secs = self.tactic_timeout_secs,
                    "Pantograph request timed out"
                );
                self.stale_responses += 1;
                Err(LeanError::Timeout(self.tactic_timeout_secs))
            }
        }
    }

    /// Start a proof by looking up a theorem name in the loaded environment.
    ///
    /// Uses Pantograph's `copyFrom` to resolve a fully-qualified name
    /// (e.g. `"Nat.add_comm"`) and returns the new state ID. `goal.start`
    /// carries no goals; call [`print_goals`](Self::print_goals) for them.
    pub async fn start_proof_by_name(&mut self, name: &str) -> Result<u64, LeanError> {
        let request = PantographRequest::GoalStartCopyFrom {
            name: name.to_string(),
        };
        let line = self.send(&request).await?;

        match PantographResponse::parse_goal_start(line.trim())? {
            PantographResponse::GoalStarted(result) => Ok(result.state_id),
            PantographResponse::Error(e) => Err(LeanError::LeanMessage(e.desc)),
            other => Err(LeanError::Protocol(format!(
                "Unexpected response to goal.start: {other:?}"
            ))),
        }
    }

    /// Fetch the goals of an existing state.
    pub async fn print_goals(&mut self, state_id: u64) -> Result<ProofState, LeanError> {
        let line = self.send(&PantographRequest::GoalPrint { state_id }).await?;

        match PantographResponse::parse_goal_print(line.trim())? {
            PantographResponse::GoalPrinted(result) => {
                let goals = result
                    .goals
                    .iter()
                    .enumerate()
                    .map(|(i, g)| Goal::from_pantograph(i, g))
                    .collect();
                Ok(ProofState::new(state_id, goals))
            }
            PantographResponse::Error(e) => Err(LeanError::LeanMessage(e.desc)),
            other => Err(LeanError::Protocol(format!(
                "Unexpected response to goal.print: {other:?}"
            ))),
        }
    }

    /// Apply a tactic to all goals of a proof state.
    ///
    /// Lean-side failures come back as `Ok(TacticResult::Error)`; only
    /// transport and protocol problems are `Err`.
    pub async fn apply_tactic(
        &mut self,
        state_id: u64,
        tactic: &str,
    ) -> Result<TacticResult, LeanError> {
        let request = PantographRequest::GoalTactic {
            state_id,
            goal_id: None,
            tactic: tactic.to_string(),
        };
        let line = self.send(&request).await?;

        let result = match PantographResponse::parse_goal_tactic(line.trim())? {
            PantographResponse::TacticResult(result) => result,
            PantographResponse::Error(e) => return Ok(TacticResult::Error { message: e.desc }),
            other => {
                return Err(LeanError::Protocol(format!(
                    "Unexpected response to goal.tactic: {other:?}"
                )))
            }
        };

        if let Some(message) = result.error_message() {
            return Ok(TacticResult::Error { message });
        }
        let Some(next_id) = result.next_state_id else {
            return Ok(TacticResult::Error {
                message: "tactic produced no next state".into(),
            });
        };
        if result.has_sorry {
            return Ok(TacticResult::GivenUp { state_id: next_id });
        }

        match result.goals {
            Some(goals) if !goals.is_empty() => {
                let parsed: Vec<Goal> = goals
                    .iter()
                    .enumerate()
                    .map(|(i, g)| Goal::from_pantograph(i, g))
                    .collect();
                Ok(TacticResult::NewState(ProofState::new(next_id, parsed)))
            }
            // nextStateId without goals means nothing is left to prove
            _ => Ok(TacticResult::Finished { state_id: next_id }),
        }
    }

    async fn kill(&mut self) {
        let _ = self.child.kill().await;
        let _ = self.child.wait().await;
    }

    /// Shut down this worker by killing the child process.
    pub async fn shutdown(&mut self) {
        self.kill().await;
        tracing::debug!(requests = self.requests_handled, "Lean worker shut down");
    }
}
