//! Bridges between search traits and real crate types (lean-repl, policy).

use async_trait::async_trait;
use lean_repl::{
    module_name, LeanError, LeanGitRepo, LeanSession, ProofState, RepoCache, SessionConfig,
    TacticResult,
};
use policy::{ChatClient, TacticCandidate};
use records::TheoremDescriptor;

use crate::engine::{ProofEnvironment, ProofOracle, SearchError, TacticGenerator};

// ---------------------------------------------------------------------------
// TacticGenerator for ChatClient
// ---------------------------------------------------------------------------

#[async_trait]
impl TacticGenerator for ChatClient {
    async fn generate(&self, state_text: &str) -> anyhow::Result<Vec<TacticCandidate>> {
        // The client already absorbs per-sample failures.
        Ok(self.generate_candidates(state_text).await)
    }
}

// ---------------------------------------------------------------------------
// ProofOracle for LeanSession
// ---------------------------------------------------------------------------

#[async_trait]
impl ProofOracle for LeanSession {
    fn initial_state(&self) -> &ProofState {
        LeanSession::initial_state(self)
    }

    async fn apply(&mut self, state: &ProofState, tactic: &str) -> Result<TacticResult, LeanError> {
        LeanSession::apply(self, state, tactic).await
    }

    async fn close(&mut self) {
        LeanSession::close(self).await
    }
}

// ---------------------------------------------------------------------------
// LeanEnvironment
// ---------------------------------------------------------------------------

/// Opens one Pantograph session per theorem inside its repository checkout.
pub struct LeanEnvironment {
    repos: RepoCache,
    session: SessionConfig,
}

impl LeanEnvironment {
    pub fn new(repos: RepoCache, session: SessionConfig) -> Self {
        Self { repos, session }
    }
}

#[async_trait]
impl ProofEnvironment for LeanEnvironment {
    async fn open(&self, theorem: &TheoremDescriptor) -> Result<Box<dyn ProofOracle>, SearchError> {
        let repo = LeanGitRepo::new(&theorem.url, &theorem.commit)
            .map_err(|e| SearchError::Setup(e.to_string()))?;
        let project_dir = self
            .repos
            .resolve(&repo)
            .await
            .map_err(|e| SearchError::Setup(e.to_string()))?;

        let module = module_name(&theorem.file_path);
        tracing::debug!(
            theorem = theorem.full_name,
            module,
            project = %project_dir.display(),
            "Opening proof session"
        );

        let session = LeanSession::start(&self.session, &project_dir, &module, &theorem.full_name)
            .await
            .map_err(SearchError::OracleInit)?;
        Ok(Box::new(session))
    }
}
