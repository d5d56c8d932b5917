//! Async Lean 4 REPL client using the Pantograph JSON protocol.
//!
//! Each theorem gets its own [`LeanSession`], backed by one Pantograph child
//! process started inside the theorem's repository checkout. Checkouts are
//! located (and optionally cloned and built with `lake`) by [`RepoCache`].
//!
//! ```rust,no_run
//! use lean_repl::{module_name, LeanGitRepo, LeanSession, RepoCache, SessionConfig, TacticResult};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let repo = LeanGitRepo::new("https://github.com/leanprover-community/mathlib4", "29dcec07")?;
//! let checkout = RepoCache::new("repos", true).resolve(&repo).await?;
//!
//! let config = SessionConfig::default();
//! let module = module_name("Mathlib/Logic/Basic.lean");
//! let mut session = LeanSession::start(&config, &checkout, &module, "not_not_intro").await?;
//!
//! let root = session.initial_state().clone();
//! if let TacticResult::Finished { .. } = session.apply(&root, "tauto").await? {
//!     println!("proved");
//! }
//! session.close().await;
//! # Ok(())
//! # }
//! ```

pub mod protocol;
pub mod repo;
pub mod session;
pub mod types;
pub mod worker;

pub use protocol::{PantographRequest, PantographResponse};
pub use repo::{LeanGitRepo, RepoCache, RepoError};
pub use session::LeanSession;
pub use types::{module_name, Goal, LeanError, ProofState, SessionConfig, TacticResult};
pub use worker::LeanWorker;
