//! Integration tests for the search crate.
//!
//! The first group runs the engine against a real `LeanSession` talking to a
//! scripted stand-in for Pantograph, with canned tactics from `MockGenerator`.
//! The second group opens sessions through `MockEnvironment` the way the
//! evaluator does. The last group is `#[ignore]` and needs a built Lake
//! project in `LEAN_TEST_PROJECT`:
//!
//! ```bash
//! LEAN_TEST_PROJECT=/path/to/project PANTOGRAPH_REPL=/path/to/repl \
//!     cargo test -p search -- --ignored --test-threads=1
//! ```

use std::path::PathBuf;

use lean_repl::{LeanError, LeanSession, LeanWorker, SessionConfig, TacticResult};
use records::Termination;
use search::mocks::{candidates, theorem, MockEnvironment, MockGenerator, MockOracle, OpenFailure};
use search::{CancelFlag, ProofEnvironment, ProofOracle, SearchConfig, SearchEngine, SearchError};
use tokio::process::Command;

const FAKE_REPL: &str = r#"
echo ready.
while IFS= read -r line; do
  case "$line" in
    *goal.start*) echo '{"stateId":0,"root":"_uniq.1"}' ;;
    *goal.print*) echo '{"goals":[{"name":"_uniq.1","target":{"pp":"p ∧ p"},"vars":[{"name":"_uniq.2","userName":"hp","type":{"pp":"p"}}]}]}' ;;
    *'"constructor"'*) echo '{"nextStateId":1,"goals":[{"name":"_uniq.3","target":{"pp":"p"},"vars":[]}]}' ;;
    *'"exact hp"'*) echo '{"nextStateId":2,"goals":[]}' ;;
    *'"crash"'*) exit 1 ;;
    *) echo '{"parseError":"<Pantograph>:1:1: unknown tactic"}' ;;
  esac
done
"#;

async fn fake_session() -> LeanSession {
    let config = SessionConfig {
        tactic_timeout_secs: 5,
        startup_timeout_secs: 5,
        ..SessionConfig::default()
    };
    let mut cmd = Command::new("sh");
    cmd.arg("-c").arg(FAKE_REPL);
    let worker = LeanWorker::spawn_command(cmd, &config).await.unwrap();
    LeanSession::from_worker(worker, "and_self").await.unwrap()
}

// ---------------------------------------------------------------------------
// Engine over a scripted Pantograph session
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_search_through_lean_session() {
    let mut session = fake_session().await;
    let mut generator = MockGenerator::with_default(candidates(&["bogus", "exact hp"]));
    generator.add_contains_response("p ∧ p", candidates(&["constructor"]));

    let engine = SearchEngine::new(SearchConfig::default());
    let result = engine
        .search(&mut session, &generator, "and_self", &CancelFlag::new())
        .await
        .unwrap();
    ProofOracle::close(&mut session).await;

    assert!(result.success);
    assert_eq!(
        result.proof_steps,
        Some(vec!["constructor".to_string(), "exact hp".to_string()])
    );
    assert_eq!(result.proof_length, Some(2));
    assert_eq!(generator.requests(), vec!["hp : p\n⊢ p ∧ p", "⊢ p"]);
}

#[tokio::test]
async fn test_search_reports_session_crash() {
    let mut session = fake_session().await;
    let generator = MockGenerator::with_default(candidates(&["bogus", "crash", "constructor"]));

    let engine = SearchEngine::new(SearchConfig::default());
    let err = engine
        .search(&mut session, &generator, "and_self", &CancelFlag::new())
        .await
        .unwrap_err();
    ProofOracle::close(&mut session).await;

    assert!(matches!(err, SearchError::OracleCrash(ref e) if e.is_fatal()));
    assert_eq!(err.termination(), Termination::OracleCrashed);
}

#[tokio::test]
async fn test_search_exhausts_on_rejected_tactics() {
    let mut session = fake_session().await;
    let generator = MockGenerator::with_default(candidates(&["bogus", "nonsense"]));

    let engine = SearchEngine::new(SearchConfig::default());
    let result = engine
        .search(&mut session, &generator, "and_self", &CancelFlag::new())
        .await
        .unwrap();
    ProofOracle::close(&mut session).await;

    assert!(!result.success);
    assert_eq!(result.termination, Termination::Exhausted);
    assert_eq!(result.expansions, 1);
    assert_eq!(session.tactics_applied(), 2);
}

// ---------------------------------------------------------------------------
// Environment-opened sessions
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_environment_oracles_are_independent() {
    let mut root = MockOracle::new("⊢ P");
    root.add_response(0, "done", TacticResult::Finished { state_id: 1 });
    let mut env = MockEnvironment::new(MockOracle::new("⊢ Q"));
    env.add_oracle("easy", root);
    let generator = MockGenerator::with_default(candidates(&["done"]));
    let engine = SearchEngine::new(SearchConfig::default());

    let mut easy = env.open(&theorem("easy")).await.unwrap();
    let mut hard = env.open(&theorem("hard")).await.unwrap();
    let proved = engine
        .search(easy.as_mut(), &generator, "easy", &CancelFlag::new())
        .await
        .unwrap();
    let unproved = engine
        .search(hard.as_mut(), &generator, "hard", &CancelFlag::new())
        .await
        .unwrap();
    easy.close().await;
    hard.close().await;

    assert!(proved.success);
    assert!(!unproved.success);
    assert_eq!(env.counters().closed(), 2);
}

#[tokio::test]
async fn test_environment_failures_classify() {
    let mut env = MockEnvironment::new(MockOracle::new("⊢ P"));
    env.add_failure("no_repo", OpenFailure::Setup);
    env.add_failure("no_decl", OpenFailure::Init);

    let setup = env.open(&theorem("no_repo")).await.err().unwrap();
    let init = env.open(&theorem("no_decl")).await.err().unwrap();

    assert_eq!(setup.termination(), Termination::SetupFailed);
    assert_eq!(init.termination(), Termination::OracleInitFailed);
    assert!(matches!(init, SearchError::OracleInit(LeanError::LeanMessage(_))));
    assert_eq!(env.counters().opened(), 0);
}

// ---------------------------------------------------------------------------
// Real Pantograph
// ---------------------------------------------------------------------------

fn lean_project() -> PathBuf {
    std::env::var_os("LEAN_TEST_PROJECT")
        .map(PathBuf::from)
        .expect("set LEAN_TEST_PROJECT to a built Lake project")
}

/// `Nat.add_zero` falls to `intro n; rfl` at the root; the other candidates are noise.
#[tokio::test]
#[ignore]
async fn test_real_search_proves_nat_add_zero() {
    let config = SessionConfig::default();
    let mut session = LeanSession::start(&config, &lean_project(), "Init", "Nat.add_zero")
        .await
        .expect("failed to start session");
    let generator = MockGenerator::with_default(candidates(&["exact False.elim", "intro n; rfl"]));

    let engine = SearchEngine::new(SearchConfig {
        timeout_secs: 60.0,
        ..SearchConfig::default()
    });
    let result = engine
        .search(&mut session, &generator, "Nat.add_zero", &CancelFlag::new())
        .await
        .unwrap();
    ProofOracle::close(&mut session).await;

    println!("result: {result:?}");
    assert!(result.success);
    assert_eq!(result.proof_steps, Some(vec!["intro n; rfl".to_string()]));
}
