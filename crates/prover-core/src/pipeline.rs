//! Parallel evaluation pipeline and CLI entry points.

use std::any::Any;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::{Mutex, Semaphore};
use tokio::task::{Id, JoinError, JoinSet};

use lean_repl::RepoCache;
use policy::ChatClient;
use records::{
    load_dataset, write_summary, EvaluationSummary, ProofSearchResult, ResultsLog, ResultsReader,
    SummaryAccumulator, Termination, TheoremDescriptor, RESULTS_FILE,
};
use search::{
    CancelFlag, LeanEnvironment, ProofEnvironment, SearchEngine, SearchError, TacticGenerator,
};

use crate::config::{load_eval_toml, EvalOverrides};

/// Arguments for the `eval` subcommand.
#[derive(Debug)]
pub struct EvalArgs {
    /// Path to the evaluation config TOML file.
    pub config: PathBuf,
    pub overrides: EvalOverrides,
    /// Keep the existing results log and skip theorems it already answers.
    pub resume: bool,
}

/// Arguments for the `summary` subcommand.
#[derive(Debug)]
pub struct SummaryArgs {
    /// Path to a `results.jsonl` log.
    pub results: PathBuf,
    /// Model name recorded in the printed summary.
    pub model: String,
    /// Output as JSON instead of human-readable text.
    pub json: bool,
}

// ---------------------------------------------------------------------------
// Evaluator
// ---------------------------------------------------------------------------

/// Runs one search per theorem on a bounded pool of tasks and records the results.
///
/// Every submitted theorem yields exactly one row in `results.jsonl`, whatever
/// happens to its search. The log is written only from the dispatch loop, in
/// completion order.
pub struct Evaluator {
    env: Arc<dyn ProofEnvironment>,
    generator: Arc<dyn TacticGenerator>,
    engine: SearchEngine,
    model: String,
    output_dir: PathBuf,
    cancel: CancelFlag,
    resume: bool,
    show_progress: bool,
}

impl Evaluator {
    pub fn new(
        env: Arc<dyn ProofEnvironment>,
        generator: Arc<dyn TacticGenerator>,
        engine: SearchEngine,
        model: impl Into<String>,
        output_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            env,
            generator,
            engine,
            model: model.into(),
            output_dir: output_dir.into(),
            cancel: CancelFlag::new(),
            resume: false,
            show_progress: true,
        }
    }

    /// Share a cancellation flag; setting it stops dispatch and interrupts in-flight searches.
    pub fn with_cancel(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_resume(mut self, resume: bool) -> Self {
        self.resume = resume;
        self
    }

    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    pub fn results_path(&self) -> PathBuf {
        self.output_dir.join(RESULTS_FILE)
    }

    /// Search every theorem with at most `worker_count` searches in flight.
    ///
    /// Theorems are deduplicated by `full_name`, first occurrence kept. The
    /// summary is written to `summary.json` even when the run is interrupted.
    pub async fn evaluate(
        &self,
        theorems: Vec<TheoremDescriptor>,
        worker_count: usize,
    ) -> anyhow::Result<EvaluationSummary> {
        if worker_count == 0 {
            anyhow::bail!("worker_count must be at least 1");
        }
        let theorems = dedup_theorems(theorems);

        let mut acc = SummaryAccumulator::default();
        let pending = if self.resume {
            self.skip_completed(theorems, &mut acc)?
        } else {
            theorems
        };
        let mut log = ResultsLog::open(&self.output_dir, self.resume)?;

        let total = pending.len();
        tracing::info!(
            theorems = total,
            already_done = acc.total(),
            workers = worker_count,
            model = self.model,
            "Starting evaluation"
        );

        let pb = self.progress_bar(total as u64);
        let semaphore = Arc::new(Semaphore::new(worker_count));
        let mut join_set: JoinSet<ProofSearchResult> = JoinSet::new();
        let mut in_flight: HashMap<Id, String> = HashMap::new();
        let mut submitted = 0usize;
        let mut completed = 0usize;

        for theorem in pending {
            if self.cancel.is_cancelled() {
                tracing::warn!(
                    remaining = total - submitted,
                    "Interrupted, no more theorems will be submitted"
                );
                break;
            }

            // Record finished searches while waiting for a free slot.
            let permit = loop {
                tokio::select! {
                    permit = Arc::clone(&semaphore).acquire_owned() => break permit?,
                    Some(joined) = join_set.join_next_with_id(), if !join_set.is_empty() => {
                        if let Some(result) = joined_row(&mut in_flight, joined) {
                            completed += 1;
                            self.record(&result, &mut log, &mut acc, &pb, completed, total)?;
                        }
                    }
                }
            };
            if self.cancel.is_cancelled() {
                drop(permit);
                tracing::warn!(
                    remaining = total - submitted,
                    "Interrupted, no more theorems will be submitted"
                );
                break;
            }

            submitted += 1;
            let env = Arc::clone(&self.env);
            let generator = Arc::clone(&self.generator);
            let engine = self.engine.clone();
            let cancel = self.cancel.clone();
            let name = theorem.full_name.clone();
            let task = join_set.spawn(async move {
                let _permit = permit;
                let name = theorem.full_name.clone();
                let start = Instant::now();

                // A panic inside the search must still produce a row.
                let inner = tokio::spawn(prove_theorem(env, generator, engine, theorem, cancel));
                match inner.await {
                    Ok(result) => result,
                    Err(e) => {
                        let message = join_error_message(e);
                        tracing::error!(theorem = name, error = message, "Search task failed");
                        ProofSearchResult::failed(
                            &name,
                            Termination::UnknownError,
                            message,
                            start.elapsed().as_secs_f64(),
                        )
                    }
                }
            });
            in_flight.insert(task.id(), name);
        }

        while let Some(joined) = join_set.join_next_with_id().await {
            if let Some(result) = joined_row(&mut in_flight, joined) {
                completed += 1;
                self.record(&result, &mut log, &mut acc, &pb, completed, total)?;
            }
        }

        let interrupted = self.cancel.is_cancelled();
        if interrupted {
            pb.abandon_with_message("interrupted");
        } else {
            pb.finish_with_message("done");
        }

        let summary = acc.finish(&self.model, interrupted);
        let summary_path = write_summary(&self.output_dir, &summary)?;
        tracing::info!(
            total = summary.total_theorems,
            successful = summary.successful,
            accuracy = summary.accuracy,
            interrupted,
            path = %summary_path.display(),
            "Evaluation finished"
        );
        Ok(summary)
    }

    /// Drop theorems with a final row in the existing log and fold those rows into `acc`.
    fn skip_completed(
        &self,
        theorems: Vec<TheoremDescriptor>,
        acc: &mut SummaryAccumulator,
    ) -> anyhow::Result<Vec<TheoremDescriptor>> {
        let path = self.results_path();
        if !path.exists() {
            return Ok(theorems);
        }

        let wanted: HashSet<&str> = theorems.iter().map(|t| t.full_name.as_str()).collect();
        let mut done = HashSet::new();
        for row in ResultsReader::read_latest(&path)? {
            if row.termination != Termination::Interrupted && wanted.contains(row.theorem_name.as_str()) {
                acc.add(&row);
                done.insert(row.theorem_name);
            }
        }

        tracing::info!(skipped = done.len(), path = %path.display(), "Resuming from existing results");
        Ok(theorems
            .into_iter()
            .filter(|t| !done.contains(&t.full_name))
            .collect())
    }

    fn record(
        &self,
        result: &ProofSearchResult,
        log: &mut ResultsLog,
        acc: &mut SummaryAccumulator,
        pb: &ProgressBar,
        completed: usize,
        total: usize,
    ) -> anyhow::Result<()> {
        log.append(result)?;
        acc.add(result);

        if result.success {
            tracing::info!(
                theorem = result.theorem_name,
                steps = ?result.proof_steps,
                time_s = format!("{:.2}", result.search_time),
                completed,
                total,
                "Proved"
            );
        } else {
            tracing::info!(
                theorem = result.theorem_name,
                outcome = %result.termination,
                time_s = format!("{:.2}", result.search_time),
                completed,
                total,
                "Not proved"
            );
        }

        pb.inc(1);
        pb.set_message(format!("{}/{} proved", acc.successful(), acc.total()));
        Ok(())
    }

    fn progress_bar(&self, len: u64) -> ProgressBar {
        if !self.show_progress {
            return ProgressBar::hidden();
        }
        let pb = ProgressBar::new(len);
        if let Ok(style) = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}")
        {
            pb.set_style(style.progress_chars("=> "));
        }
        pb
    }
}

/// Keep the first theorem for each `full_name`.
pub fn dedup_theorems(theorems: Vec<TheoremDescriptor>) -> Vec<TheoremDescriptor> {
    let before = theorems.len();
    let mut seen = HashSet::new();
    let unique: Vec<_> = theorems
        .into_iter()
        .filter(|t| seen.insert(t.full_name.clone()))
        .collect();
    if unique.len() < before {
        tracing::info!(duplicates = before - unique.len(), "Dropped duplicate theorems");
    }
    unique
}

/// Open a session, search, and close the session; theorem-level failures become rows.
///
/// The search runs as its own task holding the session behind a lock, so
/// the session is closed even when the search panics.
async fn prove_theorem(
    env: Arc<dyn ProofEnvironment>,
    generator: Arc<dyn TacticGenerator>,
    engine: SearchEngine,
    theorem: TheoremDescriptor,
    cancel: CancelFlag,
) -> ProofSearchResult {
    let start = Instant::now();
    let name = theorem.full_name.clone();

    let oracle = match env.open(&theorem).await {
        Ok(oracle) => Arc::new(Mutex::new(oracle)),
        Err(e) => return failure_row(&name, &e, start),
    };

    let search = {
        let oracle = Arc::clone(&oracle);
        let name = name.clone();
        tokio::spawn(async move {
            let mut oracle = oracle.lock().await;
            engine
                .search(oracle.as_mut(), generator.as_ref(), &name, &cancel)
                .await
        })
    };
    let joined = search.await;
    oracle.lock().await.close().await;

    match joined {
        Ok(Ok(result)) => result,
        Ok(Err(e)) => failure_row(&name, &e, start),
        Err(e) => {
            let message = join_error_message(e);
            tracing::error!(theorem = name, error = message, "Search panicked, session closed");
            ProofSearchResult::failed(
                &name,
                Termination::UnknownError,
                message,
                start.elapsed().as_secs_f64(),
            )
        }
    }
}

fn failure_row(name: &str, e: &SearchError, start: Instant) -> ProofSearchResult {
    let termination = e.termination();
    tracing::warn!(theorem = name, kind = %termination, error = %e, "Theorem failed");
    ProofSearchResult::failed(name, termination, e.to_string(), start.elapsed().as_secs_f64())
}

/// Turn a finished worker task into its row.
///
/// A worker that died without producing a row still yields an `unknown_error`
/// row for its theorem, looked up by task id.
fn joined_row(
    in_flight: &mut HashMap<Id, String>,
    joined: Result<(Id, ProofSearchResult), JoinError>,
) -> Option<ProofSearchResult> {
    match joined {
        Ok((id, result)) => {
            in_flight.remove(&id);
            Some(result)
        }
        Err(e) => {
            let Some(name) = in_flight.remove(&e.id()) else {
                tracing::error!(error = %e, "Untracked worker task lost");
                return None;
            };
            let message = join_error_message(e);
            tracing::error!(theorem = name, error = message, "Worker task lost");
            Some(ProofSearchResult::failed(
                &name,
                Termination::UnknownError,
                message,
                0.0,
            ))
        }
    }
}

fn join_error_message(e: JoinError) -> String {
    if !e.is_panic() {
        return e.to_string();
    }
    let payload: Box<dyn Any + Send> = e.into_panic();
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("panic: {s}")
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("panic: {s}")
    } else {
        "panic".to_string()
    }
}

// ---------------------------------------------------------------------------
// Subcommands
// ---------------------------------------------------------------------------

/// Evaluate the configured model on the configured dataset.
pub async fn run_eval(args: EvalArgs) -> anyhow::Result<()> {
    let start = Instant::now();

    // 1. Load config
    let toml = load_eval_toml(&args.config)?.with_overrides(&args.overrides)?;
    let eval = &toml.evaluation;

    // 2. Load theorems
    let theorems = load_dataset(&eval.dataset_path, eval.limit)?;

    // 3. Build generator and Lean environment
    let generator_config = toml.generator_config();
    tracing::info!(
        provider = %generator_config.provider,
        model = generator_config.model,
        samples = generator_config.num_samples,
        "Using tactic generator"
    );
    let generator = ChatClient::from_env(generator_config)?;
    let env = LeanEnvironment::new(
        RepoCache::new(&toml.oracle.repos_dir, toml.oracle.fetch_missing)
            .with_lake(&toml.oracle.session.lake_path),
        toml.oracle.session.clone(),
    );

    // 4. Ctrl-C stops dispatch; in-flight searches finish as interrupted
    let cancel = CancelFlag::new();
    let signal_flag = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Received Ctrl+C, draining in-flight searches");
            signal_flag.cancel();
        }
    });

    // 5. Run
    let evaluator = Evaluator::new(
        Arc::new(env),
        Arc::new(generator),
        SearchEngine::new(toml.search.clone()),
        eval.model.clone(),
        eval.output_path.clone(),
    )
    .with_cancel(cancel)
    .with_resume(args.resume);
    let summary = evaluator.evaluate(theorems, eval.num_workers).await?;

    println!();
    print_summary(&summary, &evaluator.results_path());
    println!("Elapsed: {:.1}s", start.elapsed().as_secs_f64());
    Ok(())
}

/// Recompute and print the summary of an existing results log.
pub fn run_summary(args: SummaryArgs) -> anyhow::Result<()> {
    let summary = ResultsReader::read_summary(&args.results, &args.model)?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        print_summary(&summary, &args.results);
    }
    Ok(())
}

fn print_summary(summary: &EvaluationSummary, results: &Path) {
    println!("--- Evaluation Summary ---");
    println!("Model: {}", summary.model);
    println!("Results: {}", results.display());
    println!("Theorems: {}", summary.total_theorems);
    println!("Proved: {}", summary.successful);
    println!("Failed: {}", summary.failed);
    println!("Accuracy: {:.1}%", summary.accuracy * 100.0);
    println!("Avg proof length: {:.2}", summary.avg_proof_length);
    println!("Avg search time: {:.2}s", summary.avg_search_time);
    if summary.interrupted {
        println!("(interrupted: partial results)");
    }
}
