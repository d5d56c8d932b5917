use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use prover_core::config::EvalOverrides;
use prover_core::pipeline::{self, EvalArgs, SummaryArgs};

/// prover: LLM-guided breadth-first proof search over Lean 4 theorem datasets.
#[derive(Parser)]
#[command(name = "prover", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Search for proofs of every theorem in a dataset and record the results.
    Eval {
        /// Path to evaluation config TOML file.
        #[arg(long, default_value = "configs/eval.toml")]
        config: PathBuf,
        /// Override the dataset JSON file.
        #[arg(long)]
        dataset: Option<PathBuf>,
        /// Override the output directory for results.jsonl and summary.json.
        #[arg(long)]
        output: Option<PathBuf>,
        /// Override the number of theorems searched in parallel.
        #[arg(long)]
        num_workers: Option<usize>,
        /// Evaluate only the first N theorems of the dataset.
        #[arg(long)]
        limit: Option<usize>,
        /// Keep the existing results log and skip theorems it already answers.
        #[arg(long)]
        resume: bool,
    },
    /// Print the summary of an existing results log.
    Summary {
        /// Path to the results JSONL file.
        #[arg(long)]
        results: PathBuf,
        /// Model name to record in the summary.
        #[arg(long, default_value = "unknown")]
        model: String,
        /// Output as JSON instead of human-readable text.
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Eval {
            config,
            dataset,
            output,
            num_workers,
            limit,
            resume,
        } => {
            pipeline::run_eval(EvalArgs {
                config,
                overrides: EvalOverrides {
                    dataset,
                    output,
                    num_workers,
                    limit,
                },
                resume,
            })
            .await
        }
        Command::Summary {
            results,
            model,
            json,
        } => pipeline::run_summary(SummaryArgs {
            results,
            model,
            json,
        }),
    }
}
