//! Theorem datasets and proof search results.
//!
//! Provides the descriptor type loaded from dataset files, the per-theorem
//! result row, and JSONL/JSON I/O for the results log and run summary.

pub mod reader;
pub mod types;
pub mod writer;

pub use reader::ResultsReader;
pub use types::{
    load_dataset, EvaluationSummary, ProofSearchResult, SummaryAccumulator, Termination,
    TheoremDescriptor,
};
pub use writer::{write_summary, ResultsLog, RESULTS_FILE, SUMMARY_FILE};
