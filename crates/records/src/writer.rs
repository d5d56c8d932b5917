//! Append-only JSONL results log and summary file output.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::types::{EvaluationSummary, ProofSearchResult};

/// File name of the per-theorem results log inside the output directory.
pub const RESULTS_FILE: &str = "results.jsonl";
/// File name of the aggregate summary inside the output directory.
pub const SUMMARY_FILE: &str = "summary.json";

/// Writes one JSON line per result, flushed as soon as it is appended.
///
/// A crash at any point leaves every previously appended row on disk.
pub struct ResultsLog {
    writer: BufWriter<File>,
    path: PathBuf,
    written: usize,
}

impl ResultsLog {
    /// Open `<output_dir>/results.jsonl`, creating the directory if needed.
    ///
    /// Without `append` an existing log is truncated.
    pub fn open(output_dir: &Path, append: bool) -> anyhow::Result<Self> {
        std::fs::create_dir_all(output_dir)?;
        let path = output_dir.join(RESULTS_FILE);

        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .append(append)
            .truncate(!append)
            .open(&path)
            .map_err(|e| anyhow::anyhow!("failed to open {}: {e}", path.display()))?;

        tracing::debug!(path = %path.display(), append, "Opened results log");
        Ok(Self {
            writer: BufWriter::new(file),
            path,
            written: 0,
        })
    }

    /// Append one result as a single line and flush it.
    pub fn append(&mut self, result: &ProofSearchResult) -> anyhow::Result<()> {
        serde_json::to_writer(&mut self.writer, result)?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;
        self.written += 1;
        Ok(())
    }

    /// Rows appended through this handle.
    pub fn len(&self) -> usize {
        self.written
    }

    pub fn is_empty(&self) -> bool {
        self.written == 0
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Write `<output_dir>/summary.json` (pretty-printed) and return its path.
pub fn write_summary(output_dir: &Path, summary: &EvaluationSummary) -> anyhow::Result<PathBuf> {
    std::fs::create_dir_all(output_dir)?;
    let path = output_dir.join(SUMMARY_FILE);
    let json = serde_json::to_string_pretty(summary)?;
    std::fs::write(&path, json + "\n")?;

    tracing::info!(
        path = %path.display(),
        total = summary.total_theorems,
        successful = summary.successful,
        "Wrote evaluation summary"
    );
    Ok(path)
}
