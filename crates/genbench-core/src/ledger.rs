//! Append-only results ledger, rewritten in full after every append.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

use crate::types::RunOutcome;

#[derive(thiserror::Error, Debug)]
pub enum LedgerError {
    #[error("io error on {path}: {source}")]
    Io { path: PathBuf, source: std::io::Error },
    #[error("serialization failed: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug)]
pub struct ResultsLedger {
    path: PathBuf,
    outcomes: Vec<RunOutcome>,
}

impl ResultsLedger {
    pub fn new(path: impl Into<PathBuf>) -> Self { Self { path: path.into(), outcomes: Vec::new() } }

    pub fn path(&self) -> &Path { &self.path }

    pub fn outcomes(&self) -> &[RunOutcome] { &self.outcomes }

    pub fn len(&self) -> usize { self.outcomes.len() }

    pub fn is_empty(&self) -> bool { self.outcomes.is_empty() }

    /// Appends in memory first, so a failed write never loses the record for this process.
    pub fn append(&mut self, outcome: RunOutcome) -> Result<(), LedgerError> {
        self.outcomes.push(outcome);
        self.persist()
    }

    /// Writes the whole document to a sibling temp file and renames it over the target.
    /// Readers see either the previous document or the new one, never a mix.
    pub fn persist(&self) -> Result<(), LedgerError> {
        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let io_err = |source| LedgerError::Io { path: self.path.clone(), source };
        let mut tmp = NamedTempFile::new_in(&dir).map_err(io_err)?;
        serde_json::to_writer_pretty(&mut tmp, &self.outcomes)?;
        tmp.write_all(b"\n").map_err(io_err)?;
        tmp.as_file().sync_all().map_err(io_err)?;
        tmp.persist(&self.path).map_err(|e| io_err(e.error))?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Vec<RunOutcome>, LedgerError> {
        let text = fs::read_to_string(path).map_err(|source| LedgerError::Io { path: path.to_path_buf(), source })?;
        Ok(serde_json::from_str(&text)?)
    }
}
