//! Locating and relocating the file a successful run produced.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use chrono::Local;
use genbench_common::config::ArtifactConfig;

/// Filesystems with coarse mtimes may stamp a fresh file slightly before the run started.
const MTIME_SLACK: Duration = Duration::from_secs(1);

#[derive(thiserror::Error, Debug)]
pub enum ArtifactError {
    #[error("invalid artifact pattern {pattern:?}: {reason}")]
    Pattern { pattern: String, reason: String },
    #[error("failed to move {from} to {to}: {source}")]
    Move { from: PathBuf, to: PathBuf, source: std::io::Error },
    #[error("failed to create {dir}: {source}")]
    CreateDir { dir: PathBuf, source: std::io::Error },
}

/// Newest file matching `cfg.pattern` in `cfg.dir` modified at or after `since`.
pub fn find_latest(cfg: &ArtifactConfig, since: SystemTime) -> Result<Option<PathBuf>, ArtifactError> {
    let pattern = cfg.dir.join(&cfg.pattern).display().to_string();
    let entries = glob::glob(&pattern).map_err(|e| ArtifactError::Pattern { pattern: pattern.clone(), reason: e.to_string() })?;
    let threshold = since.checked_sub(MTIME_SLACK).unwrap_or(since);
    let newest = entries
        .flatten()
        .filter_map(|path| {
            let meta = fs::metadata(&path).ok()?;
            let modified = meta.modified().ok()?;
            (meta.is_file() && modified >= threshold).then_some((modified, path))
        })
        .max_by_key(|(modified, _)| *modified)
        .map(|(_, path)| path);
    Ok(newest)
}

/// Moves `src` to `<dest_dir>/test_<index>_<stamp>.<ext>`, copying when a rename crosses filesystems.
pub fn relocate(src: &Path, dest_dir: &Path, index: usize) -> Result<PathBuf, ArtifactError> {
    fs::create_dir_all(dest_dir).map_err(|source| ArtifactError::CreateDir { dir: dest_dir.to_path_buf(), source })?;
    let mut name = format!("test_{index}_{}", Local::now().format("%Y%m%d_%H%M%S"));
    if let Some(ext) = src.extension().and_then(|e| e.to_str()) {
        name.push('.');
        name.push_str(ext);
    }
    let dest = dest_dir.join(name);
    let move_err = |source| ArtifactError::Move { from: src.to_path_buf(), to: dest.clone(), source };
    if fs::rename(src, &dest).is_err() {
        fs::copy(src, &dest).map_err(move_err)?;
        fs::remove_file(src).map_err(move_err)?;
    }
    Ok(dest)
}

/// Finds and relocates the run's artifact. `Ok(None)` means nothing was produced.
pub fn collect(cfg: &ArtifactConfig, index: usize, since: SystemTime) -> Result<Option<PathBuf>, ArtifactError> {
    match find_latest(cfg, since)? {
        Some(src) => relocate(&src, &cfg.dest_dir, index).map(Some),
        None => Ok(None),
    }
}
