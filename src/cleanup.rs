//! Temp-file bookkeeping and end-of-run artifact cleanup.
//!
//! This is the only module that deletes files. [`ArtifactGuard`] runs the
//! cleanup from `Drop`, so early returns, `?` propagation, and panics all
//! leave the filesystem in the same state as a successful run.

use std::{
    path::{Path, PathBuf},
    sync::{Arc, Mutex, PoisonError},
};

use log::{debug, warn};

use crate::io_utils;

/// Ordered set of paths created during a run. Clones share the same set.
#[derive(Debug, Clone, Default)]
pub struct TempFileSet {
    paths: Arc<Mutex<Vec<PathBuf>>>,
}

impl TempFileSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, path: impl Into<PathBuf>) {
        let path = path.into();
        let mut paths = self.paths.lock().unwrap_or_else(PoisonError::into_inner);
        if !paths.contains(&path) {
            debug!("Registered temp file {:?}", path);
            paths.push(path);
        }
    }

    pub fn len(&self) -> usize {
        self.paths.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Removes every registered path once and empties the set. Missing files
    /// are not an error.
    pub fn cleanup(&self) {
        let drained: Vec<PathBuf> = {
            let mut paths = self.paths.lock().unwrap_or_else(PoisonError::into_inner);
            paths.drain(..).collect()
        };
        for path in drained {
            match io_utils::remove_if_exists(&path) {
                Ok(true) => debug!("Removed temp file {:?}", path),
                Ok(false) => {}
                Err(err) => warn!("Failed to remove temp file {:?}: {err}", path),
            }
        }
    }
}

/// Removes temp files and drops the reject sink when it holds no error rows.
pub fn cleanup_temp_artifacts(temp_files: &TempFileSet, reject_file: Option<&Path>) {
    temp_files.cleanup();

    let Some(reject_file) = reject_file else {
        return;
    };
    if !reject_file.exists() {
        return;
    }
    match io_utils::count_records(reject_file) {
        Ok(records) if records <= 1 => {
            debug!("Removing empty reject file {:?}", reject_file);
            if let Err(err) = io_utils::remove_if_exists(reject_file) {
                warn!("Failed to remove reject file {:?}: {err}", reject_file);
            }
        }
        Ok(records) => debug!(
            "Keeping reject file {:?} with {} error row(s)",
            reject_file,
            records - 1
        ),
        Err(err) => warn!("Unable to inspect reject file {:?}: {err}", reject_file),
    }
}

/// Scope guard that runs [`cleanup_temp_artifacts`] when dropped.
pub struct ArtifactGuard {
    temp_files: TempFileSet,
    reject_file: Option<PathBuf>,
}

impl ArtifactGuard {
    pub fn new(temp_files: TempFileSet, reject_file: Option<PathBuf>) -> Self {
        Self {
            temp_files,
            reject_file,
        }
    }

    pub fn temp_files(&self) -> &TempFileSet {
        &self.temp_files
    }
}

impl Drop for ArtifactGuard {
    fn drop(&mut self) {
        cleanup_temp_artifacts(&self.temp_files, self.reject_file.as_deref());
    }
}
