#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use csv_normalizer::{
    cleanup::TempFileSet,
    config::RunOptions,
    engine::{CsvEngine, DataEngine},
    input::BufferedStdin,
    pipeline::{ExitStatus, Session, process_csv},
    report::MemoryReporter,
};
use tempfile::{TempDir, tempdir};

/// Scratch directory helper that cleans up files automatically on drop.
pub struct TestWorkspace {
    temp_dir: TempDir,
}

impl TestWorkspace {
    /// Creates a fresh scratch directory for the current test case.
    pub fn new() -> Self {
        Self {
            temp_dir: tempdir().expect("temp dir"),
        }
    }

    /// Returns the root path for all files owned by this workspace.
    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Writes `contents` into a file under the workspace and returns the path.
    pub fn write(&self, name: &str, contents: impl AsRef<[u8]>) -> PathBuf {
        let path = self.temp_dir.path().join(name);
        fs::write(&path, contents).expect("write temp file contents");
        path
    }

    pub fn read(&self, name: &str) -> String {
        fs::read_to_string(self.path().join(name)).expect("read workspace file")
    }

    /// Sorted file names currently in the workspace.
    pub fn files(&self) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(self.path())
            .expect("list workspace")
            .map(|entry| entry.expect("dir entry").file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }
}

/// Result of an in-process pipeline run.
pub struct RunResult {
    pub status: ExitStatus,
    pub stdout: Vec<u8>,
    pub reporter: MemoryReporter,
    pub temp_files: TempFileSet,
}

impl RunResult {
    pub fn stdout_text(&self) -> String {
        String::from_utf8(self.stdout.clone()).expect("stdout is UTF-8")
    }
}

/// Runs the pipeline with the built-in engine, using the workspace as the
/// temp directory.
pub fn run_in(
    workspace: &TestWorkspace,
    input: &str,
    options: &RunOptions,
    stdin: BufferedStdin,
) -> RunResult {
    run_with_engine(workspace, input, options, stdin, &CsvEngine::default())
}

pub fn run_with_engine(
    workspace: &TestWorkspace,
    input: &str,
    options: &RunOptions,
    mut stdin: BufferedStdin,
    engine: &dyn DataEngine,
) -> RunResult {
    let mut stdout = Vec::new();
    let mut reporter = MemoryReporter::new();
    let temp_files = TempFileSet::new();
    let status = process_csv(
        input,
        options,
        Session {
            stdin: &mut stdin,
            stdout: &mut stdout,
            reporter: &mut reporter,
            engine,
            temp_files: temp_files.clone(),
            temp_dir: Some(workspace.path().to_path_buf()),
        },
    );
    RunResult {
        status,
        stdout,
        reporter,
        temp_files,
    }
}

/// Options writing to `output` inside the workspace.
pub fn file_options(workspace: &TestWorkspace, output: &str) -> RunOptions {
    RunOptions {
        output: Some(workspace.path().join(output)),
        ..RunOptions::default()
    }
}

pub fn no_stdin() -> BufferedStdin {
    BufferedStdin::default()
}

pub fn stdout_options() -> RunOptions {
    RunOptions {
        use_stdout: true,
        ..RunOptions::default()
    }
}
