//! Input classification and resolution to something the engine can read.
//!
//! Local and stdin inputs end up as a UTF-8 working file on disk. Stdin is
//! materialized, non-UTF-8 files are transcoded, and mojibake is optionally
//! repaired; each intermediate copy is registered for cleanup before it is
//! written. Remote and compressed inputs pass straight through to the engine.

use std::{
    fs,
    io::{self, IsTerminal, Read},
    path::{Path, PathBuf},
};

use log::{debug, info};

use crate::{
    cleanup::TempFileSet,
    config::PipelineConfig,
    encoding,
    engine::{CompressionKind, WorkingSource},
    error::NormalizeError,
    mojibake,
    normalize::normalize_column_name,
};

const STRIPPED_EXTENSIONS: &[&str] = &["gz", "gzip", "zip", "csv", "tsv", "txt"];
pub const STDIN_BASE_NAME: &str = "stdin";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputReference {
    LocalPath(PathBuf),
    RemoteUrl(String),
    Stdin,
    CompressedPath { path: PathBuf, kind: CompressionKind },
}

impl InputReference {
    pub fn classify(raw: &str) -> Self {
        if raw == "-" {
            return InputReference::Stdin;
        }
        let lowered = raw.to_ascii_lowercase();
        if lowered.starts_with("http://") || lowered.starts_with("https://") {
            return InputReference::RemoteUrl(raw.to_string());
        }
        match CompressionKind::from_path(raw) {
            Some(kind) => InputReference::CompressedPath {
                path: PathBuf::from(raw),
                kind,
            },
            None => InputReference::LocalPath(PathBuf::from(raw)),
        }
    }

    pub fn is_remote(&self) -> bool {
        matches!(self, InputReference::RemoteUrl(_))
    }

    pub fn local_path(&self) -> Option<&Path> {
        match self {
            InputReference::LocalPath(path) | InputReference::CompressedPath { path, .. } => {
                Some(path)
            }
            InputReference::RemoteUrl(_) | InputReference::Stdin => None,
        }
    }

    pub fn display_name(&self) -> String {
        match self {
            InputReference::LocalPath(path) | InputReference::CompressedPath { path, .. } => {
                path.display().to_string()
            }
            InputReference::RemoteUrl(url) => url.clone(),
            InputReference::Stdin => "<stdin>".to_string(),
        }
    }
}

/// Identifier used to name the default output, temp files, and reject sink.
pub fn derive_base_name(reference: &InputReference) -> String {
    let file_name = match reference {
        InputReference::Stdin => STDIN_BASE_NAME.to_string(),
        InputReference::RemoteUrl(url) => {
            let path = url.split(['?', '#']).next().unwrap_or(url);
            path.trim_end_matches('/')
                .rsplit('/')
                .next()
                .unwrap_or_default()
                .to_string()
        }
        InputReference::LocalPath(path) | InputReference::CompressedPath { path, .. } => path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default(),
    };

    let mut stem = file_name.as_str();
    while let Some((head, ext)) = stem.rsplit_once('.') {
        if head.is_empty() || !STRIPPED_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()) {
            break;
        }
        stem = head;
    }
    normalize_column_name(stem)
}

/// Source of standard-input bytes, injected so tests never touch the real stdin.
pub trait StdinSource {
    fn is_interactive(&self) -> bool;
    fn read_all(&mut self) -> io::Result<Vec<u8>>;
}

#[derive(Debug, Default)]
pub struct ProcessStdin;

impl StdinSource for ProcessStdin {
    fn is_interactive(&self) -> bool {
        io::stdin().is_terminal()
    }

    fn read_all(&mut self) -> io::Result<Vec<u8>> {
        let mut buffer = Vec::new();
        io::stdin().lock().read_to_end(&mut buffer)?;
        Ok(buffer)
    }
}

/// In-memory stdin for tests and embedding.
#[derive(Debug, Default)]
pub struct BufferedStdin {
    bytes: Vec<u8>,
    interactive: bool,
}

impl BufferedStdin {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            bytes: bytes.into(),
            interactive: false,
        }
    }

    /// Behaves like an attached terminal: nothing is piped.
    pub fn terminal() -> Self {
        Self {
            bytes: Vec::new(),
            interactive: true,
        }
    }
}

impl StdinSource for BufferedStdin {
    fn is_interactive(&self) -> bool {
        self.interactive
    }

    fn read_all(&mut self) -> io::Result<Vec<u8>> {
        Ok(std::mem::take(&mut self.bytes))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedInput {
    pub source: WorkingSource,
    /// Detected label, `remote`, or the compression label.
    pub encoding: String,
    pub mojibake_repaired: bool,
    /// The file the user's data was read from locally (stdin: its materialized copy).
    pub local_input: Option<PathBuf>,
}

pub fn resolve_input(
    reference: &InputReference,
    config: &PipelineConfig,
    temp_dir: &Path,
    base_name: &str,
    temp_files: &TempFileSet,
    stdin: &mut dyn StdinSource,
) -> Result<ResolvedInput, NormalizeError> {
    let local = match reference {
        InputReference::RemoteUrl(url) => {
            debug!("Remote input {url} is read by the engine");
            return Ok(ResolvedInput {
                source: WorkingSource::Remote(url.clone()),
                encoding: "remote".to_string(),
                mojibake_repaired: false,
                local_input: None,
            });
        }
        InputReference::CompressedPath { path, kind } => {
            debug!("{} input {:?} is decompressed by the engine", kind.label(), path);
            return Ok(ResolvedInput {
                source: WorkingSource::Compressed {
                    path: path.clone(),
                    kind: *kind,
                },
                encoding: kind.label().to_string(),
                mojibake_repaired: false,
                local_input: Some(path.clone()),
            });
        }
        InputReference::Stdin => materialize_stdin(stdin, temp_dir, base_name, temp_files)?,
        InputReference::LocalPath(path) => path.clone(),
    };

    let encoding = encoding::detect_encoding(&local)?;
    info!("Detected encoding: {encoding}");

    let mut working = local.clone();
    if encoding::needs_conversion(&encoding) {
        let converted = temp_dir.join(format!("{base_name}_utf8.csv"));
        temp_files.register(&converted);
        encoding::convert_to_utf8(&working, &converted, &encoding)?;
        info!("Converted {encoding} input to UTF-8");
        working = converted;
    }

    let mut mojibake_repaired = false;
    if let Some(sample_bytes) = config.fix_mojibake_sample.filter(|_| !config.check_only) {
        let fixed = temp_dir.join(format!("{base_name}_fixed.csv"));
        temp_files.register(&fixed);
        if mojibake::repair_file(&working, &fixed, sample_bytes)
            .map_err(NormalizeError::MojibakeRepairIo)?
        {
            info!("Repaired mojibake in input");
            working = fixed;
            mojibake_repaired = true;
        }
    }

    Ok(ResolvedInput {
        source: WorkingSource::Local(working),
        encoding,
        mojibake_repaired,
        local_input: Some(local),
    })
}

fn materialize_stdin(
    stdin: &mut dyn StdinSource,
    temp_dir: &Path,
    base_name: &str,
    temp_files: &TempFileSet,
) -> Result<PathBuf, NormalizeError> {
    if stdin.is_interactive() {
        return Err(NormalizeError::StdinNotPiped);
    }
    let path = temp_dir.join(format!("{base_name}_stdin.csv"));
    temp_files.register(&path);
    let bytes = stdin.read_all()?;
    debug!("Read {} byte(s) from stdin into {:?}", bytes.len(), path);
    fs::write(&path, bytes)?;
    Ok(path)
}
