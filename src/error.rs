//! Error taxonomy for manifest parsing and packaging

use std::path::{Path, PathBuf};
use thiserror::Error;

pub type Result<T, E = JarError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum JarError {
    #[error("line {line_number}: {reason}: {line:?}")]
    ManifestSyntax {
        line_number: usize,
        line: String,
        reason: String,
    },

    #[error("line {line_number}: the \"+\" prefix is no longer supported: {line:?}")]
    DeprecatedPrefix { line_number: usize, line: String },

    #[error("file \"{source_path}\" not found in {}", display_roots(.roots))]
    SourceNotFound {
        source_path: String,
        roots: Vec<PathBuf>,
    },

    #[error("{output} already added")]
    DuplicateOutput { output: String },

    #[error("{}:{line_number}: {reason}", .path.display())]
    Preprocessor {
        path: PathBuf,
        line_number: usize,
        reason: String,
    },

    #[error("{}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{}: {source}", .path.display())]
    Zip {
        path: PathBuf,
        #[source]
        source: zip::result::ZipError,
    },

    #[error("invalid options: {0}")]
    InvalidOptions(String),
}

impl JarError {
    /// Name of the error kind, as printed in diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            JarError::ManifestSyntax { .. } | JarError::DeprecatedPrefix { .. } => {
                "ManifestSyntaxError"
            }
            JarError::SourceNotFound { .. } => "SourceNotFoundError",
            JarError::DuplicateOutput { .. } => "DuplicateOutputError",
            JarError::Preprocessor { .. } => "PreprocessorError",
            JarError::Io { .. } | JarError::Zip { .. } => "IOError",
            JarError::InvalidOptions(_) => "OptionsError",
        }
    }

    pub(crate) fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        JarError::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    pub(crate) fn zip(path: impl AsRef<Path>, source: zip::result::ZipError) -> Self {
        JarError::Zip {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }
}

fn display_roots(roots: &[PathBuf]) -> String {
    roots
        .iter()
        .map(|r| r.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Attach a path to io errors, mirroring anyhow's `with_context` at library level.
pub(crate) trait IoResultExt<T> {
    fn at_path(self, path: impl AsRef<Path>) -> Result<T>;
}

impl<T> IoResultExt<T> for std::io::Result<T> {
    fn at_path(self, path: impl AsRef<Path>) -> Result<T> {
        self.map_err(|e| JarError::io(path, e))
    }
}
