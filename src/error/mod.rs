use std::{io, path::PathBuf};

use thiserror::Error;

use crate::{
    config::ConfigError,
    domain::{Boundary, SchemaMismatch},
    pipeline::transform::TransformError,
};

#[derive(Debug, Error)]
pub enum Error {
    #[error("raw data file not found: {}", path.display())]
    SourceNotFound { path: PathBuf },
    #[error("raw data file is empty: {}", path.display())]
    EmptySource { path: PathBuf },
    #[error("could not parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: ParseFailure,
    },
    #[error(transparent)]
    SchemaMismatch(#[from] SchemaMismatch),
    #[error(transparent)]
    Transform(#[from] TransformError),
    #[error("refusing to load a table with no rows")]
    EmptyOutput,
    #[error("permission denied while writing {}", path.display())]
    PermissionDenied {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("could not write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl Error {
    /// Classifies a filesystem failure on the output side.
    pub(crate) fn write(path: impl Into<PathBuf>, source: io::Error) -> Self {
        let path = path.into();
        match source.kind() {
            io::ErrorKind::PermissionDenied => Self::PermissionDenied { path, source },
            _ => Self::Write { path, source },
        }
    }

    /// Name of the pipeline stage that produced the error.
    pub fn stage(&self) -> &'static str {
        match self {
            Self::Config(_) => "config",
            Self::SourceNotFound { .. } | Self::EmptySource { .. } | Self::Parse { .. } => {
                "extract"
            }
            Self::SchemaMismatch(mismatch) => match mismatch.boundary {
                Boundary::Extract => "extract",
                Boundary::Load => "load",
            },
            Self::Transform(_) => "transform",
            Self::EmptyOutput | Self::PermissionDenied { .. } | Self::Write { .. } => "load",
        }
    }
}

/// Reasons a raw data file could not be turned into a table.
#[derive(Debug, Error)]
pub enum ParseFailure {
    #[error("could not read file: {0}")]
    Io(#[from] io::Error),
    #[error("file is not valid UTF-8: {0}")]
    Encoding(#[from] std::str::Utf8Error),
    #[error("malformed delimited text: {0}")]
    Csv(#[from] csv::Error),
    #[error(transparent)]
    Shape(#[from] crate::domain::error::Error),
    #[error("collapsed row {row} splits into {found} fields but the recovered header has {expected}")]
    CollapsedRow {
        row: usize,
        expected: usize,
        found: usize,
    },
}

pub type Result<T> = std::result::Result<T, Error>;
