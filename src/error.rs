use std::path::PathBuf;
use thiserror::Error;

/// Failures raised while turning export files into tables.
///
/// Only `NoStreamingHistory` and `MissingRequiredField` ever stop a run.
/// The remaining variants are rendered into the dataset's warning list and
/// the offending file or record is skipped.
#[derive(Error, Debug)]
pub enum ExportError {
    #[error("failed to read {}: {reason}", path.display())]
    SourceFile { path: PathBuf, reason: String },

    #[error("streaming history is missing required field `{field}`")]
    MissingRequiredField { field: &'static str },

    #[error("no usable streaming history found in {}", dir.display())]
    NoStreamingHistory { dir: PathBuf },

    #[error("skipped malformed record in {source_name}: {detail}")]
    MalformedRecord { source_name: String, detail: String },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("column `{column}` is not present in this export")]
pub struct SchemaGap {
    pub column: String,
}

impl SchemaGap {
    pub fn new(column: &str) -> Self {
        Self {
            column: column.to_string(),
        }
    }
}

impl ExportError {
    pub fn source_file(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::SourceFile {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}
