use crate::pipeline::Stage;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Failures raised while opening, reading or writing a spreadsheet document.
#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("failed to open document {}: {reason}", .path.display())]
    Open { path: PathBuf, reason: String },

    #[error("failed to save document {}: {reason}", .path.display())]
    Save { path: PathBuf, reason: String },

    #[error("worksheet '{sheet}' not found in {}", .path.display())]
    MissingWorksheet { sheet: String, path: PathBuf },

    #[error("invalid cell reference: {0}")]
    InvalidCellRef(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("failed to read or write ledger: {0}")]
    Csv(#[from] csv::Error),

    #[error("ledger I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("source file {0} is already recorded in the ledger")]
    DuplicateSource(String),

    #[error("source file {0} is not recorded in the ledger")]
    UnknownSource(String),

    #[error("certificate date '{date}' of {source_file} is not a DD.MM.YYYY date")]
    MalformedDate { date: String, source_file: String },
}

/// Per-file ingest failures. These are reported and the file stays in the
/// inbox to be retried on the next run.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("unexpected filename format: {0}")]
    MalformedFilename(String),

    #[error("rows 'Radovi' or 'RADOVI PO PONUDI' not found in {0}")]
    NoMatchingRows(String),

    #[error("column '{column}' not found in {file}")]
    MissingColumn { column: String, file: String },

    #[error(transparent)]
    Document(#[from] DocumentError),
}

/// Errors that abort a whole stage, and with it the run.
#[derive(Debug, Error)]
pub enum StageError {
    #[error("required file not found: {}", .0.display())]
    MissingFile(PathBuf),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Document(#[from] DocumentError),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

#[derive(Debug, Error)]
#[error("stage {stage} failed: {source}")]
pub struct PipelineError {
    pub stage: Stage,
    #[source]
    pub source: StageError,
}
