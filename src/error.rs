use thiserror::Error;

use crate::pipeline::PipelineStep;

#[derive(Error, Debug)]
pub enum ConverterError {
    #[error("Invalid ledger row {row}: {reason}")]
    InvalidLedgerRow { row: usize, reason: String },

    #[error("Required column '{0}' not found in header row")]
    MissingColumn(String),

    #[error("Failed to parse file '{file}': {details}")]
    FileParse { file: String, details: String },

    #[error("Unsupported file format: {0}")]
    UnsupportedFormat(String),

    #[error("LLM gateway error: {0}")]
    Gateway(String),

    #[error("Invalid LLM response: {0}")]
    InvalidResponse(String),

    #[error("Action '{action}' is not allowed while the pipeline is at {step:?}")]
    InvalidTransition {
        step: PipelineStep,
        action: &'static str,
    },

    #[error("Statement index {index} out of range (have {len})")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("Question is empty")]
    EmptyQuestion,

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Key-value store error: {0}")]
    Store(String),

    #[error("Export error: {0}")]
    Export(String),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl ConverterError {
    /// Errors a user can clear by re-running the same stage.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ConverterError::Gateway(_) | ConverterError::InvalidResponse(_)
        )
    }
}

impl From<csv::Error> for ConverterError {
    fn from(err: csv::Error) -> Self {
        ConverterError::FileParse {
            file: "<csv>".to_string(),
            details: err.to_string(),
        }
    }
}

impl From<rust_xlsxwriter::XlsxError> for ConverterError {
    fn from(err: rust_xlsxwriter::XlsxError) -> Self {
        ConverterError::Export(err.to_string())
    }
}

#[cfg(feature = "openai")]
impl From<reqwest::Error> for ConverterError {
    fn from(err: reqwest::Error) -> Self {
        ConverterError::Gateway(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ConverterError>;
