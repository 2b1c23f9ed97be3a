use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum PrepError {
    #[error("invalid dataset identifier: {0}")]
    InvalidDatasetId(String),

    #[error("invalid UniProt accession: {0}")]
    InvalidAccession(String),

    #[error("invalid proteome identifier: {0}")]
    InvalidProteomeId(String),

    #[error("unknown partition: {0}")]
    InvalidPartition(String),

    #[error("missing config file xlprep.json in current directory")]
    MissingConfig,

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("database acquisition failed for {dataset}: {message}")]
    Acquisition { dataset: String, message: String },

    #[error("parameter estimation failed for {dataset}: {message}")]
    Estimation { dataset: String, message: String },

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("search execution failed for {dataset}: {message}")]
    SearchExecution {
        dataset: String,
        message: String,
        raw_outputs: Vec<String>,
    },

    #[error("unsupported search engine version: {0}")]
    UnsupportedVersion(String),

    #[error("UniProt request failed: {0}")]
    UniprotHttp(String),

    #[error("UniProt returned status {status}: {message}")]
    UniprotStatus { status: u16, message: String },

    #[error("PRIDE request failed: {0}")]
    PrideHttp(String),

    #[error("PRIDE returned status {status}: {message}")]
    PrideStatus { status: u16, message: String },

    #[error("required tool not found: {0}")]
    MissingTool(String),

    #[error("external command timed out after {0} seconds")]
    CommandTimeout(u64),

    #[error("filesystem error: {0}")]
    Filesystem(String),
}

impl PrepError {
    /// Stage-local failures block the owning dataset but must not abort the
    /// rest of a collection. A timed-out invocation counts: it fails one
    /// stage of one dataset. Everything else is fatal to the run.
    pub fn is_stage_local(&self) -> bool {
        matches!(
            self,
            PrepError::Acquisition { .. }
                | PrepError::Estimation { .. }
                | PrepError::SearchExecution { .. }
                | PrepError::CommandTimeout(_)
                | PrepError::UniprotHttp(_)
                | PrepError::UniprotStatus { .. }
                | PrepError::PrideHttp(_)
                | PrepError::PrideStatus { .. }
        )
    }
}
