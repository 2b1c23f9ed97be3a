use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};

use crate::config::EngineConfig;
use crate::domain::DatasetId;
use crate::error::PrepError;
use crate::registry::{EnzymeRegistry, ModificationRegistry};

pub mod kojak;

pub use kojak::KojakEngine;

/// Everything one search invocation needs, resolved by the dataset. Built
/// fresh per call and discarded; never persisted.
#[derive(Debug, Clone)]
pub struct SearchJobConfig {
    pub engine: String,
    pub version: String,
    pub template: Utf8PathBuf,
    pub database: Utf8PathBuf,
    pub precursor_tolerance_ppm: f64,
    pub fragment_bin_width_mz: f64,
    /// Modification names in caller order; no duplicate suppression.
    pub modifications: Vec<String>,
    /// Enzyme names in caller order; never empty.
    pub enzymes: Vec<String>,
}

/// The output triple one input spectra file produces.
#[derive(Debug, Clone)]
pub struct RawSearchOutput {
    pub primary: Utf8PathBuf,
    pub intra: Utf8PathBuf,
    pub inter: Utf8PathBuf,
}

impl RawSearchOutput {
    pub fn paths(&self) -> [&Utf8Path; 3] {
        [&self.primary, &self.intra, &self.inter]
    }
}

/// The normalized result pair a completed search yields.
#[derive(Debug, Clone)]
pub struct SearchResult {
    pub result_file: Utf8PathBuf,
    pub scoring_file: Utf8PathBuf,
    pub engine_version: String,
}

/// One search engine identity. Selecting an implementation is an explicit
/// lookup by name (`engine_for`), never runtime type inspection.
pub trait SearchEngine: Send + Sync {
    fn id(&self) -> &str;

    fn version(&self) -> &str;

    /// The config-file template this engine installation renders.
    fn template(&self) -> &Utf8Path;

    /// Renders the engine configuration file from the job bundle, the
    /// template, and the registries.
    fn configure(
        &self,
        job: &SearchJobConfig,
        modifications: &ModificationRegistry,
        enzymes: &EnzymeRegistry,
    ) -> Result<String, PrepError>;

    /// Invokes the engine binary once over all converted spectra files,
    /// returning the complete output triple per input.
    fn run(
        &self,
        dataset: &DatasetId,
        converted: &[Utf8PathBuf],
        rendered_config: &str,
        output_dir: &Utf8Path,
    ) -> Result<Vec<RawSearchOutput>, PrepError>;

    /// Derives the two normalized files from the raw triples. Deterministic:
    /// unchanged raw files yield byte-identical outputs.
    fn normalize(
        &self,
        dataset: &DatasetId,
        raw: &[RawSearchOutput],
        output_dir: &Utf8Path,
    ) -> Result<SearchResult, PrepError>;
}

/// Instantiates the engine named by `config`.
pub fn engine_for(
    config: &EngineConfig,
    timeout: Option<Duration>,
) -> Result<Box<dyn SearchEngine>, PrepError> {
    match config.id.as_str() {
        "kojak" => Ok(Box::new(KojakEngine::new(
            config.version.clone(),
            config.binary.clone(),
            config.template.clone(),
            timeout,
        ))),
        other => Err(PrepError::Configuration(format!(
            "unknown search engine: {other}"
        ))),
    }
}
