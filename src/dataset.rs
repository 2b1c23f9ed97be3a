use std::fmt;

use camino::{Utf8Path, Utf8PathBuf};
use tracing::{info, warn};

use crate::assembler::DatabaseAssembler;
use crate::config::DatasetConfig;
use crate::domain::{DatasetId, FastaSource, Partition};
use crate::error::PrepError;
use crate::estimator::{self, Estimates, ParameterEstimator};
use crate::registry::{EnzymeRegistry, ModificationRegistry};
use crate::search::{SearchEngine, SearchJobConfig, SearchResult};
use crate::store::Store;

/// The stage a dataset has reached, derived by probing the filesystem. The
/// persisted artifact is the state; nothing else is recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatasetState {
    Uninitialized,
    AwaitingDatabase,
    AwaitingConversion,
    AwaitingParameters,
    Ready,
    Searched,
}

impl fmt::Display for DatasetState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DatasetState::Uninitialized => write!(f, "uninitialized"),
            DatasetState::AwaitingDatabase => write!(f, "awaiting-database"),
            DatasetState::AwaitingConversion => write!(f, "awaiting-conversion"),
            DatasetState::AwaitingParameters => write!(f, "awaiting-parameters"),
            DatasetState::Ready => write!(f, "ready"),
            DatasetState::Searched => write!(f, "searched"),
        }
    }
}

/// One proteomics dataset: identity, file inventory, and stage progression.
/// The unit the pipeline schedules.
pub struct Dataset {
    id: DatasetId,
    raw_files: Vec<String>,
    source: FastaSource,
    modifications: Vec<String>,
    enzymes: Vec<String>,
    partition: Partition,
    estimates: Option<Estimates>,
    store: Store,
    root: Utf8PathBuf,
    fasta_file: Utf8PathBuf,
    converted_files: Vec<Utf8PathBuf>,
}

impl Dataset {
    pub fn new(config: DatasetConfig, store: &Store) -> Self {
        let root = store.dataset_dir(config.partition, &config.id);
        let fasta_file = store.fasta_path(config.partition, &config.id);
        // One converted file per raw file, same ordinal position.
        let converted_files = config
            .raw_files
            .iter()
            .map(|raw| store.converted_path(config.partition, &config.id, raw))
            .collect();
        Self {
            id: config.id,
            raw_files: config.raw_files,
            source: config.source,
            modifications: config.modifications,
            enzymes: config.enzymes,
            partition: config.partition,
            estimates: None,
            store: store.clone(),
            root,
            fasta_file,
            converted_files,
        }
    }

    pub fn id(&self) -> &DatasetId {
        &self.id
    }

    pub fn partition(&self) -> Partition {
        self.partition
    }

    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    pub fn fasta_file(&self) -> &Utf8Path {
        &self.fasta_file
    }

    pub fn converted_files(&self) -> &[Utf8PathBuf] {
        &self.converted_files
    }

    pub fn raw_files(&self) -> &[String] {
        &self.raw_files
    }

    fn estimate_file(&self) -> Utf8PathBuf {
        self.store.estimate_path(self.partition, &self.id)
    }

    fn missing_converted(&self) -> Vec<&Utf8Path> {
        self.converted_files
            .iter()
            .filter(|path| !Store::exists(path))
            .map(Utf8PathBuf::as_path)
            .collect()
    }

    /// Probes the filesystem for the dataset's current stage, up to `Ready`.
    pub fn state(&self) -> DatasetState {
        if !self.root.as_std_path().is_dir() {
            return DatasetState::Uninitialized;
        }
        if !Store::exists(&self.fasta_file) {
            return DatasetState::AwaitingDatabase;
        }
        if !self.missing_converted().is_empty() {
            return DatasetState::AwaitingConversion;
        }
        if !Store::exists(&self.estimate_file()) {
            return DatasetState::AwaitingParameters;
        }
        DatasetState::Ready
    }

    /// Returns the recorded result pair when both normalized files already
    /// exist for this engine, making a re-search redundant.
    pub fn completed_search(&self, engine: &dyn SearchEngine) -> Option<SearchResult> {
        let dir = self
            .store
            .search_dir(self.partition, &self.id, engine.id(), engine.version());
        let base = format!("{}.{}-{}", self.id.as_str(), engine.id(), engine.version());
        let result_file = dir.join(format!("{base}.xenith.txt"));
        let scoring_file = dir.join(format!("{base}.pin"));
        if Store::exists(&result_file) && Store::exists(&scoring_file) {
            Some(SearchResult {
                result_file,
                scoring_file,
                engine_version: engine.version().to_string(),
            })
        } else {
            None
        }
    }

    /// Advances the dataset through the preparation stages, gated by on-disk
    /// existence checks so completed work is never repeated.
    ///
    /// Returns `AwaitingConversion` (not an error) when converted spectra are
    /// missing: conversion is delegated to the operator, and a dataset with
    /// any missing file is wholly held back rather than partially searched.
    pub fn prepare(
        &mut self,
        assembler: &DatabaseAssembler,
        estimator: &dyn ParameterEstimator,
        enzymes: &EnzymeRegistry,
    ) -> Result<DatasetState, PrepError> {
        // Filesystem failure here is fatal, not a per-dataset block.
        Store::ensure_dir(&self.root)?;

        if !Store::exists(&self.fasta_file) {
            // The first listed enzyme is authoritative for decoy shuffling.
            let rule = self
                .enzymes
                .first()
                .ok_or_else(|| {
                    PrepError::Configuration(format!("{}: enzyme set is empty", self.id))
                })
                .and_then(|name| enzymes.rule(name))?;
            assembler.assemble(&self.id, &self.source, rule, &self.fasta_file)?;
        } else {
            info!(dataset = self.id.as_str(), "database already present");
        }

        let missing = self.missing_converted();
        if !missing.is_empty() {
            warn!(
                dataset = self.id.as_str(),
                missing = missing.len(),
                "converted spectra not found; download and convert before proceeding"
            );
            return Ok(DatasetState::AwaitingConversion);
        }

        let estimate_file = self.estimate_file();
        if !Store::exists(&estimate_file) {
            let output_dir = self.store.estimate_dir(self.partition, &self.id);
            estimator.estimate(&self.converted_files, &self.id, &output_dir)?;
        }
        self.estimates = Some(estimator::parse_estimates(&estimate_file, &self.id)?);

        Ok(DatasetState::Ready)
    }

    /// Runs configure → run → normalize for this dataset. Never mutates
    /// dataset state on failure, so a retry resumes from the same stage.
    pub fn search(
        &self,
        engine: &dyn SearchEngine,
        modifications: &ModificationRegistry,
        enzymes: &EnzymeRegistry,
    ) -> Result<SearchResult, PrepError> {
        if !Store::exists(&self.fasta_file) {
            return Err(PrepError::Configuration(format!(
                "{}: database file does not exist",
                self.id
            )));
        }
        if !self.missing_converted().is_empty() {
            return Err(PrepError::Configuration(format!(
                "{}: converted spectra files do not exist",
                self.id
            )));
        }
        let estimates = self.estimates.ok_or_else(|| {
            PrepError::Configuration(format!(
                "{}: no precursor tolerance or fragment bin width were estimated",
                self.id
            ))
        })?;

        let job = SearchJobConfig {
            engine: engine.id().to_string(),
            version: engine.version().to_string(),
            template: engine.template().to_owned(),
            database: self.fasta_file.clone(),
            precursor_tolerance_ppm: estimates.precursor_tolerance_ppm,
            fragment_bin_width_mz: estimates.fragment_bin_width_mz,
            modifications: self.modifications.clone(),
            enzymes: self.enzymes.clone(),
        };

        let output_dir = self
            .store
            .search_dir(self.partition, &self.id, engine.id(), engine.version());
        let rendered = engine.configure(&job, modifications, enzymes)?;
        let raw = engine.run(&self.id, &self.converted_files, &rendered, &output_dir)?;
        engine.normalize(&self.id, &raw, &output_dir)
    }
}

/// Datasets grouped into the three model-building partitions. Partition
/// membership is fixed at insertion; an unrecognized partition tag never gets
/// this far because [`Partition`] parsing fails fast.
#[derive(Default)]
pub struct DatasetCollection {
    training: Vec<Dataset>,
    validation: Vec<Dataset>,
    test: Vec<Dataset>,
}

impl DatasetCollection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, dataset: Dataset) {
        match dataset.partition() {
            Partition::Training => self.training.push(dataset),
            Partition::Validation => self.validation.push(dataset),
            Partition::Test => self.test.push(dataset),
        }
    }

    pub fn partition(&self, partition: Partition) -> &[Dataset] {
        match partition {
            Partition::Training => &self.training,
            Partition::Validation => &self.validation,
            Partition::Test => &self.test,
        }
    }

    pub fn partition_mut(&mut self, partition: Partition) -> &mut [Dataset] {
        match partition {
            Partition::Training => &mut self.training,
            Partition::Validation => &mut self.validation,
            Partition::Test => &mut self.test,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Dataset> {
        self.training
            .iter()
            .chain(self.validation.iter())
            .chain(self.test.iter())
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Dataset> {
        self.training
            .iter_mut()
            .chain(self.validation.iter_mut())
            .chain(self.test.iter_mut())
    }

    pub fn len(&self) -> usize {
        self.training.len() + self.validation.len() + self.test.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
