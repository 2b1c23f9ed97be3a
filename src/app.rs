use serde::Serialize;
use tracing::{error, info};

use crate::assembler::DatabaseAssembler;
use crate::dataset::{Dataset, DatasetCollection, DatasetState};
use crate::domain::Partition;
use crate::error::PrepError;
use crate::estimator::ParameterEstimator;
use crate::pride::PrideClient;
use crate::registry::{EnzymeRegistry, ModificationRegistry};
use crate::search::SearchEngine;
use crate::uniprot::UniprotClient;

/// Outcome of one dataset within a batch run. Blocked and awaiting states are
/// reported, never persisted; the filesystem remains the only state record.
#[derive(Debug, Clone, Serialize)]
pub struct DatasetReport {
    pub id: String,
    pub partition: String,
    pub state: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub raw_outputs: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_file: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scoring_file: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub generated_at: String,
    pub tool: String,
    pub datasets: Vec<DatasetReport>,
}

impl BatchReport {
    fn new(datasets: Vec<DatasetReport>) -> Self {
        Self {
            generated_at: chrono::Utc::now().to_rfc3339(),
            tool: format!("xlprep/{}", env!("CARGO_PKG_VERSION")),
            datasets,
        }
    }

    /// True when no dataset in the batch was blocked by an error.
    pub fn is_clean(&self) -> bool {
        self.datasets.iter().all(|report| report.error.is_none())
    }
}

pub struct App<U: UniprotClient, P: PrideClient> {
    uniprot: U,
    pride: P,
    modifications: ModificationRegistry,
    enzymes: EnzymeRegistry,
}

impl<U: UniprotClient, P: PrideClient> App<U, P> {
    pub fn new(
        uniprot: U,
        pride: P,
        modifications: ModificationRegistry,
        enzymes: EnzymeRegistry,
    ) -> Self {
        Self {
            uniprot,
            pride,
            modifications,
            enzymes,
        }
    }

    /// Reports each dataset's current stage without touching anything.
    pub fn status(
        &self,
        datasets: &DatasetCollection,
        partition: Option<Partition>,
    ) -> BatchReport {
        let reports = select(datasets, partition)
            .map(|dataset| report(dataset, dataset.state(), None))
            .collect();
        BatchReport::new(reports)
    }

    /// Advances every selected dataset through database assembly, conversion
    /// verification, and parameter estimation. A stage-local failure blocks
    /// only its dataset; the rest of the batch keeps going.
    pub fn prepare(
        &self,
        datasets: &mut DatasetCollection,
        estimator: &dyn ParameterEstimator,
        partition: Option<Partition>,
    ) -> Result<BatchReport, PrepError> {
        let assembler = DatabaseAssembler::new(&self.uniprot, &self.pride);
        let mut reports = Vec::new();

        for dataset in select_mut(datasets, partition) {
            match dataset.prepare(&assembler, estimator, &self.enzymes) {
                Ok(state) => {
                    info!(dataset = dataset.id().as_str(), state = %state, "prepared");
                    reports.push(report(dataset, state, None));
                }
                Err(err) if err.is_stage_local() => {
                    error!(dataset = dataset.id().as_str(), error = %err, "dataset blocked");
                    let state = blocked_state(dataset, &err);
                    reports.push(report(dataset, state, Some(err)));
                }
                Err(err) => return Err(err),
            }
        }

        Ok(BatchReport::new(reports))
    }

    /// Prepares then searches every selected dataset with the given engine.
    /// Datasets whose normalized result pair already exists are skipped
    /// outright, so a second invocation performs no external work.
    pub fn search(
        &self,
        datasets: &mut DatasetCollection,
        estimator: &dyn ParameterEstimator,
        engine: &dyn SearchEngine,
        partition: Option<Partition>,
    ) -> Result<BatchReport, PrepError> {
        let assembler = DatabaseAssembler::new(&self.uniprot, &self.pride);
        let mut reports = Vec::new();

        for dataset in select_mut(datasets, partition) {
            if let Some(result) = dataset.completed_search(engine) {
                info!(dataset = dataset.id().as_str(), "already searched");
                let mut entry = report(dataset, DatasetState::Searched, None);
                entry.result_file = Some(result.result_file.to_string());
                entry.scoring_file = Some(result.scoring_file.to_string());
                reports.push(entry);
                continue;
            }

            let state = match dataset.prepare(&assembler, estimator, &self.enzymes) {
                Ok(state) => state,
                Err(err) if err.is_stage_local() => {
                    error!(dataset = dataset.id().as_str(), error = %err, "dataset blocked");
                    let state = blocked_state(dataset, &err);
                    reports.push(report(dataset, state, Some(err)));
                    continue;
                }
                Err(err) => return Err(err),
            };
            if state != DatasetState::Ready {
                reports.push(report(dataset, state, None));
                continue;
            }

            match dataset.search(engine, &self.modifications, &self.enzymes) {
                Ok(result) => {
                    info!(
                        dataset = dataset.id().as_str(),
                        version = result.engine_version,
                        "search complete"
                    );
                    let mut entry = report(dataset, DatasetState::Searched, None);
                    entry.result_file = Some(result.result_file.to_string());
                    entry.scoring_file = Some(result.scoring_file.to_string());
                    reports.push(entry);
                }
                Err(err) if err.is_stage_local() => {
                    error!(dataset = dataset.id().as_str(), error = %err, "search failed");
                    reports.push(report(dataset, DatasetState::Ready, Some(err)));
                }
                Err(err) => return Err(err),
            }
        }

        Ok(BatchReport::new(reports))
    }
}

fn select<'a>(
    datasets: &'a DatasetCollection,
    partition: Option<Partition>,
) -> Box<dyn Iterator<Item = &'a Dataset> + 'a> {
    match partition {
        Some(partition) => Box::new(datasets.partition(partition).iter()),
        None => Box::new(datasets.iter()),
    }
}

fn select_mut<'a>(
    datasets: &'a mut DatasetCollection,
    partition: Option<Partition>,
) -> Box<dyn Iterator<Item = &'a mut Dataset> + 'a> {
    match partition {
        Some(partition) => Box::new(datasets.partition_mut(partition).iter_mut()),
        None => Box::new(datasets.iter_mut()),
    }
}

/// An estimator can fail after its output file exists (unparsable table), in
/// which case the filesystem probe would overstate progress.
fn blocked_state(dataset: &Dataset, err: &PrepError) -> DatasetState {
    match err {
        PrepError::Estimation { .. } => DatasetState::AwaitingParameters,
        _ => dataset.state(),
    }
}

fn report(dataset: &Dataset, state: DatasetState, err: Option<PrepError>) -> DatasetReport {
    // The operator inspects the engine's own logs through these paths.
    let raw_outputs = match &err {
        Some(PrepError::SearchExecution { raw_outputs, .. }) => raw_outputs.clone(),
        _ => Vec::new(),
    };
    DatasetReport {
        id: dataset.id().as_str().to_string(),
        partition: dataset.partition().to_string(),
        state: state.to_string(),
        error: err.map(|err| err.to_string()),
        raw_outputs,
        result_file: None,
        scoring_file: None,
    }
}
