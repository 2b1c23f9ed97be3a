use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use tracing::info;

use crate::domain::DatasetId;
use crate::error::PrepError;
use crate::store::Store;
use crate::tools;

/// The two instrument-calibration scalars a search needs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Estimates {
    pub precursor_tolerance_ppm: f64,
    pub fragment_bin_width_mz: f64,
}

pub trait ParameterEstimator: Send + Sync {
    /// Runs the external estimator once for the whole dataset, writing its
    /// tabular output under `output_dir`. Always re-runs when invoked; the
    /// caller skips the call when a result file already exists.
    fn estimate(
        &self,
        converted: &[Utf8PathBuf],
        id: &DatasetId,
        output_dir: &Utf8Path,
    ) -> Result<(), PrepError>;
}

/// crux param-medic, pooled over all of a dataset's replicate runs because
/// the estimate is most reliable across them.
pub struct CruxParamMedic {
    binary: Utf8PathBuf,
    timeout: Option<Duration>,
}

impl CruxParamMedic {
    pub fn new(binary: Utf8PathBuf, timeout: Option<Duration>) -> Self {
        Self { binary, timeout }
    }
}

impl ParameterEstimator for CruxParamMedic {
    fn estimate(
        &self,
        converted: &[Utf8PathBuf],
        id: &DatasetId,
        output_dir: &Utf8Path,
    ) -> Result<(), PrepError> {
        Store::ensure_dir(output_dir)?;

        let charges = (0..10)
            .filter(|charge| *charge != 1)
            .map(|charge| charge.to_string())
            .collect::<Vec<_>>()
            .join(",");
        let mut args = vec![
            "param-medic".to_string(),
            "--pm-charges".to_string(),
            charges,
            "--fileroot".to_string(),
            id.as_str().to_string(),
            "--output-dir".to_string(),
            output_dir.to_string(),
            "--pm-top-n-frag-peaks".to_string(),
            "60".to_string(),
            "--pm-min-peak-pairs".to_string(),
            "140".to_string(),
        ];
        args.extend(converted.iter().map(|path| path.to_string()));

        info!(dataset = id.as_str(), files = converted.len(), "running param-medic");
        tools::run_command(
            self.binary.as_std_path(),
            &args,
            None,
            self.timeout,
            |message| PrepError::Estimation {
                dataset: id.as_str().to_string(),
                message,
            },
        )
    }
}

/// Parses the estimator's tab-separated output, consuming only the first row.
pub fn parse_estimates(path: &Utf8Path, id: &DatasetId) -> Result<Estimates, PrepError> {
    let estimation = |message: String| PrepError::Estimation {
        dataset: id.as_str().to_string(),
        message,
    };

    if !path.as_std_path().is_file() {
        return Err(estimation(format!("estimator output missing: {path}")));
    }

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .from_path(path.as_std_path())
        .map_err(|err| estimation(err.to_string()))?;
    let headers = reader
        .headers()
        .map_err(|err| estimation(err.to_string()))?
        .clone();

    let precursor_col = find_column(&headers, &["precursor_prediction_ppm"])
        .ok_or_else(|| estimation("missing precursor_prediction_ppm column".to_string()))?;
    // Older crux releases misspell the fragment header.
    let fragment_col = find_column(
        &headers,
        &["fragment_prediction_th", "fragement_prediction_th"],
    )
    .ok_or_else(|| estimation("missing fragment_prediction_th column".to_string()))?;

    let record = reader
        .records()
        .next()
        .ok_or_else(|| estimation("estimator output has no data rows".to_string()))?
        .map_err(|err| estimation(err.to_string()))?;

    let precursor = parse_field(&record, precursor_col).ok_or_else(|| {
        estimation("precursor tolerance is not a number".to_string())
    })?;
    let fragment = parse_field(&record, fragment_col).ok_or_else(|| {
        estimation("fragment bin width is not a number".to_string())
    })?;

    Ok(Estimates {
        precursor_tolerance_ppm: precursor,
        fragment_bin_width_mz: fragment,
    })
}

fn find_column(headers: &csv::StringRecord, names: &[&str]) -> Option<usize> {
    headers
        .iter()
        .position(|header| names.contains(&header.trim()))
}

fn parse_field(record: &csv::StringRecord, index: usize) -> Option<f64> {
    record.get(index).and_then(|value| value.trim().parse().ok())
}
