#![cfg(unix)]

use std::sync::{Arc, Mutex};

use camino::{Utf8Path, Utf8PathBuf};

use xlprep::app::App;
use xlprep::config::DatasetConfig;
use xlprep::dataset::{Dataset, DatasetCollection};
use xlprep::domain::{DatasetId, FastaSource, Partition, ProteomeId, UniprotAccession};
use xlprep::error::PrepError;
use xlprep::estimator::ParameterEstimator;
use xlprep::fasta;
use xlprep::pride::{PrideClient, PrideFile};
use xlprep::registry::{EnzymeRegistry, ModificationRegistry};
use xlprep::search::KojakEngine;
use xlprep::store::Store;
use xlprep::uniprot::UniprotClient;

struct MockUniprot {
    calls: Arc<Mutex<usize>>,
}

impl UniprotClient for MockUniprot {
    fn fetch_protein_fasta(&self, accession: &UniprotAccession) -> Result<String, PrepError> {
        *self.calls.lock().unwrap() += 1;
        Ok(format!(
            ">sp|{0}|{0}_TEST\nMATKGPLRVEDKAAYIQSRWK\n",
            accession.as_str()
        ))
    }

    fn fetch_proteome_gz(&self, _id: &ProteomeId, _domain: &str) -> Result<Vec<u8>, PrepError> {
        Err(PrepError::UniprotHttp("not implemented".to_string()))
    }
}

struct MockPride;

impl PrideClient for MockPride {
    fn list_files(&self, _id: &DatasetId) -> Result<Vec<PrideFile>, PrepError> {
        Err(PrepError::PrideHttp("not implemented".to_string()))
    }

    fn download_file(
        &self,
        _id: &DatasetId,
        _file: &PrideFile,
        _destination: &Utf8Path,
    ) -> Result<(), PrepError> {
        Err(PrepError::PrideHttp("not implemented".to_string()))
    }
}

struct MockEstimator {
    calls: Arc<Mutex<usize>>,
    drop_fragment_for: Option<DatasetId>,
}

impl MockEstimator {
    fn new(calls: Arc<Mutex<usize>>) -> Self {
        Self {
            calls,
            drop_fragment_for: None,
        }
    }
}

impl ParameterEstimator for MockEstimator {
    fn estimate(
        &self,
        _converted: &[Utf8PathBuf],
        id: &DatasetId,
        output_dir: &Utf8Path,
    ) -> Result<(), PrepError> {
        *self.calls.lock().unwrap() += 1;
        Store::ensure_dir(output_dir)?;
        let path = output_dir.join(format!("{}.param-medic.txt", id.as_str()));
        let content = if self.drop_fragment_for.as_ref() == Some(id) {
            "precursor_prediction_ppm\n12.5\n"
        } else {
            "precursor_prediction_ppm\tfragment_prediction_th\n12.5\t0.02\n"
        };
        std::fs::write(path.as_std_path(), content)
            .map_err(|err| PrepError::Filesystem(err.to_string()))
    }
}

fn utf8(path: std::path::PathBuf) -> Utf8PathBuf {
    Utf8PathBuf::from_path_buf(path).unwrap()
}

fn proteins_config(id: &str, raw_files: &[&str], accessions: &[&str]) -> DatasetConfig {
    DatasetConfig {
        id: id.parse().unwrap(),
        raw_files: raw_files.iter().map(|file| file.to_string()).collect(),
        source: FastaSource::Proteins(
            accessions
                .iter()
                .map(|acc| acc.parse().unwrap())
                .collect(),
        ),
        modifications: vec!["BS3".to_string()],
        enzymes: vec!["Trypsin".to_string()],
        partition: Partition::Training,
    }
}

fn write_template(dir: &Utf8Path) -> Utf8PathBuf {
    let path = dir.join("kojak_template.conf");
    std::fs::write(
        path.as_std_path(),
        "database = $database$\nfragment_bin_size = $fragbin$\nppm_tolerance_pre = $pretol$\n",
    )
    .unwrap();
    path
}

fn write_script(dir: &Utf8Path, name: &str, content: &str) -> Utf8PathBuf {
    use std::os::unix::fs::PermissionsExt;
    let path = dir.join(name);
    std::fs::write(path.as_std_path(), content).unwrap();
    let mut perms = std::fs::metadata(path.as_std_path()).unwrap().permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(path.as_std_path(), perms).unwrap();
    path
}

/// A stand-in engine binary: logs each invocation, then emits the expected
/// triple per spectra file into the working directory.
fn complete_engine_script(dir: &Utf8Path, log: &Utf8Path, version: &str) -> Utf8PathBuf {
    let content = format!(
        "#!/bin/sh\n\
         echo run >> {log}\n\
         shift\n\
         for f in \"$@\"; do\n\
           base=$(basename \"$f\" .mzML.gz)\n\
           printf 'Kojak version {version}\\nscan\\tscore\\n1\\t10.0\\n' > \"$base.kojak.txt\"\n\
           printf '#c\\nSpecId\\tLabel\\tScore\\n%s_intra\\t1\\t3.5\\n' \"$base\" > \"$base.perc.intra.txt\"\n\
           printf '#c\\nSpecId\\tLabel\\tScore\\n%s_inter\\t-1\\t1.2\\n' \"$base\" > \"$base.perc.inter.txt\"\n\
         done\n"
    );
    write_script(dir, "fake_kojak.sh", &content)
}

/// Emits only two of the three expected files per input.
fn partial_engine_script(dir: &Utf8Path) -> Utf8PathBuf {
    let content = "#!/bin/sh\n\
         shift\n\
         for f in \"$@\"; do\n\
           base=$(basename \"$f\" .mzML.gz)\n\
           printf 'Kojak version 2.0.0-dev\\nscan\\tscore\\n' > \"$base.kojak.txt\"\n\
           printf 'SpecId\\tLabel\\tScore\\n' > \"$base.perc.intra.txt\"\n\
         done\n";
    write_script(dir, "fake_kojak.sh", content)
}

struct Fixture {
    _temp: tempfile::TempDir,
    root: Utf8PathBuf,
    store: Store,
    uniprot_calls: Arc<Mutex<usize>>,
    estimator_calls: Arc<Mutex<usize>>,
}

impl Fixture {
    fn new() -> Self {
        let temp = tempfile::tempdir().unwrap();
        let root = utf8(temp.path().join("data"));
        let store = Store::new(root.clone());
        Self {
            _temp: temp,
            root,
            store,
            uniprot_calls: Arc::new(Mutex::new(0)),
            estimator_calls: Arc::new(Mutex::new(0)),
        }
    }

    fn app(&self) -> App<MockUniprot, MockPride> {
        App::new(
            MockUniprot {
                calls: self.uniprot_calls.clone(),
            },
            MockPride,
            ModificationRegistry::builtin(),
            EnzymeRegistry::builtin(),
        )
    }

    fn collection(&self, configs: Vec<DatasetConfig>) -> DatasetCollection {
        let mut datasets = DatasetCollection::new();
        for config in configs {
            datasets.add(Dataset::new(config, &self.store));
        }
        datasets
    }

    /// Conversion is an operator step, so tests provide the converted files.
    fn provide_converted(&self, config: &DatasetConfig) {
        let dir = self.store.dataset_dir(config.partition, &config.id);
        std::fs::create_dir_all(dir.as_std_path()).unwrap();
        for raw in &config.raw_files {
            let converted = self.store.converted_path(config.partition, &config.id, raw);
            std::fs::write(converted.as_std_path(), b"spectra").unwrap();
        }
    }
}

#[test]
fn full_pipeline_runs_once_then_skips_everything() {
    let fixture = Fixture::new();
    let config = proteins_config("PXD003282", &["run_01.raw"], &["P95989", "P95989", "Q980Z8"]);
    fixture.provide_converted(&config);

    let log = fixture.root.join("invocations.log");
    let script = complete_engine_script(&fixture.root, &log, "2.0.0-dev");
    let template = write_template(&fixture.root);
    let engine = KojakEngine::new("2.0.0-dev".to_string(), script, template, None);

    let app = fixture.app();
    let estimator = MockEstimator::new(fixture.estimator_calls.clone());

    let mut datasets = fixture.collection(vec![config.clone()]);
    let report = app.search(&mut datasets, &estimator, &engine, None).unwrap();

    assert!(report.is_clean());
    assert_eq!(report.datasets.len(), 1);
    assert_eq!(report.datasets[0].state, "searched");
    let result_file = Utf8PathBuf::from(report.datasets[0].result_file.clone().unwrap());
    assert!(result_file.as_str().ends_with("PXD003282.kojak-2.0.0-dev.xenith.txt"));

    // Three requested accessions with the duplicate preserved, plus decoys.
    let id: DatasetId = "PXD003282".parse().unwrap();
    let database = fixture.store.fasta_path(Partition::Training, &id);
    let records =
        fasta::parse_fasta(&std::fs::read_to_string(database.as_std_path()).unwrap()).unwrap();
    assert_eq!(records.len(), 6);
    assert!(records[..3].iter().all(|r| !r.header.starts_with("decoy_")));
    assert!(records[3..].iter().all(|r| r.header.starts_with("decoy_")));

    // One modification block and one enzyme block in the rendered config.
    let conf = fixture
        .store
        .search_dir(Partition::Training, &id, "kojak", "2.0.0-dev")
        .join("kojak.conf");
    let conf_text = std::fs::read_to_string(conf.as_std_path()).unwrap();
    assert_eq!(conf_text.matches("cross_link =").count(), 1);
    assert_eq!(conf_text.matches("enzyme =").count(), 1);

    assert_eq!(*fixture.uniprot_calls.lock().unwrap(), 3);
    assert_eq!(*fixture.estimator_calls.lock().unwrap(), 1);
    assert_eq!(std::fs::read_to_string(log.as_std_path()).unwrap().lines().count(), 1);
    let first_bytes = std::fs::read(result_file.as_std_path()).unwrap();

    // A fresh process re-derives everything from the filesystem and finds
    // nothing left to do.
    let mut datasets = fixture.collection(vec![config]);
    let report = app.search(&mut datasets, &estimator, &engine, None).unwrap();
    assert!(report.is_clean());
    assert_eq!(report.datasets[0].state, "searched");
    assert_eq!(*fixture.uniprot_calls.lock().unwrap(), 3);
    assert_eq!(*fixture.estimator_calls.lock().unwrap(), 1);
    assert_eq!(std::fs::read_to_string(log.as_std_path()).unwrap().lines().count(), 1);
    assert_eq!(std::fs::read(result_file.as_std_path()).unwrap(), first_bytes);
}

#[test]
fn unparsable_estimate_blocks_one_dataset_and_batch_continues() {
    let fixture = Fixture::new();
    let bad = proteins_config("PXD000001", &["a.raw"], &["P95989"]);
    let good = proteins_config("PXD000002", &["b.raw"], &["Q980Z8"]);
    fixture.provide_converted(&bad);
    fixture.provide_converted(&good);

    let app = fixture.app();
    let mut estimator = MockEstimator::new(fixture.estimator_calls.clone());
    estimator.drop_fragment_for = Some("PXD000001".parse().unwrap());

    let mut datasets = fixture.collection(vec![bad, good]);
    let report = app.prepare(&mut datasets, &estimator, None).unwrap();

    assert_eq!(report.datasets.len(), 2);
    let blocked = &report.datasets[0];
    assert_eq!(blocked.id, "PXD000001");
    assert_eq!(blocked.state, "awaiting-parameters");
    assert!(blocked.error.as_deref().unwrap().contains("fragment"));

    let clean = &report.datasets[1];
    assert_eq!(clean.id, "PXD000002");
    assert_eq!(clean.state, "ready");
    assert!(clean.error.is_none());
}

#[test]
fn timed_out_estimator_blocks_its_dataset_and_the_batch_continues() {
    use std::time::Duration;
    use xlprep::estimator::CruxParamMedic;

    let fixture = Fixture::new();
    let slow = proteins_config("PXD000007", &["a.raw"], &["P95989"]);
    let done = proteins_config("PXD000008", &["b.raw"], &["Q980Z8"]);
    fixture.provide_converted(&slow);
    fixture.provide_converted(&done);

    // The second dataset's estimate already exists, so only the first one
    // reaches the external estimator.
    let done_id: DatasetId = "PXD000008".parse().unwrap();
    let estimate = fixture.store.estimate_path(Partition::Training, &done_id);
    std::fs::create_dir_all(estimate.parent().unwrap().as_std_path()).unwrap();
    std::fs::write(
        estimate.as_std_path(),
        "precursor_prediction_ppm\tfragment_prediction_th\n12.5\t0.02\n",
    )
    .unwrap();

    let script = write_script(&fixture.root, "fake_crux.sh", "#!/bin/sh\nsleep 30\n");
    let estimator = CruxParamMedic::new(script, Some(Duration::from_secs(1)));

    let app = fixture.app();
    let mut datasets = fixture.collection(vec![slow, done]);
    let report = app.prepare(&mut datasets, &estimator, None).unwrap();

    let blocked = &report.datasets[0];
    assert_eq!(blocked.id, "PXD000007");
    assert_eq!(blocked.state, "awaiting-parameters");
    assert!(blocked.error.as_deref().unwrap().contains("timed out"));

    let clean = &report.datasets[1];
    assert_eq!(clean.id, "PXD000008");
    assert_eq!(clean.state, "ready");
    assert!(clean.error.is_none());
}

#[test]
fn missing_converted_file_holds_the_whole_dataset_back() {
    let fixture = Fixture::new();
    let config = proteins_config("PXD000003", &["a.raw", "b.raw"], &["P95989"]);

    // Only the first of two converted files is present.
    let id: DatasetId = "PXD000003".parse().unwrap();
    let dir = fixture.store.dataset_dir(Partition::Training, &id);
    std::fs::create_dir_all(dir.as_std_path()).unwrap();
    let converted = fixture
        .store
        .converted_path(Partition::Training, &id, "a.raw");
    std::fs::write(converted.as_std_path(), b"spectra").unwrap();

    let app = fixture.app();
    let estimator = MockEstimator::new(fixture.estimator_calls.clone());

    let mut datasets = fixture.collection(vec![config]);
    let report = app.prepare(&mut datasets, &estimator, None).unwrap();

    assert_eq!(report.datasets[0].state, "awaiting-conversion");
    assert!(report.datasets[0].error.is_none());
    assert_eq!(*fixture.estimator_calls.lock().unwrap(), 0);
}

#[test]
fn incomplete_output_triple_fails_the_search_without_normalized_files() {
    let fixture = Fixture::new();
    let config = proteins_config("PXD000004", &["run_01.raw"], &["P95989"]);
    fixture.provide_converted(&config);

    let script = partial_engine_script(&fixture.root);
    let template = write_template(&fixture.root);
    let engine = KojakEngine::new("2.0.0-dev".to_string(), script, template, None);

    let app = fixture.app();
    let estimator = MockEstimator::new(fixture.estimator_calls.clone());

    let mut datasets = fixture.collection(vec![config]);
    let report = app.search(&mut datasets, &estimator, &engine, None).unwrap();

    let entry = &report.datasets[0];
    assert!(entry.error.as_deref().unwrap().contains("incomplete"));
    assert!(!entry.raw_outputs.is_empty());

    let id: DatasetId = "PXD000004".parse().unwrap();
    let search_dir = fixture
        .store
        .search_dir(Partition::Training, &id, "kojak", "2.0.0-dev");
    assert!(!search_dir
        .join("PXD000004.kojak-2.0.0-dev.xenith.txt")
        .as_std_path()
        .exists());
    assert!(!search_dir
        .join("PXD000004.kojak-2.0.0-dev.pin")
        .as_std_path()
        .exists());
}

#[test]
fn unsupported_engine_version_is_fatal_and_writes_nothing() {
    let fixture = Fixture::new();
    let config = proteins_config("PXD000005", &["run_01.raw"], &["P95989"]);
    fixture.provide_converted(&config);

    let log = fixture.root.join("invocations.log");
    let script = complete_engine_script(&fixture.root, &log, "9.9.9");
    let template = write_template(&fixture.root);
    let engine = KojakEngine::new("2.0.0-dev".to_string(), script, template, None);

    let app = fixture.app();
    let estimator = MockEstimator::new(fixture.estimator_calls.clone());

    let mut datasets = fixture.collection(vec![config]);
    let err = app
        .search(&mut datasets, &estimator, &engine, None)
        .unwrap_err();
    assert!(matches!(err, PrepError::UnsupportedVersion(version) if version == "9.9.9"));

    let id: DatasetId = "PXD000005".parse().unwrap();
    let search_dir = fixture
        .store
        .search_dir(Partition::Training, &id, "kojak", "2.0.0-dev");
    assert!(!search_dir
        .join("PXD000005.kojak-9.9.9.xenith.txt")
        .as_std_path()
        .exists());
    assert!(!search_dir
        .join("PXD000005.kojak-9.9.9.pin")
        .as_std_path()
        .exists());
}

#[test]
fn status_reports_stages_without_side_effects() {
    let fixture = Fixture::new();
    let config = proteins_config("PXD000006", &["a.raw"], &["P95989"]);

    let app = fixture.app();
    let datasets = fixture.collection(vec![config]);
    let report = app.status(&datasets, None);

    assert_eq!(report.datasets[0].state, "uninitialized");
    assert_eq!(*fixture.uniprot_calls.lock().unwrap(), 0);
    assert!(!fixture.root.as_std_path().exists());
}
