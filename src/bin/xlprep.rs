use std::process::ExitCode;
use std::time::Duration;

use camino::Utf8Path;
use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use xlprep::app::App;
use xlprep::config::{ConfigLoader, ToolPaths};
use xlprep::dataset::{Dataset, DatasetCollection};
use xlprep::domain::{DatasetId, Partition, ProteomeId, UniprotAccession};
use xlprep::error::PrepError;
use xlprep::estimator::CruxParamMedic;
use xlprep::output::JsonOutput;
use xlprep::pride::{PrideClient, PrideFile, PrideHttpClient};
use xlprep::registry::{EnzymeRegistry, ModificationRegistry};
use xlprep::search::engine_for;
use xlprep::store::Store;
use xlprep::uniprot::{UniprotClient, UniprotHttpClient};

const HTTP_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Parser)]
#[command(name = "xlprep")]
#[command(about = "Prepare cross-linking proteomics datasets and run reproducible searches")]
#[command(version, author)]
struct Cli {
    /// Path to the dataset catalog (defaults to ./xlprep.json).
    #[arg(long, global = true)]
    config: Option<String>,

    /// Restrict the run to one partition.
    #[arg(long, global = true, value_enum)]
    partition: Option<Partition>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Assemble databases, verify conversions, estimate parameters")]
    Prepare(PrepareArgs),
    #[command(about = "Prepare datasets and search them with an engine")]
    Search(SearchArgs),
    #[command(about = "Report each dataset's current stage")]
    Status,
}

#[derive(Args)]
struct PrepareArgs {
    /// Kill an external tool after this many seconds.
    #[arg(long)]
    timeout: Option<u64>,
}

#[derive(Args)]
struct SearchArgs {
    /// Search engine identifier.
    #[arg(long, default_value = "kojak")]
    engine: String,

    /// Engine version; defaults to the first configured installation.
    #[arg(long)]
    engine_version: Option<String>,

    /// Kill an external tool after this many seconds.
    #[arg(long)]
    timeout: Option<u64>,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(prep) = report.downcast_ref::<PrepError>() {
            return ExitCode::from(map_exit_code(prep));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &PrepError) -> u8 {
    match error {
        PrepError::MissingConfig
        | PrepError::ConfigRead(_)
        | PrepError::ConfigParse(_)
        | PrepError::Configuration(_)
        | PrepError::InvalidDatasetId(_)
        | PrepError::InvalidAccession(_)
        | PrepError::InvalidProteomeId(_)
        | PrepError::InvalidPartition(_) => 2,
        PrepError::UniprotHttp(_)
        | PrepError::UniprotStatus { .. }
        | PrepError::PrideHttp(_)
        | PrepError::PrideStatus { .. }
        | PrepError::MissingTool(_)
        | PrepError::CommandTimeout(_) => 3,
        _ => 1,
    }
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let modifications = ModificationRegistry::builtin();
    let enzymes = EnzymeRegistry::builtin();
    let resolved = ConfigLoader::resolve(cli.config.as_deref(), &modifications, &enzymes)?;
    let store = Store::new(resolved.data_path.clone());

    let mut datasets = DatasetCollection::new();
    for config in resolved.datasets {
        datasets.add(Dataset::new(config, &store));
    }

    let tools = ToolPaths::from_env();

    match cli.command {
        Commands::Prepare(args) => {
            let timeout = args.timeout.map(Duration::from_secs);
            let uniprot = UniprotHttpClient::new(HTTP_TIMEOUT)?;
            let pride = PrideHttpClient::new(HTTP_TIMEOUT)?;
            let app = App::new(uniprot, pride, modifications, enzymes);
            let estimator = CruxParamMedic::new(tools.crux.clone(), timeout);
            let report = app.prepare(&mut datasets, &estimator, cli.partition)?;
            JsonOutput::print_report(&report).into_diagnostic()?;
            Ok(())
        }
        Commands::Search(args) => {
            let timeout = args.timeout.map(Duration::from_secs);
            let engine_config = tools.engine(&args.engine, args.engine_version.as_deref())?;
            let engine = engine_for(engine_config, timeout)?;
            let uniprot = UniprotHttpClient::new(HTTP_TIMEOUT)?;
            let pride = PrideHttpClient::new(HTTP_TIMEOUT)?;
            let app = App::new(uniprot, pride, modifications, enzymes);
            let estimator = CruxParamMedic::new(tools.crux.clone(), timeout);
            let report = app.search(&mut datasets, &estimator, engine.as_ref(), cli.partition)?;
            JsonOutput::print_report(&report).into_diagnostic()?;
            Ok(())
        }
        Commands::Status => {
            let app = App::new(NopUniprot, NopPride, modifications, enzymes);
            let report = app.status(&datasets, cli.partition);
            JsonOutput::print_report(&report).into_diagnostic()?;
            Ok(())
        }
    }
}

struct NopUniprot;
struct NopPride;

impl UniprotClient for NopUniprot {
    fn fetch_protein_fasta(&self, _accession: &UniprotAccession) -> Result<String, PrepError> {
        Err(PrepError::UniprotHttp(
            "UniProt client not configured".to_string(),
        ))
    }

    fn fetch_proteome_gz(&self, _id: &ProteomeId, _domain: &str) -> Result<Vec<u8>, PrepError> {
        Err(PrepError::UniprotHttp(
            "UniProt client not configured".to_string(),
        ))
    }
}

impl PrideClient for NopPride {
    fn list_files(&self, _id: &DatasetId) -> Result<Vec<PrideFile>, PrepError> {
        Err(PrepError::PrideHttp(
            "PRIDE client not configured".to_string(),
        ))
    }

    fn download_file(
        &self,
        _id: &DatasetId,
        _file: &PrideFile,
        _destination: &Utf8Path,
    ) -> Result<(), PrepError> {
        Err(PrepError::PrideHttp(
            "PRIDE client not configured".to_string(),
        ))
    }
}
