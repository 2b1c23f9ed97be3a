use std::fs;
use std::path::PathBuf;

use camino::Utf8PathBuf;
use serde::Deserialize;

use crate::domain::{DatasetId, FastaSource, Partition, DEFAULT_PROTEOME_DOMAIN};
use crate::error::PrepError;
use crate::registry::{EnzymeRegistry, ModificationRegistry};

/// Raw shape of the `xlprep.json` dataset catalog.
#[derive(Debug, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub data_path: Option<String>,
    #[serde(default)]
    pub datasets: Vec<DatasetEntry>,
}

#[derive(Debug, Deserialize)]
pub struct DatasetEntry {
    pub id: String,
    pub raw_files: Vec<String>,
    pub fasta: FastaField,
    #[serde(default)]
    pub fasta_type: Option<String>,
    #[serde(default)]
    pub mods: Option<Vec<String>>,
    #[serde(default)]
    pub enzymes: Option<Vec<String>>,
    #[serde(default)]
    pub split: Option<String>,
    #[serde(default)]
    pub proteome_domain: Option<String>,
}

/// Either a single file/proteome name or an accession list.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum FastaField {
    One(String),
    Many(Vec<String>),
}

/// A catalog entry after validation against the registries.
#[derive(Debug, Clone)]
pub struct DatasetConfig {
    pub id: DatasetId,
    pub raw_files: Vec<String>,
    pub source: FastaSource,
    pub modifications: Vec<String>,
    pub enzymes: Vec<String>,
    pub partition: Partition,
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub data_path: Utf8PathBuf,
    pub datasets: Vec<DatasetConfig>,
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// Loads and validates the catalog. Unknown modification or enzyme names
    /// fail fast here, before any dataset work starts.
    pub fn resolve(
        path: Option<&str>,
        modifications: &ModificationRegistry,
        enzymes: &EnzymeRegistry,
    ) -> Result<ResolvedConfig, PrepError> {
        let config_path = match path {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from("xlprep.json"),
        };
        if path.is_none() && !config_path.exists() {
            return Err(PrepError::MissingConfig);
        }

        let content = fs::read_to_string(&config_path)
            .map_err(|_| PrepError::ConfigRead(config_path.clone()))?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|err| PrepError::ConfigParse(err.to_string()))?;

        Self::resolve_config(config, modifications, enzymes)
    }

    pub fn resolve_config(
        config: Config,
        modifications: &ModificationRegistry,
        enzymes: &EnzymeRegistry,
    ) -> Result<ResolvedConfig, PrepError> {
        // DATAPATH overrides the catalog, matching the deployment convention.
        let data_path = std::env::var("DATAPATH")
            .ok()
            .or(config.data_path)
            .unwrap_or_else(|| "./data".to_string());

        let datasets = config
            .datasets
            .into_iter()
            .map(|entry| Self::resolve_dataset(entry, modifications, enzymes))
            .collect::<Result<Vec<_>, PrepError>>()?;

        Ok(ResolvedConfig {
            data_path: Utf8PathBuf::from(data_path),
            datasets,
        })
    }

    fn resolve_dataset(
        entry: DatasetEntry,
        modifications: &ModificationRegistry,
        enzymes: &EnzymeRegistry,
    ) -> Result<DatasetConfig, PrepError> {
        let id: DatasetId = entry.id.parse()?;

        if entry.raw_files.is_empty() {
            return Err(PrepError::Configuration(format!(
                "{id}: raw file list is empty"
            )));
        }

        let kind = entry.fasta_type.as_deref().unwrap_or("fasta");
        let source = match (kind, entry.fasta) {
            ("fasta", FastaField::One(name)) => FastaSource::Repository(name),
            ("proteins", FastaField::Many(accessions)) => FastaSource::Proteins(
                accessions
                    .iter()
                    .map(|value| value.parse())
                    .collect::<Result<Vec<_>, _>>()?,
            ),
            ("proteome", FastaField::One(value)) => FastaSource::Proteome {
                id: value.parse()?,
                domain: entry
                    .proteome_domain
                    .unwrap_or_else(|| DEFAULT_PROTEOME_DOMAIN.to_string()),
            },
            (kind, _) => {
                return Err(PrepError::Configuration(format!(
                    "{id}: fasta_type {kind} does not match the fasta field shape"
                )))
            }
        };

        let mod_names = entry.mods.unwrap_or_else(|| vec!["BS3".to_string()]);
        for name in &mod_names {
            if !modifications.contains(name) {
                return Err(PrepError::Configuration(format!(
                    "{id}: unknown modification: {name}"
                )));
            }
        }

        // Enzyme suppression is disallowed: an empty set is invalid.
        let enzyme_names = entry.enzymes.unwrap_or_else(|| vec!["Trypsin".to_string()]);
        if enzyme_names.is_empty() {
            return Err(PrepError::Configuration(format!(
                "{id}: enzyme set is empty"
            )));
        }
        for name in &enzyme_names {
            if !enzymes.contains(name) {
                return Err(PrepError::Configuration(format!(
                    "{id}: unknown enzyme: {name}"
                )));
            }
        }

        let partition = entry
            .split
            .as_deref()
            .unwrap_or("training")
            .parse::<Partition>()?;

        Ok(DatasetConfig {
            id,
            raw_files: entry.raw_files,
            source,
            modifications: mod_names,
            enzymes: enzyme_names,
            partition,
        })
    }
}

/// One installed search-engine binary with its config template.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub id: String,
    pub version: String,
    pub binary: Utf8PathBuf,
    pub template: Utf8PathBuf,
}

/// Paths to the external binaries, overridable through the environment the
/// same way the deployment scripts set them.
#[derive(Debug, Clone)]
pub struct ToolPaths {
    pub crux: Utf8PathBuf,
    pub engines: Vec<EngineConfig>,
}

impl ToolPaths {
    pub fn from_env() -> Self {
        let crux = std::env::var("CRUX").unwrap_or_else(|_| "crux".to_string());
        let kojak2 = std::env::var("KOJAK2").unwrap_or_else(|_| "kojak_2.0.0-dev".to_string());
        let kojak1 = std::env::var("KOJAK1").unwrap_or_else(|_| "kojak_1.6.1".to_string());
        Self {
            crux: Utf8PathBuf::from(crux),
            engines: vec![
                EngineConfig {
                    id: "kojak".to_string(),
                    version: "2.0.0-dev".to_string(),
                    binary: Utf8PathBuf::from(kojak2),
                    template: Utf8PathBuf::from("templates/kojak_2.0.0-dev.conf"),
                },
                EngineConfig {
                    id: "kojak".to_string(),
                    version: "1.6.1".to_string(),
                    binary: Utf8PathBuf::from(kojak1),
                    template: Utf8PathBuf::from("templates/kojak_1.6.1.conf"),
                },
            ],
        }
    }

    /// Explicit engine lookup by identifier, preferring the first listed
    /// version when none is requested.
    pub fn engine(&self, id: &str, version: Option<&str>) -> Result<&EngineConfig, PrepError> {
        self.engines
            .iter()
            .find(|engine| {
                engine.id == id && version.map(|v| engine.version == v).unwrap_or(true)
            })
            .ok_or_else(|| {
                PrepError::Configuration(match version {
                    Some(version) => format!("no configured engine {id} {version}"),
                    None => format!("no configured engine {id}"),
                })
            })
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    fn entry(json: serde_json::Value) -> DatasetEntry {
        serde_json::from_value(json).unwrap()
    }

    fn resolve(entry: DatasetEntry) -> Result<DatasetConfig, PrepError> {
        ConfigLoader::resolve_dataset(
            entry,
            &ModificationRegistry::builtin(),
            &EnzymeRegistry::builtin(),
        )
    }

    #[test]
    fn resolves_proteins_entry_with_defaults() {
        let config = resolve(entry(serde_json::json!({
            "id": "PXD003282",
            "raw_files": ["Sheppard_Werner_RNAPORF145_07.raw"],
            "fasta": ["P95989", "P95989", "Q980Z8"],
            "fasta_type": "proteins"
        })))
        .unwrap();

        assert_eq!(config.id.as_str(), "PXD003282");
        assert_eq!(config.modifications, vec!["BS3".to_string()]);
        assert_eq!(config.enzymes, vec!["Trypsin".to_string()]);
        assert_eq!(config.partition, Partition::Training);
        assert_matches!(config.source, FastaSource::Proteins(ref accs) if accs.len() == 3);
    }

    #[test]
    fn resolves_repository_and_proteome_entries() {
        let repo = resolve(entry(serde_json::json!({
            "id": "PXD007250",
            "raw_files": ["a.raw"],
            "fasta": "HSA-Active.FASTA"
        })))
        .unwrap();
        assert_matches!(repo.source, FastaSource::Repository(ref name) if name == "HSA-Active.FASTA");

        let proteome = resolve(entry(serde_json::json!({
            "id": "PXD006707",
            "raw_files": ["a.raw"],
            "fasta": "UP000002311_559292",
            "fasta_type": "proteome",
            "mods": ["BS3", "BS3-d4"]
        })))
        .unwrap();
        assert_matches!(proteome.source, FastaSource::Proteome { ref domain, .. }
            if domain == "Eukaryota");
    }

    #[test]
    fn rejects_unknown_names_and_empty_sets() {
        let err = resolve(entry(serde_json::json!({
            "id": "PXD000001",
            "raw_files": ["a.raw"],
            "fasta": ["P95989"],
            "fasta_type": "proteins",
            "mods": ["DSSO"]
        })))
        .unwrap_err();
        assert_matches!(err, PrepError::Configuration(_));

        let err = resolve(entry(serde_json::json!({
            "id": "PXD000001",
            "raw_files": ["a.raw"],
            "fasta": ["P95989"],
            "fasta_type": "proteins",
            "enzymes": []
        })))
        .unwrap_err();
        assert_matches!(err, PrepError::Configuration(message) if message.contains("empty"));

        let err = resolve(entry(serde_json::json!({
            "id": "PXD000001",
            "raw_files": [],
            "fasta": "db.fasta"
        })))
        .unwrap_err();
        assert_matches!(err, PrepError::Configuration(_));
    }

    #[test]
    fn rejects_unknown_partition() {
        let err = resolve(entry(serde_json::json!({
            "id": "PXD000001",
            "raw_files": ["a.raw"],
            "fasta": "db.fasta",
            "split": "holdout"
        })))
        .unwrap_err();
        assert_matches!(err, PrepError::InvalidPartition(_));
    }

    #[test]
    fn rejects_mismatched_fasta_shape() {
        let err = resolve(entry(serde_json::json!({
            "id": "PXD000001",
            "raw_files": ["a.raw"],
            "fasta": "P95989",
            "fasta_type": "proteins"
        })))
        .unwrap_err();
        assert_matches!(err, PrepError::Configuration(_));
    }

    #[test]
    fn engine_lookup() {
        let tools = ToolPaths::from_env();
        let engine = tools.engine("kojak", None).unwrap();
        assert_eq!(engine.version, "2.0.0-dev");

        let engine = tools.engine("kojak", Some("1.6.1")).unwrap();
        assert_eq!(engine.version, "1.6.1");

        let err = tools.engine("comet", None).unwrap_err();
        assert_matches!(err, PrepError::Configuration(_));
    }
}
