use std::fmt;
use std::str::FromStr;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::PrepError;

/// A ProteomeXchange dataset identifier, e.g. `PXD003282`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DatasetId(String);

impl DatasetId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DatasetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for DatasetId {
    type Err = PrepError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_uppercase();
        let digits = normalized.strip_prefix("PXD");
        let is_valid = digits
            .map(|rest| !rest.is_empty() && rest.chars().all(|ch| ch.is_ascii_digit()))
            .unwrap_or(false);
        if !is_valid {
            return Err(PrepError::InvalidDatasetId(value.to_string()));
        }
        Ok(Self(normalized))
    }
}

/// A UniProt protein accession, e.g. `P95989` or `A0A1D5P4P8`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UniprotAccession(String);

impl UniprotAccession {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UniprotAccession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for UniprotAccession {
    type Err = PrepError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_uppercase();
        let is_valid = matches!(normalized.len(), 6 | 10)
            && normalized.chars().all(|ch| ch.is_ascii_alphanumeric())
            && normalized
                .chars()
                .next()
                .map(|ch| ch.is_ascii_alphabetic())
                .unwrap_or(false);
        if !is_valid {
            return Err(PrepError::InvalidAccession(value.to_string()));
        }
        Ok(Self(normalized))
    }
}

/// A UniProt reference proteome identifier, e.g. `UP000002311_559292`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProteomeId(String);

impl ProteomeId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProteomeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ProteomeId {
    type Err = PrepError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_string();
        let is_valid = normalized.starts_with("UP")
            && normalized.len() > 2
            && normalized
                .chars()
                .skip(2)
                .all(|ch| ch.is_ascii_digit() || ch == '_');
        if !is_valid {
            return Err(PrepError::InvalidProteomeId(value.to_string()));
        }
        Ok(Self(normalized))
    }
}

/// Which of the three model-building splits a dataset belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Partition {
    Training,
    Validation,
    Test,
}

impl fmt::Display for Partition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Partition::Training => write!(f, "training"),
            Partition::Validation => write!(f, "validation"),
            Partition::Test => write!(f, "test"),
        }
    }
}

impl FromStr for Partition {
    type Err = PrepError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "training" => Ok(Partition::Training),
            "validation" => Ok(Partition::Validation),
            "test" => Ok(Partition::Test),
            _ => Err(PrepError::InvalidPartition(value.to_string())),
        }
    }
}

/// Where the target protein database for a dataset comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FastaSource {
    /// A literal FASTA file hosted in the dataset's PRIDE project.
    Repository(String),
    /// An ordered list of UniProt accessions; duplicates are preserved.
    Proteins(Vec<UniprotAccession>),
    /// A UniProt reference proteome.
    Proteome {
        id: ProteomeId,
        domain: String,
    },
}

impl FastaSource {
    pub fn kind(&self) -> &'static str {
        match self {
            FastaSource::Repository(_) => "fasta",
            FastaSource::Proteins(_) => "proteins",
            FastaSource::Proteome { .. } => "proteome",
        }
    }
}

pub const DEFAULT_PROTEOME_DOMAIN: &str = "Eukaryota";
