use std::fs;
use std::io::Read;

use camino::{Utf8Path, Utf8PathBuf};
use flate2::read::GzDecoder;
use tracing::info;

use crate::domain::{DatasetId, FastaSource};
use crate::error::PrepError;
use crate::fasta;
use crate::pride::PrideClient;
use crate::registry::EnzymeRule;
use crate::store::Store;
use crate::uniprot::UniprotClient;

/// Builds the target-decoy database for a dataset.
///
/// The assembler is a pure build operation: it does not check whether the
/// destination already exists. The caller gates it behind the existence check
/// so the caching policy stays in one place.
pub struct DatabaseAssembler<'a> {
    uniprot: &'a dyn UniprotClient,
    pride: &'a dyn PrideClient,
}

impl<'a> DatabaseAssembler<'a> {
    pub fn new(uniprot: &'a dyn UniprotClient, pride: &'a dyn PrideClient) -> Self {
        Self { uniprot, pride }
    }

    /// Acquires the target FASTA for `source`, expands it with one shuffled
    /// decoy per target constrained to `rule`, and writes the concatenated
    /// database to `destination` atomically. On failure nothing is left at
    /// the destination.
    pub fn assemble(
        &self,
        id: &DatasetId,
        source: &FastaSource,
        rule: &EnzymeRule,
        destination: &Utf8Path,
    ) -> Result<(), PrepError> {
        let parent = destination
            .parent()
            .ok_or_else(|| PrepError::Filesystem("invalid database path".to_string()))?;
        Store::ensure_dir(parent)?;
        let scratch = tempfile::Builder::new()
            .prefix("xlprep-db")
            .tempdir_in(parent.as_std_path())
            .map_err(|err| PrepError::Filesystem(err.to_string()))?;
        let scratch_root = Utf8PathBuf::from_path_buf(scratch.path().to_path_buf())
            .map_err(|_| PrepError::Filesystem("non-utf8 scratch path".to_string()))?;

        info!(dataset = id.as_str(), kind = source.kind(), "assembling database");
        let mut target_text = self
            .acquire_targets(id, source, &scratch_root)
            .map_err(|err| acquisition(id, err))?;
        if !target_text.ends_with('\n') {
            target_text.push('\n');
        }

        let targets = fasta::parse_fasta(&target_text).map_err(|err| acquisition(id, err))?;
        if targets.is_empty() {
            return Err(PrepError::Acquisition {
                dataset: id.as_str().to_string(),
                message: "target FASTA contains no records".to_string(),
            });
        }

        let decoys = fasta::make_decoys(&targets, rule);
        let mut database = target_text.into_bytes();
        database.extend_from_slice(fasta::write_fasta(&decoys).as_bytes());

        Store::write_bytes_atomic(destination, &database)?;
        info!(
            dataset = id.as_str(),
            targets = targets.len(),
            path = destination.as_str(),
            "database assembled"
        );
        Ok(())
    }

    fn acquire_targets(
        &self,
        id: &DatasetId,
        source: &FastaSource,
        scratch: &Utf8Path,
    ) -> Result<String, PrepError> {
        match source {
            FastaSource::Repository(file_name) => {
                let listing = self.pride.list_files(id)?;
                let entry = listing
                    .iter()
                    .find(|file| file.name == *file_name)
                    .ok_or_else(|| PrepError::Acquisition {
                        dataset: id.as_str().to_string(),
                        message: format!("{file_name} not in repository listing"),
                    })?;
                let download_path = scratch.join(file_name);
                self.pride.download_file(id, entry, &download_path)?;
                fs::read_to_string(download_path.as_std_path())
                    .map_err(|err| PrepError::Filesystem(err.to_string()))
            }
            FastaSource::Proteins(accessions) => {
                // Caller order and duplicates are preserved on purpose.
                let mut combined = String::new();
                for accession in accessions {
                    let record = self.uniprot.fetch_protein_fasta(accession)?;
                    combined.push_str(&record);
                    if !record.ends_with('\n') {
                        combined.push('\n');
                    }
                }
                Ok(combined)
            }
            FastaSource::Proteome { id: proteome, domain } => {
                let compressed = self.uniprot.fetch_proteome_gz(proteome, domain)?;
                let mut decoder = GzDecoder::new(compressed.as_slice());
                let mut text = String::new();
                decoder
                    .read_to_string(&mut text)
                    .map_err(|err| PrepError::Acquisition {
                        dataset: id.as_str().to_string(),
                        message: format!("proteome decompression failed: {err}"),
                    })?;
                Ok(text)
            }
        }
    }
}

/// Source failures surface as acquisition errors carrying the dataset id;
/// plain filesystem errors pass through unchanged.
fn acquisition(id: &DatasetId, err: PrepError) -> PrepError {
    match err {
        PrepError::Filesystem(_) | PrepError::Acquisition { .. } => err,
        other => PrepError::Acquisition {
            dataset: id.as_str().to_string(),
            message: other.to_string(),
        },
    }
}
