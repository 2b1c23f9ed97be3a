use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::error::PrepError;
use crate::registry::EnzymeRule;

/// Fixed decoy seed. Not configurable: downstream score calibration relies on
/// repeated runs over unmodified inputs reproducing an identical decoy set.
pub const DECOY_SEED: u64 = 1;

/// Header prefix marking shuffled decoy records.
pub const DECOY_PREFIX: &str = "decoy_";

/// Max length for sequence lines in generated FASTA records.
pub const SEQUENCE_LINE_LENGTH: usize = 60;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FastaRecord {
    /// Header line without the leading `>`.
    pub header: String,
    pub sequence: String,
}

/// Parses FASTA text into records. Sequence lines are concatenated; blank
/// lines are skipped.
pub fn parse_fasta(text: &str) -> Result<Vec<FastaRecord>, PrepError> {
    let mut records: Vec<FastaRecord> = Vec::new();
    for line in text.lines() {
        let line = line.trim_end();
        if line.is_empty() {
            continue;
        }
        if let Some(header) = line.strip_prefix('>') {
            records.push(FastaRecord {
                header: header.to_string(),
                sequence: String::new(),
            });
        } else {
            let record = records.last_mut().ok_or_else(|| {
                PrepError::Acquisition {
                    dataset: String::new(),
                    message: "FASTA sequence data before first header".to_string(),
                }
            })?;
            record.sequence.push_str(line.trim());
        }
    }
    Ok(records)
}

/// Renders records with headers and wrapped sequence lines.
pub fn write_fasta(records: &[FastaRecord]) -> String {
    let mut out = String::new();
    for record in records {
        out.push('>');
        out.push_str(&record.header);
        out.push('\n');
        let bytes = record.sequence.as_bytes();
        for chunk in bytes.chunks(SEQUENCE_LINE_LENGTH) {
            out.push_str(std::str::from_utf8(chunk).unwrap_or(""));
            out.push('\n');
        }
    }
    out
}

/// Generates one shuffled decoy per target record.
///
/// Shuffling is constrained to the enzyme cleavage rule: the sequence is split
/// at cut sites, each site residue stays in place, and only the residues
/// between sites are permuted. The decoy set therefore digests into peptides
/// of the same lengths and compositions as the targets.
pub fn make_decoys(targets: &[FastaRecord], rule: &EnzymeRule) -> Vec<FastaRecord> {
    let mut rng = StdRng::seed_from_u64(DECOY_SEED);
    targets
        .iter()
        .map(|record| FastaRecord {
            header: format!("{DECOY_PREFIX}{}", record.header),
            sequence: shuffle_sequence(&record.sequence, rule, &mut rng),
        })
        .collect()
}

fn shuffle_sequence(sequence: &str, rule: &EnzymeRule, rng: &mut StdRng) -> String {
    let residues: Vec<char> = sequence.chars().collect();
    let mut shuffled = Vec::with_capacity(residues.len());
    for segment in split_at_cut_sites(&residues, rule) {
        let mut segment = segment.to_vec();
        let keep_site = segment
            .last()
            .map(|last| rule.cut_after.contains(*last))
            .unwrap_or(false);
        let movable = if keep_site {
            segment.len() - 1
        } else {
            segment.len()
        };
        segment[..movable].shuffle(rng);
        shuffled.extend(segment);
    }
    shuffled.into_iter().collect()
}

/// Splits a residue slice into cleavage segments: a cut happens after a
/// residue in `cut_after` unless the following residue is in `cut_before`.
fn split_at_cut_sites<'a>(residues: &'a [char], rule: &EnzymeRule) -> Vec<&'a [char]> {
    let mut segments = Vec::new();
    let mut start = 0;
    for (index, residue) in residues.iter().enumerate() {
        if index + 1 == residues.len() {
            break;
        }
        let next = residues[index + 1];
        let suppressed = !rule.cut_before.is_empty() && rule.cut_before.contains(next);
        if rule.cut_after.contains(*residue) && !suppressed {
            segments.push(&residues[start..=index]);
            start = index + 1;
        }
    }
    if start < residues.len() {
        segments.push(&residues[start..]);
    }
    segments
}
