use std::fs;
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use tracing::info;

use crate::domain::DatasetId;
use crate::error::PrepError;
use crate::registry::{EnzymeRegistry, ModificationRegistry};
use crate::search::{RawSearchOutput, SearchEngine, SearchJobConfig, SearchResult};
use crate::store::{Store, CONVERTED_EXTENSION};
use crate::tools;

/// Literal prefix of the first line of a Kojak primary result file.
pub const VERSION_PREFIX: &str = "Kojak version ";

/// Versions the normalizer knows how to interpret.
pub const SUPPORTED_VERSIONS: [&str; 2] = ["2.0.0-dev", "1.6.1"];

const PRIMARY_SUFFIX: &str = ".kojak.txt";
const INTRA_SUFFIX: &str = ".perc.intra.txt";
const INTER_SUFFIX: &str = ".perc.inter.txt";

/// Adapter for one installed Kojak version.
pub struct KojakEngine {
    version: String,
    binary: Utf8PathBuf,
    template: Utf8PathBuf,
    timeout: Option<Duration>,
}

impl KojakEngine {
    pub fn new(
        version: String,
        binary: Utf8PathBuf,
        template: Utf8PathBuf,
        timeout: Option<Duration>,
    ) -> Self {
        Self {
            version,
            binary,
            template,
            timeout,
        }
    }

    fn expected_outputs(
        converted: &[Utf8PathBuf],
        output_dir: &Utf8Path,
    ) -> Vec<RawSearchOutput> {
        converted
            .iter()
            .map(|path| {
                let base = spectra_base_name(path);
                RawSearchOutput {
                    primary: output_dir.join(format!("{base}{PRIMARY_SUFFIX}")),
                    intra: output_dir.join(format!("{base}{INTRA_SUFFIX}")),
                    inter: output_dir.join(format!("{base}{INTER_SUFFIX}")),
                }
            })
            .collect()
    }
}

impl SearchEngine for KojakEngine {
    fn id(&self) -> &str {
        "kojak"
    }

    fn version(&self) -> &str {
        &self.version
    }

    fn template(&self) -> &Utf8Path {
        &self.template
    }

    fn configure(
        &self,
        job: &SearchJobConfig,
        modifications: &ModificationRegistry,
        enzymes: &EnzymeRegistry,
    ) -> Result<String, PrepError> {
        let template = fs::read_to_string(job.template.as_std_path()).map_err(|err| {
            PrepError::Configuration(format!("cannot read template {}: {err}", job.template))
        })?;

        let mut conf = template;
        for (placeholder, value) in [
            ("$database$", job.database.to_string()),
            ("$fragbin$", job.fragment_bin_width_mz.to_string()),
            ("$pretol$", job.precursor_tolerance_ppm.to_string()),
        ] {
            if !conf.contains(placeholder) {
                return Err(PrepError::Configuration(format!(
                    "template {} is missing placeholder {placeholder}",
                    job.template
                )));
            }
            conf = conf.replacen(placeholder, &value, 1);
        }

        // Modification blocks first, then enzyme lines, both in caller order.
        let mod_conf = job
            .modifications
            .iter()
            .map(|name| modifications.fragment(name, "kojak").map(str::to_string))
            .collect::<Result<Vec<_>, _>>()?
            .join("\n");
        let enz_conf = job
            .enzymes
            .iter()
            .map(|name| {
                enzymes
                    .rule(name)
                    .map(|rule| format!("enzyme = {} {name}\n", rule.cut_site_pair()))
            })
            .collect::<Result<Vec<_>, _>>()?
            .join("\n");

        Ok(format!("{conf}\n{mod_conf}\n{enz_conf}"))
    }

    fn run(
        &self,
        dataset: &DatasetId,
        converted: &[Utf8PathBuf],
        rendered_config: &str,
        output_dir: &Utf8Path,
    ) -> Result<Vec<RawSearchOutput>, PrepError> {
        Store::ensure_dir(output_dir)?;
        let conf_path = output_dir.join("kojak.conf");
        Store::write_bytes_atomic(&conf_path, rendered_config.as_bytes())?;

        let mut args = vec![conf_path.to_string()];
        args.extend(converted.iter().map(|path| path.to_string()));

        info!(
            dataset = dataset.as_str(),
            version = self.version.as_str(),
            files = converted.len(),
            "running kojak"
        );
        tools::run_command(
            self.binary.as_std_path(),
            &args,
            Some(output_dir.as_std_path()),
            self.timeout,
            |message| PrepError::SearchExecution {
                dataset: dataset.as_str().to_string(),
                message,
                raw_outputs: Vec::new(),
            },
        )?;

        let outputs = Self::expected_outputs(converted, output_dir);
        let mut missing = Vec::new();
        let mut present = Vec::new();
        for output in &outputs {
            for path in output.paths() {
                if Store::exists(path) {
                    present.push(path.to_string());
                } else {
                    missing.push(path.to_string());
                }
            }
        }
        // Partial per-file output is fatal; normalization needs all three.
        if !missing.is_empty() {
            return Err(PrepError::SearchExecution {
                dataset: dataset.as_str().to_string(),
                message: format!("incomplete output triple, missing: {}", missing.join(", ")),
                raw_outputs: present,
            });
        }
        Ok(outputs)
    }

    fn normalize(
        &self,
        dataset: &DatasetId,
        raw: &[RawSearchOutput],
        output_dir: &Utf8Path,
    ) -> Result<SearchResult, PrepError> {
        let first = raw.first().ok_or_else(|| PrepError::SearchExecution {
            dataset: dataset.as_str().to_string(),
            message: "no raw search output to normalize".to_string(),
            raw_outputs: Vec::new(),
        })?;

        let version = read_reported_version(dataset, &first.primary, raw)?;
        if !SUPPORTED_VERSIONS.contains(&version.as_str()) {
            return Err(PrepError::UnsupportedVersion(version));
        }
        // The normalized file names carry this version, and the re-run skip
        // check reconstructs them from the configured one; they must agree.
        if version != self.version {
            return Err(PrepError::SearchExecution {
                dataset: dataset.as_str().to_string(),
                message: format!(
                    "binary reported version {version} but the installation is configured as {}",
                    self.version
                ),
                raw_outputs: retained_paths(raw),
            });
        }

        let result_text = render_result_file(dataset, raw, &version)?;
        let scoring_text = render_scoring_file(dataset, raw, &version)?;

        let base = format!("{}.kojak-{version}", dataset.as_str());
        let result_file = output_dir.join(format!("{base}.xenith.txt"));
        let scoring_file = output_dir.join(format!("{base}.pin"));
        Store::write_bytes_atomic(&result_file, result_text.as_bytes())?;
        Store::write_bytes_atomic(&scoring_file, scoring_text.as_bytes())?;

        info!(
            dataset = dataset.as_str(),
            version = version.as_str(),
            "normalized search output"
        );
        Ok(SearchResult {
            result_file,
            scoring_file,
            engine_version: version,
        })
    }
}

/// Strips the fixed converted extension so outputs pair with inputs by base
/// name.
fn spectra_base_name(path: &Utf8Path) -> String {
    let name = path.file_name().unwrap_or_default();
    name.strip_suffix(&format!(".{CONVERTED_EXTENSION}"))
        .unwrap_or(name)
        .to_string()
}

fn read_reported_version(
    dataset: &DatasetId,
    primary: &Utf8Path,
    raw: &[RawSearchOutput],
) -> Result<String, PrepError> {
    let content = fs::read_to_string(primary.as_std_path()).map_err(|err| {
        PrepError::SearchExecution {
            dataset: dataset.as_str().to_string(),
            message: format!("cannot read {primary}: {err}"),
            raw_outputs: retained_paths(raw),
        }
    })?;
    let first_line = content.lines().next().unwrap_or_default();
    match first_line.strip_prefix(VERSION_PREFIX) {
        Some(token) if !token.trim().is_empty() => Ok(token.trim().to_string()),
        _ => Err(PrepError::SearchExecution {
            dataset: dataset.as_str().to_string(),
            message: format!("primary result file does not start with `{VERSION_PREFIX}`"),
            raw_outputs: retained_paths(raw),
        }),
    }
}

fn retained_paths(raw: &[RawSearchOutput]) -> Vec<String> {
    raw.iter()
        .flat_map(|output| output.paths().map(|path| path.to_string()))
        .collect()
}

/// Reads a percolator-format subset file and splits it into header and data
/// rows. The 2.0 dev builds prepend comment lines that must be stripped; the
/// 1.6.1 output starts directly at the header.
fn read_subset(
    dataset: &DatasetId,
    path: &Utf8Path,
    version: &str,
) -> Result<(String, Vec<String>), PrepError> {
    let content = fs::read_to_string(path.as_std_path()).map_err(|err| {
        PrepError::SearchExecution {
            dataset: dataset.as_str().to_string(),
            message: format!("cannot read {path}: {err}"),
            raw_outputs: vec![path.to_string()],
        }
    })?;
    let mut lines = content
        .lines()
        .filter(|line| !(version == "2.0.0-dev" && line.starts_with('#')));
    let header = lines.next().unwrap_or_default().to_string();
    let rows = lines
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect();
    Ok((header, rows))
}

/// The canonical analysis-input derivation: one header carrying a subset
/// label column, then every intra row followed by every inter row, in input
/// order.
fn render_result_file(
    dataset: &DatasetId,
    raw: &[RawSearchOutput],
    version: &str,
) -> Result<String, PrepError> {
    let mut out = String::new();
    let mut wrote_header = false;
    for output in raw {
        for (label, path) in [("intra", &output.intra), ("inter", &output.inter)] {
            let (header, rows) = read_subset(dataset, path, version)?;
            if !wrote_header {
                out.push_str("subset\t");
                out.push_str(&header);
                out.push('\n');
                wrote_header = true;
            }
            for row in rows {
                out.push_str(label);
                out.push('\t');
                out.push_str(&row);
                out.push('\n');
            }
        }
    }
    Ok(out)
}

/// The scoring-tool (percolator) derivation: the subset header unchanged,
/// then all rows merged in input order.
fn render_scoring_file(
    dataset: &DatasetId,
    raw: &[RawSearchOutput],
    version: &str,
) -> Result<String, PrepError> {
    let mut out = String::new();
    let mut wrote_header = false;
    for output in raw {
        for path in [&output.intra, &output.inter] {
            let (header, rows) = read_subset(dataset, path, version)?;
            if !wrote_header {
                out.push_str(&header);
                out.push('\n');
                wrote_header = true;
            }
            for row in rows {
                out.push_str(&row);
                out.push('\n');
            }
        }
    }
    Ok(out)
}
