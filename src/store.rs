use std::fs;

use camino::{Utf8Path, Utf8PathBuf};

use crate::domain::{DatasetId, Partition};
use crate::error::PrepError;

/// Extension appended to a raw file's stem to name its converted spectra.
pub const CONVERTED_EXTENSION: &str = "mzML.gz";

/// Layout of the on-disk data directory. Every dataset owns one directory
/// under `<root>/<partition>/<pxid>/`; all derived artifacts live inside it.
#[derive(Debug, Clone)]
pub struct Store {
    root: Utf8PathBuf,
}

impl Store {
    pub fn new(root: Utf8PathBuf) -> Self {
        Self { root }
    }

    pub fn dataset_dir(&self, partition: Partition, id: &DatasetId) -> Utf8PathBuf {
        self.root.join(partition.to_string()).join(id.as_str())
    }

    pub fn fasta_path(&self, partition: Partition, id: &DatasetId) -> Utf8PathBuf {
        self.dataset_dir(partition, id)
            .join(format!("{}.fasta", id.as_str()))
    }

    pub fn converted_path(
        &self,
        partition: Partition,
        id: &DatasetId,
        raw_file: &str,
    ) -> Utf8PathBuf {
        self.dataset_dir(partition, id).join(converted_name(raw_file))
    }

    pub fn estimate_dir(&self, partition: Partition, id: &DatasetId) -> Utf8PathBuf {
        self.dataset_dir(partition, id).join("pm-out")
    }

    pub fn estimate_path(&self, partition: Partition, id: &DatasetId) -> Utf8PathBuf {
        self.estimate_dir(partition, id)
            .join(format!("{}.param-medic.txt", id.as_str()))
    }

    pub fn search_dir(
        &self,
        partition: Partition,
        id: &DatasetId,
        engine: &str,
        version: &str,
    ) -> Utf8PathBuf {
        self.dataset_dir(partition, id)
            .join(format!("{engine}-{version}"))
    }

    pub fn ensure_dir(path: &Utf8Path) -> Result<(), PrepError> {
        fs::create_dir_all(path.as_std_path())
            .map_err(|err| PrepError::Filesystem(format!("create {path}: {err}")))
    }

    pub fn exists(path: &Utf8Path) -> bool {
        path.as_std_path().is_file()
    }

    /// Writes `content` through a sibling temp file so a crash never leaves a
    /// half-written artifact at the final path.
    pub fn write_bytes_atomic(path: &Utf8Path, content: &[u8]) -> Result<(), PrepError> {
        if let Some(parent) = path.parent() {
            Self::ensure_dir(parent)?;
        }
        let tmp_path = path.with_extension("tmp");
        fs::write(tmp_path.as_std_path(), content)
            .map_err(|err| PrepError::Filesystem(err.to_string()))?;
        fs::rename(tmp_path.as_std_path(), path.as_std_path())
            .map_err(|err| PrepError::Filesystem(err.to_string()))?;
        Ok(())
    }

}

/// Maps a raw spectrum file name to its converted counterpart by swapping the
/// raw extension for `mzML.gz`. The mapping keeps the stem untouched so the
/// stage-3 existence check can pair files by ordinal position.
pub fn converted_name(raw_file: &str) -> String {
    let stem = match raw_file.rsplit_once('.') {
        Some((stem, _ext)) => stem,
        None => raw_file,
    };
    format!("{stem}.{CONVERTED_EXTENSION}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn converted_names_swap_the_raw_extension() {
        assert_eq!(converted_name("run_01.raw"), "run_01.mzML.gz");
        assert_eq!(converted_name("Rappsilber_CLMS_PolII_1.RAW"), "Rappsilber_CLMS_PolII_1.mzML.gz");
        assert_eq!(converted_name("sample.wiff"), "sample.mzML.gz");
        assert_eq!(converted_name("noext"), "noext.mzML.gz");
    }

    #[test]
    fn layout_paths() {
        let store = Store::new(Utf8PathBuf::from("/data"));
        let id: DatasetId = "PXD003282".parse().unwrap();

        let fasta = store.fasta_path(Partition::Training, &id);
        assert_eq!(fasta, "/data/training/PXD003282/PXD003282.fasta");

        let converted = store.converted_path(Partition::Training, &id, "run_01.raw");
        assert_eq!(converted, "/data/training/PXD003282/run_01.mzML.gz");

        let estimate = store.estimate_path(Partition::Training, &id);
        assert_eq!(estimate, "/data/training/PXD003282/pm-out/PXD003282.param-medic.txt");

        let search = store.search_dir(Partition::Training, &id, "kojak", "2.0.0-dev");
        assert_eq!(search, "/data/training/PXD003282/kojak-2.0.0-dev");
    }

    #[test]
    fn atomic_write_creates_parents() {
        let temp = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
        let path = root.join("a/b/c.txt");

        Store::write_bytes_atomic(&path, b"payload").unwrap();
        assert_eq!(std::fs::read(path.as_std_path()).unwrap(), b"payload");
        assert!(!path.with_extension("tmp").as_std_path().exists());
    }
}
