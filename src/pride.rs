use std::io::Write;
use std::time::Duration;

use camino::Utf8Path;
use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use serde::Deserialize;

use crate::domain::DatasetId;
use crate::error::PrepError;

/// One file hosted in a PRIDE project.
#[derive(Debug, Clone, Deserialize)]
pub struct PrideFile {
    #[serde(rename = "fileName")]
    pub name: String,
    #[serde(rename = "downloadLink", default)]
    pub download_link: Option<String>,
}

pub trait PrideClient: Send + Sync {
    /// Lists the files in a project's repository listing.
    fn list_files(&self, id: &DatasetId) -> Result<Vec<PrideFile>, PrepError>;

    /// Downloads one named file from the project into `destination`.
    fn download_file(
        &self,
        id: &DatasetId,
        file: &PrideFile,
        destination: &Utf8Path,
    ) -> Result<(), PrepError>;
}

#[derive(Clone)]
pub struct PrideHttpClient {
    client: Client,
}

impl PrideHttpClient {
    pub fn new(timeout: Duration) -> Result<Self, PrepError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("xlprep/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| PrepError::PrideHttp(err.to_string()))?,
        );
        let client = Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|err| PrepError::PrideHttp(err.to_string()))?;
        Ok(Self { client })
    }

    fn listing_url(id: &DatasetId) -> String {
        format!(
            "https://www.ebi.ac.uk/pride/ws/archive/v2/files/byProject?accession={}",
            id.as_str()
        )
    }

    fn handle_status(
        response: reqwest::blocking::Response,
    ) -> Result<reqwest::blocking::Response, PrepError> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status().as_u16();
        let message = response
            .text()
            .unwrap_or_else(|_| "PRIDE request failed".to_string());
        Err(PrepError::PrideStatus { status, message })
    }
}

impl PrideClient for PrideHttpClient {
    fn list_files(&self, id: &DatasetId) -> Result<Vec<PrideFile>, PrepError> {
        let url = Self::listing_url(id);
        let response = self
            .client
            .get(&url)
            .send()
            .map_err(|err| PrepError::PrideHttp(err.to_string()))?;
        let response = Self::handle_status(response)?;
        response
            .json::<Vec<PrideFile>>()
            .map_err(|err| PrepError::PrideHttp(err.to_string()))
    }

    fn download_file(
        &self,
        id: &DatasetId,
        file: &PrideFile,
        destination: &Utf8Path,
    ) -> Result<(), PrepError> {
        let url = file.download_link.clone().ok_or_else(|| {
            PrepError::PrideHttp(format!(
                "no download link for {} in {}",
                file.name,
                id.as_str()
            ))
        })?;
        let response = self
            .client
            .get(&url)
            .send()
            .map_err(|err| PrepError::PrideHttp(err.to_string()))?;
        let mut response = Self::handle_status(response)?;

        let mut out = std::fs::File::create(destination.as_std_path())
            .map_err(|err| PrepError::Filesystem(err.to_string()))?;
        response
            .copy_to(&mut out)
            .map_err(|err| PrepError::PrideHttp(err.to_string()))?;
        out.flush()
            .map_err(|err| PrepError::Filesystem(err.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn listing_url_carries_the_accession() {
        let id: DatasetId = "PXD010481".parse().unwrap();
        assert_eq!(
            PrideHttpClient::listing_url(&id),
            "https://www.ebi.ac.uk/pride/ws/archive/v2/files/byProject?accession=PXD010481"
        );
    }
}
