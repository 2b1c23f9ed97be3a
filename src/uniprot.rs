use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};

use crate::domain::{ProteomeId, UniprotAccession};
use crate::error::PrepError;

pub trait UniprotClient: Send + Sync {
    /// Fetches the FASTA record for a single accession.
    fn fetch_protein_fasta(&self, accession: &UniprotAccession) -> Result<String, PrepError>;

    /// Fetches a gzipped reference-proteome FASTA.
    fn fetch_proteome_gz(&self, id: &ProteomeId, domain: &str) -> Result<Vec<u8>, PrepError>;
}

#[derive(Clone)]
pub struct UniprotHttpClient {
    client: Client,
}

impl UniprotHttpClient {
    pub fn new(timeout: Duration) -> Result<Self, PrepError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("xlprep/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| PrepError::UniprotHttp(err.to_string()))?,
        );
        let client = Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|err| PrepError::UniprotHttp(err.to_string()))?;
        Ok(Self { client })
    }

    fn send_with_retries<F>(&self, mut make_req: F) -> Result<reqwest::blocking::Response, PrepError>
    where
        F: FnMut() -> reqwest::blocking::RequestBuilder,
    {
        const MAX_RETRIES: usize = 3;
        const BASE_DELAY_MS: u64 = 200;
        let mut attempt = 0usize;
        loop {
            match make_req().send() {
                Ok(resp) => {
                    let status = resp.status().as_u16();
                    if attempt < MAX_RETRIES && is_retryable_status(status) {
                        std::thread::sleep(Duration::from_millis(
                            BASE_DELAY_MS * (attempt as u64 + 1),
                        ));
                        attempt += 1;
                        continue;
                    }
                    return Ok(resp);
                }
                Err(err) => {
                    if attempt < MAX_RETRIES && is_retryable_error(&err) {
                        std::thread::sleep(Duration::from_millis(
                            BASE_DELAY_MS * (attempt as u64 + 1),
                        ));
                        attempt += 1;
                        continue;
                    }
                    return Err(PrepError::UniprotHttp(err.to_string()));
                }
            }
        }
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
            .unwrap_or_else(|_| "UniProt request failed".to_string());
        Err(PrepError::UniprotStatus { status, message })
    }

    fn fasta_url(accession: &UniprotAccession) -> String {
        format!("https://rest.uniprot.org/uniprotkb/{}.fasta", accession.as_str())
    }

    fn proteome_url(id: &ProteomeId, domain: &str) -> String {
        format!(
            "https://ftp.uniprot.org/pub/databases/uniprot/current_release/\
             knowledgebase/reference_proteomes/{domain}/{}.fasta.gz",
            id.as_str()
        )
    }
}

impl UniprotClient for UniprotHttpClient {
    fn fetch_protein_fasta(&self, accession: &UniprotAccession) -> Result<String, PrepError> {
        let url = Self::fasta_url(accession);
        let response = self.send_with_retries(|| self.client.get(&url))?;
        let response = Self::handle_status(response)?;
        let fasta = response
            .text()
            .map_err(|err| PrepError::UniprotHttp(err.to_string()))?;
        if fasta.trim().is_empty() {
            return Err(PrepError::UniprotHttp(format!(
                "empty FASTA response for {}",
                accession.as_str()
            )));
        }
        Ok(fasta)
    }

    fn fetch_proteome_gz(&self, id: &ProteomeId, domain: &str) -> Result<Vec<u8>, PrepError> {
        let url = Self::proteome_url(id, domain);
        let response = self.send_with_retries(|| self.client.get(&url))?;
        let response = Self::handle_status(response)?;
        let bytes = response
            .bytes()
            .map_err(|err| PrepError::UniprotHttp(err.to_string()))?;
        Ok(bytes.to_vec())
    }
}

fn is_retryable_status(status: u16) -> bool {
    matches!(status, 429 | 500 | 502 | 503 | 504)
}

fn is_retryable_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect() || err.is_request()
}
