//! Image fingerprinting
//!
//! A fingerprint is the SHA-256 of the fetched payload, never of the URL.
//! One fetch attempt per call, no retry, no caching by URL.

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;

use crate::error::{OracleError, OracleResult};
use crate::types::Fingerprint;

/// Source of raw image bytes
#[async_trait]
pub trait ImageFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> OracleResult<Vec<u8>>;
}

/// Fetches images over HTTP(S)
#[derive(Debug, Clone)]
pub struct HttpImageFetcher {
    client: reqwest::Client,
}

impl HttpImageFetcher {
    pub fn new(timeout: Duration) -> OracleResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| OracleError::Config(format!("http client: {}", e)))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl ImageFetcher for HttpImageFetcher {
    async fn fetch(&self, url: &str) -> OracleResult<Vec<u8>> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| OracleError::fetch(url, e))?;

        if !response.status().is_success() {
            return Err(OracleError::fetch(url, format!("status {}", response.status())));
        }

        let bytes = response.bytes().await.map_err(|e| OracleError::fetch(url, e))?;
        Ok(bytes.to_vec())
    }
}

/// Hash raw bytes with SHA-256
pub fn fingerprint_bytes(content: &[u8]) -> Fingerprint {
    let mut hasher = Sha256::new();
    hasher.update(content);
    Fingerprint::from_hex(hex::encode(hasher.finalize()))
}

/// Turns image URLs into content fingerprints
#[derive(Clone)]
pub struct Fingerprinter {
    fetcher: Arc<dyn ImageFetcher>,
}

impl Fingerprinter {
    pub fn new(fetcher: Arc<dyn ImageFetcher>) -> Self {
        Self { fetcher }
    }

    pub fn http(timeout: Duration) -> OracleResult<Self> {
        Ok(Self::new(Arc::new(HttpImageFetcher::new(timeout)?)))
    }

    pub async fn fingerprint(&self, url: &str) -> OracleResult<Fingerprint> {
        let bytes = self.fetcher.fetch(url).await?;
        if bytes.is_empty() {
            return Err(OracleError::fetch(url, "empty payload"));
        }
        Ok(fingerprint_bytes(&bytes))
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// In-memory fetcher keyed by URL
    #[derive(Default)]
    pub struct StaticFetcher {
        images: HashMap<String, Vec<u8>>,
        pub calls: AtomicUsize,
    }

    impl StaticFetcher {
        pub fn with(mut self, url: &str, bytes: &[u8]) -> Self {
            self.images.insert(url.to_string(), bytes.to_vec());
            self
        }

        pub fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ImageFetcher for StaticFetcher {
        async fn fetch(&self, url: &str) -> OracleResult<Vec<u8>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.images
                .get(url)
                .cloned()
                .ok_or_else(|| OracleError::fetch(url, "status 404 Not Found"))
        }
    }
}
