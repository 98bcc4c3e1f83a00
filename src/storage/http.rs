//! Blob-container store over plain HTTP(S).
//!
//! Speaks the minimal subset of the blob REST protocol the pipeline needs:
//!
//! * `GET  {endpoint}/{container}/{key}?{sas}` — read an object
//! * `PUT  {endpoint}/{container}/{key}?{sas}` with `x-ms-blob-type: BlockBlob`
//!   — create or replace an object; `If-None-Match: *` makes it create-only
//!
//! Authorisation is carried entirely by the SAS query string, which is never
//! written to logs.

use super::{validate_key, ObjectStore};
use crate::error::{ConfigError, StorageError};
use async_trait::async_trait;
use reqwest::header::{CONTENT_TYPE, IF_NONE_MATCH};
use reqwest::{Client, Response, StatusCode, Url};
use std::time::Duration;
use tracing::debug;

const BLOB_TYPE_HEADER: &str = "x-ms-blob-type";
const BLOB_TYPE_BLOCK: &str = "BlockBlob";
/// Longest error-body excerpt kept in an error message.
const MAX_ERROR_DETAIL: usize = 200;

pub struct HttpBlobStore {
    client: Client,
    container_url: Url,
    sas: Option<String>,
}

impl HttpBlobStore {
    pub fn new(
        endpoint: &Url,
        container: &str,
        sas: Option<String>,
        timeout: Duration,
    ) -> Result<Self, ConfigError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ConfigError::HttpClient(e.to_string()))?;
        Self::with_client(client, endpoint, container, sas)
    }

    pub fn with_client(
        client: Client,
        endpoint: &Url,
        container: &str,
        sas: Option<String>,
    ) -> Result<Self, ConfigError> {
        let mut container_url = endpoint.clone();
        container_url.set_query(None);
        container_url.set_fragment(None);
        container_url
            .path_segments_mut()
            .map_err(|_| ConfigError::InvalidConnection {
                input: endpoint.to_string(),
                reason: "endpoint cannot be used as a base URL".to_string(),
            })?
            .pop_if_empty()
            .extend(container.split('/').filter(|s| !s.is_empty()));

        let sas = sas
            .map(|s| s.trim_start_matches('?').to_string())
            .filter(|s| !s.is_empty());

        Ok(Self {
            client,
            container_url,
            sas,
        })
    }

    /// Full URL of `key`, SAS included. Each key segment is percent-encoded.
    pub fn object_url(&self, key: &str) -> Result<Url, StorageError> {
        validate_key(key)?;
        let mut url = self.container_url.clone();
        url.path_segments_mut()
            .map_err(|_| StorageError::InvalidKey {
                key: key.to_string(),
                reason: "container URL cannot take path segments".to_string(),
            })?
            .extend(key.split('/'));
        url.set_query(self.sas.as_deref());
        Ok(url)
    }

    fn transport(&self, key: &str, e: reqwest::Error) -> StorageError {
        let detail = if e.is_timeout() {
            "request timed out".to_string()
        } else {
            // reqwest includes the URL (and so the SAS) in its message.
            e.without_url().to_string()
        };
        StorageError::Transport {
            key: key.to_string(),
            detail,
        }
    }

    async fn status_error(&self, key: &str, response: Response) -> StorageError {
        let status = response.status();
        let mut detail = response.text().await.unwrap_or_default();
        if detail.len() > MAX_ERROR_DETAIL {
            let cut = (0..=MAX_ERROR_DETAIL)
                .rev()
                .find(|&i| detail.is_char_boundary(i))
                .unwrap_or(0);
            detail.truncate(cut);
            detail.push('\u{2026}');
        }
        let detail = if detail.trim().is_empty() {
            status
                .canonical_reason()
                .unwrap_or("no response body")
                .to_string()
        } else {
            detail
        };

        match status {
            StatusCode::NOT_FOUND => StorageError::NotFound {
                key: key.to_string(),
                location: self.describe(),
            },
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => StorageError::PermissionDenied {
                key: key.to_string(),
                location: self.describe(),
                detail,
            },
            StatusCode::CONFLICT | StatusCode::PRECONDITION_FAILED => StorageError::AlreadyExists {
                key: key.to_string(),
                location: self.describe(),
            },
            _ => StorageError::Http {
                key: key.to_string(),
                status: status.as_u16(),
                detail,
            },
        }
    }
}

fn content_type_for(key: &str) -> &'static str {
    if key.ends_with(crate::pipeline::naming::MARKDOWN_EXTENSION) {
        "text/markdown; charset=utf-8"
    } else {
        "application/octet-stream"
    }
}

#[async_trait]
impl ObjectStore for HttpBlobStore {
    async fn read_all(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        let url = self.object_url(key)?;
        debug!("GET {}/{}", self.describe(), key);

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| self.transport(key, e))?;

        if !response.status().is_success() {
            return Err(self.status_error(key, response).await);
        }

        let expected = response.content_length();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| self.transport(key, e))?;

        if let Some(expected) = expected {
            if bytes.len() as u64 != expected {
                return Err(StorageError::Transport {
                    key: key.to_string(),
                    detail: format!(
                        "truncated body: received {} of {} bytes",
                        bytes.len(),
                        expected
                    ),
                });
            }
        }

        Ok(bytes.to_vec())
    }

    async fn write(&self, key: &str, bytes: Vec<u8>, overwrite: bool) -> Result<(), StorageError> {
        let url = self.object_url(key)?;
        debug!("PUT {}/{} ({} bytes)", self.describe(), key, bytes.len());

        let mut request = self
            .client
            .put(url)
            .header(BLOB_TYPE_HEADER, BLOB_TYPE_BLOCK)
            .header(CONTENT_TYPE, content_type_for(key))
            .body(bytes);
        if !overwrite {
            request = request.header(IF_NONE_MATCH, "*");
        }

        let response = request.send().await.map_err(|e| self.transport(key, e))?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(self.status_error(key, response).await)
        }
    }

    fn describe(&self) -> String {
        self.container_url.to_string()
    }
}
