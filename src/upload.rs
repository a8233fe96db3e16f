//! Upload transport — signed targets and byte transfer.
//!
//! The orchestrator in [`pipeline`](crate::pipeline) talks to remote
//! storage through the [`UploadTransport`] trait so tests can drive the
//! whole upload path with a recording stub. The production implementation
//! is [`HttpTransport`]:
//!
//! 1. `POST` the issuer endpoint with `{ "filename", "contentType" }`
//!    (plus an optional bearer credential) → `{ "uploadTarget",
//!    "objectKey" }`.
//! 2. `PUT` the payload directly to `uploadTarget`, streaming it in chunks
//!    and reporting transfer progress per chunk.
//!
//! The permanent public address is the configured base joined with the
//! returned object key; both sides of the protocol are opaque strings
//! defined by the external storage service.

use crate::config::RemoteConfig;
use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum UploadError {
    #[error("target request failed: {0}")]
    Target(String),
    #[error("byte transfer failed: {0}")]
    Transfer(String),
    #[error("remote returned status {0}")]
    Status(u16),
}

/// Request body for the signed-target issuer.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetRequest {
    pub filename: String,
    pub content_type: String,
}

/// A short-lived, single-use address authorizing one direct byte transfer.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignedTarget {
    pub upload_target: String,
    pub object_key: String,
}

/// Transfer progress callback: `(bytes_sent, bytes_total)`.
///
/// Shared (`Arc`) because the streamed request body owns a clone for the
/// lifetime of the transfer.
pub type ProgressFn = Arc<dyn Fn(u64, u64) + Send + Sync>;

/// Seam between the orchestrator and remote storage.
#[async_trait]
pub trait UploadTransport: Send + Sync {
    /// Ask the issuer for a signed upload target for one file.
    async fn issue_target(
        &self,
        filename: &str,
        content_type: &str,
    ) -> Result<SignedTarget, UploadError>;

    /// Transfer the payload to a signed target, reporting progress.
    async fn send(
        &self,
        target: &str,
        content_type: &str,
        bytes: Bytes,
        progress: ProgressFn,
    ) -> Result<(), UploadError>;
}

/// Join the configured public base with an object key into the permanent
/// address, tolerating stray slashes on either side.
pub fn permanent_address(public_base: &str, object_key: &str) -> String {
    format!(
        "{}/{}",
        public_base.trim_end_matches('/'),
        object_key.trim_start_matches('/')
    )
}

/// Chunk size for streamed transfers; each chunk produces one progress
/// event.
const TRANSFER_CHUNK_BYTES: usize = 64 * 1024;

/// Production transport over HTTP.
pub struct HttpTransport {
    http: reqwest::Client,
    issuer_url: String,
    bearer_token: Option<String>,
}

impl HttpTransport {
    pub fn new(remote: &RemoteConfig) -> Result<Self, UploadError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(|e| UploadError::Target(e.to_string()))?;

        Ok(Self {
            http,
            issuer_url: remote.issuer_url.clone(),
            bearer_token: remote.bearer_token.clone(),
        })
    }
}

#[async_trait]
impl UploadTransport for HttpTransport {
    async fn issue_target(
        &self,
        filename: &str,
        content_type: &str,
    ) -> Result<SignedTarget, UploadError> {
        debug!(filename, "requesting signed upload target");

        let mut request = self.http.post(&self.issuer_url).json(&TargetRequest {
            filename: filename.to_string(),
            content_type: content_type.to_string(),
        });
        if let Some(token) = &self.bearer_token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| UploadError::Target(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(UploadError::Status(status.as_u16()));
        }

        response
            .json::<SignedTarget>()
            .await
            .map_err(|e| UploadError::Target(e.to_string()))
    }

    async fn send(
        &self,
        target: &str,
        content_type: &str,
        bytes: Bytes,
        progress: ProgressFn,
    ) -> Result<(), UploadError> {
        let total = bytes.len() as u64;
        progress(0, total);

        // Chunked body: progress fires as hyper pulls each chunk onto the
        // wire, so the percentage tracks actual transfer, not call time.
        let chunks: Vec<(u64, Bytes)> = split_with_offsets(bytes);
        let on_chunk = Arc::clone(&progress);
        let body_stream = futures::stream::iter(chunks.into_iter().map(move |(sent, chunk)| {
            on_chunk(sent, total);
            Ok::<Bytes, std::io::Error>(chunk)
        }));

        let response = self
            .http
            .put(target)
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .header(reqwest::header::CONTENT_LENGTH, total)
            .body(reqwest::Body::wrap_stream(body_stream))
            .send()
            .await
            .map_err(|e| UploadError::Transfer(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(UploadError::Status(status.as_u16()));
        }

        progress(total, total);
        Ok(())
    }
}

/// Split a payload into transfer chunks, each tagged with the cumulative
/// byte count once it has been sent.
fn split_with_offsets(mut bytes: Bytes) -> Vec<(u64, Bytes)> {
    let mut chunks = Vec::new();
    let mut sent = 0u64;
    while !bytes.is_empty() {
        let take = bytes.len().min(TRANSFER_CHUNK_BYTES);
        let chunk = bytes.split_to(take);
        sent += take as u64;
        chunks.push((sent, chunk));
    }
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_types_use_camel_case() {
        let request = TargetRequest {
            filename: "a.jpg".into(),
            content_type: "image/jpeg".into(),
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["filename"], "a.jpg");
        assert_eq!(json["contentType"], "image/jpeg");

        let target: SignedTarget = serde_json::from_str(
            r#"{"uploadTarget": "https://store.test/put/abc", "objectKey": "listings/abc.jpg"}"#,
        )
        .unwrap();
        assert_eq!(target.upload_target, "https://store.test/put/abc");
        assert_eq!(target.object_key, "listings/abc.jpg");
    }

    #[test]
    fn permanent_address_joins_cleanly() {
        assert_eq!(
            permanent_address("https://cdn.test", "listings/abc.jpg"),
            "https://cdn.test/listings/abc.jpg"
        );
        assert_eq!(
            permanent_address("https://cdn.test/", "/listings/abc.jpg"),
            "https://cdn.test/listings/abc.jpg"
        );
    }

    #[test]
    fn chunks_cover_payload_with_monotonic_offsets() {
        let payload = Bytes::from(vec![7u8; TRANSFER_CHUNK_BYTES * 2 + 100]);
        let chunks = split_with_offsets(payload.clone());

        assert_eq!(chunks.len(), 3);
        let mut last = 0;
        let mut reassembled = Vec::new();
        for (sent, chunk) in &chunks {
            assert!(*sent > last);
            last = *sent;
            reassembled.extend_from_slice(chunk);
        }
        assert_eq!(last, payload.len() as u64);
        assert_eq!(reassembled, payload);
    }

    #[test]
    fn empty_payload_has_no_chunks() {
        assert!(split_with_offsets(Bytes::new()).is_empty());
    }
}
