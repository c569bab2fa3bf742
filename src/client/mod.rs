//! Client for the relay's HTTP contract.
//!
//! Used by `relay-cli` and by peers that fall back to the relay when a direct
//! transfer is not possible.

use bytes::Bytes;
use reqwest::multipart;
use serde_json::json;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use url::Url;

use crate::api::handlers::files::UploadResponse;
use crate::api::handlers::health::HealthResponse;
use crate::api::handlers::system::{CleanupResponse, StatsResponse};
use crate::utils::validation::validate_stored_name;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("Invalid file name: {0}")]
    InvalidName(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Relay returned {status}: {message}")]
    Status { status: u16, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type ClientResult<T> = std::result::Result<T, ClientError>;

pub struct RelayClient {
    http: reqwest::Client,
    base_url: Url,
}

impl RelayClient {
    pub fn new(base_url: &str) -> ClientResult<Self> {
        Self::with_timeout(base_url, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(base_url: &str, timeout: Duration) -> ClientResult<Self> {
        let mut base_url = Url::parse(base_url)?;
        // Url::join replaces the last segment unless the path ends in '/'
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { http, base_url })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> ClientResult<Url> {
        Ok(self.base_url.join(path)?)
    }

    pub async fn upload(&self, filename: &str, content: Vec<u8>) -> ClientResult<UploadResponse> {
        let part = multipart::Part::bytes(content)
            .file_name(filename.to_string())
            .mime_str("application/octet-stream")?;
        let form = multipart::Form::new().part("file", part);

        let response = self
            .http
            .post(self.endpoint("upload")?)
            .multipart(form)
            .send()
            .await?;

        let uploaded: UploadResponse = check(response).await?.json().await?;
        tracing::info!("Uploaded {} to relay: {}", filename, uploaded.download_url);
        Ok(uploaded)
    }

    pub async fn upload_path(&self, path: &Path) -> ClientResult<UploadResponse> {
        let content = tokio::fs::read(path).await?;
        let filename = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("upload.bin");
        self.upload(filename, content).await
    }

    /// Accepts either a full download URL or a bare stored name.
    pub async fn download(&self, name_or_url: &str) -> ClientResult<Bytes> {
        let url = if is_http_url(name_or_url) {
            Url::parse(name_or_url)?
        } else {
            validate_stored_name(name_or_url)
                .map_err(|e| ClientError::InvalidName(e.to_string()))?;
            self.endpoint(&format!("files/{}", name_or_url))?
        };

        let response = self.http.get(url).send().await?;
        let content = check(response).await?.bytes().await?;
        tracing::info!("Downloaded {} bytes from relay", content.len());
        Ok(content)
    }

    pub async fn stats(&self) -> ClientResult<StatsResponse> {
        let response = self.http.get(self.endpoint("stats")?).send().await?;
        Ok(check(response).await?.json().await?)
    }

    /// `None` lets the relay apply its configured default age.
    pub async fn cleanup(&self, max_age_secs: Option<u64>) -> ClientResult<u64> {
        let body = match max_age_secs {
            Some(age) => json!({ "max_age_seconds": age }),
            None => json!({}),
        };

        let response = self
            .http
            .post(self.endpoint("cleanup")?)
            .json(&body)
            .send()
            .await?;

        let result: CleanupResponse = check(response).await?.json().await?;
        tracing::info!("Cleanup deleted {} files", result.deleted_count);
        Ok(result.deleted_count)
    }

    pub async fn health(&self) -> ClientResult<HealthResponse> {
        let response = self.http.get(self.endpoint("health")?).send().await?;
        Ok(check(response).await?.json().await?)
    }
}

async fn check(response: reqwest::Response) -> ClientResult<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<serde_json::Value>(&body)
        .ok()
        .and_then(|v| v.get("error").and_then(|e| e.as_str()).map(str::to_string))
        .unwrap_or(body);

    Err(ClientError::Status {
        status: status.as_u16(),
        message,
    })
}

pub fn is_http_url(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}

pub fn extract_filename_from_url(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let filename = parsed.path_segments()?.next_back()?;
    if filename.is_empty() {
        None
    } else {
        Some(filename.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_url_detection() {
        assert!(is_http_url("https://example.com/file.shr"));
        assert!(is_http_url("http://example.com/file.shr"));
        assert!(!is_http_url("shr://peer123/hash456"));
        assert!(!is_http_url("file:///local/path"));
    }

    #[test]
    fn test_filename_extraction() {
        assert_eq!(
            extract_filename_from_url("http://localhost:8000/files/abc123.shr"),
            Some("abc123.shr".to_string())
        );
        assert_eq!(extract_filename_from_url("http://localhost:8000/files/"), None);
        assert_eq!(extract_filename_from_url("not a url"), None);
    }

    #[test]
    fn test_endpoint_keeps_base_path() {
        let client = RelayClient::new("http://relay.example.com/shr").unwrap();
        assert_eq!(
            client.endpoint("upload").unwrap().as_str(),
            "http://relay.example.com/shr/upload"
        );

        let client = RelayClient::new("http://localhost:8000").unwrap();
        assert_eq!(
            client.endpoint("files/abc.shr").unwrap().as_str(),
            "http://localhost:8000/files/abc.shr"
        );
    }

    #[tokio::test]
    async fn test_download_rejects_traversal_before_sending() {
        let client = RelayClient::new("http://127.0.0.1:9").unwrap();
        let err = client.download("../../etc/passwd").await.unwrap_err();
        assert!(matches!(err, ClientError::InvalidName(_)));
    }
}
