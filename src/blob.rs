//! Single-shot blob upload for symbol archives
//!
//! "Begin symbol upload" hands out a SAS URL of the form
//! `https://{account}.blob.core.windows.net/{container}/{blob...}?{sas}`.
//! The file is sent in one `PUT` as a block blob.

use crate::error::{Result, SymbolsError};
use std::path::Path;
use std::time::Duration;
use tokio_util::io::ReaderStream;
use tracing::debug;
use url::Url;

/// Blob coordinates decoded from a SAS upload URL
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlobLocation {
    /// `scheme://host[:port]`
    pub endpoint: String,
    /// First path segment
    pub container: String,
    /// Remaining path segments joined with `/`
    pub blob_name: String,
    /// Shared access signature (the query string, without `?`)
    pub sas: String,
}

impl BlobLocation {
    /// Decompose a SAS upload URL
    pub fn parse(upload_url: &str) -> Result<Self> {
        let invalid = |reason: &str| SymbolsError::InvalidUploadUrl {
            url: strip_query(upload_url).to_string(),
            reason: reason.to_string(),
        };

        let url = Url::parse(upload_url).map_err(|e| invalid(&e.to_string()))?;
        let host = url.host_str().ok_or_else(|| invalid("no host"))?;
        let endpoint = match url.port() {
            Some(port) => format!("{}://{}:{}", url.scheme(), host, port),
            None => format!("{}://{}", url.scheme(), host),
        };

        let mut segments = url
            .path_segments()
            .ok_or_else(|| invalid("no path"))?
            .filter(|s| !s.is_empty());
        let container = segments
            .next()
            .ok_or_else(|| invalid("no container name"))?
            .to_string();
        let blob_name = segments.collect::<Vec<_>>().join("/");
        if blob_name.is_empty() {
            return Err(invalid("no blob name").into());
        }

        let sas = url
            .query()
            .filter(|q| !q.is_empty())
            .ok_or_else(|| invalid("no shared access signature"))?
            .to_string();

        Ok(Self {
            endpoint,
            container,
            blob_name,
            sas,
        })
    }

    /// Storage connection string for the container
    pub fn connection_string(&self) -> String {
        format!(
            "BlobEndpoint={};SharedAccessSignature={}",
            self.endpoint, self.sas
        )
    }

    /// Blob URL without the signature (safe to log)
    pub fn blob_url(&self) -> String {
        format!("{}/{}/{}", self.endpoint, self.container, self.blob_name)
    }

    fn signed_url(&self) -> String {
        format!("{}?{}", self.blob_url(), self.sas)
    }
}

fn strip_query(url: &str) -> &str {
    url.split_once('?').map(|(base, _)| base).unwrap_or(url)
}

/// Uploads files to SAS blob URLs
#[derive(Clone, Debug, Default)]
pub struct BlobUploader {
    http: reqwest::Client,
    timeout: Option<Duration>,
}

impl BlobUploader {
    /// Create an uploader sharing `http`'s connection pool
    pub fn new(http: reqwest::Client) -> Self {
        Self {
            http,
            timeout: None,
        }
    }

    /// Bound the whole `PUT` by `timeout` instead of the client's default
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Upload `file` to the blob addressed by `upload_url`
    pub async fn upload(&self, upload_url: &str, file: &Path) -> Result<()> {
        let location = BlobLocation::parse(upload_url)?;
        debug!(
            container = %location.container,
            blob = %location.blob_name,
            file = %file.display(),
            "uploading blob"
        );

        let handle = tokio::fs::File::open(file).await?;
        let length = handle.metadata().await?.len();
        let mut request = self
            .http
            .put(location.signed_url())
            .header("x-ms-blob-type", "BlockBlob")
            .header(reqwest::header::CONTENT_LENGTH, length)
            .body(reqwest::Body::wrap_stream(ReaderStream::new(handle)));
        if let Some(timeout) = self.timeout {
            request = request.timeout(timeout);
        }
        let response = request.send().await?;

        let status = response.status().as_u16();
        debug!(status, "blob upload finished");
        if !(200..300).contains(&status) {
            return Err(SymbolsError::BlobUpload {
                file: file.to_path_buf(),
                url: location.blob_url(),
                status,
            }
            .into());
        }
        Ok(())
    }
}
