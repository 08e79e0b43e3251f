//! Chunked binary upload client
//!
//! Uploads one file to the upload domain returned by "begin release upload":
//!
//! 1. `set_metadata` announces name, size and content type and returns the
//!    chunk size plus the list of chunks the service still needs
//! 2. chunks are sent concurrently (bounded by `max_concurrent_chunks`), each
//!    transfer retried with exponential backoff on transient failures
//! 3. `finished` asks the service to verify; missing chunks are re-sent
//! 4. `cancel` tells the service to drop the upload
//!
//! Every failure is reported to the [`UploadObserver`] at
//! [`MessageLevel::Error`], after which the uploader cancels itself and
//! returns [`UploadError::Failed`]. The [`CancellationToken`] handle lets the
//! owner stop an upload from outside.

mod mime;
mod observer;
mod protocol;

pub use mime::content_type_for;
pub use observer::{
    MessageLevel, Progress, TracingObserver, UploadObserver, UploadState, UploadStats,
};

use crate::config::{RetryConfig, UploadConfig};
use crate::error::{Error, Result, UploadError};
use crate::retry::with_retry;
use crate::types::UploadSession;
use futures::stream::{self, StreamExt};
use protocol::{
    CancelResponse, ChunkResponse, FinishedResponse, MetadataResponse, chunk_range, total_chunks,
};
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Why an upload run stopped early
enum Failure {
    /// The cancellation token fired
    Cancelled,
    /// The upload cannot complete; `message` is reported at error level
    Failed { message: String, state: UploadState },
}

impl Failure {
    fn fatal(message: impl Into<String>) -> Self {
        Failure::Failed {
            message: message.into(),
            state: UploadState::FatalError,
        }
    }

    fn offline(detail: impl std::fmt::Display) -> Self {
        Failure::Failed {
            message: format!("Upload Failed. No network detected. Please try again. {detail}"),
            state: UploadState::Error,
        }
    }
}

/// Per-run bookkeeping shared by the concurrent chunk transfers
struct Transfer<'a> {
    path: &'a Path,
    file_size: u64,
    chunk_size: u64,
    total_chunks: u64,
    progress_every: u64,
    completed: AtomicU64,
    started: Instant,
}

/// Client for one chunked upload session
pub struct ChunkedUploader {
    http: reqwest::Client,
    asset_id: String,
    url_encoded_token: String,
    upload_domain: String,
    tenant: String,
    correlation_id: String,
    config: UploadConfig,
    retry: RetryConfig,
    observer: Arc<dyn UploadObserver>,
    cancel_token: CancellationToken,
    state: Mutex<UploadState>,
}

impl std::fmt::Debug for ChunkedUploader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChunkedUploader")
            .field("asset_id", &self.asset_id)
            .field("upload_domain", &self.upload_domain)
            .field("tenant", &self.tenant)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl ChunkedUploader {
    /// Create an uploader for `session`
    ///
    /// Fails with [`UploadError::MissingSetting`] when the asset id, token,
    /// upload domain or tenant is empty.
    pub fn new(
        http: reqwest::Client,
        session: &UploadSession,
        config: &UploadConfig,
        retry: &RetryConfig,
        observer: Arc<dyn UploadObserver>,
    ) -> Result<Self> {
        let required = [
            (session.package_asset_id.as_str(), "An AssetId"),
            (session.url_encoded_token.as_str(), "The upload UrlEncodedToken"),
            (session.upload_domain.as_str(), "The UploadDomain"),
            (config.tenant.as_str(), "The Tenant name"),
        ];
        for (value, setting) in required {
            if value.is_empty() {
                observer.on_message(&format!("{setting} must be specified."), MessageLevel::Error);
                return Err(UploadError::MissingSetting(setting).into());
            }
        }

        let uploader = Self {
            http,
            asset_id: session.package_asset_id.clone(),
            url_encoded_token: session.url_encoded_token.clone(),
            upload_domain: session.upload_domain.trim_end_matches('/').to_string(),
            tenant: config.tenant.clone(),
            correlation_id: session.package_asset_id.clone(),
            config: config.clone(),
            retry: retry.clone(),
            observer,
            cancel_token: CancellationToken::new(),
            state: Mutex::new(UploadState::New),
        };
        uploader.message("Upload created", MessageLevel::Verbose);
        Ok(uploader)
    }

    /// Use a specific `X-Correlation-ID` instead of the asset id
    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = correlation_id.into();
        self
    }

    /// Current uploader state
    pub fn state(&self) -> UploadState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Handle that stops the in-flight transfer when cancelled
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel_token.clone()
    }

    /// Upload `path` and wait for the service to confirm it
    pub async fn start(&self, path: &Path) -> Result<UploadStats> {
        let file_size = match tokio::fs::metadata(path).await {
            Ok(meta) if meta.is_file() && meta.len() > 0 => meta.len(),
            _ => {
                self.message(
                    "A file must be specified and must not be empty.",
                    MessageLevel::Error,
                );
                self.cancel().await;
                self.set_state(UploadState::Error);
                return Err(UploadError::EmptyFile {
                    path: PathBuf::from(path),
                }
                .into());
            }
        };

        // A rejected second start leaves the running transfer untouched
        if !self.begin() {
            let message = "Cannot start an upload that is already in progress.";
            self.message(message, MessageLevel::Error);
            return Err(UploadError::Failed {
                message: message.to_string(),
            }
            .into());
        }

        match self.run(path, file_size).await {
            Ok(stats) => Ok(stats),
            Err(Failure::Cancelled) => {
                self.set_state(UploadState::Cancelled);
                Err(UploadError::Cancelled.into())
            }
            Err(Failure::Failed { message, state }) => Err(self.fail(message, state).await),
        }
    }

    /// Cancel the upload locally and on the service
    ///
    /// Stops in-flight chunk transfers immediately. The service call is best
    /// effort: its failure is only logged.
    pub async fn cancel(&self) {
        self.message("UploadCancelled", MessageLevel::Information);
        self.cancel_token.cancel();

        let url = self.url("cancel", None);
        match self
            .http
            .post(&url)
            .header("X-Correlation-ID", &self.correlation_id)
            .send()
            .await
        {
            Ok(response) if response.status().is_success() => {
                if let Ok(CancelResponse {
                    message: Some(message),
                }) = response.json::<CancelResponse>().await
                {
                    self.message(&message, MessageLevel::Information);
                }
                self.set_state(UploadState::Cancelled);
            }
            Ok(response) => {
                debug!(status = response.status().as_u16(), "cancel request rejected");
            }
            Err(e) => {
                debug!(error = %e, "cancel request failed");
            }
        }
    }

    /// Move to `Initialized` unless an upload is already running
    fn begin(&self) -> bool {
        {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            if state.is_in_progress() {
                return false;
            }
            *state = UploadState::Initialized;
        }
        self.notify_state(UploadState::Initialized);
        true
    }

    async fn run(&self, path: &Path, file_size: u64) -> std::result::Result<UploadStats, Failure> {
        let metadata = self.set_metadata(path, file_size).await?;
        if metadata.chunk_size == 0 {
            return Err(Failure::fatal(
                "The asset cannot be uploaded. The service returned no chunk size.",
            ));
        }

        let total = total_chunks(file_size, metadata.chunk_size);
        let transfer = Transfer {
            path,
            file_size,
            chunk_size: metadata.chunk_size,
            total_chunks: total,
            progress_every: total.div_ceil(100).max(1),
            completed: AtomicU64::new(0),
            started: Instant::now(),
        };
        self.message(&format!("Chunks to upload: {total}"), MessageLevel::Information);

        let mut queue = metadata.chunk_list;
        if metadata.resume_restart {
            let remaining = queue.len() as u64;
            self.message(
                &format!("Chunks remaining to upload: {remaining}"),
                MessageLevel::Information,
            );
            transfer
                .completed
                .store(total.saturating_sub(remaining), Ordering::SeqCst);
        }

        let mut verify_attempts = 0;
        loop {
            if !queue.is_empty() {
                self.set_state(UploadState::Uploading);
                self.upload_chunks(&transfer, std::mem::take(&mut queue))
                    .await?;
            }

            self.set_state(UploadState::Verifying);
            self.message("Verifying upload on server.", MessageLevel::Information);
            match self.finish().await {
                Ok(response) if response.is_done() => {
                    self.message(
                        &format!(
                            "UploadFinalized. The service reported the upload as completed. Status message: {}",
                            response.message.as_deref().unwrap_or_default()
                        ),
                        MessageLevel::Information,
                    );
                    if let Some(location) = &response.location {
                        debug!(location, "upload location");
                    }
                    break;
                }
                Ok(response) if !response.missing_chunks.is_empty() => {
                    verify_attempts += 1;
                    if verify_attempts > self.config.max_verify_attempts {
                        return Err(Failure::fatal(format!(
                            "Upload Failed. {} chunk(s) still missing after {} verification attempts.",
                            response.missing_chunks.len(),
                            self.config.max_verify_attempts
                        )));
                    }
                    let missing = response.missing_chunks;
                    transfer.completed.store(
                        total.saturating_sub(missing.len() as u64),
                        Ordering::SeqCst,
                    );
                    self.message(
                        &format!(
                            "Finalizing found missing {} chunks. Requeuing chunks.",
                            missing.len()
                        ),
                        MessageLevel::Information,
                    );
                    queue = missing;
                }
                Ok(response) => {
                    return Err(Failure::fatal(response.message.unwrap_or_else(|| {
                        "Upload Failed. The service rejected the upload.".to_string()
                    })));
                }
                Err(e) => {
                    verify_attempts += 1;
                    if verify_attempts > self.config.max_verify_attempts {
                        return Err(Failure::offline(e));
                    }
                    self.message(
                        &format!("Finalize upload failed. Trying to autorecover... {e}"),
                        MessageLevel::Information,
                    );
                    tokio::select! {
                        _ = self.cancel_token.cancelled() => return Err(Failure::Cancelled),
                        _ = tokio::time::sleep(self.retry.initial_delay) => {}
                    }
                }
            }
        }

        Ok(self.complete(&transfer))
    }

    async fn set_metadata(
        &self,
        path: &Path,
        file_size: u64,
    ) -> std::result::Result<MetadataResponse, Failure> {
        let file_name = path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or_default();
        self.message(
            &format!("Setting Metadata. file_name={file_name} file_size={file_size}"),
            MessageLevel::Information,
        );

        let mut query = format!(
            "file_name={}&file_size={}",
            urlencoding::encode(file_name),
            file_size
        );
        if let Some(content_type) = content_type_for(path) {
            query.push_str("&content_type=");
            query.push_str(&urlencoding::encode(content_type));
        }

        let response = self
            .http
            .post(self.url("set_metadata", Some(&query)))
            .header("X-Correlation-ID", &self.correlation_id)
            .send()
            .await
            .map_err(Failure::offline)?;

        let status = response.status();
        if !status.is_success() {
            return Err(Failure::fatal(format!(
                "The asset cannot be uploaded. Failed to set metadata. HTTP status code: {}",
                status.as_u16()
            )));
        }

        let text = response.text().await.map_err(Failure::offline)?;
        if text.trim_start().starts_with("<!DOCTYPE html>") {
            return Err(Failure::fatal(html_body(&text)));
        }

        let metadata: MetadataResponse = serde_json::from_str(&text).map_err(|e| {
            Failure::fatal(format!(
                "The asset cannot be uploaded. Invalid metadata response: {e}"
            ))
        })?;
        if metadata.error {
            return Err(Failure::fatal(metadata.message.unwrap_or_else(|| {
                "The asset cannot be uploaded. Failed to set metadata.".to_string()
            })));
        }

        debug!(
            chunk_size = metadata.chunk_size,
            chunks = metadata.chunk_list.len(),
            blob_partitions = ?metadata.blob_partitions,
            resume = metadata.resume_restart,
            "set metadata completed"
        );
        Ok(metadata)
    }

    async fn upload_chunks(
        &self,
        transfer: &Transfer<'_>,
        chunks: Vec<u64>,
    ) -> std::result::Result<(), Failure> {
        let concurrency = self.config.max_concurrent_chunks.max(1);
        let mut uploads = stream::iter(chunks)
            .map(|number| self.upload_chunk_with_retry(transfer, number))
            .buffer_unordered(concurrency);

        loop {
            let next = tokio::select! {
                _ = self.cancel_token.cancelled() => return Err(Failure::Cancelled),
                next = uploads.next() => next,
            };
            match next {
                None => return Ok(()),
                Some(Ok(())) => {}
                Some(Err(e)) => {
                    self.message(&format!("Chunk upload gave up: {e}"), MessageLevel::Information);
                    return Err(match e {
                        Error::Network(e) if e.is_connect() => Failure::offline(e),
                        _ => Failure::fatal(
                            "Upload Failed. Encountered too many errors while uploading. Please try again.",
                        ),
                    });
                }
            }
        }
    }

    async fn upload_chunk_with_retry(&self, transfer: &Transfer<'_>, number: u64) -> Result<()> {
        with_retry(&self.retry, || self.upload_chunk(transfer, number)).await?;

        let done = transfer.completed.fetch_add(1, Ordering::SeqCst) + 1;
        self.message(&format!("ChunkSucceeded: {number}."), MessageLevel::Verbose);
        if done % transfer.progress_every == 0 {
            self.report_progress(transfer, done);
        }
        Ok(())
    }

    async fn upload_chunk(&self, transfer: &Transfer<'_>, number: u64) -> Result<()> {
        let (start, end) = chunk_range(number, transfer.chunk_size, transfer.file_size);
        if start >= end {
            return Ok(());
        }
        let data = read_chunk(transfer.path, start, end - start).await?;

        let url = self.url("upload_chunk", Some(&format!("block_number={number}")));
        let response = self
            .http
            .post(&url)
            .header("X-Correlation-ID", &self.correlation_id)
            .timeout(self.config.chunk_timeout)
            .body(data)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let reason = format!("HTTP status code: {}", status.as_u16());
            self.message(
                &format!("ChunkFailed: {number}. {reason}"),
                MessageLevel::Information,
            );
            return Err(UploadError::ChunkFailed {
                chunk: number,
                reason,
            }
            .into());
        }

        let body: ChunkResponse = response.json().await.map_err(|e| UploadError::ChunkFailed {
            chunk: number,
            reason: e.to_string(),
        })?;
        if body.error {
            let reason = body
                .message
                .unwrap_or_else(|| "rejected by the upload service".to_string());
            self.message(
                &format!("ChunkFailed: {number}. {reason}"),
                MessageLevel::Information,
            );
            return Err(UploadError::ChunkFailed {
                chunk: number,
                reason,
            }
            .into());
        }
        Ok(())
    }

    async fn finish(&self) -> Result<FinishedResponse> {
        let response = self
            .http
            .post(self.url("finished", None))
            .header("X-Correlation-ID", &self.correlation_id)
            .send()
            .await?;
        let status = response.status().as_u16();
        if !(200..300).contains(&status) {
            return Err(Error::Http {
                status,
                body: response.text().await.unwrap_or_default(),
            });
        }
        Ok(response.json().await?)
    }

    fn complete(&self, transfer: &Transfer<'_>) -> UploadStats {
        let total_time = transfer.started.elapsed();
        let seconds = total_time.as_secs_f64();
        let average_speed_mbps = if seconds > 0.0 {
            transfer.file_size as f64 * 8.0 / (1024.0 * 1024.0) / seconds
        } else {
            0.0
        };
        let stats = UploadStats {
            asset_id: self.asset_id.clone(),
            file_size: transfer.file_size,
            total_time,
            average_speed_mbps,
        };

        self.set_state(UploadState::Completed);
        self.message(
            &format!(
                "UploadCompleted: total time: {seconds:.1} seconds. Average speed: {average_speed_mbps:.2} Mbps."
            ),
            MessageLevel::Information,
        );
        self.observer.on_completed(&stats);
        stats
    }

    async fn fail(&self, message: String, state: UploadState) -> Error {
        self.set_state(state);
        self.message(&message, MessageLevel::Error);
        self.cancel().await;
        UploadError::Failed { message }.into()
    }

    fn report_progress(&self, transfer: &Transfer<'_>, done: u64) {
        // A re-sent chunk can be counted twice
        let mut percent = done as f64 * 100.0 / transfer.total_chunks as f64;
        if percent > 100.0 {
            percent = 99.0;
        }

        let sent = done.saturating_mul(transfer.chunk_size).min(transfer.file_size);
        let seconds = transfer.started.elapsed().as_secs_f64();
        let rate_mbps = if seconds > 0.0 {
            sent as f64 * 8.0 / (1024.0 * 1024.0) / seconds
        } else {
            0.0
        };
        let remaining_bits = transfer.file_size.saturating_sub(sent) as f64 * 8.0;
        let time_remaining = if rate_mbps > 0.0 {
            Duration::from_secs_f64(remaining_bits / (1024.0 * 1024.0) / rate_mbps)
        } else {
            Duration::ZERO
        };

        self.observer.on_progress(&Progress {
            percent_completed: percent,
            rate_mbps,
            time_remaining,
        });
    }

    fn set_state(&self, state: UploadState) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = state;
        self.notify_state(state);
    }

    fn notify_state(&self, state: UploadState) {
        self.message(&format!("Setting state: {state:?}"), MessageLevel::Verbose);
        self.observer.on_state_changed(state);
    }

    fn message(&self, message: &str, level: MessageLevel) {
        self.observer.on_message(message, level);
    }

    /// `{domain}/upload/{action}/{asset}?{query}&token={token}`
    ///
    /// The token is appended verbatim: the service hands it out URL-encoded.
    fn url(&self, action: &str, query: Option<&str>) -> String {
        let base = format!(
            "{}/upload/{}/{}",
            self.upload_domain,
            action,
            urlencoding::encode(&self.asset_id)
        );
        match query {
            Some(query) => format!("{base}?{query}&token={}", self.url_encoded_token),
            None => format!("{base}?token={}", self.url_encoded_token),
        }
    }
}

async fn read_chunk(path: &Path, offset: u64, len: u64) -> std::io::Result<Vec<u8>> {
    let mut file = tokio::fs::File::open(path).await?;
    file.seek(SeekFrom::Start(offset)).await?;
    let mut buf = vec![0u8; len as usize];
    file.read_exact(&mut buf).await?;
    Ok(buf)
}

/// Text between `<body>` and `</body>` of an HTML error page
fn html_body(html: &str) -> String {
    let lower = html.to_ascii_lowercase();
    let start = lower
        .find("<body")
        .and_then(|i| lower[i..].find('>').map(|j| i + j + 1))
        .unwrap_or(0);
    let end = lower[start..]
        .find("</body")
        .map(|i| start + i)
        .unwrap_or(html.len());
    html[start..end].trim().to_string()
}
