//! Callbacks through which the uploader reports its progress

use serde::Serialize;
use std::time::Duration;

/// Severity of an uploader message
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum MessageLevel {
    /// Diagnostic chatter
    Verbose,
    /// Normal progress messages
    Information,
    /// The upload failed; the uploader cancels itself after reporting this
    Error,
}

/// Uploader state machine
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum UploadState {
    /// Constructed, nothing sent yet
    New,
    /// File accepted, metadata being negotiated
    Initialized,
    /// Chunks in flight
    Uploading,
    /// Waiting for the service to confirm all chunks
    Verifying,
    /// Service confirmed the upload
    Completed,
    /// Upload cancelled on the service
    Cancelled,
    /// Recoverable failure (e.g. no network)
    Error,
    /// Unrecoverable failure
    FatalError,
}

impl UploadState {
    /// Whether an upload is currently running
    pub fn is_in_progress(self) -> bool {
        matches!(
            self,
            UploadState::Initialized | UploadState::Uploading | UploadState::Verifying
        )
    }
}

/// Transfer progress snapshot
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Progress {
    /// Completed percentage (0.0 to 100.0)
    pub percent_completed: f64,
    /// Current transfer rate in Mbps
    pub rate_mbps: f64,
    /// Estimated time until all chunks are sent
    pub time_remaining: Duration,
}

/// Summary of a finished upload
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct UploadStats {
    /// Asset id on the upload domain
    pub asset_id: String,
    /// Bytes transferred
    pub file_size: u64,
    /// Wall time from first chunk to confirmation
    pub total_time: Duration,
    /// Average speed in Mbps
    pub average_speed_mbps: f64,
}

/// Receives uploader notifications
///
/// All methods have empty defaults. They are called from the upload task and
/// must not block.
pub trait UploadObserver: Send + Sync {
    /// Progress changed
    fn on_progress(&self, _progress: &Progress) {}

    /// Log message from the uploader
    fn on_message(&self, _message: &str, _level: MessageLevel) {}

    /// State changed
    fn on_state_changed(&self, _state: UploadState) {}

    /// Upload confirmed by the service
    fn on_completed(&self, _stats: &UploadStats) {}
}

/// Observer that forwards everything to tracing at debug level
///
/// Errors are not escalated here; the caller receives them as
/// `UploadError::Failed` and reports them once.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingObserver;

impl UploadObserver for TracingObserver {
    fn on_progress(&self, progress: &Progress) {
        tracing::debug!(percent = progress.percent_completed, "upload progress changed");
    }

    fn on_message(&self, message: &str, level: MessageLevel) {
        tracing::debug!(?level, "uploader: {message}");
    }

    fn on_state_changed(&self, state: UploadState) {
        tracing::debug!(?state, "uploader state changed");
    }

    fn on_completed(&self, stats: &UploadStats) {
        tracing::debug!(
            total_secs = stats.total_time.as_secs_f64(),
            "upload completed"
        );
    }
}
