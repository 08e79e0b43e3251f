//! Error types for appcenter-distribute
//!
//! This module provides the error taxonomy for the release pipeline:
//! - Transport errors (network failures, non-2xx HTTP responses)
//! - Protocol-contract violations (a response is missing an expected field)
//! - Upload-transfer errors raised by the chunked uploader
//! - Release lifecycle errors (commit rejected, processing failed, poll bound exceeded)
//! - Symbols preparation and upload errors
//!
//! Every error can be classified with [`Error::disposition`], which tells the
//! caller whether the failure is transient, whether it must abort the open
//! release upload, or whether it is fatal without further cleanup.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Result type alias for appcenter-distribute operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for appcenter-distribute
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration or task input error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key or task input that caused the error (e.g., "appSlug")
        key: Option<String>,
    },

    /// The server answered with a non-2xx status code
    #[error("{}", http_error_message(*status, body))]
    Http {
        /// HTTP status code returned by the server
        status: u16,
        /// Raw response body (may be empty)
        body: String,
    },

    /// Network error (connection refused, DNS failure, timeout, ...)
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// A response did not honor the expected contract (missing or unexpected field)
    #[error("unexpected response from {operation}: field `{field}` {message}")]
    Contract {
        /// The API operation whose response was malformed
        operation: String,
        /// The offending field
        field: String,
        /// What was wrong with it
        message: String,
    },

    /// Chunked upload error
    #[error("upload error: {0}")]
    Upload(#[from] UploadError),

    /// Release lifecycle error
    #[error(transparent)]
    Release(#[from] ReleaseError),

    /// Symbols preparation or upload error
    #[error("symbols error: {0}")]
    Symbols(#[from] SymbolsError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Symbols archive could not be written
    #[error("archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    /// Operation was cancelled through its cancellation token
    #[error("operation cancelled")]
    Cancelled,

    /// Other error
    #[error("{0}")]
    Other(String),
}

fn http_error_message(status: u16, body: &str) -> String {
    let status_line = format!("http response code: {status}");
    if body.is_empty() {
        status_line
    } else {
        format!("{body}\n{status_line}")
    }
}

/// Errors raised by the chunked binary uploader
#[derive(Debug, Error)]
pub enum UploadError {
    /// A required upload setting was not provided by the upload session
    #[error("{0} must be specified")]
    MissingSetting(&'static str),

    /// The file to upload is missing or empty
    #[error("a file must be specified and must not be empty: {path}")]
    EmptyFile {
        /// The rejected file
        path: PathBuf,
    },

    /// The upload failed; the message is the one reported at error level
    #[error("Uploading file error: {message}")]
    Failed {
        /// Error message reported by the uploader
        message: String,
    },

    /// A chunk transfer failed (retried by the uploader before it gives up)
    #[error("chunk {chunk} failed: {reason}")]
    ChunkFailed {
        /// 1-based chunk number
        chunk: u64,
        /// Why the chunk was rejected
        reason: String,
    },

    /// The upload was cancelled before completion
    #[error("upload cancelled")]
    Cancelled,
}

/// Errors raised by the release lifecycle coordinator
#[derive(Debug, Error)]
pub enum ReleaseError {
    /// The backend did not return a usable upload session
    #[error("failed to create release upload. {message}")]
    UploadInitiation {
        /// Server-provided message, if any
        message: String,
    },

    /// The commit PATCH did not echo the expected upload status
    #[error("Failed to patch release upload: {message}")]
    CommitRejected {
        /// The status the server echoed back, if any
        returned_status: Option<String>,
        /// Server-provided message, if any
        message: String,
    },

    /// The backend reported the release upload as failed while polling
    #[error("Loading release id failed: {details}")]
    ProcessingFailed {
        /// `error_details` returned by the backend
        details: String,
    },

    /// A poll request failed at the transport level
    #[error("Loading release id failed with: {reason}")]
    PollFailed {
        /// Display form of the underlying error
        reason: String,
    },

    /// The poll loop exceeded its configured bound
    #[error("release was not ready after {attempts} poll(s) in {elapsed:?}")]
    PollTimedOut {
        /// Number of polls issued
        attempts: u32,
        /// Time spent polling
        elapsed: Duration,
    },

    /// The upload session was already committed
    #[error("upload {id} has already been committed")]
    AlreadyCommitted {
        /// Upload session id
        id: String,
    },

    /// The upload session was aborted and can no longer be used
    #[error("upload {id} has been aborted")]
    SessionAborted {
        /// Upload session id
        id: String,
    },

    /// The coordinator was asked to move to a state that is not reachable
    #[error("cannot move release from {from} to {to}")]
    InvalidTransition {
        /// Current lifecycle state
        from: String,
        /// Requested lifecycle state
        to: String,
    },
}

/// Errors raised while resolving, archiving or uploading symbols
#[derive(Debug, Error)]
pub enum SymbolsError {
    /// A path pattern matched nothing
    #[error("no file or directory matches {pattern}")]
    NotFound {
        /// The pattern that was resolved
        pattern: String,
    },

    /// A single-path pattern matched several entries
    #[error("{pattern} matches {count} entries, only one is allowed")]
    MultipleMatches {
        /// The pattern that was resolved
        pattern: String,
        /// Number of matches
        count: usize,
    },

    /// The pattern itself is not a valid glob
    #[error("invalid pattern {pattern}: {reason}")]
    InvalidPattern {
        /// The pattern that failed to parse
        pattern: String,
        /// Parser message
        reason: String,
    },

    /// The symbols upload URL could not be decomposed into blob coordinates
    #[error("invalid symbols upload url {url}: {reason}")]
    InvalidUploadUrl {
        /// The URL returned by the backend
        url: String,
        /// Why it was rejected
        reason: String,
    },

    /// Blob storage rejected the upload
    #[error("Failed to upload {file} to {url}. HTTP status code: {status}")]
    BlobUpload {
        /// The local file
        file: PathBuf,
        /// The blob URL (without signature)
        url: String,
        /// HTTP status code returned by blob storage
        status: u16,
    },
}

/// How the release pipeline should react to an error
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Disposition {
    /// Transient failure; the operation may be retried as-is
    Retryable,
    /// The release upload is unusable; abort it and fail the task
    AbortAndFail,
    /// Nothing to clean up; fail the task
    Fatal,
}

impl Error {
    /// Create a configuration error tied to a task input or config key
    pub fn config(message: impl Into<String>, key: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
            key: Some(key.into()),
        }
    }

    /// Create a contract violation error
    pub fn contract(
        operation: impl Into<String>,
        field: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Error::Contract {
            operation: operation.into(),
            field: field.into(),
            message: message.into(),
        }
    }

    /// Classify this error
    pub fn disposition(&self) -> Disposition {
        match self {
            Error::Network(e) if e.is_timeout() || e.is_connect() => Disposition::Retryable,
            Error::Http { status, .. } if *status == 429 || (500..600).contains(status) => {
                Disposition::Retryable
            }
            Error::Io(e) if is_transient_io(e) => Disposition::Retryable,
            Error::Upload(UploadError::ChunkFailed { .. }) => Disposition::Retryable,

            Error::Network(_)
            | Error::Http { .. }
            | Error::Contract { .. }
            | Error::Upload(_)
            | Error::Release(_)
            | Error::Cancelled => Disposition::AbortAndFail,

            Error::Config { .. }
            | Error::Symbols(_)
            | Error::Io(_)
            | Error::Serialization(_)
            | Error::Archive(_)
            | Error::Other(_) => Disposition::Fatal,
        }
    }
}

fn is_transient_io(e: &std::io::Error) -> bool {
    matches!(
        e.kind(),
        std::io::ErrorKind::TimedOut
            | std::io::ErrorKind::ConnectionRefused
            | std::io::ErrorKind::ConnectionReset
            | std::io::ErrorKind::ConnectionAborted
            | std::io::ErrorKind::NotConnected
            | std::io::ErrorKind::BrokenPipe
            | std::io::ErrorKind::Interrupted
    )
}
