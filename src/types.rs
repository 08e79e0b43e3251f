//! Core types and events for appcenter-distribute

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Backend-assigned release identifier
///
/// The distribution API returns `release_distinct_id` as a JSON number, but
/// older endpoints echo it as a string; both are accepted.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct ReleaseId(pub String);

impl ReleaseId {
    /// Create a new ReleaseId
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the id as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ReleaseId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for ReleaseId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Number(u64),
            Text(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Number(n) => Ok(Self(n.to_string())),
            Raw::Text(s) => Ok(Self(s)),
        }
    }
}

/// Where an upload session is in its own lifecycle
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SessionPhase {
    /// Created by "begin release upload", not yet committed
    #[default]
    Open,
    /// Commit PATCH succeeded
    Committed,
    /// Abort PATCH was issued
    Aborted,
}

/// Handle authorizing one chunked binary upload
///
/// Owned by the coordinator for the lifetime of one release. It cannot be
/// committed twice and is unusable after an abort.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UploadSession {
    /// Upload id used in the release-upload URLs
    pub id: String,
    /// Asset id on the upload domain
    pub package_asset_id: String,
    /// Upload token, already URL-encoded by the backend
    pub url_encoded_token: String,
    /// Base URL of the chunked upload service
    pub upload_domain: String,
    pub(crate) phase: SessionPhase,
}

impl UploadSession {
    /// Build a session from the fields returned by "begin release upload"
    pub fn new(
        id: impl Into<String>,
        package_asset_id: impl Into<String>,
        url_encoded_token: impl Into<String>,
        upload_domain: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            package_asset_id: package_asset_id.into(),
            url_encoded_token: url_encoded_token.into(),
            upload_domain: upload_domain.into(),
            phase: SessionPhase::Open,
        }
    }

    /// Current phase of the session
    pub fn phase(&self) -> SessionPhase {
        self.phase
    }
}

/// Backend-side processing status of a release upload
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ReleaseUploadStatus {
    /// Upload created, nothing transferred yet
    New,
    /// Binary transfer in progress
    UploadStarted,
    /// Commit received, backend is processing the binary
    UploadFinished,
    /// Release created and can be published
    ReadyToBePublished,
    /// Release published
    Committed,
    /// Processing failed (terminal)
    Error,
    /// Upload was aborted by the client
    Aborted,
    /// Any status this client does not know about
    #[default]
    #[serde(other)]
    Unknown,
}

/// Response of the release-upload status endpoint
#[derive(Clone, Debug, Deserialize)]
pub struct ReleaseStatus {
    /// Processing status, `Unknown` when the backend omits it
    #[serde(default)]
    pub upload_status: ReleaseUploadStatus,
    /// Externally-visible release id, present once the release exists
    #[serde(default)]
    pub release_distinct_id: Option<ReleaseId>,
    /// Failure description when `upload_status` is `error`
    #[serde(default)]
    pub error_details: Option<String>,
}

impl ReleaseStatus {
    /// The release id, if the backend reports the release as publishable
    pub fn ready_release_id(&self) -> Option<&ReleaseId> {
        match self.upload_status {
            ReleaseUploadStatus::ReadyToBePublished => self.release_distinct_id.as_ref(),
            _ => None,
        }
    }
}

/// Version information of an existing release
#[derive(Clone, Debug, Default, Deserialize)]
pub struct ReleaseDetails {
    /// Build number (CFBundleVersion / versionCode)
    #[serde(default)]
    pub version: Option<String>,
    /// Display version (CFBundleShortVersionString / versionName)
    #[serde(default)]
    pub short_version: Option<String>,
}

/// Handle authorizing one symbols upload to blob storage
#[derive(Clone, Debug, Deserialize)]
pub struct SymbolsUploadSession {
    /// Symbol upload id used in the commit URL
    pub symbol_upload_id: String,
    /// SAS URL of the target blob
    pub upload_url: String,
    /// When the SAS URL stops being valid
    #[serde(default)]
    pub expiration_date: Option<DateTime<Utc>>,
}

/// Symbol kinds accepted by the symbol upload API
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SymbolType {
    /// dSYM bundles
    Apple,
    /// Proguard `mapping.txt`
    AndroidProguard,
    /// Breakpad symbols from native libraries
    Breakpad,
    /// APPXSYM / PDB files
    #[serde(rename = "UWP")]
    Uwp,
}

impl SymbolType {
    /// Name used on the wire
    pub fn as_str(&self) -> &'static str {
        match self {
            SymbolType::Apple => "Apple",
            SymbolType::AndroidProguard => "AndroidProguard",
            SymbolType::Breakpad => "Breakpad",
            SymbolType::Uwp => "UWP",
        }
    }

    /// Whether symbol paths of this kind may resolve to several folders
    pub fn allows_multiple_paths(&self) -> bool {
        matches!(self, SymbolType::Apple | SymbolType::Breakpad)
    }
}

/// Body of "begin symbol upload"
#[derive(Clone, Debug, Serialize)]
pub struct SymbolUploadRequest {
    /// Kind of symbols being uploaded
    pub symbol_type: SymbolType,
    /// Always `mapping.txt` for Proguard uploads
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    /// Release display version (Proguard only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// Release build number (Proguard only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub build: Option<String>,
}

impl SymbolUploadRequest {
    /// Request for any symbol type that needs no release metadata
    pub fn new(symbol_type: SymbolType) -> Self {
        Self {
            symbol_type,
            file_name: None,
            version: None,
            build: None,
        }
    }

    /// Proguard request tied to the published release's versions
    pub fn proguard(release: &ReleaseDetails) -> Self {
        Self {
            symbol_type: SymbolType::AndroidProguard,
            file_name: Some("mapping.txt".to_string()),
            version: release.short_version.clone(),
            build: release.version.clone(),
        }
    }
}

/// Distribution group or store a release is made available to
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Destination {
    /// Group or store id
    pub id: String,
}

/// Kind of destination a release is published to
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DestinationType {
    /// One or more distribution groups
    #[default]
    Groups,
    /// Exactly one store connection
    Store,
}

/// CI build that produced the binary
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildInfo {
    /// Build id
    pub id: String,
    /// Branch name without the `refs/heads/` prefix
    pub branch: String,
    /// Source commit
    pub commit_hash: String,
    /// Last commit message, set for builds started by App Center
    #[serde(skip_serializing_if = "Option::is_none")]
    pub commit_message: Option<String>,
}

/// Body of the publish PATCH
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PublishRequest {
    /// Always "available"
    pub status: String,
    /// Release notes shown to testers
    pub release_notes: String,
    /// Force testers to update (groups only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mandatory_update: Option<bool>,
    /// Distribution groups, or the single store
    pub destinations: Vec<Destination>,
    /// Build descriptor, present when branch and commit are known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub build: Option<BuildInfo>,
    /// `Some(false)` for silent distribution (groups only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notify_testers: Option<bool>,
}

impl PublishRequest {
    /// Build a publish request for the given distribution groups
    pub fn new(
        release_notes: impl Into<String>,
        mandatory_update: bool,
        destination_ids: &[String],
        build: Option<BuildInfo>,
    ) -> Self {
        Self {
            status: "available".to_string(),
            release_notes: release_notes.into(),
            mandatory_update: Some(mandatory_update),
            destinations: destination_ids
                .iter()
                .map(|id| Destination { id: id.clone() })
                .collect(),
            build,
            notify_testers: None,
        }
    }

    /// Build a publish request for one store
    ///
    /// Stores have no notion of mandatory updates or tester notifications.
    pub fn store(
        release_notes: impl Into<String>,
        store_id: impl Into<String>,
        build: Option<BuildInfo>,
    ) -> Self {
        Self {
            status: "available".to_string(),
            release_notes: release_notes.into(),
            mandatory_update: None,
            destinations: vec![Destination { id: store_id.into() }],
            build,
            notify_testers: None,
        }
    }

    /// Do not notify testers about this release
    pub fn silent(mut self) -> Self {
        self.notify_testers = Some(false);
        self
    }
}

/// States of one release distribution
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    /// Upload session created
    Created,
    /// Binary transfer in progress
    Uploading,
    /// Commit PATCH in flight
    Committing,
    /// Waiting for the backend to create the release
    Polling,
    /// Release made available
    Published,
    /// Symbols sub-flow in progress
    SymbolsPending,
    /// Everything finished
    Done,
    /// Abort PATCH in flight
    Aborting,
    /// Upload aborted
    Aborted,
}

impl LifecycleState {
    /// Whether `next` is reachable from `self` in one step
    pub fn can_transition_to(self, next: LifecycleState) -> bool {
        use LifecycleState::*;
        matches!(
            (self, next),
            (Created, Uploading)
                | (Uploading, Committing)
                | (Committing, Polling)
                | (Polling, Published)
                | (Published, SymbolsPending)
                | (Published, Done)
                | (SymbolsPending, Done)
                | (Created | Uploading | Committing | Polling, Aborting)
                | (Aborting, Aborted)
        )
    }

    /// Whether the release upload can still be aborted from this state
    pub fn is_abortable(self) -> bool {
        self.can_transition_to(LifecycleState::Aborting)
    }
}

impl std::fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            LifecycleState::Created => "created",
            LifecycleState::Uploading => "uploading",
            LifecycleState::Committing => "committing",
            LifecycleState::Polling => "polling",
            LifecycleState::Published => "published",
            LifecycleState::SymbolsPending => "symbols_pending",
            LifecycleState::Done => "done",
            LifecycleState::Aborting => "aborting",
            LifecycleState::Aborted => "aborted",
        };
        f.write_str(name)
    }
}

/// Events emitted by the coordinator
///
/// Consumers subscribe via `ReleaseCoordinator::subscribe()`.
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// Lifecycle state changed
    StateChanged {
        /// Previous state
        from: LifecycleState,
        /// New state
        to: LifecycleState,
    },

    /// Binary upload progress
    UploadProgress {
        /// Progress percentage (0.0 to 100.0)
        percent: f64,
    },

    /// Backend reported the release as ready to publish
    ReleaseReady {
        /// The release id
        release_id: ReleaseId,
    },

    /// Release made available to its destinations
    Published {
        /// The release id
        release_id: ReleaseId,
        /// Number of destinations
        destinations: usize,
    },

    /// Best-effort abort failed; the original error is still reported
    AbortFailed {
        /// Upload session id
        upload_id: String,
        /// Why the abort failed
        error: String,
    },

    /// Symbols upload committed
    SymbolsCommitted {
        /// Symbol upload id
        symbol_upload_id: String,
        /// Kind of symbols
        symbol_type: SymbolType,
    },
}
