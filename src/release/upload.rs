//! Release upload session: begin, binary transfer, commit and abort.

use crate::error::{Error, ReleaseError, Result};
use crate::http::RequestSource;
use crate::types::{Event, SessionPhase, UploadSession};
use crate::upload::{
    ChunkedUploader, MessageLevel, Progress, UploadObserver, UploadState, UploadStats,
};
use serde::Deserialize;
use serde_json::json;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info};

use super::ReleaseCoordinator;

#[derive(Debug, Deserialize)]
struct BeginUploadResponse {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    package_asset_id: Option<String>,
    #[serde(default)]
    upload_domain: Option<String>,
    #[serde(default)]
    url_encoded_token: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CommitResponse {
    #[serde(default)]
    upload_status: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

/// Forwards uploader callbacks to the coordinator's event channel
struct EventObserver {
    event_tx: broadcast::Sender<Event>,
}

impl UploadObserver for EventObserver {
    fn on_progress(&self, progress: &Progress) {
        debug!(percent = progress.percent_completed, "upload progress changed");
        self.event_tx
            .send(Event::UploadProgress {
                percent: progress.percent_completed,
            })
            .ok();
    }

    fn on_message(&self, message: &str, level: MessageLevel) {
        debug!(?level, "uploader: {message}");
    }

    fn on_state_changed(&self, state: UploadState) {
        debug!(?state, "uploader state changed");
    }

    fn on_completed(&self, stats: &UploadStats) {
        debug!(
            total_secs = stats.total_time.as_secs_f64(),
            mbps = stats.average_speed_mbps,
            "upload completed"
        );
    }
}

fn required(value: Option<String>, field: &str) -> Result<String> {
    value
        .filter(|v| !v.is_empty())
        .ok_or_else(|| Error::contract("begin release upload", field, "is missing"))
}

fn ensure_open(session: &UploadSession) -> Result<()> {
    match session.phase {
        SessionPhase::Open => Ok(()),
        SessionPhase::Committed => Err(ReleaseError::AlreadyCommitted {
            id: session.id.clone(),
        }
        .into()),
        SessionPhase::Aborted => Err(ReleaseError::SessionAborted {
            id: session.id.clone(),
        }
        .into()),
    }
}

impl ReleaseCoordinator {
    /// Create a release upload session
    ///
    /// Sends `{ "build_version": ... }` when a build version is given. Fails
    /// with [`ReleaseError::UploadInitiation`] when the backend returns no
    /// package asset id.
    pub async fn begin_release_upload(&self, build_version: Option<&str>) -> Result<UploadSession> {
        let url = self.app_url("uploads/releases");
        info!(app = %self.app_slug, "creating release upload");

        let body = build_version
            .filter(|v| !v.is_empty())
            .map(|v| json!({ "build_version": v }));
        let response: BeginUploadResponse = self
            .api
            .post(&url, body.as_ref())
            .await?
            .json("begin release upload")?;

        let package_asset_id = response
            .package_asset_id
            .filter(|id| !id.is_empty())
            .ok_or_else(|| ReleaseError::UploadInitiation {
                message: response
                    .message
                    .clone()
                    .unwrap_or_else(|| "response has no package_asset_id".to_string()),
            })?;

        let session = UploadSession::new(
            required(response.id, "id")?,
            package_asset_id,
            required(response.url_encoded_token, "url_encoded_token")?,
            required(response.upload_domain, "upload_domain")?,
        );
        debug!(upload_id = %session.id, asset_id = %session.package_asset_id, "release upload created");
        Ok(session)
    }

    /// Transfer the binary through the chunked uploader
    ///
    /// Not retried here: a failure leaves the release to be aborted. The
    /// coordinator's cancellation token stops the transfer.
    pub async fn upload_release(&self, session: &UploadSession, file: &Path) -> Result<UploadStats> {
        ensure_open(session)?;
        info!(file = %file.display(), "uploading release binary");

        let observer = Arc::new(EventObserver {
            event_tx: self.event_tx.clone(),
        });
        let uploader = ChunkedUploader::new(
            self.api.http().clone(),
            session,
            &self.config.upload,
            &self.config.retry,
            observer,
        )?;

        tokio::select! {
            result = uploader.start(file) => result,
            _ = self.cancel_token.cancelled() => {
                uploader.cancel().await;
                Err(Error::Cancelled)
            }
        }
    }

    /// Commit the upload (`upload_status: "uploadFinished"`)
    ///
    /// The backend must echo the same status back. A session can only be
    /// committed once.
    pub async fn patch_release(&self, session: &mut UploadSession) -> Result<()> {
        ensure_open(session)?;
        let url = self.app_url(&format!("uploads/releases/{}", session.id));
        info!(upload_id = %session.id, "finishing release upload");

        let response: CommitResponse = self
            .api
            .patch(
                &url,
                &json!({ "upload_status": "uploadFinished" }),
                RequestSource::Vsts,
            )
            .await?
            .json("commit release upload")?;

        if response.upload_status.as_deref() != Some("uploadFinished") {
            return Err(ReleaseError::CommitRejected {
                returned_status: response.upload_status,
                message: response.message.unwrap_or_default(),
            }
            .into());
        }

        session.phase = SessionPhase::Committed;
        Ok(())
    }

    /// Abort the upload (`status: "aborted"`)
    ///
    /// The session is unusable afterwards, whether or not the call succeeded.
    pub async fn abort_release_upload(&self, session: &mut UploadSession) -> Result<()> {
        if session.phase == SessionPhase::Aborted {
            return Err(ReleaseError::SessionAborted {
                id: session.id.clone(),
            }
            .into());
        }
        session.phase = SessionPhase::Aborted;

        let url = self.app_url(&format!("release_uploads/{}", session.id));
        info!(upload_id = %session.id, "aborting release upload");
        self.api
            .patch(&url, &json!({ "status": "aborted" }), RequestSource::Vsts)
            .await?;
        Ok(())
    }
}
