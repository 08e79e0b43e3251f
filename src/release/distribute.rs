//! The whole distribution pipeline
//!
//! begin → upload → commit → poll → publish → symbols. A failure between the
//! upload and the end of polling aborts the release upload; the abort is
//! best effort and never replaces the original error. Publish and symbols
//! failures are reported as-is since the release already exists.

use crate::error::Result;
use crate::http::RequestSource;
use crate::types::{
    Event, LifecycleState, PublishRequest, ReleaseId, SymbolType, SymbolUploadRequest,
    UploadSession,
};
use std::path::PathBuf;
use tracing::{info, warn};

use super::ReleaseCoordinator;

/// A prepared symbols file and its kind
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SymbolsUpload {
    /// Kind of symbols
    pub symbol_type: SymbolType,
    /// The single file or archive to upload
    pub file: PathBuf,
}

/// Everything needed to distribute one release
#[derive(Clone, Debug)]
pub struct DistributionPlan {
    /// The binary to upload
    pub app_file: PathBuf,
    /// Overrides the version read from the binary
    pub build_version: Option<String>,
    /// Body of the publish call
    pub publish: PublishRequest,
    /// `internal-request-source` of the publish call
    pub request_source: RequestSource,
    /// Symbols uploaded after publish, in order
    pub symbols: Vec<SymbolsUpload>,
}

/// Outcome of a successful distribution
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DistributionReport {
    /// The published release
    pub release_id: ReleaseId,
    /// Publish URL of the release
    pub release_url: String,
    /// Ids of the committed symbols uploads
    pub symbols_committed: Vec<String>,
}

impl ReleaseCoordinator {
    /// Run the pipeline for `plan`
    pub async fn distribute(&self, plan: &DistributionPlan) -> Result<DistributionReport> {
        let mut session = self
            .begin_release_upload(plan.build_version.as_deref())
            .await?;

        let release_id = match self.upload_until_ready(&mut session, plan).await {
            Ok(release_id) => release_id,
            Err(e) => {
                warn!(error = %e, upload_id = %session.id, "release upload failed");
                self.abort_after_failure(&mut session).await;
                return Err(e);
            }
        };

        self.publish_release(&release_id, &plan.publish, plan.request_source)
            .await?;
        self.transition(LifecycleState::Published)?;
        info!(%release_id, "release published");

        let mut symbols_committed = Vec::with_capacity(plan.symbols.len());
        if !plan.symbols.is_empty() {
            self.transition(LifecycleState::SymbolsPending)?;
            for symbols in &plan.symbols {
                symbols_committed.push(self.distribute_symbols(&release_id, symbols).await?);
            }
        }
        self.transition(LifecycleState::Done)?;

        Ok(DistributionReport {
            release_url: self.release_url(&release_id),
            release_id,
            symbols_committed,
        })
    }

    async fn upload_until_ready(
        &self,
        session: &mut UploadSession,
        plan: &DistributionPlan,
    ) -> Result<ReleaseId> {
        self.transition(LifecycleState::Uploading)?;
        self.upload_release(session, &plan.app_file).await?;

        self.transition(LifecycleState::Committing)?;
        self.patch_release(session).await?;

        self.transition(LifecycleState::Polling)?;
        self.load_release_id_until_success(session).await
    }

    async fn abort_after_failure(&self, session: &mut UploadSession) {
        if !self.state().is_abortable() {
            return;
        }
        if self.transition(LifecycleState::Aborting).is_err() {
            return;
        }

        if let Err(abort_error) = self.abort_release_upload(session).await {
            warn!(
                upload_id = %session.id,
                error = %abort_error,
                "failed to abort release upload"
            );
            self.emit_event(Event::AbortFailed {
                upload_id: session.id.clone(),
                error: abort_error.to_string(),
            });
        }

        // Aborting always reaches Aborted
        self.transition(LifecycleState::Aborted).ok();
    }

    async fn distribute_symbols(
        &self,
        release_id: &ReleaseId,
        symbols: &SymbolsUpload,
    ) -> Result<String> {
        let request = match symbols.symbol_type {
            SymbolType::AndroidProguard => {
                let details = self.get_release(release_id).await?;
                SymbolUploadRequest::proguard(&details)
            }
            other => SymbolUploadRequest::new(other),
        };

        let session = self.begin_symbol_upload(&request).await?;
        self.upload_symbols(&session, &symbols.file).await?;
        self.commit_symbols(&session, symbols.symbol_type).await?;
        Ok(session.symbol_upload_id)
    }
}
