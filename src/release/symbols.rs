//! Symbols sub-flow: begin, blob upload, commit.

use crate::blob::BlobUploader;
use crate::error::{Error, Result};
use crate::http::RequestSource;
use crate::types::{Event, SymbolType, SymbolUploadRequest, SymbolsUploadSession};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use std::path::Path;
use tracing::{info, warn};

use super::ReleaseCoordinator;

#[derive(Debug, Deserialize)]
struct BeginSymbolsResponse {
    #[serde(default)]
    symbol_upload_id: Option<String>,
    #[serde(default)]
    upload_url: Option<String>,
    #[serde(default)]
    expiration_date: Option<chrono::DateTime<Utc>>,
}

impl ReleaseCoordinator {
    /// Ask the backend for a symbols upload URL
    pub async fn begin_symbol_upload(
        &self,
        request: &SymbolUploadRequest,
    ) -> Result<SymbolsUploadSession> {
        let url = self.app_url("symbol_uploads");
        info!(symbol_type = request.symbol_type.as_str(), "creating symbols upload");

        let response: BeginSymbolsResponse = self
            .api
            .post(&url, Some(request))
            .await?
            .json("begin symbol upload")?;

        let missing = |field: &str| Error::contract("begin symbol upload", field, "is missing");
        Ok(SymbolsUploadSession {
            symbol_upload_id: response
                .symbol_upload_id
                .filter(|id| !id.is_empty())
                .ok_or_else(|| missing("symbol_upload_id"))?,
            upload_url: response
                .upload_url
                .filter(|url| !url.is_empty())
                .ok_or_else(|| missing("upload_url"))?,
            expiration_date: response.expiration_date,
        })
    }

    /// Upload the prepared symbols file to the session's blob URL
    pub async fn upload_symbols(&self, session: &SymbolsUploadSession, file: &Path) -> Result<()> {
        if session.expiration_date.is_some_and(|expires| expires <= Utc::now()) {
            warn!(
                symbol_upload_id = %session.symbol_upload_id,
                "symbols upload url has expired, the upload may be rejected"
            );
        }
        info!(file = %file.display(), "uploading symbols");
        BlobUploader::new(self.api.http().clone())
            .with_timeout(self.config.upload.blob_timeout)
            .upload(&session.upload_url, file)
            .await
    }

    /// Mark the symbols upload as committed
    pub async fn commit_symbols(
        &self,
        session: &SymbolsUploadSession,
        symbol_type: SymbolType,
    ) -> Result<()> {
        let url = self.app_url(&format!("symbol_uploads/{}", session.symbol_upload_id));
        info!(symbol_upload_id = %session.symbol_upload_id, "committing symbols");

        self.api
            .patch(&url, &json!({ "status": "committed" }), RequestSource::Vsts)
            .await?;

        self.emit_event(Event::SymbolsCommitted {
            symbol_upload_id: session.symbol_upload_id.clone(),
            symbol_type,
        });
        Ok(())
    }
}
