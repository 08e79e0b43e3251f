//! Publishing a release to its destinations and reading it back.

use crate::error::Result;
use crate::http::RequestSource;
use crate::types::{Event, PublishRequest, ReleaseDetails, ReleaseId};
use tracing::info;

use super::ReleaseCoordinator;

impl ReleaseCoordinator {
    /// Make the release available to the destinations in `request`
    pub async fn publish_release(
        &self,
        release_id: &ReleaseId,
        request: &PublishRequest,
        source: RequestSource,
    ) -> Result<()> {
        let url = self.release_url(release_id);
        info!(
            %release_id,
            destinations = request.destinations.len(),
            mandatory = ?request.mandatory_update,
            "publishing release"
        );

        self.api.patch(&url, request, source).await?;

        self.emit_event(Event::Published {
            release_id: release_id.clone(),
            destinations: request.destinations.len(),
        });
        Ok(())
    }

    /// Version information of a published release
    pub async fn get_release(&self, release_id: &ReleaseId) -> Result<ReleaseDetails> {
        self.api
            .get(&self.release_url(release_id))
            .await?
            .json("get release")
    }

    /// `{server}/{version}/apps/{slug}/releases/{id}`
    pub fn release_url(&self, release_id: &ReleaseId) -> String {
        self.app_url(&format!("releases/{release_id}"))
    }
}
