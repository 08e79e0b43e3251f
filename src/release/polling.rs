//! Waiting for the backend to turn a committed upload into a release.

use crate::error::{Error, ReleaseError, Result};
use crate::types::{Event, ReleaseId, ReleaseStatus, ReleaseUploadStatus, UploadSession};
use std::time::{Duration, Instant};
use tokio::time::{MissedTickBehavior, interval_at};
use tracing::{debug, info};

use super::ReleaseCoordinator;

impl ReleaseCoordinator {
    /// Poll the release-upload status until the release id is available
    ///
    /// The first request is sent one interval after the call. Polling stops
    /// on `readyToBePublished` with a release id, on `error`, on a failed
    /// request, when the configured bound is reached, or on cancellation.
    pub async fn load_release_id_until_success(&self, session: &UploadSession) -> Result<ReleaseId> {
        let url = self.app_url(&format!("uploads/releases/{}", session.id));
        let poll = &self.config.poll;
        info!(upload_id = %session.id, "waiting for release to be ready");

        // A zero period makes the ticker panic
        let period = poll.interval.max(Duration::from_millis(1));
        let started = Instant::now();
        let mut ticker = interval_at(tokio::time::Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut attempts: u32 = 0;

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = self.cancel_token.cancelled() => {
                    debug!(attempts, "release polling cancelled");
                    return Err(Error::Cancelled);
                }
            }

            let elapsed = started.elapsed();
            let out_of_time = poll.timeout.is_some_and(|limit| elapsed >= limit);
            let out_of_attempts = poll.max_attempts.is_some_and(|max| attempts >= max);
            if out_of_time || out_of_attempts {
                return Err(ReleaseError::PollTimedOut { attempts, elapsed }.into());
            }

            attempts += 1;
            let status: ReleaseStatus = match self.api.get(&url).await {
                Ok(response) => response.json("load release status")?,
                Err(e) => {
                    return Err(ReleaseError::PollFailed {
                        reason: e.to_string(),
                    }
                    .into());
                }
            };

            if let Some(release_id) = status.ready_release_id() {
                let release_id = release_id.clone();
                info!(%release_id, attempts, "release is ready to be published");
                self.emit_event(Event::ReleaseReady {
                    release_id: release_id.clone(),
                });
                return Ok(release_id);
            }

            if status.upload_status == ReleaseUploadStatus::Error {
                return Err(ReleaseError::ProcessingFailed {
                    details: status.error_details.unwrap_or_default(),
                }
                .into());
            }

            debug!(attempts, status = ?status.upload_status, "release not ready yet");
        }
    }
}
