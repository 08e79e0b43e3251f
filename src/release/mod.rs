//! Release lifecycle coordinator split into phase submodules.
//!
//! The `ReleaseCoordinator` struct and its methods are organized by phase:
//! - [`upload`] - begin, binary transfer, commit and abort of the release upload
//! - [`polling`] - waiting for the backend to turn the upload into a release
//! - [`publish`] - making the release available to its destinations
//! - [`symbols`] - symbols sub-flow, sequenced after publish
//! - [`distribute`] - the whole pipeline, with abort on failure
//!
//! A coordinator drives exactly one release. Its lifecycle state only moves
//! along the transitions allowed by [`LifecycleState::can_transition_to`].

mod distribute;
mod polling;
mod publish;
mod symbols;
mod upload;

pub use distribute::{DistributionPlan, DistributionReport, SymbolsUpload};

use crate::config::Config;
use crate::error::{ReleaseError, Result};
use crate::http::ApiClient;
use crate::types::{Event, LifecycleState};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Drives one release through begin, upload, commit, poll, publish and symbols
/// (cloneable - all fields are Arc-wrapped or cheap to clone)
#[derive(Clone, Debug)]
pub struct ReleaseCoordinator {
    /// REST client for the distribution API
    pub(crate) api: ApiClient,
    /// Tunables
    pub(crate) config: Arc<Config>,
    /// `{owner}/{app}`
    pub(crate) app_slug: String,
    /// Current lifecycle state
    pub(crate) state: Arc<Mutex<LifecycleState>>,
    /// Event broadcast channel sender (multiple subscribers supported)
    pub(crate) event_tx: broadcast::Sender<Event>,
    /// Stops the binary upload and the poll loop
    pub(crate) cancel_token: CancellationToken,
}

impl ReleaseCoordinator {
    /// Create a coordinator for one release of `app_slug`
    pub fn new(api: ApiClient, config: Config, app_slug: impl Into<String>) -> Self {
        let (event_tx, _rx) = broadcast::channel(256);
        Self {
            api,
            config: Arc::new(config),
            app_slug: app_slug.into(),
            state: Arc::new(Mutex::new(LifecycleState::Created)),
            event_tx,
            cancel_token: CancellationToken::new(),
        }
    }

    /// Subscribe to lifecycle events
    ///
    /// Each subscriber receives every event sent after it subscribed. A
    /// subscriber that falls more than 256 events behind gets
    /// `RecvError::Lagged`.
    ///
    /// # Example
    ///
    /// ```no_run
    /// # use appcenter_distribute::{ReleaseCoordinator, Event};
    /// # fn example(coordinator: &ReleaseCoordinator) {
    /// let mut events = coordinator.subscribe();
    /// tokio::spawn(async move {
    ///     while let Ok(event) = events.recv().await {
    ///         if let Event::UploadProgress { percent } = event {
    ///             println!("{percent:.0}%");
    ///         }
    ///     }
    /// });
    /// # }
    /// ```
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// Current lifecycle state
    pub fn state(&self) -> LifecycleState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The app this coordinator publishes to
    pub fn app_slug(&self) -> &str {
        &self.app_slug
    }

    /// Token that stops the in-flight binary upload and the poll loop
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel_token.clone()
    }

    /// Stop the in-flight binary upload or poll loop
    ///
    /// The interrupted step fails with `Error::Cancelled`, which aborts the
    /// release upload like any other failure.
    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    /// Emit an event to all subscribers
    ///
    /// If there are no subscribers the event is dropped.
    pub(crate) fn emit_event(&self, event: Event) {
        self.event_tx.send(event).ok();
    }

    /// Move to `next`, or fail if it is not reachable from the current state
    pub(crate) fn transition(&self, next: LifecycleState) -> Result<()> {
        let from = {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            let from = *state;
            if !from.can_transition_to(next) {
                return Err(ReleaseError::InvalidTransition {
                    from: from.to_string(),
                    to: next.to_string(),
                }
                .into());
            }
            *state = next;
            from
        };

        debug!(%from, to = %next, "release state changed");
        self.emit_event(Event::StateChanged { from, to: next });
        Ok(())
    }

    /// `{server}/{version}/apps/{slug}/{path}`
    pub(crate) fn app_url(&self, path: &str) -> String {
        self.api.endpoint().app_url(&self.app_slug, path)
    }
}
