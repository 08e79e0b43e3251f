//! # appcenter-distribute
//!
//! Release upload and publish pipeline for the App Center distribution API.
//!
//! ## Design Philosophy
//!
//! appcenter-distribute is designed to be:
//! - **Never orphan an upload** - a failure after "begin" aborts the release upload
//! - **Bounded** - polling has a deadline and every step can be cancelled
//! - **Library-first** - the pipeline task binary is a thin shell over the crate
//! - **Event-driven** - consumers subscribe to lifecycle events
//!
//! ## Quick Start
//!
//! ```no_run
//! use appcenter_distribute::{
//!     ApiClient, ApiEndpoint, Config, DistributionPlan, PublishRequest, ReleaseCoordinator,
//!     RequestSource,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::default();
//!     let endpoint = ApiEndpoint::from_url("https://api.appcenter.ms/v0.1", "api-token")?;
//!     let api = ApiClient::new(endpoint, "VSTS (Task:VSMobileCenterUpload)", &config.http)?;
//!     let coordinator = ReleaseCoordinator::new(api, config, "owner/app");
//!
//!     let mut events = coordinator.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Event: {:?}", event);
//!         }
//!     });
//!
//!     let plan = DistributionPlan {
//!         app_file: "build/app-release.apk".into(),
//!         build_version: None,
//!         publish: PublishRequest::new("notes", false, &["group-id".to_string()], None),
//!         request_source: RequestSource::Vsts,
//!         symbols: Vec::new(),
//!     };
//!     let report = coordinator.distribute(&plan).await?;
//!     println!("published {}", report.release_url);
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Single-shot blob upload for symbols
pub mod blob;
/// Configuration types
pub mod config;
/// Error types
pub mod error;
/// HTTP envelope for the distribution API
pub mod http;
/// Task input resolution
pub mod inputs;
/// Glob resolution for app and symbols paths
pub mod paths;
/// Pipeline agent protocol
pub mod pipeline;
/// Release lifecycle coordinator (decomposed into phase submodules)
pub mod release;
/// Retry logic with exponential backoff
pub mod retry;
/// Symbols archive preparation
pub mod symbols;
/// Core types
pub mod types;
/// Chunked binary upload client
pub mod upload;

// Re-export commonly used types
pub use config::{Config, HttpConfig, PollConfig, RetryConfig, UploadConfig};
pub use error::{Disposition, Error, ReleaseError, Result, SymbolsError, UploadError};
pub use http::{ApiClient, ApiEndpoint, RequestSource};
pub use release::{DistributionPlan, DistributionReport, ReleaseCoordinator, SymbolsUpload};
pub use types::{
    BuildInfo, DestinationType, Event, LifecycleState, PublishRequest, ReleaseId, SymbolType,
    UploadSession,
};
