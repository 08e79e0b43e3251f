//! Common test utilities for appcenter-distribute integration tests
//!
//! One `wiremock` server plays the distribution API, the upload domain and
//! blob storage at once.

#[allow(dead_code)]
pub mod backend;
#[allow(dead_code)]
pub mod fixtures;

#[allow(unused_imports)]
pub use backend::*;
#[allow(unused_imports)]
pub use fixtures::*;
