//! Mocked distribution backend

use super::fixtures::*;
use appcenter_distribute::{
    ApiClient, ApiEndpoint, Config, PollConfig, ReleaseCoordinator, RetryConfig,
};
use serde_json::json;
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

/// `/v0.1/apps/{slug}/{rest}`
pub fn app_path(rest: &str) -> String {
    format!("/v0.1/apps/{APP_SLUG}/{rest}")
}

/// Config with millisecond-scale poll and retry delays
pub fn fast_config() -> Config {
    Config {
        poll: PollConfig {
            interval: Duration::from_millis(20),
            timeout: Some(Duration::from_secs(5)),
            max_attempts: None,
        },
        retry: RetryConfig {
            max_attempts: 1,
            initial_delay: Duration::from_millis(5),
            max_delay: Duration::from_millis(10),
            backoff_multiplier: 2.0,
            jitter: false,
        },
        ..Config::default()
    }
}

/// Coordinator talking to `server`
pub fn coordinator(server: &MockServer) -> ReleaseCoordinator {
    let config = fast_config();
    let endpoint = ApiEndpoint {
        server: server.uri(),
        version: "v0.1".into(),
        token: API_TOKEN.into(),
    };
    let api = ApiClient::new(endpoint, "VSTS (Task:VSMobileCenterUpload)", &config.http)
        .expect("api client");
    ReleaseCoordinator::new(api, config, APP_SLUG)
}

/// "Begin release upload" pointing the upload domain back at `server`
pub async fn mount_begin(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path(app_path("uploads/releases")))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "id": UPLOAD_ID,
            "package_asset_id": ASSET_ID,
            "upload_domain": server.uri(),
            "url_encoded_token": UPLOAD_TOKEN
        })))
        .expect(1)
        .mount(server)
        .await;
}

/// Upload domain accepting every chunk of [`APP_CONTENT`]
pub async fn mount_upload_domain(server: &MockServer) {
    mount_metadata(server).await;
    Mock::given(method("POST"))
        .and(path(format!("/upload/upload_chunk/{ASSET_ID}")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"error": false})))
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(path(format!("/upload/finished/{ASSET_ID}")))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"error": false, "state": "Done", "message": "ok"})),
        )
        .mount(server)
        .await;
    mount_upload_cancel(server).await;
}

/// Upload domain rejecting every chunk
pub async fn mount_failing_upload_domain(server: &MockServer) {
    mount_metadata(server).await;
    Mock::given(method("POST"))
        .and(path(format!("/upload/upload_chunk/{ASSET_ID}")))
        .respond_with(ResponseTemplate::new(500))
        .mount(server)
        .await;
    mount_upload_cancel(server).await;
}

async fn mount_metadata(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path(format!("/upload/set_metadata/{ASSET_ID}")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "chunk_size": CHUNK_SIZE,
            "chunk_list": [1, 2, 3],
            "resume_restart": false
        })))
        .mount(server)
        .await;
}

async fn mount_upload_cancel(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path(format!("/upload/cancel/{ASSET_ID}")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"message": "cancelled"})))
        .mount(server)
        .await;
}

/// Commit PATCH echoing `returned_status`
pub async fn mount_commit(server: &MockServer, returned_status: &str, expected: u64) {
    Mock::given(method("PATCH"))
        .and(path(app_path(&format!("uploads/releases/{UPLOAD_ID}"))))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": UPLOAD_ID,
            "upload_status": returned_status,
            "message": "commit rejected"
        })))
        .expect(expected)
        .mount(server)
        .await;
}

/// Release status answering `body` to every poll
pub async fn mount_release_status(server: &MockServer, body: serde_json::Value, expected: u64) {
    Mock::given(method("GET"))
        .and(path(app_path(&format!("uploads/releases/{UPLOAD_ID}"))))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .expect(expected)
        .mount(server)
        .await;
}

/// Release status that is ready on the first poll
pub async fn mount_release_ready(server: &MockServer) {
    mount_release_status(
        server,
        json!({"upload_status": "readyToBePublished", "release_distinct_id": 1}),
        1,
    )
    .await;
}

/// Abort PATCH answering `status`
pub async fn mount_abort(server: &MockServer, status: u16, expected: u64) {
    Mock::given(method("PATCH"))
        .and(path(app_path(&format!("release_uploads/{UPLOAD_ID}"))))
        .respond_with(ResponseTemplate::new(status))
        .expect(expected)
        .mount(server)
        .await;
}

/// Publish PATCH
pub async fn mount_publish(server: &MockServer, expected: u64) {
    Mock::given(method("PATCH"))
        .and(path(app_path(&format!("releases/{RELEASE_ID}"))))
        .respond_with(ResponseTemplate::new(200))
        .expect(expected)
        .mount(server)
        .await;
}

/// Requests received for `method` + `path`, in arrival order
pub async fn requests_to(server: &MockServer, http_method: &str, request_path: &str) -> Vec<Request> {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .into_iter()
        .filter(|r| r.method.as_str() == http_method && r.url.path() == request_path)
        .collect()
}

/// Position of the first matching request in the arrival order
pub async fn first_index_of(server: &MockServer, http_method: &str, request_path: &str) -> Option<usize> {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .position(|r| r.method.as_str() == http_method && r.url.path() == request_path)
}
