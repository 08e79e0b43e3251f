//! Pipeline variables and files shared by the integration tests

use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// App the tests publish to
pub const APP_SLUG: &str = "testuser/testapp";
/// API token configured on the test endpoint
pub const API_TOKEN: &str = "mytoken123";
/// Upload id handed out by "begin release upload"
pub const UPLOAD_ID: &str = "upload-1";
/// Asset id on the upload domain
pub const ASSET_ID: &str = "asset-1";
/// Upload token (already URL-encoded)
pub const UPLOAD_TOKEN: &str = "tok123";
/// Release id reported once the release is ready
pub const RELEASE_ID: &str = "1";
/// Chunk size announced by the upload domain
pub const CHUNK_SIZE: u64 = 4;
/// Content of the fake binary (three chunks)
pub const APP_CONTENT: &[u8] = b"0123456789";

/// Write the fake binary into `dir`
pub fn write_app(dir: &Path) -> PathBuf {
    let path = dir.join("app-release.apk");
    std::fs::write(&path, APP_CONTENT).expect("write app binary");
    path
}

/// Task inputs and build variables of the reference pipeline run
pub fn pipeline_vars(server_uri: &str) -> HashMap<String, String> {
    [
        ("INPUT_SERVERENDPOINT", "MyTestEndpoint".to_string()),
        ("ENDPOINT_URL_MyTestEndpoint", format!("{server_uri}/v0.1")),
        (
            "ENDPOINT_AUTH_PARAMETER_MyTestEndpoint_APITOKEN",
            API_TOKEN.to_string(),
        ),
        ("INPUT_APPSLUG", APP_SLUG.to_string()),
        ("INPUT_APP", "*.apk".to_string()),
        ("INPUT_RELEASENOTESSELECTION", "input".to_string()),
        ("INPUT_RELEASENOTESINPUT", "my release notes".to_string()),
        ("INPUT_ISMANDATORY", "true".to_string()),
        ("BUILD_BUILDID", "2".to_string()),
        ("BUILD_SOURCEBRANCH", "refs/heads/master".to_string()),
        ("BUILD_SOURCEVERSION", "commitsha".to_string()),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v))
    .collect()
}
