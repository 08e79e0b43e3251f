//! HTTP envelope for the distribution REST API
//!
//! One request in, one classified response out: the body is read as text,
//! traced at debug level with the status code, decoded as JSON when possible,
//! and non-2xx statuses become [`Error::Http`]. Retries are the caller's
//! business.

use crate::config::HttpConfig;
use crate::error::{Error, Result};
use reqwest::Method;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

/// Value of the `internal-request-source` header
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum RequestSource {
    /// Regular pipeline build
    #[default]
    Vsts,
    /// Build started by App Center (commit message available)
    VstsAppCenter,
}

impl RequestSource {
    /// Header value
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestSource::Vsts => "VSTS",
            RequestSource::VstsAppCenter => "VSTS-APPCENTER",
        }
    }
}

/// Distribution API endpoint and credentials
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ApiEndpoint {
    /// Server URL without trailing slash (e.g. `https://api.appcenter.ms`)
    pub server: String,
    /// API version path segment (e.g. `v0.1`)
    pub version: String,
    /// API token sent as `X-API-Token`
    pub token: String,
}

impl ApiEndpoint {
    /// Split an endpoint URL at its last `/` into server and version
    ///
    /// `https://api.appcenter.ms/v0.1` becomes server `https://api.appcenter.ms`
    /// and version `v0.1`.
    pub fn from_url(url: &str, token: impl Into<String>) -> Result<Self> {
        let trimmed = url.trim_end_matches('/');
        let (server, version) = trimmed.rsplit_once('/').ok_or_else(|| {
            Error::config(
                format!("endpoint url {url} has no API version segment"),
                "serverEndpoint",
            )
        })?;
        Ok(Self {
            server: server.to_string(),
            version: version.to_string(),
            token: token.into(),
        })
    }

    /// `{server}/{version}/apps/{slug}/{path}`
    pub fn app_url(&self, app_slug: &str, path: &str) -> String {
        format!("{}/{}/apps/{}/{}", self.server, self.version, app_slug, path)
    }
}

/// Decoded response body
#[derive(Clone, Debug, PartialEq)]
pub enum ResponseBody {
    /// No body
    Empty,
    /// Body parsed as JSON
    Json(serde_json::Value),
    /// Body that is not JSON
    Text(String),
}

/// A successful (2xx) response
#[derive(Clone, Debug)]
pub struct ApiResponse {
    /// HTTP status code
    pub status: u16,
    /// Decoded body
    pub body: ResponseBody,
}

impl ApiResponse {
    /// Deserialize the JSON body into `T`
    ///
    /// `operation` names the API call in the contract error raised when the
    /// body is missing or has the wrong shape.
    pub fn json<T: DeserializeOwned>(self, operation: &str) -> Result<T> {
        match self.body {
            ResponseBody::Json(value) => serde_json::from_value(value)
                .map_err(|e| Error::contract(operation, "body", e.to_string())),
            ResponseBody::Text(text) => Err(Error::contract(
                operation,
                "body",
                format!("is not JSON: {text}"),
            )),
            ResponseBody::Empty => Err(Error::contract(operation, "body", "is empty")),
        }
    }
}

/// REST client for the distribution API (cheap to clone)
#[derive(Clone, Debug)]
pub struct ApiClient {
    http: reqwest::Client,
    endpoint: ApiEndpoint,
    user_agent: String,
}

impl ApiClient {
    /// Create a client with its own connection pool
    pub fn new(endpoint: ApiEndpoint, user_agent: impl Into<String>, config: &HttpConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;
        Ok(Self::with_client(http, endpoint, user_agent))
    }

    /// Create a client sharing an existing `reqwest::Client`
    pub fn with_client(
        http: reqwest::Client,
        endpoint: ApiEndpoint,
        user_agent: impl Into<String>,
    ) -> Self {
        Self {
            http,
            endpoint,
            user_agent: user_agent.into(),
        }
    }

    /// The configured endpoint
    pub fn endpoint(&self) -> &ApiEndpoint {
        &self.endpoint
    }

    /// The underlying HTTP client (shared with the uploaders)
    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    /// Send one request and classify the response
    pub async fn send<B: Serialize + ?Sized>(
        &self,
        method: Method,
        url: &str,
        body: Option<&B>,
        source: RequestSource,
    ) -> Result<ApiResponse> {
        debug!(%method, url, "sending request");

        let mut request = self
            .http
            .request(method, url)
            .header("X-API-Token", &self.endpoint.token)
            .header(reqwest::header::USER_AGENT, &self.user_agent)
            .header("internal-request-source", source.as_str());

        if let Some(body) = body {
            request = request
                .header(reqwest::header::CONTENT_TYPE, "application/json")
                .body(serde_json::to_vec(body)?);
        }

        let response = request.send().await?;
        let status = response.status().as_u16();
        let text = response.text().await?;

        debug!(status, body = %text, "http call completed");

        if !(200..300).contains(&status) {
            return Err(Error::Http { status, body: text });
        }

        Ok(ApiResponse {
            status,
            body: decode_body(text),
        })
    }

    /// GET with the default request source
    pub async fn get(&self, url: &str) -> Result<ApiResponse> {
        self.send::<()>(Method::GET, url, None, RequestSource::Vsts)
            .await
    }

    /// POST with an optional JSON body
    pub async fn post<B: Serialize + ?Sized>(&self, url: &str, body: Option<&B>) -> Result<ApiResponse> {
        self.send(Method::POST, url, body, RequestSource::Vsts).await
    }

    /// PATCH with a JSON body
    pub async fn patch<B: Serialize + ?Sized>(
        &self,
        url: &str,
        body: &B,
        source: RequestSource,
    ) -> Result<ApiResponse> {
        self.send(Method::PATCH, url, Some(body), source).await
    }
}

fn decode_body(text: String) -> ResponseBody {
    if text.trim().is_empty() {
        return ResponseBody::Empty;
    }
    match serde_json::from_str(&text) {
        Ok(value) => ResponseBody::Json(value),
        Err(_) => ResponseBody::Text(text),
    }
}
