// Async HTTP client for the Overseerr settings API.
//
// Base path: /api/v1/
// Auth: X-Api-Key header

use reqwest::header::{HeaderMap, HeaderValue};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use crate::error::ClientError;

/// Header carrying the Overseerr API key.
pub const API_KEY_HEADER: &str = "X-Api-Key";

const MAIN_SETTINGS_PATH: &str = "api/v1/settings/main";

/// The global "main" settings object as exchanged with Overseerr.
///
/// Every field is optional on the wire; absent fields read as the
/// type's zero value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MainSettings {
    /// Server API key. Returned by the server, never sent back.
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,
    /// Interface language.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_language: Option<String>,
    /// Instance name shown in the UI.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub application_title: Option<String>,
    /// Public URL of the instance.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub application_url: Option<String>,
    /// Whether to trust proxy headers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trust_proxy: Option<bool>,
    /// Whether CSRF protection is enabled.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub csrf_protection: Option<bool>,
    /// Whether available media is hidden from discovery.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hide_available: Option<bool>,
    /// Whether partial series requests are allowed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partial_requests_enabled: Option<bool>,
    /// Whether local (email) sign-in is enabled.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_login: Option<bool>,
    /// Whether new Plex users may sign in.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_plex_login: Option<bool>,
    /// Permission bitmask granted to new users.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_permissions: Option<f32>,
}

#[derive(Deserialize)]
struct ErrorResponse {
    #[serde(default)]
    message: Option<String>,
}

/// Async client for the Overseerr REST API.
///
/// Built once per provider configuration and shared read-only by every
/// resource. Dropping an in-flight call future aborts the request.
#[derive(Debug, Clone)]
pub struct OverseerrClient {
    http: reqwest::Client,
    base_url: Url,
}

impl OverseerrClient {
    /// Build a client for `base_url` that sends `api_key` on every request.
    ///
    /// The URL must carry scheme, host and port, without an `/api` suffix.
    /// No request is made here.
    pub fn new(base_url: &str, api_key: &str) -> Result<Self, ClientError> {
        let mut headers = HeaderMap::new();
        let mut key_value = HeaderValue::from_str(api_key)
            .map_err(|e| ClientError::InvalidHeader(format!("invalid API key header value: {e}")))?;
        key_value.set_sensitive(true);
        headers.insert(API_KEY_HEADER, key_value);

        let http = reqwest::Client::builder()
            .user_agent(concat!("terraform-provider-overseerr/", env!("CARGO_PKG_VERSION")))
            .default_headers(headers)
            .build()?;

        Self::from_reqwest(base_url, http)
    }

    /// Wrap an existing `reqwest::Client` (caller manages auth headers).
    pub fn from_reqwest(base_url: &str, http: reqwest::Client) -> Result<Self, ClientError> {
        let base_url = Self::normalize_base_url(base_url)?;
        Ok(Self { http, base_url })
    }

    /// The base URL every request path is joined onto.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn normalize_base_url(raw: &str) -> Result<Url, ClientError> {
        let mut url = Url::parse(raw)?;
        let path = url.path().trim_end_matches('/').to_owned();
        url.set_path(&format!("{path}/"));
        Ok(url)
    }

    fn url(&self, path: &str) -> Result<Url, ClientError> {
        Ok(self.base_url.join(path)?)
    }

    // ── Settings ─────────────────────────────────────────────────────

    /// Fetch the current main settings.
    pub async fn get_main_settings(&self) -> Result<MainSettings, ClientError> {
        self.get(MAIN_SETTINGS_PATH).await
    }

    /// Commit the main settings and return the server's resulting object.
    ///
    /// The endpoint is an upsert: it serves both first application and
    /// later changes.
    pub async fn create_main_settings(
        &self,
        settings: &MainSettings,
    ) -> Result<MainSettings, ClientError> {
        self.post(MAIN_SETTINGS_PATH, settings).await
    }

    // ── HTTP verbs ───────────────────────────────────────────────────

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ClientError> {
        let url = self.url(path)?;
        debug!("GET {url}");

        let resp = self.http.get(url).send().await?;
        handle_response(resp).await
    }

    async fn post<T: DeserializeOwned, B: Serialize + Sync>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ClientError> {
        let url = self.url(path)?;
        debug!("POST {url}");

        let resp = self.http.post(url).json(body).send().await?;
        handle_response(resp).await
    }
}

// ── Response handling ────────────────────────────────────────────────

async fn handle_response<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T, ClientError> {
    let status = resp.status();
    if status.is_success() {
        let body = resp.text().await?;
        serde_json::from_str(&body).map_err(|e| {
            let preview: String = body.chars().take(200).collect();
            ClientError::Deserialization {
                message: format!("{e} (body preview: {preview:?})"),
                body,
            }
        })
    } else {
        Err(parse_error(status, resp).await)
    }
}

async fn parse_error(status: reqwest::StatusCode, resp: reqwest::Response) -> ClientError {
    if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
        return ClientError::InvalidApiKey;
    }

    let raw = resp.text().await.unwrap_or_default();
    let message = match serde_json::from_str::<ErrorResponse>(&raw) {
        Ok(ErrorResponse { message: Some(message) }) => message,
        _ if raw.is_empty() => status.to_string(),
        _ => raw,
    };

    ClientError::Api {
        status: status.as_u16(),
        message,
    }
}
