// HTTP client for the Zymbit control-plane API.
//
// Wraps `reqwest::Client` with base-URL joining, token and client-id
// headers, and typed error mapping. Every request is attempted exactly
// once; callers decide how to report failures.

use reqwest::Method;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderName, HeaderValue};
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;
use url::Url;

use crate::error::Error;
use crate::models::{ConfirmRegistration, DeviceRecord};
use crate::transport::TransportConfig;

/// Header carrying the resolved client id of the calling device.
pub const CLIENT_ID_HEADER: &str = "x-client-id";

/// Status and body of a successful (2xx) response.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: u16,
    pub body: String,
}

impl ApiResponse {
    /// Deserialize the body as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, Error> {
        serde_json::from_str(&self.body).map_err(|e| {
            let preview: String = self.body.chars().take(200).collect();
            Error::Deserialization {
                message: format!("{e} (body preview: {preview:?})"),
                body: self.body.clone(),
            }
        })
    }
}

/// Build the auth headers shared by the REST client and the message stream.
///
/// The token goes out as `Authorization: Token <token>` and is marked
/// sensitive so it never shows up in debug output.
pub fn auth_headers(
    token: Option<&SecretString>,
    client_id: Option<&str>,
) -> Result<HeaderMap, Error> {
    let mut headers = HeaderMap::new();

    if let Some(token) = token {
        let mut value = HeaderValue::from_str(&format!("Token {}", token.expose_secret()))
            .map_err(|e| Error::InvalidToken(e.to_string()))?;
        value.set_sensitive(true);
        headers.insert(AUTHORIZATION, value);
    }

    if let Some(id) = client_id {
        let value =
            HeaderValue::from_str(id).map_err(|e| Error::InvalidToken(format!("client id: {e}")))?;
        headers.insert(HeaderName::from_static(CLIENT_ID_HEADER), value);
    }

    Ok(headers)
}

/// Async client for the control-plane REST API.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: Url,
    client_id: Option<String>,
    timeout_secs: u64,
}

impl ApiClient {
    // ── Constructors ─────────────────────────────────────────────────

    /// Build a client for `base_url`, authenticating with `token`.
    pub fn new(
        base_url: &str,
        token: Option<&SecretString>,
        client_id: Option<&str>,
        transport: &TransportConfig,
    ) -> Result<Self, Error> {
        let headers = auth_headers(token, client_id)?;
        let http = transport.build_client(headers)?;
        Ok(Self {
            http,
            base_url: Self::normalize_base_url(base_url)?,
            client_id: client_id.map(String::from),
            timeout_secs: transport.timeout.as_secs(),
        })
    }

    /// Wrap an existing `reqwest::Client` (caller manages headers).
    pub fn from_reqwest(base_url: &str, http: reqwest::Client) -> Result<Self, Error> {
        Ok(Self {
            http,
            base_url: Self::normalize_base_url(base_url)?,
            client_id: None,
            timeout_secs: crate::transport::DEFAULT_TIMEOUT.as_secs(),
        })
    }

    /// Ensure the base path ends with `/` so relative joins append to it
    /// (`https://host/v2` + `zymbots` → `https://host/v2/zymbots`).
    fn normalize_base_url(raw: &str) -> Result<Url, Error> {
        let mut url = Url::parse(raw)?;
        if !url.path().ends_with('/') {
            let path = format!("{}/", url.path());
            url.set_path(&path);
        }
        Ok(url)
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn client_id(&self) -> Option<&str> {
        self.client_id.as_deref()
    }

    fn url(&self, endpoint: &str) -> Result<Url, Error> {
        Ok(self.base_url.join(endpoint.trim_start_matches('/'))?)
    }

    // ── Core request ─────────────────────────────────────────────────

    /// Send `method` to `endpoint` with an optional JSON body.
    ///
    /// 2xx responses are returned as-is; anything else becomes
    /// [`Error::Api`] with the parsed error body.
    pub async fn request<B: Serialize + Sync + ?Sized>(
        &self,
        method: Method,
        endpoint: &str,
        body: Option<&B>,
    ) -> Result<ApiResponse, Error> {
        let url = self.url(endpoint)?;
        self.send(method, url, body).await
    }

    async fn send<B: Serialize + Sync + ?Sized>(
        &self,
        method: Method,
        url: Url,
        body: Option<&B>,
    ) -> Result<ApiResponse, Error> {
        debug!("{method} {url}");

        let mut req = self.http.request(method, url.clone());
        if let Some(body) = body {
            req = req.json(body);
        }

        let resp = req.send().await.map_err(|e| self.map_send_error(&url, e))?;
        let status = resp.status();
        let text = resp.text().await.map_err(|e| self.map_send_error(&url, e))?;
        debug!(status = status.as_u16(), bytes = text.len(), "response received");

        if status.is_success() {
            Ok(ApiResponse {
                status: status.as_u16(),
                body: text,
            })
        } else {
            Err(parse_error(status, text))
        }
    }

    fn map_send_error(&self, url: &Url, err: reqwest::Error) -> Error {
        if err.is_timeout() {
            Error::Timeout {
                timeout_secs: self.timeout_secs,
            }
        } else if err.is_connect() {
            Error::Connection {
                url: url.to_string(),
                source: err,
            }
        } else {
            Error::Transport(err)
        }
    }

    // ━━ Public API ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    /// `POST /registration/{code}/confirm`
    ///
    /// The code always travels as one percent-encoded path segment.
    pub async fn confirm_registration(&self, code: &str) -> Result<ApiResponse, Error> {
        let url = self.registration_url(code)?;
        let body = ConfirmRegistration {
            client_id: self.client_id.as_deref(),
        };
        self.send(Method::POST, url, Some(&body)).await
    }

    fn registration_url(&self, code: &str) -> Result<Url, Error> {
        if matches!(code.trim(), "" | "." | "..") {
            return Err(Error::InvalidToken(format!(
                "{code:?} is not a usable registration code"
            )));
        }

        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| Error::InvalidUrl(url::ParseError::RelativeUrlWithCannotBeABaseBase))?
            .pop_if_empty()
            .extend(["registration", code, "confirm"]);
        Ok(url)
    }

    /// `GET /zymbots`
    pub async fn list_devices(&self) -> Result<Vec<DeviceRecord>, Error> {
        self.request::<()>(Method::GET, "zymbots", None)
            .await?
            .json()
    }
}

// ── Error body parsing ───────────────────────────────────────────────

fn parse_error(status: reqwest::StatusCode, raw: String) -> Error {
    let body = serde_json::from_str::<serde_json::Value>(&raw)
        .unwrap_or_else(|_| serde_json::Value::String(raw.clone()));

    let message = error_message(&body).unwrap_or_else(|| {
        if raw.is_empty() {
            status.to_string()
        } else {
            raw.clone()
        }
    });

    Error::Api {
        status: status.as_u16(),
        message,
        body,
    }
}

/// Pull a human-readable message out of the common error body shapes:
/// `{"detail": ..}`, `{"message": ..}`, `{"error": ..}`.
fn error_message(body: &serde_json::Value) -> Option<String> {
    ["detail", "message", "error"]
        .iter()
        .find_map(|key| body.get(key).and_then(serde_json::Value::as_str))
        .map(String::from)
}
