// ── Core error types ──
//
// User-facing errors from zymbit-core. Consumers never match on HTTP
// transport details; the `From<zymbit_api::Error>` impl translates them
// into domain variants. API error bodies are kept intact so the CLI can
// print them verbatim.

use thiserror::Error;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Identity ─────────────────────────────────────────────────────
    #[error("No usable network interface found to derive a client id")]
    NoInterfaceFound,

    // ── Connection errors ────────────────────────────────────────────
    #[error("Cannot connect to {url}: {reason}")]
    ConnectionFailed { url: String, reason: String },

    #[error("Request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    #[error("Authentication failed: {message}")]
    AuthenticationFailed {
        message: String,
        /// Parsed error body of the rejecting response.
        body: serde_json::Value,
    },

    // ── API errors ───────────────────────────────────────────────────
    #[error("API error (HTTP {status}): {message}")]
    Api {
        status: u16,
        message: String,
        /// Parsed error body as returned by the server.
        body: serde_json::Value,
    },

    // ── Tunnel ───────────────────────────────────────────────────────
    #[error("No device with hostname '{hostname}'")]
    DeviceNotFound { hostname: String },

    #[error("Device '{hostname}' has no SSH tunnel port")]
    NoTunnelPort { hostname: String },

    #[error("Failed to execute {program}: {source}")]
    Exec {
        program: String,
        #[source]
        source: std::io::Error,
    },

    // ── Configuration ────────────────────────────────────────────────
    #[error("Device is not provisioned (expected config at {path})")]
    NotProvisioned { path: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    // ── Message stream ───────────────────────────────────────────────
    #[error("Message stream error: {message}")]
    Stream { message: String },

    #[error("Internal error: {0}")]
    Internal(String),
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<zymbit_api::Error> for CoreError {
    fn from(err: zymbit_api::Error) -> Self {
        match err {
            zymbit_api::Error::Connection { url, source } => CoreError::ConnectionFailed {
                url,
                reason: source.to_string(),
            },
            zymbit_api::Error::Timeout { timeout_secs } => CoreError::Timeout { timeout_secs },
            zymbit_api::Error::Api {
                status: status @ (401 | 403),
                message,
                body,
            } => CoreError::AuthenticationFailed {
                message: format!("HTTP {status}: {message}"),
                body,
            },
            zymbit_api::Error::Api {
                status,
                message,
                body,
            } => CoreError::Api {
                status,
                message,
                body,
            },
            zymbit_api::Error::Transport(e) => CoreError::ConnectionFailed {
                url: e.url().map(ToString::to_string).unwrap_or_default(),
                reason: e.to_string(),
            },
            zymbit_api::Error::InvalidUrl(e) => CoreError::Config {
                message: format!("Invalid URL: {e}"),
            },
            zymbit_api::Error::Tls(msg) => CoreError::ConnectionFailed {
                url: String::new(),
                reason: format!("TLS error: {msg}"),
            },
            zymbit_api::Error::InvalidToken(msg) => CoreError::Config {
                message: format!("Invalid token: {msg}"),
            },
            zymbit_api::Error::WebSocketConnect(reason) => CoreError::Stream {
                message: format!("connection failed: {reason}"),
            },
            zymbit_api::Error::WebSocketClosed { code, reason } => CoreError::Stream {
                message: format!("closed (code {code}): {reason}"),
            },
            zymbit_api::Error::Deserialization { message, body: _ } => {
                CoreError::Internal(format!("Deserialization error: {message}"))
            }
        }
    }
}

impl From<zymbit_config::ConfigError> for CoreError {
    fn from(err: zymbit_config::ConfigError) -> Self {
        match err {
            zymbit_config::ConfigError::NotProvisioned { path } => CoreError::NotProvisioned {
                path: path.display().to_string(),
            },
            other => CoreError::Config {
                message: other.to_string(),
            },
        }
    }
}

impl CoreError {
    /// HTTP status for API-originated errors.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => Some(*status),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn rejected_credentials_keep_the_response_body() {
        let err = CoreError::from(zymbit_api::Error::Api {
            status: 403,
            message: "Forbidden".into(),
            body: json!({ "detail": "Forbidden", "hint": "token revoked at 12:00" }),
        });
        match err {
            CoreError::AuthenticationFailed { message, body } => {
                assert_eq!(message, "HTTP 403: Forbidden");
                assert_eq!(body["hint"], "token revoked at 12:00");
            }
            other => panic!("expected AuthenticationFailed, got {other:?}"),
        }
    }
}
