//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` variants into user-facing errors with actionable help text.

use miette::Diagnostic;
use thiserror::Error;

use zymbit_core::CoreError;

/// Process exit codes.
pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const AUTH: i32 = 3;
    pub const NOT_FOUND: i32 = 4;
    pub const CONNECTION: i32 = 7;
    pub const TIMEOUT: i32 = 8;
    pub const NOT_PROVISIONED: i32 = 9;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Identity ─────────────────────────────────────────────────────
    #[error("Could not determine a client id for this host")]
    #[diagnostic(
        code(zymbit::no_interface),
        help(
            "No physical network interface with a MAC address was found.\n\
             Set CLIENT_ID to use an explicit identifier."
        )
    )]
    NoInterface,

    // ── Connection ───────────────────────────────────────────────────
    #[error("Could not connect to {url}")]
    #[diagnostic(
        code(zymbit::connection_failed),
        help(
            "Check network connectivity and the configured api_url.\n\
             Run: zymbit config show"
        )
    )]
    ConnectionFailed {
        url: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Request timed out after {seconds}s")]
    #[diagnostic(
        code(zymbit::timeout),
        help("Increase timeout with --timeout or check the API's responsiveness.")
    )]
    Timeout { seconds: u64 },

    #[error("Message stream failed: {message}")]
    #[diagnostic(
        code(zymbit::stream),
        help("Check websocket_url, or retry with: zymbit client --reconnect")
    )]
    Stream { message: String },

    // ── Authentication ───────────────────────────────────────────────
    #[error("Authentication failed: {message}")]
    #[diagnostic(
        code(zymbit::auth_failed),
        help(
            "The token was rejected.\n\
             Re-provision with: zymbit provision <token> --clean\n\
             Response body:\n{body}"
        )
    )]
    AuthFailed { message: String, body: String },

    // ── Resources ────────────────────────────────────────────────────
    #[error("{resource_type} '{identifier}' not found")]
    #[diagnostic(
        code(zymbit::not_found),
        help("Run: zymbit devices to see available devices")
    )]
    NotFound {
        resource_type: String,
        identifier: String,
    },

    #[error("Device '{hostname}' has no SSH tunnel")]
    #[diagnostic(
        code(zymbit::no_tunnel),
        help("The device is registered but its tunnel is not up. Check that it is online.")
    )]
    NoTunnel { hostname: String },

    // ── API ──────────────────────────────────────────────────────────
    #[error("API error (HTTP {status}): {message}")]
    #[diagnostic(code(zymbit::api_error), help("Response body:\n{body}"))]
    Api {
        status: u16,
        message: String,
        body: String,
    },

    // ── Configuration ────────────────────────────────────────────────
    #[error("This device is not provisioned")]
    #[diagnostic(
        code(zymbit::not_provisioned),
        help(
            "Provision it with: zymbit provision <token>\n\
             Expected config at: {path}"
        )
    )]
    NotProvisioned { path: String },

    #[error("Configuration error: {message}")]
    #[diagnostic(code(zymbit::config))]
    Config { message: String },

    // ── Process ──────────────────────────────────────────────────────
    #[error("Failed to launch {program}")]
    #[diagnostic(
        code(zymbit::exec),
        help("Make sure an OpenSSH client is installed, or point ZYMBIT_SSH at one.")
    )]
    Exec {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Internal error: {0}")]
    #[diagnostic(code(zymbit::internal))]
    Internal(String),

    // ── IO / Serialization ───────────────────────────────────────────
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ConnectionFailed { .. } | Self::Stream { .. } => exit_code::CONNECTION,
            Self::AuthFailed { .. } => exit_code::AUTH,
            Self::NotFound { .. } | Self::NoTunnel { .. } => exit_code::NOT_FOUND,
            Self::Timeout { .. } => exit_code::TIMEOUT,
            Self::Config { .. } => exit_code::USAGE,
            Self::NotProvisioned { .. } => exit_code::NOT_PROVISIONED,
            _ => exit_code::GENERAL,
        }
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::NoInterfaceFound => CliError::NoInterface,

            CoreError::ConnectionFailed { url, reason } => CliError::ConnectionFailed {
                url,
                source: reason.into(),
            },

            CoreError::Timeout { timeout_secs } => CliError::Timeout {
                seconds: timeout_secs,
            },

            CoreError::AuthenticationFailed { message, body } => CliError::AuthFailed {
                message,
                body: render_body(&body),
            },

            CoreError::Api {
                status,
                message,
                body,
            } => CliError::Api {
                status,
                message,
                body: render_body(&body),
            },

            CoreError::DeviceNotFound { hostname } => CliError::NotFound {
                resource_type: "device".into(),
                identifier: hostname,
            },

            CoreError::NoTunnelPort { hostname } => CliError::NoTunnel { hostname },

            CoreError::Exec { program, source } => CliError::Exec { program, source },

            CoreError::NotProvisioned { path } => CliError::NotProvisioned { path },

            CoreError::Config { message } => CliError::Config { message },

            CoreError::Stream { message } => CliError::Stream { message },

            CoreError::Internal(message) => CliError::Internal(message),
        }
    }
}

fn render_body(body: &serde_json::Value) -> String {
    serde_json::to_string_pretty(body).unwrap_or_else(|_| body.to_string())
}

impl From<zymbit_config::ConfigError> for CliError {
    fn from(err: zymbit_config::ConfigError) -> Self {
        CoreError::from(err).into()
    }
}
