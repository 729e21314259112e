// ── Wire models for the control-plane API ──
//
// Only the fields the client acts on are typed. Everything else the
// server sends is kept in `extra` so `devices -o json` shows it all.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifier of a remote device. The API has used both numeric and
/// string ids, so both are accepted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DeviceId {
    Numeric(u64),
    Text(String),
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Numeric(n) => write!(f, "{n}"),
            Self::Text(s) => write!(f, "{s}"),
        }
    }
}

/// A device as listed by `GET /zymbots`. Read-only for the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceRecord {
    pub id: DeviceId,

    pub hostname: String,

    /// Port on the tunnel relay host forwarding to this device's sshd.
    /// Absent or null for devices without an open tunnel.
    #[serde(default)]
    pub ssh_port: Option<u16>,

    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl DeviceRecord {
    /// Case-insensitive hostname comparison used for tunnel lookups.
    pub fn matches_hostname(&self, hostname: &str) -> bool {
        self.hostname.eq_ignore_ascii_case(hostname)
    }
}

/// Request body for `POST /registration/{code}/confirm`.
#[derive(Debug, Clone, Serialize)]
pub struct ConfirmRegistration<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_id: Option<&'a str>,
}
