//! Domain logic for the zymbit device client.
//!
//! - [`identity`]: hardware-derived client id
//! - [`provision`]: token confirmation and config persistence
//! - [`tunnel`]: device lookup and `ssh` through the relay host
//! - [`printer`]: background console printer
//!
//! HTTP and WebSocket plumbing lives in `zymbit-api`; the config file in
//! `zymbit-config`. Both are re-exported where callers need them.

pub mod error;
pub mod identity;
pub mod printer;
pub mod provision;
pub mod remote;
pub mod tunnel;

pub use error::CoreError;
pub use identity::{ClientIdResolver, DeviceIdentity, IdentitySource, MacAddress};
pub use printer::{MessageSource, Printer, PrinterHandle, PrinterState, SourcePoll};
pub use provision::{ProvisionOutcome, ProvisionProcess, ProvisionRequest};
pub use remote::{DeviceDirectory, Registrar};
pub use tunnel::{Action, Exec, ProcessExec, SshTunnelLauncher};

pub use zymbit_api::{
    ApiClient, DeviceRecord, EventStream, ReconnectConfig, TlsMode, TransportConfig,
};
pub use zymbit_config::{ConfigStore, ProvisionConfig};
