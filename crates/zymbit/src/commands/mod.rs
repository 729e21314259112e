//! Command dispatch: bridges CLI args -> core operations -> output.

pub mod client;
pub mod config_cmd;
pub mod confirm;
pub mod devices;
pub mod provision;
pub mod ssh;

use std::sync::Arc;

use zymbit_core::{ApiClient, ClientIdResolver};

use crate::cli::{Command, GlobalOpts};
use crate::config;
use crate::error::CliError;

/// Dispatch a command that needs a provisioned device.
pub async fn dispatch(cmd: Command, global: &GlobalOpts) -> Result<(), CliError> {
    let cfg = config::load(global)?;
    let resolver = Arc::new(ClientIdResolver::from_env());

    match cmd {
        Command::Confirm(args) => {
            let api = connect(&cfg, &resolver, global).await?;
            confirm::handle(&api, args, global).await
        }
        Command::Ssh(args) => {
            let api = connect(&cfg, &resolver, global).await?;
            ssh::handle(&api, args).await
        }
        Command::Devices => {
            let api = connect(&cfg, &resolver, global).await?;
            devices::handle(&api, global).await
        }
        Command::Client(args) => client::handle(&cfg, &resolver, &args, global).await,
        // Provision, Config and Completions are handled before dispatch
        Command::Provision(_) | Command::Config(_) | Command::Completions(_) => {
            Err(CliError::Internal("command dispatched twice".into()))
        }
    }
}

async fn connect(
    cfg: &zymbit_core::ProvisionConfig,
    resolver: &Arc<ClientIdResolver>,
    global: &GlobalOpts,
) -> Result<ApiClient, CliError> {
    Ok(config::api_client(cfg, resolver, global).await?)
}
