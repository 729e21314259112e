//! CLI configuration: glue between `GlobalOpts`, the config store and the
//! API client.

use std::sync::Arc;
use std::time::Duration;

use zymbit_core::{
    ApiClient, ClientIdResolver, ConfigStore, CoreError, ProvisionConfig, TlsMode,
    TransportConfig,
};

use crate::cli::GlobalOpts;
use crate::error::CliError;

/// Config store at `--config` / `ZYMBIT_CONFIG`, or the platform path.
pub fn store(global: &GlobalOpts) -> ConfigStore {
    global
        .config
        .clone()
        .map_or_else(ConfigStore::at_default_path, ConfigStore::new)
}

/// Load the provisioned config; fails when the device is not provisioned.
pub fn load(global: &GlobalOpts) -> Result<ProvisionConfig, CliError> {
    Ok(store(global).load()?)
}

pub fn transport(global: &GlobalOpts, verify_tls: bool) -> TransportConfig {
    TransportConfig::new(
        TlsMode::from_verify(verify_tls),
        Duration::from_secs(global.timeout),
    )
}

/// Build an API client for `config`, identifying this host by its client id.
pub async fn api_client(
    config: &ProvisionConfig,
    resolver: &Arc<ClientIdResolver>,
    global: &GlobalOpts,
) -> Result<ApiClient, CoreError> {
    let identity = Arc::clone(resolver).get_client_id_async().await?;
    tracing::debug!(client_id = %identity.client_id, source = %identity.resolved_from, "using client id");

    client_for(config, &identity.client_id, global)
}

/// Build an API client for `config` with an already resolved client id.
pub fn client_for(
    config: &ProvisionConfig,
    client_id: &str,
    global: &GlobalOpts,
) -> Result<ApiClient, CoreError> {
    Ok(ApiClient::new(
        &config.api_url,
        Some(&config.token()),
        Some(client_id),
        &transport(global, config.verify_tls),
    )?)
}
