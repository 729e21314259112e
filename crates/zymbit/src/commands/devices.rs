//! `zymbit devices`

use tabled::Tabled;
use zymbit_core::{ApiClient, CoreError, DeviceRecord};

use crate::cli::GlobalOpts;
use crate::error::CliError;
use crate::output;

#[derive(Tabled)]
struct DeviceRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Hostname")]
    hostname: String,
    #[tabled(rename = "SSH Port")]
    ssh_port: String,
}

impl From<&DeviceRecord> for DeviceRow {
    fn from(d: &DeviceRecord) -> Self {
        Self {
            id: d.id.to_string(),
            hostname: d.hostname.clone(),
            ssh_port: d.ssh_port.map_or_else(|| "-".into(), |p| p.to_string()),
        }
    }
}

pub async fn handle(api: &ApiClient, global: &GlobalOpts) -> Result<(), CliError> {
    let devices = api.list_devices().await.map_err(CoreError::from)?;

    let out = output::render_list(
        &global.output,
        &devices,
        |d| DeviceRow::from(d),
        |d| d.hostname.clone(),
    )?;
    output::print_output(&out, global.quiet);
    Ok(())
}
