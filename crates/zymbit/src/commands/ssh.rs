//! `zymbit ssh [-u user] <hostname>`

use zymbit_core::{ApiClient, ProcessExec, SshTunnelLauncher};

use crate::cli::SshArgs;
use crate::error::CliError;

/// Overrides the relay host devices tunnel to.
pub const RELAY_HOST_ENV: &str = "ZYMBIT_RELAY_HOST";

/// Overrides the ssh executable.
pub const SSH_PROGRAM_ENV: &str = "ZYMBIT_SSH";

/// On unix this only returns on failure: the process becomes `ssh`.
pub async fn handle(api: &ApiClient, args: SshArgs) -> Result<(), CliError> {
    let mut launcher = SshTunnelLauncher::default();
    if let Ok(host) = std::env::var(RELAY_HOST_ENV) {
        launcher = launcher.with_relay_host(host);
    }
    if let Ok(program) = std::env::var(SSH_PROGRAM_ENV) {
        launcher = launcher.with_ssh_program(program);
    }

    let code = launcher
        .run(api, &args.hostname, &args.user, &ProcessExec)
        .await?;

    if code != 0 {
        std::process::exit(code);
    }
    Ok(())
}
