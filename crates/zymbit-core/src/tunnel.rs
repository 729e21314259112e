// ── SSH through the relay ──
//
// Every provisioned device keeps a reverse tunnel open on the relay host.
// Connecting to a device means looking up its tunnel port and handing the
// terminal over to `ssh -p <port> -l <user> <relay>`.

use std::process::Command;

use crate::error::CoreError;
use crate::remote::DeviceDirectory;

/// Host that terminates device tunnels.
pub const RELAY_HOST: &str = "tunnel.zymbit.com";

pub const DEFAULT_SSH_USER: &str = "zymbit";

pub const SSH_PROGRAM: &str = "ssh";

/// What the launcher wants done once the lookup succeeded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Replace the current process with `argv`.
    ExecReplace { argv: Vec<String> },
}

/// Runs a program in place of the current process.
pub trait Exec {
    /// On success on unix this never returns. Elsewhere it returns the
    /// child's exit code.
    fn exec(&self, argv: &[String]) -> Result<i32, CoreError>;
}

/// [`Exec`] backed by the operating system.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessExec;

impl Exec for ProcessExec {
    #[cfg(unix)]
    fn exec(&self, argv: &[String]) -> Result<i32, CoreError> {
        use std::os::unix::process::CommandExt;

        let (program, args) = split_argv(argv)?;
        tracing::debug!(program, ?args, "exec");
        // exec only returns on failure
        let source = Command::new(program).args(args).exec();
        Err(CoreError::Exec {
            program: program.to_owned(),
            source,
        })
    }

    #[cfg(not(unix))]
    fn exec(&self, argv: &[String]) -> Result<i32, CoreError> {
        let (program, args) = split_argv(argv)?;
        tracing::debug!(program, ?args, "spawn");
        let status = Command::new(program)
            .args(args)
            .status()
            .map_err(|source| CoreError::Exec {
                program: program.to_owned(),
                source,
            })?;
        Ok(status.code().unwrap_or(1))
    }
}

fn split_argv(argv: &[String]) -> Result<(&str, &[String]), CoreError> {
    argv.split_first()
        .map(|(program, args)| (program.as_str(), args))
        .ok_or_else(|| CoreError::Internal("empty command line".into()))
}

/// Resolves a device hostname to its tunnel and starts `ssh`.
#[derive(Debug, Clone)]
pub struct SshTunnelLauncher {
    relay_host: String,
    ssh_program: String,
}

impl Default for SshTunnelLauncher {
    fn default() -> Self {
        Self {
            relay_host: RELAY_HOST.into(),
            ssh_program: SSH_PROGRAM.into(),
        }
    }
}

impl SshTunnelLauncher {
    #[must_use]
    pub fn with_relay_host(mut self, host: impl Into<String>) -> Self {
        self.relay_host = host.into();
        self
    }

    #[must_use]
    pub fn with_ssh_program(mut self, program: impl Into<String>) -> Self {
        self.ssh_program = program.into();
        self
    }

    pub fn relay_host(&self) -> &str {
        &self.relay_host
    }

    /// Look up `hostname` (case-insensitively) and build the ssh command.
    ///
    /// An unknown hostname or a device without a tunnel port is an error;
    /// nothing is executed in either case.
    pub async fn resolve<D: DeviceDirectory>(
        &self,
        directory: &D,
        hostname: &str,
        user: &str,
    ) -> Result<Action, CoreError> {
        let devices = directory.list_devices().await?;
        tracing::debug!(count = devices.len(), hostname, "looking up device");

        let device = devices
            .iter()
            .find(|d| d.matches_hostname(hostname))
            .ok_or_else(|| CoreError::DeviceNotFound {
                hostname: hostname.to_owned(),
            })?;

        let port = device.ssh_port.ok_or_else(|| CoreError::NoTunnelPort {
            hostname: device.hostname.clone(),
        })?;

        Ok(Action::ExecReplace {
            argv: vec![
                self.ssh_program.clone(),
                "-p".into(),
                port.to_string(),
                "-l".into(),
                user.to_owned(),
                self.relay_host.clone(),
            ],
        })
    }

    /// Resolve, then hand the argv to `exec`.
    pub async fn run<D: DeviceDirectory, E: Exec>(
        &self,
        directory: &D,
        hostname: &str,
        user: &str,
        exec: &E,
    ) -> Result<i32, CoreError> {
        match self.resolve(directory, hostname, user).await? {
            Action::ExecReplace { argv } => {
                tracing::info!(hostname, relay = %self.relay_host, "opening ssh session");
                exec.exec(&argv)
            }
        }
    }
}
