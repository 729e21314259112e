//! Clap derive structures for the `zymbit` CLI.
//!
//! Kept free of crate-internal imports so `build.rs` can include it for
//! man page generation.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// zymbit -- device provisioning, SSH tunnels and live console
#[derive(Debug, Parser)]
#[command(
    name = "zymbit",
    version,
    about = "Provision Zymbit devices, reach them over SSH and watch live messages",
    long_about = "Registers this host with the Zymbit control plane, opens SSH sessions\n\
        to registered devices through the tunnel relay, and streams live\n\
        console messages over WebSocket.",
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Command,
}

// ── Global Options ───────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Path of the provisioning config file
    #[arg(long, env = "ZYMBIT_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Output format
    #[arg(
        long,
        short = 'o',
        env = "ZYMBIT_OUTPUT",
        default_value = "table",
        global = true
    )]
    pub output: OutputFormat,

    /// When to use color output
    #[arg(long, default_value = "auto", global = true)]
    pub color: ColorMode,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    /// Request timeout in seconds
    #[arg(long, env = "ZYMBIT_TIMEOUT", default_value = "30", global = true)]
    pub timeout: u64,
}

// ── Output & Color Enums ─────────────────────────────────────────────

#[derive(Debug, Clone, ValueEnum)]
pub enum OutputFormat {
    /// Pretty table (default, interactive)
    Table,
    /// Pretty-printed JSON
    Json,
    /// Compact single-line JSON
    JsonCompact,
    /// YAML
    Yaml,
    /// Plain text, one value per line (scripting)
    Plain,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum ColorMode {
    /// Auto-detect (color if terminal is interactive)
    Auto,
    /// Always emit color codes
    Always,
    /// Never emit color codes
    Never,
}

// ── Top-Level Command Enum ───────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Register this host and write its configuration
    Provision(ProvisionArgs),

    /// Confirm a pending registration
    Confirm(ConfirmArgs),

    /// Open an SSH session to a device through the tunnel relay
    Ssh(SshArgs),

    /// Interactive console printing live messages
    Client(ClientArgs),

    /// List devices visible to this account
    #[command(alias = "ls")]
    Devices,

    /// Inspect the provisioning configuration
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

// ── Provision ────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct ProvisionArgs {
    /// Provisioning token issued by the control plane
    pub token: String,

    /// API base URL
    #[arg(long, value_name = "URL")]
    pub api_url: Option<String>,

    /// WebSocket URL for the live console
    #[arg(long, value_name = "URL")]
    pub websocket_url: Option<String>,

    /// Do not verify TLS certificates or hostnames
    #[arg(long)]
    pub ssl_ignore_hostname: bool,

    /// Write the config without contacting the server
    #[arg(long)]
    pub config_only: bool,

    /// Remove any existing config first
    #[arg(long)]
    pub clean: bool,
}

// ── Confirm ──────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct ConfirmArgs {
    /// Confirmation code shown during registration
    pub confirmation_code: String,
}

// ── SSH ──────────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct SshArgs {
    /// Login user on the device
    #[arg(long, short = 'u', default_value = "zymbit")]
    pub user: String,

    /// Hostname of the device (case-insensitive)
    pub hostname: String,
}

// ── Client ───────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct ClientArgs {
    /// Reconnect with exponential backoff when the connection drops
    #[arg(long)]
    pub reconnect: bool,
}

// ── Config ───────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Display the resolved configuration (token redacted)
    Show,

    /// Print the config file path
    Path,
}

// ── Completions ──────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}
