//! Config subcommand handlers.

use serde::Serialize;

use crate::cli::{ConfigArgs, ConfigCommand, GlobalOpts};
use crate::config;
use crate::error::CliError;
use crate::output;

/// What `config show` prints. The token never leaves the file in clear.
#[derive(Serialize)]
struct ConfigView {
    path: String,
    api_url: String,
    websocket_url: String,
    verify_tls: bool,
    token: String,
}

fn redact(token: &str) -> String {
    let tail: String = token
        .chars()
        .rev()
        .take(4)
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();
    if token.chars().count() <= 8 {
        "****".into()
    } else {
        format!("****{tail}")
    }
}

fn detail(v: &ConfigView) -> String {
    [
        format!("Path:          {}", v.path),
        format!("API URL:       {}", v.api_url),
        format!("WebSocket URL: {}", v.websocket_url),
        format!("Verify TLS:    {}", v.verify_tls),
        format!("Token:         {}", v.token),
    ]
    .join("\n")
}

pub fn handle(args: ConfigArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let store = config::store(global);

    match args.command {
        ConfigCommand::Path => {
            output::print_output(&store.path().display().to_string(), global.quiet);
            Ok(())
        }

        ConfigCommand::Show => {
            let cfg = store.load()?;
            let view = ConfigView {
                path: store.path().display().to_string(),
                api_url: cfg.api_url,
                websocket_url: cfg.websocket_url,
                verify_tls: cfg.verify_tls,
                token: redact(&cfg.token),
            };
            let out = output::render_single(&global.output, &view, detail)?;
            output::print_output(&out, global.quiet);
            Ok(())
        }
    }
}
