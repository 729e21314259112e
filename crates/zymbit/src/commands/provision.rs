//! `zymbit provision <token>`

use std::io::IsTerminal;
use std::sync::Arc;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use zymbit_core::{ClientIdResolver, ProvisionOutcome, ProvisionProcess, ProvisionRequest};

use crate::cli::{GlobalOpts, ProvisionArgs};
use crate::config;
use crate::error::CliError;
use crate::output;

impl From<ProvisionArgs> for ProvisionRequest {
    fn from(args: ProvisionArgs) -> Self {
        Self {
            token: args.token,
            api_url: args.api_url,
            websocket_url: args.websocket_url,
            check_hostname: !args.ssl_ignore_hostname,
            config_only: args.config_only,
            clean: args.clean,
        }
    }
}

pub async fn handle(args: ProvisionArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let process = ProvisionProcess::new(config::store(global));
    let request = ProvisionRequest::from(args);
    // Config-only runs never reach the server and need no client id
    let client_id = if request.config_only {
        String::new()
    } else {
        Arc::new(ClientIdResolver::from_env())
            .get_client_id_async()
            .await?
            .client_id
    };

    let spinner = spinner(global, request.config_only);
    let result = process
        .run(&request, |cfg| config::client_for(cfg, &client_id, global))
        .await;
    spinner.finish_and_clear();

    let outcome = result?;
    tracing::info!(%outcome, path = %process.store().path().display(), "provisioned");

    if !global.quiet {
        let message = match outcome {
            ProvisionOutcome::ConfigOnly => "Configuration written".to_owned(),
            ProvisionOutcome::Confirmed => "Device provisioned".to_owned(),
            ProvisionOutcome::AlreadyConfirmed => "Device was already registered".to_owned(),
        };
        eprintln!("{}", output::success(&global.color, &message));
        eprintln!(
            "{}",
            output::dim(
                &global.color,
                &format!("  Config: {}", process.store().path().display())
            )
        );
    }
    Ok(())
}

/// Spinner on an interactive stderr; hidden otherwise.
fn spinner(global: &GlobalOpts, config_only: bool) -> ProgressBar {
    if global.quiet || config_only || !std::io::stderr().is_terminal() {
        return ProgressBar::hidden();
    }

    let bar = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::with_template("{spinner} {msg}") {
        bar.set_style(style);
    }
    bar.set_message("Confirming registration...");
    bar.enable_steady_tick(Duration::from_millis(100));
    bar
}
