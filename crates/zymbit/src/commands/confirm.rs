//! `zymbit confirm <code>`

use zymbit_core::{ApiClient, CoreError};

use crate::cli::{ConfirmArgs, GlobalOpts};
use crate::error::CliError;
use crate::output;

pub async fn handle(
    api: &ApiClient,
    args: ConfirmArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    api.confirm_registration(&args.confirmation_code)
        .await
        .map_err(CoreError::from)?;

    if !global.quiet {
        let message = format!("Registration {} confirmed", args.confirmation_code);
        eprintln!("{}", output::success(&global.color, &message));
    }
    Ok(())
}
