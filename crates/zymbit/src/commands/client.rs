//! `zymbit client`: interactive console.
//!
//! Inbound frames are printed by a background [`Printer`]; stdin lines are
//! sent as outbound frames. `quit`, `exit`, EOF or Ctrl-C end the session.
//!
//! Stdin is read on a plain OS thread. A blocking read on tokio's pool
//! would hold the runtime open after Ctrl-C until the user hit enter.

use std::io::{self, BufRead};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use zymbit_core::printer::DEFAULT_IDLE_INTERVAL;
use zymbit_core::{
    ClientIdResolver, CoreError, EventStream, Printer, ProvisionConfig, ReconnectConfig, TlsMode,
};

use crate::cli::{ClientArgs, GlobalOpts};
use crate::error::CliError;
use crate::output;

const QUIT_WORDS: [&str; 2] = ["quit", "exit"];

/// How often the console checks whether the stream died on its own.
const LIVENESS_CHECK: Duration = Duration::from_millis(250);

enum Ended {
    User,
    StreamClosed,
}

pub async fn handle(
    cfg: &ProvisionConfig,
    resolver: &Arc<ClientIdResolver>,
    args: &ClientArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let identity = Arc::clone(resolver).get_client_id_async().await?;
    let url = cfg.websocket_url()?;
    let headers = zymbit_api::auth_headers(Some(&cfg.token()), Some(&identity.client_id))
        .map_err(CoreError::from)?;
    let (tls, reconnect) = stream_options(cfg, args);

    let cancel = CancellationToken::new();
    let stream = EventStream::connect(url.clone(), headers, tls, reconnect, cancel.clone());
    let printer = Printer::spawn(
        stream.subscribe(),
        io::stdout(),
        DEFAULT_IDLE_INTERVAL,
        cancel.child_token(),
    );

    if !global.quiet {
        eprintln!(
            "{}",
            output::dim(
                &global.color,
                &format!("Console on {url}. Type a message and press enter; `quit` to leave.")
            )
        );
    }

    let ended = read_console(&stream, &printer).await?;

    printer.quit();
    stream.shutdown();
    printer.join().await?;

    match ended {
        Ended::User => Ok(()),
        Ended::StreamClosed => Err(CliError::Stream {
            message: format!("connection to {url} closed"),
        }),
    }
}

/// TLS and reconnect settings for the message stream.
fn stream_options(cfg: &ProvisionConfig, args: &ClientArgs) -> (TlsMode, ReconnectConfig) {
    let reconnect = if args.reconnect {
        ReconnectConfig::default().with_retries(None)
    } else {
        ReconnectConfig::default()
    };
    (TlsMode::from_verify(cfg.verify_tls), reconnect)
}

/// Forward stdin lines from a detached thread. The channel closes on EOF.
fn spawn_stdin_reader() -> mpsc::Receiver<io::Result<String>> {
    let (tx, rx) = mpsc::channel(16);
    std::thread::spawn(move || {
        for line in io::stdin().lock().lines() {
            if tx.blocking_send(line).is_err() {
                break;
            }
        }
    });
    rx
}

async fn read_console(
    stream: &EventStream,
    printer: &zymbit_core::PrinterHandle,
) -> Result<Ended, CliError> {
    let mut lines = spawn_stdin_reader();
    let mut liveness = tokio::time::interval(LIVENESS_CHECK);
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                tracing::debug!("interrupted");
                return Ok(Ended::User);
            }
            _ = liveness.tick() => {
                if printer.is_finished() {
                    return Ok(Ended::StreamClosed);
                }
            }
            line = lines.recv() => {
                let Some(line) = line.transpose()? else {
                    return Ok(Ended::User);
                };
                let line = line.trim();
                if QUIT_WORDS.contains(&line) {
                    return Ok(Ended::User);
                }
                if !line.is_empty() {
                    stream.send(line.to_owned()).await.map_err(CoreError::from)?;
                }
            }
        }
    }
}
