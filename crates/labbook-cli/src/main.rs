//! labbook - a command-line client for lab experiment records.
//!
//! Logs in against the labbook backend, keeps the session token between
//! runs, and lists, searches and edits experiments.

mod cli;
mod commands;
mod dashboard;

use std::io;

use anyhow::Result;
use labbook_core::{ApiClient, ApiError, Config, EventBus, Session};
use tracing::{debug, info};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cli::{Command, USAGE};
use commands::Context;

/// Directory for daily rolling log files; file logging is off when unset
const LOG_DIR_ENV: &str = "LABBOOK_LOG_DIR";

const LOG_FILE_PREFIX: &str = "labbook.log";

/// Initialize the tracing subscriber for logging.
///
/// The returned guard flushes the file writer and must live until exit.
fn init_tracing() -> Option<WorkerGuard> {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    let (file_layer, guard) = match std::env::var(LOG_DIR_ENV) {
        Ok(dir) if !dir.trim().is_empty() => {
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (Some(fmt::layer().with_writer(writer).with_ansi(false)), Some(guard))
        }
        _ => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(file_layer)
        .with(filter)
        .init();

    guard
}

/// What to tell the user when a command failed because the session is gone.
fn login_hint(error: &anyhow::Error) -> Option<&'static str> {
    error
        .chain()
        .filter_map(|cause| cause.downcast_ref::<ApiError>())
        .any(ApiError::requires_login)
        .then_some(dashboard::SESSION_ENDED)
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();
    let log_guard = init_tracing();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let command = match Command::parse(&args) {
        Ok(command) => command,
        Err(e) => {
            eprintln!("Error: {}\n\n{}", e, USAGE);
            std::process::exit(2);
        }
    };
    if command == Command::Help {
        println!("{}", USAGE);
        return Ok(());
    }

    info!("labbook starting");
    let config = Config::load()?;
    let api = ApiClient::from_config(&config)?;
    debug!(url = %api.base_url(), "Using backend");

    let session = Session::new(api, config.token_store()?, config.session_settings());
    session.initialize();

    let mut ctx = Context {
        config,
        session,
        events: EventBus::new(),
    };
    let result = commands::run(command, &mut ctx).await;

    ctx.session.teardown();
    info!("labbook shutting down");

    if let Err(ref e) = result {
        match login_hint(e) {
            Some(hint) => eprintln!("{}", hint),
            None => eprintln!("Error: {:#}", e),
        }
        drop(log_guard);
        std::process::exit(1);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context as _;

    #[test]
    fn test_login_hint_for_ended_session() {
        let expired = anyhow::Error::from(ApiError::TokenExpired);
        assert_eq!(login_hint(&expired), Some(dashboard::SESSION_ENDED));

        let wrapped = Err::<(), _>(ApiError::Unauthorized)
            .context("Failed to load experiment data")
            .unwrap_err();
        assert_eq!(login_hint(&wrapped), Some(dashboard::SESSION_ENDED));
    }

    #[test]
    fn test_no_login_hint_for_other_errors() {
        assert_eq!(login_hint(&anyhow::Error::from(ApiError::NotFound("gone".into()))), None);
        assert_eq!(login_hint(&anyhow::anyhow!("Not logged in. Run `labbook login` first.")), None);
    }
}
