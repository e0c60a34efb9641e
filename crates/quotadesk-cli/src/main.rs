//! quotadesk - command-line client for a quota-metered service.
//!
//! Signs in, keeps the session across runs, and shows the remaining quota.

mod commands;

use std::io;

use anyhow::Result;
use tracing::{debug, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use quotadesk_core::{Config, SessionManager};

use commands::Command;

/// Initialize the tracing subscriber for logging
fn init_tracing() {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(filter)
        .init();
}

const USAGE: &str = "\
Usage: quotadesk <command> [args]

Commands:
  login [email]                      Sign in
  register [email] [--username NAME] Create an account
  logout                             Sign out and forget the stored session
  whoami                             Show the signed-in user
  balance                            Show the remaining quota
  watch                              Keep showing the quota (r + Enter = refresh, Ctrl+C = quit)
  transactions [page]                List quota transactions
  check <action> [count]             Check whether quota covers an action
  passwd                             Change password";

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    init_tracing();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let command = match Command::parse(&args) {
        Ok(command) => command,
        Err(e) => {
            eprintln!("{}\n\n{}", e, USAGE);
            std::process::exit(2);
        }
    };
    if matches!(command, Command::Help) {
        println!("{}", USAGE);
        return Ok(());
    }

    let mut config = Config::load()?;
    debug!(api = %config.api_base_url, backend = ?config.credential_backend, "Config loaded");

    let api = config.api_client()?;
    let session = SessionManager::new(api, config.session_store()?);

    // The stored token must be installed before the first request goes out.
    let restored = session.rehydrate();
    info!(restored, "Session rehydrated");

    commands::run(command, &session, &mut config).await
}
