//! Command parsing and execution.

use std::io::{self, Write};
use std::sync::Arc;

use anyhow::{anyhow, Result};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, warn};

use quotadesk_core::{ApiError, Config, QuotaPoller, SessionManager, User};

/// Transactions shown per page.
const TRANSACTIONS_PER_PAGE: u32 = 20;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Login { email: Option<String> },
    Register {
        email: Option<String>,
        username: Option<String>,
    },
    Logout,
    WhoAmI,
    Balance,
    Watch,
    Transactions { page: u32 },
    Check { action: String, count: u32 },
    Passwd,
    Help,
}

impl Command {
    pub fn parse(args: &[String]) -> Result<Self> {
        let Some((name, rest)) = args.split_first() else {
            return Ok(Command::Help);
        };

        match name.as_str() {
            "login" => Ok(Command::Login {
                email: rest.first().cloned(),
            }),
            "register" => {
                let mut email = None;
                let mut username = None;
                let mut iter = rest.iter();
                while let Some(arg) = iter.next() {
                    if arg == "--username" {
                        let value = iter
                            .next()
                            .ok_or_else(|| anyhow!("--username needs a value"))?;
                        username = Some(value.clone());
                    } else if email.is_none() {
                        email = Some(arg.clone());
                    } else {
                        return Err(anyhow!("Unexpected argument: {}", arg));
                    }
                }
                Ok(Command::Register { email, username })
            }
            "logout" => Ok(Command::Logout),
            "whoami" => Ok(Command::WhoAmI),
            "balance" => Ok(Command::Balance),
            "watch" => Ok(Command::Watch),
            "transactions" => {
                let page = match rest.first() {
                    Some(raw) => raw
                        .parse()
                        .map_err(|_| anyhow!("Page must be a positive number: {}", raw))?,
                    None => 1,
                };
                Ok(Command::Transactions { page })
            }
            "check" => {
                let action = rest
                    .first()
                    .cloned()
                    .ok_or_else(|| anyhow!("check needs an action"))?;
                let count = match rest.get(1) {
                    Some(raw) => raw
                        .parse()
                        .map_err(|_| anyhow!("Count must be a number: {}", raw))?,
                    None => 1,
                };
                Ok(Command::Check { action, count })
            }
            "passwd" => Ok(Command::Passwd),
            "help" | "-h" | "--help" => Ok(Command::Help),
            other => Err(anyhow!("Unknown command: {}", other)),
        }
    }
}

pub async fn run(command: Command, session: &SessionManager, config: &mut Config) -> Result<()> {
    match command {
        Command::Login { email } => login(session, config, email).await,
        Command::Register { email, username } => register(session, config, email, username).await,
        Command::Logout => {
            session.logout();
            println!("Signed out.");
            Ok(())
        }
        Command::WhoAmI => whoami(session).await,
        Command::Balance => balance(session).await,
        Command::Watch => watch(session, config).await,
        Command::Transactions { page } => transactions(session, page).await,
        Command::Check { action, count } => check(session, &action, count).await,
        Command::Passwd => passwd(session).await,
        Command::Help => Ok(()),
    }
}

// ============================================================================
// Prompts
// ============================================================================

fn prompt_email(last: Option<&str>) -> Result<String> {
    match last {
        Some(last) => print!("Email [{}]: ", last),
        None => print!("Email: "),
    }
    io::stdout().flush()?;

    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    let input = input.trim();

    match (input.is_empty(), last) {
        (true, Some(last)) => Ok(last.to_string()),
        _ => Ok(input.to_string()),
    }
}

fn prompt_password(label: &str) -> Result<String> {
    let password = rpassword::prompt_password(label)?;
    Ok(password)
}

/// Refuse empty fields before any request is made.
fn require(value: &str, field: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(anyhow!("{} is required", field));
    }
    Ok(())
}

/// Turn a recorded error code into something readable.
fn describe_error_code(code: &str) -> String {
    match code {
        "invalid_credentials" => "Invalid email or password".to_string(),
        "email_taken" | "user_exists" => "That email is already registered".to_string(),
        quotadesk_core::auth::LOGIN_FAILED => "Login failed".to_string(),
        quotadesk_core::auth::REGISTER_FAILED => "Registration failed".to_string(),
        other => other.replace('_', " "),
    }
}

fn report_exchange_failure(session: &SessionManager, e: &anyhow::Error) -> anyhow::Error {
    let code = session.snapshot().error.unwrap_or_default();
    error!(error = %e, "Authentication failed");
    anyhow!("{}: {}", describe_error_code(&code), e)
}

/// A consumer that sees the server refuse the token ends the session.
fn handle_request_error(session: &SessionManager, e: anyhow::Error) -> anyhow::Error {
    let auth_failure = e
        .downcast_ref::<ApiError>()
        .is_some_and(ApiError::is_auth_failure);
    if auth_failure {
        warn!("Server rejected the session token");
        session.logout();
        return anyhow!("Session expired. Please run `quotadesk login` again.");
    }
    e
}

fn require_session(session: &SessionManager) -> Result<()> {
    if !session.is_authenticated() {
        return Err(anyhow!("Not signed in. Run `quotadesk login` first."));
    }
    Ok(())
}

fn user_label(user: &User) -> String {
    format!("[{}] {} <{}>", user.initial(), user.display_name(), user.email)
}

// ============================================================================
// Commands
// ============================================================================

async fn login(session: &SessionManager, config: &mut Config, email: Option<String>) -> Result<()> {
    let email = match email {
        Some(email) => email,
        None => prompt_email(config.last_email.as_deref())?,
    };
    let password = prompt_password("Password: ")?;
    require(&email, "Email")?;
    require(&password, "Password")?;

    println!("Signing in...");
    match session.login(&email, &password).await {
        Ok(user) => {
            remember_email(config, email);
            println!("Signed in as {}", user_label(&user));
            Ok(())
        }
        Err(e) => Err(report_exchange_failure(session, &e)),
    }
}

async fn register(
    session: &SessionManager,
    config: &mut Config,
    email: Option<String>,
    username: Option<String>,
) -> Result<()> {
    let email = match email {
        Some(email) => email,
        None => prompt_email(None)?,
    };
    let password = prompt_password("Password: ")?;
    let confirm = prompt_password("Confirm password: ")?;
    require(&email, "Email")?;
    require(&password, "Password")?;
    if password != confirm {
        return Err(anyhow!("Passwords do not match"));
    }

    match session
        .register_with_username(&email, &password, username.as_deref())
        .await
    {
        Ok(user) => {
            remember_email(config, email);
            println!("Account created for {}", user_label(&user));
            if let Some(line) = starting_quota_line(session.api().quota_balance().await) {
                println!("{}", line);
            }
            Ok(())
        }
        Err(e) => Err(report_exchange_failure(session, &e)),
    }
}

/// The starting balance shown after sign-up. A failed fetch is logged and
/// shown as nothing.
fn starting_quota_line(balance: Result<u64>) -> Option<String> {
    match balance {
        Ok(balance) => Some(format!("Starting quota: {}", balance)),
        Err(e) => {
            warn!(error = %e, "Failed to fetch starting quota");
            None
        }
    }
}

fn remember_email(config: &mut Config, email: String) {
    if let Err(e) = config.save_last_email(&email) {
        warn!(error = %e, "Failed to save config");
    }
}

async fn whoami(session: &SessionManager) -> Result<()> {
    session.refresh_user().await;
    let state = session.snapshot();
    match state.user {
        Some(ref user) if state.is_authenticated => {
            println!("{}", user_label(user));
            Ok(())
        }
        _ => {
            println!("Not signed in.");
            Ok(())
        }
    }
}

async fn balance(session: &SessionManager) -> Result<()> {
    require_session(session)?;
    let balance = session
        .api()
        .quota_balance()
        .await
        .map_err(|e| handle_request_error(session, e))?;
    println!("Quota remaining: {}", balance);
    Ok(())
}

fn is_refresh_request(line: &str) -> bool {
    line.trim().eq_ignore_ascii_case("r")
}

async fn watch(session: &SessionManager, config: &Config) -> Result<()> {
    session.refresh_user().await;
    require_session(session)?;

    let poller = QuotaPoller::new(Arc::new(session.api().clone()), session.subscribe())
        .with_interval(config.quota_refresh_interval())
        .start();
    let mut balance = poller.subscribe();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;

    println!(
        "Watching quota every {}s. Type r + Enter to refresh, Ctrl+C to quit.",
        config.quota_refresh_interval().as_secs()
    );

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            line = lines.next_line(), if stdin_open => match line {
                Ok(Some(line)) if is_refresh_request(&line) => poller.refresh(),
                Ok(Some(_)) => {}
                // stdin closed; keep polling until Ctrl+C
                Ok(None) => stdin_open = false,
                Err(e) => {
                    warn!(error = %e, "Failed to read stdin");
                    stdin_open = false;
                }
            },
            changed = balance.changed() => {
                if changed.is_err() {
                    break;
                }
                let now = chrono::Local::now().format("%H:%M:%S");
                match *balance.borrow_and_update() {
                    Some(value) => println!("[{}] Quota remaining: {}", now, value),
                    None => println!("[{}] Quota unavailable", now),
                }
            }
        }
    }

    poller.stop();
    Ok(())
}

async fn transactions(session: &SessionManager, page: u32) -> Result<()> {
    require_session(session)?;
    let result = session
        .api()
        .quota_transactions(page, TRANSACTIONS_PER_PAGE)
        .await
        .map_err(|e| handle_request_error(session, e))?;

    if result.transactions.is_empty() {
        println!("No transactions.");
        return Ok(());
    }
    for tx in &result.transactions {
        println!(
            "{:<20} {:>6}  {:<16} {}",
            tx.created_at.as_deref().unwrap_or("-"),
            tx.amount_display(),
            tx.transaction_type.as_deref().unwrap_or("-"),
            tx.description.as_deref().unwrap_or(""),
        );
    }
    println!(
        "Page {} of {} ({} total)",
        result.pagination.page,
        result.pagination.pages.max(1),
        result.pagination.total
    );
    Ok(())
}

async fn check(session: &SessionManager, action: &str, count: u32) -> Result<()> {
    require_session(session)?;
    let result = session
        .api()
        .check_quota(action, count)
        .await
        .map_err(|e| handle_request_error(session, e))?;
    let verdict = if result.sufficient { "enough" } else { "not enough" };
    println!(
        "{} x{} needs {} (balance {}): {}",
        result.action, result.count, result.required, result.current_balance, verdict
    );
    Ok(())
}

async fn passwd(session: &SessionManager) -> Result<()> {
    require_session(session)?;
    let old_password = prompt_password("Current password: ")?;
    let new_password = prompt_password("New password: ")?;
    let confirm = prompt_password("Confirm new password: ")?;
    require(&old_password, "Current password")?;
    require(&new_password, "New password")?;
    if new_password != confirm {
        return Err(anyhow!("Passwords do not match"));
    }

    session
        .api()
        .change_password(&old_password, &new_password)
        .await
        .map_err(|e| handle_request_error(session, e))?;
    println!("Password changed.");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_no_args_is_help() {
        assert_eq!(Command::parse(&[]).unwrap(), Command::Help);
    }

    #[test]
    fn test_parse_login() {
        assert_eq!(
            Command::parse(&args(&["login"])).unwrap(),
            Command::Login { email: None }
        );
        assert_eq!(
            Command::parse(&args(&["login", "a@x.com"])).unwrap(),
            Command::Login {
                email: Some("a@x.com".to_string())
            }
        );
    }

    #[test]
    fn test_parse_register_with_username() {
        assert_eq!(
            Command::parse(&args(&["register", "--username", "al", "a@x.com"])).unwrap(),
            Command::Register {
                email: Some("a@x.com".to_string()),
                username: Some("al".to_string()),
            }
        );
        assert!(Command::parse(&args(&["register", "--username"])).is_err());
        assert!(Command::parse(&args(&["register", "a@x.com", "extra"])).is_err());
    }

    #[test]
    fn test_parse_transactions_and_check() {
        assert_eq!(
            Command::parse(&args(&["transactions"])).unwrap(),
            Command::Transactions { page: 1 }
        );
        assert_eq!(
            Command::parse(&args(&["transactions", "3"])).unwrap(),
            Command::Transactions { page: 3 }
        );
        assert!(Command::parse(&args(&["transactions", "x"])).is_err());

        assert_eq!(
            Command::parse(&args(&["check", "generate_image", "2"])).unwrap(),
            Command::Check {
                action: "generate_image".to_string(),
                count: 2
            }
        );
        assert!(Command::parse(&args(&["check"])).is_err());
    }

    #[test]
    fn test_parse_unknown() {
        assert!(Command::parse(&args(&["frobnicate"])).is_err());
    }

    #[test]
    fn test_describe_error_code() {
        assert_eq!(
            describe_error_code("invalid_credentials"),
            "Invalid email or password"
        );
        assert_eq!(describe_error_code("login_failed"), "Login failed");
        assert_eq!(describe_error_code("quota_exceeded"), "quota exceeded");
    }

    #[test]
    fn test_starting_quota_line() {
        assert_eq!(
            starting_quota_line(Ok(5)).as_deref(),
            Some("Starting quota: 5")
        );
        assert!(starting_quota_line(Err(anyhow!("connection refused"))).is_none());
    }

    #[test]
    fn test_refresh_request_needs_r() {
        assert!(is_refresh_request("r"));
        assert!(is_refresh_request(" R \r"));
        assert!(!is_refresh_request(""));
        assert!(!is_refresh_request("refresh"));
    }

    #[test]
    fn test_require() {
        assert!(require("a", "Email").is_ok());
        assert!(require("  ", "Email").is_err());
    }
}
