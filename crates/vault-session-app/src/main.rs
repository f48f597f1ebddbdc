#![warn(missing_docs)]
//! # vault-session binary
//!
//! Headless host: opens the stores named on the command line and drives the
//! periodic tick until inactivity locks them or policy asks for exit.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use tracing::{error, info, warn};
use vault_session_app::{
    HostServices, SessionConfig, SessionCoordinator, ShutdownOutcome, TickOutcome, app_version,
    init_tracing,
};
use vault_session_core::{CompositeKey, Locator};
use vault_session_engine::{CredentialPrompt, JsonFileEngine, SprCompiler};
use zeroize::Zeroizing;

const DEFAULT_CONFIG_PATH: &str = "vault-session.json";
const PASSWORD_ENV_VAR: &str = "VAULT_SESSION_PASSWORD";

/// Answers the first credential request from the environment, then cancels.
struct EnvPrompt {
    password: Option<Zeroizing<String>>,
}

impl CredentialPrompt for EnvPrompt {
    fn request(&mut self, locator: &Locator, attempt: u32) -> Option<CompositeKey> {
        if attempt > 1 {
            warn!(locator = %locator, "Credentials rejected; not retrying");
            return None;
        }
        self.password
            .as_ref()
            .map(|password| CompositeKey::from_password(password.as_str()))
    }
}

struct Args {
    config: PathBuf,
    stores: Vec<String>,
}

fn parse_args() -> Result<Option<Args>, String> {
    let mut config = PathBuf::from(DEFAULT_CONFIG_PATH);
    let mut stores = Vec::new();
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--version" | "-V" => {
                println!("vault-session {}", app_version());
                return Ok(None);
            }
            "--config" => {
                let path = args.next().ok_or("--config needs a path")?;
                config = PathBuf::from(path);
            }
            other if other.starts_with("--") => return Err(format!("unknown option {other}")),
            store => stores.push(store.to_string()),
        }
    }
    Ok(Some(Args { config, stores }))
}

/// CLI entry point.
fn main() -> ExitCode {
    let args = match parse_args() {
        Ok(Some(args)) => args,
        Ok(None) => return ExitCode::SUCCESS,
        Err(message) => {
            eprintln!("vault-session: {message}");
            return ExitCode::from(2);
        }
    };

    let mut config = match SessionConfig::load(&args.config) {
        Ok(config) => config,
        Err(error) => {
            eprintln!("vault-session: {error}");
            return ExitCode::FAILURE;
        }
    };
    config.apply_env_overrides();
    init_tracing();

    match run(config, args.stores) {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            error!(error = %message, "Session ended with an error");
            ExitCode::FAILURE
        }
    }
}

fn run(config: SessionConfig, stores: Vec<String>) -> Result<(), String> {
    let tick_interval = Duration::from_millis(config.tick_interval_ms);
    let mut host = HostServices::headless();
    host.prompt = Box::new(EnvPrompt {
        password: std::env::var(PASSWORD_ENV_VAR).ok().map(Zeroizing::new),
    });

    let mut session = SessionCoordinator::new(
        config,
        Arc::new(JsonFileEngine::new()),
        Arc::new(SprCompiler::new()),
        host,
    )
    .map_err(|error| error.to_string())?;
    info!(version = app_version(), "vault-session started");

    for store in stores {
        let locator = Locator::new(store);
        if let Err(error) = session.open(locator.clone(), None) {
            warn!(locator = %locator, error = %error, "Failed to open store");
        }
    }
    if session.registry().open_documents().is_empty() {
        info!("No open documents; nothing to guard");
        return finish(&mut session);
    }

    let started = Instant::now();
    let now_ms = || u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
    session.notify_activity(now_ms());

    loop {
        thread::sleep(tick_interval);
        match session.tick(now_ms()) {
            TickOutcome::Locked => {
                info!("All documents locked; headless host stops");
                break;
            }
            TickOutcome::ExitRequested => break,
            TickOutcome::LockAborted => return Err("inactivity lock could not complete".into()),
            TickOutcome::Skipped | TickOutcome::Suppressed | TickOutcome::Idle => {}
        }
        if session.exit_requested() {
            break;
        }
    }
    finish(&mut session)
}

fn finish(session: &mut SessionCoordinator) -> Result<(), String> {
    match session.shutdown().map_err(|error| error.to_string())? {
        ShutdownOutcome::Completed => Ok(()),
        ShutdownOutcome::Cancelled(doc) => Err(format!("shutdown cancelled by document {doc}")),
    }
}
