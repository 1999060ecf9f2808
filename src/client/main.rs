// src/client/main.rs

use std::sync::Arc;

use chrono::Utc;
use warden::errors::WardenResult;
use warden::hardware::get_hardware_id;
use warden::{HttpValidator, LicenseCheck, LicenseEngine, SecureStore, WardenConfig};

const USAGE: &str = "usage: warden_client [status | activate <KEY> | deactivate | trial]";

enum Command {
    Status,
    Activate(String),
    Deactivate,
    Trial,
}

fn parse_args(mut args: impl Iterator<Item = String>) -> Option<Command> {
    let command = match args.next().as_deref() {
        None | Some("status") => Command::Status,
        Some("activate") => Command::Activate(args.next()?),
        Some("deactivate") => Command::Deactivate,
        Some("trial") => Command::Trial,
        Some(_) => return None,
    };
    Some(command)
}

fn print_check(check: &LicenseCheck) -> WardenResult<()> {
    let json = serde_json::to_string_pretty(check)
        .map_err(warden::errors::StorageError::from)?;
    println!("{json}");
    Ok(())
}

/// Demo client for the licensing engine.
///
/// Loads `warden.toml` / `WARDEN_*` settings, wires the HTTP validator to the
/// encrypted on-device store and runs one command. Results are printed as
/// JSON so scripts can consume them.
#[tokio::main]
async fn main() -> WardenResult<()> {
    let Some(command) = parse_args(std::env::args().skip(1)) else {
        eprintln!("{USAGE}");
        std::process::exit(2);
    };

    let config = WardenConfig::load()?;
    warden::logging::init(&config.logging);

    let device_id = get_hardware_id();
    let store = Arc::new(SecureStore::new(&config.storage, &device_id)?);
    let first_launch = store.first_launch(Utc::now()).await?;

    let engine = LicenseEngine::from_config(
        &config,
        Arc::new(HttpValidator::new(&config.server)?),
        store.clone(),
        store,
        first_launch,
    )
    .with_device_id(device_id);

    match command {
        Command::Status => print_check(&engine.check_license().await?)?,
        Command::Activate(key) => print_check(&engine.activate(&key).await?)?,
        Command::Deactivate => {
            engine.deactivate().await?;
            println!("License removed from this device.");
        }
        Command::Trial => {
            let trial = engine.trial();
            println!(
                "Day {} of {} ({} left, trial {})",
                trial.days_of_use_ui,
                trial.trial_days,
                trial.days_remaining(),
                if trial.trial_is_active { "active" } else { "over" }
            );
        }
    }

    Ok(())
}
