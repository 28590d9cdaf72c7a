pub mod models {
    pub mod telemetry;
    pub mod wire;
}

pub mod client;
pub mod config;
pub mod endpoints;
pub mod normalize;
pub mod session;
pub mod utils;
pub mod window;
pub mod services {
    pub mod console;
    pub mod dashboard;
    pub mod panel;
    pub mod poll;
    pub mod widgets;
}
#[cfg(test)]
mod test_support;

use crate::client::{TelemetryClient, UreqTransport};
use crate::config::Config;
use crate::services::console::{self, Control};
use crate::services::dashboard::Dashboard;
use crate::session::{NOT_LOGGED_IN, SessionContext, SessionStore};
use crate::window::{Direction, Granularity, SystemClock, WindowSelector};
use chrono::{Local, NaiveDate};
use clap::{Parser, Subcommand};
use log::{debug, error, info, warn};
use std::io::BufRead;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "flowwatch")]
#[command(about = "Terminal dashboard for water-flow meter telemetry")]
#[command(version)]
struct Cli {
    /// Load environment variables from this file instead of ./.env
    #[arg(long, global = true)]
    env_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Authenticate a device and remember the session
    Login {
        #[arg(long)]
        device_id: String,
        #[arg(long)]
        pin: String,
    },
    /// Forget the stored session
    Logout,
    /// Load every panel once and print it
    Show {
        #[arg(long, default_value = "day")]
        granularity: Granularity,
        /// Anchor date of the flow window (YYYY-MM-DD), default today
        #[arg(long)]
        date: Option<NaiveDate>,
        /// Move the flow window by this many units; negative goes back
        #[arg(
            long,
            default_value_t = 0,
            allow_negative_numbers = true,
            value_parser = clap::value_parser!(i32).range(-10_000..=10_000)
        )]
        steps: i32,
    },
    /// Keep polling and reprint the dashboard on every update; reads
    /// navigation commands from stdin (`help` lists them)
    Watch {
        #[arg(long, default_value = "day")]
        granularity: Granularity,
    },
}

#[derive(Debug)]
struct LoadedEnvFile {
    path: PathBuf,
    explicit: bool,
}

fn run(command: Command) -> Result<(), String> {
    let cfg = Config::from_env().map_err(|e| e.to_string())?;
    info!(
        "Config loaded (base_url={}, session_file={}, flow_poll={}s, alerts_poll={}s, timeout={}s)",
        cfg.base_url,
        cfg.session_file.display(),
        cfg.flow_poll_interval.as_secs(),
        cfg.alerts_poll_interval.as_secs(),
        cfg.request_timeout.as_secs()
    );

    let client = Arc::new(TelemetryClient::new(
        cfg.base_url.clone(),
        Box::new(UreqTransport::new(cfg.request_timeout)),
    ));
    let session = Arc::new(SessionContext::open(SessionStore::new(cfg.session_file.clone())));

    match command {
        Command::Login { device_id, pin } => {
            info!("Logging in to {}", client.base_url());
            let s = session.login(&client, &device_id, &pin).map_err(|e| e.to_string())?;
            println!("Logged in as device {}", s.device_id);
        }
        Command::Logout => {
            session.logout();
            println!("Logged out");
        }
        Command::Show {
            granularity,
            date,
            steps,
        } => {
            if session.current().is_none() {
                return Err(NOT_LOGGED_IN.to_string());
            }
            let mut selector = WindowSelector::new(SystemClock, granularity);
            if let Some(date) = date {
                selector.pick(date);
            }
            let direction = if steps < 0 { Direction::Prev } else { Direction::Next };
            for _ in 0..steps.unsigned_abs() {
                selector.navigate(direction);
            }

            let (dashboard, _updates) = Dashboard::new(client, session, selector);
            dashboard.reload_all();
            print!("{}", dashboard.render(&Local));
            dashboard.shutdown();
        }
        Command::Watch { granularity } => {
            if session.current().is_none() {
                return Err(NOT_LOGGED_IN.to_string());
            }
            let selector = WindowSelector::new(SystemClock, granularity);
            let (dashboard, updates) = Dashboard::new(client, session, selector);
            dashboard
                .start(cfg.flow_poll_interval, cfg.alerts_poll_interval)
                .map_err(|e| format!("Could not start pollers: {}", e))?;
            info!(
                "Watching {} (flow every {}s, alerts every {}s); type `help` for commands",
                dashboard.flow_window().display_label(),
                cfg.flow_poll_interval.as_secs(),
                cfg.alerts_poll_interval.as_secs()
            );

            let printer = {
                let dashboard = Arc::clone(&dashboard);
                std::thread::Builder::new()
                    .name("printer".into())
                    .spawn(move || {
                        for panel in updates {
                            debug!("{} updated", panel);
                            println!("{}", dashboard.render(&Local));
                        }
                    })
                    .map_err(|e| format!("Could not start printer: {}", e))?
            };

            for line in std::io::stdin().lock().lines() {
                let line = line.map_err(|e| format!("reading stdin failed: {}", e))?;
                if line.trim().is_empty() {
                    continue;
                }
                match line.parse::<Control>() {
                    Ok(Control::Quit) => {
                        dashboard.shutdown();
                        return Ok(());
                    }
                    Ok(Control::Help) => println!("{}", console::help()),
                    Ok(control) => match console::apply(&dashboard, control) {
                        Ok(Some(window)) => info!("Window now {}", window.display_label()),
                        Ok(None) => {}
                        Err(e) => warn!("{}", e),
                    },
                    Err(e) => warn!("{}", e),
                }
            }
            // stdin closed (e.g. running detached): keep polling until terminated
            if printer.join().is_err() {
                return Err("printer thread panicked".to_string());
            }
        }
    }

    Ok(())
}

fn load_env(explicit: Option<PathBuf>) -> Result<Option<LoadedEnvFile>, String> {
    if let Some(path) = explicit {
        if !path.is_file() {
            return Err(format!("env file not found: {}", path.display()));
        }
        dotenvy::from_path(&path).map_err(|e| format!("failed to load {}: {}", path.display(), e))?;
        return Ok(Some(LoadedEnvFile { path, explicit: true }));
    }

    let cwd = std::env::current_dir().map_err(|e| format!("unable to read current directory: {}", e))?;
    let default_path = cwd.join(".env");
    if !default_path.is_file() {
        return Ok(None);
    }
    // values already in the process environment win over the file
    dotenvy::from_path(&default_path).map_err(|e| format!("failed to load {}: {}", default_path.display(), e))?;
    Ok(Some(LoadedEnvFile {
        path: default_path,
        explicit: false,
    }))
}

fn main() {
    let cli = Cli::parse();

    let loaded_env = match load_env(cli.env_file) {
        Ok(info) => info,
        Err(err) => {
            eprintln!("fatal: {}", err);
            std::process::exit(1);
        }
    };

    // Init logging after environment so RUST_LOG from .env is respected.
    let default_filter = env_logger::Env::default().default_filter_or("info");
    env_logger::Builder::from_env(default_filter)
        .format_timestamp_secs()
        .init();

    if let Some(info) = loaded_env.as_ref() {
        let origin = if info.explicit { "CLI-specified" } else { "default" };
        info!("Environment loaded from {} .env file: {}", origin, info.path.display());
    }

    info!(
        "flowwatch {} (git {}) starting",
        env!("CARGO_PKG_VERSION"),
        env!("BUILD_TIME_GIT_HASH")
    );
    if let Err(e) = run(cli.command) {
        error!("fatal: {}", e);
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_show_with_negative_steps() {
        let cli = Cli::try_parse_from([
            "flowwatch",
            "show",
            "--granularity",
            "month",
            "--date",
            "2024-03-10",
            "--steps",
            "-2",
        ])
        .unwrap();
        match cli.command {
            Command::Show {
                granularity,
                date,
                steps,
            } => {
                assert_eq!(granularity, Granularity::DayOfMonth);
                assert_eq!(date, NaiveDate::from_ymd_opt(2024, 3, 10));
                assert_eq!(steps, -2);
            }
            _ => panic!("expected show"),
        }
    }

    #[test]
    fn steps_are_bounded() {
        assert!(Cli::try_parse_from(["flowwatch", "show", "--steps", "-2147483648"]).is_err());
        assert!(Cli::try_parse_from(["flowwatch", "show", "--steps", "10001"]).is_err());
        let cli = Cli::try_parse_from(["flowwatch", "show", "--steps", "-10000"]).unwrap();
        assert!(matches!(cli.command, Command::Show { steps: -10_000, .. }));
    }

    #[test]
    fn env_file_is_global() {
        let cli = Cli::try_parse_from(["flowwatch", "logout", "--env-file", "/tmp/x.env"]).unwrap();
        assert_eq!(cli.env_file, Some(PathBuf::from("/tmp/x.env")));
        assert!(matches!(cli.command, Command::Logout));
    }

    #[test]
    fn missing_explicit_env_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_env(Some(dir.path().join("absent.env"))).unwrap_err();
        assert!(err.starts_with("env file not found"));
    }
}
