//! MonitorControl remote client: command-line entry point.
//!
//! Each subcommand is translated into one or more [`UiIntent`]s, the client
//! waits for the resulting remote work to finish, and the final snapshot is
//! printed to stdout as JSON.  User-facing messages go to stderr.
//!
//! # Usage
//!
//! ```text
//! mcr-client [--config <DIR>] <COMMAND>
//!
//! Commands:
//!   scan        Scan the LAN for the service and list the matches
//!   configure   Save host, port, and token, then connect
//!   status      Connect with the saved settings and show all displays
//!   brightness  Set brightness for one display or all displays
//!   volume      Set volume for one display or all displays
//!   power       Turn one display or all displays on or off
//!   input       Switch the input source of a display
//! ```
//!
//! # Logging
//!
//! `RUST_LOG` takes precedence; otherwise `[client] log_level` from
//! `config.toml` applies (default `info`).  Logs are written to stderr so
//! stdout stays valid JSON.

use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::info;
use tracing_subscriber::EnvFilter;

use mcr_client::application::dispatch_commands::{ConnectionStatus, SliderKind, SliderTarget};
use mcr_client::application::notify::UserMessage;
use mcr_client::infrastructure::storage::config::{config_dir, load_config};
use mcr_client::infrastructure::ui_bridge::{ClientApp, UiIntent};
use mcr_core::domain::settings::DEFAULT_PORT;

// ── CLI argument definitions ──────────────────────────────────────────────────

/// Remote control for the displays of a Mac running the MonitorControl HTTP API.
#[derive(Debug, Parser)]
#[command(name = "mcr-client", version)]
struct Cli {
    /// Directory holding `config.toml` and `input-cache.toml`.
    ///
    /// Defaults to the platform config directory.
    #[arg(long, env = "MCR_CONFIG_DIR")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Scan the LAN for the service and list the matches.
    Scan,
    /// Save host, port, and token, then connect.
    Configure {
        /// Host address; when omitted the single scan match is used.
        #[arg(long)]
        host: Option<String>,
        #[arg(long, default_value_t = DEFAULT_PORT)]
        port: u16,
        /// Bearer token configured in MonitorControl.
        #[arg(long, env = "MCR_TOKEN")]
        token: String,
    },
    /// Connect with the saved settings and show all displays.
    Status,
    /// Set brightness (0-100) for one display or all displays.
    Brightness {
        value: i32,
        #[arg(long)]
        display: Option<i64>,
    },
    /// Set volume (0-100) for one display or all displays.
    Volume {
        value: i32,
        #[arg(long)]
        display: Option<i64>,
    },
    /// Turn one display or all displays on or off.
    Power {
        state: PowerArg,
        #[arg(long)]
        display: Option<i64>,
    },
    /// Switch the input source of a display.
    Input {
        #[arg(long)]
        display: i64,
        /// DDC/CI input code (0-255).
        #[arg(long)]
        code: i32,
        /// Label to remember for this input.
        #[arg(long)]
        name: Option<String>,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum PowerArg {
    On,
    Off,
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let dir = match cli.config {
        Some(dir) => dir,
        None => config_dir().context("no config directory; pass --config")?,
    };
    let config = load_config(&dir)
        .with_context(|| format!("failed to load config from {}", dir.display()))?;

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.client.log_level)),
        )
        .init();
    info!(config_dir = %dir.display(), "mcr-client starting");

    let app = ClientApp::with_config_dir(&dir, config.client.scan_concurrency)
        .context("failed to initialise the host scanner")?;
    let mut messages = app.messages();

    let result = run(&app, cli.command).await;
    print_messages(&mut messages);
    result
}

async fn run(app: &ClientApp, command: Command) -> anyhow::Result<()> {
    match command {
        Command::Scan => {
            app.dispatch(UiIntent::OpenSettings);
            app.settle().await;
            print_json(&app.settings_snapshot())?;
            app.dispatch(UiIntent::DismissSettings);
        }
        Command::Configure { host, port, token } => {
            match host {
                Some(host) => {
                    app.dispatch(UiIntent::EditHost(host));
                }
                None => {
                    // Opening runs the automatic scan, which fills the host
                    // when exactly one match answers.
                    app.dispatch(UiIntent::OpenSettings);
                    app.settle().await;
                }
            }
            app.dispatch(UiIntent::EditPort(port.to_string()));
            app.dispatch(UiIntent::EditToken(token));
            let saved = app.dispatch(UiIntent::SaveSettings);
            if !saved.success {
                bail!(saved.error.unwrap_or_else(|| "settings were not saved".into()));
            }
            app.settle().await;
            print_json(&app.home_snapshot())?;
        }
        Command::Status => {
            connect(app).await?;
            print_json(&app.home_snapshot())?;
        }
        Command::Brightness { value, display } => {
            connect(app).await?;
            slide(app, slider(display, SliderKind::Brightness), value).await;
            print_json(&app.home_snapshot())?;
        }
        Command::Volume { value, display } => {
            connect(app).await?;
            slide(app, slider(display, SliderKind::Volume), value).await;
            print_json(&app.home_snapshot())?;
        }
        Command::Power { state, display } => {
            connect(app).await?;
            let on = matches!(state, PowerArg::On);
            let intent = match display {
                Some(id) => UiIntent::SetDisplayPower { id, on },
                None => UiIntent::SetAllPower(on),
            };
            app.dispatch(intent);
            app.settle().await;
            print_json(&app.home_snapshot())?;
        }
        Command::Input {
            display,
            code,
            name,
        } => {
            connect(app).await?;
            app.dispatch(UiIntent::SelectInput {
                id: display,
                code,
                name,
            });
            app.settle().await;
            print_json(&app.home_snapshot())?;
        }
    }
    Ok(())
}

/// Connects with the saved settings and waits for the display list.
async fn connect(app: &ClientApp) -> anyhow::Result<()> {
    if !app.bootstrap() {
        app.dispatch(UiIntent::DismissSettings);
        bail!("no connection configured; run `mcr-client configure` first");
    }
    app.settle().await;
    if app.engine().state().connection != ConnectionStatus::Connected {
        bail!("could not connect to the service");
    }
    Ok(())
}

fn slider(display: Option<i64>, kind: SliderKind) -> SliderTarget {
    match display {
        Some(id) => SliderTarget::display(id, kind),
        None => SliderTarget::global(kind),
    }
}

async fn slide(app: &ClientApp, target: SliderTarget, value: i32) {
    app.dispatch(UiIntent::ChangeSlider { target, value });
    app.dispatch(UiIntent::FinishSlider(target));
    app.settle().await;
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_messages(messages: &mut broadcast::Receiver<UserMessage>) {
    while let Ok(message) = messages.try_recv() {
        eprintln!("{message}");
    }
}
