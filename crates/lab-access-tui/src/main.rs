//! # lab-access-tui
//!
//! Terminal administration console for SISTEM AKSES LAB.
//! Covers login, the live dashboard, the filterable activity log, card and
//! room management, and the profile view. One-shot subcommands cover the
//! session and list operations for scripting.

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use clap::{Parser, Subcommand};
use crossterm::event::EventStream;
use dialoguer::Password;
use futures_util::StreamExt;
use tokio::sync::mpsc;

use lab_access_client::api::{CardApi, RoomApi};
use lab_access_client::forms::LoginForm;
use lab_access_client::notice::{Notice, NoticeLevel};
use lab_access_client::session::LoginOutcome;
use lab_access_client::{LabConfig, LabResult};

mod app;
mod bridge;
mod event;
mod tui;
mod ui;

use app::App;
use bridge::Services;
use event::AppEvent;

/// Frame rate of the render loop.
const TICK_RATE: Duration = Duration::from_millis(250);

/// Terminal administration console for SISTEM AKSES LAB.
#[derive(Parser)]
#[command(name = "lab-access-tui", version, about)]
struct Cli {
    /// Path to lab-access.toml config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// REST API base URL override (e.g. http://localhost:5000/api)
    #[arg(long)]
    url: Option<String>,

    /// Enable verbose logging (set RUST_LOG for fine-grained control)
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Open the interactive console (default)
    Tui,
    /// Log in and store the session token; the password is prompted without echo
    Login {
        #[arg(short, long)]
        username: String,
    },
    /// Remove the stored session token
    Logout,
    /// Verify the stored session and print the current user
    Whoami,
    /// Print all access cards as JSON
    Cards,
    /// Print all rooms as JSON
    Rooms,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match LabConfig::discover(cli.config.as_deref()) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Note: {e}. Using defaults.");
            LabConfig::default()
        }
    };
    if let Some(url) = &cli.url {
        config.api_url.clone_from(url);
    }

    let command = cli.command.unwrap_or(Command::Tui);
    if matches!(command, Command::Tui) {
        init_file_logging(&config, cli.verbose)?;
    } else {
        init_stderr_logging(cli.verbose);
    }

    let services = Services::from_config(&config)?;

    match command {
        Command::Tui => run_tui(services).await?,
        Command::Login { username } => cmd_login(&services, username).await?,
        Command::Logout => {
            services.session.logout();
            println!("Logged out.");
        }
        Command::Whoami => cmd_whoami(&services).await?,
        Command::Cards => print_pretty_json(&serde_json::to_value(services.api.list_cards().await?)?),
        Command::Rooms => print_pretty_json(&serde_json::to_value(services.api.list_rooms().await?)?),
    }

    Ok(())
}

// ─── Logging ─────────────────────────────────────────────────────────────

fn env_filter(verbose: bool) -> tracing_subscriber::EnvFilter {
    tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if verbose {
            tracing_subscriber::EnvFilter::new("lab_access_client=debug,lab_access_tui=debug")
        } else {
            tracing_subscriber::EnvFilter::new("lab_access_client=info,lab_access_tui=info")
        }
    })
}

/// Log next to the session file so the alternate screen stays clean.
fn init_file_logging(config: &LabConfig, verbose: bool) -> io::Result<()> {
    let path = log_path(&config.token_path());
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir)?;
    }
    let file = File::options().create(true).append(true).open(&path)?;
    tracing_subscriber::fmt()
        .with_env_filter(env_filter(verbose))
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .init();
    tracing::info!(path = %path.display(), "Console logging started");
    Ok(())
}

fn init_stderr_logging(verbose: bool) {
    let filter = if verbose {
        env_filter(true)
    } else {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("lab_access_client=warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn log_path(token_path: &Path) -> PathBuf {
    token_path.with_file_name("lab-access-tui.log")
}

// ─── Interactive console ─────────────────────────────────────────────────

async fn run_tui(services: Services) -> Result<(), Box<dyn std::error::Error>> {
    let services = Arc::new(services);
    let (tx, mut rx) = mpsc::unbounded_channel::<AppEvent>();

    let forwarders = bridge::spawn_forwarders(&services, &tx);
    let dashboard = bridge::spawn_dashboard_worker(Arc::clone(&services), tx.clone());
    let mut app = App::new(Arc::clone(&services), tx.clone(), dashboard);
    app.start();

    let mut terminal = tui::Tui::enter()?;
    let mut terminal_events = EventStream::new();
    let mut tick = tokio::time::interval(TICK_RATE);

    loop {
        terminal.terminal.draw(|frame| ui::draw(frame, &app))?;

        let event = tokio::select! {
            Some(Ok(ev)) = terminal_events.next() => AppEvent::Terminal(ev),
            Some(ev) = rx.recv() => ev,
            _ = tick.tick() => AppEvent::Tick,
            _ = tokio::signal::ctrl_c() => AppEvent::Quit,
        };

        if app.handle_event(event) {
            break;
        }
    }

    terminal.exit()?;
    app.shutdown().await;
    for task in forwarders {
        task.abort();
    }
    Ok(())
}

// ─── One-shot commands ───────────────────────────────────────────────────

async fn cmd_login(services: &Services, username: String) -> LabResult<()> {
    let password = prompt_password().await?;

    let mut notices = services.notifier.subscribe();
    let outcome = services
        .session
        .submit_login(&LoginForm::new(username, password))
        .await;

    match outcome {
        LoginOutcome::Invalid(errors) => {
            for (field, message) in errors.iter() {
                eprintln!("{field}: {message}");
            }
        }
        LoginOutcome::Failed => {
            print_notices(&mut notices);
        }
        LoginOutcome::Redirect(_) => {
            let session = services.session.snapshot();
            println!(
                "Logged in as {} ({})",
                session.username().unwrap_or("-"),
                session.role().unwrap_or("-")
            );
        }
    }
    Ok(())
}

/// Read the password on a blocking thread with terminal echo disabled.
async fn prompt_password() -> io::Result<String> {
    tokio::task::spawn_blocking(|| {
        Password::new()
            .with_prompt("Password")
            .allow_empty_password(true)
            .interact()
            .map_err(|dialoguer::Error::IO(e)| e)
    })
    .await
    .map_err(io::Error::other)?
}

async fn cmd_whoami(services: &Services) -> LabResult<()> {
    if services.session.check_auth().await {
        let session = services.session.snapshot();
        print_pretty_json(&serde_json::to_value(&session.user)?);
    } else {
        println!("Not logged in.");
    }
    Ok(())
}

fn print_notices(notices: &mut tokio::sync::broadcast::Receiver<Notice>) {
    while let Ok(notice) = notices.try_recv() {
        match notice.level {
            NoticeLevel::Error => eprintln!("Error: {}", notice.message),
            NoticeLevel::Success => println!("{}", notice.message),
            NoticeLevel::Loading | NoticeLevel::Dismiss => {}
        }
    }
}

fn print_pretty_json(value: &serde_json::Value) {
    match serde_json::to_string_pretty(value) {
        Ok(text) => println!("{text}"),
        Err(err) => {
            eprintln!("Failed to format JSON output: {err}");
            println!("{value}");
        }
    }
}
