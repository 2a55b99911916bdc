//! Variable Server CLI Application
//!
//! A demonstration host for the var-server-session library. It adds:
//! - A bouncing-ball model running on its own thread
//! - A TCP listener with one session per client
//! - A line-oriented command front end
//! - Frame-driven copy scheduling

use anyhow::{Context, Result};
use clap::Parser;
use std::net::TcpListener;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use var_server_session::{LinearUnitSystem, ManualClock, SessionServices, SymbolTable};

mod commands;
mod config;
mod model;
mod scheduler;
mod server;

/// Variable Server - stream simulation variables to TCP clients
#[derive(Parser, Debug)]
#[command(name = "var-server-cli")]
#[command(about = "Serve simulation variables over TCP (ascii or binary)", long_about = None)]
#[command(version)]
struct Args {
    /// Address to listen on (overrides the config file)
    #[arg(short, long, value_name = "ADDR")]
    bind: Option<String>,

    /// Path to configuration file (config.toml)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Simulation clock resolution
    #[arg(long, value_name = "TICS")]
    tics_per_second: Option<i64>,

    /// Length of one simulation frame in seconds
    #[arg(long, value_name = "SECONDS")]
    frame_seconds: Option<f64>,

    /// Directory for files requested with send_file
    #[arg(long, value_name = "DIR")]
    resource_dir: Option<PathBuf>,

    /// Verbosity level (can be repeated: -v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long)]
    quiet: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose, args.quiet);

    log::info!("Variable Server CLI v{}", env!("CARGO_PKG_VERSION"));
    log::info!("Using session library v{}", var_server_session::VERSION);

    let mut app = match &args.config {
        Some(path) => {
            log::info!("Loading configuration from: {:?}", path);
            config::load_config(path)?
        }
        None => config::AppConfig::default(),
    };
    apply_overrides(&mut app, &args)?;

    let table = Arc::new(SymbolTable::new());
    let clock = Arc::new(ManualClock::new(app.model.tics_per_second));
    let ball = model::BallModel::new(&table);
    log::info!("Registered {} simulation variables", table.len());

    let running = Arc::new(AtomicBool::new(true));
    let bus = model::FrameBus::new();
    let model_thread = model::spawn(
        ball,
        Arc::clone(&clock),
        app.model.frame_seconds,
        bus.clone(),
        Arc::clone(&running),
    )
    .context("Failed to start model thread")?;

    let listener = TcpListener::bind(&app.server.bind)
        .with_context(|| format!("Failed to bind {}", app.server.bind))?;

    let context = server::ServerContext {
        services: SessionServices {
            resolver: table,
            units: Arc::new(LinearUnitSystem::new()),
            clock,
        },
        session_config: app.session.clone(),
        bus,
        running: Arc::clone(&running),
        resource_dir: args
            .resource_dir
            .clone()
            .or_else(|| app.server.resource_dir.as_ref().map(PathBuf::from)),
    };

    let result = server::serve(listener, context);

    running.store(false, Ordering::Relaxed);
    if model_thread.join().is_err() {
        log::error!("Model thread panicked");
    }
    result
}

/// Command-line flags win over the config file
fn apply_overrides(app: &mut config::AppConfig, args: &Args) -> Result<()> {
    if let Some(bind) = &args.bind {
        app.server.bind = bind.clone();
    }
    if let Some(tics) = args.tics_per_second {
        anyhow::ensure!(tics > 0, "--tics-per-second must be positive");
        app.model.tics_per_second = tics;
    }
    if let Some(seconds) = args.frame_seconds {
        anyhow::ensure!(seconds > 0.0, "--frame-seconds must be positive");
        app.model.frame_seconds = seconds;
    }
    Ok(())
}

/// Initialize logging based on verbosity level
fn init_logging(verbose: u8, quiet: bool) {
    use env_logger::Builder;
    use log::LevelFilter;
    use std::io::Write;

    let level = if quiet {
        LevelFilter::Error
    } else {
        match verbose {
            0 => LevelFilter::Info,
            1 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    };

    Builder::new()
        .filter_level(level)
        .format(|buf, record| {
            writeln!(
                buf,
                "[{} {}] {}",
                record.level(),
                record.target(),
                record.args()
            )
        })
        .init();
}
