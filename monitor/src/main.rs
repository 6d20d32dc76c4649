//! OmeroFS Monitor - standalone watch client.
//!
//! This binary runs a single monitor in-process and prints every notification
//! to stdout as one JSON object per line. It is the quickest way to see what a
//! watch spec reports before registering it with the server.
//!
//! # Commands
//!
//! - `omerofs-monitor watch <PATH>`: Watch a directory until stopped
//!
//! # Environment Variables
//!
//! See the [`config`](omerofs_monitor::config) module for available
//! configuration options.

use std::io::{self, Write};
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use omerofs_monitor::config::Config;
use omerofs_monitor::factory::MonitorFactory;
use omerofs_monitor::notifier::{Notification, Notifier};
use omerofs_monitor::types::{EventType, MonitorId, MonitorKind, PathMode, WatchSpec};
use omerofs_monitor::watch::{BackendKind, NotifyBackend};

/// OmeroFS Monitor - filtered, batched file system watches.
#[derive(Parser, Debug)]
#[command(name = "omerofs-monitor")]
#[command(author, version, about, long_about = None)]
#[command(after_help = "\
ENVIRONMENT VARIABLES:
    OMEROFS_BACKEND            Watch backend: native or poll (default: native)
    OMEROFS_POLL_INTERVAL_MS   Poll backend scan interval (default: 1000)
    OMEROFS_BLOCK_SIZE         Default notification block size (default: 100)
    OMEROFS_TIMEOUT_MS         Default timeout (default: 10000)
    OMEROFS_DELIVERY_CAPACITY  Queued notifications per monitor (default: 1024)
    RUST_LOG                   Log filter (default: info)

EXAMPLES:
    # Report new images in a directory tree, five at a time
    omerofs-monitor watch /data/incoming --recursive --whitelist jpg,tif --block-size 5

    # Wait for the first file to appear, giving up after a minute
    omerofs-monitor watch /data/dropbox --kind one-shot --timeout-ms 60000
")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

/// CLI subcommands.
#[derive(Subcommand, Debug)]
enum Command {
    /// Watch a directory and print notifications as JSON lines.
    ///
    /// Runs until Ctrl+C, or until a one-shot or inactivity monitor ends.
    Watch(WatchArgs),
}

#[derive(clap::Args, Debug)]
struct WatchArgs {
    /// Directory to watch.
    path: PathBuf,

    /// Monitor kind: persistent, one-shot, or inactivity.
    #[arg(short, long, default_value = "persistent")]
    kind: String,

    /// Watch the whole directory tree instead of the top level only.
    #[arg(short, long)]
    recursive: bool,

    /// Event types to report (comma-separated: create, modify, delete).
    #[arg(short, long, value_delimiter = ',')]
    events: Option<Vec<EventType>>,

    /// Extensions or file names to report (comma-separated).
    #[arg(short, long, value_delimiter = ',')]
    whitelist: Vec<String>,

    /// Subdirectories whose contents are never reported (comma-separated).
    #[arg(short, long, value_delimiter = ',')]
    blacklist: Vec<String>,

    /// Ignore operating system junk such as .DS_Store and Thumbs.db.
    #[arg(long)]
    ignore_sys_files: bool,

    /// Ignore events on directories.
    #[arg(long)]
    ignore_dir_events: bool,

    /// Flush timeout (persistent) or expiry (one-shot, inactivity), in milliseconds.
    #[arg(short, long)]
    timeout_ms: Option<u64>,

    /// Number of events that triggers an immediate flush.
    #[arg(long)]
    block_size: Option<usize>,

    /// Watch backend, overriding OMEROFS_BACKEND.
    #[arg(long)]
    backend: Option<BackendKind>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Watch(args) => {
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()
                .context("Failed to create tokio runtime")?;

            runtime.block_on(run_watch(args))
        }
    }
}

/// Runs a single monitor until it ends or a shutdown signal arrives.
async fn run_watch(args: WatchArgs) -> Result<()> {
    init_logging();

    let mut config = Config::from_env().context("Failed to load configuration")?;
    if let Some(backend) = args.backend {
        config.backend = backend;
    }

    let kind: MonitorKind = args.kind.parse()?;
    let spec = build_spec(&args, &config);

    let factory = MonitorFactory::new(NotifyBackend::new(config.backend, config.poll_interval));
    let id = MonitorId::generate();
    let (notifier, mut rx) = Notifier::channel(id.clone(), config.delivery_capacity);

    let monitor = factory
        .build(kind, id.clone(), spec, notifier)
        .with_context(|| format!("Failed to create monitor for {}", args.path.display()))?;
    monitor.start().context("Failed to start monitor")?;

    info!(
        monitor_id = %id,
        kind = %kind,
        root = %monitor.spec().root.display(),
        backend = %config.backend,
        "Watching"
    );

    let shutdown = wait_for_shutdown();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            notification = rx.recv() => {
                let Some(notification) = notification else {
                    break;
                };
                print_notification(&notification)?;
                // Terminal states are entered before their last notification is queued.
                if monitor.state().is_terminal() {
                    info!(state = %monitor.state(), "Monitor ended");
                    break;
                }
            }
            () = &mut shutdown => {
                info!("Shutdown signal received");
                break;
            }
        }
    }

    if let Err(e) = monitor.stop() {
        warn!(error = %e, "Failed to stop monitor cleanly");
    }
    Ok(())
}

/// Builds the watch spec from command line arguments and engine defaults.
fn build_spec(args: &WatchArgs, config: &Config) -> WatchSpec {
    let mut spec = WatchSpec::new(&args.path)
        .with_path_mode(if args.recursive {
            PathMode::Follow
        } else {
            PathMode::Flat
        })
        .with_whitelist(args.whitelist.iter().cloned())
        .with_blacklist(args.blacklist.iter().cloned())
        .ignore_sys_files(args.ignore_sys_files)
        .ignore_dir_events(args.ignore_dir_events)
        .with_timeout(
            args.timeout_ms
                .map_or(config.default_timeout, Duration::from_millis),
        )
        .with_block_size(args.block_size.unwrap_or(config.default_block_size));

    if let Some(events) = &args.events {
        spec = spec.with_event_types(events.iter().copied());
    }
    spec
}

/// Writes a notification to stdout as a single JSON line.
fn print_notification(notification: &Notification) -> Result<()> {
    let line = serde_json::to_string(notification).context("Failed to encode notification")?;
    let mut stdout = io::stdout().lock();
    writeln!(stdout, "{line}")?;
    stdout.flush()?;
    Ok(())
}

/// Initializes the tracing subscriber for logging.
///
/// Logs go to stderr so that stdout carries only notifications.
fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(true)
        .with_level(true)
        .init();
}

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn wait_for_shutdown() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}
