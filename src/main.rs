//! Corekeeper - single-instance child process supervisor.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use corekeeper::config::AppConfig;
use corekeeper::display;
use corekeeper::events::CoreEvent;
use corekeeper::paths::BaseDirResolver;
use corekeeper::supervisor::{CoreSupervisor, LaunchOptions};

#[derive(Parser)]
#[command(
    name = "corekeeper",
    about = "Supervise a single long-running worker process",
    version
)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short = 'v', long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Path to the TOML config file.
    #[arg(long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Launch and supervise a worker until it exits or Ctrl-C.
    Run {
        /// Executable path or logical name.
        executable: String,
        /// Arguments passed to the worker.
        args: Vec<String>,
        /// Environment overrides, KEY=VALUE, repeatable.
        #[arg(short, long, value_parser = parse_env)]
        env: Vec<(String, String)>,
        /// Logical path of the mirror log file.
        #[arg(long)]
        log_file: Option<String>,
        /// Logical path of the PID marker file.
        #[arg(long)]
        pid_file: Option<String>,
        /// Substring in output that signals the worker is ready.
        #[arg(long)]
        ready_keyword: Option<String>,
        /// Base directory for resolving logical paths.
        #[arg(long)]
        data_dir: Option<PathBuf>,
    },
}

fn parse_env(s: &str) -> Result<(String, String), String> {
    s.split_once('=')
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .ok_or_else(|| format!("invalid KEY=VALUE pair: {s}"))
}

fn init_tracing(verbosity: u8) {
    let level = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = match cli.config {
        Some(ref path) => match AppConfig::load(path) {
            Ok(config) => config,
            Err(e) => {
                display::print_error(&e.to_string());
                std::process::exit(1);
            }
        },
        None => AppConfig::default(),
    };

    match cli.command {
        Commands::Run {
            executable,
            args,
            env,
            log_file,
            pid_file,
            ready_keyword,
            data_dir,
        } => {
            let resolver = match data_dir {
                Some(dir) => BaseDirResolver::new(dir),
                None => BaseDirResolver::from_data_dir("corekeeper"),
            };

            let mut options = LaunchOptions::new();
            options.env = env.into_iter().collect();
            options.log_file = log_file;
            options.pid_file = pid_file;
            options.ready_keyword = ready_keyword;

            let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
            let supervisor = CoreSupervisor::new(resolver, tx)
                .with_exit_on_shutdown(config.exit_core_on_shutdown);

            match supervisor.launch(&executable, &args, &options).await {
                Ok(pid) => display::print_launched(pid),
                Err(e) => {
                    display::print_error(&e.to_string());
                    std::process::exit(1);
                }
            }

            let clean = run_event_loop(&supervisor, rx).await;
            supervisor.shutdown().await;
            if !clean {
                std::process::exit(1);
            }
        }
    }
}

/// Render notifications until the worker terminates, stopping it on
/// Ctrl-C. Returns whether the worker ended cleanly.
async fn run_event_loop(
    supervisor: &CoreSupervisor,
    mut rx: tokio::sync::mpsc::UnboundedReceiver<CoreEvent>,
) -> bool {
    let mut stopping = false;
    loop {
        tokio::select! {
            event = rx.recv() => match event {
                Some(CoreEvent::Stopped { error }) => {
                    let clean = error.is_none();
                    display::print_event(&CoreEvent::Stopped { error });
                    // A stop we asked for is a clean end regardless of
                    // how the worker reported it.
                    return clean || stopping;
                }
                Some(event) => display::print_event(&event),
                None => return true,
            },
            _ = tokio::signal::ctrl_c(), if !stopping => {
                stopping = true;
                if let Err(e) = supervisor.stop().await {
                    display::print_error(&e.to_string());
                    return false;
                }
            }
        }
    }
}
