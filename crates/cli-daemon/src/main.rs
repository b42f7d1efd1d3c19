//! CLI entry point for the frame average daemon
//!
//! Parses command line arguments, prepares the working directory and runs the
//! daemon until Ctrl-C.

use avgframe_daemon::{Config, Daemon};
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Frame Average Daemon - averages every frame of each dropped-in video into one image
#[derive(Parser, Debug)]
#[command(name = "avgframed")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file; defaults are used if it does not exist
    #[arg(short, long, default_value = "avgframe.toml")]
    config: PathBuf,

    /// Working directory holding in/ and out/ (overrides the config file)
    #[arg(short, long)]
    workdir: Option<PathBuf>,

    /// Empty in/ and out/ before starting
    #[arg(long, default_value = "false")]
    clean: bool,

    /// Skip startup checks (ffmpeg, ffprobe). For testing only.
    #[arg(long, default_value = "false")]
    skip_checks: bool,

    /// Log at debug level unless RUST_LOG is set
    #[arg(short, long, default_value = "false")]
    verbose: bool,
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(args.verbose);

    let mut config = match Config::load_or_default(&args.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load config {}: {}", args.config.display(), e);
            return ExitCode::FAILURE;
        }
    };
    if let Some(workdir) = args.workdir {
        config.workdir.root = workdir;
    }
    config.workdir.clean |= args.clean;

    info!(
        config = %args.config.display(),
        workdir = %config.workdir.root.display(),
        "Frame average daemon starting"
    );

    let daemon_result = if args.skip_checks {
        warn!("Skipping startup checks (--skip-checks enabled)");
        Daemon::new_without_checks(config)
    } else {
        Daemon::new(config)
    };

    let mut daemon = match daemon_result {
        Ok(daemon) => daemon,
        Err(e) => {
            eprintln!("Failed to initialize daemon: {}", e);
            return ExitCode::FAILURE;
        }
    };

    info!(
        workers = daemon.plan.workers,
        "Daemon initialized; drop videos into {}",
        daemon.workdir.in_dir.display()
    );

    let run_result = daemon.run_until_ctrl_c().await;

    let report_path = daemon.workdir.report_path();
    match daemon.report().write_json(&report_path) {
        Ok(()) => info!(
            items = daemon.report().count(),
            path = %report_path.display(),
            "Report written"
        ),
        Err(e) => error!(path = %report_path.display(), error = %e, "Failed to write report"),
    }

    if let Err(e) = run_result {
        eprintln!("Daemon error: {}", e);
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}
