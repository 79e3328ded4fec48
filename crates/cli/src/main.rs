//! CLI entry point for wav2flac
//!
//! Parses command line arguments, merges them over the configuration, and runs
//! one batch. The hidden `worker` subcommand is the child side of process
//! isolation mode.

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use wav2flac::{
    format_report, run_batch, run_worker, Config, IsolationMode, RunLogSession, WorkerLauncher,
    WorkerRequest,
};

/// Default configuration file, read only when present
const DEFAULT_CONFIG_FILE: &str = "wav2flac.toml";

/// Subcommand used to re-run this binary as an isolated worker
const WORKER_SUBCOMMAND: &str = "worker";

/// Convert every WAV file under a folder to FLAC and archive the originals
#[derive(Parser, Debug)]
#[command(name = "wav2flac")]
#[command(author, version, about, long_about = None)]
#[command(subcommand_negates_reqs = true, args_conflicts_with_subcommands = true)]
struct Args {
    /// Input root directory
    #[arg(value_name = "FOLDER", required = true)]
    folder: Option<PathBuf>,

    /// FLAC compression level (0-12)
    #[arg(short, long, value_parser = clap::value_parser!(u8).range(0..=12))]
    compression: Option<u8>,

    /// Number of concurrent workers (default: config or CPU count)
    #[arg(short, long)]
    threads: Option<u32>,

    /// Run each conversion in its own worker process
    #[arg(long)]
    use_process: bool,

    /// Directory that receives the converted originals
    #[arg(long, value_name = "DIR")]
    archive_dir: Option<PathBuf>,

    /// Encoder program
    #[arg(long, value_name = "PROGRAM")]
    encoder: Option<PathBuf>,

    /// Directory for the temporary and dated run logs
    #[arg(long, value_name = "DIR")]
    log_dir: Option<PathBuf>,

    /// Configuration file (default: wav2flac.toml, if present)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Exit non-zero when any file failed to convert
    #[arg(long)]
    strict: bool,

    /// Verbose console output
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Convert a single item on behalf of a parent run
    #[command(hide = true)]
    Worker {
        /// Run log sink to append to
        #[arg(long)]
        sink: PathBuf,

        /// JSON-encoded work request
        #[arg(long)]
        request: String,
    },
}

fn init_tracing(verbose: bool) {
    // RUST_LOG wins; otherwise info, or debug for our crates when verbose
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if verbose {
            "info,wav2flac=debug".to_string()
        } else {
            "info".to_string()
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(env_filter.as_str())
        .with_writer(std::io::stderr)
        .init();
}

/// Merge command line flags over the loaded configuration
fn apply_args(config: &mut Config, args: &Args) {
    if let Some(level) = args.compression {
        config.encoder.compression_level = level;
    }
    if let Some(threads) = args.threads {
        config.pool.workers = threads;
    }
    if args.use_process {
        config.pool.use_process = true;
    }
    if let Some(dir) = &args.archive_dir {
        config.archive.path = Some(dir.clone());
    }
    if let Some(encoder) = &args.encoder {
        config.encoder.program = encoder.clone();
    }
    if let Some(dir) = &args.log_dir {
        config.logging.dir = dir.clone();
    }
}

fn load_config(args: &Args) -> Result<Config, wav2flac::config::ConfigError> {
    let mut config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::load_or_default(DEFAULT_CONFIG_FILE)?,
    };
    apply_args(&mut config, args);
    Ok(config)
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    init_tracing(args.verbose);

    if let Some(Command::Worker { sink, request }) = &args.command {
        return worker_main(sink, request);
    }

    let Some(folder) = args.folder.clone() else {
        eprintln!("No input folder given");
        return ExitCode::from(2);
    };

    let config = match load_config(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    let session = match RunLogSession::start(&config.logging.dir) {
        Ok(session) => session,
        Err(e) => {
            eprintln!("{}", e);
            return ExitCode::FAILURE;
        }
    };
    let log = session.log().clone();
    log.info(format!(
        "Run {} started for {}",
        session.id().simple(),
        folder.display()
    ));

    let code = match isolation_mode(&config) {
        Ok(mode) => match run_batch(&folder, &config, mode, &log).await {
            Ok(summary) => {
                println!("{}", summary);
                if args.strict && summary.has_failures() {
                    ExitCode::FAILURE
                } else {
                    ExitCode::SUCCESS
                }
            }
            Err(e) => {
                log.error(format!("Fatal: {}", e));
                ExitCode::FAILURE
            }
        },
        Err(e) => {
            log.error(format!("Fatal: cannot locate worker executable: {}", e));
            ExitCode::FAILURE
        }
    };

    drop(log);
    match session.finish() {
        Ok(master) => tracing::debug!(path = %master.display(), "Run log merged"),
        Err(e) => eprintln!(
            "{}; temporary log kept at {}",
            e,
            e.sink().display()
        ),
    }

    code
}

fn isolation_mode(config: &Config) -> std::io::Result<IsolationMode> {
    if config.pool.use_process {
        Ok(IsolationMode::Processes(WorkerLauncher::current_exe(
            WORKER_SUBCOMMAND,
        )?))
    } else {
        Ok(IsolationMode::Threads)
    }
}

/// Child side of process isolation: convert one item and report on stdout
fn worker_main(sink: &Path, request: &str) -> ExitCode {
    let request: WorkerRequest = match serde_json::from_str(request) {
        Ok(request) => request,
        Err(e) => {
            eprintln!("Invalid worker request: {}", e);
            return ExitCode::from(2);
        }
    };

    let outcome = match run_worker(&request, sink) {
        Ok(outcome) => outcome,
        Err(e) => {
            eprintln!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    match format_report(&outcome) {
        Ok(report) => {
            println!("{}", report);
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Failed to encode worker report: {}", e);
            ExitCode::FAILURE
        }
    }
}
