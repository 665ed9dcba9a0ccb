use std::env;
use std::io;
use std::path::PathBuf;
use std::process;

use clap::Parser;
use clap::error::ErrorKind;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use cut_and_run::config::{self, RunConfig, THREADS_ENV, TOOL_NAME};
use cut_and_run::error::{Error, exit_code};

#[derive(Parser)]
#[command(
    name = "cut-and-run",
    version,
    about = "Process a file in line-aligned pieces, one command per piece, in parallel",
    after_help = "Each worker runs COMMAND under 'sh -c' with its piece on stdin and stdout\n\
                  redirected to OUTPUT_STEM + zero-padded worker index + EXTENSION.\n\
                  The target path is also exported to the command as $FILE.\n\
                  An OUTPUT_STEM of /dev/null sends every worker's output there."
)]
struct Cli {
    /// Number of workers (default: $OMP_NUM_THREADS, else the number of CPUs)
    #[arg(short = 'j', long = "threads", value_name = "N")]
    threads: Option<String>,

    /// Exit as soon as any worker fails instead of waiting for the rest
    #[arg(long = "fail-fast")]
    fail_fast: bool,

    /// Print progress diagnostics to stderr
    #[arg(short = 'v', long = "verbose")]
    verbose: bool,

    /// File to process
    input: PathBuf,

    /// Shell command that reads a piece on stdin
    command: String,

    /// Prefix of the per-worker output files
    output_stem: String,

    /// Appended after the worker index
    extension: Option<String>,
}

fn parse_args() -> Cli {
    match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
            let _ = e.print();
            process::exit(exit_code::OK);
        }
        Err(e) => {
            let msg = e.to_string();
            let msg = msg.trim_end();
            fail(&Error::Usage(
                msg.strip_prefix("error: ").unwrap_or(msg).to_string(),
            ))
        }
    }
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "info" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr).with_target(false))
        .with(filter)
        .init();
}

fn fail(e: &Error) -> ! {
    eprintln!("{}: {}", TOOL_NAME, e);
    process::exit(e.exit_code());
}

fn main() {
    let cli = parse_args();
    init_tracing(cli.verbose);

    // Worker count is settled before any file is touched
    let env_threads = env::var_os(THREADS_ENV).map(|v| v.to_string_lossy().into_owned());
    let thread_count = config::resolve_thread_count(cli.threads.as_deref(), env_threads.as_deref())
        .unwrap_or_else(|e| fail(&e));
    tracing::info!(threads = thread_count, "worker count resolved");

    let config = RunConfig {
        input: cli.input,
        command: cli.command,
        stem: cli.output_stem,
        extension: cli.extension.unwrap_or_default(),
        thread_count,
        fail_fast: cli.fail_fast,
    };

    if let Err(e) = cut_and_run::run(&config) {
        fail(&e);
    }
}
