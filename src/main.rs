use std::io::Write;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use git_vault::cli::{render_error, run, Cli, LOG_ENV_VAR};

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.quiet);
    let error_format = cli.error_format;
    match run(cli) {
        Ok(code) => std::process::exit(code),
        Err(error) => {
            let stderr = std::io::stderr();
            let mut handle = stderr.lock();
            let _ = handle.write_all(format!("{}\n", render_error(&error, error_format)).as_bytes());
            let _ = handle.flush();
            std::process::exit(1);
        }
    }
}

fn init_tracing(quiet: bool) {
    let default_directive = if quiet { "error" } else { "warn" };
    let filter = EnvFilter::try_from_env(LOG_ENV_VAR)
        .unwrap_or_else(|_| EnvFilter::new(default_directive));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .with_target(false)
        .try_init();
}
