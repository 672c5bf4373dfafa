use anyhow::{Context, Result};
use benchdiff::cancel::CancelToken;
use benchdiff::cli::Cli;
use benchdiff::config::BenchConfig;
use benchdiff::pipeline::{Pipeline, Request};
use clap::Parser;
use tracing_subscriber::EnvFilter;

/// Initialize the stderr log subscriber.
///
/// `RUST_LOG` is honoured; `--debug` forces everything on.
fn init_tracing(debug: bool) {
    let filter = if debug {
        EnvFilter::from_default_env().add_directive(tracing::Level::TRACE.into())
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .with_target(false)
        .init();
}

fn main() -> Result<()> {
    let args = Cli::parse();

    init_tracing(args.debug);

    let repo = std::env::current_dir().context("determining repository directory")?;
    let config = BenchConfig::discover(&repo, args.config.as_deref())?.merge_cli(&args);

    let cancel = CancelToken::new();
    cancel.install_handler()?;

    let request = Request::from_cli(&args, repo, config);
    let mut stdout = std::io::stdout().lock();
    Pipeline::new(request)
        .with_cancel(cancel)
        .run(&mut stdout)?;

    Ok(())
}
