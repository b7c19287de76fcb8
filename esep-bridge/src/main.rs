use std::fs::File;
use std::sync::Mutex;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use esep_bridge::app::{self, Prepared};
use esep_bridge::cli::Args;
use esep_core::SessionConfig;

pub fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = SessionConfig::load_or_default(args.config.as_deref())?;
    args.apply(&mut config);

    let Prepared {
        script,
        artifacts,
        trace,
    } = app::prepare(&config, &chrono::Local::now())?;
    init_tracing(trace);
    tracing::info!("=== ESEP Starting === log: {}", artifacts.log.display());
    tracing::info!(
        "Script {} loaded: phase order {:?}",
        config.script.display(),
        script.phase_numbers()
    );

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("cannot start the async runtime")?;

    let result = runtime.block_on(app::run(config, script, artifacts));
    if let Err(e) = &result {
        tracing::error!("Session aborted: {:#}", e);
    }
    result
}

/// The terminal belongs to the console, so traces go to a file.
/// Level comes from `ESEP_LOG` (default `info`).
fn init_tracing(file: File) {
    let filter = EnvFilter::try_from_env("ESEP_LOG")
        .unwrap_or_else(|_| EnvFilter::new("info,hyper=warn,reqwest=warn"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(false)
        .with_target(false)
        .with_writer(Mutex::new(file))
        .init();
}
