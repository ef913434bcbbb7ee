use anyhow::Result;
use clap::Parser;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

mod cli;
mod config;
mod runtime;
mod startup;
mod telemetry;
mod web;

use cli::{Cli, LogFormat, LogLevel};
use runtime::Runtime;
use startup::{StartupSequencer, StartupState, ValidationVerdict};

fn init_logging(level: LogLevel, format: LogFormat) {
    // RUST_LOG wins over --log.level so individual modules can be tuned.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.as_filter()));

    let builder = fmt().with_env_filter(filter).with_writer(std::io::stderr);
    match format {
        LogFormat::Logfmt => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

async fn serve(state: StartupState) -> Result<()> {
    let runtime = Arc::new(Runtime::assemble(state)?);
    runtime.prepare_storage()?;
    web::serve(runtime).await?;
    info!("See you next time!");
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            // --help and --version come through here too.
            let code = if e.use_stderr() {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            };
            let _ = e.print();
            return code;
        }
    };

    init_logging(cli.log_level, cli.log_format);

    let sequencer = StartupSequencer::default();
    let flags = cli.flag_set();
    let admitted = match sequencer.run(&flags) {
        ValidationVerdict::Accepted(mode) => sequencer.admit(mode, flags),
        ValidationVerdict::Rejected(err) => Err(err),
    };

    let state = match admitted {
        Ok(state) => state,
        Err(err) => {
            error!(
                kind = ?err.kind(),
                stage = %err.stage(),
                flag = err.flag(),
                "{}",
                err
            );
            return ExitCode::from(ValidationVerdict::Rejected(err).exit_code());
        }
    };

    match serve(state).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}
