use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Result;
use tracing_subscriber::EnvFilter;

use tpm::app::App;
use tpm::model::config::{self, AppConfig};
use tpm::msg::Cli;
use tpm::plugin::host_fns::ConsoleSink;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse(std::env::args().skip(1));
    let config = AppConfig::load(cli.config.as_deref())?;

    // Initialize logging to file (never stdout)
    let log_dir = config::data_dir().join("logs");
    std::fs::create_dir_all(&log_dir)?;

    let file_appender = tracing_appender::rolling::daily(&log_dir, "tpm.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);
    let filter = EnvFilter::try_from_env("TPM_LOG")
        .unwrap_or_else(|_| EnvFilter::new(&config.log.level));
    tracing_subscriber::fmt()
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_env_filter(filter)
        .init();

    tracing::info!("tpm starting: {:?}", cli.msg);

    let mut app = App::new(&config, Arc::new(ConsoleSink::default()))?;
    match app.update(cli.msg).await {
        Ok(()) => Ok(ExitCode::SUCCESS),
        // Already shown to the user by the sink.
        Err(err) => {
            tracing::error!("{err:#}");
            Ok(ExitCode::FAILURE)
        }
    }
}
