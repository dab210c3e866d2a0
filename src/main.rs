use clap::Parser;
use color_eyre::eyre::Result;
use payment_bank::{
    client,
    config::AppConfig,
};

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let app_config = AppConfig::parse();
    // flushes the log file on drop
    let _guard = client::init_tracing(&app_config.log_dir)?;
    tracing::info!(network = ?app_config.network, "starting payment-bank client");
    client::run_app(app_config).await
}
