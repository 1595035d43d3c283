use std::sync::Arc;

use clap::Parser;
use drivechat::config::{Cli, Command};
use drivechat::web::{AppState, run_server};
use drivechat::{chat, services, telemetry};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    telemetry::init();

    let cli = Cli::parse();
    match cli.command {
        Command::Chat => chat::run(cli.app).await,
        Command::Serve(serve) => {
            services::api_key(&cli.app)?;
            let state = AppState::new(Arc::new(services::GoogleConnector::new(cli.app)));
            run_server(state, serve).await
        }
    }
}
