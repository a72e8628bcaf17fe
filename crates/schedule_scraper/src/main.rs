use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use schedule_scraper::config::ScraperConfig;
use schedule_scraper::db::SwitchController;
use schedule_scraper::extract::TimeScheduleExtractor;
use schedule_scraper::fetch::HttpFetcher;
use schedule_scraper::scrape::{Scraper, StopCondition};
use schedule_scraper::server;
use schedule_scraper::types::AppState;
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let config = ScraperConfig::load(std::env::args_os().nth(1).map(PathBuf::from))
        .context("Failed to load configuration")?;
    info!(
        root = %config.root_url,
        data_dir = %config.data_dir.display(),
        mode = ?config.mode,
        "Starting schedule scraper"
    );

    let switch = Arc::new(
        SwitchController::open(&config.data_dir).context("Failed to open stores")?,
    );

    if let Some(address) = config.bind_address.clone() {
        let listener = tokio::net::TcpListener::bind(&address)
            .await
            .with_context(|| format!("Failed to bind {address}"))?;
        let router = server::create_router(Arc::new(AppState::new(Arc::clone(&switch))));
        info!("Serving live snapshot on {}", address);
        tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, router).await {
                error!("Read API stopped: {}", e);
            }
        });
    }

    let fetcher = HttpFetcher::new(&config).context("Failed to build HTTP client")?;
    let scraper = Scraper::new(switch, fetcher, TimeScheduleExtractor, config)?;

    tokio::select! {
        result = scraper.run(StopCondition::Never) => {
            if let Err(e) = &result {
                error!(error = %e, "Refresh loop stopped on fatal error");
            }
            result?;
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl-C, shutting down");
        }
    }

    Ok(())
}
