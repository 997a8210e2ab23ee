use anyhow::Result;
use std::sync::Arc;
use tracing::info;

use placescrape::config::{AppConfig, ConfigOverrides};
use placescrape::logging::{self, LogContext};
use placescrape::scraper::browser::PlaywrightLauncher;
use placescrape::PlaceScrapeService;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let mut config = match std::env::var("PLACESCRAPE_CONFIG") {
        Ok(path) => AppConfig::load_from_file(&path).await?,
        Err(_) => AppConfig::load().await?,
    };
    ConfigOverrides::apply(&mut config);
    config.validate()?;
    config.ensure_directories().await?;

    // Initialize logging
    logging::init_logging(&config.logging)?;
    let context = LogContext::new("main", "startup")
        .with_string_field("version", env!("CARGO_PKG_VERSION"));
    placescrape::log_info!(context, "PlaceScrape starting up");

    // Initialize the core application
    let launcher = Arc::new(PlaywrightLauncher::new(&config.scraping).await?);
    let service = PlaceScrapeService::new(config, launcher)?;
    info!("Core application initialized");

    serve(service).await?;

    info!("PlaceScrape shutting down");
    Ok(())
}

#[cfg(feature = "api")]
async fn serve(service: PlaceScrapeService) -> Result<()> {
    use actix_web::{middleware::Condition, web, App, HttpServer};

    let api = service.config().api.clone();
    info!("Starting API server on {}:{}", api.host, api.port);

    let enable_cors = api.enable_cors;
    let data = web::Data::new(service);
    HttpServer::new(move || {
        App::new()
            .wrap(Condition::new(enable_cors, placescrape::api::cors_headers()))
            .app_data(data.clone())
            .configure(placescrape::api::configure_routes)
    })
    .bind((api.host.as_str(), api.port))?
    .run()
    .await?;

    Ok(())
}

#[cfg(not(feature = "api"))]
async fn serve(_service: PlaceScrapeService) -> Result<()> {
    tracing::warn!("API feature not enabled - use placescrape-cli to run jobs");
    Ok(())
}
