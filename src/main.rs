use axum::serve;
use parcel_filings::api::routes::create_router;
use parcel_filings::build_state;
use parcel_filings::config::AppConfig;
use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if it exists
    dotenvy::dotenv().ok();

    // Initialize logging: Info by default, HTTP client internals at Warn, RUST_LOG wins
    use env_logger::Builder;
    use log::LevelFilter;

    Builder::new()
        .filter_level(LevelFilter::Info)
        .filter_module("reqwest", LevelFilter::Warn)
        .filter_module("hyper", LevelFilter::Warn)
        .parse_default_env()
        .init();

    log::info!("Parcel filings proxy starting");

    // Load configuration
    let config = AppConfig::load()?;
    log::info!(
        "Configuration loaded: server={}:{} socrata={} token={}",
        config.server.host,
        config.server.port,
        config.socrata.base_url,
        if config.socrata.app_token.is_some() { "set" } else { "unset" }
    );

    let state = build_state(&config)?;
    if !state.geoclient.is_configured() {
        log::warn!("GEOCLIENT_KEY is not set; /api/geoclient/address will answer 500");
    }

    run_server(create_router().with_state(state), &config).await?;

    Ok(())
}

async fn run_server(app: axum::Router, config: &AppConfig) -> anyhow::Result<()> {
    let bind_address = config.server_address();
    let listener = TcpListener::bind(&bind_address).await?;
    log::info!("Parcel filings proxy running on http://{}", bind_address);

    serve(listener, app).await?;

    Ok(())
}
