use std::net::SocketAddr;
use std::sync::Arc;

use transform_pack::{api, config, gemini, logging, PromptCatalog};

#[tokio::main]
async fn main() {
    // Load .env first so RUST_LOG from it applies
    config::Config::dotenv_load();
    logging::init();

    let config = config::Config::new().expect("Failed to load configuration");
    config.log_summary();

    let catalog = PromptCatalog::load(config.catalog_path.as_deref())
        .await
        .expect("Failed to load prompt catalog");
    let http = gemini::GeminiClient::http_client(&config).expect("Failed to build HTTP client");
    let factory = api::AppState::gemini_factory(http, &config);
    let state = Arc::new(api::AppState::new(config.clone(), catalog, factory));

    let app = api::router(state);

    // Run our application with safe parsing
    let ip: std::net::IpAddr = config.api_host.parse().unwrap_or_else(|_| {
        tracing::warn!("Invalid API_HOST '{}', falling back to 127.0.0.1", config.api_host);
        std::net::IpAddr::from([127, 0, 0, 1])
    });
    let port: u16 = config.api_port.parse().unwrap_or_else(|_| {
        tracing::warn!("Invalid API_PORT '{}', falling back to 8189", config.api_port);
        8189
    });
    let socket_address = SocketAddr::new(ip, port);
    tracing::info!("listening on {}", socket_address);
    axum::Server::bind(&socket_address)
        .serve(app.into_make_service())
        .await
        .expect("Server error");
}
