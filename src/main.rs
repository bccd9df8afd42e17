use std::sync::Arc;

use axum::{Router, routing};
use tracing::info;
use woodpecker_template_config::AppState;
use woodpecker_template_config::config::{self, ServiceConfig};
use woodpecker_template_config::forge::ForgeSettings;
use woodpecker_template_config::handlers::{handle_template_config, healthz};
use woodpecker_template_config::signature::RequestVerifier;

#[tokio::main]
async fn main() {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt::init();

    let service_config = ServiceConfig::from_env();

    // The service must not start without a working trust key.
    let public_key = match config::load_public_key(&service_config.public_key_path) {
        Ok(key) => key,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    if let Some(bundle) = &service_config.extra_ca_bundle {
        if let Err(e) = config::validate_ca_bundle(bundle) {
            eprintln!("Configuration error: {}", e);
            std::process::exit(1);
        }
    }

    let state = Arc::new(AppState {
        verifier: RequestVerifier::new(public_key),
        forge: ForgeSettings {
            extra_ca_bundle: service_config.extra_ca_bundle.clone(),
        },
        templates_path: service_config.templates_path.clone(),
    });

    let app = Router::new()
        .route("/templateconfig", routing::post(handle_template_config))
        .route("/healthz", routing::get(healthz))
        .with_state(state);

    info!("Listening on {}", service_config.bind_address);
    info!("Using templates at {:?}", service_config.templates_path);
    let listener = match tokio::net::TcpListener::bind(&service_config.bind_address).await {
        Ok(listener) => listener,
        Err(e) => {
            eprintln!(
                "Configuration error: Failed to bind '{}': {}",
                service_config.bind_address, e
            );
            std::process::exit(1);
        }
    };
    if let Err(e) = axum::serve(listener, app).await {
        eprintln!("Server error: {}", e);
        std::process::exit(1);
    }
}
