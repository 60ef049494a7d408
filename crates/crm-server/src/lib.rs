pub mod routes;
pub mod state;
pub mod store;

use crm_core::config::{AppConfig, ServerConfig};
use crm_core::model::ChatModel;
use crm_core::tool_registry::ToolRegistry;
use axum::http::HeaderValue;
use axum::Router;
use std::sync::Arc;
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::warn;

pub use state::AppState;
pub use store::InteractionStore;

/// Build the axum Router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    let config = state.config.clone();

    let api = Router::new()
        .merge(routes::agent_routes())
        .merge(routes::interaction_routes());

    let prefix = config.server.api_prefix.trim_end_matches('/');
    let api = if prefix.is_empty() {
        api
    } else {
        Router::new().nest(prefix, api)
    };

    let mut app = Router::new()
        .merge(routes::health_routes())
        .merge(api)
        .with_state(state);

    app = app.layer(TraceLayer::new_for_http());

    if config.server.cors {
        app = app.layer(cors_layer(&config.server));
    }

    app
}

/// CORS for the configured browser origins. Credentials are allowed, so
/// methods and headers are mirrored rather than wildcarded.
fn cors_layer(server: &ServerConfig) -> CorsLayer {
    let origins: Vec<HeaderValue> = server
        .cors_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("Ignoring invalid CORS origin: {}", origin);
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_credentials(true)
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request())
}

/// Start the HTTP server.
pub async fn serve(
    config: AppConfig,
    model: Arc<dyn ChatModel>,
    tool_registry: Arc<ToolRegistry>,
) -> anyhow::Result<()> {
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let state = AppState::new(config, model, tool_registry)?;
    let router = build_router(state);

    tracing::info!("Starting server on {}", addr);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, router).await?;

    Ok(())
}
