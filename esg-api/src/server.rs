use axum::http::{HeaderValue, Method};
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use esg_core::{EsgError, EsgResult};

use crate::handlers;
use crate::middleware;
use crate::state::AppState;

fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any);
    if origins.iter().any(|o| o == "*") {
        layer.allow_origin(Any)
    } else {
        let parsed: Vec<HeaderValue> = origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        layer.allow_origin(parsed)
    }
}

/// Builds the full route tree. Health probes, the metric exposition and
/// registration are public; everything else requires a bearer token.
pub fn build_router(state: AppState, cors_origins: &[String]) -> Router {
    let protected = Router::new()
        .route("/analyze", post(handlers::analyze))
        .route("/compare", post(handlers::compare))
        .route("/benchmark", post(handlers::benchmark))
        .route("/frameworks", get(handlers::frameworks))
        .route("/company/:name/history", get(handlers::company_history))
        .route("/analysis/:id/gaps", get(handlers::analysis_gaps))
        .route("/export", post(handlers::export))
        .route("/usage", get(handlers::usage))
        .route("/activity", get(handlers::activity))
        .route_layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::require_bearer,
        ));

    Router::new()
        .route("/health", get(handlers::health))
        .route("/health/detailed", get(handlers::health_detailed))
        .route("/metrics", get(handlers::metrics))
        .route("/auth/register", post(handlers::register))
        .merge(protected)
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::track_metrics,
        ))
        .layer(axum::middleware::from_fn(middleware::request_id))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(cors_origins))
        .with_state(state)
}

/// Serves the API until SIGTERM or ctrl-c, then drains in-flight requests.
pub async fn serve(router: Router, host: &str, port: u16) -> EsgResult<()> {
    let listener = tokio::net::TcpListener::bind((host, port))
        .await
        .map_err(|e| EsgError::Internal {
            message: format!("bind {}:{} failed: {}", host, port, e),
        })?;
    let local = listener.local_addr().map_err(|e| EsgError::Internal {
        message: format!("local_addr failed: {}", e),
    })?;
    tracing::info!(%local, "api server listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| EsgError::Internal {
            message: format!("server terminated abnormally: {}", e),
        })
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };
    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => tracing::warn!(error = %err, "sigterm handler unavailable"),
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("shutdown signal received, draining");
}
