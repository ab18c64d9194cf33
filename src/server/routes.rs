use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::extract::rejection::BytesRejection;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use tracing::{debug, error, info, warn};

use crate::discovery::{DiscoveryInput, Storage, validate_input};
use crate::finder::Finder;
use crate::server::metrics::{self, Snapshot};

#[derive(Clone)]
pub struct AppState {
    pub finder: Arc<Finder>,
    pub storage: Arc<dyn Storage>,
    /// Prefix of every exported metric name
    pub namespace: Arc<str>,
}

pub fn router(state: AppState, metrics_path: &str) -> Router {
    Router::new()
        .route("/discover", post(discover))
        .route(metrics_path, get(export_metrics))
        .with_state(state)
}

/// Accept the images one producer found on one instance
async fn discover(
    State(state): State<AppState>,
    body: Result<Bytes, BytesRejection>,
) -> Response {
    let body = match body {
        Ok(body) => body,
        Err(e) => {
            warn!("Failed to read discover payload: {}", e);
            return (StatusCode::BAD_REQUEST, "unable to read payload").into_response();
        }
    };

    let input: DiscoveryInput = match serde_json::from_slice(&body) {
        Ok(input) => input,
        Err(e) => {
            warn!("Failed to decode discover payload: {}", e);
            return (StatusCode::BAD_REQUEST, "unable to decode payload into JSON")
                .into_response();
        }
    };

    let errors = validate_input(&input);
    if !errors.is_empty() {
        warn!(
            "Rejected discover payload of {} on {} with {} errors",
            input.name,
            input.instance,
            errors.len()
        );
        let message: String = errors.iter().map(|e| format!("{}\n", e)).collect();
        return (StatusCode::BAD_REQUEST, message).into_response();
    }

    if let Err(e) = state.storage.write(&input) {
        error!("Failed to write discover payload: {}", e);
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            "unable to write payload to storage",
        )
            .into_response();
    }

    info!(
        "Stored {} images of {} on {}",
        input.images.len(),
        input.name,
        input.instance
    );
    StatusCode::CREATED.into_response()
}

async fn export_metrics(State(state): State<AppState>) -> Response {
    let results = state.finder.find().await;
    if let Err(e) = &results {
        error!("Find images failed: {}", e);
    }

    let snapshot = Snapshot {
        results: results.as_deref().ok(),
        skipped_total: state.finder.skipped_total(),
        errors_total: state.finder.errors_total(),
    };
    debug!("Exporting metrics");

    (
        [(header::CONTENT_TYPE, metrics::CONTENT_TYPE)],
        metrics::render(&state.namespace, &snapshot),
    )
        .into_response()
}
