//! HTTP server for the battlemap image API
//!
//! Two public GET routes: the image endpoint renders a `data` payload to
//! SVG, and the backgrounds endpoint lists the registered textures. The
//! image endpoint always answers `200 OK` with `image/svg+xml`; malformed
//! input gets the diagnostic error SVG so a browser `<img>` still shows
//! something instead of a broken icon.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use tracing::{error, info};

use crate::compose;
use crate::payload;
use crate::registry::{TextureInfo, TextureRegistry};

/// Successful renders are immutable for a given payload, cache for 7 days.
const CACHE_CONTROL_OK: &str = "public, max-age=604800";

/// Shared immutable server state.
pub struct AppState {
    pub registry: TextureRegistry,
    pub base_url: String,
}

/// Build the application router.
pub fn build_router(state: AppState) -> Router {
    let state = Arc::new(state);
    Router::new()
        .route("/api/battlemap-image", get(battlemap_image))
        .route("/api/battlemap-image/backgrounds", get(backgrounds))
        .with_state(state)
}

/// Bind and serve until the process is stopped.
pub async fn serve(addr: &str, base_url: &str) -> std::io::Result<()> {
    let state = AppState {
        registry: TextureRegistry::from_embedded_assets(),
        base_url: base_url.to_string(),
    };
    let router = build_router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(addr, "battlemap server listening");
    axum::serve(listener, router).await
}

async fn battlemap_image(
    State(state): State<Arc<AppState>>,
    Query(params): Query<HashMap<String, String>>,
) -> impl IntoResponse {
    let mut headers = HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("image/svg+xml"),
    );

    let Some(data) = params.get("data") else {
        let body = compose::render_error_svg("Invalid base64 encoding: Data parameter is empty");
        return (StatusCode::OK, headers, body);
    };

    info!(data_len = data.len(), "received battlemap image request");
    let body = match payload::decode_data_param(data) {
        Ok(request) => {
            headers.insert(
                header::CACHE_CONTROL,
                HeaderValue::from_static(CACHE_CONTROL_OK),
            );
            compose::render_scene(&request, &state.registry, &state.base_url)
        }
        Err(e) => {
            error!(error = %e, "failed to decode battlemap payload");
            compose::render_error_svg(&compose::error_message(&e))
        }
    };
    (StatusCode::OK, headers, body)
}

async fn backgrounds(State(state): State<Arc<AppState>>) -> Json<Vec<TextureInfo>> {
    Json(state.registry.all_textures().to_vec())
}
