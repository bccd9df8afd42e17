//! HTTP handlers for the config-generation endpoint.

use axum::{
    body::Bytes,
    extract::State as AxumState,
    http::{HeaderMap, StatusCode, Uri, header},
    response::{IntoResponse, Response},
};
use serde::Serialize;
use tracing::error;

use crate::SharedState;
use crate::render::GeneratedConfig;
use crate::{descriptor, forge, render, webhook};

/// Response envelope for generated configuration documents.
#[derive(Debug, Serialize)]
struct ConfigResponse {
    configs: Vec<GeneratedConfig>,
}

/// Container liveness probe.
pub async fn healthz() -> StatusCode {
    StatusCode::OK
}

/// Handles the signed template-config callback from the CI server.
///
/// The pipeline runs strictly in order: signature gate, body decode, forge
/// fetch, descriptor parse, template render, response encode. Absence at the
/// forge or an unknown pack answers 204 so the caller uses its config as-is.
pub async fn handle_template_config(
    AxumState(state): AxumState<SharedState>,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let request_target = uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or_else(|| uri.path());

    if !state.verifier.verify(request_target, &headers, &body) {
        return (StatusCode::BAD_REQUEST, "Could not verify signature").into_response();
    }

    let Some(request) = webhook::decode(&body) else {
        return (StatusCode::BAD_REQUEST, "Could not parse request").into_response();
    };

    let Some(file_bytes) = forge::fetch_descriptor(&request, &state.forge).await else {
        // Request did not carry template data, the caller uses its config as-is.
        return StatusCode::NO_CONTENT.into_response();
    };

    let Some(descriptor) = descriptor::parse(&file_bytes) else {
        return (StatusCode::BAD_REQUEST, "Could not parse template data").into_response();
    };

    let configs = render::render(&state.templates_path, &descriptor.template, &descriptor.data);
    if configs.is_empty() {
        // Nothing rendered; most likely a pack name mismatch, already logged.
        return StatusCode::NO_CONTENT.into_response();
    }

    match serde_json::to_string(&ConfigResponse { configs }) {
        Ok(json) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "application/json")],
            json,
        )
            .into_response(),
        Err(e) => {
            error!("Could not encode generated configs as json: '{}'", e);
            (
                StatusCode::BAD_REQUEST,
                "Could not encode generated configs as json",
            )
                .into_response()
        }
    }
}
