use axum::{
    extract::{Path, Query, State},
    http::{header::CONTENT_TYPE, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use kubepattern_analysis::{AnalysisRunner, RunQueue, RunRequest, RunTarget};
use kubepattern_engine::lint_result;
use kubepattern_protocol::{serialize_json, ErrorEnvelope};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Clone)]
pub(crate) struct AppState {
    pub queue: RunQueue,
    pub runner: Arc<AnalysisRunner>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct PatternQuery {
    pattern: Option<String>,
}

impl PatternQuery {
    fn pattern(self) -> Option<String> {
        self.pattern.filter(|p| !p.trim().is_empty())
    }
}

pub(crate) fn router(state: AppState) -> Router {
    Router::new()
        .route("/pattern/lint", post(lint_pattern))
        .route("/analysis/cluster", post(analyze_cluster))
        .route("/analysis/namespace/:namespace", post(analyze_namespace))
        .route("/cluster/graph", get(cluster_graph))
        .with_state(state)
}

async fn lint_pattern(body: String) -> Response {
    log::info!("Received request to lint pattern");
    json_response(StatusCode::OK, &lint_result(&body))
}

async fn analyze_cluster(
    State(state): State<AppState>,
    Query(query): Query<PatternQuery>,
) -> Response {
    let request = RunRequest {
        target: RunTarget::Cluster,
        pattern: query.pattern(),
    };
    submit(&state, request).await
}

async fn analyze_namespace(
    State(state): State<AppState>,
    Path(namespace): Path<String>,
    Query(query): Query<PatternQuery>,
) -> Response {
    let request = RunRequest {
        target: RunTarget::Namespace(namespace),
        pattern: query.pattern(),
    };
    submit(&state, request).await
}

async fn submit(state: &AppState, request: RunRequest) -> Response {
    match state.queue.submit(request).await {
        Ok(ack) => json_response(StatusCode::ACCEPTED, &ack),
        Err(err) => error_response(
            StatusCode::SERVICE_UNAVAILABLE,
            "queue_unavailable",
            err.to_string(),
        ),
    }
}

async fn cluster_graph(State(state): State<AppState>) -> Response {
    log::info!("Received request to get cluster graph");
    match state.runner.graph_export().await {
        Ok(export) => json_response(StatusCode::OK, &export),
        Err(err) => error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            "graph_unavailable",
            err.to_string(),
        ),
    }
}

fn json_response<T: Serialize>(status: StatusCode, value: &T) -> Response {
    match serialize_json(value) {
        Ok(body) => (status, [(CONTENT_TYPE, "application/json")], body).into_response(),
        Err(err) => (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response(),
    }
}

fn error_response(status: StatusCode, code: &str, message: String) -> Response {
    let hint = match code {
        "queue_unavailable" => "Too many analyses are queued; retry once the running ones finish.",
        _ => "Check the server logs for the failing collaborator.",
    };
    json_response(status, &ErrorEnvelope::new(code, message).with_hint(hint))
}
