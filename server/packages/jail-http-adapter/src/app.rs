use std::time::Duration;

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, Request, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use jail::Jail;
use jail_error::{ErrorType, JailError, ProblemDetails};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tower_http::trace::TraceLayer;
use tracing::Span;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct HealthResponse {
    ok: bool,
    node_running: bool,
    cells: usize,
}

#[derive(Debug, Deserialize)]
struct BootstrapRequest {
    script: String,
}

/// `args` is either the JSON text handed to `call` verbatim or any other JSON
/// value, which is encoded first.
#[derive(Debug, Deserialize)]
struct CallRequest {
    path: String,
    #[serde(default = "empty_args")]
    args: Value,
}

fn empty_args() -> Value {
    Value::Array(Vec::new())
}

pub fn build_router(jail: Jail) -> Router {
    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(|req: &Request<_>| {
            tracing::info_span!("http.request", method = %req.method(), uri = %req.uri())
        })
        .on_response(|res: &Response<_>, latency: Duration, span: &Span| {
            tracing::info!(
                parent: span,
                status = %res.status(),
                latency_ms = latency.as_millis()
            );
        });

    Router::new()
        .route("/v1/health", get(get_health))
        .route("/v1/cells/:cell_id", put(put_cell))
        .route("/v1/cells/:cell_id/call", post(post_call))
        .with_state(jail)
        .layer(trace_layer)
}

async fn get_health(State(jail): State<Jail>) -> Json<HealthResponse> {
    Json(HealthResponse {
        ok: true,
        node_running: jail.has_node(),
        cells: jail.cell_count().await,
    })
}

async fn put_cell(
    State(jail): State<Jail>,
    Path(cell_id): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let request: BootstrapRequest = match decode_json(&headers, &body) {
        Ok(request) => request,
        Err(response) => return response,
    };
    envelope_response(jail.bootstrap_cell(&cell_id, &request.script).await)
}

async fn post_call(
    State(jail): State<Jail>,
    Path(cell_id): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let request: CallRequest = match decode_json(&headers, &body) {
        Ok(request) => request,
        Err(response) => return response,
    };
    let args = match request.args {
        Value::String(text) => text,
        other => other.to_string(),
    };
    envelope_response(jail.dispatch_call(&cell_id, &request.path, &args).await)
}

fn decode_json<T: for<'de> Deserialize<'de>>(headers: &HeaderMap, body: &[u8]) -> Result<T, Response> {
    if !is_json_content_type(headers) {
        return Err(problem(
            StatusCode::UNSUPPORTED_MEDIA_TYPE,
            ProblemDetails::new(
                ErrorType::MalformedRequest,
                Some("content-type must be application/json".to_string()),
            ),
        ));
    }
    serde_json::from_slice(body).map_err(|err| {
        let err = JailError::malformed(err.to_string());
        problem(StatusCode::BAD_REQUEST, err.to_problem_details())
    })
}

/// Envelopes already carry success or failure, so they always go out as 200.
fn envelope_response(envelope: String) -> Response {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "application/json")],
        envelope,
    )
        .into_response()
}

fn is_json_content_type(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.starts_with("application/json"))
        .unwrap_or(false)
}

fn problem(status: StatusCode, mut problem: ProblemDetails) -> Response {
    problem.status = status.as_u16();
    (status, Json(problem)).into_response()
}
