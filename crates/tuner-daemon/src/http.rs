use crate::dispatcher::Dispatcher;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tracing::{error, info};
use tuner_proto::protocol::{CommandOutcome, FailureKind};

#[derive(Clone)]
struct HttpState {
    dispatcher: Arc<Dispatcher>,
}

/// Numeric fields may arrive as JSON numbers or as strings.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Number {
    Int(i64),
    Text(String),
}

impl Number {
    fn as_arg(&self) -> String {
        match self {
            Number::Int(n) => n.to_string(),
            Number::Text(s) => s.trim().to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct VolumeParams {
    level: Option<Number>,
}

#[derive(Debug, Deserialize)]
struct StationParams {
    id: Option<Number>,
}

pub fn router(dispatcher: Arc<Dispatcher>) -> Router {
    Router::new()
        .route("/", get(help))
        .route("/api", get(help))
        .route("/api/status", get(status).post(status))
        .route("/api/info", get(info_handler).post(info_handler))
        .route("/api/stations", get(stations).post(stations))
        .route("/api/play", get(play).post(play))
        .route("/api/stop", get(stop).post(stop))
        .route("/api/pause", get(pause).post(pause))
        .route("/api/next", get(next).post(next))
        .route("/api/prev", get(prev).post(prev))
        .route("/api/volume", get(volume_query).post(volume_body))
        .route("/api/station", get(station_query).post(station_body))
        .layer(CorsLayer::permissive())
        .with_state(HttpState { dispatcher })
}

/// Bind now (so a busy port fails startup), serve in the background.
pub async fn start_server(
    bind_address: &str,
    port: u16,
    dispatcher: Arc<Dispatcher>,
    cancel: CancellationToken,
) -> anyhow::Result<JoinHandle<()>> {
    let addr = format!("{}:{}", bind_address, port);
    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|e| anyhow::anyhow!("cannot bind HTTP API to {}: {}", addr, e))?;
    info!("HTTP API listening on http://{}", addr);

    let app = router(dispatcher);
    Ok(tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(async move { cancel.cancelled().await })
            .await
        {
            error!("HTTP server error: {}", e);
        }
    }))
}

fn status_code(outcome: &CommandOutcome) -> StatusCode {
    match outcome.failure {
        None => StatusCode::OK,
        Some(FailureKind::Command) => StatusCode::BAD_REQUEST,
        Some(FailureKind::Resource) => StatusCode::BAD_GATEWAY,
        Some(FailureKind::Environment) => StatusCode::CONFLICT,
        Some(FailureKind::Unavailable) => StatusCode::SERVICE_UNAVAILABLE,
    }
}

fn respond(outcome: &CommandOutcome, body: Value) -> Response {
    (status_code(outcome), Json(body)).into_response()
}

fn action_body(outcome: &CommandOutcome) -> Value {
    json!({ "ok": outcome.ok, "message": outcome.message })
}

async fn action(state: &HttpState, line: &str) -> Response {
    info!("HTTP API: {}", line);
    let outcome = state.dispatcher.execute(line).await;
    respond(&outcome, action_body(&outcome))
}

async fn help() -> Json<Value> {
    Json(json!({
        "endpoints": {
            "GET /api/status": "playback status and now-playing metadata",
            "GET /api/info": "now-playing metadata",
            "GET /api/stations": "playlist with the active station marked",
            "GET|POST /api/play": "start playback",
            "GET|POST /api/stop": "stop playback",
            "GET|POST /api/pause": "toggle play/pause",
            "GET|POST /api/next": "next station",
            "GET|POST /api/prev": "previous station",
            "GET /api/volume?level=N": "set volume (%2BN/-N relative); no level reports it",
            "POST /api/volume": "{\"level\": N}",
            "GET /api/station?id=N": "switch to station N; no id reports the current one",
            "POST /api/station": "{\"id\": N}",
        }
    }))
}

async fn status(State(state): State<HttpState>) -> Response {
    let outcome = state.dispatcher.execute("status").await;
    let report = &outcome.report;
    let meta = &report.metadata;
    respond(
        &outcome,
        json!({
            "status": if report.playing { "playing" } else { "stopped" },
            "current_station": report.current_station,
            "total_stations": report.total_stations,
            "volume": report.volume,
            "station_url": meta.stream_url,
            "station_name": meta.station_name,
            "title": meta.title,
            "timestamp": chrono::Local::now(),
        }),
    )
}

async fn info_handler(State(state): State<HttpState>) -> Response {
    let outcome = state.dispatcher.execute("info").await;
    let body = serde_json::to_value(&outcome.report.metadata).unwrap_or(Value::Null);
    respond(&outcome, body)
}

async fn stations(State(state): State<HttpState>) -> Response {
    let outcome = state.dispatcher.execute("list").await;
    respond(&outcome, json!({ "stations": outcome.stations }))
}

async fn play(State(state): State<HttpState>) -> Response {
    action(&state, "play").await
}

async fn stop(State(state): State<HttpState>) -> Response {
    action(&state, "stop").await
}

async fn pause(State(state): State<HttpState>) -> Response {
    action(&state, "pause").await
}

async fn next(State(state): State<HttpState>) -> Response {
    station_change(&state, "next").await
}

async fn prev(State(state): State<HttpState>) -> Response {
    station_change(&state, "prev").await
}

async fn station_change(state: &HttpState, line: &str) -> Response {
    info!("HTTP API: {}", line);
    let outcome = state.dispatcher.execute(line).await;
    let mut body = action_body(&outcome);
    body["current_station"] = json!(outcome.report.current_station);
    respond(&outcome, body)
}

async fn volume_query(
    State(state): State<HttpState>,
    Query(params): Query<VolumeParams>,
) -> Response {
    volume(&state, params.level).await
}

async fn volume_body(State(state): State<HttpState>, Json(params): Json<VolumeParams>) -> Response {
    volume(&state, params.level).await
}

async fn volume(state: &HttpState, level: Option<Number>) -> Response {
    let line = match level {
        Some(level) => format!("volume {}", level.as_arg()),
        None => "volume".to_string(),
    };
    info!("HTTP API: {}", line);
    let outcome = state.dispatcher.execute(&line).await;
    let mut body = action_body(&outcome);
    body["volume"] = json!(outcome.report.volume);
    respond(&outcome, body)
}

async fn station_query(
    State(state): State<HttpState>,
    Query(params): Query<StationParams>,
) -> Response {
    station(&state, params.id).await
}

async fn station_body(
    State(state): State<HttpState>,
    Json(params): Json<StationParams>,
) -> Response {
    station(&state, params.id).await
}

async fn station(state: &HttpState, id: Option<Number>) -> Response {
    match id {
        Some(id) => station_change(state, &format!("station {}", id.as_arg())).await,
        None => station_change(state, "station").await,
    }
}
