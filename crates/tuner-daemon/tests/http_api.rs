mod common;

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use common::{Fixture, Harness, STATIONS};
use serde_json::{json, Value};
use tower::ServiceExt;
use tuner_daemon::http::router;

async fn call(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(value) => {
            builder = builder.header(header::CONTENT_TYPE, "application/json");
            Body::from(value.to_string())
        }
        None => Body::empty(),
    };
    let response = app
        .clone()
        .oneshot(builder.body(body).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

async fn get(app: &Router, uri: &str) -> (StatusCode, Value) {
    call(app, Method::GET, uri, None).await
}

#[tokio::test]
async fn status_reports_playback() {
    let fixture = Fixture::new(&STATIONS);
    let harness = Harness::new(&fixture.config);
    let app = router(harness.dispatcher.clone());

    let (code, body) = get(&app, "/api/status").await;
    assert_eq!(code, StatusCode::OK);
    assert_eq!(body["status"], "stopped");
    assert_eq!(body["current_station"], 1);
    assert_eq!(body["total_stations"], 3);
    assert_eq!(body["volume"], 50);
    // Stamped per request, even before any stream metadata arrived.
    assert!(body["timestamp"].is_string());

    let (code, body) = call(&app, Method::POST, "/api/play", None).await;
    assert_eq!(code, StatusCode::OK);
    assert_eq!(body["ok"], true);

    let (_, body) = get(&app, "/api/status").await;
    assert_eq!(body["status"], "playing");
    assert_eq!(body["station_url"], STATIONS[0]);

    harness.close().await;
}

#[tokio::test]
async fn volume_by_query_and_body() {
    let fixture = Fixture::new(&STATIONS);
    let harness = Harness::new(&fixture.config);
    let app = router(harness.dispatcher.clone());

    let (code, body) = get(&app, "/api/volume?level=70").await;
    assert_eq!(code, StatusCode::OK);
    assert_eq!(body["volume"], 70);

    let (code, body) = call(&app, Method::POST, "/api/volume", Some(json!({ "level": "-20" }))).await;
    assert_eq!(code, StatusCode::OK);
    assert_eq!(body["volume"], 50);

    let (code, body) = call(&app, Method::POST, "/api/volume", Some(json!({ "level": 500 }))).await;
    assert_eq!(code, StatusCode::OK);
    assert_eq!(body["volume"], 100);

    let (_, body) = get(&app, "/api/volume?level=%2B5").await;
    assert_eq!(body["volume"], 100);

    let (code, body) = get(&app, "/api/volume?level=loud").await;
    assert_eq!(code, StatusCode::BAD_REQUEST);
    assert_eq!(body["ok"], false);

    let (code, body) = get(&app, "/api/volume").await;
    assert_eq!(code, StatusCode::OK);
    assert_eq!(body["message"], "current volume: 100%");
}

#[tokio::test]
async fn station_selection() {
    let fixture = Fixture::new(&STATIONS);
    let harness = Harness::new(&fixture.config);
    let app = router(harness.dispatcher.clone());

    let (code, body) = get(&app, "/api/station?id=2").await;
    assert_eq!(code, StatusCode::OK);
    assert_eq!(body["current_station"], 2);

    let (code, body) = call(&app, Method::POST, "/api/station", Some(json!({ "id": 3 }))).await;
    assert_eq!(code, StatusCode::OK);
    assert_eq!(body["current_station"], 3);

    let (code, _) = get(&app, "/api/station?id=0").await;
    assert_eq!(code, StatusCode::BAD_REQUEST);

    let (code, body) = get(&app, "/api/next").await;
    assert_eq!(code, StatusCode::OK);
    assert_eq!(body["current_station"], 1);

    let (_, body) = get(&app, "/api/stations").await;
    let stations = body["stations"].as_array().unwrap();
    assert_eq!(stations.len(), 3);
    assert_eq!(stations[0]["active"], true);
    assert_eq!(stations[2]["url"], STATIONS[2]);

    harness.close().await;
}

#[tokio::test]
async fn empty_playlist_is_a_conflict() {
    let fixture = Fixture::new(&[]);
    let harness = Harness::new(&fixture.config);
    let app = router(harness.dispatcher.clone());

    let (code, body) = get(&app, "/api/next").await;
    assert_eq!(code, StatusCode::CONFLICT);
    assert_eq!(body["message"], "playlist is empty");
}

#[tokio::test]
async fn spawn_failure_is_a_bad_gateway() {
    let mut fixture = Fixture::new(&STATIONS);
    fixture.config.decoder.program = "/nonexistent/decoder".into();
    let harness = Harness::new(&fixture.config);
    let app = router(harness.dispatcher.clone());

    let (code, body) = get(&app, "/api/play").await;
    assert_eq!(code, StatusCode::BAD_GATEWAY);
    assert_eq!(body["ok"], false);
}

#[tokio::test]
async fn closed_daemon_is_unavailable() {
    let fixture = Fixture::new(&STATIONS);
    let harness = Harness::new(&fixture.config);
    let app = router(harness.dispatcher.clone());
    harness.close().await;

    let (code, body) = get(&app, "/api/pause").await;
    assert_eq!(code, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["message"], "shutting down");
}

#[tokio::test]
async fn info_and_help() {
    let fixture = Fixture::new(&STATIONS);
    let harness = Harness::new(&fixture.config);
    let app = router(harness.dispatcher.clone());

    let (code, body) = get(&app, "/api/info").await;
    assert_eq!(code, StatusCode::OK);
    assert_eq!(body["stream_url"], "");
    assert!(body.get("samplerate").is_some());

    for uri in ["/", "/api"] {
        let (code, body) = get(&app, uri).await;
        assert_eq!(code, StatusCode::OK);
        assert!(body["endpoints"].is_object());
    }
}

#[tokio::test]
async fn cors_allows_any_origin() {
    let fixture = Fixture::new(&STATIONS);
    let harness = Harness::new(&fixture.config);
    let app = router(harness.dispatcher.clone());

    let request = Request::builder()
        .uri("/api/status")
        .header(header::ORIGIN, "http://display.local")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(
        response.headers().get(header::ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(),
        "*"
    );
}
