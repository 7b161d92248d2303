//! `HttpTransport` against an in-process axum server.

use axum::extract::{Path, Query};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use spesa_client::{HttpTransport, AUTH_HEADER};
use spesa_sync::{Request, ResponseBody, SyncError, Transport, TransportError};
use std::collections::HashMap;
use std::time::Duration;

async fn profile(headers: HeaderMap) -> (StatusCode, Json<Value>) {
    match headers.get(AUTH_HEADER).and_then(|v| v.to_str().ok()) {
        Some(token) => (StatusCode::OK, Json(json!({ "token": token }))),
        None => (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "msg": "No token, authorization denied" })),
        ),
    }
}

async fn echo_headers(headers: HeaderMap) -> Json<Value> {
    let read = |name: &str| headers.get(name).and_then(|v| v.to_str().ok()).map(str::to_string);
    Json(json!({ "contentType": read("content-type"), "accept": read("accept") }))
}

async fn search(
    Path(term): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> Json<Value> {
    Json(json!({ "term": term, "params": params }))
}

async fn echo(Json(body): Json<Value>) -> (StatusCode, Json<Value>) {
    (StatusCode::CREATED, Json(body))
}

async fn invalid() -> (StatusCode, Json<Value>) {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({ "errors": [{ "msg": "Name required" }, { "msg": "Too short" }] })),
    )
}

async fn unavailable() -> (StatusCode, &'static str) {
    (StatusCode::SERVICE_UNAVAILABLE, "Service Unavailable")
}

async fn no_content() -> StatusCode {
    StatusCode::NO_CONTENT
}

async fn slow() -> Json<Value> {
    tokio::time::sleep(Duration::from_millis(500)).await;
    Json(json!([]))
}

async fn serve() -> String {
    let app = Router::new()
        .route("/api/users/profile", get(profile))
        .route("/api/offers/search/:term", get(search))
        .route("/api/users/shopping-list", post(echo))
        .route("/api/invalid", get(invalid))
        .route("/api/unavailable", get(unavailable))
        .route("/api/users/shopping-list/clear", delete(no_content))
        .route("/api/slow", get(slow))
        .route("/api/headers", get(echo_headers));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}/api/", addr)
}

fn transport(base_url: &str) -> HttpTransport {
    HttpTransport::new(base_url, Duration::from_secs(5)).unwrap()
}

#[tokio::test]
async fn token_header_is_sent_when_present() {
    let base = serve().await;
    let http = transport(&base);

    let mut request = Request::get("/users/profile");
    request.auth_token = Some("abc".into());
    let response = http.send(request).await.unwrap();
    assert_eq!(response.status, 200);
    assert_eq!(response.body, json!({ "token": "abc" }));

    let err = http.send(Request::get("/users/profile")).await.unwrap_err();
    let err = SyncError::from(err);
    assert!(err.is_unauthorized());
    assert_eq!(err.message(), "No token, authorization denied");
}

#[tokio::test]
async fn json_headers_are_sent_without_a_body() {
    let base = serve().await;
    let response = transport(&base).send(Request::get("/headers")).await.unwrap();
    assert_eq!(
        response.body,
        json!({ "contentType": "application/json", "accept": "application/json" })
    );
}

#[tokio::test]
async fn encoded_segments_and_query_reach_the_server() {
    let base = serve().await;
    let request = Request::get(format!(
        "/offers/search/{}",
        spesa_sync::path_segment("pasta & pane")
    ))
    .with_query("page", 2)
    .with_query("limit", 20);
    let response = transport(&base).send(request).await.unwrap();
    assert_eq!(response.body["term"], json!("pasta & pane"));
    assert_eq!(response.body["params"], json!({ "page": "2", "limit": "20" }));
}

#[tokio::test]
async fn json_body_is_posted() {
    let base = serve().await;
    let request = Request::post("/users/shopping-list").with_body(json!({ "productName": "Pane" }));
    let response = transport(&base).send(request).await.unwrap();
    assert_eq!(response.status, 201);
    assert_eq!(response.body, json!({ "productName": "Pane" }));
}

#[tokio::test]
async fn field_errors_are_kept_for_normalization() {
    let base = serve().await;
    let err = transport(&base).send(Request::get("/invalid")).await.unwrap_err();
    assert!(matches!(
        &err,
        TransportError::Api { status: 400, body: ResponseBody::Json(_) }
    ));
    let err = SyncError::from(err);
    assert!(matches!(err, SyncError::Validation(_)));
    assert_eq!(err.message(), "Name required; Too short");
}

#[tokio::test]
async fn plain_text_errors_are_kept_verbatim() {
    let base = serve().await;
    let err = transport(&base).send(Request::get("/unavailable")).await.unwrap_err();
    assert_eq!(
        err,
        TransportError::Api {
            status: 503,
            body: ResponseBody::Text("Service Unavailable".into()),
        }
    );
}

#[tokio::test]
async fn empty_success_body_is_null() {
    let base = serve().await;
    let response = transport(&base)
        .send(Request::delete("/users/shopping-list/clear"))
        .await
        .unwrap();
    assert_eq!(response.status, 204);
    assert_eq!(response.body, Value::Null);
}

#[tokio::test]
async fn timeouts_are_network_failures() {
    let base = serve().await;
    let http = HttpTransport::new(&base, Duration::from_millis(50)).unwrap();
    let err = http.send(Request::get("/slow")).await.unwrap_err();
    assert!(matches!(err, TransportError::Network(_)));
}

#[tokio::test]
async fn unreachable_server_is_a_network_failure() {
    // Bind and drop to get a port nobody listens on.
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    let err = transport(&format!("http://{}/api", addr))
        .send(Request::get("/users/profile"))
        .await
        .unwrap_err();
    let err = SyncError::from(err);
    assert!(err.is_network());
}
