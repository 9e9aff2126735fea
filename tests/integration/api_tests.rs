//! API integration tests, run in-process against the in-memory store

use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{Method, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tower::ServiceExt;

use school_library::{
    api::{self, BORROWER_HEADER, STAFF_HEADER},
    repository::MemoryStore,
    AppConfig, AppState,
};

const STAFF: &str = "Ana";

fn app() -> Router {
    api::create_router(AppState::new(
        AppConfig::default(),
        Arc::new(MemoryStore::new()),
    ))
}

enum Caller<'a> {
    Anonymous,
    Reader(&'a str),
    Staff,
}

async fn call(
    app: &Router,
    method: Method,
    uri: &str,
    caller: Caller<'_>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut request = Request::builder()
        .method(method)
        .uri(format!("/api/v1{}", uri));
    match caller {
        Caller::Anonymous => {}
        Caller::Reader(id) => request = request.header(BORROWER_HEADER, id),
        Caller::Staff => request = request.header(STAFF_HEADER, STAFF),
    }
    let request = match body {
        Some(body) => request
            .header("content-type", "application/json")
            .body(Body::from(body.to_string())),
        None => request.body(Body::empty()),
    }
    .unwrap();

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

async fn create_book(app: &Router, title: &str, total: i64) -> i64 {
    let (status, body) = call(
        app,
        Method::POST,
        "/books",
        Caller::Staff,
        Some(json!({ "title": title, "author": "Monteiro Lobato", "genre": "Infantil", "total": total })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{}", body);
    body["id"].as_i64().unwrap()
}

async fn available(app: &Router, book_id: i64) -> i64 {
    let (_, body) = call(
        app,
        Method::GET,
        &format!("/books/{}", book_id),
        Caller::Anonymous,
        None,
    )
    .await;
    body["available"].as_i64().unwrap()
}

#[tokio::test]
async fn test_health_check() {
    let app = app();
    let (status, body) = call(&app, Method::GET, "/health", Caller::Anonymous, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");

    let (status, body) = call(&app, Method::GET, "/ready", Caller::Anonymous, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ready");
}

#[tokio::test]
async fn test_staff_routes_require_staff_header() {
    let app = app();
    let (status, body) = call(
        &app,
        Method::POST,
        "/books",
        Caller::Reader("2024001"),
        Some(json!({ "title": "Reinações de Narizinho", "author": "Monteiro Lobato", "total": 1 })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "NotAuthorized");

    let (status, _) = call(&app, Method::GET, "/stats", Caller::Anonymous, None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_full_loan_lifecycle_with_waitlist() {
    let app = app();
    let book = create_book(&app, "O Sítio do Picapau Amarelo", 1).await;

    // A borrows the only copy
    let (status, loan) = call(
        &app,
        Method::POST,
        "/loans",
        Caller::Reader("A"),
        Some(json!({ "book_id": book, "duration_days": 15 })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{}", loan);
    assert_eq!(loan["status"], "requested");
    let loan_id = loan["id"].as_i64().unwrap();

    let (status, approved) = call(
        &app,
        Method::POST,
        &format!("/loans/{}/approve", loan_id),
        Caller::Staff,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(approved["status"], "approved");
    assert_eq!(approved["actioned_by"], STAFF);
    assert_eq!(available(&app, book).await, 0);

    // B queues for it
    let (status, _) = call(
        &app,
        Method::POST,
        "/waitlist",
        Caller::Reader("B"),
        Some(json!({ "book_id": book })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let (status, _) = call(
        &app,
        Method::POST,
        "/waitlist",
        Caller::Reader("B"),
        Some(json!({ "book_id": book })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    // Return hands the copy straight to B
    let (status, returned) = call(
        &app,
        Method::POST,
        &format!("/loans/{}/return", loan_id),
        Caller::Staff,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{}", returned);
    assert_eq!(returned["loan"]["status"], "returned");
    assert_eq!(returned["dispatch"]["outcome"], "reassigned");
    assert_eq!(returned["dispatch"]["loan"]["borrower_id"], "B");
    assert_eq!(available(&app, book).await, 0);

    let (_, notifications) = call(
        &app,
        Method::GET,
        "/me/notifications",
        Caller::Reader("B"),
        None,
    )
    .await;
    let notifications = notifications.as_array().unwrap();
    assert_eq!(notifications.len(), 1);
    assert_eq!(notifications[0]["kind"], "waitlist_promoted");
    assert_eq!(notifications[0]["read"], false);

    let (_, queue) = call(
        &app,
        Method::GET,
        &format!("/waitlist?book_id={}", book),
        Caller::Staff,
        None,
    )
    .await;
    assert!(queue.as_array().unwrap().is_empty());

    // Returning twice is an invalid transition
    let (status, body) = call(
        &app,
        Method::POST,
        &format!("/loans/{}/return", loan_id),
        Caller::Staff,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "InvalidState");

    // A can now leave a comment; it is hidden until approved
    let (status, comment) = call(
        &app,
        Method::POST,
        "/comments",
        Caller::Reader("A"),
        Some(json!({ "book_id": book, "body": "Adorei a Emília", "rating": 5 })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let (_, public) = call(
        &app,
        Method::GET,
        &format!("/books/{}/comments", book),
        Caller::Anonymous,
        None,
    )
    .await;
    assert!(public.as_array().unwrap().is_empty());

    let (status, _) = call(
        &app,
        Method::PUT,
        &format!("/comments/{}/moderation", comment["id"]),
        Caller::Staff,
        Some(json!({ "approved": true })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let (_, public) = call(
        &app,
        Method::GET,
        &format!("/books/{}/comments", book),
        Caller::Anonymous,
        None,
    )
    .await;
    assert_eq!(public.as_array().unwrap().len(), 1);

    let (status, stats) = call(&app, Method::GET, "/stats", Caller::Staff, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stats["pending_requests"], 1);
    assert_eq!(stats["stock"]["total_copies"], 1);
}

#[tokio::test]
async fn test_approve_without_stock() {
    let app = app();
    let (_, book) = call(
        &app,
        Method::POST,
        "/books",
        Caller::Staff,
        Some(json!({ "title": "Caçadas de Pedrinho", "author": "Monteiro Lobato", "total": 1, "available": 0 })),
    )
    .await;
    let book = book["id"].as_i64().unwrap();

    let (_, loan) = call(
        &app,
        Method::POST,
        "/loans",
        Caller::Reader("A"),
        Some(json!({ "book_id": book, "duration_days": 7 })),
    )
    .await;
    let loan_id = loan["id"].as_i64().unwrap();

    let (status, body) = call(
        &app,
        Method::POST,
        &format!("/loans/{}/approve", loan_id),
        Caller::Staff,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"], "StockAnomaly");

    let (status, _) = call(
        &app,
        Method::POST,
        &format!("/loans/{}/approve?force=true", loan_id),
        Caller::Staff,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(available(&app, book).await, -1);
}

#[tokio::test]
async fn test_rejected_request_cannot_be_approved() {
    let app = app();
    let book = create_book(&app, "Memórias Póstumas de Brás Cubas", 2).await;
    let (_, loan) = call(
        &app,
        Method::POST,
        "/loans",
        Caller::Reader("A"),
        Some(json!({ "book_id": book, "duration_days": 7 })),
    )
    .await;
    let loan_id = loan["id"].as_i64().unwrap();

    let uri = format!("/loans/{}/reject", loan_id);
    let (status, _) = call(&app, Method::POST, &uri, Caller::Reader("A"), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, rejected) = call(&app, Method::POST, &uri, Caller::Staff, None).await;
    assert_eq!(status, StatusCode::OK, "{}", rejected);
    assert_eq!(rejected["loan"]["status"], "rejected");
    assert!(!rejected["loan"]["returned_at"].is_null());
    assert!(rejected["dispatch"].is_null());
    assert_eq!(available(&app, book).await, 2);

    let uri = format!("/loans/{}/approve", loan_id);
    let (status, body) = call(&app, Method::POST, &uri, Caller::Staff, None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "InvalidState");
    assert_eq!(available(&app, book).await, 2);
}

#[tokio::test]
async fn test_catalog_carries_ratings_and_survives_far_pages() {
    let app = app();
    let book = create_book(&app, "O Cortiço", 1).await;
    create_book(&app, "Quincas Borba", 1).await;

    for (reader, rating) in [("A", 5), ("B", 2), ("C", 4)] {
        let (status, comment) = call(
            &app,
            Method::POST,
            "/comments",
            Caller::Reader(reader),
            Some(json!({ "book_id": book, "body": "Leitura obrigatória", "rating": rating })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        // B's rating is turned down and must not count
        let approved = reader != "B";
        call(
            &app,
            Method::PUT,
            &format!("/comments/{}/moderation", comment["id"]),
            Caller::Staff,
            Some(json!({ "approved": approved })),
        )
        .await;
    }

    let (status, page) = call(&app, Method::GET, "/books", Caller::Anonymous, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["total"], 2);
    let books = page["books"].as_array().unwrap();
    assert_eq!(books[0]["title"], "O Cortiço");
    assert_eq!(books[0]["rating"], 4.5);
    assert_eq!(books[0]["rating_count"], 2);
    assert_eq!(books[1]["rating"], 0.0);
    assert_eq!(books[1]["rating_count"], 0);

    let far = format!("/books?page={}", i64::MAX);
    let (status, page) = call(&app, Method::GET, &far, Caller::Anonymous, None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(page["books"].as_array().unwrap().is_empty());

    let far = format!("/loans?page={}", i64::MAX);
    let (status, loans) = call(&app, Method::GET, &far, Caller::Staff, None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(loans.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_one_open_loan_per_reader() {
    let app = app();
    let first = create_book(&app, "Urupês", 2).await;
    let second = create_book(&app, "Negrinha", 2).await;

    let (status, _) = call(
        &app,
        Method::POST,
        "/loans",
        Caller::Reader("A"),
        Some(json!({ "book_id": first, "duration_days": 7 })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let (status, body) = call(
        &app,
        Method::POST,
        "/loans",
        Caller::Reader("A"),
        Some(json!({ "book_id": second, "duration_days": 7 })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "Conflict");

    let (status, _) = call(
        &app,
        Method::POST,
        "/loans",
        Caller::Reader("B"),
        Some(json!({ "book_id": second, "duration_days": 9 })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_readers_only_see_their_own_loans() {
    let app = app();
    let book = create_book(&app, "A Chave do Tamanho", 1).await;
    let (_, loan) = call(
        &app,
        Method::POST,
        "/loans",
        Caller::Reader("A"),
        Some(json!({ "book_id": book, "duration_days": 7 })),
    )
    .await;
    let uri = format!("/loans/{}", loan["id"]);

    let (status, _) = call(&app, Method::GET, &uri, Caller::Reader("B"), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, details) = call(&app, Method::GET, &uri, Caller::Reader("A"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(details["is_overdue"], false);
    assert_eq!(details["book"]["title"], "A Chave do Tamanho");

    let (_, mine) = call(&app, Method::GET, "/me/loans", Caller::Reader("A"), None).await;
    assert_eq!(mine.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_book_with_history_cannot_be_deleted() {
    let app = app();
    let book = create_book(&app, "Emília no País da Gramática", 1).await;
    let (status, _) = call(
        &app,
        Method::POST,
        "/waitlist",
        Caller::Reader("A"),
        Some(json!({ "book_id": book })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, _) = call(
        &app,
        Method::DELETE,
        &format!("/books/{}", book),
        Caller::Staff,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let unused = create_book(&app, "O Saci", 1).await;
    let (status, _) = call(
        &app,
        Method::DELETE,
        &format!("/books/{}", unused),
        Caller::Staff,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = call(
        &app,
        Method::GET,
        &format!("/books/{}", unused),
        Caller::Anonymous,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
#[ignore] // Needs a running server: cargo test -- --ignored
async fn test_live_server_health() {
    let base_url = std::env::var("LIBRARY_TEST_URL")
        .unwrap_or_else(|_| "http://localhost:8080/api/v1".to_string());
    let response = reqwest::Client::new()
        .get(format!("{}/health", base_url))
        .send()
        .await
        .expect("Failed to send request");

    assert!(response.status().is_success());
    let body: Value = response.json().await.expect("Failed to parse response");
    assert_eq!(body["status"], "healthy");
}
