use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tower::ServiceExt;

use tradepost_api::auth::{AppStateInner, AuthKeys};
use tradepost_db::Database;

fn test_app() -> Router {
    let db = Database::open_in_memory().expect("in-memory db");
    let state = Arc::new(AppStateInner {
        db,
        auth: AuthKeys::new(vec!["integration-secret".to_string()]).unwrap(),
    });
    tradepost_api::router(state)
}

fn request(method: &str, path: &str, token: Option<&str>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(path);
    if let Some(t) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {t}"));
    }
    match body {
        Some(v) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(v.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn call(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
    let res = app.clone().oneshot(req).await.unwrap();
    let status = res.status();
    let bytes = res.into_body().collect().await.unwrap().to_bytes();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, body)
}

async fn register_and_login(app: &Router, username: &str) -> (String, i64) {
    let email = format!("{username}@example.com");
    let (status, _) = call(
        app,
        request(
            "POST",
            "/api/users/register",
            None,
            Some(json!({ "username": username, "email": email, "password": "password123" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = call(
        app,
        request(
            "POST",
            "/api/users/login",
            None,
            Some(json!({ "email": email, "password": "password123" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    (
        body["token"].as_str().unwrap().to_string(),
        body["user"]["id"].as_i64().unwrap(),
    )
}

#[tokio::test]
async fn health_reports_ready_database() {
    let app = test_app();
    let (status, body) = call(&app, request("GET", "/api/health", None, None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ok"], json!(true));
    assert_eq!(body["db"], json!("ready"));
}

#[tokio::test]
async fn malformed_bodies_and_queries_use_the_error_envelope() {
    let app = test_app();

    // Truncated JSON body
    let req = Request::builder()
        .method("POST")
        .uri("/api/users/register")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{\"username\": "))
        .unwrap();
    let (status, body) = call(&app, req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], json!(false));
    assert!(body["error"]["message"].is_string());

    // Wrong type for a typed field
    let (status, body) = call(
        &app,
        request(
            "POST",
            "/api/users/register",
            None,
            Some(json!({ "username": 7, "email": "a@example.com", "password": "password123" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], json!(false));

    // Unparseable query string
    let (status, body) =
        call(&app, request("GET", "/api/services?limit=abc", None, None)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], json!(false));
    assert!(body["error"]["message"].is_string());
}

#[tokio::test]
async fn registration_rejects_duplicates_and_bad_input() {
    let app = test_app();
    let (token, _) = register_and_login(&app, "alice").await;
    assert!(!token.is_empty());

    // Same email, different case
    let (status, body) = call(
        &app,
        request(
            "POST",
            "/api/users/register",
            None,
            Some(json!({
                "username": "alice2",
                "email": "ALICE@example.com",
                "password": "password123"
            })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], json!(false));
    assert!(body["error"]["message"].is_string());

    // Same username, different case
    let (status, _) = call(
        &app,
        request(
            "POST",
            "/api/users/register",
            None,
            Some(json!({
                "username": "ALICE",
                "email": "other@example.com",
                "password": "password123"
            })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // Short password
    let (status, _) = call(
        &app,
        request(
            "POST",
            "/api/users/register",
            None,
            Some(json!({ "username": "bob", "email": "bob@example.com", "password": "short" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn login_with_wrong_password_never_returns_a_token() {
    let app = test_app();
    register_and_login(&app, "alice").await;

    let (status, body) = call(
        &app,
        request(
            "POST",
            "/api/users/login",
            None,
            Some(json!({ "email": "alice@example.com", "password": "wrong-password" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body.get("token").is_none());
    assert_eq!(body["success"], json!(false));
}

#[tokio::test]
async fn protected_routes_require_a_valid_token() {
    let app = test_app();

    let (status, _) = call(
        &app,
        request("POST", "/api/services", None, Some(json!({ "title": "x", "description": "y" }))),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = call(
        &app,
        request(
            "POST",
            "/api/services",
            Some("not-a-jwt"),
            Some(json!({ "title": "x", "description": "y" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    // Public listing stays open
    let (status, _) = call(&app, request("GET", "/api/services", None, None)).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn service_mutations_are_owner_only() {
    let app = test_app();
    let (alice_token, _) = register_and_login(&app, "alice").await;
    let (bob_token, _) = register_and_login(&app, "bob").await;

    let (status, created) = call(
        &app,
        request(
            "POST",
            "/api/services",
            Some(&alice_token),
            Some(json!({ "title": "logo design", "description": "vector logos", "price": 50.0 })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let service_id = created["id"].as_i64().unwrap();

    // Non-owner update/delete -> 403, payload validity irrelevant
    let path = format!("/api/services/{service_id}");
    let (status, _) = call(
        &app,
        request("PUT", &path, Some(&bob_token), Some(json!({ "title": "hijacked" }))),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = call(&app, request("DELETE", &path, Some(&bob_token), None)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // Owner update works
    let (status, updated) = call(
        &app,
        request("PUT", &path, Some(&alice_token), Some(json!({ "price": 75.5 }))),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["price"], json!(75.5));
    assert_eq!(updated["title"], json!("logo design"));

    // Missing row -> 404
    let (status, _) = call(
        &app,
        request("PUT", "/api/services/9999", Some(&alice_token), Some(json!({}))),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    // Owner delete works, then the row is gone
    let (status, _) = call(&app, request("DELETE", &path, Some(&alice_token), None)).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = call(&app, request("GET", &path, None, None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn equity_percentage_is_validated_and_snapped() {
    let app = test_app();
    let (token, _) = register_and_login(&app, "alice").await;

    let (status, _) = call(
        &app,
        request(
            "POST",
            "/api/services",
            Some(&token),
            Some(json!({ "title": "t", "description": "d", "equityPercentage": 0.3 })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = call(
        &app,
        request(
            "POST",
            "/api/services",
            Some(&token),
            Some(json!({ "title": "t", "description": "d", "equityPercentage": 100 })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = call(
        &app,
        request(
            "POST",
            "/api/services",
            Some(&token),
            Some(json!({ "title": "t", "description": "d", "equityPercentage": 1.24 })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["equityPercentage"], json!(1.0));
}

#[tokio::test]
async fn listing_paginates_and_carries_aggregates() {
    let app = test_app();
    let (alice_token, _) = register_and_login(&app, "alice").await;
    let (bob_token, _) = register_and_login(&app, "bob").await;

    let mut first_id = 0;
    for i in 0..5 {
        let (status, body) = call(
            &app,
            request(
                "POST",
                "/api/services",
                Some(&alice_token),
                Some(json!({ "title": format!("service {i}"), "description": "d", "price": 10 })),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        if i == 0 {
            first_id = body["id"].as_i64().unwrap();
        }
    }

    for score in [4, 5, 5] {
        let (status, _) = call(
            &app,
            request(
                "POST",
                "/api/ratings",
                Some(&bob_token),
                Some(json!({ "serviceId": first_id, "score": score })),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
    }

    let (status, page) =
        call(&app, request("GET", "/api/services?limit=2&offset=0", None, None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["services"].as_array().unwrap().len(), 2);
    assert_eq!(page["hasMore"], json!(true));
    assert_eq!(page["total"], json!(5));

    let (status, page) =
        call(&app, request("GET", "/api/services?limit=2&offset=4", None, None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["services"].as_array().unwrap().len(), 1);
    assert_eq!(page["hasMore"], json!(false));

    // The rated service carries its aggregate; unrated ones stay null/0.
    let (status, rated) = call(
        &app,
        request("GET", &format!("/api/services/{first_id}"), None, None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(rated["avgRating"], json!(4.67));
    assert_eq!(rated["ratingsCount"], json!(3));

    let (_, page) = call(&app, request("GET", "/api/services?limit=1&offset=0", None, None)).await;
    let newest = &page["services"][0];
    assert_eq!(newest["avgRating"], Value::Null);
    assert_eq!(newest["ratingsCount"], json!(0));
    assert_eq!(newest["owner"]["username"], json!("alice"));
}

#[tokio::test]
async fn message_threads_are_scoped_by_service() {
    let app = test_app();
    let (alice_token, alice_id) = register_and_login(&app, "alice").await;
    let (bob_token, bob_id) = register_and_login(&app, "bob").await;
    let (carol_token, _) = register_and_login(&app, "carol").await;

    let (_, service) = call(
        &app,
        request(
            "POST",
            "/api/services",
            Some(&bob_token),
            Some(json!({ "title": "logo design", "description": "d", "price": 50 })),
        ),
    )
    .await;
    let service_id = service["id"].as_i64().unwrap();

    let (status, m1) = call(
        &app,
        request(
            "POST",
            "/api/messages",
            Some(&alice_token),
            Some(json!({ "receiverId": bob_id, "content": "about the logo", "serviceId": service_id })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let m1_id = m1["id"].as_i64().unwrap();

    let (_, m2) = call(
        &app,
        request(
            "POST",
            "/api/messages",
            Some(&bob_token),
            Some(json!({ "receiverId": alice_id, "content": "sure, details?", "serviceId": service_id })),
        ),
    )
    .await;
    let m2_id = m2["id"].as_i64().unwrap();

    let (_, m3) = call(
        &app,
        request(
            "POST",
            "/api/messages",
            Some(&alice_token),
            Some(json!({ "receiverId": bob_id, "content": "unrelated hello" })),
        ),
    )
    .await;
    let m3_id = m3["id"].as_i64().unwrap();

    // Service-scoped thread: exactly the two scoped messages, oldest-first
    let (status, thread) = call(
        &app,
        request("GET", &format!("/api/messages/{m1_id}/thread"), Some(&alice_token), None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let ids: Vec<i64> = thread["messages"]
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["id"].as_i64().unwrap())
        .collect();
    assert_eq!(ids, vec![m1_id, m2_id]);
    assert_eq!(thread["root"]["service"]["title"], json!("logo design"));

    // Unscoped thread: only the service-less message
    let (status, thread) = call(
        &app,
        request("GET", &format!("/api/messages/{m3_id}/thread"), Some(&bob_token), None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let ids: Vec<i64> = thread["messages"]
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["id"].as_i64().unwrap())
        .collect();
    assert_eq!(ids, vec![m3_id]);

    // Outsiders cannot read the conversation
    let (status, _) = call(
        &app,
        request("GET", &format!("/api/messages/{m1_id}/thread"), Some(&carol_token), None),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn message_validation_rejects_bad_sends() {
    let app = test_app();
    let (alice_token, alice_id) = register_and_login(&app, "alice").await;
    let (_, bob_id) = register_and_login(&app, "bob").await;

    // Self-send
    let (status, _) = call(
        &app,
        request(
            "POST",
            "/api/messages",
            Some(&alice_token),
            Some(json!({ "receiverId": alice_id, "content": "hi me" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // Whitespace-only content
    let (status, _) = call(
        &app,
        request(
            "POST",
            "/api/messages",
            Some(&alice_token),
            Some(json!({ "receiverId": bob_id, "content": "   " })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // Unknown receiver
    let (status, _) = call(
        &app,
        request(
            "POST",
            "/api/messages",
            Some(&alice_token),
            Some(json!({ "receiverId": 9999, "content": "hello?" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn inbox_and_sent_split_by_direction() {
    let app = test_app();
    let (alice_token, alice_id) = register_and_login(&app, "alice").await;
    let (bob_token, bob_id) = register_and_login(&app, "bob").await;

    for content in ["first", "second"] {
        let (status, _) = call(
            &app,
            request(
                "POST",
                "/api/messages",
                Some(&alice_token),
                Some(json!({ "receiverId": bob_id, "content": content })),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
    }
    call(
        &app,
        request(
            "POST",
            "/api/messages",
            Some(&bob_token),
            Some(json!({ "receiverId": alice_id, "content": "reply" })),
        ),
    )
    .await;

    let (status, inbox) = call(&app, request("GET", "/api/messages/inbox", Some(&bob_token), None)).await;
    assert_eq!(status, StatusCode::OK);
    let inbox = inbox.as_array().unwrap().clone();
    assert_eq!(inbox.len(), 2);
    // Newest first
    assert_eq!(inbox[0]["content"], json!("second"));
    assert_eq!(inbox[0]["sender"]["username"], json!("alice"));

    let (status, sent) = call(&app, request("GET", "/api/messages/sent", Some(&bob_token), None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(sent.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn profile_updates_are_self_only() {
    let app = test_app();
    let (alice_token, alice_id) = register_and_login(&app, "alice").await;
    let (_, bob_id) = register_and_login(&app, "bob").await;

    let (status, updated) = call(
        &app,
        request(
            "PUT",
            &format!("/api/users/{alice_id}"),
            Some(&alice_token),
            Some(json!({ "description": "rust plumber" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["description"], json!("rust plumber"));
    assert_eq!(updated["username"], json!("alice"));

    let (status, _) = call(
        &app,
        request(
            "PUT",
            &format!("/api/users/{bob_id}"),
            Some(&alice_token),
            Some(json!({ "description": "not yours" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}
