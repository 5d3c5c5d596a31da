//! End-to-end tests through the axum router.

use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;

use huddle_server::api::{build_router, AppState};
use huddle_server::config::ServerConfig;
use huddle_server::engine::{Engine, ModerationPolicy};
use huddle_server::media_store::MediaStore;
use huddle_shared::session::SessionIssuer;
use huddle_store::Database;

const ADMIN_TOKEN: &str = "operator-secret";
const PNG: &[u8] = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR";

struct TestApp {
    router: Router,
    _media_dir: TempDir,
}

async fn app_with(policy: ModerationPolicy) -> TestApp {
    let dir = TempDir::new().unwrap();
    let config = ServerConfig {
        media_storage_path: dir.path().to_path_buf(),
        public_base_url: "http://test".into(),
        admin_token: Some(ADMIN_TOKEN.into()),
        policy,
        ..ServerConfig::default()
    };
    let media = MediaStore::new(dir.path().to_path_buf(), config.max_image_size, "http://test")
        .await
        .unwrap();
    let engine = Engine::new(
        Database::open_in_memory().unwrap(),
        Arc::new(media),
        SessionIssuer::generate(chrono::Duration::days(1)),
        policy,
    );

    TestApp {
        router: build_router(AppState {
            engine,
            config: Arc::new(config),
        }),
        _media_dir: dir,
    }
}

async fn app() -> TestApp {
    app_with(ModerationPolicy::default()).await
}

impl TestApp {
    async fn send(&self, req: Request<Body>) -> (StatusCode, Value) {
        let response = self.router.clone().oneshot(req).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, body)
    }

    async fn call(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header("x-access-token", token);
        }
        let req = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        self.send(req).await
    }

    /// Register a user and return `(id, token)`.
    async fn register(&self, username: &str) -> (String, String) {
        let (status, body) = self
            .call(
                Method::POST,
                "/api/users/register",
                None,
                Some(json!({
                    "name": username,
                    "username": username,
                    "email": format!("{username}@example.org"),
                    "password": "correct horse",
                })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        (
            body["user"]["id"].as_str().unwrap().to_string(),
            body["token"].as_str().unwrap().to_string(),
        )
    }

    async fn create_group(&self, token: &str, name: &str, chat_type: &str) -> String {
        let (status, body) = self
            .call(
                Method::POST,
                "/api/chats/create",
                Some(token),
                Some(json!({ "name": name, "chatType": chat_type })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        body["chat"]["id"].as_str().unwrap().to_string()
    }
}

#[tokio::test]
async fn health_is_public() {
    let app = app().await;
    let (status, body) = app.call(Method::GET, "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn protected_routes_need_a_valid_token() {
    let app = app().await;

    let (status, body) = app.call(Method::GET, "/api/chats", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["message"], "Token not found");
    assert_eq!(body["error"]["status"], 401);

    let (status, _) = app.call(Method::GET, "/api/chats", Some("junk.token"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    // Bearer header and query parameter work too.
    let (_, token) = app.register("ada").await;
    let req = Request::builder()
        .uri("/api/chats/user-chats")
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .body(Body::empty())
        .unwrap();
    assert_eq!(app.send(req).await.0, StatusCode::OK);
    let uri = format!("/api/chats/user-chats?token={token}");
    assert_eq!(app.call(Method::GET, &uri, None, None).await.0, StatusCode::OK);
}

#[tokio::test]
async fn login_and_profile_hide_password() {
    let app = app().await;
    let (id, _) = app.register("ada").await;

    let (status, body) = app
        .call(
            Method::POST,
            "/api/users/login",
            None,
            Some(json!({ "userInfo": "ada@example.org", "password": "correct horse" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["user"].get("passwordHash").is_none());
    let token = body["token"].as_str().unwrap().to_string();

    let (status, body) = app
        .call(Method::GET, &format!("/api/users/profile/{id}"), Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user"]["username"], "ada");
    assert!(body["user"].get("passwordHash").is_none());

    let (status, _) = app
        .call(
            Method::POST,
            "/api/users/login",
            None,
            Some(json!({ "userInfo": "ada", "password": "wrong" })),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = app
        .call(
            Method::POST,
            "/api/users/register",
            None,
            Some(json!({ "name": "x", "username": "ada", "email": "x@example.org", "password": "p" })),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn single_chat_reuse_delete_and_gate() {
    let app = app().await;
    let (_, a) = app.register("a").await;
    let (b_id, b) = app.register("b").await;

    let (status, body) = app
        .call(Method::POST, "/api/chats/create/single", Some(&a), Some(json!({ "userID": b_id })))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["message"], "A new chat has been created");
    let chat_id = body["chat"]["id"].as_str().unwrap().to_string();
    assert_eq!(body["chat"]["chatType"], "single");
    assert_eq!(body["chat"]["users"].as_array().unwrap().len(), 2);

    let (status, body) = app
        .call(Method::POST, "/api/chats/create/single", Some(&a), Some(json!({ "userID": b_id })))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["message"], "Already have chat between two users");
    assert_eq!(body["chat"]["id"], chat_id.as_str());

    // Single chats reject membership changes.
    let (status, _) = app
        .call(
            Method::PATCH,
            &format!("/api/chats/add-remove/member/{chat_id}"),
            Some(&a),
            Some(json!({ "userID": b_id })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = app
        .call(Method::DELETE, &format!("/api/chats/delete/{chat_id}"), Some(&b), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["chat"]["status"], "delete");

    let (status, body) = app
        .call(Method::GET, &format!("/api/chats/{chat_id}"), Some(&a), None)
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["message"], "Chat has been deleted");

    let (_, body) = app
        .call(Method::POST, "/api/chats/create/single", Some(&a), Some(json!({ "userID": b_id })))
        .await;
    assert_eq!(body["message"], "A new chat has been created");
    assert_ne!(body["chat"]["id"], chat_id.as_str());
}

#[tokio::test]
async fn member_toggle_round_trip_over_http() {
    let app = app().await;
    let (_, owner) = app.register("owner").await;
    let (guest_id, guest) = app.register("guest").await;
    let chat_id = app.create_group(&owner, "crew", "group").await;
    let uri = format!("/api/chats/add-remove/member/{chat_id}");

    let (status, body) = app
        .call(Method::PATCH, &uri, Some(&owner), Some(json!({ "userID": guest_id })))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Add new member");

    let (_, body) = app
        .call(Method::GET, &format!("/api/chats/get-members/{chat_id}"), Some(&guest), None)
        .await;
    assert_eq!(body["members"][0]["id"], guest_id.as_str());

    let (_, body) = app
        .call(Method::PATCH, &uri, Some(&owner), Some(json!({ "userID": guest_id })))
        .await;
    assert_eq!(body["message"], "Remove member");
    assert!(body["chat"]["users"].as_array().unwrap().is_empty());

    let (status, body) = app.call(Method::PATCH, &uri, Some(&owner), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["message"], "No user ID is provided");
}

#[tokio::test]
async fn discovery_lists_others_and_counts_all() {
    let app = app().await;
    let (_, a) = app.register("a").await;
    let (_, b) = app.register("b").await;
    app.create_group(&a, "mine", "group").await;
    app.create_group(&b, "theirs", "group").await;
    app.create_group(&b, "news", "channel").await;

    let (status, body) = app
        .call(Method::GET, "/api/chats?chatType=group&page=1&limit=10", Some(&a), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["totalCount"], 2);
    let chats = body["chats"].as_array().unwrap();
    assert_eq!(chats.len(), 1);
    assert_eq!(chats[0]["name"], "theirs");

    let (_, body) = app.call(Method::GET, "/api/chats?limit=1&page=2", Some(&a), None).await;
    assert_eq!(body["chats"][0]["name"], "theirs");

    let (status, _) = app.call(Method::GET, "/api/chats?chatType=dm", Some(&a), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn update_details_with_multipart_image() {
    let app = app().await;
    let (_, owner) = app.register("owner").await;
    let (_, other) = app.register("other").await;
    let chat_id = app.create_group(&owner, "crew", "group").await;
    let uri = format!("/api/chats/update-details/{chat_id}");

    let (status, _) = app
        .call(Method::PUT, &uri, Some(&other), Some(json!({ "name": "hijack" })))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let boundary = "huddle-boundary";
    let mut body = Vec::new();
    body.extend_from_slice(
        format!(
            "--{boundary}\r\nContent-Disposition: form-data; name=\"name\"\r\n\r\nrenamed\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(
        format!(
            "--{boundary}\r\nContent-Disposition: form-data; name=\"image\"; filename=\"a.png\"\r\n\
             Content-Type: image/png\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(PNG);
    body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());

    let req = Request::builder()
        .method(Method::PUT)
        .uri(&uri)
        .header("x-access-token", &owner)
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={boundary}"),
        )
        .body(Body::from(body))
        .unwrap();
    let (status, body) = app.send(req).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["chat"]["name"], "renamed");

    let image_url = body["chat"]["profileImage"].as_str().unwrap();
    let path = image_url.strip_prefix("http://test").unwrap();
    let req = Request::builder().uri(path).body(Body::empty()).unwrap();
    let response = app.router.clone().oneshot(req).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "image/png");
}

#[tokio::test]
async fn operator_restricts_and_reinstates_chat() {
    let app = app().await;
    let (_, owner) = app.register("owner").await;
    let chat_id = app.create_group(&owner, "crew", "channel").await;
    let admin_uri = format!("/admin/chats/{chat_id}/status");

    let (status, _) = app
        .call(Method::PATCH, &admin_uri, None, Some(json!({ "status": "restricted" })))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let restrict = |status: &str| {
        Request::builder()
            .method(Method::PATCH)
            .uri(&admin_uri)
            .header(header::AUTHORIZATION, format!("Bearer {ADMIN_TOKEN}"))
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(json!({ "status": status }).to_string()))
            .unwrap()
    };

    let (status, body) = app.send(restrict("restricted")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["chat"]["status"], "restricted");

    let (status, body) = app
        .call(Method::GET, &format!("/api/chats/{chat_id}"), Some(&owner), None)
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["message"], "Chat has been restricted");

    assert_eq!(app.send(restrict("active")).await.0, StatusCode::OK);
    assert_eq!(app.send(restrict("delete")).await.0, StatusCode::OK);
    assert_eq!(app.send(restrict("active")).await.0, StatusCode::CONFLICT);
}

#[tokio::test]
async fn suspended_user_is_locked_out_of_mutations() {
    let app = app().await;
    let (ada_id, ada) = app.register("ada").await;
    let (bob_id, _) = app.register("bob").await;

    let req = Request::builder()
        .method(Method::PATCH)
        .uri(format!("/admin/users/{ada_id}/status"))
        .header(header::AUTHORIZATION, format!("Bearer {ADMIN_TOKEN}"))
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(json!({ "status": "suspended" }).to_string()))
        .unwrap();
    assert_eq!(app.send(req).await.0, StatusCode::OK);

    // The token still claims "active"; the engine re-reads the account.
    let (status, _) = app
        .call(Method::PATCH, &format!("/api/users/report/{bob_id}"), Some(&ada), None)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn admin_policy_applies_over_http() {
    let app = app_with(ModerationPolicy {
        require_admin_for_role_changes: true,
        enforce_admin_subset_of_members: true,
        ..ModerationPolicy::default()
    })
    .await;
    let (_, owner) = app.register("owner").await;
    let (guest_id, guest) = app.register("guest").await;
    let chat_id = app.create_group(&owner, "crew", "group").await;

    let (status, _) = app
        .call(
            Method::PATCH,
            &format!("/api/chats/add-remove/admin/{chat_id}"),
            Some(&guest),
            Some(json!({ "userID": guest_id })),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app
        .call(
            Method::PATCH,
            &format!("/api/chats/add-remove/admin/{chat_id}"),
            Some(&owner),
            Some(json!({ "userID": guest_id })),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
}
