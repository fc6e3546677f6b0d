use std::{collections::HashMap, io::Cursor, path::PathBuf, sync::Arc};

use async_trait::async_trait;
use axum::{
    Router,
    body::{Body, Bytes},
    http::{
        HeaderMap, Method, Request, StatusCode,
        header::{AUTHORIZATION, CONTENT_TYPE, COOKIE, LOCATION},
    },
};
use base64::{Engine as _, engine::general_purpose::STANDARD};
use caldate_server::{
    app,
    auth::{DirectoryError, DirectoryUser, IdentityDirectory, IdentityVerifier},
    config::{Config, StoreBackend},
    database::{MemoryStore, ProfileStore},
    state::State,
    storage::MemoryBlobStore,
};
use hmac::{Hmac, Mac};
use http_body_util::BodyExt;
use image::{ImageBuffer, ImageFormat, Rgb};
use jsonwebtoken::{EncodingKey, Header, encode};
use serde::Serialize;
use serde_json::{Value, json};
use sha2::Sha256;
use tower::ServiceExt;

const JWT_SECRET: &[u8] = b"test-secret";
const BLOB_BASE: &str = "https://media.cal.date";
const WEBHOOK_SECRET: &str = "whsec_MfKQ9r8GKYqrTwjUPD8ILPZIo2LaLaSw";
const BOUNDARY: &str = "caldate-boundary";

struct StaticDirectory(HashMap<String, Option<String>>);

#[async_trait]
impl IdentityDirectory for StaticDirectory {
    async fn lookup(&self, external_id: &str) -> Result<Option<DirectoryUser>, DirectoryError> {
        Ok(self.0.get(external_id).map(|email| DirectoryUser {
            email: email.clone(),
        }))
    }
}

struct Harness {
    app: Router,
    store: Arc<MemoryStore>,
    blobs: Arc<MemoryBlobStore>,
}

fn config(webhook_secret: Option<&str>) -> Config {
    Config {
        port: 0,
        site_url: "https://cal.date".into(),
        store_backend: StoreBackend::Memory,
        redis_url: String::new(),
        blob_bucket: "test".into(),
        blob_public_url: BLOB_BASE.into(),
        max_upload_bytes: 1024 * 1024,
        og_font_path: PathBuf::from("/nonexistent.ttf"),
        clerk_api_url: String::new(),
        clerk_secret_key: None,
        clerk_jwt_key: String::new(),
        clerk_webhook_secret: webhook_secret.map(str::to_string),
    }
}

fn harness_with(webhook_secret: Option<&str>) -> Harness {
    let store = Arc::new(MemoryStore::new());
    let blobs = Arc::new(MemoryBlobStore::new(BLOB_BASE));
    let directory = StaticDirectory(HashMap::from([
        ("user_jane".to_string(), Some("jane@example.com".to_string())),
        ("user_john".to_string(), Some("john@example.com".to_string())),
        ("user_noemail".to_string(), None),
    ]));

    let state = State::from_parts(
        config(webhook_secret),
        store.clone(),
        blobs.clone(),
        IdentityVerifier::from_secret(JWT_SECRET),
        Arc::new(directory),
    );

    Harness {
        app: app(state),
        store,
        blobs,
    }
}

fn harness() -> Harness {
    harness_with(Some(WEBHOOK_SECRET))
}

#[derive(Serialize)]
struct Claims<'a> {
    sub: &'a str,
    exp: i64,
}

fn token(sub: &str) -> String {
    encode(
        &Header::default(),
        &Claims {
            sub,
            exp: chrono::Utc::now().timestamp() + 3600,
        },
        &EncodingKey::from_secret(JWT_SECRET),
    )
    .unwrap()
}

fn request(method: Method, uri: &str, user: Option<&str>) -> axum::http::request::Builder {
    let builder = Request::builder().method(method).uri(uri);
    match user {
        Some(user) => builder.header(AUTHORIZATION, format!("Bearer {}", token(user))),
        None => builder,
    }
}

fn png() -> Vec<u8> {
    let image = ImageBuffer::from_pixel(8, 8, Rgb([10u8, 120, 200]));
    let mut bytes = Cursor::new(Vec::new());
    image.write_to(&mut bytes, ImageFormat::Png).unwrap();
    bytes.into_inner()
}

fn multipart(file_name: &str, content: &[u8]) -> Body {
    let mut body = format!(
        "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{file_name}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
    )
    .into_bytes();
    body.extend_from_slice(content);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
    Body::from(body)
}

fn upload(uri: &str, user: &str, file_name: &str, content: &[u8]) -> Request<Body> {
    request(Method::POST, uri, Some(user))
        .header(CONTENT_TYPE, format!("multipart/form-data; boundary={BOUNDARY}"))
        .body(multipart(file_name, content))
        .unwrap()
}

fn json_request(method: Method, uri: &str, user: &str, body: Value) -> Request<Body> {
    request(method, uri, Some(user))
        .header(CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, HeaderMap, Bytes) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    (status, headers, body)
}

async fn send_json(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let (status, _, body) = send(app, request).await;
    (status, serde_json::from_slice(&body).unwrap_or(Value::Null))
}

async fn onboard(app: &Router, user: &str, username: &str) {
    let (status, _) = send_json(
        app,
        json_request(
            Method::PATCH,
            "/api/profile",
            user,
            json!({ "username": username, "displayName": "", "bio": "Coffee first." }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_requires_session() {
    let h = harness();

    let (status, body) = send_json(
        &h.app,
        request(Method::GET, "/api/profile", None).body(Body::empty()).unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body, json!({ "error": "Unauthorized" }));

    let (status, _) = send_json(
        &h.app,
        request(Method::GET, "/api/photos/gallery", None)
            .header(AUTHORIZATION, "Bearer not-a-jwt")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_profile_is_created_on_first_access() {
    let h = harness();

    let (status, body) = send_json(
        &h.app,
        request(Method::GET, "/api/profile", Some("user_jane"))
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["theme"], "clean");
    assert_eq!(body["completeness"], 0);
    assert_eq!(body["photos"], json!([]));

    let user = h.store.find_by_identity("user_jane").await.unwrap().unwrap();
    assert_eq!(user.email, "jane@example.com");
}

#[tokio::test]
async fn test_session_cookie() {
    let h = harness();

    let (status, _) = send_json(
        &h.app,
        Request::get("/api/profile")
            .header(COOKIE, format!("__session={}", token("user_jane")))
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_provisioning_failures() {
    let h = harness();

    let (status, body) = send_json(
        &h.app,
        request(Method::GET, "/api/profile", Some("user_ghost"))
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "User not found");

    let (status, body) = send_json(
        &h.app,
        request(Method::GET, "/api/profile", Some("user_noemail"))
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "No email found");
}

#[tokio::test]
async fn test_update_profile_validation() {
    let h = harness();

    let (status, body) = send_json(
        &h.app,
        json_request(
            Method::PATCH,
            "/api/profile",
            "user_jane",
            json!({ "username": "j!", "bookingUrl": "not a url", "theme": "neon" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Invalid data");

    let fields = &body["details"]["fieldErrors"];
    assert!(fields["username"].is_array());
    assert_eq!(fields["bookingUrl"], json!(["Please enter a valid URL"]));
    assert_eq!(fields["theme"], json!(["Unknown theme"]));

    let (status, body) = send_json(
        &h.app,
        request(Method::PATCH, "/api/profile", Some("user_jane"))
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from("{not json"))
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Invalid data");
}

#[tokio::test]
async fn test_update_profile_and_handle_conflict() {
    let h = harness();
    onboard(&h.app, "user_jane", "jane").await;

    let (status, body) = send_json(
        &h.app,
        request(Method::GET, "/api/profile", Some("user_jane"))
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["username"], "jane");
    assert_eq!(body["bio"], "Coffee first.");
    assert!(body["displayName"].is_null());
    assert_eq!(body["completeness"], 45);

    let (status, body) = send_json(
        &h.app,
        json_request(
            Method::PATCH,
            "/api/profile",
            "user_john",
            json!({ "username": "jane" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "Username already taken");
}

#[tokio::test]
async fn test_public_profile() {
    let h = harness();
    onboard(&h.app, "user_jane", "jane").await;

    let (status, body) = send_json(
        &h.app,
        request(Method::GET, "/api/users/jane", None)
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["username"], "jane");
    assert!(body.get("completeness").is_none());

    let (status, body) = send_json(
        &h.app,
        request(Method::GET, "/api/users/nobody", None)
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "User not found");
}

#[tokio::test]
async fn test_avatar_upload_and_replace() {
    let h = harness();
    onboard(&h.app, "user_jane", "jane").await;

    let (status, body) = send_json(
        &h.app,
        upload("/api/photos/avatar", "user_jane", "first.png", &png()),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let first = body["url"].as_str().unwrap().to_string();
    assert!(first.starts_with(BLOB_BASE));

    let (_, body) = send_json(
        &h.app,
        upload("/api/photos/avatar", "user_jane", "second photo.png", &png()),
    )
    .await;
    let second = body["url"].as_str().unwrap().to_string();
    assert!(second.ends_with("-second-photo.png"));

    // The first blob is gone, only the current avatar remains.
    let keys = h.blobs.keys();
    assert_eq!(keys.len(), 1);
    assert!(second.ends_with(&keys[0]));
    assert_eq!(h.blobs.content_type(&keys[0]).as_deref(), Some("image/png"));

    let user = h.store.find_by_identity("user_jane").await.unwrap().unwrap();
    assert_eq!(user.avatar_url.as_deref(), Some(second.as_str()));

    let (status, body) = send_json(
        &h.app,
        request(Method::DELETE, "/api/photos/avatar", Some("user_jane"))
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "success": true }));
    assert!(h.blobs.keys().is_empty());

    let user = h.store.find_by_identity("user_jane").await.unwrap().unwrap();
    assert_eq!(user.avatar_url, None);
}

#[tokio::test]
async fn test_avatar_same_file_name_gets_new_url() {
    let h = harness();
    onboard(&h.app, "user_jane", "jane").await;

    let (_, body) = send_json(
        &h.app,
        upload("/api/photos/avatar", "user_jane", "me.png", &png()),
    )
    .await;
    let first = body["url"].as_str().unwrap().to_string();

    let mut other = Cursor::new(Vec::new());
    ImageBuffer::from_pixel(8, 8, Rgb([250u8, 20, 20]))
        .write_to(&mut other, ImageFormat::Png)
        .unwrap();
    let (status, body) = send_json(
        &h.app,
        upload("/api/photos/avatar", "user_jane", "me.png", other.get_ref()),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let second = body["url"].as_str().unwrap().to_string();

    assert_ne!(first, second);
    assert!(second.ends_with("-me.png"));

    // The old blob is deleted, the new one stays.
    let keys = h.blobs.keys();
    assert_eq!(keys.len(), 1);
    assert!(second.ends_with(&keys[0]));

    let user = h.store.find_by_identity("user_jane").await.unwrap().unwrap();
    assert_eq!(user.avatar_url.as_deref(), Some(second.as_str()));
}

#[tokio::test]
async fn test_avatar_rejections() {
    let h = harness();
    onboard(&h.app, "user_jane", "jane").await;

    let (status, body) = send_json(
        &h.app,
        upload("/api/photos/avatar", "user_jane", "notes.txt", b"hello there"),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Unsupported image type");

    let (status, body) = send_json(
        &h.app,
        upload("/api/photos/avatar", "user_jane", "empty.png", b""),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "No file provided");

    let (status, body) = send_json(
        &h.app,
        upload("/api/photos/avatar", "user_john", "a.png", &png()),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "User not found");
    assert!(h.blobs.keys().is_empty());
}

#[tokio::test]
async fn test_oversized_upload() {
    let h = harness();
    onboard(&h.app, "user_jane", "jane").await;

    let (status, _) = send_json(
        &h.app,
        upload(
            "/api/photos/avatar",
            "user_jane",
            "huge.png",
            &vec![0u8; 2 * 1024 * 1024],
        ),
    )
    .await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
}

#[tokio::test]
async fn test_gallery_lifecycle() {
    let h = harness();
    onboard(&h.app, "user_jane", "jane").await;

    let mut ids = Vec::new();
    for i in 0..6 {
        let (status, body) = send_json(
            &h.app,
            upload(
                "/api/photos/gallery",
                "user_jane",
                &format!("photo{i}.png"),
                &png(),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["photo"]["order"], i);
        ids.push(body["photo"]["id"].as_str().unwrap().to_string());
    }

    let (status, body) = send_json(
        &h.app,
        upload("/api/photos/gallery", "user_jane", "seventh.png", &png()),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Maximum 6 photos allowed");
    assert_eq!(h.blobs.keys().len(), 6);

    let (status, body) = send_json(
        &h.app,
        request(Method::GET, "/api/photos/gallery", Some("user_jane"))
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let listed: Vec<&str> = body["photos"]
        .as_array()
        .unwrap()
        .iter()
        .map(|photo| photo["id"].as_str().unwrap())
        .collect();
    // Newest first, unlike the profile view.
    let newest_first: Vec<&str> = ids.iter().rev().map(String::as_str).collect();
    assert_eq!(listed, newest_first);

    let (_, body) = send_json(
        &h.app,
        request(Method::GET, "/api/profile", Some("user_jane"))
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    let in_profile: Vec<&str> = body["photos"]
        .as_array()
        .unwrap()
        .iter()
        .map(|photo| photo["id"].as_str().unwrap())
        .collect();
    assert_eq!(in_profile, ids.iter().map(String::as_str).collect::<Vec<_>>());

    let (status, body) = send_json(
        &h.app,
        request(
            Method::DELETE,
            &format!("/api/photos/gallery?id={}", ids[0]),
            Some("user_jane"),
        )
        .body(Body::empty())
        .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "success": true }));
    assert_eq!(h.blobs.keys().len(), 5);

    // A freed slot takes the next order, not the freed one.
    let (_, body) = send_json(
        &h.app,
        upload("/api/photos/gallery", "user_jane", "again.png", &png()),
    )
    .await;
    assert_eq!(body["photo"]["order"], 6);
}

#[tokio::test]
async fn test_gallery_delete_errors() {
    let h = harness();
    onboard(&h.app, "user_jane", "jane").await;
    onboard(&h.app, "user_john", "john").await;

    let (_, body) = send_json(
        &h.app,
        upload("/api/photos/gallery", "user_jane", "a.png", &png()),
    )
    .await;
    let jane_photo = body["photo"]["id"].as_str().unwrap().to_string();

    let cases = [
        ("/api/photos/gallery".to_string(), "user_jane", 400, "Photo ID required"),
        ("/api/photos/gallery?id=".to_string(), "user_jane", 400, "Photo ID required"),
        ("/api/photos/gallery?id=nope".to_string(), "user_jane", 404, "Photo not found"),
        (format!("/api/photos/gallery?id={jane_photo}"), "user_john", 404, "Photo not found"),
    ];

    for (uri, user, expected_status, expected_error) in cases {
        let (status, body) = send_json(
            &h.app,
            request(Method::DELETE, &uri, Some(user))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(status.as_u16(), expected_status, "{uri}");
        assert_eq!(body["error"], expected_error, "{uri}");
    }

    assert_eq!(h.blobs.keys().len(), 1);
}

#[tokio::test]
async fn test_posts() {
    let h = harness();

    let (status, _) = send_json(
        &h.app,
        request(Method::GET, "/api/posts", Some("user_jane"))
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    onboard(&h.app, "user_jane", "jane").await;

    let (status, body) = send_json(
        &h.app,
        json_request(
            Method::POST,
            "/api/posts",
            "user_jane",
            json!({ "title": "  First date ideas ", "content": "Picnic" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["title"], "First date ideas");

    let (status, _) = send_json(
        &h.app,
        json_request(Method::POST, "/api/posts", "user_jane", json!({ "title": " " })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, body) = send_json(
        &h.app,
        request(Method::GET, "/api/posts", Some("user_jane"))
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(body.as_array().map(Vec::len), Some(1));
}

#[tokio::test]
async fn test_profile_pages() {
    let h = harness();
    onboard(&h.app, "user_jane", "jane").await;

    for path in ["/jane", "/@jane"] {
        let (status, headers, body) = send(
            &h.app,
            request(Method::GET, path, None).body(Body::empty()).unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::OK, "{path}");
        assert!(headers[CONTENT_TYPE].to_str().unwrap().starts_with("text/html"));

        let html = String::from_utf8(body.to_vec()).unwrap();
        assert!(html.contains("<title>jane | cal.date</title>"));
        assert!(!html.contains("href=\"/settings\""));
    }

    let (_, _, body) = send(
        &h.app,
        request(Method::GET, "/@jane", Some("user_jane"))
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert!(String::from_utf8(body.to_vec()).unwrap().contains("href=\"/settings\""));

    let (status, _, body) = send(
        &h.app,
        request(Method::GET, "/@nobody", None).body(Body::empty()).unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(String::from_utf8(body.to_vec()).unwrap().contains("Profile not found"));
}

#[tokio::test]
async fn test_preview_images() {
    let h = harness();
    onboard(&h.app, "user_jane", "jane").await;

    for path in ["/jane/og", "/api/og/jane", "/og.png"] {
        let (status, headers, body) = send(
            &h.app,
            request(Method::GET, path, None).body(Body::empty()).unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::OK, "{path}");
        assert_eq!(headers[CONTENT_TYPE], "image/png");

        let image = image::load_from_memory(&body).unwrap();
        assert_eq!((image.width(), image.height()), (1200, 630));
    }

    let (status, headers, _) = send(
        &h.app,
        request(Method::GET, "/nobody/og", None).body(Body::empty()).unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::FOUND);
    assert_eq!(headers[LOCATION], "/og.png");
}

#[tokio::test]
async fn test_onboarding_redirects() {
    let h = harness();

    async fn location(app: &Router, path: &str, user: Option<&str>) -> Option<String> {
        let (status, headers, _) = send(
            app,
            request(Method::GET, path, user).body(Body::empty()).unwrap(),
        )
        .await;
        (status == StatusCode::FOUND)
            .then(|| headers[LOCATION].to_str().unwrap().to_string())
    }

    assert_eq!(location(&h.app, "/onboard", None).await.as_deref(), Some("/"));
    assert_eq!(location(&h.app, "/settings", None).await.as_deref(), Some("/"));
    assert_eq!(location(&h.app, "/", None).await, None);

    // Signed in, no handle yet.
    for path in ["/", "/settings", "/someone"] {
        assert_eq!(
            location(&h.app, path, Some("user_jane")).await.as_deref(),
            Some("/onboard"),
            "{path}"
        );
    }
    assert_eq!(location(&h.app, "/onboard", Some("user_jane")).await, None);

    onboard(&h.app, "user_jane", "jane").await;
    assert_eq!(
        location(&h.app, "/onboard", Some("user_jane")).await.as_deref(),
        Some("/@jane")
    );
    assert_eq!(location(&h.app, "/settings", Some("user_jane")).await, None);
}

#[tokio::test]
async fn test_healthz() {
    let h = harness();
    let (status, _, body) = send(
        &h.app,
        request(Method::GET, "/healthz", None).body(Body::empty()).unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(&body[..], b"OK");
}

fn webhook(secret: &str, body: &str) -> Request<Body> {
    let id = "msg_test";
    let timestamp = chrono::Utc::now().timestamp();
    let key = STANDARD
        .decode(secret.trim_start_matches("whsec_"))
        .unwrap();

    let mut mac = Hmac::<Sha256>::new_from_slice(&key).unwrap();
    mac.update(format!("{id}.{timestamp}.{body}").as_bytes());
    let signature = STANDARD.encode(mac.finalize().into_bytes());

    Request::post("/api/webhooks/clerk")
        .header("svix-id", id)
        .header("svix-timestamp", timestamp.to_string())
        .header("svix-signature", format!("v1,{signature}"))
        .header(CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn test_webhook_user_lifecycle() {
    let h = harness();

    let created = json!({
        "type": "user.created",
        "data": { "id": "user_new", "email_addresses": [{ "email_address": "new@example.com" }] }
    })
    .to_string();
    let (status, _, body) = send(&h.app, webhook(WEBHOOK_SECRET, &created)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(&body[..], b"OK");

    let user = h.store.find_by_identity("user_new").await.unwrap().unwrap();
    assert_eq!(user.email, "new@example.com");

    // Give the user an avatar so the cascade has a blob to clean up.
    onboard(&h.app, "user_jane", "jane").await;
    send(&h.app, upload("/api/photos/avatar", "user_jane", "a.png", &png())).await;
    send(&h.app, upload("/api/photos/gallery", "user_jane", "b.png", &png())).await;
    assert_eq!(h.blobs.keys().len(), 2);

    let deleted = json!({ "type": "user.deleted", "data": { "id": "user_jane" } }).to_string();
    let (status, _, _) = send(&h.app, webhook(WEBHOOK_SECRET, &deleted)).await;
    assert_eq!(status, StatusCode::OK);

    assert!(h.store.find_by_identity("user_jane").await.unwrap().is_none());
    assert!(h.store.find_by_handle("jane").await.unwrap().is_none());
    assert!(h.blobs.keys().is_empty());

    let other = json!({ "type": "session.created", "data": { "id": "sess_1" } }).to_string();
    let (status, _, _) = send(&h.app, webhook(WEBHOOK_SECRET, &other)).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_webhook_rejections() {
    let h = harness();
    let body = json!({ "type": "user.created", "data": { "id": "user_x", "email_addresses": [] } })
        .to_string();

    let (status, _, text) = send(&h.app, webhook(WEBHOOK_SECRET, &body)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(&text[..], b"No email found");

    let (status, _, text) = send(&h.app, webhook("whsec_c2VjcmV0", &body)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(&text[..], b"Invalid signature");

    let (status, _, text) = send(
        &h.app,
        Request::post("/api/webhooks/clerk")
            .body(Body::from(body.clone()))
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(&text[..], b"Missing svix headers");

    let unconfigured = harness_with(None);
    let (status, _, text) = send(&unconfigured.app, webhook(WEBHOOK_SECRET, &body)).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(&text[..], b"Webhook secret not configured");
}
