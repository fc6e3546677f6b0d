//! Backend for cal.date, a one-link dating profile.
//!
//! Signed-in users pick a handle, write a short bio, upload an avatar and up
//! to six gallery photos, pick a theme and link their booking page. Everyone
//! else sees the result at `/@handle`, and link unfurls get a generated
//! preview card.
//!
//!
//!
//! # General Infrastructure
//! - Sign-in is delegated to Clerk; we only verify its session JWTs
//! - Profiles, photo metadata and posts live in Redis
//! - Image bytes live in S3 behind a public base URL; Redis keeps only URLs
//! - Preview cards are rendered on request and cached by the CDN
//!
//!
//!
//! # Upload Pipeline
//!
//! **Goal**: the profile store never points at a blob that does not exist.
//!
//! - Browser compresses the image (see `caldate-client`)
//! - Server sniffs the bytes, only png, jpeg and webp get through
//! - Blob is written first, then the profile store is pointed at it
//! - The replaced or rejected blob is deleted afterwards, best effort
//! - Gallery capacity is checked before the upload and again atomically at insert
//!
//!
//!
//! # Onboarding
//!
//! A signed-in identity without a handle is sent to `/onboard` from every
//! page. Once a handle exists `/onboard` forwards to the public profile.
//! See [`caldate_payloads::onboarding`] for the table.
//!
//!
//!
//! # Configuration
//!
//! | variable | default |
//! |----------|---------|
//! | `RUST_PORT` | `1111` |
//! | `SITE_URL` | `https://cal.date` |
//! | `STORE_BACKEND` | `redis` (`memory` for local runs) |
//! | `REDIS_URL` | `redis://127.0.0.1:6379` |
//! | `BLOB_BUCKET` / `BLOB_PUBLIC_URL` | `caldate-media` / its S3 URL |
//! | `MAX_UPLOAD_BYTES` | `5242880` |
//! | `OG_FONT_PATH` | DejaVu Sans |
//! | `RUST_LOG` | unset |
//!
//! Secrets (`CLERK_JWT_KEY`, `CLERK_SECRET_KEY`, `CLERK_WEBHOOK_SECRET`) are
//! read from `/run/secrets` first, then from the environment.
//!
//!
//!
//! # Setup
//!
//! View current docs.
//! ```sh
//! cargo doc --open
//! ```
//!
//! Run locally without Redis or S3.
//! ```sh
//! STORE_BACKEND=memory RUST_LOG=info cargo run -p caldate
//! ```
use std::{sync::Arc, time::Duration};

use anyhow::Context;
use axum::{
    Router,
    extract::DefaultBodyLimit,
    http::{
        HeaderValue, Method,
        header::{AUTHORIZATION, CONTENT_TYPE},
    },
    routing::{get, post},
};

use signal::{
    ctrl_c,
    unix::{SignalKind, signal},
};
use tokio::{net::TcpListener, signal};
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt};

pub mod auth;
pub mod config;
pub mod database;
pub mod error;
pub mod images;
pub mod og;
pub mod pages;
pub mod routes;
pub mod state;
pub mod storage;
pub mod utils;
pub mod webhooks;

use config::Config;
use routes::{
    create_post_handler, delete_avatar_handler, delete_gallery_handler, get_profile_handler,
    health_handler, home_handler, list_gallery_handler, list_posts_handler, onboard_handler,
    preview_handler, profile_page_handler, public_profile_handler, settings_handler,
    site_preview_handler, update_profile_handler, upload_avatar_handler, upload_gallery_handler,
};
use state::State;
use webhooks::clerk_webhook;

/// Room for the multipart envelope around a maximum-size file.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

pub fn app(state: Arc<State>) -> Router {
    let mut cors = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([CONTENT_TYPE, AUTHORIZATION])
        .allow_credentials(true)
        .max_age(Duration::from_secs(60 * 60));

    match HeaderValue::from_str(&state.config.site_url) {
        Ok(origin) => cors = cors.allow_origin(AllowOrigin::exact(origin)),
        Err(e) => warn!("SITE_URL is not a valid origin, CORS disabled: {e}"),
    }

    let uploads = Router::new()
        .route(
            "/api/photos/avatar",
            post(upload_avatar_handler).delete(delete_avatar_handler),
        )
        .route(
            "/api/photos/gallery",
            get(list_gallery_handler)
                .post(upload_gallery_handler)
                .delete(delete_gallery_handler),
        )
        .layer(DefaultBodyLimit::max(
            state.config.max_upload_bytes + MULTIPART_OVERHEAD,
        ));

    Router::new()
        .route(
            "/api/profile",
            get(get_profile_handler).patch(update_profile_handler),
        )
        .route("/api/users/{username}", get(public_profile_handler))
        .route(
            "/api/posts",
            get(list_posts_handler).post(create_post_handler),
        )
        .route("/api/og/{handle}", get(preview_handler))
        .route("/api/webhooks/clerk", post(clerk_webhook))
        .merge(uploads)
        .route("/", get(home_handler))
        .route("/onboard", get(onboard_handler))
        .route("/settings", get(settings_handler))
        .route("/healthz", get(health_handler))
        .route("/og.png", get(site_preview_handler))
        .route("/{handle}", get(profile_page_handler))
        .route("/{handle}/og", get(preview_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn start_server() -> anyhow::Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();

    info!("Loading config...");
    let config = Config::load()?;

    info!("Initializing state...");
    let state = State::new(config).await?;

    info!("Starting server...");
    let address = format!("0.0.0.0:{}", state.config.port);
    let app = app(state);

    info!("Binding to {address}");
    let listener = TcpListener::bind(&address)
        .await
        .with_context(|| format!("Failed to bind {address}"))?;
    info!("Server running on {address}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutting down...");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }

        info!("Received Ctrl+C, shutting down");
    };

    #[cfg(unix)]
    let terminate = async {
        match signal(SignalKind::terminate()) {
            Ok(mut terminate) => {
                terminate.recv().await;
            }
            Err(e) => {
                warn!("Failed to install signal handler: {e}");
                std::future::pending::<()>().await;
            }
        }

        info!("Received terminate signal, shutting down");
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
