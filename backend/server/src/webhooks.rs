//! # Identity provider webhooks
//!
//! Clerk delivers user lifecycle events through svix. Each delivery is signed:
//!
//! ```text
//! svix-id:        msg_...
//! svix-timestamp: unix seconds
//! svix-signature: v1,<base64 hmac> [v1,<base64 hmac> ...]
//! ```
//!
//! The HMAC-SHA256 covers `{id}.{timestamp}.{body}` keyed with the base64
//! part of the `whsec_...` secret. Any listed signature may match, which is
//! how secret rotation works. Deliveries older or newer than five minutes
//! are rejected to limit replays.
use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State as AxumState,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use base64::{Engine as _, engine::general_purpose::STANDARD};
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::{auth::ClerkEmail, database::DeletedUser, state::State, storage::BlobStore};

type HmacSha256 = Hmac<Sha256>;

const TOLERANCE_SECS: u64 = 5 * 60;
const SECRET_PREFIX: &str = "whsec_";

#[derive(Error, Debug)]
pub enum WebhookError {
    #[error("Webhook secret not configured")]
    NotConfigured,

    #[error("Missing svix headers")]
    MissingHeaders,

    #[error("Invalid signature")]
    InvalidSignature,

    #[error("Invalid payload")]
    InvalidPayload,

    #[error("No email found")]
    NoEmail,

    #[error("Internal error")]
    Internal,
}

impl IntoResponse for WebhookError {
    fn into_response(self) -> Response {
        let status = match self {
            WebhookError::NotConfigured | WebhookError::Internal => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            _ => StatusCode::BAD_REQUEST,
        };

        (status, self.to_string()).into_response()
    }
}

#[derive(Debug)]
pub struct SvixHeaders<'a> {
    pub id: &'a str,
    pub timestamp: &'a str,
    pub signature: &'a str,
}

impl<'a> SvixHeaders<'a> {
    pub fn from_headers(headers: &'a HeaderMap) -> Result<Self, WebhookError> {
        let get = |name: &str| {
            headers
                .get(name)
                .and_then(|value| value.to_str().ok())
                .filter(|value| !value.is_empty())
                .ok_or(WebhookError::MissingHeaders)
        };

        Ok(Self {
            id: get("svix-id")?,
            timestamp: get("svix-timestamp")?,
            signature: get("svix-signature")?,
        })
    }
}

fn signing_key(secret: &str) -> Result<Vec<u8>, WebhookError> {
    let encoded = secret.strip_prefix(SECRET_PREFIX).unwrap_or(secret);

    STANDARD.decode(encoded).map_err(|e| {
        error!("Webhook secret is not valid base64: {e}");
        WebhookError::NotConfigured
    })
}

pub fn verify_signature(
    secret: &str,
    headers: &SvixHeaders<'_>,
    body: &[u8],
    now: i64,
) -> Result<(), WebhookError> {
    let timestamp: i64 = headers
        .timestamp
        .parse()
        .map_err(|_| WebhookError::InvalidSignature)?;

    if now.abs_diff(timestamp) > TOLERANCE_SECS {
        warn!("Webhook {} outside tolerance: {timestamp}", headers.id);
        return Err(WebhookError::InvalidSignature);
    }

    let mut mac =
        HmacSha256::new_from_slice(&signing_key(secret)?).map_err(|_| WebhookError::NotConfigured)?;
    mac.update(headers.id.as_bytes());
    mac.update(b".");
    mac.update(headers.timestamp.as_bytes());
    mac.update(b".");
    mac.update(body);

    let matched = headers
        .signature
        .split_whitespace()
        .filter_map(|entry| entry.strip_prefix("v1,"))
        .filter_map(|signature| STANDARD.decode(signature).ok())
        .any(|signature| mac.clone().verify_slice(&signature).is_ok());

    if matched {
        Ok(())
    } else {
        Err(WebhookError::InvalidSignature)
    }
}

#[derive(Debug, Deserialize)]
struct ClerkEvent {
    #[serde(rename = "type")]
    kind: String,
    data: ClerkEventData,
}

#[derive(Debug, Deserialize)]
struct ClerkEventData {
    id: String,
    #[serde(default)]
    email_addresses: Vec<ClerkEmail>,
}

pub async fn clerk_webhook(
    AxumState(state): AxumState<Arc<State>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, WebhookError> {
    let secret = state
        .config
        .clerk_webhook_secret
        .as_deref()
        .ok_or(WebhookError::NotConfigured)?;

    let svix = SvixHeaders::from_headers(&headers)?;
    verify_signature(secret, &svix, &body, chrono::Utc::now().timestamp())?;

    let event: ClerkEvent =
        serde_json::from_slice(&body).map_err(|_| WebhookError::InvalidPayload)?;
    info!("Webhook {} delivered {}", svix.id, event.kind);

    match event.kind.as_str() {
        "user.created" => {
            let email = event
                .data
                .email_addresses
                .into_iter()
                .next()
                .map(|e| e.email_address)
                .ok_or(WebhookError::NoEmail)?;

            state
                .store
                .create_user(&event.data.id, &email)
                .await
                .map_err(|e| {
                    error!("Failed to create user {}: {e}", event.data.id);
                    WebhookError::Internal
                })?;
        }
        "user.deleted" => {
            let deleted = state
                .store
                .delete_by_identity(&event.data.id)
                .await
                .map_err(|e| {
                    error!("Failed to delete user {}: {e}", event.data.id);
                    WebhookError::Internal
                })?;

            if let Some(deleted) = deleted {
                remove_blobs(state.blobs.as_ref(), &deleted).await;
            }
        }
        _ => {}
    }

    Ok((StatusCode::OK, "OK"))
}

async fn remove_blobs(blobs: &dyn BlobStore, deleted: &DeletedUser) {
    let urls = deleted
        .user
        .avatar_url
        .iter()
        .chain(deleted.photos.iter().map(|photo| &photo.url));

    for url in urls {
        if let Err(e) = blobs.delete(url).await {
            warn!("Failed to remove blob of deleted user {}: {e}", deleted.user.id);
        }
    }
}
