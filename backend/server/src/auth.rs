//! # Identity
//!
//! Sign-in is handled by Clerk. Every request from a signed-in browser
//! carries a short-lived session JWT, either as a bearer token or in the
//! `__session` cookie. We verify it locally with the instance's public key,
//! no network call needed, and use its subject as the external identity id.
//!
//! Local users are created lazily: the first time an identity touches its
//! profile we look up its email in Clerk and create the row. The webhook in
//! [`crate::webhooks`] covers the same ground from the other direction.
use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    extract::FromRequestParts,
    http::{
        HeaderMap,
        header::{AUTHORIZATION, COOKIE},
        request::Parts,
    },
};
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info};

use crate::{database::UserRecord, error::AppError, state::State};

pub const SESSION_COOKIE: &str = "__session";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub external_id: String,
}

#[derive(Debug, Deserialize)]
struct SessionClaims {
    sub: String,
}

pub struct IdentityVerifier {
    key: DecodingKey,
    validation: Validation,
}

impl IdentityVerifier {
    /// RS256 with the PEM public key from the Clerk dashboard.
    pub fn from_rsa_pem(pem: &str) -> Result<Self, jsonwebtoken::errors::Error> {
        Ok(Self::with_key(
            DecodingKey::from_rsa_pem(pem.as_bytes())?,
            Algorithm::RS256,
        ))
    }

    /// HS256, for tests and local runs.
    pub fn from_secret(secret: &[u8]) -> Self {
        Self::with_key(DecodingKey::from_secret(secret), Algorithm::HS256)
    }

    pub fn with_key(key: DecodingKey, algorithm: Algorithm) -> Self {
        let mut validation = Validation::new(algorithm);
        validation.validate_nbf = true;
        validation.set_required_spec_claims(&["exp", "sub"]);

        Self { key, validation }
    }

    pub fn verify(&self, token: &str) -> Option<Identity> {
        match decode::<SessionClaims>(token, &self.key, &self.validation) {
            Ok(data) if !data.claims.sub.is_empty() => Some(Identity {
                external_id: data.claims.sub,
            }),
            Ok(_) => None,
            Err(e) => {
                debug!("Rejected session token: {e}");
                None
            }
        }
    }
}

/// Bearer token first, then the session cookie.
pub fn session_token(headers: &HeaderMap) -> Option<&str> {
    let bearer = headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty());

    bearer.or_else(|| {
        headers
            .get_all(COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .flat_map(|value| value.split(';'))
            .filter_map(|pair| pair.trim().split_once('='))
            .find(|(name, _)| *name == SESSION_COOKIE)
            .map(|(_, token)| token)
            .filter(|token| !token.is_empty())
    })
}

/// Rejects with 401 when there is no valid session.
pub struct CurrentIdentity(pub Identity);

/// Never rejects; for pages that render differently for signed-in users.
pub struct MaybeIdentity(pub Option<Identity>);

impl FromRequestParts<Arc<State>> for CurrentIdentity {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<State>,
    ) -> Result<Self, Self::Rejection> {
        session_token(&parts.headers)
            .and_then(|token| state.verifier.verify(token))
            .map(CurrentIdentity)
            .ok_or(AppError::Unauthorized)
    }
}

impl FromRequestParts<Arc<State>> for MaybeIdentity {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<State>,
    ) -> Result<Self, Self::Rejection> {
        Ok(MaybeIdentity(
            session_token(&parts.headers).and_then(|token| state.verifier.verify(token)),
        ))
    }
}

#[derive(Error, Debug)]
pub enum DirectoryError {
    #[error("Identity provider request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Identity provider not configured")]
    NotConfigured,
}

/// What the identity provider knows about an identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryUser {
    pub email: Option<String>,
}

#[async_trait]
pub trait IdentityDirectory: Send + Sync {
    /// `None` when the provider does not know the identity.
    async fn lookup(&self, external_id: &str) -> Result<Option<DirectoryUser>, DirectoryError>;
}

#[derive(Debug, Deserialize)]
struct ClerkUser {
    #[serde(default)]
    email_addresses: Vec<ClerkEmail>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ClerkEmail {
    pub(crate) email_address: String,
}

pub struct ClerkDirectory {
    client: reqwest::Client,
    api_url: String,
    secret_key: Option<String>,
}

impl ClerkDirectory {
    pub fn new(client: reqwest::Client, api_url: &str, secret_key: Option<String>) -> Self {
        Self {
            client,
            api_url: api_url.trim_end_matches('/').to_string(),
            secret_key,
        }
    }
}

#[async_trait]
impl IdentityDirectory for ClerkDirectory {
    async fn lookup(&self, external_id: &str) -> Result<Option<DirectoryUser>, DirectoryError> {
        let secret_key = self
            .secret_key
            .as_deref()
            .ok_or(DirectoryError::NotConfigured)?;

        let response = self
            .client
            .get(format!("{}/users/{external_id}", self.api_url))
            .bearer_auth(secret_key)
            .send()
            .await?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let user: ClerkUser = response.error_for_status()?.json().await?;

        Ok(Some(DirectoryUser {
            email: user
                .email_addresses
                .into_iter()
                .next()
                .map(|e| e.email_address),
        }))
    }
}

/// Local user for the identity, created on first access.
pub async fn ensure_user(state: &State, identity: &Identity) -> Result<UserRecord, AppError> {
    if let Some(user) = state.store.find_by_identity(&identity.external_id).await? {
        return Ok(user);
    }

    let directory_user = state
        .directory
        .lookup(&identity.external_id)
        .await
        .map_err(AppError::internal)?
        .ok_or(AppError::NotFound("User not found"))?;

    let email = directory_user
        .email
        .ok_or_else(|| AppError::bad_request("No email found"))?;

    info!("Creating user for identity {}", identity.external_id);
    Ok(state
        .store
        .create_user(&identity.external_id, &email)
        .await?)
}

/// Local user for the identity; 404 when it was never created.
pub async fn require_user(state: &State, identity: &Identity) -> Result<UserRecord, AppError> {
    state
        .store
        .find_by_identity(&identity.external_id)
        .await?
        .ok_or(AppError::NotFound("User not found"))
}
