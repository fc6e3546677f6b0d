//! # Profile payloads
//!
//! What the settings/onboarding forms send and what the profile endpoints
//! return.
//!
//! ## Rules
//!
//! - username: 3 to 20 characters, letters, numbers and underscores
//! - displayName: at most 50 characters
//! - bio: at most 300 characters
//! - bookingUrl: absolute URL, or empty to clear it
//! - theme: one of the known theme ids, defaults to `clean`
//!
//! Empty optional strings are stored as absent.
use serde::{Deserialize, Serialize};
use url::Url;
use uuid::Uuid;

use crate::{error::FieldErrors, handle::has_handle_charset, theme::ThemeId};

pub const MAX_DISPLAY_NAME: usize = 50;
pub const MAX_BIO: usize = 300;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Photo {
    pub id: Uuid,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileView {
    pub username: Option<String>,
    pub display_name: Option<String>,
    pub bio: Option<String>,
    pub avatar_url: Option<String>,
    pub booking_url: Option<String>,
    #[serde(default)]
    pub theme: ThemeId,
    #[serde(default)]
    pub photos: Vec<Photo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completeness: Option<u8>,
}

impl ProfileView {
    /// Display name, then handle, then a generic label.
    pub fn title(&self) -> &str {
        self.display_name
            .as_deref()
            .or(self.username.as_deref())
            .unwrap_or("User")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProfile {
    pub username: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub bio: Option<String>,
    #[serde(default)]
    pub booking_url: Option<String>,
    #[serde(default)]
    pub theme: Option<String>,
}

/// A validated, normalized [`UpdateProfile`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidProfile {
    pub username: String,
    pub display_name: Option<String>,
    pub bio: Option<String>,
    pub booking_url: Option<String>,
    pub theme: ThemeId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Success {
    pub success: bool,
}

impl Success {
    pub const OK: Success = Success { success: true };
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value.as_ref().filter(|v| !v.is_empty()).cloned()
}

impl UpdateProfile {
    pub fn validate(&self) -> Result<ValidProfile, FieldErrors> {
        let mut errors = FieldErrors::default();

        let length = self.username.chars().count();
        if length < 3 {
            errors.push("username", "Username must be at least 3 characters");
        }
        if length > 20 {
            errors.push("username", "Username must be less than 20 characters");
        }
        if !self.username.is_empty() && !has_handle_charset(&self.username) {
            errors.push("username", "Only letters, numbers, and underscores");
        }

        let display_name = non_empty(&self.display_name);
        if display_name
            .as_ref()
            .is_some_and(|name| name.chars().count() > MAX_DISPLAY_NAME)
        {
            errors.push("displayName", "Display name must be at most 50 characters");
        }

        let bio = non_empty(&self.bio);
        if bio.as_ref().is_some_and(|bio| bio.chars().count() > MAX_BIO) {
            errors.push("bio", "Bio must be at most 300 characters");
        }

        let booking_url = non_empty(&self.booking_url);
        if let Some(raw) = &booking_url {
            if !is_absolute_url(raw) {
                errors.push("bookingUrl", "Please enter a valid URL");
            }
        }

        let theme = match self.theme.as_deref() {
            None | Some("") => ThemeId::default(),
            Some(raw) => raw.parse().unwrap_or_else(|_| {
                errors.push("theme", "Unknown theme");
                ThemeId::default()
            }),
        };

        if !errors.is_empty() {
            return Err(errors);
        }

        Ok(ValidProfile {
            username: self.username.clone(),
            display_name,
            bio,
            booking_url,
            theme,
        })
    }
}

fn is_absolute_url(raw: &str) -> bool {
    Url::parse(raw).is_ok_and(|url| url.has_host())
}
