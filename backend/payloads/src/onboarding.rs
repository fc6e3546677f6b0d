//! # Onboarding
//!
//! A signed-in identity is either still setting up (no handle yet) or done.
//! Pages redirect based on that stage:
//!
//! | page        | signed out | needs profile | complete      |
//! |-------------|------------|---------------|---------------|
//! | `/onboard`  | `/`        | stay          | `/@handle`    |
//! | `/settings` | `/`        | `/onboard`    | stay          |
//! | other       | stay       | `/onboard`    | stay          |
//!
//! The completion score shown while onboarding is computed by [`completeness`].
use crate::handle::profile_path;

pub const ONBOARD_PATH: &str = "/onboard";
pub const SETTINGS_PATH: &str = "/settings";
pub const HOME_PATH: &str = "/";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Stage {
    SignedOut,
    NeedsProfile,
    Complete { handle: String },
}

impl Stage {
    pub fn for_handle(handle: Option<&str>) -> Self {
        match handle {
            Some(handle) if !handle.is_empty() => Stage::Complete {
                handle: handle.to_string(),
            },
            _ => Stage::NeedsProfile,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Page<'a> {
    Onboard,
    Settings,
    Other(&'a str),
}

impl<'a> Page<'a> {
    pub fn from_path(path: &'a str) -> Self {
        match path.trim_end_matches('/') {
            ONBOARD_PATH => Page::Onboard,
            SETTINGS_PATH => Page::Settings,
            _ => Page::Other(path),
        }
    }
}

pub fn redirect_for(stage: &Stage, page: Page<'_>) -> Option<String> {
    match (stage, page) {
        (Stage::SignedOut, Page::Onboard | Page::Settings) => Some(HOME_PATH.to_string()),
        (Stage::SignedOut, Page::Other(_)) => None,
        (Stage::NeedsProfile, Page::Onboard) => None,
        (Stage::NeedsProfile, _) => Some(ONBOARD_PATH.to_string()),
        (Stage::Complete { handle }, Page::Onboard) => Some(profile_path(handle)),
        (Stage::Complete { .. }, _) => None,
    }
}

pub const USERNAME_WEIGHT: u8 = 35;
pub const DISPLAY_NAME_WEIGHT: u8 = 15;
pub const AVATAR_WEIGHT: u8 = 20;
pub const BIO_WEIGHT: u8 = 10;
pub const BOOKING_WEIGHT: u8 = 10;
pub const PHOTOS_WEIGHT: u8 = 10;

/// Fields that count toward the completion score.
#[derive(Debug, Clone, Copy, Default)]
pub struct Draft<'a> {
    pub username: Option<&'a str>,
    pub display_name: Option<&'a str>,
    pub avatar_url: Option<&'a str>,
    pub bio: Option<&'a str>,
    pub booking_url: Option<&'a str>,
    pub photo_count: usize,
}

fn filled(value: Option<&str>) -> bool {
    value.is_some_and(|v| !v.is_empty())
}

/// Percentage in `0..=100`.
pub fn completeness(draft: &Draft<'_>) -> u8 {
    let mut score: u16 = 0;

    if draft.username.is_some_and(|u| u.chars().count() >= 3) {
        score += u16::from(USERNAME_WEIGHT);
    }
    if filled(draft.display_name) {
        score += u16::from(DISPLAY_NAME_WEIGHT);
    }
    if filled(draft.avatar_url) {
        score += u16::from(AVATAR_WEIGHT);
    }
    if filled(draft.bio) {
        score += u16::from(BIO_WEIGHT);
    }
    if filled(draft.booking_url) {
        score += u16::from(BOOKING_WEIGHT);
    }
    if draft.photo_count > 0 {
        score += u16::from(PHOTOS_WEIGHT);
    }

    score.min(100) as u8
}
