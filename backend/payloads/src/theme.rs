//! # Themes
//!
//! Visual themes a profile can pick. Only the id is stored per user, the
//! palette lives here so the page renderer and the preview renderer agree.
//!
//! Unknown or missing ids resolve to [`ThemeId::Clean`].
use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThemeId {
    #[default]
    Clean,
    Midnight,
    Blush,
    Sage,
    Sand,
    Ocean,
}

/// RGB triples.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Palette {
    pub background: [u8; 3],
    pub surface: [u8; 3],
    pub text: [u8; 3],
    pub muted: [u8; 3],
    pub accent: [u8; 3],
}

impl Palette {
    pub fn css(color: [u8; 3]) -> String {
        format!("#{:02x}{:02x}{:02x}", color[0], color[1], color[2])
    }
}

impl ThemeId {
    pub const ALL: [ThemeId; 6] = [
        ThemeId::Clean,
        ThemeId::Midnight,
        ThemeId::Blush,
        ThemeId::Sage,
        ThemeId::Sand,
        ThemeId::Ocean,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ThemeId::Clean => "clean",
            ThemeId::Midnight => "midnight",
            ThemeId::Blush => "blush",
            ThemeId::Sage => "sage",
            ThemeId::Sand => "sand",
            ThemeId::Ocean => "ocean",
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ThemeId::Clean => "Clean",
            ThemeId::Midnight => "Midnight",
            ThemeId::Blush => "Blush",
            ThemeId::Sage => "Sage",
            ThemeId::Sand => "Sand",
            ThemeId::Ocean => "Ocean",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            ThemeId::Clean => "Light stone, nothing in the way",
            ThemeId::Midnight => "Dark and quiet",
            ThemeId::Blush => "Soft pink warmth",
            ThemeId::Sage => "Muted greens",
            ThemeId::Sand => "Warm neutrals",
            ThemeId::Ocean => "Cool blues",
        }
    }

    pub fn palette(self) -> Palette {
        match self {
            ThemeId::Clean => Palette {
                background: [0xfa, 0xfa, 0xf9],
                surface: [0xff, 0xff, 0xff],
                text: [0x1c, 0x19, 0x17],
                muted: [0x78, 0x71, 0x6c],
                accent: [0xe8, 0x5a, 0x77],
            },
            ThemeId::Midnight => Palette {
                background: [0x0c, 0x0a, 0x09],
                surface: [0x1c, 0x19, 0x17],
                text: [0xfa, 0xfa, 0xf9],
                muted: [0xa8, 0xa2, 0x9e],
                accent: [0xa7, 0x8b, 0xfa],
            },
            ThemeId::Blush => Palette {
                background: [0xfd, 0xf2, 0xf8],
                surface: [0xff, 0xff, 0xff],
                text: [0x50, 0x07, 0x24],
                muted: [0x9d, 0x17, 0x4d],
                accent: [0xec, 0x48, 0x99],
            },
            ThemeId::Sage => Palette {
                background: [0xf0, 0xf4, 0xef],
                surface: [0xff, 0xff, 0xff],
                text: [0x1a, 0x2e, 0x1f],
                muted: [0x5b, 0x6f, 0x5e],
                accent: [0x4d, 0x7c, 0x0f],
            },
            ThemeId::Sand => Palette {
                background: [0xfa, 0xf6, 0xee],
                surface: [0xff, 0xfd, 0xf8],
                text: [0x42, 0x2f, 0x1c],
                muted: [0x8a, 0x74, 0x5c],
                accent: [0xc2, 0x74, 0x1c],
            },
            ThemeId::Ocean => Palette {
                background: [0xef, 0xf6, 0xff],
                surface: [0xff, 0xff, 0xff],
                text: [0x0c, 0x1e, 0x3a],
                muted: [0x47, 0x5f, 0x82],
                accent: [0x25, 0x63, 0xeb],
            },
        }
    }

    /// Stored theme ids are free text; anything unrecognized falls back to clean.
    pub fn resolve(stored: Option<&str>) -> Self {
        stored.and_then(|id| id.parse().ok()).unwrap_or_default()
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown theme: {0}")]
pub struct UnknownTheme(pub String);

impl FromStr for ThemeId {
    type Err = UnknownTheme;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ThemeId::ALL
            .into_iter()
            .find(|theme| theme.as_str() == s)
            .ok_or_else(|| UnknownTheme(s.to_string()))
    }
}

impl fmt::Display for ThemeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
