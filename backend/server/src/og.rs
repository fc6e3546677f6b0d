//! # Social preview images
//!
//! 1200×630 PNG cards for link unfurls.
//!
//! ```text
//! ┌──────────────────────┬──────────────────────┐
//! │        avatar        │                      │
//! │     Display Name     │   Book a date with   │
//! │        @handle       │     Display Name     │
//! │       ── ABOUT ──    │   cal.date/@handle   │
//! │   bio, 120 chars...  │                      │
//! └──────────────────────┴──────────────────────┘
//! ```
//!
//! Text needs a TrueType font on disk (`OG_FONT_PATH`). Without one the card
//! is still drawn, just without text.
use std::{io::Cursor, path::Path, time::Duration};

use ab_glyph::{FontArc, PxScale};
use caldate_payloads::{ThemeId, handle::profile_path, theme::Palette};
use image::{DynamicImage, ImageFormat, Rgba, RgbaImage, imageops::FilterType};
use imageproc::{
    drawing::{draw_filled_circle_mut, draw_filled_rect_mut, draw_text_mut, text_size},
    rect::Rect,
};
use tracing::{info, warn};

use crate::{database::UserRecord, utils::truncate_chars};

pub const WIDTH: u32 = 1200;
pub const HEIGHT: u32 = 630;
pub const FALLBACK_IMAGE: &str = "/og.png";

const AVATAR_SIZE: u32 = 180;
const AVATAR_CENTER: (i32, i32) = (300, 190);
const BIO_PREVIEW: usize = 120;
const BIO_WIDTH: u32 = 380;
const AVATAR_TIMEOUT: Duration = Duration::from_secs(3);
const PLACEHOLDER: [u8; 3] = [0xe7, 0xe5, 0xe4];
const PLACEHOLDER_TEXT: [u8; 3] = [0xa8, 0xa2, 0x9e];

#[derive(Debug, Clone)]
pub struct PreviewCard {
    pub display_name: String,
    pub handle: String,
    pub bio: Option<String>,
    pub theme: ThemeId,
    pub avatar_url: Option<String>,
}

impl PreviewCard {
    pub fn from_user(user: &UserRecord) -> Self {
        let handle = user.username.clone().unwrap_or_default();

        Self {
            display_name: user
                .display_name
                .clone()
                .or_else(|| user.username.clone())
                .unwrap_or_else(|| "User".to_string()),
            bio: user.bio.as_deref().map(|bio| truncate_chars(bio, BIO_PREVIEW)),
            theme: user.theme(),
            avatar_url: user.avatar_url.clone(),
            handle,
        }
    }

    /// Card for `/og.png`, used when a handle has no profile.
    pub fn site() -> Self {
        Self {
            display_name: "cal.date".to_string(),
            handle: String::new(),
            bio: Some("Share one link. Get booked.".to_string()),
            theme: ThemeId::default(),
            avatar_url: None,
        }
    }

    /// First letter of the display name for the avatar placeholder.
    pub fn initial(&self) -> String {
        self.display_name
            .chars()
            .next()
            .map(|c| c.to_uppercase().collect())
            .unwrap_or_else(|| "?".to_string())
    }
}

pub fn load_font(path: &Path) -> Option<FontArc> {
    let bytes = std::fs::read(path)
        .map_err(|e| warn!("No preview font at {}: {e}", path.display()))
        .ok()?;

    let font = FontArc::try_from_vec(bytes)
        .map_err(|e| warn!("Invalid preview font {}: {e}", path.display()))
        .ok()?;

    info!("Loaded preview font {}", path.display());
    Some(font)
}

/// Best effort; a missing avatar falls back to the placeholder.
pub async fn fetch_avatar(client: &reqwest::Client, url: &str) -> Option<DynamicImage> {
    let response = client
        .get(url)
        .timeout(AVATAR_TIMEOUT)
        .send()
        .await
        .and_then(|response| response.error_for_status())
        .map_err(|e| warn!("Failed to fetch avatar {url}: {e}"))
        .ok()?;

    let bytes = response
        .bytes()
        .await
        .map_err(|e| warn!("Failed to read avatar {url}: {e}"))
        .ok()?;

    image::load_from_memory(&bytes)
        .map_err(|e| warn!("Failed to decode avatar {url}: {e}"))
        .ok()
}

fn rgba(color: [u8; 3]) -> Rgba<u8> {
    Rgba([color[0], color[1], color[2], 255])
}

pub fn render(
    card: &PreviewCard,
    avatar: Option<&DynamicImage>,
    font: Option<&FontArc>,
) -> RgbaImage {
    let palette = card.theme.palette();
    let mut canvas = RgbaImage::from_pixel(WIDTH, HEIGHT, rgba(palette.background));

    let half = WIDTH / 2;
    draw_filled_rect_mut(
        &mut canvas,
        Rect::at(half as i32, 0).of_size(half, HEIGHT),
        rgba(palette.surface),
    );
    draw_filled_rect_mut(
        &mut canvas,
        Rect::at(half as i32, 0).of_size(1, HEIGHT),
        rgba(palette.muted),
    );

    match avatar {
        Some(avatar) => paste_circle(&mut canvas, avatar),
        None => {
            draw_filled_circle_mut(
                &mut canvas,
                AVATAR_CENTER,
                (AVATAR_SIZE / 2) as i32,
                rgba(PLACEHOLDER),
            );
            if let Some(font) = font {
                centered(
                    &mut canvas,
                    font,
                    &card.initial(),
                    72.0,
                    AVATAR_CENTER.0,
                    AVATAR_CENTER.1 - 40,
                    PLACEHOLDER_TEXT,
                );
            }
        }
    }

    if let Some(font) = font {
        draw_profile_text(&mut canvas, font, card, &palette);
        draw_booking_panel(&mut canvas, font, card, &palette);
    }

    canvas
}

fn paste_circle(canvas: &mut RgbaImage, avatar: &DynamicImage) {
    let avatar = avatar
        .resize_to_fill(AVATAR_SIZE, AVATAR_SIZE, FilterType::Lanczos3)
        .to_rgba8();

    let radius = (AVATAR_SIZE / 2) as i64;
    let left = AVATAR_CENTER.0 as i64 - radius;
    let top = AVATAR_CENTER.1 as i64 - radius;

    for (x, y, pixel) in avatar.enumerate_pixels() {
        let dx = x as i64 - radius;
        let dy = y as i64 - radius;
        if dx * dx + dy * dy > radius * radius {
            continue;
        }

        let (cx, cy) = (left + x as i64, top + y as i64);
        if cx >= 0 && cy >= 0 && (cx as u32) < canvas.width() && (cy as u32) < canvas.height() {
            canvas.put_pixel(cx as u32, cy as u32, Rgba([pixel[0], pixel[1], pixel[2], 255]));
        }
    }
}

fn centered(
    canvas: &mut RgbaImage,
    font: &FontArc,
    text: &str,
    size: f32,
    center_x: i32,
    y: i32,
    color: [u8; 3],
) {
    let scale = PxScale::from(size);
    let (width, _) = text_size(scale, font, text);
    draw_text_mut(
        canvas,
        rgba(color),
        center_x - (width / 2) as i32,
        y,
        scale,
        font,
        text,
    );
}

fn draw_profile_text(
    canvas: &mut RgbaImage,
    font: &FontArc,
    card: &PreviewCard,
    palette: &Palette,
) {
    let center = AVATAR_CENTER.0;
    let mut y = AVATAR_CENTER.1 + (AVATAR_SIZE / 2) as i32 + 30;

    centered(canvas, font, &card.display_name, 42.0, center, y, palette.text);
    y += 56;

    if !card.handle.is_empty() {
        centered(canvas, font, &format!("@{}", card.handle), 20.0, center, y, palette.muted);
        y += 44;
    }

    let Some(bio) = &card.bio else {
        return;
    };

    centered(canvas, font, "ABOUT", 12.0, center, y, palette.muted);
    draw_filled_rect_mut(canvas, Rect::at(center - 90, y + 7).of_size(40, 1), rgba(palette.muted));
    draw_filled_rect_mut(canvas, Rect::at(center + 50, y + 7).of_size(40, 1), rgba(palette.muted));
    y += 28;

    for line in wrap(font, bio, 16.0, BIO_WIDTH) {
        centered(canvas, font, &line, 16.0, center, y, palette.text);
        y += 26;
    }
}

fn draw_booking_panel(
    canvas: &mut RgbaImage,
    font: &FontArc,
    card: &PreviewCard,
    palette: &Palette,
) {
    let center = (WIDTH * 3 / 4) as i32;

    centered(canvas, font, "Book a date with", 28.0, center, 220, palette.muted);
    centered(canvas, font, &card.display_name, 40.0, center, 265, palette.accent);

    if !card.handle.is_empty() {
        let link = format!("cal.date{}", profile_path(&card.handle));
        centered(canvas, font, &link, 20.0, center, 335, palette.muted);
    }

    draw_filled_rect_mut(
        canvas,
        Rect::at(center - 100, 395).of_size(200, 4),
        rgba(palette.accent),
    );
}

/// Greedy word wrap by measured width.
fn wrap(font: &FontArc, text: &str, size: f32, max_width: u32) -> Vec<String> {
    let scale = PxScale::from(size);
    let mut lines = Vec::new();
    let mut line = String::new();

    for word in text.split_whitespace() {
        let candidate = if line.is_empty() {
            word.to_string()
        } else {
            format!("{line} {word}")
        };

        if !line.is_empty() && text_size(scale, font, &candidate).0 > max_width {
            lines.push(std::mem::replace(&mut line, word.to_string()));
        } else {
            line = candidate;
        }
    }
    if !line.is_empty() {
        lines.push(line);
    }

    lines
}

pub fn encode_png(image: &RgbaImage) -> Result<Vec<u8>, image::ImageError> {
    let mut bytes = Cursor::new(Vec::new());
    image.write_to(&mut bytes, ImageFormat::Png)?;

    Ok(bytes.into_inner())
}
