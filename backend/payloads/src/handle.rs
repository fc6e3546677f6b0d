use once_cell::sync::Lazy;
use regex::Regex;

static HANDLE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z0-9_]{3,20}$").unwrap());
static HANDLE_CHARSET: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z0-9_]+$").unwrap());

pub fn is_valid_handle(raw: &str) -> bool {
    HANDLE.is_match(raw)
}

pub fn has_handle_charset(raw: &str) -> bool {
    HANDLE_CHARSET.is_match(raw)
}

/// Vanity URLs are `/@handle`; the bare `/handle` form works too.
pub fn from_path_segment(segment: &str) -> &str {
    segment.strip_prefix('@').unwrap_or(segment)
}

/// Public profile path for a handle.
pub fn profile_path(handle: &str) -> String {
    format!("/@{handle}")
}
