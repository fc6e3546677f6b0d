use chrono::Utc;
use once_cell::sync::Lazy;
use regex::Regex;
use uuid::Uuid;

const MAX_FILE_NAME: usize = 100;
const FALLBACK_FILE_NAME: &str = "upload";

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());
static UNSAFE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^A-Za-z0-9._-]").unwrap());
static DASHES: Lazy<Regex> = Lazy::new(|| Regex::new(r"-+").unwrap());

/// Makes an uploaded file name safe to embed in an object key.
pub fn sanitize_file_name(input: &str) -> String {
    // Browsers may send a full path.
    let base = input.rsplit(['/', '\\']).next().unwrap_or(input);

    let s = WHITESPACE.replace_all(base.trim(), "-");
    let s = UNSAFE.replace_all(&s, "");
    let s = DASHES.replace_all(&s, "-");
    let s: String = s
        .trim_matches(|c| c == '-' || c == '.')
        .chars()
        .take(MAX_FILE_NAME)
        .collect();

    if s.is_empty() {
        FALLBACK_FILE_NAME.to_string()
    } else {
        s
    }
}

/// `{millis}-{8 hex}`, unique per upload so a blob URL is never reused.
pub fn upload_tag() -> String {
    let id = Uuid::new_v4().simple().to_string();
    format!("{}-{}", Utc::now().timestamp_millis(), &id[..8])
}

/// Cuts to `max` characters, appending `...` when anything was dropped.
pub fn truncate_chars(input: &str, max: usize) -> String {
    match input.char_indices().nth(max) {
        Some((byte_index, _)) => format!("{}...", &input[..byte_index]),
        None => input.to_string(),
    }
}
