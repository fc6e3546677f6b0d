use std::{
    env,
    fmt::Display,
    fs::read_to_string,
    path::{Path, PathBuf},
    str::FromStr,
};

use thiserror::Error;
use tracing::{info, warn};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid {key} value: {reason}")]
    Invalid { key: &'static str, reason: String },

    #[error("Secret {0} not found")]
    MissingSecret(&'static str),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Redis,
    Memory,
}

impl FromStr for StoreBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "redis" => Ok(StoreBackend::Redis),
            "memory" => Ok(StoreBackend::Memory),
            other => Err(format!("expected redis or memory, got {other}")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub site_url: String,
    pub store_backend: StoreBackend,
    pub redis_url: String,
    pub blob_bucket: String,
    pub blob_public_url: String,
    pub max_upload_bytes: usize,
    pub og_font_path: PathBuf,
    pub clerk_api_url: String,
    pub clerk_secret_key: Option<String>,
    pub clerk_jwt_key: String,
    pub clerk_webhook_secret: Option<String>,
}

impl Config {
    pub fn load() -> Result<Self, ConfigError> {
        let secrets_dir: PathBuf = try_load("SECRETS_DIR", "/run/secrets")?;

        Ok(Self {
            port: try_load("RUST_PORT", "1111")?,
            site_url: try_load("SITE_URL", "https://cal.date")?,
            store_backend: try_load("STORE_BACKEND", "redis")?,
            redis_url: try_load("REDIS_URL", "redis://127.0.0.1:6379")?,
            blob_bucket: try_load("BLOB_BUCKET", "caldate-media")?,
            blob_public_url: try_load(
                "BLOB_PUBLIC_URL",
                "https://caldate-media.s3.amazonaws.com",
            )?,
            max_upload_bytes: try_load("MAX_UPLOAD_BYTES", "5242880")?,
            og_font_path: try_load(
                "OG_FONT_PATH",
                "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
            )?,
            clerk_api_url: try_load("CLERK_API_URL", "https://api.clerk.com/v1")?,
            clerk_secret_key: read_secret(&secrets_dir, "CLERK_SECRET_KEY"),
            clerk_jwt_key: read_secret(&secrets_dir, "CLERK_JWT_KEY")
                .ok_or(ConfigError::MissingSecret("CLERK_JWT_KEY"))?,
            clerk_webhook_secret: read_secret(&secrets_dir, "CLERK_WEBHOOK_SECRET"),
        })
    }
}

fn var(key: &str) -> Result<String, ()> {
    env::var(key).map_err(|_| {
        warn!("Environment variable {key} not found, using default");
    })
}

fn try_load<T: FromStr>(key: &'static str, default: &str) -> Result<T, ConfigError>
where
    T::Err: Display,
{
    parse_value(
        key,
        var(key).unwrap_or_else(|_| {
            info!("{key} not set, using default: {default}");
            default.to_string()
        }),
    )
}

fn parse_value<T: FromStr>(key: &'static str, raw: String) -> Result<T, ConfigError>
where
    T::Err: Display,
{
    raw.parse().map_err(|e: T::Err| {
        warn!("Invalid {key} value: {e}");
        ConfigError::Invalid {
            key,
            reason: e.to_string(),
        }
    })
}

/// Docker secrets first, then the environment.
fn read_secret(secrets_dir: &Path, secret_name: &str) -> Option<String> {
    let path = secrets_dir.join(secret_name);

    match read_to_string(&path) {
        Ok(secret) => Some(secret.trim().to_string()),
        Err(e) => {
            warn!("Failed to read {secret_name} from file: {e}");
            env::var(secret_name)
                .ok()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
        }
    }
}
