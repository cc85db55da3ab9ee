use std::env;
use std::path::PathBuf;

use anyhow::{Context, Result};

pub const DEFAULT_SECRET_KEY: &str = "dev-dandelion-key";
const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:3000";
const DEFAULT_MAX_UPLOAD_BYTES: usize = 50 * 1024 * 1024;
const DEFAULT_TOKEN_TTL_HOURS: i64 = 24;

/// Runtime settings, resolved once at startup and handed to every component
/// that needs them.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: String,
    pub database_path: PathBuf,
    pub upload_root: PathBuf,
    pub secret_key: String,
    pub allow_global_downloads: bool,
    pub max_upload_bytes: usize,
    pub token_ttl_hours: i64,
}

impl Config {
    /// Settings rooted at `data_dir`, with every other value at its default.
    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        let data_dir = data_dir.into();
        Self {
            bind_address: DEFAULT_BIND_ADDRESS.to_string(),
            database_path: data_dir.join("warehouse.db"),
            upload_root: data_dir.join("uploads"),
            secret_key: DEFAULT_SECRET_KEY.to_string(),
            allow_global_downloads: true,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            token_ttl_hours: DEFAULT_TOKEN_TTL_HOURS,
        }
    }

    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        let mut config = Self::with_data_dir(resolve_data_dir());

        if let Some(value) = non_empty_var("BIND_ADDRESS") {
            config.bind_address = value;
        }
        if let Some(value) = non_empty_var("DATABASE_PATH") {
            config.database_path = PathBuf::from(value);
        }
        if let Some(value) = non_empty_var("UPLOAD_ROOT") {
            config.upload_root = PathBuf::from(value);
        }
        if let Some(value) = non_empty_var("SECRET_KEY") {
            config.secret_key = value;
        }
        if let Some(value) = non_empty_var("ALLOW_GLOBAL_DOWNLOADS") {
            config.allow_global_downloads = parse_flag(&value)
                .with_context(|| format!("invalid ALLOW_GLOBAL_DOWNLOADS: {value}"))?;
        }
        if let Some(value) = non_empty_var("MAX_UPLOAD_BYTES") {
            config.max_upload_bytes = value
                .parse()
                .with_context(|| format!("invalid MAX_UPLOAD_BYTES: {value}"))?;
        }
        if let Some(value) = non_empty_var("TOKEN_TTL_HOURS") {
            config.token_ttl_hours = value
                .parse()
                .with_context(|| format!("invalid TOKEN_TTL_HOURS: {value}"))?;
        }
        Ok(config)
    }

    pub fn uses_default_secret(&self) -> bool {
        self.secret_key == DEFAULT_SECRET_KEY
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn resolve_data_dir() -> PathBuf {
    if let Some(dir) = non_empty_var("DATA_DIR") {
        return PathBuf::from(dir);
    }
    let mut base = dirs::data_dir().unwrap_or_else(|| PathBuf::from("."));
    base.push("image-warehouse");
    base
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
