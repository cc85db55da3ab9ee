use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Tag name to rendered value, as extracted from an image.
pub type MetadataMap = BTreeMap<String, String>;

#[derive(Clone, Debug, sqlx::FromRow)]
pub struct User {
    pub id: i64,
    pub email: String,
    pub full_name: String,
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Serialize)]
pub struct PublicUser {
    pub id: i64,
    pub email: String,
    pub full_name: String,
    pub created_at: DateTime<Utc>,
}

impl From<User> for PublicUser {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            email: user.email,
            full_name: user.full_name,
            created_at: user.created_at,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, sqlx::FromRow)]
pub struct Upload {
    pub id: i64,
    pub user_id: i64,
    pub title: String,
    pub notes: String,
    pub original_name: String,
    pub stored_name: String,
    pub mime_type: String,
    pub size_bytes: i64,
    pub md5: String,
    pub exif_json: String,
    pub created_at: DateTime<Utc>,
}

impl Upload {
    /// Decodes the stored EXIF mapping. Rows written before extraction
    /// existed may hold an empty column, which reads as no metadata.
    pub fn metadata(&self) -> serde_json::Result<MetadataMap> {
        if self.exif_json.trim().is_empty() {
            return Ok(MetadataMap::new());
        }
        serde_json::from_str(&self.exif_json)
    }
}

/// Serializes a metadata mapping for the `exif_json` column. The empty
/// mapping is written as `{}`.
pub fn encode_metadata(metadata: &MetadataMap) -> String {
    serde_json::to_string(metadata).unwrap_or_else(|_| "{}".to_string())
}
