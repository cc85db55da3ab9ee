use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, Utc};
use sqlx::SqliteExecutor;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous};
use thiserror::Error;

use crate::models::{Upload, User};

#[derive(Debug, Error)]
pub enum DbError {
    #[error("email is already registered")]
    DuplicateEmail,
    #[error("integrity violation: {0}")]
    Integrity(String),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

impl DbError {
    fn classify(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            if db_err.is_unique_violation()
                || db_err.is_foreign_key_violation()
                || db_err.is_check_violation()
            {
                return DbError::Integrity(db_err.message().to_string());
            }
        }
        DbError::Sqlx(err)
    }
}

/// Row values for a new upload; the id is assigned on insert.
#[derive(Clone, Debug)]
pub struct NewUploadRecord {
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

impl NewUploadRecord {
    pub fn into_upload(self, id: i64) -> Upload {
        Upload {
            id,
            user_id: self.user_id,
            title: self.title,
            notes: self.notes,
            original_name: self.original_name,
            stored_name: self.stored_name,
            mime_type: self.mime_type,
            size_bytes: self.size_bytes,
            md5: self.md5,
            exif_json: self.exif_json,
            created_at: self.created_at,
        }
    }
}

const USER_COLUMNS: &str = "id, email, full_name, password_hash, created_at";
const UPLOAD_COLUMNS: &str = "id, user_id, title, notes, original_name, stored_name, mime_type, \
                              size_bytes, md5, exif_json, created_at";

#[derive(Clone, Debug)]
pub struct Db(pub SqlitePool);

impl Db {
    pub async fn connect_and_migrate(path: &Path) -> anyhow::Result<Self> {
        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let opts = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal);

        let pool = SqlitePoolOptions::new()
            .max_connections(8)
            .acquire_timeout(Duration::from_secs(10))
            .connect_with(opts)
            .await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Db(pool))
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.0
    }

    pub async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, DbError> {
        let user = sqlx::query_as::<_, User>(&format!("SELECT {USER_COLUMNS} FROM users WHERE email = ?"))
            .bind(email)
            .fetch_optional(&self.0)
            .await?;
        Ok(user)
    }

    pub async fn find_user_by_id(&self, id: i64) -> Result<Option<User>, DbError> {
        let user = sqlx::query_as::<_, User>(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?"))
            .bind(id)
            .fetch_optional(&self.0)
            .await?;
        Ok(user)
    }

    /// Returns the new user's id, or `DuplicateEmail` when the address is
    /// taken.
    pub async fn insert_user(&self, email: &str, full_name: &str, password_hash: &str) -> Result<i64, DbError> {
        let result = sqlx::query(
            "INSERT INTO users (email, full_name, password_hash, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(email)
        .bind(full_name)
        .bind(password_hash)
        .bind(Utc::now())
        .execute(&self.0)
        .await
        .map_err(|err| match DbError::classify(err) {
            DbError::Integrity(_) => DbError::DuplicateEmail,
            other => other,
        })?;
        Ok(result.last_insert_rowid())
    }

    pub async fn list_uploads_for_user(&self, owner_id: i64) -> Result<Vec<Upload>, DbError> {
        let uploads = sqlx::query_as::<_, Upload>(&format!(
            "SELECT {UPLOAD_COLUMNS} FROM uploads WHERE user_id = ? ORDER BY id DESC"
        ))
        .bind(owner_id)
        .fetch_all(&self.0)
        .await?;
        Ok(uploads)
    }

    pub async fn find_upload_by_id(&self, id: i64) -> Result<Option<Upload>, DbError> {
        let upload = sqlx::query_as::<_, Upload>(&format!("SELECT {UPLOAD_COLUMNS} FROM uploads WHERE id = ?"))
            .bind(id)
            .fetch_optional(&self.0)
            .await?;
        Ok(upload)
    }
}

/// Inserts one upload row through `executor`, which may be the pool or an
/// open transaction.
pub async fn insert_upload<'e, E>(executor: E, record: &NewUploadRecord) -> Result<i64, DbError>
where
    E: SqliteExecutor<'e>,
{
    let result = sqlx::query(
        "INSERT INTO uploads (user_id, title, notes, original_name, stored_name, mime_type, \
         size_bytes, md5, exif_json, created_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(record.user_id)
    .bind(&record.title)
    .bind(&record.notes)
    .bind(&record.original_name)
    .bind(&record.stored_name)
    .bind(&record.mime_type)
    .bind(record.size_bytes)
    .bind(&record.md5)
    .bind(&record.exif_json)
    .bind(record.created_at)
    .execute(executor)
    .await
    .map_err(DbError::classify)?;
    Ok(result.last_insert_rowid())
}
