use std::sync::Arc;

use axum::{
    Json, Router,
    body::Body,
    extract::{DefaultBodyLimit, FromRequestParts, Multipart, Path, State},
    http::{HeaderValue, StatusCode, header, request::Parts},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_util::io::ReaderStream;
use tower_http::trace::TraceLayer;

use crate::access::{AccessPolicy, Decision};
use crate::auth::{self, TokenKeys};
use crate::config::Config;
use crate::db::Db;
use crate::error::ApiError;
use crate::ingest::{IncomingFile, IngestPipeline};
use crate::models::{MetadataMap, PublicUser, Upload};
use crate::storage::UploadStorage;

#[derive(Clone)]
pub struct AppState {
    pub db: Db,
    pub pipeline: IngestPipeline,
    pub policy: AccessPolicy,
    pub keys: Arc<TokenKeys>,
}

impl AppState {
    pub fn new(config: &Config, db: Db) -> Self {
        let storage = UploadStorage::new(config.upload_root.clone());
        Self {
            pipeline: IngestPipeline::new(storage, db.clone()),
            db,
            policy: AccessPolicy::new(config.allow_global_downloads),
            keys: Arc::new(TokenKeys::new(&config.secret_key, config.token_ttl_hours)),
        }
    }
}

pub fn router(state: AppState, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/me", get(me))
        .route(
            "/upload",
            post(upload).layer(DefaultBodyLimit::max(max_upload_bytes)),
        )
        .route("/files", get(list_files))
        .route("/download/{id}", get(download))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Caller identity from an `Authorization: Bearer` header, if any.
pub struct Identity(pub Option<i64>);

impl FromRequestParts<AppState> for Identity {
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let user_id = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .and_then(|token| state.keys.verify(token.trim()).ok());
        Ok(Identity(user_id))
    }
}

/// Like [`Identity`], but rejects anonymous callers.
pub struct AuthUser {
    pub user_id: i64,
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let Ok(Identity(user_id)) = Identity::from_request_parts(parts, state).await;
        user_id
            .map(|user_id| AuthUser { user_id })
            .ok_or(ApiError::Unauthorized)
    }
}

#[derive(Deserialize)]
pub struct RegisterRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub full_name: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Serialize)]
struct RegisterResponse {
    id: i64,
}

#[derive(Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Serialize)]
struct LoginResponse {
    token: String,
    user: PublicUser,
}

#[derive(Serialize)]
pub struct UploadView {
    pub id: i64,
    pub title: String,
    pub notes: String,
    pub original_name: String,
    pub stored_name: String,
    pub mime_type: String,
    pub size_bytes: i64,
    pub md5: String,
    pub exif: MetadataMap,
    pub created_at: DateTime<Utc>,
}

impl From<Upload> for UploadView {
    fn from(upload: Upload) -> Self {
        let exif = upload.metadata().unwrap_or_else(|err| {
            tracing::warn!(upload_id = upload.id, error = %err, "stored metadata is not valid json");
            MetadataMap::new()
        });
        Self {
            id: upload.id,
            title: upload.title,
            notes: upload.notes,
            original_name: upload.original_name,
            stored_name: upload.stored_name,
            mime_type: upload.mime_type,
            size_bytes: upload.size_bytes,
            md5: upload.md5,
            exif,
            created_at: upload.created_at,
        }
    }
}

async fn health() -> &'static str {
    "ok"
}

async fn register(
    State(state): State<AppState>,
    Json(request): Json<RegisterRequest>,
) -> Result<Response, ApiError> {
    let id = auth::register(&state.db, &request.email, &request.full_name, &request.password).await?;
    Ok((StatusCode::CREATED, Json(RegisterResponse { id })).into_response())
}

async fn login(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, ApiError> {
    let user = auth::login(&state.db, &request.email, &request.password).await?;
    let token = state.keys.issue(user.id)?;
    Ok(Json(LoginResponse {
        token,
        user: user.into(),
    }))
}

async fn me(State(state): State<AppState>, user: AuthUser) -> Result<Json<PublicUser>, ApiError> {
    let user = state
        .db
        .find_user_by_id(user.user_id)
        .await?
        .ok_or(ApiError::Unauthorized)?;
    Ok(Json(user.into()))
}

async fn upload(
    State(state): State<AppState>,
    user: AuthUser,
    mut multipart: Multipart,
) -> Result<Response, ApiError> {
    let mut file = None;
    let mut title = String::new();
    let mut notes = String::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| ApiError::BadRequest(format!("invalid form: {err}")))?
    {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("file") => {
                let file_name = field.file_name().unwrap_or_default().to_string();
                let data = field
                    .bytes()
                    .await
                    .map_err(|err| ApiError::BadRequest(format!("failed to read file: {err}")))?;
                file = Some(IncomingFile::new(file_name, data));
            }
            Some("title") => title = read_text(field).await?,
            Some("notes") => notes = read_text(field).await?,
            _ => {}
        }
    }

    let upload = state.pipeline.ingest(user.user_id, file, &title, &notes).await?;
    Ok((StatusCode::CREATED, Json(UploadView::from(upload))).into_response())
}

async fn read_text(field: axum::extract::multipart::Field<'_>) -> Result<String, ApiError> {
    field
        .text()
        .await
        .map_err(|err| ApiError::BadRequest(format!("failed to read form field: {err}")))
}

async fn list_files(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<Vec<UploadView>>, ApiError> {
    let uploads = state.db.list_uploads_for_user(user.user_id).await?;
    Ok(Json(uploads.into_iter().map(UploadView::from).collect()))
}

async fn download(
    State(state): State<AppState>,
    Identity(requester): Identity,
    Path(id): Path<i64>,
) -> Result<Response, ApiError> {
    if requester.is_none() {
        return Err(ApiError::Unauthorized);
    }
    let upload = state.db.find_upload_by_id(id).await?.ok_or(ApiError::NotFound)?;
    if let Decision::Deny(reason) = state.policy.authorize_download(requester, &upload) {
        tracing::warn!(upload_id = upload.id, ?requester, ?reason, "download denied");
        return Err(reason.into());
    }

    let path = state.pipeline.storage().resolve(upload.user_id, &upload.stored_name);
    let file = match tokio::fs::File::open(&path).await {
        Ok(file) => file,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Err(ApiError::NotFound),
        Err(err) => {
            tracing::error!(path = %path.display(), error = %err, "failed to open stored file");
            return Err(ApiError::Internal);
        }
    };

    let content_type = HeaderValue::from_str(&upload.mime_type)
        .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream"));
    let disposition = HeaderValue::from_str(&attachment_disposition(&upload.original_name))
        .unwrap_or_else(|_| HeaderValue::from_static("attachment"));

    Ok((
        [
            (header::CONTENT_TYPE, content_type),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        Body::from_stream(ReaderStream::new(file)),
    )
        .into_response())
}

/// `attachment; filename="..."` with anything that cannot sit in a quoted
/// ASCII header value replaced by `_`.
fn attachment_disposition(original_name: &str) -> String {
    let base = original_name.rsplit(['/', '\\']).next().unwrap_or(original_name);
    let safe: String = base
        .chars()
        .map(|c| {
            if (c.is_ascii_graphic() && c != '"' && c != '\\') || c == ' ' {
                c
            } else {
                '_'
            }
        })
        .collect();
    let safe = if safe.trim().is_empty() { "download".to_string() } else { safe };
    format!("attachment; filename=\"{safe}\"")
}
