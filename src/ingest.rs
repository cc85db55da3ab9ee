use std::path::PathBuf;
use std::sync::Arc;

use bytes::Bytes;
use chrono::{SubsecRound, Utc};
use thiserror::Error;

use crate::db::{self, Db, DbError, NewUploadRecord};
use crate::fingerprint::{self, Fingerprint};
use crate::metadata::MetadataExtractor;
use crate::models::{MetadataMap, Upload, encode_metadata};
use crate::storage::UploadStorage;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("no file selected")]
    NoFile,
    #[error("failed to store file: {0}")]
    WriteFailed(#[from] std::io::Error),
    #[error("failed to record upload: {0}")]
    RecordFailed(#[from] DbError),
}

/// A file as received from the client.
#[derive(Clone, Debug)]
pub struct IncomingFile {
    pub file_name: String,
    pub data: Bytes,
}

impl IncomingFile {
    pub fn new(file_name: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self {
            file_name: file_name.into(),
            data: data.into(),
        }
    }
}

#[derive(Clone)]
pub struct IngestPipeline {
    storage: UploadStorage,
    db: Db,
    extractor: Arc<MetadataExtractor>,
}

impl IngestPipeline {
    pub fn new(storage: UploadStorage, db: Db) -> Self {
        Self::with_extractor(storage, db, MetadataExtractor::default())
    }

    pub fn with_extractor(storage: UploadStorage, db: Db, extractor: MetadataExtractor) -> Self {
        Self {
            storage,
            db,
            extractor: Arc::new(extractor),
        }
    }

    pub fn storage(&self) -> &UploadStorage {
        &self.storage
    }

    /// Stores `file` for `owner_id` and records it. The file is written
    /// before the row, so a failed insert leaves the file behind.
    pub async fn ingest(
        &self,
        owner_id: i64,
        file: Option<IncomingFile>,
        title: &str,
        notes: &str,
    ) -> Result<Upload, IngestError> {
        let file = file
            .filter(|file| !file.file_name.is_empty())
            .ok_or(IngestError::NoFile)?;

        let location = self.storage.name_for(&file.file_name, owner_id).await?;
        tokio::fs::write(&location.path, &file.data).await?;

        let (fingerprint, metadata) = self.inspect(location.path.clone(), &file).await;

        let record = NewUploadRecord {
            user_id: owner_id,
            title: title.trim().to_string(),
            notes: notes.trim().to_string(),
            original_name: file.file_name,
            stored_name: location.stored_name,
            mime_type: fingerprint.mime_type,
            size_bytes: fingerprint.size_bytes as i64,
            md5: fingerprint.content_hash,
            exif_json: encode_metadata(&metadata),
            created_at: Utc::now().trunc_subsecs(0),
        };

        let id = match self.insert(&record).await {
            Ok(id) => id,
            Err(err) => {
                tracing::warn!(
                    owner_id,
                    path = %location.path.display(),
                    error = %err,
                    "upload record failed, stored file left in place"
                );
                return Err(IngestError::RecordFailed(err));
            }
        };

        tracing::info!(
            upload_id = id,
            owner_id,
            stored_name = %record.stored_name,
            size_bytes = record.size_bytes,
            tags = metadata.len(),
            "ingested upload"
        );
        Ok(record.into_upload(id))
    }

    async fn inspect(&self, path: PathBuf, file: &IncomingFile) -> (Fingerprint, MetadataMap) {
        let extractor = self.extractor.clone();
        let result = tokio::task::spawn_blocking(move || {
            let fingerprint = fingerprint::fingerprint(&path);
            let metadata = extractor.extract(&path);
            (fingerprint, metadata)
        })
        .await;

        result.unwrap_or_else(|err| {
            tracing::error!(error = %err, "file inspection task failed");
            (Fingerprint::from_bytes(&file.file_name, &file.data), MetadataMap::new())
        })
    }

    async fn insert(&self, record: &NewUploadRecord) -> Result<i64, DbError> {
        let mut tx = self.db.pool().begin().await?;
        let id = db::insert_upload(&mut *tx, record).await?;
        tx.commit().await?;
        Ok(id)
    }
}
