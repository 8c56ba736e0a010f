//! Content-addressed storage for uploaded photos and videos.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use utoipa::ToSchema;

use crate::config::MediaConfig;
use crate::error::ApiError;

pub const MAX_MEDIA_BYTES: usize = 10 * 1024 * 1024;

const ALLOWED_MIME: &[&str] = &["image/png", "image/jpeg", "image/gif", "image/webp", "video/mp4", "video/webm"];

#[derive(Debug, Error)]
pub enum MediaStoreError {
    #[error("duplicate")]
    Duplicate,
    #[error("not_found")]
    NotFound,
    #[error("other: {0}")]
    Other(String),
}

#[async_trait]
pub trait MediaStore: Send + Sync {
    async fn save(&self, hash: &str, mime: &str, bytes: &[u8]) -> Result<(), MediaStoreError>;
    async fn load(&self, hash: &str) -> Result<(Vec<u8>, String), MediaStoreError>;
}

/// Lowercase hex SHA-256 of `bytes`.
pub fn content_hash(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

/// Accepted content type, sniffed from the bytes themselves.
pub fn sniff(bytes: &[u8]) -> Option<&'static str> {
    let mime = infer::get(bytes)?.mime_type();
    ALLOWED_MIME.iter().copied().find(|m| *m == mime)
}

fn is_hash(s: &str) -> bool {
    s.len() == 64 && s.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
}

fn sniff_or_octet(bytes: &[u8]) -> String {
    infer::get(bytes)
        .map(|t| t.mime_type().to_string())
        .unwrap_or_else(|| "application/octet-stream".into())
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UploadedMedia {
    pub hash: String,
    /// Reference to put in a post's `media_url`.
    pub url: String,
    pub mime: String,
    pub size: usize,
    pub duplicate: bool,
}

/// Validate and store one upload. Re-uploading identical bytes is not an
/// error; it reports `duplicate` and reuses the stored object.
pub async fn ingest(store: &dyn MediaStore, bytes: &[u8]) -> Result<UploadedMedia, ApiError> {
    if bytes.is_empty() {
        return Err(ApiError::validation("file is empty"));
    }
    if bytes.len() > MAX_MEDIA_BYTES {
        return Err(ApiError::validation("file exceeds 10 MiB"));
    }
    let mime = sniff(bytes).ok_or_else(|| ApiError::validation("unsupported media type"))?;
    let hash = content_hash(bytes);
    let duplicate = match store.save(&hash, mime, bytes).await {
        Ok(()) => false,
        Err(MediaStoreError::Duplicate) => true,
        Err(e) => {
            error!("media save failed hash={hash}: {e}");
            return Err(ApiError::Internal);
        }
    };
    metrics::counter!("eco_media_uploads_total", "duplicate" => if duplicate { "true" } else { "false" }).increment(1);
    Ok(UploadedMedia {
        url: format!("/media/{hash}"),
        hash,
        mime: mime.to_string(),
        size: bytes.len(),
        duplicate,
    })
}

// ---------------- Filesystem ----------------

pub struct FsMediaStore {
    root: PathBuf,
}

impl FsMediaStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, hash: &str) -> Result<PathBuf, MediaStoreError> {
        if !is_hash(hash) {
            return Err(MediaStoreError::NotFound);
        }
        Ok(self.root.join(&hash[0..2]).join(hash))
    }
}

#[async_trait]
impl MediaStore for FsMediaStore {
    async fn save(&self, hash: &str, _mime: &str, bytes: &[u8]) -> Result<(), MediaStoreError> {
        let path = self.path_for(hash)?;
        if tokio::fs::try_exists(&path).await.unwrap_or(false) {
            return Err(MediaStoreError::Duplicate);
        }
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| MediaStoreError::Other(e.to_string()))?;
        }
        // write then rename so readers never observe a partial file
        let tmp = path.with_extension("part");
        tokio::fs::write(&tmp, bytes)
            .await
            .map_err(|e| MediaStoreError::Other(e.to_string()))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| MediaStoreError::Other(e.to_string()))
    }

    async fn load(&self, hash: &str) -> Result<(Vec<u8>, String), MediaStoreError> {
        let path = self.path_for(hash)?;
        let bytes = tokio::fs::read(&path).await.map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => MediaStoreError::NotFound,
            _ => MediaStoreError::Other(e.to_string()),
        })?;
        let mime = sniff_or_octet(&bytes);
        Ok((bytes, mime))
    }
}

// ---------------- S3 / MinIO ----------------

pub struct S3MediaStore {
    bucket: String,
    client: aws_sdk_s3::Client,
    prefix: String,
}

impl S3MediaStore {
    pub async fn new(
        endpoint: &str,
        bucket: &str,
        region: &str,
        access_key: Option<&str>,
        secret_key: Option<&str>,
    ) -> anyhow::Result<Self> {
        use aws_credential_types::provider::SharedCredentialsProvider;
        use aws_credential_types::Credentials;

        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(aws_sdk_s3::config::Region::new(region.to_string()))
            .endpoint_url(endpoint);
        if let (Some(access), Some(secret)) = (access_key, secret_key) {
            let creds = Credentials::new(access, secret, None, None, "static");
            loader = loader.credentials_provider(SharedCredentialsProvider::new(creds));
        }
        let conf = loader.load().await;
        // MinIO without wildcard DNS needs path-style addressing
        let s3_conf = aws_sdk_s3::config::Builder::from(&conf).force_path_style(true).build();
        let client = aws_sdk_s3::Client::from_conf(s3_conf);
        info!("initialized S3 media client endpoint={endpoint} bucket={bucket}");

        if let Err(e) = client.head_bucket().bucket(bucket).send().await {
            warn!("head_bucket failed for '{bucket}' (will attempt create): {e:?}");
            let mut attempt = 0u32;
            let max_attempts = 8;
            loop {
                attempt += 1;
                match client.create_bucket().bucket(bucket).send().await {
                    Ok(_) => {
                        info!("created bucket '{bucket}' (attempt {attempt})");
                        break;
                    }
                    Err(e2) if attempt >= max_attempts => {
                        error!("create_bucket failed for '{bucket}' after {attempt} attempts: {e2:?}");
                        return Err(anyhow::anyhow!("failed to ensure bucket '{bucket}': {e2}"));
                    }
                    Err(e2) => {
                        let backoff_ms = 200 * attempt.pow(2);
                        warn!("create_bucket attempt {attempt} failed for '{bucket}': {e2:?} (retrying in {backoff_ms}ms)");
                        tokio::time::sleep(std::time::Duration::from_millis(backoff_ms as u64)).await;
                    }
                }
            }
        }

        Ok(Self { bucket: bucket.to_string(), client, prefix: "media".into() })
    }

    fn key_for(&self, hash: &str) -> Result<String, MediaStoreError> {
        if !is_hash(hash) {
            return Err(MediaStoreError::NotFound);
        }
        Ok(format!("{}/{}/{}", self.prefix, &hash[0..2], hash))
    }
}

#[async_trait]
impl MediaStore for S3MediaStore {
    async fn save(&self, hash: &str, mime: &str, bytes: &[u8]) -> Result<(), MediaStoreError> {
        use aws_sdk_s3::primitives::ByteStream;
        let key = self.key_for(hash)?;
        if self.client.head_object().bucket(&self.bucket).key(&key).send().await.is_ok() {
            return Err(MediaStoreError::Duplicate);
        }
        let put = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .body(ByteStream::from(bytes.to_vec()))
            .content_type(mime);
        if let Err(e) = put.send().await {
            error!("put_object failed hash={hash} key={key} bucket={} err={:?}", self.bucket, e);
            return Err(MediaStoreError::Other(e.to_string()));
        }
        Ok(())
    }

    async fn load(&self, hash: &str) -> Result<(Vec<u8>, String), MediaStoreError> {
        let key = self.key_for(hash)?;
        let obj = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(&key)
            .send()
            .await
            .map_err(|_| MediaStoreError::NotFound)?;
        let data = obj.body.collect().await.map_err(|e| MediaStoreError::Other(e.to_string()))?;
        let bytes = Vec::from(data.into_bytes().as_ref());
        let mime = sniff_or_octet(&bytes);
        Ok((bytes, mime))
    }
}

pub async fn build_media_store(cfg: &MediaConfig) -> anyhow::Result<Arc<dyn MediaStore>> {
    match cfg {
        MediaConfig::Fs { dir } => {
            tokio::fs::create_dir_all(dir).await?;
            info!("media stored on disk under {}", dir.display());
            Ok(Arc::new(FsMediaStore::new(dir.clone())))
        }
        MediaConfig::S3 { endpoint, bucket, region, access_key, secret_key } => Ok(Arc::new(
            S3MediaStore::new(endpoint, bucket, region, access_key.as_deref(), secret_key.as_deref()).await?,
        )),
    }
}
