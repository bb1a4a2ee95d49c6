use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

use catalogbot_core::config::{MediaBackend, MediaConfig};

use crate::client::{CloudApiError, MediaSource};

#[derive(Debug, Error)]
pub enum MediaError {
    #[error(transparent)]
    Source(#[from] CloudApiError),
    #[error("media store is not configured: {0}")]
    Configuration(String),
    #[error("media file write failed for `{path}`: {source}")]
    Write { path: PathBuf, source: std::io::Error },
    #[error("media upload failed: {0}")]
    Upload(#[from] reqwest::Error),
    #[error("media upload returned HTTP {status}: {body}")]
    UploadStatus { status: u16, body: String },
    #[error("media is empty")]
    Empty,
    #[error("media relay did not finish within {0:?}")]
    TimedOut(Duration),
}

/// Durable home for relayed images. `put` returns the public URL.
#[async_trait]
pub trait MediaStore: Send + Sync {
    fn backend(&self) -> &'static str;
    async fn put(&self, key: &str, bytes: &[u8], content_type: &str) -> Result<String, MediaError>;
}

pub fn extension_for(content_type: Option<&str>) -> &'static str {
    let essence = content_type
        .and_then(|value| value.split(';').next())
        .map(|value| value.trim().to_ascii_lowercase())
        .unwrap_or_default();
    match essence.as_str() {
        "image/png" => "png",
        "image/webp" => "webp",
        "image/gif" => "gif",
        _ => "jpg",
    }
}

fn content_type_for(extension: &str) -> &'static str {
    match extension {
        "png" => "image/png",
        "webp" => "image/webp",
        "gif" => "image/gif",
        _ => "image/jpeg",
    }
}

/// `products/<yyyymmdd>/<blake3-prefix>-<uuid>.<ext>`
pub fn media_key(bytes: &[u8], extension: &str, now: DateTime<Utc>) -> String {
    let digest = blake3::hash(bytes).to_hex();
    format!(
        "products/{}/{}-{}.{extension}",
        now.format("%Y%m%d"),
        &digest.as_str()[..16],
        Uuid::new_v4().simple()
    )
}

pub struct LocalMediaStore {
    root: PathBuf,
    public_base_url: String,
}

impl LocalMediaStore {
    pub fn new(root: impl Into<PathBuf>, public_base_url: &str) -> Self {
        Self { root: root.into(), public_base_url: public_base_url.trim_end_matches('/').to_string() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[async_trait]
impl MediaStore for LocalMediaStore {
    fn backend(&self) -> &'static str {
        "local"
    }

    async fn put(&self, key: &str, bytes: &[u8], _content_type: &str) -> Result<String, MediaError> {
        let relative = Path::new(key);
        if relative.components().any(|component| !matches!(component, Component::Normal(_))) {
            return Err(MediaError::Configuration(format!("media key `{key}` is not a relative path")));
        }

        let path = self.root.join(relative);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| MediaError::Write { path: parent.to_path_buf(), source })?;
        }
        tokio::fs::write(&path, bytes).await.map_err(|source| MediaError::Write { path, source })?;

        Ok(format!("{}/{key}", self.public_base_url))
    }
}

/// Supabase-style object storage over plain HTTP.
pub struct ObjectStorageMediaStore {
    client: Client,
    base_url: String,
    service_key: SecretString,
    bucket: String,
}

impl ObjectStorageMediaStore {
    pub fn new(base_url: &str, service_key: SecretString, bucket: &str, timeout: Duration) -> Result<Self, MediaError> {
        Ok(Self {
            client: Client::builder().timeout(timeout).build()?,
            base_url: base_url.trim_end_matches('/').to_string(),
            service_key,
            bucket: bucket.to_string(),
        })
    }

    pub fn public_url(&self, key: &str) -> String {
        format!("{}/storage/v1/object/public/{}/{key}", self.base_url, self.bucket)
    }
}

#[async_trait]
impl MediaStore for ObjectStorageMediaStore {
    fn backend(&self) -> &'static str {
        "object_storage"
    }

    async fn put(&self, key: &str, bytes: &[u8], content_type: &str) -> Result<String, MediaError> {
        let url = format!("{}/storage/v1/object/{}/{key}", self.base_url, self.bucket);
        let response = self
            .client
            .post(&url)
            .bearer_auth(self.service_key.expose_secret())
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(bytes.to_vec())
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(MediaError::UploadStatus { status: status.as_u16(), body });
        }
        Ok(self.public_url(key))
    }
}

pub fn media_store_from_config(config: &MediaConfig) -> Result<Arc<dyn MediaStore>, MediaError> {
    match config.backend {
        MediaBackend::Local => {
            Ok(Arc::new(LocalMediaStore::new(config.local_dir.clone(), &config.public_base_url)))
        }
        MediaBackend::ObjectStorage => {
            let base_url = config.storage_url.as_deref().ok_or_else(|| {
                MediaError::Configuration("media.storage_url is required for object_storage".to_string())
            })?;
            let service_key = config.storage_key.clone().ok_or_else(|| {
                MediaError::Configuration("media.storage_key is required for object_storage".to_string())
            })?;
            Ok(Arc::new(ObjectStorageMediaStore::new(
                base_url,
                service_key,
                &config.bucket,
                Duration::from_secs(config.timeout_secs),
            )?))
        }
    }
}

/// Moves a provider-hosted image into a durable store.
pub struct MediaRelay {
    source: Arc<dyn MediaSource>,
    store: Arc<dyn MediaStore>,
    timeout: Duration,
}

impl MediaRelay {
    pub fn new(source: Arc<dyn MediaSource>, store: Arc<dyn MediaStore>, timeout: Duration) -> Self {
        Self { source, store, timeout }
    }

    pub async fn relay(&self, media_id: &str) -> Result<String, MediaError> {
        match tokio::time::timeout(self.timeout, self.relay_inner(media_id)).await {
            Ok(result) => result,
            Err(_) => Err(MediaError::TimedOut(self.timeout)),
        }
    }

    async fn relay_inner(&self, media_id: &str) -> Result<String, MediaError> {
        let media = self.source.fetch_media(media_id).await?;
        if media.bytes.is_empty() {
            return Err(MediaError::Empty);
        }

        let extension = extension_for(media.content_type.as_deref());
        let key = media_key(&media.bytes, extension, Utc::now());
        let url = self.store.put(&key, &media.bytes, content_type_for(extension)).await?;

        info!(
            event_name = "media.relayed",
            media_id,
            backend = self.store.backend(),
            bytes = media.bytes.len(),
            url = %url,
            "image stored"
        );
        Ok(url)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};

    use axum::extract::Path;
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::post;
    use axum::Router;
    use secrecy::SecretString;

    use super::{
        extension_for, media_key, LocalMediaStore, MediaError, MediaRelay, MediaStore,
        ObjectStorageMediaStore,
    };
    use crate::client::{CloudApiError, FetchedMedia, MediaSource};

    struct FixedSource(Option<FetchedMedia>);

    #[async_trait]
    impl MediaSource for FixedSource {
        async fn fetch_media(&self, media_id: &str) -> Result<FetchedMedia, CloudApiError> {
            self.0.clone().ok_or_else(|| CloudApiError::MissingMediaUrl { media_id: media_id.to_string() })
        }
    }

    struct StalledSource;

    #[async_trait]
    impl MediaSource for StalledSource {
        async fn fetch_media(&self, _media_id: &str) -> Result<FetchedMedia, CloudApiError> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(FetchedMedia { bytes: vec![1], content_type: None })
        }
    }

    #[test]
    fn extension_follows_content_type() {
        assert_eq!(extension_for(Some("image/png")), "png");
        assert_eq!(extension_for(Some("image/webp; charset=binary")), "webp");
        assert_eq!(extension_for(Some("IMAGE/GIF")), "gif");
        assert_eq!(extension_for(Some("image/jpeg")), "jpg");
        assert_eq!(extension_for(None), "jpg");
    }

    #[test]
    fn key_is_dated_and_collision_resistant() {
        let now = Utc.with_ymd_and_hms(2024, 3, 9, 12, 0, 0).single().expect("date");
        let first = media_key(b"same bytes", "png", now);
        let second = media_key(b"same bytes", "png", now);

        let digest = blake3::hash(b"same bytes").to_hex();
        assert!(first.starts_with(&format!("products/20240309/{}-", &digest.as_str()[..16])));
        assert!(first.ends_with(".png"));
        assert_ne!(first, second);
    }

    #[tokio::test]
    async fn relay_writes_to_local_store() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = Arc::new(LocalMediaStore::new(dir.path(), "http://localhost:8000/media/"));
        let relay = MediaRelay::new(
            Arc::new(FixedSource(Some(FetchedMedia {
                bytes: b"\x89PNG".to_vec(),
                content_type: Some("image/png".to_string()),
            }))),
            store.clone(),
            Duration::from_secs(5),
        );

        let url = relay.relay("1479537139650973").await.expect("relay");

        let key = url.strip_prefix("http://localhost:8000/media/").expect("public url");
        assert!(key.starts_with("products/") && key.ends_with(".png"));
        let written = std::fs::read(store.root().join(key)).expect("written");
        assert_eq!(written, b"\x89PNG");
    }

    #[tokio::test]
    async fn relay_failures_are_reported() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = Arc::new(LocalMediaStore::new(dir.path(), "http://localhost:8000/media"));

        let missing = MediaRelay::new(Arc::new(FixedSource(None)), store.clone(), Duration::from_secs(5));
        let stalled = MediaRelay::new(Arc::new(StalledSource), store.clone(), Duration::from_millis(20));

        assert!(matches!(missing.relay("1").await, Err(MediaError::Source(_))));
        assert!(matches!(stalled.relay("2").await, Err(MediaError::TimedOut(_))));
    }

    #[tokio::test]
    async fn local_store_rejects_escaping_keys() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = LocalMediaStore::new(dir.path(), "http://localhost:8000/media");

        let result = store.put("../outside.jpg", b"x", "image/jpeg").await;

        assert!(matches!(result, Err(MediaError::Configuration(_))));
    }

    async fn upload(Path((bucket, key)): Path<(String, String)>, headers: HeaderMap) -> StatusCode {
        let authorized =
            headers.get("authorization").and_then(|value| value.to_str().ok()) == Some("Bearer service-key");
        let typed = headers.get("content-type").and_then(|value| value.to_str().ok()) == Some("image/jpeg");
        if authorized && typed && bucket == "product-images" && key.starts_with("products/") {
            StatusCode::OK
        } else {
            StatusCode::BAD_REQUEST
        }
    }

    #[tokio::test]
    async fn object_storage_upload_returns_public_url() {
        let app = Router::new().route("/storage/v1/object/{bucket}/{*key}", post(upload));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let base = format!("http://{}", listener.local_addr().expect("address"));
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        let store = ObjectStorageMediaStore::new(
            &base,
            SecretString::from("service-key".to_string()),
            "product-images",
            Duration::from_secs(5),
        )
        .expect("store");

        let url = store.put("products/20240309/abc-def.jpg", b"jpeg", "image/jpeg").await.expect("upload");
        let rejected = store.put("other/abc.jpg", b"jpeg", "image/jpeg").await;

        assert_eq!(url, format!("{base}/storage/v1/object/public/product-images/products/20240309/abc-def.jpg"));
        assert!(matches!(rejected, Err(MediaError::UploadStatus { status: 400, .. })));
    }
}
