use std::path::{Path, PathBuf};

use async_trait::async_trait;
use flowerbot_core::domain::image::DraftImage;
use reqwest::Client;
use thiserror::Error;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::debug;
use url::Url;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum ImageStoreError {
    #[error("invalid image source url `{0}`")]
    InvalidSource(String),
    #[error("image source returned status {status} for `{url}`")]
    SourceStatus { url: String, status: u16 },
    #[error("image fetch failed: {0}")]
    Fetch(#[from] reqwest::Error),
    #[error("image is {size_bytes} bytes, limit is {max_bytes}")]
    TooLarge { size_bytes: u64, max_bytes: u64 },
    #[error("could not write image to `{path}`: {source}")]
    Write { path: PathBuf, source: std::io::Error },
}

/// Durable home for accepted images.
#[async_trait]
pub trait ImageStore: Send + Sync {
    /// Checks the source is currently fetchable without keeping a copy.
    async fn check_reachable(&self, source_url: &str) -> Result<(), ImageStoreError>;

    /// Copies the image somewhere durable and returns its public URL.
    async fn store(&self, image: &DraftImage) -> Result<String, ImageStoreError>;
}

/// Downloads images into a directory the server exposes under `/media`.
#[derive(Clone)]
pub struct LocalImageStore {
    client: Client,
    media_dir: PathBuf,
    public_base_url: String,
    max_bytes: u64,
}

impl LocalImageStore {
    pub fn new(
        client: Client,
        media_dir: impl Into<PathBuf>,
        public_base_url: impl Into<String>,
        max_bytes: u64,
    ) -> Self {
        Self {
            client,
            media_dir: media_dir.into(),
            public_base_url: public_base_url.into(),
            max_bytes,
        }
    }

    pub fn media_dir(&self) -> &Path {
        &self.media_dir
    }

    fn public_url(&self, file_name: &str) -> String {
        format!("{}/media/{file_name}", self.public_base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl ImageStore for LocalImageStore {
    async fn check_reachable(&self, source_url: &str) -> Result<(), ImageStoreError> {
        let url = parse_source(source_url)?;
        let response = self.client.head(url).send().await?;
        if !response.status().is_success() {
            return Err(ImageStoreError::SourceStatus {
                url: source_url.to_owned(),
                status: response.status().as_u16(),
            });
        }
        Ok(())
    }

    async fn store(&self, image: &DraftImage) -> Result<String, ImageStoreError> {
        let url = parse_source(&image.url)?;
        let response = self.client.get(url).send().await?;
        if !response.status().is_success() {
            return Err(ImageStoreError::SourceStatus {
                url: image.url.clone(),
                status: response.status().as_u16(),
            });
        }
        if let Some(length) = response.content_length() {
            if length > self.max_bytes {
                return Err(ImageStoreError::TooLarge {
                    size_bytes: length,
                    max_bytes: self.max_bytes,
                });
            }
        }

        let bytes = response.bytes().await?;
        let size_bytes = bytes.len() as u64;
        if size_bytes > self.max_bytes {
            return Err(ImageStoreError::TooLarge { size_bytes, max_bytes: self.max_bytes });
        }

        fs::create_dir_all(&self.media_dir).await.map_err(|source| ImageStoreError::Write {
            path: self.media_dir.clone(),
            source,
        })?;

        let file_name = stored_file_name(image);
        let path = self.media_dir.join(&file_name);
        let write_error = |source| ImageStoreError::Write { path: path.clone(), source };
        let mut file = fs::File::create(&path).await.map_err(write_error)?;
        file.write_all(&bytes).await.map_err(write_error)?;
        file.sync_all().await.map_err(write_error)?;

        debug!(
            event_name = "chat.images.stored",
            path = %path.display(),
            size_bytes,
            "image copied to media directory"
        );
        Ok(self.public_url(&file_name))
    }
}

fn parse_source(source_url: &str) -> Result<Url, ImageStoreError> {
    Url::parse(source_url)
        .ok()
        .filter(|url| matches!(url.scheme(), "http" | "https"))
        .ok_or_else(|| ImageStoreError::InvalidSource(source_url.to_owned()))
}

/// Random name with an extension taken from the content type, else the original filename.
fn stored_file_name(image: &DraftImage) -> String {
    let extension = match image.content_type.to_ascii_lowercase().as_str() {
        "image/png" => "png",
        "image/jpeg" | "image/jpg" => "jpg",
        "image/webp" => "webp",
        "image/gif" => "gif",
        _ => Path::new(&image.filename)
            .extension()
            .and_then(|extension| extension.to_str())
            .filter(|extension| {
                matches!(
                    extension.to_ascii_lowercase().as_str(),
                    "png" | "jpg" | "jpeg" | "webp" | "gif"
                )
            })
            .unwrap_or("png"),
    };
    format!("{}.{}", Uuid::new_v4(), extension.to_ascii_lowercase())
}

#[cfg(test)]
mod tests {
    use flowerbot_core::domain::image::DraftImage;
    use reqwest::Client;

    use super::{stored_file_name, ImageStore, ImageStoreError, LocalImageStore};

    fn image(content_type: &str, filename: &str) -> DraftImage {
        DraftImage {
            url: "https://cdn.example.test/upload".to_owned(),
            content_type: content_type.to_owned(),
            filename: filename.to_owned(),
        }
    }

    #[test]
    fn stored_names_keep_a_known_image_extension() {
        assert!(stored_file_name(&image("image/jpeg", "x.bin")).ends_with(".jpg"));
        assert!(stored_file_name(&image("application/octet-stream", "Rose.WEBP")).ends_with(".webp"));
        assert!(stored_file_name(&image("application/octet-stream", "notes.txt")).ends_with(".png"));
        assert_ne!(
            stored_file_name(&image("image/png", "a.png")),
            stored_file_name(&image("image/png", "a.png"))
        );
    }

    #[test]
    fn public_urls_are_rooted_under_media() {
        let store = LocalImageStore::new(Client::new(), "media", "https://flowers.example.test/", 1024);
        assert_eq!(store.public_url("a.png"), "https://flowers.example.test/media/a.png");
    }

    #[tokio::test]
    async fn non_http_sources_are_rejected_before_any_request() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = LocalImageStore::new(Client::new(), dir.path(), "http://127.0.0.1:8080", 1024);
        let mut local = image("image/png", "a.png");
        local.url = "file:///etc/passwd".to_owned();

        assert!(matches!(store.check_reachable("not a url").await, Err(ImageStoreError::InvalidSource(_))));
        assert!(matches!(store.store(&local).await, Err(ImageStoreError::InvalidSource(_))));
        assert_eq!(std::fs::read_dir(dir.path()).expect("read dir").count(), 0);
    }
}
