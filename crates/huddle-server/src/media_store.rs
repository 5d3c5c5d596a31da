use std::path::{Path, PathBuf};

use thiserror::Error;
use tokio::fs;
use tracing::{debug, info};
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum MediaError {
    #[error("Image file is empty")]
    Empty,

    #[error("Image too large: {size} bytes (max {max})")]
    TooLarge { size: usize, max: usize },

    #[error("Only png, jpeg, gif and webp images are accepted")]
    UnsupportedType,

    #[error("Image not found: {0}")]
    NotFound(Uuid),

    #[error("Media storage error: {0}")]
    Io(String),
}

/// Image formats accepted for profile and conversation pictures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageKind {
    Png,
    Jpeg,
    Gif,
    Webp,
}

impl ImageKind {
    /// Detect the format from the leading magic bytes.
    pub fn sniff(data: &[u8]) -> Option<Self> {
        if data.starts_with(b"\x89PNG\r\n\x1a\n") {
            Some(Self::Png)
        } else if data.starts_with(&[0xff, 0xd8, 0xff]) {
            Some(Self::Jpeg)
        } else if data.starts_with(b"GIF87a") || data.starts_with(b"GIF89a") {
            Some(Self::Gif)
        } else if data.len() >= 12 && &data[..4] == b"RIFF" && &data[8..12] == b"WEBP" {
            Some(Self::Webp)
        } else {
            None
        }
    }

    pub fn content_type(self) -> &'static str {
        match self {
            Self::Png => "image/png",
            Self::Jpeg => "image/jpeg",
            Self::Gif => "image/gif",
            Self::Webp => "image/webp",
        }
    }
}

/// Flat directory of uploaded images addressed by UUID.
#[derive(Debug, Clone)]
pub struct MediaStore {
    base_path: PathBuf,
    max_size: usize,
    public_base_url: String,
}

impl MediaStore {
    pub async fn new(
        base_path: PathBuf,
        max_size: usize,
        public_base_url: impl Into<String>,
    ) -> Result<Self, MediaError> {
        fs::create_dir_all(&base_path).await.map_err(|e| {
            MediaError::Io(format!(
                "Failed to create media directory '{}': {}",
                base_path.display(),
                e
            ))
        })?;

        info!(path = %base_path.display(), "Media store initialized");

        Ok(Self {
            base_path,
            max_size,
            public_base_url: public_base_url.into(),
        })
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// Store an image and return its public URL.
    pub async fn upload(&self, data: &[u8]) -> Result<String, MediaError> {
        if data.is_empty() {
            return Err(MediaError::Empty);
        }
        if data.len() > self.max_size {
            return Err(MediaError::TooLarge {
                size: data.len(),
                max: self.max_size,
            });
        }
        ImageKind::sniff(data).ok_or(MediaError::UnsupportedType)?;

        let id = Uuid::new_v4();
        fs::write(self.image_path(id), data)
            .await
            .map_err(|e| MediaError::Io(format!("Failed to write image {}: {}", id, e)))?;

        debug!(id = %id, size = data.len(), "Stored image");
        Ok(self.public_url(id))
    }

    /// Read an image back together with its content type.
    pub async fn get(&self, id: Uuid) -> Result<(Vec<u8>, &'static str), MediaError> {
        let path = self.image_path(id);
        if !fs::try_exists(&path).await.unwrap_or(false) {
            return Err(MediaError::NotFound(id));
        }

        let data = fs::read(&path)
            .await
            .map_err(|e| MediaError::Io(format!("Failed to read image {}: {}", id, e)))?;
        let content_type = ImageKind::sniff(&data)
            .map(ImageKind::content_type)
            .unwrap_or("application/octet-stream");

        Ok((data, content_type))
    }

    pub fn public_url(&self, id: Uuid) -> String {
        format!("{}/media/{}", self.public_base_url, id)
    }

    // A UUID's string form never contains separators, so joining it cannot
    // escape the base directory.
    fn image_path(&self, id: Uuid) -> PathBuf {
        self.base_path.join(id.to_string())
    }
}
