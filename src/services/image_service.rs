//! Local-disk storage for uploaded images.
//!
//! Stored files live under the media root as `<folder>/<uuid>.<ext>`; the
//! database keeps only that relative path.

use base64::{Engine as _, engine::general_purpose::STANDARD};
use std::path::{Component, Path, PathBuf};
use tracing::{debug, warn};
use uuid::Uuid;

pub const RECIPE_IMAGE_FOLDER: &str = "recipes/images";
pub const AVATAR_FOLDER: &str = "users";

#[derive(Debug, thiserror::Error)]
pub enum ImageError {
    #[error("Invalid image data: {0}")]
    InvalidDataUri(String),
    #[error("Unsupported image type: {0}")]
    UnsupportedType(String),
    #[error("The submitted file is empty.")]
    Empty,
    #[error("Invalid stored path: {0}")]
    InvalidPath(String),
    #[error("Invalid base64 payload: {0}")]
    Decode(#[from] base64::DecodeError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

fn extension_for_mime(mime: &str) -> Result<&'static str, ImageError> {
    let mime = mime.trim().to_ascii_lowercase();
    if !mime.starts_with("image/") {
        return Err(ImageError::UnsupportedType(mime));
    }
    match mime.as_str() {
        "image/jpeg" | "image/jpg" => Ok("jpg"),
        "image/png" => Ok("png"),
        "image/gif" => Ok("gif"),
        "image/webp" => Ok("webp"),
        other => mime_guess::get_mime_extensions_str(other)
            .and_then(|extensions| extensions.first().copied())
            .ok_or_else(|| ImageError::UnsupportedType(other.to_string())),
    }
}

#[derive(Debug, Clone)]
pub struct ImageStore {
    root: PathBuf,
}

impl ImageStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Decodes a `data:image/<type>;base64,<payload>` URI and stores it.
    pub async fn save_data_uri(&self, folder: &str, data_uri: &str) -> Result<String, ImageError> {
        let rest = data_uri
            .trim()
            .strip_prefix("data:")
            .ok_or_else(|| ImageError::InvalidDataUri("missing data: prefix".to_string()))?;
        let (header, payload) = rest
            .split_once(',')
            .ok_or_else(|| ImageError::InvalidDataUri("missing payload".to_string()))?;
        let mime = header
            .strip_suffix(";base64")
            .ok_or_else(|| ImageError::InvalidDataUri("payload is not base64".to_string()))?;

        let extension = extension_for_mime(mime)?;
        let bytes = STANDARD.decode(payload.trim())?;
        self.write(folder, extension, &bytes).await
    }

    /// Stores raw upload bytes. The extension comes from the file name or,
    /// failing that, the declared content type.
    pub async fn save_bytes(
        &self,
        folder: &str,
        file_name: Option<&str>,
        content_type: Option<&str>,
        bytes: &[u8],
    ) -> Result<String, ImageError> {
        let guessed = file_name
            .and_then(|name| mime_guess::from_path(name).first())
            .map(|mime| mime.essence_str().to_string());
        let mime = guessed
            .or_else(|| content_type.map(str::to_string))
            .ok_or_else(|| ImageError::UnsupportedType("unknown".to_string()))?;
        let extension = extension_for_mime(&mime)?;
        self.write(folder, extension, bytes).await
    }

    async fn write(
        &self,
        folder: &str,
        extension: &str,
        bytes: &[u8],
    ) -> Result<String, ImageError> {
        if bytes.is_empty() {
            return Err(ImageError::Empty);
        }
        let relative = format!("{folder}/{}.{extension}", Uuid::new_v4());
        let target = self.resolve(&relative)?;
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&target, bytes).await?;
        debug!(path = %relative, size = bytes.len(), "Image stored.");
        Ok(relative)
    }

    /// Deletes a stored file. A file that is already gone is not an error.
    pub async fn remove(&self, relative: &str) -> Result<(), ImageError> {
        let target = self.resolve(relative)?;
        match tokio::fs::remove_file(&target).await {
            Ok(()) => {
                debug!(path = %relative, "Image removed.");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(path = %relative, "Image to remove was already missing.");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    fn resolve(&self, relative: &str) -> Result<PathBuf, ImageError> {
        let path = Path::new(relative);
        let is_plain = !relative.is_empty()
            && path.components().all(|c| matches!(c, Component::Normal(_)));
        if !is_plain {
            return Err(ImageError::InvalidPath(relative.to_string()));
        }
        Ok(self.root.join(path))
    }
}

/// Absolute URL of a stored path, served under `/media`.
pub fn media_url(public_base_url: &str, relative: &str) -> String {
    format!("{}/media/{}", public_base_url.trim_end_matches('/'), relative)
}

#[cfg(test)]
mod tests {
    use super::*;

    // 1x1 transparent PNG.
    const PIXEL: &str = "iVBORw0KGgoAAAANSUhEUgAAAAEAAAABCAQAAAC1HAwCAAAAC0lEQVR42mNkYAAAAAYAAjCB0C8AAAAASUVORK5CYII=";

    #[tokio::test]
    async fn test_save_and_remove_data_uri() {
        let dir = tempfile::tempdir().unwrap();
        let store = ImageStore::new(dir.path());

        let path = store
            .save_data_uri(RECIPE_IMAGE_FOLDER, &format!("data:image/png;base64,{PIXEL}"))
            .await
            .unwrap();
        assert!(path.starts_with("recipes/images/"));
        assert!(path.ends_with(".png"));
        let stored = dir.path().join(&path);
        assert_eq!(std::fs::read(&stored).unwrap(), STANDARD.decode(PIXEL).unwrap());

        store.remove(&path).await.unwrap();
        assert!(!stored.exists());
        // Second removal is a no-op.
        store.remove(&path).await.unwrap();
    }

    #[tokio::test]
    async fn test_rejects_malformed_input() {
        let dir = tempfile::tempdir().unwrap();
        let store = ImageStore::new(dir.path());

        assert!(matches!(
            store.save_data_uri("x", "not a data uri").await,
            Err(ImageError::InvalidDataUri(_))
        ));
        assert!(matches!(
            store.save_data_uri("x", "data:text/plain;base64,aGVsbG8=").await,
            Err(ImageError::UnsupportedType(_))
        ));
        assert!(matches!(
            store.save_data_uri("x", "data:image/png;base64,@@@").await,
            Err(ImageError::Decode(_))
        ));
        assert!(matches!(
            store.remove("../outside.png").await,
            Err(ImageError::InvalidPath(_))
        ));
    }

    #[tokio::test]
    async fn test_save_bytes_uses_file_name_then_content_type() {
        let dir = tempfile::tempdir().unwrap();
        let store = ImageStore::new(dir.path());

        let from_name = store
            .save_bytes(AVATAR_FOLDER, Some("me.jpeg"), None, b"jpeg-bytes")
            .await
            .unwrap();
        assert!(from_name.starts_with("users/") && from_name.ends_with(".jpg"));

        let from_type = store
            .save_bytes(AVATAR_FOLDER, None, Some("image/gif"), b"gif-bytes")
            .await
            .unwrap();
        assert!(from_type.ends_with(".gif"));

        assert!(matches!(
            store.save_bytes(AVATAR_FOLDER, Some("a.png"), None, b"").await,
            Err(ImageError::Empty)
        ));
    }

    #[test]
    fn test_media_url() {
        assert_eq!(
            media_url("http://localhost:8000/", "users/a.png"),
            "http://localhost:8000/media/users/a.png"
        );
    }
}
