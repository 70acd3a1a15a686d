use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::FetchError;
use crate::tile::TileKey;

/// Trait for tile imagery providers.
///
/// A source is an opaque fetch: given a tile address it returns the encoded
/// image bytes or a failure. Transport, authentication and retry policy are
/// the implementation's concern.
#[async_trait]
pub trait TileSource: Send + Sync {
    /// Stable identifier of this provider (used in cache keys and logs).
    fn provider_id(&self) -> &str;

    /// Fetch the encoded imagery for `key`.
    async fn fetch(&self, key: TileKey) -> Result<Bytes, FetchError>;
}

/// Tile source reading `{root}/{zoom}/{x}/{y}.{extension}` from disk.
#[derive(Debug, Clone)]
pub struct DirectorySource {
    root: PathBuf,
    extension: String,
    provider_id: String,
}

impl DirectorySource {
    /// Create a source over `root` serving `.png` tiles.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let provider_id = format!("file://{}", root.display());
        Self {
            root,
            extension: "png".to_string(),
            provider_id,
        }
    }

    /// Use a different file extension (without the dot).
    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = extension.into();
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the file holding `key`.
    pub fn tile_path(&self, key: TileKey) -> PathBuf {
        self.root
            .join(key.zoom.to_string())
            .join(key.x.to_string())
            .join(format!("{}.{}", key.y, self.extension))
    }
}

#[async_trait]
impl TileSource for DirectorySource {
    fn provider_id(&self) -> &str {
        &self.provider_id
    }

    async fn fetch(&self, key: TileKey) -> Result<Bytes, FetchError> {
        let path = self.tile_path(key);
        match tokio::fs::read(&path).await {
            Ok(data) => Ok(Bytes::from(data)),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(FetchError::NotFound(path.display().to_string()))
            }
            Err(e) => Err(FetchError::Connection(format!(
                "{}: {}",
                path.display(),
                e
            ))),
        }
    }
}
