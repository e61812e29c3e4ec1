pub mod cloudinary;

use std::path::Path;

use async_trait::async_trait;

pub use cloudinary::{CloudinaryClient, CloudinaryConfig};

/// A file that the media host has accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedMedia {
    pub url: String,
    pub public_id: Option<String>,
}

/// Remote media host. Takes a locally staged file and returns a stable URL.
/// Implementations never delete the local file; the caller owns it.
#[async_trait]
pub trait MediaUploader: Send + Sync {
    async fn upload(&self, path: &Path) -> anyhow::Result<UploadedMedia>;
}
