use std::collections::HashMap;
use std::path::{Path, PathBuf};

use axum::extract::Multipart;
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};

/// A multipart file written to the local staging directory. The file is
/// removed when the handle is dropped, whatever the outcome of the request.
#[derive(Debug)]
pub struct StagedFile {
    path: PathBuf,
}

impl StagedFile {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for StagedFile {
    // Blocking unlink on the runtime thread. Staged files are bounded by the
    // body limit, and the file must be gone before the handler returns.
    fn drop(&mut self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!("Removed staged file {}", self.path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to remove staged file {}: {}", self.path.display(), e),
        }
    }
}

/// Text fields and staged files from one multipart body. Only the first
/// file per field name is kept.
#[derive(Debug, Default)]
pub struct MultipartForm {
    fields: HashMap<String, String>,
    files: HashMap<String, StagedFile>,
}

impl MultipartForm {
    pub async fn read(mut multipart: Multipart, upload_dir: &Path) -> ApiResult<Self> {
        let mut form = Self::default();

        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| ApiError::bad_request(format!("Malformed multipart body: {}", e)))?
        {
            let Some(name) = field.name().map(str::to_string) else {
                continue;
            };

            match field.file_name().map(str::to_string) {
                Some(file_name) => {
                    let data = field
                        .bytes()
                        .await
                        .map_err(|e| ApiError::bad_request(format!("Failed to read file field: {}", e)))?;

                    // Browsers send an empty part when no file was picked.
                    if data.is_empty() || form.files.contains_key(&name) {
                        continue;
                    }

                    let staged = stage(upload_dir, &file_name, &data).await?;
                    form.files.insert(name, staged);
                }
                None => {
                    let text = field
                        .text()
                        .await
                        .map_err(|e| ApiError::bad_request(format!("Failed to read field: {}", e)))?;
                    form.fields.entry(name).or_insert(text);
                }
            }
        }

        Ok(form)
    }

    /// Trimmed text field, `None` when missing or blank.
    pub fn text(&self, name: &str) -> Option<String> {
        non_blank(self.fields.get(name).map(String::as_str))
    }

    /// Raw text field, `None` only when missing or blank after trimming.
    pub fn raw_text(&self, name: &str) -> Option<String> {
        self.fields
            .get(name)
            .filter(|v| !v.trim().is_empty())
            .cloned()
    }

    pub fn take_file(&mut self, name: &str) -> Option<StagedFile> {
        self.files.remove(name)
    }
}

pub fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Write bytes under a server-chosen name; only a short alphanumeric
/// extension survives from the client's file name.
async fn stage(upload_dir: &Path, client_name: &str, data: &[u8]) -> ApiResult<StagedFile> {
    tokio::fs::create_dir_all(upload_dir).await.map_err(|e| {
        error!("Failed to create upload directory {}: {}", upload_dir.display(), e);
        ApiError::internal("Internal server error")
    })?;

    let extension = Path::new(client_name)
        .extension()
        .and_then(|e| e.to_str())
        .filter(|e| e.len() <= 8 && e.chars().all(|c| c.is_ascii_alphanumeric()))
        .map(|e| format!(".{}", e.to_ascii_lowercase()))
        .unwrap_or_default();

    let path = upload_dir.join(format!("{}{}", Uuid::new_v4(), extension));
    tokio::fs::write(&path, data).await.map_err(|e| {
        error!("Failed to write staged file {}: {}", path.display(), e);
        ApiError::internal("Internal server error")
    })?;

    Ok(StagedFile { path })
}
