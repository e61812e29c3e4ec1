use std::path::Path;

use anyhow::{Context, Result, anyhow, bail};
use async_trait::async_trait;
use reqwest::Client;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use sha1::{Digest, Sha1};
use tracing::{info, warn};

use crate::{MediaUploader, UploadedMedia};

pub const DEFAULT_BASE_URL: &str = "https://api.cloudinary.com";

#[derive(Debug, Clone)]
pub struct CloudinaryConfig {
    pub cloud_name: String,
    pub api_key: String,
    pub api_secret: String,
    pub base_url: String,
}

/// Signed-upload client for the Cloudinary REST API.
pub struct CloudinaryClient {
    client: Client,
    config: CloudinaryConfig,
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    url: Option<String>,
    secure_url: Option<String>,
    public_id: Option<String>,
}

impl CloudinaryClient {
    pub fn new(config: CloudinaryConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    fn upload_url(&self) -> String {
        format!(
            "{}/v1_1/{}/auto/upload",
            self.config.base_url.trim_end_matches('/'),
            self.config.cloud_name
        )
    }
}

/// Cloudinary signature: SHA-1 over the alphabetically sorted signed params
/// (`file`, `api_key` and `resource_type` excluded) followed by the secret.
pub fn sign_upload(timestamp: i64, api_secret: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(format!("timestamp={}", timestamp).as_bytes());
    hasher.update(api_secret.as_bytes());
    hex::encode(hasher.finalize())
}

#[async_trait]
impl MediaUploader for CloudinaryClient {
    async fn upload(&self, path: &Path) -> Result<UploadedMedia> {
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("Cannot read staged file {}", path.display()))?;
        if bytes.is_empty() {
            bail!("Refusing to upload empty file {}", path.display());
        }

        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("upload")
            .to_string();

        let timestamp = chrono::Utc::now().timestamp();
        let signature = sign_upload(timestamp, &self.config.api_secret);

        let form = Form::new()
            .text("api_key", self.config.api_key.clone())
            .text("timestamp", timestamp.to_string())
            .text("signature", signature)
            .part("file", Part::bytes(bytes).file_name(file_name));

        let resp = self
            .client
            .post(self.upload_url())
            .multipart(form)
            .send()
            .await
            .context("Media upload request failed")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            warn!("Media host rejected upload ({}): {}", status, body);
            bail!("Media upload failed ({})", status);
        }

        let body: UploadResponse = resp.json().await.context("Malformed media host response")?;
        let url = body
            .secure_url
            .or(body.url)
            .ok_or_else(|| anyhow!("Media host response carried no URL"))?;

        info!("File uploaded to media host: {}", url);
        Ok(UploadedMedia {
            url,
            public_id: body.public_id,
        })
    }
}
