//! Cover image upload to the media host (Cloudinary unsigned upload).

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use log::debug;
use reqwest::Client;
use reqwest::multipart::{Form, Part};
use serde_json::Value;
use std::env;

/// Uploads an image and returns its public URL. Behind a trait so post
/// submission can be tested without the media host.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MediaUploader: Send + Sync {
    async fn upload(&self, file_name: &str, bytes: Vec<u8>) -> Result<String>;
}

/// Unsigned Cloudinary upload: a multipart POST with `file` and
/// `upload_preset` fields; the response's `secure_url` is the public URL.
pub struct CloudinaryUploader {
    client: Client,
    upload_url: String,
    upload_preset: String,
}

impl CloudinaryUploader {
    pub fn new(client: Client, cloud_name: &str, upload_preset: &str) -> Result<Self> {
        let cloud_name = cloud_name.trim();
        let upload_preset = upload_preset.trim();
        if cloud_name.is_empty() || upload_preset.is_empty() {
            bail!(
                "Media host config missing: set CLOUDINARY_CLOUD_NAME and CLOUDINARY_UPLOAD_PRESET"
            );
        }
        Ok(Self {
            client,
            upload_url: format!(
                "https://api.cloudinary.com/v1_1/{}/image/upload",
                cloud_name
            ),
            upload_preset: upload_preset.to_string(),
        })
    }

    /// Reads CLOUDINARY_CLOUD_NAME and CLOUDINARY_UPLOAD_PRESET from the
    /// environment.
    pub fn from_env(client: Client) -> Result<Self> {
        let cloud_name = env::var("CLOUDINARY_CLOUD_NAME").unwrap_or_default();
        let upload_preset = env::var("CLOUDINARY_UPLOAD_PRESET").unwrap_or_default();
        Self::new(client, &cloud_name, &upload_preset)
    }

    /// Uploader pointed at an explicit upload URL. Used by tests.
    pub fn with_upload_url(client: Client, upload_url: &str, upload_preset: &str) -> Self {
        Self {
            client,
            upload_url: upload_url.to_string(),
            upload_preset: upload_preset.to_string(),
        }
    }
}

#[async_trait]
impl MediaUploader for CloudinaryUploader {
    #[tracing::instrument(skip(self, bytes))]
    async fn upload(&self, file_name: &str, bytes: Vec<u8>) -> Result<String> {
        debug!("Uploading {} ({} bytes) to media host", file_name, bytes.len());

        let part = Part::bytes(bytes).file_name(file_name.to_string());
        let form = Form::new()
            .part("file", part)
            .text("upload_preset", self.upload_preset.clone());

        let response = self
            .client
            .post(&self.upload_url)
            .multipart(form)
            .send()
            .await
            .context("Failed to send upload request to the media host")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("Image upload failed (HTTP {}): {}", status.as_u16(), body);
        }

        let payload: Value = response
            .json()
            .await
            .context("Failed to parse media host response")?;
        payload
            .get("secure_url")
            .and_then(Value::as_str)
            .map(str::to_string)
            .context("Media host response did not contain a secure_url")
    }
}
