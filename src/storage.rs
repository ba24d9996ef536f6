//! Mirrors listing photos into S3.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use aws_sdk_s3::primitives::ByteStream;
use serde::Serialize;
use tracing::{info, warn};
use utoipa::ToSchema;

use crate::fetch::random_user_agent;

/// Outcome of mirroring one job's images.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, ToSchema)]
pub struct UploadSummary {
    /// Public URLs of the stored copies, in input order
    pub s3_urls: Vec<String>,
    /// Number of images stored
    pub success: usize,
    /// Number of images attempted
    pub total: usize,
}

/// Durable storage for listing images.
#[async_trait]
pub trait ImageStore: Send + Sync {
    /// Download and store every URL. Individual failures are skipped.
    async fn upload_images(&self, job_id: &str, image_urls: &[String]) -> UploadSummary;
}

/// Raw image bytes plus the server-declared type.
#[derive(Debug, Clone)]
pub struct DownloadedImage {
    pub bytes: Vec<u8>,
    pub content_type: Option<String>,
}

/// GET an image with a browser User-Agent.
pub async fn download_image(client: &reqwest::Client, url: &str) -> Result<DownloadedImage> {
    let resp = client
        .get(url)
        .header(reqwest::header::USER_AGENT, random_user_agent())
        .send()
        .await?
        .error_for_status()?;

    let content_type = resp
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.split(';').next().unwrap_or(v).trim().to_ascii_lowercase());

    let bytes = resp.bytes().await?.to_vec();
    if bytes.is_empty() {
        return Err(anyhow!("empty image body from {}", url));
    }

    Ok(DownloadedImage {
        bytes,
        content_type,
    })
}

/// File extension for a stored image: declared type first, then the URL.
pub fn image_extension(content_type: Option<&str>, url: &str) -> &'static str {
    match content_type {
        Some("image/jpeg") | Some("image/jpg") => return "jpg",
        Some("image/png") => return "png",
        Some("image/webp") => return "webp",
        Some("image/gif") => return "gif",
        Some("image/avif") => return "avif",
        _ => {}
    }

    let path = url
        .split(['?', '#'])
        .next()
        .unwrap_or(url)
        .to_ascii_lowercase();
    match path.rsplit('.').next() {
        Some("png") => "png",
        Some("webp") => "webp",
        Some("gif") => "gif",
        Some("avif") => "avif",
        _ => "jpg",
    }
}

/// `listings/{job_id}/image_{NNN}.{ext}`, 1-based.
pub fn object_key(job_id: &str, index: usize, ext: &str) -> String {
    format!("listings/{}/image_{:03}.{}", job_id, index + 1, ext)
}

fn content_type_for(ext: &str) -> &'static str {
    match ext {
        "png" => "image/png",
        "webp" => "image/webp",
        "gif" => "image/gif",
        "avif" => "image/avif",
        _ => "image/jpeg",
    }
}

/// Object storage that holds the mirrored bytes.
#[async_trait]
pub trait ObjectSink: Send + Sync {
    async fn put_object(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> Result<()>;

    /// Public URL of a stored object.
    fn public_url(&self, key: &str) -> String;
}

pub struct S3Bucket {
    client: aws_sdk_s3::Client,
    bucket: String,
    region: String,
}

impl S3Bucket {
    pub fn new(
        sdk_config: &aws_config::SdkConfig,
        bucket: impl Into<String>,
        region: impl Into<String>,
    ) -> Self {
        Self {
            client: aws_sdk_s3::Client::new(sdk_config),
            bucket: bucket.into(),
            region: region.into(),
        }
    }
}

#[async_trait]
impl ObjectSink for S3Bucket {
    async fn put_object(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> Result<()> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(bytes))
            .content_type(content_type)
            .send()
            .await
            .map_err(|e| anyhow!("put_object s3://{}/{} failed: {}", self.bucket, key, e))?;
        Ok(())
    }

    fn public_url(&self, key: &str) -> String {
        format!(
            "https://{}.s3.{}.amazonaws.com/{}",
            self.bucket, self.region, key
        )
    }
}

/// Downloads each image and writes it to an [`ObjectSink`], S3 in production.
pub struct S3ImageStore {
    sink: Arc<dyn ObjectSink>,
    http: reqwest::Client,
}

impl S3ImageStore {
    pub fn new(
        sdk_config: &aws_config::SdkConfig,
        bucket: impl Into<String>,
        region: impl Into<String>,
        download_timeout: Duration,
    ) -> Result<Self> {
        Self::with_sink(
            Arc::new(S3Bucket::new(sdk_config, bucket, region)),
            download_timeout,
        )
    }

    pub fn with_sink(sink: Arc<dyn ObjectSink>, download_timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(download_timeout)
            .build()?;
        Ok(Self { sink, http })
    }

    async fn upload_one(&self, job_id: &str, index: usize, url: &str) -> Result<String> {
        let image = download_image(&self.http, url).await?;
        let ext = image_extension(image.content_type.as_deref(), url);
        let key = object_key(job_id, index, ext);

        self.sink
            .put_object(&key, image.bytes, content_type_for(ext))
            .await?;
        Ok(self.sink.public_url(&key))
    }
}

#[async_trait]
impl ImageStore for S3ImageStore {
    async fn upload_images(&self, job_id: &str, image_urls: &[String]) -> UploadSummary {
        let mut summary = UploadSummary {
            total: image_urls.len(),
            ..Default::default()
        };

        for (index, url) in image_urls.iter().enumerate() {
            match self.upload_one(job_id, index, url).await {
                Ok(s3_url) => {
                    summary.s3_urls.push(s3_url);
                    summary.success += 1;
                }
                Err(e) => warn!("Image {}/{} upload failed ({}): {}", index + 1, summary.total, url, e),
            }
        }

        info!(
            "Uploaded {}/{} images for job {}",
            summary.success, summary.total, job_id
        );
        summary
    }
}
