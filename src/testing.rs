//! In-process fakes for the service collaborators.

use std::io::Cursor;
use std::sync::Arc;

use async_trait::async_trait;
use axum::Router;
use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};

use crate::analysis::{AccessibilityAnalyzer, AccessibilityReport};
use crate::api::AppState;
use crate::config::AppConfig;
use crate::error::FetchError;
use crate::extract::CanonicalRules;
use crate::fetch::PageFetcher;
use crate::jobs::JobStore;
use crate::storage::{object_key, ImageStore, UploadSummary};

/// Serves one fixed page, or fails every fetch when `None`.
pub struct FixedPage(pub Option<String>);

#[async_trait]
impl PageFetcher for FixedPage {
    async fn fetch_page(&self, url: &str) -> Result<String, FetchError> {
        self.0.clone().ok_or_else(|| FetchError::Status {
            url: url.to_string(),
            status: 404,
        })
    }
}

/// Pretends every upload succeeds.
pub struct AcceptAllStore;

#[async_trait]
impl ImageStore for AcceptAllStore {
    async fn upload_images(&self, job_id: &str, image_urls: &[String]) -> UploadSummary {
        UploadSummary {
            s3_urls: (0..image_urls.len())
                .map(|i| format!("https://test-bucket.s3.us-east-1.amazonaws.com/{}", object_key(job_id, i, "jpg")))
                .collect(),
            success: image_urls.len(),
            total: image_urls.len(),
        }
    }
}

/// Scores 80 and echoes how many images it was given.
pub struct FixedAnalyzer;

#[async_trait]
impl AccessibilityAnalyzer for FixedAnalyzer {
    async fn analyze(&self, image_urls: &[String], _listing_info: &str) -> AccessibilityReport {
        AccessibilityReport {
            overall_score: 80,
            positive_features: vec![format!("reviewed {} images", image_urls.len())],
            areas_for_improvement: Vec::new(),
            recommendations: Vec::new(),
            raw_analysis: None,
            error: None,
        }
    }
}

pub fn test_state(page: Option<String>) -> Arc<AppState> {
    Arc::new(AppState {
        jobs: JobStore::new(),
        fetcher: Arc::new(FixedPage(page)),
        store: Arc::new(AcceptAllStore),
        analyzer: Arc::new(FixedAnalyzer),
        rules: CanonicalRules::default(),
        config: AppConfig::default(),
    })
}

/// Listing page with three payload photos, two of them repeated in markup
/// under other renditions, and one markup-only photo.
pub fn listing_html() -> String {
    r#"<!DOCTYPE html>
<html>
<head>
<script id="__NEXT_DATA__" type="application/json">
{"props":{"pageProps":{"componentProps":{"gdpClientCache":"{\"Query{\\\"zpid\\\":123}\":{\"property\":{\"responsivePhotos\":[{\"mixedSources\":{\"jpeg\":[{\"url\":\"https://photos.zillowstatic.com/fp/aaa111-cc_ft_384.jpg\",\"width\":384},{\"url\":\"https://photos.zillowstatic.com/fp/aaa111-cc_ft_1536.jpg\",\"width\":1536}]}},{\"url\":\"https://photos.zillowstatic.com/fp/bbb222-cc_ft_1536.jpg\"},{\"url\":\"https://photos.zillowstatic.com/fp/ccc333-cc_ft_1536.jpg\"}]}}}"}}}}
</script>
</head>
<body>
<img src="https://photos.zillowstatic.com/fp/aaa111-p_e.webp">
<img data-src="https://photos.zillowstatic.com/fp/ccc333-cc_ft_768.jpg?w=768">
<img src="https://photos.zillowstatic.com/fp/ddd444-cc_ft_1536.jpg">
<img src="https://www.zillow.com/static/images/logo-zillow.png">
<img src="https://pixel.example.com/track/1x1.gif">
</body>
</html>"#
        .to_string()
}

/// Serve `router` on an ephemeral loopback port; returns the base URL.
pub async fn serve(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}")
}

/// A translucent PNG of the given size.
pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let img = RgbaImage::from_pixel(width, height, Rgba([200, 120, 40, 128]));
    let mut buf = Cursor::new(Vec::new());
    DynamicImage::ImageRgba8(img)
        .write_to(&mut buf, ImageFormat::Png)
        .unwrap();
    buf.into_inner()
}
