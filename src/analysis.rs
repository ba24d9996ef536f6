//! Accessibility review of listing photos with a vision model on Bedrock.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use aws_sdk_bedrockruntime::primitives::Blob;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use image::codecs::jpeg::JpegEncoder;
use image::DynamicImage;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{info, warn};
use utoipa::ToSchema;

use crate::storage::download_image;

const ANTHROPIC_VERSION: &str = "bedrock-2023-05-31";
const MAX_TOKENS: u32 = 4000;

/// Longest side of an image sent to the model, in pixels.
const MAX_DIMENSION: u32 = 1024;
const JPEG_QUALITY: u8 = 85;

const SYSTEM_PROMPT: &str = r#"You are an expert ADA (Americans with Disabilities Act) accessibility consultant specializing in residential property evaluation.

Analyze the provided images of a residential property and evaluate its accessibility. Report:

1. POSITIVE FEATURES - accessibility features that meet or exceed ADA standards
2. AREAS FOR IMPROVEMENT - accessibility barriers and non-compliant features
3. RECOMMENDATIONS - specific, actionable changes that would improve accessibility

Consider entryways and doorways, interior circulation, bathrooms, kitchens, lighting, flooring, stairways and ramps, emergency egress and overall maneuverability.

Respond in JSON with exactly this structure:
{
    "overall_score": <number 0-100>,
    "positive_features": [<string>, ...],
    "areas_for_improvement": [<string>, ...],
    "recommendations": [<string>, ...]
}"#;

/// Structured result of an accessibility review.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct AccessibilityReport {
    /// 0-100
    pub overall_score: u8,
    pub positive_features: Vec<String>,
    pub areas_for_improvement: Vec<String>,
    pub recommendations: Vec<String>,
    /// Model text kept verbatim when it could not be parsed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_analysis: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AccessibilityReport {
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            overall_score: 0,
            positive_features: Vec::new(),
            areas_for_improvement: Vec::new(),
            recommendations: Vec::new(),
            raw_analysis: None,
            error: Some(message.into()),
        }
    }

    /// Placeholder used when the model answered with something other than
    /// the requested JSON.
    pub fn unparsed(raw: impl Into<String>) -> Self {
        Self {
            overall_score: 50,
            positive_features: vec!["Analysis completed but format needs review".to_string()],
            areas_for_improvement: vec!["Unable to parse detailed analysis".to_string()],
            recommendations: vec!["Review analysis manually".to_string()],
            raw_analysis: Some(raw.into()),
            error: None,
        }
    }
}

/// Vision-model review of a bounded set of listing photos.
#[async_trait]
pub trait AccessibilityAnalyzer: Send + Sync {
    /// Never fails; problems are reported inside the returned report.
    async fn analyze(&self, image_urls: &[String], listing_info: &str) -> AccessibilityReport;
}

/// Image block ready for the messages API.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedImage {
    pub media_type: &'static str,
    pub data: String,
}

/// Decode any supported format, drop alpha, shrink to fit
/// `MAX_DIMENSION` and re-encode as JPEG.
pub fn prepare_for_model(bytes: &[u8]) -> Result<EncodedImage> {
    let rgb = image::load_from_memory(bytes)?.to_rgb8();
    let rgb = if rgb.width().max(rgb.height()) > MAX_DIMENSION {
        DynamicImage::ImageRgb8(rgb)
            .thumbnail(MAX_DIMENSION, MAX_DIMENSION)
            .to_rgb8()
    } else {
        rgb
    };

    let mut jpeg = Vec::new();
    JpegEncoder::new_with_quality(&mut jpeg, JPEG_QUALITY).encode_image(&rgb)?;
    Ok(EncodedImage {
        media_type: "image/jpeg",
        data: BASE64.encode(&jpeg),
    })
}

/// Anthropic messages body: one user turn with text then images.
pub fn build_request_body(images: &[EncodedImage], listing_info: &str) -> Value {
    let mut content = vec![json!({
        "type": "text",
        "text": format!(
            "Please analyze these {} images of a residential property for ADA accessibility compliance. Property details: {}",
            images.len(),
            listing_info
        ),
    })];
    content.extend(images.iter().map(|img| {
        json!({
            "type": "image",
            "source": {
                "type": "base64",
                "media_type": img.media_type,
                "data": img.data,
            }
        })
    }));

    json!({
        "anthropic_version": ANTHROPIC_VERSION,
        "max_tokens": MAX_TOKENS,
        "system": SYSTEM_PROMPT,
        "messages": [{ "role": "user", "content": content }],
    })
}

/// Turn a messages API response body into a report.
pub fn report_from_response(body: &Value) -> AccessibilityReport {
    let text = body["content"]
        .as_array()
        .and_then(|blocks| {
            blocks
                .iter()
                .find(|b| b["type"] == "text")
                .and_then(|b| b["text"].as_str())
        })
        .unwrap_or_default();

    if text.is_empty() {
        return AccessibilityReport::failed("Analysis failed: model returned no text");
    }
    parse_report(text)
}

/// Parse the model's JSON answer, tolerating code fences and prose around it.
pub fn parse_report(text: &str) -> AccessibilityReport {
    let parsed = match (text.find('{'), text.rfind('}')) {
        (Some(start), Some(end)) if start < end => {
            serde_json::from_str::<Value>(&text[start..=end]).ok()
        }
        _ => None,
    };

    let Some(Value::Object(obj)) = parsed else {
        return AccessibilityReport::unparsed(text);
    };
    if !obj.contains_key("overall_score") {
        return AccessibilityReport::unparsed(text);
    }

    let score = obj
        .get("overall_score")
        .and_then(|v| v.as_f64().or_else(|| v.as_str()?.trim().parse().ok()))
        .unwrap_or(0.0)
        .clamp(0.0, 100.0)
        .round() as u8;

    let list = |key: &str| -> Vec<String> {
        obj.get(key)
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .map(|item| match item {
                        Value::String(s) => s.clone(),
                        other => other.to_string(),
                    })
                    .collect()
            })
            .unwrap_or_default()
    };

    AccessibilityReport {
        overall_score: score,
        positive_features: list("positive_features"),
        areas_for_improvement: list("areas_for_improvement"),
        recommendations: list("recommendations"),
        raw_analysis: None,
        error: None,
    }
}

/// Sends a messages request body to the model and returns its response body.
#[async_trait]
pub trait ModelInvoker: Send + Sync {
    async fn invoke(&self, body: &Value) -> Result<Value>;
}

pub struct BedrockInvoker {
    client: aws_sdk_bedrockruntime::Client,
    model_id: String,
}

impl BedrockInvoker {
    pub fn new(sdk_config: &aws_config::SdkConfig, model_id: impl Into<String>) -> Self {
        Self {
            client: aws_sdk_bedrockruntime::Client::new(sdk_config),
            model_id: model_id.into(),
        }
    }
}

#[async_trait]
impl ModelInvoker for BedrockInvoker {
    async fn invoke(&self, body: &Value) -> Result<Value> {
        let resp = self
            .client
            .invoke_model()
            .model_id(&self.model_id)
            .content_type("application/json")
            .accept("application/json")
            .body(Blob::new(serde_json::to_vec(body)?))
            .send()
            .await
            .map_err(|e| anyhow!("{}", e))?;
        Ok(serde_json::from_slice(resp.body().as_ref())?)
    }
}

pub struct BedrockAnalyzer {
    invoker: Arc<dyn ModelInvoker>,
    http: reqwest::Client,
    image_limit: usize,
}

impl BedrockAnalyzer {
    pub fn new(
        sdk_config: &aws_config::SdkConfig,
        model_id: impl Into<String>,
        image_limit: usize,
        download_timeout: Duration,
    ) -> Result<Self> {
        Self::with_invoker(
            Arc::new(BedrockInvoker::new(sdk_config, model_id)),
            image_limit,
            download_timeout,
        )
    }

    pub fn with_invoker(
        invoker: Arc<dyn ModelInvoker>,
        image_limit: usize,
        download_timeout: Duration,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(download_timeout)
            .build()?;
        Ok(Self {
            invoker,
            http,
            image_limit,
        })
    }

    async fn encode_image(&self, url: &str) -> Result<EncodedImage> {
        let image = download_image(&self.http, url).await?;
        prepare_for_model(&image.bytes)
    }
}

#[async_trait]
impl AccessibilityAnalyzer for BedrockAnalyzer {
    async fn analyze(&self, image_urls: &[String], listing_info: &str) -> AccessibilityReport {
        let subset = &image_urls[..self.image_limit.min(image_urls.len())];

        let mut images = Vec::with_capacity(subset.len());
        for (i, url) in subset.iter().enumerate() {
            info!("Downloading image {}/{} for analysis...", i + 1, subset.len());
            match self.encode_image(url).await {
                Ok(img) => images.push(img),
                Err(e) => warn!("Skipping {} for analysis: {}", url, e),
            }
        }

        if images.is_empty() {
            return AccessibilityReport::failed("No images could be downloaded for analysis.");
        }

        let body = build_request_body(&images, listing_info);
        match self.invoker.invoke(&body).await {
            Ok(response) => report_from_response(&response),
            Err(e) => {
                warn!("Bedrock analysis error: {}", e);
                AccessibilityReport::failed(format!("Analysis failed: {}", e))
            }
        }
    }
}
