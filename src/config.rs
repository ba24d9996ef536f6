use std::env;
use std::time::Duration;

use crate::extract::CanonicalRules;

/// Runtime settings, read once at startup.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub port: u16,
    pub static_dir: String,
    pub allowed_url_prefix: String,
    pub s3_bucket: String,
    pub aws_region: String,
    pub bedrock_model_id: String,
    pub analysis_image_limit: usize,
    pub fetch_timeout: Duration,
    pub image_timeout: Duration,
    /// Overrides the built-in list of query params dropped by canonicalization
    pub canonical_strip_params: Option<Vec<String>>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: 5000,
            static_dir: "static".to_string(),
            allowed_url_prefix: "https://www.zillow.com/".to_string(),
            s3_bucket: "listing-images".to_string(),
            aws_region: "us-east-1".to_string(),
            bedrock_model_id: "anthropic.claude-3-sonnet-20240229-v1:0".to_string(),
            analysis_image_limit: 10,
            fetch_timeout: Duration::from_secs(30),
            image_timeout: Duration::from_secs(10),
            canonical_strip_params: None,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from any key lookup; unset or unparseable values keep defaults,
    /// as do zero timeouts.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let string = |key: &str, default: String| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .unwrap_or(default)
        };
        let number = |key: &str| lookup(key).and_then(|v| v.trim().parse::<u64>().ok());
        // A zero timeout fails every request, so it counts as unset
        let seconds = |key: &str| number(key).filter(|n| *n > 0).map(Duration::from_secs);

        Self {
            port: lookup("PORT")
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(defaults.port),
            static_dir: string("STATIC_DIR", defaults.static_dir),
            allowed_url_prefix: string("ALLOWED_URL_PREFIX", defaults.allowed_url_prefix),
            s3_bucket: string("S3_BUCKET", defaults.s3_bucket),
            aws_region: string("AWS_REGION", defaults.aws_region),
            bedrock_model_id: string("BEDROCK_MODEL_ID", defaults.bedrock_model_id),
            analysis_image_limit: number("ANALYSIS_IMAGE_LIMIT")
                .map(|n| n as usize)
                .unwrap_or(defaults.analysis_image_limit),
            fetch_timeout: seconds("FETCH_TIMEOUT_SECS").unwrap_or(defaults.fetch_timeout),
            image_timeout: seconds("IMAGE_TIMEOUT_SECS").unwrap_or(defaults.image_timeout),
            canonical_strip_params: lookup("CANONICAL_STRIP_PARAMS").map(|v| {
                v.split(',')
                    .map(|p| p.trim().to_string())
                    .filter(|p| !p.is_empty())
                    .collect()
            }),
        }
    }

    pub fn canonical_rules(&self) -> CanonicalRules {
        match &self.canonical_strip_params {
            Some(params) => CanonicalRules::default().with_strip_params(params.iter().cloned()),
            None => CanonicalRules::default(),
        }
    }
}
