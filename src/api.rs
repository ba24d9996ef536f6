use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::info;
use utoipa::ToSchema;

use crate::analysis::AccessibilityAnalyzer;
use crate::config::AppConfig;
use crate::extract::CanonicalRules;
use crate::fetch::PageFetcher;
use crate::jobs::{generate_listing_id, JobStatus, JobStore, ListingJob};
use crate::storage::ImageStore;
use crate::worker;

/// Shared handler state. Collaborators sit behind traits so the service can
/// run against fakes.
pub struct AppState {
    pub jobs: JobStore,
    pub fetcher: Arc<dyn PageFetcher>,
    pub store: Arc<dyn ImageStore>,
    pub analyzer: Arc<dyn AccessibilityAnalyzer>,
    pub rules: CanonicalRules,
    pub config: AppConfig,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ProcessRequest {
    /// Listing page URL
    #[schema(example = "https://www.zillow.com/homedetails/123-Main-St/29384756_zpid/")]
    #[serde(default)]
    pub url: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ProcessResponse {
    pub job_id: String,
    pub status: JobStatus,
    pub message: String,
    pub image_count: usize,
    pub s3_urls: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct JobStatusResponse {
    pub job_id: String,
    pub status: JobStatus,
    pub url: String,
    pub started_at: String,
    pub image_count: usize,
    pub s3_urls: Vec<String>,
    pub error: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
}

/// JSON error with a status code.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    fn job_not_found() -> Self {
        Self::new(StatusCode::NOT_FOUND, "Job not found")
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(ErrorResponse {
                error: self.message,
            }),
        )
            .into_response()
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/process", post(process_url))
        .route("/status/:job_id", get(get_status))
        .route("/results/:job_id", get(get_results))
        .route("/gallery/:job_id", get(view_gallery))
        .with_state(state)
}

/// Submit a listing URL and process it
#[utoipa::path(
    post,
    path = "/process",
    request_body = ProcessRequest,
    responses(
        (status = 200, description = "Listing processed", body = ProcessResponse),
        (status = 400, description = "Missing or unsupported URL", body = ErrorResponse)
    ),
    tag = "listings"
)]
pub async fn process_url(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ProcessRequest>,
) -> Result<Json<ProcessResponse>, ApiError> {
    let url = req.url.trim();

    if url.is_empty() {
        return Err(ApiError::new(StatusCode::BAD_REQUEST, "URL is required"));
    }
    if !url.starts_with(&state.config.allowed_url_prefix) {
        return Err(ApiError::new(
            StatusCode::BAD_REQUEST,
            "Please provide a valid Zillow listing URL",
        ));
    }

    let job_id = generate_listing_id(url);
    info!("📥 New listing job {} for {}", job_id, url);
    state.jobs.insert(ListingJob::new(job_id.clone(), url));

    let outcome = worker::process_listing(&state, &job_id, url).await;
    let job = state
        .jobs
        .apply(&job_id, outcome)
        .ok_or_else(ApiError::job_not_found)?;

    Ok(Json(ProcessResponse {
        job_id: job.job_id,
        status: job.status,
        message: job
            .message
            .or(job.error)
            .unwrap_or_else(|| "Processing completed".to_string()),
        image_count: job.images.len(),
        s3_urls: job.s3_urls,
    }))
}

/// Get the status of a processing job
#[utoipa::path(
    get,
    path = "/status/{job_id}",
    params(("job_id" = String, Path, description = "Job identifier")),
    responses(
        (status = 200, description = "Job status", body = JobStatusResponse),
        (status = 404, description = "Unknown job", body = ErrorResponse)
    ),
    tag = "listings"
)]
pub async fn get_status(
    State(state): State<Arc<AppState>>,
    Path(job_id): Path<String>,
) -> Result<Json<JobStatusResponse>, ApiError> {
    let job = state.jobs.get(&job_id).ok_or_else(ApiError::job_not_found)?;

    Ok(Json(JobStatusResponse {
        job_id: job.job_id,
        status: job.status,
        url: job.url,
        started_at: job.started_at,
        image_count: job.images.len(),
        s3_urls: job.s3_urls,
        error: job.error,
    }))
}

/// Get the full record of a job
#[utoipa::path(
    get,
    path = "/results/{job_id}",
    params(("job_id" = String, Path, description = "Job identifier")),
    responses(
        (status = 200, description = "Full job record", body = ListingJob),
        (status = 404, description = "Unknown job", body = ErrorResponse)
    ),
    tag = "listings"
)]
pub async fn get_results(
    State(state): State<Arc<AppState>>,
    Path(job_id): Path<String>,
) -> Result<Json<ListingJob>, ApiError> {
    state
        .jobs
        .get(&job_id)
        .map(Json)
        .ok_or_else(ApiError::job_not_found)
}

/// HTML gallery of the stored images of a completed job
pub async fn view_gallery(
    State(state): State<Arc<AppState>>,
    Path(job_id): Path<String>,
) -> (StatusCode, Html<String>) {
    let Some(job) = state.jobs.get(&job_id) else {
        return (StatusCode::NOT_FOUND, Html(error_page("Job not found")));
    };
    if job.status != JobStatus::Completed {
        return (StatusCode::BAD_REQUEST, Html(error_page("Job not completed yet")));
    }
    (StatusCode::OK, Html(gallery_page(&job)))
}

fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

fn error_page(message: &str) -> String {
    format!(
        "<!DOCTYPE html><html><head><meta charset=\"utf-8\"><title>Error</title></head>\
         <body><h1>Error</h1><p>{}</p><a href=\"/\">Back</a></body></html>",
        escape_html(message)
    )
}

fn gallery_page(job: &ListingJob) -> String {
    let figures: String = job
        .s3_urls
        .iter()
        .enumerate()
        .map(|(i, src)| {
            format!(
                "<figure><img src=\"{}\" alt=\"Listing photo {}\" loading=\"lazy\"></figure>",
                escape_html(src),
                i + 1
            )
        })
        .collect();

    let score = job
        .accessibility_analysis
        .as_ref()
        .map(|r| format!("<p>Accessibility score: {}/100</p>", r.overall_score))
        .unwrap_or_default();

    format!(
        "<!DOCTYPE html><html><head><meta charset=\"utf-8\"><title>Gallery {id}</title></head>\
         <body><h1>Listing gallery</h1><p><a href=\"{url}\">{url}</a></p>{score}\
         <p>{count} images</p><section class=\"gallery\">{figures}</section></body></html>",
        id = escape_html(&job.job_id),
        url = escape_html(&job.url),
        score = score,
        count = job.s3_urls.len(),
        figures = figures,
    )
}
