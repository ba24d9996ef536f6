//! Job bookkeeping for submitted listings.
//!
//! The store is an explicit value owned by the application state and handed
//! to handlers by reference; nothing here is process-global.

use std::collections::HashMap;
use std::sync::RwLock;

use chrono::Utc;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::analysis::AccessibilityReport;

static ZPID: Lazy<Regex> = Lazy::new(|| Regex::new(r"/(\d+)_zpid").unwrap());

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Processing,
    Completed,
    Error,
}

/// One submitted listing and everything produced for it.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ListingJob {
    pub job_id: String,
    pub url: String,
    pub status: JobStatus,
    /// RFC 3339
    pub started_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Deduplicated source image URLs, first-seen order
    pub images: Vec<String>,
    pub s3_urls: Vec<String>,
    pub upload_success: usize,
    pub upload_total: usize,
    pub accessibility_analysis: Option<AccessibilityReport>,
    pub error: Option<String>,
}

impl ListingJob {
    pub fn new(job_id: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            job_id: job_id.into(),
            url: url.into(),
            status: JobStatus::Processing,
            started_at: Utc::now().to_rfc3339(),
            message: None,
            images: Vec::new(),
            s3_urls: Vec::new(),
            upload_success: 0,
            upload_total: 0,
            accessibility_analysis: None,
            error: None,
        }
    }

    /// Fold a finished run into the record.
    pub fn apply(&mut self, outcome: JobOutcome) {
        self.status = outcome.status;
        self.message = outcome.message;
        self.images = outcome.images;
        self.s3_urls = outcome.s3_urls;
        self.upload_success = outcome.upload_success;
        self.upload_total = outcome.upload_total;
        self.accessibility_analysis = outcome.accessibility_analysis;
        self.error = outcome.error;
    }
}

/// Result of processing one listing.
#[derive(Debug, Clone, PartialEq)]
pub struct JobOutcome {
    pub status: JobStatus,
    pub message: Option<String>,
    pub images: Vec<String>,
    pub s3_urls: Vec<String>,
    pub upload_success: usize,
    pub upload_total: usize,
    pub accessibility_analysis: Option<AccessibilityReport>,
    pub error: Option<String>,
}

impl JobOutcome {
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            status: JobStatus::Error,
            message: None,
            images: Vec::new(),
            s3_urls: Vec::new(),
            upload_success: 0,
            upload_total: 0,
            accessibility_analysis: None,
            error: Some(error.into()),
        }
    }

    pub fn completed(message: impl Into<String>) -> Self {
        Self {
            status: JobStatus::Completed,
            message: Some(message.into()),
            images: Vec::new(),
            s3_urls: Vec::new(),
            upload_success: 0,
            upload_total: 0,
            accessibility_analysis: None,
            error: None,
        }
    }
}

/// In-memory job table.
#[derive(Default)]
pub struct JobStore {
    jobs: RwLock<HashMap<String, ListingJob>>,
}

impl JobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, job: ListingJob) {
        if let Ok(mut jobs) = self.jobs.write() {
            jobs.insert(job.job_id.clone(), job);
        }
    }

    /// Apply an outcome; returns the updated record, or `None` for an unknown
    /// job.
    pub fn apply(&self, job_id: &str, outcome: JobOutcome) -> Option<ListingJob> {
        let mut jobs = self.jobs.write().ok()?;
        let job = jobs.get_mut(job_id)?;
        job.apply(outcome);
        Some(job.clone())
    }

    pub fn get(&self, job_id: &str) -> Option<ListingJob> {
        self.jobs.read().ok()?.get(job_id).cloned()
    }

    pub fn len(&self) -> usize {
        self.jobs.read().map(|jobs| jobs.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Job id for a listing URL: `zpid_{N}_{suffix}` when the URL names the
/// property, `listing_{suffix}` otherwise.
pub fn generate_listing_id(url: &str) -> String {
    let id = Uuid::new_v4().simple().to_string();
    let suffix = &id[..8];
    match ZPID.captures(url).and_then(|c| c.get(1)) {
        Some(zpid) => format!("zpid_{}_{}", zpid.as_str(), suffix),
        None => format!("listing_{}", suffix),
    }
}
