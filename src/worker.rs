use tracing::{info, warn};

use crate::api::AppState;
use crate::extract;
use crate::jobs::JobOutcome;

/// Run one listing through fetch, extraction, upload and analysis.
///
/// Never fails: every problem ends up in the returned outcome.
pub async fn process_listing(state: &AppState, job_id: &str, url: &str) -> JobOutcome {
    info!("🚀 [Worker] Processing job {}: {}", job_id, url);

    // 1. Fetch
    let html = match state.fetcher.fetch_page(url).await {
        Ok(html) => html,
        Err(e) => {
            warn!("❌ [Worker] Fetch failed for {}: {}", url, e);
            return JobOutcome::failed(
                "Failed to fetch the page. Please check the URL and try again.",
            );
        }
    };

    // 2. Extract (structured payload first, then markup)
    let images = match extract::extract_image_urls_with(&html, &state.rules) {
        Ok(set) => set,
        Err(e) => return JobOutcome::failed(format!("Could not process this listing: {}", e)),
    };

    if images.is_empty() {
        info!("[Worker] Job {} found no images", job_id);
        return JobOutcome::completed("No images found on this listing.");
    }
    info!("🔍 [Worker] Job {} found {} unique images", job_id, images.len());

    // 3. Mirror to S3
    let upload = state.store.upload_images(job_id, images.as_slice()).await;

    // 4. Accessibility review of the bounded head of the list
    let subset = images.head(state.config.analysis_image_limit);
    info!("[Worker] Starting accessibility analysis for {} images...", subset.len());
    let listing_info = format!("Zillow listing: {}", url);
    let report = state.analyzer.analyze(subset, &listing_info).await;

    let mut outcome = JobOutcome::completed(format!(
        "Successfully processed {} images and completed accessibility analysis",
        images.len()
    ));
    outcome.images = images.into_vec();
    outcome.s3_urls = upload.s3_urls;
    outcome.upload_success = upload.success;
    outcome.upload_total = upload.total;
    outcome.accessibility_analysis = Some(report);

    info!("✅ [Worker] Job {} completed successfully!", job_id);
    outcome
}
