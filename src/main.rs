use std::sync::Arc;

use aws_config::{BehaviorVersion, Region};
use axum::Router;
use dotenv::dotenv;
use tower_http::{services::ServeDir, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::EnvFilter;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use listing_scraper::{
    analysis::{AccessibilityReport, BedrockAnalyzer},
    api::{self, AppState},
    config::AppConfig,
    fetch::HttpFetcher,
    jobs::{JobStatus, JobStore, ListingJob},
    storage::S3ImageStore,
};

#[derive(OpenApi)]
#[openapi(
    paths(api::process_url, api::get_status, api::get_results),
    components(schemas(
        api::ProcessRequest,
        api::ProcessResponse,
        api::JobStatusResponse,
        api::ErrorResponse,
        ListingJob,
        JobStatus,
        AccessibilityReport
    )),
    tags((name = "listings", description = "Listing image extraction and accessibility review"))
)]
struct ApiDoc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("listing_scraper=info,tower_http=info")),
        )
        .init();

    let config = AppConfig::from_env();

    let sdk_config = aws_config::defaults(BehaviorVersion::latest())
        .region(Region::new(config.aws_region.clone()))
        .load()
        .await;

    let state = Arc::new(AppState {
        jobs: JobStore::new(),
        fetcher: Arc::new(HttpFetcher::new(config.fetch_timeout)?),
        store: Arc::new(S3ImageStore::new(
            &sdk_config,
            config.s3_bucket.clone(),
            config.aws_region.clone(),
            config.image_timeout,
        )?),
        analyzer: Arc::new(BedrockAnalyzer::new(
            &sdk_config,
            config.bedrock_model_id.clone(),
            config.analysis_image_limit,
            config.image_timeout,
        )?),
        rules: config.canonical_rules(),
        config: config.clone(),
    });

    let app = Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .merge(api::router(state))
        .fallback_service(ServeDir::new(&config.static_dir))
        .layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", config.port)).await?;
    info!("Listening on {}", listener.local_addr()?);
    axum::serve(listener, app).await?;

    Ok(())
}
