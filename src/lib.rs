pub mod analysis;
pub mod api;
pub mod config;
pub mod error;
pub mod extract;
pub mod fetch;
pub mod jobs;
pub mod storage;
pub mod worker;

#[cfg(test)]
mod testing;

pub use error::{ExtractError, FetchError};
pub use extract::{extract_image_urls, extract_image_urls_with, CanonicalRules, ImageUrlSet};
