//! Typed errors for the library surface.
//!
//! The extraction core is deliberately forgiving: absent payloads, malformed
//! records and empty results are not errors. Only a missing page is.

use thiserror::Error;

/// Errors raised by the image extraction pipeline.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ExtractError {
    /// The markup handed to the pipeline was empty or whitespace only
    #[error("listing markup is empty")]
    EmptyMarkup,
}

/// Errors raised while fetching a listing page.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Transport failure, timeout or invalid URL
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// Server answered with a non-success status
    #[error("unexpected status {status} for {url}")]
    Status { url: String, status: u16 },

    /// Server answered but sent nothing usable
    #[error("empty response body for {url}")]
    EmptyBody { url: String },
}
