pub mod cache;
pub mod client;
pub mod finder;
pub mod ops;
pub mod types;

use thiserror::Error;

/// Page size used for every paginated provider listing.
pub const API_PAGE_SIZE: u32 = 20;

#[derive(Debug, Error)]
pub enum BillingError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("invalid API URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("API error ({status}): {body}")]
    Api {
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("file upload returned no upload parts for {file}")]
    MissingUploadPart { file: String },

    #[error("S3 upload failed ({status}): {body}")]
    Upload {
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("S3 upload returned no ETag")]
    MissingEtag,
}

pub type Result<T> = std::result::Result<T, BillingError>;
