pub mod cookie;
pub mod downloads;
pub mod inject;
pub mod middleware;
pub mod remote;
pub mod resolve;
pub mod routes;
pub mod session;
pub mod store;
pub mod templates;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServeError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("template error: {0}")]
    Template(String),

    #[error("HTML rewrite error: {0}")]
    Rewrite(String),

    #[error("content scan error: {0}")]
    Scan(String),
}

impl From<handlebars::RenderError> for ServeError {
    fn from(e: handlebars::RenderError) -> Self {
        ServeError::Template(e.to_string())
    }
}

impl From<handlebars::TemplateError> for ServeError {
    fn from(e: handlebars::TemplateError) -> Self {
        ServeError::Template(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ServeError>;
