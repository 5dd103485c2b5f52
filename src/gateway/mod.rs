//! The failover proxy and its HTTP surface.

use axum::http::StatusCode;
use thiserror::Error;

use crate::store::StoreError;

pub mod config;
mod failover;
pub mod http;
pub mod observability;
mod upstream;
pub mod vertex;

pub use config::{GatewaySettings, StorageSettings};
pub use failover::{
    Admission, AttemptError, CandidateOrder, ConfiguredOrder, DEFAULT_ATTEMPT_TIMEOUT,
    FailoverProxy, ProxyOutcome, ProxyRequest, RandomOrder, shuffle,
};
pub use http::{GatewayHttpState, router};
pub use vertex::{DEFAULT_VERTEX_LOCATION, PathRewriteError, rewrite_path_for_vertex_ai};

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("No API keys configured")]
    NoCredentials,
    #[error("Failed to load configuration")]
    Store(#[from] StoreError),
    #[error("Missing API key")]
    MissingClientKey,
    #[error("Invalid API key")]
    InvalidClientKey,
    #[error("All API keys failed")]
    Exhausted { last_error: String },
}

impl GatewayError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::MissingClientKey => StatusCode::BAD_REQUEST,
            Self::InvalidClientKey => StatusCode::FORBIDDEN,
            Self::NoCredentials | Self::Store(_) | Self::Exhausted { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Extra detail for the response body, if any.
    pub fn message(&self) -> Option<&str> {
        match self {
            Self::Exhausted { last_error } => Some(last_error),
            _ => None,
        }
    }
}
