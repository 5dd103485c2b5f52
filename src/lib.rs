//! Failover gateway for the Gemini API.
//!
//! Callers present one `x-goog-api-key`; the gateway forwards each request
//! to a pool of upstream credentials (Generative Language API keys or
//! Vertex AI service accounts), moving to the next credential whenever an
//! upstream answers with a 5xx or fails outright.

mod error;

pub mod auth;
pub mod credential;
pub mod env;
pub mod gateway;
pub mod store;
pub mod utils;

pub use credential::{ConfigData, Credential, KeyConfig, ServiceAccountKey};
pub use env::Env;
pub use error::{RelayError, Result};
