//! Inbound caller tokens and outbound service-account OAuth.

pub mod client_token;
pub mod service_account;

pub use client_token::{
    ClientTokenError, ClientTokenPayload, issue_client_token, validate_client_token,
};
pub use service_account::{AccessToken, ServiceAccountSigner, SignerError, sign_assertion};
