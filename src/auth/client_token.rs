//! Caller tokens: `base64url(header).base64url(payload).base64url(hmac)`.
//!
//! The gateway only checks the payload shape, the `[nbf, exp]` window and
//! the HMAC-SHA256 signature. `allowed_endpoints` is carried and
//! shape-checked but not matched against the request path.

use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use base64::{Engine as _, alphabet};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::Sha256;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

const BASE64_URL: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new()
        .with_encode_padding(false)
        .with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

const TOKEN_HEADER: &str = r#"{"alg":"HS256","typ":"JWT"}"#;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientTokenPayload {
    pub nbf: i64,
    pub exp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed_endpoints: Option<Vec<String>>,
}

impl ClientTokenPayload {
    pub fn new(nbf: i64, exp: i64) -> Self {
        Self {
            nbf,
            exp,
            note: None,
            allowed_endpoints: Some(vec![".*".to_string()]),
        }
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }

    pub fn with_allowed_endpoints(mut self, endpoints: Vec<String>) -> Self {
        self.allowed_endpoints = Some(endpoints);
        self
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ClientTokenError {
    #[error("token must have exactly three segments")]
    Malformed,
    #[error("token payload is not a valid claim set")]
    InvalidPayload,
    #[error("token is outside its validity window")]
    OutsideWindow,
    #[error("token signature does not match")]
    BadSignature,
    #[error("token expiry must be after its start")]
    InvalidWindow,
    #[error("invalid signing secret")]
    InvalidSecret,
}

pub fn validate_client_token(
    token: &str,
    secret: &str,
    now: i64,
) -> Result<ClientTokenPayload, ClientTokenError> {
    let parts: Vec<&str> = token.split('.').collect();
    let [header_b64, payload_b64, signature_b64] = parts.as_slice() else {
        return Err(ClientTokenError::Malformed);
    };

    let payload = decode_payload(payload_b64)?;
    if now < payload.nbf || now > payload.exp {
        return Err(ClientTokenError::OutsideWindow);
    }

    let signature = BASE64_URL
        .decode(signature_b64)
        .map_err(|_| ClientTokenError::BadSignature)?;
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| ClientTokenError::InvalidSecret)?;
    mac.update(header_b64.as_bytes());
    mac.update(b".");
    mac.update(payload_b64.as_bytes());
    mac.verify_slice(&signature)
        .map_err(|_| ClientTokenError::BadSignature)?;

    Ok(payload)
}

pub fn issue_client_token(
    secret: &str,
    payload: &ClientTokenPayload,
) -> Result<String, ClientTokenError> {
    if payload.exp <= payload.nbf {
        return Err(ClientTokenError::InvalidWindow);
    }
    let payload_json =
        serde_json::to_string(payload).map_err(|_| ClientTokenError::InvalidPayload)?;
    let unsigned = format!(
        "{}.{}",
        BASE64_URL.encode(TOKEN_HEADER),
        BASE64_URL.encode(payload_json)
    );

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| ClientTokenError::InvalidSecret)?;
    mac.update(unsigned.as_bytes());
    let signature = mac.finalize().into_bytes();
    Ok(format!("{unsigned}.{}", BASE64_URL.encode(signature)))
}

fn decode_payload(payload_b64: &str) -> Result<ClientTokenPayload, ClientTokenError> {
    let raw = BASE64_URL
        .decode(payload_b64)
        .map_err(|_| ClientTokenError::InvalidPayload)?;
    let value: Value =
        serde_json::from_slice(&raw).map_err(|_| ClientTokenError::InvalidPayload)?;
    let obj = value.as_object().ok_or(ClientTokenError::InvalidPayload)?;

    // Fractional bounds are narrowed to the whole seconds they admit.
    let nbf = timestamp_claim(obj.get("nbf"), f64::ceil)?;
    let exp = timestamp_claim(obj.get("exp"), f64::floor)?;

    let allowed_endpoints = match obj.get("allowed_endpoints") {
        None => None,
        Some(Value::Array(items)) => Some(
            items
                .iter()
                .map(|item| item.as_str().map(str::to_string))
                .collect::<Option<Vec<_>>>()
                .ok_or(ClientTokenError::InvalidPayload)?,
        ),
        Some(_) => return Err(ClientTokenError::InvalidPayload),
    };
    let note = obj.get("note").and_then(Value::as_str).map(str::to_string);

    Ok(ClientTokenPayload {
        nbf,
        exp,
        note,
        allowed_endpoints,
    })
}

fn timestamp_claim(value: Option<&Value>, round: fn(f64) -> f64) -> Result<i64, ClientTokenError> {
    let number = value
        .and_then(Value::as_f64)
        .ok_or(ClientTokenError::InvalidPayload)?;
    // A zero timestamp is treated as absent.
    if number == 0.0 {
        return Err(ClientTokenError::InvalidPayload);
    }
    Ok(round(number) as i64)
}
