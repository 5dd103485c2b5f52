use axum::http::{HeaderMap, HeaderValue};
use reqwest::Url;

pub(crate) const CLIENT_KEY_HEADER: &str = "x-goog-api-key";
pub(crate) const AIG_METADATA_HEADER: &str = "cf-aig-metadata";

const STRIPPED_REQUEST_HEADERS: &[&str] = &[
    "host",
    CLIENT_KEY_HEADER,
    "content-length",
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "proxy-connection",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

const STRIPPED_RESPONSE_HEADERS: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-connection",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// Copy of the inbound headers minus the caller key, `host`,
/// `content-length` and hop-by-hop headers.
pub(crate) fn forward_headers(inbound: &HeaderMap) -> HeaderMap {
    let mut headers = inbound.clone();
    for name in STRIPPED_REQUEST_HEADERS {
        headers.remove(*name);
    }
    headers
}

pub(crate) fn sanitize_response_headers(headers: &mut HeaderMap) {
    for name in STRIPPED_RESPONSE_HEADERS {
        headers.remove(*name);
    }
}

/// Resolves `"." + path` against `base_url` and appends the inbound query.
///
/// A base with a path prefix keeps it only when it ends in `/`.
pub(crate) fn target_url(
    base_url: &str,
    path: &str,
    query: Option<&str>,
) -> Result<Url, String> {
    let base = Url::parse(base_url).map_err(|err| format!("invalid base url: {err}"))?;
    let mut url = base
        .join(&format!(".{path}"))
        .map_err(|err| format!("invalid upstream path: {err}"))?;
    url.set_query(query.filter(|query| !query.is_empty()));
    Ok(url)
}

pub(crate) fn aig_metadata(client_key: &str, server_key_hash: &str) -> Option<HeaderValue> {
    let value = serde_json::json!({
        "clientKey": client_key,
        "serverKeyHash": server_key_hash,
    });
    HeaderValue::from_str(&value.to_string()).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_url_resolves_relative_to_base() {
        let url = target_url(
            "https://generativelanguage.googleapis.com/",
            "/v1beta/models/gemini-pro:generateContent",
            Some("alt=sse"),
        )
        .unwrap();
        assert_eq!(
            url.as_str(),
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-pro:generateContent?alt=sse"
        );
    }

    #[test]
    fn target_url_keeps_base_prefix_only_with_trailing_slash() {
        let kept = target_url(
            "https://gateway.ai.cloudflare.com/v1/acct/gw/google-ai-studio/",
            "/v1beta/models",
            None,
        )
        .unwrap();
        assert_eq!(
            kept.as_str(),
            "https://gateway.ai.cloudflare.com/v1/acct/gw/google-ai-studio/v1beta/models"
        );

        let replaced = target_url("https://gw.example/prefix", "/v1beta/models", Some("")).unwrap();
        assert_eq!(replaced.as_str(), "https://gw.example/v1beta/models");
    }

    #[test]
    fn target_url_rejects_unparseable_base() {
        assert!(target_url("not a url", "/v1beta/models", None).is_err());
    }

    #[test]
    fn forward_headers_strips_credentials_and_hop_by_hop() {
        let mut inbound = HeaderMap::new();
        inbound.insert("host", HeaderValue::from_static("relay.example"));
        inbound.insert(CLIENT_KEY_HEADER, HeaderValue::from_static("caller-token"));
        inbound.insert("content-length", HeaderValue::from_static("12"));
        inbound.insert("connection", HeaderValue::from_static("keep-alive"));
        inbound.insert("content-type", HeaderValue::from_static("application/json"));
        inbound.insert("x-custom", HeaderValue::from_static("1"));

        let headers = forward_headers(&inbound);
        assert!(headers.get("host").is_none());
        assert!(headers.get(CLIENT_KEY_HEADER).is_none());
        assert!(headers.get("content-length").is_none());
        assert!(headers.get("connection").is_none());
        assert_eq!(headers.get("content-type").unwrap(), "application/json");
        assert_eq!(headers.get("x-custom").unwrap(), "1");
    }

    #[test]
    fn aig_metadata_is_compact_json() {
        let value = aig_metadata("tok", "abc123").unwrap();
        let parsed: serde_json::Value = serde_json::from_str(value.to_str().unwrap()).unwrap();
        assert_eq!(
            parsed,
            serde_json::json!({"clientKey": "tok", "serverKeyHash": "abc123"})
        );
    }
}
