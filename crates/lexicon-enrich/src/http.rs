use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::Client;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};

/// JSON client with `auth` (header name and value) sent on every request.
pub(crate) fn json_client(
    timeout: Duration,
    auth: Option<(HeaderName, String)>,
    service: &str,
) -> Result<Client> {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    if let Some((name, value)) = auth {
        let mut value = HeaderValue::from_str(value.trim())
            .with_context(|| format!("invalid {service} API key"))?;
        value.set_sensitive(true);
        headers.insert(name, value);
    }
    Client::builder()
        .timeout(timeout)
        .default_headers(headers)
        .build()
        .with_context(|| format!("failed to build {service} HTTP client"))
}

/// `base` joined with `path`, tolerating a trailing slash on `base`.
pub(crate) fn endpoint(base: &str, path: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
}

/// Response body for error messages, truncated.
pub(crate) async fn error_body(resp: reqwest::Response) -> String {
    const MAX: usize = 512;
    let mut text = resp
        .text()
        .await
        .unwrap_or_else(|_| "<body unavailable>".to_string());
    if text.len() > MAX {
        let mut cut = MAX;
        while !text.is_char_boundary(cut) {
            cut -= 1;
        }
        text.truncate(cut);
    }
    text
}
