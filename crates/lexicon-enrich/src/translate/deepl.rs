use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use reqwest::StatusCode;
use reqwest::header::AUTHORIZATION;
use serde::{Deserialize, Serialize};

use super::provider::{ProviderError, TranslationProvider};
use crate::http;

/// DeepL `/v2/translate` client.
pub struct DeepLProvider {
    client: reqwest::Client,
    endpoint: String,
}

impl DeepLProvider {
    pub fn new(base_url: &str, api_key: &str, timeout: Duration) -> Result<Self> {
        anyhow::ensure!(!api_key.trim().is_empty(), "missing DeepL API key");
        let auth = (AUTHORIZATION, format!("DeepL-Auth-Key {}", api_key.trim()));
        Ok(Self {
            client: http::json_client(timeout, Some(auth), "DeepL")?,
            endpoint: http::endpoint(base_url, "v2/translate"),
        })
    }
}

#[async_trait]
impl TranslationProvider for DeepLProvider {
    fn name(&self) -> &str {
        "deepl"
    }

    async fn translate(
        &self,
        texts: &[String],
        source: &str,
        target: &str,
    ) -> Result<Vec<String>, ProviderError> {
        let request = DeepLRequest {
            text: texts,
            source_lang: source.to_ascii_uppercase(),
            target_lang: target.to_ascii_uppercase(),
        };
        let resp = self.client.post(&self.endpoint).json(&request).send().await?;
        let status = resp.status();
        // 456: character quota exhausted.
        if status == StatusCode::TOO_MANY_REQUESTS || status.as_u16() == 456 {
            return Err(ProviderError::RateLimited);
        }
        if !status.is_success() {
            return Err(ProviderError::Unavailable(format!(
                "DeepL returned {status}: {}",
                http::error_body(resp).await
            )));
        }

        let parsed: DeepLResponse = resp
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;
        Ok(parsed.translations.into_iter().map(|t| t.text).collect())
    }
}

#[derive(Serialize)]
struct DeepLRequest<'a> {
    text: &'a [String],
    source_lang: String,
    target_lang: String,
}

#[derive(Debug, Deserialize)]
struct DeepLResponse {
    translations: Vec<DeepLTranslation>,
}

#[derive(Debug, Deserialize)]
struct DeepLTranslation {
    text: String,
}
