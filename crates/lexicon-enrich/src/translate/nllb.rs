use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

use super::provider::{ProviderError, TranslationProvider};
use crate::http;

/// NLLB-200 code for an ISO 639-1 language code.
pub fn nllb_code(iso: &str) -> Option<&'static str> {
    Some(match iso {
        "de" => "deu_Latn",
        "ko" => "kor_Hang",
        "en" => "eng_Latn",
        "fr" => "fra_Latn",
        "es" => "spa_Latn",
        _ => return None,
    })
}

/// Client for a local NLLB translation service (`POST /translate`).
pub struct NllbProvider {
    client: reqwest::Client,
    endpoint: String,
}

impl NllbProvider {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: http::json_client(timeout, None, "NLLB")?,
            endpoint: http::endpoint(base_url, "translate"),
        })
    }
}

#[async_trait]
impl TranslationProvider for NllbProvider {
    fn name(&self) -> &str {
        "nllb"
    }

    async fn translate(
        &self,
        texts: &[String],
        source: &str,
        target: &str,
    ) -> Result<Vec<String>, ProviderError> {
        let code = |iso: &str| {
            nllb_code(iso).ok_or_else(|| {
                ProviderError::Unavailable(format!("language `{iso}` has no NLLB code"))
            })
        };
        let request = NllbRequest {
            texts,
            src_lang: code(source)?,
            tgt_lang: code(target)?,
        };

        let resp = self.client.post(&self.endpoint).json(&request).send().await?;
        let status = resp.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(ProviderError::RateLimited);
        }
        if !status.is_success() {
            return Err(ProviderError::Unavailable(format!(
                "NLLB returned {status}: {}",
                http::error_body(resp).await
            )));
        }
        let parsed: NllbResponse = resp
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;
        Ok(parsed.translations)
    }
}

#[derive(Serialize)]
struct NllbRequest<'a> {
    texts: &'a [String],
    src_lang: &'static str,
    tgt_lang: &'static str,
}

#[derive(Debug, Deserialize)]
struct NllbResponse {
    translations: Vec<String>,
}
