use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use reqwest::StatusCode;
use reqwest::header::AUTHORIZATION;
use serde::{Deserialize, Serialize};

use super::provider::{ProviderError, TranslationProvider};
use crate::http;

const SYSTEM_ROLE: &str = "You are a translation tool.";

/// Translates through an OpenAI-compatible chat completion endpoint
/// (OpenRouter serving DeepSeek by default).
///
/// The model is asked for a JSON array of `{original, translation}` objects,
/// one per input text.
pub struct ChatCompletionProvider {
    client: reqwest::Client,
    endpoint: String,
    model: String,
}

impl ChatCompletionProvider {
    pub fn new(
        base_url: &str,
        api_key: &str,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let model = model.into();
        anyhow::ensure!(!api_key.trim().is_empty(), "missing chat completion API key");
        anyhow::ensure!(!model.trim().is_empty(), "missing chat completion model name");
        let auth = (AUTHORIZATION, format!("Bearer {}", api_key.trim()));
        Ok(Self {
            client: http::json_client(timeout, Some(auth), "chat completion")?,
            endpoint: http::endpoint(base_url, "chat/completions"),
            model,
        })
    }
}

#[async_trait]
impl TranslationProvider for ChatCompletionProvider {
    fn name(&self) -> &str {
        "openrouter"
    }

    async fn translate(
        &self,
        texts: &[String],
        source: &str,
        target: &str,
    ) -> Result<Vec<String>, ProviderError> {
        let prompt = build_prompt(texts, source, target)?;
        let body = ChatRequest {
            model: &self.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: SYSTEM_ROLE,
                },
                ChatMessage {
                    role: "user",
                    content: &prompt,
                },
            ],
        };
        let resp = self.client.post(&self.endpoint).json(&body).send().await?;
        let status = resp.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(ProviderError::RateLimited);
        }
        if !status.is_success() {
            return Err(ProviderError::Unavailable(format!(
                "chat completion returned {status}: {}",
                http::error_body(resp).await
            )));
        }

        let parsed: ChatResponse = resp
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;
        let content = parsed
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| ProviderError::InvalidResponse("no choices returned".to_string()))?;
        parse_translations(&content, texts.len())
    }
}

fn build_prompt(texts: &[String], source: &str, target: &str) -> Result<String, ProviderError> {
    let sentences = serde_json::to_string(texts)
        .map_err(|e| ProviderError::InvalidResponse(format!("encode prompt: {e}")))?;
    Ok(format!(
        "Translate the following {source} sentences into {target}. \
         Return the result strictly as a JSON array with one object per sentence, \
         in the same order, each with keys \"original\" and \"translation\", like:\n\
         [{{\"original\": \"...\", \"translation\": \"...\"}}, ...]\n\n\
         Sentences:\n{sentences}"
    ))
}

/// Pull the translation list out of the model's reply.
///
/// Reasoning preambles and code fences around the array are ignored.
fn parse_translations(content: &str, expected: usize) -> Result<Vec<String>, ProviderError> {
    let body = content
        .rfind("</think>")
        .map_or(content, |at| &content[at + "</think>".len()..]);
    let (Some(start), Some(end)) = (body.find('['), body.rfind(']')) else {
        return Err(ProviderError::InvalidResponse("reply holds no JSON array".to_string()));
    };
    if end < start {
        return Err(ProviderError::InvalidResponse("reply holds no JSON array".to_string()));
    }

    let items: Vec<ChatTranslation> = serde_json::from_str(&body[start..=end]).map_err(|e| {
        ProviderError::InvalidResponse(format!("reply is not a translation array: {e}"))
    })?;
    if items.len() != expected {
        return Err(ProviderError::InvalidResponse(format!(
            "reply has {} translations for {expected} texts",
            items.len()
        )));
    }
    Ok(items.into_iter().map(|item| item.translation).collect())
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: AssistantMessage,
}

#[derive(Debug, Deserialize)]
struct AssistantMessage {
    #[serde(default)]
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatTranslation {
    translation: String,
}
