use crate::config::Config;
use crate::language::Language;
use anyhow::Context;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Separator between the three fields of a Dify answer
pub const ANSWER_SEPARATOR: &str = "&!&!&!&!&!";

/// A provider translation with its moderation verdict
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderTranslation {
    pub translation: String,
    pub moderation_status: i64,
    pub moderation_rationale: String,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    /// The provider answered but the answer could not be parsed
    #[error("{0}")]
    Malformed(String),

    /// Network failure or non-success status
    #[error("{0}")]
    Unavailable(String),
}

/// External translation service
#[async_trait]
pub trait TranslationProvider: Send + Sync {
    async fn translate(
        &self,
        text: &str,
        target_language: &Language,
    ) -> Result<ProviderTranslation, ProviderError>;
}

/// Dify chat-messages request
#[derive(Debug, Serialize)]
struct ChatMessageRequest<'a> {
    inputs: Inputs<'a>,
    query: &'a str,
    response_mode: &'a str,
    conversation_id: &'a str,
    user: &'a str,
}

#[derive(Debug, Serialize)]
struct Inputs<'a> {
    text: &'a str,
    target_language: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatMessageResponse {
    answer: Option<String>,
}

/// Split a Dify answer into translation, moderation status and rationale.
///
/// The answer must carry exactly three separator-delimited fields.
pub fn parse_answer(raw: &str) -> Result<ProviderTranslation, ProviderError> {
    let parts: Vec<&str> = raw.split(ANSWER_SEPARATOR).collect();
    if parts.len() != 3 {
        return Err(ProviderError::Malformed(format!(
            "expected 3 fields, got {}: {:?}",
            parts.len(),
            raw
        )));
    }

    let moderation_status = parts[1].trim().parse::<i64>().map_err(|e| {
        ProviderError::Malformed(format!(
            "moderation status {:?} is not an integer: {}",
            parts[1].trim(),
            e
        ))
    })?;

    Ok(ProviderTranslation {
        translation: parts[0].trim().to_string(),
        moderation_status,
        moderation_rationale: parts[2].trim().to_string(),
    })
}

/// Dify-hosted translation workflow
pub struct DifyProvider {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
    user: String,
}

impl DifyProvider {
    /// Fails when `DIFY_API_KEY` is not configured
    pub fn new(config: &Config) -> anyhow::Result<Self> {
        let api_key = config
            .dify_api_key
            .clone()
            .context("DIFY_API_KEY not set")?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.provider_timeout_secs))
            .build()?;

        Ok(Self {
            client,
            api_url: config.dify_api_url.trim_end_matches('/').to_string(),
            api_key,
            user: config.dify_user.clone(),
        })
    }
}

#[async_trait]
impl TranslationProvider for DifyProvider {
    async fn translate(
        &self,
        text: &str,
        target_language: &Language,
    ) -> Result<ProviderTranslation, ProviderError> {
        let request = ChatMessageRequest {
            inputs: Inputs {
                text,
                target_language: target_language.as_str(),
            },
            query: "f",
            response_mode: "blocking",
            conversation_id: "",
            user: &self.user,
        };

        let response = self
            .client
            .post(format!("{}/chat-messages", self.api_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| ProviderError::Unavailable(format!("request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response
                .text()
                .await
                .unwrap_or_else(|e| format!("<failed to read body: {}>", e));
            return Err(ProviderError::Unavailable(format!(
                "Dify API error ({}): {}",
                status, body
            )));
        }

        let body: ChatMessageResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Malformed(format!("invalid JSON body: {}", e)))?;

        let answer = body
            .answer
            .ok_or_else(|| ProviderError::Malformed("response has no answer field".to_string()))?;
        debug!("Dify answer for {}: {:?}", target_language, answer);

        parse_answer(&answer)
    }
}
