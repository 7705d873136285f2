use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, warn};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Pause between sequential calls in a batch. The public LibreTranslate
/// instances enforce a per-caller request-rate ceiling.
const INTER_CALL_DELAY: Duration = Duration::from_millis(100);

/// Number of leading batch entries logged at debug level.
const LOGGED_PREVIEW_COUNT: usize = 3;

/// Client for a LibreTranslate-compatible endpoint.
///
/// Translation failures are absorbed here: any transport error, non-success
/// status, or malformed response yields the original text unchanged. Callers
/// never see an error from this type.
#[derive(Debug, Clone)]
pub struct TranslationClient {
    http: reqwest::Client,
    endpoint: String,
}

#[derive(Debug, Deserialize)]
struct TranslateResponse {
    #[serde(rename = "translatedText")]
    translated_text: Option<String>,
}

impl TranslationClient {
    pub fn new(endpoint: impl Into<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .with_context(|| "failed to build translation http client")?;
        Ok(Self {
            http,
            endpoint: endpoint.into(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Translate one string. Whitespace-only input is returned as-is without
    /// a network call; any failure returns the input unchanged.
    pub async fn translate(&self, text: &str, source: &str, target: &str) -> String {
        if text.trim().is_empty() {
            return text.to_string();
        }

        let payload = json!({
            "q": text,
            "source": source,
            "target": target,
            "format": "text",
        });

        let response = match self.http.post(&self.endpoint).json(&payload).send().await {
            Ok(response) => response,
            Err(err) => {
                warn!(error = %err, "translation request failed, keeping original text");
                return text.to_string();
            }
        };

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(
                status = %status,
                body = %truncate(&body, 100),
                "translation api error, keeping original text"
            );
            return text.to_string();
        }

        match response.json::<TranslateResponse>().await {
            Ok(TranslateResponse {
                translated_text: Some(translated),
            }) => translated,
            Ok(_) => {
                warn!("translation response missing translatedText, keeping original text");
                text.to_string()
            }
            Err(err) => {
                warn!(error = %err, "malformed translation response, keeping original text");
                text.to_string()
            }
        }
    }

    /// Translate a batch of strings strictly sequentially, pausing between
    /// calls. The output has the same length and order as the input.
    pub async fn translate_batch(
        &self,
        texts: &[String],
        source: &str,
        target: &str,
    ) -> Vec<String> {
        let mut translated = Vec::with_capacity(texts.len());
        for (index, text) in texts.iter().enumerate() {
            if index > 0 {
                tokio::time::sleep(INTER_CALL_DELAY).await;
            }
            let result = self.translate(text, source, target).await;
            if index < LOGGED_PREVIEW_COUNT {
                debug!(
                    original = %truncate(text, 50),
                    translated = %truncate(&result, 50),
                    "translated region"
                );
            }
            translated.push(result);
        }
        translated
    }
}

fn truncate(text: &str, limit: usize) -> String {
    if text.chars().count() <= limit {
        text.to_string()
    } else {
        let prefix: String = text.chars().take(limit).collect();
        format!("{}...", prefix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> TranslationClient {
        // Port 9 (discard) refuses connections immediately.
        TranslationClient::new("http://127.0.0.1:9/translate").unwrap()
    }

    #[tokio::test]
    async fn whitespace_only_input_is_passed_through_untouched() {
        let client = client();
        assert_eq!(client.translate("   \t\n", "en", "hi").await, "   \t\n");
        assert_eq!(client.translate("", "en", "hi").await, "");
    }

    #[tokio::test]
    async fn network_failure_returns_original_text() {
        let client = client();
        let result = client.translate("Hello World", "en", "hi").await;
        assert_eq!(result, "Hello World");
    }

    #[tokio::test]
    async fn batch_preserves_length_and_order() {
        let client = client();
        let texts = vec!["one".to_string(), "  ".to_string(), "three".to_string()];
        let out = client.translate_batch(&texts, "en", "hi").await;
        assert_eq!(out, texts);
    }

    #[test]
    fn truncate_limits_long_previews() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("0123456789abc", 10), "0123456789...");
    }
}
