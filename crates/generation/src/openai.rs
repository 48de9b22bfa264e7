//! OpenAI-compatible chat completion and image generation over HTTP.

use async_trait::async_trait;
use fable_traits::{ImageGenerator, ImageRequest, ProviderError, TextGenerator, TextRequest};
use serde::Deserialize;
use serde_json::json;

pub const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";

#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    pub api_base: String,
    pub api_key: String,
    pub text_model: String,
    pub image_model: String,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            api_key: String::new(),
            text_model: "gpt-4o-mini".to_string(),
            image_model: "dall-e-3".to_string(),
        }
    }
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct ImagesResponse {
    #[serde(default)]
    data: Vec<ImageDatum>,
}

#[derive(Deserialize)]
struct ImageDatum {
    #[serde(default)]
    url: Option<String>,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
    #[serde(default)]
    code: Option<String>,
}

/// Maps a non-success response body to a [`ProviderError`].
///
/// Content-policy rejections are recognised by their error code so they are
/// never retried.
pub(crate) fn classify_error(status: u16, body: &str) -> ProviderError {
    match serde_json::from_str::<ErrorEnvelope>(body) {
        Ok(envelope) => {
            let code = envelope.error.code.unwrap_or_default();
            if code == "content_policy_violation"
                || envelope.error.message.contains("safety system")
            {
                ProviderError::ContentPolicy(envelope.error.message)
            } else {
                ProviderError::Http {
                    status,
                    message: envelope.error.message,
                }
            }
        }
        Err(_) => ProviderError::Http {
            status,
            message: body.chars().take(200).collect(),
        },
    }
}

fn network_error(err: reqwest::Error) -> ProviderError {
    ProviderError::Network(err.to_string())
}

/// HTTP client for an OpenAI-compatible API. Implements both capabilities.
#[derive(Debug, Clone)]
pub struct OpenAiProvider {
    http: reqwest::Client,
    config: OpenAiConfig,
}

impl OpenAiProvider {
    pub fn new(config: OpenAiConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.config.api_base.trim_end_matches('/'), path)
    }

    async fn post(&self, path: &str, body: serde_json::Value) -> Result<String, ProviderError> {
        if self.config.api_key.trim().is_empty() {
            return Err(ProviderError::Unavailable("no API key configured".to_string()));
        }
        let response = self
            .http
            .post(self.endpoint(path))
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await
            .map_err(network_error)?;
        let status = response.status();
        let text = response.text().await.map_err(network_error)?;
        if !status.is_success() {
            return Err(classify_error(status.as_u16(), &text));
        }
        Ok(text)
    }
}

#[async_trait]
impl TextGenerator for OpenAiProvider {
    fn name(&self) -> &str {
        "openai"
    }

    async fn generate_text(&self, request: &TextRequest) -> Result<String, ProviderError> {
        let body = json!({
            "model": self.config.text_model,
            "messages": [
                { "role": "system", "content": request.system },
                { "role": "user", "content": request.prompt },
            ],
            "max_tokens": request.max_tokens,
            "temperature": request.temperature,
        });
        let raw = self.post("chat/completions", body).await?;
        let parsed: ChatResponse =
            serde_json::from_str(&raw).map_err(|e| ProviderError::Malformed(e.to_string()))?;
        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .ok_or_else(|| ProviderError::Malformed("response contained no text".to_string()))
    }
}

#[async_trait]
impl ImageGenerator for OpenAiProvider {
    fn name(&self) -> &str {
        "openai"
    }

    async fn generate_image(&self, request: &ImageRequest) -> Result<String, ProviderError> {
        let mut body = json!({
            "model": self.config.image_model,
            "prompt": request.prompt,
            "n": 1,
            "size": request.size.to_string(),
            "quality": request.quality,
        });
        if let Some(style) = &request.style {
            body["style"] = json!(style);
        }
        let raw = self.post("images/generations", body).await?;
        let parsed: ImagesResponse =
            serde_json::from_str(&raw).map_err(|e| ProviderError::Malformed(e.to_string()))?;
        parsed
            .data
            .into_iter()
            .next()
            .and_then(|d| d.url)
            .filter(|u| !u.trim().is_empty())
            .ok_or_else(|| ProviderError::Malformed("response contained no image URL".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_policy_code_is_permanent() {
        let body = r#"{"error":{"message":"Your request was rejected","code":"content_policy_violation"}}"#;
        let err = classify_error(400, body);
        assert!(matches!(err, ProviderError::ContentPolicy(_)));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_server_errors_stay_retryable() {
        let err = classify_error(503, r#"{"error":{"message":"overloaded"}}"#);
        assert_eq!(
            err,
            ProviderError::Http {
                status: 503,
                message: "overloaded".to_string()
            }
        );
        assert!(err.is_retryable());
        assert!(matches!(classify_error(502, "<html>bad gateway</html>"), ProviderError::Http { status: 502, .. }));
    }

    #[tokio::test]
    async fn test_missing_key_is_unavailable() {
        let provider = OpenAiProvider::new(OpenAiConfig::default());
        let request = TextRequest {
            system: String::new(),
            prompt: "hello".to_string(),
            max_tokens: 10,
            temperature: 0.7,
        };
        let err = provider.generate_text(&request).await.unwrap_err();
        assert!(matches!(err, ProviderError::Unavailable(_)));
    }

    #[test]
    fn test_endpoint_joins_base() {
        let provider = OpenAiProvider::new(OpenAiConfig {
            api_base: "http://localhost:9000/v1/".to_string(),
            ..OpenAiConfig::default()
        });
        assert_eq!(provider.endpoint("images/generations"), "http://localhost:9000/v1/images/generations");
    }
}
