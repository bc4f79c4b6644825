use crate::synthesis::Prompt;
use crate::traits::{EmbeddingProvider, LanguageModel};
use crate::ProviderError;
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::Deserialize;
use serde_json::json;
use std::str::FromStr;
use std::time::Duration;
use url::Url;

pub const DEFAULT_TEMPERATURE: f32 = 0.3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ApiAuth {
    /// `Authorization: Bearer <key>` (OpenAI and most compatible servers).
    #[default]
    Bearer,
    /// `api-key: <key>` (Azure OpenAI deployments).
    AzureApiKey,
}

impl FromStr for ApiAuth {
    type Err = ProviderError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "bearer" | "openai" => Ok(ApiAuth::Bearer),
            "azure" | "api-key" | "api_key" => Ok(ApiAuth::AzureApiKey),
            other => Err(ProviderError::Config(format!("unknown auth style `{other}`"))),
        }
    }
}

/// `endpoint` is the full request URL, e.g. `https://api.openai.com/v1/embeddings`
/// or an Azure deployment URL including `api-version`.
#[derive(Debug, Clone)]
pub struct EndpointConfig {
    pub endpoint: String,
    pub model: String,
    pub api_key: Option<String>,
    pub auth: ApiAuth,
    pub timeout: Option<Duration>,
}

#[derive(Debug, Clone)]
struct HttpEndpoint {
    client: Client,
    url: Url,
    api_key: Option<String>,
    auth: ApiAuth,
}

impl HttpEndpoint {
    fn new(config: &EndpointConfig) -> Result<Self, ProviderError> {
        if config.model.trim().is_empty() {
            return Err(ProviderError::Config("model name is empty".to_string()));
        }

        let url = Url::parse(config.endpoint.trim())?;
        let mut builder = Client::builder();
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }

        Ok(Self {
            client: builder.build()?,
            url,
            api_key: config
                .api_key
                .as_ref()
                .map(|key| key.trim().to_string())
                .filter(|key| !key.is_empty()),
            auth: config.auth,
        })
    }

    fn post(&self) -> RequestBuilder {
        let request = self
            .client
            .post(self.url.clone())
            .header("content-type", "application/json");

        match (&self.api_key, self.auth) {
            (Some(key), ApiAuth::Bearer) => request.bearer_auth(key),
            (Some(key), ApiAuth::AzureApiKey) => request.header("api-key", key),
            (None, _) => request,
        }
    }
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingDatum>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingDatum {
    #[serde(default)]
    index: usize,
    embedding: Vec<f32>,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

pub struct OpenAiEmbeddings {
    endpoint: HttpEndpoint,
    model: String,
}

impl OpenAiEmbeddings {
    pub fn new(config: EndpointConfig) -> Result<Self, ProviderError> {
        Ok(Self {
            endpoint: HttpEndpoint::new(&config)?,
            model: config.model,
        })
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiEmbeddings {
    fn model_id(&self) -> &str {
        &self.model
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let response = self
            .endpoint
            .post()
            .json(&json!({ "model": self.model, "input": texts }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(ProviderError::BackendResponse {
                backend: "embeddings".to_string(),
                details: response.status().to_string(),
            });
        }

        let parsed: EmbeddingResponse = response.json().await?;
        ordered_embeddings(parsed, texts.len())
    }
}

fn ordered_embeddings(
    response: EmbeddingResponse,
    expected: usize,
) -> Result<Vec<Vec<f32>>, ProviderError> {
    if response.data.len() != expected {
        return Err(ProviderError::BackendResponse {
            backend: "embeddings".to_string(),
            details: format!("expected {expected} vectors, got {}", response.data.len()),
        });
    }

    let mut data = response.data;
    data.sort_by_key(|datum| datum.index);
    Ok(data.into_iter().map(|datum| datum.embedding).collect())
}

pub struct OpenAiChatModel {
    endpoint: HttpEndpoint,
    model: String,
    temperature: f32,
}

impl OpenAiChatModel {
    pub fn new(config: EndpointConfig) -> Result<Self, ProviderError> {
        Ok(Self {
            endpoint: HttpEndpoint::new(&config)?,
            model: config.model,
            temperature: DEFAULT_TEMPERATURE,
        })
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }
}

#[async_trait]
impl LanguageModel for OpenAiChatModel {
    async fn generate(&self, prompt: &Prompt) -> Result<String, ProviderError> {
        let response = self
            .endpoint
            .post()
            .json(&json!({
                "model": self.model,
                "temperature": self.temperature,
                "messages": [
                    { "role": "system", "content": prompt.system },
                    { "role": "user", "content": prompt.user },
                ],
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(ProviderError::BackendResponse {
                backend: "chat".to_string(),
                details: response.status().to_string(),
            });
        }

        let parsed: ChatResponse = response.json().await?;
        first_choice_text(parsed)
    }
}

fn first_choice_text(response: ChatResponse) -> Result<String, ProviderError> {
    response
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .map(|content| content.trim().to_string())
        .filter(|content| !content.is_empty())
        .ok_or_else(|| ProviderError::BackendResponse {
            backend: "chat".to_string(),
            details: "response has no message content".to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(endpoint: &str, model: &str) -> EndpointConfig {
        EndpointConfig {
            endpoint: endpoint.to_string(),
            model: model.to_string(),
            api_key: Some("  ".to_string()),
            auth: ApiAuth::Bearer,
            timeout: None,
        }
    }

    #[test]
    fn embeddings_are_reordered_by_index() {
        let response: EmbeddingResponse = serde_json::from_str(
            r#"{"data":[{"index":1,"embedding":[0.0,1.0]},{"index":0,"embedding":[1.0,0.0]}]}"#,
        )
        .unwrap();
        let vectors = ordered_embeddings(response, 2).unwrap();
        assert_eq!(vectors, vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
    }

    #[test]
    fn embedding_count_mismatch_is_rejected() {
        let response: EmbeddingResponse =
            serde_json::from_str(r#"{"data":[{"index":0,"embedding":[1.0]}]}"#).unwrap();
        assert!(ordered_embeddings(response, 3).is_err());
    }

    #[test]
    fn chat_content_is_trimmed() {
        let response: ChatResponse = serde_json::from_str(
            r#"{"choices":[{"message":{"role":"assistant","content":"  March 1.\n"}}]}"#,
        )
        .unwrap();
        assert_eq!(first_choice_text(response).unwrap(), "March 1.");
    }

    #[test]
    fn chat_without_content_is_an_error() {
        let response: ChatResponse =
            serde_json::from_str(r#"{"choices":[{"message":{"content":null}}]}"#).unwrap();
        assert!(first_choice_text(response).is_err());
        let response: ChatResponse = serde_json::from_str(r#"{"choices":[]}"#).unwrap();
        assert!(first_choice_text(response).is_err());
    }

    #[test]
    fn auth_style_parses_aliases() {
        assert_eq!("Azure".parse::<ApiAuth>().unwrap(), ApiAuth::AzureApiKey);
        assert_eq!("bearer".parse::<ApiAuth>().unwrap(), ApiAuth::Bearer);
        assert!("basic".parse::<ApiAuth>().is_err());
    }

    #[test]
    fn endpoint_validation() {
        assert!(OpenAiEmbeddings::new(config("not a url", "text-embedding-3-small")).is_err());
        assert!(OpenAiChatModel::new(config("https://api.openai.com/v1/chat/completions", " ")).is_err());

        let embeddings =
            OpenAiEmbeddings::new(config("https://api.openai.com/v1/embeddings", "text-embedding-3-small"))
                .unwrap();
        assert_eq!(embeddings.model_id(), "text-embedding-3-small");
        assert!(embeddings.endpoint.api_key.is_none());
    }
}
