use crate::models::FileType;
use crate::synthesis::Prompt;
use crate::ProviderError;
use async_trait::async_trait;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OcrOutput {
    pub text: String,
    pub page_count: u32,
}

#[async_trait]
pub trait OcrService {
    async fn analyze(&self, bytes: &[u8], file_type: FileType) -> Result<OcrOutput, ProviderError>;
}

/// Vectors from different models are not comparable, so `model_id` is
/// stamped into every persisted index.
#[async_trait]
pub trait EmbeddingProvider {
    fn model_id(&self) -> &str;

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError>;

    async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        let mut vectors = self.embed_batch(&[text.to_string()]).await?;
        vectors.pop().ok_or_else(|| ProviderError::BackendResponse {
            backend: self.model_id().to_string(),
            details: "no embedding returned".to_string(),
        })
    }
}

#[async_trait]
pub trait LanguageModel {
    async fn generate(&self, prompt: &Prompt) -> Result<String, ProviderError>;
}

#[async_trait]
impl<T> OcrService for Box<T>
where
    T: OcrService + Send + Sync + ?Sized,
{
    async fn analyze(&self, bytes: &[u8], file_type: FileType) -> Result<OcrOutput, ProviderError> {
        (**self).analyze(bytes, file_type).await
    }
}

#[async_trait]
impl<T> EmbeddingProvider for Box<T>
where
    T: EmbeddingProvider + Send + Sync + ?Sized,
{
    fn model_id(&self) -> &str {
        (**self).model_id()
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        (**self).embed_batch(texts).await
    }
}

#[async_trait]
impl<T> LanguageModel for Box<T>
where
    T: LanguageModel + Send + Sync + ?Sized,
{
    async fn generate(&self, prompt: &Prompt) -> Result<String, ProviderError> {
        (**self).generate(prompt).await
    }
}
