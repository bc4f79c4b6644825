//! Fake collaborators shared by the unit tests.

use crate::embeddings::CharacterNgramEmbedder;
use crate::models::FileType;
use crate::synthesis::{Prompt, NOT_IN_CONTEXT};
use crate::traits::{EmbeddingProvider, LanguageModel, OcrOutput, OcrService};
use crate::ProviderError;
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// Treats the file bytes as the recognised text.
pub struct Utf8Ocr;

impl Utf8Ocr {
    pub const FAILURE_MARKER: &'static str = "#OCR-FAILURE#";
}

#[async_trait]
impl OcrService for Utf8Ocr {
    async fn analyze(&self, bytes: &[u8], _file_type: FileType) -> Result<OcrOutput, ProviderError> {
        let text = String::from_utf8_lossy(bytes).to_string();
        if text == Self::FAILURE_MARKER {
            return Err(ProviderError::BackendResponse {
                backend: "ocr".to_string(),
                details: "simulated outage".to_string(),
            });
        }
        Ok(OcrOutput {
            text,
            page_count: 1,
        })
    }
}

pub struct FailingEmbedder;

#[async_trait]
impl EmbeddingProvider for FailingEmbedder {
    fn model_id(&self) -> &str {
        "failing"
    }

    async fn embed_batch(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        Err(ProviderError::BackendResponse {
            backend: "embeddings".to_string(),
            details: "503 Service Unavailable".to_string(),
        })
    }
}

/// Returns vectors whose length grows with their position.
pub struct RaggedEmbedder;

#[async_trait]
impl EmbeddingProvider for RaggedEmbedder {
    fn model_id(&self) -> &str {
        "ragged"
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        Ok((0..texts.len()).map(|position| vec![1.0; position + 1]).collect())
    }
}

/// Trigram embedder that remembers every batch it was asked for.
pub struct RecordingEmbedder {
    inner: CharacterNgramEmbedder,
    batches: Mutex<Vec<Vec<String>>>,
}

impl RecordingEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self {
            inner: CharacterNgramEmbedder::new(dimensions),
            batches: Mutex::new(Vec::new()),
        }
    }

    pub fn inner(&self) -> &CharacterNgramEmbedder {
        &self.inner
    }

    pub fn batches(&self) -> Vec<Vec<String>> {
        self.batches.lock().unwrap().clone()
    }
}

#[async_trait]
impl EmbeddingProvider for RecordingEmbedder {
    fn model_id(&self) -> &str {
        self.inner.model_id()
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        self.batches.lock().unwrap().push(texts.to_vec());
        Ok(texts.iter().map(|text| self.inner.embed_text(text)).collect())
    }
}

/// Maps every text to a fixed vector looked up by exact match; unknown
/// texts get the fallback vector.
pub struct TableEmbedder {
    pub table: Vec<(String, Vec<f32>)>,
    pub fallback: Vec<f32>,
}

#[async_trait]
impl EmbeddingProvider for TableEmbedder {
    fn model_id(&self) -> &str {
        "table"
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        Ok(texts
            .iter()
            .map(|text| {
                self.table
                    .iter()
                    .find(|(known, _)| known == text)
                    .map(|(_, vector)| vector.clone())
                    .unwrap_or_else(|| self.fallback.clone())
            })
            .collect())
    }
}

/// Answers with the first context sentence sharing a content word with the
/// question, or with the not-in-context sentence.
#[derive(Default)]
pub struct ExtractiveModel {
    pub calls: AtomicUsize,
}

impl ExtractiveModel {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

fn content_words(text: &str) -> Vec<String> {
    const STOP_WORDS: [&str; 8] = ["what", "when", "where", "which", "the", "who", "how", "does"];
    text.split(|c: char| !c.is_alphanumeric())
        .map(str::to_lowercase)
        .filter(|word| word.len() > 1 && !STOP_WORDS.contains(&word.as_str()))
        .collect()
}

#[async_trait]
impl LanguageModel for ExtractiveModel {
    async fn generate(&self, prompt: &Prompt) -> Result<String, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let context = prompt
            .user
            .split("<context>")
            .nth(1)
            .and_then(|rest| rest.split("</context>").next())
            .unwrap_or_default();
        let question = prompt
            .user
            .split("Question:")
            .nth(1)
            .map(|rest| rest.lines().next().unwrap_or_default())
            .unwrap_or_default();
        let wanted = content_words(question);

        let found = context
            .split_inclusive('.')
            .map(str::trim)
            .find(|sentence| content_words(sentence).iter().any(|word| wanted.contains(word)));

        Ok(found
            .map(str::to_string)
            .unwrap_or_else(|| NOT_IN_CONTEXT.to_string()))
    }
}

pub struct FailingModel;

#[async_trait]
impl LanguageModel for FailingModel {
    async fn generate(&self, _prompt: &Prompt) -> Result<String, ProviderError> {
        Err(ProviderError::BackendResponse {
            backend: "chat".to_string(),
            details: "429 Too Many Requests".to_string(),
        })
    }
}
