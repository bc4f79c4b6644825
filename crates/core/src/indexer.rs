use crate::chunking::{build_file_chunks, ChunkingConfig};
use crate::extractor::TextExtractor;
use crate::ingest::{discover_source_files, read_source_file};
use crate::models::Chunk;
use crate::store::{Index, IndexStore};
use crate::traits::{EmbeddingProvider, OcrService};
use crate::{BuildError, IndexError};
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

/// Texts sent to the embedding provider per request.
pub const DEFAULT_EMBED_BATCH_SIZE: usize = 64;

#[derive(Debug, Clone)]
pub struct SkippedFile {
    pub path: PathBuf,
    pub reason: String,
}

#[derive(Debug, Clone)]
pub struct BuildReport {
    pub index: Index,
    pub files_indexed: Vec<String>,
    pub skipped_files: Vec<SkippedFile>,
}

/// Extract, chunk, embed and persist a corpus folder as one index.
pub struct Indexer<'a, O, E> {
    extractor: &'a TextExtractor<O>,
    embedder: &'a E,
    store: &'a IndexStore,
    chunking: ChunkingConfig,
    batch_size: usize,
}

impl<'a, O, E> Indexer<'a, O, E>
where
    O: OcrService + Send + Sync,
    E: EmbeddingProvider + Send + Sync,
{
    pub fn new(
        extractor: &'a TextExtractor<O>,
        embedder: &'a E,
        store: &'a IndexStore,
        chunking: ChunkingConfig,
    ) -> Self {
        Self {
            extractor,
            embedder,
            store,
            chunking,
            batch_size: DEFAULT_EMBED_BATCH_SIZE,
        }
    }

    /// Zero is treated as one.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub async fn build_index(&self, corpus_dir: &Path) -> bool {
        match self.try_build_index(corpus_dir).await {
            Ok(_) => true,
            Err(error) => {
                error!(corpus = %corpus_dir.display(), error = %error, "index build failed");
                false
            }
        }
    }

    /// Nothing is written unless every step succeeds and at least one chunk
    /// was produced.
    pub async fn try_build_index(&self, corpus_dir: &Path) -> Result<BuildReport, BuildError> {
        self.chunking.validate()?;
        let files = discover_source_files(corpus_dir)?;
        info!(corpus = %corpus_dir.display(), files = files.len(), "building index");

        let mut chunks: Vec<Chunk> = Vec::new();
        let mut files_indexed = Vec::new();
        let mut skipped_files = Vec::new();

        for path in files {
            let source = match read_source_file(&path) {
                Ok(source) => source,
                Err(error) => {
                    warn!(path = %path.display(), error = %error, "skipping unreadable file");
                    skipped_files.push(SkippedFile {
                        path,
                        reason: error.to_string(),
                    });
                    continue;
                }
            };

            let extracted = self.extractor.extract(&source).await;
            if extracted.is_empty() {
                warn!(file = %source.name, "no text extracted, skipping");
                skipped_files.push(SkippedFile {
                    path,
                    reason: "no text extracted".to_string(),
                });
                continue;
            }

            let file_chunks =
                build_file_chunks(&source.name, source.file_type, &extracted, self.chunking)?;
            info!(file = %source.name, chunks = file_chunks.len(), "file chunked");
            chunks.extend(file_chunks);
            files_indexed.push(source.name);
        }

        if chunks.is_empty() {
            return Err(BuildError::NoChunks(corpus_dir.display().to_string()));
        }

        let vectors = self.embed_chunks(&chunks).await?;

        let index = Index::build(self.embedder.model_id(), chunks, vectors).map_err(|error| match error {
            IndexError::Corrupt(details) => BuildError::Embedding(details),
            mismatch @ IndexError::DimensionMismatch { .. } => {
                BuildError::Embedding(mismatch.to_string())
            }
            other => BuildError::Store(other),
        })?;

        self.store.save(&index)?;
        info!(
            entries = index.len(),
            files = files_indexed.len(),
            skipped = skipped_files.len(),
            model = index.embedding_model(),
            "index built"
        );

        Ok(BuildReport {
            index,
            files_indexed,
            skipped_files,
        })
    }

    /// One provider request per batch, results concatenated in chunk order.
    async fn embed_chunks(&self, chunks: &[Chunk]) -> Result<Vec<Vec<f32>>, BuildError> {
        let texts = chunks.iter().map(|chunk| chunk.text.clone()).collect::<Vec<_>>();
        let mut vectors = Vec::with_capacity(texts.len());

        for (batch_number, batch) in texts.chunks(self.batch_size).enumerate() {
            let embedded = self
                .embedder
                .embed_batch(batch)
                .await
                .map_err(|error| BuildError::Embedding(error.to_string()))?;
            if embedded.len() != batch.len() {
                return Err(BuildError::Embedding(format!(
                    "batch {batch_number} returned {} embeddings for {} texts",
                    embedded.len(),
                    batch.len()
                )));
            }
            debug!(batch = batch_number, size = batch.len(), "batch embedded");
            vectors.extend(embedded);
        }

        Ok(vectors)
    }

    /// Drops the existing artifacts before building from scratch.
    pub async fn force_rebuild(&self, corpus_dir: &Path) -> Result<BuildReport, BuildError> {
        self.store.remove()?;
        info!(dir = %self.store.dir().display(), "index artifacts removed, rebuilding");
        self.try_build_index(corpus_dir).await
    }
}
