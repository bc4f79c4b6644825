use crate::chunking::ChunkingConfig;
use crate::disambiguation::{choose, SelectionChannel, SelectionMode};
use crate::extractor::TextExtractor;
use crate::indexer::{BuildReport, Indexer, DEFAULT_EMBED_BATCH_SIZE};
use crate::models::{IndexStats, QueryOutcome, RetrievalResult};
use crate::retrieval::{Retriever, DEFAULT_TOP_K};
use crate::store::{Index, IndexStore};
use crate::synthesis::AnswerSynthesizer;
use crate::traits::{EmbeddingProvider, LanguageModel, OcrService};
use crate::BuildError;
use std::path::PathBuf;
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub corpus_dir: PathBuf,
    pub index_dir: PathBuf,
    pub chunking: ChunkingConfig,
    pub top_k: usize,
    pub embed_batch_size: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            corpus_dir: PathBuf::from("documents"),
            index_dir: PathBuf::from("documents"),
            chunking: ChunkingConfig::default(),
            top_k: DEFAULT_TOP_K,
            embed_batch_size: DEFAULT_EMBED_BATCH_SIZE,
        }
    }
}

/// Everything one question-answering session needs, passed explicitly.
/// Independent pipelines can live side by side in one process.
pub struct Pipeline<O, E, L> {
    config: PipelineConfig,
    extractor: TextExtractor<O>,
    embedder: E,
    model: L,
    store: IndexStore,
}

impl<O, E, L> Pipeline<O, E, L>
where
    O: OcrService + Send + Sync,
    E: EmbeddingProvider + Send + Sync,
    L: LanguageModel + Send + Sync,
{
    pub fn new(config: PipelineConfig, ocr: O, embedder: E, model: L) -> Self {
        let store = IndexStore::new(config.index_dir.clone());
        Self {
            config,
            extractor: TextExtractor::new(ocr),
            embedder,
            model,
            store,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn store(&self) -> &IndexStore {
        &self.store
    }

    pub fn indexer(&self) -> Indexer<'_, O, E> {
        Indexer::new(
            &self.extractor,
            &self.embedder,
            &self.store,
            self.config.chunking,
        )
        .with_batch_size(self.config.embed_batch_size)
    }

    pub fn retriever(&self) -> Retriever<'_, E> {
        Retriever::new(&self.embedder)
    }

    pub fn synthesizer(&self) -> AnswerSynthesizer<'_, L> {
        AnswerSynthesizer::new(&self.model)
    }

    /// Loads the persisted index, rebuilding it when it is missing,
    /// inconsistent, or was built with another embedding model.
    pub async fn ensure_index(&self) -> Result<Index, BuildError> {
        match self.store.load() {
            Ok(index) => match index.ensure_provider(self.embedder.model_id()) {
                Ok(()) => return Ok(index),
                Err(error) => warn!(error = %error, "index is stale, rebuilding"),
            },
            Err(error) if error.requires_rebuild() => {
                info!(reason = %error, "no usable index, building")
            }
            Err(error) => return Err(error.into()),
        }

        let report = self.indexer().try_build_index(&self.config.corpus_dir).await?;
        Ok(report.index)
    }

    pub async fn rebuild(&self) -> Result<BuildReport, BuildError> {
        self.indexer().force_rebuild(&self.config.corpus_dir).await
    }

    pub async fn stats(&self) -> Result<IndexStats, BuildError> {
        Ok(self.ensure_index().await?.stats())
    }

    pub async fn candidates(&self, index: &Index, question: &str) -> Vec<RetrievalResult> {
        self.retriever().search(index, question, self.config.top_k).await
    }

    /// Retrieve, pick one passage, answer from it.
    pub async fn ask<C>(
        &self,
        index: &Index,
        question: &str,
        mode: SelectionMode,
        channel: &mut C,
    ) -> QueryOutcome
    where
        C: SelectionChannel + ?Sized,
    {
        let results = self.candidates(index, question).await;
        if results.is_empty() {
            info!(question = %question, "no relevant passage found");
            return QueryOutcome::NoMatch;
        }

        let chosen = choose(&results, mode, channel);
        info!(
            file = %chosen.chunk.source_file,
            chunk = chosen.chunk.chunk_index,
            score = chosen.score,
            candidates = results.len(),
            "passage selected"
        );

        QueryOutcome::Answered(self.synthesizer().answer(question, &chosen.chunk).await)
    }
}
