pub mod chunking;
pub mod disambiguation;
pub mod embeddings;
pub mod error;
pub mod extractor;
pub mod indexer;
pub mod ingest;
pub mod models;
pub mod pipeline;
pub mod providers;
pub mod retrieval;
pub mod store;
pub mod synthesis;
pub mod traits;

#[cfg(test)]
mod testing;

pub use chunking::{
    build_file_chunks, normalize_extracted_text, split, ChunkingConfig, DEFAULT_CHUNK_OVERLAP,
    DEFAULT_CHUNK_SIZE,
};
pub use disambiguation::{
    choose, parse_selection, ClosedChannel, InvalidSelection, Selection, SelectionChannel,
    SelectionInput, SelectionMode,
};
pub use embeddings::{cosine_similarity, CharacterNgramEmbedder, DEFAULT_EMBEDDING_DIMENSIONS};
pub use error::{BuildError, IndexError, IngestError, ProviderError};
pub use extractor::{FallbackOcr, HttpOcrService, OcrEndpointConfig, PdfTextLayer, TextExtractor};
pub use indexer::{BuildReport, Indexer, SkippedFile, DEFAULT_EMBED_BATCH_SIZE};
pub use ingest::{discover_source_files, read_source_file};
pub use models::{
    Answer, AnswerOutcome, Chunk, ExtractedText, FileType, IndexEntry, IndexManifest, IndexStats,
    QueryOutcome, RetrievalResult, SourceFile,
};
pub use pipeline::{Pipeline, PipelineConfig};
pub use providers::{ApiAuth, EndpointConfig, OpenAiChatModel, OpenAiEmbeddings, UnconfiguredModel};
pub use retrieval::{Retriever, DEFAULT_TOP_K};
pub use store::{Index, IndexStore, PASSAGES_FILE, VECTORS_FILE};
pub use synthesis::{build_prompt, AnswerSynthesizer, Prompt, NOT_IN_CONTEXT};
pub use traits::{EmbeddingProvider, LanguageModel, OcrOutput, OcrService};
