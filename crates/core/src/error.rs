use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("path has no file name: {0}")]
    MissingFileName(String),

    #[error("unsupported file type: {0}")]
    UnsupportedFileType(String),

    #[error("invalid chunking config: {0}")]
    InvalidChunkConfig(String),

    #[error("corpus folder not found: {0}")]
    MissingCorpus(String),
}

/// Failure of an external collaborator (OCR, embeddings, language model).
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("invalid response from {backend}: {details}")]
    BackendResponse { backend: String, details: String },

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),

    #[error("serialize error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("pdf parse error: {0}")]
    PdfParse(String),

    #[error("provider misconfigured: {0}")]
    Config(String),
}

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("index artifacts missing in {0}")]
    Missing(String),

    #[error("index is corrupt: {0}")]
    Corrupt(String),

    #[error("index was built with embedding model `{indexed}` but `{active}` is configured")]
    ProviderMismatch { indexed: String, active: String },

    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialize error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl IndexError {
    /// Conditions that mean "no usable index here"; the pipeline rebuilds on these.
    pub fn requires_rebuild(&self) -> bool {
        matches!(
            self,
            IndexError::Missing(_) | IndexError::Corrupt(_) | IndexError::ProviderMismatch { .. }
        )
    }
}

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("no chunks produced from {0}")]
    NoChunks(String),

    #[error("embedding failed: {0}")]
    Embedding(String),

    #[error(transparent)]
    Ingest(#[from] IngestError),

    #[error(transparent)]
    Store(#[from] IndexError),
}
