use crate::error::IngestError;
use crate::models::{Chunk, ExtractedText, FileType};

pub const DEFAULT_CHUNK_SIZE: usize = 1_000;
pub const DEFAULT_CHUNK_OVERLAP: usize = 200;

/// Sizes are measured in characters (Unicode scalar values).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkingConfig {
    pub chunk_size: usize,
    pub overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            overlap: DEFAULT_CHUNK_OVERLAP,
        }
    }
}

impl ChunkingConfig {
    pub fn new(chunk_size: usize, overlap: usize) -> Result<Self, IngestError> {
        let config = Self {
            chunk_size,
            overlap,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), IngestError> {
        if self.chunk_size == 0 {
            return Err(IngestError::InvalidChunkConfig(
                "chunk size must be positive".to_string(),
            ));
        }
        if self.overlap >= self.chunk_size {
            return Err(IngestError::InvalidChunkConfig(format!(
                "overlap {} must be smaller than chunk size {}",
                self.overlap, self.chunk_size
            )));
        }
        Ok(())
    }
}

/// Cleans OCR output: unified line endings, collapsed horizontal whitespace,
/// trimmed lines and at most one blank line between paragraphs.
pub fn normalize_extracted_text(text: &str) -> String {
    let unified = text.replace("\r\n", "\n").replace('\r', "\n");
    let mut lines: Vec<String> = Vec::new();
    let mut previous_blank = true;

    for line in unified.split('\n') {
        let collapsed = line.split_whitespace().collect::<Vec<_>>().join(" ");
        if collapsed.is_empty() {
            if !previous_blank {
                lines.push(String::new());
            }
            previous_blank = true;
        } else {
            lines.push(collapsed);
            previous_blank = false;
        }
    }

    lines.join("\n").trim().to_string()
}

/// Fixed-size sliding window. Every passage but the last has exactly
/// `chunk_size` characters and successive passages share `overlap` characters.
pub fn split(text: &str, chunk_size: usize, overlap: usize) -> Result<Vec<String>, IngestError> {
    ChunkingConfig::new(chunk_size, overlap)?;

    let chars: Vec<char> = text.chars().collect();
    let mut passages = Vec::new();
    if chars.is_empty() {
        return Ok(passages);
    }

    let step = chunk_size - overlap;
    let mut start = 0;
    loop {
        let end = (start + chunk_size).min(chars.len());
        passages.push(chars[start..end].iter().collect());
        if end == chars.len() {
            break;
        }
        start += step;
    }

    Ok(passages)
}

/// Chunks one file's extracted text, numbering passages from 0.
pub fn build_file_chunks(
    source_file: &str,
    file_type: FileType,
    extracted: &ExtractedText,
    config: ChunkingConfig,
) -> Result<Vec<Chunk>, IngestError> {
    let passages = split(&extracted.text, config.chunk_size, config.overlap)?;

    Ok(passages
        .into_iter()
        .enumerate()
        .map(|(index, passage)| {
            Chunk::new(
                source_file,
                index as u32,
                passage,
                file_type,
                extracted.page_count,
            )
        })
        .collect())
}
