use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    Pdf,
    Png,
    Jpg,
    Jpeg,
    Tiff,
    Tif,
}

impl FileType {
    pub const ALL: [FileType; 6] = [
        FileType::Pdf,
        FileType::Png,
        FileType::Jpg,
        FileType::Jpeg,
        FileType::Tiff,
        FileType::Tif,
    ];

    pub fn from_extension(extension: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| extension.eq_ignore_ascii_case(kind.as_str()))
    }

    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(Self::from_extension)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FileType::Pdf => "pdf",
            FileType::Png => "png",
            FileType::Jpg => "jpg",
            FileType::Jpeg => "jpeg",
            FileType::Tiff => "tiff",
            FileType::Tif => "tif",
        }
    }

    pub fn is_image(&self) -> bool {
        !matches!(self, FileType::Pdf)
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            FileType::Pdf => "application/pdf",
            FileType::Png => "image/png",
            FileType::Jpg | FileType::Jpeg => "image/jpeg",
            FileType::Tiff | FileType::Tif => "image/tiff",
        }
    }
}

impl fmt::Display for FileType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A discovered document, read fully into memory.
#[derive(Debug, Clone)]
pub struct SourceFile {
    pub path: PathBuf,
    pub name: String,
    pub file_type: FileType,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractedText {
    pub text: String,
    pub page_count: u32,
}

impl ExtractedText {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Chunk {
    pub source_file: String,
    pub chunk_index: u32,
    pub text: String,
    pub char_len: usize,
    pub file_type: FileType,
    pub page_count: u32,
}

impl Chunk {
    pub fn new(
        source_file: impl Into<String>,
        chunk_index: u32,
        text: String,
        file_type: FileType,
        page_count: u32,
    ) -> Self {
        let char_len = text.chars().count();
        Self {
            source_file: source_file.into(),
            chunk_index,
            text,
            char_len,
            file_type,
            page_count,
        }
    }

    pub fn entry_id(&self) -> String {
        format!("{}#{}", self.source_file, self.chunk_index)
    }

    /// First `max_chars` characters on a single line, for listings.
    pub fn preview(&self, max_chars: usize) -> String {
        let flattened = self.text.replace('\n', " ");
        let trimmed = flattened.trim();
        if trimmed.chars().count() <= max_chars {
            return trimmed.to_string();
        }
        let head: String = trimmed.chars().take(max_chars).collect();
        format!("{head}...")
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct IndexEntry {
    pub id: String,
    pub chunk: Chunk,
    pub vector: Vec<f32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexManifest {
    pub format_version: u32,
    pub build_id: String,
    pub embedding_model: String,
    pub dimensions: usize,
    pub entry_count: usize,
    pub created_at: DateTime<Utc>,
    pub vectors_sha256: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndexStats {
    pub entry_count: usize,
    pub unique_files: usize,
    pub file_types: Vec<FileType>,
    pub embedding_model: String,
    pub dimensions: usize,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RetrievalResult {
    pub chunk: Chunk,
    pub score: f32,
    pub rank: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnswerOutcome {
    Grounded,
    Failed,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Answer {
    pub question: String,
    pub source_file: String,
    pub chunk_index: u32,
    pub text: String,
    pub outcome: AnswerOutcome,
}

impl Answer {
    pub fn is_failed(&self) -> bool {
        self.outcome == AnswerOutcome::Failed
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum QueryOutcome {
    Answered(Answer),
    /// Nothing in the index matched, or the index is empty.
    NoMatch,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_type_matches_extension_case_insensitively() {
        assert_eq!(FileType::from_extension("PDF"), Some(FileType::Pdf));
        assert_eq!(FileType::from_extension("Jpeg"), Some(FileType::Jpeg));
        assert_eq!(
            FileType::from_path(Path::new("/scans/receipt.TIFF")),
            Some(FileType::Tiff)
        );
        assert_eq!(FileType::from_extension("docx"), None);
        assert_eq!(FileType::from_path(Path::new("README")), None);
    }

    #[test]
    fn chunk_counts_characters_not_bytes() {
        let chunk = Chunk::new("a.pdf", 0, "Ação".to_string(), FileType::Pdf, 1);
        assert_eq!(chunk.char_len, 4);
        assert_eq!(chunk.entry_id(), "a.pdf#0");
    }

    #[test]
    fn preview_flattens_and_truncates() {
        let chunk = Chunk::new("a.png", 3, "line one\nline two".to_string(), FileType::Png, 1);
        assert_eq!(chunk.preview(100), "line one line two");
        assert_eq!(chunk.preview(4), "line...");
    }
}
