//! On-disk index: a vector artifact and a passage artifact that are only
//! ever written and read as a pair.

use crate::models::{Chunk, IndexEntry, IndexManifest, IndexStats};
use crate::IndexError;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use uuid::Uuid;

pub const VECTORS_FILE: &str = "index.vectors.json";
pub const PASSAGES_FILE: &str = "index.passages.json";
pub const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq)]
pub struct Index {
    manifest: IndexManifest,
    entries: Vec<IndexEntry>,
}

impl Index {
    /// Pairs chunks with their vectors in insertion order. All vectors must
    /// share one dimensionality.
    pub fn build(
        embedding_model: impl Into<String>,
        chunks: Vec<Chunk>,
        vectors: Vec<Vec<f32>>,
    ) -> Result<Self, IndexError> {
        if chunks.len() != vectors.len() {
            return Err(IndexError::Corrupt(format!(
                "embedding count {} doesn't match chunk count {}",
                vectors.len(),
                chunks.len()
            )));
        }

        let dimensions = vectors.first().map(Vec::len).unwrap_or(0);
        if let Some(bad) = vectors.iter().find(|vector| vector.len() != dimensions) {
            return Err(IndexError::DimensionMismatch {
                expected: dimensions,
                actual: bad.len(),
            });
        }
        if !vectors.is_empty() && dimensions == 0 {
            return Err(IndexError::Corrupt("embeddings are empty".to_string()));
        }

        let entries = chunks
            .into_iter()
            .zip(vectors)
            .map(|(chunk, vector)| IndexEntry {
                id: chunk.entry_id(),
                chunk,
                vector,
            })
            .collect::<Vec<_>>();

        {
            let mut seen = BTreeSet::new();
            if let Some(duplicate) = entries.iter().find(|entry| !seen.insert(entry.id.as_str())) {
                return Err(IndexError::Corrupt(format!("duplicate entry id {}", duplicate.id)));
            }
        }

        Ok(Self {
            manifest: IndexManifest {
                format_version: FORMAT_VERSION,
                build_id: Uuid::new_v4().to_string(),
                embedding_model: embedding_model.into(),
                dimensions,
                entry_count: entries.len(),
                created_at: Utc::now(),
                vectors_sha256: String::new(),
            },
            entries,
        })
    }

    pub fn manifest(&self) -> &IndexManifest {
        &self.manifest
    }

    pub fn entries(&self) -> &[IndexEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn dimensions(&self) -> usize {
        self.manifest.dimensions
    }

    pub fn embedding_model(&self) -> &str {
        &self.manifest.embedding_model
    }

    pub fn get(&self, id: &str) -> Option<&IndexEntry> {
        self.entries.iter().find(|entry| entry.id == id)
    }

    /// Vectors from another model live in a different space; refuse them.
    pub fn ensure_provider(&self, model_id: &str) -> Result<(), IndexError> {
        if self.manifest.embedding_model != model_id {
            return Err(IndexError::ProviderMismatch {
                indexed: self.manifest.embedding_model.clone(),
                active: model_id.to_string(),
            });
        }
        Ok(())
    }

    pub fn stats(&self) -> IndexStats {
        let unique_files = self
            .entries
            .iter()
            .map(|entry| entry.chunk.source_file.as_str())
            .collect::<BTreeSet<_>>()
            .len();
        let file_types = self
            .entries
            .iter()
            .map(|entry| entry.chunk.file_type)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        IndexStats {
            entry_count: self.entries.len(),
            unique_files,
            file_types,
            embedding_model: self.manifest.embedding_model.clone(),
            dimensions: self.manifest.dimensions,
            created_at: self.manifest.created_at,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct VectorsArtifact {
    build_id: String,
    dimensions: usize,
    ids: Vec<String>,
    vectors: Vec<Vec<f32>>,
}

#[derive(Debug, Serialize, Deserialize)]
struct PassageRecord {
    id: String,
    chunk: Chunk,
}

#[derive(Debug, Serialize, Deserialize)]
struct PassagesArtifact {
    manifest: IndexManifest,
    passages: Vec<PassageRecord>,
}

/// Owns the index directory.
#[derive(Debug, Clone)]
pub struct IndexStore {
    dir: PathBuf,
}

impl IndexStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn vectors_path(&self) -> PathBuf {
        self.dir.join(VECTORS_FILE)
    }

    pub fn passages_path(&self) -> PathBuf {
        self.dir.join(PASSAGES_FILE)
    }

    /// True only when both artifacts are present.
    pub fn exists(&self) -> bool {
        self.vectors_path().is_file() && self.passages_path().is_file()
    }

    /// Vectors of the pair being replaced, kept until a save has renamed
    /// both new artifacts into place.
    pub fn previous_vectors_path(&self) -> PathBuf {
        self.dir.join(format!(".{VECTORS_FILE}.prev"))
    }

    pub fn load(&self) -> Result<Index, IndexError> {
        if !self.exists() {
            return Err(IndexError::Missing(self.dir.display().to_string()));
        }

        let passage_bytes = fs::read(self.passages_path())?;
        let error = match read_pair(&self.vectors_path(), &passage_bytes) {
            Ok(index) => {
                debug!(
                    dir = %self.dir.display(),
                    entries = index.len(),
                    build_id = %index.manifest.build_id,
                    "index loaded"
                );
                return Ok(index);
            }
            Err(error) => error,
        };

        // A save interrupted between its two renames leaves new vectors next
        // to the old passages; the old vectors are still in the backup.
        let previous = self.previous_vectors_path();
        if !matches!(error, IndexError::Corrupt(_)) || !previous.is_file() {
            return Err(error);
        }
        let index = match read_pair(&previous, &passage_bytes) {
            Ok(index) => index,
            Err(_) => return Err(error),
        };
        fs::rename(&previous, self.vectors_path())?;
        warn!(
            dir = %self.dir.display(),
            build_id = %index.manifest.build_id,
            reason = %error,
            "interrupted save detected, previous index restored"
        );
        Ok(index)
    }

    /// Writes both artifacts to temporary files and renames them into place.
    /// The replaced vectors stay in a backup until both renames are done, so
    /// an interrupted save still loads as the previous index.
    pub fn save(&self, index: &Index) -> Result<(), IndexError> {
        fs::create_dir_all(&self.dir)?;

        let vectors = VectorsArtifact {
            build_id: index.manifest.build_id.clone(),
            dimensions: index.manifest.dimensions,
            ids: index.entries.iter().map(|entry| entry.id.clone()).collect(),
            vectors: index.entries.iter().map(|entry| entry.vector.clone()).collect(),
        };
        let vector_bytes = serde_json::to_vec(&vectors)?;

        let mut manifest = index.manifest.clone();
        manifest.entry_count = index.entries.len();
        manifest.vectors_sha256 = sha256_hex(&vector_bytes);
        let passages = PassagesArtifact {
            manifest,
            passages: index
                .entries
                .iter()
                .map(|entry| PassageRecord {
                    id: entry.id.clone(),
                    chunk: entry.chunk.clone(),
                })
                .collect(),
        };
        let passage_bytes = serde_json::to_vec_pretty(&passages)?;

        let suffix = format!("{}.tmp", index.manifest.build_id);
        let vectors_tmp = self.dir.join(format!(".{VECTORS_FILE}.{suffix}"));
        let passages_tmp = self.dir.join(format!(".{PASSAGES_FILE}.{suffix}"));

        let staged = write_synced(&vectors_tmp, &vector_bytes)
            .and_then(|_| write_synced(&passages_tmp, &passage_bytes))
            .and_then(|_| self.back_up_vectors());
        if let Err(error) = staged {
            let _ = fs::remove_file(&vectors_tmp);
            let _ = fs::remove_file(&passages_tmp);
            return Err(error.into());
        }

        if let Err(error) = fs::rename(&vectors_tmp, self.vectors_path()) {
            let _ = fs::remove_file(&vectors_tmp);
            let _ = fs::remove_file(&passages_tmp);
            let _ = fs::remove_file(self.previous_vectors_path());
            return Err(error.into());
        }

        if let Err(error) = fs::rename(&passages_tmp, self.passages_path()) {
            let _ = fs::remove_file(&passages_tmp);
            let previous = self.previous_vectors_path();
            if previous.is_file() {
                let _ = fs::rename(&previous, self.vectors_path());
            } else {
                let _ = fs::remove_file(self.vectors_path());
            }
            return Err(error.into());
        }

        match fs::remove_file(self.previous_vectors_path()) {
            Ok(()) => {}
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {}
            Err(error) => return Err(error.into()),
        }

        info!(
            dir = %self.dir.display(),
            entries = index.len(),
            build_id = %index.manifest.build_id,
            "index saved"
        );
        Ok(())
    }

    /// Hard links the current vectors to the backup path, copying when the
    /// filesystem has no links.
    fn back_up_vectors(&self) -> std::io::Result<()> {
        let current = self.vectors_path();
        let previous = self.previous_vectors_path();
        match fs::remove_file(&previous) {
            Ok(()) => {}
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {}
            Err(error) => return Err(error),
        }
        if !current.is_file() {
            return Ok(());
        }
        fs::hard_link(&current, &previous).or_else(|_| fs::copy(&current, &previous).map(|_| ()))
    }

    /// Removes both artifacts; missing files are not an error.
    pub fn remove(&self) -> Result<(), IndexError> {
        for path in [
            self.vectors_path(),
            self.passages_path(),
            self.previous_vectors_path(),
        ] {
            match fs::remove_file(&path) {
                Ok(()) => {}
                Err(error) if error.kind() == std::io::ErrorKind::NotFound => {}
                Err(error) => return Err(error.into()),
            }
        }
        Ok(())
    }
}

fn read_pair(vectors_path: &Path, passage_bytes: &[u8]) -> Result<Index, IndexError> {
    let vector_bytes = fs::read(vectors_path)?;
    let vectors: VectorsArtifact = serde_json::from_slice(&vector_bytes)
        .map_err(|error| IndexError::Corrupt(format!("{VECTORS_FILE}: {error}")))?;
    let passages: PassagesArtifact = serde_json::from_slice(passage_bytes)
        .map_err(|error| IndexError::Corrupt(format!("{PASSAGES_FILE}: {error}")))?;

    assemble(vectors, passages, &sha256_hex(&vector_bytes))
}

fn assemble(
    vectors: VectorsArtifact,
    passages: PassagesArtifact,
    vectors_sha256: &str,
) -> Result<Index, IndexError> {
    let manifest = passages.manifest;

    if manifest.format_version != FORMAT_VERSION {
        return Err(IndexError::Corrupt(format!(
            "unsupported format version {}",
            manifest.format_version
        )));
    }
    if manifest.build_id != vectors.build_id {
        return Err(IndexError::Corrupt(format!(
            "artifacts come from different builds ({} vs {})",
            manifest.build_id, vectors.build_id
        )));
    }
    if manifest.vectors_sha256 != vectors_sha256 {
        return Err(IndexError::Corrupt(
            "vector artifact checksum does not match manifest".to_string(),
        ));
    }
    if vectors.ids.len() != vectors.vectors.len()
        || vectors.ids.len() != passages.passages.len()
        || vectors.ids.len() != manifest.entry_count
    {
        return Err(IndexError::Corrupt(format!(
            "entry counts differ: {} ids, {} vectors, {} passages, manifest {}",
            vectors.ids.len(),
            vectors.vectors.len(),
            passages.passages.len(),
            manifest.entry_count
        )));
    }
    if vectors.dimensions != manifest.dimensions {
        return Err(IndexError::Corrupt(format!(
            "dimensions differ: vectors {} vs manifest {}",
            vectors.dimensions, manifest.dimensions
        )));
    }

    let mut entries = Vec::with_capacity(vectors.ids.len());
    for ((id, vector), record) in vectors
        .ids
        .into_iter()
        .zip(vectors.vectors)
        .zip(passages.passages)
    {
        if id != record.id {
            return Err(IndexError::Corrupt(format!(
                "entry order differs: {} vs {}",
                id, record.id
            )));
        }
        if vector.len() != manifest.dimensions {
            return Err(IndexError::Corrupt(format!(
                "vector for {id} has {} dimensions, expected {}",
                vector.len(),
                manifest.dimensions
            )));
        }
        entries.push(IndexEntry {
            id,
            chunk: record.chunk,
            vector,
        });
    }

    Ok(Index { manifest, entries })
}

fn write_synced(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut file = File::create(path)?;
    file.write_all(bytes)?;
    file.sync_all()
}

fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}
