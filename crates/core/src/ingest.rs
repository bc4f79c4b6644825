use crate::models::{FileType, SourceFile};
use crate::IngestError;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;
use walkdir::WalkDir;

/// Supported files directly inside `folder`, sorted by path. Subfolders are
/// not descended into; symlinks are resolved to their targets.
pub fn discover_source_files(folder: &Path) -> Result<Vec<PathBuf>, IngestError> {
    if !folder.is_dir() {
        return Err(IngestError::MissingCorpus(folder.display().to_string()));
    }

    let mut files = Vec::new();
    for item in WalkDir::new(folder)
        .follow_links(true)
        .min_depth(1)
        .max_depth(1)
    {
        let entry = match item {
            Ok(entry) => entry,
            Err(error) => {
                warn!(
                    path = ?error.path().map(Path::display),
                    error = %error,
                    "cannot read corpus entry, leaving it out"
                );
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        if FileType::from_path(entry.path()).is_some() {
            files.push(entry.path().to_path_buf());
        }
    }

    files.sort_unstable();
    Ok(files)
}

pub fn read_source_file(path: &Path) -> Result<SourceFile, IngestError> {
    let name = path
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| IngestError::MissingFileName(path.display().to_string()))?
        .to_string();
    let file_type = FileType::from_path(path)
        .ok_or_else(|| IngestError::UnsupportedFileType(path.display().to_string()))?;
    let bytes = fs::read(path)?;

    Ok(SourceFile {
        path: path.to_path_buf(),
        name,
        file_type,
        bytes,
    })
}
