use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CollectError {
    #[error("Attachment directory not found: {0}")]
    DirectoryNotFound(PathBuf),

    #[error("Failed to read directory {0}: {1}")]
    ReadDir(PathBuf, std::io::Error),
}

/// Recursively collect every regular file under `directory`, in
/// directory-entry order: the files of a directory come before the contents
/// of its subdirectories.
///
/// A missing or non-directory root is an error so that "no files" and "bad
/// input" stay distinguishable.
pub fn collect_files(directory: &Path) -> Result<Vec<PathBuf>, CollectError> {
    if !directory.is_dir() {
        return Err(CollectError::DirectoryNotFound(directory.to_path_buf()));
    }

    let mut files = Vec::new();
    visit(directory, &mut files)?;

    log::debug!("Collected {} file(s) under {}", files.len(), directory.display());
    Ok(files)
}

fn visit(dir: &Path, files: &mut Vec<PathBuf>) -> Result<(), CollectError> {
    let entries = fs::read_dir(dir)
        .map_err(|e| CollectError::ReadDir(dir.to_path_buf(), e))?;

    let mut subdirs = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| CollectError::ReadDir(dir.to_path_buf(), e))?;
        match entry.file_type() {
            Ok(t) if t.is_file() => files.push(entry.path()),
            Ok(t) if t.is_dir() => subdirs.push(entry.path()),
            // Symlinks and other special entries are not attachable files
            _ => {}
        }
    }

    for subdir in subdirs {
        visit(&subdir, files)?;
    }

    Ok(())
}
