//! Input file enumeration for OCR processing.

use std::path::{Path, PathBuf};

use anyhow::Context;

/// File extensions the backends accept.
pub const SUPPORTED_EXTENSIONS: [&str; 8] =
    ["pdf", "png", "jpg", "jpeg", "gif", "webp", "tiff", "bmp"];

/// Provides the set of capture files to process.
///
/// The root may be a directory (scanned one level deep) or a single file.
pub struct ImageRepository {
    root: PathBuf,
}

impl ImageRepository {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Sorted, deduplicated list of supported files.
    pub fn list_files(&self) -> anyhow::Result<Vec<PathBuf>> {
        if !self.root.exists() {
            anyhow::bail!("input path not found: {}", self.root.display());
        }

        if self.root.is_file() {
            if is_supported(&self.root) {
                return Ok(vec![resolve(&self.root)]);
            }
            return Ok(Vec::new());
        }

        let mut files: Vec<PathBuf> = std::fs::read_dir(&self.root)
            .with_context(|| format!("failed to read {}", self.root.display()))?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.is_file() && is_supported(path))
            .map(|path| resolve(&path))
            .collect();

        files.sort();
        files.dedup();
        Ok(files)
    }
}

fn is_supported(path: &Path) -> bool {
    let hidden = path
        .file_name()
        .map(|n| n.to_string_lossy().starts_with('.'))
        .unwrap_or(true);
    if hidden {
        return false;
    }
    path.extension()
        .map(|ext| {
            let ext = ext.to_string_lossy().to_lowercase();
            SUPPORTED_EXTENSIONS.contains(&ext.as_str())
        })
        .unwrap_or(false)
}

fn resolve(path: &Path) -> PathBuf {
    path.canonicalize().unwrap_or_else(|_| path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;

    #[test]
    fn test_lists_supported_files_sorted() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b.png", "a.JPG", "notes.txt", ".hidden.png", "c.pdf"] {
            File::create(dir.path().join(name)).unwrap();
        }

        let repo = ImageRepository::new(dir.path());
        let files = repo.list_files().unwrap();
        let names: Vec<String> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.JPG", "b.png", "c.pdf"]);
    }

    #[test]
    fn test_single_file_root() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("receipt.png");
        File::create(&file).unwrap();

        let repo = ImageRepository::new(&file);
        assert_eq!(repo.list_files().unwrap().len(), 1);

        let unsupported = dir.path().join("receipt.docx");
        File::create(&unsupported).unwrap();
        let repo = ImageRepository::new(&unsupported);
        assert!(repo.list_files().unwrap().is_empty());
    }

    #[test]
    fn test_missing_root_errors() {
        let repo = ImageRepository::new("/definitely/not/here");
        assert!(repo.list_files().is_err());
    }
}
