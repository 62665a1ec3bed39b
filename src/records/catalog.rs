//! Object catalog over a storage location
//!
//! Lists objects under a directory as `ImageReference` rows, the way an
//! external object table exposes a bucket prefix as a relation.

use crate::error::{LensError, Result};
use crate::records::ImageReference;
use crate::utils::content_type_for;
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Default extensions treated as images
pub const DEFAULT_IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "webp", "bmp"];

/// Scans a directory tree for objects
#[derive(Debug, Clone)]
pub struct ObjectCatalog {
    root: PathBuf,
    extensions: Vec<String>,
}

impl ObjectCatalog {
    /// Create a catalog rooted at `root` matching the default image extensions
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            extensions: DEFAULT_IMAGE_EXTENSIONS
                .iter()
                .map(|ext| ext.to_string())
                .collect(),
        }
    }

    /// Restrict the scan to the given extensions (case-insensitive, no dot)
    pub fn with_extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.extensions = extensions
            .into_iter()
            .map(|ext| ext.as_ref().trim_start_matches('.').to_lowercase())
            .filter(|ext| !ext.is_empty())
            .collect();
        self
    }

    /// List every matching object, sorted by URI
    pub fn scan(&self) -> Result<Vec<ImageReference>> {
        if !self.root.is_dir() {
            return Err(LensError::Validation(format!(
                "Catalog location is not a directory: {}",
                self.root.display()
            )));
        }

        let mut pending = vec![self.root.clone()];
        let mut references = Vec::new();
        let mut seen = HashSet::new();

        while let Some(dir) = pending.pop() {
            for entry in std::fs::read_dir(&dir)? {
                let entry = entry?;
                let path = entry.path();
                let file_type = entry.file_type()?;
                if file_type.is_dir() {
                    pending.push(path);
                } else if file_type.is_symlink() && path.is_dir() {
                    log::debug!("Skipping symlinked directory {}", path.display());
                } else if self.matches(&path) {
                    let reference = self.describe(&path)?;
                    if seen.insert(reference.uri.clone()) {
                        references.push(reference);
                    } else {
                        log::debug!("Skipping duplicate object {}", reference.uri);
                    }
                }
            }
        }

        references.sort_by(|a, b| a.uri.cmp(&b.uri));
        log::info!(
            "Catalogued {} objects under {}",
            references.len(),
            self.root.display()
        );
        Ok(references)
    }

    fn matches(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| self.extensions.iter().any(|e| e.eq_ignore_ascii_case(ext)))
            .unwrap_or(false)
    }

    fn describe(&self, path: &Path) -> Result<ImageReference> {
        let metadata = std::fs::metadata(path)?;
        let canonical = path.canonicalize()?;

        let (width, height) = match image::image_dimensions(path) {
            Ok((w, h)) => (Some(w), Some(h)),
            Err(e) => {
                log::debug!("No dimensions for {}: {}", path.display(), e);
                (None, None)
            }
        };

        Ok(ImageReference {
            uri: format!("file://{}", canonical.display()),
            content_type: content_type_for(path).map(str::to_string),
            size_bytes: metadata.len(),
            width,
            height,
            updated_at: metadata.modified().ok().map(DateTime::<Utc>::from),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scan_filters_and_sorts() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b_pothole.jpg"), b"not really a jpeg").unwrap();
        std::fs::write(dir.path().join("a_graffiti.PNG"), b"x").unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"skip me").unwrap();
        std::fs::create_dir(dir.path().join("nested")).unwrap();
        std::fs::write(dir.path().join("nested/c_trash.jpeg"), b"y").unwrap();

        let refs = ObjectCatalog::new(dir.path()).scan().unwrap();
        assert_eq!(refs.len(), 3);
        assert!(refs.windows(2).all(|w| w[0].uri <= w[1].uri));
        assert!(refs.iter().all(|r| r.uri.starts_with("file://")));

        let jpg = refs.iter().find(|r| r.uri.ends_with("b_pothole.jpg")).unwrap();
        assert_eq!(jpg.content_type.as_deref(), Some("image/jpeg"));
        assert_eq!(jpg.size_bytes, 17);
        assert!(jpg.width.is_none());
    }

    #[test]
    fn test_scan_with_custom_extensions() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("one.jpg"), b"x").unwrap();
        std::fs::write(dir.path().join("two.png"), b"x").unwrap();

        let refs = ObjectCatalog::new(dir.path())
            .with_extensions([".png"])
            .scan()
            .unwrap();
        assert_eq!(refs.len(), 1);
        assert!(refs[0].uri.ends_with("two.png"));
    }

    #[cfg(unix)]
    #[test]
    fn test_scan_ignores_symlinked_directories_and_duplicates() {
        let dir = tempfile::tempdir().unwrap();
        let photos = dir.path().join("photos");
        std::fs::create_dir_all(photos.join("2024")).unwrap();
        std::fs::write(photos.join("2024/pothole.jpg"), b"x").unwrap();
        std::os::unix::fs::symlink(photos.join("2024"), photos.join("latest")).unwrap();
        std::os::unix::fs::symlink(&photos, photos.join("2024/loop")).unwrap();
        std::os::unix::fs::symlink(photos.join("2024/pothole.jpg"), photos.join("alias.jpg"))
            .unwrap();

        let refs = ObjectCatalog::new(&photos).scan().unwrap();
        assert_eq!(refs.len(), 1);
        assert!(refs[0].uri.ends_with("2024/pothole.jpg"));
    }

    #[test]
    fn test_scan_missing_directory() {
        let result = ObjectCatalog::new("/definitely/not/here").scan();
        assert!(matches!(result, Err(LensError::Validation(_))));
    }
}
