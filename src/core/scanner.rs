use crate::core::asset::{ImageAsset, image_set_directory};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;
use walkdir::{DirEntry, WalkDir};

#[derive(Debug, Error)]
pub enum ScanError {
    #[error("Cannot read directory: {path}")]
    DirectoryUnreadable {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Operation cancelled")]
    Cancelled,
}

/// Discovers one representative image per `.imageset` directory.
pub struct CatalogScanner {
    cancellation_token: Arc<AtomicBool>,
    supported_formats: HashSet<String>,
}

impl CatalogScanner {
    pub fn new() -> Self {
        let supported_formats = ["png", "jpg", "jpeg", "pdf", "svg"]
            .into_iter()
            .map(String::from)
            .collect();

        Self {
            cancellation_token: Arc::new(AtomicBool::new(false)),
            supported_formats,
        }
    }

    pub fn cancellation_token(&self) -> Arc<AtomicBool> {
        self.cancellation_token.clone()
    }

    pub fn cancel(&self) {
        self.cancellation_token.store(true, Ordering::Relaxed);
    }

    /// Walk `root` and return assets in traversal order. Entries are visited
    /// sorted by file name, so the same tree always yields the same order.
    pub fn scan_directory(&self, root: &Path, min_size_kb: u64) -> Result<Vec<ImageAsset>, ScanError> {
        fs::read_dir(root).map_err(|source| ScanError::DirectoryUnreadable {
            path: root.to_string_lossy().to_string(),
            source,
        })?;

        let min_size_bytes = min_size_kb.saturating_mul(1024);
        let mut image_set_sizes: HashMap<PathBuf, u64> = HashMap::new();
        let mut assets = Vec::new();

        let walker = WalkDir::new(root)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| entry.depth() == 0 || !is_hidden(entry));

        for entry in walker {
            if self.cancellation_token.load(Ordering::Relaxed) {
                return Err(ScanError::Cancelled);
            }

            let entry = match entry {
                Ok(entry) => entry,
                Err(e) if e.depth() == 0 => {
                    return Err(ScanError::DirectoryUnreadable {
                        path: root.to_string_lossy().to_string(),
                        source: e.into(),
                    });
                }
                Err(e) => {
                    log::warn!("Skipping unreadable entry under {}: {}", root.display(), e);
                    continue;
                }
            };

            if !entry.file_type().is_file() || !self.is_supported_format(entry.path()) {
                continue;
            }

            let Some(image_set) = image_set_directory(entry.path()) else {
                continue;
            };

            if image_set_sizes.contains_key(image_set) {
                continue;
            }

            let file_size = match entry.metadata() {
                Ok(metadata) => metadata.len(),
                Err(e) => {
                    log::warn!("Could not read size of {}: {}", entry.path().display(), e);
                    continue;
                }
            };
            if file_size < min_size_bytes {
                continue;
            }

            let image_set_size = directory_size(image_set);
            image_set_sizes.insert(image_set.to_path_buf(), image_set_size);
            assets.push(ImageAsset::new(entry.path(), image_set_size));
        }

        log::info!("Found {} image sets under {}", assets.len(), root.display());
        Ok(assets)
    }

    pub fn is_supported_format(&self, file_path: &Path) -> bool {
        if let Some(extension) = file_path.extension() {
            let ext = extension.to_string_lossy().to_lowercase();
            self.supported_formats.contains(&ext)
        } else {
            false
        }
    }
}

impl Default for CatalogScanner {
    fn default() -> Self {
        Self::new()
    }
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry
        .file_name()
        .to_str()
        .map(|name| name.starts_with('.'))
        .unwrap_or(false)
}

/// Sum of the sizes of regular files directly inside `dir`.
fn directory_size(dir: &Path) -> u64 {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            log::warn!("Could not list image set {}: {}", dir.display(), e);
            return 0;
        }
    };

    entries
        .filter_map(Result::ok)
        .filter_map(|entry| entry.metadata().ok())
        .filter(|metadata| metadata.is_file())
        .map(|metadata| metadata.len())
        .sum()
}
