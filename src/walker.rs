use crate::error::AppError;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Lowercased extensions without the leading dot.
pub fn normalize_extensions(extensions: &[String]) -> HashSet<String> {
    extensions
        .iter()
        .map(|e| e.trim_start_matches('.').to_lowercase())
        .collect()
}

pub fn has_allowed_extension(path: &Path, allowed_extensions: &HashSet<String>) -> bool {
    path.extension()
        .and_then(|s| s.to_str())
        .map(|ext| allowed_extensions.contains(&ext.to_lowercase()))
        .unwrap_or(false)
}

/// Lists image files under `root` in a stable, sorted order.
pub fn collect_images(
    root: &Path,
    recursive: bool,
    allowed_extensions: &HashSet<String>,
) -> Result<Vec<PathBuf>, AppError> {
    if !root.is_dir() {
        return Err(AppError::DirectoryNotFound(root.to_path_buf()));
    }

    log::info!("Starting file discovery in {:?} (recursive={})", root, recursive);
    log::debug!("Configured allowed extensions: {:?}", allowed_extensions);

    let max_depth = if recursive { usize::MAX } else { 1 };
    let mut images = Vec::new();

    for entry in WalkDir::new(root)
        .max_depth(max_depth)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| match e {
            Ok(entry) => Some(entry),
            Err(err) => {
                log::warn!("Skipping unreadable entry: {}", err);
                None
            }
        })
    {
        if !entry.file_type().is_file() {
            log::trace!("Skipping non-file entry: {:?}", entry.path());
            continue;
        }

        let path = entry.path();
        if has_allowed_extension(path, allowed_extensions) {
            log::trace!("Discovered image: {:?}", path);
            images.push(path.to_path_buf());
        } else {
            log::trace!("Skipping file due to unsupported extension: {:?}", path);
        }
    }

    images.sort();
    log::info!("File discovery complete: {} images", images.len());
    Ok(images)
}
