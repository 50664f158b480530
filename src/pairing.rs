//! Pairs front images with their back scans.
//!
//! Only the configured stem suffix (`_b` / `_B` by default) decides whether a
//! file is a back scan. The looser name markers ("back", "reverse", ...) feed
//! the naming-pattern report and nothing else.

use crate::config::DiscoveryConfig;
use crate::error::AppError;
use crate::walker;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};

/// A front image and, when one exists, its back scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhotoPair {
    pub original: PathBuf,
    pub back: Option<PathBuf>,
}

impl PhotoPair {
    pub fn has_back(&self) -> bool {
        self.back.is_some()
    }

    pub fn original_name(&self) -> String {
        file_name(&self.original)
    }
}

#[derive(Debug, Clone, Default)]
pub struct Discovery {
    /// The directory discovery ran under; stored replies and prepared
    /// images mirror its layout.
    pub root: PathBuf,
    pub pairs: Vec<PhotoPair>,
    /// Back scans whose computed original was not found. Informational.
    pub orphans: Vec<PathBuf>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DirectoryCounts {
    pub total: usize,
    pub with_backs: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DiscoveryStats {
    pub total_pairs: usize,
    pub with_backs: usize,
    pub without_backs: usize,
    pub back_coverage_percent: f64,
    pub by_directory: BTreeMap<PathBuf, DirectoryCounts>,
}

impl Discovery {
    pub fn with_backs(&self) -> impl Iterator<Item = &PhotoPair> {
        self.pairs.iter().filter(|p| p.has_back())
    }

    /// Directory of `path` relative to the discovery root; empty at the top.
    pub fn relative_dir(&self, path: &Path) -> PathBuf {
        path.parent()
            .and_then(|parent| parent.strip_prefix(&self.root).ok())
            .map(Path::to_path_buf)
            .unwrap_or_default()
    }

    /// Back-scan stems that occur in more than one directory.
    pub fn shared_back_stems(&self) -> HashSet<String> {
        let mut seen = HashSet::new();
        let mut shared = HashSet::new();
        for back in self.pairs.iter().filter_map(|p| p.back.as_deref()) {
            let stem = file_stem(back);
            if !seen.insert(stem.clone()) {
                shared.insert(stem);
            }
        }
        shared
    }

    pub fn statistics(&self) -> DiscoveryStats {
        let total = self.pairs.len();
        let with_backs = self.with_backs().count();

        let mut by_directory: BTreeMap<PathBuf, DirectoryCounts> = BTreeMap::new();
        for pair in &self.pairs {
            let dir = pair.original.parent().map(Path::to_path_buf).unwrap_or_default();
            let counts = by_directory.entry(dir).or_default();
            counts.total += 1;
            if pair.has_back() {
                counts.with_backs += 1;
            }
        }

        DiscoveryStats {
            total_pairs: total,
            with_backs,
            without_backs: total - with_backs,
            back_coverage_percent: percent(with_backs, total),
            by_directory,
        }
    }
}

/// Diagnostic classification of every image name under a root.
#[derive(Debug, Clone, Default)]
pub struct NamingReport {
    pub total_files: usize,
    pub suffix_backs: Vec<PathBuf>,
    pub prefix_backs: Vec<PathBuf>,
    /// Keyed by the marker found in the name.
    pub marker_backs: BTreeMap<String, Vec<PathBuf>>,
    pub suspicious: Vec<PathBuf>,
    pub main_photos: Vec<PathBuf>,
}

impl NamingReport {
    pub fn back_scan_count(&self) -> usize {
        self.suffix_backs.len()
            + self.prefix_backs.len()
            + self.marker_backs.values().map(Vec::len).sum::<usize>()
    }

    pub fn back_scan_percentage(&self) -> f64 {
        percent(self.back_scan_count(), self.total_files)
    }

    /// Files a looser naming rule would have called back scans but the
    /// authoritative suffix rule did not.
    pub fn possibly_missed(&self) -> usize {
        self.back_scan_count() - self.suffix_backs.len()
    }
}

#[derive(Debug, Clone)]
pub struct FilePairer {
    extensions: HashSet<String>,
    back_suffixes: Vec<String>,
    diagnostic_markers: Vec<String>,
    diagnostic_prefixes: Vec<String>,
    suspicious_markers: Vec<String>,
}

impl FilePairer {
    pub fn new(config: &DiscoveryConfig) -> Self {
        log::debug!(
            "FilePairer initialized: extensions={:?}, back_suffixes={:?}",
            config.extensions,
            config.back_suffixes
        );
        Self {
            extensions: walker::normalize_extensions(&config.extensions),
            back_suffixes: config.back_suffixes.clone(),
            diagnostic_markers: lowercase(&config.diagnostic_markers),
            diagnostic_prefixes: lowercase(&config.diagnostic_prefixes),
            suspicious_markers: lowercase(&config.suspicious_markers),
        }
    }

    pub fn is_image(&self, path: &Path) -> bool {
        walker::has_allowed_extension(path, &self.extensions)
    }

    /// Returns the stem with its back suffix removed, if the file is a back scan.
    fn original_stem<'a>(&self, path: &'a Path) -> Option<&'a str> {
        if !self.is_image(path) {
            return None;
        }
        let stem = path.file_stem()?.to_str()?;
        self.back_suffixes
            .iter()
            .find_map(|suffix| stem.strip_suffix(suffix.as_str()))
            .filter(|rest| !rest.is_empty())
    }

    pub fn is_back(&self, path: &Path) -> bool {
        self.original_stem(path).is_some()
    }

    /// Where the front image of a back scan should live. Pure path
    /// arithmetic; the file is not checked. `None` when `back` is not a
    /// back scan.
    pub fn resolve_original(&self, back: &Path) -> Option<PathBuf> {
        let stem = self.original_stem(back)?;
        let name = match back.extension().and_then(|e| e.to_str()) {
            Some(ext) => format!("{}.{}", stem, ext),
            None => stem.to_string(),
        };
        Some(match back.parent() {
            Some(parent) => parent.join(name),
            None => PathBuf::from(name),
        })
    }

    /// Every image under `root`, fronts and backs alike.
    pub fn images_under(&self, root: &Path, recursive: bool) -> Result<Vec<PathBuf>, AppError> {
        walker::collect_images(root, recursive, &self.extensions)
    }

    pub fn discover(&self, root: &Path, recursive: bool) -> Result<Discovery, AppError> {
        let files = self.images_under(root, recursive)?;

        let mut originals = Vec::new();
        let mut backs = Vec::new();
        for file in files {
            if self.is_back(&file) {
                backs.push(file);
            } else {
                originals.push(file);
            }
        }
        log::info!("Found {} back files, {} originals", backs.len(), originals.len());

        let mut back_for: HashMap<PathBuf, PathBuf> = HashMap::new();
        for back in &backs {
            let Some(original) = self.resolve_original(back) else {
                continue;
            };
            log::debug!("Back: {:?} -> {:?}", back, original);
            if let Some(previous) = back_for.insert(original.clone(), back.clone()) {
                log::warn!("{:?} and {:?} both claim {:?}; keeping the latter", previous, back, original);
            }
        }

        let known_originals: HashSet<&PathBuf> = originals.iter().collect();
        let mut orphans: Vec<PathBuf> = backs
            .iter()
            .filter(|back| {
                self.resolve_original(back)
                    .map(|original| !known_originals.contains(&original))
                    .unwrap_or(true)
            })
            .cloned()
            .collect();
        orphans.sort();

        if !orphans.is_empty() {
            log::warn!("Found {} orphaned back files (no matching original):", orphans.len());
            for orphan in &orphans {
                log::warn!("  - {:?}", orphan);
            }
        }

        let pairs: Vec<PhotoPair> = originals
            .into_iter()
            .map(|original| {
                let back = back_for.get(&original).cloned();
                PhotoPair { original, back }
            })
            .collect();

        log::info!(
            "Created {} photo pairs ({} with backs)",
            pairs.len(),
            pairs.iter().filter(|p| p.has_back()).count()
        );

        Ok(Discovery {
            root: root.to_path_buf(),
            pairs,
            orphans,
        })
    }

    pub fn analyze_naming_patterns(&self, root: &Path, recursive: bool) -> Result<NamingReport, AppError> {
        let files = self.images_under(root, recursive)?;
        let mut report = NamingReport {
            total_files: files.len(),
            ..NamingReport::default()
        };

        for file in files {
            let name = file_name(&file).to_lowercase();
            if self.is_back(&file) {
                report.suffix_backs.push(file);
            } else if self.diagnostic_prefixes.iter().any(|p| name.starts_with(p.as_str())) {
                report.prefix_backs.push(file);
            } else if let Some(marker) = self.diagnostic_markers.iter().find(|m| name.contains(m.as_str())) {
                report.marker_backs.entry(marker.clone()).or_default().push(file);
            } else if self.suspicious_markers.iter().any(|m| name.contains(m.as_str())) {
                report.suspicious.push(file);
            } else {
                report.main_photos.push(file);
            }
        }

        log::info!(
            "Pattern analysis: {} files, {} back scans ({:.1}%), {} main photos, {} suspicious",
            report.total_files,
            report.back_scan_count(),
            report.back_scan_percentage(),
            report.main_photos.len(),
            report.suspicious.len()
        );
        if report.total_files > 0 && report.back_scan_percentage() < 40.0 {
            log::warn!(
                "Low back scan coverage ({:.1}%) - naming patterns may not be detected",
                report.back_scan_percentage()
            );
        }

        Ok(report)
    }
}

impl Default for FilePairer {
    fn default() -> Self {
        Self::new(&DiscoveryConfig::default())
    }
}

pub fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default()
}

pub fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default()
}

fn lowercase(items: &[String]) -> Vec<String> {
    items.iter().map(|s| s.to_lowercase()).collect()
}

fn percent(part: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        100.0 * part as f64 / total as f64
    }
}
