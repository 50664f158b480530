use crate::error::AppError;
use crate::exif_fields::MetadataTool;
use crate::pairing::{file_name, FilePairer};
use crate::proposal::ParsedEntry;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ApplyReport {
    /// Entries written, or that would have been written in a dry run.
    pub updated: usize,
    pub skipped: usize,
    pub errors: Vec<String>,
}

/// Writes every approved entry to its front image. A failing entry is
/// recorded and the batch moves on.
pub fn apply(
    entries: &[ParsedEntry],
    source_dir: &Path,
    pairer: &FilePairer,
    tool: &dyn MetadataTool,
    dry_run: bool,
) -> Result<ApplyReport, AppError> {
    let index = ImageIndex::build(pairer, source_dir)?;
    let mut report = ApplyReport::default();

    log::info!(
        "Applying {} proposal entries under {:?}{}",
        entries.len(),
        source_dir,
        if dry_run { " (dry run)" } else { "" }
    );

    for entry in entries {
        if !entry.is_actionable() {
            log::debug!(
                "Skipping [{:04}] {} ({})",
                entry.index,
                entry.original_name,
                if entry.skip { "SKIP" } else { "no updates" }
            );
            report.skipped += 1;
            continue;
        }

        let target = match resolve_target(entry, pairer, &index) {
            Ok(target) => target,
            Err(e) => {
                log::warn!("[{:04}] {}: {}", entry.index, entry.original_name, e);
                report.errors.push(format!("[{:04}] {}: {}", entry.index, entry.original_name, e));
                continue;
            }
        };

        if dry_run {
            log::info!(
                "[dry-run] Would write {} fields to {:?}",
                entry.proposed_fields.len(),
                target
            );
            report.updated += 1;
            continue;
        }

        match tool.write_fields(&target, &entry.proposed_fields, true) {
            Ok(()) => report.updated += 1,
            Err(e) => {
                log::warn!("Failed to write EXIF to {:?}: {}", target, e);
                report.errors.push(format!("[{:04}] {}: {}", entry.index, entry.original_name, e));
            }
        }
    }

    log::info!(
        "Apply finished: {} updated, {} skipped, {} errors",
        report.updated,
        report.skipped,
        report.errors.len()
    );
    Ok(report)
}

/// Images under the source directory keyed by file name.
struct ImageIndex {
    by_name: HashMap<String, Vec<PathBuf>>,
}

impl ImageIndex {
    fn build(pairer: &FilePairer, root: &Path) -> Result<Self, AppError> {
        let mut by_name: HashMap<String, Vec<PathBuf>> = HashMap::new();
        for path in pairer.images_under(root, true)? {
            by_name.entry(file_name(&path)).or_default().push(path);
        }
        Ok(Self { by_name })
    }

    fn find(&self, name: &str) -> &[PathBuf] {
        self.by_name.get(name).map(Vec::as_slice).unwrap_or(&[])
    }
}

fn resolve_target(
    entry: &ParsedEntry,
    pairer: &FilePairer,
    index: &ImageIndex,
) -> Result<PathBuf, AppError> {
    let from_back = entry
        .back
        .as_deref()
        .and_then(|back| pairer.resolve_original(back))
        .filter(|original| original.is_file());

    let target = match from_back {
        Some(original) => original,
        None => match index.find(&entry.original_name) {
            [] => {
                return Err(AppError::NotFound(format!(
                    "no file named {} under the source directory",
                    entry.original_name
                )))
            }
            [single] => single.clone(),
            many => {
                return Err(AppError::Generic(format!(
                    "{} files named {}; fix the back scan path to disambiguate",
                    many.len(),
                    entry.original_name
                )))
            }
        },
    };

    if pairer.is_back(&target) {
        return Err(AppError::Generic(format!(
            "refusing to write to back scan {:?}",
            target
        )));
    }
    Ok(target)
}
