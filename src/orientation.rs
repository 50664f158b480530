//! Finds scans whose EXIF orientation says they do not display upright.

use crate::error::AppError;
use crate::exif_fields::{MetadataTool, ORIENTATION};
use crate::pairing::Discovery;
use serde::Serialize;
use std::path::{Path, PathBuf};

/// What a viewer has to do to show an image stored with this orientation
/// upright. `None` for `1` (already upright) and for values outside `1..=8`.
pub fn correction(orientation: u32) -> Option<&'static str> {
    match orientation {
        2 => Some("flip horizontally"),
        3 => Some("rotate 180°"),
        4 => Some("flip vertically"),
        5 => Some("flip horizontally, then rotate 90° clockwise"),
        6 => Some("rotate 90° clockwise"),
        7 => Some("flip horizontally, then rotate 270° clockwise"),
        8 => Some("rotate 270° clockwise"),
        _ => None,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Rotated {
    pub path: PathBuf,
    pub orientation: u32,
    pub correction: &'static str,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct OrientationReport {
    pub checked: usize,
    pub rotated: Vec<Rotated>,
    pub unreadable: Vec<PathBuf>,
}

/// Reads the orientation of every front image and back scan. Files without
/// the tag count as upright; read failures are listed, not fatal.
pub fn orientation_report(discovery: &Discovery, tool: &dyn MetadataTool) -> OrientationReport {
    let mut report = OrientationReport::default();
    let files = discovery
        .pairs
        .iter()
        .flat_map(|pair| std::iter::once(pair.original.as_path()).chain(pair.back.as_deref()));

    for path in files {
        report.checked += 1;
        match read_orientation(tool, path) {
            Ok(Some(orientation)) => {
                if let Some(correction) = correction(orientation) {
                    log::debug!("{:?} has orientation {} ({})", path, orientation, correction);
                    report.rotated.push(Rotated {
                        path: path.to_path_buf(),
                        orientation,
                        correction,
                    });
                }
            }
            Ok(None) => {}
            Err(e) => {
                log::warn!("Could not read orientation of {:?}: {}", path, e);
                report.unreadable.push(path.to_path_buf());
            }
        }
    }

    log::info!(
        "Orientation checked for {} files: {} need rotation, {} unreadable",
        report.checked,
        report.rotated.len(),
        report.unreadable.len()
    );
    report
}

fn read_orientation(tool: &dyn MetadataTool, path: &Path) -> Result<Option<u32>, AppError> {
    let fields = tool.read_fields(path)?;
    Ok(fields
        .get(ORIENTATION)
        .and_then(|value| value.to_string().trim().parse().ok()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exif_fields::{FieldMap, FieldValue};
    use crate::pairing::PhotoPair;
    use std::collections::HashMap;

    struct OrientationTool {
        values: HashMap<PathBuf, &'static str>,
        broken: Option<PathBuf>,
    }

    impl MetadataTool for OrientationTool {
        fn read_fields(&self, path: &Path) -> Result<FieldMap, AppError> {
            if self.broken.as_deref() == Some(path) {
                return Err(AppError::ExifTool("truncated file".into()));
            }
            let mut fields = FieldMap::new();
            if let Some(value) = self.values.get(path) {
                fields.insert(ORIENTATION.to_string(), FieldValue::from(*value));
            }
            Ok(fields)
        }

        fn write_fields(&self, _: &Path, _: &FieldMap, _: bool) -> Result<(), AppError> {
            unreachable!("the report never writes")
        }
    }

    #[test]
    fn corrections_cover_every_rotated_value() {
        assert_eq!(correction(1), None);
        assert_eq!(correction(6), Some("rotate 90° clockwise"));
        assert_eq!(correction(8), Some("rotate 270° clockwise"));
        assert!((2..=8).all(|v| correction(v).is_some()));
        assert_eq!(correction(0), None);
        assert_eq!(correction(9), None);
    }

    #[test]
    fn report_lists_rotated_and_unreadable_files() {
        let discovery = Discovery {
            root: PathBuf::from("/photos"),
            pairs: vec![
                PhotoPair {
                    original: PathBuf::from("/photos/IMG_1.jpg"),
                    back: Some(PathBuf::from("/photos/IMG_1_b.jpg")),
                },
                PhotoPair {
                    original: PathBuf::from("/photos/IMG_2.jpg"),
                    back: None,
                },
                PhotoPair {
                    original: PathBuf::from("/photos/IMG_3.jpg"),
                    back: Some(PathBuf::from("/photos/IMG_3_b.jpg")),
                },
            ],
            orphans: Vec::new(),
        };
        let tool = OrientationTool {
            values: HashMap::from([
                (PathBuf::from("/photos/IMG_1.jpg"), "1"),
                (PathBuf::from("/photos/IMG_1_b.jpg"), "6"),
                (PathBuf::from("/photos/IMG_3.jpg"), "3"),
            ]),
            broken: Some(PathBuf::from("/photos/IMG_3_b.jpg")),
        };

        let report = orientation_report(&discovery, &tool);
        assert_eq!(report.checked, 5);
        assert_eq!(
            report.rotated,
            vec![
                Rotated {
                    path: PathBuf::from("/photos/IMG_1_b.jpg"),
                    orientation: 6,
                    correction: "rotate 90° clockwise",
                },
                Rotated {
                    path: PathBuf::from("/photos/IMG_3.jpg"),
                    orientation: 3,
                    correction: "rotate 180°",
                },
            ]
        );
        assert_eq!(report.unreadable, vec![PathBuf::from("/photos/IMG_3_b.jpg")]);
    }
}
