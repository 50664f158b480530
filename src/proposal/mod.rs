//! The human-editable proposal document: one writer, one parser.

pub mod parser;
pub mod writer;

use crate::exif_fields::FieldMap;
use std::path::{Path, PathBuf};

pub use parser::ProposalParser;
pub use writer::ProposalWriter;

pub(crate) const RULE_WIDTH: usize = 80;
pub(crate) const SKIP_MARKER: &str = "SKIP:";
pub(crate) const BACK_SCAN_LABEL: &str = "Back scan:";
pub(crate) const NO_BACK_LINE: &str = "No back scan found - skipped";
pub(crate) const NOT_SET: &str = "<not set>";
pub(crate) const FOOTER: &str = "END OF PROPOSAL";
/// Joins list values such as keywords; a comma may occur inside an item.
pub(crate) const LIST_SEPARATOR: &str = "; ";

pub(crate) const CURRENT_SECTION: &str = "CURRENT EXIF:";
pub(crate) const PROPOSED_SECTION: &str = "PROPOSED UPDATES:";
pub(crate) const WARNINGS_SECTION: &str = "WARNINGS:";
pub(crate) const METADATA_SECTION: &str = "EXTRACTION METADATA:";

/// Everything known about one photo at proposal time.
#[derive(Debug, Clone, Default)]
pub struct ProposalEntry {
    pub original: PathBuf,
    pub back: Option<PathBuf>,
    pub current_fields: FieldMap,
    pub proposed_fields: FieldMap,
    pub confidence: f64,
    pub language: Option<String>,
    /// Where the proposed values came from: zones and stored reply.
    pub source: Option<String>,
    pub warnings: Vec<String>,
    pub zones_found: Vec<String>,
}

impl ProposalEntry {
    pub fn new(original: impl Into<PathBuf>, back: Option<PathBuf>) -> Self {
        Self {
            original: original.into(),
            back,
            ..Self::default()
        }
    }

    pub fn has_updates(&self) -> bool {
        !self.proposed_fields.is_empty()
    }

    pub fn directory(&self) -> &Path {
        self.original.parent().unwrap_or_else(|| Path::new(""))
    }
}

/// What survives a trip through the text format.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedEntry {
    pub index: usize,
    pub original_name: String,
    pub back: Option<PathBuf>,
    pub proposed_fields: FieldMap,
    pub skip: bool,
}

impl ParsedEntry {
    pub fn is_actionable(&self) -> bool {
        !self.skip && !self.proposed_fields.is_empty()
    }
}

pub(crate) fn rule(c: char) -> String {
    std::iter::repeat(c).take(RULE_WIDTH).collect()
}
