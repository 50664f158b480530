//! Reads an edited proposal back into per-file update instructions.
//!
//! The scan is a two-state machine. Outside an entry every line is ignored.
//! An `[NNNN] name` header opens an entry, flushing the previous one; a
//! `====` or `----` rule or the end of input closes it. Inside an entry the
//! section titles decide which `Field: Value` lines count as proposals.

use super::{
    ParsedEntry, BACK_SCAN_LABEL, CURRENT_SECTION, LIST_SEPARATOR, METADATA_SECTION, NOT_SET,
    PROPOSED_SECTION, SKIP_MARKER, WARNINGS_SECTION,
};
use crate::config::ProposalConfig;
use crate::error::AppError;
use crate::exif_fields::FieldValue;
use crate::pollution::PollutionFilter;
use lazy_static::lazy_static;
use regex::Regex;
use std::fs;
use std::path::{Path, PathBuf};

lazy_static! {
    static ref ENTRY_HEADER: Regex = Regex::new(r"^\[(\d{4,})\]\s+(.+)$").unwrap();
    static ref FIELD_LINE: Regex = Regex::new(r"^([A-Za-z][A-Za-z0-9 _\-]*?):\s*(.*)$").unwrap();
    static ref ELISION: Regex = Regex::new(r"(\.\.\.$)|(\(\+\d+ more\)$)").unwrap();
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Preamble,
    Current,
    Proposed,
    Warnings,
    Metadata,
}

impl Section {
    fn accepts_fields(self) -> bool {
        matches!(self, Section::Preamble | Section::Proposed)
    }
}

enum State {
    SeekingEntry,
    InEntry { entry: ParsedEntry, section: Section },
}

#[derive(Debug, Clone)]
pub struct ProposalParser {
    filter: PollutionFilter,
    descriptive_labels: Vec<String>,
    list_fields: Vec<String>,
    drop_elided: bool,
}

impl ProposalParser {
    pub fn new(config: &ProposalConfig, filter: PollutionFilter) -> Self {
        Self {
            filter,
            descriptive_labels: config
                .descriptive_labels
                .iter()
                .map(|l| l.to_lowercase())
                .collect(),
            list_fields: config.list_fields.clone(),
            drop_elided: config.elide_proposed_values,
        }
    }

    pub fn parse_file(&self, path: &Path) -> Result<Vec<ParsedEntry>, AppError> {
        log::info!("Reading proposal {:?}", path);
        let text = fs::read_to_string(path)?;
        Ok(self.parse(&text))
    }

    pub fn parse(&self, text: &str) -> Vec<ParsedEntry> {
        let mut entries = Vec::new();
        let mut state = State::SeekingEntry;

        for line in text.lines() {
            state = self.step(state, line.trim(), &mut entries);
        }
        if let State::InEntry { entry, .. } = state {
            entries.push(entry);
        }

        log::info!(
            "Parsed {} entries ({} marked SKIP)",
            entries.len(),
            entries.iter().filter(|e| e.skip).count()
        );
        entries
    }

    fn step(&self, state: State, line: &str, entries: &mut Vec<ParsedEntry>) -> State {
        let (skip_marked, rest) = match line.strip_prefix(SKIP_MARKER) {
            Some(rest) => (true, rest.trim()),
            None => (false, line),
        };

        if let Some(caps) = ENTRY_HEADER.captures(rest) {
            if let State::InEntry { entry, .. } = state {
                entries.push(entry);
            }
            let entry = ParsedEntry {
                index: caps[1].parse().unwrap_or_default(),
                original_name: caps[2].trim().to_string(),
                skip: skip_marked,
                ..ParsedEntry::default()
            };
            log::trace!("Entry [{:04}] {}", entry.index, entry.original_name);
            return State::InEntry {
                entry,
                section: Section::Preamble,
            };
        }

        if is_rule(line) {
            if let State::InEntry { entry, .. } = state {
                entries.push(entry);
            }
            return State::SeekingEntry;
        }

        let State::InEntry { mut entry, mut section } = state else {
            return State::SeekingEntry;
        };

        if skip_marked {
            entry.skip = true;
        } else if let Some(next) = section_title(line) {
            section = next;
        } else if let Some(back) = line.strip_prefix(BACK_SCAN_LABEL) {
            let back = back.trim();
            if !back.is_empty() {
                entry.back = Some(PathBuf::from(back));
            }
        } else if section.accepts_fields() {
            if let Some((field, value)) = self.field(line) {
                entry.proposed_fields.insert(field, value);
            }
        }

        State::InEntry { entry, section }
    }

    /// A proposed `Field: Value` line, after every exclusion rule.
    fn field(&self, line: &str) -> Option<(String, FieldValue)> {
        let caps = FIELD_LINE.captures(line)?;
        let name = caps[1].trim();
        let value = caps[2].trim();

        if self.descriptive_labels.contains(&name.to_lowercase()) {
            return None;
        }
        if value.is_empty() || value == NOT_SET {
            return None;
        }
        if self.drop_elided && ELISION.is_match(value) {
            log::warn!("Ignoring elided value for {}: {:?}", name, value);
            return None;
        }

        let value = if self.list_fields.iter().any(|f| f == name) {
            let items = value
                .split(LIST_SEPARATOR.trim())
                .map(str::to_string)
                .collect::<Vec<_>>();
            let items = self.filter.clean_all(&items);
            if items.is_empty() {
                return None;
            }
            FieldValue::List(items)
        } else {
            FieldValue::Text(self.filter.clean(value)?)
        };
        Some((name.to_string(), value))
    }
}

fn section_title(line: &str) -> Option<Section> {
    match line {
        CURRENT_SECTION => Some(Section::Current),
        PROPOSED_SECTION => Some(Section::Proposed),
        WARNINGS_SECTION => Some(Section::Warnings),
        METADATA_SECTION => Some(Section::Metadata),
        _ => None,
    }
}

fn is_rule(line: &str) -> bool {
    line.len() >= 3 && (line.chars().all(|c| c == '=') || line.chars().all(|c| c == '-'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exif_fields::FieldMap;
    use crate::proposal::{ProposalEntry, ProposalWriter};

    fn parser() -> ProposalParser {
        ProposalParser::new(&ProposalConfig::default(), PollutionFilter::default())
    }

    fn writer() -> ProposalWriter {
        ProposalWriter::new(ProposalConfig::default(), &["_b".to_string(), "_B".to_string()])
    }

    fn fields(pairs: &[(&str, FieldValue)]) -> FieldMap {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    fn sample_entries() -> Vec<ProposalEntry> {
        let mut first = ProposalEntry::new("/photos/1999/IMG_1.jpg", Some("/photos/1999/IMG_1_b.jpg".into()));
        first.proposed_fields = fields(&[
            ("DateTimeOriginal", "1999:06:07 11:32:00".into()),
            ("Caption-Abstract", "Cumpleaños de Carmen, Lima".into()),
            ("Keywords", FieldValue::List(vec!["Carmen".into(), "Jorge".into()])),
            ("GPSLatitude", "12, 2, 47.0400".into()),
            ("UserComment", "x".repeat(300).into()),
        ]);
        first.current_fields = fields(&[("DateTimeOriginal", "2020:01:01 00:00:00".into())]);
        first.confidence = 0.92;
        first.language = Some("es".into());
        first.warnings = vec!["Filename suggests 2001: OCR date is 1999".into()];
        first.zones_found = vec!["zone_1_bottom_edge".into()];

        let mut second = ProposalEntry::new("/photos/1985/IMG_2.jpg", Some("/photos/1985/IMG_2_b.jpg".into()));
        second.confidence = 0.3;
        second.warnings = vec!["No useful metadata extracted".into()];

        let third = ProposalEntry::new("/photos/1985/IMG_3.jpg", None);

        let mut fourth = ProposalEntry::new("/photos/1985/IMG_4.jpg", Some("/photos/1985/IMG_4_b.jpg".into()));
        fourth.proposed_fields = fields(&[("Make", "Processed by VIKD".into())]);
        fourth.confidence = 0.7;

        vec![first, second, third, fourth]
    }

    #[test]
    fn round_trip_preserves_actionable_content() {
        let entries = sample_entries();
        let mut writer = writer();
        for entry in entries.clone() {
            writer.add_entry(entry).unwrap();
        }

        let parsed = parser().parse(&writer.render());
        assert_eq!(parsed.len(), entries.len());

        for entry in &entries {
            let name = entry.original.file_name().unwrap().to_string_lossy();
            let found = parsed.iter().find(|p| p.original_name == name).unwrap();
            assert_eq!(found.back, entry.back);
            assert_eq!(found.proposed_fields, entry.proposed_fields);
            assert!(!found.skip);
        }
    }

    #[test]
    fn keywords_keep_their_commas() {
        let mut entry = ProposalEntry::new("/photos/IMG_5.jpg", Some("/photos/IMG_5_b.jpg".into()));
        entry.proposed_fields = fields(&[(
            "Keywords",
            FieldValue::List(vec!["Lima, Peru".into(), "Playa".into()]),
        )]);
        entry.source = Some("Zone 4 (handwritten), reply IMG_5_b.json".into());
        let mut writer = writer();
        writer.add_entry(entry.clone()).unwrap();

        let parsed = parser().parse(&writer.render());
        assert_eq!(parsed[0].proposed_fields, entry.proposed_fields);

        // hand-edited lists may drop the space
        let edited = parser().parse("[0001] IMG_5.jpg\n  PROPOSED UPDATES:\n    Keywords: Lima;Cusco ; \n");
        assert_eq!(
            edited[0].proposed_fields.get("Keywords"),
            Some(&FieldValue::List(vec!["Lima".into(), "Cusco".into()]))
        );
    }

    #[test]
    fn numbering_follows_directory_order() {
        let mut writer = writer();
        for entry in sample_entries() {
            writer.add_entry(entry).unwrap();
        }
        let parsed = parser().parse(&writer.render());
        let order: Vec<(usize, &str)> = parsed
            .iter()
            .map(|p| (p.index, p.original_name.as_str()))
            .collect();
        assert_eq!(
            order,
            vec![(1, "IMG_2.jpg"), (2, "IMG_3.jpg"), (3, "IMG_4.jpg"), (4, "IMG_1.jpg")]
        );
    }

    #[test]
    fn skip_markers_are_honoured() {
        let text = "\
[0001] IMG_1.jpg
  Back scan: /p/IMG_1_b.jpg
SKIP:

  PROPOSED UPDATES:
    Make: Processed by X

SKIP: [0002] IMG_2.jpg
  Back scan: /p/IMG_2_b.jpg
  PROPOSED UPDATES:
    Make: Processed by Y

[0003] IMG_3.jpg
  Back scan: /p/IMG_3_b.jpg
  PROPOSED UPDATES:
    Make: Processed by Z
";
        let parsed = parser().parse(text);
        assert_eq!(
            parsed.iter().map(|p| p.skip).collect::<Vec<_>>(),
            vec![true, true, false]
        );
        assert!(!parsed[0].is_actionable());
        assert!(parsed[2].is_actionable());
    }

    #[test]
    fn stray_lines_and_excluded_values_are_ignored() {
        let text = "\
Some notes someone typed above everything: keep
[0001] IMG_1.jpg
  Back scan: /p/IMG_1_b.jpg
  Confidence: 0.92
  Caption-Abstract: Added by hand

  CURRENT EXIF:
    DateTimeOriginal: 2020:01:01 00:00:00

  PROPOSED UPDATES:
    LocationCreatedCity: <not set>
    LocationCreatedSublocation: Blank - no text visible
    ImageNumber: 24


  WARNINGS:
    ⚠ Date: something odd

  EXTRACTION METADATA:
    Language: es
    Zones with data: zone_1_bottom_edge
";
        let parsed = parser().parse(text);
        assert_eq!(parsed.len(), 1);
        assert_eq!(
            parsed[0].proposed_fields,
            fields(&[
                ("Caption-Abstract", "Added by hand".into()),
                ("ImageNumber", "24".into()),
            ])
        );
    }

    #[test]
    fn directory_blocks_do_not_leak_into_entries() {
        let text = "\
[0001] IMG_1.jpg
  Back scan: /a/IMG_1_b.jpg
  PROPOSED UPDATES:
    Make: Processed by X

--------------------------------------------------------------------------------
Directory: /b
  Files: 1 | With updates: 1 | Average confidence: 0.90
--------------------------------------------------------------------------------

[0002] IMG_2.jpg
  No back scan found - skipped

================================================================================
END OF PROPOSAL
================================================================================
";
        let parsed = parser().parse(text);
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0].proposed_fields.len(), 1);
        assert!(parsed[1].back.is_none());
        assert!(parsed[1].proposed_fields.is_empty());
    }

    #[test]
    fn elided_values_are_dropped_when_eliding() {
        let config = ProposalConfig {
            elide_proposed_values: true,
            ..ProposalConfig::default()
        };
        let mut writer = ProposalWriter::new(config.clone(), &["_b".to_string()]);
        let mut entry = ProposalEntry::new("/p/IMG_1.jpg", Some("/p/IMG_1_b.jpg".into()));
        entry.proposed_fields = fields(&[
            ("UserComment", "y".repeat(200).into()),
            ("Make", "Processed by X".into()),
        ]);
        writer.add_entry(entry).unwrap();

        let parsed = ProposalParser::new(&config, PollutionFilter::default()).parse(&writer.render());
        assert_eq!(parsed[0].proposed_fields, fields(&[("Make", "Processed by X".into())]));
    }

    #[test]
    fn corrupt_entry_never_reaches_the_file() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("proposal.txt");
        let mut writer = writer();
        let good = ProposalEntry::new("/p/IMG_1.jpg", Some("/p/IMG_1_b.jpg".into()));
        writer.add_entry(good).unwrap();
        let bad = ProposalEntry::new("/p/IMG_2_b.jpg", None);
        assert!(writer.add_entry(bad).is_err());
        writer.write(&path).unwrap();

        let text = fs::read_to_string(&path).unwrap();
        assert!(!text.contains("IMG_2_b.jpg"));
        assert_eq!(parser().parse_file(&path).unwrap().len(), 1);
    }
}
