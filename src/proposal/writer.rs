use super::{
    rule, ProposalEntry, BACK_SCAN_LABEL, CURRENT_SECTION, FOOTER, LIST_SEPARATOR, METADATA_SECTION,
    NOT_SET, NO_BACK_LINE, PROPOSED_SECTION, SKIP_MARKER, WARNINGS_SECTION,
};
use crate::config::ProposalConfig;
use crate::error::AppError;
use crate::exif_fields::FieldValue;
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

/// Current fields worth showing, in display order.
const CURRENT_PRIORITY: &[&str] = &[
    "DateTimeOriginal",
    "GPSLatitude",
    "GPSLongitude",
    "LocationCreatedCity",
    "LocationCreatedCountryName",
    "Caption-Abstract",
    "Keywords",
    "ImageUniqueID",
    "ImageDescription",
    "UserComment",
];

/// Stems that mark a file as some scan of a photo back.
const GUARD_SUFFIXES: &[&str] = &["_a", "_A"];

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProposalStats {
    pub total: usize,
    pub with_updates: usize,
    pub without_updates: usize,
    pub average_confidence: f64,
    pub high_confidence: usize,
    pub medium_confidence: usize,
    pub low_confidence: usize,
    pub field_counts: BTreeMap<String, usize>,
}

#[derive(Debug, Clone)]
pub struct ProposalWriter {
    config: ProposalConfig,
    back_suffixes: Vec<String>,
    entries: Vec<ProposalEntry>,
}

impl ProposalWriter {
    pub fn new(config: ProposalConfig, back_suffixes: &[String]) -> Self {
        Self {
            config,
            back_suffixes: back_suffixes.to_vec(),
            entries: Vec::new(),
        }
    }

    /// Appends an entry, refusing any whose front image is named like a back scan.
    pub fn add_entry(&mut self, entry: ProposalEntry) -> Result<(), AppError> {
        let stem = entry
            .original
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();
        let name = entry
            .original
            .file_name()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();

        let suffix = self
            .back_suffixes
            .iter()
            .map(String::as_str)
            .chain(GUARD_SUFFIXES.iter().copied())
            .find(|suffix| stem.ends_with(suffix));
        if let Some(suffix) = suffix {
            log::error!("Refusing proposal entry for back scan file name {:?}", name);
            return Err(AppError::CorruptProposal {
                original: name,
                reason: format!(
                    "front image name carries back scan suffix '{}'; the pairing is wrong",
                    suffix
                ),
            });
        }

        log::debug!("Adding proposal entry: {}", name);
        self.entries.push(entry);
        Ok(())
    }

    pub fn entries(&self) -> &[ProposalEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn statistics(&self) -> ProposalStats {
        let total = self.entries.len();
        let with_updates = self.entries.iter().filter(|e| e.has_updates()).count();

        let mut field_counts = BTreeMap::new();
        for entry in &self.entries {
            for field in entry.proposed_fields.keys() {
                *field_counts.entry(field.clone()).or_insert(0) += 1;
            }
        }

        ProposalStats {
            total,
            with_updates,
            without_updates: total - with_updates,
            average_confidence: average_confidence(&self.entries.iter().collect::<Vec<_>>()),
            high_confidence: self.entries.iter().filter(|e| e.confidence >= 0.8).count(),
            medium_confidence: self
                .entries
                .iter()
                .filter(|e| (0.6..0.8).contains(&e.confidence))
                .count(),
            low_confidence: self.entries.iter().filter(|e| e.confidence < 0.6).count(),
            field_counts,
        }
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        self.render_header(&mut out);

        let mut by_directory: BTreeMap<PathBuf, Vec<&ProposalEntry>> = BTreeMap::new();
        for entry in &self.entries {
            by_directory
                .entry(entry.directory().to_path_buf())
                .or_default()
                .push(entry);
        }

        let mut index = 1;
        for (directory, entries) in &by_directory {
            render_directory_summary(&mut out, directory, entries);
            for entry in entries {
                self.render_entry(&mut out, index, entry);
                index += 1;
            }
        }

        let _ = writeln!(out, "\n{}", rule('='));
        let _ = writeln!(out, "{}", FOOTER);
        let _ = writeln!(out, "{}", rule('='));
        out
    }

    /// Renders the whole document and writes it in one go.
    pub fn write(&self, path: &Path) -> Result<(), AppError> {
        log::info!("Generating proposal file: {:?}", path);
        fs::write(path, self.render())?;

        let stats = self.statistics();
        log::info!("Proposal file written: {:?}", path);
        log::info!("  Total entries: {}", stats.total);
        log::info!("  With updates: {}", stats.with_updates);
        Ok(())
    }

    fn render_header(&self, out: &mut String) {
        let stats = self.statistics();
        let percent = if stats.total == 0 {
            0.0
        } else {
            100.0 * stats.with_updates as f64 / stats.total as f64
        };

        let _ = writeln!(out, "{}", rule('='));
        let _ = writeln!(out, "Back Scan OCR - EXIF Update Proposal");
        let _ = writeln!(out, "Generated: {}", chrono::Local::now().format("%Y-%m-%d %H:%M:%S"));
        let _ = writeln!(out, "{}", rule('='));
        let _ = writeln!(out);
        let _ = writeln!(out, "SUMMARY:");
        let _ = writeln!(out, "  Total files analyzed: {}", stats.total);
        let _ = writeln!(out, "  Files with proposed updates: {} ({:.1}%)", stats.with_updates, percent);
        let _ = writeln!(out, "  Files without updates: {}", stats.without_updates);
        let _ = writeln!(out);
        let _ = writeln!(out, "CONFIDENCE DISTRIBUTION:");
        let _ = writeln!(out, "  High (≥0.8): {} files", stats.high_confidence);
        let _ = writeln!(out, "  Medium (0.6-0.8): {} files", stats.medium_confidence);
        let _ = writeln!(out, "  Low (<0.6): {} files", stats.low_confidence);
        let _ = writeln!(out, "  Average confidence: {:.2}", stats.average_confidence);
        let _ = writeln!(out);
        let _ = writeln!(out, "INSTRUCTIONS:");
        let _ = writeln!(out, "  1. Review each proposed update below");
        let _ = writeln!(out, "  2. Check extracted dates, locations and text for accuracy");
        let _ = writeln!(
            out,
            "  3. To skip an entry, put \"{}\" on its own line inside it or before its [NNNN] header",
            SKIP_MARKER
        );
        let _ = writeln!(out, "  4. To change a value, edit it under PROPOSED UPDATES");
        let _ = writeln!(
            out,
            "     (separate keywords with \"{}\"; commas stay inside one keyword)",
            LIST_SEPARATOR.trim()
        );
        let _ = writeln!(out, "  5. Save and run: backscan-ocr apply <this file> <photo directory>");
        let _ = writeln!(out);
        let _ = writeln!(out, "{}", rule('='));
    }

    fn render_entry(&self, out: &mut String, index: usize, entry: &ProposalEntry) {
        let name = entry
            .original
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let _ = writeln!(out, "\n[{:04}] {}", index, name);

        let Some(back) = &entry.back else {
            let _ = writeln!(out, "  {}", NO_BACK_LINE);
            return;
        };
        let _ = writeln!(out, "  {} {}", BACK_SCAN_LABEL, back.display());
        let _ = writeln!(out, "  Confidence: {:.2}", entry.confidence);

        if !entry.has_updates() {
            let _ = writeln!(out, "  Status: No useful metadata extracted");
            render_warnings(out, &entry.warnings);
            return;
        }

        let _ = writeln!(out, "\n  {}", CURRENT_SECTION);
        for field in CURRENT_PRIORITY {
            match entry.current_fields.get(*field) {
                Some(value) if !value.is_empty() && value.to_string() != NOT_SET => {
                    let _ = writeln!(out, "    {}: {}", field, self.elide(value));
                }
                _ => {}
            }
        }

        let _ = writeln!(out, "\n  {}", PROPOSED_SECTION);
        for (field, value) in &entry.proposed_fields {
            let shown = if self.config.elide_proposed_values {
                self.elide(value)
            } else {
                single_line(&full_value(value))
            };
            let _ = writeln!(out, "    {}: {}", field, shown);
        }

        render_warnings(out, &entry.warnings);

        let _ = writeln!(out, "\n  {}", METADATA_SECTION);
        if let Some(source) = &entry.source {
            let _ = writeln!(out, "    Source: {}", source);
        }
        if let Some(language) = &entry.language {
            let _ = writeln!(out, "    Language: {}", language);
        }
        if !entry.zones_found.is_empty() {
            let _ = writeln!(out, "    Zones with data: {}", entry.zones_found.join(", "));
        }
    }

    /// Shortens a value for on-screen reading only.
    fn elide(&self, value: &FieldValue) -> String {
        match value {
            FieldValue::List(items) => {
                let limit = self.config.max_list_items;
                let mut shown = items
                    .iter()
                    .take(limit)
                    .map(|s| single_line(s))
                    .collect::<Vec<_>>()
                    .join(LIST_SEPARATOR);
                if items.len() > limit {
                    let _ = write!(shown, " ... (+{} more)", items.len() - limit);
                }
                shown
            }
            FieldValue::Text(text) => {
                let text = single_line(text);
                let width = self.config.display_width;
                if text.chars().count() > width {
                    let kept: String = text.chars().take(width.saturating_sub(3)).collect();
                    format!("{}...", kept)
                } else {
                    text
                }
            }
        }
    }
}

fn render_directory_summary(out: &mut String, directory: &Path, entries: &[&ProposalEntry]) {
    let with_updates = entries.iter().filter(|e| e.has_updates()).count();
    let _ = writeln!(out, "\n{}", rule('-'));
    let _ = writeln!(out, "Directory: {}", directory.display());
    let _ = writeln!(
        out,
        "  Files: {} | With updates: {} | Average confidence: {:.2}",
        entries.len(),
        with_updates,
        average_confidence(entries)
    );
    let _ = writeln!(out, "{}", rule('-'));
}

fn render_warnings(out: &mut String, warnings: &[String]) {
    if warnings.is_empty() {
        return;
    }
    let _ = writeln!(out, "\n  {}", WARNINGS_SECTION);
    for warning in warnings {
        let _ = writeln!(out, "    ⚠ {}", single_line(warning));
    }
}

fn average_confidence(entries: &[&ProposalEntry]) -> f64 {
    if entries.is_empty() {
        return 0.0;
    }
    entries.iter().map(|e| e.confidence).sum::<f64>() / entries.len() as f64
}

/// The format is line based; embedded line breaks become spaces.
fn full_value(value: &FieldValue) -> String {
    match value {
        FieldValue::Text(text) => text.clone(),
        FieldValue::List(items) => items.join(LIST_SEPARATOR),
    }
}

fn single_line(text: &str) -> String {
    if text.contains(|c: char| c == '\n' || c == '\r') {
        text.split_whitespace().collect::<Vec<_>>().join(" ")
    } else {
        text.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exif_fields::FieldMap;

    fn writer() -> ProposalWriter {
        ProposalWriter::new(ProposalConfig::default(), &["_b".to_string(), "_B".to_string()])
    }

    fn entry(original: &str, confidence: f64, fields: &[(&str, &str)]) -> ProposalEntry {
        let mut proposed = FieldMap::new();
        for (k, v) in fields {
            proposed.insert(k.to_string(), FieldValue::from(*v));
        }
        let original = PathBuf::from(original);
        let back = original.with_file_name(format!(
            "{}_b.jpg",
            original.file_stem().unwrap().to_string_lossy()
        ));
        ProposalEntry {
            back: Some(back),
            proposed_fields: proposed,
            confidence,
            ..ProposalEntry::new(original, None)
        }
    }

    #[test]
    fn corruption_guard_rejects_back_names() {
        let mut writer = writer();
        for name in ["/p/IMG_1_b.jpg", "/p/IMG_1_B.TIF", "/p/IMG_1_a.jpg"] {
            let err = writer.add_entry(ProposalEntry::new(name, None)).unwrap_err();
            assert!(matches!(err, AppError::CorruptProposal { .. }));
        }
        assert!(writer.is_empty());
        writer.add_entry(ProposalEntry::new("/p/IMG_1.jpg", None)).unwrap();
        assert_eq!(writer.len(), 1);
    }

    #[test]
    fn statistics_count_each_entry_once() {
        let mut writer = writer();
        writer.add_entry(entry("/p/a/IMG_1.jpg", 0.9, &[("Make", "Processed by X")])).unwrap();
        writer.add_entry(entry("/p/a/IMG_2.jpg", 0.8, &[])).unwrap();
        writer.add_entry(entry("/p/b/IMG_3.jpg", 0.7, &[("Make", "Processed by Y")])).unwrap();
        writer.add_entry(entry("/p/b/IMG_4.jpg", 0.2, &[])).unwrap();

        let stats = writer.statistics();
        assert_eq!(stats.total, 4);
        assert_eq!(stats.with_updates, 2);
        assert_eq!(
            (stats.high_confidence, stats.medium_confidence, stats.low_confidence),
            (2, 1, 1)
        );
        assert_eq!(stats.field_counts.get("Make"), Some(&2));
    }

    #[test]
    fn entries_are_grouped_with_global_numbering() {
        let mut writer = writer();
        writer.add_entry(entry("/p/zeta/IMG_1.jpg", 0.9, &[("Make", "Processed by X")])).unwrap();
        writer.add_entry(entry("/p/alpha/IMG_2.jpg", 0.5, &[])).unwrap();
        writer.add_entry(ProposalEntry::new("/p/zeta/IMG_3.jpg", None)).unwrap();

        let text = writer.render();
        let alpha = text.find("Directory: /p/alpha").unwrap();
        let zeta = text.find("Directory: /p/zeta").unwrap();
        assert!(alpha < zeta);
        assert!(text.find("[0001] IMG_2.jpg").unwrap() > alpha);
        assert!(text.find("[0002] IMG_1.jpg").unwrap() > zeta);
        assert!(text.contains("[0003] IMG_3.jpg\n  No back scan found - skipped"));
        assert!(text.contains("  Status: No useful metadata extracted"));
        assert!(text.contains("Files: 2 | With updates: 1 | Average confidence: 0.45"));
        assert!(text.contains("Files with proposed updates: 1 (33.3%)"));
        assert!(text.trim_end().ends_with(&format!("{}\n{}", FOOTER, rule('='))));
    }

    #[test]
    fn current_snapshot_is_elided_for_display() {
        let mut writer = writer();
        let mut e = entry("/p/IMG_1.jpg", 0.9, &[("Make", "Processed by X")]);
        e.current_fields.insert("ImageDescription".into(), FieldValue::from("x".repeat(100).as_str()));
        e.current_fields.insert("Software".into(), FieldValue::from("ignored"));
        e.current_fields.insert("DateTimeOriginal".into(), FieldValue::from(NOT_SET));
        e.warnings.push("Could not read current EXIF".into());
        writer.add_entry(e).unwrap();

        let text = writer.render();
        assert!(text.contains(&format!("    ImageDescription: {}...", "x".repeat(57))));
        assert!(!text.contains("Software: ignored"));
        assert!(!text.contains("DateTimeOriginal"));
        assert!(text.contains("    ⚠ Could not read current EXIF"));
    }

    #[test]
    fn metadata_section_names_the_source() {
        let mut writer = writer();
        let mut e = entry("/p/IMG_1.jpg", 0.9, &[("Make", "Processed by X")]);
        e.proposed_fields.insert(
            "Keywords".into(),
            FieldValue::List(vec!["Lima, Peru".into(), "Carmen".into()]),
        );
        e.source = Some("Zone 1 (bottom edge) + Zone 4 (handwritten), reply IMG_1_b.json".into());
        e.language = Some("es".into());
        e.zones_found = vec!["zone_1_bottom_edge".into(), "zone_4_handwritten".into()];
        writer.add_entry(e).unwrap();

        let text = writer.render();
        let metadata = text.find(METADATA_SECTION).unwrap();
        let source = text
            .find("    Source: Zone 1 (bottom edge) + Zone 4 (handwritten), reply IMG_1_b.json")
            .unwrap();
        assert!(source > metadata);
        assert!(source < text.find("    Language: es").unwrap());
        assert!(text.contains("    Keywords: Lima, Peru; Carmen"));
    }

    #[test]
    fn written_file_matches_render() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("proposal.txt");
        let mut writer = writer();
        writer.add_entry(entry("/p/IMG_1.jpg", 0.9, &[("Make", "Processed by X")])).unwrap();
        writer.write(&path).unwrap();
        let written = fs::read_to_string(&path).unwrap();
        assert!(written.contains("    Make: Processed by X"));
    }
}
