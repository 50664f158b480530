use crate::analysis::{Analysis, Location, MachineZone};
use crate::config::ExtractionConfig;
use crate::dates::DateNormalizer;
use crate::error::AppError;
use crate::metadata::ExtractedFields;
use crate::pollution::PollutionFilter;
use regex::Regex;

/// Recognises a transcription of the form "Spanish handwritten text: ..."
/// and the templated captions it should replace.
#[derive(Debug, Clone)]
pub struct VerbatimRule {
    pattern: Regex,
    generic_markers: Vec<String>,
}

impl VerbatimRule {
    pub fn new(config: &ExtractionConfig) -> Result<Self, AppError> {
        Ok(Self {
            pattern: Regex::new(&config.verbatim_pattern)?,
            generic_markers: config
                .generic_caption_markers
                .iter()
                .map(|m| m.to_lowercase())
                .collect(),
        })
    }

    /// The transcription without its language label.
    pub fn payload(&self, comment: &str) -> Option<String> {
        self.pattern
            .captures(comment.trim())
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().trim().to_string())
            .filter(|payload| !payload.is_empty())
    }

    pub fn is_generic_caption(&self, caption: &str) -> bool {
        let lowered = caption.to_lowercase();
        self.generic_markers.iter().any(|m| lowered.contains(m.as_str()))
    }
}

/// Turns a decoded vision reply into a flat field record.
#[derive(Debug, Clone)]
pub struct MetadataExtractor {
    dates: DateNormalizer,
    filter: PollutionFilter,
    verbatim: VerbatimRule,
    caption_limit: usize,
    comment_limit: usize,
}

impl MetadataExtractor {
    pub fn new(dates: DateNormalizer, config: &ExtractionConfig) -> Result<Self, AppError> {
        Ok(Self {
            dates,
            filter: PollutionFilter::new(&config.pollution),
            verbatim: VerbatimRule::new(config)?,
            caption_limit: config.caption_limit,
            comment_limit: config.comment_limit,
        })
    }

    pub fn verbatim(&self) -> &VerbatimRule {
        &self.verbatim
    }

    pub fn extract(&self, analysis: &Analysis) -> ExtractedFields {
        let mut fields = ExtractedFields {
            confidence: analysis.confidence,
            ..ExtractedFields::default()
        };

        fields.date = self.dates.get_best(&self.date_candidates(analysis));

        let zone1 = analysis.bottom_edge();
        let zone2 = analysis.center();
        let pick = |get: fn(&MachineZone) -> Option<&String>| {
            zone1
                .and_then(|z| self.filter.clean_opt(get(z).map(String::as_str)))
                .or_else(|| zone2.and_then(|z| self.filter.clean_opt(get(z).map(String::as_str))))
        };
        fields.roll_id = pick(|z| z.roll_id.as_ref());
        fields.frame_number = pick(|z| z.frame.as_ref());
        fields.lab_code = zone1.and_then(|z| self.filter.clean_opt(z.lab_code.as_deref()));

        if let Some(zone4) = analysis.handwritten() {
            if let Some(location) = zone4.locations.iter().find_map(|l| self.clean_location(l)) {
                fields.location_name = location.text;
                fields.city = location.city;
                fields.country = location.country;
                fields.sublocation = location.neighborhood;
            }

            fields.keywords = self
                .filter
                .clean_all(zone4.people.iter().chain(zone4.events.iter()));

            fields.caption = self
                .filter
                .clean_opt(zone4.descriptive_text.as_deref())
                .map(|text| truncate_chars(&text, self.caption_limit));
            fields.language = self.filter.clean_opt(zone4.language.as_deref());
        }

        fields.user_comment = self
            .transcript(analysis)
            .map(|text| truncate_chars(&text, self.comment_limit));

        log::debug!(
            "Extracted: date={:?}, location={:?}, keywords={}, roll={:?}, frame={:?}",
            fields.date.map(|d| d.to_string()),
            fields.location_name,
            fields.keywords.len(),
            fields.roll_id,
            fields.frame_number
        );
        fields
    }

    /// The full transcription, or the per-zone texts joined when the model
    /// left it out.
    fn transcript(&self, analysis: &Analysis) -> Option<String> {
        if let Some(raw) = self.filter.clean_opt(analysis.raw_ocr_complete.as_deref()) {
            return Some(raw);
        }

        if let Some(zone3) = analysis.vertical() {
            log::debug!("Rotated text found (orientation {:?})", zone3.orientation);
        }
        let parts: Vec<String> = [
            analysis.bottom_edge().and_then(|z| z.text.as_deref()),
            analysis.center().and_then(|z| z.text.as_deref()),
            analysis.vertical().and_then(|z| z.text.as_deref()),
            analysis.handwritten().and_then(|z| z.descriptive_text.as_deref()),
        ]
        .into_iter()
        .filter_map(|part| self.filter.clean_opt(part))
        .collect();

        (!parts.is_empty()).then(|| parts.join(" | "))
    }

    /// `all_dates_found` when the model filled it, otherwise the per-zone dates.
    fn date_candidates(&self, analysis: &Analysis) -> Vec<String> {
        let listed = self.filter.clean_all(&analysis.all_dates_found);
        if !listed.is_empty() {
            return listed;
        }

        let mut candidates = Vec::new();
        for zone in [analysis.bottom_edge(), analysis.center()].into_iter().flatten() {
            if let Some(date) = self.filter.clean_opt(zone.date.as_deref()) {
                match self.filter.clean_opt(zone.time.as_deref()) {
                    Some(time) => candidates.push(format!("{} {}", date, time)),
                    None => candidates.push(date),
                }
            }
        }
        if let Some(zone4) = analysis.handwritten() {
            candidates.extend(self.filter.clean_all(&zone4.dates));
        }
        candidates
    }

    fn clean_location(&self, location: &Location) -> Option<Location> {
        let cleaned = Location {
            text: self.filter.clean_opt(location.text.as_deref()),
            city: self.filter.clean_opt(location.city.as_deref()),
            country: self.filter.clean_opt(location.country.as_deref()),
            neighborhood: self.filter.clean_opt(location.neighborhood.as_deref()),
        };
        if cleaned == Location::default() {
            return None;
        }
        Some(Location {
            text: cleaned.text.clone().or_else(|| cleaned.city.clone()),
            ..cleaned
        })
    }
}

/// Cuts `text` to at most `limit` characters on a character boundary.
pub fn truncate_chars(text: &str, limit: usize) -> String {
    match text.char_indices().nth(limit) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}
