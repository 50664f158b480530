use crate::analysis::{self, Analysis};
use crate::config::AppConfig;
use crate::dates::DateNormalizer;
use crate::error::AppError;
use crate::exif_fields::{self, FieldMap, MetadataTool};
use crate::extractor::MetadataExtractor;
use crate::geocoder::{Coordinates, Geocoder};
use crate::metadata::ExtractedFields;
use crate::pairing::{file_name, file_stem, Discovery, PhotoPair};
use crate::proposal::{ProposalEntry, ProposalWriter};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

pub const NO_USEFUL_METADATA: &str = "No useful metadata extracted";

/// Turns discovered pairs plus stored vision replies into proposal entries.
pub struct Processor<'a> {
    config: &'a AppConfig,
    extractor: MetadataExtractor,
    geocoder: Geocoder,
    tool: &'a dyn MetadataTool,
}

impl<'a> Processor<'a> {
    pub fn new(config: &'a AppConfig, tool: &'a dyn MetadataTool) -> Result<Self, AppError> {
        let geocoder = Geocoder::new(&config.geocoder);
        if geocoder.is_empty() {
            log::info!("No known locations configured; GPS fields will not be proposed");
        }
        Ok(Self {
            config,
            extractor: MetadataExtractor::new(
                DateNormalizer::new(config.dates.clone()),
                &config.extraction,
            )?,
            geocoder,
            tool,
        })
    }

    /// Processes every pair in discovery order. Entry failures become
    /// warnings; only the proposal's corruption guard stops the run.
    pub fn build_proposal(
        &self,
        discovery: &Discovery,
        analyses_dir: &Path,
    ) -> Result<ProposalWriter, AppError> {
        let store = AnalysisStore::new(analyses_dir, discovery)?;

        log::info!(
            "Building proposal for {} pairs from analyses in {:?}",
            discovery.pairs.len(),
            analyses_dir
        );
        let mut writer =
            ProposalWriter::new(self.config.proposal.clone(), &self.config.discovery.back_suffixes);

        for (i, pair) in discovery.pairs.iter().enumerate() {
            log::info!(
                "[{}/{}] Processing {}",
                i + 1,
                discovery.pairs.len(),
                pair.original_name()
            );
            writer.add_entry(self.process_pair(pair, &store))?;
        }

        log::info!("All pairs processed.");
        Ok(writer)
    }

    pub fn process_pair(&self, pair: &PhotoPair, store: &AnalysisStore<'_>) -> ProposalEntry {
        let mut entry = ProposalEntry::new(pair.original.clone(), pair.back.clone());
        let Some(back) = &pair.back else {
            log::debug!("No back scan for {:?}", pair.original);
            return entry;
        };

        let (reply, analysis) = match store.load(back) {
            Ok(loaded) => loaded,
            Err(e) => {
                log::warn!("Failed to load analysis for {:?}: {}", back, e);
                entry.warnings.push(e.to_string());
                return entry;
            }
        };

        entry.confidence = analysis.confidence.unwrap_or(0.0);
        entry.zones_found = analysis.zones_found();
        entry.source = Some(match analysis.source_description() {
            Some(zones) => format!("{}, reply {}", zones, reply.display()),
            None => format!("reply {}", reply.display()),
        });
        if !analysis.is_useful() {
            log::info!("  Back scan not useful (confidence: {:.2})", entry.confidence);
            entry.warnings.push(NO_USEFUL_METADATA.to_string());
            return entry;
        }

        let fields = self.extractor.extract(&analysis);
        entry.language = fields.language.clone();
        if fields.is_empty() {
            entry.warnings.push(NO_USEFUL_METADATA.to_string());
            return entry;
        }
        if fields.date.is_none() && !analysis.all_dates_found.is_empty() {
            entry.warnings.push(format!(
                "No date in range could be parsed from: {}",
                analysis.all_dates_found.join(" | ")
            ));
        }

        let geo = self.locate(&fields);
        if geo.is_none() && (fields.city.is_some() || fields.location_name.is_some()) {
            log::debug!("No coordinates for extracted location {:?}", fields.location_name);
        }
        entry.proposed_fields =
            exif_fields::build_update(&fields, geo, self.extractor.verbatim(), self.config);
        entry.current_fields = self.current_fields(&pair.original, &mut entry.warnings);
        entry
    }

    fn locate(&self, fields: &ExtractedFields) -> Option<Coordinates> {
        self.geocoder
            .lookup_components(
                fields.city.as_deref(),
                fields.country.as_deref(),
                fields.sublocation.as_deref(),
            )
            .or_else(|| fields.location_name.as_deref().and_then(|n| self.geocoder.lookup(n)))
    }

    fn current_fields(&self, original: &Path, warnings: &mut Vec<String>) -> FieldMap {
        match self.tool.read_fields(original) {
            Ok(fields) => fields,
            Err(e) => {
                log::warn!("Could not read current EXIF from {:?}: {}", original, e);
                warnings.push(format!("Could not read current EXIF: {}", e));
                FieldMap::new()
            }
        }
    }
}

/// Stored vision replies, laid out like the photo tree: the reply for
/// `<root>/album/IMG_1_b.jpg` is `<dir>/album/IMG_1_b.json` (or `.txt`).
/// A reply at the top of `<dir>` is accepted for a nested back scan only
/// while no other back scan shares its stem.
pub struct AnalysisStore<'a> {
    dir: &'a Path,
    discovery: &'a Discovery,
    shared_stems: HashSet<String>,
}

impl<'a> AnalysisStore<'a> {
    pub fn new(dir: &'a Path, discovery: &'a Discovery) -> Result<Self, AppError> {
        if !dir.is_dir() {
            return Err(AppError::DirectoryNotFound(dir.to_path_buf()));
        }
        let shared_stems = discovery.shared_back_stems();
        for stem in &shared_stems {
            log::warn!("Several back scans are named {}; their replies must mirror the album folders", stem);
        }
        Ok(Self {
            dir,
            discovery,
            shared_stems,
        })
    }

    /// Where the reply for a back scan lives, if anywhere.
    pub fn locate(&self, back: &Path) -> Result<PathBuf, AppError> {
        let stem = file_stem(back);
        let relative = self.discovery.relative_dir(back);
        if let Some(path) = reply_in(&self.dir.join(&relative), &stem) {
            return Ok(path);
        }

        let flat = if relative.as_os_str().is_empty() {
            None
        } else {
            reply_in(self.dir, &stem)
        };
        match flat {
            Some(path) if self.shared_stems.contains(&stem) => Err(AppError::NotFound(format!(
                "reply {} is ambiguous: several back scans are named {}; move it to {}",
                file_name(&path),
                file_name(back),
                self.dir.join(&relative).display()
            ))),
            Some(path) => Ok(path),
            None => Err(AppError::NotFound(format!("no analysis for {}", file_name(back)))),
        }
    }

    /// The reply's path relative to the store, and its decoded content.
    fn load(&self, back: &Path) -> Result<(PathBuf, Analysis), AppError> {
        let path = self.locate(back)?;
        log::trace!("Reading analysis {:?}", path);
        let analysis = analysis::parse_response(&fs::read_to_string(&path)?)?;
        let relative = path.strip_prefix(self.dir).unwrap_or(path.as_path()).to_path_buf();
        Ok((relative, analysis))
    }
}

fn reply_in(dir: &Path, stem: &str) -> Option<PathBuf> {
    ["json", "txt"]
        .iter()
        .map(|ext| dir.join(format!("{}.{}", stem, ext)))
        .find(|path| path.is_file())
}
