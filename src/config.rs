use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct AppConfig {
    pub log_level: String,
    pub exiftool_path: String,
    pub discovery: DiscoveryConfig,
    pub dates: DateConfig,
    pub extraction: ExtractionConfig,
    pub proposal: ProposalConfig,
    pub prepare: PrepareConfig,
    pub geocoder: GeocoderConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DiscoveryConfig {
    pub extensions: Vec<String>,
    pub back_suffixes: Vec<String>,
    pub recursive: bool,
    /// Name fragments that hint at a back scan. Reporting only.
    pub diagnostic_markers: Vec<String>,
    pub diagnostic_prefixes: Vec<String>,
    pub suspicious_markers: Vec<String>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DateConfig {
    pub min_year: i32,
    pub max_year: i32,
    pub future_tolerance: i32,
    /// Two-digit years at or below the pivot land in the 2000s.
    pub two_digit_pivot: i32,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ExtractionConfig {
    pub caption_limit: usize,
    pub comment_limit: usize,
    pub pollution: PollutionConfig,
    pub generic_caption_markers: Vec<String>,
    pub verbatim_pattern: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct PollutionConfig {
    pub prefixes: Vec<String>,
    pub contains: Vec<String>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ProposalConfig {
    pub display_width: usize,
    pub max_list_items: usize,
    pub elide_proposed_values: bool,
    pub descriptive_labels: Vec<String>,
    pub list_fields: Vec<String>,
    pub software_tag: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct PrepareConfig {
    pub max_dimension: u32,
    pub jpeg_quality: u8,
    /// Resize threads; 0 lets rayon pick one per core.
    pub workers: usize,
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct GeocoderConfig {
    pub locations: Vec<KnownLocation>,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct KnownLocation {
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
}

impl AppConfig {
    pub fn new(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let env = std::env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let mut builder = Config::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", env)).required(false))
            .add_source(File::with_name("config/local").required(false));

        if let Some(path) = explicit {
            builder = builder.add_source(File::from(path));
        }

        let s = builder
            .add_source(
                Environment::with_prefix("BACKSCAN")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        s.try_deserialize()
    }
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            log_level: "info".into(),
            exiftool_path: "exiftool".into(),
            discovery: DiscoveryConfig::default(),
            dates: DateConfig::default(),
            extraction: ExtractionConfig::default(),
            proposal: ProposalConfig::default(),
            prepare: PrepareConfig::default(),
            geocoder: GeocoderConfig::default(),
        }
    }
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            extensions: strings(&["jpg", "jpeg", "tif", "tiff"]),
            back_suffixes: strings(&["_b", "_B"]),
            recursive: true,
            diagnostic_markers: strings(&["back", "reverse", "rear"]),
            diagnostic_prefixes: strings(&["fastfoto_"]),
            suspicious_markers: strings(&["side", "verso", "flip", "other", "scan"]),
        }
    }
}

impl Default for DateConfig {
    fn default() -> Self {
        Self {
            min_year: 1966,
            max_year: 2002,
            future_tolerance: 50,
            two_digit_pivot: 30,
        }
    }
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            caption_limit: 1000,
            comment_limit: 2000,
            pollution: PollutionConfig::default(),
            generic_caption_markers: strings(&["mixed handwritten", "multiple elements"]),
            verbatim_pattern: r"^[A-Za-z]+ handwritten text:\s*(.+)$".into(),
        }
    }
}

impl Default for PollutionConfig {
    fn default() -> Self {
        Self {
            prefixes: strings(&[
                "none",
                "n/a",
                "null",
                "unknown",
                "blank",
                "empty",
                "nothing",
                "not visible",
                "not legible",
                "illegible",
                "not found",
                "not applicable",
                "leave empty",
                "no text",
                "no context available",
                "no date",
                "back scan",
            ]),
            contains: strings(&[
                "no handwritten",
                "no aps",
                "not extractable",
                "no machine-printed",
                "no visible text",
                "none visible",
            ]),
        }
    }
}

impl Default for ProposalConfig {
    fn default() -> Self {
        Self {
            display_width: 60,
            max_list_items: 5,
            elide_proposed_values: false,
            descriptive_labels: strings(&[
                "Confidence",
                "Source",
                "Language",
                "Note",
                "Zones with data",
                "Status",
                "Directory",
                "Files",
            ]),
            list_fields: strings(&["Keywords"]),
            software_tag: format!("backscan-ocr {}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl Default for PrepareConfig {
    fn default() -> Self {
        Self {
            max_dimension: 1800,
            jpeg_quality: 85,
            workers: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_match_collection_bounds() {
        let config = AppConfig::default();
        assert_eq!(config.dates.min_year, 1966);
        assert_eq!(config.dates.max_year, 2002);
        assert_eq!(config.dates.two_digit_pivot, 30);
        assert_eq!(config.discovery.back_suffixes, vec!["_b", "_B"]);
        assert_eq!(config.extraction.caption_limit, 1000);
    }

    #[test]
    fn explicit_file_overrides_defaults() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("override.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "[dates]\nmin_year = 1950\n\n[[geocoder.locations]]\nname = \"lima\"\nlatitude = -12.0464\nlongitude = -77.0428").unwrap();

        let config = AppConfig::new(Some(&path)).unwrap();
        assert_eq!(config.dates.min_year, 1950);
        // untouched keys keep their defaults
        assert_eq!(config.dates.max_year, 2002);
        assert!(config.geocoder.locations.iter().any(|l| l.name == "lima"));
    }
}
