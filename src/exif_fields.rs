//! EXIF field mapping and the metadata tool that reads and writes it.

use crate::config::AppConfig;
use crate::error::AppError;
use crate::extractor::{truncate_chars, VerbatimRule};
use crate::geocoder::Coordinates;
use crate::metadata::ExtractedFields;
use exif::{In, Reader, Tag, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::process::Command;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    Text(String),
    List(Vec<String>),
}

impl FieldValue {
    pub fn is_empty(&self) -> bool {
        match self {
            FieldValue::Text(s) => s.trim().is_empty(),
            FieldValue::List(items) => items.iter().all(|s| s.trim().is_empty()),
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Text(s) => write!(f, "{}", s),
            FieldValue::List(items) => write!(f, "{}", items.join(", ")),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::Text(value)
    }
}

/// EXIF orientation as read back by `read_fields`, `1` to `8`.
pub const ORIENTATION: &str = "Orientation";

/// Field name to value, ordered by name.
pub type FieldMap = BTreeMap<String, FieldValue>;

/// Reads and writes image metadata.
pub trait MetadataTool {
    fn read_fields(&self, path: &Path) -> Result<FieldMap, AppError>;
    fn write_fields(&self, path: &Path, fields: &FieldMap, overwrite: bool) -> Result<(), AppError>;
}

/// Builds the field mapping handed to the metadata tool.
pub fn build_update(
    fields: &ExtractedFields,
    geo: Option<Coordinates>,
    verbatim: &VerbatimRule,
    config: &AppConfig,
) -> FieldMap {
    let mut update = FieldMap::new();
    let mut set = |name: &str, value: FieldValue| {
        if !value.is_empty() {
            update.insert(name.to_string(), value);
        }
    };
    let caption_limit = config.extraction.caption_limit;
    let comment_limit = config.extraction.comment_limit;

    if let Some(date) = fields.date {
        let stamp = date.exif_datetime();
        set("DateTimeOriginal", stamp.clone().into());
        set("CreateDate", stamp.clone().into());
        set("ModifyDate", stamp.into());
        if geo.is_some() {
            set("GPSDateStamp", date.exif_date().into());
            set("GPSTimeStamp", date.exif_time().into());
        }
    }

    if let Some(coordinates) = geo {
        let (latitude, latitude_ref) = gps_coordinate(coordinates.latitude, "N", "S");
        let (longitude, longitude_ref) = gps_coordinate(coordinates.longitude, "E", "W");
        set("GPSLatitude", latitude.into());
        set("GPSLatitudeRef", latitude_ref.into());
        set("GPSLongitude", longitude.into());
        set("GPSLongitudeRef", longitude_ref.into());
    }

    for (name, value) in [
        ("LocationCreatedLocationName", &fields.location_name),
        ("LocationCreatedCity", &fields.city),
        ("LocationCreatedCountryName", &fields.country),
        ("LocationCreatedSublocation", &fields.sublocation),
    ] {
        if let Some(value) = value {
            set(name, value.as_str().into());
        }
    }

    let payload = fields
        .user_comment
        .as_deref()
        .and_then(|comment| verbatim.payload(comment));

    let caption = match (&fields.caption, &payload) {
        (Some(caption), Some(payload)) if verbatim.is_generic_caption(caption) => {
            log::debug!("Replacing generic caption {:?} with transcription", caption);
            Some(payload.clone())
        }
        (None, Some(payload)) => Some(payload.clone()),
        (caption, _) => caption.clone(),
    };
    if let Some(caption) = caption {
        let caption = truncate_chars(&caption, caption_limit);
        set("Caption-Abstract", caption.clone().into());
        set("Description", caption.into());
    }

    if !fields.keywords.is_empty() {
        set("Keywords", FieldValue::List(fields.keywords.clone()));
    }

    if let Some(comment) = &fields.user_comment {
        let mut annotated = comment.clone();
        if let Some(language) = &fields.language {
            annotated.push_str(&format!(" [Language: {}]", language));
        }
        if let Some(confidence) = fields.confidence {
            annotated.push_str(&format!(" [Confidence: {:.2}]", confidence));
        }
        set("UserComment", truncate_chars(&annotated, comment_limit).into());
    }

    if let Some(roll) = &fields.roll_id {
        set("ImageUniqueID", roll.as_str().into());
        set("CameraSerialNumber", roll.as_str().into());
    }
    if let Some(frame) = &fields.frame_number {
        set("ImageNumber", frame.as_str().into());
    }
    if let Some(lab) = &fields.lab_code {
        set("Make", format!("Processed by {}", lab).into());
    }

    match payload {
        Some(payload) => set("ImageDescription", truncate_chars(&payload, caption_limit).into()),
        None => {
            let mut parts = Vec::new();
            if let Some(confidence) = fields.confidence {
                parts.push(format!("OCR Confidence: {:.2}", confidence));
            }
            if let Some(language) = &fields.language {
                parts.push(format!("Language: {}", language));
            }
            if !parts.is_empty() {
                set("ImageDescription", parts.join(" | ").into());
            }
        }
    }

    set("Software", config.proposal.software_tag.as_str().into());
    update
}

/// Decimal degrees to the "D, M, S.ssss" form plus hemisphere reference.
pub fn gps_coordinate(decimal: f64, positive: &str, negative: &str) -> (String, String) {
    let reference = if decimal >= 0.0 { positive } else { negative };
    let absolute = decimal.abs();
    let degrees = absolute.trunc();
    let minutes_decimal = (absolute - degrees) * 60.0;
    let minutes = minutes_decimal.trunc();
    let seconds = (minutes_decimal - minutes) * 60.0;
    (
        format!("{}, {}, {:.4}", degrees as u32, minutes as u32, seconds),
        reference.to_string(),
    )
}

/// Reads with kamadak-exif and writes by shelling out to `exiftool`.
#[derive(Debug, Clone)]
pub struct ExifTool {
    exiftool_path: PathBuf,
}

impl ExifTool {
    pub fn new(exiftool_path: impl Into<PathBuf>) -> Self {
        Self {
            exiftool_path: exiftool_path.into(),
        }
    }
}

impl MetadataTool for ExifTool {
    fn read_fields(&self, path: &Path) -> Result<FieldMap, AppError> {
        log::trace!("Extracting EXIF data for image: {:?}", path);
        let file = File::open(path)?;
        let mut buf_reader = BufReader::new(file);
        let exif = match Reader::new().read_from_container(&mut buf_reader) {
            Ok(exif) => exif,
            Err(exif::Error::NotFound(_)) => {
                log::debug!("No EXIF data found for {:?}", path);
                return Ok(FieldMap::new());
            }
            Err(e) => return Err(e.into()),
        };

        let mut fields = FieldMap::new();
        for (name, tag) in [
            ("DateTimeOriginal", Tag::DateTimeOriginal),
            ("ImageDescription", Tag::ImageDescription),
            ("ImageUniqueID", Tag::ImageUniqueID),
            ("Make", Tag::Make),
            ("Software", Tag::Software),
        ] {
            if let Some(field) = exif.get_field(tag, In::PRIMARY) {
                if let Some(text) = ascii_value(&field.value) {
                    fields.insert(name.to_string(), FieldValue::Text(text));
                }
            }
        }

        if let Some(value) = exif
            .get_field(Tag::Orientation, In::PRIMARY)
            .and_then(|field| field.value.get_uint(0))
        {
            fields.insert(ORIENTATION.to_string(), FieldValue::Text(value.to_string()));
        }

        if let Some(field) = exif.get_field(Tag::UserComment, In::PRIMARY) {
            let text = field.display_value().to_string();
            if !text.trim().is_empty() {
                fields.insert("UserComment".to_string(), FieldValue::Text(text));
            }
        }

        for (name, tag, ref_tag, negative) in [
            ("GPSLatitude", Tag::GPSLatitude, Tag::GPSLatitudeRef, "S"),
            ("GPSLongitude", Tag::GPSLongitude, Tag::GPSLongitudeRef, "W"),
        ] {
            let Some(field) = exif.get_field(tag, In::PRIMARY) else {
                continue;
            };
            if let Value::Rational(parts) = &field.value {
                let mut degrees: f64 = parts
                    .iter()
                    .zip([1.0, 60.0, 3600.0])
                    .map(|(v, scale)| v.to_f64() / scale)
                    .sum();
                let reference = exif
                    .get_field(ref_tag, In::PRIMARY)
                    .and_then(|f| ascii_value(&f.value));
                if reference.as_deref() == Some(negative) {
                    degrees = -degrees;
                }
                fields.insert(name.to_string(), FieldValue::Text(format!("{:.6}", degrees)));
            }
        }

        log::trace!("Current EXIF for {:?}: {:?}", path, fields);
        Ok(fields)
    }

    fn write_fields(&self, path: &Path, fields: &FieldMap, overwrite: bool) -> Result<(), AppError> {
        if !path.is_file() {
            return Err(AppError::NotFound(format!("image file {:?}", path)));
        }

        let args = exiftool_args(fields, overwrite);
        log::debug!("ExifTool command: {:?} {}", self.exiftool_path, args.join(" "));

        let output = Command::new(&self.exiftool_path)
            .args(&args)
            .arg(path)
            .output()
            .map_err(|e| AppError::ExifTool(format!("could not run {:?}: {}", self.exiftool_path, e)))?;

        if !output.status.success() {
            return Err(AppError::ExifTool(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }
        log::info!("Successfully wrote EXIF to {:?}", path);
        Ok(())
    }
}

/// Command-line arguments for one write; list values repeat the tag.
pub fn exiftool_args(fields: &FieldMap, overwrite: bool) -> Vec<String> {
    let mut args = Vec::new();
    if overwrite {
        args.push("-overwrite_original".to_string());
    }
    for (name, value) in fields {
        match value {
            FieldValue::Text(text) if !text.is_empty() => args.push(format!("-{}={}", name, text)),
            FieldValue::Text(_) => {}
            FieldValue::List(items) => args.extend(
                items
                    .iter()
                    .filter(|item| !item.is_empty())
                    .map(|item| format!("-{}={}", name, item)),
            ),
        }
    }
    args
}

fn ascii_value(value: &Value) -> Option<String> {
    match value {
        Value::Ascii(parts) => parts
            .iter()
            .map(|bytes| String::from_utf8_lossy(bytes).trim_end_matches('\0').trim().to_string())
            .find(|s| !s.is_empty()),
        _ => None,
    }
}
