// src/metadata.rs

use crate::dates::NormalizedDate;

/// Candidate metadata pulled from one back scan. `None` means "not
/// extracted"; an empty string is never stored.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtractedFields {
    pub date: Option<NormalizedDate>,
    pub location_name: Option<String>,
    pub city: Option<String>,
    pub country: Option<String>,
    pub sublocation: Option<String>,
    pub keywords: Vec<String>,
    pub caption: Option<String>,
    pub user_comment: Option<String>,
    pub roll_id: Option<String>,
    pub frame_number: Option<String>,
    pub lab_code: Option<String>,
    pub confidence: Option<f64>,
    pub language: Option<String>,
}

impl ExtractedFields {
    /// True when nothing worth writing was found. Confidence and language
    /// describe the extraction and do not count as content.
    pub fn is_empty(&self) -> bool {
        self.date.is_none()
            && self.location_name.is_none()
            && self.city.is_none()
            && self.country.is_none()
            && self.sublocation.is_none()
            && self.keywords.is_empty()
            && self.caption.is_none()
            && self.user_comment.is_none()
            && self.roll_id.is_none()
            && self.frame_number.is_none()
            && self.lab_code.is_none()
    }
}
