//! Typed form of the reply the vision model returns for one back scan.

use crate::error::AppError;
use serde::{Deserialize, Deserializer};
use serde_json::Value;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Analysis {
    #[serde(deserialize_with = "lenient_bool")]
    pub is_useful: Option<bool>,
    #[serde(deserialize_with = "lenient_f64")]
    pub confidence: Option<f64>,
    pub zone_1_bottom_edge: Option<MachineZone>,
    pub zone_2_center: Option<MachineZone>,
    pub zone_3_vertical: Option<VerticalZone>,
    pub zone_4_handwritten: Option<HandwrittenZone>,
    #[serde(deserialize_with = "lenient_strings")]
    pub all_dates_found: Vec<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub raw_ocr_complete: Option<String>,
}

/// Zones 1 and 2: machine-printed lab and camera stamps.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MachineZone {
    #[serde(deserialize_with = "lenient_bool")]
    pub found: Option<bool>,
    #[serde(deserialize_with = "lenient_string")]
    pub text: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub roll_id: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub frame: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub date: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub time: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub lab_code: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct VerticalZone {
    #[serde(deserialize_with = "lenient_bool")]
    pub found: Option<bool>,
    #[serde(deserialize_with = "lenient_string")]
    pub text: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub orientation: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct HandwrittenZone {
    #[serde(deserialize_with = "lenient_bool")]
    pub found: Option<bool>,
    #[serde(deserialize_with = "lenient_strings")]
    pub dates: Vec<String>,
    #[serde(deserialize_with = "lenient_locations")]
    pub locations: Vec<Location>,
    #[serde(deserialize_with = "lenient_strings")]
    pub people: Vec<String>,
    #[serde(deserialize_with = "lenient_strings")]
    pub events: Vec<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub descriptive_text: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub language: Option<String>,
}

/// A location is either a bare name or a structured record.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Location {
    pub text: Option<String>,
    pub city: Option<String>,
    pub country: Option<String>,
    pub neighborhood: Option<String>,
}

impl MachineZone {
    pub fn is_found(&self) -> bool {
        self.found != Some(false)
    }
}

impl VerticalZone {
    pub fn is_found(&self) -> bool {
        self.found != Some(false)
    }
}

impl HandwrittenZone {
    pub fn is_found(&self) -> bool {
        self.found != Some(false)
    }
}

impl Analysis {
    /// Only an explicit `false` marks the reply as useless.
    pub fn is_useful(&self) -> bool {
        self.is_useful != Some(false)
    }

    pub fn bottom_edge(&self) -> Option<&MachineZone> {
        self.zone_1_bottom_edge.as_ref().filter(|z| z.is_found())
    }

    pub fn center(&self) -> Option<&MachineZone> {
        self.zone_2_center.as_ref().filter(|z| z.is_found())
    }

    pub fn vertical(&self) -> Option<&VerticalZone> {
        self.zone_3_vertical.as_ref().filter(|z| z.is_found())
    }

    pub fn handwritten(&self) -> Option<&HandwrittenZone> {
        self.zone_4_handwritten.as_ref().filter(|z| z.is_found())
    }

    /// Names of the zones that reported content.
    pub fn zones_found(&self) -> Vec<String> {
        let mut zones = Vec::new();
        if self.bottom_edge().is_some() {
            zones.push("zone_1_bottom_edge".to_string());
        }
        if self.center().is_some() {
            zones.push("zone_2_center".to_string());
        }
        if self.vertical().is_some() {
            zones.push("zone_3_vertical".to_string());
        }
        if self.handwritten().is_some() {
            zones.push("zone_4_handwritten".to_string());
        }
        zones
    }

    /// The zones that held data, as a reader would name them:
    /// `Zone 1 (bottom edge) + Zone 4 (handwritten)`.
    pub fn source_description(&self) -> Option<String> {
        let described: Vec<&str> = [
            (self.bottom_edge().is_some(), "Zone 1 (bottom edge)"),
            (self.center().is_some(), "Zone 2 (center)"),
            (self.vertical().is_some(), "Zone 3 (vertical)"),
            (self.handwritten().is_some(), "Zone 4 (handwritten)"),
        ]
        .into_iter()
        .filter_map(|(found, label)| found.then_some(label))
        .collect();
        (!described.is_empty()).then(|| described.join(" + "))
    }
}

/// Decodes a model reply that may wrap its JSON in prose or a Markdown fence.
pub fn parse_response(text: &str) -> Result<Analysis, AppError> {
    let body = json_body(text)
        .ok_or_else(|| AppError::InvalidAnalysis("no JSON object found in response".into()))?;
    let analysis: Analysis = serde_json::from_str(body)
        .map_err(|e| AppError::InvalidAnalysis(format!("undecodable analysis: {}", e)))?;
    log::debug!(
        "Decoded analysis: useful={}, confidence={:?}, zones={:?}",
        analysis.is_useful(),
        analysis.confidence,
        analysis.zones_found()
    );
    Ok(analysis)
}

fn json_body(text: &str) -> Option<&str> {
    let trimmed = text.trim();
    if let Some(start) = trimmed.find("```") {
        let after_fence = &trimmed[start + 3..];
        // skip the info string, e.g. "json"
        let content_start = after_fence.find('\n').map(|i| i + 1).unwrap_or(0);
        let content = &after_fence[content_start..];
        if let Some(end) = content.find("```") {
            let inner = content[..end].trim();
            if inner.starts_with('{') {
                return Some(inner);
            }
        }
    }

    let start = trimmed.find('{')?;
    let end = trimmed.rfind('}')?;
    (end > start).then(|| &trimmed[start..=end])
}

fn value_to_string(value: Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        other => Some(other.to_string()),
    }
}

fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(value_to_string(Value::deserialize(deserializer)?))
}

fn lenient_strings<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Array(items) => items.into_iter().filter_map(value_to_string).collect(),
        other => value_to_string(other).into_iter().collect(),
    })
}

fn lenient_bool<'de, D>(deserializer: D) -> Result<Option<bool>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Bool(b) => Some(b),
        Value::String(s) => match s.trim().to_lowercase().as_str() {
            "true" | "yes" => Some(true),
            "false" | "no" => Some(false),
            _ => None,
        },
        _ => None,
    })
}

fn lenient_f64<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    })
}

fn lenient_locations<'de, D>(deserializer: D) -> Result<Vec<Location>, D::Error>
where
    D: Deserializer<'de>,
{
    let items = match Value::deserialize(deserializer)? {
        Value::Array(items) => items,
        Value::Null => Vec::new(),
        other => vec![other],
    };

    Ok(items.into_iter().filter_map(location_from_value).collect())
}

fn location_from_value(value: Value) -> Option<Location> {
    match value {
        Value::Object(mut map) => {
            let mut field = |key: &str| map.remove(key).and_then(value_to_string);
            Some(Location {
                text: field("text").or_else(|| field("name")),
                city: field("city"),
                country: field("country"),
                neighborhood: field("neighborhood"),
            })
        }
        other => value_to_string(other).map(|text| Location {
            text: Some(text),
            ..Location::default()
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const REPLY: &str = r#"Here is what I found:

```json
{
  "is_useful": true,
  "confidence": 0.92,
  "zone_1_bottom_edge": {"found": true, "roll_id": "123-456", "frame": 24, "date": "99/JUN/7 11:32AM", "lab_code": null},
  "zone_2_center": {"found": false, "roll_id": "ID999-999"},
  "zone_4_handwritten": {
    "found": true,
    "dates": ["Junio 1999"],
    "locations": ["Lima", {"text": "Parque Kennedy", "city": "Lima", "country": "Peru", "neighborhood": "Miraflores"}],
    "people": ["Carmen"],
    "events": null,
    "descriptive_text": "Cumpleaños de Carmen",
    "language": "es"
  },
  "all_dates_found": ["99/JUN/7 11:32AM", "Junio 1999"]
}
```
"#;

    #[test]
    fn fenced_reply_decodes() {
        let analysis = parse_response(REPLY).unwrap();
        assert!(analysis.is_useful());
        assert_eq!(analysis.confidence, Some(0.92));

        let zone1 = analysis.bottom_edge().unwrap();
        assert_eq!(zone1.frame.as_deref(), Some("24"));
        assert_eq!(zone1.lab_code, None);

        // found=false hides the zone
        assert!(analysis.center().is_none());

        let zone4 = analysis.handwritten().unwrap();
        assert!(zone4.events.is_empty());
        assert_eq!(zone4.locations[0].text.as_deref(), Some("Lima"));
        assert_eq!(zone4.locations[1].neighborhood.as_deref(), Some("Miraflores"));
        assert_eq!(
            analysis.zones_found(),
            vec!["zone_1_bottom_edge", "zone_4_handwritten"]
        );
        assert_eq!(
            analysis.source_description().as_deref(),
            Some("Zone 1 (bottom edge) + Zone 4 (handwritten)")
        );
    }

    #[test]
    fn bare_object_in_prose_decodes() {
        let analysis = parse_response("Sure. {\"is_useful\": false, \"confidence\": \"0.3\"} Done.").unwrap();
        assert!(!analysis.is_useful());
        assert_eq!(analysis.confidence, Some(0.3));
        assert!(analysis.zones_found().is_empty());
        assert_eq!(analysis.source_description(), None);
    }

    #[test]
    fn missing_object_is_invalid() {
        let err = parse_response("I could not read this image.").unwrap_err();
        assert!(matches!(err, AppError::InvalidAnalysis(_)));
    }
}
