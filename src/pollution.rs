use crate::config::PollutionConfig;

/// Rejects hedging and prompt-echo text that the vision model sometimes
/// returns in place of an extracted value.
#[derive(Debug, Clone)]
pub struct PollutionFilter {
    prefixes: Vec<String>,
    contains: Vec<String>,
}

impl PollutionFilter {
    pub fn new(config: &PollutionConfig) -> Self {
        Self {
            prefixes: normalize(&config.prefixes),
            contains: normalize(&config.contains),
        }
    }

    pub fn is_polluted(&self, value: &str) -> bool {
        let lowered = value.trim().to_lowercase();
        if lowered.is_empty() {
            return true;
        }

        let prefixed = self.prefixes.iter().any(|phrase| {
            lowered
                .strip_prefix(phrase.as_str())
                .map(|rest| !rest.starts_with(|c: char| c.is_alphanumeric()))
                .unwrap_or(false)
        });

        prefixed || self.contains.iter().any(|phrase| lowered.contains(phrase.as_str()))
    }

    /// Returns the trimmed value, or `None` when it is empty or polluted.
    pub fn clean(&self, value: &str) -> Option<String> {
        if self.is_polluted(value) {
            log::trace!("Discarding polluted value: {:?}", value);
            return None;
        }
        Some(value.trim().to_string())
    }

    pub fn clean_opt(&self, value: Option<&str>) -> Option<String> {
        value.and_then(|v| self.clean(v))
    }

    pub fn clean_all<'a, I>(&self, values: I) -> Vec<String>
    where
        I: IntoIterator<Item = &'a String>,
    {
        values.into_iter().filter_map(|v| self.clean(v)).collect()
    }
}

fn normalize(phrases: &[String]) -> Vec<String> {
    phrases
        .iter()
        .map(|p| p.trim().to_lowercase())
        .filter(|p| !p.is_empty())
        .collect()
}

impl Default for PollutionFilter {
    fn default() -> Self {
        Self::new(&PollutionConfig::default())
    }
}
