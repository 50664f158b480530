use crate::config::{GeocoderConfig, KnownLocation};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

/// Static place-name table. Entries are matched in configuration order.
#[derive(Debug, Clone, Default)]
pub struct Geocoder {
    locations: Vec<KnownLocation>,
}

impl Geocoder {
    pub fn new(config: &GeocoderConfig) -> Self {
        let locations = config
            .locations
            .iter()
            .map(|l| KnownLocation {
                name: normalize(&l.name),
                ..l.clone()
            })
            .filter(|l| !l.name.is_empty())
            .collect::<Vec<_>>();
        log::debug!("Geocoder loaded {} known locations", locations.len());
        Self { locations }
    }

    pub fn is_empty(&self) -> bool {
        self.locations.is_empty()
    }

    /// Exact name match first, then the first entry whose words appear in
    /// the query or whose name contains the query's words.
    pub fn lookup(&self, name: &str) -> Option<Coordinates> {
        let query = normalize(name);
        if query.is_empty() {
            return None;
        }

        let found = self
            .locations
            .iter()
            .find(|l| l.name == query)
            .or_else(|| {
                self.locations
                    .iter()
                    .find(|l| contains_words(&query, &l.name) || contains_words(&l.name, &query))
            });

        match found {
            Some(location) => {
                log::debug!("Geocoded {:?} via {:?}", name, location.name);
                Some(Coordinates {
                    latitude: location.latitude,
                    longitude: location.longitude,
                })
            }
            None => {
                log::debug!("No coordinates known for {:?}", name);
                None
            }
        }
    }

    pub fn lookup_components(
        &self,
        city: Option<&str>,
        country: Option<&str>,
        sublocation: Option<&str>,
    ) -> Option<Coordinates> {
        if let (Some(city), Some(country)) = (city, country) {
            if let Some(found) = self.lookup(&format!("{}, {}", city, country)) {
                return Some(found);
            }
        }
        [city, sublocation, country]
            .into_iter()
            .flatten()
            .find_map(|name| self.lookup(name))
    }
}

fn normalize(name: &str) -> String {
    name.trim().to_lowercase()
}

fn words(text: &str) -> Vec<&str> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect()
}

/// Whether `needle`'s words occur contiguously in `haystack`.
fn contains_words(haystack: &str, needle: &str) -> bool {
    let haystack = words(haystack);
    let needle = words(needle);
    !needle.is_empty() && haystack.windows(needle.len()).any(|w| w == needle.as_slice())
}
