//! Free-text date normalisation for photo-back transcriptions.
//!
//! Inputs range from handwritten Spanish ("27 de Noviembre de 1983") through
//! machine lab stamps ("02.11.17") and APS prints ("99/JUN/7 11:32AM") to a
//! bare year buried in noise. Each input is run through an ordered chain of
//! attempts; the first one that yields an in-range date wins.

use crate::config::DateConfig;
use chrono::NaiveDate;
use lazy_static::lazy_static;
use regex::Regex;
use std::fmt;

const SPANISH_MONTHS: &[(&str, &str)] = &[
    ("enero", "january"),
    ("febrero", "february"),
    ("marzo", "march"),
    ("abril", "april"),
    ("mayo", "may"),
    ("junio", "june"),
    ("julio", "july"),
    ("agosto", "august"),
    ("septiembre", "september"),
    ("setiembre", "september"),
    ("octubre", "october"),
    ("noviembre", "november"),
    ("diciembre", "december"),
];

const ENGLISH_MONTHS: &[&str] = &[
    "january", "february", "march", "april", "may", "june", "july", "august", "september",
    "october", "november", "december",
];

const APS_MONTH_CODES: &[&str] = &[
    "JAN", "FEB", "MAR", "APR", "MAY", "JUN", "JUL", "AUG", "SEP", "OCT", "NOV", "DEC",
];

lazy_static! {
    static ref TIME_OF_DAY: Regex =
        Regex::new(r"(?i)\b(\d{1,2}):(\d{2})(?::\d{2})?(?:\s*([ap])\.?m\b\.?)?").unwrap();
    static ref NUMERIC_TRIPLE: Regex =
        Regex::new(r"\b(\d{1,4})([/.\-])(\d{1,2})[/.\-](\d{1,4})\b").unwrap();
    static ref TOKEN: Regex = Regex::new(r"\p{L}+|\d+").unwrap();
    static ref APS_STAMP: Regex =
        Regex::new(r"(?i)(\d{2})/([a-z]{3})/(\d{1,2})\s+(\d{1,2}):(\d{2})\s*(AM|PM)").unwrap();
    static ref LAB_STAMP: Regex = Regex::new(r"(\d{2})[./](\d{2})[./](\d{2})").unwrap();
    static ref YEAR_ONLY: Regex = Regex::new(r"\b(19\d{2}|20[0-2]\d)\b").unwrap();
}

/// A calendar date with an optional time of day.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NormalizedDate {
    pub year: i32,
    pub month: u32,
    pub day: u32,
    pub hour: Option<u32>,
    pub minute: Option<u32>,
}

impl NormalizedDate {
    /// Builds a date, rejecting impossible calendar or clock values.
    pub fn new(year: i32, month: u32, day: u32, time: Option<(u32, u32)>) -> Option<Self> {
        NaiveDate::from_ymd_opt(year, month, day)?;
        if let Some((hour, minute)) = time {
            if hour > 23 || minute > 59 {
                return None;
            }
        }
        Some(Self {
            year,
            month,
            day,
            hour: time.map(|(h, _)| h),
            minute: time.map(|(_, m)| m),
        })
    }

    pub fn has_time(&self) -> bool {
        self.hour.is_some()
    }

    /// Rewards components that were actually written rather than defaulted.
    pub fn precision_score(&self) -> u32 {
        let mut score = 0;
        if self.day != 1 {
            score += 100;
        }
        if self.month != 1 {
            score += 10;
        }
        if self.has_time() {
            score += 1;
        }
        score
    }

    /// `YYYY:MM:DD HH:MM:SS`, the EXIF date-time layout.
    pub fn exif_datetime(&self) -> String {
        format!("{} {}", self.exif_date(), self.exif_time())
    }

    pub fn exif_date(&self) -> String {
        format!("{:04}:{:02}:{:02}", self.year, self.month, self.day)
    }

    pub fn exif_time(&self) -> String {
        format!("{:02}:{:02}:00", self.hour.unwrap_or(0), self.minute.unwrap_or(0))
    }
}

impl fmt::Display for NormalizedDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}-{:02}", self.year, self.month, self.day)?;
        if let (Some(h), Some(m)) = (self.hour, self.minute) {
            write!(f, " {:02}:{:02}", h, m)?;
        }
        Ok(())
    }
}

/// Result of the general-purpose scan before century resolution.
#[derive(Debug, Clone, Copy, PartialEq)]
struct FuzzyDate {
    year: i32,
    two_digit_year: bool,
    month: u32,
    day: u32,
    time: Option<(u32, u32)>,
    /// Read from a `D/M/Y` or `D-M-Y` triple rather than a dotted stamp.
    slashed_triple: bool,
}

type Attempt = fn(&DateNormalizer, &str, Option<FuzzyDate>) -> Option<NormalizedDate>;

const ATTEMPTS: &[(&str, Attempt)] = &[
    ("fuzzy", DateNormalizer::attempt_fuzzy),
    ("day-first triple", DateNormalizer::attempt_day_first_triple),
    ("aps stamp", DateNormalizer::attempt_aps),
    ("lab stamp", DateNormalizer::attempt_lab_stamp),
    ("year only", DateNormalizer::attempt_year_only),
    ("fuzzy two-digit", DateNormalizer::attempt_fuzzy_two_digit),
];

#[derive(Debug, Clone)]
pub struct DateNormalizer {
    config: DateConfig,
}

impl DateNormalizer {
    pub fn new(config: DateConfig) -> Self {
        log::debug!(
            "DateNormalizer range {}-{} (+{}), two-digit pivot {}",
            config.min_year,
            config.max_year,
            config.future_tolerance,
            config.two_digit_pivot
        );
        Self { config }
    }

    /// Parses one free-text date. Never fails: anything unparseable or out of
    /// the collection range yields `None`.
    pub fn parse(&self, text: &str) -> Option<NormalizedDate> {
        let text = text.trim();
        if text.is_empty() {
            return None;
        }

        let fuzzy = fuzzy_parse(&normalize_spanish(text));

        for (name, attempt) in ATTEMPTS {
            let Some(date) = attempt(self, text, fuzzy) else {
                continue;
            };
            if self.in_range(date.year) {
                log::debug!("Parsed '{}' -> {} ({})", text, date, name);
                return Some(date);
            }
            log::warn!("Year {} out of range for '{}' ({})", date.year, text, name);
        }

        log::debug!("Could not parse '{}'", text);
        None
    }

    /// Parses every candidate independently, keeping input order.
    pub fn parse_all<'a, S: AsRef<str>>(
        &self,
        candidates: &'a [S],
    ) -> Vec<(&'a str, Option<NormalizedDate>)> {
        candidates
            .iter()
            .map(|c| (c.as_ref(), self.parse(c.as_ref())))
            .collect()
    }

    /// Picks the most specific date among the candidates; ties go to the
    /// earliest candidate.
    pub fn get_best<S: AsRef<str>>(&self, candidates: &[S]) -> Option<NormalizedDate> {
        let mut best: Option<(&str, NormalizedDate)> = None;
        for (source, parsed) in self.parse_all(candidates) {
            let Some(date) = parsed else { continue };
            match best {
                Some((_, current)) if current.precision_score() >= date.precision_score() => {}
                _ => best = Some((source, date)),
            }
        }

        if let Some((source, date)) = best {
            log::info!("Best date from {} candidates: {} (from '{}')", candidates.len(), date, source);
        }
        best.map(|(_, date)| date)
    }

    pub fn two_digit_year_to_full(&self, yy: i32) -> i32 {
        if yy <= self.config.two_digit_pivot {
            2000 + yy
        } else {
            1900 + yy
        }
    }

    fn in_range(&self, year: i32) -> bool {
        year >= self.config.min_year && year <= self.config.max_year + self.config.future_tolerance
    }

    fn attempt_fuzzy(&self, _text: &str, fuzzy: Option<FuzzyDate>) -> Option<NormalizedDate> {
        let f = fuzzy.filter(|f| !f.two_digit_year)?;
        NormalizedDate::new(f.year, f.month, f.day, f.time)
    }

    /// `02/04/22` is day-first; only dotted stamps are left to the lab
    /// stamp matcher.
    fn attempt_day_first_triple(&self, _text: &str, fuzzy: Option<FuzzyDate>) -> Option<NormalizedDate> {
        let f = fuzzy.filter(|f| f.two_digit_year && f.slashed_triple)?;
        NormalizedDate::new(self.two_digit_year_to_full(f.year), f.month, f.day, f.time)
    }

    fn attempt_fuzzy_two_digit(&self, _text: &str, fuzzy: Option<FuzzyDate>) -> Option<NormalizedDate> {
        let f = fuzzy.filter(|f| f.two_digit_year)?;
        NormalizedDate::new(self.two_digit_year_to_full(f.year), f.month, f.day, f.time)
    }

    fn attempt_aps(&self, text: &str, _fuzzy: Option<FuzzyDate>) -> Option<NormalizedDate> {
        let caps = APS_STAMP.captures(text)?;
        let year = self.two_digit_year_to_full(caps[1].parse().ok()?);
        let code = caps[2].to_uppercase();
        let month = APS_MONTH_CODES.iter().position(|c| *c == code)? as u32 + 1;
        let day: u32 = caps[3].parse().ok()?;
        let hour = to_24_hour(caps[4].parse().ok()?, Some(&caps[6]))?;
        let minute: u32 = caps[5].parse().ok()?;
        NormalizedDate::new(year, month, day, Some((hour, minute)))
    }

    fn attempt_lab_stamp(&self, text: &str, _fuzzy: Option<FuzzyDate>) -> Option<NormalizedDate> {
        let caps = LAB_STAMP.captures(text)?;
        let year = self.two_digit_year_to_full(caps[1].parse().ok()?);
        let first: u32 = caps[2].parse().ok()?;
        let second: u32 = caps[3].parse().ok()?;
        NormalizedDate::new(year, first, second, None)
            .or_else(|| NormalizedDate::new(year, second, first, None))
    }

    fn attempt_year_only(&self, text: &str, _fuzzy: Option<FuzzyDate>) -> Option<NormalizedDate> {
        let caps = YEAR_ONLY.captures(text)?;
        NormalizedDate::new(caps[1].parse().ok()?, 1, 1, None)
    }
}

impl Default for DateNormalizer {
    fn default() -> Self {
        Self::new(DateConfig::default())
    }
}

/// Lowercases the input and swaps Spanish month names for English ones.
pub fn normalize_spanish(text: &str) -> String {
    let mut normalized = text.to_lowercase();
    for (spanish, english) in SPANISH_MONTHS {
        if normalized.contains(spanish) {
            normalized = normalized.replace(spanish, english);
        }
    }
    normalized
}

fn to_24_hour(hour: u32, meridiem: Option<&str>) -> Option<u32> {
    match meridiem.map(|m| m.to_ascii_lowercase()) {
        Some(m) if m.starts_with('p') => Some(if hour == 12 { 12 } else { hour + 12 }),
        Some(m) if m.starts_with('a') => Some(if hour == 12 { 0 } else { hour }),
        _ => Some(hour),
    }
    .filter(|h| *h < 24)
}

/// Full names and 3+-letter abbreviations, English or Spanish ("dic", "set").
fn month_from_word(word: &str) -> Option<u32> {
    if word.chars().count() < 3 {
        return None;
    }
    ENGLISH_MONTHS
        .iter()
        .position(|name| name.starts_with(word))
        .map(|i| i as u32 + 1)
        .or_else(|| {
            let (_, english) = SPANISH_MONTHS.iter().find(|(spanish, _)| spanish.starts_with(word))?;
            ENGLISH_MONTHS.iter().position(|name| name == english).map(|i| i as u32 + 1)
        })
}

/// A four-digit token that reads as a year rather than a frame or lot
/// number: `19xx`/`20xx` first, then anything without a leading zero.
fn year_token_rank(token: &str) -> Option<u8> {
    if token.starts_with("19") || token.starts_with("20") {
        Some(0)
    } else if token.starts_with('0') {
        None
    } else {
        Some(1)
    }
}

fn is_valid_day_month(day: u32, month: u32) -> bool {
    (1..=12).contains(&month) && (1..=31).contains(&day)
}

/// Tolerant scan over text that may surround the date with anything.
/// Numeric triples are read day-first unless they lead with a 4-digit year;
/// a triple that is no valid date is blanked and the scan goes on.
fn fuzzy_parse(text: &str) -> Option<FuzzyDate> {
    let mut rest = text.to_string();
    let mut time = None;

    if let Some(caps) = TIME_OF_DAY.captures(text) {
        let hour: Option<u32> = caps[1].parse().ok();
        let minute: Option<u32> = caps[2].parse().ok();
        let meridiem = caps.get(3).map(|m| m.as_str());
        if let (Some(hour), Some(minute)) = (hour.and_then(|h| to_24_hour(h, meridiem)), minute) {
            if minute < 60 {
                time = Some((hour, minute));
            }
        }
        let span = caps.get(0).map(|m| m.range()).unwrap_or(0..0);
        rest.replace_range(span, " ");
    }

    let triple = NUMERIC_TRIPLE.captures(&rest).map(|caps| {
        let span = caps.get(0).map(|m| m.range()).unwrap_or(0..0);
        (triple_date(&caps, time), span)
    });
    if let Some((date, span)) = triple {
        if date.is_some() {
            return date;
        }
        rest.replace_range(span, " ");
    }

    let mut month = None;
    let mut year: Option<(u8, i32)> = None;
    let mut small_numbers: Vec<u32> = Vec::new();

    for token in TOKEN.find_iter(&rest).map(|m| m.as_str()) {
        if token.chars().all(|c| c.is_ascii_digit()) {
            match token.len() {
                4 => {
                    let candidate = year_token_rank(token).zip(token.parse::<i32>().ok());
                    if let Some((rank, value)) = candidate {
                        if year.map_or(true, |(best, _)| rank < best) {
                            year = Some((rank, value));
                        }
                    }
                }
                1 | 2 => small_numbers.extend(token.parse::<u32>().ok()),
                _ => {}
            }
        } else if month.is_none() {
            month = month_from_word(token);
        }
    }

    let mut year = year.map(|(_, value)| value);
    let mut two_digit_year = false;
    if year.is_none() && month.is_some() {
        // "Junio 99": with a month name, a lone number is the year
        let index = small_numbers
            .iter()
            .position(|n| *n > 31)
            .or_else(|| small_numbers.len().checked_sub(1));
        if let Some(index) = index {
            year = Some(small_numbers.remove(index) as i32);
            two_digit_year = true;
        }
    }

    let year = year?;
    let day = match month {
        Some(_) => small_numbers.iter().copied().find(|n| (1..=31).contains(n)).unwrap_or(1),
        None => 1,
    };

    Some(FuzzyDate {
        year,
        two_digit_year,
        month: month.unwrap_or(1),
        day,
        time,
        slashed_triple: false,
    })
}

fn triple_date(caps: &regex::Captures<'_>, time: Option<(u32, u32)>) -> Option<FuzzyDate> {
    let (a, separator, b, c) = (&caps[1], &caps[2], &caps[3], &caps[4]);
    let (year_text, mut month, mut day): (&str, u32, u32) = if a.len() == 4 {
        (a, b.parse().ok()?, c.parse().ok()?)
    } else {
        (c, b.parse().ok()?, a.parse().ok()?)
    };
    if year_text.len() == 3 {
        return None;
    }
    if !is_valid_day_month(day, month) && is_valid_day_month(month, day) {
        std::mem::swap(&mut day, &mut month);
    }
    if !is_valid_day_month(day, month) {
        return None;
    }
    Some(FuzzyDate {
        year: year_text.parse().ok()?,
        two_digit_year: year_text.len() <= 2,
        month,
        day,
        time,
        slashed_triple: separator != ".",
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ymd(date: Option<NormalizedDate>) -> Option<(i32, u32, u32)> {
        date.map(|d| (d.year, d.month, d.day))
    }

    #[test]
    fn aps_stamp_keeps_time() {
        let parser = DateNormalizer::default();
        let date = parser.parse("99/JUN/7 11:32AM").unwrap();
        assert_eq!((date.year, date.month, date.day), (1999, 6, 7));
        assert_eq!((date.hour, date.minute), (Some(11), Some(32)));

        let pm = parser.parse("99/may/14 06:14PM ID529-981 <10> 1KM44").unwrap();
        assert_eq!((pm.month, pm.day, pm.hour), (5, 14, Some(18)));
    }

    #[test]
    fn lab_stamp_century() {
        let parser = DateNormalizer::default();
        assert_eq!(ymd(parser.parse("02.11.17")), Some((2002, 11, 17)));
        assert_eq!(ymd(parser.parse("85.01.31")), Some((1985, 1, 31)));
        assert_eq!(ymd(parser.parse("352-417 <No. 12> 02.11.17 08:34PM CHIOM")), Some((2002, 11, 17)));
    }

    #[test]
    fn lab_stamp_swaps_invalid_month() {
        let parser = DateNormalizer::default();
        // 31 cannot be a month, so the stamp is read as YY.DD.MM
        assert_eq!(ymd(parser.parse("88.31.05")), Some((1988, 5, 31)));
    }

    #[test]
    fn spanish_month_names() {
        let parser = DateNormalizer::default();
        assert_eq!(ymd(parser.parse("27 de Noviembre de 1983")), Some((1983, 11, 27)));
        assert_eq!(ymd(parser.parse("Marzo 1981")), Some((1981, 3, 1)));
        assert_eq!(ymd(parser.parse("Noviembre, 1998")), Some((1998, 11, 1)));
        assert_eq!(ymd(parser.parse("3 de setiembre 1975")), Some((1975, 9, 3)));
    }

    #[test]
    fn english_and_numeric_formats() {
        let parser = DateNormalizer::default();
        assert_eq!(ymd(parser.parse("December 25, 1999")), Some((1999, 12, 25)));
        assert_eq!(ymd(parser.parse("25/12/1999")), Some((1999, 12, 25)));
        // day-first by default
        assert_eq!(ymd(parser.parse("02/04/1999")), Some((1999, 4, 2)));
        assert_eq!(ymd(parser.parse("1999-06-07")), Some((1999, 6, 7)));
    }

    #[test]
    fn slashed_two_digit_triples_are_day_first() {
        let parser = DateNormalizer::default();
        assert_eq!(ymd(parser.parse("02/04/22")), Some((2022, 4, 2)));
        assert_eq!(ymd(parser.parse("25-12-99")), Some((1999, 12, 25)));
        // dotted stamps stay YY.MM.DD
        assert_eq!(ymd(parser.parse("02.04.22")), Some((2002, 4, 22)));
    }

    #[test]
    fn frame_numbers_do_not_become_years() {
        let parser = DateNormalizer::default();
        assert_eq!(ymd(parser.parse("Foto 0023 - Marzo 1981")), Some((1981, 3, 1)));
        assert_eq!(ymd(parser.parse("Rollo 12-34-56, Marzo 1981")), Some((1981, 3, 1)));
        assert_eq!(ymd(parser.parse("Lote 4417, Marzo 1981")), Some((1981, 3, 1)));
    }

    #[test]
    fn month_name_with_two_digit_year() {
        let parser = DateNormalizer::default();
        assert_eq!(ymd(parser.parse("Junio 99")), Some((1999, 6, 1)));
        assert_eq!(ymd(parser.parse("Dic 85")), Some((1985, 12, 1)));
        assert_eq!(ymd(parser.parse("15 Junio 99")), Some((1999, 6, 15)));
        // either side of the pivot
        assert_eq!(ymd(parser.parse("Marzo 30")), Some((2030, 3, 1)));
        assert_eq!(parser.parse("Marzo 31"), None);
    }

    #[test]
    fn year_found_in_noise() {
        let parser = DateNormalizer::default();
        assert_eq!(ymd(parser.parse("1966")), Some((1966, 1, 1)));
        assert_eq!(ymd(parser.parse("foto de la casa, aprox 1972 (?)")), Some((1972, 1, 1)));
    }

    #[test]
    fn out_of_range_years_rejected() {
        let parser = DateNormalizer::default();
        assert_eq!(parser.parse("1850"), None);
        assert_eq!(parser.parse("2200"), None);
        assert_eq!(parser.parse("12 March 1850"), None);
    }

    #[test]
    fn unparseable_input_is_absent() {
        let parser = DateNormalizer::default();
        assert_eq!(parser.parse(""), None);
        assert_eq!(parser.parse("Carmen y Jorge"), None);
        assert_eq!(parser.parse("no date"), None);
    }

    #[test]
    fn pivot_is_configurable() {
        let parser = DateNormalizer::new(DateConfig {
            two_digit_pivot: 10,
            ..DateConfig::default()
        });
        assert_eq!(parser.two_digit_year_to_full(10), 2010);
        assert_eq!(parser.two_digit_year_to_full(15), 1915);
        assert_eq!(ymd(parser.parse("08.03.15")), Some((2008, 3, 15)));
    }

    #[test]
    fn best_prefers_specific_dates() {
        let parser = DateNormalizer::default();
        let best = parser.get_best(&["1999", "Junio 1999", "99/JUN/7 11:32AM"]).unwrap();
        assert_eq!((best.year, best.month, best.day), (1999, 6, 7));
        assert_eq!(best.hour, Some(11));
    }

    #[test]
    fn best_ties_keep_first_candidate() {
        let parser = DateNormalizer::default();
        let best = parser.get_best(&["Marzo 1981", "Abril 1982"]).unwrap();
        assert_eq!((best.year, best.month), (1981, 3));
    }

    #[test]
    fn best_skips_failures() {
        let parser = DateNormalizer::default();
        assert_eq!(parser.get_best::<&str>(&[]), None);
        assert_eq!(parser.get_best(&["garbage", "none"]), None);
        let best = parser.get_best(&["garbage", "1985"]).unwrap();
        assert_eq!(best.year, 1985);
    }

    #[test]
    fn exif_rendering() {
        let date = NormalizedDate::new(1999, 6, 7, Some((11, 32))).unwrap();
        assert_eq!(date.exif_datetime(), "1999:06:07 11:32:00");
        assert_eq!(date.exif_date(), "1999:06:07");
        assert!(NormalizedDate::new(1999, 2, 30, None).is_none());
    }
}
