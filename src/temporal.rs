//! Published-time normalization.
//!
//! Post pages show their publish time in whatever form the platform chose for
//! that post's age: "3분 전", "약 2시간 전", "2025. 8. 9 오후 9:00", and feeds
//! carry RFC-822 or ISO-8601. Everything resolves to a UTC instant here.

use chrono::{
    DateTime, Duration, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc,
};
use once_cell::sync::Lazy;
use regex::Regex;

static MINUTES_AGO: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(약\s*)?(\d+)\s*분\s*전").expect("Invalid minutes regex"));
static HOURS_AGO: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(약\s*)?(\d+)\s*시간\s*전").expect("Invalid hours regex"));
static DAYS_AGO: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(약\s*)?(\d+)\s*일\s*전").expect("Invalid days regex"));
static LOCAL_DATE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(\d{4})\.\s*(\d{1,2})\.\s*(\d{1,2})(?:\s*(오전|오후)?\s*(\d{1,2}):(\d{2})(?::(\d{2}))?)?",
    )
    .expect("Invalid local date regex")
});

/// Zone-less RFC-822 layouts, tried after the strict parser rejects a string.
const NAIVE_RFC822_FORMATS: &[&str] = &["%a, %d %b %Y %H:%M:%S", "%d %b %Y %H:%M:%S"];

/// Zone-less ISO-8601 layouts.
const NAIVE_ISO_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
];

/// Resolves raw published-time strings against a fixed reference instant.
#[derive(Debug, Clone, Copy)]
pub struct TimeNormalizer {
    /// "Now" for relative expressions.
    reference: DateTime<Utc>,
    /// Timezone the platform displays absolute dates in.
    source_offset: FixedOffset,
}

impl TimeNormalizer {
    #[must_use]
    pub fn new(reference: DateTime<Utc>, source_offset: FixedOffset) -> Self {
        Self {
            reference,
            source_offset,
        }
    }

    #[must_use]
    pub fn reference(&self) -> DateTime<Utc> {
        self.reference
    }

    #[must_use]
    pub fn source_offset(&self) -> FixedOffset {
        self.source_offset
    }

    /// Resolve `raw` to a UTC instant, or `None` if no format matches.
    #[must_use]
    pub fn to_utc(&self, raw: &str) -> Option<DateTime<Utc>> {
        let text = raw.trim();
        if text.is_empty() {
            return None;
        }

        parse_rfc822(text)
            .or_else(|| parse_iso8601(text))
            .or_else(|| self.parse_localized(text))
    }

    /// Calendar date of `raw` as the platform displays it.
    #[must_use]
    pub fn to_local_date(&self, raw: &str) -> Option<NaiveDate> {
        self.to_utc(raw)
            .map(|instant| instant.with_timezone(&self.source_offset).date_naive())
    }

    fn parse_localized(&self, text: &str) -> Option<DateTime<Utc>> {
        if let Some(n) = relative_amount(&MINUTES_AGO, text) {
            return self.reference.checked_sub_signed(Duration::try_minutes(n)?);
        }
        if let Some(n) = relative_amount(&HOURS_AGO, text) {
            return self.reference.checked_sub_signed(Duration::try_hours(n)?);
        }
        if let Some(n) = relative_amount(&DAYS_AGO, text) {
            return self.reference.checked_sub_signed(Duration::try_days(n)?);
        }

        let caps = LOCAL_DATE.captures(text)?;
        let number = |idx: usize| -> Option<u32> {
            caps.get(idx).map_or(Some(0), |m| m.as_str().parse().ok())
        };

        let year: i32 = caps.get(1)?.as_str().parse().ok()?;
        let month = number(2)?;
        let day = number(3)?;
        let mut hour = number(5)?;
        let minute = number(6)?;
        let second = number(7)?;

        match caps.get(4).map(|m| m.as_str()) {
            Some("오후") if hour < 12 => hour += 12,
            Some("오전") if hour == 12 => hour = 0,
            _ => {}
        }

        let date = NaiveDate::from_ymd_opt(year, month, day)?;
        let time = NaiveTime::from_hms_opt(hour, minute, second)?;
        self.source_offset
            .from_local_datetime(&date.and_time(time))
            .single()
            .map(|local| local.with_timezone(&Utc))
    }
}

fn relative_amount(pattern: &Regex, text: &str) -> Option<i64> {
    pattern.captures(text)?.get(2)?.as_str().parse().ok()
}

fn parse_rfc822(text: &str) -> Option<DateTime<Utc>> {
    if let Ok(parsed) = DateTime::parse_from_rfc2822(text) {
        return Some(parsed.with_timezone(&Utc));
    }
    NAIVE_RFC822_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
        .map(|naive| naive.and_utc())
}

fn parse_iso8601(text: &str) -> Option<DateTime<Utc>> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(text) {
        return Some(parsed.with_timezone(&Utc));
    }
    if let Ok(parsed) = DateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f%:z") {
        return Some(parsed.with_timezone(&Utc));
    }
    if let Some(naive) = NAIVE_ISO_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
    {
        return Some(naive.and_utc());
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}
