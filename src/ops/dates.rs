use chrono::{Datelike, Duration, NaiveDate, Weekday};
use serde_json::Value;

/// Business days in a treatment course before any extension
pub const BASE_TREATMENT_DAYS: u32 = 15;

/// Upper bound accepted for `extensionDays`
pub const MAX_EXTENSION_DAYS: u32 = 365;

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Monday through Friday. Public holidays are not excluded.
pub fn is_business_day(date: NaiveDate) -> bool {
    !matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
}

/// Compute the end date of a treatment course.
///
/// Counting starts from the day before `start_date` and advances one calendar
/// day at a time, counting only business days. The first business day on or
/// after `start_date` is the first day of the course; the end date lies
/// `15 + extension_days` business days after it. A course starting Monday
/// 2024-01-15 without extension ends Monday 2024-02-05.
pub fn calculate_end_date(start_date: NaiveDate, extension_days: u32) -> NaiveDate {
    let total = BASE_TREATMENT_DAYS + extension_days.min(MAX_EXTENSION_DAYS);
    let mut date = start_date.pred_opt().unwrap_or(start_date);
    let mut counted = 0;
    while counted <= total {
        date = match date.checked_add_signed(Duration::days(1)) {
            Some(next) => next,
            None => break,
        };
        if is_business_day(date) {
            counted += 1;
        }
    }
    date
}

/// Normalise a persisted `extensionDays` value.
///
/// Numbers and numeric strings are accepted; anything negative, fractional
/// garbage or non-numeric reads as 0. Values above the maximum are clamped.
pub fn parse_extension(value: &Value) -> u32 {
    let raw = match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f.trunc() as i64)),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    };
    match raw {
        Some(n) if n > 0 => n.min(MAX_EXTENSION_DAYS as i64) as u32,
        _ => 0,
    }
}

/// Parse a strict `YYYY-MM-DD` date.
pub fn parse_date(s: &str) -> Option<NaiveDate> {
    let bytes = s.as_bytes();
    if bytes.len() != 10 || bytes[4] != b'-' || bytes[7] != b'-' {
        return None;
    }
    NaiveDate::parse_from_str(s, DATE_FORMAT).ok()
}

pub fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}
