use chrono::{DateTime, Duration, DurationRound, NaiveDate, NaiveTime, Utc};

/// Colombia runs on UTC-5 all year.
pub const COLOMBIA_UTC_OFFSET_HOURS: i64 = 5;

pub fn colombia_today(now: DateTime<Utc>) -> NaiveDate {
    (now - Duration::hours(COLOMBIA_UTC_OFFSET_HOURS)).date_naive()
}

/// Drops sub-microsecond digits so a value matches what TIMESTAMPTZ stores.
pub fn to_db_precision(t: DateTime<Utc>) -> DateTime<Utc> {
    t.duration_trunc(Duration::microseconds(1)).unwrap_or(t)
}

/// Current instant at database precision.
pub fn db_now() -> DateTime<Utc> {
    to_db_precision(Utc::now())
}

/// UTC bounds `[start, end)` of a Colombian calendar day.
pub fn colombia_day_bounds(day: NaiveDate) -> (DateTime<Utc>, DateTime<Utc>) {
    let start = day.and_time(NaiveTime::MIN).and_utc() + Duration::hours(COLOMBIA_UTC_OFFSET_HOURS);
    (start, start + Duration::days(1))
}

pub fn parse_date_safe(date_str: &str) -> Option<NaiveDate> {
    if date_str.trim().is_empty() {
        return None;
    }
    NaiveDate::parse_from_str(date_str.trim(), "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(date_str.trim(), "%Y%m%d"))
        .ok()
}

/// Canonical Colombian mobile format: `+57` followed by ten digits starting with 3.
/// Other numbers keep only their digits and `+`; text without digits is kept as given.
pub fn normalize_phone(raw: &str) -> String {
    let cleaned: String = raw
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '+')
        .collect();

    if cleaned.starts_with('3') && cleaned.len() == 10 {
        format!("+57{}", cleaned)
    } else if cleaned.starts_with("57") && cleaned.len() == 12 {
        format!("+{}", cleaned)
    } else if cleaned.is_empty() {
        raw.trim().to_string()
    } else {
        cleaned
    }
}

pub fn non_empty(value: Option<String>) -> Option<String> {
    value.and_then(|v| {
        let trimmed = v.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_colombia_today_lags_utc() {
        // 03:00 UTC on the 2nd is still the evening of the 1st in Bogota
        let now = Utc.with_ymd_and_hms(2025, 3, 2, 3, 0, 0).unwrap();
        assert_eq!(colombia_today(now), NaiveDate::from_ymd_opt(2025, 3, 1).unwrap());

        let later = Utc.with_ymd_and_hms(2025, 3, 2, 5, 0, 0).unwrap();
        assert_eq!(colombia_today(later), NaiveDate::from_ymd_opt(2025, 3, 2).unwrap());
    }

    #[test]
    fn test_colombia_day_bounds() {
        let day = NaiveDate::from_ymd_opt(2025, 3, 1).unwrap();
        let (start, end) = colombia_day_bounds(day);
        assert_eq!(start, Utc.with_ymd_and_hms(2025, 3, 1, 5, 0, 0).unwrap());
        assert_eq!(end, Utc.with_ymd_and_hms(2025, 3, 2, 5, 0, 0).unwrap());
    }

    #[test]
    fn test_parse_date_safe() {
        let expected = NaiveDate::from_ymd_opt(2025, 1, 31);
        assert_eq!(parse_date_safe("2025-01-31"), expected);
        assert_eq!(parse_date_safe("20250131"), expected);
        assert_eq!(parse_date_safe("  "), None);
        assert_eq!(parse_date_safe("31/01/2025"), None);
    }

    #[test]
    fn test_normalize_phone() {
        assert_eq!(normalize_phone("3001234567"), "+573001234567");
        assert_eq!(normalize_phone("300 123 4567"), "+573001234567");
        assert_eq!(normalize_phone("573001234567"), "+573001234567");
        assert_eq!(normalize_phone("+57 300-123-4567"), "+573001234567");
        assert_eq!(normalize_phone("6012345678"), "6012345678");
    }

    #[test]
    fn test_landline_separators_are_stripped() {
        assert_eq!(normalize_phone("601-234-5678"), "6012345678");
        assert_eq!(normalize_phone("601 234 5678"), "6012345678");
        assert_eq!(normalize_phone("601.234.5678"), "6012345678");
        assert_eq!(normalize_phone(" sin teléfono "), "sin teléfono");
    }

    #[test]
    fn test_db_precision_drops_nanoseconds() {
        let t = Utc.with_ymd_and_hms(2025, 10, 9, 8, 53, 20).unwrap()
            + Duration::nanoseconds(123_456_789);
        let stored = to_db_precision(t);
        assert_eq!(stored.timestamp_subsec_nanos(), 123_456_000);
        assert_eq!(to_db_precision(stored), stored);
    }
}
