use chrono::{DateTime, NaiveDateTime, Utc};

const STORAGE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";

const NAIVE_FORMATS: [&str; 4] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

/// Parses a timestamp into naive UTC.
///
/// Strings carrying an offset (RFC 3339) are converted to UTC; naive
/// strings are taken to already be UTC. A bare date means midnight.
pub fn parse_utc(raw: &str) -> Option<NaiveDateTime> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc).naive_utc());
    }
    let stripped = s.strip_suffix('Z').unwrap_or(s);
    for fmt in NAIVE_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(stripped, fmt) {
            return Some(dt);
        }
    }
    chrono::NaiveDate::parse_from_str(stripped, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

pub fn format_utc(dt: &NaiveDateTime) -> String {
    dt.format(STORAGE_FORMAT).to_string()
}

/// Reads a stored column back; unparseable values are treated as unset.
pub fn from_column(raw: Option<String>) -> Option<NaiveDateTime> {
    raw.as_deref().and_then(parse_utc)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offsets_are_normalised_to_utc() {
        let dt = parse_utc("2015-02-02T22:58:23.948203-08:00").expect("parse");
        assert_eq!(format_utc(&dt), "2015-02-03T06:58:23.948203");
    }

    #[test]
    fn naive_strings_are_utc() {
        let a = parse_utc("2015-02-02 14:58:23").expect("space");
        let b = parse_utc("2015-02-02T14:58:23").expect("t");
        let c = parse_utc("2015-02-02T14:58:23Z").expect("z");
        assert_eq!(a, b);
        assert_eq!(b, c);
        assert_eq!(format_utc(&a), "2015-02-02T14:58:23");
    }

    #[test]
    fn bare_date_is_midnight() {
        let dt = parse_utc("2020-09-01").expect("date");
        assert_eq!(format_utc(&dt), "2020-09-01T00:00:00");
        assert!(parse_utc("not a date").is_none());
        assert!(parse_utc("  ").is_none());
    }
}
