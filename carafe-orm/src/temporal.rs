//! # Temporal Conversion Module
//!
//! Date and datetime fields declare their format with the letters used by the
//! `Y-m-d H:i:s` family of format strings. This module translates those formats to
//! chrono's strftime syntax and parses/formats `NaiveDateTime` and `NaiveDate` values.
//!
//! ## Supported Letters
//!
//! | Letter | Meaning                          | chrono |
//! |--------|----------------------------------|--------|
//! | `Y`    | four digit year                  | `%Y`   |
//! | `y`    | two digit year                   | `%y`   |
//! | `m`/`n`| month with / without leading zero| `%m`/`%-m` |
//! | `d`/`j`| day with / without leading zero  | `%d`/`%-d` |
//! | `H`/`G`| 24h hour with / without zero     | `%H`/`%-H` |
//! | `h`/`g`| 12h hour with / without zero     | `%I`/`%-I` |
//! | `i`    | minutes                          | `%M`   |
//! | `s`    | seconds                          | `%S`   |
//! | `u`/`v`| microseconds / milliseconds      | `%6f`/`%3f` |
//! | `A`/`a`| AM/PM, am/pm                     | `%p`/`%P` |
//! | `M`/`F`| short / full month name          | `%b`/`%B` |
//! | `D`/`l`| short / full weekday name        | `%a`/`%A` |
//! | `P`/`O`| offset `+02:00` / `+0200`        | `%:z`/`%z` |
//! | `U`    | unix timestamp                   | `%s`   |
//!
//! A backslash escapes the next character and a leading `!` (strict parsing marker)
//! is ignored. Any other character is copied literally.
//!
//! ## Example
//!
//! ```rust,ignore
//! use carafe_orm::temporal::{parse_datetime, format_datetime};
//!
//! let dt = parse_datetime("2024-04-07T10:11:12", "Y-m-d\\TH:i:s")?;
//! assert_eq!(format_datetime(&dt, "Y-m-d\\TH:i:s"), "2024-04-07T10:11:12");
//! ```

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};

use crate::errors::{Error, Result};

/// Default format of datetime fields.
pub const DEFAULT_DATETIME_FORMAT: &str = "Y-m-d H:i:s";

/// Default format of date fields.
pub const DEFAULT_DATE_FORMAT: &str = "Y-m-d";

// ============================================================================
// Format Translation
// ============================================================================

/// Translates a `Y-m-d H:i:s` style format to a chrono strftime string.
pub fn to_strftime(format: &str) -> String {
    let format = format.strip_prefix('!').unwrap_or(format);
    let mut out = String::with_capacity(format.len() * 2);
    let mut chars = format.chars();

    while let Some(c) = chars.next() {
        let spec = match c {
            'Y' => "%Y",
            'y' => "%y",
            'm' => "%m",
            'n' => "%-m",
            'd' => "%d",
            'j' => "%-d",
            'H' => "%H",
            'G' => "%-H",
            'h' => "%I",
            'g' => "%-I",
            'i' => "%M",
            's' => "%S",
            'u' => "%6f",
            'v' => "%3f",
            'A' => "%p",
            'a' => "%P",
            'M' => "%b",
            'F' => "%B",
            'D' => "%a",
            'l' => "%A",
            'P' => "%:z",
            'O' => "%z",
            'U' => "%s",
            '\\' => {
                if let Some(escaped) = chars.next() {
                    push_literal(&mut out, escaped);
                }
                continue;
            }
            other => {
                push_literal(&mut out, other);
                continue;
            }
        };
        out.push_str(spec);
    }

    out
}

fn push_literal(out: &mut String, c: char) {
    if c == '%' {
        out.push_str("%%");
    } else {
        out.push(c);
    }
}

// ============================================================================
// Parsing & Formatting
// ============================================================================

/// Parses a datetime. A format without time parts yields midnight.
pub fn parse_datetime(value: &str, format: &str) -> Result<NaiveDateTime> {
    let spec = to_strftime(format);
    NaiveDateTime::parse_from_str(value, &spec)
        .or_else(|_| NaiveDate::parse_from_str(value, &spec).map(|d| d.and_time(NaiveTime::MIN)))
        .map_err(|_| invalid(value, format))
}

/// Parses a date.
pub fn parse_date(value: &str, format: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(value, &to_strftime(format)).map_err(|_| invalid(value, format))
}

pub fn format_datetime(value: &NaiveDateTime, format: &str) -> String {
    value.format(&to_strftime(format)).to_string()
}

pub fn format_date(value: &NaiveDate, format: &str) -> String {
    value.format(&to_strftime(format)).to_string()
}

fn invalid(value: &str, format: &str) -> Error {
    Error::InvalidDateFormat { value: value.to_string(), format: format.to_string() }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn translates_common_letters() {
        assert_eq!(to_strftime("Y-m-d H:i:s"), "%Y-%m-%d %H:%M:%S");
        assert_eq!(to_strftime("!Y-m-d"), "%Y-%m-%d");
        assert_eq!(to_strftime("Y-m-d\\TH:i:s"), "%Y-%m-%dT%H:%M:%S");
        assert_eq!(to_strftime("d.m.Y 100%"), "%d.%m.%Y 100%%");
    }

    #[test]
    fn parses_and_formats_datetime() {
        let dt = parse_datetime("2024-04-07T10:11:12", "Y-m-d\\TH:i:s").unwrap();
        assert_eq!(dt, NaiveDate::from_ymd_opt(2024, 4, 7).unwrap().and_hms_opt(10, 11, 12).unwrap());
        assert_eq!(format_datetime(&dt, "Y-m-d\\TH:i:s"), "2024-04-07T10:11:12");
    }

    #[test]
    fn date_only_format_yields_midnight() {
        let dt = parse_datetime("2024-04-07", "Y-m-d").unwrap();
        assert_eq!(dt.time(), NaiveTime::MIN);
    }

    #[test]
    fn rejects_garbage() {
        let err = parse_datetime("InvalidString", DEFAULT_DATETIME_FORMAT).unwrap_err();
        assert!(matches!(err, Error::InvalidDateFormat { .. }));
        assert!(parse_date("07/04/2024", DEFAULT_DATE_FORMAT).is_err());
    }
}
