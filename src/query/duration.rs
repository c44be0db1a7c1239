//! Parser for interval strings such as `"60s"`, `"1m30s"` or `"1.5h"`.
//!
//! The grammar is an optional sign followed by one or more `<decimal><unit>`
//! terms, with units `ns`, `us` (or `µs`/`μs`), `ms`, `s`, `m` and `h`. A bare
//! `"0"` is accepted. Results are in nanoseconds.

const UNITS: &[(&str, i128)] = &[
    ("ns", 1),
    ("us", 1_000),
    ("µs", 1_000),
    ("μs", 1_000),
    ("ms", 1_000_000),
    ("s", 1_000_000_000),
    ("m", 60 * 1_000_000_000),
    ("h", 3_600 * 1_000_000_000),
];

// Same bound as a signed 64-bit nanosecond count.
const MAX_NANOS: i128 = i64::MAX as i128;

pub fn parse_nanos(input: &str) -> Option<i64> {
    let (negative, mut rest) = match input.as_bytes().first() {
        Some(b'-') => (true, &input[1..]),
        Some(b'+') => (false, &input[1..]),
        _ => (false, input),
    };

    if rest == "0" {
        return Some(0);
    }
    if rest.is_empty() {
        return None;
    }

    let mut total: i128 = 0;
    while !rest.is_empty() {
        let number_len = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        let number = &rest[..number_len];
        rest = &rest[number_len..];

        let (whole, frac) = match number.split_once('.') {
            Some((w, f)) => (w, f),
            None => (number, ""),
        };
        if whole.is_empty() && frac.is_empty() {
            return None;
        }

        let unit_len = rest
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(rest.len());
        let unit = &rest[..unit_len];
        rest = &rest[unit_len..];
        let scale = UNITS.iter().find(|(name, _)| *name == unit)?.1;

        let whole: i128 = if whole.is_empty() { 0 } else { whole.parse().ok()? };
        let mut term = whole.checked_mul(scale)?;
        if !frac.is_empty() {
            let mut divisor: i128 = 1;
            let mut digits: i128 = 0;
            for c in frac.chars() {
                // digits past nanosecond precision cannot change the result
                if divisor >= 1_000_000_000_000_000_000 {
                    break;
                }
                digits = digits * 10 + c.to_digit(10)? as i128;
                divisor *= 10;
            }
            term += digits * scale / divisor;
        }

        total = total.checked_add(term)?;
        if total > MAX_NANOS {
            return None;
        }
    }

    Some(if negative { -total as i64 } else { total as i64 })
}

/// Parses an interval and returns its length in whole milliseconds.
pub fn parse_millis(input: &str) -> Option<i64> {
    parse_nanos(input).map(|nanos| nanos / 1_000_000)
}
