// 💵 Income Value Normalizer
// Free-text income cells → whole-dollar integers
//
// Rules run in a fixed order on the canonical string:
//   trim/canonicalize → range collapse → "k" shorthand → first digit run

use crate::error::NormalizeError;
use once_cell::sync::Lazy;
use regex::Regex;

/// Range separator. "to" must not sit inside a word ("total", "photo"), but may
/// touch digits or a `k` suffix: "40k to60k", "45kto55k", "75000to99999".
static RANGE_SEPARATOR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:^|[^a-z]|[0-9]k)(to)(?:[^a-z]|$)").unwrap());

/// "45k", "45 k", "45.5k"
static SHORTHAND_K: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([0-9]+)(?:\.([0-9]+))?\s*k$").unwrap());

static DIGIT_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"[0-9]+").unwrap());

/// Largest income we accept; keeps values representable as SQLite INTEGER
pub const MAX_INCOME: u64 = i64::MAX as u64;

/// Normalize a raw income cell into whole currency units.
///
/// # Examples:
/// ```
/// use major_income::normalize_income;
///
/// assert_eq!(normalize_income(Some("$75,000")), Ok(75000));
/// assert_eq!(normalize_income(Some("45 K")), Ok(45000));
/// assert_eq!(normalize_income(Some("75,000 to 99,999")), Ok(75000));
/// assert!(normalize_income(Some("N/A")).is_err());
/// ```
pub fn normalize_income(raw: Option<&str>) -> Result<u64, NormalizeError> {
    let raw = match raw {
        Some(s) if !s.trim().is_empty() => s,
        _ => return Err(NormalizeError::EmptyInput),
    };

    let canonical = canonicalize(raw);
    let text = collapse_range(&canonical);

    if let Some(value) = parse_shorthand(text, raw)? {
        return Ok(value);
    }

    first_digit_run(text, raw)
}

/// Strip whitespace, lowercase, drop `$` and thousands separators
fn canonicalize(raw: &str) -> String {
    raw.trim()
        .to_lowercase()
        .chars()
        .filter(|c| *c != '$' && *c != ',')
        .collect()
}

/// Keep only the lower bound of "A to B"
fn collapse_range(text: &str) -> &str {
    match RANGE_SEPARATOR.captures(text).and_then(|caps| caps.get(1)) {
        Some(m) => text[..m.start()].trim(),
        None => text,
    }
}

/// `floor(number * 1000)` in exact decimal arithmetic.
/// Fractional digits past the third can only ever contribute less than one unit.
fn parse_shorthand(text: &str, raw: &str) -> Result<Option<u64>, NormalizeError> {
    let caps = match SHORTHAND_K.captures(text) {
        Some(caps) => caps,
        None => return Ok(None),
    };

    let out_of_range = || NormalizeError::OutOfRange {
        input: raw.to_string(),
    };

    let whole: u64 = caps[1].parse().map_err(|_| out_of_range())?;

    let fraction: u64 = match caps.get(2) {
        Some(m) => {
            let mut digits: String = m.as_str().chars().take(3).collect();
            while digits.len() < 3 {
                digits.push('0');
            }
            digits.parse().map_err(|_| out_of_range())?
        }
        None => 0,
    };

    let value = whole
        .checked_mul(1000)
        .and_then(|v| v.checked_add(fraction))
        .filter(|v| *v <= MAX_INCOME)
        .ok_or_else(out_of_range)?;

    Ok(Some(value))
}

fn first_digit_run(text: &str, raw: &str) -> Result<u64, NormalizeError> {
    let run = DIGIT_RUN
        .find(text)
        .ok_or_else(|| NormalizeError::NoDigitsFound {
            input: raw.to_string(),
        })?;

    run.as_str()
        .parse::<u64>()
        .ok()
        .filter(|v| *v <= MAX_INCOME)
        .ok_or_else(|| NormalizeError::OutOfRange {
            input: raw.to_string(),
        })
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn norm(raw: &str) -> Result<u64, NormalizeError> {
        normalize_income(Some(raw))
    }

    #[test]
    fn test_currency_and_separators() {
        assert_eq!(norm("$75,000"), Ok(75000));
        assert_eq!(norm("$12,345"), Ok(12345));
        assert_eq!(norm("  $1,234,567  "), Ok(1234567));
    }

    #[test]
    fn test_shorthand_suffix() {
        assert_eq!(norm("45k"), Ok(45000));
        assert_eq!(norm("45 K"), Ok(45000));
        assert_eq!(norm("7.5k"), Ok(7500));
        assert_eq!(norm("45.5k"), Ok(45500));
        assert_eq!(norm("$52.25K"), Ok(52250));
    }

    #[test]
    fn test_shorthand_rounds_down_without_float_error() {
        assert_eq!(norm("1.001k"), Ok(1001));
        assert_eq!(norm("0.0019k"), Ok(1));
        assert_eq!(norm("2.9999k"), Ok(2999));
    }

    #[test]
    fn test_range_keeps_lower_bound() {
        assert_eq!(norm("75,000 to 99,999"), Ok(75000));
        assert_eq!(norm("$40k to $60k"), Ok(40000));
        assert_eq!(norm("50000 TO 90000"), Ok(50000));
        assert_eq!(norm("40k to60k"), Ok(40000));
        assert_eq!(norm("45kto55k"), Ok(45000));
        assert_eq!(norm("75000to99999"), Ok(75000));
    }

    #[test]
    fn test_range_separator_is_a_whole_word() {
        // "total" contains "to" but is not a range
        assert_eq!(norm("total 52000"), Ok(52000));
        assert_eq!(norm("photo budget 30000"), Ok(30000));
    }

    #[test]
    fn test_digit_fallback() {
        assert_eq!(norm("about 50000 dollars"), Ok(50000));
        assert_eq!(norm("median: 61000 (2019)"), Ok(61000));
        assert_eq!(norm("45000.75"), Ok(45000));
    }

    #[test]
    fn test_failures() {
        assert_eq!(normalize_income(None), Err(NormalizeError::EmptyInput));
        assert_eq!(norm(""), Err(NormalizeError::EmptyInput));
        assert_eq!(norm("   "), Err(NormalizeError::EmptyInput));
        assert!(matches!(norm("N/A"), Err(NormalizeError::NoDigitsFound { .. })));
        assert!(matches!(norm("to 50000"), Err(NormalizeError::NoDigitsFound { .. })));
    }

    #[test]
    fn test_overflow_is_rejected_not_wrapped() {
        assert!(matches!(
            norm("99999999999999999999999"),
            Err(NormalizeError::OutOfRange { .. })
        ));
        assert!(matches!(
            norm("9223372036854775807k"),
            Err(NormalizeError::OutOfRange { .. })
        ));
    }

    #[test]
    fn test_deterministic() {
        for input in ["$75,000", "45k", "75,000 to 99,999", "N/A", "about 50000 dollars"] {
            assert_eq!(norm(input), norm(input));
        }
    }
}
