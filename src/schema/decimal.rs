//! Fixed-point decimals for money and quantity columns.
//!
//! Values are kept as scaled integers (`12.50` with two places is `1250`), so
//! SQLite stores them as INTEGER and ordering stays numeric.

use std::fmt;

/// Exponents beyond this can never fit a column and are rejected outright.
const MAX_EXPONENT: i64 = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecimalError {
    Invalid,
    TooManyDigits(u32),
    TooManyPlaces(u32),
    TooManyWholeDigits(u32),
}

impl fmt::Display for DecimalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecimalError::Invalid => write!(f, "A valid number is required."),
            DecimalError::TooManyDigits(n) => {
                write!(f, "Ensure that there are no more than {n} digits in total.")
            }
            DecimalError::TooManyPlaces(n) => {
                write!(f, "Ensure that there are no more than {n} decimal places.")
            }
            DecimalError::TooManyWholeDigits(n) => write!(
                f,
                "Ensure that there are no more than {n} digits before the decimal point."
            ),
        }
    }
}

/// A decimal with at most `max_digits` significant digits, `places` of them after the point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct FixedPoint {
    scaled: i64,
    places: u32,
}

impl FixedPoint {
    pub fn from_scaled(scaled: i64, places: u32) -> Self {
        Self { scaled, places }
    }

    pub fn scaled(&self) -> i64 {
        self.scaled
    }

    /// Parses text such as `"-1500.5"` or `"1.5e3"` against the column precision.
    pub fn parse(input: &str, max_digits: u32, places: u32) -> Result<Self, DecimalError> {
        let expanded = expand_exponent(input.trim())?;
        let text = expanded.as_str();
        let (negative, unsigned) = match text.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, text.strip_prefix('+').unwrap_or(text)),
        };
        let (whole, frac) = match unsigned.split_once('.') {
            Some((w, f)) => (w, f),
            None => (unsigned, ""),
        };
        if (whole.is_empty() && frac.is_empty())
            || !whole.chars().all(|c| c.is_ascii_digit())
            || !frac.chars().all(|c| c.is_ascii_digit())
        {
            return Err(DecimalError::Invalid);
        }

        let whole = whole.trim_start_matches('0');
        let frac_significant = frac.trim_end_matches('0');
        let whole_digits = whole.len() as u32;
        let frac_digits = frac_significant.len() as u32;

        if whole_digits + frac_digits > max_digits {
            return Err(DecimalError::TooManyDigits(max_digits));
        }
        if frac_digits > places {
            return Err(DecimalError::TooManyPlaces(places));
        }
        if whole_digits > max_digits - places {
            return Err(DecimalError::TooManyWholeDigits(max_digits - places));
        }

        let mut digits = String::with_capacity((whole_digits + places) as usize);
        digits.push_str(whole);
        digits.push_str(frac_significant);
        for _ in frac_digits..places {
            digits.push('0');
        }
        let magnitude: i64 = if digits.is_empty() {
            0
        } else {
            digits.parse().map_err(|_| DecimalError::Invalid)?
        };
        Ok(Self {
            scaled: if negative { -magnitude } else { magnitude },
            places,
        })
    }

    /// Accepts either a JSON string or a JSON number.
    pub fn from_json(
        value: &serde_json::Value,
        max_digits: u32,
        places: u32,
    ) -> Result<Self, DecimalError> {
        match value {
            serde_json::Value::String(s) => Self::parse(s, max_digits, places),
            serde_json::Value::Number(n) => Self::parse(&n.to_string(), max_digits, places),
            _ => Err(DecimalError::Invalid),
        }
    }
}

/// Rewrites `1.5e-3` as `0.0015`; text without an exponent is returned as is.
fn expand_exponent(text: &str) -> Result<String, DecimalError> {
    let Some((mantissa, exponent)) = text.split_once(|c| c == 'e' || c == 'E') else {
        return Ok(text.to_string());
    };
    let exponent: i64 = exponent.parse().map_err(|_| DecimalError::Invalid)?;
    if exponent.abs() > MAX_EXPONENT {
        return Err(DecimalError::Invalid);
    }
    let (sign, unsigned) = match mantissa.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", mantissa.strip_prefix('+').unwrap_or(mantissa)),
    };
    let (whole, frac) = unsigned.split_once('.').unwrap_or((unsigned, ""));
    if (whole.is_empty() && frac.is_empty())
        || !whole.chars().all(|c| c.is_ascii_digit())
        || !frac.chars().all(|c| c.is_ascii_digit())
    {
        return Err(DecimalError::Invalid);
    }

    let digits = format!("{whole}{frac}");
    let point = whole.len() as i64 + exponent;
    let expanded = if point <= 0 {
        format!("0.{}{digits}", "0".repeat(point.unsigned_abs() as usize))
    } else if point as usize >= digits.len() {
        format!("{digits}{}", "0".repeat(point as usize - digits.len()))
    } else {
        let (w, f) = digits.split_at(point as usize);
        format!("{w}.{f}")
    };
    Ok(format!("{sign}{expanded}"))
}

impl fmt::Display for FixedPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.scaled < 0 { "-" } else { "" };
        let magnitude = self.scaled.unsigned_abs();
        if self.places == 0 {
            return write!(f, "{sign}{magnitude}");
        }
        let factor = 10u64.pow(self.places);
        write!(
            f,
            "{sign}{}.{:0width$}",
            magnitude / factor,
            magnitude % factor,
            width = self.places as usize
        )
    }
}
