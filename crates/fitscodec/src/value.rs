use core::fmt;

use chrono::{NaiveDate, NaiveDateTime};

use crate::error::{Error, Result};

/// Width of the fixed-format value field (columns 11-30).
pub const VALUE_FIELD_WIDTH: usize = 20;

const DATE_FORMAT: &str = "%Y-%m-%d";
const DATETIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";

/// A typed header value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// `T` or `F`.
    Logical(bool),
    /// Integer. Wide enough for the unsigned 64-bit zero offset.
    Integer(i128),
    Float(f64),
    /// Character string, without quotes and trailing blanks.
    String(String),
    /// Quoted `YYYY-MM-DD`.
    Date(NaiveDate),
    /// Quoted `YYYY-MM-DDThh:mm:ss[.fff]`.
    DateTime(NaiveDateTime),
    /// Parenthesised dimension tuple such as `TDIMn = '(8,2)'`.
    Dims(Vec<usize>),
    /// `(real, imaginary)`.
    Complex(f64, f64),
    /// Commentary cards and undefined values.
    None,
}

impl Value {
    pub fn as_integer(&self) -> Option<i128> {
        match self {
            Value::Integer(n) => Some(*n),
            _ => None,
        }
    }

    /// Integers widen to `f64`.
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Integer(n) => Some(*n as f64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Logical(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Value::None)
    }

    /// Unquoted text of every value that is written as a FITS string.
    pub fn string_payload(&self) -> Option<String> {
        match self {
            Value::String(s) => Some(s.clone()),
            Value::Date(d) => Some(d.format(DATE_FORMAT).to_string()),
            Value::DateTime(dt) => Some(dt.format(DATETIME_FORMAT).to_string()),
            Value::Dims(dims) => Some(format_dims(dims)),
            _ => None,
        }
    }

    /// Fixed-format text of a non-string value, before right justification.
    ///
    /// Returns `Ok(None)` for string-like values and [`Value::None`].
    pub fn scalar_text(&self) -> core::result::Result<Option<String>, String> {
        Ok(Some(match self {
            Value::Logical(b) => (if *b { "T" } else { "F" }).to_string(),
            Value::Integer(n) => n.to_string(),
            Value::Float(f) => format_float(*f)?,
            Value::Complex(re, im) => format!("({}, {})", format_float(*re)?, format_float(*im)?),
            _ => return Ok(None),
        }))
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Logical(b) => write!(f, "{}", if *b { 'T' } else { 'F' }),
            Value::Integer(n) => write!(f, "{n}"),
            Value::Float(x) => write!(f, "{x:?}"),
            Value::Complex(re, im) => write!(f, "({re:?}, {im:?})"),
            Value::None => Ok(()),
            other => {
                let text = other.string_payload().unwrap_or_default();
                write!(f, "'{text}'")
            }
        }
    }
}

fn format_dims(dims: &[usize]) -> String {
    let parts: Vec<String> = dims.iter().map(|d| d.to_string()).collect();
    format!("({})", parts.join(","))
}

/// Shortest round-trip rendering with an upper-case exponent letter.
fn format_float(f: f64) -> core::result::Result<String, String> {
    if !f.is_finite() {
        return Err(format!("{f}"));
    }
    // Debug keeps the decimal point on integral values ("3.0") and switches
    // to exponent form for very large or small magnitudes.
    Ok(format!("{f:?}").replace('e', "E"))
}

/// Quote a string payload: double embedded quotes and pad to 8 characters.
pub fn quote(text: &str) -> String {
    let escaped = text.replace('\'', "''");
    format!("'{escaped:<8}'")
}

/// Split a value field (columns 11-80) into its value and comment.
///
/// A string value runs from the opening quote to the matching closing quote;
/// everything after a following `/` is the comment. Malformed content fails
/// with [`Error::UnparsableValue`].
pub fn parse_field(keyword: &str, field: &str) -> Result<(Value, String)> {
    let unparsable = || Error::UnparsableValue {
        keyword: keyword.to_string(),
        text: field.trim().to_string(),
    };

    let trimmed = field.trim_start();
    if let Some(body) = trimmed.strip_prefix('\'') {
        let (text, rest) = read_quoted(body).ok_or_else(unparsable)?;
        let rest = rest.trim_start();
        let comment = if rest.is_empty() {
            ""
        } else {
            rest.strip_prefix('/').ok_or_else(unparsable)?
        };
        return Ok((classify_string(text), clean_comment(comment)));
    }

    let (value_text, comment) = match trimmed.split_once('/') {
        Some((v, c)) => (v, c),
        None => (trimmed, ""),
    };
    let value = classify(value_text).ok_or_else(unparsable)?;
    Ok((value, clean_comment(comment)))
}

fn clean_comment(comment: &str) -> String {
    comment
        .strip_prefix(' ')
        .unwrap_or(comment)
        .trim_end()
        .to_string()
}

/// Read a quoted string body (after the opening quote).
///
/// Returns the unescaped content with trailing blanks removed, and the text
/// after the closing quote. `None` if the closing quote is missing.
fn read_quoted(body: &str) -> Option<(String, &str)> {
    let mut out = String::new();
    let mut chars = body.char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        if c == '\'' {
            if matches!(chars.peek(), Some((_, '\''))) {
                out.push('\'');
                chars.next();
                continue;
            }
            let trimmed_len = out.trim_end().len();
            out.truncate(trimmed_len);
            return Some((out, &body[i + 1..]));
        }
        out.push(c);
    }
    None
}

/// Strings that spell a date, timestamp or dimension tuple get those types.
fn classify_string(text: String) -> Value {
    let bytes = text.as_bytes();
    if bytes.len() == 10 && bytes[4] == b'-' && bytes[7] == b'-' {
        if let Ok(d) = NaiveDate::parse_from_str(&text, DATE_FORMAT) {
            return Value::Date(d);
        }
    }
    if bytes.len() >= 19 && bytes[4] == b'-' && bytes[10] == b'T' {
        if let Ok(dt) = NaiveDateTime::parse_from_str(&text, DATETIME_FORMAT) {
            return Value::DateTime(dt);
        }
    }
    if let Some(dims) = parse_dims(&text) {
        return Value::Dims(dims);
    }
    Value::String(text)
}

/// Classify a bare (unquoted) value by its character composition.
///
/// Returns `None` for anything that is not exactly one of the value forms.
pub fn classify(text: &str) -> Option<Value> {
    let text = text.trim();
    if text.is_empty() {
        return Some(Value::None);
    }
    match text {
        "T" => return Some(Value::Logical(true)),
        "F" => return Some(Value::Logical(false)),
        _ => {}
    }
    if text.starts_with('(') {
        if let Some(dims) = parse_dims(text) {
            return Some(Value::Dims(dims));
        }
        return parse_complex(text);
    }
    if is_integer_text(text) {
        return text.parse::<i128>().ok().map(Value::Integer);
    }
    parse_float(text).map(Value::Float)
}

fn is_integer_text(text: &str) -> bool {
    let digits = text.strip_prefix(['+', '-']).unwrap_or(text);
    !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit())
}

/// Digits with at most one point and an optional `E`/`D` exponent.
fn parse_float(text: &str) -> Option<f64> {
    let allowed = |c: char| c.is_ascii_digit() || matches!(c, '+' | '-' | '.' | 'E' | 'e' | 'D' | 'd');
    if !text.chars().all(allowed) || !text.chars().any(|c| c.is_ascii_digit()) {
        return None;
    }
    let mantissa_end = text.find(['E', 'e', 'D', 'd']).unwrap_or(text.len());
    if text[..mantissa_end].matches('.').count() > 1 {
        return None;
    }
    text.replace(['D', 'd'], "E").parse().ok()
}

/// `(1,2,3)`: positive integers separated by commas.
fn parse_dims(text: &str) -> Option<Vec<usize>> {
    let inner = text.strip_prefix('(')?.strip_suffix(')')?;
    inner
        .split(',')
        .map(|part| {
            let part = part.trim();
            if !part.is_empty() && part.bytes().all(|b| b.is_ascii_digit()) {
                part.parse().ok()
            } else {
                None
            }
        })
        .collect()
}

fn parse_complex(text: &str) -> Option<Value> {
    let inner = text.strip_prefix('(')?.strip_suffix(')')?;
    let (re, im) = inner.split_once(',')?;
    let part = |s: &str| {
        let s = s.trim();
        if is_integer_text(s) {
            s.parse::<f64>().ok()
        } else {
            parse_float(s)
        }
    };
    Some(Value::Complex(part(re)?, part(im)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field(s: &str) -> String {
        format!("{s:<70}")
    }

    fn parse(s: &str) -> (Value, String) {
        parse_field("TEST", &field(s)).unwrap()
    }

    // ---- Classifier ----

    #[test]
    fn classify_logical() {
        assert_eq!(classify("T"), Some(Value::Logical(true)));
        assert_eq!(classify("  F "), Some(Value::Logical(false)));
    }

    #[test]
    fn classify_integers() {
        assert_eq!(classify("42"), Some(Value::Integer(42)));
        assert_eq!(classify("-99"), Some(Value::Integer(-99)));
        assert_eq!(classify("+7"), Some(Value::Integer(7)));
        assert_eq!(
            classify("9223372036854775808"),
            Some(Value::Integer(9_223_372_036_854_775_808))
        );
    }

    #[test]
    fn classify_floats() {
        assert_eq!(classify("9.80665"), Some(Value::Float(9.80665)));
        assert_eq!(classify("1.234E+05"), Some(Value::Float(1.234e5)));
        assert_eq!(classify("-2.5D-03"), Some(Value::Float(-2.5e-3)));
        assert_eq!(classify("1E10"), Some(Value::Float(1e10)));
        assert_eq!(classify(".5"), Some(Value::Float(0.5)));
    }

    #[test]
    fn classify_tuples() {
        assert_eq!(classify("(8, 2)"), Some(Value::Dims(vec![8, 2])));
        assert_eq!(classify("(1.5, -3.25)"), Some(Value::Complex(1.5, -3.25)));
        assert_eq!(classify("(1, -2)"), Some(Value::Complex(1.0, -2.0)));
    }

    #[test]
    fn classify_empty_is_undefined() {
        assert_eq!(classify("   "), Some(Value::None));
    }

    #[test]
    fn classify_rejects_ambiguous() {
        for text in ["1.2.3", "12abc", "TRUE", "E", "--1", "(1,", "1 2", "NaN", "inf"] {
            assert_eq!(classify(text), None, "text {text:?}");
        }
    }

    // ---- Field parsing ----

    #[test]
    fn parse_integer_with_comment() {
        let (v, c) = parse("                1024 / block count");
        assert_eq!(v, Value::Integer(1024));
        assert_eq!(c, "block count");
    }

    #[test]
    fn parse_comment_without_space() {
        let (v, c) = parse("                 -32 /bits per pixel");
        assert_eq!(v, Value::Integer(-32));
        assert_eq!(c, "bits per pixel");
    }

    #[test]
    fn parse_string_values() {
        assert_eq!(parse("'IMAGE   '").0, Value::String("IMAGE".into()));
        assert_eq!(parse("'it''s ok' / quoted").0, Value::String("it's ok".into()));
        assert_eq!(parse("'it''s ok' / quoted").1, "quoted");
        assert_eq!(parse("'        '").0, Value::String(String::new()));
        assert_eq!(parse("'a / b'").0, Value::String("a / b".into()));
    }

    #[test]
    fn parse_date_strings() {
        let (v, _) = parse("'2024-03-15'");
        assert_eq!(v, Value::Date(NaiveDate::from_ymd_opt(2024, 3, 15).unwrap()));

        let (v, _) = parse("'2024-03-15T10:20:30.250'");
        let expected = NaiveDate::from_ymd_opt(2024, 3, 15)
            .unwrap()
            .and_hms_milli_opt(10, 20, 30, 250)
            .unwrap();
        assert_eq!(v, Value::DateTime(expected));
    }

    #[test]
    fn parse_dims_string() {
        assert_eq!(parse("'(8,2)'").0, Value::Dims(vec![8, 2]));
    }

    #[test]
    fn parse_malformed_fails() {
        let err = parse_field("BAD", &field("'unterminated")).unwrap_err();
        assert!(matches!(err, Error::UnparsableValue { ref keyword, .. } if keyword == "BAD"));
        assert!(parse_field("BAD", &field("'ok' junk")).is_err());
        assert!(parse_field("BAD", &field("  1.2.3 / c")).is_err());
    }

    // ---- Formatting ----

    #[test]
    fn scalar_text_forms() {
        assert_eq!(Value::Logical(true).scalar_text().unwrap().unwrap(), "T");
        assert_eq!(Value::Integer(-5).scalar_text().unwrap().unwrap(), "-5");
        assert_eq!(Value::Float(3.0).scalar_text().unwrap().unwrap(), "3.0");
        assert_eq!(Value::Float(1e300).scalar_text().unwrap().unwrap(), "1E300");
        assert_eq!(
            Value::Complex(1.5, -2.0).scalar_text().unwrap().unwrap(),
            "(1.5, -2.0)"
        );
        assert_eq!(Value::String("x".into()).scalar_text().unwrap(), None);
        assert!(Value::Float(f64::NAN).scalar_text().is_err());
    }

    #[test]
    fn float_text_roundtrips() {
        for f in [0.0, -1.0, 9.80665, 1.23e10, -4.56e-20, f64::MAX, f64::MIN_POSITIVE] {
            let text = Value::Float(f).scalar_text().unwrap().unwrap();
            assert_eq!(classify(&text), Some(Value::Float(f)), "text {text}");
        }
    }

    #[test]
    fn string_payloads() {
        let d = NaiveDate::from_ymd_opt(2001, 2, 3).unwrap();
        assert_eq!(Value::Date(d).string_payload().unwrap(), "2001-02-03");
        let dt = d.and_hms_opt(4, 5, 6).unwrap();
        assert_eq!(Value::DateTime(dt).string_payload().unwrap(), "2001-02-03T04:05:06");
        assert_eq!(Value::Dims(vec![3, 4]).string_payload().unwrap(), "(3,4)");
        assert_eq!(Value::Integer(1).string_payload(), None);
    }

    #[test]
    fn quote_pads_and_escapes() {
        assert_eq!(quote("AB"), "'AB      '");
        assert_eq!(quote("it's"), "'it''s   '");
        assert_eq!(quote("LONGER THAN 8"), "'LONGER THAN 8'");
    }

    #[test]
    fn accessors() {
        assert_eq!(Value::Integer(4).as_float(), Some(4.0));
        assert_eq!(Value::Float(4.5).as_integer(), None);
        assert_eq!(Value::Logical(false).as_bool(), Some(false));
        assert_eq!(Value::String("a".into()).as_str(), Some("a"));
        assert!(Value::None.is_none());
        assert_eq!(Value::Dims(vec![2]).to_string(), "'(2)'");
    }
}
