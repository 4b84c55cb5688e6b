//! 80-byte header records.
//!
//! [`parse_card`] turns one record into a typed [`Card`]; [`format_card`]
//! turns a keyword/value/comment triple into one or more records, spilling
//! long strings and long comments into `CONTINUE` records.

use core::fmt;
use core::str;

use log::trace;

use crate::block::CARD_SIZE;
use crate::error::{Error, Result};
use crate::value::{parse_field, quote, Value, VALUE_FIELD_WIDTH};

/// Longest keyword.
pub const KEYWORD_LEN: usize = 8;

/// Text characters per commentary record.
pub const COMMENTARY_WIDTH: usize = CARD_SIZE - KEYWORD_LEN;

/// Escaped string characters per continued record, before the `&`.
pub const STRING_CHUNK: usize = 67;

/// Comment characters per comment-only `CONTINUE` record.
pub const COMMENT_CHUNK: usize = 65;

pub const END_KEYWORD: &str = "END";
pub const CONTINUE_KEYWORD: &str = "CONTINUE";

const VALUE_INDICATOR: &[u8; 2] = b"= ";
const CONTINUE_PREFIX: &str = "CONTINUE  ";
const EMPTY_CONTINUE: &str = "CONTINUE  ''";

/// One physical header record with its decoded content.
#[derive(Clone, PartialEq)]
pub struct Card {
    /// Upper-case keyword without padding. Empty for blank records.
    pub keyword: String,
    pub value: Value,
    /// Comment text, or the free text of commentary records.
    pub comment: String,
    record: [u8; CARD_SIZE],
}

impl Card {
    /// An all-blank record.
    pub fn blank() -> Self {
        Self {
            keyword: String::new(),
            value: Value::None,
            comment: String::new(),
            record: [b' '; CARD_SIZE],
        }
    }

    /// The `END` record.
    pub fn end() -> Self {
        let mut record = [b' '; CARD_SIZE];
        record[..3].copy_from_slice(END_KEYWORD.as_bytes());
        Self {
            keyword: END_KEYWORD.to_string(),
            value: Value::None,
            comment: String::new(),
            record,
        }
    }

    /// The verbatim record.
    pub fn record(&self) -> &[u8; CARD_SIZE] {
        &self.record
    }

    pub fn record_str(&self) -> &str {
        // Records are validated as printable ASCII on the way in.
        str::from_utf8(&self.record).unwrap_or_default()
    }

    pub fn is_end(&self) -> bool {
        self.keyword == END_KEYWORD
    }

    pub fn is_blank(&self) -> bool {
        self.record.iter().all(|&b| b == b' ')
    }

    pub fn is_continue(&self) -> bool {
        self.keyword == CONTINUE_KEYWORD
    }

    /// `COMMENT`, `HISTORY` and blank-keyword records.
    pub fn is_commentary(&self) -> bool {
        is_commentary_keyword(&self.keyword)
    }

    /// Replace the keyword field, keeping bytes 9-80 untouched.
    ///
    /// The record is parsed again, so the result reads back exactly as it
    /// will decode. Commentary, `CONTINUE` and `END` names are refused.
    pub fn renamed(&self, keyword: &str) -> Result<Self> {
        let keyword = validate_keyword(keyword)?;
        if is_structural_keyword(&keyword) {
            return Err(Error::IllegalKeyword(keyword));
        }
        let mut record = self.record;
        record[..KEYWORD_LEN].copy_from_slice(format!("{keyword:<8}").as_bytes());
        parse_card(&record)
    }
}

impl fmt::Debug for Card {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Card")
            .field("keyword", &self.keyword)
            .field("value", &self.value)
            .field("comment", &self.comment)
            .finish()
    }
}

fn is_commentary_keyword(keyword: &str) -> bool {
    matches!(keyword, "" | "COMMENT" | "HISTORY")
}

/// Names whose records are not ordinary keyword/value pairs.
pub(crate) fn is_structural_keyword(keyword: &str) -> bool {
    is_commentary_keyword(keyword) || keyword == CONTINUE_KEYWORD || keyword == END_KEYWORD
}

fn is_keyword_char(c: char) -> bool {
    c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_' || c == '-'
}

/// Upper-case `keyword` and check it against the 8-character `[A-Z0-9_-]` rule.
pub fn validate_keyword(keyword: &str) -> Result<String> {
    let upper = keyword.trim().to_ascii_uppercase();
    if upper.len() > KEYWORD_LEN || !upper.chars().all(is_keyword_char) {
        return Err(Error::IllegalKeyword(keyword.to_string()));
    }
    Ok(upper)
}

fn check_printable(text: &str) -> Result<()> {
    if text.bytes().all(|b| (0x20..=0x7E).contains(&b)) {
        Ok(())
    } else {
        Err(Error::InvalidHeader("non-printable character in card text"))
    }
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

/// Parse one 80-byte record.
///
/// Bytes 9-10 equal to `= ` mark a valued record; `CONTINUE` records carry a
/// quoted string starting in column 11. Anything else is commentary text.
pub fn parse_card(record: &[u8; CARD_SIZE]) -> Result<Card> {
    if !record.iter().all(|b| (0x20..=0x7E).contains(b)) {
        return Err(Error::InvalidHeader("non-printable byte in header record"));
    }
    let text = str::from_utf8(record)
        .map_err(|_| Error::InvalidHeader("non-ASCII header record"))?;
    let keyword = text[..KEYWORD_LEN].trim_end();
    if !keyword.chars().all(is_keyword_char) {
        return Err(Error::IllegalKeyword(keyword.to_string()));
    }
    let keyword = keyword.to_string();

    let valued = &record[KEYWORD_LEN..KEYWORD_LEN + 2] == VALUE_INDICATOR
        && !is_commentary_keyword(&keyword);
    let continued =
        keyword == CONTINUE_KEYWORD && text[KEYWORD_LEN..].trim_start().starts_with('\'');

    let (value, comment) = if keyword == END_KEYWORD {
        (Value::None, String::new())
    } else if valued || continued {
        parse_field(&keyword, &text[KEYWORD_LEN + 2..])?
    } else {
        (Value::None, text[KEYWORD_LEN..].trim_end().to_string())
    };

    Ok(Card {
        keyword,
        value,
        comment,
        record: *record,
    })
}

// ---------------------------------------------------------------------------
// Formatting
// ---------------------------------------------------------------------------

fn to_record(text: &str) -> [u8; CARD_SIZE] {
    let mut record = [b' '; CARD_SIZE];
    let bytes = text.as_bytes();
    let len = bytes.len().min(CARD_SIZE);
    record[..len].copy_from_slice(&bytes[..len]);
    record
}

/// Split off the longest prefix of `text` that fits in `room` characters and
/// does not end in a blank, so that trimming on read loses nothing.
fn take_comment_chunk(text: &str, room: usize) -> (&str, &str) {
    if text.len() <= room {
        return (text, "");
    }
    let window = &text[..room];
    let cut = match window.trim_end().len() {
        0 => room,
        n => n,
    };
    text.split_at(cut)
}

/// Split a string payload into escaped chunks of at most `STRING_CHUNK`
/// characters without separating the two halves of a doubled quote.
fn string_chunks(payload: &str) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();
    for c in payload.chars() {
        let width = if c == '\'' { 2 } else { 1 };
        if current.len() + width > STRING_CHUNK {
            chunks.push(core::mem::take(&mut current));
        }
        current.push(c);
        if c == '\'' {
            current.push('\'');
        }
    }
    chunks.push(current);
    chunks
}

fn commentary_records(keyword: &str, text: &str) -> Vec<String> {
    let mut records = Vec::new();
    let mut rest = text;
    loop {
        let (head, tail) = rest.split_at(rest.len().min(COMMENTARY_WIDTH));
        records.push(format!("{keyword:<8}{head}"));
        if tail.is_empty() {
            break;
        }
        rest = tail;
    }
    records
}

/// Value records for a string payload. Every record but the last ends in
/// `&'`; with `force_continue` the last one does as well.
fn string_records(keyword: &str, payload: &str, force_continue: bool) -> Vec<String> {
    let escaped_len = payload.len() + payload.matches('\'').count();
    if escaped_len <= STRING_CHUNK + 1 && !force_continue {
        let quoted = quote(payload);
        return vec![format!("{keyword:<8}= {quoted:<VALUE_FIELD_WIDTH$}")];
    }
    let chunks = string_chunks(payload);
    let last = chunks.len() - 1;
    chunks
        .iter()
        .enumerate()
        .map(|(i, chunk)| {
            let prefix = if i == 0 {
                format!("{keyword:<8}= ")
            } else {
                CONTINUE_PREFIX.to_string()
            };
            let amp = if i < last || force_continue { "&" } else { "" };
            format!("{prefix}'{chunk}{amp}'")
        })
        .collect()
}

/// Format a keyword/value/comment triple into records.
///
/// The keyword is upper-cased and validated. A blank keyword, `COMMENT` or
/// `HISTORY` produces commentary records wrapped at 72 characters; `END`
/// produces the bare sentinel. Otherwise the value goes into the fixed value
/// field, strings longer than one record are continued on `CONTINUE` records,
/// and a comment that does not fit is wrapped onto `CONTINUE  '' / ` records
/// after the last value record has absorbed what it can.
pub fn format_card(keyword: &str, value: &Value, comment: &str) -> Result<Vec<Card>> {
    let keyword = validate_keyword(keyword)?;
    if keyword == END_KEYWORD {
        return Ok(vec![Card::end()]);
    }
    let comment = comment.trim_end();
    check_printable(comment)?;

    let records = if is_commentary_keyword(&keyword) {
        let text = match value.string_payload() {
            Some(s) if comment.is_empty() => s,
            _ => comment.to_string(),
        };
        check_printable(&text)?;
        commentary_records(&keyword, &text)
    } else {
        valued_records(&keyword, value, comment)?
    };

    trace!("formatted {keyword} into {} record(s)", records.len());
    records
        .iter()
        .map(|r| parse_card(&to_record(r)))
        .collect()
}

const COMMENT_SEPARATOR: &str = " / ";

/// Column after the value, never before the end of the fixed value field.
fn value_end(record: &str) -> usize {
    record.trim_end().len().max(10 + VALUE_FIELD_WIDTH)
}

/// Comment characters that still fit on `record`.
fn comment_room(record: &str) -> usize {
    CARD_SIZE.saturating_sub(value_end(record) + COMMENT_SEPARATOR.len())
}

fn valued_records(keyword: &str, value: &Value, comment: &str) -> Result<Vec<String>> {
    let mut records = match value.string_payload() {
        Some(payload) => {
            check_printable(&payload)?;
            let plain = string_records(keyword, &payload, false);
            let room = plain.last().map_or(0, |r| comment_room(r));
            if comment.len() <= room {
                plain
            } else {
                // The comment spills, so the value chain has to stay open.
                string_records(keyword, &payload, true)
            }
        }
        None => {
            let text = value
                .scalar_text()
                .map_err(|text| Error::UnparsableValue {
                    keyword: keyword.to_string(),
                    text,
                })?
                .unwrap_or_default();
            vec![format!("{keyword:<8}= {text:>VALUE_FIELD_WIDTH$}")]
        }
    };

    if comment.is_empty() {
        return Ok(records);
    }

    let mut rest = comment;
    if let Some(last) = records.last_mut() {
        let used = value_end(last);
        let room = comment_room(last);
        if room > 0 {
            let (head, tail) = take_comment_chunk(rest, room);
            *last = format!("{:<used$}{COMMENT_SEPARATOR}{head}", last.trim_end());
            rest = tail;
        }
    }
    while !rest.is_empty() {
        let (head, tail) = take_comment_chunk(rest, COMMENT_CHUNK);
        records.push(format!("{EMPTY_CONTINUE}{COMMENT_SEPARATOR}{head}"));
        rest = tail;
    }
    Ok(records)
}

/// Format `keyword` and append its records to `cards`.
pub(crate) fn push_card(
    cards: &mut Vec<Card>,
    keyword: &str,
    value: Value,
    comment: &str,
) -> Result<()> {
    cards.extend(format_card(keyword, &value, comment)?);
    Ok(())
}
