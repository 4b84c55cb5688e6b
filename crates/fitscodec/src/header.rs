//! Headers: ordered cards, keyword lookup and block-preserving mutation.
//!
//! A [`Header`] always holds a whole number of 36-card blocks with exactly
//! one `END` card; the cards after `END` are blank padding. Mutation never
//! shrinks the block count.

use std::collections::HashMap;
use std::fmt;

use log::{debug, trace, warn};

use crate::block::{padded_byte_len, BLOCK_SIZE, CARDS_PER_BLOCK, CARD_SIZE};
use crate::card::{
    format_card, is_structural_keyword, parse_card, validate_keyword, Card, END_KEYWORD,
};
use crate::error::{Error, Result};
use crate::hdu::HduType;
use crate::value::Value;

/// Keywords no mutation may touch, whatever the HDU type.
const ALWAYS_PROTECTED: &[&str] = &["SIMPLE", "XTENSION", "BITPIX", "NAXIS", "END"];

/// Mandatory keywords per HDU type. Indexed keywords are listed by their
/// root (`NAXIS` covers `NAXIS1`, `TFORM` covers `TFORM3`).
pub fn mandatory_keywords(hdu_type: HduType) -> &'static [&'static str] {
    match hdu_type {
        HduType::Primary => &["SIMPLE", "BITPIX", "NAXIS", "END"],
        HduType::Image => &["XTENSION", "BITPIX", "NAXIS", "PCOUNT", "GCOUNT", "END"],
        HduType::Table => &[
            "XTENSION", "BITPIX", "NAXIS", "PCOUNT", "GCOUNT", "TFIELDS", "TBCOL", "TFORM", "END",
        ],
        HduType::BinTable => &[
            "XTENSION", "BITPIX", "NAXIS", "PCOUNT", "GCOUNT", "TFIELDS", "TFORM", "END",
        ],
    }
}

/// `NAXIS3` -> `NAXIS`.
fn keyword_root(keyword: &str) -> &str {
    keyword.trim_end_matches(|c: char| c.is_ascii_digit())
}

/// Card count rounded up to whole blocks.
fn padded_card_count(cards: usize) -> usize {
    cards.div_ceil(CARDS_PER_BLOCK).max(1) * CARDS_PER_BLOCK
}

/// An HDU header.
#[derive(Debug, Clone, PartialEq)]
pub struct Header {
    cards: Vec<Card>,
    index: HashMap<String, usize>,
}

impl Header {
    /// Build a header from content cards. `END` and blank padding are added.
    pub fn from_cards(content: Vec<Card>) -> Result<Self> {
        if content.iter().any(Card::is_end) {
            return Err(Error::InvalidHeader("END card inside header content"));
        }
        let mut cards = content;
        cards.push(Card::end());
        let total = padded_card_count(cards.len());
        cards.resize(total, Card::blank());
        let mut header = Self {
            cards,
            index: HashMap::new(),
        };
        header.rebuild_index();
        Ok(header)
    }

    /// Parse the header records of one HDU.
    ///
    /// `bytes` is the header span reported by the block index: a whole
    /// number of blocks ending with the block that holds `END`.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.is_empty() || bytes.len() % BLOCK_SIZE != 0 {
            return Err(Error::MisalignedFile { len: bytes.len() });
        }
        let total = bytes.len() / CARD_SIZE;
        let mut cards = Vec::with_capacity(total);
        let mut records = bytes.chunks_exact(CARD_SIZE);
        for record in records.by_ref() {
            let record: &[u8; CARD_SIZE] = record
                .try_into()
                .map_err(|_| Error::InvalidHeader("short header record"))?;
            let card = parse_card(record)?;
            trace!("card {}: {:?}", cards.len(), card.keyword);
            let is_end = card.is_end();
            cards.push(card);
            if is_end {
                break;
            }
        }
        if !cards.last().is_some_and(Card::is_end) {
            return Err(Error::TruncatedHeader);
        }
        if records.any(|r| r.iter().any(|&b| b != b' ')) {
            warn!("discarding non-blank records after END");
        }
        cards.resize(total, Card::blank());

        let mut header = Self {
            cards,
            index: HashMap::new(),
        };
        header.rebuild_index();
        Ok(header)
    }

    /// Serialize every card, padding included.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(padded_byte_len(self.cards.len() * CARD_SIZE));
        for card in &self.cards {
            out.extend_from_slice(card.record());
        }
        out
    }

    fn rebuild_index(&mut self) {
        self.index.clear();
        for (i, card) in self.cards.iter().enumerate() {
            if card.keyword.is_empty() {
                continue;
            }
            self.index.entry(card.keyword.clone()).or_insert(i);
            if card.is_end() {
                break;
            }
        }
    }

    // ---- Queries ----

    /// Total number of cards, blank padding included. Always a multiple of 36.
    pub fn card_count(&self) -> usize {
        self.cards.len()
    }

    pub fn cards(&self) -> &[Card] {
        &self.cards
    }

    pub fn iter(&self) -> impl Iterator<Item = &Card> {
        self.cards.iter()
    }

    /// Position of the `END` card.
    pub fn end_position(&self) -> usize {
        self.index
            .get(END_KEYWORD)
            .copied()
            .unwrap_or(self.cards.len())
    }

    /// Position of the first card with `keyword`.
    pub fn position(&self, keyword: &str) -> Option<usize> {
        self.index.get(&keyword.trim().to_ascii_uppercase()).copied()
    }

    pub fn get(&self, keyword: &str) -> Option<&Card> {
        self.position(keyword).map(|i| &self.cards[i])
    }

    pub fn contains(&self, keyword: &str) -> bool {
        self.position(keyword).is_some()
    }

    pub fn value(&self, keyword: &str) -> Option<&Value> {
        self.get(keyword).map(|c| &c.value)
    }

    pub fn integer(&self, keyword: &str) -> Option<i128> {
        self.value(keyword).and_then(Value::as_integer)
    }

    pub fn float(&self, keyword: &str) -> Option<f64> {
        self.value(keyword).and_then(Value::as_float)
    }

    pub fn logical(&self, keyword: &str) -> Option<bool> {
        self.value(keyword).and_then(Value::as_bool)
    }

    /// An integer keyword that must be present.
    pub fn require_integer(&self, keyword: &str) -> Result<i128> {
        let value = self
            .value(keyword)
            .ok_or_else(|| Error::MissingKeyword(keyword.to_string()))?;
        value.as_integer().ok_or_else(|| Error::UnparsableValue {
            keyword: keyword.to_string(),
            text: value.to_string(),
        })
    }

    /// A non-negative integer keyword that must be present.
    pub fn require_usize(&self, keyword: &str) -> Result<usize> {
        let n = self.require_integer(keyword)?;
        usize::try_from(n).map_err(|_| Error::UnparsableValue {
            keyword: keyword.to_string(),
            text: n.to_string(),
        })
    }

    /// The string value of `keyword`, joined across `CONTINUE` records.
    pub fn string_value(&self, keyword: &str) -> Option<String> {
        let pos = self.position(keyword)?;
        let first = &self.cards[pos];
        let mut text = match &first.value {
            Value::String(s) => s.clone(),
            other => return other.string_payload(),
        };
        for card in self.continuation(pos) {
            let Some(stripped) = text.strip_suffix('&') else {
                break;
            };
            let piece = card.value.as_str().unwrap_or_default();
            text = format!("{stripped}{piece}");
        }
        Some(text)
    }

    /// The comment of `keyword`, joined across `CONTINUE` records.
    pub fn comment(&self, keyword: &str) -> Option<String> {
        let pos = self.position(keyword)?;
        let mut text = self.cards[pos].comment.clone();
        for card in self.continuation(pos) {
            text.push_str(&card.comment);
        }
        Some(text)
    }

    /// `CONTINUE` cards directly following the card at `pos`.
    fn continuation(&self, pos: usize) -> impl Iterator<Item = &Card> {
        self.cards[pos + 1..].iter().take_while(|c| c.is_continue())
    }

    /// Which kind of HDU this header describes.
    pub fn hdu_type(&self) -> Result<HduType> {
        match self.cards.first() {
            Some(card) if card.keyword == "SIMPLE" => Ok(HduType::Primary),
            Some(card) if card.keyword == "XTENSION" => {
                let name = card
                    .value
                    .as_str()
                    .ok_or(Error::InvalidHeader("XTENSION value is not a string"))?;
                HduType::from_xtension(name)
            }
            _ => Err(Error::InvalidHeader(
                "header does not begin with SIMPLE or XTENSION",
            )),
        }
    }

    /// Whether `keyword` (or its root without index digits) is mandatory here.
    pub fn is_mandatory(&self, keyword: &str) -> bool {
        let root = keyword_root(keyword);
        ALWAYS_PROTECTED.contains(&root)
            || self
                .hdu_type()
                .map(|t| mandatory_keywords(t).contains(&root))
                .unwrap_or(false)
    }

    // ---- Mutation ----

    /// Insert `new` cards at `pos` (at most the `END` position), growing by
    /// whole blocks only when the cards no longer fit.
    pub(crate) fn insert_at(&mut self, pos: usize, new: Vec<Card>) {
        let end = self.end_position();
        let pos = pos.min(end);
        let used = end + 1 + new.len();
        let capacity = self.cards.len().max(padded_card_count(used));
        if capacity > self.cards.len() {
            debug!(
                "header grows from {} to {} cards",
                self.cards.len(),
                capacity
            );
        }
        let mut cards = Vec::with_capacity(capacity);
        cards.extend_from_slice(&self.cards[..pos]);
        cards.extend(new);
        cards.extend_from_slice(&self.cards[pos..=end.min(self.cards.len() - 1)]);
        cards.resize(capacity, Card::blank());
        self.cards = cards;
        self.rebuild_index();
    }

    /// Replace the single card at `pos`.
    pub(crate) fn replace_at(&mut self, pos: usize, card: Card) {
        if let Some(slot) = self.cards.get_mut(pos) {
            *slot = card;
            self.rebuild_index();
        }
    }

    /// Remove the card at `pos` together with its `CONTINUE` cards, shifting
    /// later cards left and padding the tail with blanks.
    fn remove_at(&mut self, pos: usize) {
        let stop = pos + 1 + self.continuation(pos).count();
        let len = self.cards.len();
        self.cards.drain(pos..stop);
        self.cards.resize(len, Card::blank());
        self.rebuild_index();
    }

    /// Add a new keyword before `END`.
    ///
    /// Fails with [`Error::KeywordInUse`] if the keyword is already present.
    /// `COMMENT`, `HISTORY` and blank keywords may repeat.
    pub fn add_key(&mut self, keyword: &str, value: Value, comment: &str) -> Result<()> {
        let keyword = validate_keyword(keyword)?;
        let repeatable = matches!(keyword.as_str(), "" | "COMMENT" | "HISTORY");
        if !repeatable && self.contains(&keyword) {
            return Err(Error::KeywordInUse(keyword));
        }
        let new = format_card(&keyword, &value, comment)?;
        trace!("add {keyword}: {} record(s)", new.len());
        self.insert_at(self.end_position(), new);
        Ok(())
    }

    /// Delete a keyword and its `CONTINUE` cards.
    ///
    /// Mandatory keywords are refused before the header is searched.
    pub fn delete_key(&mut self, keyword: &str) -> Result<()> {
        let keyword = validate_keyword(keyword)?;
        if self.is_mandatory(&keyword) {
            return Err(Error::MandatoryKeywordProtected(keyword));
        }
        let pos = self
            .position(&keyword)
            .ok_or_else(|| Error::KeywordNotFound(keyword.clone()))?;
        trace!("delete {keyword} at {pos}");
        self.remove_at(pos);
        Ok(())
    }

    /// Rename a keyword in place, keeping its value and comment bytes.
    pub fn rename_key(&mut self, from: &str, to: &str) -> Result<()> {
        let from = validate_keyword(from)?;
        let to = validate_keyword(to)?;
        if is_structural_keyword(&to) {
            return Err(Error::IllegalKeyword(to));
        }
        if self.is_mandatory(&from) {
            return Err(Error::MandatoryKeywordProtected(from));
        }
        let pos = self
            .position(&from)
            .ok_or_else(|| Error::KeywordNotFound(from.clone()))?;
        if self.is_mandatory(&to) {
            return Err(Error::MandatoryKeywordProtected(to));
        }
        if self.contains(&to) {
            return Err(Error::KeywordInUse(to));
        }
        let renamed = self.cards[pos].renamed(&to)?;
        trace!("rename {from} -> {to} at {pos}");
        self.replace_at(pos, renamed);
        Ok(())
    }
}

impl fmt::Display for Header {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for card in &self.cards[..=self.end_position().min(self.cards.len() - 1)] {
            writeln!(f, "{}", card.record_str().trim_end())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn card(keyword: &str, value: Value) -> Card {
        format_card(keyword, &value, "").unwrap().remove(0)
    }

    /// SIMPLE, BITPIX, NAXIS, NAXIS1, NAXIS2, EXTEND, OBJECT, DATE + END.
    fn minimal() -> Header {
        Header::from_cards(vec![
            card("SIMPLE", Value::Logical(true)),
            card("BITPIX", Value::Integer(16)),
            card("NAXIS", Value::Integer(2)),
            card("NAXIS1", Value::Integer(10)),
            card("NAXIS2", Value::Integer(20)),
            card("EXTEND", Value::Logical(true)),
            card("OBJECT", Value::String("M31".into())),
            card("OBSERVER", Value::String("nobody".into())),
        ])
        .unwrap()
    }

    fn end_count(h: &Header) -> usize {
        h.iter().filter(|c| c.is_end()).count()
    }

    // ---- Construction ----

    #[test]
    fn from_cards_pads_to_block() {
        let h = minimal();
        assert_eq!(h.card_count(), 36);
        assert_eq!(h.end_position(), 8);
        assert_eq!(end_count(&h), 1);
        assert!(h.cards()[9..].iter().all(Card::is_blank));
    }

    #[test]
    fn from_cards_rejects_end() {
        let err = Header::from_cards(vec![Card::end()]).unwrap_err();
        assert!(matches!(err, Error::InvalidHeader(_)));
    }

    #[test]
    fn bytes_roundtrip() {
        let h = minimal();
        let bytes = h.to_bytes();
        assert_eq!(bytes.len(), BLOCK_SIZE);
        let back = Header::from_bytes(&bytes).unwrap();
        assert_eq!(back, h);
    }

    #[test]
    fn from_bytes_without_end() {
        let bytes = vec![b' '; BLOCK_SIZE];
        assert!(matches!(Header::from_bytes(&bytes), Err(Error::TruncatedHeader)));
        assert!(matches!(
            Header::from_bytes(&bytes[..100]),
            Err(Error::MisalignedFile { len: 100 })
        ));
    }

    // ---- Queries ----

    #[test]
    fn lookups() {
        let h = minimal();
        assert_eq!(h.integer("naxis1"), Some(10));
        assert_eq!(h.logical("SIMPLE"), Some(true));
        assert_eq!(h.string_value("OBJECT").as_deref(), Some("M31"));
        assert_eq!(h.float("BITPIX"), Some(16.0));
        assert_eq!(h.position("NAXIS"), Some(2));
        assert!(h.get("MISSING").is_none());
        assert_eq!(h.hdu_type().unwrap(), HduType::Primary);
        assert!(matches!(
            h.require_integer("MISSING"),
            Err(Error::MissingKeyword(_))
        ));
        assert!(matches!(
            h.require_integer("OBJECT"),
            Err(Error::UnparsableValue { .. })
        ));
        assert_eq!(h.require_usize("NAXIS2").unwrap(), 20);
    }

    #[test]
    fn first_occurrence_wins() {
        let mut h = minimal();
        h.add_key("COMMENT", Value::None, "first").unwrap();
        h.add_key("COMMENT", Value::None, "second").unwrap();
        assert_eq!(h.comment("COMMENT").as_deref(), Some("first"));
    }

    #[test]
    fn long_string_and_comment_reassembly() {
        let mut h = minimal();
        let long = "0123456789".repeat(20);
        let note = "a fairly long comment ".repeat(6);
        h.add_key("LONGSTR", Value::String(long.clone()), &note).unwrap();
        assert_eq!(h.string_value("LONGSTR"), Some(long));
        assert_eq!(h.comment("LONGSTR"), Some(note.trim_end().to_string()));
        assert_eq!(end_count(&h), 1);
    }

    // ---- add_key ----

    #[test]
    fn add_key_inserts_before_end() {
        let mut h = minimal();
        h.add_key("exptime", Value::Float(30.0), "seconds").unwrap();
        assert_eq!(h.position("EXPTIME"), Some(8));
        assert_eq!(h.end_position(), 9);
        assert_eq!(h.card_count(), 36);
        assert_eq!(h.comment("EXPTIME").as_deref(), Some("seconds"));
    }

    #[test]
    fn add_key_in_use() {
        let mut h = minimal();
        let err = h.add_key("OBJECT", Value::String("x".into()), "").unwrap_err();
        assert!(matches!(err, Error::KeywordInUse(k) if k == "OBJECT"));
    }

    #[test]
    fn add_key_grows_by_whole_blocks() {
        let mut h = minimal();
        // 9 cards used; 27 more fill the first block exactly.
        for i in 0..27 {
            h.add_key(&format!("KEY{i}"), Value::Integer(i), "").unwrap();
            assert_eq!(h.card_count(), 36);
        }
        assert_eq!(h.end_position(), 35);
        h.add_key("ONEMORE", Value::Logical(false), "").unwrap();
        assert_eq!(h.card_count(), 72);
        assert_eq!(end_count(&h), 1);
        assert_eq!(h.end_position(), 36);
    }

    #[test]
    fn add_key_illegal() {
        let mut h = minimal();
        assert!(matches!(
            h.add_key("WAY TOO LONG", Value::None, ""),
            Err(Error::IllegalKeyword(_))
        ));
    }

    // ---- delete_key ----

    #[test]
    fn delete_key_shifts_and_pads() {
        let mut h = minimal();
        h.delete_key("OBJECT").unwrap();
        assert!(!h.contains("OBJECT"));
        assert_eq!(h.position("OBSERVER"), Some(6));
        assert_eq!(h.end_position(), 7);
        assert_eq!(h.card_count(), 36);
    }

    #[test]
    fn delete_key_never_shrinks() {
        let mut h = minimal();
        for i in 0..28 {
            h.add_key(&format!("KEY{i}"), Value::Integer(i), "").unwrap();
        }
        assert_eq!(h.card_count(), 72);
        for i in 0..28 {
            h.delete_key(&format!("KEY{i}")).unwrap();
        }
        assert_eq!(h.card_count(), 72);
        assert_eq!(h.end_position(), 8);
    }

    #[test]
    fn delete_key_removes_continuation() {
        let mut h = minimal();
        h.add_key("LONGSTR", Value::String("x".repeat(200)), "").unwrap();
        assert!(h.iter().any(Card::is_continue));
        h.delete_key("LONGSTR").unwrap();
        assert!(!h.iter().any(Card::is_continue));
        assert_eq!(h.end_position(), 8);
    }

    #[test]
    fn delete_key_errors() {
        let mut h = minimal();
        assert!(matches!(
            h.delete_key("ABSENT"),
            Err(Error::KeywordNotFound(_))
        ));
        for k in ["NAXIS", "NAXIS2", "SIMPLE", "BITPIX", "END"] {
            assert!(
                matches!(h.delete_key(k), Err(Error::MandatoryKeywordProtected(_))),
                "{k}"
            );
        }
        // Protection does not depend on presence.
        assert!(matches!(
            h.delete_key("NAXIS3"),
            Err(Error::MandatoryKeywordProtected(_))
        ));
    }

    // ---- rename_key ----

    #[test]
    fn rename_key_in_place() {
        let mut h = minimal();
        h.rename_key("OBSERVER", "OBSERVR").unwrap();
        assert!(!h.contains("OBSERVER"));
        assert_eq!(h.position("OBSERVR"), Some(7));
        assert_eq!(h.string_value("OBSERVR").as_deref(), Some("nobody"));
    }

    #[test]
    fn rename_key_errors() {
        let mut h = minimal();
        assert!(matches!(
            h.rename_key("OBJECT", "OBSERVER"),
            Err(Error::KeywordInUse(_))
        ));
        assert!(matches!(
            h.rename_key("NAXIS1", "WIDTH"),
            Err(Error::MandatoryKeywordProtected(_))
        ));
        assert!(matches!(
            h.rename_key("ABSENT", "OTHER"),
            Err(Error::KeywordNotFound(_))
        ));
        assert!(matches!(
            h.rename_key("OBJECT", "NAXIS3"),
            Err(Error::MandatoryKeywordProtected(k)) if k == "NAXIS3"
        ));
        for target in ["COMMENT", "HISTORY", "", "CONTINUE", "END"] {
            assert!(matches!(
                h.rename_key("OBJECT", target),
                Err(Error::IllegalKeyword(_))
            ));
        }
        assert_eq!(h.value("OBJECT"), Some(&Value::String("M31".into())));
    }

    #[test]
    fn renamed_card_reads_back_as_decoded() {
        let mut h = minimal();
        h.rename_key("OBJECT", "TARGET").unwrap();
        let decoded = Header::from_bytes(&h.to_bytes()).unwrap();
        assert_eq!(h.value("TARGET"), Some(&Value::String("M31".into())));
        assert_eq!(h.value("TARGET"), decoded.value("TARGET"));
        assert!(!decoded.contains("OBJECT"));
    }

    #[test]
    fn display_stops_at_end() {
        let text = minimal().to_string();
        assert_eq!(text.lines().count(), 9);
        assert_eq!(text.lines().last(), Some("END"));
    }
}
