//! Header-data units: synthesis from typed data, decoding and validation.
//!
//! [`build`] writes the mandatory keywords for an HDU type and pairs them with
//! the payload. [`Hdu::decode`] goes the other way, dispatching on the first
//! header card to the image or table codecs.

use std::fmt;

use log::{debug, warn};
use ndarray::ArrayD;

use crate::bintable::{self, BinaryLayout};
use crate::block::{pad_to_block, padded_byte_len, DATA_PAD_BYTE, HEADER_PAD_BYTE};
use crate::card::{format_card, push_card, Card};
use crate::column::TableData;
use crate::data::{Element, ElementType, ImageData, MAX_IMAGE_AXES};
use crate::error::{Error, Result};
use crate::header::Header;
use crate::table::{self, AsciiLayout};
use crate::value::Value;

// ── HDU Type ──

/// The four kinds of HDU this crate reads and writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HduType {
    Primary,
    /// `XTENSION = 'IMAGE'`.
    Image,
    /// `XTENSION = 'TABLE'`.
    Table,
    /// `XTENSION = 'BINTABLE'`.
    BinTable,
}

impl HduType {
    /// Map an `XTENSION` value to its HDU type.
    pub fn from_xtension(name: &str) -> Result<Self> {
        match name.trim().to_ascii_uppercase().as_str() {
            "IMAGE" | "IUEIMAGE" => Ok(HduType::Image),
            "TABLE" => Ok(HduType::Table),
            "BINTABLE" | "A3DTABLE" => Ok(HduType::BinTable),
            other => Err(Error::UnsupportedExtension(other.to_string())),
        }
    }

    /// The `XTENSION` value, or `None` for the primary HDU.
    pub fn xtension(self) -> Option<&'static str> {
        match self {
            HduType::Primary => None,
            HduType::Image => Some("IMAGE"),
            HduType::Table => Some("TABLE"),
            HduType::BinTable => Some("BINTABLE"),
        }
    }

    pub fn is_table(self) -> bool {
        matches!(self, HduType::Table | HduType::BinTable)
    }
}

impl fmt::Display for HduType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.xtension().unwrap_or("PRIMARY"))
    }
}

// ── Payloads ──

/// Typed data handed to [`build`].
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// No data (`NAXIS = 0`).
    Empty,
    Image(ImageData),
    Table(TableData),
}

impl From<ImageData> for Payload {
    fn from(image: ImageData) -> Self {
        Payload::Image(image)
    }
}

impl From<TableData> for Payload {
    fn from(table: TableData) -> Self {
        Payload::Table(table)
    }
}

/// The data unit of an HDU, tagged with its HDU type.
#[derive(Debug, Clone, PartialEq)]
pub enum DataObject {
    Primary(Option<ImageData>),
    Image(Option<ImageData>),
    Table(TableData),
    BinTable(TableData),
}

impl DataObject {
    pub fn hdu_type(&self) -> HduType {
        match self {
            DataObject::Primary(_) => HduType::Primary,
            DataObject::Image(_) => HduType::Image,
            DataObject::Table(_) => HduType::Table,
            DataObject::BinTable(_) => HduType::BinTable,
        }
    }

    /// The image, for primary and image HDUs that carry data.
    pub fn image(&self) -> Option<&ImageData> {
        match self {
            DataObject::Primary(image) | DataObject::Image(image) => image.as_ref(),
            _ => None,
        }
    }

    /// The rows, for either kind of table.
    pub fn table(&self) -> Option<&TableData> {
        match self {
            DataObject::Table(t) | DataObject::BinTable(t) => Some(t),
            _ => None,
        }
    }

    fn pad_byte(&self) -> u8 {
        match self {
            DataObject::Table(_) => HEADER_PAD_BYTE,
            _ => DATA_PAD_BYTE,
        }
    }
}

// ── HDU ──

/// One header-data unit.
#[derive(Debug, Clone, PartialEq)]
pub struct Hdu {
    /// 1-based position in the file.
    pub index: usize,
    pub header: Header,
    pub data: DataObject,
}

/// Build an HDU of `hdu_type` around typed data, with its mandatory keywords.
///
/// `BZERO`/`BSCALE` are written only for element types stored through a zero
/// offset.
pub fn build(hdu_type: HduType, payload: impl Into<Payload>) -> Result<Hdu> {
    let payload = payload.into();
    let (cards, data) = match (hdu_type, payload) {
        (HduType::Primary | HduType::Image, Payload::Empty) => (image_cards(hdu_type, None)?, None),
        (HduType::Primary | HduType::Image, Payload::Image(image)) => {
            (image_cards(hdu_type, Some(&image))?, Some(image))
        }
        (HduType::Table, Payload::Table(t)) => {
            let layout = AsciiLayout::from_columns(&t.columns)?;
            let mut cards = table_cards(hdu_type, layout.row_len, &t)?;
            cards.extend(layout.cards()?);
            let header = Header::from_cards(cards)?;
            return Ok(Hdu::new(1, header, DataObject::Table(t)));
        }
        (HduType::BinTable, Payload::Table(t)) => {
            let layout = BinaryLayout::from_columns(&t.columns)?;
            let mut cards = table_cards(hdu_type, layout.row_len, &t)?;
            cards.extend(layout.cards()?);
            let header = Header::from_cards(cards)?;
            return Ok(Hdu::new(1, header, DataObject::BinTable(t)));
        }
        (hdu_type, payload) => {
            let what = match payload {
                Payload::Empty => "no data",
                Payload::Image(_) => "image data",
                Payload::Table(_) => "table data",
            };
            return Err(Error::UnsupportedDataType(format!("{what} in a {hdu_type} HDU")));
        }
    };
    let header = Header::from_cards(cards)?;
    let data = match hdu_type {
        HduType::Primary => DataObject::Primary(data),
        _ => DataObject::Image(data),
    };
    Ok(Hdu::new(1, header, data))
}

/// Columns of a table HDU.
pub fn parse_table(hdu: &Hdu) -> Result<&TableData> {
    hdu.data.table().ok_or_else(|| {
        Error::UnsupportedDataType(format!("{} HDU has no columns", hdu.hdu_type()))
    })
}

fn single_card(keyword: &str, value: Value, comment: &str) -> Result<Card> {
    format_card(keyword, &value, comment)?
        .into_iter()
        .next()
        .ok_or(Error::InvalidHeader("keyword formatted to no records"))
}

fn first_card(hdu_type: HduType) -> Result<Card> {
    match hdu_type.xtension() {
        None => single_card("SIMPLE", Value::Logical(true), "conforms to FITS standard"),
        Some(name) => single_card("XTENSION", Value::String(name.to_string()), "extension type"),
    }
}

fn extension_counts(cards: &mut Vec<Card>) -> Result<()> {
    push_card(cards, "PCOUNT", Value::Integer(0), "number of group parameters")?;
    push_card(cards, "GCOUNT", Value::Integer(1), "number of groups")
}

fn image_cards(hdu_type: HduType, image: Option<&ImageData>) -> Result<Vec<Card>> {
    let (element_type, naxes) = match image {
        Some(image) => (image.element_type(), image.shape()),
        None => (ElementType::U8, Vec::new()),
    };
    if naxes.len() > MAX_IMAGE_AXES {
        return Err(Error::TooManyDimensions(naxes.len()));
    }
    let mut cards = vec![first_card(hdu_type)?];
    push_card(
        &mut cards,
        "BITPIX",
        Value::Integer(element_type.bitpix().into()),
        "number of bits per data pixel",
    )?;
    push_card(&mut cards, "NAXIS", Value::Integer(naxes.len() as i128), "number of data axes")?;
    for (i, n) in naxes.iter().enumerate() {
        push_card(
            &mut cards,
            &format!("NAXIS{}", i + 1),
            Value::Integer(*n as i128),
            &format!("length of data axis {}", i + 1),
        )?;
    }
    if hdu_type == HduType::Image {
        extension_counts(&mut cards)?;
    }
    let bzero = element_type.bzero();
    if bzero != 0 {
        push_card(
            &mut cards,
            "BZERO",
            Value::Integer(bzero),
            "offset data range to that of the stored type",
        )?;
        push_card(&mut cards, "BSCALE", Value::Integer(1), "default scaling factor")?;
    }
    Ok(cards)
}

fn table_cards(hdu_type: HduType, row_len: usize, table: &TableData) -> Result<Vec<Card>> {
    let mut cards = vec![first_card(hdu_type)?];
    push_card(&mut cards, "BITPIX", Value::Integer(8), "8-bit bytes")?;
    push_card(&mut cards, "NAXIS", Value::Integer(2), "2-dimensional table")?;
    push_card(&mut cards, "NAXIS1", Value::Integer(row_len as i128), "width of table in bytes")?;
    push_card(
        &mut cards,
        "NAXIS2",
        Value::Integer(table.nrows() as i128),
        "number of rows in table",
    )?;
    extension_counts(&mut cards)?;
    push_card(
        &mut cards,
        "TFIELDS",
        Value::Integer(table.ncols() as i128),
        "number of fields in each row",
    )?;
    Ok(cards)
}

impl Hdu {
    pub fn new(index: usize, header: Header, data: DataObject) -> Self {
        Self {
            index,
            header,
            data,
        }
    }

    pub fn hdu_type(&self) -> HduType {
        self.data.hdu_type()
    }

    /// `EXTNAME`, without trailing blanks.
    pub fn extname(&self) -> Option<String> {
        self.header
            .string_value("EXTNAME")
            .map(|s| s.trim_end().to_string())
    }

    /// The image as an array of `T`.
    pub fn image<T: Element>(&self) -> Option<&ArrayD<T>> {
        self.data.image()?.as_array()
    }

    pub fn table(&self) -> Option<&TableData> {
        self.data.table()
    }

    /// Decode the HDU at 1-based `index` from its header and data spans.
    pub fn decode(index: usize, header: Header, data: &[u8]) -> Result<Self> {
        let hdu_type = header.hdu_type()?;
        match (index, hdu_type) {
            (1, HduType::Primary) => {}
            (1, _) => return Err(Error::InvalidHeader("first HDU does not begin with SIMPLE")),
            (_, HduType::Primary) => {
                return Err(Error::InvalidHeader("extension HDU does not begin with XTENSION"))
            }
            _ => {}
        }
        let declared = declared_data_len(&header)?;
        if data.len() < declared {
            return Err(Error::TruncatedData {
                expected: declared,
                available: data.len(),
            });
        }
        debug!("decoding HDU {index} ({hdu_type}): {declared} data bytes");

        let object = match hdu_type {
            HduType::Primary => DataObject::Primary(decode_image(&header, data)?),
            HduType::Image => DataObject::Image(decode_image(&header, data)?),
            HduType::Table => DataObject::Table(table::decode_table(&header, data)?),
            HduType::BinTable => {
                if header.integer("PCOUNT").unwrap_or(0) > 0 {
                    debug!("HDU {index}: ignoring binary table heap");
                }
                DataObject::BinTable(bintable::decode_table(&header, data)?)
            }
        };
        Ok(Self::new(index, header, object))
    }

    /// Check that the dimension keywords describe the payload.
    pub fn validate(&self) -> Result<()> {
        match &self.data {
            DataObject::Primary(image) | DataObject::Image(image) => {
                let shape = image.as_ref().map(ImageData::shape).unwrap_or_default();
                expect_keyword(&self.header, "NAXIS", shape.len())?;
                for (i, n) in shape.iter().enumerate() {
                    expect_keyword(&self.header, &format!("NAXIS{}", i + 1), *n)?;
                }
                if let Some(image) = image {
                    let bitpix = self.header.require_integer("BITPIX")?;
                    if bitpix != i128::from(image.element_type().bitpix()) {
                        return Err(Error::ShapeMismatch {
                            keyword: "BITPIX".to_string(),
                            header: bitpix.unsigned_abs() as usize,
                            actual: image.element_type().byte_width() * 8,
                        });
                    }
                    // The header must decode back to the same element type.
                    let bzero = self.header.float("BZERO").unwrap_or(0.0);
                    if ElementType::from_bitpix(bitpix, bzero)? != image.element_type() {
                        return Err(Error::InvalidHeader(
                            "BZERO does not match the image element type",
                        ));
                    }
                }
            }
            DataObject::Table(t) | DataObject::BinTable(t) => {
                expect_keyword(&self.header, "NAXIS2", t.nrows())?;
                expect_keyword(&self.header, "TFIELDS", t.ncols())?;
            }
        }
        Ok(())
    }

    /// Data bytes before block padding.
    pub fn encode_data(&self) -> Result<Vec<u8>> {
        self.validate()?;
        match &self.data {
            DataObject::Primary(image) | DataObject::Image(image) => {
                Ok(image.as_ref().map(ImageData::encode).unwrap_or_default())
            }
            DataObject::Table(t) => {
                let layout = AsciiLayout::from_header(&self.header)?;
                let mut bytes = Vec::with_capacity(layout.row_len * t.nrows());
                for row in 0..t.nrows() {
                    layout.encode_row(t, row, &mut bytes)?;
                }
                Ok(bytes)
            }
            DataObject::BinTable(t) => {
                let layout = BinaryLayout::from_header(&self.header)?;
                let mut bytes = Vec::with_capacity(layout.row_len * t.nrows());
                for row in 0..t.nrows() {
                    layout.encode_row(t, row, &mut bytes)?;
                }
                Ok(bytes)
            }
        }
    }

    /// Header blocks followed by padded data blocks.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut data = self.encode_data()?;
        let mut out = self.header.to_bytes();
        if !data.is_empty() {
            pad_to_block(&mut data, self.data.pad_byte());
            out.extend_from_slice(&data);
        }
        Ok(out)
    }

    /// Size of [`Hdu::encode`]'s output.
    pub fn encoded_len(&self) -> Result<usize> {
        Ok(self.header.to_bytes().len() + padded_byte_len(declared_data_len(&self.header)?))
    }

    /// Move the HDU to `index`, turning an image extension into the primary
    /// HDU (or back) as needed.
    pub(crate) fn reposition(&mut self, index: usize) -> Result<()> {
        let target = match (index, self.hdu_type()) {
            (1, HduType::Image) => HduType::Primary,
            (1, t) if t.is_table() => {
                return Err(Error::InvalidHeader("a table cannot be the primary HDU"))
            }
            (i, HduType::Primary) if i > 1 => HduType::Image,
            _ => {
                self.index = index;
                return Ok(());
            }
        };
        let first = first_card(target)?;
        let counts = if target == HduType::Image && !self.header.contains("PCOUNT") {
            let naxis = self.header.require_usize("NAXIS")?;
            let pos = self.header.position("NAXIS").map_or(0, |p| p + naxis + 1);
            let mut counts = Vec::new();
            extension_counts(&mut counts)?;
            Some((pos, counts))
        } else {
            None
        };

        self.header.replace_at(0, first);
        if let Some((pos, counts)) = counts {
            self.header.insert_at(pos, counts);
        }
        self.data = match std::mem::replace(&mut self.data, DataObject::Primary(None)) {
            DataObject::Primary(image) | DataObject::Image(image) if target == HduType::Primary => {
                DataObject::Primary(image)
            }
            DataObject::Primary(image) | DataObject::Image(image) => DataObject::Image(image),
            other => other,
        };
        debug!("HDU moved to position {index} as {target}");
        self.index = index;
        Ok(())
    }
}

fn expect_keyword(header: &Header, keyword: &str, actual: usize) -> Result<()> {
    let declared = header.require_usize(keyword)?;
    if declared != actual {
        return Err(Error::ShapeMismatch {
            keyword: keyword.to_string(),
            header: declared,
            actual,
        });
    }
    Ok(())
}

/// Data bytes the header declares, before padding.
pub fn declared_data_len(header: &Header) -> Result<usize> {
    let naxis = header.require_usize("NAXIS")?;
    if naxis == 0 {
        return Ok(0);
    }
    let bitpix = header.require_integer("BITPIX")?;
    let mut count = 1usize;
    for i in 1..=naxis {
        count = count.saturating_mul(header.require_usize(&format!("NAXIS{i}"))?);
    }
    let pcount = header.integer("PCOUNT").unwrap_or(0).max(0) as usize;
    let gcount = header.integer("GCOUNT").unwrap_or(1).max(1) as usize;
    let bytes = (bitpix.unsigned_abs() / 8) as usize;
    Ok(bytes.saturating_mul(gcount.saturating_mul(pcount.saturating_add(count))))
}

fn decode_image(header: &Header, data: &[u8]) -> Result<Option<ImageData>> {
    let naxis = header.require_usize("NAXIS")?;
    if naxis > MAX_IMAGE_AXES {
        return Err(Error::TooManyDimensions(naxis));
    }
    if naxis == 0 {
        return Ok(None);
    }
    let naxes = (1..=naxis)
        .map(|i| header.require_usize(&format!("NAXIS{i}")))
        .collect::<Result<Vec<_>>>()?;
    let bscale = header.float("BSCALE").unwrap_or(1.0);
    if bscale != 1.0 {
        warn!("BSCALE = {bscale} is not applied");
    }
    let bzero = header.float("BZERO").unwrap_or(0.0);
    let element_type = ElementType::from_bitpix(header.require_integer("BITPIX")?, bzero)?;
    if bzero != 0.0 && bzero != element_type.bzero() as f64 {
        warn!("BZERO = {bzero} is not applied to {element_type} data");
    }
    ImageData::decode(element_type, &naxes, data).map(Some)
}

// ── Tests ──
