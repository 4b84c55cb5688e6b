//! Binary table extensions (`XTENSION = 'BINTABLE'`).
//!
//! Each field occupies `repeat * element_size` big-endian bytes at a fixed
//! offset in the row. Unsigned 16/32/64-bit and signed 8-bit columns are
//! stored through `TZEROn`, the same way images use `BZERO`.

use log::{debug, warn};

use crate::card::{push_card, Card};
use crate::column::{Cell, Column, ColumnData, TableData};
use crate::data::{decode_values, Element, ElementType};
use crate::error::{Error, Result};
use crate::format::{BinaryCode, BinaryFormat};
use crate::header::Header;
use crate::value::Value;

// ── Field Layout ──

/// What a field holds once decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryKind {
    Element(ElementType),
    /// `A`: one or more fixed-width strings.
    Text,
    /// `X`: packed bits, most significant first.
    Bits,
}

/// Type code that stores `t`, before any zero offset.
pub fn code_for(t: ElementType) -> BinaryCode {
    match t {
        ElementType::Bool => BinaryCode::Logical,
        ElementType::U8 | ElementType::I8 => BinaryCode::Byte,
        ElementType::I16 | ElementType::U16 => BinaryCode::Short,
        ElementType::I32 | ElementType::U32 => BinaryCode::Int,
        ElementType::I64 | ElementType::U64 => BinaryCode::Long,
        ElementType::F32 => BinaryCode::Float,
        ElementType::F64 => BinaryCode::Double,
        ElementType::C32 => BinaryCode::ComplexFloat,
        ElementType::C64 => BinaryCode::ComplexDouble,
    }
}

/// Element type read from `code` with zero offset `tzero`.
fn kind_for(code: BinaryCode, tzero: i128) -> Result<BinaryKind> {
    let base = match code {
        BinaryCode::Char => return Ok(BinaryKind::Text),
        BinaryCode::Bit => return Ok(BinaryKind::Bits),
        BinaryCode::ArrayDescriptor | BinaryCode::ArrayDescriptor64 => {
            return Err(Error::NotImplemented("variable-length array columns"))
        }
        BinaryCode::Logical => ElementType::Bool,
        BinaryCode::Byte => ElementType::U8,
        BinaryCode::Short => ElementType::I16,
        BinaryCode::Int => ElementType::I32,
        BinaryCode::Long => ElementType::I64,
        BinaryCode::Float => ElementType::F32,
        BinaryCode::Double => ElementType::F64,
        BinaryCode::ComplexFloat => ElementType::C32,
        BinaryCode::ComplexDouble => ElementType::C64,
    };
    if tzero == 0 {
        return Ok(BinaryKind::Element(base));
    }
    let offset = [ElementType::I8, ElementType::U16, ElementType::U32, ElementType::U64]
        .into_iter()
        .find(|t| code_for(*t) == code && t.bzero() == tzero);
    match offset {
        Some(t) => Ok(BinaryKind::Element(t)),
        None => {
            warn!("TZERO = {tzero} on a {} field is not applied", code.letter());
            Ok(BinaryKind::Element(base))
        }
    }
}

/// One field of a binary table row.
#[derive(Debug, Clone, PartialEq)]
pub struct BinaryField {
    pub name: String,
    pub format: BinaryFormat,
    pub kind: BinaryKind,
    /// Byte offset within the row.
    pub offset: usize,
    /// `TDIMn`, when declared.
    pub dims: Option<Vec<usize>>,
    pub unit: Option<String>,
}

impl BinaryField {
    pub fn width(&self) -> usize {
        self.format.byte_width()
    }

    fn stop(&self) -> usize {
        self.offset + self.width()
    }

    /// Characters per string of a character field.
    fn char_width(&self) -> usize {
        match &self.dims {
            Some(dims) if !dims.is_empty() => dims[0],
            _ => self.format.repeat,
        }
    }

    /// Strings per row of a character field.
    fn strings_per_row(&self) -> usize {
        match self.char_width() {
            0 => 0,
            w => self.format.repeat / w,
        }
    }

    fn tzero(&self) -> i128 {
        match self.kind {
            BinaryKind::Element(t) => t.bzero(),
            _ => 0,
        }
    }
}

/// Byte layout of a binary table row.
#[derive(Debug, Clone, PartialEq)]
pub struct BinaryLayout {
    pub fields: Vec<BinaryField>,
    /// `NAXIS1`.
    pub row_len: usize,
}

impl BinaryLayout {
    /// Pick a `TFORMn` for every column.
    pub fn from_columns(columns: &[Column]) -> Result<Self> {
        let mut fields = Vec::with_capacity(columns.len());
        let mut offset = 0;
        for column in columns {
            let field = describe_column(column, offset)?;
            offset = field.stop();
            fields.push(field);
        }
        Ok(Self {
            fields,
            row_len: offset,
        })
    }

    /// Read the field layout from `TFIELDS`, `TFORMn`, `TZEROn` and `TDIMn`.
    pub fn from_header(header: &Header) -> Result<Self> {
        let row_len = header.require_usize("NAXIS1")?;
        let tfields = header.require_usize("TFIELDS")?;
        let mut fields = Vec::with_capacity(tfields);
        let mut offset = 0;
        for n in 1..=tfields {
            let field = read_field(header, n, offset)?;
            offset = field.stop();
            fields.push(field);
        }
        if offset > row_len {
            return Err(Error::InvalidHeader("binary table fields extend past NAXIS1"));
        }
        if offset < row_len {
            warn!("binary table rows carry {} unused bytes", row_len - offset);
        }
        Ok(Self { fields, row_len })
    }

    /// `TTYPEn`, `TFORMn`, `TZEROn`, `TDIMn` and `TUNITn` cards.
    pub fn cards(&self) -> Result<Vec<Card>> {
        let mut cards = Vec::new();
        for (i, field) in self.fields.iter().enumerate() {
            let n = i + 1;
            push_card(
                &mut cards,
                &format!("TTYPE{n}"),
                Value::String(field.name.clone()),
                "label for field",
            )?;
            push_card(
                &mut cards,
                &format!("TFORM{n}"),
                Value::String(field.format.to_string()),
                "data format of field",
            )?;
            let tzero = field.tzero();
            if tzero != 0 {
                push_card(
                    &mut cards,
                    &format!("TZERO{n}"),
                    Value::Integer(tzero),
                    "offset for unsigned integers",
                )?;
                push_card(
                    &mut cards,
                    &format!("TSCAL{n}"),
                    Value::Integer(1),
                    "data are not scaled",
                )?;
            }
            if let Some(dims) = &field.dims {
                push_card(
                    &mut cards,
                    &format!("TDIM{n}"),
                    Value::Dims(dims.clone()),
                    "dimensions of field",
                )?;
            }
            if let Some(unit) = &field.unit {
                push_card(
                    &mut cards,
                    &format!("TUNIT{n}"),
                    Value::String(unit.clone()),
                    "physical unit of field",
                )?;
            }
        }
        Ok(cards)
    }

    /// Append the `row_len` bytes of row `row`.
    pub fn encode_row(&self, table: &TableData, row: usize, out: &mut Vec<u8>) -> Result<()> {
        let before = out.len();
        for (field, column) in self.fields.iter().zip(&table.columns) {
            match (&field.kind, &column.data) {
                (BinaryKind::Text, ColumnData::Str(strings)) => {
                    let k = field.strings_per_row();
                    let width = field.char_width();
                    let row_strings = strings
                        .get(row * k..(row + 1) * k)
                        .ok_or_else(|| short_column(field, table, strings.len()))?;
                    for s in row_strings {
                        if s.len() > width {
                            return Err(Error::UnsupportedDataType(format!(
                                "string {s:?} is wider than the {width} characters of column {}",
                                field.name
                            )));
                        }
                        out.extend_from_slice(s.as_bytes());
                        out.resize(out.len() + width - s.len(), b' ');
                    }
                }
                (BinaryKind::Bits, ColumnData::Bits(bits)) => {
                    let r = field.format.repeat;
                    let row_bits = bits
                        .get(row * r..(row + 1) * r)
                        .ok_or_else(|| short_column(field, table, bits.len()))?;
                    out.extend(pack_bits(row_bits));
                }
                (BinaryKind::Element(t), data) if data.element_type() == Some(*t) => {
                    let r = field.format.repeat;
                    if data.len() < (row + 1) * r {
                        return Err(short_column(field, table, data.len()));
                    }
                    data.encode_range(row * r, (row + 1) * r, out);
                }
                _ => {
                    return Err(Error::UnsupportedDataType(format!(
                        "column {} does not match {}",
                        field.name, field.format
                    )))
                }
            }
        }
        out.resize(before + self.row_len, 0);
        Ok(())
    }

    /// Decode one row into cells.
    pub fn decode_row(&self, record: &[u8]) -> Result<Vec<Cell>> {
        self.fields
            .iter()
            .map(|field| decode_field(field, &record[field.offset..field.stop()]))
            .collect()
    }

    fn empty_columns(&self) -> Vec<Column> {
        self.fields
            .iter()
            .map(|field| {
                let (data, repeat, width) = match field.kind {
                    BinaryKind::Element(t) => (ColumnData::empty(t), field.format.repeat, None),
                    BinaryKind::Bits => (ColumnData::Bits(Vec::new()), field.format.repeat, None),
                    BinaryKind::Text => (
                        ColumnData::Str(Vec::new()),
                        field.strings_per_row(),
                        Some(field.char_width()),
                    ),
                };
                Column {
                    name: field.name.clone(),
                    data,
                    repeat,
                    width,
                    dims: field.dims.clone(),
                    unit: field.unit.clone(),
                }
            })
            .collect()
    }
}

fn short_column(field: &BinaryField, table: &TableData, len: usize) -> Error {
    Error::ShapeMismatch {
        keyword: format!("NAXIS2 for {}", field.name),
        header: table.nrows(),
        actual: len,
    }
}

fn describe_column(column: &Column, offset: usize) -> Result<BinaryField> {
    let (kind, format, dims) = match &column.data {
        ColumnData::Str(strings) => {
            let width = column.char_width();
            if let Some(long) = strings.iter().find(|s| s.len() > width) {
                return Err(Error::UnsupportedDataType(format!(
                    "string {long:?} is wider than the {width} characters of column {}",
                    column.name
                )));
            }
            let repeat = width * column.repeat;
            let dims = match &column.dims {
                Some(d) if d.first() != Some(&width) => {
                    return Err(Error::ShapeMismatch {
                        keyword: format!("TDIM of {}", column.name),
                        header: d.first().copied().unwrap_or(0),
                        actual: width,
                    });
                }
                Some(d) => Some(d.clone()),
                None if column.repeat != 1 => Some(vec![width, column.repeat]),
                None => None,
            };
            (BinaryKind::Text, BinaryFormat::new(repeat, BinaryCode::Char), dims)
        }
        ColumnData::Bits(_) => (
            BinaryKind::Bits,
            BinaryFormat::new(column.repeat, BinaryCode::Bit),
            column.dims.clone(),
        ),
        data => {
            let t = data.element_type().ok_or_else(|| {
                Error::UnsupportedDataType(format!("column {}", column.name))
            })?;
            (
                BinaryKind::Element(t),
                BinaryFormat::new(column.repeat, code_for(t)),
                column.dims.clone(),
            )
        }
    };
    if let Some(d) = &dims {
        let product: usize = d.iter().product();
        if product != format.repeat {
            return Err(Error::ShapeMismatch {
                keyword: format!("TDIM of {}", column.name),
                header: product,
                actual: format.repeat,
            });
        }
    }
    Ok(BinaryField {
        name: column.name.clone(),
        format,
        kind,
        offset,
        dims,
        unit: column.unit.clone(),
    })
}

// ── Encoding ──

/// Lay out `table` and encode all of its rows.
pub fn encode_table(table: &TableData) -> Result<(BinaryLayout, Vec<u8>)> {
    let layout = BinaryLayout::from_columns(&table.columns)?;
    let mut bytes = Vec::with_capacity(layout.row_len * table.nrows());
    for row in 0..table.nrows() {
        layout.encode_row(table, row, &mut bytes)?;
    }
    debug!(
        "encoded binary table: {} rows of {} bytes",
        table.nrows(),
        layout.row_len
    );
    Ok((layout, bytes))
}

/// Pack bits most significant first, zero-filling the last byte.
pub fn pack_bits(bits: &[bool]) -> Vec<u8> {
    bits.chunks(8)
        .map(|chunk| {
            chunk
                .iter()
                .enumerate()
                .fold(0u8, |byte, (i, &b)| byte | (u8::from(b) << (7 - i)))
        })
        .collect()
}

/// Unpack the first `nbits` bits of `bytes`.
pub fn unpack_bits(bytes: &[u8], nbits: usize) -> Vec<bool> {
    (0..nbits)
        .map(|i| bytes[i / 8] & (0x80 >> (i % 8)) != 0)
        .collect()
}

// ── Decoding ──

/// Decode the rows of a binary table HDU.
pub fn decode_table(header: &Header, data: &[u8]) -> Result<TableData> {
    let layout = BinaryLayout::from_header(header)?;
    let nrows = header.require_usize("NAXIS2")?;
    let expected = layout.row_len * nrows;
    if data.len() < expected {
        return Err(Error::TruncatedData {
            expected,
            available: data.len(),
        });
    }
    let rows = (0..nrows)
        .map(|r| layout.decode_row(&data[r * layout.row_len..(r + 1) * layout.row_len]))
        .collect::<Result<Vec<_>>>()?;
    TableData::from_rows(layout.empty_columns(), rows)
}

fn read_field(header: &Header, n: usize, offset: usize) -> Result<BinaryField> {
    let name = header
        .string_value(&format!("TTYPE{n}"))
        .map(|s| s.trim_end().to_string())
        .unwrap_or_else(|| format!("COL{n}"));

    let tform_key = format!("TFORM{n}");
    let tform_text = header
        .string_value(&tform_key)
        .ok_or(Error::MissingKeyword(tform_key))?;
    let format = BinaryFormat::parse(&tform_text).map_err(|reason| Error::InvalidFormat {
        descriptor: tform_text.clone(),
        reason,
    })?;

    let tzero_key = format!("TZERO{n}");
    let tzero = match header.value(&tzero_key) {
        None => 0,
        Some(v) => v
            .as_integer()
            .or_else(|| v.as_float().filter(|f| f.fract() == 0.0).map(|f| f as i128))
            .unwrap_or_else(|| {
                warn!("ignoring non-integral {tzero_key} = {v}");
                0
            }),
    };
    if let Some(tscal) = header.float(&format!("TSCAL{n}")) {
        if tscal != 1.0 {
            warn!("TSCAL{n} = {tscal} is not applied");
        }
    }
    let kind = kind_for(format.code, tzero)?;

    let dims = match header.value(&format!("TDIM{n}")) {
        None => None,
        Some(Value::Dims(d)) if d.iter().product::<usize>() == format.repeat => {
            Some(d.clone())
        }
        Some(other) => {
            warn!("ignoring TDIM{n} = {other}");
            None
        }
    };

    Ok(BinaryField {
        name,
        format,
        kind,
        offset,
        dims,
        unit: header.string_value(&format!("TUNIT{n}")),
    })
}

fn decode_field(field: &BinaryField, raw: &[u8]) -> Result<Cell> {
    let repeat = field.format.repeat;
    match field.kind {
        BinaryKind::Bits => Ok(Cell::Bits(unpack_bits(raw, repeat))),
        BinaryKind::Text => {
            let width = field.char_width();
            let k = field.strings_per_row();
            let mut strings = (0..k)
                .map(|i| decode_text(field, &raw[i * width..(i + 1) * width]).map(Cell::Str))
                .collect::<Result<Vec<_>>>()?;
            if k == 1 && field.dims.is_none() {
                Ok(strings.remove(0))
            } else {
                Ok(Cell::Array(strings))
            }
        }
        BinaryKind::Element(t) => {
            let mut cells = element_cells(t, raw, repeat)?;
            if repeat == 1 {
                Ok(cells.remove(0))
            } else {
                Ok(Cell::Array(cells))
            }
        }
    }
}

/// Bytes up to the first NUL, without trailing blanks. Anything but ASCII
/// is refused.
fn decode_text(field: &BinaryField, raw: &[u8]) -> Result<String> {
    let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
    let text = core::str::from_utf8(&raw[..end])
        .ok()
        .filter(|t| t.is_ascii())
        .ok_or_else(|| {
            Error::UnsupportedDataType(format!("non-ASCII text in column {}", field.name))
        })?;
    Ok(text.trim_end().to_string())
}

fn element_cells(t: ElementType, raw: &[u8], count: usize) -> Result<Vec<Cell>> {
    fn cells<T: Element>(raw: &[u8], count: usize, f: impl Fn(T) -> Cell) -> Result<Vec<Cell>> {
        Ok(decode_values::<T>(raw, count)?.into_iter().map(f).collect())
    }
    match t {
        ElementType::Bool => cells::<bool>(raw, count, Cell::Bool),
        ElementType::U8 => cells::<u8>(raw, count, |v| Cell::Int(v.into())),
        ElementType::I8 => cells::<i8>(raw, count, |v| Cell::Int(v.into())),
        ElementType::I16 => cells::<i16>(raw, count, |v| Cell::Int(v.into())),
        ElementType::U16 => cells::<u16>(raw, count, |v| Cell::Int(v.into())),
        ElementType::I32 => cells::<i32>(raw, count, |v| Cell::Int(v.into())),
        ElementType::U32 => cells::<u32>(raw, count, |v| Cell::Int(v.into())),
        ElementType::I64 => cells::<i64>(raw, count, |v| Cell::Int(v.into())),
        ElementType::U64 => cells::<u64>(raw, count, |v| Cell::Int(v.into())),
        ElementType::F32 => cells::<f32>(raw, count, |v| Cell::Float(v.into())),
        ElementType::F64 => cells::<f64>(raw, count, Cell::Float),
        ElementType::C32 => cells::<(f32, f32)>(raw, count, |(re, im)| {
            Cell::Complex(re.into(), im.into())
        }),
        ElementType::C64 => cells::<(f64, f64)>(raw, count, |(re, im)| Cell::Complex(re, im)),
    }
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;
    use crate::card::format_card;

    fn header_for(layout: &BinaryLayout, nrows: usize) -> Header {
        let mut cards = Vec::new();
        for (k, v) in [
            ("XTENSION", Value::String("BINTABLE".into())),
            ("BITPIX", Value::Integer(8)),
            ("NAXIS", Value::Integer(2)),
            ("NAXIS1", Value::Integer(layout.row_len as i128)),
            ("NAXIS2", Value::Integer(nrows as i128)),
            ("PCOUNT", Value::Integer(0)),
            ("GCOUNT", Value::Integer(1)),
            ("TFIELDS", Value::Integer(layout.fields.len() as i128)),
        ] {
            cards.extend(format_card(k, &v, "").unwrap());
        }
        cards.extend(layout.cards().unwrap());
        Header::from_cards(cards).unwrap()
    }

    fn roundtrip(table: &TableData) -> TableData {
        let (layout, bytes) = encode_table(table).unwrap();
        assert_eq!(bytes.len(), layout.row_len * table.nrows());
        decode_table(&header_for(&layout, table.nrows()), &bytes).unwrap()
    }

    // ---- Layout ----

    #[test]
    fn tforms_and_offsets() {
        let table = TableData::new(vec![
            Column::new("L", vec![true]),
            Column::new("B", vec![-5i8]),
            Column::new("U", vec![7u32]),
            Column::with_repeat("V", vec![1.0f64, 2.0, 3.0], 3),
            Column::new("S", vec!["hello"]),
            Column::bits("X", vec![true; 10], 10),
        ])
        .unwrap();
        let layout = BinaryLayout::from_columns(&table.columns).unwrap();
        let tforms: Vec<String> = layout.fields.iter().map(|f| f.format.to_string()).collect();
        assert_eq!(tforms, ["1L", "1B", "1J", "3D", "5A", "10X"]);
        let offsets: Vec<usize> = layout.fields.iter().map(|f| f.offset).collect();
        assert_eq!(offsets, [0, 1, 2, 6, 30, 35]);
        assert_eq!(layout.row_len, 37);

        let header = header_for(&layout, 1);
        assert_eq!(header.integer("TZERO2"), Some(-128));
        assert_eq!(header.integer("TZERO3"), Some(2_147_483_648));
        assert!(!header.contains("TZERO4"));
    }

    #[test]
    fn unsigned_rows_are_offset() {
        let table = TableData::new(vec![Column::new("U", vec![0u16, 65535])]).unwrap();
        let (_, bytes) = encode_table(&table).unwrap();
        assert_eq!(bytes, vec![0x80, 0x00, 0x7F, 0xFF]);
    }

    #[test]
    fn bit_packing() {
        let bits = [true, false, true, false, false, false, false, false, true, true];
        let packed = pack_bits(&bits);
        assert_eq!(packed, vec![0b1010_0000, 0b1100_0000]);
        assert_eq!(unpack_bits(&packed, 10), bits);
    }

    // ---- Round trips ----

    #[test]
    fn all_element_types() {
        let table = TableData::new(vec![
            Column::new("L", vec![true, false]),
            Column::new("U8", vec![0u8, 255]),
            Column::new("I8", vec![i8::MIN, i8::MAX]),
            Column::new("I16", vec![i16::MIN, 3]),
            Column::new("U16", vec![0u16, u16::MAX]),
            Column::new("I32", vec![-1i32, i32::MAX]),
            Column::new("U32", vec![0u32, u32::MAX]),
            Column::new("I64", vec![i64::MIN, 0]),
            Column::new("U64", vec![0u64, u64::MAX]),
            Column::new("F32", vec![1.5f32, f32::MIN_POSITIVE]),
            Column::new("F64", vec![-0.1f64, 1e300]),
            Column::new("C32", vec![(1.0f32, -1.0f32), (0.5, 0.25)]),
            Column::new("C64", vec![(1.0f64, 2.0f64), (3.0, 4.0)]),
        ])
        .unwrap();
        let back = roundtrip(&table);
        assert_eq!(back.nrows(), 2);
        for (a, b) in table.columns.iter().zip(&back.columns) {
            assert_eq!(a.name, b.name);
            assert_eq!(a.data, b.data, "column {}", a.name);
        }
    }

    #[test]
    fn repeat_columns_are_flat() {
        let table = TableData::new(vec![
            Column::with_repeat("V", vec![1i16, 2, 3, 4, 5, 6], 3).with_dims(vec![3]),
            Column::bits("X", vec![true, false, true, false, true, true], 3),
        ])
        .unwrap();
        let back = roundtrip(&table);
        assert_eq!(back.columns[0].repeat, 3);
        assert_eq!(back.columns[0].dims, Some(vec![3]));
        assert_eq!(back.columns[0].data, ColumnData::I16(vec![1, 2, 3, 4, 5, 6]));
        assert_eq!(back.columns[1].data, table.columns[1].data);
    }

    #[test]
    fn string_arrays_use_tdim() {
        let table = TableData::new(vec![
            Column::with_repeat("S", vec!["ab", "c", "def", "g"], 2),
            Column::new("C", vec!["x", "y"]).with_unit("deg"),
        ])
        .unwrap();
        let (layout, _) = encode_table(&table).unwrap();
        assert_eq!(layout.fields[0].format.to_string(), "6A");
        assert_eq!(layout.fields[0].dims, Some(vec![3, 2]));

        let back = roundtrip(&table);
        assert_eq!(back.columns[0].repeat, 2);
        assert_eq!(back.columns[0].data, ColumnData::from(vec!["ab", "c", "def", "g"]));
        assert_eq!(back.columns[1].data, ColumnData::from(vec!["x", "y"]));
        assert_eq!(back.columns[1].unit.as_deref(), Some("deg"));
    }

    #[test]
    fn strings_stop_at_nul() {
        let field = BinaryField {
            name: "S".into(),
            format: BinaryFormat::new(5, BinaryCode::Char),
            kind: BinaryKind::Text,
            offset: 0,
            dims: None,
            unit: None,
        };
        assert_eq!(decode_text(&field, b"ab\0zz").unwrap(), "ab");
        assert_eq!(decode_text(&field, b"ab   ").unwrap(), "ab");
        assert!(matches!(
            decode_text(&field, b"a\xe9   "),
            Err(Error::UnsupportedDataType(_))
        ));
    }

    // ---- Errors ----

    #[test]
    fn array_descriptors_not_implemented() {
        let mut layout = BinaryLayout::from_columns(&[Column::new("A", vec![1i32])]).unwrap();
        layout.fields[0].format = BinaryFormat::parse("1PE(10)").unwrap();
        layout.row_len = 8;
        let header = header_for(&layout, 0);
        assert!(matches!(
            BinaryLayout::from_header(&header),
            Err(Error::NotImplemented(_))
        ));
    }

    #[test]
    fn fields_past_row_end() {
        let mut layout = BinaryLayout::from_columns(&[Column::new("A", vec![1i64])]).unwrap();
        layout.row_len = 4;
        let header = header_for(&layout, 0);
        assert!(matches!(
            BinaryLayout::from_header(&header),
            Err(Error::InvalidHeader(_))
        ));
    }

    #[test]
    fn string_wider_than_declared() {
        let c = Column::new("S", vec!["toolong"]).with_width(3);
        assert!(matches!(
            BinaryLayout::from_columns(&[c]),
            Err(Error::UnsupportedDataType(_))
        ));
    }

    #[test]
    fn tdim_must_match_repeat() {
        let c = Column::with_repeat("V", vec![0u8; 4], 4).with_dims(vec![3]);
        assert!(matches!(
            BinaryLayout::from_columns(&[c]),
            Err(Error::ShapeMismatch { header: 3, actual: 4, .. })
        ));
    }

    #[test]
    fn string_tdim_must_lead_with_width() {
        let c = Column::with_repeat("S", vec!["abc", "def", "ghi", "jkl"], 2)
            .with_dims(vec![2, 3]);
        assert!(matches!(
            BinaryLayout::from_columns(&[c]),
            Err(Error::ShapeMismatch { header: 2, actual: 3, .. })
        ));

        let c = Column::with_repeat("S", vec!["abc", "def", "ghi", "jkl"], 2)
            .with_dims(vec![3, 2]);
        assert_eq!(
            BinaryLayout::from_columns(&[c]).unwrap().fields[0].dims,
            Some(vec![3, 2])
        );
    }

    #[test]
    fn short_column_is_an_error() {
        let table = TableData::new(vec![Column::new("A", vec![1i32, 2])]).unwrap();
        let layout = BinaryLayout::from_columns(&table.columns).unwrap();
        let mut out = Vec::new();
        assert!(matches!(
            layout.encode_row(&table, 2, &mut out),
            Err(Error::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn mismatched_tdim_is_ignored_on_read() {
        let table = TableData::new(vec![Column::with_repeat("S", vec!["ab", "cd"], 2)]).unwrap();
        let (mut layout, bytes) = encode_table(&table).unwrap();
        layout.fields[0].dims = Some(vec![3, 3]);
        let back = decode_table(&header_for(&layout, 1), &bytes).unwrap();
        assert_eq!(back.columns[0].data, ColumnData::from(vec!["abcd"]));
    }

    #[test]
    fn truncated_rows() {
        let table = TableData::new(vec![Column::new("A", vec![1i32, 2])]).unwrap();
        let (layout, bytes) = encode_table(&table).unwrap();
        let err = decode_table(&header_for(&layout, 2), &bytes[..5]).unwrap_err();
        assert!(matches!(err, Error::TruncatedData { expected: 8, available: 5 }));
    }
}
