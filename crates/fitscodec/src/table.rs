//! ASCII table extensions (`XTENSION = 'TABLE'`).
//!
//! Every field is rendered as text at a fixed byte offset (`TBCOLn`) with a
//! FORTRAN descriptor (`TFORMn`). Writers size each field to the smallest
//! width holding every value of the column and leave one blank between
//! adjacent fields.

use log::{debug, warn};

use crate::card::{push_card, Card};
use crate::column::{Cell, Column, ColumnData, TableData};
use crate::data::ElementType;
use crate::error::{Error, Result};
use crate::format::{DisplayFormat, DisplayKind, FormatError};
use crate::header::Header;
use crate::value::Value;

/// Blank bytes between adjacent fields.
pub const FIELD_GAP: usize = 1;

// ── Field Layout ──

/// How the text of a field is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AsciiKind {
    /// `A1` with a `TDISPn = 'L1'` hint, holding `T` or `F`.
    Logical,
    Integer,
    /// `Ew.d`: single precision.
    Float,
    /// `Dw.d` or `Fw.d`: double precision.
    Double,
    Text,
}

impl AsciiKind {
    fn empty_data(self) -> ColumnData {
        match self {
            AsciiKind::Logical => ColumnData::empty(ElementType::Bool),
            AsciiKind::Integer => ColumnData::empty(ElementType::I64),
            AsciiKind::Float => ColumnData::empty(ElementType::F32),
            AsciiKind::Double => ColumnData::empty(ElementType::F64),
            AsciiKind::Text => ColumnData::Str(Vec::new()),
        }
    }
}

/// One field of an ASCII table row.
#[derive(Debug, Clone, PartialEq)]
pub struct AsciiField {
    pub name: String,
    pub kind: AsciiKind,
    /// 0-based byte offset (`TBCOLn - 1`).
    pub start: usize,
    pub tform: DisplayFormat,
    pub tdisp: Option<DisplayFormat>,
    pub unit: Option<String>,
}

impl AsciiField {
    pub fn width(&self) -> usize {
        self.tform.width
    }

    fn stop(&self) -> usize {
        self.start + self.tform.width
    }

    fn format_error(&self, reason: FormatError) -> Error {
        Error::InvalidFormat {
            descriptor: self.tform.to_string(),
            reason,
        }
    }
}

/// Byte layout of an ASCII table row.
#[derive(Debug, Clone, PartialEq)]
pub struct AsciiLayout {
    pub fields: Vec<AsciiField>,
    /// `NAXIS1`.
    pub row_len: usize,
}

impl AsciiLayout {
    /// Size every field to the values in `columns`.
    pub fn from_columns(columns: &[Column]) -> Result<Self> {
        let mut fields = Vec::with_capacity(columns.len());
        let mut start = 0;
        for column in columns {
            if column.repeat != 1 {
                return Err(Error::UnsupportedDataType(format!(
                    "ASCII table column {} with {} elements per row",
                    column.name, column.repeat
                )));
            }
            let (kind, tform, tdisp) = size_field(column)?;
            fields.push(AsciiField {
                name: column.name.clone(),
                kind,
                start,
                tform,
                tdisp,
                unit: column.unit.clone(),
            });
            start += tform.width + FIELD_GAP;
        }
        let row_len = fields.last().map_or(0, AsciiField::stop);
        Ok(Self { fields, row_len })
    }

    /// Read the field layout from `TFIELDS`, `TBCOLn`, `TFORMn` and friends.
    pub fn from_header(header: &Header) -> Result<Self> {
        let row_len = header.require_usize("NAXIS1")?;
        let tfields = header.require_usize("TFIELDS")?;
        let mut fields = Vec::with_capacity(tfields);
        for n in 1..=tfields {
            let field = read_field(header, n)?;
            if field.stop() > row_len {
                return Err(Error::InvalidHeader("ASCII table field extends past NAXIS1"));
            }
            fields.push(field);
        }
        Ok(Self { fields, row_len })
    }

    /// `TTYPEn`, `TBCOLn`, `TFORMn`, `TDISPn` and `TUNITn` cards.
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
                &format!("TBCOL{n}"),
                Value::Integer(field.start as i128 + 1),
                "beginning column of field",
            )?;
            push_card(
                &mut cards,
                &format!("TFORM{n}"),
                Value::String(field.tform.to_string()),
                "Fortran-77 format of field",
            )?;
            if let Some(tdisp) = field.tdisp {
                push_card(
                    &mut cards,
                    &format!("TDISP{n}"),
                    Value::String(tdisp.to_string()),
                    "display format of field",
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

    /// Render row `row` of `table` into exactly `row_len` bytes.
    pub fn encode_row(&self, table: &TableData, row: usize, out: &mut Vec<u8>) -> Result<()> {
        let mut record = vec![b' '; self.row_len];
        for (field, column) in self.fields.iter().zip(&table.columns) {
            let cell = column.data.cell(row).ok_or_else(|| Error::ShapeMismatch {
                keyword: "NAXIS2".to_string(),
                header: table.nrows(),
                actual: column.data.len(),
            })?;
            let text = render_field(field, cell)?;
            record[field.start..field.stop()].copy_from_slice(text.as_bytes());
        }
        out.extend_from_slice(&record);
        Ok(())
    }

    /// Parse one row into cells.
    pub fn decode_row(&self, record: &[u8]) -> Result<Vec<Cell>> {
        self.fields
            .iter()
            .map(|field| {
                let text = core::str::from_utf8(&record[field.start..field.stop()])
                    .ok()
                    .filter(|t| t.is_ascii())
                    .ok_or_else(|| {
                        Error::UnsupportedDataType(format!(
                            "non-ASCII text in column {}",
                            field.name
                        ))
                    })?;
                parse_field(field, text)
            })
            .collect()
    }

    /// Columns to collect `rows` into. An integer field holding a value
    /// above `i64::MAX` is read as `u64`.
    fn empty_columns(&self, rows: &[Vec<Cell>]) -> Result<Vec<Column>> {
        self.fields
            .iter()
            .enumerate()
            .map(|(i, field)| {
                let mut data = field.kind.empty_data();
                if field.kind == AsciiKind::Integer {
                    let ints = || {
                        rows.iter().filter_map(move |row| match row.get(i) {
                            Some(Cell::Int(n)) => Some(*n),
                            _ => None,
                        })
                    };
                    if ints().any(|n| n > i64::MAX as i128) {
                        if let Some(negative) = ints().find(|n| *n < 0) {
                            return Err(Error::UnparsableValue {
                                keyword: field.name.clone(),
                                text: negative.to_string(),
                            });
                        }
                        data = ColumnData::empty(ElementType::U64);
                    }
                }
                let mut column = Column::new(field.name.clone(), data);
                column.unit = field.unit.clone();
                if field.kind == AsciiKind::Text {
                    column.width = Some(field.width());
                }
                Ok(column)
            })
            .collect()
    }
}

// ── Encoding ──

/// Lay out `table` and render all of its rows.
pub fn encode_table(table: &TableData) -> Result<(AsciiLayout, Vec<u8>)> {
    let layout = AsciiLayout::from_columns(&table.columns)?;
    let mut bytes = Vec::with_capacity(layout.row_len * table.nrows());
    for row in 0..table.nrows() {
        layout.encode_row(table, row, &mut bytes)?;
    }
    debug!(
        "encoded ASCII table: {} rows of {} bytes",
        table.nrows(),
        layout.row_len
    );
    Ok((layout, bytes))
}

fn size_field(column: &Column) -> Result<(AsciiKind, DisplayFormat, Option<DisplayFormat>)> {
    Ok(match &column.data {
        ColumnData::Bool(_) => (
            AsciiKind::Logical,
            DisplayFormat::char(1),
            Some(DisplayFormat::logical(1)),
        ),
        ColumnData::Str(values) => {
            if let Some(bad) = values.iter().find(|s| !s.bytes().all(|b| (0x20..=0x7E).contains(&b))) {
                return Err(Error::UnsupportedDataType(format!(
                    "non-printable text {bad:?} in column {}",
                    column.name
                )));
            }
            (AsciiKind::Text, DisplayFormat::char(column.char_width()), None)
        }
        ColumnData::F32(values) => {
            let full = DisplayFormat::fit_exponential(values.iter().map(|v| format!("{v:e}")), false);
            (AsciiKind::Float, full.without_exponent(), Some(full))
        }
        ColumnData::F64(values) => {
            let full = DisplayFormat::fit_exponential(values.iter().map(|v| format!("{v:e}")), true);
            (AsciiKind::Double, full.without_exponent(), Some(full))
        }
        data if data.element_type().is_some_and(ElementType::is_integer) => {
            let ints = (0..data.len()).filter_map(|i| match data.cell(i) {
                Some(Cell::Int(n)) => Some(n),
                _ => None,
            });
            (AsciiKind::Integer, DisplayFormat::fit_integers(ints), None)
        }
        data => {
            let name = data.element_type().map_or("bits", ElementType::name);
            return Err(Error::UnsupportedDataType(format!(
                "{name} column {} in an ASCII table",
                column.name
            )));
        }
    })
}

fn render_field(field: &AsciiField, cell: Cell) -> Result<String> {
    let tform = &field.tform;
    let rendered = match (field.kind, cell) {
        (AsciiKind::Logical, Cell::Bool(b)) => tform.render_left(if b { "T" } else { "F" }),
        (AsciiKind::Integer, Cell::Int(n)) => tform.render_right(&n.to_string()),
        (AsciiKind::Float | AsciiKind::Double, Cell::Float(x)) if tform.kind == DisplayKind::Fixed => {
            let d = tform.decimals.unwrap_or(0);
            tform.render_right(&format!("{x:.d$}"))
        }
        (AsciiKind::Float, Cell::Float(x)) => {
            field.tdisp.unwrap_or(*tform).render_exponential(x as f32)
        }
        (AsciiKind::Double, Cell::Float(x)) => field.tdisp.unwrap_or(*tform).render_exponential(x),
        (AsciiKind::Text, Cell::Str(s)) => tform.render_left(&s),
        (_, cell) => {
            return Err(Error::UnsupportedDataType(format!(
                "{cell:?} in {} field {}",
                tform, field.name
            )))
        }
    };
    rendered.map_err(|reason| field.format_error(reason))
}

// ── Decoding ──

/// Decode the rows of an ASCII table HDU.
pub fn decode_table(header: &Header, data: &[u8]) -> Result<TableData> {
    let layout = AsciiLayout::from_header(header)?;
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
    TableData::from_rows(layout.empty_columns(&rows)?, rows)
}

fn read_field(header: &Header, n: usize) -> Result<AsciiField> {
    let name = header
        .string_value(&format!("TTYPE{n}"))
        .map(|s| s.trim_end().to_string())
        .unwrap_or_else(|| format!("COL{n}"));
    let tbcol = header.require_usize(&format!("TBCOL{n}"))?;
    if tbcol == 0 {
        return Err(Error::InvalidHeader("TBCOLn must be at least 1"));
    }

    let tform_key = format!("TFORM{n}");
    let tform_text = header
        .string_value(&tform_key)
        .ok_or(Error::MissingKeyword(tform_key))?;
    let tform = DisplayFormat::parse(&tform_text).map_err(|reason| Error::InvalidFormat {
        descriptor: tform_text.clone(),
        reason,
    })?;

    let tdisp_key = format!("TDISP{n}");
    let tdisp = header
        .string_value(&tdisp_key)
        .and_then(|text| match DisplayFormat::parse(&text) {
            Ok(f) => Some(f),
            Err(e) => {
                warn!("ignoring {tdisp_key} = {text:?}: {e}");
                None
            }
        });

    let kind = match tform.kind {
        DisplayKind::Char if tdisp.is_some_and(|d| d.kind == DisplayKind::Logical) => {
            AsciiKind::Logical
        }
        DisplayKind::Char => AsciiKind::Text,
        DisplayKind::Integer => AsciiKind::Integer,
        DisplayKind::Exponential => AsciiKind::Float,
        DisplayKind::Double | DisplayKind::Fixed => AsciiKind::Double,
        _ => {
            return Err(Error::UnsupportedDataType(format!(
                "ASCII table format {tform_text}"
            )))
        }
    };

    Ok(AsciiField {
        name,
        kind,
        start: tbcol - 1,
        tform,
        tdisp,
        unit: header.string_value(&format!("TUNIT{n}")),
    })
}

fn parse_field(field: &AsciiField, text: &str) -> Result<Cell> {
    let trimmed = text.trim();
    let unparsable = || Error::UnparsableValue {
        keyword: field.name.clone(),
        text: trimmed.to_string(),
    };
    Ok(match field.kind {
        AsciiKind::Text => Cell::Str(text.trim_end().to_string()),
        _ if trimmed.is_empty() => Cell::Null,
        AsciiKind::Logical => match trimmed {
            "T" => Cell::Bool(true),
            "F" => Cell::Bool(false),
            other => Cell::Str(other.to_string()),
        },
        AsciiKind::Integer => {
            let n: i128 = trimmed.parse().map_err(|_| unparsable())?;
            if !(i64::MIN as i128..=u64::MAX as i128).contains(&n) {
                return Err(unparsable());
            }
            Cell::Int(n)
        }
        AsciiKind::Float | AsciiKind::Double => {
            let normalized = trimmed.replace(['D', 'd'], "E");
            let mut x: f64 = normalized.parse().map_err(|_| unparsable())?;
            // A fixed field without a point has `d` implied decimals.
            if !normalized.contains(['.', 'E', 'e']) && x.is_finite() {
                if let Some(d) = field.tform.decimals {
                    x /= 10f64.powi(d as i32);
                }
            }
            Cell::Float(x)
        }
    })
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;
    use crate::card::format_card;

    fn sample() -> TableData {
        TableData::new(vec![
            Column::new("FLAG", vec![true, false]),
            Column::new("N", vec![7i32, -120]),
            Column::new("X", vec![1.5f64, -0.25]).with_unit("m"),
            Column::new("S", vec!["ab", "xyz"]),
        ])
        .unwrap()
    }

    fn header_for(layout: &AsciiLayout, nrows: usize) -> Header {
        let mut cards = Vec::new();
        for (k, v) in [
            ("XTENSION", Value::String("TABLE".into())),
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

    // ---- Sizing ----

    #[test]
    fn fields_are_sized_to_values() {
        let layout = AsciiLayout::from_columns(&sample().columns).unwrap();
        let tforms: Vec<String> = layout.fields.iter().map(|f| f.tform.to_string()).collect();
        assert_eq!(tforms, ["A1", "I4", "D8.1", "A3"]);
        let starts: Vec<usize> = layout.fields.iter().map(|f| f.start).collect();
        assert_eq!(starts, [0, 2, 7, 16]);
        assert_eq!(layout.row_len, 19);
        assert_eq!(layout.fields[0].tdisp.unwrap().to_string(), "L1");
        assert_eq!(layout.fields[2].tdisp.unwrap().to_string(), "D8.1E2");
    }

    #[test]
    fn single_precision_uses_e() {
        let columns = vec![Column::new("F", vec![0.1f32, 3.0e10])];
        let layout = AsciiLayout::from_columns(&columns).unwrap();
        assert_eq!(layout.fields[0].tform.to_string(), "E8.1");
        assert_eq!(layout.fields[0].tdisp.unwrap().to_string(), "E8.1E2");
    }

    #[test]
    fn rejects_repeat_and_complex() {
        let c = Column::with_repeat("V", vec![1i32, 2], 2);
        assert!(matches!(
            AsciiLayout::from_columns(&[c]),
            Err(Error::UnsupportedDataType(_))
        ));
        let c = Column::new("Z", vec![(1.0f32, 2.0f32)]);
        assert!(matches!(
            AsciiLayout::from_columns(&[c]),
            Err(Error::UnsupportedDataType(_))
        ));
    }

    // ---- Rows ----

    #[test]
    fn rows_render_at_tbcol() {
        let (layout, bytes) = encode_table(&sample()).unwrap();
        assert_eq!(bytes.len(), 2 * layout.row_len);
        assert_eq!(&bytes[..19], b"T    7  1.5D+00 ab ");
        assert_eq!(&bytes[19..], b"F -120 -2.5D-01 xyz");
    }

    #[test]
    fn decode_reads_back_values() {
        let table = sample();
        let (layout, bytes) = encode_table(&table).unwrap();
        let header = header_for(&layout, table.nrows());
        let back = decode_table(&header, &bytes).unwrap();
        assert_eq!(back.nrows(), 2);
        assert_eq!(back.columns[0].data, ColumnData::Bool(vec![true, false]));
        assert_eq!(back.columns[1].data, ColumnData::I64(vec![7, -120]));
        assert_eq!(back.columns[2].data, ColumnData::F64(vec![1.5, -0.25]));
        assert_eq!(back.columns[2].unit.as_deref(), Some("m"));
        assert_eq!(back.columns[3].data, ColumnData::from(vec!["ab", "xyz"]));
        assert_eq!(back.columns[3].name, "S");
    }

    #[test]
    fn decode_accepts_d_exponent_and_implied_decimals() {
        let field = AsciiField {
            name: "X".into(),
            kind: AsciiKind::Double,
            start: 0,
            tform: DisplayFormat::parse("F6.2").unwrap(),
            tdisp: None,
            unit: None,
        };
        assert_eq!(parse_field(&field, "1.0D02").unwrap(), Cell::Float(100.0));
        assert_eq!(parse_field(&field, "  1234").unwrap(), Cell::Float(12.34));
        assert_eq!(parse_field(&field, "      ").unwrap(), Cell::Null);
        assert!(parse_field(&field, "abc").is_err());
    }

    #[test]
    fn inconsistent_logical_row() {
        let table = sample();
        let (layout, mut bytes) = encode_table(&table).unwrap();
        bytes[19] = b'X';
        let header = header_for(&layout, table.nrows());
        let err = decode_table(&header, &bytes).unwrap_err();
        assert!(matches!(err, Error::InconsistentRowType { row: 2, column: 1 }));
    }

    #[test]
    fn truncated_rows() {
        let table = sample();
        let (layout, bytes) = encode_table(&table).unwrap();
        let header = header_for(&layout, table.nrows());
        let err = decode_table(&header, &bytes[..20]).unwrap_err();
        assert!(matches!(err, Error::TruncatedData { expected: 38, available: 20 }));
    }

    #[test]
    fn field_past_row_end() {
        let table = sample();
        let (mut layout, _) = encode_table(&table).unwrap();
        layout.row_len = 10;
        let header = header_for(&layout, 0);
        assert!(matches!(
            AsciiLayout::from_header(&header),
            Err(Error::InvalidHeader(_))
        ));
    }

    #[test]
    fn bad_tdisp_is_ignored() {
        let table = TableData::new(vec![Column::new("N", vec![1i16])]).unwrap();
        let (layout, bytes) = encode_table(&table).unwrap();
        let mut header = header_for(&layout, 1);
        header
            .add_key("TDISP1", Value::String("Q9".into()), "")
            .unwrap();
        let back = decode_table(&header, &bytes).unwrap();
        assert_eq!(back.columns[0].data, ColumnData::I64(vec![1]));
    }

    #[test]
    fn full_range_unsigned_reads_as_u64() {
        let table = TableData::new(vec![Column::new("BIG", vec![u64::MAX, 1])]).unwrap();
        let (layout, bytes) = encode_table(&table).unwrap();
        let back = decode_table(&header_for(&layout, 2), &bytes).unwrap();
        assert_eq!(back.columns[0].data, ColumnData::U64(vec![u64::MAX, 1]));

        let table = TableData::new(vec![Column::new("SMALL", vec![5u64, 1])]).unwrap();
        let (layout, bytes) = encode_table(&table).unwrap();
        let back = decode_table(&header_for(&layout, 2), &bytes).unwrap();
        assert_eq!(back.columns[0].data, ColumnData::I64(vec![5, 1]));
    }

    #[test]
    fn integers_out_of_range() {
        let field = AsciiField {
            name: "N".into(),
            kind: AsciiKind::Integer,
            start: 0,
            tform: DisplayFormat::parse("I21").unwrap(),
            tdisp: None,
            unit: None,
        };
        assert_eq!(
            parse_field(&field, "18446744073709551615").unwrap(),
            Cell::Int(u64::MAX as i128)
        );
        assert!(matches!(
            parse_field(&field, "18446744073709551616"),
            Err(Error::UnparsableValue { .. })
        ));
        assert!(matches!(
            parse_field(&field, "-9223372036854775809"),
            Err(Error::UnparsableValue { .. })
        ));
    }

    #[test]
    fn unsigned_and_negative_do_not_mix() {
        let table = TableData::new(vec![Column::new("BIG", vec![u64::MAX, 1])]).unwrap();
        let (layout, mut bytes) = encode_table(&table).unwrap();
        let row = layout.row_len;
        bytes[row..2 * row].copy_from_slice(format!("{:>w$}", -1, w = row).as_bytes());
        let err = decode_table(&header_for(&layout, 2), &bytes).unwrap_err();
        assert!(matches!(err, Error::UnparsableValue { .. }));
    }

    #[test]
    fn non_ascii_text_is_refused() {
        let table = sample();
        let (layout, mut bytes) = encode_table(&table).unwrap();
        bytes[16] = 0xE9;
        let header = header_for(&layout, table.nrows());
        assert!(matches!(
            decode_table(&header, &bytes),
            Err(Error::UnsupportedDataType(_))
        ));
    }

    #[test]
    fn empty_table() {
        let table = TableData::new(vec![Column::new("N", Vec::<i32>::new())]).unwrap();
        let (layout, bytes) = encode_table(&table).unwrap();
        assert!(bytes.is_empty());
        assert_eq!(layout.row_len, 1);
    }
}
