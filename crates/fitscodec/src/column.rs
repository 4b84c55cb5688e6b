//! Typed table columns shared by the ASCII and binary row codecs.
//!
//! Column payloads are flat: a column with repeat count `r` stores `r`
//! consecutive elements per row. Decoders go through [`Cell`]s, one per
//! field and row, so that every row can be checked against the first.

use crate::data::{encode_values, Element, ElementType};
use crate::error::{Error, Result};

/// Flat column payload.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnData {
    Bool(Vec<bool>),
    U8(Vec<u8>),
    I8(Vec<i8>),
    I16(Vec<i16>),
    U16(Vec<u16>),
    I32(Vec<i32>),
    U32(Vec<u32>),
    I64(Vec<i64>),
    U64(Vec<u64>),
    F32(Vec<f32>),
    F64(Vec<f64>),
    C32(Vec<(f32, f32)>),
    C64(Vec<(f64, f64)>),
    /// Character fields.
    Str(Vec<String>),
    /// Packed bit fields (`X`).
    Bits(Vec<bool>),
}

/// Dispatch `$body` over every numeric variant with `$v` bound to the vector.
macro_rules! with_values {
    ($data:expr, $v:ident => $body:expr, str $s:ident => $str_body:expr, bits $b:ident => $bits_body:expr) => {
        match $data {
            ColumnData::Bool($v) => $body,
            ColumnData::U8($v) => $body,
            ColumnData::I8($v) => $body,
            ColumnData::I16($v) => $body,
            ColumnData::U16($v) => $body,
            ColumnData::I32($v) => $body,
            ColumnData::U32($v) => $body,
            ColumnData::I64($v) => $body,
            ColumnData::U64($v) => $body,
            ColumnData::F32($v) => $body,
            ColumnData::F64($v) => $body,
            ColumnData::C32($v) => $body,
            ColumnData::C64($v) => $body,
            ColumnData::Str($s) => $str_body,
            ColumnData::Bits($b) => $bits_body,
        }
    };
}

impl ColumnData {
    /// An empty payload of the given element type.
    pub fn empty(element_type: ElementType) -> Self {
        match element_type {
            ElementType::Bool => ColumnData::Bool(Vec::new()),
            ElementType::U8 => ColumnData::U8(Vec::new()),
            ElementType::I8 => ColumnData::I8(Vec::new()),
            ElementType::I16 => ColumnData::I16(Vec::new()),
            ElementType::U16 => ColumnData::U16(Vec::new()),
            ElementType::I32 => ColumnData::I32(Vec::new()),
            ElementType::U32 => ColumnData::U32(Vec::new()),
            ElementType::I64 => ColumnData::I64(Vec::new()),
            ElementType::U64 => ColumnData::U64(Vec::new()),
            ElementType::F32 => ColumnData::F32(Vec::new()),
            ElementType::F64 => ColumnData::F64(Vec::new()),
            ElementType::C32 => ColumnData::C32(Vec::new()),
            ElementType::C64 => ColumnData::C64(Vec::new()),
        }
    }

    /// Numeric or logical element type; `None` for strings and bits.
    pub fn element_type(&self) -> Option<ElementType> {
        Some(match self {
            ColumnData::Bool(_) => ElementType::Bool,
            ColumnData::U8(_) => ElementType::U8,
            ColumnData::I8(_) => ElementType::I8,
            ColumnData::I16(_) => ElementType::I16,
            ColumnData::U16(_) => ElementType::U16,
            ColumnData::I32(_) => ElementType::I32,
            ColumnData::U32(_) => ElementType::U32,
            ColumnData::I64(_) => ElementType::I64,
            ColumnData::U64(_) => ElementType::U64,
            ColumnData::F32(_) => ElementType::F32,
            ColumnData::F64(_) => ElementType::F64,
            ColumnData::C32(_) => ElementType::C32,
            ColumnData::C64(_) => ElementType::C64,
            ColumnData::Str(_) | ColumnData::Bits(_) => return None,
        })
    }

    /// Number of flat elements.
    pub fn len(&self) -> usize {
        with_values!(self, v => v.len(), str s => s.len(), bits b => b.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Flat element `i` as a cell.
    pub fn cell(&self, i: usize) -> Option<Cell> {
        Some(match self {
            ColumnData::Bool(v) => Cell::Bool(*v.get(i)?),
            ColumnData::U8(v) => Cell::Int((*v.get(i)?).into()),
            ColumnData::I8(v) => Cell::Int((*v.get(i)?).into()),
            ColumnData::I16(v) => Cell::Int((*v.get(i)?).into()),
            ColumnData::U16(v) => Cell::Int((*v.get(i)?).into()),
            ColumnData::I32(v) => Cell::Int((*v.get(i)?).into()),
            ColumnData::U32(v) => Cell::Int((*v.get(i)?).into()),
            ColumnData::I64(v) => Cell::Int((*v.get(i)?).into()),
            ColumnData::U64(v) => Cell::Int((*v.get(i)?).into()),
            ColumnData::F32(v) => Cell::Float((*v.get(i)?).into()),
            ColumnData::F64(v) => Cell::Float(*v.get(i)?),
            ColumnData::C32(v) => {
                let (re, im) = *v.get(i)?;
                Cell::Complex(re.into(), im.into())
            }
            ColumnData::C64(v) => {
                let (re, im) = *v.get(i)?;
                Cell::Complex(re, im)
            }
            ColumnData::Str(v) => Cell::Str(v.get(i)?.clone()),
            ColumnData::Bits(v) => Cell::Bits(vec![*v.get(i)?]),
        })
    }

    /// Big-endian wire bytes of flat elements `start..stop`.
    ///
    /// Strings and bits have their own packing and are not handled here.
    pub fn encode_range(&self, start: usize, stop: usize, out: &mut Vec<u8>) {
        fn put<T: Element>(values: &[T], out: &mut Vec<u8>) {
            out.extend_from_slice(&encode_values(values));
        }
        with_values!(self, v => put(&v[start..stop], out), str _s => {}, bits _b => {})
    }

    /// Append one decoded cell, flattening arrays. Returns `false` if the
    /// cell does not fit this payload's type.
    pub fn push_cell(&mut self, cell: Cell) -> bool {
        match (self, cell) {
            (data, Cell::Array(items)) => items.into_iter().all(|c| data.push_cell(c)),
            (ColumnData::Bool(v), Cell::Bool(b)) => push(v, b),
            (ColumnData::U8(v), Cell::Int(n)) => push_int(v, n),
            (ColumnData::I8(v), Cell::Int(n)) => push_int(v, n),
            (ColumnData::I16(v), Cell::Int(n)) => push_int(v, n),
            (ColumnData::U16(v), Cell::Int(n)) => push_int(v, n),
            (ColumnData::I32(v), Cell::Int(n)) => push_int(v, n),
            (ColumnData::U32(v), Cell::Int(n)) => push_int(v, n),
            (ColumnData::I64(v), Cell::Int(n)) => push_int(v, n),
            (ColumnData::U64(v), Cell::Int(n)) => push_int(v, n),
            (ColumnData::F32(v), Cell::Float(f)) => push(v, f as f32),
            (ColumnData::F64(v), Cell::Float(f)) => push(v, f),
            (ColumnData::C32(v), Cell::Complex(re, im)) => push(v, (re as f32, im as f32)),
            (ColumnData::C64(v), Cell::Complex(re, im)) => push(v, (re, im)),
            (ColumnData::Str(v), Cell::Str(s)) => push(v, s),
            (ColumnData::Bits(v), Cell::Bits(bits)) => {
                v.extend(bits);
                true
            }
            _ => false,
        }
    }
}

fn push<T>(v: &mut Vec<T>, item: T) -> bool {
    v.push(item);
    true
}

fn push_int<T: TryFrom<i128>>(v: &mut Vec<T>, n: i128) -> bool {
    match T::try_from(n) {
        Ok(x) => push(v, x),
        Err(_) => false,
    }
}

macro_rules! column_from {
    ($t:ty, $variant:ident) => {
        impl From<Vec<$t>> for ColumnData {
            fn from(v: Vec<$t>) -> Self {
                ColumnData::$variant(v)
            }
        }
    };
}

column_from!(bool, Bool);
column_from!(u8, U8);
column_from!(i8, I8);
column_from!(i16, I16);
column_from!(u16, U16);
column_from!(i32, I32);
column_from!(u32, U32);
column_from!(i64, I64);
column_from!(u64, U64);
column_from!(f32, F32);
column_from!(f64, F64);
column_from!((f32, f32), C32);
column_from!((f64, f64), C64);
column_from!(String, Str);

impl From<Vec<&str>> for ColumnData {
    fn from(v: Vec<&str>) -> Self {
        ColumnData::Str(v.into_iter().map(String::from).collect())
    }
}

/// One decoded field of one row.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Bool(bool),
    Int(i128),
    Float(f64),
    Complex(f64, f64),
    Str(String),
    Bits(Vec<bool>),
    /// A field with a repeat count other than 1.
    Array(Vec<Cell>),
    /// A blank ASCII field.
    Null,
}

/// Shape of a cell, used for the row type check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CellKind {
    Bool,
    Int,
    Float,
    Complex,
    Str,
    Bits(usize),
    Array(Vec<CellKind>),
    Null,
}

impl Cell {
    pub fn kind(&self) -> CellKind {
        match self {
            Cell::Bool(_) => CellKind::Bool,
            Cell::Int(_) => CellKind::Int,
            Cell::Float(_) => CellKind::Float,
            Cell::Complex(..) => CellKind::Complex,
            Cell::Str(_) => CellKind::Str,
            Cell::Bits(b) => CellKind::Bits(b.len()),
            Cell::Array(items) => CellKind::Array(items.iter().map(Cell::kind).collect()),
            Cell::Null => CellKind::Null,
        }
    }
}

/// Verify that `row` (1-based) has the same cell kinds as `first`.
pub fn check_row_type(first: &[CellKind], row: usize, cells: &[Cell]) -> Result<()> {
    for (i, (kind, cell)) in first.iter().zip(cells).enumerate() {
        if *kind != cell.kind() {
            return Err(Error::InconsistentRowType { row, column: i + 1 });
        }
    }
    Ok(())
}

/// A named table column.
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub data: ColumnData,
    /// Elements per row; strings per row for character columns.
    pub repeat: usize,
    /// Characters per string for character columns. Defaults to the longest.
    pub width: Option<usize>,
    /// `TDIMn`, when declared.
    pub dims: Option<Vec<usize>>,
    /// `TUNITn`, when declared.
    pub unit: Option<String>,
}

impl Column {
    /// A column with one element per row.
    pub fn new(name: impl Into<String>, data: impl Into<ColumnData>) -> Self {
        Self {
            name: name.into(),
            data: data.into(),
            repeat: 1,
            width: None,
            dims: None,
            unit: None,
        }
    }

    /// A column with `repeat` consecutive elements per row.
    pub fn with_repeat(
        name: impl Into<String>,
        data: impl Into<ColumnData>,
        repeat: usize,
    ) -> Self {
        Self {
            repeat,
            ..Self::new(name, data)
        }
    }

    /// A bit-array column of `nbits` bits per row.
    pub fn bits(name: impl Into<String>, bits: Vec<bool>, nbits: usize) -> Self {
        Self::with_repeat(name, ColumnData::Bits(bits), nbits)
    }

    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = Some(unit.into());
        self
    }

    pub fn with_width(mut self, width: usize) -> Self {
        self.width = Some(width);
        self
    }

    pub fn with_dims(mut self, dims: Vec<usize>) -> Self {
        self.dims = Some(dims);
        self
    }

    /// Number of rows, or `None` when the payload is not a whole number of rows.
    pub fn nrows(&self) -> Option<usize> {
        let len = self.data.len();
        match self.repeat {
            0 => (len == 0).then_some(0),
            r if len % r == 0 => Some(len / r),
            _ => None,
        }
    }

    /// Characters per string: declared, or the longest string (at least 1).
    pub fn char_width(&self) -> usize {
        if let Some(w) = self.width {
            return w;
        }
        match &self.data {
            ColumnData::Str(v) => v.iter().map(String::len).max().unwrap_or(0).max(1),
            _ => 1,
        }
    }
}

/// Rows of an ASCII or binary table.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TableData {
    pub columns: Vec<Column>,
    nrows: usize,
}

impl TableData {
    /// Check that every column has the same number of rows.
    pub fn new(columns: Vec<Column>) -> Result<Self> {
        let mut nrows = None;
        for column in columns.iter().filter(|c| c.repeat > 0) {
            let rows = column.nrows().ok_or_else(|| Error::ShapeMismatch {
                keyword: format!("repeat of {}", column.name),
                header: column.repeat,
                actual: column.data.len(),
            })?;
            match nrows {
                None => nrows = Some(rows),
                Some(n) if n != rows => {
                    return Err(Error::ShapeMismatch {
                        keyword: "NAXIS2".to_string(),
                        header: n,
                        actual: rows,
                    })
                }
                Some(_) => {}
            }
        }
        Ok(Self {
            columns,
            nrows: nrows.unwrap_or(0),
        })
    }

    /// Assemble decoded rows, checking each row's cell kinds against row 1.
    pub(crate) fn from_rows(mut columns: Vec<Column>, rows: Vec<Vec<Cell>>) -> Result<Self> {
        let nrows = rows.len();
        let mut first: Option<Vec<CellKind>> = None;
        for (r, cells) in rows.into_iter().enumerate() {
            match &first {
                None => first = Some(cells.iter().map(Cell::kind).collect()),
                Some(kinds) => check_row_type(kinds, r + 1, &cells)?,
            }
            for (c, (column, cell)) in columns.iter_mut().zip(cells).enumerate() {
                if let Cell::Null = cell {
                    return Err(Error::UnparsableValue {
                        keyword: column.name.clone(),
                        text: String::new(),
                    });
                }
                if !column.data.push_cell(cell) {
                    return Err(Error::InconsistentRowType {
                        row: r + 1,
                        column: c + 1,
                    });
                }
            }
        }
        Ok(Self { columns, nrows })
    }

    pub fn nrows(&self) -> usize {
        self.nrows
    }

    pub fn ncols(&self) -> usize {
        self.columns.len()
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(name))
    }

    /// Take the columns out.
    pub fn into_columns(self) -> Vec<Column> {
        self.columns
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cells_from_data() {
        let data = ColumnData::from(vec![u64::MAX]);
        assert_eq!(data.cell(0), Some(Cell::Int(u64::MAX as i128)));
        assert_eq!(data.cell(1), None);
        let data = ColumnData::from(vec![(1.5f32, 2.0f32)]);
        assert_eq!(data.cell(0), Some(Cell::Complex(1.5, 2.0)));
        let data = ColumnData::from(vec!["ab"]);
        assert_eq!(data.cell(0), Some(Cell::Str("ab".into())));
    }

    #[test]
    fn push_cell_converts_and_checks() {
        let mut data = ColumnData::empty(ElementType::U16);
        assert!(data.push_cell(Cell::Int(65535)));
        assert!(!data.push_cell(Cell::Int(65536)));
        assert!(!data.push_cell(Cell::Float(1.0)));
        assert!(data.push_cell(Cell::Array(vec![Cell::Int(1), Cell::Int(2)])));
        assert_eq!(data, ColumnData::U16(vec![65535, 1, 2]));
    }

    #[test]
    fn encode_range_applies_offset() {
        let data = ColumnData::from(vec![0u16, 1, 2]);
        let mut out = Vec::new();
        data.encode_range(1, 3, &mut out);
        assert_eq!(out, vec![0x80, 0x01, 0x80, 0x02]);
    }

    #[test]
    fn row_type_check() {
        let first = vec![CellKind::Int, CellKind::Str];
        assert!(check_row_type(&first, 2, &[Cell::Int(1), Cell::Str("x".into())]).is_ok());
        let err = check_row_type(&first, 3, &[Cell::Int(1), Cell::Bool(true)]).unwrap_err();
        assert!(matches!(err, Error::InconsistentRowType { row: 3, column: 2 }));
    }

    #[test]
    fn table_row_counts() {
        let t = TableData::new(vec![
            Column::new("A", vec![1i32, 2, 3]),
            Column::with_repeat("B", vec![0.0f64; 6], 2),
        ])
        .unwrap();
        assert_eq!(t.nrows(), 3);
        assert_eq!(t.ncols(), 2);
        assert!(t.column("b").is_some());

        let err = TableData::new(vec![
            Column::new("A", vec![1i32, 2, 3]),
            Column::new("B", vec![1i32]),
        ])
        .unwrap_err();
        assert!(matches!(err, Error::ShapeMismatch { header: 3, actual: 1, .. }));

        assert!(TableData::new(vec![Column::with_repeat("C", vec![1u8, 2, 3], 2)]).is_err());
    }

    #[test]
    fn from_rows_detects_inconsistency() {
        let columns = vec![Column::new("A", ColumnData::empty(ElementType::Bool))];
        let rows = vec![vec![Cell::Bool(true)], vec![Cell::Str("x".into())]];
        let err = TableData::from_rows(columns, rows).unwrap_err();
        assert!(matches!(err, Error::InconsistentRowType { row: 2, column: 1 }));
    }

    #[test]
    fn char_width_defaults_to_longest() {
        let c = Column::new("S", vec!["a", "abcd", ""]);
        assert_eq!(c.char_width(), 4);
        assert_eq!(c.clone().with_width(10).char_width(), 10);
        let empty = Column::new("E", Vec::<String>::new());
        assert_eq!(empty.char_width(), 1);
    }
}
