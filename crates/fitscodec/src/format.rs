//! Table field-descriptor mini-language.
//!
//! Two dialects share the same tokenizer:
//!
//! * [`DisplayFormat`]: FORTRAN output descriptors used by ASCII-table
//!   `TFORMn` and by `TDISPn` (`Aw`, `Lw`, `Iw.m`, `Bw.m`, `Ow.m`, `Zw.m`,
//!   `Fw.d`, `Ew.dEe`, `ENw.d`, `ESw.d`, `Gw.dEe`, `Dw.dEe`).
//! * [`BinaryFormat`]: binary-table `TFORMn` descriptors of the form `rTa`.
//!
//! Parsing strips surrounding quotes and blanks, upper-cases the text and
//! checks every character against an allow-list before interpreting it.

use core::fmt;

/// Reason a descriptor failed validation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FormatError {
    #[error("empty descriptor")]
    Empty,
    #[error("illegal character {0:?}")]
    IllegalCharacter(char),
    #[error("unknown type character {0:?}")]
    UnknownType(char),
    #[error("missing type character")]
    MissingType,
    #[error("missing width")]
    MissingWidth,
    #[error("missing decimal field")]
    MissingDecimals,
    #[error("decimal point incompatible with type")]
    DecimalNotAllowed,
    #[error("two decimal points")]
    TwoDecimalPoints,
    #[error("exponent incompatible with type")]
    ExponentNotAllowed,
    #[error("missing exponent digits")]
    MissingExponent,
    #[error("unexpected extra E")]
    ExtraExponent,
    #[error("value does not fit in a field of width {0}")]
    FieldOverflow(usize),
}

/// Strip quotes and blanks and upper-case a descriptor.
///
/// This is the canonical spelling that [`DisplayFormat`] and [`BinaryFormat`]
/// reproduce through their `Display` impls.
pub fn normalize(descriptor: &str) -> String {
    descriptor
        .trim()
        .trim_matches(|c| c == '\'' || c == '"')
        .trim()
        .to_ascii_uppercase()
}

fn check_allowed(text: &str, allowed: &str) -> Result<(), FormatError> {
    match text.chars().find(|c| !allowed.contains(*c)) {
        Some(c) => Err(FormatError::IllegalCharacter(c)),
        None => Ok(()),
    }
}

/// Split a leading run of ASCII digits off `text`.
fn take_digits(text: &str) -> (Option<usize>, &str) {
    let end = text
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(text.len());
    if end == 0 {
        return (None, text);
    }
    // A run of digits that overflows usize is not a usable width either.
    (text[..end].parse().ok(), &text[end..])
}

// ---------------------------------------------------------------------------
// FORTRAN display descriptors
// ---------------------------------------------------------------------------

/// Type letter of a FORTRAN output descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DisplayKind {
    /// `A`: character.
    Char,
    /// `L`: logical (`TDISP` only).
    Logical,
    /// `I`: decimal integer.
    Integer,
    /// `B`: binary integer.
    Binary,
    /// `O`: octal integer.
    Octal,
    /// `Z`: hexadecimal integer.
    Hex,
    /// `F`: fixed-point float.
    Fixed,
    /// `E`: exponential float.
    Exponential,
    /// `EN`: engineering notation.
    Engineering,
    /// `ES`: scientific notation.
    Scientific,
    /// `G`: general float.
    General,
    /// `D`: double-precision exponential.
    Double,
}

impl DisplayKind {
    fn from_letter(letter: char) -> Option<Self> {
        Some(match letter {
            'A' => DisplayKind::Char,
            'L' => DisplayKind::Logical,
            'I' => DisplayKind::Integer,
            'B' => DisplayKind::Binary,
            'O' => DisplayKind::Octal,
            'Z' => DisplayKind::Hex,
            'F' => DisplayKind::Fixed,
            'E' => DisplayKind::Exponential,
            'G' => DisplayKind::General,
            'D' => DisplayKind::Double,
            _ => return None,
        })
    }

    /// The primary type letter.
    pub fn letter(self) -> char {
        match self {
            DisplayKind::Char => 'A',
            DisplayKind::Logical => 'L',
            DisplayKind::Integer => 'I',
            DisplayKind::Binary => 'B',
            DisplayKind::Octal => 'O',
            DisplayKind::Hex => 'Z',
            DisplayKind::Fixed => 'F',
            DisplayKind::Exponential | DisplayKind::Engineering | DisplayKind::Scientific => 'E',
            DisplayKind::General => 'G',
            DisplayKind::Double => 'D',
        }
    }

    /// The `N`/`S` modifier of `EN`/`ES`.
    pub fn modifier(self) -> Option<char> {
        match self {
            DisplayKind::Engineering => Some('N'),
            DisplayKind::Scientific => Some('S'),
            _ => None,
        }
    }

    /// Integer kinds take an optional `.m` minimum digit count.
    pub fn is_integer(self) -> bool {
        matches!(
            self,
            DisplayKind::Integer | DisplayKind::Binary | DisplayKind::Octal | DisplayKind::Hex
        )
    }

    /// Float kinds require a `.d` field.
    pub fn is_float(self) -> bool {
        matches!(
            self,
            DisplayKind::Fixed
                | DisplayKind::Exponential
                | DisplayKind::Engineering
                | DisplayKind::Scientific
                | DisplayKind::General
                | DisplayKind::Double
        )
    }

    fn allows_exponent(self) -> bool {
        matches!(
            self,
            DisplayKind::Exponential
                | DisplayKind::Engineering
                | DisplayKind::Scientific
                | DisplayKind::General
                | DisplayKind::Double
        )
    }
}

/// A decomposed FORTRAN output descriptor.
///
/// `min_digits` is the `m` of `Iw.m`; `decimals` is the `d` of `Fw.d`. Only
/// one of the two is ever set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DisplayFormat {
    pub kind: DisplayKind,
    pub width: usize,
    pub min_digits: Option<usize>,
    pub decimals: Option<usize>,
    pub exponent: Option<usize>,
}

const DISPLAY_ALLOWED: &str = "ABDEFGILNOSZ0123456789.";

impl DisplayFormat {
    /// `Aw`.
    pub fn char(width: usize) -> Self {
        Self::simple(DisplayKind::Char, width)
    }

    /// `Iw`.
    pub fn integer(width: usize) -> Self {
        Self::simple(DisplayKind::Integer, width)
    }

    /// `Lw`.
    pub fn logical(width: usize) -> Self {
        Self::simple(DisplayKind::Logical, width)
    }

    fn simple(kind: DisplayKind, width: usize) -> Self {
        Self {
            kind,
            width,
            min_digits: None,
            decimals: None,
            exponent: None,
        }
    }

    /// Parse a descriptor such as `"E10.5E3"` or `'I8'`.
    pub fn parse(descriptor: &str) -> Result<Self, FormatError> {
        let text = normalize(descriptor);
        if text.is_empty() {
            return Err(FormatError::Empty);
        }
        check_allowed(&text, DISPLAY_ALLOWED)?;

        let mut chars = text.chars();
        let letter = chars.next().ok_or(FormatError::Empty)?;
        let mut kind = DisplayKind::from_letter(letter).ok_or(FormatError::UnknownType(letter))?;
        let mut rest = chars.as_str();
        if kind == DisplayKind::Exponential {
            if let Some(r) = rest.strip_prefix('N') {
                kind = DisplayKind::Engineering;
                rest = r;
            } else if let Some(r) = rest.strip_prefix('S') {
                kind = DisplayKind::Scientific;
                rest = r;
            }
        }

        let (width, mut rest) = take_digits(rest);
        let width = width.ok_or(FormatError::MissingWidth)?;

        let mut fraction = None;
        if let Some(r) = rest.strip_prefix('.') {
            if !(kind.is_integer() || kind.is_float()) {
                return Err(FormatError::DecimalNotAllowed);
            }
            let (digits, r) = take_digits(r);
            if r.starts_with('.') {
                return Err(FormatError::TwoDecimalPoints);
            }
            fraction = Some(digits.ok_or(FormatError::MissingDecimals)?);
            rest = r;
        }
        if kind.is_float() && fraction.is_none() {
            return Err(FormatError::MissingDecimals);
        }

        let mut exponent = None;
        if let Some(r) = rest.strip_prefix('E') {
            if !kind.allows_exponent() {
                return Err(FormatError::ExponentNotAllowed);
            }
            let (digits, r) = take_digits(r);
            exponent = Some(digits.ok_or(FormatError::MissingExponent)?);
            rest = r;
        }

        if let Some(c) = rest.chars().next() {
            return Err(match c {
                'E' if exponent.is_some() => FormatError::ExtraExponent,
                '.' if fraction.is_some() => FormatError::TwoDecimalPoints,
                '.' => FormatError::DecimalNotAllowed,
                'E' => FormatError::ExponentNotAllowed,
                other => FormatError::IllegalCharacter(other),
            });
        }

        let (min_digits, decimals) = if kind.is_integer() {
            (fraction, None)
        } else {
            (None, fraction)
        };
        Ok(Self {
            kind,
            width,
            min_digits,
            decimals,
            exponent,
        })
    }

    /// Smallest `Aw` holding every string in `values` (at least `A1`).
    pub fn fit_strings<'a, I>(values: I) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        let width = values.into_iter().map(|s| s.len()).max().unwrap_or(0);
        Self::char(width.max(1))
    }

    /// Smallest `Iw` holding every integer in `values`.
    pub fn fit_integers<I>(values: I) -> Self
    where
        I: IntoIterator<Item = i128>,
    {
        let width = values
            .into_iter()
            .map(|v| v.to_string().len())
            .max()
            .unwrap_or(1);
        Self::integer(width)
    }

    /// Smallest `Ew.dEe` (or `Dw.dEe` when `double`) that reproduces every
    /// value exactly.
    ///
    /// `reprs` are the shortest round-trip exponential renderings of the
    /// values (Rust's `{:e}`), so single-precision columns are sized by their
    /// own shortest digits rather than by their widened `f64` expansion.
    pub fn fit_exponential<I>(reprs: I, double: bool) -> Self
    where
        I: IntoIterator<Item = String>,
    {
        let mut decimals = 1;
        let mut exp_digits = 2;
        let mut special = 0;
        for repr in reprs {
            match repr.split_once('e') {
                Some((mantissa, exp)) => {
                    let frac = mantissa.split_once('.').map_or(0, |(_, f)| f.len());
                    decimals = decimals.max(frac);
                    exp_digits = exp_digits.max(exp.trim_start_matches('-').len());
                }
                // NaN and infinities have no exponent.
                None => special = special.max(repr.len()),
            }
        }
        // sign, lead digit, point, decimals, letter, exponent sign, exponent
        let width = (decimals + exp_digits + 5).max(special);
        let kind = if double {
            DisplayKind::Double
        } else {
            DisplayKind::Exponential
        };
        Self {
            kind,
            width,
            min_digits: None,
            decimals: Some(decimals),
            exponent: Some(exp_digits),
        }
    }

    /// The same descriptor without its exponent field.
    ///
    /// ASCII-table `TFORM` only admits `Ew.d`/`Dw.d`; the full form goes into
    /// `TDISP`.
    pub fn without_exponent(self) -> Self {
        Self {
            exponent: None,
            ..self
        }
    }

    /// Right-justify `text` in a field of this width.
    pub fn render_right(&self, text: &str) -> Result<String, FormatError> {
        if text.len() > self.width {
            return Err(FormatError::FieldOverflow(self.width));
        }
        Ok(format!("{text:>width$}", width = self.width))
    }

    /// Left-justify `text` in a field of this width.
    pub fn render_left(&self, text: &str) -> Result<String, FormatError> {
        if text.len() > self.width {
            return Err(FormatError::FieldOverflow(self.width));
        }
        Ok(format!("{text:<width$}", width = self.width))
    }

    /// Render a float with this descriptor's decimals and exponent digits.
    ///
    /// `E` and `D` descriptors use their own letter for the exponent.
    pub fn render_exponential<T: fmt::LowerExp>(&self, value: T) -> Result<String, FormatError> {
        let decimals = self.decimals.unwrap_or(1);
        let exp_digits = self.exponent.unwrap_or(2);
        let raw = format!("{value:.decimals$e}");
        let text = match raw.split_once('e') {
            Some((mantissa, exp)) => {
                let (sign, digits) = match exp.strip_prefix('-') {
                    Some(d) => ('-', d),
                    None => ('+', exp),
                };
                format!(
                    "{mantissa}{}{sign}{digits:0>exp_digits$}",
                    self.kind.letter()
                )
            }
            None => raw,
        };
        self.render_right(&text)
    }
}

impl fmt::Display for DisplayFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind.letter())?;
        if let Some(m) = self.kind.modifier() {
            write!(f, "{m}")?;
        }
        write!(f, "{}", self.width)?;
        if let Some(m) = self.min_digits.or(self.decimals) {
            write!(f, ".{m}")?;
        }
        if let Some(e) = self.exponent {
            write!(f, "E{e}")?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Binary table descriptors
// ---------------------------------------------------------------------------

/// Type code of a binary-table field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryCode {
    /// `L`: logical, one byte per element.
    Logical,
    /// `X`: bit array, packed.
    Bit,
    /// `B`: unsigned byte.
    Byte,
    /// `I`: 16-bit integer.
    Short,
    /// `J`: 32-bit integer.
    Int,
    /// `K`: 64-bit integer.
    Long,
    /// `A`: character.
    Char,
    /// `E`: single-precision float.
    Float,
    /// `D`: double-precision float.
    Double,
    /// `C`: single-precision complex.
    ComplexFloat,
    /// `M`: double-precision complex.
    ComplexDouble,
    /// `P`: 32-bit array descriptor.
    ArrayDescriptor,
    /// `Q`: 64-bit array descriptor.
    ArrayDescriptor64,
}

impl BinaryCode {
    pub fn from_letter(letter: char) -> Option<Self> {
        Some(match letter {
            'L' => BinaryCode::Logical,
            'X' => BinaryCode::Bit,
            'B' => BinaryCode::Byte,
            'I' => BinaryCode::Short,
            'J' => BinaryCode::Int,
            'K' => BinaryCode::Long,
            'A' => BinaryCode::Char,
            'E' => BinaryCode::Float,
            'D' => BinaryCode::Double,
            'C' => BinaryCode::ComplexFloat,
            'M' => BinaryCode::ComplexDouble,
            'P' => BinaryCode::ArrayDescriptor,
            'Q' => BinaryCode::ArrayDescriptor64,
            _ => return None,
        })
    }

    pub fn letter(self) -> char {
        match self {
            BinaryCode::Logical => 'L',
            BinaryCode::Bit => 'X',
            BinaryCode::Byte => 'B',
            BinaryCode::Short => 'I',
            BinaryCode::Int => 'J',
            BinaryCode::Long => 'K',
            BinaryCode::Char => 'A',
            BinaryCode::Float => 'E',
            BinaryCode::Double => 'D',
            BinaryCode::ComplexFloat => 'C',
            BinaryCode::ComplexDouble => 'M',
            BinaryCode::ArrayDescriptor => 'P',
            BinaryCode::ArrayDescriptor64 => 'Q',
        }
    }

    /// Bytes per element. Bit fields report 0; use [`BinaryFormat::byte_width`].
    pub fn element_size(self) -> usize {
        match self {
            BinaryCode::Bit => 0,
            BinaryCode::Logical | BinaryCode::Byte | BinaryCode::Char => 1,
            BinaryCode::Short => 2,
            BinaryCode::Int | BinaryCode::Float => 4,
            BinaryCode::Long
            | BinaryCode::Double
            | BinaryCode::ComplexFloat
            | BinaryCode::ArrayDescriptor => 8,
            BinaryCode::ComplexDouble | BinaryCode::ArrayDescriptor64 => 16,
        }
    }

    /// `P` and `Q` point into the heap.
    pub fn is_array_descriptor(self) -> bool {
        matches!(
            self,
            BinaryCode::ArrayDescriptor | BinaryCode::ArrayDescriptor64
        )
    }
}

/// A decomposed binary-table `rTa` descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinaryFormat {
    pub repeat: usize,
    pub code: BinaryCode,
    /// Trailing auxiliary text, e.g. `E(100)` of `1PE(100)`.
    pub aux: String,
}

const BINARY_ALLOWED: &str = "0123456789LXBIJKAEDCMPQ(),:_ ";

impl BinaryFormat {
    pub fn new(repeat: usize, code: BinaryCode) -> Self {
        Self {
            repeat,
            code,
            aux: String::new(),
        }
    }

    /// Parse a descriptor such as `"1J"`, `"16A"` or `"1PE(100)"`.
    ///
    /// A missing repeat count means 1.
    pub fn parse(descriptor: &str) -> Result<Self, FormatError> {
        let text = normalize(descriptor);
        if text.is_empty() {
            return Err(FormatError::Empty);
        }
        let (repeat, rest) = take_digits(&text);
        let mut chars = rest.chars();
        let letter = chars.next().ok_or(FormatError::MissingType)?;
        let code = BinaryCode::from_letter(letter).ok_or(if letter.is_ascii_alphabetic() {
            FormatError::UnknownType(letter)
        } else {
            FormatError::IllegalCharacter(letter)
        })?;
        let aux = chars.as_str();
        // Free text after ':' (e.g. `8A:SSTR8`) keeps its original case.
        let (spec, extra) = aux.split_at(aux.find(':').unwrap_or(aux.len()));
        check_allowed(spec, BINARY_ALLOWED)?;
        if let Some(c) = extra.chars().find(|c| !(' '..='~').contains(c)) {
            return Err(FormatError::IllegalCharacter(c));
        }
        let raw = descriptor.trim().trim_matches(|c| c == '\'' || c == '"').trim();
        let aux = format!("{spec}{}", &raw[raw.len() - extra.len()..]);
        Ok(Self {
            repeat: repeat.unwrap_or(1),
            code,
            aux: aux.trim().to_string(),
        })
    }

    /// Bytes occupied by one field in a row.
    pub fn byte_width(&self) -> usize {
        match self.code {
            BinaryCode::Bit => self.repeat.div_ceil(8),
            // A descriptor field holds one pointer pair regardless of repeat.
            BinaryCode::ArrayDescriptor | BinaryCode::ArrayDescriptor64 => {
                self.code.element_size() * self.repeat.min(1)
            }
            code => code.element_size() * self.repeat,
        }
    }
}

impl fmt::Display for BinaryFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.repeat, self.code.letter(), self.aux)
    }
}
