//! Element types, the zero-offset transform and big-endian array codecs.
//!
//! FITS stores every binary element big-endian. Unsigned 16/32/64-bit and
//! signed 8-bit integers have no native representation: they are stored as
//! their signed (or unsigned) counterpart minus a fixed `BZERO` bias, see
//! [`ZeroOffset`].

use core::fmt;

use bytemuck::pod_collect_to_vec;
use ndarray::{ArrayD, IxDyn, ShapeBuilder};

use crate::error::{Error, Result};

/// Largest axis count accepted for primary and image HDUs.
pub const MAX_IMAGE_AXES: usize = 3;

/// Element type of an image or table column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementType {
    Bool,
    U8,
    I8,
    I16,
    U16,
    I32,
    U32,
    I64,
    U64,
    F32,
    F64,
    /// Interleaved `f32` real/imaginary pair.
    C32,
    /// Interleaved `f64` real/imaginary pair.
    C64,
}

impl ElementType {
    /// Bytes per element on the wire.
    pub fn byte_width(self) -> usize {
        match self {
            ElementType::Bool | ElementType::U8 | ElementType::I8 => 1,
            ElementType::I16 | ElementType::U16 => 2,
            ElementType::I32 | ElementType::U32 | ElementType::F32 => 4,
            ElementType::I64 | ElementType::U64 | ElementType::F64 | ElementType::C32 => 8,
            ElementType::C64 => 16,
        }
    }

    /// `BITPIX` of the stored representation. Complex types report the code
    /// of their float components.
    pub fn bitpix(self) -> i64 {
        match self {
            ElementType::Bool | ElementType::U8 | ElementType::I8 => 8,
            ElementType::I16 | ElementType::U16 => 16,
            ElementType::I32 | ElementType::U32 => 32,
            ElementType::I64 | ElementType::U64 => 64,
            ElementType::F32 | ElementType::C32 => -32,
            ElementType::F64 | ElementType::C64 => -64,
        }
    }

    /// Zero-offset bias; 0 when values are stored as-is.
    pub fn bzero(self) -> i128 {
        match self {
            ElementType::I8 => <i8 as ZeroOffset>::BZERO,
            ElementType::U16 => <u16 as ZeroOffset>::BZERO,
            ElementType::U32 => <u32 as ZeroOffset>::BZERO,
            ElementType::U64 => <u64 as ZeroOffset>::BZERO,
            _ => 0,
        }
    }

    pub fn is_integer(self) -> bool {
        matches!(
            self,
            ElementType::U8
                | ElementType::I8
                | ElementType::I16
                | ElementType::U16
                | ElementType::I32
                | ElementType::U32
                | ElementType::I64
                | ElementType::U64
        )
    }

    pub fn is_complex(self) -> bool {
        matches!(self, ElementType::C32 | ElementType::C64)
    }

    /// Recover the element type from `BITPIX` and the `BZERO` bias.
    ///
    /// A bias that matches the unsigned (or signed byte) convention for the
    /// integer width selects that type; any other bias leaves the stored type.
    pub fn from_bitpix(bitpix: i128, bzero: f64) -> Result<Self> {
        let biased = |t: ElementType| bzero == t.bzero() as f64;
        Ok(match bitpix {
            8 if biased(ElementType::I8) => ElementType::I8,
            8 => ElementType::U8,
            16 if biased(ElementType::U16) => ElementType::U16,
            16 => ElementType::I16,
            32 if biased(ElementType::U32) => ElementType::U32,
            32 => ElementType::I32,
            64 if biased(ElementType::U64) => ElementType::U64,
            64 => ElementType::I64,
            -32 => ElementType::F32,
            -64 => ElementType::F64,
            other => return Err(Error::UnsupportedDataType(format!("BITPIX = {other}"))),
        })
    }

    pub fn name(self) -> &'static str {
        match self {
            ElementType::Bool => "Bool",
            ElementType::U8 => "UInt8",
            ElementType::I8 => "Int8",
            ElementType::I16 => "Int16",
            ElementType::U16 => "UInt16",
            ElementType::I32 => "Int32",
            ElementType::U32 => "UInt32",
            ElementType::I64 => "Int64",
            ElementType::U64 => "UInt64",
            ElementType::F32 => "Float32",
            ElementType::F64 => "Float64",
            ElementType::C32 => "ComplexF32",
            ElementType::C64 => "ComplexF64",
        }
    }
}

impl fmt::Display for ElementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ---------------------------------------------------------------------------
// Zero offset
// ---------------------------------------------------------------------------

/// Types stored through a `BZERO` bias.
///
/// `apply_offset` computes `value - BZERO` and `remove_offset` computes
/// `stored + BZERO`, both through `i128` so the extremes are exact.
pub trait ZeroOffset: Sized + Copy {
    /// The type written to the wire.
    type Stored: Copy;
    const BZERO: i128;

    fn apply_offset(self) -> Self::Stored;
    fn remove_offset(stored: Self::Stored) -> Self;
}

macro_rules! zero_offset {
    ($t:ty, $stored:ty, $bzero:expr) => {
        impl ZeroOffset for $t {
            type Stored = $stored;
            const BZERO: i128 = $bzero;

            #[inline]
            fn apply_offset(self) -> $stored {
                (self as i128 - Self::BZERO) as $stored
            }

            #[inline]
            fn remove_offset(stored: $stored) -> Self {
                (stored as i128 + Self::BZERO) as $t
            }
        }
    };
}

zero_offset!(u16, i16, 1 << 15);
zero_offset!(u32, i32, 1 << 31);
zero_offset!(u64, i64, 1 << 63);
zero_offset!(i8, u8, -128);

// ---------------------------------------------------------------------------
// Element codecs
// ---------------------------------------------------------------------------

/// A Rust type that maps onto one FITS element type.
pub trait Element: Copy + PartialEq + fmt::Debug + 'static {
    const TYPE: ElementType;

    /// Append the big-endian wire form of `values` to `out`.
    fn encode_be(values: &[Self], out: &mut Vec<u8>);

    /// Decode big-endian elements. `raw.len()` must be a multiple of the
    /// element width.
    fn decode_be(raw: &[u8]) -> Vec<Self>;

    /// Wrap an array into [`ImageData`]. Types without a `BITPIX` refuse.
    fn into_image(array: ArrayD<Self>) -> Result<ImageData> {
        drop(array);
        Err(Error::UnsupportedDataType(format!(
            "{} image",
            Self::TYPE.name()
        )))
    }

    /// Borrow the array of this type out of [`ImageData`].
    fn image_array(image: &ImageData) -> Option<&ArrayD<Self>> {
        let _ = image;
        None
    }
}

macro_rules! plain_element {
    ($t:ty, $variant:ident) => {
        impl Element for $t {
            const TYPE: ElementType = ElementType::$variant;

            fn encode_be(values: &[Self], out: &mut Vec<u8>) {
                out.reserve(values.len() * core::mem::size_of::<$t>());
                for v in values {
                    out.extend_from_slice(&v.to_be_bytes());
                }
            }

            fn decode_be(raw: &[u8]) -> Vec<Self> {
                // Copy into an aligned Vec, then swap each element in place.
                let mut values: Vec<$t> = pod_collect_to_vec(raw);
                for v in &mut values {
                    *v = <$t>::from_be_bytes(v.to_ne_bytes());
                }
                values
            }

            fn into_image(array: ArrayD<Self>) -> Result<ImageData> {
                Ok(ImageData::$variant(array))
            }

            fn image_array(image: &ImageData) -> Option<&ArrayD<Self>> {
                match image {
                    ImageData::$variant(a) => Some(a),
                    _ => None,
                }
            }
        }
    };
}

macro_rules! offset_element {
    ($t:ty, $stored:ty, $variant:ident) => {
        impl Element for $t {
            const TYPE: ElementType = ElementType::$variant;

            fn encode_be(values: &[Self], out: &mut Vec<u8>) {
                out.reserve(values.len() * core::mem::size_of::<$t>());
                for v in values {
                    out.extend_from_slice(&v.apply_offset().to_be_bytes());
                }
            }

            fn decode_be(raw: &[u8]) -> Vec<Self> {
                <$stored as Element>::decode_be(raw)
                    .into_iter()
                    .map(<$t as ZeroOffset>::remove_offset)
                    .collect()
            }

            fn into_image(array: ArrayD<Self>) -> Result<ImageData> {
                Ok(ImageData::$variant(array))
            }

            fn image_array(image: &ImageData) -> Option<&ArrayD<Self>> {
                match image {
                    ImageData::$variant(a) => Some(a),
                    _ => None,
                }
            }
        }
    };
}

plain_element!(u8, U8);
plain_element!(i16, I16);
plain_element!(i32, I32);
plain_element!(i64, I64);
plain_element!(f32, F32);
plain_element!(f64, F64);
offset_element!(i8, u8, I8);
offset_element!(u16, i16, U16);
offset_element!(u32, i32, U32);
offset_element!(u64, i64, U64);

/// Logicals are one byte: 1 for true, 0 for false. `F` (0x46) also reads
/// as false so that `T`/`F` encoded files decode.
impl Element for bool {
    const TYPE: ElementType = ElementType::Bool;

    fn encode_be(values: &[Self], out: &mut Vec<u8>) {
        out.extend(values.iter().map(|&b| u8::from(b)));
    }

    fn decode_be(raw: &[u8]) -> Vec<Self> {
        raw.iter().map(|&b| b != 0 && b != b'F').collect()
    }
}

macro_rules! complex_element {
    ($t:ty, $variant:ident) => {
        impl Element for ($t, $t) {
            const TYPE: ElementType = ElementType::$variant;

            fn encode_be(values: &[Self], out: &mut Vec<u8>) {
                out.reserve(values.len() * 2 * core::mem::size_of::<$t>());
                for (re, im) in values {
                    out.extend_from_slice(&re.to_be_bytes());
                    out.extend_from_slice(&im.to_be_bytes());
                }
            }

            fn decode_be(raw: &[u8]) -> Vec<Self> {
                <$t as Element>::decode_be(raw)
                    .chunks_exact(2)
                    .map(|pair| (pair[0], pair[1]))
                    .collect()
            }
        }
    };
}

complex_element!(f32, C32);
complex_element!(f64, C64);

/// Encode a slice to big-endian bytes.
pub fn encode_values<T: Element>(values: &[T]) -> Vec<u8> {
    let mut out = Vec::new();
    T::encode_be(values, &mut out);
    out
}

/// Decode exactly `count` elements from the front of `raw`.
pub fn decode_values<T: Element>(raw: &[u8], count: usize) -> Result<Vec<T>> {
    let needed = count * T::TYPE.byte_width();
    if raw.len() < needed {
        return Err(Error::TruncatedData {
            expected: needed,
            available: raw.len(),
        });
    }
    Ok(T::decode_be(&raw[..needed]))
}

// ---------------------------------------------------------------------------
// Reshape
// ---------------------------------------------------------------------------

/// Reshape a flat sequence into an array whose axis `i` has length
/// `naxes[i]`, with the first axis varying fastest.
pub fn reshape<T>(naxes: &[usize], flat: Vec<T>) -> Result<ArrayD<T>> {
    let expected: usize = naxes.iter().product();
    let actual = flat.len();
    ArrayD::from_shape_vec(IxDyn(naxes).f(), flat).map_err(|_| Error::ShapeMismatch {
        keyword: "NAXIS".to_string(),
        header: expected,
        actual,
    })
}

/// Flatten an array in FITS order (first axis fastest).
pub fn flatten<T: Clone>(array: &ArrayD<T>) -> Vec<T> {
    array.t().iter().cloned().collect()
}

fn check_axes(naxes: &[usize]) -> Result<()> {
    if naxes.len() > MAX_IMAGE_AXES {
        return Err(Error::TooManyDimensions(naxes.len()));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Images
// ---------------------------------------------------------------------------

/// N-dimensional image payload. Axis `i` of each array is `NAXIS{i+1}`.
#[derive(Debug, Clone, PartialEq)]
pub enum ImageData {
    U8(ArrayD<u8>),
    I8(ArrayD<i8>),
    I16(ArrayD<i16>),
    U16(ArrayD<u16>),
    I32(ArrayD<i32>),
    U32(ArrayD<u32>),
    I64(ArrayD<i64>),
    U64(ArrayD<u64>),
    F32(ArrayD<f32>),
    F64(ArrayD<f64>),
}

/// Dispatch `$body` over every variant with `$a` bound to the array.
macro_rules! with_array {
    ($image:expr, $a:ident => $body:expr) => {
        match $image {
            ImageData::U8($a) => $body,
            ImageData::I8($a) => $body,
            ImageData::I16($a) => $body,
            ImageData::U16($a) => $body,
            ImageData::I32($a) => $body,
            ImageData::U32($a) => $body,
            ImageData::I64($a) => $body,
            ImageData::U64($a) => $body,
            ImageData::F32($a) => $body,
            ImageData::F64($a) => $body,
        }
    };
}

impl ImageData {
    /// Build an image from a flat vector in FITS order.
    pub fn from_vec<T: Element>(naxes: &[usize], flat: Vec<T>) -> Result<Self> {
        check_axes(naxes)?;
        T::into_image(reshape(naxes, flat)?)
    }

    /// Wrap an existing array. Its axis order is taken as FITS axis order.
    pub fn from_array<T: Element>(array: ArrayD<T>) -> Result<Self> {
        check_axes(array.shape())?;
        T::into_image(array)
    }

    /// Borrow the array when it holds elements of type `T`.
    pub fn as_array<T: Element>(&self) -> Option<&ArrayD<T>> {
        T::image_array(self)
    }

    pub fn element_type(&self) -> ElementType {
        match self {
            ImageData::U8(_) => ElementType::U8,
            ImageData::I8(_) => ElementType::I8,
            ImageData::I16(_) => ElementType::I16,
            ImageData::U16(_) => ElementType::U16,
            ImageData::I32(_) => ElementType::I32,
            ImageData::U32(_) => ElementType::U32,
            ImageData::I64(_) => ElementType::I64,
            ImageData::U64(_) => ElementType::U64,
            ImageData::F32(_) => ElementType::F32,
            ImageData::F64(_) => ElementType::F64,
        }
    }

    /// Axis lengths, `NAXIS1` first.
    pub fn shape(&self) -> Vec<usize> {
        with_array!(self, a => a.shape().to_vec())
    }

    pub fn len(&self) -> usize {
        with_array!(self, a => a.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Payload size in bytes, before block padding.
    pub fn byte_len(&self) -> usize {
        self.len() * self.element_type().byte_width()
    }

    /// Big-endian wire bytes with the zero offset applied.
    pub fn encode(&self) -> Vec<u8> {
        with_array!(self, a => encode_values(&flatten(a)))
    }

    /// Decode `raw` as an image of `element_type` and shape `naxes`.
    ///
    /// Bytes past the declared size are ignored.
    pub fn decode(element_type: ElementType, naxes: &[usize], raw: &[u8]) -> Result<Self> {
        check_axes(naxes)?;
        let count: usize = naxes.iter().product();
        match element_type {
            ElementType::U8 => Self::decode_as::<u8>(naxes, raw, count),
            ElementType::I8 => Self::decode_as::<i8>(naxes, raw, count),
            ElementType::I16 => Self::decode_as::<i16>(naxes, raw, count),
            ElementType::U16 => Self::decode_as::<u16>(naxes, raw, count),
            ElementType::I32 => Self::decode_as::<i32>(naxes, raw, count),
            ElementType::U32 => Self::decode_as::<u32>(naxes, raw, count),
            ElementType::I64 => Self::decode_as::<i64>(naxes, raw, count),
            ElementType::U64 => Self::decode_as::<u64>(naxes, raw, count),
            ElementType::F32 => Self::decode_as::<f32>(naxes, raw, count),
            ElementType::F64 => Self::decode_as::<f64>(naxes, raw, count),
            other => Err(Error::UnsupportedDataType(format!("{other} image"))),
        }
    }

    fn decode_as<T: Element>(naxes: &[usize], raw: &[u8], count: usize) -> Result<Self> {
        let flat = decode_values::<T>(raw, count)?;
        T::into_image(reshape(naxes, flat)?)
    }
}
