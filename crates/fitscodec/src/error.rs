use std::path::PathBuf;

use crate::format::FormatError;

/// All errors that can occur while encoding, decoding or editing FITS data.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The byte buffer is empty.
    #[error("empty FITS buffer")]
    EmptyFile,
    /// The buffer length is not a whole number of 2880-byte blocks.
    #[error("buffer length {len} is not a multiple of 2880 bytes")]
    MisalignedFile { len: usize },
    /// A header has no END record in any of its blocks.
    #[error("header has no END record")]
    TruncatedHeader,
    /// Fewer data bytes are present than the header declares.
    #[error("truncated data: expected {expected} bytes, {available} available")]
    TruncatedData { expected: usize, available: usize },
    /// Keyword is longer than 8 characters or uses characters outside `[A-Z0-9_-]`.
    #[error("illegal keyword: {0:?}")]
    IllegalKeyword(String),
    /// A value field could not be classified as any header value type.
    #[error("unparsable value for {keyword}: {text:?}")]
    UnparsableValue { keyword: String, text: String },
    /// `add_key` or `rename_key` target is already present.
    #[error("keyword already in use: {0}")]
    KeywordInUse(String),
    /// The keyword does not occur in the header.
    #[error("keyword not found: {0}")]
    KeywordNotFound(String),
    /// The keyword belongs to the mandatory set of the HDU type.
    #[error("mandatory keyword cannot be modified: {0}")]
    MandatoryKeywordProtected(String),
    /// The element type has no representation in this kind of HDU.
    #[error("unsupported data type: {0}")]
    UnsupportedDataType(String),
    /// Primary and image HDUs are limited to three axes.
    #[error("too many dimensions: {0} (at most 3 supported)")]
    TooManyDimensions(usize),
    /// A decoded table row holds a different element type than row 1.
    #[error("row {row} column {column} has a different type than row 1")]
    InconsistentRowType { row: usize, column: usize },
    /// Variable-length array descriptors (`P`/`Q`) are not supported.
    #[error("not implemented: {0}")]
    NotImplemented(&'static str),
    /// A FORTRAN or binary table format descriptor failed validation.
    #[error("invalid format descriptor {descriptor:?}: {reason}")]
    InvalidFormat {
        descriptor: String,
        reason: FormatError,
    },
    /// A keyword required to interpret the HDU is absent.
    #[error("missing required keyword: {0}")]
    MissingKeyword(String),
    /// The header is structurally invalid.
    #[error("invalid FITS header: {0}")]
    InvalidHeader(&'static str),
    /// Header dimension keywords disagree with the data shape.
    #[error("{keyword} is {header} in the header but the data has {actual}")]
    ShapeMismatch {
        keyword: String,
        header: usize,
        actual: usize,
    },
    /// Unknown or unsupported XTENSION type.
    #[error("unsupported XTENSION type: {0}")]
    UnsupportedExtension(String),
    /// Refusing to replace an existing file.
    #[error("file already exists: {}", .0.display())]
    FileExists(PathBuf),
    /// An encoded buffer does not have the size implied by its blocks.
    #[error("encoded size mismatch: expected {expected} bytes, got {actual}")]
    SizeMismatch { expected: usize, actual: usize },
    /// An I/O error from the standard library.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = core::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_misaligned() {
        let e = Error::MisalignedFile { len: 100 };
        assert_eq!(
            e.to_string(),
            "buffer length 100 is not a multiple of 2880 bytes"
        );
    }

    #[test]
    fn display_truncated_data() {
        let e = Error::TruncatedData {
            expected: 12,
            available: 4,
        };
        assert_eq!(
            e.to_string(),
            "truncated data: expected 12 bytes, 4 available"
        );
    }

    #[test]
    fn display_keyword_errors() {
        assert_eq!(
            Error::IllegalKeyword("bad key".into()).to_string(),
            "illegal keyword: \"bad key\""
        );
        assert_eq!(
            Error::MandatoryKeywordProtected("NAXIS".into()).to_string(),
            "mandatory keyword cannot be modified: NAXIS"
        );
    }

    #[test]
    fn display_invalid_format() {
        let e = Error::InvalidFormat {
            descriptor: "F10".into(),
            reason: FormatError::MissingDecimals,
        };
        assert_eq!(
            e.to_string(),
            "invalid format descriptor \"F10\": missing decimal field"
        );
    }

    #[test]
    fn io_error_from_conversion() {
        let io_err = std::io::Error::other("oops");
        let e: Error = io_err.into();
        assert!(matches!(e, Error::Io(_)));
    }

    #[test]
    fn std_error_source() {
        use std::error::Error as StdError;

        let e = Error::TruncatedHeader;
        assert!(e.source().is_none());

        let e = Error::Io(std::io::Error::other("inner"));
        assert!(e.source().is_some());
    }
}
