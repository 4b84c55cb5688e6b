//! File name decomposition.
//!
//! Observation files are commonly numbered, as in `obs_0012.fits`. A
//! [`FitsName`] splits such a name into a prefix, a zero-padded numeric
//! suffix and an extension so that sibling names can be generated.

use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Extensions recognised as FITS files, compared case-insensitively.
pub const FITS_EXTENSIONS: &[&str] = &["fits", "fit", "fts"];

/// A decomposed file name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FitsName {
    /// Containing directory; empty for a bare name.
    pub dir: PathBuf,
    /// Stem text before the numeric suffix.
    pub prefix: String,
    /// Trailing number of the stem, if any.
    pub number: Option<u64>,
    /// Digits in the numeric suffix, leading zeros included.
    pub digits: usize,
    /// Extension without the dot; empty when absent.
    pub extension: String,
}

impl FitsName {
    /// Split `path` into its parts.
    pub fn parse<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = path
            .file_name()
            .and_then(|f| f.to_str())
            .ok_or_else(|| Error::InvalidHeader("file name is not valid UTF-8"))?;
        let (stem, extension) = match file.rsplit_once('.') {
            Some((stem, ext)) if !stem.is_empty() => (stem, ext),
            _ => (file, ""),
        };
        let digits = stem.len() - stem.trim_end_matches(|c: char| c.is_ascii_digit()).len();
        let (prefix, suffix) = stem.split_at(stem.len() - digits);
        // Suffixes too long for a u64 stay part of the prefix.
        let (prefix, number, digits) = match suffix.parse() {
            Ok(n) => (prefix, Some(n), digits),
            Err(_) => (stem, None, 0),
        };
        Ok(Self {
            dir: path.parent().map(Path::to_path_buf).unwrap_or_default(),
            prefix: prefix.to_string(),
            number,
            digits,
            extension: extension.to_string(),
        })
    }

    /// File name without directory or extension.
    pub fn base(&self) -> String {
        match self.number {
            Some(n) => format!("{}{:0width$}", self.prefix, n, width = self.digits),
            None => self.prefix.clone(),
        }
    }

    /// Whether the extension is one of [`FITS_EXTENSIONS`].
    pub fn is_fits(&self) -> bool {
        FITS_EXTENSIONS
            .iter()
            .any(|e| e.eq_ignore_ascii_case(&self.extension))
    }

    /// The same name with numeric suffix `number`, keeping the digit count.
    pub fn with_number(&self, number: u64) -> Self {
        Self {
            number: Some(number),
            digits: self.digits.max(1),
            ..self.clone()
        }
    }

    /// The name with the next numeric suffix (1 when there is none).
    pub fn next(&self) -> Self {
        self.with_number(self.number.map_or(1, |n| n + 1))
    }

    pub fn path(&self) -> PathBuf {
        self.dir.join(self.to_string())
    }

    pub fn exists(&self) -> bool {
        self.path().exists()
    }

    /// Fail with [`Error::FileExists`] unless the file is absent or may be
    /// overwritten.
    pub fn check_writable(&self, overwrite: bool) -> Result<()> {
        if !overwrite && self.exists() {
            return Err(Error::FileExists(self.path()));
        }
        Ok(())
    }
}

impl fmt::Display for FitsName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.base())?;
        if !self.extension.is_empty() {
            write!(f, ".{}", self.extension)?;
        }
        Ok(())
    }
}
