//! Whole files: an ordered list of HDUs and an optional decomposed name.

use std::path::Path;

use log::debug;

use crate::block::index_blocks;
use crate::error::{Error, Result};
use crate::filename::FitsName;
use crate::hdu::{declared_data_len, Hdu};
use crate::header::Header;
use crate::io;

/// Something that identifies an HDU within a file.
pub trait DescribesHdu {
    /// 0-based position of the HDU in `file`, if present.
    fn position_in(&self, file: &FitsFile) -> Option<usize>;
}

/// 1-based HDU index.
impl DescribesHdu for usize {
    fn position_in(&self, file: &FitsFile) -> Option<usize> {
        (1..=file.len()).contains(self).then(|| self - 1)
    }
}

/// `EXTNAME`, compared case-insensitively.
impl DescribesHdu for &str {
    fn position_in(&self, file: &FitsFile) -> Option<usize> {
        file.hdus.iter().position(|hdu| {
            hdu.extname()
                .is_some_and(|name| name.eq_ignore_ascii_case(self.trim()))
        })
    }
}

impl DescribesHdu for String {
    fn position_in(&self, file: &FitsFile) -> Option<usize> {
        self.as_str().position_in(file)
    }
}

/// A FITS file held in memory.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FitsFile {
    pub name: Option<FitsName>,
    hdus: Vec<Hdu>,
}

impl FitsFile {
    pub fn new() -> Self {
        Self::default()
    }

    /// An empty file that will be written to `path`.
    pub fn with_name<P: AsRef<Path>>(path: P) -> Result<Self> {
        Ok(Self {
            name: Some(FitsName::parse(path)?),
            hdus: Vec::new(),
        })
    }

    /// Append an HDU, assigning the next index.
    ///
    /// The first HDU becomes the primary HDU and later ones become
    /// extensions; image HDUs are converted between the two as needed.
    pub fn push(&mut self, mut hdu: Hdu) -> Result<()> {
        hdu.reposition(self.hdus.len() + 1)?;
        self.hdus.push(hdu);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.hdus.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hdus.is_empty()
    }

    pub fn hdus(&self) -> &[Hdu] {
        &self.hdus
    }

    pub fn iter(&self) -> impl Iterator<Item = &Hdu> {
        self.hdus.iter()
    }

    /// The HDU at 1-based `index`.
    pub fn get(&self, index: usize) -> Option<&Hdu> {
        self.hdu(index)
    }

    /// The first HDU whose `EXTNAME` is `name`.
    pub fn find_by_name(&self, name: &str) -> Option<&Hdu> {
        self.hdu(name)
    }

    /// Look an HDU up by index or name.
    pub fn hdu<D: DescribesHdu>(&self, desc: D) -> Option<&Hdu> {
        desc.position_in(self).map(|i| &self.hdus[i])
    }

    /// Mutable access for header edits.
    pub fn hdu_mut<D: DescribesHdu>(&mut self, desc: D) -> Option<&mut Hdu> {
        desc.position_in(self).map(|i| &mut self.hdus[i])
    }

    pub fn primary(&self) -> Option<&Hdu> {
        self.hdus.first()
    }

    /// Decode every HDU of a block-aligned buffer.
    pub fn decode(buf: &[u8]) -> Result<Self> {
        let table = index_blocks(buf)?;
        let mut hdus = Vec::with_capacity(table.len());
        for (i, p) in table.iter().enumerate() {
            let header = Header::from_bytes(&buf[p.hdr_start..p.hdr_stop])?;
            let data = &buf[p.data_start..p.data_stop];
            let declared = declared_data_len(&header)?;
            if data.len() > declared {
                debug!(
                    "HDU {}: {} bytes after the declared data are padding",
                    i + 1,
                    data.len() - declared
                );
            }
            hdus.push(Hdu::decode(i + 1, header, data)?);
        }
        debug!("decoded {} HDUs from {} bytes", hdus.len(), buf.len());
        Ok(Self { name: None, hdus })
    }

    /// Encode every HDU and check the total against the expected block count.
    pub fn encode(&self) -> Result<Vec<u8>> {
        if self.hdus.is_empty() {
            return Err(Error::EmptyFile);
        }
        let mut expected = 0;
        let mut out = Vec::new();
        for hdu in &self.hdus {
            expected += hdu.encoded_len()?;
            out.extend_from_slice(&hdu.encode()?);
        }
        if out.len() != expected {
            return Err(Error::SizeMismatch {
                expected,
                actual: out.len(),
            });
        }
        debug!("encoded {} HDUs into {} bytes", self.hdus.len(), out.len());
        Ok(out)
    }

    /// Read and decode the file at `path`.
    pub fn read<P: AsRef<Path>>(path: P) -> Result<Self> {
        let bytes = io::read_all(path.as_ref())?;
        let mut file = Self::decode(&bytes)?;
        file.name = FitsName::parse(path).ok();
        Ok(file)
    }

    /// Encode in memory, then write to `path` in one step.
    pub fn write<P: AsRef<Path>>(&self, path: P, overwrite: bool) -> Result<()> {
        let bytes = self.encode()?;
        io::write_all(path, &bytes, overwrite)
    }

    /// Write to the path given by [`FitsFile::name`].
    pub fn save(&self, overwrite: bool) -> Result<()> {
        let name = self
            .name
            .as_ref()
            .ok_or(Error::InvalidHeader("file has no name"))?;
        name.check_writable(overwrite)?;
        self.write(name.path(), overwrite)
    }
}
