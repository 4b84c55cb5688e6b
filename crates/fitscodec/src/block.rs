//! Block geometry and the HDU pointer index.
//!
//! A FITS stream is a sequence of 2880-byte blocks. Headers occupy whole
//! blocks of 36 fixed 80-byte records; data segments are padded to the next
//! block boundary. [`index_blocks`] walks a block-aligned buffer once and
//! reports where every HDU's header and data live.

use log::{debug, trace};

use crate::error::{Error, Result};

/// FITS block size in bytes.
pub const BLOCK_SIZE: usize = 2880;

/// FITS card (keyword record) size in bytes.
pub const CARD_SIZE: usize = 80;

/// Number of cards that fit in a single block.
pub const CARDS_PER_BLOCK: usize = BLOCK_SIZE / CARD_SIZE;

/// Padding byte for header blocks and ASCII table data (ASCII space).
pub const HEADER_PAD_BYTE: u8 = 0x20;

/// Padding byte for binary data blocks.
pub const DATA_PAD_BYTE: u8 = 0x00;

const SIMPLE_MARK: &[u8; 8] = b"SIMPLE  ";
const XTENSION_MARK: &[u8; 8] = b"XTENSION";
const END_MARK: &[u8; 8] = b"END     ";

/// Returns the number of blocks required to hold `num_bytes` bytes.
///
/// 0 bytes requires 0 blocks, 1..=2880 bytes require 1 block, and so on.
pub const fn blocks_needed(num_bytes: usize) -> usize {
    num_bytes.div_ceil(BLOCK_SIZE)
}

/// Returns `num_bytes` rounded up to a whole number of blocks.
pub const fn padded_byte_len(num_bytes: usize) -> usize {
    blocks_needed(num_bytes) * BLOCK_SIZE
}

/// Extends `buf` with `pad_byte` until its length is a multiple of [`BLOCK_SIZE`].
pub fn pad_to_block(buf: &mut Vec<u8>, pad_byte: u8) {
    let target = padded_byte_len(buf.len());
    buf.resize(target, pad_byte);
}

/// Byte and block offsets of one HDU inside a buffer.
///
/// All ranges are half-open: `start` is the first byte, `stop` is one past
/// the last byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HduPointers {
    /// Index of the first block of the HDU.
    pub block_start: usize,
    /// Index one past the last block of the HDU.
    pub block_stop: usize,
    pub hdu_start: usize,
    pub hdu_stop: usize,
    pub hdr_start: usize,
    pub hdr_stop: usize,
    pub data_start: usize,
    pub data_stop: usize,
}

impl HduPointers {
    /// Length of the header in bytes (a whole number of blocks).
    pub fn header_len(&self) -> usize {
        self.hdr_stop - self.hdr_start
    }

    /// Length of the data span in bytes, including padding.
    pub fn data_len(&self) -> usize {
        self.data_stop - self.data_start
    }
}

/// Block/HDU/header/data offsets for every HDU of a buffer.
///
/// Derived from a buffer and never mutated; rebuild it when the buffer changes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlockPointerTable {
    entries: Vec<HduPointers>,
    num_blocks: usize,
}

impl BlockPointerTable {
    /// Number of HDUs found.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Total number of blocks in the indexed buffer.
    pub fn num_blocks(&self) -> usize {
        self.num_blocks
    }

    /// Pointers for the HDU at 0-based position `i`.
    pub fn get(&self, i: usize) -> Option<&HduPointers> {
        self.entries.get(i)
    }

    pub fn iter(&self) -> impl Iterator<Item = &HduPointers> {
        self.entries.iter()
    }

    pub fn hdu_starts(&self) -> Vec<usize> {
        self.entries.iter().map(|p| p.hdu_start).collect()
    }

    pub fn data_starts(&self) -> Vec<usize> {
        self.entries.iter().map(|p| p.data_start).collect()
    }
}

fn block_mark(buf: &[u8], block: usize) -> &[u8] {
    let start = block * BLOCK_SIZE;
    &buf[start..start + 8]
}

fn is_header_start(mark: &[u8]) -> bool {
    mark == SIMPLE_MARK || mark == XTENSION_MARK
}

/// Returns `true` if any record in the block starts with `END     `.
fn block_has_end(buf: &[u8], block: usize) -> bool {
    let start = block * BLOCK_SIZE;
    buf[start..start + BLOCK_SIZE]
        .chunks_exact(CARD_SIZE)
        .any(|record| &record[..8] == END_MARK)
}

/// Scan a block-aligned buffer and locate every HDU.
///
/// The first block must begin with `SIMPLE`. Every later block that begins
/// with `SIMPLE` or `XTENSION` and lies outside a header starts a new HDU.
/// The first block containing an `END` record closes the header; the data
/// span runs from there to the next HDU (or the end of the buffer).
pub fn index_blocks(buf: &[u8]) -> Result<BlockPointerTable> {
    if buf.is_empty() {
        return Err(Error::EmptyFile);
    }
    if buf.len() % BLOCK_SIZE != 0 {
        return Err(Error::MisalignedFile { len: buf.len() });
    }
    let num_blocks = buf.len() / BLOCK_SIZE;
    if block_mark(buf, 0) != SIMPLE_MARK {
        return Err(Error::InvalidHeader("first block does not begin with SIMPLE"));
    }

    // Pass 1: header start candidates.
    let starts: Vec<usize> = (0..num_blocks)
        .filter(|&b| is_header_start(block_mark(buf, b)))
        .collect();

    // Pass 2: END detection, skipping candidates that fall inside a header.
    let mut hdus: Vec<(usize, usize)> = Vec::new();
    let mut next_free = 0;
    for &start in &starts {
        if start < next_free {
            continue;
        }
        let end_block = (start..num_blocks)
            .find(|&b| block_has_end(buf, b))
            .ok_or(Error::TruncatedHeader)?;
        trace!("header at block {start} ends in block {end_block}");
        hdus.push((start, end_block + 1));
        next_free = end_block + 1;
    }

    let mut entries = Vec::with_capacity(hdus.len());
    for (i, &(hdr_block, data_block)) in hdus.iter().enumerate() {
        let stop_block = hdus.get(i + 1).map(|&(s, _)| s).unwrap_or(num_blocks);
        entries.push(HduPointers {
            block_start: hdr_block,
            block_stop: stop_block,
            hdu_start: hdr_block * BLOCK_SIZE,
            hdu_stop: stop_block * BLOCK_SIZE,
            hdr_start: hdr_block * BLOCK_SIZE,
            hdr_stop: data_block * BLOCK_SIZE,
            data_start: data_block * BLOCK_SIZE,
            data_stop: stop_block * BLOCK_SIZE,
        });
    }

    debug!(
        "indexed {} HDUs across {} blocks",
        entries.len(),
        num_blocks
    );
    Ok(BlockPointerTable {
        entries,
        num_blocks,
    })
}
