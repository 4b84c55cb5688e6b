//! Codec for block-aligned FITS files.
//!
//! Bytes are indexed into HDUs by [`block`], headers are parsed and formatted
//! card by card by [`card`] and [`header`], and data units go through
//! [`data`] (images) or [`table`]/[`bintable`] (rows). [`hdu`] and
//! [`fitsfile`] tie these together.

pub mod bintable;
pub mod block;
pub mod card;
pub mod column;
pub mod data;
pub mod dictionary;
pub mod error;
pub mod filename;
pub mod fitsfile;
pub mod format;
pub mod hdu;
pub mod header;
pub mod io;
pub mod table;
pub mod value;

pub use block::{index_blocks, BlockPointerTable, BLOCK_SIZE, CARDS_PER_BLOCK, CARD_SIZE};
pub use card::{format_card, parse_card, Card};
pub use column::{Cell, Column, ColumnData, TableData};
pub use data::{ElementType, ImageData};
pub use error::{Error, Result};
pub use fitsfile::FitsFile;
pub use format::{BinaryFormat, DisplayFormat, FormatError};
pub use hdu::{build, parse_table, DataObject, Hdu, HduType, Payload};
pub use header::Header;
pub use value::Value;
