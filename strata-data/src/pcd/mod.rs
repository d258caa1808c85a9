//! PCD point files.
//!
//! A text header is followed by point data in one of three encodings:
//! `ascii` rows, interleaved `binary` records, or an LZF compressed
//! structure-of-arrays blob (`binary_compressed`). [`PointLoader`] serves
//! random-access loads by point id over all three.

pub mod color;
pub mod header;
pub mod index;
pub mod loader;
pub mod writer;

pub use header::{ColorChannels, DataEncoding, Field, Header, ScalarType};
pub use index::{AsciiIndex, BinaryLayout, CompressedLayout, FieldBlock, FormatIndex, IndexWarning};
pub use loader::{LoaderOptions, PointLoader, uniform_ids};
pub use writer::PcdWriter;
