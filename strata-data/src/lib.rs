//! Strata Data Crate
//!
//! Point file parsing, random-access loading and LZF decoding for
//! out-of-core point clouds. This crate is GPU-agnostic: its output is
//! CPU-side batches and interleaved [`GpuPoint`] records.

pub mod error;
pub mod lzf;
pub mod pcd;
pub mod types;

pub use error::{FormatError, LoadError, LzfError};
pub use pcd::{DataEncoding, Header, IndexWarning, LoaderOptions, PcdWriter, PointLoader};
pub use types::{Aabb, DEFAULT_COLOR, GpuPoint, PointBatch, PointId};
