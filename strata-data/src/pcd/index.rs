//! Mode-specific data layout built once per opened file.

use crate::error::FormatError;
use crate::pcd::header::{DataEncoding, Header, read_line};
use std::io::{BufRead, Read, Seek, SeekFrom};
use tracing::{debug, warn};

/// Non-fatal problems found while indexing a file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexWarning {
    /// The file holds fewer points than the header declares; the usable
    /// count was clamped down.
    Truncated { declared: usize, available: usize },
    /// The compressed block declares an uncompressed size that differs from
    /// the size computed from the field layout; the computed layout is used.
    SizeMismatch { declared: u64, computed: u64 },
}

impl std::fmt::Display for IndexWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IndexWarning::Truncated {
                declared,
                available,
            } => write!(f, "file truncated: {declared} points declared, {available} usable"),
            IndexWarning::SizeMismatch { declared, computed } => write!(
                f,
                "compressed block declares {declared} bytes, layout needs {computed}"
            ),
        }
    }
}

/// Line-start offsets for ASCII data.
#[derive(Debug, Clone, PartialEq)]
pub struct AsciiIndex {
    /// Byte offset of every `stride`-th data row, starting with row 0.
    pub offsets: Vec<u64>,
    /// Rows per offset entry. 1 means every row is indexed.
    pub stride: usize,
    /// Number of data rows found.
    pub rows: usize,
}

impl AsciiIndex {
    /// Nearest indexed row at or before `row`, and its byte offset.
    pub fn bucket(&self, row: usize) -> Option<(usize, u64)> {
        let slot = row / self.stride;
        self.offsets.get(slot).map(|offset| (slot * self.stride, *offset))
    }
}

/// Fixed-stride record layout for binary data.
#[derive(Debug, Clone, PartialEq)]
pub struct BinaryLayout {
    /// Bytes per record.
    pub stride: usize,
    /// Offset of each field within a record, in declared field order.
    pub field_offsets: Vec<usize>,
    /// Usable point count.
    pub points: usize,
}

/// One field's contiguous block inside the uncompressed SoA payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldBlock {
    /// Byte offset of the block within the uncompressed payload.
    pub start: u64,
    /// Bytes per point for this field (`size * count`).
    pub element_size: usize,
}

impl FieldBlock {
    /// Byte range `[start, end)` for one point's element.
    pub fn element_range(&self, id: usize) -> std::ops::Range<usize> {
        let start = self.start as usize + id * self.element_size;
        start..start + self.element_size
    }
}

/// Location and structure-of-arrays layout of compressed data.
#[derive(Debug, Clone, PartialEq)]
pub struct CompressedLayout {
    /// File offset of the first compressed byte (after the two size words).
    pub blob_offset: u64,
    pub compressed_size: u64,
    /// Uncompressed size as declared in the file.
    pub declared_size: u64,
    /// Per-field blocks, in declared field order.
    pub blocks: Vec<FieldBlock>,
    /// Total uncompressed bytes implied by the layout.
    pub total_bytes: u64,
    pub points: usize,
}

/// Mode-specific index over a file's point data.
#[derive(Debug, Clone, PartialEq)]
pub enum FormatIndex {
    Ascii(AsciiIndex),
    Binary(BinaryLayout),
    Compressed(CompressedLayout),
}

impl FormatIndex {
    /// Build the index for `header`'s encoding.
    ///
    /// `ascii_stride` controls how many rows share one offset entry in ASCII
    /// mode and is ignored otherwise. Warnings are logged and returned.
    #[tracing::instrument(skip_all, fields(encoding = %header.encoding))]
    pub fn build<R: BufRead + Seek>(
        reader: &mut R,
        header: &Header,
        ascii_stride: usize,
    ) -> Result<(FormatIndex, Vec<IndexWarning>), FormatError> {
        let mut warnings = Vec::new();
        let index = match header.encoding {
            DataEncoding::Ascii => {
                FormatIndex::Ascii(build_ascii(reader, header, ascii_stride, &mut warnings)?)
            }
            DataEncoding::Binary => {
                FormatIndex::Binary(build_binary(reader, header, &mut warnings)?)
            }
            DataEncoding::BinaryCompressed => {
                FormatIndex::Compressed(build_compressed(reader, header, &mut warnings)?)
            }
        };
        Ok((index, warnings))
    }

    /// Usable point count after any truncation clamp.
    pub fn point_count(&self) -> usize {
        match self {
            FormatIndex::Ascii(index) => index.rows,
            FormatIndex::Binary(layout) => layout.points,
            FormatIndex::Compressed(layout) => layout.points,
        }
    }
}

fn build_ascii<R: BufRead + Seek>(
    reader: &mut R,
    header: &Header,
    stride: usize,
    warnings: &mut Vec<IndexWarning>,
) -> Result<AsciiIndex, FormatError> {
    let stride = stride.max(1);
    reader.seek(SeekFrom::Start(header.data_offset))?;

    let mut rows = RowReader::new(reader, header.data_offset);
    let mut offsets = Vec::with_capacity(header.points / stride + 1);
    let mut count = 0usize;
    while count < header.points {
        let Some(offset) = rows.next_row()? else { break };
        if count % stride == 0 {
            offsets.push(offset);
        }
        count += 1;
    }

    if count < header.points {
        warn!(
            "ASCII data holds {} rows but header declares {}; clamping",
            count, header.points
        );
        warnings.push(IndexWarning::Truncated {
            declared: header.points,
            available: count,
        });
    }

    debug!("Indexed {} ASCII rows ({} offsets)", count, offsets.len());
    Ok(AsciiIndex {
        offsets,
        stride,
        rows: count,
    })
}

fn build_binary<R: Seek>(
    reader: &mut R,
    header: &Header,
    warnings: &mut Vec<IndexWarning>,
) -> Result<BinaryLayout, FormatError> {
    let mut field_offsets = Vec::with_capacity(header.fields.len());
    let mut stride = 0usize;
    for field in &header.fields {
        field_offsets.push(stride);
        stride += field.byte_len();
    }

    let file_len = reader.seek(SeekFrom::End(0))?;
    let available_bytes = file_len.saturating_sub(header.data_offset);
    let mut points = header.points;
    let needed = stride as u64 * points as u64;
    if stride > 0 && available_bytes < needed {
        let available = (available_bytes / stride as u64) as usize;
        warn!(
            "Binary data holds {} bytes, header implies {}; clamping {} points to {}",
            available_bytes, needed, points, available
        );
        warnings.push(IndexWarning::Truncated {
            declared: points,
            available,
        });
        points = available;
    }

    Ok(BinaryLayout {
        stride,
        field_offsets,
        points,
    })
}

fn build_compressed<R: Read + Seek>(
    reader: &mut R,
    header: &Header,
    warnings: &mut Vec<IndexWarning>,
) -> Result<CompressedLayout, FormatError> {
    reader.seek(SeekFrom::Start(header.data_offset))?;
    let mut words = [0u8; 8];
    reader.read_exact(&mut words)?;
    let compressed_size = u32::from_le_bytes([words[0], words[1], words[2], words[3]]) as u64;
    let declared_size = u32::from_le_bytes([words[4], words[5], words[6], words[7]]) as u64;
    let blob_offset = header.data_offset + 8;

    let points = header.points;
    let mut blocks = Vec::with_capacity(header.fields.len());
    let mut start = 0u64;
    for field in &header.fields {
        blocks.push(FieldBlock {
            start,
            element_size: field.byte_len(),
        });
        start += field.byte_len() as u64 * points as u64;
    }
    let total_bytes = start;

    if total_bytes != declared_size {
        warn!(
            "Compressed block declares {} uncompressed bytes, layout needs {}; using layout",
            declared_size, total_bytes
        );
        warnings.push(IndexWarning::SizeMismatch {
            declared: declared_size,
            computed: total_bytes,
        });
    }

    let file_len = reader.seek(SeekFrom::End(0))?;
    if file_len < blob_offset + compressed_size {
        warn!(
            "Compressed blob declares {} bytes but only {} remain",
            compressed_size,
            file_len.saturating_sub(blob_offset)
        );
    }

    Ok(CompressedLayout {
        blob_offset,
        compressed_size,
        declared_size,
        blocks,
        total_bytes,
        points,
    })
}

/// Forward reader over ASCII data rows.
///
/// Blank lines are skipped so that row numbering matches the logical point
/// sequence. Tracks the absolute byte offset of each returned row.
pub(crate) struct RowReader<'a, R> {
    reader: &'a mut R,
    position: u64,
    line: Vec<u8>,
}

impl<'a, R: BufRead> RowReader<'a, R> {
    /// `position` must be the reader's current absolute offset.
    pub(crate) fn new(reader: &'a mut R, position: u64) -> Self {
        Self {
            reader,
            position,
            line: Vec::new(),
        }
    }

    /// Advance to the next non-blank row and return its start offset.
    pub(crate) fn next_row(&mut self) -> std::io::Result<Option<u64>> {
        loop {
            self.line.clear();
            let start = self.position;
            let consumed = read_line(self.reader, &mut self.line)?;
            if consumed == 0 {
                return Ok(None);
            }
            self.position += consumed;
            if self.line.iter().any(|b| !b.is_ascii_whitespace()) {
                return Ok(Some(start));
            }
        }
    }

    /// Text of the row most recently returned by [`next_row`](Self::next_row).
    pub(crate) fn current(&self) -> &[u8] {
        &self.line
    }

    /// Absolute offset of the next unread byte.
    pub(crate) fn position(&self) -> u64 {
        self.position
    }
}

impl<R: BufRead + Seek> RowReader<'_, R> {
    /// Reposition to an absolute offset that starts a row.
    pub(crate) fn seek_to(&mut self, offset: u64) -> std::io::Result<()> {
        if offset != self.position {
            self.reader.seek(SeekFrom::Start(offset))?;
            self.position = offset;
        }
        Ok(())
    }
}
