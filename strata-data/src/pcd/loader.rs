//! Random-access point loading.
//!
//! Every load returns points in exactly the order of the requested ids.
//! - binary: one seek and read per id, chunks read in parallel;
//! - ascii: ids are sorted once and served by a single forward scan;
//! - binary_compressed: the whole blob is decoded once, then gathered.

use crate::error::{FormatError, LoadError, LzfError};
use crate::lzf::{LzfDecoder, SoaAssembler};
use crate::pcd::color;
use crate::pcd::header::{ColorChannels, DataEncoding, Header, ScalarType};
use crate::pcd::index::{
    AsciiIndex, BinaryLayout, CompressedLayout, FormatIndex, IndexWarning, RowReader,
};
use crate::types::{GpuPoint, PointBatch, PointId};
use glam::Vec3;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{self, BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const READ_BUFFER: usize = 64 * 1024;
/// Ids per parallel binary read job.
const PARALLEL_CHUNK: usize = 4096;

/// Options applied when opening a file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoaderOptions {
    /// ASCII rows per indexed offset. 1 gives exact random access; larger
    /// values trade index memory for a bounded forward scan.
    pub ascii_stride: usize,
}

impl Default for LoaderOptions {
    fn default() -> Self {
        Self { ascii_stride: 16 }
    }
}

impl LoaderOptions {
    pub fn with_ascii_stride(mut self, stride: usize) -> Self {
        self.ascii_stride = stride;
        self
    }
}

/// Where x/y/z and color live in a record.
#[derive(Debug, Clone)]
struct Columns {
    /// Field index of x, y and z.
    axes: [usize; 3],
    color: Option<(usize, ColorChannels)>,
    /// First ASCII token of each field.
    tokens: Vec<usize>,
}

impl Columns {
    fn new(header: &Header) -> Result<Self, LoadError> {
        let axis = |name: &'static str| {
            header
                .field_index(name)
                .ok_or(FormatError::MissingCoordinate(name))
        };
        let axes = [axis("x")?, axis("y")?, axis("z")?];
        let mut tokens = Vec::with_capacity(header.fields.len());
        let mut next = 0;
        for field in &header.fields {
            tokens.push(next);
            next += field.count;
        }
        Ok(Self {
            axes,
            color: header.color_field(),
            tokens,
        })
    }
}

/// Loader over one opened point file.
///
/// The header and index are built once in [`open`](Self::open) and never
/// change. Each load opens its own file handle, so a loader can be shared
/// between worker threads behind an `Arc`.
#[derive(Debug, Clone)]
pub struct PointLoader {
    path: PathBuf,
    header: Header,
    index: FormatIndex,
    warnings: Vec<IndexWarning>,
    columns: Columns,
}

impl PointLoader {
    /// Parse the header and build the format index.
    #[tracing::instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn open(path: impl AsRef<Path>, options: &LoaderOptions) -> Result<Self, LoadError> {
        let path = path.as_ref().to_path_buf();
        let mut reader = BufReader::with_capacity(READ_BUFFER, File::open(&path)?);
        let header = Header::parse(&mut reader)?;
        let (index, warnings) = FormatIndex::build(&mut reader, &header, options.ascii_stride)?;
        let columns = Columns::new(&header)?;
        info!(
            "Opened {}: {} {} points ({} declared), {} fields",
            path.display(),
            index.point_count(),
            header.encoding,
            header.points,
            header.fields.len()
        );
        Ok(Self {
            path,
            header,
            index,
            warnings,
            columns,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    pub fn index(&self) -> &FormatIndex {
        &self.index
    }

    /// Warnings raised while indexing.
    pub fn warnings(&self) -> &[IndexWarning] {
        &self.warnings
    }

    pub fn encoding(&self) -> DataEncoding {
        self.header.encoding
    }

    /// Usable point count.
    pub fn point_count(&self) -> usize {
        self.index.point_count()
    }

    pub fn has_color(&self) -> bool {
        self.columns.color.is_some()
    }

    /// Ids at equal logical stride across `[0, N)`, at most `target` of them.
    pub fn uniform_sample(&self, target: usize) -> Vec<PointId> {
        uniform_ids(self.point_count(), target)
    }

    /// Load the given points. `ids` may be unsorted and contain duplicates.
    #[tracing::instrument(skip_all, fields(count = ids.len()))]
    pub fn load_points(&self, ids: &[PointId]) -> Result<PointBatch, LoadError> {
        let count = self.point_count();
        if let Some(&id) = ids.iter().find(|&&id| id as usize >= count) {
            return Err(LoadError::IdOutOfRange { id, count });
        }
        if ids.is_empty() {
            return Ok(PointBatch::new(Vec::new(), self.has_color().then(Vec::new)));
        }

        let (positions, colors) = match &self.index {
            FormatIndex::Binary(layout) => self.load_binary(layout, ids)?,
            FormatIndex::Ascii(index) => self.load_ascii(index, ids)?,
            FormatIndex::Compressed(layout) => self.load_compressed(layout, ids)?,
        };
        debug!("Loaded {} points", positions.len());
        Ok(PointBatch::new(positions, colors))
    }

    /// Stream every point to `sink` in batches of at most `batch_size`.
    ///
    /// Compressed files go through the chunked decoder and SoA assembler, so
    /// the full uncompressed payload is never held in memory. Returns the
    /// number of points delivered.
    #[tracing::instrument(skip_all, fields(batch_size))]
    pub fn stream_all<F>(&self, batch_size: usize, mut sink: F) -> Result<usize, LoadError>
    where
        F: FnMut(&[GpuPoint]),
    {
        let batch_size = batch_size.max(1);
        if let FormatIndex::Compressed(layout) = &self.index {
            return self.stream_compressed(layout, batch_size, sink);
        }

        let total = self.point_count();
        let mut start = 0usize;
        while start < total {
            let end = total.min(start + batch_size);
            let ids: Vec<PointId> = (start as PointId..end as PointId).collect();
            let batch = self.load_points(&ids)?;
            sink(&batch.to_gpu_points());
            start = end;
        }
        Ok(total)
    }

    fn load_binary(
        &self,
        layout: &BinaryLayout,
        ids: &[PointId],
    ) -> Result<(Vec<Vec3>, Option<Vec<u32>>), LoadError> {
        let parts = ids
            .par_chunks(PARALLEL_CHUNK)
            .map(|chunk| self.read_binary_records(layout, chunk))
            .collect::<Result<Vec<_>, LoadError>>()?;

        let mut positions = Vec::with_capacity(ids.len());
        let mut colors = self.has_color().then(|| Vec::with_capacity(ids.len()));
        for (part_positions, part_colors) in parts {
            positions.extend(part_positions);
            if let (Some(all), Some(part)) = (&mut colors, part_colors) {
                all.extend(part);
            }
        }
        Ok((positions, colors))
    }

    fn read_binary_records(
        &self,
        layout: &BinaryLayout,
        ids: &[PointId],
    ) -> Result<(Vec<Vec3>, Option<Vec<u32>>), LoadError> {
        let mut reader = BufReader::with_capacity(READ_BUFFER, File::open(&self.path)?);
        let mut cursor = 0u64;
        let mut record = vec![0u8; layout.stride];
        let mut positions = Vec::with_capacity(ids.len());
        let mut colors = self.columns.color.map(|_| Vec::with_capacity(ids.len()));

        for &id in ids {
            let offset = self.header.data_offset + id as u64 * layout.stride as u64;
            if offset != cursor {
                let delta = offset as i64 - cursor as i64;
                if cursor > 0 && delta > 0 && delta < READ_BUFFER as i64 {
                    reader.seek_relative(delta)?;
                } else {
                    reader.seek(SeekFrom::Start(offset))?;
                }
            }
            reader.read_exact(&mut record)?;
            cursor = offset + layout.stride as u64;

            let axis = |i: usize| {
                let field = self.columns.axes[i];
                let at = layout.field_offsets[field];
                self.header.fields[field].ty.decode(&record[at..]) as f32
            };
            positions.push(Vec3::new(axis(0), axis(1), axis(2)));
            if let (Some(colors), Some((field, channels))) = (&mut colors, self.columns.color) {
                let at = layout.field_offsets[field];
                let bits = u32::from_le_bytes([
                    record[at],
                    record[at + 1],
                    record[at + 2],
                    record[at + 3],
                ]);
                colors.push(color::pack(bits, channels));
            }
        }
        Ok((positions, colors))
    }

    fn load_ascii(
        &self,
        index: &AsciiIndex,
        ids: &[PointId],
    ) -> Result<(Vec<Vec3>, Option<Vec<u32>>), LoadError> {
        // Stable sort keeps duplicate ids in caller order.
        let mut order: Vec<usize> = (0..ids.len()).collect();
        order.sort_by_key(|&i| ids[i]);

        let mut positions = vec![Vec3::ZERO; ids.len()];
        let mut colors = self.columns.color.map(|_| vec![0u32; ids.len()]);

        let first = ids[order[0]] as usize;
        let (mut row, start) = index
            .bucket(first)
            .ok_or(LoadError::IdOutOfRange {
                id: first as PointId,
                count: index.rows,
            })?;
        let mut reader = BufReader::with_capacity(READ_BUFFER, File::open(&self.path)?);
        reader.seek(SeekFrom::Start(start))?;
        let mut rows = RowReader::new(&mut reader, start);

        let mut k = 0;
        while k < order.len() {
            let target = ids[order[k]] as usize;
            if let Some((bucket_row, offset)) = index.bucket(target) {
                // Skip ahead only when it saves more than a buffer refill.
                if bucket_row > row && offset > rows.position() + READ_BUFFER as u64 {
                    rows.seek_to(offset)?;
                    row = bucket_row;
                }
            }
            while row <= target {
                if rows.next_row()?.is_none() {
                    return Err(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        format!("data ended before row {target}"),
                    )
                    .into());
                }
                row += 1;
            }

            let (position, packed) = self.parse_row(rows.current(), target)?;
            while k < order.len() && ids[order[k]] as usize == target {
                let slot = order[k];
                positions[slot] = position;
                if let (Some(colors), Some(packed)) = (&mut colors, packed) {
                    colors[slot] = packed;
                }
                k += 1;
            }
        }
        Ok((positions, colors))
    }

    fn parse_row(&self, line: &[u8], row: usize) -> Result<(Vec3, Option<u32>), LoadError> {
        let parse_error = |reason: String| LoadError::Parse { row, reason };
        let text = std::str::from_utf8(line).map_err(|e| parse_error(e.to_string()))?;
        let tokens: Vec<&str> = text.split_ascii_whitespace().collect();
        let token = |field: usize| {
            let at = self.columns.tokens[field];
            tokens.get(at).copied().ok_or_else(|| {
                parse_error(format!("expected at least {} tokens, found {}", at + 1, tokens.len()))
            })
        };

        let mut xyz = [0f32; 3];
        for (value, field) in xyz.iter_mut().zip(self.columns.axes) {
            let t = token(field)?;
            *value = t
                .parse::<f32>()
                .map_err(|_| parse_error(format!("bad coordinate '{t}'")))?;
        }
        let packed = match self.columns.color {
            Some((field, channels)) => {
                let t = token(field)?;
                let bits = color::parse_token(t)
                    .ok_or_else(|| parse_error(format!("bad color '{t}'")))?;
                Some(color::pack(bits, channels))
            }
            None => None,
        };
        Ok((Vec3::from_array(xyz), packed))
    }

    fn load_compressed(
        &self,
        layout: &CompressedLayout,
        ids: &[PointId],
    ) -> Result<(Vec<Vec3>, Option<Vec<u32>>), LoadError> {
        let payload = self.decode_payload(layout)?;
        if (payload.len() as u64) < layout.total_bytes {
            return Err(LoadError::ShortPayload {
                expected: layout.total_bytes as usize,
                actual: payload.len(),
            });
        }

        let decode = |field: usize, id: usize| -> f32 {
            let ty: ScalarType = self.header.fields[field].ty;
            ty.decode(&payload[layout.blocks[field].element_range(id)]) as f32
        };
        let [fx, fy, fz] = self.columns.axes;
        let positions = ids
            .iter()
            .map(|&id| {
                let id = id as usize;
                Vec3::new(decode(fx, id), decode(fy, id), decode(fz, id))
            })
            .collect();
        let colors = self.columns.color.map(|(field, channels)| {
            ids.iter()
                .map(|&id| {
                    let e = &payload[layout.blocks[field].element_range(id as usize)];
                    color::pack(u32::from_le_bytes([e[0], e[1], e[2], e[3]]), channels)
                })
                .collect()
        });
        Ok((positions, colors))
    }

    /// Decode the whole compressed blob into memory.
    fn decode_payload(&self, layout: &CompressedLayout) -> Result<Vec<u8>, LoadError> {
        let limit = layout.total_bytes.max(layout.declared_size);
        let mut decoder = LzfDecoder::with_expected_len(limit);
        let mut payload = Vec::with_capacity(layout.total_bytes as usize);
        self.read_blob(layout, |chunk| {
            decoder.consume(chunk, |_, bytes| payload.extend_from_slice(bytes))
        })?;
        decoder.finish()?;
        debug!(
            "Decoded {} compressed bytes into {}",
            layout.compressed_size,
            payload.len()
        );
        Ok(payload)
    }

    fn stream_compressed<F>(
        &self,
        layout: &CompressedLayout,
        batch_size: usize,
        sink: F,
    ) -> Result<usize, LoadError>
    where
        F: FnMut(&[GpuPoint]),
    {
        let limit = layout.total_bytes.max(layout.declared_size);
        let mut decoder = LzfDecoder::with_expected_len(limit);
        let mut assembler = SoaAssembler::new(&self.header, layout, batch_size, sink)?;
        self.read_blob(layout, |chunk| {
            decoder.consume(chunk, |offset, bytes| assembler.on_output(offset, bytes))
        })?;
        let produced = decoder.finish()?;
        if !assembler.is_complete() {
            return Err(LoadError::ShortPayload {
                expected: layout.total_bytes as usize,
                actual: produced as usize,
            });
        }
        Ok(assembler.emitted())
    }

    /// Feed the compressed blob to `on_chunk` in read-buffer sized pieces.
    fn read_blob<F>(&self, layout: &CompressedLayout, mut on_chunk: F) -> Result<(), LoadError>
    where
        F: FnMut(&[u8]) -> Result<(), LzfError>,
    {
        let mut file = File::open(&self.path)?;
        file.seek(SeekFrom::Start(layout.blob_offset))?;
        let mut blob = file.take(layout.compressed_size);
        let mut chunk = vec![0u8; READ_BUFFER];
        loop {
            let n = blob.read(&mut chunk)?;
            if n == 0 {
                break;
            }
            on_chunk(&chunk[..n])?;
        }
        Ok(())
    }
}

/// Ids at equal logical stride across `[0, count)`.
pub fn uniform_ids(count: usize, target: usize) -> Vec<PointId> {
    if target == 0 || count == 0 {
        return Vec::new();
    }
    if target >= count {
        return (0..count as PointId).collect();
    }
    (0..target as u64)
        .map(|i| (i * count as u64 / target as u64) as PointId)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pcd::writer::PcdWriter;
    use std::io::Write;

    fn grid_points(n: usize) -> (Vec<Vec3>, Vec<u32>) {
        let positions = (0..n)
            .map(|i| Vec3::new(i as f32 * 0.5, (i % 17) as f32 - 3.25, (i / 7) as f32 * 1.125))
            .collect();
        let colors = (0..n)
            .map(|i| 0xFF00_0000 | (i as u32).wrapping_mul(2_654_435_761) >> 8)
            .collect();
        (positions, colors)
    }

    fn write_fixture(
        dir: &tempfile::TempDir,
        name: &str,
        encoding: DataEncoding,
        n: usize,
    ) -> (PathBuf, Vec<Vec3>, Vec<u32>) {
        let (positions, colors) = grid_points(n);
        let path = dir.path().join(name);
        PcdWriter::new(encoding)
            .write_file(&path, &positions, Some(colors.as_slice()))
            .unwrap();
        (path, positions, colors)
    }

    #[test]
    fn test_binary_scenario_matches_raw_reads() {
        let dir = tempfile::tempdir().unwrap();
        let (path, _, _) = write_fixture(&dir, "scan.pcd", DataEncoding::Binary, 1000);
        let loader = PointLoader::open(&path, &LoaderOptions::default()).unwrap();
        assert_eq!(loader.point_count(), 1000);
        let FormatIndex::Binary(layout) = loader.index() else { panic!("expected binary") };
        assert_eq!(layout.stride, 16);

        let ids = [999, 0, 500];
        let batch = loader.load_points(&ids).unwrap();
        let raw = std::fs::read(&path).unwrap();
        for (i, id) in ids.iter().enumerate() {
            let at = loader.header().data_offset as usize + *id as usize * layout.stride;
            let read = |k: usize| f32::from_le_bytes(raw[at + 4 * k..at + 4 * k + 4].try_into().unwrap());
            assert_eq!(batch.positions[i], Vec3::new(read(0), read(1), read(2)));
        }
    }

    #[test]
    fn test_full_load_reproduces_file_in_every_encoding() {
        let dir = tempfile::tempdir().unwrap();
        for (name, encoding) in [
            ("a.pcd", DataEncoding::Ascii),
            ("b.pcd", DataEncoding::Binary),
            ("c.pcd", DataEncoding::BinaryCompressed),
        ] {
            let (path, positions, colors) = write_fixture(&dir, name, encoding, 300);
            let loader =
                PointLoader::open(&path, &LoaderOptions::default().with_ascii_stride(8)).unwrap();
            let ids: Vec<PointId> = (0..300).collect();
            let batch = loader.load_points(&ids).unwrap();
            assert_eq!(batch.positions, positions, "{encoding}");
            assert_eq!(batch.colors.as_deref(), Some(colors.as_slice()), "{encoding}");
            assert_eq!(batch.bounds, crate::types::Aabb::from_points(&positions));
        }
    }

    #[test]
    fn test_unsorted_duplicate_ids_keep_caller_order() {
        let dir = tempfile::tempdir().unwrap();
        for (name, encoding) in [
            ("a.pcd", DataEncoding::Ascii),
            ("b.pcd", DataEncoding::Binary),
            ("c.pcd", DataEncoding::BinaryCompressed),
        ] {
            let (path, positions, _) = write_fixture(&dir, name, encoding, 200);
            let loader =
                PointLoader::open(&path, &LoaderOptions::default().with_ascii_stride(3)).unwrap();
            let ids = [150, 3, 150, 77, 0, 199, 3];
            let batch = loader.load_points(&ids).unwrap();
            let expected: Vec<Vec3> = ids.iter().map(|id| positions[*id as usize]).collect();
            assert_eq!(batch.positions, expected, "{encoding}");

            let again = loader.load_points(&ids).unwrap();
            assert_eq!(again, batch, "{encoding} load is idempotent");
        }
    }

    #[test]
    fn test_ascii_sparse_ids_across_buckets() {
        let dir = tempfile::tempdir().unwrap();
        let (path, positions, _) = write_fixture(&dir, "sparse.pcd", DataEncoding::Ascii, 5000);
        let loader =
            PointLoader::open(&path, &LoaderOptions::default().with_ascii_stride(64)).unwrap();
        let ids = [4999, 10, 2500, 64, 63, 65, 4000];
        let batch = loader.load_points(&ids).unwrap();
        for (i, id) in ids.iter().enumerate() {
            assert_eq!(batch.positions[i], positions[*id as usize]);
        }
    }

    #[test]
    fn test_ascii_float_packed_color() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("float_rgb.pcd");
        let packed = 0x00AB_CDEFu32;
        let mut file = File::create(&path).unwrap();
        write!(
            file,
            "FIELDS x y z rgb\nSIZE 4 4 4 4\nTYPE F F F F\nCOUNT 1 1 1 1\nPOINTS 2\nDATA ascii\n1 2 3 {:e}\n4 5 6 255\n",
            f32::from_bits(packed)
        )
        .unwrap();
        drop(file);

        let loader = PointLoader::open(&path, &LoaderOptions::default()).unwrap();
        let batch = loader.load_points(&[0, 1]).unwrap();
        assert_eq!(batch.colors, Some(vec![0xFFAB_CDEF, 0xFF00_00FF]));
        assert_eq!(batch.positions[1], Vec3::new(4.0, 5.0, 6.0));
    }

    #[test]
    fn test_out_of_range_id() {
        let dir = tempfile::tempdir().unwrap();
        let (path, _, _) = write_fixture(&dir, "b.pcd", DataEncoding::Binary, 10);
        let loader = PointLoader::open(&path, &LoaderOptions::default()).unwrap();
        let err = loader.load_points(&[3, 10]).unwrap_err();
        assert!(matches!(err, LoadError::IdOutOfRange { id: 10, count: 10 }));
    }

    #[test]
    fn test_truncated_read_surfaces_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let (path, _, _) = write_fixture(&dir, "b.pcd", DataEncoding::Binary, 100);
        let loader = PointLoader::open(&path, &LoaderOptions::default()).unwrap();
        let len = std::fs::metadata(&path).unwrap().len();
        let file = std::fs::OpenOptions::new().write(true).open(&path).unwrap();
        file.set_len(len - 100).unwrap();
        drop(file);

        let err = loader.load_points(&[99]).unwrap_err();
        assert!(matches!(err, LoadError::Io(e) if e.kind() == io::ErrorKind::UnexpectedEof));
    }

    #[test]
    fn test_truncated_file_clamps_point_count() {
        let dir = tempfile::tempdir().unwrap();
        let (path, _, _) = write_fixture(&dir, "b.pcd", DataEncoding::Binary, 100);
        let len = std::fs::metadata(&path).unwrap().len();
        let file = std::fs::OpenOptions::new().write(true).open(&path).unwrap();
        file.set_len(len - 20).unwrap();
        drop(file);

        let loader = PointLoader::open(&path, &LoaderOptions::default()).unwrap();
        assert_eq!(loader.point_count(), 98);
        assert_eq!(
            loader.warnings(),
            &[IndexWarning::Truncated {
                declared: 100,
                available: 98
            }]
        );
    }

    #[test]
    fn test_corrupt_compressed_blob_fails_load() {
        let dir = tempfile::tempdir().unwrap();
        let (path, _, _) = write_fixture(&dir, "c.pcd", DataEncoding::BinaryCompressed, 50);
        let loader = PointLoader::open(&path, &LoaderOptions::default()).unwrap();
        let FormatIndex::Compressed(layout) = loader.index().clone() else {
            panic!("expected compressed")
        };
        // Replace the first token with a back-reference into empty output.
        let mut bytes = std::fs::read(&path).unwrap();
        bytes[layout.blob_offset as usize] = 0x20;
        bytes[layout.blob_offset as usize + 1] = 0x00;
        std::fs::write(&path, bytes).unwrap();

        let err = loader.load_points(&[0]).unwrap_err();
        assert!(matches!(
            err,
            LoadError::Decompress(LzfError::BackReferenceOutOfRange { .. })
        ));
    }

    #[test]
    fn test_stream_all_batches() {
        let dir = tempfile::tempdir().unwrap();
        for (name, encoding) in [
            ("a.pcd", DataEncoding::Ascii),
            ("b.pcd", DataEncoding::Binary),
            ("c.pcd", DataEncoding::BinaryCompressed),
        ] {
            let (path, positions, colors) = write_fixture(&dir, name, encoding, 257);
            let loader = PointLoader::open(&path, &LoaderOptions::default()).unwrap();
            let mut seen = Vec::new();
            let mut largest = 0;
            let delivered = loader
                .stream_all(50, |batch| {
                    largest = largest.max(batch.len());
                    seen.extend_from_slice(batch);
                })
                .unwrap();
            assert_eq!(delivered, 257);
            assert!(largest <= 50);
            for (i, p) in seen.iter().enumerate() {
                assert_eq!(p.position, positions[i].to_array(), "{encoding}");
                assert_eq!(p.color, colors[i], "{encoding}");
            }
        }
    }

    #[test]
    fn test_uniform_sample() {
        assert_eq!(uniform_ids(10, 5), vec![0, 2, 4, 6, 8]);
        assert_eq!(uniform_ids(3, 10), vec![0, 1, 2]);
        assert!(uniform_ids(0, 10).is_empty());
        let ids = uniform_ids(1_000_003, 1000);
        assert_eq!(ids.len(), 1000);
        assert!(ids.windows(2).all(|w| w[0] < w[1]));
    }
}
