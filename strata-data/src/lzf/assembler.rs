//! Structure-of-arrays to interleaved record reassembly.

use crate::error::FormatError;
use crate::pcd::color;
use crate::pcd::header::{ColorChannels, Header, ScalarType};
use crate::pcd::index::{CompressedLayout, FieldBlock};
use crate::types::{DEFAULT_COLOR, GpuPoint};
use tracing::trace;

/// Decoded bytes collected for one field.
struct Track {
    block: FieldBlock,
    ty: ScalarType,
    /// Element bytes for points `first..first + bytes.len() / element_size`.
    bytes: Vec<u8>,
    first: usize,
}

impl Track {
    fn new(block: FieldBlock, ty: ScalarType) -> Self {
        Self {
            block,
            ty,
            bytes: Vec::new(),
            first: 0,
        }
    }

    /// Append the part of an output event that falls inside this block.
    fn accept(&mut self, offset: u64, data: &[u8], points: usize) {
        let block_end = self.block.start + (self.block.element_size * points) as u64;
        let event_end = offset + data.len() as u64;
        let start = offset.max(self.block.start);
        let end = event_end.min(block_end);
        if start < end {
            let lo = (start - offset) as usize;
            let hi = (end - offset) as usize;
            self.bytes.extend_from_slice(&data[lo..hi]);
        }
    }

    /// Points whose element is fully available.
    fn available(&self) -> usize {
        self.first + self.bytes.len() / self.block.element_size
    }

    fn element(&self, id: usize) -> &[u8] {
        let at = (id - self.first) * self.block.element_size;
        &self.bytes[at..at + self.block.element_size]
    }

    fn value(&self, id: usize) -> f32 {
        self.ty.decode(self.element(id)) as f32
    }

    /// Drop elements before point `id`.
    fn release(&mut self, id: usize) {
        let drop = (id - self.first) * self.block.element_size;
        self.bytes.drain(..drop);
        self.first = id;
    }
}

/// Rebuilds interleaved [`GpuPoint`] records from decoded SoA output.
///
/// Feed it the `(offset, bytes)` events from an
/// [`LzfDecoder`](crate::lzf::LzfDecoder). Each time every required field
/// (x, y, z and a packed color when present) has bytes for the next run of
/// points, that run is interleaved and handed to the sink in batches of at
/// most `batch_size` points.
pub struct SoaAssembler<F: FnMut(&[GpuPoint])> {
    axes: [Track; 3],
    color: Option<(Track, ColorChannels)>,
    points: usize,
    emitted: usize,
    batch_size: usize,
    batch: Vec<GpuPoint>,
    sink: F,
}

impl<F: FnMut(&[GpuPoint])> SoaAssembler<F> {
    pub fn new(
        header: &Header,
        layout: &CompressedLayout,
        batch_size: usize,
        sink: F,
    ) -> Result<Self, FormatError> {
        let track = |name: &'static str| -> Result<Track, FormatError> {
            let index = header
                .field_index(name)
                .ok_or(FormatError::MissingCoordinate(name))?;
            Ok(Track::new(layout.blocks[index], header.fields[index].ty))
        };
        let axes = [track("x")?, track("y")?, track("z")?];
        let color = header.color_field().map(|(index, channels)| {
            (
                Track::new(layout.blocks[index], header.fields[index].ty),
                channels,
            )
        });
        let batch_size = batch_size.max(1);

        Ok(Self {
            axes,
            color,
            points: layout.points,
            emitted: 0,
            batch_size,
            batch: Vec::with_capacity(batch_size.min(layout.points)),
            sink,
        })
    }

    /// Handle one decoder output event.
    pub fn on_output(&mut self, offset: u64, data: &[u8]) {
        for track in &mut self.axes {
            track.accept(offset, data, self.points);
        }
        if let Some((track, _)) = &mut self.color {
            track.accept(offset, data, self.points);
        }
        self.drain();
    }

    /// Points handed to the sink so far.
    pub fn emitted(&self) -> usize {
        self.emitted
    }

    /// True once every point has been emitted.
    pub fn is_complete(&self) -> bool {
        self.emitted == self.points
    }

    fn ready(&self) -> usize {
        let mut ready = self.points;
        for track in &self.axes {
            ready = ready.min(track.available());
        }
        if let Some((track, _)) = &self.color {
            ready = ready.min(track.available());
        }
        ready
    }

    fn drain(&mut self) {
        let ready = self.ready();
        while self.emitted < ready {
            let end = ready.min(self.emitted + self.batch_size);
            self.batch.clear();
            for id in self.emitted..end {
                let position = [
                    self.axes[0].value(id),
                    self.axes[1].value(id),
                    self.axes[2].value(id),
                ];
                let color = match &self.color {
                    Some((track, channels)) => {
                        let e = track.element(id);
                        color::pack(u32::from_le_bytes([e[0], e[1], e[2], e[3]]), *channels)
                    }
                    None => DEFAULT_COLOR,
                };
                self.batch.push(GpuPoint { position, color });
            }
            trace!("Assembled points {}..{}", self.emitted, end);
            (self.sink)(&self.batch);
            self.emitted = end;
        }

        for track in &mut self.axes {
            track.release(self.emitted);
        }
        if let Some((track, _)) = &mut self.color {
            track.release(self.emitted);
        }
    }
}
