//! Subcommand implementations.

use crate::camera::OrbitCamera;
use crate::config::AppConfig;
use crate::errors::AppError;
use std::collections::HashMap;
use std::path::Path;
use std::time::{Duration, Instant};
use strata_data::pcd::FormatIndex;
use strata_data::{DataEncoding, GpuPoint, LoaderOptions, PcdWriter, PointId, PointLoader};
use strata_stream::{NodeId, StreamingSession, UploadSink};
use tracing::info;

/// Print the header, index layout and indexing warnings of a file.
pub fn info(path: &Path, ascii_stride: usize) -> Result<(), AppError> {
    let loader = PointLoader::open(path, &LoaderOptions::default().with_ascii_stride(ascii_stride))?;
    let header = loader.header();
    println!("file:      {}", path.display());
    println!("encoding:  {}", header.encoding);
    println!(
        "fields:    {}",
        header
            .fields
            .iter()
            .map(|f| format!("{}:{}{}x{}", f.name, f.ty.tag(), f.ty.size(), f.count))
            .collect::<Vec<_>>()
            .join(" ")
    );
    println!("points:    {} declared, {} usable", header.points, loader.point_count());
    println!("data at:   byte {}", header.data_offset);
    match loader.index() {
        FormatIndex::Ascii(index) => println!(
            "index:     {} row offsets, stride {}",
            index.offsets.len(),
            index.stride
        ),
        FormatIndex::Binary(layout) => println!(
            "index:     {} byte records, field offsets {:?}",
            layout.stride, layout.field_offsets
        ),
        FormatIndex::Compressed(layout) => println!(
            "index:     {} compressed bytes at {}, {} uncompressed ({} declared)",
            layout.compressed_size, layout.blob_offset, layout.total_bytes, layout.declared_size
        ),
    }
    for warning in loader.warnings() {
        println!("warning:   {warning}");
    }
    Ok(())
}

/// Load a uniform sample and print its bounds.
pub fn sample(path: &Path, count: usize, show: usize) -> Result<(), AppError> {
    let loader = PointLoader::open(path, &LoaderOptions::default())?;
    let ids = loader.uniform_sample(count);
    let started = Instant::now();
    let batch = loader.load_points(&ids)?;
    println!(
        "sampled {} of {} points in {:.1?}",
        batch.len(),
        loader.point_count(),
        started.elapsed()
    );
    println!("bounds: {:?} .. {:?}", batch.bounds.min, batch.bounds.max);
    for (id, point) in ids.iter().zip(batch.to_gpu_points()).take(show) {
        println!("  #{id}: {:?} color {:#010x}", point.position, point.color);
    }
    Ok(())
}

/// Rewrite a file in another encoding.
pub fn convert(input: &Path, output: &Path, encoding: DataEncoding) -> Result<(), AppError> {
    let loader = PointLoader::open(input, &LoaderOptions::default())?;
    let ids: Vec<PointId> = (0..loader.point_count() as PointId).collect();
    let batch = loader.load_points(&ids)?;
    PcdWriter::new(encoding).write_file(output, &batch.positions, batch.colors.as_deref())?;
    println!(
        "converted {} points: {} -> {}",
        batch.len(),
        loader.encoding(),
        encoding
    );
    Ok(())
}

/// Upload sink that only tracks residency.
#[derive(Debug, Default)]
struct ResidentSet {
    resident: HashMap<NodeId, usize>,
    uploaded_points: usize,
    released: usize,
    active: usize,
}

impl ResidentSet {
    fn resident_points(&self) -> usize {
        self.resident.values().sum()
    }
}

impl UploadSink for ResidentSet {
    fn upload(&mut self, node: NodeId, points: &[GpuPoint]) {
        self.uploaded_points += points.len();
        self.resident.insert(node, points.len());
    }

    fn release(&mut self, node: NodeId) {
        self.resident.remove(&node);
        self.released += 1;
    }

    fn active_set_changed(&mut self, active: &[NodeId]) {
        self.active = active.len();
    }
}

/// Drive a streaming session with an orbiting camera.
pub fn simulate(
    path: &Path,
    config: &AppConfig,
    frames: u64,
    frame_time: Duration,
    orbit_step: f32,
) -> Result<(), AppError> {
    let mut session = StreamingSession::open(path, config.session.clone())?;
    let bounds = session
        .octree()
        .roots()
        .iter()
        .filter_map(|r| session.octree().node(*r))
        .fold(strata_data::Aabb::EMPTY, |acc, n| acc.union(&n.bounds));
    let camera = OrbitCamera::framing(&bounds).with_step(orbit_step);
    let mut sink = ResidentSet::default();

    let started = Instant::now();
    for frame in 0..frames {
        let stats = session.tick(&camera.view(frame, frames), &mut sink);
        if frame % 30 == 0 || stats.failed > 0 {
            info!(
                "frame {}: {} nodes, {} active, {} resident points, {} loads pending, {} failed",
                frame,
                session.octree().len(),
                sink.active,
                sink.resident_points(),
                stats.pending,
                stats.failed
            );
        }
        std::thread::sleep(frame_time);
    }

    let nodes = session.octree().len();
    let discarded = session.shutdown();
    println!(
        "{} frames in {:.1?}: {} nodes, {} points uploaded, {} releases, {} resident, {} loads discarded",
        frames,
        started.elapsed(),
        nodes,
        sink.uploaded_points,
        sink.released,
        sink.resident_points(),
        discarded
    );
    Ok(())
}
