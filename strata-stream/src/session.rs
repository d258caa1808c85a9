//! Streaming session: loader, octree and scheduler driven once per frame.
//!
//! Loads run as rayon jobs and report back through a channel that only the
//! session's [`tick`](StreamingSession::tick) drains, so octree and
//! scheduler state are only touched from the caller's thread.

use crate::config::SessionConfig;
use crate::error::SessionError;
use crate::octree::{NodeId, Octree, SampleLookup};
use crate::scheduler::{CompletionHandle, Residency, Scheduler, SchedulerSink, TickReport};
use crate::view::ViewState;
use crossbeam_channel::{Receiver, Sender};
use ordered_float::OrderedFloat;
use std::path::Path;
use std::sync::Arc;
use strata_data::{GpuPoint, LoadError, LoaderOptions, PointBatch, PointLoader};
use tracing::{debug, info, warn};

/// Receiver of loaded point data, typically a GPU buffer manager.
pub trait UploadSink {
    /// Points for `node` are ready.
    fn upload(&mut self, node: NodeId, points: &[GpuPoint]);

    /// Drop everything uploaded for `node`.
    fn release(&mut self, node: NodeId);

    /// Nodes to draw this frame.
    fn active_set_changed(&mut self, _active: &[NodeId]) {}
}

struct LoadResult {
    node: NodeId,
    batch: Result<PointBatch, LoadError>,
}

/// What one session tick did.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionTick {
    /// Batches handed to the upload sink.
    pub uploaded: usize,
    pub failed: usize,
    pub subdivided: usize,
    /// Loads still running after this tick.
    pub pending: usize,
    pub scheduler: TickReport,
}

/// Collects scheduler decisions during a tick.
struct Requests<'a, U: ?Sized> {
    loads: Vec<NodeId>,
    unloads: Vec<NodeId>,
    upload: &'a mut U,
}

impl<U: UploadSink + ?Sized> SchedulerSink for Requests<'_, U> {
    fn request_load(&mut self, node: NodeId) {
        self.loads.push(node);
    }

    fn request_unload(&mut self, node: NodeId) {
        self.upload.release(node);
        self.unloads.push(node);
    }

    fn active_set_changed(&mut self, active: &[NodeId]) {
        self.upload.active_set_changed(active);
    }
}

pub struct StreamingSession {
    config: SessionConfig,
    loader: Arc<PointLoader>,
    octree: Octree,
    lookup: SampleLookup,
    scheduler: Scheduler,
    completions: CompletionHandle,
    results_tx: Sender<LoadResult>,
    results_rx: Receiver<LoadResult>,
    pending: usize,
}

impl StreamingSession {
    /// Open a file, load a uniform preview sample and build the root node
    /// from it. The preview is delivered as the root's content on the first
    /// tick.
    #[tracing::instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn open(path: impl AsRef<Path>, config: SessionConfig) -> Result<Self, SessionError> {
        let options = LoaderOptions::default().with_ascii_stride(config.ascii_index_stride);
        let loader = PointLoader::open(path.as_ref(), &options)?;
        if loader.point_count() == 0 {
            return Err(SessionError::Empty(path.as_ref().to_path_buf()));
        }

        let sample = loader.uniform_sample(config.preview_points);
        let preview = loader.load_points(&sample)?;
        let lookup = SampleLookup::new(sample.clone(), preview.positions.clone());
        let mut octree = Octree::new(config.octree.clone());
        let root = octree.build_initial(sample, &lookup);

        let mut scheduler = Scheduler::new(config.scheduler.clone());
        let completions = scheduler.completion_handle();
        let (results_tx, results_rx) = crossbeam_channel::unbounded();
        scheduler.mark_requested(root);
        let _ = results_tx.send(LoadResult {
            node: root,
            batch: Ok(preview),
        });

        info!(
            "Session ready: {} points, preview of {} as root {}",
            loader.point_count(),
            lookup.len(),
            root
        );
        Ok(Self {
            config,
            loader: Arc::new(loader),
            octree,
            lookup,
            scheduler,
            completions,
            results_tx,
            results_rx,
            pending: 1,
        })
    }

    /// Run one frame: apply finished loads, refine, schedule, dispatch.
    pub fn tick<U>(&mut self, view: &ViewState, upload: &mut U) -> SessionTick
    where
        U: UploadSink + ?Sized,
    {
        let mut stats = SessionTick::default();

        for result in self.results_rx.try_iter() {
            self.pending = self.pending.saturating_sub(1);
            match result.batch {
                Ok(batch) => {
                    upload.upload(result.node, &batch.to_gpu_points());
                    self.completions.notify_loaded(result.node);
                    stats.uploaded += 1;
                }
                Err(e) => {
                    warn!("Load of node {} failed: {}", result.node, e);
                    self.completions.notify_failed(result.node);
                    stats.failed += 1;
                }
            }
        }

        stats.subdivided = self.refine(view);

        let mut requests = Requests {
            loads: Vec::new(),
            unloads: Vec::new(),
            upload,
        };
        stats.scheduler = self.scheduler.tick(&self.octree, view, &mut requests);
        let Requests { loads, unloads, .. } = requests;

        for node in loads {
            self.dispatch(node);
        }
        for node in unloads {
            self.completions.notify_unloaded(node);
        }
        stats.pending = self.pending;
        stats
    }

    /// Stop accepting results. Running loads finish and their results are
    /// discarded. Returns how many were still pending.
    pub fn shutdown(self) -> usize {
        info!("Shutting down session with {} loads pending", self.pending);
        drop(self.results_rx);
        self.pending
    }

    pub fn octree(&self) -> &Octree {
        &self.octree
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn loader(&self) -> &PointLoader {
        &self.loader
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn pending(&self) -> usize {
        self.pending
    }

    /// Split loaded visible leaves whose screen error exceeds the target,
    /// largest error first.
    fn refine(&mut self, view: &ViewState) -> usize {
        let target = self.config.scheduler.screen_error_target;
        let frustum = view.frustum();
        let mut wanted: Vec<(OrderedFloat<f32>, NodeId)> = self
            .octree
            .leaves()
            .filter(|n| {
                self.scheduler.residency(n.id) == Residency::Loaded
                    && self.octree.can_subdivide(n.id)
                    && frustum.intersects(&n.bounds)
            })
            .filter_map(|n| {
                let error = view.screen_error(&n.bounds);
                (error > target).then_some((OrderedFloat(error), n.id))
            })
            .collect();
        wanted.sort_by(|a, b| b.cmp(a));

        let mut subdivided = 0;
        for (_, node) in wanted
            .into_iter()
            .take(self.config.max_subdivisions_per_frame)
        {
            if self.octree.subdivide(node, &self.lookup).is_some() {
                subdivided += 1;
            }
        }
        subdivided
    }

    fn dispatch(&mut self, node: NodeId) {
        let Some(ids) = self.octree.node(node).map(|n| n.ids.clone()) else {
            self.completions.notify_failed(node);
            return;
        };
        let loader = Arc::clone(&self.loader);
        let tx = self.results_tx.clone();
        self.pending += 1;
        debug!("Dispatching load of node {} ({} ids)", node, ids.len());
        rayon::spawn(move || {
            let batch = loader.load_points(&ids);
            // Fails only after shutdown, when the result is unwanted.
            let _ = tx.send(LoadResult { node, batch });
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{OctreeConfig, SchedulerConfig};
    use glam::Vec3;
    use std::collections::HashMap;
    use std::time::Duration;
    use strata_data::{DataEncoding, PcdWriter};

    #[derive(Default)]
    struct MockGpu {
        uploads: HashMap<NodeId, usize>,
        order: Vec<NodeId>,
        released: Vec<NodeId>,
        active: Vec<NodeId>,
    }

    impl UploadSink for MockGpu {
        fn upload(&mut self, node: NodeId, points: &[GpuPoint]) {
            self.uploads.insert(node, points.len());
            self.order.push(node);
        }

        fn release(&mut self, node: NodeId) {
            self.uploads.remove(&node);
            self.released.push(node);
        }

        fn active_set_changed(&mut self, active: &[NodeId]) {
            self.active = active.to_vec();
        }
    }

    /// 16^3 grid over `[0, 20)^3`.
    fn write_grid(dir: &tempfile::TempDir) -> std::path::PathBuf {
        let positions: Vec<Vec3> = (0..4096)
            .map(|i| Vec3::new((i % 16) as f32, ((i / 16) % 16) as f32, (i / 256) as f32) * 1.25)
            .collect();
        let path = dir.path().join("grid.pcd");
        PcdWriter::new(DataEncoding::Binary)
            .write_file(&path, &positions, None)
            .unwrap();
        path
    }

    fn config() -> SessionConfig {
        SessionConfig::default()
            .with_preview_points(1000)
            .with_octree(
                OctreeConfig::default()
                    .with_min_points_per_node(50)
                    .with_max_points_per_node(400),
            )
            .with_scheduler(
                SchedulerConfig::default()
                    .with_point_budget(100_000)
                    .with_screen_error_target(50.0),
            )
    }

    fn view() -> ViewState {
        ViewState::look_at(
            Vec3::new(10.0, 10.0, 50.0),
            Vec3::splat(10.0),
            60f32.to_radians(),
            1.0,
            1000.0,
            0.1,
            1000.0,
        )
    }

    #[test]
    fn test_open_builds_root_from_preview() {
        let dir = tempfile::tempdir().unwrap();
        let session = StreamingSession::open(write_grid(&dir), config()).unwrap();
        let root = session.octree().node(0).unwrap();
        assert_eq!(root.ids.len(), 1000);
        assert_eq!(session.scheduler().residency(0), Residency::Requested);
        assert_eq!(session.pending(), 1);
        assert_eq!(session.shutdown(), 1);
    }

    #[test]
    fn test_first_tick_uploads_preview_as_root() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = StreamingSession::open(write_grid(&dir), config()).unwrap();
        let mut gpu = MockGpu::default();
        let stats = session.tick(&view(), &mut gpu);
        assert_eq!(stats.uploaded, 1);
        assert_eq!(gpu.uploads.get(&0), Some(&1000));
        assert_eq!(gpu.active, vec![0]);
        assert_eq!(session.scheduler().residency(0), Residency::Loaded);
    }

    #[test]
    fn test_streams_children_after_refinement() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = StreamingSession::open(write_grid(&dir), config()).unwrap();
        let mut gpu = MockGpu::default();
        let mut subdivided = 0;
        for _ in 0..400 {
            subdivided += session.tick(&view(), &mut gpu).subdivided;
            if gpu.order.len() > 1 {
                break;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        assert!(subdivided >= 1);
        assert_eq!(gpu.order[0], 0);
        assert!(gpu.order.len() > 1, "no child batch arrived");
        for node in &gpu.order[1..] {
            let expected = session.octree().node(*node).unwrap().estimated_points;
            assert_eq!(gpu.uploads.get(node), Some(&expected));
            assert!(session.octree().node(*node).unwrap().level >= 1);
        }
        let drawn: usize = gpu
            .active
            .iter()
            .map(|n| session.octree().node(*n).unwrap().estimated_points)
            .sum();
        let limits = session.config().scheduler.clone();
        assert!(drawn <= limits.point_budget + limits.overlay_budget());
        session.shutdown();
    }

    #[test]
    fn test_fixed_view_reaches_steady_state() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = StreamingSession::open(write_grid(&dir), config()).unwrap();
        let mut gpu = MockGpu::default();
        let quiet = |stats: &SessionTick| {
            stats.pending == 0
                && stats.uploaded == 0
                && stats.subdivided == 0
                && stats.scheduler.loads_requested == 0
                && stats.scheduler.unloads_requested == 0
        };

        let mut settled = false;
        for _ in 0..400 {
            if quiet(&session.tick(&view(), &mut gpu)) {
                settled = true;
                break;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        assert!(settled, "session kept streaming under a fixed view");
        assert!(session.octree().len() > 1);

        let uploads = gpu.order.len();
        let released = gpu.released.len();
        for _ in 0..20 {
            let stats = session.tick(&view(), &mut gpu);
            assert!(quiet(&stats), "{stats:?}");
            std::thread::sleep(Duration::from_millis(1));
        }
        assert_eq!(gpu.order.len(), uploads);
        assert_eq!(gpu.released.len(), released);
        session.shutdown();
    }

    #[test]
    fn test_failed_loads_are_reported_not_uploaded() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_grid(&dir);
        let mut session = StreamingSession::open(&path, config()).unwrap();
        let data_offset = session.loader().header().data_offset;
        std::fs::OpenOptions::new()
            .write(true)
            .open(&path)
            .unwrap()
            .set_len(data_offset)
            .unwrap();

        let mut gpu = MockGpu::default();
        let mut failed = 0;
        for _ in 0..400 {
            failed += session.tick(&view(), &mut gpu).failed;
            if failed > 0 {
                break;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        assert!(failed > 0);
        // Only the in-memory preview made it through.
        assert_eq!(gpu.order, vec![0]);
        session.shutdown();
    }

    #[test]
    fn test_empty_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.pcd");
        PcdWriter::new(DataEncoding::Ascii)
            .write_file(&path, &[], None)
            .unwrap();
        let err = StreamingSession::open(&path, config()).err().unwrap();
        assert!(matches!(err, SessionError::Empty(_)));
    }
}
