//! Tunables for the octree, the scheduler and the streaming session.
//!
//! Every struct deserializes with `#[serde(default)]`, so a partial JSON file
//! only needs the values it changes.

use serde::{Deserialize, Serialize};

/// Limits applied when subdividing octree leaves.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OctreeConfig {
    /// Nodes are never created at `level >= max_depth`.
    pub max_depth: u32,
    /// Leaves holding fewer ids than this are not split.
    pub min_points_per_node: usize,
    /// Per-child cap on ids accepted during a split. Excess ids are dropped.
    pub max_points_per_node: usize,
}

impl Default for OctreeConfig {
    fn default() -> Self {
        Self {
            max_depth: 10,
            min_points_per_node: 256,
            max_points_per_node: 50_000,
        }
    }
}

impl OctreeConfig {
    pub fn with_max_depth(mut self, depth: u32) -> Self {
        self.max_depth = depth;
        self
    }

    pub fn with_min_points_per_node(mut self, points: usize) -> Self {
        self.min_points_per_node = points;
        self
    }

    pub fn with_max_points_per_node(mut self, points: usize) -> Self {
        self.max_points_per_node = points;
        self
    }
}

/// Per-frame selection parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Summed estimated points the regular active set may hold.
    pub point_budget: usize,
    /// Projected size in pixels at which a node counts as fine enough.
    pub screen_error_target: f32,
    /// Loaded nodes stay active while their screen error is at least
    /// `screen_error_target / hysteresis_factor`.
    pub hysteresis_factor: f32,
    /// Exponent of the `1 / (1 + distance)` weight.
    pub distance_falloff: f32,
    /// Score multiplier for nodes whose parent is loaded.
    pub parent_boost: f32,
    /// Fraction of `point_budget` reserved for loaded nodes kept visible
    /// while finer replacements stream in.
    pub overlay_fraction: f32,
    /// Score multiplier for nodes that are already fine enough.
    pub prefetch_damping: f32,
    pub max_loads_per_frame: usize,
    pub max_unloads_per_frame: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            point_budget: 5_000_000,
            screen_error_target: 100.0,
            hysteresis_factor: 2.0,
            distance_falloff: 1.0,
            parent_boost: 1.5,
            overlay_fraction: 0.1,
            prefetch_damping: 0.25,
            max_loads_per_frame: 4,
            max_unloads_per_frame: 8,
        }
    }
}

impl SchedulerConfig {
    pub fn with_point_budget(mut self, budget: usize) -> Self {
        self.point_budget = budget;
        self
    }

    pub fn with_screen_error_target(mut self, target: f32) -> Self {
        self.screen_error_target = target;
        self
    }

    pub fn with_hysteresis_factor(mut self, factor: f32) -> Self {
        self.hysteresis_factor = factor;
        self
    }

    pub fn with_overlay_fraction(mut self, fraction: f32) -> Self {
        self.overlay_fraction = fraction;
        self
    }

    pub fn with_max_loads_per_frame(mut self, loads: usize) -> Self {
        self.max_loads_per_frame = loads;
        self
    }

    pub fn with_max_unloads_per_frame(mut self, unloads: usize) -> Self {
        self.max_unloads_per_frame = unloads;
        self
    }

    /// Points the overlay reserve may hold on top of the budget.
    pub fn overlay_budget(&self) -> usize {
        (self.point_budget as f64 * self.overlay_fraction.max(0.0) as f64) as usize
    }

    /// Screen error below which a loaded node is dropped from the active set.
    pub fn keep_threshold(&self) -> f32 {
        self.screen_error_target / self.hysteresis_factor.max(f32::EPSILON)
    }
}

/// Settings for a [`StreamingSession`](crate::session::StreamingSession).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Ids sampled uniformly to build the root node and the first preview.
    pub preview_points: usize,
    /// ASCII rows per indexed line offset.
    pub ascii_index_stride: usize,
    /// Leaves split per tick at most.
    pub max_subdivisions_per_frame: usize,
    pub octree: OctreeConfig,
    pub scheduler: SchedulerConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            preview_points: 1_000_000,
            ascii_index_stride: 16,
            max_subdivisions_per_frame: 2,
            octree: OctreeConfig::default(),
            scheduler: SchedulerConfig::default(),
        }
    }
}

impl SessionConfig {
    pub fn with_preview_points(mut self, points: usize) -> Self {
        self.preview_points = points;
        self
    }

    pub fn with_octree(mut self, octree: OctreeConfig) -> Self {
        self.octree = octree;
        self
    }

    pub fn with_scheduler(mut self, scheduler: SchedulerConfig) -> Self {
        self.scheduler = scheduler;
        self
    }

    pub fn with_max_subdivisions_per_frame(mut self, subdivisions: usize) -> Self {
        self.max_subdivisions_per_frame = subdivisions;
        self
    }
}
