//! Core data types for point batches and bounding volumes.
//!
//! These are CPU-side representations shared by the loader, the octree and
//! the scheduler. The interleaved [`GpuPoint`] record is the only type handed
//! to the upload layer.

use bytemuck::{Pod, Zeroable};
use glam::Vec3;
use serde::{Deserialize, Serialize};

/// Stable index of a point within the logical point sequence `[0, N)`.
pub type PointId = u32;

/// Packed color used when a file carries no color field (opaque white).
pub const DEFAULT_COLOR: u32 = 0xFFFF_FFFF;

/// Axis-aligned bounding box.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    /// An inverted box that any point expands.
    pub const EMPTY: Self = Self {
        min: Vec3::splat(f32::INFINITY),
        max: Vec3::splat(f32::NEG_INFINITY),
    };

    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    /// Exact min/max of the given points, or [`Aabb::EMPTY`] for no points.
    pub fn from_points<'a>(points: impl IntoIterator<Item = &'a Vec3>) -> Self {
        let mut bounds = Self::EMPTY;
        for p in points {
            bounds.expand(*p);
        }
        bounds
    }

    pub fn expand(&mut self, p: Vec3) {
        self.min = self.min.min(p);
        self.max = self.max.max(p);
    }

    pub fn union(&self, other: &Aabb) -> Aabb {
        Aabb {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.min.x > self.max.x || self.min.y > self.max.y || self.min.z > self.max.z
    }

    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    pub fn size(&self) -> Vec3 {
        self.max - self.min
    }

    /// Largest edge length.
    pub fn max_extent(&self) -> f32 {
        let s = self.size();
        s.x.max(s.y).max(s.z)
    }

    /// Inclusive containment test.
    pub fn contains(&self, p: Vec3) -> bool {
        p.x >= self.min.x
            && p.x <= self.max.x
            && p.y >= self.min.y
            && p.y <= self.max.y
            && p.z >= self.min.z
            && p.z <= self.max.z
    }

    /// Box for octant `index` (bit 0 = +x, bit 1 = +y, bit 2 = +z).
    pub fn octant(&self, index: usize) -> Aabb {
        let c = self.center();
        let min = Vec3::new(
            if index & 1 == 0 { self.min.x } else { c.x },
            if index & 2 == 0 { self.min.y } else { c.y },
            if index & 4 == 0 { self.min.z } else { c.z },
        );
        let max = Vec3::new(
            if index & 1 == 0 { c.x } else { self.max.x },
            if index & 2 == 0 { c.y } else { self.max.y },
            if index & 4 == 0 { c.z } else { self.max.z },
        );
        Aabb { min, max }
    }

    /// Distance from `p` to the closest point of the box (zero inside).
    pub fn distance_to(&self, p: Vec3) -> f32 {
        let clamped = p.clamp(self.min, self.max);
        (p - clamped).length()
    }
}

impl Default for Aabb {
    fn default() -> Self {
        Self::EMPTY
    }
}

/// Interleaved point record handed to the upload layer.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct GpuPoint {
    pub position: [f32; 3],
    /// Packed 0xAARRGGBB.
    pub color: u32,
}

impl GpuPoint {
    pub fn new(position: Vec3, color: u32) -> Self {
        Self {
            position: position.to_array(),
            color,
        }
    }
}

/// Result of a point load: parallel arrays in the order of the requested ids.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PointBatch {
    pub positions: Vec<Vec3>,
    /// Packed 0xAARRGGBB colors, present when the file has an rgb/rgba field.
    pub colors: Option<Vec<u32>>,
    /// Exact bounds of `positions`.
    pub bounds: Aabb,
}

impl PointBatch {
    /// Build a batch and compute its bounds.
    pub fn new(positions: Vec<Vec3>, colors: Option<Vec<u32>>) -> Self {
        let bounds = Aabb::from_points(&positions);
        Self {
            positions,
            colors,
            bounds,
        }
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Interleave into GPU records, filling missing colors with [`DEFAULT_COLOR`].
    pub fn to_gpu_points(&self) -> Vec<GpuPoint> {
        match &self.colors {
            Some(colors) => self
                .positions
                .iter()
                .zip(colors)
                .map(|(p, c)| GpuPoint::new(*p, *c))
                .collect(),
            None => self
                .positions
                .iter()
                .map(|p| GpuPoint::new(*p, DEFAULT_COLOR))
                .collect(),
        }
    }
}
