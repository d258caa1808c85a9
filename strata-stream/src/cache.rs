//! Baked cache schema.
//!
//! An offline converter stores a metadata record, a flat node table and a
//! packed attribute blob addressed per node by `(offset, size)`. Only the
//! record types live here; [`Octree::cache_table`](crate::octree::Octree::cache_table)
//! produces the node table from an in-memory tree.

use crate::octree::{NodeId, Octree};
use serde::{Deserialize, Serialize};
use strata_data::Aabb;

/// Dataset-wide metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheMetadata {
    pub point_count: u64,
    pub bounds: Aabb,
    /// Minimum point spacing at the root, when the converter computed one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spacing: Option<f32>,
    /// Attribute names stored per point, in blob order.
    pub attributes: Vec<String>,
}

impl CacheMetadata {
    /// Metadata for `tree`, with bounds taken from its roots.
    pub fn for_octree(tree: &Octree, point_count: u64, attributes: Vec<String>) -> Self {
        let bounds = tree
            .roots()
            .iter()
            .filter_map(|r| tree.node(*r))
            .fold(Aabb::EMPTY, |acc, n| acc.union(&n.bounds));
        Self {
            point_count,
            bounds,
            spacing: None,
            attributes,
        }
    }

    pub fn with_spacing(mut self, spacing: f32) -> Self {
        self.spacing = Some(spacing);
        self
    }
}

/// One row of the node table.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CacheNodeEntry {
    pub node: NodeId,
    pub level: u32,
    pub bounds: Aabb,
    /// Byte offset of the node's records in the attribute blob.
    pub offset: u64,
    /// Byte length of the node's records.
    pub size: u64,
    pub point_count: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OctreeConfig;
    use crate::octree::SampleLookup;
    use glam::Vec3;

    #[test]
    fn test_spacing_is_optional_in_json() {
        let json = r#"{
            "point_count": 12,
            "bounds": {"min": [0.0, 0.0, 0.0], "max": [1.0, 2.0, 3.0]},
            "attributes": ["position", "rgba"]
        }"#;
        let metadata: CacheMetadata = serde_json::from_str(json).unwrap();
        assert_eq!(metadata.spacing, None);
        assert_eq!(metadata.bounds.max, Vec3::new(1.0, 2.0, 3.0));

        let with = metadata.clone().with_spacing(0.5);
        let round: CacheMetadata = serde_json::from_str(&serde_json::to_string(&with).unwrap()).unwrap();
        assert_eq!(round.spacing, Some(0.5));
    }

    #[test]
    fn test_metadata_bounds_from_roots() {
        let lookup = SampleLookup::new(vec![0, 1], vec![Vec3::ZERO, Vec3::new(2.0, 4.0, 6.0)]);
        let mut tree = Octree::new(OctreeConfig::default());
        tree.build_initial(vec![0, 1], &lookup);
        let metadata = CacheMetadata::for_octree(&tree, 2, vec!["position".into()]);
        assert_eq!(metadata.bounds, Aabb::new(Vec3::ZERO, Vec3::new(2.0, 4.0, 6.0)));
    }
}
