//! Strata Stream Crate
//!
//! Level-of-detail streaming on top of `strata-data`: an octree over point
//! ids, a per-frame scheduler that decides what to load, keep and evict
//! under a point budget, and a session that runs loads on worker threads.
//!
//! ## Modules
//!
//! - [`octree`]: flat node arena with on-demand subdivision
//! - [`scheduler`]: scoring, hysteresis and rate-limited requests
//! - [`session`]: loader, octree and scheduler wired into one tick
//! - [`view`]: camera snapshot, frustum and screen error
//! - [`cache`]: baked cache record types

pub mod cache;
pub mod config;
pub mod error;
pub mod node;
pub mod octree;
pub mod scheduler;
pub mod session;
pub mod view;

pub use cache::{CacheMetadata, CacheNodeEntry};
pub use config::{OctreeConfig, SchedulerConfig, SessionConfig};
pub use error::SessionError;
pub use node::NodeContract;
pub use octree::{NodeId, Octree, OctreeNode, PositionLookup, SampleLookup};
pub use scheduler::{
    Completion, CompletionHandle, Residency, ScoredCandidate, Scheduler, SchedulerSink, TickReport,
};
pub use session::{SessionTick, StreamingSession, UploadSink};
pub use view::{Frustum, ViewState};
