//! Per-frame load/unload scheduling.
//!
//! [`Scheduler::tick`] culls, scores and ranks candidate nodes, issues a
//! bounded number of load and unload requests, and publishes the active
//! set. It never blocks: completions reported through a
//! [`CompletionHandle`] are queued on a channel and applied at the start of
//! the next tick, so node state has a single writer.

use crate::config::SchedulerConfig;
use crate::node::NodeContract;
use crate::octree::NodeId;
use crate::view::ViewState;
use crossbeam_channel::{Receiver, Sender};
use ordered_float::OrderedFloat;
use std::collections::{HashSet, VecDeque};
use tracing::{debug, trace, warn};

/// Residency of one node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Residency {
    #[default]
    Unrequested,
    Requested,
    Loaded,
    Unloading,
}

#[derive(Debug, Clone, Copy, Default)]
struct NodeState {
    residency: Residency,
    active: bool,
}

/// Asynchronous completion report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    Loaded(NodeId),
    Unloaded(NodeId),
    Failed(NodeId),
}

/// Cloneable sender for completion reports, usable from any thread.
///
/// Reports sent after the scheduler is dropped are discarded.
#[derive(Debug, Clone)]
pub struct CompletionHandle {
    tx: Sender<Completion>,
}

impl CompletionHandle {
    pub fn notify_loaded(&self, node: NodeId) {
        let _ = self.tx.send(Completion::Loaded(node));
    }

    pub fn notify_unloaded(&self, node: NodeId) {
        let _ = self.tx.send(Completion::Unloaded(node));
    }

    /// The load failed; the node becomes requestable again.
    pub fn notify_failed(&self, node: NodeId) {
        let _ = self.tx.send(Completion::Failed(node));
    }
}

/// Receiver of the scheduler's decisions, called synchronously inside
/// [`Scheduler::tick`].
pub trait SchedulerSink {
    /// Start loading `node`. Must eventually be answered with
    /// `notify_loaded` or `notify_failed`.
    fn request_load(&mut self, node: NodeId);

    /// Release `node`. Must eventually be answered with `notify_unloaded`.
    fn request_unload(&mut self, node: NodeId);

    /// The drawn set after this tick, in descending score order.
    fn active_set_changed(&mut self, active: &[NodeId]);
}

/// One culled and scored node, rebuilt every tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoredCandidate {
    pub node: NodeId,
    pub score: f32,
    pub screen_error: f32,
    pub estimated_points: usize,
}

/// Summary of one tick.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TickReport {
    pub frame: u64,
    /// Completion reports applied at the start of the tick.
    pub completions: usize,
    pub candidates: usize,
    /// Nodes whose subtree was skipped by the frustum test.
    pub culled: usize,
    pub loads_requested: usize,
    pub unloads_requested: usize,
    pub active_nodes: usize,
    /// Summed estimated points of the regular active set.
    pub active_points: usize,
    /// Summed estimated points kept through the overlay reserve.
    pub overlay_points: usize,
    /// Loaded nodes waiting for an unload slot.
    pub pending_evictions: usize,
}

pub struct Scheduler {
    config: SchedulerConfig,
    states: Vec<NodeState>,
    active: Vec<NodeId>,
    evictions: VecDeque<NodeId>,
    completions_tx: Sender<Completion>,
    completions_rx: Receiver<Completion>,
    frame: u64,
}

impl Scheduler {
    pub fn new(config: SchedulerConfig) -> Self {
        let (completions_tx, completions_rx) = crossbeam_channel::unbounded();
        Self {
            config,
            states: Vec::new(),
            active: Vec::new(),
            evictions: VecDeque::new(),
            completions_tx,
            completions_rx,
            frame: 0,
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn completion_handle(&self) -> CompletionHandle {
        CompletionHandle {
            tx: self.completions_tx.clone(),
        }
    }

    pub fn residency(&self, node: NodeId) -> Residency {
        self.states
            .get(node as usize)
            .map_or(Residency::Unrequested, |s| s.residency)
    }

    pub fn is_active(&self, node: NodeId) -> bool {
        self.states.get(node as usize).is_some_and(|s| s.active)
    }

    /// Active set published by the last tick.
    pub fn active_set(&self) -> &[NodeId] {
        &self.active
    }

    /// Record a load issued outside [`tick`](Self::tick), such as a preview
    /// loaded when a session opens. Ignored unless the node is unrequested.
    pub fn mark_requested(&mut self, node: NodeId) {
        let state = self.state_mut(node);
        if state.residency == Residency::Unrequested {
            state.residency = Residency::Requested;
        }
    }

    /// Run one frame of scheduling.
    pub fn tick<N, S>(&mut self, nodes: &N, view: &ViewState, sink: &mut S) -> TickReport
    where
        N: NodeContract + ?Sized,
        S: SchedulerSink + ?Sized,
    {
        self.frame += 1;
        let mut report = TickReport {
            frame: self.frame,
            completions: self.drain_completions(),
            ..Default::default()
        };

        let mut candidates = self.collect_candidates(nodes, view, &mut report);
        candidates.sort_by(|a, b| {
            OrderedFloat(b.score)
                .cmp(&OrderedFloat(a.score))
                .then(a.node.cmp(&b.node))
        });
        report.candidates = candidates.len();

        let budget = self.config.point_budget;
        let overlay_budget = self.config.overlay_budget();
        let keep_threshold = self.config.keep_threshold();
        let mut running = 0usize;
        let mut next_active = Vec::new();

        for c in &candidates {
            let points = c.estimated_points;
            match self.residency(c.node) {
                Residency::Loaded => {
                    if c.screen_error >= keep_threshold && running + points <= budget {
                        running += points;
                        report.active_points += points;
                        next_active.push(c.node);
                    } else if report.overlay_points + points <= overlay_budget {
                        report.overlay_points += points;
                        next_active.push(c.node);
                    }
                }
                Residency::Requested => {
                    // In flight: reserve its share so later requests fit.
                    if running + points <= budget {
                        running += points;
                    }
                }
                Residency::Unrequested => {
                    // Only load what the keep test above would hold once it lands.
                    if report.loads_requested < self.config.max_loads_per_frame
                        && nodes.is_loadable(c.node)
                        && c.screen_error >= keep_threshold
                        && running + points <= budget
                    {
                        running += points;
                        self.state_mut(c.node).residency = Residency::Requested;
                        sink.request_load(c.node);
                        report.loads_requested += 1;
                        trace!(
                            "Requested node {} (level {}, score {:.4}, error {:.1})",
                            c.node,
                            nodes.level(c.node),
                            c.score,
                            c.screen_error
                        );
                    }
                }
                Residency::Unloading => {}
            }
        }

        self.settle_active(&next_active);
        report.unloads_requested = self.issue_unloads(sink);
        report.pending_evictions = self.evictions.len();
        report.active_nodes = next_active.len();

        sink.active_set_changed(&next_active);
        self.active = next_active;

        debug!(
            "Tick {}: {} candidates, {} culled, {} loads, {} unloads, {} active ({} + {} overlay points)",
            report.frame,
            report.candidates,
            report.culled,
            report.loads_requested,
            report.unloads_requested,
            report.active_nodes,
            report.active_points,
            report.overlay_points
        );
        report
    }

    fn drain_completions(&mut self) -> usize {
        let mut applied = 0;
        while let Ok(completion) = self.completions_rx.try_recv() {
            applied += 1;
            match completion {
                Completion::Loaded(node) => {
                    let state = self.state_mut(node);
                    if state.residency == Residency::Requested {
                        state.residency = Residency::Loaded;
                    } else {
                        debug!("Ignoring load completion for node {} in {:?}", node, state.residency);
                    }
                }
                Completion::Failed(node) => {
                    let state = self.state_mut(node);
                    if state.residency == Residency::Requested {
                        state.residency = Residency::Unrequested;
                        warn!("Load of node {} failed; it may be requested again", node);
                    }
                }
                Completion::Unloaded(node) => {
                    let state = self.state_mut(node);
                    if state.residency == Residency::Unloading {
                        state.residency = Residency::Unrequested;
                        state.active = false;
                    }
                }
            }
        }
        applied
    }

    /// Depth-first frustum culling and scoring from the roots.
    fn collect_candidates<N>(
        &self,
        nodes: &N,
        view: &ViewState,
        report: &mut TickReport,
    ) -> Vec<ScoredCandidate>
    where
        N: NodeContract + ?Sized,
    {
        let frustum = view.frustum();
        let mut candidates = Vec::new();
        let mut stack: Vec<NodeId> = nodes.roots().iter().rev().copied().collect();

        while let Some(node) = stack.pop() {
            let bounds = nodes.bounds(node);
            if !frustum.intersects(&bounds) {
                report.culled += 1;
                continue;
            }
            stack.extend(nodes.children(node).iter().rev().copied());

            let points = nodes.estimated_points(node);
            if points == 0 {
                continue;
            }
            let screen_error = view.screen_error(&bounds);
            let lod_need = screen_error / self.config.screen_error_target.max(f32::EPSILON);
            let distance = bounds.distance_to(view.position);
            let distance_weight = 1.0 / (1.0 + distance).powf(self.config.distance_falloff);
            let parent_boost = match nodes.parent(node) {
                Some(parent) if self.residency(parent) == Residency::Loaded => {
                    self.config.parent_boost
                }
                _ => 1.0,
            };
            let cost_penalty = 1.0 / (points as f32).sqrt();
            let mut score = lod_need * distance_weight * parent_boost * cost_penalty;
            if lod_need < 1.0 {
                score *= self.config.prefetch_damping;
            }
            candidates.push(ScoredCandidate {
                node,
                score,
                screen_error,
                estimated_points: points,
            });
        }
        candidates
    }

    /// Flip activity flags and queue nodes that were drawn last tick but not
    /// this one.
    fn settle_active(&mut self, next_active: &[NodeId]) {
        let next: HashSet<NodeId> = next_active.iter().copied().collect();
        let dropped: Vec<NodeId> = self
            .active
            .iter()
            .copied()
            .filter(|node| !next.contains(node))
            .collect();
        for &node in &dropped {
            self.state_mut(node).active = false;
        }
        for &node in next_active {
            self.state_mut(node).active = true;
        }
        self.evictions.retain(|node| !next.contains(node));
        for node in dropped {
            if self.residency(node) == Residency::Loaded && !self.evictions.contains(&node) {
                self.evictions.push_back(node);
            }
        }
    }

    fn issue_unloads<S>(&mut self, sink: &mut S) -> usize
    where
        S: SchedulerSink + ?Sized,
    {
        let mut issued = 0;
        while issued < self.config.max_unloads_per_frame {
            let Some(node) = self.evictions.pop_front() else {
                break;
            };
            let state = self.state_mut(node);
            if state.residency != Residency::Loaded || state.active {
                continue;
            }
            state.residency = Residency::Unloading;
            sink.request_unload(node);
            issued += 1;
        }
        issued
    }

    fn state_mut(&mut self, node: NodeId) -> &mut NodeState {
        let index = node as usize;
        if index >= self.states.len() {
            self.states.resize(index + 1, NodeState::default());
        }
        &mut self.states[index]
    }
}
