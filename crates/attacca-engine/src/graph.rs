//! Playback graph abstraction.
//!
//! A scheduled object drives its audio through a small per-object graph
//! (player into reverb/delay sends into a panner). The graph itself is
//! behind a trait so the scheduler can target a real output device or a
//! recording backend for deterministic tests.

use std::sync::Arc;

use attacca_core::AudioBuffer;
use parking_lot::Mutex;

/// Addressable node inside a playback graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GraphNode {
    Player,
    Reverb,
    Delay,
}

/// One object's live audio chain.
///
/// All times are absolute timeline seconds. Implementations must accept
/// calls in any order after construction; `dispose` tears the chain down
/// and later calls become no-ops.
pub trait PlaybackGraph: Send {
    /// Begin playback at `time`, reading from `offset` seconds into the
    /// buffer.
    fn start(&mut self, time: f64, offset: f64);

    /// Stop playback at `time`.
    fn stop(&mut self, time: f64);

    fn set_gain(&mut self, node: GraphNode, value: f64);

    /// Linear ramp of `node`'s gain to `target` over `duration` seconds,
    /// starting at `time`.
    fn ramp_gain(&mut self, node: GraphNode, target: f64, duration: f64, time: f64);

    fn set_panner_position(&mut self, x: f64, y: f64, z: f64);

    fn set_playback_rate(&mut self, rate: f64);

    fn playback_rate(&self) -> f64;

    /// Disconnect and release every node.
    fn dispose(&mut self);
}

/// Builds playback graphs for loaded buffers.
pub trait GraphBackend: Send + Sync {
    fn build_graph(&self, buffer: Arc<AudioBuffer>) -> Box<dyn PlaybackGraph>;
}

/// Every call an [`OfflineGraph`] has received, in order.
#[derive(Debug, Clone, PartialEq)]
pub enum GraphOp {
    Start { time: f64, offset: f64 },
    Stop { time: f64 },
    SetGain { node: GraphNode, value: f64 },
    RampGain { node: GraphNode, target: f64, duration: f64, time: f64 },
    SetPannerPosition { x: f64, y: f64, z: f64 },
    SetPlaybackRate { rate: f64 },
    Dispose,
}

/// Backend that records graph operations instead of producing sound.
///
/// Tests clone the backend before handing it to a scheduler and inspect
/// the shared log afterwards.
#[derive(Clone, Default)]
pub struct OfflineBackend {
    log: Arc<Mutex<Vec<(usize, GraphOp)>>>,
    next_graph: Arc<Mutex<usize>>,
}

impl OfflineBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Operations recorded so far, tagged with the graph they hit in
    /// build order.
    pub fn ops(&self) -> Vec<(usize, GraphOp)> {
        self.log.lock().clone()
    }

    /// Operations for one graph only.
    pub fn ops_for(&self, graph: usize) -> Vec<GraphOp> {
        self.log
            .lock()
            .iter()
            .filter(|(id, _)| *id == graph)
            .map(|(_, op)| op.clone())
            .collect()
    }

    pub fn graph_count(&self) -> usize {
        *self.next_graph.lock()
    }
}

impl GraphBackend for OfflineBackend {
    fn build_graph(&self, buffer: Arc<AudioBuffer>) -> Box<dyn PlaybackGraph> {
        let mut next = self.next_graph.lock();
        let id = *next;
        *next += 1;
        Box::new(OfflineGraph {
            id,
            buffer,
            playback_rate: 1.0,
            disposed: false,
            log: Arc::clone(&self.log),
        })
    }
}

pub struct OfflineGraph {
    id: usize,
    buffer: Arc<AudioBuffer>,
    playback_rate: f64,
    disposed: bool,
    log: Arc<Mutex<Vec<(usize, GraphOp)>>>,
}

impl OfflineGraph {
    pub fn buffer(&self) -> &Arc<AudioBuffer> {
        &self.buffer
    }

    fn record(&self, op: GraphOp) {
        if !self.disposed {
            self.log.lock().push((self.id, op));
        }
    }
}

impl PlaybackGraph for OfflineGraph {
    fn start(&mut self, time: f64, offset: f64) {
        self.record(GraphOp::Start { time, offset });
    }

    fn stop(&mut self, time: f64) {
        self.record(GraphOp::Stop { time });
    }

    fn set_gain(&mut self, node: GraphNode, value: f64) {
        self.record(GraphOp::SetGain { node, value });
    }

    fn ramp_gain(&mut self, node: GraphNode, target: f64, duration: f64, time: f64) {
        self.record(GraphOp::RampGain {
            node,
            target,
            duration,
            time,
        });
    }

    fn set_panner_position(&mut self, x: f64, y: f64, z: f64) {
        self.record(GraphOp::SetPannerPosition { x, y, z });
    }

    fn set_playback_rate(&mut self, rate: f64) {
        if !self.disposed {
            self.playback_rate = rate;
        }
        self.record(GraphOp::SetPlaybackRate { rate });
    }

    fn playback_rate(&self) -> f64 {
        self.playback_rate
    }

    fn dispose(&mut self) {
        self.record(GraphOp::Dispose);
        self.disposed = true;
    }
}
