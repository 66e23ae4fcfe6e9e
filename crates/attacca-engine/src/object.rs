//! Scheduled objects and their lifecycle.
//!
//! An [`AudioObject`] walks a fixed state machine driven entirely by
//! timeline callbacks:
//!
//! ```text
//! created -> loaded -> scheduled -> playing -> stopped -> disposed -> freed
//! ```
//!
//! Each transition is a pending timeline event placed relative to the
//! object's play time and the shared look-ahead windows. The windows
//! adapt: an object whose buffer missed its slot grows them, an object
//! that connected on time shrinks them back toward their floor.

use std::sync::{Arc, Weak};

use attacca_core::{
    AudioBuffer, DynamicBufferLifeCycle, Error, EventId, RefTimeWithOnset, Result, Timeline,
};
use parking_lot::Mutex;
use smallvec::SmallVec;
use tracing::{debug, warn};

use crate::bank::{BufferBank, FetchHandle};
use crate::graph::{GraphBackend, GraphNode, PlaybackGraph};
use crate::stretch::TimeStretcher;

/// Never schedule into the past; nudge late events this far ahead.
const SCHEDULE_EPSILON: f64 = 0.001;

/// Lossy codecs pad the end of a decode with silence; compensate so
/// back-to-back loop windows stay gapless.
const END_SILENCE_COMPENSATION: f64 = 0.02;

/// Re-poll cadence while a decode is in flight.
const LOAD_POLL_INTERVAL: f64 = 0.05;

const MISSING_BUFFER_GROWTH: f64 = 0.5;
const LATE_CONNECT_GROWTH: f64 = 0.2;
const ON_TIME_DECAY: f64 = 0.01;

fn to_future(time: f64, now: f64) -> f64 {
    if time < now + SCHEDULE_EPSILON {
        now + SCHEDULE_EPSILON
    } else {
        time
    }
}

/// Lifecycle stage of a scheduled object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectStatus {
    Created,
    Loaded,
    Scheduled,
    Playing,
    Stopped,
    Disposed,
    Freed,
}

impl ObjectStatus {
    const COUNT: usize = 7;

    fn index(self) -> usize {
        match self {
            ObjectStatus::Created => 0,
            ObjectStatus::Loaded => 1,
            ObjectStatus::Scheduled => 2,
            ObjectStatus::Playing => 3,
            ObjectStatus::Stopped => 4,
            ObjectStatus::Disposed => 5,
            ObjectStatus::Freed => 6,
        }
    }
}

type StatusCallback = Box<dyn FnMut(f64) + Send>;

/// Per-status callback registry. Callbacks run synchronously on the
/// thread that drove the transition, with no object lock held.
#[derive(Default)]
pub struct Emitter {
    handlers: Mutex<[SmallVec<[StatusCallback; 2]>; ObjectStatus::COUNT]>,
}

impl Emitter {
    pub fn on(&self, status: ObjectStatus, callback: StatusCallback) {
        self.handlers.lock()[status.index()].push(callback);
    }

    pub fn emit(&self, status: ObjectStatus, time: f64) {
        let mut handlers = self.handlers.lock();
        for callback in handlers[status.index()].iter_mut() {
            callback(time);
        }
    }
}

/// Settable parameter of a scheduled object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Parameter {
    Amplitude,
    Panning,
    Reverb,
    Delay,
    PlaybackRate,
    StartTime,
    Duration,
    DurationRatio,
    TimeStretchRatio,
    Offset,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ParamValue {
    Single(f64),
    Triple([f64; 3]),
}

impl ParamValue {
    fn single(self, parameter: &'static str) -> Result<f64> {
        match self {
            ParamValue::Single(v) => Ok(v),
            ParamValue::Triple(_) => Err(Error::InvalidConfig(format!(
                "{parameter} expects a single value"
            ))),
        }
    }

    fn triple(self, parameter: &'static str) -> Result<[f64; 3]> {
        match self {
            ParamValue::Triple(v) => Ok(v),
            ParamValue::Single(_) => Err(Error::InvalidConfig(format!(
                "{parameter} expects an [x, y, z] triple"
            ))),
        }
    }
}

/// Current parameter values of one object.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParameterTable {
    pub amplitude: f64,
    pub panning: [f64; 3],
    pub reverb: f64,
    pub delay: f64,
    pub playback_rate: f64,
    pub duration: Option<f64>,
    pub duration_ratio: f64,
    pub time_stretch_ratio: f64,
    pub offset: f64,
}

impl Default for ParameterTable {
    fn default() -> Self {
        Self {
            amplitude: 1.0,
            panning: [0.0; 3],
            reverb: 0.0,
            delay: 0.0,
            playback_rate: 1.0,
            duration: None,
            duration_ratio: 1.0,
            time_stretch_ratio: 1.0,
            offset: 0.0,
        }
    }
}

/// Decides whether an object would be heard if played right now. Used
/// to mute look-ahead growth for objects nobody would hear anyway.
pub type AudibilityCheck = fn(&ParameterTable) -> bool;

pub fn default_audibility(params: &ParameterTable) -> bool {
    params.amplitude > 0.0 || params.reverb > 0.0 || params.delay > 0.0
}

/// Common surface of everything the scheduler can place on the
/// timeline.
pub trait ScheduledObject: Send + Sync {
    fn schedule_time(&self) -> RefTimeWithOnset;

    /// Effective playback duration in seconds, once known.
    fn duration(&self) -> Option<f64>;

    fn end_time(&self) -> Option<f64> {
        self.duration()
            .map(|d| self.schedule_time().absolute() + d)
    }

    fn set(&self, parameter: Parameter, value: ParamValue) -> Result<()>;

    /// Linear ramp of a gain-like parameter over `duration` seconds,
    /// starting at the absolute timeline instant `time`.
    fn ramp(&self, parameter: Parameter, target: f64, duration: f64, time: f64) -> Result<()>;

    /// Stop at `time`, tearing the object down through the normal
    /// stopped/disposed/freed chain.
    fn stop(&self, time: f64);

    fn on_status(&self, status: ObjectStatus, callback: StatusCallback);
}

pub type ObjectRef = Arc<dyn ScheduledObject>;

struct ObjectState {
    status: ObjectStatus,
    schedule_time: RefTimeWithOnset,
    params: ParameterTable,
    fetch: Option<FetchHandle>,
    buffer: Option<Arc<AudioBuffer>>,
    graph: Option<Box<dyn PlaybackGraph>>,
    pending: SmallVec<[EventId; 6]>,
    is_scheduled: bool,
}

pub(crate) struct AudioInner {
    uri: String,
    timeline: Timeline,
    bank: BufferBank,
    backend: Arc<dyn GraphBackend>,
    timings: Arc<Mutex<DynamicBufferLifeCycle>>,
    stretcher: TimeStretcher,
    fade_length: f64,
    audibility: AudibilityCheck,
    emitter: Emitter,
    state: Mutex<ObjectState>,
}

/// A buffer placed on the timeline.
#[derive(Clone)]
pub struct AudioObject {
    inner: Arc<AudioInner>,
}

impl AudioObject {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        uri: impl Into<String>,
        schedule_time: RefTimeWithOnset,
        timeline: Timeline,
        bank: BufferBank,
        backend: Arc<dyn GraphBackend>,
        timings: Arc<Mutex<DynamicBufferLifeCycle>>,
        fade_length: f64,
        audibility: AudibilityCheck,
    ) -> Self {
        Self {
            inner: Arc::new(AudioInner {
                uri: uri.into(),
                timeline,
                bank,
                backend,
                timings,
                stretcher: TimeStretcher::new(fade_length),
                fade_length,
                audibility,
                emitter: Emitter::default(),
                state: Mutex::new(ObjectState {
                    status: ObjectStatus::Created,
                    schedule_time,
                    params: ParameterTable::default(),
                    fetch: None,
                    buffer: None,
                    graph: None,
                    pending: SmallVec::new(),
                    is_scheduled: false,
                }),
            }),
        }
    }

    /// Place the load and connect events on the timeline.
    pub fn activate(&self) {
        update_start_events(&self.inner);
    }

    pub fn uri(&self) -> &str {
        &self.inner.uri
    }

    pub fn status(&self) -> ObjectStatus {
        self.inner.state.lock().status
    }

    pub(crate) fn downgrade(&self) -> Weak<AudioInner> {
        Arc::downgrade(&self.inner)
    }

    pub(crate) fn upgrade(weak: &Weak<AudioInner>) -> Option<AudioObject> {
        weak.upgrade().map(|inner| AudioObject { inner })
    }
}

impl std::fmt::Debug for AudioObject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioObject")
            .field("uri", &self.inner.uri)
            .field("status", &self.status())
            .finish_non_exhaustive()
    }
}

fn cancel_pending(timeline: &Timeline, state: &mut ObjectState) {
    for id in state.pending.drain(..) {
        timeline.cancel(id);
    }
}

/// (Re)schedule the load and connect phases for the object's current
/// schedule time.
fn update_start_events(inner: &Arc<AudioInner>) {
    let now = inner.timeline.now();
    let timing = *inner.timings.lock();

    let mut state = inner.state.lock();
    cancel_pending(&inner.timeline, &mut state);

    let play_time = state.schedule_time.absolute() + timing.connect_to_graph.count_in;
    let load_at = to_future(play_time - timing.load_buffer.count_in, now);
    let connect_at = to_future(play_time - timing.connect_to_graph.count_in, now);

    let weak = Arc::downgrade(inner);
    let load_event = inner.timeline.schedule(load_at, move |_| {
        if let Some(inner) = weak.upgrade() {
            task_load(&inner);
        }
    });
    let weak = Arc::downgrade(inner);
    let connect_event = inner.timeline.schedule(connect_at, move |_| {
        if let Some(inner) = weak.upgrade() {
            task_connect(&inner);
        }
    });
    state.pending.push(load_event);
    state.pending.push(connect_event);
}

/// Load phase: kick the decode and pick the buffer up if it is already
/// there. An object nobody would hear skips the decode entirely when
/// the timings say to ignore inaudible objects.
fn task_load(inner: &Arc<AudioInner>) {
    let now = inner.timeline.now();
    let ignore_inaudible = inner.timings.lock().ignore_inaudible;
    let mut handle = {
        let mut state = inner.state.lock();
        if state.buffer.is_some() {
            return;
        }
        if ignore_inaudible && !(inner.audibility)(&state.params) {
            debug!(uri = %inner.uri, "object is inaudible, skipping decode");
            return;
        }
        match state.fetch.take() {
            Some(handle) => handle,
            None => inner.bank.fetch(&inner.uri, now),
        }
    };

    let polled = handle.poll();
    let mut state = inner.state.lock();
    match polled {
        Some(Ok(buffer)) => {
            state.buffer = Some(buffer);
            if state.status == ObjectStatus::Created {
                state.status = ObjectStatus::Loaded;
                drop(state);
                inner.emitter.emit(ObjectStatus::Loaded, now);
            }
        }
        Some(Err(err)) => {
            drop(state);
            // The object keeps its state and stays silent until stopped.
            warn!(uri = %inner.uri, %err, "decode failed, object stays idle");
        }
        None => {
            state.fetch = Some(handle);
            let weak = Arc::downgrade(inner);
            let retry = inner
                .timeline
                .schedule(now + LOAD_POLL_INTERVAL, move |_| {
                    if let Some(inner) = weak.upgrade() {
                        task_load(&inner);
                    }
                });
            state.pending.push(retry);
        }
    }
}

/// Connect phase: trim and stretch the buffer, build the playback
/// graph, commit the start, and chain the end events.
///
/// An object that connects late widens the shared windows and misses
/// this cycle; only an on-time connect builds a graph.
fn task_connect(inner: &Arc<AudioInner>) {
    let now = inner.timeline.now();

    // Late pickup for a decode that finished after the load phase; a
    // decode still in flight re-polls until it settles.
    let mut newly_loaded = false;
    {
        let handle = inner.state.lock().fetch.take();
        if let Some(mut handle) = handle {
            match handle.poll() {
                Some(Ok(buffer)) => {
                    let mut state = inner.state.lock();
                    state.buffer = Some(buffer);
                    if state.status == ObjectStatus::Created {
                        state.status = ObjectStatus::Loaded;
                        newly_loaded = true;
                    }
                }
                Some(Err(err)) => {
                    warn!(uri = %inner.uri, %err, "decode failed, object stays idle");
                    return;
                }
                None => {
                    let mut state = inner.state.lock();
                    state.fetch = Some(handle);
                    let weak = Arc::downgrade(inner);
                    let retry = inner
                        .timeline
                        .schedule(now + LOAD_POLL_INTERVAL, move |_| {
                            if let Some(inner) = weak.upgrade() {
                                task_connect(&inner);
                            }
                        });
                    state.pending.push(retry);
                    return;
                }
            }
        }
    }

    let timing = *inner.timings.lock();
    let mut state = inner.state.lock();

    let Some(buffer) = state.buffer.clone() else {
        drop(state);
        if timing.ignore_inaudible {
            debug!(uri = %inner.uri, "buffer of inaudible object ignored");
        } else {
            warn!(uri = %inner.uri, "buffer not ready at connect time, widening look-ahead");
            inner.timings.lock().load_buffer.grow(MISSING_BUFFER_GROWTH);
        }
        return;
    };

    let play_time = state.schedule_time.absolute() + timing.connect_to_graph.count_in;
    if play_time < now {
        drop(state);
        warn!(uri = %inner.uri, play_time, now, "connected late, skipping this cycle");
        {
            let mut timings = inner.timings.lock();
            timings.connect_to_graph.grow(LATE_CONNECT_GROWTH);
            timings.load_buffer.grow(LATE_CONNECT_GROWTH);
            // Opportunistic decay still applies; the raised floor clamps it.
            timings.load_buffer.shrink(ON_TIME_DECAY);
        }
        if newly_loaded {
            inner.emitter.emit(ObjectStatus::Loaded, now);
        }
        return;
    }

    let params = state.params;
    let raw_duration = params
        .duration
        .unwrap_or_else(|| buffer.duration() - params.offset);
    let trim_duration =
        raw_duration * params.duration_ratio - lossy_tail_padding(&inner.uri);
    let prepared = inner.stretcher.stretched_trimmed_buffer(
        &buffer,
        params.time_stretch_ratio,
        params.offset,
        trim_duration,
    );

    let mut graph = inner.backend.build_graph(Arc::new(prepared));
    // Starting mid-sample, the fade-in straddles the cut: start early
    // by the offset, capped at half the fade.
    let ideal_start = play_time - params.offset.min(inner.fade_length / 2.0);
    graph.start(to_future(ideal_start, now), 0.0);
    apply_all_params(graph.as_mut(), &params);

    state.graph = Some(graph);
    state.is_scheduled = true;
    state.status = ObjectStatus::Scheduled;

    let weak = Arc::downgrade(inner);
    let playing_event = inner.timeline.schedule(to_future(play_time, now), move |time| {
        if let Some(inner) = weak.upgrade() {
            let mut state = inner.state.lock();
            if state.status == ObjectStatus::Scheduled {
                state.status = ObjectStatus::Playing;
                drop(state);
                inner.emitter.emit(ObjectStatus::Playing, time);
            }
        }
    });
    state.pending.push(playing_event);

    let duration =
        trim_duration / params.time_stretch_ratio / params.playback_rate;
    let stop_at = to_future(play_time + duration, now);
    let weak = Arc::downgrade(inner);
    let stop_event = inner.timeline.schedule(stop_at, move |time| {
        if let Some(inner) = weak.upgrade() {
            task_stop(&inner, time);
        }
    });
    state.pending.push(stop_event);
    drop(state);

    // An on-time connect lets the shared windows decay back toward
    // their floor.
    {
        let mut timings = inner.timings.lock();
        timings.connect_to_graph.shrink(ON_TIME_DECAY);
        timings.load_buffer.shrink(ON_TIME_DECAY);
    }

    if newly_loaded {
        inner.emitter.emit(ObjectStatus::Loaded, now);
    }
    inner.emitter.emit(ObjectStatus::Scheduled, now);
}

/// Stop phase: fade out, stop the source, chain dispose and free.
fn task_stop(inner: &Arc<AudioInner>, time: f64) {
    let timing = *inner.timings.lock();
    let fade = inner.fade_length;
    let faded = time + fade;

    let mut state = inner.state.lock();
    if matches!(
        state.status,
        ObjectStatus::Stopped | ObjectStatus::Disposed | ObjectStatus::Freed
    ) {
        return;
    }
    if let Some(graph) = state.graph.as_mut() {
        graph.ramp_gain(GraphNode::Player, 0.0, fade, time);
        graph.stop(faded);
    }
    state.status = ObjectStatus::Stopped;

    let weak = Arc::downgrade(inner);
    let dispose_event = inner
        .timeline
        .schedule(faded + timing.connect_to_graph.count_out, move |time| {
            if let Some(inner) = weak.upgrade() {
                task_dispose(&inner, time);
            }
        });
    let weak = Arc::downgrade(inner);
    let free_event = inner
        .timeline
        .schedule(faded + timing.load_buffer.count_out, move |time| {
            if let Some(inner) = weak.upgrade() {
                free_object(&inner, time);
            }
        });
    state.pending.push(dispose_event);
    state.pending.push(free_event);
    drop(state);

    inner.emitter.emit(ObjectStatus::Stopped, time);
}

fn task_dispose(inner: &Arc<AudioInner>, time: f64) {
    let mut state = inner.state.lock();
    if let Some(mut graph) = state.graph.take() {
        graph.dispose();
    }
    state.status = ObjectStatus::Disposed;
    drop(state);
    inner.emitter.emit(ObjectStatus::Disposed, time);
}

/// Terminal transition: drop the buffer reference and give the bank a
/// chance to evict.
fn free_object(inner: &Arc<AudioInner>, time: f64) {
    let mut state = inner.state.lock();
    if state.status == ObjectStatus::Freed {
        return;
    }
    if let Some(mut graph) = state.graph.take() {
        graph.dispose();
    }
    cancel_pending(&inner.timeline, &mut state);
    state.buffer = None;
    state.fetch = None;
    state.status = ObjectStatus::Freed;
    drop(state);

    inner.bank.release(&inner.uri, time);
    inner.emitter.emit(ObjectStatus::Freed, time);
}

fn lossy_tail_padding(uri: &str) -> f64 {
    if uri.ends_with(".mp3") || uri.ends_with(".m4a") {
        END_SILENCE_COMPENSATION
    } else {
        0.0
    }
}

fn apply_all_params(graph: &mut dyn PlaybackGraph, params: &ParameterTable) {
    graph.set_gain(GraphNode::Player, params.amplitude);
    graph.set_gain(GraphNode::Reverb, params.reverb * 2.0);
    graph.set_gain(GraphNode::Delay, params.delay);
    let [x, y, z] = params.panning;
    graph.set_panner_position(x, y, z);
    graph.set_playback_rate(params.playback_rate);
}

impl ScheduledObject for AudioObject {
    fn schedule_time(&self) -> RefTimeWithOnset {
        self.inner.state.lock().schedule_time
    }

    fn duration(&self) -> Option<f64> {
        let state = self.inner.state.lock();
        let raw = match state.params.duration {
            Some(d) => d,
            None => state.buffer.as_ref()?.duration() - state.params.offset,
        };
        let trimmed = raw * state.params.duration_ratio - lossy_tail_padding(&self.inner.uri);
        Some(trimmed / state.params.time_stretch_ratio / state.params.playback_rate)
    }

    fn set(&self, parameter: Parameter, value: ParamValue) -> Result<()> {
        let mut state = self.inner.state.lock();
        match parameter {
            Parameter::Amplitude => {
                state.params.amplitude = value.single("Amplitude")?;
                let amplitude = state.params.amplitude;
                if let Some(graph) = state.graph.as_mut() {
                    graph.set_gain(GraphNode::Player, amplitude);
                }
            }
            Parameter::Reverb => {
                state.params.reverb = value.single("Reverb")?;
                let reverb = state.params.reverb;
                if let Some(graph) = state.graph.as_mut() {
                    graph.set_gain(GraphNode::Reverb, reverb * 2.0);
                }
            }
            Parameter::Delay => {
                state.params.delay = value.single("Delay")?;
                let delay = state.params.delay;
                if let Some(graph) = state.graph.as_mut() {
                    graph.set_gain(GraphNode::Delay, delay);
                }
            }
            Parameter::Panning => {
                state.params.panning = value.triple("Panning")?;
                let [x, y, z] = state.params.panning;
                if let Some(graph) = state.graph.as_mut() {
                    graph.set_panner_position(x, y, z);
                }
            }
            Parameter::PlaybackRate => {
                state.params.playback_rate = value.single("PlaybackRate")?;
                let rate = state.params.playback_rate;
                if let Some(graph) = state.graph.as_mut() {
                    graph.set_playback_rate(rate);
                }
            }
            Parameter::StartTime => {
                if state.is_scheduled {
                    return Err(Error::InvalidState {
                        parameter: "StartTime",
                        committed: "the playback graph is built",
                    });
                }
                state.schedule_time = RefTimeWithOnset::new(value.single("StartTime")?);
                drop(state);
                update_start_events(&self.inner);
            }
            Parameter::Duration => {
                if state.is_scheduled {
                    return Err(Error::InvalidState {
                        parameter: "Duration",
                        committed: "the playback graph is built",
                    });
                }
                state.params.duration = Some(value.single("Duration")?);
            }
            Parameter::DurationRatio => {
                if state.is_scheduled {
                    return Err(Error::InvalidState {
                        parameter: "DurationRatio",
                        committed: "the playback graph is built",
                    });
                }
                state.params.duration_ratio = value.single("DurationRatio")?;
            }
            Parameter::TimeStretchRatio => {
                if state.buffer.is_some() {
                    return Err(Error::InvalidState {
                        parameter: "TimeStretchRatio",
                        committed: "the buffer is loaded",
                    });
                }
                state.params.time_stretch_ratio = value.single("TimeStretchRatio")?;
            }
            Parameter::Offset => {
                if state.buffer.is_some() {
                    return Err(Error::InvalidState {
                        parameter: "Offset",
                        committed: "the buffer is loaded",
                    });
                }
                state.params.offset = value.single("Offset")?;
            }
        }
        Ok(())
    }

    fn ramp(&self, parameter: Parameter, target: f64, duration: f64, time: f64) -> Result<()> {
        let mut state = self.inner.state.lock();
        let (node, scaled) = match parameter {
            Parameter::Amplitude => {
                state.params.amplitude = target;
                (GraphNode::Player, target)
            }
            Parameter::Reverb => {
                state.params.reverb = target;
                (GraphNode::Reverb, target * 2.0)
            }
            Parameter::Delay => {
                state.params.delay = target;
                (GraphNode::Delay, target)
            }
            other => {
                return Err(Error::InvalidConfig(format!(
                    "{other:?} cannot be ramped"
                )))
            }
        };
        if let Some(graph) = state.graph.as_mut() {
            graph.ramp_gain(node, scaled, duration, time);
        }
        Ok(())
    }

    fn stop(&self, time: f64) {
        let now = self.inner.timeline.now();
        let mut state = self.inner.state.lock();
        match state.status {
            ObjectStatus::Stopped
            | ObjectStatus::Disposed
            | ObjectStatus::Freed => {}
            ObjectStatus::Created | ObjectStatus::Loaded => {
                // Nothing audible yet, so the teardown chain runs in
                // one step, still announcing every transition.
                cancel_pending(&self.inner.timeline, &mut state);
                state.status = ObjectStatus::Stopped;
                drop(state);
                self.inner.emitter.emit(ObjectStatus::Stopped, now);
                task_dispose(&self.inner, now);
                free_object(&self.inner, now);
            }
            ObjectStatus::Scheduled | ObjectStatus::Playing => {
                cancel_pending(&self.inner.timeline, &mut state);
                let weak = Arc::downgrade(&self.inner);
                let stop_event =
                    self.inner
                        .timeline
                        .schedule(to_future(time, now), move |time| {
                            if let Some(inner) = weak.upgrade() {
                                task_stop(&inner, time);
                            }
                        });
                state.pending.push(stop_event);
            }
        }
    }

    fn on_status(&self, status: ObjectStatus, callback: StatusCallback) {
        self.inner.emitter.on(status, callback);
    }
}

struct EventInner {
    timeline: Timeline,
    emitter: Emitter,
    state: Mutex<EventState>,
}

struct EventState {
    schedule_time: RefTimeWithOnset,
    pending: Option<EventId>,
    trigger: Option<Box<dyn FnMut(f64) + Send>>,
    fired: bool,
}

/// A bare callback placed on the timeline, sharing the scheduling
/// surface with audio objects.
#[derive(Clone)]
pub struct EventObject {
    inner: Arc<EventInner>,
}

impl EventObject {
    pub fn new(
        schedule_time: RefTimeWithOnset,
        timeline: Timeline,
        trigger: Box<dyn FnMut(f64) + Send>,
    ) -> Self {
        Self {
            inner: Arc::new(EventInner {
                timeline,
                emitter: Emitter::default(),
                state: Mutex::new(EventState {
                    schedule_time,
                    pending: None,
                    trigger: Some(trigger),
                    fired: false,
                }),
            }),
        }
    }

    pub fn activate(&self) {
        let inner = &self.inner;
        let now = inner.timeline.now();
        let mut state = inner.state.lock();
        if let Some(id) = state.pending.take() {
            inner.timeline.cancel(id);
        }
        let at = to_future(state.schedule_time.absolute(), now);
        let weak = Arc::downgrade(inner);
        // The event has a single phase: it announces Scheduled at the
        // instant it fires its trigger.
        state.pending = Some(inner.timeline.schedule(at, move |time| {
            if let Some(inner) = weak.upgrade() {
                let mut state = inner.state.lock();
                state.pending = None;
                state.fired = true;
                let trigger = state.trigger.take();
                drop(state);
                if let Some(mut trigger) = trigger {
                    trigger(time);
                }
                inner.emitter.emit(ObjectStatus::Scheduled, time);
            }
        }));
    }
}

impl ScheduledObject for EventObject {
    fn schedule_time(&self) -> RefTimeWithOnset {
        self.inner.state.lock().schedule_time
    }

    fn duration(&self) -> Option<f64> {
        Some(0.0)
    }

    fn set(&self, parameter: Parameter, value: ParamValue) -> Result<()> {
        match parameter {
            Parameter::StartTime => {
                let mut state = self.inner.state.lock();
                if state.fired {
                    return Err(Error::InvalidState {
                        parameter: "StartTime",
                        committed: "the event has fired",
                    });
                }
                state.schedule_time = RefTimeWithOnset::new(value.single("StartTime")?);
                drop(state);
                self.activate();
                Ok(())
            }
            other => Err(Error::InvalidConfig(format!(
                "events have no {other:?} parameter"
            ))),
        }
    }

    fn ramp(&self, parameter: Parameter, _target: f64, _duration: f64, _time: f64) -> Result<()> {
        Err(Error::InvalidConfig(format!(
            "events have no {parameter:?} parameter"
        )))
    }

    fn stop(&self, _time: f64) {
        let mut state = self.inner.state.lock();
        if let Some(id) = state.pending.take() {
            self.inner.timeline.cancel(id);
        }
        state.fired = true;
    }

    fn on_status(&self, status: ObjectStatus, callback: StatusCallback) {
        self.inner.emitter.on(status, callback);
    }
}
