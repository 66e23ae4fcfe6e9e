//! Scheduling facade.
//!
//! The [`Scheduler`] owns the timeline, the buffer bank, and the graph
//! backend, resolves abstract time points into concrete reference
//! times, and turns playback requests into scheduled objects.

use std::sync::Arc;

use attacca_core::{
    DynamicBufferLifeCycle, Error, RefTimeWithOnset, Result, Subdivision, Timeline,
};
use parking_lot::Mutex;
use tracing::debug;

use crate::bank::{BufferBank, Decode, WavDecoder};
use crate::graph::{GraphBackend, OfflineBackend};
use crate::loops::{calculate_schedule_times, to_buffer_segment, LoopOptions, Segment};
use crate::object::{
    default_audibility, AudibilityCheck, AudioObject, EventObject, ObjectRef, ObjectStatus,
    ParamValue, Parameter, ScheduledObject,
};

/// Abstract schedule time, resolved against the timeline at call time.
pub enum TimePoint {
    /// As soon as possible.
    Asap,
    /// Absolute timeline seconds.
    At(f64),
    /// `delta` seconds from now, kept as an onset on the current time.
    In(f64),
    /// The next beat or bar boundary under the current tempo and meter.
    Next(Subdivision),
    /// When the last of the given objects has ended, less the fade so
    /// consecutive material overlaps seamlessly.
    After(Vec<ObjectRef>),
    /// A fixed delta from another object's reference time.
    RelativeTo { object: ObjectRef, delta: f64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum PlaybackKind {
    #[default]
    Oneshot,
    Loop {
        times: usize,
    },
}

/// What to play of each source and how often.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PlaybackMode {
    /// Seconds into the source. `None` plays from the start.
    pub offset: Option<f64>,
    /// Seconds to play. `None` plays to the end.
    pub duration: Option<f64>,
    pub kind: PlaybackKind,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TransitionMode {
    Immediate,
    CrossFade { duration: f64 },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StopMode {
    Immediate,
    FadeOut { duration: f64 },
}

/// When buffers are decoded relative to scheduling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BufferScheme {
    /// Decode synchronously at schedule time.
    #[default]
    Preload,
    /// Decode in the look-ahead window before playback.
    Dynamic,
}

pub struct SchedulerConfig {
    /// Length of the fade applied at every start and stop edge.
    pub fade_length: f64,
    pub buffer_scheme: BufferScheme,
    pub timings: DynamicBufferLifeCycle,
    pub audibility: AudibilityCheck,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            fade_length: 0.01,
            buffer_scheme: BufferScheme::default(),
            timings: DynamicBufferLifeCycle::default(),
            audibility: default_audibility,
        }
    }
}

pub struct SchedulerBuilder {
    config: SchedulerConfig,
    decoder: Option<Arc<dyn Decode>>,
    backend: Option<Arc<dyn GraphBackend>>,
}

impl SchedulerBuilder {
    pub fn config(mut self, config: SchedulerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn fade_length(mut self, fade_length: f64) -> Self {
        self.config.fade_length = fade_length;
        self
    }

    pub fn buffer_scheme(mut self, scheme: BufferScheme) -> Self {
        self.config.buffer_scheme = scheme;
        self
    }

    pub fn timings(mut self, timings: DynamicBufferLifeCycle) -> Self {
        self.config.timings = timings;
        self
    }

    pub fn audibility(mut self, check: AudibilityCheck) -> Self {
        self.config.audibility = check;
        self
    }

    pub fn decoder(mut self, decoder: Arc<dyn Decode>) -> Self {
        self.decoder = Some(decoder);
        self
    }

    pub fn backend(mut self, backend: Arc<dyn GraphBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    pub fn build(self) -> Scheduler {
        let decoder = self.decoder.unwrap_or_else(|| Arc::new(WavDecoder));
        let backend = self
            .backend
            .unwrap_or_else(|| Arc::new(OfflineBackend::new()));
        let timings = Arc::new(Mutex::new(self.config.timings));
        Scheduler {
            timeline: Timeline::new(),
            bank: BufferBank::new(decoder, Arc::clone(&timings)),
            backend,
            timings,
            fade_length: self.config.fade_length,
            buffer_scheme: self.config.buffer_scheme,
            audibility: self.config.audibility,
        }
    }
}

pub struct Scheduler {
    timeline: Timeline,
    bank: BufferBank,
    backend: Arc<dyn GraphBackend>,
    timings: Arc<Mutex<DynamicBufferLifeCycle>>,
    fade_length: f64,
    buffer_scheme: BufferScheme,
    audibility: AudibilityCheck,
}

impl Scheduler {
    pub fn builder() -> SchedulerBuilder {
        SchedulerBuilder {
            config: SchedulerConfig::default(),
            decoder: None,
            backend: None,
        }
    }

    pub fn timeline(&self) -> &Timeline {
        &self.timeline
    }

    pub fn now(&self) -> f64 {
        self.timeline.now()
    }

    pub fn set_tempo(&self, bpm: f64) -> Result<()> {
        self.timeline.set_tempo(bpm)
    }

    pub fn set_meter(&self, numerator: u32, denominator: u32) -> Result<()> {
        self.timeline.set_meter(numerator, denominator)
    }

    /// Spawn a wall-clock driver for this scheduler's timeline. The
    /// returned handle pauses and resumes the transport.
    pub fn drive(&self, tick: std::time::Duration) -> attacca_core::TimelineDriver {
        attacca_core::TimelineDriver::spawn(self.timeline.clone(), tick)
    }

    /// Resolve an abstract time point into a reference time.
    pub fn resolve_time(&self, time: &TimePoint) -> RefTimeWithOnset {
        let now = self.timeline.now();
        match time {
            TimePoint::Asap => RefTimeWithOnset::new(now),
            TimePoint::At(t) => RefTimeWithOnset::new(*t),
            TimePoint::In(delta) => RefTimeWithOnset::with_onset(now, *delta),
            TimePoint::Next(subdivision) => {
                RefTimeWithOnset::new(self.timeline.next_subdivision(*subdivision))
            }
            TimePoint::After(objects) => {
                let end = objects
                    .iter()
                    .map(|o| o.end_time().unwrap_or_else(|| o.schedule_time().absolute()))
                    .fold(now, f64::max);
                RefTimeWithOnset::new(end - self.fade_length)
            }
            TimePoint::RelativeTo { object, delta } => {
                RefTimeWithOnset::with_onset(object.schedule_time().absolute(), *delta)
            }
        }
    }

    /// Schedule one or more sources for playback.
    ///
    /// Oneshot mode creates one object per source at the resolved time.
    /// Loop mode runs the loop scheduler over the (preloaded) sources
    /// and creates one object per repeat window; looping requires
    /// [`BufferScheme::Preload`] because the windows depend on every
    /// source's duration.
    pub fn schedule_audio(
        &self,
        uris: &[&str],
        time: TimePoint,
        mode: PlaybackMode,
    ) -> Result<Vec<AudioObject>> {
        let resolved = self.resolve_time(&time);
        let now = self.timeline.now();

        match mode.kind {
            PlaybackKind::Oneshot => {
                if self.buffer_scheme == BufferScheme::Preload {
                    // Warm the bank so the load phase finds the decode
                    // already in flight.
                    for uri in uris {
                        let _ = self.bank.fetch(uri, now);
                    }
                }
                let objects = uris
                    .iter()
                    .map(|uri| self.spawn_object(uri, resolved, mode.offset, mode.duration))
                    .collect::<Result<Vec<_>>>()?;
                for object in &objects {
                    object.activate();
                }
                Ok(objects)
            }
            PlaybackKind::Loop { times } => {
                if self.buffer_scheme == BufferScheme::Dynamic {
                    return Err(Error::UnsupportedMode(
                        "looped playback requires preloaded buffers".into(),
                    ));
                }
                let segments = uris
                    .iter()
                    .map(|uri| {
                        let buffer = self.bank.fetch(uri, now).wait()?;
                        let desired = mode.duration.map(|duration| Segment {
                            offset: mode.offset.unwrap_or(0.0),
                            duration,
                        });
                        Ok(to_buffer_segment(buffer.duration(), desired))
                    })
                    .collect::<Result<Vec<_>>>()?;

                let options = LoopOptions {
                    schedule_time_offset: resolved.absolute(),
                    ..LoopOptions::default()
                };
                let schedule = calculate_schedule_times(times, &segments, &options);
                debug!(
                    repeats = times,
                    duration = schedule.duration,
                    "loop schedule computed"
                );

                let mut objects = Vec::new();
                for (uri, windows) in uris.iter().zip(&schedule.times) {
                    for window in windows {
                        let object = self.spawn_object(
                            uri,
                            RefTimeWithOnset::new(window.start_time),
                            Some(window.offset),
                            Some(window.duration),
                        )?;
                        objects.push(object);
                    }
                }
                for object in &objects {
                    object.activate();
                }
                Ok(objects)
            }
        }
    }

    /// Schedule a bare callback.
    pub fn schedule_event(
        &self,
        time: TimePoint,
        trigger: Box<dyn FnMut(f64) + Send>,
    ) -> EventObject {
        let resolved = self.resolve_time(&time);
        let event = EventObject::new(resolved, self.timeline.clone(), trigger);
        event.activate();
        event
    }

    /// Replace `from` with the given sources at `time`.
    ///
    /// With [`TransitionMode::CrossFade`] the new material comes in at
    /// zero amplitude and ramps up once its graph is built, while the
    /// old material ramps out over the same span before stopping.
    pub fn transition(
        &self,
        from: &[ObjectRef],
        to_uris: &[&str],
        time: TimePoint,
        mode: TransitionMode,
        playback: PlaybackMode,
    ) -> Result<Vec<AudioObject>> {
        let resolved = self.resolve_time(&time);
        let fade = match mode {
            TransitionMode::Immediate => 0.0,
            TransitionMode::CrossFade { duration } => duration,
        };

        let objects = self.schedule_audio(to_uris, TimePoint::At(resolved.absolute()), playback)?;
        if fade > 0.0 {
            for object in &objects {
                object.set(Parameter::Amplitude, ParamValue::Single(0.0))?;
                let weak = object.downgrade();
                object.on_status(
                    ObjectStatus::Scheduled,
                    Box::new(move |time| {
                        if let Some(object) = AudioObject::upgrade(&weak) {
                            let _ = object.ramp(Parameter::Amplitude, 1.0, fade, time);
                        }
                    }),
                );
            }
        }

        let at = resolved.absolute();
        for old in from {
            let old = Arc::clone(old);
            self.timeline.schedule(at, move |time| {
                if fade > 0.0 {
                    let _ = old.ramp(Parameter::Amplitude, 0.0, fade, time);
                }
                old.stop(time + fade);
            });
        }
        Ok(objects)
    }

    /// Stop the given objects at `time`.
    pub fn stop_audio(&self, objects: &[ObjectRef], time: TimePoint, mode: StopMode) {
        let at = self.resolve_time(&time).absolute();
        match mode {
            StopMode::Immediate => {
                for object in objects {
                    object.stop(at);
                }
            }
            StopMode::FadeOut { duration } => {
                for object in objects {
                    let object = Arc::clone(object);
                    self.timeline.schedule(at, move |time| {
                        let _ = object.ramp(Parameter::Amplitude, 0.0, duration, time);
                        object.stop(time + duration);
                    });
                }
            }
        }
    }

    fn spawn_object(
        &self,
        uri: &str,
        at: RefTimeWithOnset,
        offset: Option<f64>,
        duration: Option<f64>,
    ) -> Result<AudioObject> {
        let object = AudioObject::new(
            uri,
            at,
            self.timeline.clone(),
            self.bank.clone(),
            Arc::clone(&self.backend),
            Arc::clone(&self.timings),
            self.fade_length,
            self.audibility,
        );
        if let Some(offset) = offset {
            object.set(Parameter::Offset, ParamValue::Single(offset))?;
        }
        if let Some(duration) = duration {
            object.set(Parameter::Duration, ParamValue::Single(duration))?;
        }
        Ok(object)
    }
}
