//! Sample-accurate audio event scheduling engine.
//!
//! Combines a buffer bank with background decoding, loop segmentation,
//! pitch-preserving time-stretching, and a lifecycle state machine for
//! scheduled objects, all driven by the shared timeline from
//! `attacca-core`.

pub mod bank;
pub mod graph;
pub mod loops;
pub mod object;
pub mod scheduler;
pub mod stretch;

pub use bank::{BufferBank, Decode, FetchHandle, WavDecoder};
pub use graph::{GraphBackend, GraphNode, GraphOp, OfflineBackend, PlaybackGraph};
pub use loops::{
    calculate_schedule_times, to_buffer_segment, BufferSegment, LoopOptions, LoopPolicy,
    LoopSchedule, LoopWindow, Segment, TailMode,
};
pub use object::{
    default_audibility, AudibilityCheck, AudioObject, EventObject, ObjectRef, ObjectStatus,
    ParamValue, Parameter, ParameterTable, ScheduledObject,
};
pub use scheduler::{
    BufferScheme, PlaybackKind, PlaybackMode, Scheduler, SchedulerBuilder, SchedulerConfig,
    StopMode, TimePoint, TransitionMode,
};
pub use stretch::TimeStretcher;
