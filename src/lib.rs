//! # Attacca - Sample-accurate audio event scheduler
//!
//! Umbrella crate that re-exports the two subsystems:
//! - **attacca-core** - Timeline, look-ahead windows, buffers, errors
//! - **attacca-engine** - Buffer bank, loop scheduler, time-stretcher,
//!   scheduled objects, and the scheduling facade
//!
//! ## Quick Start
//!
//! ```no_run
//! use attacca::prelude::*;
//!
//! # fn main() -> attacca::Result<()> {
//! let scheduler = Scheduler::builder().build();
//!
//! // Play a file four bars from now, looped twice.
//! scheduler.set_tempo(120.0)?;
//! let objects = scheduler.schedule_audio(
//!     &["loop.wav"],
//!     TimePoint::Next(Subdivision::Bar),
//!     PlaybackMode {
//!         kind: PlaybackKind::Loop { times: 2 },
//!         ..PlaybackMode::default()
//!     },
//! )?;
//!
//! // Fade everything out three seconds later.
//! let refs: Vec<ObjectRef> = objects
//!     .into_iter()
//!     .map(|o| std::sync::Arc::new(o) as ObjectRef)
//!     .collect();
//! scheduler.stop_audio(&refs, TimePoint::In(3.0), StopMode::FadeOut { duration: 0.5 });
//! # Ok(())
//! # }
//! ```

pub use attacca_core::{
    AudioBuffer, DynamicBufferLifeCycle, Error, EventId, LifeCycleWindow, RefTimeWithOnset,
    Result, Subdivision, Timeline, TimelineDriver,
};
pub use attacca_engine::{
    default_audibility, AudioObject, BufferBank, BufferScheme, Decode, EventObject, GraphBackend,
    GraphNode, GraphOp, ObjectRef, ObjectStatus, OfflineBackend, ParamValue, Parameter,
    PlaybackGraph,
    PlaybackKind, PlaybackMode, ScheduledObject, Scheduler, SchedulerBuilder, SchedulerConfig,
    StopMode, TimePoint, TimeStretcher, TransitionMode, WavDecoder,
};

/// Convenience imports for typical use.
pub mod prelude {
    pub use attacca_core::{
        AudioBuffer, DynamicBufferLifeCycle, RefTimeWithOnset, Subdivision, Timeline,
        TimelineDriver,
    };
    pub use attacca_engine::{
        AudioObject, BufferScheme, EventObject, ObjectRef, ObjectStatus, ParamValue, Parameter,
        PlaybackKind, PlaybackMode, ScheduledObject, Scheduler, StopMode, TimePoint,
        TransitionMode,
    };
}
