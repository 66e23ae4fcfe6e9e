//! Core timeline runtime for the attacca scheduler.
//!
//! Provides the shared transport timeline, the schedule-time model with
//! adaptive look-ahead windows, and the decoded audio buffer type.

pub mod error;
pub use error::{Error, Result};

pub mod buffer;
pub use buffer::AudioBuffer;

pub mod lockfree;
pub use lockfree::AtomicDouble;

pub mod time;
pub use time::{DynamicBufferLifeCycle, LifeCycleWindow, RefTimeWithOnset};

pub mod timeline;
pub use timeline::{EventId, Subdivision, Timeline, TimelineDriver};
