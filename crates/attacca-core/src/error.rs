//! Error types.

use thiserror::Error;

/// Error type for scheduling operations.
#[derive(Error, Debug, Clone)]
pub enum Error {
    /// Decoding an audio source failed.
    #[error("Failed to decode '{uri}': {message}")]
    Decode { uri: String, message: String },

    /// A playback mode combination that cannot be scheduled.
    #[error("Unsupported playback mode: {0}")]
    UnsupportedMode(String),

    /// A parameter was mutated after the object committed to it.
    #[error("Parameter {parameter} is frozen once {committed}")]
    InvalidState {
        parameter: &'static str,
        committed: &'static str,
    },

    /// Invalid configuration value.
    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    /// Invalid tempo.
    #[error("Invalid tempo: {0}. Must be between 20.0 and 999.0 BPM")]
    InvalidTempo(f64),
}

/// Result type alias.
pub type Result<T> = core::result::Result<T, Error>;
