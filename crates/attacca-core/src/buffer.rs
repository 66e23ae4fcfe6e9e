//! Decoded audio buffer type.

/// A decoded, planar audio buffer.
///
/// Channels are stored non-interleaved; all channels have equal length.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    sample_rate: f64,
    channels: Vec<Vec<f32>>,
}

impl AudioBuffer {
    /// Create a buffer from planar channel data.
    ///
    /// # Panics
    ///
    /// Panics in debug mode if channels differ in length.
    pub fn new(sample_rate: f64, channels: Vec<Vec<f32>>) -> Self {
        debug_assert!(
            channels.windows(2).all(|w| w[0].len() == w[1].len()),
            "all channels must have equal length"
        );
        Self {
            sample_rate,
            channels,
        }
    }

    /// Create a silent buffer.
    pub fn silent(sample_rate: f64, channels: usize, frames: usize) -> Self {
        Self {
            sample_rate,
            channels: vec![vec![0.0; frames]; channels],
        }
    }

    /// Create a single-channel buffer from samples.
    pub fn from_mono(sample_rate: f64, samples: Vec<f32>) -> Self {
        Self {
            sample_rate,
            channels: vec![samples],
        }
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    /// Number of channels.
    pub fn channels(&self) -> usize {
        self.channels.len()
    }

    /// Length in frames.
    pub fn len(&self) -> usize {
        self.channels.first().map_or(0, |c| c.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Duration in seconds.
    pub fn duration(&self) -> f64 {
        self.len() as f64 / self.sample_rate
    }

    /// Samples of one channel.
    pub fn channel(&self, index: usize) -> &[f32] {
        &self.channels[index]
    }

    /// Mutable samples of one channel.
    pub fn channel_mut(&mut self, index: usize) -> &mut [f32] {
        &mut self.channels[index]
    }

    /// Convert seconds to a frame count at this buffer's rate.
    pub fn to_samples(&self, seconds: f64) -> usize {
        (seconds * self.sample_rate).round().max(0.0) as usize
    }

    /// Sample-accurate slice copy across all channels.
    ///
    /// The copy length is clamped to the frames actually available past
    /// `from_sample`; the input is never mutated.
    pub fn sub_buffer(&self, from_sample: usize, duration_samples: usize) -> AudioBuffer {
        let from = from_sample.min(self.len());
        let samples_to_copy = (self.len() - from).min(duration_samples);
        let channels = self
            .channels
            .iter()
            .map(|c| c[from..from + samples_to_copy].to_vec())
            .collect();
        AudioBuffer {
            sample_rate: self.sample_rate,
            channels,
        }
    }
}
