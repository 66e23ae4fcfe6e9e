//! Pitch-preserving time-stretching and sample-accurate trimming.
//!
//! STFT phase vocoder: Hann-windowed analysis frames, phase unwrapping
//! and accumulation, inverse FFT and overlap-add at a synthesis hop
//! scaled by the stretch ratio. Operates offline, buffer in, buffer out;
//! the input is never mutated.

use attacca_core::AudioBuffer;
use rustfft::{num_complex::Complex, FftPlanner};
use std::f32::consts::PI;

/// Lookahead context the stretch windowing needs past the requested
/// duration, in seconds.
const STRETCH_GUARD_ZONE: f64 = 0.3;

const FFT_SIZE: usize = 2048;
const HOP_ANALYSIS: usize = 512;

/// Trims, pads, and pitch-preserve-stretches decoded buffers.
pub struct TimeStretcher {
    fade_length: f64,
}

impl TimeStretcher {
    pub fn new(fade_length: f64) -> Self {
        Self { fade_length }
    }

    /// Extract `[offset, offset + duration]` from `buffer` and stretch it
    /// by `stretch_ratio` without shifting pitch.
    ///
    /// Ratio > 1 speeds up (shortens), ratio < 1 slows down, ratio == 1
    /// bypasses the vocoder and only trims. The trim keeps a guard zone
    /// past the requested duration (stretch lookahead when stretching,
    /// otherwise fade headroom) so the fade-out and the stretch windows
    /// never run out of frames.
    pub fn stretched_trimmed_buffer(
        &self,
        buffer: &AudioBuffer,
        stretch_ratio: f64,
        offset: f64,
        duration: f64,
    ) -> AudioBuffer {
        let mut duration = duration;
        let needs_trim = offset != 0.0 || duration < buffer.duration();

        let working;
        let source = if needs_trim {
            duration += if stretch_ratio != 1.0 {
                STRETCH_GUARD_ZONE
            } else {
                self.fade_length
            };
            working = buffer.sub_buffer(buffer.to_samples(offset), buffer.to_samples(duration));
            &working
        } else {
            buffer
        };

        if stretch_ratio != 1.0 {
            let stretched = phase_vocoder_stretch(source, stretch_ratio as f32);
            // Trim the stretched result back down to the intended
            // post-stretch duration plus fade headroom.
            let target = duration / stretch_ratio + self.fade_length;
            let target_samples = stretched.to_samples(target);
            stretched.sub_buffer(0, target_samples)
        } else {
            source.clone()
        }
    }
}

/// Stretch every channel to `len × (1/ratio)` frames at constant pitch.
fn phase_vocoder_stretch(buffer: &AudioBuffer, ratio: f32) -> AudioBuffer {
    let hop_synthesis = ((HOP_ANALYSIS as f32 / ratio).round() as usize).max(1);
    let out_len = (buffer.len() as f64 / ratio as f64).ceil() as usize;

    let mut planner = FftPlanner::<f32>::new();
    let forward = planner.plan_fft_forward(FFT_SIZE);
    let inverse = planner.plan_fft_inverse(FFT_SIZE);

    let window = hann_window(FFT_SIZE);
    // Expected phase advance per bin per analysis hop.
    let expected: Vec<f32> = (0..FFT_SIZE)
        .map(|k| 2.0 * PI * k as f32 * HOP_ANALYSIS as f32 / FFT_SIZE as f32)
        .collect();

    let channels = (0..buffer.channels())
        .map(|ch| {
            stretch_channel(
                buffer.channel(ch),
                out_len,
                hop_synthesis,
                forward.as_ref(),
                inverse.as_ref(),
                &window,
                &expected,
            )
        })
        .collect();

    AudioBuffer::new(buffer.sample_rate(), channels)
}

#[allow(clippy::too_many_arguments)]
fn stretch_channel(
    input: &[f32],
    out_len: usize,
    hop_synthesis: usize,
    forward: &dyn rustfft::Fft<f32>,
    inverse: &dyn rustfft::Fft<f32>,
    window: &[f32],
    expected: &[f32],
) -> Vec<f32> {
    // Room for the overlap tail of the final frame; truncated at the end.
    let mut output = vec![0.0f32; out_len + FFT_SIZE];
    let mut envelope = vec![0.0f32; out_len + FFT_SIZE];
    let mut last_phase = vec![0.0f32; FFT_SIZE];
    let mut phase_acc = vec![0.0f32; FFT_SIZE];
    let mut spectrum = vec![Complex::new(0.0f32, 0.0); FFT_SIZE];

    let hop_ratio = hop_synthesis as f32 / HOP_ANALYSIS as f32;
    let scale = 1.0 / FFT_SIZE as f32;

    let mut frame = 0;
    while frame * HOP_ANALYSIS < input.len() {
        let in_pos = frame * HOP_ANALYSIS;

        // Analysis: windowed frame, zero-padded past the input end.
        for (i, bin) in spectrum.iter_mut().enumerate() {
            let sample = input.get(in_pos + i).copied().unwrap_or(0.0);
            *bin = Complex::new(sample * window[i], 0.0);
        }
        forward.process(&mut spectrum);

        // Phase propagation: accumulate the true per-bin frequency at
        // the synthesis hop so pitch survives the changed frame spacing.
        for k in 0..FFT_SIZE {
            let magnitude = spectrum[k].norm();
            let phase = spectrum[k].arg();
            let deviation = wrap_phase(phase - last_phase[k] - expected[k]);
            last_phase[k] = phase;

            let true_freq = expected[k] + deviation;
            phase_acc[k] = wrap_phase(phase_acc[k] + true_freq * hop_ratio);
            spectrum[k] = Complex::from_polar(magnitude, phase_acc[k]);
        }

        // Synthesis: inverse FFT, window again, overlap-add.
        inverse.process(&mut spectrum);
        let out_pos = frame * hop_synthesis;
        for i in 0..FFT_SIZE {
            if out_pos + i >= output.len() {
                break;
            }
            output[out_pos + i] += spectrum[i].re * scale * window[i];
            envelope[out_pos + i] += window[i] * window[i];
        }

        frame += 1;
    }

    // Compensate the squared-window overlap so amplitude is hop-invariant.
    for (sample, env) in output.iter_mut().zip(&envelope) {
        if *env > 1e-6 {
            *sample /= env;
        }
    }
    output.truncate(out_len);
    output
}

fn hann_window(size: usize) -> Vec<f32> {
    (0..size)
        .map(|i| 0.5 * (1.0 - (2.0 * PI * i as f32 / size as f32).cos()))
        .collect()
}

#[inline]
fn wrap_phase(phase: f32) -> f32 {
    let mut p = phase;
    while p > PI {
        p -= 2.0 * PI;
    }
    while p < -PI {
        p += 2.0 * PI;
    }
    p
}
