//! Synthesis backends
//!
//! Implementations of [`SynthBackend`](super::SynthBackend) the registry
//! probes in priority order. The wavetable engine needs an external patch
//! set and can legitimately fail to initialize; the FM engine is the
//! always-available fallback and cannot.

mod fm;
mod wavetable;

pub use fm::{FM_SAMPLE_RATE, FmSynth};
pub use wavetable::{WAVETABLE_SAMPLE_RATE, WavetableSynth};

/// Equal-tempered frequency of a MIDI key (A4 = 69 = 440 Hz)
pub(crate) fn note_frequency(key: u8) -> f32 {
    440.0 * f32::powf(2.0, (key as f32 - 69.0) / 12.0)
}

/// Clamp a mixed float sample to the 16-bit output range
pub(crate) fn mix_to_i16(sample: f32) -> i16 {
    (sample * 32767.0).clamp(-32768.0, 32767.0) as i16
}
