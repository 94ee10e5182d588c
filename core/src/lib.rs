//! Lorecore Core - simulation clock and audio decode pipeline
//!
//! This crate provides the real-time audio plumbing for Lorecore games:
//!
//! - [`GameClock`] / [`FixedStep`] - monotonic time and fixed-timestep pacing
//! - [`AudioDecoder`] - the contract every PCM source implements
//! - [`QoaDecoder`] - streaming music decode over `lore-qoa` streams
//! - [`SynthRegistry`] - MIDI synthesis backend selection with graceful
//!   degradation to the built-in FM fallback
//! - [`Resampler`] - decorator adapting any decoder to a target sample rate
//!
//! # Architecture
//!
//! A caller asks for a decoder (a `.lqa` music stream or a `.mid` file),
//! then drives it through the shared contract: negotiate the output format,
//! repeatedly fill PCM buffers, query position and end-of-stream, optionally
//! rewind. The game clock paces how often those fills happen; it has no
//! dependency on the audio side.

pub mod audio;
pub mod clock;

pub use audio::{
    AudioDecoder, AudioError, AudioFormat, MediaSource, QoaDecoder, Resampler, SampleEncoding,
    SharedSource, SynthBackend, SynthRegistry, SynthSession, shared_source,
};
pub use clock::{FixedStep, GameClock};
