//! Audio decode pipeline
//!
//! Every PCM source in Lorecore - streamed music, synthesized MIDI, the
//! resampling decorator - implements the same [`AudioDecoder`] contract, so
//! the playback side never cares where samples come from.
//!
//! Decoders are single-owner objects: one logical thread of control drives a
//! decoder at a time (typically the audio callback). The input stream is
//! shared ([`SharedSource`]), since the caller may keep its own handle to
//! the same stream; the decoder is just one holder among possibly several.

use std::fmt;
use std::io::{Read, Seek, SeekFrom};
use std::sync::{Arc, Mutex};

pub mod midi;
pub mod qoa;
pub mod resampler;
pub mod synth;

#[cfg(test)]
mod tests;

pub use midi::{MIDI_TARGET_RATE, MidiSynthDecoder, SynthBackend, SynthRegistry, SynthSession};
pub use qoa::QoaDecoder;
pub use resampler::Resampler;

use thiserror::Error;

/// Sample encoding of decoded PCM
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleEncoding {
    /// Interleaved signed 16-bit little-endian
    S16,
    /// Interleaved 32-bit float
    F32,
}

impl SampleEncoding {
    /// Size of one sample in bytes
    pub fn bytes_per_sample(self) -> usize {
        match self {
            SampleEncoding::S16 => 2,
            SampleEncoding::F32 => 4,
        }
    }
}

/// Output format of a decoder: rate, encoding, channel count
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioFormat {
    pub sample_rate: u32,
    pub encoding: SampleEncoding,
    pub channels: u16,
}

impl AudioFormat {
    pub const fn new(sample_rate: u32, encoding: SampleEncoding, channels: u16) -> Self {
        Self {
            sample_rate,
            encoding,
            channels,
        }
    }

    /// Size of one sample frame (one sample per channel) in bytes
    pub fn frame_bytes(&self) -> usize {
        self.encoding.bytes_per_sample() * self.channels as usize
    }
}

impl fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}Hz/{:?}/{}ch",
            self.sample_rate, self.encoding, self.channels
        )
    }
}

/// Errors crossing the decoder contract boundary
///
/// Backend-level failures are translated into these at the decoder edge;
/// they never propagate as panics across the contract.
#[derive(Debug, Error)]
pub enum AudioError {
    /// Format negotiation rejected: the decoder keeps its native format
    #[error("requested format {requested} does not match native format {native}")]
    FormatUnsupported {
        requested: AudioFormat,
        native: AudioFormat,
    },

    /// The source cannot be opened as this decoder's stream type
    #[error("unreadable stream: {0}")]
    UnreadableStream(String),

    /// Fatal decode error; the stream is done for
    #[error("decode failed: {0}")]
    Decode(String),

    /// Seek target not supported; position is unchanged
    #[error("seek target unsupported (only rewind to start is guaranteed)")]
    SeekUnsupported,

    /// A synthesis backend failed its one-time initialization
    #[error("synth backend unavailable: {0}")]
    BackendUnavailable(String),

    /// No synthesis backend could be initialized (registry had no fallback)
    #[error("no usable synthesizer backend")]
    NoBackend,
}

/// Shared capability set implemented by every decoder and decorator
///
/// # Contract
///
/// - [`fill_buffer`](Self::fill_buffer) returns `Ok(n)` with `n <=
///   out.len()`; `n < out.len()` happens only at end of stream, after which
///   [`is_finished`](Self::is_finished) reports `true`. The unfilled tail is
///   always zeroed - never stale or uninitialized bytes. A fatal backend
///   error is `Err(AudioError::Decode)`; afterwards the decoder is frozen
///   but safe: `is_finished()` stays `false`, `ticks()` holds its last
///   value, and further calls may keep erroring.
/// - [`set_format`](Self::set_format) rejects anything but the decoder's
///   fixed native triple, without clamping, substitution, or any state
///   change on failure.
/// - [`seek`](Self::seek) only guarantees `SeekFrom::Start(0)`. Any other
///   target may fail with the position unchanged; that is not fatal. A
///   successful rewind clears the finished flag.
/// - [`ticks`](Self::ticks) is a non-decreasing elapsed-playback measure in
///   a decoder-defined but stable unit (seconds for all shipped decoders).
pub trait AudioDecoder: Send + std::fmt::Debug {
    /// Current effective output format
    fn format(&self) -> AudioFormat;

    /// Negotiate a requested output format (exact match or rejection)
    fn set_format(&mut self, requested: AudioFormat) -> Result<(), AudioError>;

    /// Decode up to `out.len()` bytes of PCM, returning bytes written
    fn fill_buffer(&mut self, out: &mut [u8]) -> Result<usize, AudioError>;

    /// Seek; only a rewind to the stream start is guaranteed to succeed
    fn seek(&mut self, to: SeekFrom) -> Result<(), AudioError>;

    /// True once `fill_buffer` has observed end of stream
    fn is_finished(&self) -> bool;

    /// Elapsed playback in whole seconds
    fn ticks(&self) -> u64;
}

/// Anything a decoder can stream from
///
/// `tell` is `seek(SeekFrom::Current(0))`. There is deliberately no close
/// primitive at this boundary - stream lifetime belongs to whoever holds the
/// last [`SharedSource`] reference.
pub trait MediaSource: Read + Seek + Send {}

impl<T: Read + Seek + Send> MediaSource for T {}

/// A stream with shared ownership between the caller and decoders
pub type SharedSource = Arc<Mutex<dyn MediaSource>>;

/// Wrap a source for shared ownership
pub fn shared_source(source: impl MediaSource + 'static) -> SharedSource {
    Arc::new(Mutex::new(source))
}

/// Reader adapter a backend context drives the shared source through
///
/// Holds its own `SharedSource` reference for as long as the backend context
/// lives, and forwards the read/seek callbacks under the (uncontended) lock.
pub(crate) struct SourceReader {
    source: SharedSource,
}

impl SourceReader {
    pub(crate) fn new(source: SharedSource) -> Self {
        Self { source }
    }

    fn lock(&self) -> std::io::Result<std::sync::MutexGuard<'_, dyn MediaSource + 'static>> {
        self.source
            .lock()
            .map_err(|_| std::io::Error::other("shared source lock poisoned"))
    }
}

impl Read for SourceReader {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.lock()?.read(buf)
    }
}

impl Seek for SourceReader {
    fn seek(&mut self, pos: SeekFrom) -> std::io::Result<u64> {
        self.lock()?.seek(pos)
    }
}
