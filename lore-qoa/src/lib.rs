//! Lore-QOA: Modified QOA codec for Lorecore
//!
//! This is a **modified** implementation of QOA (Quite OK Audio) tailored for
//! Lorecore's music streams. It is NOT compatible with standard QOA files.
//!
//! Unlike a whole-file codec, the decode side is a **streaming context**:
//! [`QoaStream`] wraps any `Read + Seek` source and decodes one codec frame at
//! a time, so a music track never has to be resident in memory. The caller
//! owns the source; the context drives it exclusively through the reader
//! callbacks and never closes it.
//!
//! # Differences from Standard QOA
//!
//! | Feature | Standard QOA | Lore-QOA |
//! |---------|--------------|----------|
//! | File magic | "qoaf" | "LQA1" |
//! | File header | 8 bytes (magic + total_samples) | 8 bytes (magic + total sample frames) |
//! | Frame header | 8 bytes (channels + sample_rate + samples + size) | 5 bytes (no sample_rate) |
//! | Sample rate | 24-bit per frame | Not stored (fixed 44100 Hz) |
//! | Channels | up to 8 | 1 or 2 (mono is upmixed on read) |
//!
//! Music in Lorecore plays at one fixed rate controlled by the asset
//! pipeline, so the per-frame sample rate field is dead weight and is
//! dropped, as is multi-channel surround.
//!
//! # Stream Format
//!
//! ```text
//! Stream header (8 bytes):
//!   0x00: magic "LQA1" (4 bytes)
//!   0x04: total sample frames u32 BE (per channel)
//!
//! Frame (repeats):
//!   Frame header (5 bytes):
//!     0x00: channels (u8, 1 or 2)
//!     0x01: frames_in_frame (u16 BE, sample frames per channel)
//!     0x03: frame_size (u16 BE, bytes including this header)
//!
//!   Per-channel LMS state (16 bytes each):
//!     history[4] as i16 BE + weights[4] as i16 BE
//!
//!   Slices (8 bytes each, channel-interleaved per slice group):
//!     20 samples encoded as scalefactor (4 bits) + residuals (60 bits)
//! ```
//!
//! # Compression
//!
//! Approximately 5:1 (3.2 bits per sample) using LMS prediction with
//! adaptive quantization - identical to standard QOA.
//!
//! # Usage
//!
//! ```
//! use std::io::Cursor;
//! use lore_qoa::{QoaStream, encode};
//!
//! // Encode interleaved stereo PCM to an LQA1 stream
//! let samples: Vec<i16> = vec![0; 2000];
//! let data = encode(&samples, 2);
//!
//! // Decode incrementally through a reader
//! let mut stream = QoaStream::open(Cursor::new(data)).unwrap();
//! let mut out = vec![0i16; 512];
//! let frames = stream.read_stereo(&mut out).unwrap();
//! assert!(frames > 0);
//! ```

mod encode;
mod lms;
mod stream;

pub use encode::{encode, encode_slice, encode_with_frame_len};
pub use lms::QoaLms;
pub use stream::{QoaStream, decode_slice};

// =============================================================================
// Constants
// =============================================================================

/// Stream magic bytes
pub const STREAM_MAGIC: &[u8; 4] = b"LQA1";

/// Stream header size (magic + total sample frames)
pub const STREAM_HEADER_SIZE: usize = 8;

/// Music sample rate (fixed, controlled by the asset pipeline)
pub const SAMPLE_RATE: u32 = 44_100;

/// Maximum channels per frame (mono or stereo)
pub const MAX_CHANNELS: usize = 2;

/// Samples per slice (each slice is 64 bits)
pub const QOA_SLICE_LEN: usize = 20;

/// Maximum slices per frame per channel
pub const QOA_MAX_SLICES: usize = 256;

/// Maximum sample frames per codec frame (256 slices x 20 samples)
pub const QOA_FRAME_LEN: usize = 5120;

/// Frame header size (channels + frames_in_frame + frame_size, no sample_rate)
pub const QOA_FRAME_HEADER_SIZE: usize = 5;

/// LMS state size per channel (4 history + 4 weights as i16)
pub const QOA_LMS_STATE_SIZE: usize = 16;

/// Scalefactor table (16 entries)
/// Used to scale residuals during quantization
pub const QOA_SCALEFACTOR_TAB: [i32; 16] = [
    1, 7, 21, 45, 84, 138, 211, 304, 421, 562, 731, 928, 1157, 1419, 1715, 2048,
];

/// Quantization table (17 entries)
/// Maps residual / scalefactor result (-8..8) to 3-bit index
pub const QOA_QUANT_TAB: [u8; 17] = [
    7, 7, 7, 5, 5, 3, 3, 1, // -8..-1
    0, // 0
    0, 2, 2, 4, 4, 6, 6, 6, // 1..8
];

/// Dequantization table (16 scalefactors x 8 quantized values)
/// Pre-computed: dequant_tab[sf][qval] = round(scalefactor * dequant_mul[qval])
/// where dequant_mul = [0.75, -0.75, 2.5, -2.5, 4.5, -4.5, 7.0, -7.0]
pub const QOA_DEQUANT_TAB: [[i32; 8]; 16] = [
    [1, -1, 3, -3, 5, -5, 7, -7],
    [5, -5, 18, -18, 32, -32, 49, -49],
    [16, -16, 53, -53, 95, -95, 147, -147],
    [34, -34, 113, -113, 203, -203, 315, -315],
    [63, -63, 210, -210, 378, -378, 588, -588],
    [104, -104, 345, -345, 621, -621, 966, -966],
    [158, -158, 528, -528, 950, -950, 1477, -1477],
    [228, -228, 760, -760, 1368, -1368, 2128, -2128],
    [316, -316, 1053, -1053, 1895, -1895, 2947, -2947],
    [422, -422, 1405, -1405, 2529, -2529, 3934, -3934],
    [548, -548, 1828, -1828, 3290, -3290, 5117, -5117],
    [696, -696, 2320, -2320, 4176, -4176, 6496, -6496],
    [868, -868, 2893, -2893, 5207, -5207, 8099, -8099],
    [1064, -1064, 3548, -3548, 6386, -6386, 9933, -9933],
    [1286, -1286, 4288, -4288, 7718, -7718, 12005, -12005],
    [1536, -1536, 5120, -5120, 9216, -9216, 14336, -14336],
];

// =============================================================================
// Error Type
// =============================================================================

/// Errors that can occur while opening or decoding an LQA1 stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QoaError {
    /// Stream too short to contain the LQA1 header
    TruncatedHeader,
    /// Invalid magic bytes (not "LQA1")
    InvalidMagic,
    /// Invalid channel count in a frame header (must be 1 or 2)
    InvalidChannelCount(u8),
    /// Stream ended in the middle of a frame
    TruncatedData,
    /// Reader error while decoding
    Io(String),
}

impl core::fmt::Display for QoaError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            QoaError::TruncatedHeader => write!(f, "stream too short for LQA1 header"),
            QoaError::InvalidMagic => write!(f, "invalid LQA1 magic bytes"),
            QoaError::InvalidChannelCount(n) => {
                write!(f, "invalid channel count: {} (must be 1 or 2)", n)
            }
            QoaError::TruncatedData => write!(f, "truncated LQA1 frame data"),
            QoaError::Io(e) => write!(f, "reader error: {}", e),
        }
    }
}

impl std::error::Error for QoaError {}

impl From<std::io::Error> for QoaError {
    fn from(e: std::io::Error) -> Self {
        QoaError::Io(e.to_string())
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Clamp value to 16-bit signed range
#[inline]
pub(crate) fn clamp_i16(v: i32) -> i32 {
    v.clamp(-32768, 32767)
}

// =============================================================================
// Tests
// =============================================================================
