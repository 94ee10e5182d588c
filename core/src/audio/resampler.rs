//! Resampling decorator
//!
//! Wraps any decoder and re-targets its output rate by linear interpolation
//! with a fractional phase accumulator. Everything except the rate
//! conversion - seek, finished state, ticks - forwards to the inner decoder.

use std::io::SeekFrom;

use super::{AudioDecoder, AudioError, AudioFormat, SampleEncoding};

/// Inner frames fetched per refill (stereo S16)
const CHUNK_FRAMES: usize = 4096;

/// Rate-converting decorator over an inner decoder (S16 stereo only)
pub struct Resampler {
    inner: Box<dyn AudioDecoder>,
    format: AudioFormat,
    /// Inner frames advanced per output frame
    ratio: f64,
    /// Fractional read position into `input`, in frames
    src_pos: f64,
    /// Buffered inner samples (interleaved stereo)
    input: Vec<i16>,
    /// Inner decoder drained; interpolate up to the final frame and stop
    inner_done: bool,
    /// Refill scratch; i16-backed so the byte view the inner decoder fills
    /// is always well aligned
    scratch: Vec<i16>,
}

impl Resampler {
    /// Wrap `inner`, advertising `target_rate` with the inner encoding and
    /// channel count
    pub fn new(inner: Box<dyn AudioDecoder>, target_rate: u32) -> Self {
        let native = inner.format();
        let ratio = native.sample_rate as f64 / target_rate as f64;
        Self {
            inner,
            format: AudioFormat::new(target_rate, SampleEncoding::S16, 2),
            ratio,
            src_pos: 0.0,
            input: Vec::new(),
            inner_done: false,
            scratch: Vec::new(),
        }
    }

    fn buffered_frames(&self) -> usize {
        self.input.len() / 2
    }

    /// Pull another chunk from the inner decoder into the input buffer
    fn refill(&mut self) -> Result<(), AudioError> {
        self.scratch.clear();
        self.scratch.resize(CHUNK_FRAMES * 2, 0);
        let byte_view: &mut [u8] = bytemuck::cast_slice_mut(&mut self.scratch);
        let bytes = self.inner.fill_buffer(byte_view)?;
        self.input.extend_from_slice(&self.scratch[..bytes / 2]);
        // A short fill is the inner decoder's end of stream
        if bytes < CHUNK_FRAMES * 4 {
            self.inner_done = true;
        }
        Ok(())
    }

    /// Drop input frames the interpolation has fully passed
    fn compact(&mut self) {
        let consumed = (self.src_pos.floor() as usize).min(self.buffered_frames());
        if consumed > 0 {
            self.input.drain(..consumed * 2);
            self.src_pos -= consumed as f64;
        }
    }
}

impl std::fmt::Debug for Resampler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resampler")
            .field("format", &self.format)
            .field("ratio", &self.ratio)
            .field("src_pos", &self.src_pos)
            .field("inner_done", &self.inner_done)
            .finish_non_exhaustive()
    }
}

impl AudioDecoder for Resampler {
    fn format(&self) -> AudioFormat {
        self.format
    }

    fn set_format(&mut self, requested: AudioFormat) -> Result<(), AudioError> {
        if requested != self.format {
            return Err(AudioError::FormatUnsupported {
                requested,
                native: self.format,
            });
        }
        Ok(())
    }

    fn fill_buffer(&mut self, out: &mut [u8]) -> Result<usize, AudioError> {
        let frames_wanted = out.len() / 4;
        out.fill(0);

        let mut produced = 0usize;
        while produced < frames_wanted {
            // Interpolation needs the frame at src_pos and its successor
            let need = self.src_pos.floor() as usize + 2;
            if self.buffered_frames() < need && !self.inner_done {
                self.refill()?;
                continue;
            }

            let idx = self.src_pos.floor() as usize;
            if idx >= self.buffered_frames() {
                break;
            }

            let frac = self.src_pos - idx as f64;
            let (left, right) = if idx + 1 < self.buffered_frames() {
                (
                    lerp(self.input[idx * 2], self.input[idx * 2 + 2], frac),
                    lerp(self.input[idx * 2 + 1], self.input[idx * 2 + 3], frac),
                )
            } else {
                // Last buffered frame: nothing to interpolate toward
                (self.input[idx * 2], self.input[idx * 2 + 1])
            };

            out[produced * 4..produced * 4 + 2].copy_from_slice(&left.to_le_bytes());
            out[produced * 4 + 2..produced * 4 + 4].copy_from_slice(&right.to_le_bytes());

            produced += 1;
            self.src_pos += self.ratio;
        }

        self.compact();
        Ok(produced * 4)
    }

    fn seek(&mut self, to: SeekFrom) -> Result<(), AudioError> {
        self.inner.seek(to)?;
        self.input.clear();
        self.src_pos = 0.0;
        self.inner_done = false;
        Ok(())
    }

    fn is_finished(&self) -> bool {
        // Finished only once the buffered inner tail has been emitted too
        self.inner.is_finished() && self.inner_done && self.input.is_empty()
    }

    fn ticks(&self) -> u64 {
        self.inner.ticks()
    }
}

fn lerp(a: i16, b: i16, frac: f64) -> i16 {
    (a as f64 + (b as f64 - a as f64) * frac).round() as i16
}
