//! Streaming music decoder over LQA1 streams
//!
//! Drives a `lore-qoa` decode context through the shared-source reader
//! callbacks. The context delivers at most one codec frame per read call, so
//! filling a buffer is an accumulation loop, not a single call.

use std::io::SeekFrom;

use lore_qoa::{QoaStream, SAMPLE_RATE};

use super::{AudioDecoder, AudioError, AudioFormat, SampleEncoding, SharedSource, SourceReader};

/// Native output format of every LQA1 stream
const NATIVE_FORMAT: AudioFormat = AudioFormat::new(SAMPLE_RATE, SampleEncoding::S16, 2);

/// Bytes per output sample frame (stereo, 16-bit)
const FRAME_BYTES: usize = 4;

/// Decoder for LQA1 music streams
///
/// Owns its decode context exclusively; holds one shared reference to the
/// input stream for the context's lifetime.
pub struct QoaDecoder {
    // Declared before `source`: the context (and its reader, which holds the
    // other source reference) must drop before this holder releases the
    // stream
    context: QoaStream<SourceReader>,
    source: SharedSource,
    finished: bool,
    scratch: Vec<i16>,
}

impl QoaDecoder {
    /// Open a decoder over a shared stream
    ///
    /// On any header error the decode context is torn down and the stream
    /// reference released before this returns; no half-open decoder escapes.
    pub fn open(source: SharedSource) -> Result<Self, AudioError> {
        let reader = SourceReader::new(source.clone());
        let context = QoaStream::open(reader)
            .map_err(|e| AudioError::UnreadableStream(format!("LQA1: {}", e)))?;

        Ok(Self {
            context,
            source,
            finished: false,
            scratch: Vec::new(),
        })
    }

    /// The stream this decoder reads from
    pub fn source(&self) -> &SharedSource {
        &self.source
    }
}

impl std::fmt::Debug for QoaDecoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QoaDecoder")
            .field("finished", &self.finished)
            .finish_non_exhaustive()
    }
}

impl AudioDecoder for QoaDecoder {
    fn format(&self) -> AudioFormat {
        NATIVE_FORMAT
    }

    fn set_format(&mut self, requested: AudioFormat) -> Result<(), AudioError> {
        if requested != NATIVE_FORMAT {
            return Err(AudioError::FormatUnsupported {
                requested,
                native: NATIVE_FORMAT,
            });
        }
        Ok(())
    }

    fn fill_buffer(&mut self, out: &mut [u8]) -> Result<usize, AudioError> {
        let frames_wanted = out.len() / FRAME_BYTES;

        // The context is not guaranteed to cover every byte of its own
        // output region, so the whole buffer is cleared up front
        out.fill(0);
        self.scratch.clear();
        self.scratch.resize(frames_wanted * 2, 0);

        let mut accumulated = 0usize;
        while accumulated < frames_wanted {
            let read = self
                .context
                .read_stereo(&mut self.scratch[accumulated * 2..])
                .map_err(|e| AudioError::Decode(format!("LQA1: {}", e)))?;

            if read == 0 {
                self.finished = true;
                break;
            }
            accumulated += read;
        }

        // Copy the full requested region: the zeroed scratch tail keeps the
        // shortfall silent
        let byte_len = frames_wanted * FRAME_BYTES;
        out[..byte_len].copy_from_slice(bytemuck::cast_slice(&self.scratch));

        Ok(accumulated * FRAME_BYTES)
    }

    fn seek(&mut self, to: SeekFrom) -> Result<(), AudioError> {
        match to {
            SeekFrom::Start(0) => {
                self.context
                    .raw_seek_start()
                    .map_err(|e| AudioError::Decode(format!("LQA1: {}", e)))?;
                self.finished = false;
                Ok(())
            }
            _ => Err(AudioError::SeekUnsupported),
        }
    }

    fn is_finished(&self) -> bool {
        self.finished
    }

    fn ticks(&self) -> u64 {
        self.context.pcm_tell() / SAMPLE_RATE as u64
    }
}
