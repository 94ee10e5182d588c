//! MIDI synthesis decoder and backend selection
//!
//! Synthesis backends are probed in priority order - richest first, the
//! built-in FM fallback last. A backend that fails its one-time
//! initialization is logged and marked unavailable for the life of the
//! registry, so later decoder creations never pay the same failed probe
//! (or re-emit the same diagnostic) again.

use std::io::{Read, SeekFrom};
use std::path::Path;

use lore_midi::{ChannelEvent, MidiSong, Sequencer, parse_smf};
use tracing::warn;

use super::synth::{FmSynth, WavetableSynth};
use super::{
    AudioDecoder, AudioError, AudioFormat, Resampler, SampleEncoding, SharedSource, SourceReader,
};

/// Output rate every synthesis session renders at
pub const MIDI_TARGET_RATE: u32 = 44_100;

/// A synthesis backend: one engine that can be probed and instantiated
///
/// `initialize` is backend-global and runs at most once per registry - it is
/// the expensive step (loading a patch set, allocating engine tables), not a
/// per-stream operation.
pub trait SynthBackend: Send {
    fn name(&self) -> &'static str;

    /// One-time global initialization; failure marks the backend unavailable
    fn initialize(&mut self) -> Result<(), AudioError>;

    /// Create a playback session (only called after `initialize` succeeded)
    fn open_session(&self) -> Box<dyn SynthSession>;
}

/// One playback instance of an initialized backend
pub trait SynthSession: Send {
    /// The rate this session renders at
    fn sample_rate(&self) -> u32;

    /// Apply a channel voice message
    fn handle_event(&mut self, event: &ChannelEvent);

    /// Render interleaved stereo S16 into `out` (every sample is written)
    fn render(&mut self, out: &mut [i16]);

    /// Silence all voices and restore default channel state
    fn reset(&mut self);
}

struct BackendSlot {
    backend: Box<dyn SynthBackend>,
    /// False once `initialize` has failed; never reset
    available: bool,
    initialized: bool,
}

/// Ordered synthesis backends plus their availability state
///
/// The availability flags live here, in explicit injectable state, rather
/// than in a process global: the engine keeps one registry, tests build as
/// many fresh ones as they need.
pub struct SynthRegistry {
    slots: Vec<BackendSlot>,
}

impl SynthRegistry {
    /// Build a registry from an ordered backend list (first = preferred)
    pub fn new(backends: Vec<Box<dyn SynthBackend>>) -> Self {
        Self {
            slots: backends
                .into_iter()
                .map(|backend| BackendSlot {
                    backend,
                    available: true,
                    initialized: false,
                })
                .collect(),
        }
    }

    /// The standard backend list: wavetable (when a patch manifest is
    /// configured) first, the always-available FM synthesizer last
    pub fn with_default_backends(patch_manifest: Option<&Path>) -> Self {
        let mut backends: Vec<Box<dyn SynthBackend>> = Vec::new();
        if let Some(manifest) = patch_manifest {
            backends.push(Box::new(WavetableSynth::new(manifest)));
        }
        backends.push(Box::new(FmSynth::new()));
        Self::new(backends)
    }

    /// Availability of a backend by name (`None` if not registered)
    pub fn is_available(&self, name: &str) -> Option<bool> {
        self.slots
            .iter()
            .find(|slot| slot.backend.name() == name)
            .map(|slot| slot.available)
    }

    /// Create a MIDI decoder for `source`
    ///
    /// Reads the SMF data through the shared source, picks the first usable
    /// backend, and wraps the decoder in a [`Resampler`] pinned to
    /// [`MIDI_TARGET_RATE`] when `resample` is set.
    pub fn create_decoder(
        &mut self,
        source: SharedSource,
        resample: bool,
    ) -> Result<Box<dyn AudioDecoder>, AudioError> {
        let mut data = Vec::new();
        SourceReader::new(source.clone())
            .read_to_end(&mut data)
            .map_err(|e| AudioError::UnreadableStream(format!("MIDI: {}", e)))?;
        let song =
            parse_smf(&data).map_err(|e| AudioError::UnreadableStream(format!("SMF: {}", e)))?;

        let session = self.open_session()?;
        let decoder = MidiSynthDecoder::new(&song, session, source);

        Ok(if resample {
            Box::new(Resampler::new(Box::new(decoder), MIDI_TARGET_RATE))
        } else {
            Box::new(decoder)
        })
    }

    /// Probe backends in order and open a session on the first usable one
    fn open_session(&mut self) -> Result<Box<dyn SynthSession>, AudioError> {
        for slot in &mut self.slots {
            if !slot.available {
                continue;
            }
            if !slot.initialized {
                if let Err(e) = slot.backend.initialize() {
                    warn!(
                        "MIDI synth backend '{}' unavailable: {}. Trying next backend.",
                        slot.backend.name(),
                        e
                    );
                    slot.available = false;
                    continue;
                }
                slot.initialized = true;
            }
            return Ok(slot.backend.open_session());
        }
        Err(AudioError::NoBackend)
    }
}

/// Generic MIDI decoder: a sequencer driving one synthesis session
///
/// Fixed native format: the session's rate, S16, stereo. Events are
/// dispatched sample-accurately between render spans, so a tempo-heavy song
/// stays in time regardless of the caller's buffer sizes.
pub struct MidiSynthDecoder {
    sequencer: Sequencer,
    session: Box<dyn SynthSession>,
    /// One holder of the input stream, kept for the decoder's lifetime
    _source: SharedSource,
    format: AudioFormat,
    rendered: u64,
    finished: bool,
    scratch: Vec<i16>,
}

impl MidiSynthDecoder {
    pub fn new(song: &MidiSong, session: Box<dyn SynthSession>, source: SharedSource) -> Self {
        let rate = session.sample_rate();
        Self {
            sequencer: Sequencer::new(song, rate),
            session,
            _source: source,
            format: AudioFormat::new(rate, SampleEncoding::S16, 2),
            rendered: 0,
            finished: false,
            scratch: Vec::new(),
        }
    }
}

impl std::fmt::Debug for MidiSynthDecoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MidiSynthDecoder")
            .field("format", &self.format)
            .field("rendered", &self.rendered)
            .field("finished", &self.finished)
            .finish_non_exhaustive()
    }
}

impl AudioDecoder for MidiSynthDecoder {
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
        self.scratch.clear();
        self.scratch.resize(frames_wanted * 2, 0);

        let mut produced = 0usize;
        while produced < frames_wanted && !self.finished {
            // Apply everything due at the cursor before rendering past it
            while let Some(event) = self.sequencer.pop_due_event() {
                self.session.handle_event(&event);
            }

            if self.sequencer.at_end() {
                self.finished = true;
                break;
            }

            // Render up to the next event (or the end of the song)
            let limit = match self.sequencer.frames_to_next_event() {
                Some(gap) => gap,
                None => self
                    .sequencer
                    .song_frames()
                    .saturating_sub(self.sequencer.position()),
            };
            let chunk = ((frames_wanted - produced) as u64).min(limit) as usize;
            if chunk == 0 {
                break;
            }

            self.session
                .render(&mut self.scratch[produced * 2..(produced + chunk) * 2]);
            self.sequencer.advance(chunk as u64);
            self.rendered += chunk as u64;
            produced += chunk;
        }

        let byte_len = frames_wanted * 4;
        out[..byte_len].copy_from_slice(bytemuck::cast_slice(&self.scratch));

        Ok(produced * 4)
    }

    fn seek(&mut self, to: SeekFrom) -> Result<(), AudioError> {
        match to {
            SeekFrom::Start(0) => {
                self.sequencer.rewind();
                self.session.reset();
                self.rendered = 0;
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
        self.rendered / self.format.sample_rate as u64
    }
}
