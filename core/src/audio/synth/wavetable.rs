//! Wavetable synthesizer (optional backend)
//!
//! Plays back recorded instrument patches pitched to the requested note.
//! Needs a `patches.toml` manifest next to the patch WAVs:
//!
//! ```toml
//! [[patch]]
//! program = 0        # General MIDI program number
//! file = "piano.wav"
//! root_key = 60      # key the recording was made at (default 60)
//! ```
//!
//! Loading the patch set is the one-time global initialization step; a
//! missing or invalid manifest makes the backend unavailable and playback
//! falls through to the FM engine.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use lore_midi::{ChannelEvent, ChannelMessage, NUM_CHANNELS};
use serde::Deserialize;
use tracing::debug;

use super::{mix_to_i16, note_frequency};
use crate::audio::AudioError;
use crate::audio::midi::{MIDI_TARGET_RATE, SynthBackend, SynthSession};

/// Rate patch data is stored at; playback steps through it at whatever
/// ratio the note and the output rate demand
pub const WAVETABLE_SAMPLE_RATE: u32 = 22_050;

/// Simultaneous voices; note-ons past this steal the oldest voice
const MAX_VOICES: usize = 24;

/// Headroom so a full chord does not clip
const MIX_GAIN: f32 = 0.3;

/// Release decay factor per sample after note-off
const RELEASE_DECAY: f32 = 0.999;

#[derive(Deserialize)]
struct PatchManifest {
    #[serde(default)]
    patch: Vec<PatchEntry>,
}

#[derive(Deserialize)]
struct PatchEntry {
    program: u8,
    file: String,
    #[serde(default = "default_root_key")]
    root_key: u8,
}

fn default_root_key() -> u8 {
    60
}

/// One loaded patch: mono PCM at the wavetable rate
struct Patch {
    data: Vec<i16>,
    root_key: u8,
}

/// All patches loaded from one manifest
#[derive(Default)]
struct PatchBank {
    by_program: HashMap<u8, Arc<Patch>>,
    /// Stand-in for unmapped programs (the first manifest entry)
    fallback: Option<Arc<Patch>>,
}

impl PatchBank {
    fn lookup(&self, program: u8) -> Option<&Arc<Patch>> {
        self.by_program.get(&program).or(self.fallback.as_ref())
    }
}

/// The optional wavetable backend
pub struct WavetableSynth {
    manifest_path: PathBuf,
    bank: Option<Arc<PatchBank>>,
}

impl WavetableSynth {
    pub fn new(manifest_path: impl AsRef<Path>) -> Self {
        Self {
            manifest_path: manifest_path.as_ref().to_path_buf(),
            bank: None,
        }
    }

    fn load_bank(&self) -> Result<PatchBank, AudioError> {
        let unavailable =
            |msg: String| AudioError::BackendUnavailable(format!("wavetable: {}", msg));

        let text = std::fs::read_to_string(&self.manifest_path).map_err(|e| {
            unavailable(format!(
                "cannot read manifest {}: {}",
                self.manifest_path.display(),
                e
            ))
        })?;
        let manifest: PatchManifest =
            toml::from_str(&text).map_err(|e| unavailable(format!("invalid manifest: {}", e)))?;

        if manifest.patch.is_empty() {
            return Err(unavailable("manifest lists no patches".into()));
        }

        let base_dir = self.manifest_path.parent().unwrap_or(Path::new("."));
        let mut bank = PatchBank::default();

        for entry in &manifest.patch {
            let path = base_dir.join(&entry.file);
            let data = load_patch_wav(&path)
                .map_err(|e| unavailable(format!("patch {}: {}", path.display(), e)))?;
            let patch = Arc::new(Patch {
                data,
                root_key: entry.root_key,
            });
            if bank.fallback.is_none() {
                bank.fallback = Some(patch.clone());
            }
            bank.by_program.insert(entry.program, patch);
        }

        debug!(
            "Wavetable: loaded {} patches from {}",
            bank.by_program.len(),
            self.manifest_path.display()
        );
        Ok(bank)
    }
}

impl SynthBackend for WavetableSynth {
    fn name(&self) -> &'static str {
        "wavetable"
    }

    fn initialize(&mut self) -> Result<(), AudioError> {
        if self.bank.is_some() {
            return Ok(());
        }
        self.bank = Some(Arc::new(self.load_bank()?));
        Ok(())
    }

    fn open_session(&self) -> Box<dyn SynthSession> {
        // Only called after initialize succeeded; an empty bank renders
        // silence rather than panicking if that invariant is ever broken
        let bank = self.bank.clone().unwrap_or_default();
        Box::new(WavetableSession::new(bank))
    }
}

/// Read a WAV as mono i16 at the wavetable rate
fn load_patch_wav(path: &Path) -> Result<Vec<i16>, String> {
    let mut reader = hound::WavReader::open(path).map_err(|e| e.to_string())?;
    let spec = reader.spec();

    let interleaved: Vec<i16> = match spec.sample_format {
        hound::SampleFormat::Int => {
            if spec.bits_per_sample > 16 {
                let shift = spec.bits_per_sample - 16;
                reader
                    .samples::<i32>()
                    .map(|s| s.map(|v| (v >> shift) as i16))
                    .collect::<Result<_, _>>()
                    .map_err(|e| e.to_string())?
            } else {
                reader
                    .samples::<i16>()
                    .collect::<Result<_, _>>()
                    .map_err(|e| e.to_string())?
            }
        }
        hound::SampleFormat::Float => reader
            .samples::<f32>()
            .map(|s| s.map(|v| (v.clamp(-1.0, 1.0) * 32767.0) as i16))
            .collect::<Result<_, _>>()
            .map_err(|e| e.to_string())?,
    };

    if interleaved.is_empty() {
        return Err("patch contains no samples".into());
    }

    let mono = if spec.channels <= 1 {
        interleaved
    } else {
        stereo_to_mono(&interleaved, spec.channels as usize)
    };

    Ok(resample_linear(&mono, spec.sample_rate, WAVETABLE_SAMPLE_RATE))
}

/// Average interleaved channels down to mono
fn stereo_to_mono(samples: &[i16], channels: usize) -> Vec<i16> {
    samples
        .chunks(channels)
        .map(|frame| {
            let sum: i32 = frame.iter().map(|&s| s as i32).sum();
            (sum / frame.len() as i32) as i16
        })
        .collect()
}

/// Resample mono PCM with linear interpolation
fn resample_linear(samples: &[i16], source_rate: u32, target_rate: u32) -> Vec<i16> {
    if samples.is_empty() || source_rate == target_rate {
        return samples.to_vec();
    }

    let ratio = source_rate as f64 / target_rate as f64;
    let output_len = (samples.len() as f64 / ratio).ceil() as usize;
    let mut output = Vec::with_capacity(output_len);

    for i in 0..output_len {
        let src_pos = i as f64 * ratio;
        let src_idx = src_pos.floor() as usize;
        let frac = src_pos - src_idx as f64;

        let sample = if src_idx + 1 < samples.len() {
            let s1 = samples[src_idx] as f64;
            let s2 = samples[src_idx + 1] as f64;
            (s1 + (s2 - s1) * frac).round() as i16
        } else {
            samples[samples.len() - 1]
        };
        output.push(sample);
    }

    output
}

#[derive(Clone)]
struct WtVoice {
    active: bool,
    channel: u8,
    key: u8,
    amp: f32,
    patch: Arc<Patch>,
    /// Playback position in patch samples
    pos: f32,
    step: f32,
    env: f32,
    released: bool,
    age: u64,
}

pub(crate) struct WavetableSession {
    bank: Arc<PatchBank>,
    voices: Vec<WtVoice>,
    programs: [u8; NUM_CHANNELS],
    volumes: [f32; NUM_CHANNELS],
    clock: u64,
}

impl WavetableSession {
    fn new(bank: Arc<PatchBank>) -> Self {
        Self {
            bank,
            voices: Vec::with_capacity(MAX_VOICES),
            programs: [0; NUM_CHANNELS],
            volumes: [1.0; NUM_CHANNELS],
            clock: 0,
        }
    }

    fn note_on(&mut self, channel: u8, key: u8, velocity: u8) {
        let Some(patch) = self.bank.lookup(self.programs[channel as usize]) else {
            return;
        };

        self.clock += 1;
        // Patch samples advance at the pitch ratio, corrected for the patch
        // storage rate vs the output rate
        let rate_ratio = WAVETABLE_SAMPLE_RATE as f32 / MIDI_TARGET_RATE as f32;
        let voice = WtVoice {
            active: true,
            channel,
            key,
            amp: velocity as f32 / 127.0,
            patch: patch.clone(),
            pos: 0.0,
            step: note_frequency(key) / note_frequency(patch.root_key) * rate_ratio,
            env: 1.0,
            released: false,
            age: self.clock,
        };

        if let Some(idle) = self.voices.iter_mut().find(|v| !v.active) {
            *idle = voice;
        } else if self.voices.len() < MAX_VOICES {
            self.voices.push(voice);
        } else if let Some(oldest) = self.voices.iter_mut().min_by_key(|v| v.age) {
            *oldest = voice;
        }
    }

    fn note_off(&mut self, channel: u8, key: u8) {
        for voice in &mut self.voices {
            if voice.active && !voice.released && voice.channel == channel && voice.key == key {
                voice.released = true;
            }
        }
    }
}

impl SynthSession for WavetableSession {
    fn sample_rate(&self) -> u32 {
        MIDI_TARGET_RATE
    }

    fn handle_event(&mut self, event: &ChannelEvent) {
        let channel = event.channel;
        match event.message {
            ChannelMessage::NoteOn { key, velocity } => self.note_on(channel, key, velocity),
            ChannelMessage::NoteOff { key } => self.note_off(channel, key),
            ChannelMessage::ProgramChange { program } => {
                self.programs[channel as usize] = program;
            }
            ChannelMessage::ControlChange { controller, value } => match controller {
                7 => self.volumes[channel as usize] = value as f32 / 127.0,
                123 => {
                    for voice in &mut self.voices {
                        if voice.channel == channel {
                            voice.released = true;
                        }
                    }
                }
                _ => {}
            },
            _ => {}
        }
    }

    fn render(&mut self, out: &mut [i16]) {
        for frame in out.chunks_exact_mut(2) {
            let mut mixed = 0.0f32;

            for voice in &mut self.voices {
                if !voice.active {
                    continue;
                }

                let idx = voice.pos as usize;
                if idx + 1 >= voice.patch.data.len() {
                    // One-shot patches end when the recording does
                    voice.active = false;
                    continue;
                }

                // Linear interpolation between neighboring patch samples
                let frac = voice.pos.fract();
                let s1 = voice.patch.data[idx] as f32;
                let s2 = voice.patch.data[idx + 1] as f32;
                let sample = (s1 + (s2 - s1) * frac) / 32768.0;

                mixed += sample * voice.env * voice.amp * self.volumes[voice.channel as usize];

                voice.pos += voice.step;
                if voice.released {
                    voice.env *= RELEASE_DECAY;
                    if voice.env < 0.001 {
                        voice.active = false;
                    }
                }
            }

            let sample = mix_to_i16(mixed * MIX_GAIN);
            frame[0] = sample;
            frame[1] = sample;
        }
    }

    fn reset(&mut self) {
        self.voices.clear();
        self.programs = [0; NUM_CHANNELS];
        self.volumes = [1.0; NUM_CHANNELS];
    }
}
