//! Built-in FM synthesizer (fallback backend)
//!
//! A small two-operator FM engine: one modulator sine feeding one carrier
//! sine per voice, with a percussive attack/decay/release envelope. Not a
//! General MIDI implementation - it exists so MIDI playback always works
//! even when no wavetable patch set is installed.

use std::f32::consts::TAU;

use lore_midi::{ChannelEvent, ChannelMessage, DRUM_CHANNEL, NUM_CHANNELS};

use super::{mix_to_i16, note_frequency};
use crate::audio::midi::{SynthBackend, SynthSession};
use crate::audio::AudioError;

/// Rate the FM engine renders at
pub const FM_SAMPLE_RATE: u32 = 44_100;

/// Simultaneous voices; note-ons past this steal the oldest voice
const MAX_VOICES: usize = 24;

/// Attack time in samples (~4ms)
const ATTACK_SAMPLES: f32 = 180.0;

/// Headroom so a full chord does not clip
const MIX_GAIN: f32 = 0.18;

/// Timbre settings per General MIDI program family (8 programs each)
///
/// (modulator ratio, modulation index, per-sample decay factor)
const FAMILY_TIMBRES: [(f32, f32, f32); 16] = [
    (2.0, 2.5, 0.999_85), // piano
    (3.0, 3.0, 0.999_80), // chromatic percussion
    (1.0, 1.5, 0.999_97), // organ
    (1.0, 3.5, 0.999_90), // guitar
    (0.5, 2.0, 0.999_92), // bass
    (1.0, 1.0, 0.999_96), // strings
    (1.0, 1.2, 0.999_96), // ensemble
    (2.0, 2.0, 0.999_94), // brass
    (3.0, 1.5, 0.999_94), // reed
    (2.0, 1.0, 0.999_95), // pipe
    (1.0, 4.0, 0.999_90), // synth lead
    (1.0, 1.8, 0.999_95), // synth pad
    (2.0, 3.0, 0.999_88), // synth effects
    (2.0, 2.2, 0.999_90), // ethnic
    (5.0, 4.0, 0.999_70), // percussive
    (4.0, 3.5, 0.999_85), // sound effects
];

#[derive(Clone, Copy)]
struct FmVoice {
    active: bool,
    channel: u8,
    key: u8,
    amp: f32,
    phase: f32,
    phase_inc: f32,
    mod_phase: f32,
    mod_inc: f32,
    mod_index: f32,
    decay: f32,
    env: f32,
    attack_left: f32,
    released: bool,
    /// Allocation clock value, for oldest-voice stealing
    age: u64,
}

impl FmVoice {
    const IDLE: FmVoice = FmVoice {
        active: false,
        channel: 0,
        key: 0,
        amp: 0.0,
        phase: 0.0,
        phase_inc: 0.0,
        mod_phase: 0.0,
        mod_inc: 0.0,
        mod_index: 0.0,
        decay: 1.0,
        env: 0.0,
        attack_left: 0.0,
        released: false,
        age: 0,
    };
}

/// The always-available FM backend
pub struct FmSynth;

impl FmSynth {
    pub fn new() -> Self {
        Self
    }
}

impl Default for FmSynth {
    fn default() -> Self {
        Self::new()
    }
}

impl SynthBackend for FmSynth {
    fn name(&self) -> &'static str {
        "fm"
    }

    /// The fallback must never fail to initialize
    fn initialize(&mut self) -> Result<(), AudioError> {
        Ok(())
    }

    fn open_session(&self) -> Box<dyn SynthSession> {
        Box::new(FmSession::new())
    }
}

pub(crate) struct FmSession {
    voices: [FmVoice; MAX_VOICES],
    programs: [u8; NUM_CHANNELS],
    volumes: [f32; NUM_CHANNELS],
    /// Frequency multiplier from pitch bend, per channel
    bend: [f32; NUM_CHANNELS],
    clock: u64,
}

impl FmSession {
    fn new() -> Self {
        Self {
            voices: [FmVoice::IDLE; MAX_VOICES],
            programs: [0; NUM_CHANNELS],
            volumes: [1.0; NUM_CHANNELS],
            bend: [1.0; NUM_CHANNELS],
            clock: 0,
        }
    }

    fn note_on(&mut self, channel: u8, key: u8, velocity: u8) {
        // Reuse an idle voice, else steal the oldest
        let slot = match self.voices.iter().position(|v| !v.active) {
            Some(idx) => idx,
            None => {
                let mut oldest = 0;
                for (idx, voice) in self.voices.iter().enumerate() {
                    if voice.age < self.voices[oldest].age {
                        oldest = idx;
                    }
                }
                oldest
            }
        };

        let program = self.programs[channel as usize];
        let (ratio, index, decay) = if channel == DRUM_CHANNEL {
            // Percussion: inharmonic modulator, fast decay
            (7.3, 5.0, 0.999_2)
        } else {
            FAMILY_TIMBRES[(program / 8) as usize]
        };

        let freq = note_frequency(key) * self.bend[channel as usize];
        self.clock += 1;
        self.voices[slot] = FmVoice {
            active: true,
            channel,
            key,
            amp: velocity as f32 / 127.0,
            phase: 0.0,
            phase_inc: freq / FM_SAMPLE_RATE as f32,
            mod_phase: 0.0,
            mod_inc: freq * ratio / FM_SAMPLE_RATE as f32,
            mod_index: index,
            decay,
            env: 0.0,
            attack_left: ATTACK_SAMPLES,
            released: false,
            age: self.clock,
        };
    }

    fn note_off(&mut self, channel: u8, key: u8) {
        for voice in &mut self.voices {
            if voice.active && !voice.released && voice.channel == channel && voice.key == key {
                voice.released = true;
            }
        }
    }

    fn release_channel(&mut self, channel: u8) {
        for voice in &mut self.voices {
            if voice.active && voice.channel == channel {
                voice.released = true;
            }
        }
    }
}

impl SynthSession for FmSession {
    fn sample_rate(&self) -> u32 {
        FM_SAMPLE_RATE
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
                // Channel volume
                7 => self.volumes[channel as usize] = value as f32 / 127.0,
                // All notes off
                123 => self.release_channel(channel),
                _ => {}
            },
            ChannelMessage::PitchBend { value } => {
                // +/- 2 semitone bend range
                let semitones = value as f32 / 8192.0 * 2.0;
                self.bend[channel as usize] = f32::powf(2.0, semitones / 12.0);
            }
            ChannelMessage::PolyAftertouch { .. } | ChannelMessage::ChannelAftertouch { .. } => {}
        }
    }

    fn render(&mut self, out: &mut [i16]) {
        for frame in out.chunks_exact_mut(2) {
            let mut mixed = 0.0f32;

            for voice in &mut self.voices {
                if !voice.active {
                    continue;
                }

                // Two-operator FM: modulator phase offsets the carrier
                let modulator = f32::sin(voice.mod_phase * TAU);
                let carrier = f32::sin(voice.phase * TAU + voice.mod_index * modulator);

                mixed += carrier * voice.env * voice.amp * self.volumes[voice.channel as usize];

                voice.phase = (voice.phase + voice.phase_inc).fract();
                voice.mod_phase = (voice.mod_phase + voice.mod_inc).fract();

                if voice.attack_left > 0.0 {
                    voice.attack_left -= 1.0;
                    voice.env = 1.0 - voice.attack_left / ATTACK_SAMPLES;
                } else if voice.released {
                    voice.env *= 0.999_0;
                } else {
                    voice.env *= voice.decay;
                }

                if voice.env < 0.001 && voice.attack_left <= 0.0 {
                    voice.active = false;
                }
            }

            let sample = mix_to_i16(mixed * MIX_GAIN);
            frame[0] = sample;
            frame[1] = sample;
        }
    }

    fn reset(&mut self) {
        *self = FmSession::new();
    }
}
