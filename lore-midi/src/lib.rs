//! Lore-MIDI: Standard MIDI File parser and event sequencer for Lorecore
//!
//! This crate turns `.mid` data into a flat, tempo-resolved event timeline a
//! synthesizer can consume. It does **not** make sound - synthesis backends
//! live in the runtime and pull [`ChannelEvent`]s from a [`Sequencer`] at
//! sample-accurate positions.
//!
//! # Key Features
//!
//! - **Pure Rust**: No external dependencies
//! - **Formats 0 and 1**: Multi-track files are merged into one timeline
//! - **Tempo resolution**: Tempo meta events are folded into the timeline at
//!   sequencing time, so backends only ever see sample-frame positions
//! - **Running status**: Handled per the SMF specification
//!
//! # Usage
//!
//! ```
//! use lore_midi::{Sequencer, parse_smf};
//!
//! # fn smf_fixture() -> Vec<u8> {
//! #     let mut d = Vec::new();
//! #     d.extend_from_slice(b"MThd");
//! #     d.extend_from_slice(&6u32.to_be_bytes());
//! #     d.extend_from_slice(&0u16.to_be_bytes());
//! #     d.extend_from_slice(&1u16.to_be_bytes());
//! #     d.extend_from_slice(&480u16.to_be_bytes());
//! #     let track = [0x00, 0x90, 60, 100, 0x60, 0x80, 60, 0, 0x00, 0xFF, 0x2F, 0x00];
//! #     d.extend_from_slice(b"MTrk");
//! #     d.extend_from_slice(&(track.len() as u32).to_be_bytes());
//! #     d.extend_from_slice(&track);
//! #     d
//! # }
//! let song = parse_smf(&smf_fixture()).unwrap();
//! let mut seq = Sequencer::new(&song, 44_100);
//!
//! // Events due at the current position, then the gap to the next one
//! while let Some(event) = seq.pop_due_event() {
//!     println!("ch {} -> {:?}", event.channel, event.message);
//! }
//! let gap = seq.frames_to_next_event();
//! assert!(gap.is_some());
//! ```

mod error;
mod parser;
mod sequencer;

pub use error::MidiError;
pub use parser::parse_smf;
pub use sequencer::Sequencer;

// =============================================================================
// Constants
// =============================================================================

/// SMF header chunk magic
pub const MTHD_MAGIC: &[u8; 4] = b"MThd";

/// SMF track chunk magic
pub const MTRK_MAGIC: &[u8; 4] = b"MTrk";

/// Default tempo when a file sets none (microseconds per quarter note, 120 BPM)
pub const DEFAULT_TEMPO: u32 = 500_000;

/// MIDI channel count
pub const NUM_CHANNELS: usize = 16;

/// The channel reserved for percussion in General MIDI (zero-based)
pub const DRUM_CHANNEL: u8 = 9;

// =============================================================================
// Song Model
// =============================================================================

/// A parsed MIDI file: merged event timeline in absolute ticks
#[derive(Debug, Clone)]
pub struct MidiSong {
    /// Ticks per quarter note
    pub division: u16,
    /// All events from all tracks, sorted by tick (stable across tracks)
    pub events: Vec<TimedEvent>,
    /// Tick of the latest end-of-track marker
    pub end_tick: u64,
}

/// An event at an absolute tick position
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimedEvent {
    pub tick: u64,
    pub kind: EventKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    /// A channel voice message for a synthesizer
    Channel(ChannelEvent),
    /// Tempo change (microseconds per quarter note)
    Tempo(u32),
}

/// A channel voice message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelEvent {
    /// Zero-based MIDI channel (0-15)
    pub channel: u8,
    pub message: ChannelMessage,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelMessage {
    /// Note released (note-on with velocity 0 is normalized to this)
    NoteOff { key: u8 },
    NoteOn { key: u8, velocity: u8 },
    PolyAftertouch { key: u8, value: u8 },
    ControlChange { controller: u8, value: u8 },
    ProgramChange { program: u8 },
    ChannelAftertouch { value: u8 },
    /// Bend amount in -8192..=8191 (0 = center)
    PitchBend { value: i16 },
}
