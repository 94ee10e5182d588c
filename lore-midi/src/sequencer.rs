//! Sample-clocked event sequencer
//!
//! Folds a [`MidiSong`]'s tempo map into absolute sample-frame positions at
//! construction, so playback is a pure walk over precomputed frame times
//! with no tempo math on the audio path.

use crate::{ChannelEvent, DEFAULT_TEMPO, EventKind, MidiSong};

/// Pull-based sequencer over a parsed song
///
/// The cursor is a sample-frame position. Callers alternate between popping
/// events that are due at the cursor and advancing the cursor by the number
/// of frames they rendered.
pub struct Sequencer {
    /// Channel events at absolute sample-frame positions, sorted
    events: Vec<(u64, ChannelEvent)>,
    /// Sample frame of the latest end-of-track marker
    end_frame: u64,
    sample_rate: u32,
    cursor: u64,
    next_event: usize,
}

impl Sequencer {
    /// Build a sequencer for `song` clocked at `sample_rate`
    pub fn new(song: &MidiSong, sample_rate: u32) -> Self {
        let mut tempo = DEFAULT_TEMPO;
        let mut anchor_tick = 0u64;
        let mut anchor_frame = 0.0f64;

        let frames_per_tick = |tempo: u32| {
            sample_rate as f64 * tempo as f64 / (1_000_000.0 * song.division as f64)
        };

        let mut events = Vec::new();
        for event in &song.events {
            let frame = anchor_frame + (event.tick - anchor_tick) as f64 * frames_per_tick(tempo);
            match event.kind {
                EventKind::Tempo(new_tempo) => {
                    // Re-anchor: later ticks are scaled by the new tempo
                    anchor_tick = event.tick;
                    anchor_frame = frame;
                    tempo = new_tempo;
                }
                EventKind::Channel(channel_event) => {
                    events.push((frame.round() as u64, channel_event));
                }
            }
        }

        let end_frame =
            anchor_frame + (song.end_tick.saturating_sub(anchor_tick)) as f64 * frames_per_tick(tempo);
        let end_frame = (end_frame.round() as u64).max(events.last().map_or(0, |(f, _)| *f));

        Self {
            events,
            end_frame,
            sample_rate,
            cursor: 0,
            next_event: 0,
        }
    }

    /// The sample rate this sequencer was clocked at
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Total song length in sample frames (position of the end-of-track)
    pub fn song_frames(&self) -> u64 {
        self.end_frame
    }

    /// Current cursor position in sample frames
    pub fn position(&self) -> u64 {
        self.cursor
    }

    /// Pop the next event if it is due at or before the cursor
    pub fn pop_due_event(&mut self) -> Option<ChannelEvent> {
        let (frame, event) = self.events.get(self.next_event)?;
        if *frame <= self.cursor {
            self.next_event += 1;
            Some(*event)
        } else {
            None
        }
    }

    /// Frames from the cursor to the next undispatched event
    ///
    /// `Some(0)` means an event is due now; `None` means no events remain.
    pub fn frames_to_next_event(&self) -> Option<u64> {
        self.events
            .get(self.next_event)
            .map(|(frame, _)| frame.saturating_sub(self.cursor))
    }

    /// Advance the cursor by `frames` rendered frames
    pub fn advance(&mut self, frames: u64) {
        self.cursor += frames;
    }

    /// True once every event is dispatched and the cursor passed the song end
    pub fn at_end(&self) -> bool {
        self.next_event >= self.events.len() && self.cursor >= self.end_frame
    }

    /// Reset the cursor and event walk to the start of the song
    pub fn rewind(&mut self) {
        self.cursor = 0;
        self.next_event = 0;
    }
}
