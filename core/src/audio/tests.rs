//! Audio pipeline tests
//!
//! Contract-level coverage across decoders, the backend selector, and the
//! resampling decorator. Codec-internal behavior is tested in `lore-qoa`;
//! SMF parsing in `lore-midi`.

use std::io::{Cursor, Read, Seek, SeekFrom};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use lore_midi::ChannelEvent;

use super::midi::{SynthBackend, SynthRegistry, SynthSession};
use super::qoa::QoaDecoder;
use super::resampler::Resampler;
use super::{
    AudioDecoder, AudioError, AudioFormat, SampleEncoding, SharedSource, shared_source,
};

// ========================================
// Fixtures
// ========================================

/// Encode `seconds` of a stereo test tone as an LQA1 stream
fn lqa_fixture(seconds: f64, frame_len: usize) -> Vec<u8> {
    let frames = (lore_qoa::SAMPLE_RATE as f64 * seconds) as usize;
    let samples: Vec<i16> = (0..frames * 2)
        .map(|i| {
            let t = (i / 2) as f32 / lore_qoa::SAMPLE_RATE as f32;
            (f32::sin(t * 220.0 * std::f32::consts::TAU) * 12000.0) as i16
        })
        .collect();
    lore_qoa::encode_with_frame_len(&samples, 2, frame_len)
}

fn lqa_source(seconds: f64, frame_len: usize) -> SharedSource {
    shared_source(Cursor::new(lqa_fixture(seconds, frame_len)))
}

/// Minimal format-0 SMF: one note per `(tick_on, tick_off, key)` triple,
/// end-of-track at `end_tick` (division 480, default tempo)
fn smf_fixture(notes: &[(u32, u32, u8)], end_tick: u32) -> Vec<u8> {
    let mut events: Vec<(u32, Vec<u8>)> = Vec::new();
    for &(on, off, key) in notes {
        events.push((on, vec![0x90, key, 100]));
        events.push((off, vec![0x80, key, 0]));
    }
    events.push((end_tick, vec![0xFF, 0x2F, 0x00]));
    events.sort_by_key(|(tick, _)| *tick);

    let mut track = Vec::new();
    let mut last = 0u32;
    for (tick, bytes) in events {
        push_vlq(&mut track, tick - last);
        track.extend_from_slice(&bytes);
        last = tick;
    }

    let mut data = Vec::new();
    data.extend_from_slice(b"MThd");
    data.extend_from_slice(&6u32.to_be_bytes());
    data.extend_from_slice(&0u16.to_be_bytes());
    data.extend_from_slice(&1u16.to_be_bytes());
    data.extend_from_slice(&480u16.to_be_bytes());
    data.extend_from_slice(b"MTrk");
    data.extend_from_slice(&(track.len() as u32).to_be_bytes());
    data.extend_from_slice(&track);
    data
}

fn push_vlq(out: &mut Vec<u8>, mut value: u32) {
    let mut bytes = vec![(value & 0x7F) as u8];
    value >>= 7;
    while value > 0 {
        bytes.push((value & 0x7F) as u8 | 0x80);
        value >>= 7;
    }
    bytes.reverse();
    out.extend_from_slice(&bytes);
}

fn smf_source(notes: &[(u32, u32, u8)], end_tick: u32) -> SharedSource {
    shared_source(Cursor::new(smf_fixture(notes, end_tick)))
}

/// Drain a decoder with `chunk`-byte fills, returning all produced bytes
fn drain(decoder: &mut dyn AudioDecoder, chunk: usize) -> Vec<u8> {
    let mut all = Vec::new();
    let mut buf = vec![0u8; chunk];
    // Cap iterations so a regression cannot spin forever
    for _ in 0..100_000 {
        let n = decoder.fill_buffer(&mut buf).unwrap();
        all.extend_from_slice(&buf[..n]);
        if decoder.is_finished() {
            break;
        }
        assert!(n > 0, "no progress without end of stream");
    }
    all
}

/// A stream wrapper counting every read callback
struct CountingSource {
    inner: Cursor<Vec<u8>>,
    reads: Arc<AtomicUsize>,
}

impl Read for CountingSource {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.inner.read(buf)
    }
}

impl Seek for CountingSource {
    fn seek(&mut self, pos: SeekFrom) -> std::io::Result<u64> {
        self.inner.seek(pos)
    }
}

/// Instrumented synth backend with scripted initialization outcome
struct ScriptedBackend {
    name: &'static str,
    fail: bool,
    init_calls: Arc<AtomicUsize>,
}

impl ScriptedBackend {
    fn new(name: &'static str, fail: bool) -> (Box<dyn SynthBackend>, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        (
            Box::new(Self {
                name,
                fail,
                init_calls: calls.clone(),
            }),
            calls,
        )
    }
}

impl SynthBackend for ScriptedBackend {
    fn name(&self) -> &'static str {
        self.name
    }

    fn initialize(&mut self) -> Result<(), AudioError> {
        self.init_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            Err(AudioError::BackendUnavailable("scripted failure".into()))
        } else {
            Ok(())
        }
    }

    fn open_session(&self) -> Box<dyn SynthSession> {
        Box::new(SilentSession)
    }
}

/// Renders silence at 44100 Hz
struct SilentSession;

impl SynthSession for SilentSession {
    fn sample_rate(&self) -> u32 {
        44_100
    }
    fn handle_event(&mut self, _event: &ChannelEvent) {}
    fn render(&mut self, out: &mut [i16]) {
        out.fill(0);
    }
    fn reset(&mut self) {}
}

const S16_STEREO_44K: AudioFormat = AudioFormat::new(44_100, SampleEncoding::S16, 2);

// ========================================
// QoaDecoder
// ========================================

#[test]
fn test_qoa_open_rejects_garbage() {
    let source = shared_source(Cursor::new(b"not a music stream".to_vec()));
    let err = QoaDecoder::open(source).unwrap_err();
    assert!(matches!(err, AudioError::UnreadableStream(_)));
}

#[test]
fn test_qoa_native_format() {
    let mut decoder = QoaDecoder::open(lqa_source(0.1, 5120)).unwrap();
    assert_eq!(decoder.format(), S16_STEREO_44K);
    assert!(decoder.set_format(S16_STEREO_44K).is_ok());
}

#[test]
fn test_qoa_set_format_rejects_other_triples() {
    let mut decoder = QoaDecoder::open(lqa_source(0.1, 5120)).unwrap();
    let wrong = [
        AudioFormat::new(22_050, SampleEncoding::S16, 2),
        AudioFormat::new(44_100, SampleEncoding::F32, 2),
        AudioFormat::new(44_100, SampleEncoding::S16, 1),
    ];
    for requested in wrong {
        assert!(matches!(
            decoder.set_format(requested),
            Err(AudioError::FormatUnsupported { .. })
        ));
        // Rejection leaves the effective format untouched
        assert_eq!(decoder.format(), S16_STEREO_44K);
    }
}

#[test]
fn test_qoa_fill_bounds() {
    let mut decoder = QoaDecoder::open(lqa_source(0.05, 5120)).unwrap();
    let mut buf = vec![0u8; 4096];
    let n = decoder.fill_buffer(&mut buf).unwrap();
    assert!(n <= buf.len());
    // A fresh short stream fills this request completely
    assert_eq!(n, buf.len());
    assert!(!decoder.is_finished());
}

#[test]
fn test_qoa_short_fill_means_end_of_stream() {
    // 0.01s = 441 frames = 1764 bytes, less than one 4096-byte request
    let mut decoder = QoaDecoder::open(lqa_source(0.01, 5120)).unwrap();
    let mut buf = vec![0u8; 4096];
    let n = decoder.fill_buffer(&mut buf).unwrap();
    assert_eq!(n, 441 * 4);
    assert!(decoder.is_finished());
    // The unfilled tail is zeroed, not stale
    assert!(buf[n..].iter().all(|&b| b == 0));
}

#[test]
fn test_qoa_accumulation_is_gapless() {
    // Tiny codec frames force the fill loop to accumulate many backend
    // reads per request; the PCM must match a one-small-fill-at-a-time
    // drain exactly
    let fixture = lqa_fixture(0.2, 64);

    let mut big = QoaDecoder::open(shared_source(Cursor::new(fixture.clone()))).unwrap();
    let big_pcm = drain(&mut big, 176_400);

    let mut small = QoaDecoder::open(shared_source(Cursor::new(fixture))).unwrap();
    let small_pcm = drain(&mut small, 256);

    assert_eq!(big_pcm, small_pcm);
}

#[test]
fn test_qoa_one_second_stream_ticks() {
    let mut decoder = QoaDecoder::open(lqa_source(1.0, 5120)).unwrap();
    assert_eq!(decoder.ticks(), 0);
    let pcm = drain(&mut decoder, 16_384);
    assert_eq!(pcm.len(), 44_100 * 4);
    assert_eq!(decoder.ticks(), 1);
}

#[test]
fn test_qoa_seek_to_start_clears_finished() {
    let mut decoder = QoaDecoder::open(lqa_source(0.05, 5120)).unwrap();
    let first = drain(&mut decoder, 4096);
    assert!(decoder.is_finished());

    decoder.seek(SeekFrom::Start(0)).unwrap();
    assert!(!decoder.is_finished());
    assert_eq!(decoder.ticks(), 0);

    let second = drain(&mut decoder, 4096);
    assert_eq!(first, second);
}

#[test]
fn test_qoa_seek_elsewhere_fails_without_side_effects() {
    let mut decoder = QoaDecoder::open(lqa_source(0.1, 5120)).unwrap();
    let mut buf = vec![0u8; 1024];
    decoder.fill_buffer(&mut buf).unwrap();
    let ticks_before = decoder.ticks();

    assert!(matches!(
        decoder.seek(SeekFrom::Start(100)),
        Err(AudioError::SeekUnsupported)
    ));
    assert!(matches!(
        decoder.seek(SeekFrom::End(0)),
        Err(AudioError::SeekUnsupported)
    ));
    assert_eq!(decoder.ticks(), ticks_before);
}

#[test]
fn test_qoa_empty_fill_is_noop() {
    let reads = Arc::new(AtomicUsize::new(0));
    let source = shared_source(CountingSource {
        inner: Cursor::new(lqa_fixture(0.05, 5120)),
        reads: reads.clone(),
    });
    let mut decoder = QoaDecoder::open(source).unwrap();

    let reads_after_open = reads.load(Ordering::SeqCst);
    let n = decoder.fill_buffer(&mut []).unwrap();

    assert_eq!(n, 0);
    assert!(!decoder.is_finished());
    assert_eq!(decoder.ticks(), 0);
    // No backend read happened for the empty request
    assert_eq!(reads.load(Ordering::SeqCst), reads_after_open);
}

#[test]
fn test_qoa_shared_source_outlives_decoder() {
    let source = lqa_source(0.05, 5120);
    {
        let mut decoder = QoaDecoder::open(source.clone()).unwrap();
        let mut buf = vec![0u8; 512];
        decoder.fill_buffer(&mut buf).unwrap();
    }
    // Decoder dropped; this holder still owns a usable stream
    let mut guard = source.lock().unwrap();
    assert!(guard.seek(SeekFrom::Start(0)).is_ok());
}

// ========================================
// Synthesis backend selection
// ========================================

#[test]
fn test_selector_probes_in_order_and_caches_failures() {
    let (first, first_calls) = ScriptedBackend::new("rich", true);
    let (second, second_calls) = ScriptedBackend::new("mid", true);
    let (third, third_calls) = ScriptedBackend::new("fallback", false);
    let mut registry = SynthRegistry::new(vec![first, second, third]);

    let decoder = registry.create_decoder(smf_source(&[(0, 480, 60)], 960), false);
    assert!(decoder.is_ok());

    assert_eq!(first_calls.load(Ordering::SeqCst), 1);
    assert_eq!(second_calls.load(Ordering::SeqCst), 1);
    assert_eq!(third_calls.load(Ordering::SeqCst), 1);
    assert_eq!(registry.is_available("rich"), Some(false));
    assert_eq!(registry.is_available("mid"), Some(false));
    assert_eq!(registry.is_available("fallback"), Some(true));

    // A second creation must not re-attempt the failed backends, nor
    // re-initialize the working one
    registry
        .create_decoder(smf_source(&[(0, 480, 60)], 960), false)
        .unwrap();
    assert_eq!(first_calls.load(Ordering::SeqCst), 1);
    assert_eq!(second_calls.load(Ordering::SeqCst), 1);
    assert_eq!(third_calls.load(Ordering::SeqCst), 1);
}

#[test]
fn test_selector_without_usable_backend_errors() {
    let (only, _) = ScriptedBackend::new("rich", true);
    let mut registry = SynthRegistry::new(vec![only]);
    let err = registry
        .create_decoder(smf_source(&[(0, 480, 60)], 960), false)
        .unwrap_err();
    assert!(matches!(err, AudioError::NoBackend));
}

#[test]
fn test_selector_wavetable_missing_manifest_falls_back_to_fm() {
    let dir = tempfile::tempdir().unwrap();
    let bogus = dir.path().join("patches.toml"); // never created
    let mut registry = SynthRegistry::with_default_backends(Some(&bogus));

    let decoder = registry
        .create_decoder(smf_source(&[(0, 480, 69)], 960), false)
        .unwrap();

    assert_eq!(registry.is_available("wavetable"), Some(false));
    assert_eq!(registry.is_available("fm"), Some(true));
    assert_eq!(decoder.format(), S16_STEREO_44K);
}

#[test]
fn test_selector_rejects_unreadable_midi() {
    let mut registry = SynthRegistry::with_default_backends(None);
    let source = shared_source(Cursor::new(b"junk".to_vec()));
    let err = registry.create_decoder(source, false).unwrap_err();
    assert!(matches!(err, AudioError::UnreadableStream(_)));
}

// ========================================
// MIDI decoder end to end (FM fallback)
// ========================================

#[test]
fn test_midi_decoder_renders_and_finishes() {
    let mut registry = SynthRegistry::with_default_backends(None);
    // Two quarters of music, end-of-track at 2 seconds (tick 1920)
    let mut decoder = registry
        .create_decoder(smf_source(&[(0, 480, 60), (480, 960, 64)], 1920), false)
        .unwrap();

    let pcm = drain(decoder.as_mut(), 16_384);

    // 2 seconds at 44100 stereo S16
    assert_eq!(pcm.len(), 2 * 44_100 * 4);
    assert!(decoder.is_finished());
    assert_eq!(decoder.ticks(), 2);
    // The FM fallback actually made sound
    assert!(pcm.iter().any(|&b| b != 0));
}

#[test]
fn test_midi_decoder_seek_to_start_replays() {
    let mut registry = SynthRegistry::with_default_backends(None);
    let mut decoder = registry
        .create_decoder(smf_source(&[(0, 240, 72)], 480), false)
        .unwrap();

    let first = drain(decoder.as_mut(), 8192);
    assert!(decoder.is_finished());

    decoder.seek(SeekFrom::Start(0)).unwrap();
    assert!(!decoder.is_finished());
    assert_eq!(decoder.ticks(), 0);

    let second = drain(decoder.as_mut(), 8192);
    assert_eq!(first.len(), second.len());
    // Deterministic synthesis: the replay is bit-identical
    assert_eq!(first, second);
}

#[test]
fn test_midi_decoder_format_is_pinned() {
    let mut registry = SynthRegistry::with_default_backends(None);
    let mut decoder = registry
        .create_decoder(smf_source(&[(0, 480, 60)], 960), false)
        .unwrap();

    assert_eq!(decoder.format(), S16_STEREO_44K);
    assert!(matches!(
        decoder.set_format(AudioFormat::new(48_000, SampleEncoding::S16, 2)),
        Err(AudioError::FormatUnsupported { .. })
    ));
    assert_eq!(decoder.format(), S16_STEREO_44K);
}

// ========================================
// Resampling decorator
// ========================================

/// Produces a deterministic ramp at 44100 Hz for resampler tests
#[derive(Debug)]
struct RampDecoder {
    total_frames: u64,
    produced: u64,
    finished: bool,
}

impl RampDecoder {
    fn new(total_frames: u64) -> Self {
        Self {
            total_frames,
            produced: 0,
            finished: false,
        }
    }
}

impl AudioDecoder for RampDecoder {
    fn format(&self) -> AudioFormat {
        S16_STEREO_44K
    }

    fn set_format(&mut self, requested: AudioFormat) -> Result<(), AudioError> {
        if requested != S16_STEREO_44K {
            return Err(AudioError::FormatUnsupported {
                requested,
                native: S16_STEREO_44K,
            });
        }
        Ok(())
    }

    fn fill_buffer(&mut self, out: &mut [u8]) -> Result<usize, AudioError> {
        out.fill(0);
        let frames = (out.len() / 4).min((self.total_frames - self.produced) as usize);
        for i in 0..frames {
            let v = ((self.produced + i as u64) % 10_000) as i16;
            out[i * 4..i * 4 + 2].copy_from_slice(&v.to_le_bytes());
            out[i * 4 + 2..i * 4 + 4].copy_from_slice(&v.to_le_bytes());
        }
        self.produced += frames as u64;
        if frames < out.len() / 4 {
            self.finished = true;
        }
        Ok(frames * 4)
    }

    fn seek(&mut self, to: SeekFrom) -> Result<(), AudioError> {
        match to {
            SeekFrom::Start(0) => {
                self.produced = 0;
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
        self.produced / 44_100
    }
}

#[test]
fn test_resampler_advertises_target_rate() {
    let resampler = Resampler::new(Box::new(RampDecoder::new(44_100)), 22_050);
    assert_eq!(
        resampler.format(),
        AudioFormat::new(22_050, SampleEncoding::S16, 2)
    );
}

#[test]
fn test_resampler_format_is_pinned() {
    let mut resampler = Resampler::new(Box::new(RampDecoder::new(44_100)), 22_050);
    assert!(matches!(
        resampler.set_format(S16_STEREO_44K),
        Err(AudioError::FormatUnsupported { .. })
    ));
    assert!(
        resampler
            .set_format(AudioFormat::new(22_050, SampleEncoding::S16, 2))
            .is_ok()
    );
}

#[test]
fn test_resampler_2_to_1_halves_output() {
    let mut resampler = Resampler::new(Box::new(RampDecoder::new(44_100)), 22_050);
    let pcm = drain(&mut resampler, 16_384);
    let frames = pcm.len() / 4;
    // One second of input becomes half as many frames (within interpolation
    // edge slack)
    assert!((22_049..=22_050).contains(&frames), "got {} frames", frames);
    assert!(resampler.is_finished());
}

#[test]
fn test_resampler_1_to_1_is_passthrough() {
    let mut inner = RampDecoder::new(4410);
    let expected = drain(&mut inner, 4096);

    let mut resampler = Resampler::new(Box::new(RampDecoder::new(4410)), 44_100);
    let pcm = drain(&mut resampler, 4096);

    assert_eq!(pcm, expected);
}

#[test]
fn test_resampler_forwards_seek_and_ticks() {
    let mut resampler = Resampler::new(Box::new(RampDecoder::new(88_200)), 22_050);
    let _ = drain(&mut resampler, 16_384);
    assert_eq!(resampler.ticks(), 2);
    assert!(resampler.is_finished());

    resampler.seek(SeekFrom::Start(0)).unwrap();
    assert!(!resampler.is_finished());
    assert_eq!(resampler.ticks(), 0);

    assert!(matches!(
        resampler.seek(SeekFrom::Start(500)),
        Err(AudioError::SeekUnsupported)
    ));
}
