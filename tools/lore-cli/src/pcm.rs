//! PCM conversion helpers shared by the subcommands

use std::path::Path;

use anyhow::{Context, Result, bail};
use lorecore_core::AudioDecoder;

/// Interleaved samples plus their source spec
pub struct WavPcm {
    pub samples: Vec<i16>,
    pub channels: u16,
    pub sample_rate: u32,
}

/// Read a WAV file as interleaved i16 (int or float sources)
pub fn read_wav(path: &Path) -> Result<WavPcm> {
    let mut reader =
        hound::WavReader::open(path).with_context(|| format!("opening {}", path.display()))?;
    let spec = reader.spec();

    if spec.channels == 0 || spec.channels > 2 {
        bail!(
            "{}: unsupported channel count {} (expected mono or stereo)",
            path.display(),
            spec.channels
        );
    }

    let samples: Vec<i16> = match spec.sample_format {
        hound::SampleFormat::Int => {
            if spec.bits_per_sample > 16 {
                let shift = spec.bits_per_sample - 16;
                reader
                    .samples::<i32>()
                    .map(|s| s.map(|v| (v >> shift) as i16))
                    .collect::<Result<_, _>>()?
            } else {
                reader.samples::<i16>().collect::<Result<_, _>>()?
            }
        }
        hound::SampleFormat::Float => reader
            .samples::<f32>()
            .map(|s| s.map(|v| (v.clamp(-1.0, 1.0) * 32767.0) as i16))
            .collect::<Result<_, _>>()?,
    };

    Ok(WavPcm {
        samples,
        channels: spec.channels,
        sample_rate: spec.sample_rate,
    })
}

/// Resample interleaved PCM to `target_rate` using linear interpolation
pub fn resample(pcm: &WavPcm, target_rate: u32) -> Vec<i16> {
    if pcm.sample_rate == target_rate || pcm.samples.is_empty() {
        return pcm.samples.clone();
    }

    let channels = pcm.channels as usize;
    let frames = pcm.samples.len() / channels;
    let ratio = pcm.sample_rate as f64 / target_rate as f64;
    let output_frames = (frames as f64 / ratio).ceil() as usize;
    let mut output = Vec::with_capacity(output_frames * channels);

    for i in 0..output_frames {
        let src_pos = i as f64 * ratio;
        let src_idx = src_pos.floor() as usize;
        let frac = src_pos - src_idx as f64;

        for ch in 0..channels {
            let s1 = pcm.samples[src_idx * channels + ch] as f64;
            let sample = if src_idx + 1 < frames {
                let s2 = pcm.samples[(src_idx + 1) * channels + ch] as f64;
                (s1 + (s2 - s1) * frac).round() as i16
            } else {
                s1 as i16
            };
            output.push(sample);
        }
    }

    output
}

/// Drain a decoder to a stereo S16 WAV file at the decoder's output rate
pub fn drain_to_wav(decoder: &mut dyn AudioDecoder, path: &Path) -> Result<u64> {
    let spec = hound::WavSpec {
        channels: 2,
        sample_rate: decoder.format().sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec)
        .with_context(|| format!("creating {}", path.display()))?;

    let mut buf = vec![0u8; 64 * 1024];
    let mut frames_written = 0u64;
    loop {
        let bytes = decoder
            .fill_buffer(&mut buf)
            .with_context(|| format!("decoding into {}", path.display()))?;
        for sample in buf[..bytes].chunks_exact(2) {
            writer.write_sample(i16::from_le_bytes([sample[0], sample[1]]))?;
        }
        frames_written += (bytes / 4) as u64;
        if decoder.is_finished() {
            break;
        }
        if bytes == 0 {
            bail!("decoder stalled without reaching end of stream");
        }
    }

    writer.finalize()?;
    Ok(frames_written)
}
