//! QOA encoder
//!
//! Produces complete LQA1 streams (header + frames). Used by the asset
//! pipeline and by tests to build fixture streams; playback only ever uses
//! the decode side.

use crate::{
    MAX_CHANNELS, QOA_DEQUANT_TAB, QOA_FRAME_HEADER_SIZE, QOA_FRAME_LEN, QOA_LMS_STATE_SIZE,
    QOA_QUANT_TAB, QOA_SCALEFACTOR_TAB, QOA_SLICE_LEN, QoaLms, STREAM_MAGIC, clamp_i16,
};

/// Encode a slice of up to 20 samples
///
/// Tries all 16 scalefactors and picks the one with lowest MSE.
///
/// # Arguments
/// * `samples` - Input samples (up to 20)
/// * `lms` - LMS predictor state (updated during encoding)
///
/// # Returns
/// The 64-bit encoded slice
pub fn encode_slice(samples: &[i16], lms: &mut QoaLms) -> u64 {
    let mut best_slice = 0u64;
    let mut best_error = i64::MAX;
    let mut best_lms = *lms;

    for sf in 0..16 {
        let mut test_lms = *lms;
        let mut slice = (sf as u64) << 60;
        let mut total_error = 0i64;

        for (i, &sample) in samples.iter().enumerate().take(QOA_SLICE_LEN) {
            let predicted = test_lms.predict();
            let residual = sample as i32 - predicted;

            // Quantize: divide by scalefactor, clamp to -8..8, lookup index
            let scaled = residual / QOA_SCALEFACTOR_TAB[sf].max(1);
            let clamped = scaled.clamp(-8, 8);
            let quantized = QOA_QUANT_TAB[(clamped + 8) as usize];

            // Dequantize to get reconstruction
            let dequantized = QOA_DEQUANT_TAB[sf][quantized as usize];
            let reconstructed = clamp_i16(predicted + dequantized);

            test_lms.update(reconstructed, dequantized);

            let error = (sample as i32 - reconstructed).abs() as i64;
            total_error += error * error;

            slice |= (quantized as u64) << (57 - i * 3);
        }

        if total_error < best_error {
            best_error = total_error;
            best_slice = slice;
            best_lms = test_lms;
        }
    }

    *lms = best_lms;
    best_slice
}

/// Encode interleaved PCM samples to a complete LQA1 stream
///
/// # Arguments
/// * `samples` - Interleaved PCM samples (mono or stereo, 16-bit)
/// * `channels` - Channel count (1 or 2)
///
/// # Returns
/// LQA1 stream bytes (header + frames). Sample rate is fixed at 44100 Hz
/// and controlled by the asset pipeline.
pub fn encode(samples: &[i16], channels: u16) -> Vec<u8> {
    encode_with_frame_len(samples, channels, QOA_FRAME_LEN)
}

/// Encode with an explicit codec-frame length
///
/// `frame_len` is the number of sample frames per codec frame (clamped to
/// 1..=5120). Smaller frames decode in smaller increments, which matters for
/// latency-sensitive streaming and for exercising partial reads in tests.
pub fn encode_with_frame_len(samples: &[i16], channels: u16, frame_len: usize) -> Vec<u8> {
    let channels = (channels as usize).clamp(1, MAX_CHANNELS);
    let frame_len = frame_len.clamp(1, QOA_FRAME_LEN);
    let total_frames = samples.len() / channels;

    let mut output = Vec::new();
    output.extend_from_slice(STREAM_MAGIC);
    output.extend_from_slice(&(total_frames as u32).to_be_bytes());

    let mut lms = [QoaLms::new(); MAX_CHANNELS];
    let mut frame_idx = 0;

    // Deinterleaved scratch, reused per frame
    let mut chans: [Vec<i16>; MAX_CHANNELS] = [Vec::new(), Vec::new()];

    while frame_idx < total_frames {
        let frames_in_frame = (total_frames - frame_idx).min(frame_len);
        let slices_per_channel = frames_in_frame.div_ceil(QOA_SLICE_LEN);

        let frame_size = QOA_FRAME_HEADER_SIZE
            + channels * QOA_LMS_STATE_SIZE
            + channels * slices_per_channel * 8;

        // Frame header (channels + frames_in_frame + frame_size, no sample rate)
        output.push(channels as u8);
        output.extend_from_slice(&(frames_in_frame as u16).to_be_bytes());
        output.extend_from_slice(&(frame_size as u16).to_be_bytes());

        // LMS state snapshot per channel (history + weights as i16 big-endian)
        for lms_state in lms.iter().take(channels) {
            for i in 0..4 {
                output.extend_from_slice(&(lms_state.history[i] as i16).to_be_bytes());
            }
            for i in 0..4 {
                output.extend_from_slice(&(lms_state.weights[i] as i16).to_be_bytes());
            }
        }

        // Deinterleave this frame's samples
        for (ch, chan) in chans.iter_mut().enumerate().take(channels) {
            chan.clear();
            chan.extend(
                samples[frame_idx * channels..(frame_idx + frames_in_frame) * channels]
                    .iter()
                    .skip(ch)
                    .step_by(channels),
            );
        }

        // Slices, channel-interleaved per slice group
        for slice_idx in 0..slices_per_channel {
            let start = slice_idx * QOA_SLICE_LEN;
            let end = (start + QOA_SLICE_LEN).min(frames_in_frame);
            for ch in 0..channels {
                let slice = encode_slice(&chans[ch][start..end], &mut lms[ch]);
                output.extend_from_slice(&slice.to_be_bytes());
            }
        }

        frame_idx += frames_in_frame;
    }

    output
}
