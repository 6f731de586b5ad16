//! Sample buffer → canonical 16-bit PCM WAV.

use crate::models::sample_buffer::SampleBuffer;
use crate::processing::wav_format::{self, PCM_BIT_DEPTH, WAV_HEADER_SIZE};

/// Interleave planar channel data: output index `i * N + c`.
///
/// Mono input is returned as-is.
pub fn interleave(buffer: &SampleBuffer) -> Vec<f32> {
    let channels = buffer.channels();
    match channels.len() {
        0 => Vec::new(),
        1 => channels[0].clone(),
        count => {
            let frames = buffer.len();
            let mut out = vec![0.0f32; frames * count];
            for (c, data) in channels.iter().enumerate() {
                for (i, &sample) in data.iter().enumerate() {
                    out[i * count + c] = sample;
                }
            }
            out
        }
    }
}

/// Convert one float sample to signed 16-bit PCM.
///
/// The sample is clamped to `[-1.0, 1.0]`; negatives scale by 32768 and
/// non-negatives by 32767 so `+1.0` cannot overflow.
pub fn sample_to_pcm16(sample: f32) -> i16 {
    if sample.is_nan() {
        return 0;
    }
    let clamped = sample.clamp(-1.0, 1.0);
    if clamped < 0.0 {
        (clamped * 32768.0) as i16
    } else {
        (clamped * 32767.0) as i16
    }
}

/// Encode `buffer` as a WAV file: 44-byte header followed by interleaved
/// little-endian 16-bit samples. Channel count and sample rate come from
/// the buffer.
///
/// Fails if the buffer cannot be described by a canonical WAV header: more
/// than `u16::MAX` channels or a data chunk past the 4 GiB RIFF limit.
pub fn encode(buffer: &SampleBuffer) -> Result<Vec<u8>, String> {
    let channels = u16::try_from(buffer.number_of_channels())
        .map_err(|_| format!("{} channels do not fit a WAV header", buffer.number_of_channels()))?;
    let data_size = pcm_data_size(buffer.len(), channels)?;
    let header = wav_format::generate_wav_header(buffer.sample_rate(), PCM_BIT_DEPTH, channels, data_size)?;

    let samples = interleave(buffer);
    let mut out = Vec::with_capacity(WAV_HEADER_SIZE + data_size as usize);
    out.extend_from_slice(&header);
    for sample in samples {
        out.extend_from_slice(&sample_to_pcm16(sample).to_le_bytes());
    }
    Ok(out)
}

/// Bytes of 16-bit PCM for `frames` frames of `channels` channels.
pub fn pcm_data_size(frames: usize, channels: u16) -> Result<u32, String> {
    let bytes_per_frame = channels as usize * (PCM_BIT_DEPTH as usize / 8);
    frames
        .checked_mul(bytes_per_frame)
        .and_then(|bytes| u32::try_from(bytes).ok())
        .ok_or_else(|| format!("{} frames of {} channels exceed the WAV size limit", frames, channels))
}
