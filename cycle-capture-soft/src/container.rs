//! The soft recorder's container format.
//!
//! ```text
//! "SCAP" | channels: u16 LE | sample_rate: u32 LE | interleaved f32 LE ...
//! ```
//!
//! The header travels in the first non-empty fragment only, so the
//! concatenation of all fragments is one valid container.

use cycle_capture_core::SampleBuffer;
use thiserror::Error;

pub const MAGIC: &[u8; 4] = b"SCAP";
pub const HEADER_SIZE: usize = 10;

const BYTES_PER_SAMPLE: usize = 4;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ContainerError {
    #[error("container is {0} bytes, shorter than its header")]
    Truncated(usize),

    #[error("bad magic {0:02x?}")]
    BadMagic([u8; 4]),

    #[error("container declares zero channels")]
    NoChannels,

    #[error("container declares a zero sample rate")]
    NoSampleRate,

    #[error("{len} payload bytes do not divide into {frame_size}-byte frames")]
    PartialFrame { len: usize, frame_size: usize },
}

pub fn encode_header(channels: u16, sample_rate: u32) -> [u8; HEADER_SIZE] {
    let mut header = [0u8; HEADER_SIZE];
    header[0..4].copy_from_slice(MAGIC);
    header[4..6].copy_from_slice(&channels.to_le_bytes());
    header[6..10].copy_from_slice(&sample_rate.to_le_bytes());
    header
}

pub fn encode_samples(samples: &[f32]) -> Vec<u8> {
    let mut out = Vec::with_capacity(samples.len() * BYTES_PER_SAMPLE);
    for sample in samples {
        out.extend_from_slice(&sample.to_le_bytes());
    }
    out
}

/// Decode a complete container into planar samples.
pub fn decode(data: &[u8]) -> Result<SampleBuffer, ContainerError> {
    if data.len() < HEADER_SIZE {
        return Err(ContainerError::Truncated(data.len()));
    }
    let magic = [data[0], data[1], data[2], data[3]];
    if &magic != MAGIC {
        return Err(ContainerError::BadMagic(magic));
    }
    let channels = u16::from_le_bytes([data[4], data[5]]);
    let sample_rate = u32::from_le_bytes([data[6], data[7], data[8], data[9]]);
    if channels == 0 {
        return Err(ContainerError::NoChannels);
    }
    if sample_rate == 0 {
        return Err(ContainerError::NoSampleRate);
    }

    let payload = &data[HEADER_SIZE..];
    let frame_size = channels as usize * BYTES_PER_SAMPLE;
    if payload.len() % frame_size != 0 {
        return Err(ContainerError::PartialFrame {
            len: payload.len(),
            frame_size,
        });
    }

    let samples: Vec<f32> = payload
        .chunks_exact(BYTES_PER_SAMPLE)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect();

    // Frame alignment is checked above, so this cannot fail.
    SampleBuffer::from_interleaved(sample_rate, channels, &samples).map_err(|_| ContainerError::NoChannels)
}
