//! PCM decoding for narration payloads.
//!
//! The speech service returns base64-encoded raw PCM: signed 16-bit
//! little-endian samples, interleaved by channel, at a fixed 24 kHz. This
//! module turns that payload into per-channel `f32` buffers in [-1.0, 1.0]
//! ready to hand to the output device. No resampling happens here; callers
//! must pass the source rate or playback pitch will be wrong.

use crate::error::NarrationError;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;

/// Sample rate of audio produced by the speech service.
pub const SOURCE_SAMPLE_RATE: u32 = 24_000;

/// Decoded, de-interleaved audio ready for playback.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    sample_rate: u32,
    channels: Vec<Vec<f32>>,
}

impl AudioBuffer {
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channel_count(&self) -> u16 {
        self.channels.len() as u16
    }

    /// Samples per channel.
    pub fn frame_count(&self) -> usize {
        self.channels.first().map(Vec::len).unwrap_or(0)
    }

    pub fn channel(&self, index: usize) -> Option<&[f32]> {
        self.channels.get(index).map(Vec::as_slice)
    }

    /// Re-interleave for sinks that consume a single flat sample stream.
    pub fn interleaved(&self) -> Vec<f32> {
        let frames = self.frame_count();
        let mut out = Vec::with_capacity(frames * self.channels.len());
        for frame in 0..frames {
            for channel in &self.channels {
                out.push(channel[frame]);
            }
        }
        out
    }
}

/// Decode a base64 payload into raw bytes. Pure transform; fails only on
/// malformed input.
pub fn decode_base64(payload: &str) -> Result<Vec<u8>, NarrationError> {
    STANDARD
        .decode(payload)
        .map_err(|err| NarrationError::Decode(format!("invalid base64: {err}")))
}

pub fn encode_base64(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

/// Interpret `bytes` as interleaved signed 16-bit LE PCM and de-interleave
/// into `channel_count` normalized channels.
pub fn decode_audio_data(
    bytes: &[u8],
    sample_rate: u32,
    channel_count: u16,
) -> Result<AudioBuffer, NarrationError> {
    if channel_count == 0 {
        return Err(NarrationError::Decode("zero channels".into()));
    }
    if bytes.len() % 2 != 0 {
        return Err(NarrationError::Decode(format!(
            "odd payload length {}; expected whole 16-bit samples",
            bytes.len()
        )));
    }

    let channel_count = channel_count as usize;
    let sample_count = bytes.len() / 2;
    if sample_count % channel_count != 0 {
        return Err(NarrationError::Decode(format!(
            "{sample_count} samples do not divide into {channel_count} channels"
        )));
    }

    let frame_count = sample_count / channel_count;
    let mut channels = vec![Vec::with_capacity(frame_count); channel_count];
    for (i, pair) in bytes.chunks_exact(2).enumerate() {
        let raw = i16::from_le_bytes([pair[0], pair[1]]);
        channels[i % channel_count].push(f32::from(raw) / 32768.0);
    }

    Ok(AudioBuffer {
        sample_rate,
        channels,
    })
}
