//! Waveform materialization and float→PCM transcoding.
//!
//! The vocoder emits `float32[1, samples, 1]`; playback wants mono 16-bit
//! signed PCM at 22050 Hz. Conversion is saturating: a full-scale `1.0`
//! sample becomes `32767`, `-1.0` becomes `-32768`, and out-of-range floats
//! clip instead of wrapping.

use ndarray::{s, Array3};

use crate::{AudioBuffer, LoopMode};

/// Output sample rate of the MelGAN vocoder.
pub const SAMPLE_RATE: u32 = 22050;

/// Extract the mono channel from a `[batch, samples, channels]` waveform.
pub fn materialize_waveform(waveform: &Array3<f32>) -> Vec<f32> {
    waveform.slice(s![0, .., 0]).to_vec()
}

/// Serialize float samples to raw little-endian bytes, 4 bytes per sample.
pub fn samples_to_le_bytes(samples: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(samples.len() * 4);
    for sample in samples {
        bytes.extend_from_slice(&sample.to_le_bytes());
    }
    bytes
}

/// Transcode raw little-endian float32 bytes into 16-bit little-endian PCM.
///
/// Each 4-byte float collapses to 2 bytes at half the input offset, so the
/// output is exactly half the input length.
pub fn convert_to_16bit(data: &[u8]) -> Vec<u8> {
    let mut pcm = Vec::with_capacity(data.len() / 2);
    for chunk in data.chunks_exact(4) {
        let sample = f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        let value = (sample.clamp(-1.0, 1.0) * 32768.0).round() as i32;
        let value = value.clamp(i16::MIN as i32, i16::MAX as i32) as i16;
        pcm.extend_from_slice(&value.to_le_bytes());
    }
    pcm
}

/// Pack a vocoder waveform into a playable audio buffer.
pub fn build_audio_buffer(waveform: &Array3<f32>) -> AudioBuffer {
    let samples = materialize_waveform(waveform);
    let data = convert_to_16bit(&samples_to_le_bytes(&samples));
    let loop_end = data.len() / 2;
    AudioBuffer {
        data,
        sample_rate: SAMPLE_RATE,
        channels: 1,
        loop_mode: LoopMode::Disabled,
        loop_end,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_is_half_the_input_length() {
        let input = samples_to_le_bytes(&[0.0; 37]);
        assert_eq!(input.len(), 148);
        assert_eq!(convert_to_16bit(&input).len(), 74);
    }

    #[test]
    fn full_scale_samples_saturate() {
        let pcm = convert_to_16bit(&samples_to_le_bytes(&[1.0, -1.0, 2.5, -2.5]));
        let values: Vec<i16> = pcm
            .chunks_exact(2)
            .map(|b| i16::from_le_bytes([b[0], b[1]]))
            .collect();
        assert_eq!(values, vec![32767, -32768, 32767, -32768]);
    }

    #[test]
    fn mid_scale_sample_rounds() {
        let pcm = convert_to_16bit(&samples_to_le_bytes(&[0.5]));
        assert_eq!(i16::from_le_bytes([pcm[0], pcm[1]]), 16384);
    }

    #[test]
    fn silence_is_zero() {
        let pcm = convert_to_16bit(&samples_to_le_bytes(&[0.0, 0.0]));
        assert_eq!(pcm, vec![0, 0, 0, 0]);
    }

    #[test]
    fn materialize_takes_channel_zero() {
        let waveform =
            Array3::from_shape_fn((1, 4, 1), |(_, sample, _)| sample as f32 / 10.0);
        assert_eq!(materialize_waveform(&waveform), vec![0.0, 0.1, 0.2, 0.3]);
    }

    #[test]
    fn buffer_descriptor_matches_the_pipeline_contract() {
        let waveform = Array3::from_elem((1, 100, 1), 0.5f32);
        let buffer = build_audio_buffer(&waveform);
        assert_eq!(buffer.sample_rate, 22050);
        assert_eq!(buffer.channels, 1);
        assert_eq!(buffer.loop_mode, LoopMode::Disabled);
        assert_eq!(buffer.sample_count(), 100);
        assert_eq!(buffer.loop_end, 100);
    }
}
