use rubato::{FastFixedIn, PolynomialDegree};

pub use live_voice_types::audio::{INPUT_SAMPLE_RATE, OUTPUT_SAMPLE_RATE};

/// Maps a float sample onto the signed 16-bit range, clamping out of range input.
pub fn quantize(sample: f32) -> i16 {
    (sample * 32768.0).round().clamp(-32768.0, 32767.0) as i16
}

pub fn dequantize(sample: i16) -> f32 {
    sample as f32 / 32768.0
}

pub fn float_to_pcm16(samples: &[f32]) -> Vec<i16> {
    samples.iter().map(|&s| quantize(s)).collect()
}

pub fn pcm16_to_float(samples: &[i16]) -> Vec<f32> {
    samples.iter().map(|&s| dequantize(s)).collect()
}

/// Reads little-endian PCM16 bytes. A trailing odd byte is ignored.
pub fn bytes_to_float(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(2)
        .map(|chunk| dequantize(i16::from_le_bytes([chunk[0], chunk[1]])))
        .collect()
}

/// Averages interleaved frames down to one channel.
pub fn downmix(data: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return data.to_vec();
    }
    data.chunks(channels)
        .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
        .collect()
}

/// Splits `samples` into pieces of at most `max` samples without padding.
pub fn split_segments(samples: &[f32], max: usize) -> Vec<Vec<f32>> {
    samples.chunks(max.max(1)).map(|chunk| chunk.to_vec()).collect()
}

pub fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    (samples.iter().map(|s| s * s).sum::<f32>() / samples.len() as f32).sqrt()
}

pub fn create_resampler(in_sampling_rate: f64, out_sampling_rate: f64, chunk_size: usize) -> anyhow::Result<FastFixedIn<f32>> {
    let resampler = FastFixedIn::<f32>::new(
        out_sampling_rate / in_sampling_rate,
        1.0,
        PolynomialDegree::Cubic,
        chunk_size,
        1,
    )?;
    Ok(resampler)
}

#[cfg(test)]
mod tests {
    use super::*;
    use live_voice_types::AudioFrame;

    #[test]
    fn test_quantize_clamps() {
        assert_eq!(quantize(1.0), 32767);
        assert_eq!(quantize(2.5), 32767);
        assert_eq!(quantize(-1.0), -32768);
        assert_eq!(quantize(-3.0), -32768);
        assert_eq!(quantize(0.0), 0);
    }

    #[test]
    fn test_round_trip_is_within_one_step() {
        let samples = [0.0, 0.25, -0.5, 0.999, -0.999, 0.123_456];
        let frame = AudioFrame::from_samples(&float_to_pcm16(&samples), INPUT_SAMPLE_RATE);
        let received = AudioFrame::from_base64(&frame.to_base64(), INPUT_SAMPLE_RATE).unwrap();
        let decoded = bytes_to_float(received.data());
        assert_eq!(decoded.len(), samples.len());
        for (a, b) in samples.iter().zip(decoded.iter()) {
            assert!((a - b).abs() <= 1.0 / 32768.0, "{} vs {}", a, b);
        }
    }

    #[test]
    fn test_odd_trailing_byte_is_ignored() {
        assert_eq!(bytes_to_float(&[0, 64, 7]), vec![0.5]);
    }

    #[test]
    fn test_downmix_stereo() {
        let mono = downmix(&[1.0, 0.0, 0.5, 0.5], 2);
        assert_eq!(mono, vec![0.5, 0.5]);
    }

    #[test]
    fn test_split_segments_does_not_pad() {
        let samples = vec![0.1; 10];
        let segments = split_segments(&samples, 4);
        let lens: Vec<_> = segments.iter().map(Vec::len).collect();
        assert_eq!(lens, vec![4, 4, 2]);
    }

    #[test]
    fn test_rms() {
        assert_eq!(rms(&[]), 0.0);
        assert!((rms(&[0.5, -0.5]) - 0.5).abs() < 1e-6);
    }
}
