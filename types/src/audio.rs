use base64::Engine;

/// Audio data encoded as base64
pub type Base64EncodedAudioBytes = String;

/// Sample rate of PCM16 audio sent to the service.
pub const INPUT_SAMPLE_RATE: u32 = 16_000;
/// Sample rate of PCM16 audio produced by the service.
pub const OUTPUT_SAMPLE_RATE: u32 = 24_000;

const PCM_MIME_PREFIX: &str = "audio/pcm";

/// A chunk of little-endian 16-bit mono PCM at a declared sample rate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioFrame {
    data: Vec<u8>,
    sample_rate: u32,
}

impl AudioFrame {
    pub fn new(data: Vec<u8>, sample_rate: u32) -> Self {
        Self { data, sample_rate }
    }

    pub fn from_samples(samples: &[i16], sample_rate: u32) -> Self {
        let data = samples.iter().flat_map(|s| s.to_le_bytes()).collect();
        Self { data, sample_rate }
    }

    /// Decodes a base64 payload. Returns `None` when the text is not valid base64.
    pub fn from_base64(data: &str, sample_rate: u32) -> Option<Self> {
        base64::engine::general_purpose::STANDARD
            .decode(data)
            .ok()
            .map(|data| Self { data, sample_rate })
    }

    pub fn to_base64(&self) -> Base64EncodedAudioBytes {
        base64::engine::general_purpose::STANDARD.encode(&self.data)
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn into_data(self) -> Vec<u8> {
        self.data
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn sample_count(&self) -> usize {
        self.data.len() / 2
    }

    pub fn duration_secs(&self) -> f64 {
        self.sample_count() as f64 / self.sample_rate as f64
    }

    pub fn mime_type(&self) -> String {
        format!("{};rate={}", PCM_MIME_PREFIX, self.sample_rate)
    }
}

/// Returns the sample rate declared by an `audio/pcm` MIME tag, or `None` for
/// any other media type. A PCM tag without a rate means the output rate.
pub fn parse_pcm_mime(mime_type: &str) -> Option<u32> {
    let mut params = mime_type.split(';').map(str::trim);
    let essence = params.next()?;
    if !essence.eq_ignore_ascii_case(PCM_MIME_PREFIX) {
        return None;
    }
    let rate = params
        .filter_map(|p| p.split_once('='))
        .find(|(k, _)| k.trim().eq_ignore_ascii_case("rate"))
        .and_then(|(_, v)| v.trim().parse().ok())
        .unwrap_or(OUTPUT_SAMPLE_RATE);
    Some(rate)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mime_type() {
        let frame = AudioFrame::new(vec![0; 4], INPUT_SAMPLE_RATE);
        assert_eq!(frame.mime_type(), "audio/pcm;rate=16000");
        assert_eq!(frame.sample_count(), 2);
    }

    #[test]
    fn test_parse_pcm_mime() {
        assert_eq!(parse_pcm_mime("audio/pcm;rate=24000"), Some(24000));
        assert_eq!(parse_pcm_mime("audio/pcm; rate=16000"), Some(16000));
        assert_eq!(parse_pcm_mime("audio/pcm"), Some(OUTPUT_SAMPLE_RATE));
        assert_eq!(parse_pcm_mime("image/png"), None);
    }

    #[test]
    fn test_base64() {
        let frame = AudioFrame::from_samples(&[1, -1, i16::MAX], OUTPUT_SAMPLE_RATE);
        let encoded = frame.to_base64();
        let decoded = AudioFrame::from_base64(&encoded, OUTPUT_SAMPLE_RATE).unwrap();
        assert_eq!(decoded, frame);
        assert!(AudioFrame::from_base64("not base64!", OUTPUT_SAMPLE_RATE).is_none());
    }
}
