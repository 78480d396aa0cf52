//! Minimal WAV encode/decode for provider round-trips.
//!
//! Providers exchange 16-bit little-endian PCM WAV; internal audio is
//! mono f32. Only the canonical 44-byte header layout is produced, and
//! decoding accepts PCM16 files with extra chunks before `data`.

use super::{AudioClip, AudioError};

/// Encode mono f32 samples as a 16-bit PCM WAV file.
pub fn encode_wav(samples: &[f32], sample_rate: u32) -> Vec<u8> {
    let data_len = (samples.len() * 2) as u32;
    let mut out = Vec::with_capacity(44 + data_len as usize);

    out.extend_from_slice(b"RIFF");
    out.extend_from_slice(&(36 + data_len).to_le_bytes());
    out.extend_from_slice(b"WAVE");

    out.extend_from_slice(b"fmt ");
    out.extend_from_slice(&16u32.to_le_bytes());
    out.extend_from_slice(&1u16.to_le_bytes()); // PCM
    out.extend_from_slice(&1u16.to_le_bytes()); // mono
    out.extend_from_slice(&sample_rate.to_le_bytes());
    out.extend_from_slice(&(sample_rate * 2).to_le_bytes()); // byte rate
    out.extend_from_slice(&2u16.to_le_bytes()); // block align
    out.extend_from_slice(&16u16.to_le_bytes()); // bits per sample

    out.extend_from_slice(b"data");
    out.extend_from_slice(&data_len.to_le_bytes());
    for sample in samples {
        let value = (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
        out.extend_from_slice(&value.to_le_bytes());
    }
    out
}

/// Decode a 16-bit PCM WAV file into a mono clip.
///
/// Multi-channel files are downmixed by averaging.
pub fn decode_wav(bytes: &[u8]) -> Result<AudioClip, AudioError> {
    if bytes.len() < 12 || &bytes[0..4] != b"RIFF" || &bytes[8..12] != b"WAVE" {
        return Err(AudioError::Backend("not a RIFF/WAVE file".to_string()));
    }

    let mut sample_rate = 0u32;
    let mut channels = 0u16;
    let mut bits = 0u16;
    let mut data: Option<&[u8]> = None;

    let mut pos = 12;
    while pos + 8 <= bytes.len() {
        let id = &bytes[pos..pos + 4];
        let size = u32::from_le_bytes([
            bytes[pos + 4],
            bytes[pos + 5],
            bytes[pos + 6],
            bytes[pos + 7],
        ]) as usize;
        let body_start = pos + 8;
        let body_end = (body_start + size).min(bytes.len());

        match id {
            b"fmt " => {
                let body = &bytes[body_start..body_end];
                if body.len() < 16 {
                    return Err(AudioError::Backend("truncated fmt chunk".to_string()));
                }
                channels = u16::from_le_bytes([body[2], body[3]]);
                sample_rate = u32::from_le_bytes([body[4], body[5], body[6], body[7]]);
                bits = u16::from_le_bytes([body[14], body[15]]);
            }
            b"data" => {
                data = Some(&bytes[body_start..body_end]);
            }
            _ => {}
        }
        // Chunks are word-aligned.
        pos = body_start + size + (size & 1);
    }

    let data = data.ok_or_else(|| AudioError::Backend("missing data chunk".to_string()))?;
    if bits != 16 {
        return Err(AudioError::Backend(format!(
            "unsupported bit depth: {bits}"
        )));
    }
    if channels == 0 || sample_rate == 0 {
        return Err(AudioError::Backend("missing fmt chunk".to_string()));
    }

    let channels = channels as usize;
    let frame_count = data.len() / (2 * channels);
    let mut samples = Vec::with_capacity(frame_count);
    for frame in 0..frame_count {
        let mut acc = 0.0f32;
        for ch in 0..channels {
            let idx = (frame * channels + ch) * 2;
            let value = i16::from_le_bytes([data[idx], data[idx + 1]]);
            acc += value as f32 / i16::MAX as f32;
        }
        samples.push(acc / channels as f32);
    }

    Ok(AudioClip {
        samples,
        sample_rate,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_decode_round_trip() {
        let samples: Vec<f32> = (0..1600).map(|i| ((i as f32) * 0.01).sin() * 0.8).collect();
        let encoded = encode_wav(&samples, 16000);
        let decoded = decode_wav(&encoded).unwrap();

        assert_eq!(decoded.sample_rate, 16000);
        assert_eq!(decoded.samples.len(), samples.len());
        for (a, b) in samples.iter().zip(decoded.samples.iter()) {
            assert!((a - b).abs() < 1e-3);
        }
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(decode_wav(b"definitely not audio").is_err());
    }

    #[test]
    fn test_decode_downmixes_stereo() {
        // Hand-build a 2-channel file with L=0.5, R=-0.5 everywhere.
        let mut mono = encode_wav(&[0.0; 4], 8000);
        // Rewrite channel count and interleave data manually.
        mono[22..24].copy_from_slice(&2u16.to_le_bytes());
        let left = (0.5 * i16::MAX as f32) as i16;
        let right = (-0.5 * i16::MAX as f32) as i16;
        let mut data = Vec::new();
        for _ in 0..2 {
            data.extend_from_slice(&left.to_le_bytes());
            data.extend_from_slice(&right.to_le_bytes());
        }
        mono.truncate(44);
        mono[40..44].copy_from_slice(&(data.len() as u32).to_le_bytes());
        mono.extend_from_slice(&data);

        let decoded = decode_wav(&mono).unwrap();
        assert_eq!(decoded.samples.len(), 2);
        for s in decoded.samples {
            assert!(s.abs() < 1e-3);
        }
    }
}
