//! Multi-format audio decoding via symphonia
//!
//! Supports WAV, MP3, AAC/M4A, FLAC and OGG input. M4A/AAC conversion is
//! transparent: the container is probed from the file header and extension
//! hint, so callers never deal with formats directly.

use std::fs::File;
use std::path::Path;

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::DecoderOptions;
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use crate::audio::interleaved_to_mono;
use crate::error::{Result, SegueError};

/// Decoded audio: interleaved f32 samples plus channel count and sample rate
pub struct DecodedAudio {
    pub samples: Vec<f32>,
    pub channels: usize,
    pub sample_rate: u32,
}

/// Decode an audio file to interleaved f32 samples
///
/// Returns the interleaved buffer together with its native sample rate.
/// Use [`decode_mono`] when the caller wants the engine's mono view.
pub fn decode<P: AsRef<Path>>(path: P) -> Result<DecodedAudio> {
    let path = path.as_ref();
    let file = File::open(path)
        .map_err(|e| SegueError::DecodeError(format!("{}: {}", path.display(), e)))?;

    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| SegueError::DecodeError(format!("unsupported format: {}", e)))?;

    let mut format = probed.format;

    let track = format
        .default_track()
        .ok_or_else(|| SegueError::DecodeError("no audio track found".to_string()))?;
    let track_id = track.id;

    let sample_rate = track
        .codec_params
        .sample_rate
        .ok_or_else(|| SegueError::DecodeError("unknown sample rate".to_string()))?;
    let channels = track
        .codec_params
        .channels
        .map(|c| c.count())
        .unwrap_or(1);

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| SegueError::DecodeError(format!("codec init failed: {}", e)))?;

    let mut samples: Vec<f32> = Vec::new();
    let mut sample_buf: Option<SampleBuffer<f32>> = None;

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(ref e))
                if e.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break;
            }
            Err(SymphoniaError::ResetRequired) => break,
            Err(e) => return Err(SegueError::DecodeError(e.to_string())),
        };

        if packet.track_id() != track_id {
            continue;
        }

        match decoder.decode(&packet) {
            Ok(decoded) => {
                if sample_buf.is_none() {
                    let spec = *decoded.spec();
                    sample_buf = Some(SampleBuffer::new(decoded.capacity() as u64, spec));
                }
                if let Some(buf) = sample_buf.as_mut() {
                    buf.copy_interleaved_ref(decoded);
                    samples.extend_from_slice(buf.samples());
                }
            }
            // Recoverable decode errors (corrupt frame): skip the packet
            Err(SymphoniaError::DecodeError(_)) => continue,
            Err(e) => return Err(SegueError::DecodeError(e.to_string())),
        }
    }

    if samples.is_empty() {
        return Err(SegueError::DecodeError(format!(
            "{}: no samples decoded",
            path.display()
        )));
    }

    log::debug!(
        "decoded {}: {} frames, {} ch, {} Hz",
        path.display(),
        samples.len() / channels,
        channels,
        sample_rate
    );

    Ok(DecodedAudio {
        samples,
        channels,
        sample_rate,
    })
}

/// Decode an audio file to mono f32 samples
///
/// Multi-channel input is averaged down to a single channel.
pub fn decode_mono<P: AsRef<Path>>(path: P) -> Result<(Vec<f32>, u32)> {
    let decoded = decode(path)?;
    let mono = interleaved_to_mono(&decoded.samples, decoded.channels);
    Ok((mono, decoded.sample_rate))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::write_wav;

    #[test]
    fn test_decode_round_trips_wav() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tone.wav");

        // 100ms of a 440 Hz sine at 44.1kHz
        let sr = 44_100u32;
        let samples: Vec<f32> = (0..4410)
            .map(|i| (i as f32 * 440.0 * 2.0 * std::f32::consts::PI / sr as f32).sin() * 0.5)
            .collect();
        write_wav(&path, &samples, sr).unwrap();

        let (decoded, decoded_sr) = decode_mono(&path).unwrap();
        assert_eq!(decoded_sr, sr);
        assert_eq!(decoded.len(), samples.len());
        // 16-bit quantization allows small error
        for (a, b) in decoded.iter().zip(samples.iter()).step_by(441) {
            assert!((a - b).abs() < 1e-3);
        }
    }

    #[test]
    fn test_decode_missing_file_is_decode_error() {
        let err = decode_mono("/nonexistent/track.mp3").unwrap_err();
        assert!(matches!(err, SegueError::DecodeError(_)));
    }
}
