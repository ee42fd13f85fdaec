//! WAV writing and MP3 encoding
//!
//! WAV output goes through hound with an atomic write-to-temp-then-rename so
//! readers never observe a partially written file. MP3 encoding shells out to
//! `lame` (320 kbps CBR) with an `ffmpeg` fallback when lame is not on the
//! path.

use std::path::Path;
use std::process::Command;

use crate::error::{Result, SegueError};

/// Write mono f32 samples as a 16-bit PCM WAV file
///
/// The file is written to a temporary sibling and renamed into place, so a
/// concurrent reader sees either the old content or the new, never a torn
/// write.
pub fn write_wav<P: AsRef<Path>>(path: P, samples: &[f32], sample_rate: u32) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let tmp_path = path.with_extension("wav.part");

    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut writer = hound::WavWriter::create(&tmp_path, spec)
        .map_err(|e| SegueError::EncodeError(e.to_string()))?;
    for &sample in samples {
        let clamped = sample.clamp(-1.0, 1.0);
        writer
            .write_sample((clamped * i16::MAX as f32) as i16)
            .map_err(|e| SegueError::EncodeError(e.to_string()))?;
    }
    writer
        .finalize()
        .map_err(|e| SegueError::EncodeError(e.to_string()))?;

    std::fs::rename(&tmp_path, path)?;
    log::debug!("wrote {} ({} samples)", path.display(), samples.len());
    Ok(())
}

/// Write interleaved stereo f32 samples as a 16-bit PCM WAV file
pub fn write_wav_stereo<P: AsRef<Path>>(
    path: P,
    interleaved: &[f32],
    sample_rate: u32,
) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let tmp_path = path.with_extension("wav.part");

    let spec = hound::WavSpec {
        channels: 2,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut writer = hound::WavWriter::create(&tmp_path, spec)
        .map_err(|e| SegueError::EncodeError(e.to_string()))?;
    for &sample in interleaved {
        let clamped = sample.clamp(-1.0, 1.0);
        writer
            .write_sample((clamped * i16::MAX as f32) as i16)
            .map_err(|e| SegueError::EncodeError(e.to_string()))?;
    }
    writer
        .finalize()
        .map_err(|e| SegueError::EncodeError(e.to_string()))?;

    std::fs::rename(&tmp_path, path)?;
    Ok(())
}

/// Encode mono f32 samples to MP3 at 320 kbps CBR
///
/// Goes through a temporary WAV, then an external encoder: `lame` first,
/// `ffmpeg` as fallback. Stereo output is produced by duplicating the mono
/// channel at the WAV stage.
pub fn encode_mp3<P: AsRef<Path>>(path: P, samples: &[f32], sample_rate: u32) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let tmp_dir = tempfile::tempdir()?;
    let wav_path = tmp_dir.path().join("encode_src.wav");
    let stereo = crate::audio::duplicate_to_stereo(samples);
    write_wav_stereo(&wav_path, &stereo, sample_rate)?;

    let tmp_mp3 = path.with_extension("mp3.part");

    let lame_result = Command::new("lame")
        .arg("-b")
        .arg("320")
        .arg("--cbr")
        .arg("--quiet")
        .arg(&wav_path)
        .arg(&tmp_mp3)
        .status();

    let encoded = match lame_result {
        Ok(status) if status.success() => true,
        _ => {
            log::warn!("lame unavailable or failed, falling back to ffmpeg");
            let ffmpeg_result = Command::new("ffmpeg")
                .arg("-i")
                .arg(&wav_path)
                .arg("-b:a")
                .arg("320k")
                .arg("-y")
                .arg("-loglevel")
                .arg("error")
                .arg(&tmp_mp3)
                .status();
            matches!(ffmpeg_result, Ok(status) if status.success())
        }
    };

    if !encoded {
        let _ = std::fs::remove_file(&tmp_mp3);
        return Err(SegueError::EncodeError(
            "no MP3 encoder available (tried lame, ffmpeg)".to_string(),
        ));
    }

    std::fs::rename(&tmp_mp3, path)?;
    log::info!("encoded {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_wav_is_atomic() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.wav");
        let samples = vec![0.0f32; 1024];

        write_wav(&path, &samples, 44_100).unwrap();
        assert!(path.exists());
        // No leftover partial file
        assert!(!path.with_extension("wav.part").exists());
    }

    #[test]
    fn test_write_wav_creates_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/deeper/out.wav");
        write_wav(&path, &[0.1, -0.1], 44_100).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn test_write_wav_clamps_out_of_range() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hot.wav");
        write_wav(&path, &[2.0, -2.0], 44_100).unwrap();

        let (decoded, _) = crate::audio::decode_mono(&path).unwrap();
        assert!(decoded.iter().all(|s| s.abs() <= 1.0));
    }
}
