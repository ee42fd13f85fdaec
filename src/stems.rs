//! Stem separation port
//!
//! Separation splits audio into four stems (drums, bass, other, vocals) at
//! 44.1 kHz mono. The model itself is an external collaborator behind the
//! [`StemSeparator`] trait:
//!
//! - [`CommandSeparator`] shells out to a Demucs-family CLI on temp files —
//!   the production backend.
//! - [`BandSplitSeparator`] is a deterministic filter-bank approximation
//!   used by tests and as an explicit opt-in fallback.
//!
//! The process-wide separator loads lazily with single-flight semantics and
//! is read-only after load; failures surface as `SeparationUnavailable`,
//! which the renderer converts into a crossfade downgrade.

use std::path::Path;
use std::process::Command;
use std::sync::Arc;

use once_cell::sync::OnceCell;

use crate::audio;
use crate::config::SETTINGS;
use crate::error::{Result, SegueError};

/// Stem names in canonical order
pub const STEM_NAMES: [&str; 4] = ["drums", "bass", "other", "vocals"];

/// The four separated stems of a segment, equal length, 44.1 kHz mono
#[derive(Debug, Clone)]
pub struct StemSet {
    pub drums: Vec<f32>,
    pub bass: Vec<f32>,
    pub other: Vec<f32>,
    pub vocals: Vec<f32>,
}

impl StemSet {
    /// Stems all zeroed, at a given length
    pub fn silent(len: usize) -> Self {
        Self {
            drums: vec![0.0; len],
            bass: vec![0.0; len],
            other: vec![0.0; len],
            vocals: vec![0.0; len],
        }
    }

    pub fn len(&self) -> usize {
        self.drums.len()
    }

    pub fn is_empty(&self) -> bool {
        self.drums.is_empty()
    }

    /// Pad or trim every stem to exactly `target_len`
    pub fn fit_length(&mut self, target_len: usize) {
        for stem in [
            &mut self.drums,
            &mut self.bass,
            &mut self.other,
            &mut self.vocals,
        ] {
            if stem.len() > target_len {
                stem.truncate(target_len);
            } else {
                stem.resize(target_len, 0.0);
            }
        }
    }

    /// Sum of all four stems
    pub fn mixdown(&self) -> Vec<f32> {
        let mut out = self.drums.clone();
        for (i, o) in out.iter_mut().enumerate() {
            *o += self.bass[i] + self.other[i] + self.vocals[i];
        }
        out
    }

    pub fn stem(&self, name: &str) -> Option<&[f32]> {
        match name {
            "drums" => Some(&self.drums),
            "bass" => Some(&self.bass),
            "other" => Some(&self.other),
            "vocals" => Some(&self.vocals),
            _ => None,
        }
    }
}

/// Stem separation backend
pub trait StemSeparator: Send + Sync {
    /// Separate mono audio into the four stems
    ///
    /// The returned stems match the input length.
    fn separate(&self, samples: &[f32], sample_rate: u32) -> Result<StemSet>;
}

/// Backend that invokes an external Demucs-family CLI
///
/// Writes the segment to a temp WAV, runs `demucs --two-stems=... -n <model>`
/// style separation into a temp directory, and reads the four stem files
/// back. Temp files are removed on success and failure alike.
pub struct CommandSeparator {
    program: String,
    model: String,
}

impl CommandSeparator {
    pub fn new(model: &str) -> Self {
        Self {
            program: "demucs".to_string(),
            model: model.to_string(),
        }
    }

    pub fn from_settings() -> Self {
        Self::new(&SETTINGS.separator_model)
    }

    fn read_stem(&self, dir: &Path, input_stem: &str, name: &str) -> Result<Vec<f32>> {
        let path = dir
            .join(&self.model)
            .join(input_stem)
            .join(format!("{}.wav", name));
        let (samples, _) = audio::decode_mono(&path)
            .map_err(|e| SegueError::SeparationUnavailable(format!("missing {}: {}", name, e)))?;
        Ok(samples)
    }
}

impl StemSeparator for CommandSeparator {
    fn separate(&self, samples: &[f32], sample_rate: u32) -> Result<StemSet> {
        let dir = tempfile::tempdir()
            .map_err(|e| SegueError::SeparationUnavailable(e.to_string()))?;
        let input_path = dir.path().join("segment.wav");
        audio::write_wav(&input_path, samples, sample_rate)?;

        let status = Command::new(&self.program)
            .arg("-n")
            .arg(&self.model)
            .arg("-o")
            .arg(dir.path())
            .arg(&input_path)
            .status()
            .map_err(|e| {
                SegueError::SeparationUnavailable(format!("{} not runnable: {}", self.program, e))
            })?;

        if !status.success() {
            return Err(SegueError::SeparationUnavailable(format!(
                "{} exited with {}",
                self.program, status
            )));
        }

        let mut set = StemSet {
            drums: self.read_stem(dir.path(), "segment", "drums")?,
            bass: self.read_stem(dir.path(), "segment", "bass")?,
            other: self.read_stem(dir.path(), "segment", "other")?,
            vocals: self.read_stem(dir.path(), "segment", "vocals")?,
        };
        set.fit_length(samples.len());
        Ok(set)
    }
}

/// Deterministic filter-bank separator
///
/// Splits by frequency band: bass below 250 Hz, "drums" in the low-mid
/// 250 Hz - 1 kHz band, "vocals" in the presence band 1 - 4 kHz, everything
/// above as other. Nowhere near a real model, but deterministic, which is
/// what the tests need to assert bass-overlap and clash properties.
pub struct BandSplitSeparator;

impl StemSeparator for BandSplitSeparator {
    fn separate(&self, samples: &[f32], sample_rate: u32) -> Result<StemSet> {
        use crate::effects::filters::{apply_bandpass, apply_hpf, apply_lpf};

        if samples.is_empty() {
            return Ok(StemSet::silent(0));
        }

        let bass = apply_lpf(samples, 250.0, sample_rate);
        let drums = apply_bandpass(samples, 250.0, 1000.0, sample_rate);
        let vocals = apply_bandpass(samples, 1000.0, 4000.0, sample_rate);
        let other = apply_hpf(samples, 4000.0, sample_rate);

        let mut set = StemSet {
            drums,
            bass,
            other,
            vocals,
        };
        set.fit_length(samples.len());
        Ok(set)
    }
}

static GLOBAL_SEPARATOR: OnceCell<Arc<dyn StemSeparator>> = OnceCell::new();

/// Install a separator backend as the process-wide instance
///
/// Returns an error if one is already installed; the model is initialized
/// once and never swapped.
pub fn install_separator(separator: Arc<dyn StemSeparator>) -> Result<()> {
    GLOBAL_SEPARATOR
        .set(separator)
        .map_err(|_| SegueError::Other("separator already installed".to_string()))
}

/// The process-wide separator, lazily defaulting to the CLI backend
///
/// `OnceCell` gives the single-flight guarantee: a second caller during
/// initialization blocks until the first finishes, and the instance is
/// read-only afterwards.
pub fn global_separator() -> Arc<dyn StemSeparator> {
    GLOBAL_SEPARATOR
        .get_or_init(|| {
            log::info!("initializing separator backend (model {})", SETTINGS.separator_model);
            Arc::new(CommandSeparator::from_settings())
        })
        .clone()
}
