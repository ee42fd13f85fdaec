//! Error types for the segue library
//!
//! This module provides a unified error handling system for all operations
//! that can fail in the segue library. The taxonomy distinguishes between
//! boundary failures (decode/encode), locally-recoverable conditions that
//! degrade the transition mode (separation, vocal clash, bass swap), and
//! cancellation.

use std::fmt;

/// Main error type for the segue library
#[derive(Debug, Clone)]
pub enum SegueError {
    /// Audio file could not be decoded
    DecodeError(String),

    /// Audio file could not be encoded or written
    EncodeError(String),

    /// Too few beats (or no grid at all) to derive phrases and cue points
    AnalysisUnderdetermined(String),

    /// Requested time-stretch ratio exceeds the ±8% safety bound
    StretchOutOfRange { requested: f32, clamped: f32 },

    /// Stem separator missing or failed; caller should fall back to crossfade
    SeparationUnavailable(String),

    /// No transition sub-window avoids a full-vocal clash
    VocalClashUnresolvable(String),

    /// Both bass stems audible for more than the allowed two beats
    BassSwapViolation { overlap_beats: f32 },

    /// Transition plan failed schema validation
    PlanInvalid(String),

    /// Job token was signalled; partial outputs have been removed
    Cancelled,

    /// IO error
    IoError(String),

    /// Generic error for cases not covered above
    Other(String),
}

impl fmt::Display for SegueError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SegueError::DecodeError(msg) => {
                write!(f, "Decode error: {}", msg)
            }
            SegueError::EncodeError(msg) => {
                write!(f, "Encode error: {}", msg)
            }
            SegueError::AnalysisUnderdetermined(msg) => {
                write!(f, "Analysis underdetermined: {}", msg)
            }
            SegueError::StretchOutOfRange { requested, clamped } => {
                write!(
                    f,
                    "Stretch ratio {:.3} outside safe range, clamped to {:.3}",
                    requested, clamped
                )
            }
            SegueError::SeparationUnavailable(msg) => {
                write!(f, "Stem separation unavailable: {}", msg)
            }
            SegueError::VocalClashUnresolvable(msg) => {
                write!(f, "Vocal clash unresolvable: {}", msg)
            }
            SegueError::BassSwapViolation { overlap_beats } => {
                write!(
                    f,
                    "Bass overlap of {:.1} beats exceeds the 2-beat maximum",
                    overlap_beats
                )
            }
            SegueError::PlanInvalid(msg) => {
                write!(f, "Invalid transition plan: {}", msg)
            }
            SegueError::Cancelled => {
                write!(f, "Job cancelled")
            }
            SegueError::IoError(msg) => {
                write!(f, "IO error: {}", msg)
            }
            SegueError::Other(msg) => {
                write!(f, "{}", msg)
            }
        }
    }
}

impl std::error::Error for SegueError {}

impl SegueError {
    /// Short machine-readable kind tag, used in job result payloads
    pub fn kind(&self) -> &'static str {
        match self {
            SegueError::DecodeError(_) => "DecodeError",
            SegueError::EncodeError(_) => "EncodeError",
            SegueError::AnalysisUnderdetermined(_) => "AnalysisUnderdetermined",
            SegueError::StretchOutOfRange { .. } => "StretchOutOfRange",
            SegueError::SeparationUnavailable(_) => "SeparationUnavailable",
            SegueError::VocalClashUnresolvable(_) => "VocalClashUnresolvable",
            SegueError::BassSwapViolation { .. } => "BassSwapViolation",
            SegueError::PlanInvalid(_) => "PlanInvalid",
            SegueError::Cancelled => "Cancelled",
            SegueError::IoError(_) => "IoError",
            SegueError::Other(_) => "Other",
        }
    }

    /// Whether the renderer may recover by degrading the transition mode
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            SegueError::SeparationUnavailable(_)
                | SegueError::VocalClashUnresolvable(_)
                | SegueError::BassSwapViolation { .. }
                | SegueError::PlanInvalid(_)
                | SegueError::StretchOutOfRange { .. }
        )
    }
}

// Conversion from IO errors
impl From<std::io::Error> for SegueError {
    fn from(err: std::io::Error) -> Self {
        SegueError::IoError(err.to_string())
    }
}

// Conversion from hound errors (WAV read/write)
impl From<hound::Error> for SegueError {
    fn from(err: hound::Error) -> Self {
        match err {
            hound::Error::IoError(e) => SegueError::IoError(e.to_string()),
            other => SegueError::DecodeError(other.to_string()),
        }
    }
}

// Conversion from serde_json errors (plans, job payloads)
impl From<serde_json::Error> for SegueError {
    fn from(err: serde_json::Error) -> Self {
        SegueError::PlanInvalid(err.to_string())
    }
}

// Conversion from string errors (for convenience)
impl From<String> for SegueError {
    fn from(err: String) -> Self {
        SegueError::Other(err)
    }
}

impl From<&str> for SegueError {
    fn from(err: &str) -> Self {
        SegueError::Other(err.to_string())
    }
}

/// Result type alias for segue operations
pub type Result<T> = std::result::Result<T, SegueError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = SegueError::BassSwapViolation { overlap_beats: 3.5 };
        assert_eq!(
            err.to_string(),
            "Bass overlap of 3.5 beats exceeds the 2-beat maximum"
        );
    }

    #[test]
    fn test_kind_tags() {
        assert_eq!(SegueError::Cancelled.kind(), "Cancelled");
        assert_eq!(
            SegueError::SeparationUnavailable("no model".into()).kind(),
            "SeparationUnavailable"
        );
    }

    #[test]
    fn test_recoverable_classification() {
        assert!(SegueError::SeparationUnavailable("x".into()).is_recoverable());
        assert!(SegueError::BassSwapViolation { overlap_beats: 2.5 }.is_recoverable());
        assert!(!SegueError::DecodeError("bad header".into()).is_recoverable());
        assert!(!SegueError::Cancelled.is_recoverable());
    }

    #[test]
    fn test_from_string() {
        let err: SegueError = "Something went wrong".into();
        assert_eq!(err.to_string(), "Something went wrong");
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let segue_err: SegueError = io_err.into();
        assert!(matches!(segue_err, SegueError::IoError(_)));
    }
}
