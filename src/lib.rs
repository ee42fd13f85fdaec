//! # segue
//!
//! An automated DJ engine: track analysis, harmonic transition planning, and
//! stem-level mix rendering.
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use segue::prelude::*;
//! use segue::stems::BandSplitSeparator;
//!
//! fn main() -> anyhow::Result<()> {
//!     let (audio_a, sr_a) = segue::audio::decode_mono("tracks/a.mp3")?;
//!     let (audio_b, sr_b) = segue::audio::decode_mono("tracks/b.mp3")?;
//!
//!     let ports = segue::analysis::extract::AnalysisPorts::default();
//!     let analysis_a = segue::analysis::extract::analyze_track(&audio_a, sr_a, &ports)?;
//!     let analysis_b = segue::analysis::extract::analyze_track(&audio_b, sr_b, &ports)?;
//!
//!     let plan = Planner::new().plan(&analysis_a, &analysis_b, &SetContext::new(3, 10));
//!     let renderer = TransitionRenderer::new(Arc::new(BandSplitSeparator));
//!     let rendered = renderer.render(
//!         &audio_a, sr_a, &audio_b, sr_b, &analysis_a, &analysis_b, &plan,
//!     )?;
//!
//!     segue::audio::encode_mp3("out/transition.mp3", &rendered.samples, rendered.sample_rate)?;
//!     Ok(())
//! }
//! ```

pub mod analysis;
pub mod audio;
pub mod config;
pub mod effects;
pub mod error;
pub mod mix;
pub mod stems;
pub mod stretch;
pub mod theory;
pub mod transition;
pub mod worker;

/// Prelude module for convenient imports
pub mod prelude {
    // Analysis
    pub use crate::analysis::{BeatGrid, TrackAnalysis, VocalIntensity};

    // Theory
    pub use crate::theory::{CamelotKey, Compatibility, TempoFactor};

    // Planning and rendering
    pub use crate::transition::{
        PlanSource, Planner, RenderedTransition, SetContext, TransitionMode, TransitionPlan,
        TransitionRenderer,
    };

    // Mix assembly
    pub use crate::mix::{MixTimeline, MixTrack, Segment, SegmentKind, SetPhase};

    // Ports
    pub use crate::stems::{StemSeparator, StemSet};
    pub use crate::stretch::TimeStretcher;

    // Errors
    pub use crate::error::{Result, SegueError};
}
