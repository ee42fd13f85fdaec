//! Mix assembly and set-level energy control
//!
//! [`assembler`] owns the segment timeline (solos and transitions and the
//! cut-point contract between them); [`energy`] maps set positions to phases
//! and validates proposed orderings.

pub mod assembler;
pub mod energy;
pub mod ordering;

pub use assembler::{concat_segments, MixTimeline, MixTrack, Segment, SegmentKind};
pub use ordering::{optimize_order, order_quality, pairwise_score};
pub use energy::{
    phase_config, suggest_order, validate_sequence, EnergyFlow, IssueKind, PhaseConfig,
    SequenceIssue, SetPhase,
};
