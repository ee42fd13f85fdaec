//! Offline audio effects
//!
//! Every effect here is a pure `&[f32] -> Vec<f32>` transform at a known
//! sample rate. The renderer composes them: progressive EQ and sweeps from
//! [`filters`], tempo-synced echoes and tails from [`delay`], the hard-cut
//! reverb tail from [`reverb`], and the output safety stage from
//! [`dynamics`].

pub mod advanced;
pub mod delay;
pub mod dynamics;
pub mod filters;
pub mod reverb;

pub use advanced::{apply_beat_repeat, apply_flanger, apply_gater, apply_phaser};
pub use delay::{apply_delay, apply_delay_bpm_sync, create_delay_tail, DelayParams};
pub use dynamics::{apply_limiter, normalize_peak};
pub use filters::{apply_bandpass, apply_hpf, apply_lpf, create_filter_sweep, FilterKind, SweepCurve};
pub use reverb::{apply_reverb, create_reverb_tail, ReverbParams};
