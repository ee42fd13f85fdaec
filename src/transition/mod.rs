//! The transition engine
//!
//! Everything between "these two tracks follow each other" and "here is the
//! rendered audio": the plan model ([`plan`]), the planner that fills it in
//! ([`planner`]), the bass-swap primitive ([`bass_swap`]), the vocal-clash
//! state machine ([`vocal_clash`]), the stem automation curves ([`curves`]),
//! and the renderer that ties them together ([`renderer`]).

pub mod acapella;
pub mod bass_swap;
pub mod curves;
pub mod double_drop;
pub mod loop_mixing;
pub mod plan;
pub mod planner;
pub mod renderer;
pub mod vocal_clash;

pub use bass_swap::BassSwapStyle;
pub use plan::{
    FilterSweepSpec, PhaseSpec, StemLevels, TailEffect, TailKind, TransitionMode, TransitionPlan,
    WarningTag,
};
pub use planner::{PlanSource, Planner, SetContext};
pub use renderer::{RenderedTransition, TransitionRenderer};
pub use vocal_clash::ClashResolution;
