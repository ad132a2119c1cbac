//! Commanded-state reconstruction.
//!
//! Determines the sequence of discrete states the observatory was commanded
//! into (pointing mode, attitude, instrument configuration, gratings, dither,
//! ACIS setup) over any interval, purely from the ground-commanding history.
//!
//! The pipeline has two phases. A registry of transition rules first turns
//! commands into dated partial state updates ([`get_transitions_list`]); a
//! linear fold then walks those updates forward into a gap-free interval
//! table ([`get_states_for_cmds`]). Some updates are deferred: a maneuver
//! command expands mid-fold into per-leg attitude transitions inserted later
//! in the list, which is why the fold owns a growable transition list rather
//! than an iterator.
//!
//! [`get_state0`] bootstraps initial state values by running the pipeline
//! over expanding lookback windows, and [`reduce_states`] collapses an
//! interval table to transitions in a chosen subset of keys.

pub mod fold;
pub mod power;
pub mod registry;
pub mod rules;
pub mod state0;
pub mod transitions;

pub use core_cmds::ParamValue as Value;
pub use fold::{State, StateTable, get_states_for_cmds, reduce_states};
pub use power::decode_power;
pub use registry::{TransitionRule, registry};
pub use rules::PCAD_STATE_KEYS;
pub use state0::{DEFAULT_LOOKBACKS, get_state0, get_state0_with};
pub use transitions::{
    DeferredKind, Transition, TransitionMap, Update, add_transition, get_transitions_list,
};

/// Final `datestop` of every interval table.
pub const DATE_FAR_FUTURE: &str = "2099:365:00:00:00.000";

/// Errors from the state pipeline.
#[derive(Debug, thiserror::Error)]
pub enum StatesError {
    /// No transitions found within the commands for the requested keys.
    #[error("no transitions for state keys {keys:?} in cmds")]
    NoTransitions { keys: Vec<String> },

    /// A deferred update tried to insert a transition at or before the
    /// current fold position.
    #[error("cannot insert transition prior to current command")]
    InsertionOrdering,

    /// The initial-state resolver exhausted all lookbacks.
    #[error(
        "did not find transitions for state key(s) {keys:?} within {max_lookback} days \
         of {date}; maybe adjust the lookbacks"
    )]
    MissingState {
        keys: Vec<String>,
        max_lookback: f64,
        date: String,
    },

    /// Table access with an unsupported selector.
    #[error("illegal table index {name:?}")]
    IllegalIndex { name: String },

    /// An ACIS power command with a malformed hex payload.
    #[error("power command {tlmsid:?} in unexpected format")]
    PowerCommand { tlmsid: String },

    #[error(transparent)]
    Cmds(#[from] core_cmds::CmdsError),

    #[error(transparent)]
    Time(#[from] core_time::TimeError),
}
