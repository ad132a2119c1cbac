//! Built-in event models derived from commanded states.

use core_cmds::Archive;
use core_states::{StatesError, Value, get_states_for_cmds};

use crate::{EventModel, EventRecord, EventsError};

/// Run the pipeline for one key set over a window, treating "no
/// transitions" as an empty result rather than an error.
fn states_for_window(
    archive: &Archive,
    start: &str,
    stop: &str,
    keys: &[&str],
) -> Result<Option<core_states::StateTable>, EventsError> {
    let cmds = archive.filter(Some(start), Some(stop), &[])?;
    match get_states_for_cmds(&cmds, Some(keys), None) {
        Ok(states) => Ok(Some(states)),
        Err(StatesError::NoTransitions { .. }) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn value_str(v: Option<&Value>) -> Option<&str> {
    v.and_then(|v| v.as_str())
}

/// Maneuver intervals: contiguous runs of `pcad_mode` in NMAN or NSUN.
/// Runs still open at the end of the window are left for a later update.
pub struct ManvrEvents;

impl EventModel for ManvrEvents {
    fn name(&self) -> &'static str {
        "manvr"
    }

    fn lookback(&self) -> f64 {
        7.0
    }

    fn get_events(
        &self,
        archive: &Archive,
        start: &str,
        stop: &str,
    ) -> Result<Vec<EventRecord>, EventsError> {
        let Some(states) = states_for_window(archive, start, stop, &["pcad_mode"])? else {
            return Ok(Vec::new());
        };

        let modes = states.col("pcad_mode")?;
        let mut events = Vec::new();
        let mut run_start: Option<usize> = None;

        for i in 0..states.len() {
            let maneuvering = matches!(
                value_str(modes[i].as_ref()),
                Some("NMAN") | Some("NSUN")
            );
            match (maneuvering, run_start) {
                (true, None) => run_start = Some(i),
                (false, Some(first)) => {
                    let last = i - 1;
                    let mut event =
                        EventRecord::new(&states.datestart[first], &states.datestop[last]);
                    if let Some(mode) = value_str(modes[first].as_ref()) {
                        event = event.with("mode", mode);
                    }
                    for key in ["ra", "dec"] {
                        if let Some(v) = states.value(last, key).ok().flatten() {
                            event = event.with(key, &v.to_string());
                        }
                    }
                    events.push(event);
                    run_start = None;
                }
                _ => {}
            }
        }
        // An open run has no commanded end yet; skip it.

        Ok(events)
    }
}

/// Grating moves: every hetg/letg value change.
pub struct GratingMoveEvents;

impl EventModel for GratingMoveEvents {
    fn name(&self) -> &'static str {
        "grating_move"
    }

    fn lookback(&self) -> f64 {
        21.0
    }

    fn get_events(
        &self,
        archive: &Archive,
        start: &str,
        stop: &str,
    ) -> Result<Vec<EventRecord>, EventsError> {
        let Some(states) = states_for_window(archive, start, stop, &["hetg", "letg"])? else {
            return Ok(Vec::new());
        };

        let mut events = Vec::new();
        for key in ["hetg", "letg"] {
            let col = states.col(key)?;
            for i in 0..states.len() {
                let changed = if i == 0 {
                    col[i].is_some()
                } else {
                    col[i] != col[i - 1]
                };
                if changed && let Some(val) = value_str(col[i].as_ref()) {
                    events.push(
                        EventRecord::new(&states.datestart[i], &states.datestart[i])
                            .with("grating", key)
                            .with("position", val),
                    );
                }
            }
        }
        events.sort_by(|a, b| a.start.cmp(&b.start));
        Ok(events)
    }
}

/// Obsid change points.
pub struct ObsidEvents;

impl EventModel for ObsidEvents {
    fn name(&self) -> &'static str {
        "obsid"
    }

    fn lookback(&self) -> f64 {
        7.0
    }

    fn get_events(
        &self,
        archive: &Archive,
        start: &str,
        stop: &str,
    ) -> Result<Vec<EventRecord>, EventsError> {
        let Some(states) = states_for_window(archive, start, stop, &["obsid"])? else {
            return Ok(Vec::new());
        };

        let col = states.col("obsid")?;
        let mut events = Vec::new();
        for i in 0..states.len() {
            let changed = if i == 0 {
                col[i].is_some()
            } else {
                col[i] != col[i - 1]
            };
            if changed && let Some(val) = col[i].as_ref() {
                events.push(
                    EventRecord::new(&states.datestart[i], &states.datestart[i])
                        .with("obsid", &val.to_string()),
                );
            }
        }
        Ok(events)
    }
}

/// All built-in models in processing order.
pub fn builtin_models() -> Vec<Box<dyn EventModel>> {
    vec![
        Box::new(ManvrEvents),
        Box::new(GratingMoveEvents),
        Box::new(ObsidEvents),
    ]
}
