//! Eigenaxis maneuver-path sampling.
//!
//! A maneuver is modeled as a single-axis slew between two attitudes with a
//! trapezoidal rate profile (accelerate at `ACCEL` to at most `MAX_RATE`,
//! coast, decelerate). The path is sampled every `SAMPLE_DT` seconds plus the
//! exact final attitude, which is what the state pipeline folds into per-leg
//! attitude transitions.

use crate::sun::{off_nominal_roll, pitch};
use crate::Quat;

const SAMPLE_DT: f64 = 300.0;
// Slew profile constants (rad/s, rad/s^2).
const MAX_RATE: f64 = 8.5e-4;
const ACCEL: f64 = 2.2e-6;

/// One sampled point along a maneuver.
#[derive(Debug, Clone)]
pub struct AttSample {
    /// Mission-elapsed seconds of the sample.
    pub time: f64,
    pub att: Quat,
    /// Sun pitch of the sampled attitude, degrees.
    pub pitch: f64,
    /// Off-nominal roll of the sampled attitude, degrees.
    pub off_nom_roll: f64,
}

/// Slew duration in seconds for an eigenaxis rotation of `angle` radians.
fn duration(angle: f64) -> f64 {
    // Angle consumed by a full accel + decel ramp pair.
    let ramp_angle = MAX_RATE * MAX_RATE / ACCEL;
    if angle >= ramp_angle {
        angle / MAX_RATE + MAX_RATE / ACCEL
    } else {
        2.0 * (angle / ACCEL).sqrt()
    }
}

/// Angle traveled at elapsed time `t` of a slew of total `angle`/`dur`.
fn angle_at(t: f64, angle: f64, dur: f64) -> f64 {
    let t_ramp = (MAX_RATE / ACCEL).min(dur / 2.0);
    if t <= t_ramp {
        0.5 * ACCEL * t * t
    } else if t >= dur - t_ramp {
        let td = dur - t;
        angle - 0.5 * ACCEL * td * td
    } else {
        let rate = ACCEL * t_ramp;
        0.5 * ACCEL * t_ramp * t_ramp + rate * (t - t_ramp)
    }
}

/// Sample the maneuver from `curr` to `targ` starting at mission-elapsed
/// seconds `tstart`. Samples are every 300 s plus the exact final attitude;
/// a null maneuver yields a single sample at `tstart`.
pub fn manvr_attitudes(curr: &Quat, targ: &Quat, tstart: f64) -> Vec<AttSample> {
    // Delta rotation in the body frame of `curr`.
    let mut dq = curr.inverse().mul(targ);
    if dq.q4 < 0.0 {
        dq = Quat {
            q1: -dq.q1,
            q2: -dq.q2,
            q3: -dq.q3,
            q4: -dq.q4,
        };
    }
    let sin_half = (dq.q1 * dq.q1 + dq.q2 * dq.q2 + dq.q3 * dq.q3).sqrt();
    let angle = 2.0 * sin_half.atan2(dq.q4);

    let mk_sample = |time: f64, att: Quat| {
        let p = pitch(att.ra(), att.dec(), time);
        let onr = off_nominal_roll(&att, time);
        AttSample {
            time,
            att,
            pitch: p,
            off_nom_roll: onr,
        }
    };

    if angle < 1.0e-10 {
        return vec![mk_sample(tstart, *targ)];
    }

    let axis = [dq.q1 / sin_half, dq.q2 / sin_half, dq.q3 / sin_half];
    let dur = duration(angle);

    let mut samples = Vec::new();
    let mut t = 0.0;
    while t < dur {
        let phi = angle_at(t, angle, dur);
        let att = curr.mul(&Quat::from_axis_angle(axis, phi));
        samples.push(mk_sample(tstart + t, att));
        t += SAMPLE_DT;
    }
    samples.push(mk_sample(tstart + dur, *targ));
    samples
}
