//! Solar geometry: ephemeris, sun pitch, nominal / off-nominal roll, and the
//! normal-sun-mode target attitude.
//!
//! The ephemeris is the standard low-precision mean-element model (good to a
//! few hundredths of a degree over the mission span), which is plenty for
//! pitch and roll bookkeeping at the arcminute level.

use crate::{Quat, cross, dot, normalize, radec2eci, wrap180, wrap360};

// Mission epoch 1998:001:00:00:00.000 as Julian Date.
const EPOCH_JD: f64 = 2450814.5;
const J2000_JD: f64 = 2451545.0;

/// Apparent RA/Dec of the sun (degrees) at mission-elapsed seconds.
pub fn sun_radec(secs: f64) -> (f64, f64) {
    let n = EPOCH_JD + secs / 86400.0 - J2000_JD;

    let mean_lon = wrap360(280.460 + 0.9856474 * n);
    let mean_anom = wrap360(357.528 + 0.9856003 * n).to_radians();
    let ecl_lon =
        (mean_lon + 1.915 * mean_anom.sin() + 0.020 * (2.0 * mean_anom).sin()).to_radians();
    let obliquity = (23.439 - 4.0e-7 * n).to_radians();

    let ra = (obliquity.cos() * ecl_lon.sin()).atan2(ecl_lon.cos());
    let dec = (obliquity.sin() * ecl_lon.sin()).asin();
    (wrap360(ra.to_degrees()), dec.to_degrees())
}

/// Sun pitch angle: great-circle separation in degrees between the pointing
/// direction (`ra`, `dec`) and the sun.
pub fn pitch(ra: f64, dec: f64, secs: f64) -> f64 {
    let (sun_ra, sun_dec) = sun_radec(secs);
    let cos_sep = dot(radec2eci(ra, dec), radec2eci(sun_ra, sun_dec));
    cos_sep.clamp(-1.0, 1.0).acos().to_degrees()
}

/// Nominal roll in degrees for a pointing direction: the roll that puts the
/// sun in the body X-Z plane on the +Z side.
pub fn nominal_roll(ra: f64, dec: f64, secs: f64) -> f64 {
    let (sun_ra, sun_dec) = sun_radec(secs);
    let sun_eci = radec2eci(sun_ra, sun_dec);
    let body_x = radec2eci(ra, dec);
    let body_y = normalize(cross(sun_eci, body_x));
    let body_z = normalize(cross(body_x, body_y));
    // Roll from the inertial-Z components of body Y and Z (third Euler angle
    // of the equatorial decomposition).
    wrap360(body_y[2].atan2(body_z[2]).to_degrees())
}

/// Off-nominal roll in degrees, normalized to [-180, 180).
pub fn off_nominal_roll(att: &Quat, secs: f64) -> f64 {
    wrap180(att.roll() - nominal_roll(att.ra(), att.dec(), secs))
}

/// Normal-sun-mode target attitude: rotate the current attitude about the
/// axis normal to the (body-X, sun) plane so body-X sits at 90 deg sun
/// pitch. Degenerate sun-aligned attitudes rotate about body-Y.
pub fn nsm_attitude(att: &Quat, secs: f64) -> Quat {
    let (sun_ra, sun_dec) = sun_radec(secs);
    let sun_eci = radec2eci(sun_ra, sun_dec);
    let body_x = att.body_x();

    let sun_pitch = dot(body_x, sun_eci).clamp(-1.0, 1.0).acos();
    let axis = cross(body_x, sun_eci);
    let axis_norm = dot(axis, axis).sqrt();
    let axis = if axis_norm < 1.0e-8 {
        let t = att.transform();
        [t[0][1], t[1][1], t[2][1]]
    } else {
        normalize(axis)
    };

    let rot_angle = sun_pitch - 90.0_f64.to_radians();
    att.rotate_about(axis, rot_angle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_time::Date;

    fn secs(date: &str) -> f64 {
        Date::parse(date).unwrap().secs()
    }

    fn ang_diff(a: f64, b: f64) -> f64 {
        wrap180(a - b).abs()
    }

    #[test]
    fn sun_near_equinox() {
        // 2020 March equinox (2020:080); sun close to RA 0, Dec 0.
        let (ra, dec) = sun_radec(secs("2020:080:04:00:00.000"));
        assert!(ang_diff(ra, 0.0) < 1.0, "ra={ra}");
        assert!(dec.abs() < 0.5, "dec={dec}");
    }

    #[test]
    fn sun_near_summer_solstice() {
        let (_, dec) = sun_radec(secs("2020:172:22:00:00.000"));
        assert!((dec - 23.43).abs() < 0.1, "dec={dec}");
    }

    #[test]
    fn pitch_zero_at_sun_and_180_anti_sun() {
        let t = secs("2021:100:00:00:00.000");
        let (sun_ra, sun_dec) = sun_radec(t);
        assert!(pitch(sun_ra, sun_dec, t) < 0.01);
        assert!((pitch(wrap360(sun_ra + 180.0), -sun_dec, t) - 180.0).abs() < 0.01);
    }

    #[test]
    fn off_nominal_roll_zero_at_nominal() {
        let t = secs("2020:200:12:00:00.000");
        let (ra, dec) = (123.0, -35.0);
        let att = Quat::from_equatorial(ra, dec, nominal_roll(ra, dec, t));
        assert!(off_nominal_roll(&att, t).abs() < 1.0e-9);
    }

    #[test]
    fn off_nominal_roll_tracks_roll_offset() {
        let t = secs("2020:200:12:00:00.000");
        let (ra, dec) = (123.0, -35.0);
        let att = Quat::from_equatorial(ra, dec, nominal_roll(ra, dec, t) + 5.0);
        assert!((off_nominal_roll(&att, t) - 5.0).abs() < 1.0e-9);
    }

    #[test]
    fn nsm_attitude_pitches_to_90() {
        let t = secs("2022:050:06:30:00.000");
        for att in [
            Quat::from_equatorial(10.0, 40.0, 100.0),
            Quat::from_equatorial(200.0, -70.0, 30.0),
        ] {
            let nsm = nsm_attitude(&att, t);
            assert!((pitch(nsm.ra(), nsm.dec(), t) - 90.0).abs() < 1.0e-6);
        }
    }
}
