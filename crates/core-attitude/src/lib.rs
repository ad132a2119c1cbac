//! Attitude math: quaternions, solar geometry, maneuver-path sampling.
//!
//! Quaternions use the scalar-last `(q1, q2, q3, q4)` component order used
//! throughout the command stream (`MP_TARGQUAT` carries the components in
//! that order). The equatorial decomposition follows the usual observatory
//! convention: RA/Dec locate the body-X (boresight) axis on the sky, roll is
//! the rotation about it. RA and roll normalize to [0, 360), Dec to
//! [-90, 90].

pub mod manvr;
pub mod sun;

pub use manvr::{AttSample, manvr_attitudes};
pub use sun::{nsm_attitude, off_nominal_roll, pitch, sun_radec};

/// Unit attitude quaternion, scalar-last.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quat {
    pub q1: f64,
    pub q2: f64,
    pub q3: f64,
    pub q4: f64,
}

impl Quat {
    /// Construct from components, normalizing to unit length.
    pub fn new(q1: f64, q2: f64, q3: f64, q4: f64) -> Self {
        let norm = (q1 * q1 + q2 * q2 + q3 * q3 + q4 * q4).sqrt();
        Self {
            q1: q1 / norm,
            q2: q2 / norm,
            q3: q3 / norm,
            q4: q4 / norm,
        }
    }

    pub fn identity() -> Self {
        Self {
            q1: 0.0,
            q2: 0.0,
            q3: 0.0,
            q4: 1.0,
        }
    }

    /// Construct from RA/Dec/Roll in degrees (rotation sequence
    /// Rz(ra) · Ry(-dec) · Rx(roll)).
    pub fn from_equatorial(ra: f64, dec: f64, roll: f64) -> Self {
        let z = Self::from_axis_angle([0.0, 0.0, 1.0], ra.to_radians());
        let y = Self::from_axis_angle([0.0, 1.0, 0.0], -dec.to_radians());
        let x = Self::from_axis_angle([1.0, 0.0, 0.0], roll.to_radians());
        z.mul(&y).mul(&x)
    }

    /// Rotation of `angle` radians about a unit `axis`.
    pub fn from_axis_angle(axis: [f64; 3], angle: f64) -> Self {
        let half = angle / 2.0;
        let s = half.sin();
        Self::new(axis[0] * s, axis[1] * s, axis[2] * s, half.cos())
    }

    /// Quaternion composition: `(a.mul(b)).transform() == a.transform() · b.transform()`.
    pub fn mul(&self, other: &Self) -> Self {
        let (a1, a2, a3, a4) = (self.q1, self.q2, self.q3, self.q4);
        let (b1, b2, b3, b4) = (other.q1, other.q2, other.q3, other.q4);
        Self::new(
            a4 * b1 - a3 * b2 + a2 * b3 + a1 * b4,
            a3 * b1 + a4 * b2 - a1 * b3 + a2 * b4,
            -a2 * b1 + a1 * b2 + a4 * b3 + a3 * b4,
            -a1 * b1 - a2 * b2 - a3 * b3 + a4 * b4,
        )
    }

    /// Inverse rotation (conjugate, since quaternions here are unit).
    pub fn inverse(&self) -> Self {
        Self {
            q1: -self.q1,
            q2: -self.q2,
            q3: -self.q3,
            q4: self.q4,
        }
    }

    /// Direction-cosine matrix; columns are the body axes in the inertial
    /// frame.
    pub fn transform(&self) -> [[f64; 3]; 3] {
        let (x, y, z, w) = (self.q1, self.q2, self.q3, self.q4);
        let (xx2, yy2, zz2) = (2.0 * x * x, 2.0 * y * y, 2.0 * z * z);
        let (xy2, wz2, zx2) = (2.0 * x * y, 2.0 * w * z, 2.0 * z * x);
        let (wy2, yz2, wx2) = (2.0 * w * y, 2.0 * y * z, 2.0 * w * x);
        [
            [1.0 - yy2 - zz2, xy2 - wz2, zx2 + wy2],
            [xy2 + wz2, 1.0 - xx2 - zz2, yz2 - wx2],
            [zx2 - wy2, yz2 + wx2, 1.0 - xx2 - yy2],
        ]
    }

    /// Body-X axis (boresight) in the inertial frame.
    pub fn body_x(&self) -> [f64; 3] {
        let t = self.transform();
        [t[0][0], t[1][0], t[2][0]]
    }

    /// Right ascension of body-X, degrees in [0, 360).
    pub fn ra(&self) -> f64 {
        let xa = self.q1 * self.q1 - self.q2 * self.q2 - self.q3 * self.q3 + self.q4 * self.q4;
        let xb = 2.0 * (self.q1 * self.q2 + self.q3 * self.q4);
        wrap360(xb.atan2(xa).to_degrees())
    }

    /// Declination of body-X, degrees.
    pub fn dec(&self) -> f64 {
        let xn = 2.0 * (self.q1 * self.q3 - self.q2 * self.q4);
        xn.atan2((1.0 - xn * xn).max(0.0).sqrt()).to_degrees()
    }

    /// Roll about body-X, degrees in [0, 360).
    pub fn roll(&self) -> f64 {
        let yn = 2.0 * (self.q2 * self.q3 + self.q1 * self.q4);
        let zn =
            self.q4 * self.q4 + self.q3 * self.q3 - self.q1 * self.q1 - self.q2 * self.q2;
        wrap360(yn.atan2(zn).to_degrees())
    }

    /// Rotate this attitude by `angle` radians about an inertial-frame `axis`.
    pub fn rotate_about(&self, axis: [f64; 3], angle: f64) -> Self {
        Self::from_axis_angle(axis, angle).mul(self)
    }
}

pub(crate) fn wrap360(deg: f64) -> f64 {
    deg.rem_euclid(360.0)
}

/// Normalize an angle in degrees to [-180, 180).
pub(crate) fn wrap180(deg: f64) -> f64 {
    wrap360(deg + 180.0) - 180.0
}

pub(crate) fn dot(a: [f64; 3], b: [f64; 3]) -> f64 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

pub(crate) fn cross(a: [f64; 3], b: [f64; 3]) -> [f64; 3] {
    [
        a[1] * b[2] - a[2] * b[1],
        a[2] * b[0] - a[0] * b[2],
        a[0] * b[1] - a[1] * b[0],
    ]
}

pub(crate) fn normalize(v: [f64; 3]) -> [f64; 3] {
    let n = dot(v, v).sqrt();
    [v[0] / n, v[1] / n, v[2] / n]
}

/// Unit vector from RA/Dec in degrees.
pub(crate) fn radec2eci(ra: f64, dec: f64) -> [f64; 3] {
    let (ra, dec) = (ra.to_radians(), dec.to_radians());
    [
        dec.cos() * ra.cos(),
        dec.cos() * ra.sin(),
        dec.sin(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64, tol: f64) -> bool {
        (a - b).abs() < tol
    }

    #[test]
    fn identity_equatorial() {
        let q = Quat::identity();
        assert!(close(q.ra(), 0.0, 1e-12));
        assert!(close(q.dec(), 0.0, 1e-12));
        assert!(close(q.roll(), 0.0, 1e-12));
    }

    #[test]
    fn equatorial_round_trip() {
        for (ra, dec, roll) in [
            (10.0, 20.0, 30.0),
            (250.5, -41.25, 170.0),
            (359.9, 88.0, 355.0),
        ] {
            let q = Quat::from_equatorial(ra, dec, roll);
            assert!(close(q.ra(), ra, 1e-9), "ra {} vs {}", q.ra(), ra);
            assert!(close(q.dec(), dec, 1e-9), "dec {} vs {}", q.dec(), dec);
            assert!(close(q.roll(), roll, 1e-9), "roll {} vs {}", q.roll(), roll);
        }
    }

    #[test]
    fn body_x_matches_radec() {
        let q = Quat::from_equatorial(45.0, 30.0, 0.0);
        let x = q.body_x();
        let expect = radec2eci(45.0, 30.0);
        for i in 0..3 {
            assert!(close(x[i], expect[i], 1e-12));
        }
    }

    #[test]
    fn mul_matches_transform_product() {
        let a = Quat::from_equatorial(12.0, -5.0, 40.0);
        let b = Quat::from_equatorial(200.0, 60.0, 10.0);
        let ab = a.mul(&b);
        let (ta, tb, tab) = (a.transform(), b.transform(), ab.transform());
        for i in 0..3 {
            for j in 0..3 {
                let prod: f64 = (0..3).map(|k| ta[i][k] * tb[k][j]).sum();
                assert!(close(tab[i][j], prod, 1e-12));
            }
        }
    }

    #[test]
    fn inverse_composes_to_identity() {
        let q = Quat::from_equatorial(123.0, 45.0, 67.0);
        let id = q.mul(&q.inverse());
        assert!(close(id.q4.abs(), 1.0, 1e-12));
    }
}
