//! Rigid-body pose algebra.
//!
//! Minimal translation + quaternion math used to anchor the tracker's raw
//! frame to the calibrated reference frame.  All functions are pure.
//!
//! # Example
//!
//! ```rust
//! use arbridge_perception::transform::{Pose, Quaternion, Vec3};
//!
//! let start = Pose::new(Vec3::new(2.0, 0.0, 0.0), Quaternion::identity());
//! let later = Pose::new(Vec3::new(3.0, 0.0, 0.0), Quaternion::identity());
//!
//! // Express `later` relative to `start`.
//! let relative = start.inverse().compose(later);
//! assert!((relative.translation.x - 1.0).abs() < 1e-5);
//! ```

use arbridge_types::BridgeError;

// ────────────────────────────────────────────────────────────────────────────
// Primitive types
// ────────────────────────────────────────────────────────────────────────────

/// A 3-D vector.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    /// Create a new vector.
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    /// The zero vector.
    pub fn zero() -> Self {
        Self::new(0.0, 0.0, 0.0)
    }

    pub fn add(self, rhs: Self) -> Self {
        Self::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }

    pub fn neg(self) -> Self {
        Self::new(-self.x, -self.y, -self.z)
    }

    pub fn norm(self) -> f32 {
        (self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }

    /// Build from a slice that must hold exactly three values.
    pub fn from_slice(values: &[f32]) -> Option<Self> {
        match values {
            [x, y, z] => Some(Self::new(*x, *y, *z)),
            _ => None,
        }
    }

    pub fn to_array(self) -> [f32; 3] {
        [self.x, self.y, self.z]
    }
}

/// A unit quaternion representing a 3-D rotation (w, x, y, z convention).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quaternion {
    pub w: f32,
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Default for Quaternion {
    fn default() -> Self {
        Self::identity()
    }
}

impl Quaternion {
    /// Create a quaternion.  The caller is responsible for providing a unit
    /// quaternion (|q| = 1).
    pub fn new(w: f32, x: f32, y: f32, z: f32) -> Self {
        Self { w, x, y, z }
    }

    /// The identity rotation (no rotation).
    pub fn identity() -> Self {
        Self::new(1.0, 0.0, 0.0, 0.0)
    }

    /// Rotation of `angle_rad` about `axis` (normalised internally).
    ///
    /// A zero-length axis yields the identity.
    pub fn from_axis_angle(axis: Vec3, angle_rad: f32) -> Self {
        let n = axis.norm();
        if n == 0.0 {
            return Self::identity();
        }
        let (s, c) = (angle_rad * 0.5).sin_cos();
        Self::new(c, s * axis.x / n, s * axis.y / n, s * axis.z / n)
    }

    /// Convert a rotation-vector sensor reading into a quaternion.
    ///
    /// `values[0..3]` hold `sin(θ/2)·axis`.  When a fourth value is present it
    /// is taken as `cos(θ/2)`; otherwise w is recovered as
    /// `sqrt(max(0, 1 − |v|²))`.  A fifth value (heading accuracy) is
    /// accepted and ignored.
    ///
    /// # Errors
    ///
    /// [`BridgeError::MalformedSample`] when the slice does not hold 3, 4 or 5
    /// values.
    pub fn from_rotation_vector(values: &[f32]) -> Result<Self, BridgeError> {
        let (x, y, z, w) = match values {
            [x, y, z] => {
                let w2 = 1.0 - x * x - y * y - z * z;
                (*x, *y, *z, if w2 > 0.0 { w2.sqrt() } else { 0.0 })
            }
            [x, y, z, w] | [x, y, z, w, _] => (*x, *y, *z, *w),
            _ => {
                return Err(BridgeError::MalformedSample {
                    kind: "rotation_vector".to_string(),
                    expected: "3, 4 or 5".to_string(),
                    actual: values.len(),
                });
            }
        };
        Ok(Self::new(w, x, y, z))
    }

    /// Build from wire order `[x, y, z, w]`.
    pub fn from_xyzw(q: [f32; 4]) -> Self {
        Self::new(q[3], q[0], q[1], q[2])
    }

    /// Hamilton product: compose two rotations.
    pub fn mul(self, rhs: Self) -> Self {
        Self::new(
            self.w * rhs.w - self.x * rhs.x - self.y * rhs.y - self.z * rhs.z,
            self.w * rhs.x + self.x * rhs.w + self.y * rhs.z - self.z * rhs.y,
            self.w * rhs.y - self.x * rhs.z + self.y * rhs.w + self.z * rhs.x,
            self.w * rhs.z + self.x * rhs.y - self.y * rhs.x + self.z * rhs.w,
        )
    }

    /// Conjugate (== inverse for a unit quaternion).
    pub fn conjugate(self) -> Self {
        Self::new(self.w, -self.x, -self.y, -self.z)
    }

    pub fn norm(self) -> f32 {
        (self.w * self.w + self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }

    /// Rescale to unit length.  A zero quaternion becomes the identity.
    pub fn normalize(self) -> Self {
        let n = self.norm();
        if n == 0.0 {
            return Self::identity();
        }
        Self::new(self.w / n, self.x / n, self.y / n, self.z / n)
    }

    /// Rotate a vector by this quaternion: p' = q * p * q*.
    pub fn rotate(self, v: Vec3) -> Vec3 {
        // Express v as a pure quaternion.
        let p = Self::new(0.0, v.x, v.y, v.z);
        let rotated = self.mul(p).mul(self.conjugate());
        Vec3::new(rotated.x, rotated.y, rotated.z)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Pose
// ────────────────────────────────────────────────────────────────────────────

/// A rigid-body transform: rotate by `rotation`, then add `translation`.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Pose {
    pub translation: Vec3,
    pub rotation: Quaternion,
}

impl Pose {
    pub fn new(translation: Vec3, rotation: Quaternion) -> Self {
        Self {
            translation,
            rotation,
        }
    }

    /// The identity transform (no translation, no rotation).
    pub fn identity() -> Self {
        Self::new(Vec3::zero(), Quaternion::identity())
    }

    /// The transform that undoes `self`: `self.inverse().compose(self)` is the
    /// identity.
    pub fn inverse(self) -> Self {
        let inv_rot = self.rotation.conjugate();
        Self::new(inv_rot.rotate(self.translation).neg(), inv_rot)
    }

    /// Apply `other` first, then `self` (`self` sits on the left).
    ///
    /// If `self` = T_A_B and `other` = T_B_C, the result is T_A_C.  Not
    /// commutative.
    pub fn compose(self, other: Self) -> Self {
        let translated = self.translation.add(self.rotation.rotate(other.translation));
        let rotated = self.rotation.mul(other.rotation);
        Self::new(translated, rotated)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::{FRAC_1_SQRT_2, FRAC_PI_2};

    fn assert_identity(p: Pose) {
        assert!(p.translation.norm() < 1e-5, "translation {:?}", p.translation);
        // q and -q are the same rotation.
        assert!((p.rotation.w.abs() - 1.0).abs() < 1e-5, "rotation {:?}", p.rotation);
        assert!(p.rotation.x.abs() < 1e-5);
        assert!(p.rotation.y.abs() < 1e-5);
        assert!(p.rotation.z.abs() < 1e-5);
    }

    // ── Quaternion ──────────────────────────────────────────────────────────

    #[test]
    fn quaternion_identity_rotate_is_noop() {
        let q = Quaternion::identity();
        let r = q.rotate(Vec3::new(1.0, 2.0, 3.0));
        assert!((r.x - 1.0).abs() < 1e-5);
        assert!((r.y - 2.0).abs() < 1e-5);
        assert!((r.z - 3.0).abs() < 1e-5);
    }

    #[test]
    fn quaternion_90deg_yaw_rotates_x_to_y() {
        let q = Quaternion::new(FRAC_1_SQRT_2, 0.0, 0.0, FRAC_1_SQRT_2);
        let r = q.rotate(Vec3::new(1.0, 0.0, 0.0));
        assert!(r.x.abs() < 1e-5, "x should be ~0, got {}", r.x);
        assert!((r.y - 1.0).abs() < 1e-5, "y should be ~1, got {}", r.y);
        assert!(r.z.abs() < 1e-5);
    }

    #[test]
    fn axis_angle_matches_literal_quaternion() {
        let q = Quaternion::from_axis_angle(Vec3::new(0.0, 0.0, 2.0), FRAC_PI_2);
        assert!((q.w - FRAC_1_SQRT_2).abs() < 1e-5);
        assert!((q.z - FRAC_1_SQRT_2).abs() < 1e-5);
        assert_eq!(Quaternion::from_axis_angle(Vec3::zero(), 1.0), Quaternion::identity());
    }

    #[test]
    fn zero_rotation_vector_is_identity() {
        let q = Quaternion::from_rotation_vector(&[0.0, 0.0, 0.0]).unwrap();
        assert_eq!(q, Quaternion::identity());
    }

    #[test]
    fn rotation_vector_recovers_w_when_omitted() {
        let s = (FRAC_PI_2 * 0.5).sin();
        let q = Quaternion::from_rotation_vector(&[0.0, 0.0, s]).unwrap();
        assert!((q.w - FRAC_1_SQRT_2).abs() < 1e-5);
        assert!((q.norm() - 1.0).abs() < 1e-5);
    }

    #[test]
    fn rotation_vector_uses_explicit_w_and_ignores_accuracy() {
        let q = Quaternion::from_rotation_vector(&[0.1, 0.2, 0.3, 0.9, 0.05]).unwrap();
        assert_eq!(q, Quaternion::new(0.9, 0.1, 0.2, 0.3));
    }

    #[test]
    fn rotation_vector_clamps_negative_w_squared() {
        let q = Quaternion::from_rotation_vector(&[1.0, 1.0, 0.0]).unwrap();
        assert_eq!(q.w, 0.0);
    }

    #[test]
    fn rotation_vector_rejects_bad_length() {
        for bad in [&[][..], &[1.0][..], &[1.0, 2.0][..], &[0.0; 6][..]] {
            let err = Quaternion::from_rotation_vector(bad).unwrap_err();
            assert!(matches!(err, BridgeError::MalformedSample { actual, .. } if actual == bad.len()));
        }
    }

    #[test]
    fn normalize_rescales_and_handles_zero() {
        let q = Quaternion::new(2.0, 0.0, 0.0, 0.0).normalize();
        assert_eq!(q, Quaternion::identity());
        assert_eq!(Quaternion::new(0.0, 0.0, 0.0, 0.0).normalize(), Quaternion::identity());
    }

    #[test]
    fn xyzw_constructor_reorders() {
        let q = Quaternion::from_xyzw([0.1, 0.2, 0.3, 0.9]);
        assert_eq!(q, Quaternion::new(0.9, 0.1, 0.2, 0.3));
    }

    // ── Pose ────────────────────────────────────────────────────────────────

    #[test]
    fn identity_compose_is_noop() {
        let t = Pose::new(Vec3::new(1.0, 2.0, 3.0), Quaternion::identity());
        let composed = Pose::identity().compose(t);
        assert!((composed.translation.x - 1.0).abs() < 1e-5);
        assert!((composed.translation.y - 2.0).abs() < 1e-5);
        assert!((composed.translation.z - 3.0).abs() < 1e-5);
    }

    #[test]
    fn compose_translations_add() {
        let t1 = Pose::new(Vec3::new(1.0, 0.0, 0.0), Quaternion::identity());
        let t2 = Pose::new(Vec3::new(2.0, 0.0, 0.0), Quaternion::identity());
        assert!((t1.compose(t2).translation.x - 3.0).abs() < 1e-5);
    }

    #[test]
    fn compose_applies_left_rotation_to_right_translation() {
        let q90z = Quaternion::new(FRAC_1_SQRT_2, 0.0, 0.0, FRAC_1_SQRT_2);
        let base = Pose::new(Vec3::zero(), q90z);
        let arm = Pose::new(Vec3::new(1.0, 0.0, 0.0), Quaternion::identity());

        let ab = base.compose(arm);
        assert!(ab.translation.x.abs() < 1e-5);
        assert!((ab.translation.y - 1.0).abs() < 1e-5);

        // Reversed order leaves the translation unrotated.
        let ba = arm.compose(base);
        assert!((ba.translation.x - 1.0).abs() < 1e-5);
        assert!(ba.translation.y.abs() < 1e-5);
    }

    #[test]
    fn inverse_compose_round_trip_is_identity() {
        let q = Quaternion::from_axis_angle(Vec3::new(0.3, -1.0, 0.5), 1.2);
        let poses = [
            Pose::identity(),
            Pose::new(Vec3::new(1.0, -2.0, 0.5), Quaternion::identity()),
            Pose::new(Vec3::new(-0.4, 3.0, 7.0), q),
        ];
        for p in poses {
            assert_identity(p.inverse().compose(p));
            assert_identity(p.compose(p.inverse()));
            assert_identity(p.inverse().compose(p).inverse());
        }
    }
}
