// Copyright (c) 2021 Marco Boneberger
// Licensed under the EUPL-1.2-or-later

//! contains useful type definitions and conversion functions.
use nalgebra::{Isometry3, Vector3};

/// Per-joint values of a 6-axis arm, ordered base, shoulder, elbow, wrist_1, wrist_2, wrist_3.
///
/// Used for joint angles \[rad\], joint speeds \[rad/s\] and velocity commands \[rad/s\].
pub type JointVector = [f64; 6];
/// A Vector with 6 entries
pub type Vector6 = nalgebra::Vector6<f64>;

/// Index of the base joint inside a [`JointVector`]
pub const BASE: usize = 0;
/// Index of the shoulder joint inside a [`JointVector`]
pub const SHOULDER: usize = 1;
/// Index of the elbow joint inside a [`JointVector`]
pub const ELBOW: usize = 2;
/// Index of the first wrist joint inside a [`JointVector`]
pub const WRIST_1: usize = 3;
/// Index of the second wrist joint inside a [`JointVector`]
pub const WRIST_2: usize = 4;
/// Index of the third wrist joint inside a [`JointVector`]
pub const WRIST_3: usize = 5;
/// The joints which tilt the camera up and down ("the neck")
pub const NECK_JOINTS: [usize; 3] = [WRIST_1, WRIST_2, WRIST_3];

/// Rounds `value` to the given number of decimal places.
pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10_f64.powi(decimals);
    (value * factor).round() / factor
}

/// Linear interpolation between `a` and `b`. `t` is not clamped.
pub fn lerp(a: f64, b: f64, t: f64) -> f64 {
    a + t * (b - a)
}

/// converts every joint angle from radians to degrees, rounded to 3 decimal places
pub fn joints_to_degrees(joints: &JointVector) -> JointVector {
    let mut out = [0.; 6];
    for (o, q) in out.iter_mut().zip(joints.iter()) {
        *o = round_to(q.to_degrees(), 3);
    }
    out
}

/// Returns true if every entry is exactly zero.
#[allow(clippy::float_cmp)]
pub fn is_all_zero(joints: &JointVector) -> bool {
    joints.iter().all(|&x| x == 0.)
}

/// converts a UR tool pose (position in mm, orientation as rotation vector in rad)
/// to an Isometry with its translation in metres.
pub fn rotation_vector_to_isometry(position_mm: &[f64; 3], rotation: &[f64; 3]) -> Isometry3<f64> {
    let translation = Vector3::new(position_mm[0], position_mm[1], position_mm[2]) / 1000.;
    Isometry3::new(translation, Vector3::new(rotation[0], rotation[1], rotation[2]))
}
