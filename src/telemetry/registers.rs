// Copyright (c) 2021 Marco Boneberger
// Licensed under the EUPL-1.2-or-later

//! Register map of the UR controller and the fixed-point formats it uses.
//!
//! All registers are unsigned 16-bit big-endian words. Signed values are stored with a
//! 65535 modulus, i.e. `-1` is stored as `65534` and `65535` reads as `-0`.
use std::f64::consts::PI;

use crate::utils::round_to;

/// First register of the joint angles \[mrad\]
pub const JOINT_ANGLES_ADDRESS: u16 = 270;
/// First register of the joint speeds \[mrad/s\]
pub const JOINT_SPEEDS_ADDRESS: u16 = 280;
/// First register of the joint angle sign flags
pub const JOINT_ANGLE_SIGNS_ADDRESS: u16 = 320;
/// First register of the TCP pose, x/y/z \[0.1 mm\] followed by rx/ry/rz \[mrad\]
pub const TCP_POSE_ADDRESS: u16 = 400;
/// Every block read by the decoder has one register per joint or pose component
pub const BLOCK_SIZE: u16 = 6;
/// Byte offset of the first register inside a response frame
/// (7 bytes MBAP header, function code, byte count)
pub const REGISTER_DATA_OFFSET: usize = 9;

/// Extracts register `index` of a response frame. None if the frame is too short.
pub fn register_word(frame: &[u8], index: usize) -> Option<u16> {
    let start = REGISTER_DATA_OFFSET + 2 * index;
    frame
        .get(start..start + 2)
        .map(|bytes| u16::from_be_bytes([bytes[0], bytes[1]]))
}

/// Extracts the first `N` registers of a response frame.
pub fn register_block<const N: usize>(frame: &[u8]) -> Option<[u16; N]> {
    let mut out = [0_u16; N];
    for (i, word) in out.iter_mut().enumerate() {
        *word = register_word(frame, i)?;
    }
    Some(out)
}

/// Decodes a signed magnitude register. Values below 32768 are taken as they are,
/// everything else is interpreted as `-(65535 - value)`.
pub fn format_magnitude(value: u16) -> f64 {
    if value < 32768 {
        value as f64
    } else {
        -((65535 - value) as f64)
    }
}

/// Decodes a joint angle register \[mrad\] together with its sign flag to radians.
///
/// A nonzero sign flag means the joint turned past zero: the angle is then reported
/// one full turn below the raw value, rounded to 3 decimal places.
pub fn format_angle(value: u16, sign: u16) -> f64 {
    let angle = value as f64 / 1000.;
    if sign == 0 {
        angle
    } else {
        round_to(angle - 2. * PI, 3)
    }
}
