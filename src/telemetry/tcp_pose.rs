// Copyright (c) 2021 Marco Boneberger
// Licensed under the EUPL-1.2-or-later

//! Contains the ursentry::TcpPose type.
use nalgebra::Isometry3;
use serde::{Deserialize, Serialize};

use crate::utils::rotation_vector_to_isometry;

/// Cartesian pose of the tool center point in the base frame.
#[derive(Serialize, Deserialize, Debug, Copy, Clone, PartialEq, Default)]
pub struct TcpPose {
    /// \[mm\]
    pub x: f64,
    /// \[mm\]
    pub y: f64,
    /// \[mm\]
    pub z: f64,
    /// Rotation vector (axis-angle) x component. \[rad\]
    pub rx: f64,
    /// Rotation vector (axis-angle) y component. \[rad\]
    pub ry: f64,
    /// Rotation vector (axis-angle) z component. \[rad\]
    pub rz: f64,
}

impl TcpPose {
    pub fn position(&self) -> [f64; 3] {
        [self.x, self.y, self.z]
    }

    pub fn rotation_vector(&self) -> [f64; 3] {
        [self.rx, self.ry, self.rz]
    }

    /// The pose as a rigid transformation, translation in \[m\].
    pub fn to_isometry(&self) -> Isometry3<f64> {
        rotation_vector_to_isometry(&self.position(), &self.rotation_vector())
    }
}

impl From<TcpPose> for [f64; 6] {
    fn from(pose: TcpPose) -> Self {
        [pose.x, pose.y, pose.z, pose.rx, pose.ry, pose.rz]
    }
}
