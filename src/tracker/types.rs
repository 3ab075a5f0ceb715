// Copyright (c) 2021 Marco Boneberger
// Licensed under the EUPL-1.2-or-later

//! Contains the value types flowing from the camera to the controller.
use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::utils::round_to;

/// Side length of the square image coordinate space the camera reports boxes in.
pub const IMAGE_SIZE: f64 = 1000.;
/// Center of the image coordinate space, for both axes.
pub const IMAGE_CENTER: f64 = IMAGE_SIZE / 2.;

/// Axis-aligned detection rectangle in the 0-1000 image coordinate space.
///
/// Serialized as a `[x, y, width, height]` array, the way the camera reports them.
#[derive(Serialize, Deserialize, Debug, Copy, Clone, PartialEq)]
#[serde(from = "[f64; 4]", into = "[f64; 4]")]
pub struct BoundingBox {
    /// left edge
    pub x: f64,
    /// top edge
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl BoundingBox {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        BoundingBox {
            x,
            y,
            width,
            height,
        }
    }

    /// Creates a box of the given size around a center point.
    pub fn from_center(cx: f64, cy: f64, width: f64, height: f64) -> Self {
        BoundingBox::new(cx - width / 2., cy - height / 2., width, height)
    }

    pub fn center(&self) -> (f64, f64) {
        (self.x + self.width / 2., self.y + self.height / 2.)
    }

    /// Euclidean distance between the centers of two boxes.
    pub fn center_distance(&self, other: &BoundingBox) -> f64 {
        let (ax, ay) = self.center();
        let (bx, by) = other.center();
        f64::hypot(ax - bx, ay - by)
    }

    /// Euclidean distance between the center of the box and the center of the image.
    pub fn distance_to_image_center(&self) -> f64 {
        let (cx, cy) = self.center();
        f64::hypot(cx - IMAGE_CENTER, cy - IMAGE_CENTER)
    }
}

impl From<[f64; 4]> for BoundingBox {
    fn from(array: [f64; 4]) -> Self {
        BoundingBox::new(array[0], array[1], array[2], array[3])
    }
}

impl From<BoundingBox> for [f64; 4] {
    fn from(bbox: BoundingBox) -> Self {
        [bbox.x, bbox.y, bbox.width, bbox.height]
    }
}

/// A detection which is followed across frames.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct TrackedObject {
    pub bbox: BoundingBox,
    pub first_seen: Instant,
    pub last_seen: Instant,
}

/// Position of the target relative to the image center, like a joystick.
///
/// Both axes are in \[-1, 1\]: `x` grows to the right and `y` grows downwards,
/// `(0, 0)` is the image center.
#[derive(Serialize, Deserialize, Debug, Copy, Clone, PartialEq, Default)]
pub struct Target {
    pub x: f64,
    pub y: f64,
}

impl Target {
    pub fn new(x: f64, y: f64) -> Self {
        Target { x, y }
    }

    /// The joystick at rest.
    pub fn neutral() -> Self {
        Target::default()
    }

    /// Maps the center of a box from image coordinates to joystick coordinates,
    /// rounded to 3 decimal places.
    pub fn from_bounding_box(bbox: &BoundingBox) -> Self {
        let (cx, cy) = bbox.center();
        Target {
            x: round_to(cx / IMAGE_CENTER - 1., 3),
            y: round_to(cy / IMAGE_CENTER - 1., 3),
        }
    }

    #[allow(clippy::float_cmp)]
    pub fn is_neutral(&self) -> bool {
        self.x == 0. && self.y == 0.
    }
}

/// Collapses "no target" into the neutral joystick position.
pub fn joystick_or_neutral(target: Option<Target>) -> Target {
    target.unwrap_or_else(Target::neutral)
}
