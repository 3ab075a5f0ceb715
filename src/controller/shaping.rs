// Copyright (c) 2021 Marco Boneberger
// Licensed under the EUPL-1.2-or-later

//! Contains the functions turning a joystick position into joint speeds.
use crate::config::ControllerConfig;
use crate::utils::{lerp, JointVector, Vector6, NECK_JOINTS};

/// Base speed \[rad/s\] for a horizontal input in robot convention (positive turns the base in
/// positive direction). Zero inside the deadzone, otherwise interpolated between the minimum and
/// the maximum speed.
pub fn base_speed(x: f64, config: &ControllerConfig) -> f64 {
    if in_deadzone(x, config.horizontal_deadzone) {
        return 0.;
    }
    lerp(config.base_min_speed, config.base_max_speed, x.abs()) * x.signum()
}

/// Speeds \[rad/s\] of the neck joints for a vertical input (positive looks down).
///
/// The neck moves between the looking down and the imposing pose. Every joint gets a speed
/// proportional to its share of the span between the two poses. A joint which already reached
/// the pose it is moving towards is not moved any further.
pub fn neck_speeds(y: f64, angles: &JointVector, config: &ControllerConfig) -> [f64; 3] {
    let mut out = [0.; 3];
    if in_deadzone(y, config.vertical_deadzone) {
        return out;
    }
    let (limit, origin) = if y > 0. {
        (&config.looking_down_pose, &config.imposing_pose)
    } else {
        (&config.imposing_pose, &config.looking_down_pose)
    };
    let limit = Vector6::from_row_slice(limit);
    let span = limit - Vector6::from_row_slice(origin);
    let current = Vector6::from_row_slice(angles);
    let speeds = span * (y.abs() * config.neck_speed_scale);
    for (o, &joint) in out.iter_mut().zip(NECK_JOINTS.iter()) {
        let remaining = limit[joint] - current[joint];
        *o = if remaining * speeds[joint] > 0. {
            speeds[joint]
        } else {
            0.
        };
    }
    out
}

pub fn in_deadzone(value: f64, radius: f64) -> bool {
    value.abs() < radius
}

#[cfg(test)]
mod tests {
    use crate::config::ControllerConfig;
    use crate::controller::shaping::{base_speed, in_deadzone, neck_speeds};

    fn config() -> ControllerConfig {
        ControllerConfig {
            imposing_pose: [0., 0., 0., -2., -1., 1.],
            looking_down_pose: [0., 0., 0., -1., -1., 0.5],
            ..ControllerConfig::default()
        }
    }

    #[test]
    fn base_speed_is_interpolated() {
        let config = config();
        assert_eq!(base_speed(0.05, &config), 0.);
        assert_eq!(base_speed(-0.099, &config), 0.);
        assert!((base_speed(0.5, &config) - 0.8).abs() < 1e-12);
        assert!((base_speed(-0.5, &config) + 0.8).abs() < 1e-12);
        assert!((base_speed(1., &config) - 1.5).abs() < 1e-12);
        assert!((base_speed(-0.1, &config) + 0.24).abs() < 1e-12);
        assert!(in_deadzone(0.0999, 0.1));
        assert!(!in_deadzone(-0.1, 0.1));
    }

    #[test]
    fn neck_moves_towards_looking_down() {
        let angles = [0., 0., 0., -2., -1., 1.];
        let speeds = neck_speeds(0.5, &angles, &config());
        assert!((speeds[0] - 0.5).abs() < 1e-12);
        // wrist_2 has no span between the poses
        assert_eq!(speeds[1], 0.);
        assert!((speeds[2] + 0.25).abs() < 1e-12);
    }

    #[test]
    fn neck_moves_towards_imposing() {
        let angles = [0., 0., 0., -1.5, -1., 0.75];
        let speeds = neck_speeds(-1., &angles, &config());
        assert!((speeds[0] + 1.).abs() < 1e-12);
        assert!((speeds[2] - 0.5).abs() < 1e-12);
    }

    #[test]
    fn neck_stops_at_limit() {
        // wrist_1 is already at the looking down pose, wrist_3 is past it
        let angles = [0., 0., 0., -1., -1., 0.4];
        assert_eq!(neck_speeds(0.8, &angles, &config()), [0., 0., 0.]);
        // but it may still move back up
        let speeds = neck_speeds(-0.8, &angles, &config());
        assert!(speeds[0] < 0.);
        assert!(speeds[2] > 0.);
    }

    #[test]
    fn neck_deadzone() {
        assert_eq!(
            neck_speeds(0.05, &[0., 0., 0., -1.5, -1., 0.75], &config()),
            [0.; 3]
        );
    }
}
