// Copyright (c) 2021 Marco Boneberger
// Licensed under the EUPL-1.2-or-later

//! Contains the ursentry::SentryController type.
//!
//! The controller is a state machine advanced once per tick with the latest target:
//!
//! * On the first tick the robot is sent to the sentry pose.
//! * After every pose command the controller waits until all joints stood still for a couple of
//!   consecutive ticks before it does anything else.
//! * In sentry mode the first target wakes the robot up: the base turns towards the target and
//!   the robot takes the imposing pose.
//! * In tracking mode the target is followed with joint speed commands. The base is never turned
//!   past the travel limit; if it gets there, the robot stops and unwinds the base back to zero.
//! * Without a target the robot stops moving shortly after the last input and returns to the
//!   sentry pose after a while.
use std::time::Instant;

use crate::config::ControllerConfig;
use crate::exception::SentryResult;
use crate::robot::{RobotCommand, RobotDriver};
use crate::telemetry::JointTelemetry;
use crate::tracker::types::Target;
use crate::utils::{is_all_zero, JointVector, BASE, NECK_JOINTS};

pub mod control_loop;
pub mod shaping;
pub mod state;

use shaping::{base_speed, in_deadzone, neck_speeds};
use state::{ControllerMode, ControllerState};

/// Turns targets into motion commands for the robot.
pub struct SentryController<D: RobotDriver, T: JointTelemetry> {
    driver: D,
    telemetry: T,
    config: ControllerConfig,
    state: ControllerState,
    last_command: Option<RobotCommand>,
}

impl<D: RobotDriver, T: JointTelemetry> SentryController<D, T> {
    pub fn new(driver: D, telemetry: T, config: ControllerConfig) -> Self {
        SentryController {
            driver,
            telemetry,
            config,
            state: ControllerState::default(),
            last_command: None,
        }
    }

    /// Advances the state machine by one tick.
    ///
    /// # Arguments
    /// * `target` - latest target, None if nothing is detected
    /// * `now` - time of the tick, used for the smooth stop
    /// # Errors
    /// * [`CommandException`](`crate::exception::SentryException::CommandException`) or
    /// [`NetworkException`](`crate::exception::SentryException::NetworkException`) if a command
    /// could not be sent. The state is left as it was before the command, so the next tick
    /// tries again.
    pub fn tick(&mut self, target: Option<Target>, now: Instant) -> SentryResult<()> {
        if !self.state.initialized {
            log::info!("initializing: moving to sentry pose");
            return self.enter_sentry();
        }

        if self.state.await_stop {
            self.await_stop();
            return Ok(());
        }

        if self.state.pending_unwind {
            log::info!("unwinding the base back to zero");
            let pose = self.imposing_pose_at(0.);
            self.move_to_pose(pose)?;
            self.state.pending_unwind = false;
            self.state.has_detected_once = false;
            self.state.arm_await_stop();
            return Ok(());
        }

        let target = match target {
            Some(target) => target,
            None => return self.handle_missing_target(now),
        };

        match self.state.mode {
            ControllerMode::Sentry => {
                self.wake_up(target)?;
                self.state.has_detected_once = false;
            }
            ControllerMode::Tracking => {
                self.shape_velocity(target, now)?;
                self.state.has_detected_once = true;
                self.state.none_input_ticks = 0;
            }
        }
        Ok(())
    }

    fn enter_sentry(&mut self) -> SentryResult<()> {
        self.move_to_pose(self.config.sentry_pose)?;
        self.state = ControllerState::entering_sentry();
        Ok(())
    }

    fn await_stop(&mut self) {
        let speeds = self.telemetry.read_joint_speeds();
        if is_all_zero(&speeds) {
            self.state.await_stop_ticks += 1;
            log::debug!(
                "awaiting stop: standing still for {} / {} ticks",
                self.state.await_stop_ticks,
                self.config.await_stop_ticks
            );
            if self.state.await_stop_ticks >= self.config.await_stop_ticks {
                self.state.await_stop = false;
                self.state.await_stop_ticks = 0;
                log::debug!("robot stopped");
            }
        } else {
            log::debug!("awaiting stop: speeds {:?}", speeds);
            self.state.await_stop_ticks = 0;
        }
    }

    fn handle_missing_target(&mut self, now: Instant) -> SentryResult<()> {
        if self.state.smooth_stop_due(now) {
            log::debug!("no input for a while, smooth stopping");
            self.shape_velocity(Target::neutral(), now)?;
        }
        if self.state.has_detected_once && self.state.mode == ControllerMode::Tracking {
            self.state.none_input_ticks += 1;
            log::debug!(
                "no input for {} / {} ticks",
                self.state.none_input_ticks,
                self.config.no_input_ticks
            );
            if self.state.none_input_ticks > self.config.no_input_ticks {
                log::info!("target lost, returning to sentry mode");
                self.enter_sentry()?;
            }
        }
        Ok(())
    }

    /// Turns the base towards the target and takes the imposing pose.
    fn wake_up(&mut self, target: Target) -> SentryResult<()> {
        if target.is_neutral() {
            return Ok(());
        }
        // image right is a negative rotation of the base
        let heading = f64::atan2(target.x, -target.y).to_degrees();
        log::info!("target at {:?}, heading {:.1} deg: tracking", target, heading);
        let pose = self.imposing_pose_at(-heading);
        self.move_to_pose(pose)?;
        self.state.mode = ControllerMode::Tracking;
        self.state.commanded_speeds = [0.; 6];
        self.state.arm_await_stop();
        Ok(())
    }

    /// Follows the target with joint speeds.
    ///
    /// The pending smooth stop is only replaced once the speed command went out.
    fn shape_velocity(&mut self, target: Target, now: Instant) -> SentryResult<()> {
        let x = -target.x;
        let y = target.y;
        let horizontal_idle = in_deadzone(x, self.config.horizontal_deadzone);
        let vertical_idle = in_deadzone(y, self.config.vertical_deadzone);
        if horizontal_idle && vertical_idle && is_all_zero(&self.state.commanded_speeds) {
            self.state.cancel_smooth_stop();
            return Ok(());
        }

        let mut speeds = self.state.commanded_speeds;
        let angles = if horizontal_idle && vertical_idle {
            [0.; 6]
        } else {
            self.telemetry.read_joint_angles()
        };

        if horizontal_idle {
            speeds[BASE] = 0.;
        } else {
            let base_angle = angles[BASE].to_degrees();
            if base_angle.abs() > self.config.danger_angle {
                log::error!(
                    "base at {:.1} deg is past the danger angle of {:.1} deg",
                    base_angle,
                    self.config.danger_angle
                );
            }
            if base_angle.abs() > self.config.max_travel_angle {
                log::warn!(
                    "base at {:.1} deg is past the travel limit of {:.1} deg: stopping to unwind",
                    base_angle,
                    self.config.max_travel_angle
                );
                self.set_joint_speeds([0.; 6])?;
                self.state.cancel_smooth_stop();
                self.state.pending_unwind = true;
                self.state.arm_await_stop();
                return Ok(());
            }
            speeds[BASE] = base_speed(x, &self.config);
        }

        let neck = neck_speeds(y, &angles, &self.config);
        for (&joint, &speed) in NECK_JOINTS.iter().zip(neck.iter()) {
            speeds[joint] = speed;
        }

        self.set_joint_speeds(speeds)?;
        if is_all_zero(&speeds) {
            self.state.cancel_smooth_stop();
        } else {
            self.state
                .schedule_smooth_stop(now + self.config.smooth_stop_delay());
        }
        Ok(())
    }

    fn imposing_pose_at(&self, base_angle_degrees: f64) -> JointVector {
        let mut pose = self.config.imposing_pose;
        pose[BASE] = base_angle_degrees.to_radians();
        pose
    }

    fn move_to_pose(&mut self, pose: JointVector) -> SentryResult<()> {
        let command = RobotCommand::MoveToPose {
            pose,
            acceleration: self.config.pose_acceleration,
            velocity: self.config.pose_velocity,
        };
        self.send(command)?;
        self.state.cancel_smooth_stop();
        Ok(())
    }

    fn set_joint_speeds(&mut self, speeds: JointVector) -> SentryResult<()> {
        let command = RobotCommand::SetJointSpeeds {
            speeds,
            acceleration: self.config.acceleration,
            timeout: self.config.speed_timeout,
        };
        self.send(command)?;
        self.state.commanded_speeds = speeds;
        Ok(())
    }

    fn send(&mut self, command: RobotCommand) -> SentryResult<()> {
        command.execute(&mut self.driver)?;
        self.last_command = Some(command);
        Ok(())
    }

    pub fn mode(&self) -> ControllerMode {
        self.state.mode
    }

    pub fn state(&self) -> &ControllerState {
        &self.state
    }

    /// The last command which was sent successfully.
    pub fn last_command(&self) -> Option<&RobotCommand> {
        self.last_command.as_ref()
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    pub fn driver_mut(&mut self) -> &mut D {
        &mut self.driver
    }

    pub fn telemetry_mut(&mut self) -> &mut T {
        &mut self.telemetry
    }
}
