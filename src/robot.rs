// Copyright (c) 2021 Marco Boneberger
// Licensed under the EUPL-1.2-or-later

//! Contains the commands the sentry sends to the robot and the driver trait executing them.
#[cfg(test)]
use mockall::automock;

use crate::exception::SentryResult;
use crate::utils::JointVector;

pub mod ur_script;

/// A single command sent to the robot.
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum RobotCommand {
    /// Moves all joints to `pose`. The robot converges asynchronously, poll the joint speeds
    /// to find out when it arrived.
    MoveToPose {
        /// target joint angles \[rad\]
        pose: JointVector,
        /// \[rad/s²\]
        acceleration: f64,
        /// \[rad/s\]
        velocity: f64,
    },
    /// Accelerates all joints to `speeds` and keeps them there for at most `timeout`.
    SetJointSpeeds {
        /// \[rad/s\]
        speeds: JointVector,
        /// \[rad/s²\]
        acceleration: f64,
        /// \[s\]
        timeout: f64,
    },
}

/// Executes motion commands on the robot.
#[cfg_attr(test, automock)]
pub trait RobotDriver {
    /// Starts a joint move to `pose`. Returns as soon as the command is sent.
    fn move_to_pose(
        &mut self,
        pose: &JointVector,
        acceleration: f64,
        velocity: f64,
    ) -> SentryResult<()>;

    /// Sets the joint speeds. Fire-and-forget, the robot stops on its own after `timeout`
    /// seconds if no new command arrives.
    fn set_joint_speeds(
        &mut self,
        speeds: &JointVector,
        acceleration: f64,
        timeout: f64,
    ) -> SentryResult<()>;
}

impl RobotCommand {
    /// Sends the command through `driver`.
    pub fn execute<D: RobotDriver + ?Sized>(&self, driver: &mut D) -> SentryResult<()> {
        match self {
            RobotCommand::MoveToPose {
                pose,
                acceleration,
                velocity,
            } => driver.move_to_pose(pose, *acceleration, *velocity),
            RobotCommand::SetJointSpeeds {
                speeds,
                acceleration,
                timeout,
            } => driver.set_joint_speeds(speeds, *acceleration, *timeout),
        }
    }

    pub fn is_pose(&self) -> bool {
        matches!(self, RobotCommand::MoveToPose { .. })
    }
}
