// Copyright (c) 2021 Marco Boneberger
// Licensed under the EUPL-1.2-or-later

//! Contains a [`RobotDriver`](`crate::robot::RobotDriver`) which sends URScript commands.
//!
//! The secondary client interface of the controller (port 30002) executes every line it
//! receives as a URScript program, replacing the currently running one. It also streams
//! robot state packets to every client, these are discarded.
use std::time::Duration;

use crate::exception::{SentryException, SentryResult};
use crate::network::Network;
use crate::robot::RobotDriver;
use crate::utils::JointVector;

/// Port of the secondary client interface
pub const SECONDARY_INTERFACE_PORT: u16 = 30002;

fn format_joints(joints: &JointVector) -> String {
    let joints: Vec<String> = joints.iter().map(|q| format!("{:.4}", q)).collect();
    format!("[{}]", joints.join(","))
}

/// URScript line moving the joints to `pose`.
pub fn movej_script(pose: &JointVector, acceleration: f64, velocity: f64) -> String {
    format!(
        "movej({}, a={:.4}, v={:.4})\n",
        format_joints(pose),
        acceleration,
        velocity
    )
}

/// URScript line setting the joint speeds.
pub fn speedj_script(speeds: &JointVector, acceleration: f64, timeout: f64) -> String {
    format!(
        "speedj({}, {:.4}, {:.4})\n",
        format_joints(speeds),
        acceleration,
        timeout
    )
}

/// Drives a UR robot through its secondary client interface.
pub struct UrScriptDriver {
    network: Network,
}

impl UrScriptDriver {
    /// Connects to the secondary client interface.
    /// # Arguments
    /// * `address` - IP/hostname of the robot
    /// * `port` - usually [`SECONDARY_INTERFACE_PORT`]
    /// * `timeout` - timeout for sending a command
    /// # Errors
    /// * [`NetworkException`](`crate::exception::SentryException::NetworkException`) if the
    /// connection cannot be established.
    pub fn new(address: &str, port: u16, timeout: Duration) -> SentryResult<Self> {
        Ok(UrScriptDriver {
            network: Network::new(address, port, timeout)?,
        })
    }

    fn send_script(&mut self, script: &str) -> SentryResult<()> {
        log::debug!("sending {}", script.trim_end());
        self.network.drain()?;
        self.network
            .tcp_send(script.as_bytes())
            .map_err(|e| SentryException::CommandException {
                message: format!(
                    "ursentry: could not send {} to {}: {}",
                    script.trim_end(),
                    self.network.peer(),
                    e
                ),
            })
    }
}

impl RobotDriver for UrScriptDriver {
    fn move_to_pose(
        &mut self,
        pose: &JointVector,
        acceleration: f64,
        velocity: f64,
    ) -> SentryResult<()> {
        self.send_script(&movej_script(pose, acceleration, velocity))
    }

    fn set_joint_speeds(
        &mut self,
        speeds: &JointVector,
        acceleration: f64,
        timeout: f64,
    ) -> SentryResult<()> {
        self.send_script(&speedj_script(speeds, acceleration, timeout))
    }
}
