// Copyright (c) 2021 Marco Boneberger
// Licensed under the EUPL-1.2-or-later

//! Contains the tunables of the sentry.
//!
//! Every value has a default, so an empty TOML file (or no file at all) yields a working
//! configuration. Only the keys that should differ from the defaults need to be given:
//! ```toml
//! [controller]
//! horizontal_deadzone = 0.05
//! no_input_ticks = 100
//!
//! [network]
//! robot_address = "172.22.114.160"
//! ```
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::exception::{create_config_exception, SentryResult};
use crate::utils::JointVector;

/// Complete configuration of the sentry.
#[derive(Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct SentryConfig {
    pub tracker: TrackerConfig,
    pub telemetry: TelemetryConfig,
    pub controller: ControllerConfig,
    pub network: NetworkConfig,
}

/// Parameters of the [`Tracker`](`crate::Tracker`).
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct TrackerConfig {
    /// Maximum distance between two box centers to be considered the same object. \[image units\]
    pub distance_threshold: f64,
    /// How long an unmatched box is kept alive. \[s\]
    pub time_to_live: f64,
    /// How long the ingestion thread waits for a batch before aging the tracked boxes with an
    /// empty one. \[s\]
    pub poll_interval: f64,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        TrackerConfig {
            distance_threshold: 80.,
            time_to_live: 0.5,
            poll_interval: 0.05,
        }
    }
}

impl TrackerConfig {
    pub fn time_to_live(&self) -> Duration {
        Duration::from_secs_f64(self.time_to_live)
    }
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs_f64(self.poll_interval)
    }
}

/// Retry policy of the [`TelemetryDecoder`](`crate::TelemetryDecoder`).
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct TelemetryConfig {
    /// Number of attempts for joint angle and joint speed reads before falling back to zero.
    pub max_attempts: u32,
    /// Delay between two attempts of a joint angle or joint speed read. \[s\]
    pub retry_delay: f64,
    /// Delay between two attempts of a TCP pose read. \[s\]
    pub tcp_retry_delay: f64,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        TelemetryConfig {
            max_attempts: 10,
            retry_delay: 0.01,
            tcp_retry_delay: 0.5,
        }
    }
}

impl TelemetryConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs_f64(self.retry_delay)
    }
    pub fn tcp_retry_delay(&self) -> Duration {
        Duration::from_secs_f64(self.tcp_retry_delay)
    }
}

/// Parameters of the [`SentryController`](`crate::SentryController`).
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ControllerConfig {
    /// Retracted pose the robot rests in while waiting for a target. \[rad\]
    pub sentry_pose: JointVector,
    /// Pose the robot moves to when it starts tracking. Also the upper limit of the neck. \[rad\]
    pub imposing_pose: JointVector,
    /// Lower limit of the neck. \[rad\]
    pub looking_down_pose: JointVector,
    /// Acceleration used for pose moves. \[rad/s²\]
    pub pose_acceleration: f64,
    /// Velocity used for pose moves. \[rad/s\]
    pub pose_velocity: f64,
    /// Horizontal input below which the base is not moved.
    pub horizontal_deadzone: f64,
    /// Vertical input below which the neck is not moved.
    pub vertical_deadzone: f64,
    /// Base speed right outside of the deadzone. \[rad/s\]
    pub base_min_speed: f64,
    /// Base speed for an input at the edge of the image. \[rad/s\]
    pub base_max_speed: f64,
    /// Neck speed per radian between the looking down and the imposing pose for a full input.
    pub neck_speed_scale: f64,
    /// Acceleration passed with every speed command. \[rad/s²\]
    pub acceleration: f64,
    /// Time after which the robot stops a speed command on its own. \[s\]
    pub speed_timeout: f64,
    /// Base angle after which the robot unwinds back to zero. \[deg\]
    pub max_travel_angle: f64,
    /// Base angle which must never be reached, the cables would be damaged. \[deg\]
    pub danger_angle: f64,
    /// Number of consecutive ticks all joints have to stand still before the robot counts as
    /// stopped.
    pub await_stop_ticks: u32,
    /// Number of ticks without a target after which the robot returns to the sentry pose.
    pub no_input_ticks: u32,
    /// Time after the last input after which the robot is stopped. \[s\]
    pub smooth_stop_delay: f64,
    /// Period of the control loop. \[s\]
    pub tick_period: f64,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        ControllerConfig {
            sentry_pose: [0., -2.094, 0.96, -0.436, -1.571, 1.318],
            imposing_pose: [1.571, -1.41, 1.411, -2.754, -1.604, 1.406],
            looking_down_pose: [1.571, -1.41, 1.411, -1.9, -1.571, 1.318],
            pose_acceleration: 0.5,
            pose_velocity: 1.5,
            horizontal_deadzone: 0.1,
            vertical_deadzone: 0.1,
            base_min_speed: 0.1,
            base_max_speed: 1.5,
            neck_speed_scale: 1.,
            acceleration: 1.5,
            speed_timeout: 1.,
            max_travel_angle: 315.,
            danger_angle: 340.,
            await_stop_ticks: 3,
            no_input_ticks: 50,
            smooth_stop_delay: 0.4,
            tick_period: 0.2,
        }
    }
}

impl ControllerConfig {
    pub fn smooth_stop_delay(&self) -> Duration {
        Duration::from_secs_f64(self.smooth_stop_delay)
    }
    pub fn tick_period(&self) -> Duration {
        Duration::from_secs_f64(self.tick_period)
    }
}

/// Where to find the robot.
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct NetworkConfig {
    /// IP-Address or hostname of the robot
    pub robot_address: String,
    /// Port of the Modbus TCP server of the controller
    pub modbus_port: u16,
    /// Unit identifier sent with every Modbus request
    pub modbus_unit_id: u8,
    /// Port accepting URScript commands
    pub script_port: u16,
    /// Timeout for a single socket operation. \[s\]
    pub timeout: f64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        NetworkConfig {
            robot_address: "127.0.0.1".to_string(),
            modbus_port: 502,
            modbus_unit_id: 0,
            script_port: 30002,
            timeout: 1.,
        }
    }
}

impl NetworkConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs_f64(self.timeout)
    }
}

impl SentryConfig {
    /// Parses and validates a configuration from a TOML string.
    /// # Errors
    /// * [`ConfigException`](`crate::exception::SentryException::ConfigException`) if the string
    /// is no valid TOML or the values are inconsistent.
    pub fn from_toml_str(content: &str) -> SentryResult<SentryConfig> {
        let config: SentryConfig = toml::from_str(content).map_err(create_config_exception)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a configuration file.
    /// # Errors
    /// * [`ConfigException`](`crate::exception::SentryException::ConfigException`) if the file
    /// cannot be read, is no valid TOML or the values are inconsistent.
    pub fn load<P: AsRef<Path>>(path: P) -> SentryResult<SentryConfig> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            create_config_exception(format!("cannot read {}: {}", path.display(), e))
        })?;
        SentryConfig::from_toml_str(&content)
    }

    /// Checks the configuration for values the sentry cannot work with.
    pub fn validate(&self) -> SentryResult<()> {
        let tracker = &self.tracker;
        let telemetry = &self.telemetry;
        let controller = &self.controller;
        ensure_positive("tracker.distance_threshold", tracker.distance_threshold)?;
        ensure_positive("tracker.time_to_live", tracker.time_to_live)?;
        ensure_positive("tracker.poll_interval", tracker.poll_interval)?;
        if telemetry.max_attempts == 0 {
            return Err(create_config_exception(
                "telemetry.max_attempts must be at least 1",
            ));
        }
        ensure_non_negative("telemetry.retry_delay", telemetry.retry_delay)?;
        ensure_non_negative("telemetry.tcp_retry_delay", telemetry.tcp_retry_delay)?;
        ensure_deadzone("controller.horizontal_deadzone", controller.horizontal_deadzone)?;
        ensure_deadzone("controller.vertical_deadzone", controller.vertical_deadzone)?;
        ensure_non_negative("controller.base_min_speed", controller.base_min_speed)?;
        ensure_positive("controller.base_max_speed", controller.base_max_speed)?;
        if controller.base_min_speed > controller.base_max_speed {
            return Err(create_config_exception(
                "controller.base_min_speed must not exceed controller.base_max_speed",
            ));
        }
        ensure_non_negative("controller.neck_speed_scale", controller.neck_speed_scale)?;
        ensure_positive("controller.acceleration", controller.acceleration)?;
        ensure_positive("controller.speed_timeout", controller.speed_timeout)?;
        ensure_positive("controller.pose_acceleration", controller.pose_acceleration)?;
        ensure_positive("controller.pose_velocity", controller.pose_velocity)?;
        ensure_positive("controller.max_travel_angle", controller.max_travel_angle)?;
        if controller.max_travel_angle >= controller.danger_angle {
            return Err(create_config_exception(
                "controller.max_travel_angle must be smaller than controller.danger_angle",
            ));
        }
        if controller.await_stop_ticks == 0 {
            return Err(create_config_exception(
                "controller.await_stop_ticks must be at least 1",
            ));
        }
        ensure_positive("controller.smooth_stop_delay", controller.smooth_stop_delay)?;
        ensure_positive("controller.tick_period", controller.tick_period)?;
        ensure_positive("network.timeout", self.network.timeout)?;
        Ok(())
    }
}

fn ensure_positive(name: &str, value: f64) -> SentryResult<()> {
    if value.is_finite() && value > 0. {
        Ok(())
    } else {
        Err(create_config_exception(format!(
            "{} must be positive, got {}",
            name, value
        )))
    }
}

fn ensure_non_negative(name: &str, value: f64) -> SentryResult<()> {
    if value.is_finite() && value >= 0. {
        Ok(())
    } else {
        Err(create_config_exception(format!(
            "{} must not be negative, got {}",
            name, value
        )))
    }
}

fn ensure_deadzone(name: &str, value: f64) -> SentryResult<()> {
    if (0. ..1.).contains(&value) {
        Ok(())
    } else {
        Err(create_config_exception(format!(
            "{} must be in [0, 1), got {}",
            name, value
        )))
    }
}
