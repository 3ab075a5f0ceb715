// Copyright (c) 2021 Marco Boneberger
// Licensed under the EUPL-1.2-or-later

//! # ursentry-rs
//! ursentry-rs turns a [Universal Robots](https://www.universal-robots.com) arm into a sentry
//! which follows people in front of a camera.
//!
//! **ALWAYS HAVE THE EMERGENCY STOP AT
//! HAND WHILE THE SENTRY IS RUNNING!**
//!
//!
//! ## Design
//! The library is divided into three main modules:
//! * [tracker](`crate::tracker`) - follows the bounding boxes reported by the camera across
//!   frames and turns the box closest to the image center into a joystick-like target.
//! * [telemetry](`crate::telemetry`) - reads the joint angles, joint speeds and the TCP pose from
//!   the Modbus server of the robot controller.
//! * [controller](`crate::controller`) - the state machine which turns targets into motion
//!   commands, and the loop ticking it.
//!
//! Motion commands leave the library through the [`RobotDriver`](`crate::RobotDriver`) trait;
//! [`UrScriptDriver`](`crate::UrScriptDriver`) sends them as URScript to the secondary client
//! interface of the controller.
//!
//! # Example:
//!```no_run
//! use std::sync::atomic::AtomicBool;
//! use std::sync::mpsc::channel;
//! use std::sync::Arc;
//! use ursentry::{
//!     ControlLoop, DetectionIngest, ModbusTcp, SentryConfig, SentryController, SentryResult,
//!     TargetSlot, TelemetryDecoder, UrScriptDriver,
//! };
//! fn main() -> SentryResult<()> {
//!     let config = SentryConfig::default();
//!     let network = &config.network;
//!     let modbus = ModbusTcp::new(
//!         &network.robot_address,
//!         network.modbus_port,
//!         network.modbus_unit_id,
//!         network.timeout(),
//!     )?;
//!     let telemetry = TelemetryDecoder::new(modbus, &config.telemetry);
//!     let driver =
//!         UrScriptDriver::new(&network.robot_address, network.script_port, network.timeout())?;
//!     let controller = SentryController::new(driver, telemetry, config.controller.clone());
//!
//!     let running = Arc::new(AtomicBool::new(true));
//!     let slot = TargetSlot::new();
//!     let (detections, batches) = channel();
//!     let ingest =
//!         DetectionIngest::new(&config.tracker, batches, slot.clone(), running.clone()).spawn();
//!     // hand `detections` to the camera
//!     # drop(detections);
//!     ControlLoop::new(controller, slot, running).run();
//!     ingest.join().ok();
//!     Ok(())
//! }
//! ```
//!
//! Without a camera, targets can also be fed to the controller directly:
//!```no_run
//! # use std::time::Instant;
//! # use ursentry::{SentryController, SentryResult, Target, RobotDriver, JointTelemetry};
//! # fn feed<D: RobotDriver, T: JointTelemetry>(
//! #     controller: &mut SentryController<D, T>,
//! # ) -> SentryResult<()> {
//! controller.tick(Some(Target::new(0.3, -0.1)), Instant::now())?;
//! # Ok(())
//! # }
//! ```
//! `tick` has to be called periodically, usually every 200 ms. The first tick moves the robot
//! into the sentry pose, the robot wakes up with the first target after it stood still.
//!
//! All tunables live in [`SentryConfig`](`crate::SentryConfig`) which can be loaded from a TOML
//! file. Functions which talk to the robot return a
//! [`SentryResult`](`crate::SentryResult`); log output goes through the `log` facade.
pub mod config;
pub mod controller;
pub mod exception;
mod network;
pub mod robot;
pub mod telemetry;
pub mod tracker;
pub mod utils;

pub use config::SentryConfig;
pub use controller::control_loop::{ControlLoop, TargetSlot};
pub use controller::state::{ControllerMode, ControllerState};
pub use controller::SentryController;
pub use exception::{SentryException, SentryResult};
pub use robot::ur_script::UrScriptDriver;
pub use robot::{RobotCommand, RobotDriver};
pub use telemetry::modbus::ModbusTcp;
pub use telemetry::tcp_pose::TcpPose;
pub use telemetry::{JointTelemetry, RegisterSource, TelemetryDecoder};
pub use tracker::ingest::DetectionIngest;
pub use tracker::types::{BoundingBox, Target};
pub use tracker::Tracker;
pub use utils::*;
