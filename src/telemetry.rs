// Copyright (c) 2021 Marco Boneberger
// Licensed under the EUPL-1.2-or-later

//! Contains the ursentry::TelemetryDecoder type.
//!
//! The robot state is polled from the Modbus server of the controller. The fieldbus is not
//! reliable, so every read is retried. Joint angle and joint speed reads give up after a
//! bounded number of attempts and report all zeros, a TCP pose read retries until it succeeds.
use std::time::Duration;

#[cfg(test)]
use mockall::automock;

use crate::config::TelemetryConfig;
use crate::utils::{joints_to_degrees, JointVector};

pub mod modbus;
pub mod registers;
pub mod tcp_pose;

use registers::{
    format_angle, format_magnitude, register_block, BLOCK_SIZE, JOINT_ANGLES_ADDRESS,
    JOINT_ANGLE_SIGNS_ADDRESS, JOINT_SPEEDS_ADDRESS, TCP_POSE_ADDRESS,
};
use tcp_pose::TcpPose;

/// Raw access to the holding registers of the robot controller.
#[cfg_attr(test, automock)]
pub trait RegisterSource {
    /// Reads `quantity` registers starting at `address`.
    /// # Return
    /// The complete response frame or None if the transport failed.
    fn read_holding_registers(&mut self, address: u16, quantity: u16) -> Option<Vec<u8>>;
}

/// Provides the joint state the controller needs.
#[cfg_attr(test, automock)]
pub trait JointTelemetry {
    /// Current joint angles. \[rad\]
    fn read_joint_angles(&mut self) -> JointVector;
    /// Current joint speeds. \[rad/s\]
    fn read_joint_speeds(&mut self) -> JointVector;
    /// Current joint angles rounded to 3 decimal places. \[deg\]
    fn read_joint_angles_degrees(&mut self) -> JointVector {
        joints_to_degrees(&self.read_joint_angles())
    }
}

/// Decodes joint angles from a magnitude frame and a sign flag frame.
pub fn decode_joint_angles(magnitudes: &[u8], signs: &[u8]) -> Option<JointVector> {
    let magnitudes = register_block::<6>(magnitudes)?;
    let signs = register_block::<6>(signs)?;
    let mut angles = [0.; 6];
    for (angle, (&value, &sign)) in angles.iter_mut().zip(magnitudes.iter().zip(signs.iter())) {
        *angle = format_angle(value, sign);
    }
    Some(angles)
}

/// Decodes joint speeds \[rad/s\] from a frame of signed \[mrad/s\] registers.
pub fn decode_joint_speeds(frame: &[u8]) -> Option<JointVector> {
    let registers = register_block::<6>(frame)?;
    let mut speeds = [0.; 6];
    for (speed, &value) in speeds.iter_mut().zip(registers.iter()) {
        *speed = format_magnitude(value) / 1000.;
    }
    Some(speeds)
}

/// Decodes the TCP pose from a frame of signed \[0.1 mm\] and \[mrad\] registers.
pub fn decode_tcp_pose(frame: &[u8]) -> Option<TcpPose> {
    let r = register_block::<6>(frame)?;
    Some(TcpPose {
        x: format_magnitude(r[0]) / 10.,
        y: format_magnitude(r[1]) / 10.,
        z: format_magnitude(r[2]) / 10.,
        rx: format_magnitude(r[3]) / 1000.,
        ry: format_magnitude(r[4]) / 1000.,
        rz: format_magnitude(r[5]) / 1000.,
    })
}

/// Reads and decodes the robot state from a [`RegisterSource`].
pub struct TelemetryDecoder<S: RegisterSource> {
    source: S,
    max_attempts: u32,
    retry_delay: Duration,
    tcp_retry_delay: Duration,
    exhausted_reads: u64,
}

impl<S: RegisterSource> TelemetryDecoder<S> {
    pub fn new(source: S, config: &TelemetryConfig) -> Self {
        TelemetryDecoder {
            source,
            max_attempts: config.max_attempts.max(1),
            retry_delay: config.retry_delay(),
            tcp_retry_delay: config.tcp_retry_delay(),
            exhausted_reads: 0,
        }
    }

    /// Current joint angles. \[rad\]
    ///
    /// Returns all zeros if no attempt succeeded.
    pub fn read_joint_angles(&mut self) -> JointVector {
        self.read_with_retry("Angles", |source| {
            let magnitudes = source.read_holding_registers(JOINT_ANGLES_ADDRESS, BLOCK_SIZE)?;
            let signs = source.read_holding_registers(JOINT_ANGLE_SIGNS_ADDRESS, BLOCK_SIZE)?;
            decode_joint_angles(&magnitudes, &signs)
        })
        .unwrap_or([0.; 6])
    }

    /// Current joint speeds. \[rad/s\]
    ///
    /// Returns all zeros if no attempt succeeded.
    pub fn read_joint_speeds(&mut self) -> JointVector {
        self.read_with_retry("Speeds", |source| {
            let frame = source.read_holding_registers(JOINT_SPEEDS_ADDRESS, BLOCK_SIZE)?;
            decode_joint_speeds(&frame)
        })
        .unwrap_or([0.; 6])
    }

    /// Current pose of the tool center point.
    ///
    /// There is no safe fallback for a Cartesian pose, so this blocks until a read succeeds.
    pub fn read_tcp_pose(&mut self) -> TcpPose {
        let mut attempt: u64 = 0;
        loop {
            if let Some(pose) = self
                .source
                .read_holding_registers(TCP_POSE_ADDRESS, BLOCK_SIZE)
                .and_then(|frame| decode_tcp_pose(&frame))
            {
                return pose;
            }
            attempt += 1;
            log::warn!("[TCP] Modbus error #{}: retrying", attempt);
            std::thread::sleep(self.tcp_retry_delay);
        }
    }

    /// Number of joint angle and joint speed reads which ran out of attempts.
    pub fn exhausted_reads(&self) -> u64 {
        self.exhausted_reads
    }

    pub fn source_mut(&mut self) -> &mut S {
        &mut self.source
    }

    fn read_with_retry<T, F>(&mut self, what: &str, mut read: F) -> Option<T>
    where
        F: FnMut(&mut S) -> Option<T>,
    {
        for attempt in 1..=self.max_attempts {
            if let Some(value) = read(&mut self.source) {
                return Some(value);
            }
            log::warn!("[{}] Modbus error #{}: retrying", what, attempt);
            if attempt < self.max_attempts {
                std::thread::sleep(self.retry_delay);
            }
        }
        self.exhausted_reads += 1;
        log::error!(
            "[{}] Modbus error: failed after {} attempts, reporting zeros",
            what,
            self.max_attempts
        );
        None
    }
}

impl<S: RegisterSource> JointTelemetry for TelemetryDecoder<S> {
    fn read_joint_angles(&mut self) -> JointVector {
        TelemetryDecoder::read_joint_angles(self)
    }
    fn read_joint_speeds(&mut self) -> JointVector {
        TelemetryDecoder::read_joint_speeds(self)
    }
}

#[cfg(test)]
mod tests {
    use crate::config::TelemetryConfig;
    use crate::telemetry::registers::{
        JOINT_ANGLES_ADDRESS, JOINT_ANGLE_SIGNS_ADDRESS, JOINT_SPEEDS_ADDRESS, TCP_POSE_ADDRESS,
    };
    use crate::telemetry::tcp_pose::TcpPose;
    use crate::telemetry::{
        decode_joint_angles, decode_joint_speeds, JointTelemetry, MockRegisterSource,
        TelemetryDecoder,
    };
    use mockall::predicate::*;
    use std::f64::consts::PI;

    fn frame(registers: [u16; 6]) -> Vec<u8> {
        let mut frame = vec![0, 1, 0, 0, 0, 15, 0, 0x03, 12];
        for register in registers.iter() {
            frame.extend_from_slice(&register.to_be_bytes());
        }
        frame
    }

    fn config() -> TelemetryConfig {
        TelemetryConfig {
            max_attempts: 10,
            retry_delay: 0.,
            tcp_retry_delay: 0.,
        }
    }

    #[test]
    fn joint_speed_decoding() {
        let speeds = decode_joint_speeds(&frame([1500, 65534, 0, 0x8000, 1, 65535])).unwrap();
        assert_eq!(speeds, [1.5, -0.001, 0., -32.767, 0.001, -0.]);
        assert_eq!(decode_joint_speeds(&frame([0; 6])[..20]), None);
    }

    #[test]
    fn joint_angle_decoding() {
        let angles = decode_joint_angles(
            &frame([1000, 1571, 0, 3142, 6000, 1000]),
            &frame([0, 0, 0, 0, 0, 1]),
        )
        .unwrap();
        assert_eq!(angles[..5], [1., 1.571, 0., 3.142, 6.]);
        assert_eq!(angles[5], crate::utils::round_to(1. - 2. * PI, 3));
    }

    #[test]
    fn reads_joint_angles() {
        let mut source = MockRegisterSource::new();
        source
            .expect_read_holding_registers()
            .with(eq(JOINT_ANGLES_ADDRESS), eq(6))
            .times(1)
            .returning(|_, _| Some(frame([1000, 2000, 3000, 4000, 5000, 6000])));
        source
            .expect_read_holding_registers()
            .with(eq(JOINT_ANGLE_SIGNS_ADDRESS), eq(6))
            .times(1)
            .returning(|_, _| Some(frame([1, 0, 0, 0, 0, 0])));
        let mut decoder = TelemetryDecoder::new(source, &config());
        assert_eq!(
            decoder.read_joint_angles(),
            [-5.283, 2., 3., 4., 5., 6.]
        );
        assert_eq!(decoder.exhausted_reads(), 0);
    }

    #[test]
    fn retries_until_read_succeeds() {
        let mut source = MockRegisterSource::new();
        let mut calls = 0;
        source
            .expect_read_holding_registers()
            .with(eq(JOINT_SPEEDS_ADDRESS), eq(6))
            .times(3)
            .returning(move |_, _| {
                calls += 1;
                if calls < 3 {
                    None
                } else {
                    Some(frame([100, 0, 0, 0, 0, 0]))
                }
            });
        let mut decoder = TelemetryDecoder::new(source, &config());
        assert_eq!(decoder.read_joint_speeds(), [0.1, 0., 0., 0., 0., 0.]);
        assert_eq!(decoder.exhausted_reads(), 0);
    }

    #[test]
    fn gives_up_after_max_attempts() {
        let mut source = MockRegisterSource::new();
        source
            .expect_read_holding_registers()
            .with(eq(JOINT_SPEEDS_ADDRESS), eq(6))
            .times(10)
            .returning(|_, _| None);
        let mut decoder = TelemetryDecoder::new(source, &config());
        assert_eq!(decoder.read_joint_speeds(), [0.; 6]);
        assert_eq!(decoder.exhausted_reads(), 1);
    }

    #[test]
    fn angle_read_needs_both_blocks() {
        let mut source = MockRegisterSource::new();
        source
            .expect_read_holding_registers()
            .with(eq(JOINT_ANGLES_ADDRESS), eq(6))
            .times(3)
            .returning(|_, _| Some(frame([1000; 6])));
        source
            .expect_read_holding_registers()
            .with(eq(JOINT_ANGLE_SIGNS_ADDRESS), eq(6))
            .times(3)
            .returning(|_, _| None);
        let mut decoder = TelemetryDecoder::new(
            source,
            &TelemetryConfig {
                max_attempts: 3,
                ..config()
            },
        );
        assert_eq!(decoder.read_joint_angles(), [0.; 6]);
        assert_eq!(decoder.exhausted_reads(), 1);
    }

    #[test]
    fn malformed_frame_counts_as_failed_attempt() {
        let mut source = MockRegisterSource::new();
        let mut calls = 0;
        source
            .expect_read_holding_registers()
            .times(2)
            .returning(move |_, _| {
                calls += 1;
                if calls == 1 {
                    Some(vec![0, 1, 0, 0, 0, 3, 0, 0x03, 0])
                } else {
                    Some(frame([0, 0, 0, 0, 0, 2000]))
                }
            });
        let mut decoder = TelemetryDecoder::new(source, &config());
        assert_eq!(decoder.read_joint_speeds()[5], 2.);
    }

    #[test]
    fn tcp_pose_retries_without_limit() {
        let mut source = MockRegisterSource::new();
        let mut calls = 0;
        source
            .expect_read_holding_registers()
            .with(eq(TCP_POSE_ADDRESS), eq(6))
            .times(25)
            .returning(move |_, _| {
                calls += 1;
                if calls < 25 {
                    None
                } else {
                    Some(frame([1234, 65535 - 500, 3000, 1571, 0, 65535 - 3142]))
                }
            });
        let mut decoder = TelemetryDecoder::new(source, &config());
        assert_eq!(
            decoder.read_tcp_pose(),
            TcpPose {
                x: 123.4,
                y: -50.,
                z: 300.,
                rx: 1.571,
                ry: 0.,
                rz: -3.142,
            }
        );
        assert_eq!(decoder.exhausted_reads(), 0);
    }

    #[test]
    fn degrees_through_trait() {
        let mut source = MockRegisterSource::new();
        source
            .expect_read_holding_registers()
            .with(eq(JOINT_ANGLES_ADDRESS), eq(6))
            .returning(|_, _| Some(frame([3142, 0, 0, 0, 0, 0])));
        source
            .expect_read_holding_registers()
            .with(eq(JOINT_ANGLE_SIGNS_ADDRESS), eq(6))
            .returning(|_, _| Some(frame([0; 6])));
        let mut decoder = TelemetryDecoder::new(source, &config());
        let degrees = JointTelemetry::read_joint_angles_degrees(&mut decoder);
        assert_eq!(degrees[0], 180.023);
    }
}
