// Copyright (c) 2021 Marco Boneberger
// Licensed under the EUPL-1.2-or-later

use std::time::Duration;

use clap::Parser;

use ursentry::config::TelemetryConfig;
use ursentry::{JointTelemetry, ModbusTcp, SentryResult, TelemetryDecoder};

/// An example showing how to continuously read the joint state and the TCP pose.
#[derive(Parser, Debug)]
#[clap(author, version, name = "echo_telemetry")]
struct CommandLineArguments {
    /// IP-Address or hostname of the robot
    pub robot_ip: String,
    /// Port of the Modbus server
    #[clap(short, long, default_value_t = 502)]
    pub port: u16,
    /// Number of readings
    #[clap(short, long, default_value_t = 1)]
    pub count: usize,
}

fn main() -> SentryResult<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = CommandLineArguments::parse();
    let modbus = ModbusTcp::new(&args.robot_ip, args.port, 0, Duration::from_secs(1))?;
    let mut telemetry = TelemetryDecoder::new(modbus, &TelemetryConfig::default());
    for _ in 0..args.count {
        let angles = telemetry.read_joint_angles_degrees();
        let speeds = telemetry.read_joint_speeds();
        let pose = telemetry.read_tcp_pose();
        let isometry = pose.to_isometry();
        println!("angles [deg]: {:?}", angles);
        println!("speeds [rad/s]: {:?}", speeds);
        println!(
            "tcp: {:?}, translation [m]: {:?}",
            pose,
            isometry.translation.vector.as_slice()
        );
        std::thread::sleep(Duration::from_millis(200));
    }
    println!(
        "Done. {} reads gave up after all attempts.",
        telemetry.exhausted_reads()
    );
    Ok(())
}
