// Copyright (c) 2021 Marco Boneberger
// Licensed under the EUPL-1.2-or-later

use std::io::BufRead;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{channel, Sender};
use std::sync::Arc;
use std::thread;

use clap::Parser;

use ursentry::{
    BoundingBox, ControlLoop, DetectionIngest, ModbusTcp, RobotDriver, SentryConfig,
    SentryController, SentryResult, TargetSlot, TelemetryDecoder, UrScriptDriver,
};

/// Runs the sentry. Detections are read from standard input, one JSON array of
/// `[x, y, width, height]` boxes per line and frame, e.g. `[[400, 300, 120, 250]]`.
#[derive(Parser, Debug)]
#[clap(author, version, name = "sentry")]
struct CommandLineArguments {
    /// IP-Address or hostname of the robot, overrides the configuration file
    pub robot_ip: Option<String>,
    /// TOML configuration file
    #[clap(short, long)]
    pub config: Option<PathBuf>,
}

fn main() -> SentryResult<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = CommandLineArguments::parse();
    let mut config = match &args.config {
        Some(path) => SentryConfig::load(path)?,
        None => SentryConfig::default(),
    };
    if let Some(robot_ip) = args.robot_ip {
        config.network.robot_address = robot_ip;
    }
    let network = &config.network;
    log::info!("connecting to {}", network.robot_address);

    let modbus = ModbusTcp::new(
        &network.robot_address,
        network.modbus_port,
        network.modbus_unit_id,
        network.timeout(),
    )?;
    let telemetry = TelemetryDecoder::new(modbus, &config.telemetry);
    let driver = UrScriptDriver::new(&network.robot_address, network.script_port, network.timeout())?;
    let controller = SentryController::new(driver, telemetry, config.controller.clone());

    let running = Arc::new(AtomicBool::new(true));
    let handler_flag = running.clone();
    if let Err(e) = ctrlc::set_handler(move || handler_flag.store(false, Ordering::SeqCst)) {
        log::warn!("cannot install the Ctrl-C handler: {}", e);
    }

    let slot = TargetSlot::new();
    let (sender, receiver) = channel();
    let ingest = DetectionIngest::new(&config.tracker, receiver, slot.clone(), running.clone());
    let ingest = ingest.spawn();
    thread::spawn(move || read_detections(sender));

    let mut controller = ControlLoop::new(controller, slot, running.clone()).run();
    running.store(false, Ordering::SeqCst);
    if ingest.join().is_err() {
        log::error!("detection thread panicked");
    }

    log::info!("stopping the robot");
    let controller_config = controller.config().clone();
    controller.driver_mut().set_joint_speeds(
        &[0.; 6],
        controller_config.acceleration,
        controller_config.speed_timeout,
    )
}

fn read_detections(sender: Sender<Vec<BoundingBox>>) {
    let stdin = std::io::stdin();
    for line in stdin.lock().lines() {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                log::error!("cannot read detections: {}", e);
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<Vec<BoundingBox>>(&line) {
            Ok(batch) => {
                if sender.send(batch).is_err() {
                    break;
                }
            }
            Err(e) => log::warn!("ignoring malformed detections {:?}: {}", line, e),
        }
    }
}
