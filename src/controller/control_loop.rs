// Copyright (c) 2021 Marco Boneberger
// Licensed under the EUPL-1.2-or-later

//! Contains the ursentry::ControlLoop type which ticks the controller at a fixed period, and the
//! slot through which the detection side hands the latest target over.
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use crate::controller::SentryController;
use crate::robot::RobotDriver;
use crate::telemetry::JointTelemetry;
use crate::tracker::types::Target;

/// Holds the most recent target. Writers replace it, readers copy it, so the controller always
/// sees the newest value and never a backlog.
#[derive(Debug, Clone, Default)]
pub struct TargetSlot {
    inner: Arc<Mutex<Option<Target>>>,
}

impl TargetSlot {
    pub fn new() -> Self {
        TargetSlot::default()
    }

    /// Replaces the current target. `None` means nothing is detected.
    pub fn publish(&self, target: Option<Target>) {
        match self.inner.lock() {
            Ok(mut slot) => *slot = target,
            Err(poisoned) => *poisoned.into_inner() = target,
        }
    }

    pub fn latest(&self) -> Option<Target> {
        match self.inner.lock() {
            Ok(slot) => *slot,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }
}

/// Runs a [`SentryController`] until the run flag is cleared.
pub struct ControlLoop<D: RobotDriver, T: JointTelemetry> {
    controller: SentryController<D, T>,
    slot: TargetSlot,
    running: Arc<AtomicBool>,
    period: Duration,
    ticks: u64,
    failed_ticks: u64,
}

impl<D: RobotDriver, T: JointTelemetry> ControlLoop<D, T> {
    /// # Arguments
    /// * `controller` - the state machine to advance
    /// * `slot` - where the latest target is read from on every tick
    /// * `running` - the loop returns after the tick during which this became false
    pub fn new(
        controller: SentryController<D, T>,
        slot: TargetSlot,
        running: Arc<AtomicBool>,
    ) -> Self {
        let period = controller.config().tick_period();
        ControlLoop {
            controller,
            slot,
            running,
            period,
            ticks: 0,
            failed_ticks: 0,
        }
    }

    /// Executes a single tick with the target currently in the slot.
    ///
    /// A failed command is logged and does not end the loop, the controller retries it on the
    /// next tick.
    pub fn step(&mut self, now: Instant) {
        let target = self.slot.latest();
        self.ticks += 1;
        if let Err(error) = self.controller.tick(target, now) {
            self.failed_ticks += 1;
            log::error!("tick {} failed: {}", self.ticks, error);
        }
    }

    /// Ticks the controller every period until the run flag is cleared.
    /// Returns the controller so the caller can stop the robot.
    pub fn run(mut self) -> SentryController<D, T> {
        log::info!("control loop started with a period of {:?}", self.period);
        let mut next_tick = Instant::now();
        while self.running.load(Ordering::SeqCst) {
            let now = Instant::now();
            self.step(now);
            next_tick += self.period;
            let now = Instant::now();
            if next_tick > now {
                thread::sleep(next_tick - now);
            } else {
                log::warn!("tick {} overran its period", self.ticks);
                next_tick = now;
            }
        }
        log::info!(
            "control loop stopped after {} ticks, {} failed",
            self.ticks,
            self.failed_ticks
        );
        self.controller
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn failed_ticks(&self) -> u64 {
        self.failed_ticks
    }

    pub fn controller(&self) -> &SentryController<D, T> {
        &self.controller
    }
}
