// Copyright (c) 2021 Marco Boneberger
// Licensed under the EUPL-1.2-or-later

//! Contains the ursentry::DetectionIngest type which feeds detection batches through the
//! [`Tracker`](`crate::Tracker`) and publishes the resulting target.
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::config::TrackerConfig;
use crate::controller::control_loop::TargetSlot;
use crate::tracker::types::BoundingBox;
use crate::tracker::Tracker;

/// Receives batches of bounding boxes and keeps the [`TargetSlot`] up to date.
///
/// If no batch arrives within the poll interval, an empty batch is processed so that boxes
/// which are no longer reported expire even while the camera is silent.
pub struct DetectionIngest {
    tracker: Tracker,
    batches: Receiver<Vec<BoundingBox>>,
    slot: TargetSlot,
    running: Arc<AtomicBool>,
    poll_interval: Duration,
}

impl DetectionIngest {
    pub fn new(
        config: &TrackerConfig,
        batches: Receiver<Vec<BoundingBox>>,
        slot: TargetSlot,
        running: Arc<AtomicBool>,
    ) -> Self {
        DetectionIngest {
            tracker: Tracker::new(config),
            batches,
            slot,
            running,
            poll_interval: config.poll_interval(),
        }
    }

    /// Waits for the next batch and publishes the new target.
    /// # Return
    /// false once the sending side hung up.
    pub fn poll(&mut self) -> bool {
        let batch = match self.batches.recv_timeout(self.poll_interval) {
            Ok(batch) => batch,
            Err(RecvTimeoutError::Timeout) => Vec::new(),
            Err(RecvTimeoutError::Disconnected) => return false,
        };
        let target = self.tracker.process(&batch, Instant::now());
        log::trace!("{} detections, target {:?}", batch.len(), target);
        self.slot.publish(target);
        true
    }

    /// Polls until the run flag is cleared or the sender is dropped.
    /// The slot is cleared before returning.
    pub fn run(mut self) {
        while self.running.load(Ordering::SeqCst) {
            if !self.poll() {
                log::info!("detection source closed");
                break;
            }
        }
        self.slot.publish(None);
    }

    /// Runs the ingestion on its own thread.
    pub fn spawn(self) -> JoinHandle<()> {
        thread::spawn(move || self.run())
    }

    pub fn tracker(&self) -> &Tracker {
        &self.tracker
    }
}
