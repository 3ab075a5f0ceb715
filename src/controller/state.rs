// Copyright (c) 2021 Marco Boneberger
// Licensed under the EUPL-1.2-or-later

//! Contains the ursentry::ControllerState type.
use std::fmt;
use std::time::Instant;

use crate::utils::JointVector;

/// What the sentry is currently doing.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ControllerMode {
    /// Resting in the sentry pose and waiting for a target.
    Sentry,
    /// Following a target with joint speed commands.
    Tracking,
}

impl fmt::Display for ControllerMode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ControllerMode::Sentry => write!(f, "sentry"),
            ControllerMode::Tracking => write!(f, "tracking"),
        }
    }
}

/// Everything the [`SentryController`](`crate::SentryController`) remembers between ticks.
#[derive(Debug, Clone, PartialEq)]
pub struct ControllerState {
    pub mode: ControllerMode,
    /// False until the first tick commanded the sentry pose.
    pub initialized: bool,
    /// Set after every pose command and while unwinding: no new command is issued
    /// until the robot stood still for a number of consecutive ticks.
    pub await_stop: bool,
    /// Consecutive ticks with all joint speeds at zero.
    pub await_stop_ticks: u32,
    /// The base went past the travel limit, rotate it back to zero once the robot stopped.
    pub pending_unwind: bool,
    /// A target was followed since the last transition to sentry mode or the last unwind.
    pub has_detected_once: bool,
    /// Consecutive ticks without a target while tracking.
    pub none_input_ticks: u32,
    /// Joint speeds of the last speed command. \[rad/s\]
    pub commanded_speeds: JointVector,
    /// When the pending smooth stop fires. At most one is pending.
    pub smooth_stop_deadline: Option<Instant>,
}

impl Default for ControllerState {
    fn default() -> Self {
        ControllerState {
            mode: ControllerMode::Sentry,
            initialized: false,
            await_stop: false,
            await_stop_ticks: 0,
            pending_unwind: false,
            has_detected_once: false,
            none_input_ticks: 0,
            commanded_speeds: [0.; 6],
            smooth_stop_deadline: None,
        }
    }
}

impl ControllerState {
    /// State right after the sentry pose has been commanded.
    pub fn entering_sentry() -> Self {
        ControllerState {
            initialized: true,
            await_stop: true,
            ..ControllerState::default()
        }
    }

    /// Arms the await-stop gate, forgetting any progress towards clearing it.
    pub fn arm_await_stop(&mut self) {
        self.await_stop = true;
        self.await_stop_ticks = 0;
    }

    /// Replaces the pending smooth stop, if any.
    pub fn schedule_smooth_stop(&mut self, deadline: Instant) {
        self.smooth_stop_deadline = Some(deadline);
    }

    pub fn cancel_smooth_stop(&mut self) {
        self.smooth_stop_deadline = None;
    }

    /// True if a smooth stop is pending and its deadline passed at `now`.
    /// It stays pending until the stop command replaced or cancelled it.
    pub fn smooth_stop_due(&self, now: Instant) -> bool {
        matches!(self.smooth_stop_deadline, Some(deadline) if deadline <= now)
    }
}

#[cfg(test)]
mod tests {
    use crate::controller::state::{ControllerMode, ControllerState};
    use std::time::{Duration, Instant};

    #[test]
    fn only_one_smooth_stop_is_pending() {
        let mut state = ControllerState::default();
        let now = Instant::now();
        state.schedule_smooth_stop(now + Duration::from_millis(400));
        state.schedule_smooth_stop(now + Duration::from_millis(800));
        assert!(!state.smooth_stop_due(now + Duration::from_millis(500)));
        assert!(state.smooth_stop_due(now + Duration::from_millis(800)));
        // stays due until it is cancelled
        assert!(state.smooth_stop_due(now + Duration::from_secs(10)));
        state.cancel_smooth_stop();
        assert!(!state.smooth_stop_due(now + Duration::from_secs(10)));
    }

    #[test]
    fn entering_sentry() {
        let state = ControllerState::entering_sentry();
        assert_eq!(state.mode, ControllerMode::Sentry);
        assert!(state.initialized && state.await_stop);
        assert!(!state.pending_unwind && !state.has_detected_once);
        assert_eq!(ControllerMode::Tracking.to_string(), "tracking");
    }
}
