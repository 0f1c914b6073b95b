//! Hysteresis gate over consecutive round outcomes.
//!
//! A round with any failure bumps the failure streak and clears the
//! success streak, and vice versa. A round is emitted only once its streak
//! has reached the configured threshold; streaks are not reset on
//! emission, so a sustained outcome keeps emitting every round.

use tracing::{debug, info, warn};

use crate::status::Status;

/// Externally visible health, as last emitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Health {
    /// Nothing emitted yet.
    Unknown,
    Healthy,
    Unhealthy,
}

/// Consecutive success/failure counters with their thresholds.
#[derive(Debug)]
pub struct Hysteresis {
    health: Health,
    consecutive_successes: u32,
    consecutive_failures: u32,
    success_threshold: u32,
    failure_threshold: u32,
}

impl Hysteresis {
    /// Thresholds below one are raised to one.
    pub fn new(success_threshold: u32, failure_threshold: u32) -> Self {
        Self {
            health: Health::Unknown,
            consecutive_successes: 0,
            consecutive_failures: 0,
            success_threshold: success_threshold.max(1),
            failure_threshold: failure_threshold.max(1),
        }
    }

    /// Feed one round's status; returns whether it should be emitted.
    pub fn observe(&mut self, status: &Status) -> bool {
        self.record(status.is_healthy())
    }

    /// Record one round outcome; returns whether it should be emitted.
    pub fn record(&mut self, healthy: bool) -> bool {
        if healthy {
            self.consecutive_failures = 0;
            self.consecutive_successes = self.consecutive_successes.saturating_add(1);

            if self.consecutive_successes < self.success_threshold {
                return false;
            }
            if self.health != Health::Healthy {
                info!(
                    successes = self.consecutive_successes,
                    threshold = self.success_threshold,
                    "status healthy"
                );
            }
            self.health = Health::Healthy;
        } else {
            self.consecutive_successes = 0;
            self.consecutive_failures = self.consecutive_failures.saturating_add(1);

            if self.consecutive_failures < self.failure_threshold {
                debug!(
                    failures = self.consecutive_failures,
                    threshold = self.failure_threshold,
                    "failure below threshold, not reported"
                );
                return false;
            }
            if self.health != Health::Unhealthy {
                warn!(
                    failures = self.consecutive_failures,
                    threshold = self.failure_threshold,
                    "status unhealthy"
                );
            }
            self.health = Health::Unhealthy;
        }

        true
    }

    pub fn health(&self) -> Health {
        self.health
    }

    pub fn consecutive_successes(&self) -> u32 {
        self.consecutive_successes
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }
}
