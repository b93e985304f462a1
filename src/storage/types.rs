//! Shared types for storage queries and health reporting

use serde::{Deserialize, Serialize};

use crate::model::{BatchStatus, CycleId, WinnerId};

/// Filter for batch listing
#[derive(Debug, Clone, Default)]
pub struct BatchFilter {
    pub cycle_id: Option<CycleId>,
    pub status: Option<BatchStatus>,
    /// Only batches that have not reached a terminal status
    pub non_terminal_only: bool,
    pub limit: Option<usize>,
}

impl BatchFilter {
    pub fn for_cycle(cycle_id: CycleId) -> Self {
        Self {
            cycle_id: Some(cycle_id),
            ..Default::default()
        }
    }

    pub fn in_flight() -> Self {
        Self {
            non_terminal_only: true,
            ..Default::default()
        }
    }
}

/// Successful payout to record against a winner row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaidWinner {
    pub winner_id: WinnerId,
    pub reference: String,
}

/// Conditions checked atomically with a selection write
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteGuard {
    /// Version the caller read; a selection that was never stored is version 0
    pub expected_version: u64,
    /// Reject the write while the cycle has a non-terminal batch
    pub require_idle: bool,
}

impl WriteGuard {
    pub fn version(expected: u64) -> Self {
        Self {
            expected_version: expected,
            require_idle: false,
        }
    }

    pub fn idle(mut self) -> Self {
        self.require_idle = true;
        self
    }
}

/// Health check status
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatus {
    pub healthy: bool,
    pub backend_type: String,
    pub latency_ms: u64,
    pub errors: Vec<String>,
}
