//! Test data builders for cycles

use chrono::NaiveDate;

use super::sample_cycle;
use crate::model::Cycle;

/// Builder for creating test cycles
pub struct CycleBuilder {
    cycle: Cycle,
}

impl CycleBuilder {
    pub fn new(id: &str) -> Self {
        Self {
            cycle: sample_cycle(id),
        }
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.cycle.name = name.to_string();
        self
    }

    pub fn with_dates(mut self, start: NaiveDate, end: NaiveDate) -> Self {
        self.cycle.start_date = start;
        self.cycle.end_date = end;
        self
    }

    pub fn with_membership_fee(mut self, fee: i64) -> Self {
        self.cycle.membership_fee = fee;
        self
    }

    pub fn with_pool_percentage(mut self, percentage: f64) -> Self {
        self.cycle.reward_pool_percentage = percentage;
        self
    }

    pub fn with_minimum_pool(mut self, floor: i64) -> Self {
        self.cycle.minimum_pool_guarantee = Some(floor);
        self
    }

    pub fn with_thresholds(mut self, tier1: u64, tier2: u64) -> Self {
        self.cycle.tier1_threshold = tier1;
        self.cycle.tier2_threshold = tier2;
        self
    }

    pub fn build(self) -> Cycle {
        self.cycle
    }
}
