//! Domain records shared by the selection and disbursement layers
//!
//! Everything in this module is plain serializable data. The rules that govern
//! how these records may change live in `core` (pure) and in the services that
//! persist them.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::PayoutError;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self(id.to_string())
            }
        }

        impl From<String> for $name {
            fn from(id: String) -> Self {
                Self(id)
            }
        }
    };
}

string_id!(
    /// Identifier of a reward cycle
    CycleId
);
string_id!(
    /// Identifier of a program member
    UserId
);
string_id!(
    /// Identifier of a single winner row
    WinnerId
);
string_id!(
    /// Identifier of a disbursement batch
    BatchId
);

impl WinnerId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl BatchId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

/// Performance bracket. Tier1 is the highest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Tier1,
    Tier2,
    Tier3,
}

impl Tier {
    /// Fixed order used for overall ranking
    pub const ALL: [Tier; 3] = [Tier::Tier1, Tier::Tier2, Tier::Tier3];

    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Tier1 => "tier1",
            Tier::Tier2 => "tier2",
            Tier::Tier3 => "tier3",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Tier {
    type Err = PayoutError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "tier1" | "1" => Ok(Tier::Tier1),
            "tier2" | "2" => Ok(Tier::Tier2),
            "tier3" | "3" => Ok(Tier::Tier3),
            other => Err(PayoutError::InvalidRequest(format!("unknown tier '{}'", other))),
        }
    }
}

/// A bounded reward period
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cycle {
    pub id: CycleId,
    pub name: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    /// Membership fee in minor currency units
    pub membership_fee: i64,
    /// Share of collected fees that funds the reward pool, in percent
    pub reward_pool_percentage: f64,
    /// Floor for the reward pool in minor currency units
    #[serde(default)]
    pub minimum_pool_guarantee: Option<i64>,
    /// Points needed to reach tier1
    pub tier1_threshold: u64,
    /// Points needed to reach tier2
    pub tier2_threshold: u64,
    #[serde(default)]
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl Cycle {
    /// Check the configuration-level invariants of a cycle
    pub fn validate(&self) -> Result<(), PayoutError> {
        if self.id.as_str().trim().is_empty() {
            return Err(PayoutError::InvalidCycle("cycle id must not be empty".into()));
        }
        if self.end_date < self.start_date {
            return Err(PayoutError::InvalidCycle(format!(
                "cycle {} ends ({}) before it starts ({})",
                self.id, self.end_date, self.start_date
            )));
        }
        if self.tier1_threshold < self.tier2_threshold {
            return Err(PayoutError::InvalidCycle(format!(
                "tier1 threshold {} is below tier2 threshold {}",
                self.tier1_threshold, self.tier2_threshold
            )));
        }
        crate::core::payout::percentage_to_micros(self.reward_pool_percentage)?;
        if self.membership_fee < 0 {
            return Err(PayoutError::InvalidAmount {
                field: "membership_fee".into(),
                value: self.membership_fee,
            });
        }
        if let Some(floor) = self.minimum_pool_guarantee {
            if floor < 0 {
                return Err(PayoutError::InvalidAmount {
                    field: "minimum_pool_guarantee".into(),
                    value: floor,
                });
            }
        }
        Ok(())
    }
}

/// A member as reported by the accrual service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EligibleMember {
    pub user_id: UserId,
    pub tier: Tier,
    pub points: u64,
    /// Payout destination (PayPal email)
    #[serde(default)]
    pub destination: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayoutStatus {
    Pending,
    Processed,
    Removed,
}

/// One selected member for one cycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WinnerRecord {
    pub id: WinnerId,
    pub cycle_id: CycleId,
    pub user_id: UserId,
    pub tier: Tier,
    pub overall_rank: u32,
    pub tier_rank: u32,
    pub points_at_selection: u64,
    /// Tier pool size in minor currency units
    pub tier_pool_size: i64,
    /// Percent of the tier pool paid to this winner
    pub payout_percentage: f64,
    pub payout_override: Option<i64>,
    pub payout_final: i64,
    pub payout_status: PayoutStatus,
    pub destination: Option<String>,
    #[serde(default)]
    pub provider_reference: Option<String>,
    #[serde(default)]
    pub processed_at: Option<DateTime<Utc>>,
    pub is_sealed: bool,
    pub sealed_at: Option<DateTime<Utc>>,
    pub sealed_by: Option<String>,
    pub saved_at: Option<DateTime<Utc>>,
    pub saved_by: Option<String>,
    pub last_modified: DateTime<Utc>,
}

impl WinnerRecord {
    /// Formula amount before any override
    pub fn payout_calculated(&self) -> Result<i64, PayoutError> {
        crate::core::payout::payout_calculated(self.tier_pool_size, self.payout_percentage)
    }

    /// Recompute `payout_final` after an edit to pool, percentage or override
    pub fn refresh_payout(&mut self) -> Result<(), PayoutError> {
        let amounts = crate::core::payout::resolve_payout(
            self.tier_pool_size,
            self.payout_percentage,
            self.payout_override,
        )?;
        self.payout_final = amounts.final_amount;
        Ok(())
    }

    /// A winner can be paid when it has a destination, a positive amount and
    /// has been neither processed nor removed
    pub fn is_disbursable(&self) -> bool {
        self.payout_status == PayoutStatus::Pending
            && self
                .destination
                .as_deref()
                .map(|d| !d.trim().is_empty())
                .unwrap_or(false)
            && self.payout_final > 0
    }
}

/// Lifecycle of a cycle's winner set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionState {
    /// No winners
    Empty,
    /// Generated, not yet saved
    Draft,
    /// Persisted, still editable
    Saved,
    /// Locked; the only state disbursement is always allowed from
    Sealed,
    /// Reopened after a seal; editable again
    Unsealed,
}

impl fmt::Display for SelectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SelectionState::Empty => "empty",
            SelectionState::Draft => "draft",
            SelectionState::Saved => "saved",
            SelectionState::Sealed => "sealed",
            SelectionState::Unsealed => "unsealed",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionMode {
    WeightedRandom,
    TopPerformers,
    Random,
    Manual,
}

impl SelectionMode {
    /// Whether the mode draws from a random source
    pub fn is_random(&self) -> bool {
        matches!(self, SelectionMode::WeightedRandom | SelectionMode::Random)
    }
}

impl FromStr for SelectionMode {
    type Err = PayoutError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "weighted_random" => Ok(SelectionMode::WeightedRandom),
            "top_performers" => Ok(SelectionMode::TopPerformers),
            "random" => Ok(SelectionMode::Random),
            "manual" => Ok(SelectionMode::Manual),
            other => Err(PayoutError::InvalidMode(other.to_string())),
        }
    }
}

impl fmt::Display for SelectionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SelectionMode::WeightedRandom => "weighted_random",
            SelectionMode::TopPerformers => "top_performers",
            SelectionMode::Random => "random",
            SelectionMode::Manual => "manual",
        };
        f.write_str(name)
    }
}

/// What happened to a selection, kept across clears and unseals
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum AuditAction {
    Generated { mode: SelectionMode, winners: usize, seed: Option<u64> },
    Saved { winners: usize },
    Sealed,
    Unsealed,
    Cleared,
    OverrideChanged { winner_id: WinnerId, from: Option<i64>, to: Option<i64> },
    TierSettingsChanged { tier: Tier, tier_pool_size: i64, payout_percentage: f64 },
    WinnerRemoved { winner_id: WinnerId },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectionAuditEntry {
    pub at: DateTime<Utc>,
    pub actor: String,
    #[serde(flatten)]
    pub action: AuditAction,
}

/// The winner set of one cycle together with its lifecycle state.
///
/// `version` increases on every write and is the compare-and-swap token used
/// to serialize edits, seal and unseal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CycleSelection {
    pub cycle_id: CycleId,
    pub state: SelectionState,
    pub mode: Option<SelectionMode>,
    pub seed: Option<u64>,
    pub winners: Vec<WinnerRecord>,
    pub version: u64,
    pub audit: Vec<SelectionAuditEntry>,
    pub updated_at: DateTime<Utc>,
}

impl CycleSelection {
    pub fn empty(cycle_id: CycleId) -> Self {
        Self {
            cycle_id,
            state: SelectionState::Empty,
            mode: None,
            seed: None,
            winners: Vec::new(),
            version: 0,
            audit: Vec::new(),
            updated_at: Utc::now(),
        }
    }

    /// Winners that have not been removed
    pub fn live_winners(&self) -> impl Iterator<Item = &WinnerRecord> {
        self.winners
            .iter()
            .filter(|w| w.payout_status != PayoutStatus::Removed)
    }

    pub fn processed_count(&self) -> usize {
        self.winners
            .iter()
            .filter(|w| w.payout_status == PayoutStatus::Processed)
            .count()
    }

    pub fn winner(&self, id: &WinnerId) -> Option<&WinnerRecord> {
        self.winners.iter().find(|w| &w.id == id)
    }

    pub fn winner_mut(&mut self, id: &WinnerId) -> Option<&mut WinnerRecord> {
        self.winners.iter_mut().find(|w| &w.id == id)
    }

    pub fn record(&mut self, actor: &str, action: AuditAction) {
        let now = Utc::now();
        self.audit.push(SelectionAuditEntry {
            at: now,
            actor: actor.to_string(),
            action,
        });
        self.updated_at = now;
    }
}

/// Which winners a batch targets
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", content = "winner_ids", rename_all = "snake_case")]
pub enum DisbursementMode {
    All,
    Selected(Vec<WinnerId>),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "batch_id", rename_all = "snake_case")]
pub enum BatchOrigin {
    Initial,
    RetryOf(BatchId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    Created,
    Processing,
    Completed,
    Failed,
}

impl BatchStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, BatchStatus::Completed | BatchStatus::Failed)
    }

    /// Transitions only ever move forward
    pub fn can_transition_to(&self, next: BatchStatus) -> bool {
        matches!(
            (self, next),
            (BatchStatus::Created, BatchStatus::Processing)
                | (BatchStatus::Created, BatchStatus::Failed)
                | (BatchStatus::Processing, BatchStatus::Completed)
                | (BatchStatus::Processing, BatchStatus::Failed)
        )
    }
}

impl fmt::Display for BatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BatchStatus::Created => "created",
            BatchStatus::Processing => "processing",
            BatchStatus::Completed => "completed",
            BatchStatus::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// A unit of disbursement work
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PayoutBatch {
    pub id: BatchId,
    pub cycle_id: CycleId,
    pub mode: DisbursementMode,
    pub origin: BatchOrigin,
    pub currency: String,
    pub total_items: usize,
    pub chunk_count: usize,
    pub chunk_size: usize,
    pub status: BatchStatus,
    pub created_at: DateTime<Utc>,
    pub created_by: String,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkStatus {
    Pending,
    /// Handed to the provider; outcome not yet recorded
    Submitting,
    Completed,
    Failed,
}

impl ChunkStatus {
    pub fn is_finished(&self) -> bool {
        matches!(self, ChunkStatus::Completed | ChunkStatus::Failed)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ItemOutcome {
    Pending,
    Success { reference: String },
    Failed { error: String },
}

impl ItemOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, ItemOutcome::Success { .. })
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, ItemOutcome::Failed { .. })
    }
}

/// One payout inside a chunk
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchItem {
    pub winner_id: WinnerId,
    pub user_id: UserId,
    pub destination: String,
    pub amount: i64,
    /// Stable key the provider uses to de-duplicate resubmissions
    pub idempotency_key: String,
    pub outcome: ItemOutcome,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchChunk {
    pub batch_id: BatchId,
    pub index: usize,
    pub items: Vec<BatchItem>,
    pub status: ChunkStatus,
    pub attempts: u32,
    pub last_error: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl BatchChunk {
    pub fn pending_items(&self) -> impl Iterator<Item = &BatchItem> {
        self.items
            .iter()
            .filter(|i| matches!(i.outcome, ItemOutcome::Pending))
    }

    pub fn succeeded(&self) -> usize {
        self.items.iter().filter(|i| i.outcome.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.items.iter().filter(|i| i.outcome.is_failed()).count()
    }
}

/// Status projection returned to pollers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchStatusView {
    pub batch_id: BatchId,
    pub cycle_id: CycleId,
    pub status: BatchStatus,
    pub total_chunks: usize,
    pub completed_chunks: usize,
    pub processed_items: usize,
    pub failed_items: usize,
    pub total_items: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl BatchStatusView {
    pub fn from_parts(batch: &PayoutBatch, chunks: &[BatchChunk]) -> Self {
        Self {
            batch_id: batch.id.clone(),
            cycle_id: batch.cycle_id.clone(),
            status: batch.status,
            total_chunks: batch.chunk_count,
            completed_chunks: chunks.iter().filter(|c| c.status.is_finished()).count(),
            processed_items: chunks.iter().map(BatchChunk::succeeded).sum(),
            failed_items: chunks.iter().map(BatchChunk::failed).sum(),
            total_items: batch.total_items,
            error: batch.error.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailedItemView {
    pub winner_id: WinnerId,
    pub user_id: UserId,
    pub destination: String,
    pub amount: i64,
    pub error: String,
}

/// One-time report for a finished batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub batch_id: BatchId,
    pub cycle_id: CycleId,
    pub status: BatchStatus,
    pub currency: String,
    pub processed_count: usize,
    pub failed_count: usize,
    /// Sum paid out, minor units
    pub total_amount: i64,
    pub failed_amount: i64,
    pub completed_at: Option<DateTime<Utc>>,
    pub failures: Vec<FailedItemView>,
}
