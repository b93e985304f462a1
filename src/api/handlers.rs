//! Route handlers

use axum::extract::{Path, State};
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::info;

use super::{ok, Actor, ApiJson, ApiResult};
use crate::app::PayoutEngine;
use crate::core::seal::SealConfirmation;
use crate::core::selection::{SelectionRequest, TierSettings};
use crate::cycles::RewardPool;
use crate::disbursement::{BatchStatusSource, CreateBatchResult, EligibleCount, RetryResult};
use crate::error::PayoutError;
use crate::model::{
    BatchId, BatchStatusView, BatchSummary, Cycle, CycleId, CycleSelection, DisbursementMode,
    EligibleMember, PayoutBatch, Tier, UserId, WinnerId, WinnerRecord,
};
use crate::selection::{RunSelectionResult, SaveResult, SealResult, UnsealResult};
use crate::storage::HealthStatus;

#[derive(Debug, Deserialize)]
pub(super) struct CreateCycleRequest {
    id: CycleId,
    name: String,
    start_date: NaiveDate,
    end_date: NaiveDate,
    membership_fee: i64,
    reward_pool_percentage: f64,
    #[serde(default)]
    minimum_pool_guarantee: Option<i64>,
    tier1_threshold: u64,
    tier2_threshold: u64,
}

impl From<CreateCycleRequest> for Cycle {
    fn from(req: CreateCycleRequest) -> Self {
        Cycle {
            id: req.id,
            name: req.name,
            start_date: req.start_date,
            end_date: req.end_date,
            membership_fee: req.membership_fee,
            reward_pool_percentage: req.reward_pool_percentage,
            minimum_pool_guarantee: req.minimum_pool_guarantee,
            tier1_threshold: req.tier1_threshold,
            tier2_threshold: req.tier2_threshold,
            is_active: false,
            created_at: Utc::now(),
        }
    }
}

/// Body of a selection run; `mode` is parsed so an unknown name is
/// reported as an invalid mode rather than a malformed body
#[derive(Debug, Deserialize)]
pub(super) struct RunSelectionRequest {
    mode: String,
    #[serde(default)]
    tiers: BTreeMap<Tier, TierSettings>,
    #[serde(default)]
    custom_ids: Vec<UserId>,
    #[serde(default)]
    seed: Option<u64>,
}

impl TryFrom<RunSelectionRequest> for SelectionRequest {
    type Error = PayoutError;

    fn try_from(req: RunSelectionRequest) -> Result<Self, Self::Error> {
        Ok(SelectionRequest {
            mode: req.mode.trim().parse()?,
            tiers: req.tiers,
            custom_ids: req.custom_ids,
            seed: req.seed,
        })
    }
}

#[derive(Debug, Serialize)]
pub(super) struct ImportResult {
    imported: usize,
}

#[derive(Debug, Deserialize)]
pub(super) struct OverrideRequest {
    /// `null` clears the override
    payout_override: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub(super) struct TierSettingsRequest {
    tier_pool_size: i64,
    payout_percentage: f64,
}

#[derive(Debug, Serialize)]
pub(super) struct Cleared {
    cleared: bool,
}

pub(super) async fn health_check(State(engine): State<PayoutEngine>) -> ApiResult<HealthStatus> {
    let status = engine
        .storage()
        .health_check()
        .await
        .map_err(PayoutError::from)?;
    ok(status)
}

// Cycles

pub(super) async fn list_cycles(State(engine): State<PayoutEngine>) -> ApiResult<Vec<Cycle>> {
    ok(engine.cycles().list_cycles().await?)
}

pub(super) async fn active_cycle(State(engine): State<PayoutEngine>) -> ApiResult<Option<Cycle>> {
    ok(engine.cycles().active_cycle().await?)
}

pub(super) async fn create_cycle(
    State(engine): State<PayoutEngine>,
    Actor(actor): Actor,
    ApiJson(req): ApiJson<CreateCycleRequest>,
) -> ApiResult<Cycle> {
    let cycle = engine.cycles().create_cycle(req.into()).await?;
    info!("Cycle {} created by {}", cycle.id, actor);
    ok(cycle)
}

pub(super) async fn get_cycle(
    State(engine): State<PayoutEngine>,
    Path(id): Path<CycleId>,
) -> ApiResult<Cycle> {
    ok(engine.cycles().get_cycle(&id).await?)
}

pub(super) async fn activate_cycle(
    State(engine): State<PayoutEngine>,
    Actor(actor): Actor,
    Path(id): Path<CycleId>,
) -> ApiResult<Cycle> {
    let cycle = engine.cycles().activate_cycle(&id).await?;
    info!("Cycle {} activated by {}", id, actor);
    ok(cycle)
}

pub(super) async fn import_roster(
    State(engine): State<PayoutEngine>,
    Actor(actor): Actor,
    Path(id): Path<CycleId>,
    ApiJson(members): ApiJson<Vec<EligibleMember>>,
) -> ApiResult<ImportResult> {
    let imported = engine.cycles().import_roster(&id, members).await?;
    info!("Roster of cycle {} replaced by {}", id, actor);
    ok(ImportResult { imported })
}

pub(super) async fn reward_pool(
    State(engine): State<PayoutEngine>,
    Path(id): Path<CycleId>,
) -> ApiResult<RewardPool> {
    ok(engine.cycles().reward_pool(&id).await?)
}

// Selection

pub(super) async fn get_selection(
    State(engine): State<PayoutEngine>,
    Path(id): Path<CycleId>,
) -> ApiResult<CycleSelection> {
    ok(engine.selection().get_selection(&id).await?)
}

pub(super) async fn run_selection(
    State(engine): State<PayoutEngine>,
    Actor(actor): Actor,
    Path(id): Path<CycleId>,
    ApiJson(request): ApiJson<RunSelectionRequest>,
) -> ApiResult<RunSelectionResult> {
    let request = SelectionRequest::try_from(request)?;
    ok(engine.selection().run_selection(&id, request, &actor).await?)
}

pub(super) async fn save_selection(
    State(engine): State<PayoutEngine>,
    Actor(actor): Actor,
    Path(id): Path<CycleId>,
) -> ApiResult<SaveResult> {
    ok(engine.selection().save_selection(&id, &actor).await?)
}

pub(super) async fn clear_selection(
    State(engine): State<PayoutEngine>,
    Actor(actor): Actor,
    Path(id): Path<CycleId>,
) -> ApiResult<Cleared> {
    engine.selection().clear_selection(&id, &actor).await?;
    ok(Cleared { cleared: true })
}

pub(super) async fn seal_selection(
    State(engine): State<PayoutEngine>,
    Actor(actor): Actor,
    Path(id): Path<CycleId>,
    ApiJson(confirmation): ApiJson<SealConfirmation>,
) -> ApiResult<SealResult> {
    ok(engine.selection().seal(&id, confirmation, &actor).await?)
}

pub(super) async fn unseal_selection(
    State(engine): State<PayoutEngine>,
    Actor(actor): Actor,
    Path(id): Path<CycleId>,
) -> ApiResult<UnsealResult> {
    ok(engine.selection().unseal(&id, &actor).await?)
}

pub(super) async fn update_override(
    State(engine): State<PayoutEngine>,
    Actor(actor): Actor,
    Path((id, winner_id)): Path<(CycleId, WinnerId)>,
    ApiJson(req): ApiJson<OverrideRequest>,
) -> ApiResult<WinnerRecord> {
    ok(engine
        .selection()
        .update_override(&id, &winner_id, req.payout_override, &actor)
        .await?)
}

pub(super) async fn update_tier_settings(
    State(engine): State<PayoutEngine>,
    Actor(actor): Actor,
    Path((id, tier)): Path<(CycleId, String)>,
    ApiJson(req): ApiJson<TierSettingsRequest>,
) -> ApiResult<Vec<WinnerRecord>> {
    let tier: Tier = tier.parse()?;
    ok(engine
        .selection()
        .update_tier_settings(&id, tier, req.tier_pool_size, req.payout_percentage, &actor)
        .await?)
}

pub(super) async fn remove_winner(
    State(engine): State<PayoutEngine>,
    Actor(actor): Actor,
    Path((id, winner_id)): Path<(CycleId, WinnerId)>,
) -> ApiResult<WinnerRecord> {
    ok(engine.selection().remove_winner(&id, &winner_id, &actor).await?)
}

// Disbursement

pub(super) async fn eligible_count(
    State(engine): State<PayoutEngine>,
    Path(id): Path<CycleId>,
) -> ApiResult<EligibleCount> {
    ok(engine.disbursement().get_eligible_count(&id).await?)
}

/// Create a batch and start its worker; progress is read through the
/// status routes
pub(super) async fn create_batch(
    State(engine): State<PayoutEngine>,
    Actor(actor): Actor,
    Path(id): Path<CycleId>,
    ApiJson(mode): ApiJson<DisbursementMode>,
) -> ApiResult<CreateBatchResult> {
    let disbursement = engine.disbursement();
    let created = disbursement.create_batch(&id, mode, &actor).await?;
    disbursement.start_batch(&created.batch_id);
    ok(created)
}

pub(super) async fn list_batches(
    State(engine): State<PayoutEngine>,
    Path(id): Path<CycleId>,
) -> ApiResult<Vec<PayoutBatch>> {
    ok(engine.disbursement().list_batches(&id).await?)
}

pub(super) async fn active_batch(
    State(engine): State<PayoutEngine>,
    Path(id): Path<CycleId>,
) -> ApiResult<Option<BatchStatusView>> {
    ok(engine.disbursement().get_active_batch(&id).await?)
}

pub(super) async fn latest_batch(
    State(engine): State<PayoutEngine>,
    Path(id): Path<CycleId>,
) -> ApiResult<Option<BatchStatusView>> {
    ok(engine.disbursement().latest_batch(&id).await?)
}

pub(super) async fn batch_status(
    State(engine): State<PayoutEngine>,
    Path(id): Path<BatchId>,
) -> ApiResult<BatchStatusView> {
    ok(engine.disbursement().get_batch_status(&id).await?)
}

pub(super) async fn batch_summary(
    State(engine): State<PayoutEngine>,
    Path(id): Path<BatchId>,
) -> ApiResult<BatchSummary> {
    ok(engine.disbursement().get_batch_summary(&id).await?)
}

pub(super) async fn retry_failed(
    State(engine): State<PayoutEngine>,
    Actor(actor): Actor,
    Path(id): Path<BatchId>,
) -> ApiResult<RetryResult> {
    let disbursement = engine.disbursement();
    let retry = disbursement.retry_failed(&id, &actor).await?;
    disbursement.start_batch(&retry.batch_id);
    ok(retry)
}
