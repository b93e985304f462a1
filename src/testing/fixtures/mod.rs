//! Test data for cycles, rosters, selections and batches

pub mod builders;

pub use builders::CycleBuilder;

use chrono::{NaiveDate, Utc};

use crate::core::chunking::build_chunks;
use crate::core::eligibility::eligible_winners;
use crate::model::{
    BatchId, BatchOrigin, BatchStatus, BatchChunk, Cycle, CycleId, CycleSelection,
    DisbursementMode, EligibleMember, PayoutBatch, PayoutStatus, SelectionMode, SelectionState,
    Tier, UserId, WinnerId, WinnerRecord,
};
use crate::storage::{UnifiedStorage, WriteGuard};

/// An inactive quarterly cycle
pub fn sample_cycle(id: &str) -> Cycle {
    Cycle {
        id: CycleId::from(id),
        name: format!("Cycle {}", id),
        start_date: NaiveDate::from_ymd_opt(2026, 7, 1).unwrap(),
        end_date: NaiveDate::from_ymd_opt(2026, 9, 30).unwrap(),
        membership_fee: 2_500,
        reward_pool_percentage: 40.0,
        minimum_pool_guarantee: None,
        tier1_threshold: 1_000,
        tier2_threshold: 500,
        is_active: false,
        created_at: Utc::now(),
    }
}

/// `n` tier1 members `u01..` with strictly decreasing points and valid
/// destinations
pub fn roster(n: usize) -> Vec<EligibleMember> {
    (0..n)
        .map(|i| EligibleMember {
            user_id: UserId::new(format!("u{:02}", i + 1)),
            tier: Tier::Tier1,
            points: ((n - i) * 100) as u64,
            destination: Some(format!("u{:02}@example.com", i + 1)),
        })
        .collect()
}

/// Store `id` as the active cycle with a roster of `members` members
pub async fn active_cycle_with_roster(
    storage: &dyn UnifiedStorage,
    id: &str,
    members: usize,
) -> CycleId {
    let cycle = sample_cycle(id);
    let cycles = storage.cycle_storage();
    cycles.save_cycle(&cycle).await.unwrap();
    cycles.activate_cycle(&cycle.id).await.unwrap();
    cycles.save_roster(&cycle.id, roster(members)).await.unwrap();
    cycle.id
}

/// A sealed, never stored selection of `n` payable tier1 winners
pub fn sealed_selection(cycle_id: &str, n: usize) -> CycleSelection {
    let cycle = CycleId::from(cycle_id);
    let now = Utc::now();
    let winners = (0..n)
        .map(|i| WinnerRecord {
            id: WinnerId::new(format!("{}-w{:02}", cycle_id, i + 1)),
            cycle_id: cycle.clone(),
            user_id: UserId::new(format!("u{:02}", i + 1)),
            tier: Tier::Tier1,
            overall_rank: i as u32 + 1,
            tier_rank: i as u32 + 1,
            points_at_selection: ((n - i) * 100) as u64,
            tier_pool_size: 100_000,
            payout_percentage: 10.0,
            payout_override: None,
            payout_final: 10_000,
            payout_status: PayoutStatus::Pending,
            destination: Some(format!("u{:02}@example.com", i + 1)),
            provider_reference: None,
            processed_at: None,
            is_sealed: true,
            sealed_at: Some(now),
            sealed_by: Some("admin".into()),
            saved_at: Some(now),
            saved_by: Some("admin".into()),
            last_modified: now,
        })
        .collect();

    CycleSelection {
        cycle_id: cycle,
        state: SelectionState::Sealed,
        mode: Some(SelectionMode::TopPerformers),
        seed: None,
        winners,
        version: 0,
        audit: Vec::new(),
        updated_at: now,
    }
}

/// Store an active cycle and a sealed selection of `n` winners for it
pub async fn stored_sealed_selection(
    storage: &dyn UnifiedStorage,
    cycle_id: &str,
    n: usize,
) -> CycleSelection {
    active_cycle_with_roster(storage, cycle_id, n).await;
    storage
        .selection_storage()
        .store_selection(sealed_selection(cycle_id, n), WriteGuard::version(0))
        .await
        .unwrap()
}

/// A fresh `created` batch over every eligible winner, two per chunk
pub fn sample_batch(cycle_id: &str, selection: &CycleSelection) -> (PayoutBatch, Vec<BatchChunk>) {
    let id = BatchId::generate();
    let winners: Vec<WinnerRecord> = eligible_winners(selection).into_iter().cloned().collect();
    let chunks = build_chunks(&id, &winners, 2);
    let batch = PayoutBatch {
        id,
        cycle_id: CycleId::from(cycle_id),
        mode: DisbursementMode::All,
        origin: BatchOrigin::Initial,
        currency: "USD".into(),
        total_items: winners.len(),
        chunk_count: chunks.len(),
        chunk_size: 2,
        status: BatchStatus::Created,
        created_at: Utc::now(),
        created_by: "admin".into(),
        started_at: None,
        completed_at: None,
        error: None,
    };
    (batch, chunks)
}
