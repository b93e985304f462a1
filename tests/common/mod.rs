//! Common test utilities and helpers

#![allow(dead_code)]

use cyclepay::core::seal::SealConfirmation;
use cyclepay::core::selection::{SelectionRequest, TierSettings};
use cyclepay::model::{CycleId, SelectionMode, Tier};
use cyclepay::testing::fixtures::active_cycle_with_roster;
use cyclepay::testing::TestContext;

pub const ADMIN: &str = "admin";

/// Top performers of tier1, each paid `payout_percentage` of `pool`
pub fn top_tier1(count: usize, pool: i64, payout_percentage: f64) -> SelectionRequest {
    SelectionRequest::new(SelectionMode::TopPerformers).with_tier(
        Tier::Tier1,
        TierSettings {
            winner_count: Some(count),
            winner_percentage: None,
            tier_pool_size: pool,
            payout_percentage,
        },
    )
}

/// Active cycle with `winners` roster members, all selected, saved and
/// sealed. Every winner is paid 5% of 1,000,000.
pub async fn sealed_cycle(ctx: &TestContext, id: &str, winners: usize) -> CycleId {
    let cycle = active_cycle_with_roster(ctx.storage.as_ref(), id, winners).await;
    let selection = ctx.engine.selection();
    selection
        .run_selection(&cycle, top_tier1(winners, 1_000_000, 5.0), ADMIN)
        .await
        .unwrap();
    selection.save_selection(&cycle, ADMIN).await.unwrap();
    selection
        .seal(&cycle, SealConfirmation::all(), ADMIN)
        .await
        .unwrap();
    cycle
}
