//! Cycle configuration and member rosters

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::info;

use crate::core::payout;
use crate::error::{PayoutError, PayoutResult};
use crate::model::{Cycle, CycleId, EligibleMember};
use crate::storage::UnifiedStorage;

/// Reward pool of a cycle derived from its roster
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardPool {
    pub cycle_id: CycleId,
    pub paying_members: u64,
    /// Minor units
    pub reward_pool: i64,
    pub guarantee_applied: bool,
}

pub struct CycleService {
    storage: Arc<dyn UnifiedStorage>,
}

impl CycleService {
    pub fn new(storage: Arc<dyn UnifiedStorage>) -> Self {
        Self { storage }
    }

    /// Store a new, inactive cycle
    pub async fn create_cycle(&self, mut cycle: Cycle) -> PayoutResult<Cycle> {
        cycle.validate()?;
        let cycles = self.storage.cycle_storage();
        if cycles.load_cycle(&cycle.id).await?.is_some() {
            return Err(PayoutError::InvalidRequest(format!(
                "cycle {} already exists",
                cycle.id
            )));
        }
        cycle.is_active = false;
        cycles.save_cycle(&cycle).await?;
        info!("Created cycle {} ({})", cycle.id, cycle.name);
        Ok(cycle)
    }

    /// Make `id` the only active cycle
    pub async fn activate_cycle(&self, id: &CycleId) -> PayoutResult<Cycle> {
        self.get_cycle(id).await?;
        let cycle = self.storage.cycle_storage().activate_cycle(id).await?;
        info!("Cycle {} is now active", id);
        Ok(cycle)
    }

    pub async fn get_cycle(&self, id: &CycleId) -> PayoutResult<Cycle> {
        self.storage
            .cycle_storage()
            .load_cycle(id)
            .await?
            .ok_or_else(|| PayoutError::InvalidCycle(format!("cycle {} not found", id)))
    }

    pub async fn active_cycle(&self) -> PayoutResult<Option<Cycle>> {
        Ok(self.storage.cycle_storage().active_cycle().await?)
    }

    pub async fn list_cycles(&self) -> PayoutResult<Vec<Cycle>> {
        Ok(self.storage.cycle_storage().list_cycles().await?)
    }

    /// Replace the roster of a cycle. Returns the number of members stored.
    pub async fn import_roster(
        &self,
        id: &CycleId,
        members: Vec<EligibleMember>,
    ) -> PayoutResult<usize> {
        self.get_cycle(id).await?;

        let mut seen = HashSet::new();
        let duplicates: Vec<String> = members
            .iter()
            .filter(|m| !seen.insert(&m.user_id))
            .map(|m| m.user_id.to_string())
            .collect();
        if !duplicates.is_empty() {
            return Err(PayoutError::InvalidRequest(format!(
                "duplicate members in roster: {}",
                duplicates.join(", ")
            )));
        }

        let count = members.len();
        self.storage.cycle_storage().save_roster(id, members).await?;
        info!("Imported {} members into cycle {}", count, id);
        Ok(count)
    }

    /// Every roster member counts as a paying member
    pub async fn reward_pool(&self, id: &CycleId) -> PayoutResult<RewardPool> {
        let cycle = self.get_cycle(id).await?;
        let paying_members = self.storage.cycle_storage().load_roster(id).await?.len() as u64;
        let reward_pool = payout::reward_pool(
            cycle.membership_fee,
            paying_members,
            cycle.reward_pool_percentage,
            cycle.minimum_pool_guarantee,
        )?;
        let formula = payout::reward_pool(
            cycle.membership_fee,
            paying_members,
            cycle.reward_pool_percentage,
            None,
        )?;

        Ok(RewardPool {
            cycle_id: cycle.id,
            paying_members,
            reward_pool,
            guarantee_applied: reward_pool > formula,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::storage::StorageFactory;
    use crate::testing::fixtures::{roster, CycleBuilder};

    fn service() -> CycleService {
        CycleService::new(StorageFactory::memory())
    }

    #[tokio::test]
    async fn test_create_and_activate() {
        let service = service();
        service.create_cycle(CycleBuilder::new("q1").build()).await.unwrap();
        service.create_cycle(CycleBuilder::new("q2").build()).await.unwrap();

        service.activate_cycle(&CycleId::from("q1")).await.unwrap();
        service.activate_cycle(&CycleId::from("q2")).await.unwrap();

        let active = service.active_cycle().await.unwrap().unwrap();
        assert_eq!(active.id.as_str(), "q2");
        assert!(!service.get_cycle(&CycleId::from("q1")).await.unwrap().is_active);

        let err = service.create_cycle(CycleBuilder::new("q1").build()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidRequest);
    }

    #[tokio::test]
    async fn test_invalid_cycles_are_rejected() {
        let service = service();
        let err = service
            .create_cycle(CycleBuilder::new("bad").with_pool_percentage(120.0).build())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidPercentage);

        let err = service.activate_cycle(&CycleId::from("missing")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidCycle);
    }

    #[tokio::test]
    async fn test_roster_import_and_reward_pool() {
        let service = service();
        let cycle = CycleBuilder::new("q1")
            .with_membership_fee(2_500)
            .with_pool_percentage(40.0)
            .build();
        service.create_cycle(cycle).await.unwrap();
        let id = CycleId::from("q1");

        assert_eq!(service.import_roster(&id, roster(10)).await.unwrap(), 10);
        let pool = service.reward_pool(&id).await.unwrap();
        assert_eq!(pool.paying_members, 10);
        assert_eq!(pool.reward_pool, 10_000);
        assert!(!pool.guarantee_applied);

        let mut dupes = roster(2);
        dupes.push(dupes[0].clone());
        let err = service.import_roster(&id, dupes).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidRequest);
    }

    #[tokio::test]
    async fn test_minimum_guarantee_raises_pool() {
        let service = service();
        service
            .create_cycle(CycleBuilder::new("q1").with_minimum_pool(1_000_000).build())
            .await
            .unwrap();
        let pool = service.reward_pool(&CycleId::from("q1")).await.unwrap();
        assert_eq!(pool.reward_pool, 1_000_000);
        assert!(pool.guarantee_applied);
    }
}
