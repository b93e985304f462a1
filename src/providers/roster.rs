//! Member source backed by the roster imported into storage

use async_trait::async_trait;
use std::sync::Arc;

use super::MemberSource;
use crate::error::PayoutResult;
use crate::model::{Cycle, EligibleMember};
use crate::storage::UnifiedStorage;

pub struct StoredMemberSource {
    storage: Arc<dyn UnifiedStorage>,
}

impl StoredMemberSource {
    pub fn new(storage: Arc<dyn UnifiedStorage>) -> Self {
        Self { storage }
    }
}

#[async_trait]
impl MemberSource for StoredMemberSource {
    async fn eligible_members(&self, cycle: &Cycle) -> PayoutResult<Vec<EligibleMember>> {
        Ok(self.storage.cycle_storage().load_roster(&cycle.id).await?)
    }
}
