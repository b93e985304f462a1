//! Mock member source

use async_trait::async_trait;

use crate::error::PayoutResult;
use crate::model::{Cycle, EligibleMember};
use crate::providers::MemberSource;

/// Returns the same members for every cycle
#[derive(Debug, Clone, Default)]
pub struct StaticMemberSource {
    members: Vec<EligibleMember>,
}

impl StaticMemberSource {
    pub fn new(members: Vec<EligibleMember>) -> Self {
        Self { members }
    }
}

#[async_trait]
impl MemberSource for StaticMemberSource {
    async fn eligible_members(&self, _cycle: &Cycle) -> PayoutResult<Vec<EligibleMember>> {
        Ok(self.members.clone())
    }
}
