//! In-memory representation of everything the engine persists
//!
//! Backends hold one `StoreState` behind a single lock, which is what makes
//! the conditional writes below atomic across cycles, selections and batches.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::error::{StorageError, StorageResult};
use super::types::{BatchFilter, PaidWinner, WriteGuard};
use crate::model::{
    BatchChunk, BatchId, BatchStatus, Cycle, CycleId, CycleSelection, EligibleMember,
    PayoutBatch, PayoutStatus,
};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreState {
    #[serde(default)]
    cycles: BTreeMap<CycleId, Cycle>,
    #[serde(default)]
    rosters: BTreeMap<CycleId, Vec<EligibleMember>>,
    #[serde(default)]
    selections: BTreeMap<CycleId, CycleSelection>,
    #[serde(default)]
    batches: BTreeMap<BatchId, PayoutBatch>,
    #[serde(default)]
    chunks: BTreeMap<BatchId, Vec<BatchChunk>>,
}

impl StoreState {
    pub fn save_cycle(&mut self, cycle: &Cycle) {
        let mut cycle = cycle.clone();
        cycle.is_active = self
            .cycles
            .get(&cycle.id)
            .map(|existing| existing.is_active)
            .unwrap_or(false);
        self.cycles.insert(cycle.id.clone(), cycle);
    }

    pub fn load_cycle(&self, id: &CycleId) -> Option<Cycle> {
        self.cycles.get(id).cloned()
    }

    pub fn active_cycle(&self) -> Option<Cycle> {
        self.cycles.values().find(|c| c.is_active).cloned()
    }

    pub fn activate_cycle(&mut self, id: &CycleId) -> StorageResult<Cycle> {
        if !self.cycles.contains_key(id) {
            return Err(StorageError::not_found(format!("cycle {}", id)));
        }
        for cycle in self.cycles.values_mut() {
            cycle.is_active = &cycle.id == id;
        }
        self.cycles
            .get(id)
            .cloned()
            .ok_or_else(|| StorageError::not_found(format!("cycle {}", id)))
    }

    pub fn list_cycles(&self) -> Vec<Cycle> {
        let mut cycles: Vec<Cycle> = self.cycles.values().cloned().collect();
        cycles.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        cycles
    }

    pub fn save_roster(&mut self, cycle_id: &CycleId, members: Vec<EligibleMember>) {
        self.rosters.insert(cycle_id.clone(), members);
    }

    pub fn load_roster(&self, cycle_id: &CycleId) -> Vec<EligibleMember> {
        self.rosters.get(cycle_id).cloned().unwrap_or_default()
    }

    pub fn load_selection(&self, cycle_id: &CycleId) -> Option<CycleSelection> {
        self.selections.get(cycle_id).cloned()
    }

    pub fn store_selection(
        &mut self,
        mut selection: CycleSelection,
        guard: WriteGuard,
    ) -> StorageResult<CycleSelection> {
        let current = self
            .selections
            .get(&selection.cycle_id)
            .map(|s| s.version)
            .unwrap_or(0);
        if current != guard.expected_version {
            return Err(StorageError::conflict(format!(
                "selection for cycle {} changed (expected v{}, found v{})",
                selection.cycle_id, guard.expected_version, current
            )));
        }
        if guard.require_idle {
            if let Some(batch) = self.active_batch(&selection.cycle_id) {
                return Err(StorageError::conflict(format!(
                    "batch {} is in flight for cycle {}",
                    batch.id, selection.cycle_id
                )));
            }
        }
        selection.version = current + 1;
        self.selections
            .insert(selection.cycle_id.clone(), selection.clone());
        Ok(selection)
    }

    pub fn record_payouts(&mut self, cycle_id: &CycleId, paid: &[PaidWinner]) -> StorageResult<()> {
        let selection = self
            .selections
            .get_mut(cycle_id)
            .ok_or_else(|| StorageError::not_found(format!("selection for cycle {}", cycle_id)))?;
        let now = Utc::now();
        let mut changed = false;
        for payout in paid {
            if let Some(winner) = selection.winner_mut(&payout.winner_id) {
                if winner.payout_status == PayoutStatus::Processed {
                    continue;
                }
                winner.payout_status = PayoutStatus::Processed;
                winner.provider_reference = Some(payout.reference.clone());
                winner.processed_at = Some(now);
                winner.last_modified = now;
                changed = true;
            }
        }
        if changed {
            selection.version += 1;
            selection.updated_at = now;
        }
        Ok(())
    }

    pub fn insert_batch(
        &mut self,
        batch: PayoutBatch,
        chunks: Vec<BatchChunk>,
        selection_version: u64,
    ) -> StorageResult<()> {
        if let Some(active) = self.active_batch(&batch.cycle_id) {
            return Err(StorageError::conflict(format!(
                "batch {} is already {} for cycle {}",
                active.id, active.status, batch.cycle_id
            )));
        }
        let current = self
            .selections
            .get(&batch.cycle_id)
            .map(|s| s.version)
            .unwrap_or(0);
        if current != selection_version {
            return Err(StorageError::conflict(format!(
                "selection for cycle {} changed while the batch was prepared",
                batch.cycle_id
            )));
        }
        if self.batches.contains_key(&batch.id) {
            return Err(StorageError::conflict(format!("batch {} already exists", batch.id)));
        }
        self.chunks.insert(batch.id.clone(), chunks);
        self.batches.insert(batch.id.clone(), batch);
        Ok(())
    }

    pub fn load_batch(&self, id: &BatchId) -> Option<PayoutBatch> {
        self.batches.get(id).cloned()
    }

    pub fn load_chunks(&self, id: &BatchId) -> Vec<BatchChunk> {
        let mut chunks = self.chunks.get(id).cloned().unwrap_or_default();
        chunks.sort_by_key(|c| c.index);
        chunks
    }

    pub fn save_chunk(&mut self, chunk: &BatchChunk) -> StorageResult<()> {
        let chunks = self
            .chunks
            .get_mut(&chunk.batch_id)
            .ok_or_else(|| StorageError::not_found(format!("batch {}", chunk.batch_id)))?;
        let slot = chunks
            .iter_mut()
            .find(|c| c.index == chunk.index)
            .ok_or_else(|| {
                StorageError::not_found(format!("chunk {} of batch {}", chunk.index, chunk.batch_id))
            })?;
        *slot = chunk.clone();
        Ok(())
    }

    pub fn transition_batch(
        &mut self,
        id: &BatchId,
        to: BatchStatus,
        error: Option<String>,
    ) -> StorageResult<PayoutBatch> {
        let batch = self
            .batches
            .get_mut(id)
            .ok_or_else(|| StorageError::not_found(format!("batch {}", id)))?;
        if !batch.status.can_transition_to(to) {
            return Err(StorageError::conflict(format!(
                "batch {} cannot move from {} to {}",
                id, batch.status, to
            )));
        }
        let now = Utc::now();
        batch.status = to;
        match to {
            BatchStatus::Processing => batch.started_at = Some(now),
            BatchStatus::Completed | BatchStatus::Failed => batch.completed_at = Some(now),
            BatchStatus::Created => {}
        }
        if error.is_some() {
            batch.error = error;
        }
        Ok(batch.clone())
    }

    pub fn active_batch(&self, cycle_id: &CycleId) -> Option<PayoutBatch> {
        self.batches
            .values()
            .find(|b| &b.cycle_id == cycle_id && !b.status.is_terminal())
            .cloned()
    }

    pub fn latest_batch(&self, cycle_id: &CycleId) -> Option<PayoutBatch> {
        self.batches
            .values()
            .filter(|b| &b.cycle_id == cycle_id)
            .max_by_key(|b| b.created_at)
            .cloned()
    }

    pub fn list_batches(&self, filter: &BatchFilter) -> Vec<PayoutBatch> {
        let mut batches: Vec<PayoutBatch> = self
            .batches
            .values()
            .filter(|b| {
                filter
                    .cycle_id
                    .as_ref()
                    .map(|id| &b.cycle_id == id)
                    .unwrap_or(true)
            })
            .filter(|b| filter.status.map(|s| b.status == s).unwrap_or(true))
            .filter(|b| !filter.non_terminal_only || !b.status.is_terminal())
            .cloned()
            .collect();
        batches.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        if let Some(limit) = filter.limit {
            batches.truncate(limit);
        }
        batches
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::fixtures::{sample_batch, sample_cycle, sealed_selection};

    #[test]
    fn test_only_one_cycle_is_active() {
        let mut state = StoreState::default();
        state.save_cycle(&sample_cycle("a"));
        state.save_cycle(&sample_cycle("b"));

        state.activate_cycle(&CycleId::from("a")).unwrap();
        state.activate_cycle(&CycleId::from("b")).unwrap();

        let active: Vec<_> = state.list_cycles().into_iter().filter(|c| c.is_active).collect();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id.as_str(), "b");
    }

    #[test]
    fn test_save_cycle_does_not_change_active_flag() {
        let mut state = StoreState::default();
        state.save_cycle(&sample_cycle("a"));
        state.activate_cycle(&CycleId::from("a")).unwrap();

        let mut renamed = sample_cycle("a");
        renamed.name = "Renamed".into();
        renamed.is_active = false;
        state.save_cycle(&renamed);

        assert!(state.load_cycle(&CycleId::from("a")).unwrap().is_active);
    }

    #[test]
    fn test_store_selection_rejects_stale_version() {
        let mut state = StoreState::default();
        let selection = sealed_selection("c1", 2);
        let stored = state
            .store_selection(selection.clone(), WriteGuard::version(0))
            .unwrap();
        assert_eq!(stored.version, 1);

        let err = state
            .store_selection(selection, WriteGuard::version(0))
            .unwrap_err();
        assert!(err.is_conflict());
    }

    #[test]
    fn test_insert_batch_enforces_single_in_flight_batch() {
        let mut state = StoreState::default();
        let selection = state
            .store_selection(sealed_selection("c1", 2), WriteGuard::version(0))
            .unwrap();

        let (first, first_chunks) = sample_batch("c1", &selection);
        state
            .insert_batch(first, first_chunks, selection.version)
            .unwrap();

        let (second, second_chunks) = sample_batch("c1", &selection);
        let err = state
            .insert_batch(second, second_chunks, selection.version)
            .unwrap_err();
        assert!(err.is_conflict());
    }

    #[test]
    fn test_insert_batch_rejects_moved_selection() {
        let mut state = StoreState::default();
        let selection = state
            .store_selection(sealed_selection("c1", 2), WriteGuard::version(0))
            .unwrap();
        let (batch, chunks) = sample_batch("c1", &selection);

        let err = state
            .insert_batch(batch, chunks, selection.version + 1)
            .unwrap_err();
        assert!(err.is_conflict());
    }

    #[test]
    fn test_idle_guard_blocks_selection_write_during_batch() {
        let mut state = StoreState::default();
        let selection = state
            .store_selection(sealed_selection("c1", 1), WriteGuard::version(0))
            .unwrap();
        let (batch, chunks) = sample_batch("c1", &selection);
        state.insert_batch(batch, chunks, selection.version).unwrap();

        let err = state
            .store_selection(selection.clone(), WriteGuard::version(selection.version).idle())
            .unwrap_err();
        assert!(err.is_conflict());
    }

    #[test]
    fn test_terminal_batch_never_transitions_again() {
        let mut state = StoreState::default();
        let selection = state
            .store_selection(sealed_selection("c1", 1), WriteGuard::version(0))
            .unwrap();
        let (batch, chunks) = sample_batch("c1", &selection);
        let id = batch.id.clone();
        state.insert_batch(batch, chunks, selection.version).unwrap();

        state
            .transition_batch(&id, BatchStatus::Processing, None)
            .unwrap();
        let done = state
            .transition_batch(&id, BatchStatus::Completed, None)
            .unwrap();
        assert!(done.completed_at.is_some());

        assert!(state
            .transition_batch(&id, BatchStatus::Failed, Some("late".into()))
            .unwrap_err()
            .is_conflict());
        assert!(state.active_batch(&CycleId::from("c1")).is_none());
    }

    #[test]
    fn test_record_payouts_is_idempotent() {
        let mut state = StoreState::default();
        let selection = state
            .store_selection(sealed_selection("c1", 2), WriteGuard::version(0))
            .unwrap();
        let winner_id = selection.winners[0].id.clone();
        let paid = vec![PaidWinner {
            winner_id: winner_id.clone(),
            reference: "PP-1".into(),
        }];

        state.record_payouts(&CycleId::from("c1"), &paid).unwrap();
        let after_first = state.load_selection(&CycleId::from("c1")).unwrap();
        state.record_payouts(&CycleId::from("c1"), &paid).unwrap();
        let after_second = state.load_selection(&CycleId::from("c1")).unwrap();

        assert_eq!(after_first.version, after_second.version);
        let winner = after_second.winner(&winner_id).unwrap();
        assert_eq!(winner.payout_status, PayoutStatus::Processed);
        assert_eq!(winner.provider_reference.as_deref(), Some("PP-1"));
    }
}
