//! Which winners a disbursement may pay

use std::collections::HashSet;

use crate::model::{CycleSelection, DisbursementMode, WinnerRecord};

/// Winners that are pending, have a destination and a positive amount, in
/// overall rank order
pub fn eligible_winners(selection: &CycleSelection) -> Vec<&WinnerRecord> {
    let mut winners: Vec<&WinnerRecord> = selection
        .winners
        .iter()
        .filter(|w| w.is_disbursable())
        .collect();
    winners.sort_by_key(|w| w.overall_rank);
    winners
}

/// Target set of a batch. `Selected` keeps the caller's order and drops ids
/// that are unknown, repeated or not eligible.
pub fn resolve_targets<'a>(
    selection: &'a CycleSelection,
    mode: &DisbursementMode,
) -> Vec<&'a WinnerRecord> {
    match mode {
        DisbursementMode::All => eligible_winners(selection),
        DisbursementMode::Selected(ids) => {
            let mut seen = HashSet::new();
            ids.iter()
                .filter(|id| seen.insert(*id))
                .filter_map(|id| selection.winner(id))
                .filter(|w| w.is_disbursable())
                .collect()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{PayoutStatus, WinnerId};
    use crate::testing::fixtures::sealed_selection;

    #[test]
    fn test_excludes_processed_removed_and_unpayable() {
        let mut selection = sealed_selection("c1", 5);
        selection.winners[0].payout_status = PayoutStatus::Processed;
        selection.winners[1].payout_status = PayoutStatus::Removed;
        selection.winners[2].destination = None;
        selection.winners[3].payout_final = 0;

        let eligible = eligible_winners(&selection);
        assert_eq!(eligible.len(), 1);
        assert_eq!(eligible[0].id, selection.winners[4].id);
    }

    #[test]
    fn test_selected_is_intersection_with_eligible() {
        let mut selection = sealed_selection("c1", 3);
        selection.winners[1].payout_status = PayoutStatus::Processed;
        let ids = vec![
            selection.winners[2].id.clone(),
            selection.winners[1].id.clone(),
            WinnerId::from("unknown"),
            selection.winners[2].id.clone(),
        ];

        let targets = resolve_targets(&selection, &DisbursementMode::Selected(ids));
        assert_eq!(targets.len(), 1);
        assert_eq!(targets[0].id, selection.winners[2].id);
    }
}
