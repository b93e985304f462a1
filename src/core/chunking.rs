//! Partitioning of a batch into fixed-size chunks

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::model::{BatchChunk, BatchId, BatchItem, ChunkStatus, ItemOutcome, WinnerId, WinnerRecord};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkInfo {
    pub chunk_size: usize,
    pub total_chunks: usize,
    pub total_items: usize,
}

impl ChunkInfo {
    pub fn new(total_items: usize, chunk_size: usize) -> Self {
        let chunk_size = chunk_size.max(1);
        Self {
            chunk_size,
            total_chunks: total_items.div_ceil(chunk_size),
            total_items,
        }
    }
}

/// Key the provider uses to recognise a resubmitted payout. Stable for the
/// life of a batch; a retry batch gets new keys.
pub fn idempotency_key(batch_id: &BatchId, chunk_index: usize, winner_id: &WinnerId) -> String {
    format!("{}:{}:{}", batch_id, chunk_index, winner_id)
}

/// Split `winners` in order into pending chunks of at most `chunk_size`
pub fn build_chunks(batch_id: &BatchId, winners: &[WinnerRecord], chunk_size: usize) -> Vec<BatchChunk> {
    let info = ChunkInfo::new(winners.len(), chunk_size);
    let now = Utc::now();
    winners
        .chunks(info.chunk_size)
        .enumerate()
        .map(|(index, slice)| BatchChunk {
            batch_id: batch_id.clone(),
            index,
            items: slice
                .iter()
                .map(|w| BatchItem {
                    winner_id: w.id.clone(),
                    user_id: w.user_id.clone(),
                    destination: w.destination.clone().unwrap_or_default(),
                    amount: w.payout_final,
                    idempotency_key: idempotency_key(batch_id, index, &w.id),
                    outcome: ItemOutcome::Pending,
                })
                .collect(),
            status: ChunkStatus::Pending,
            attempts: 0,
            last_error: None,
            updated_at: now,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::fixtures::sealed_selection;

    #[test]
    fn test_chunk_info() {
        assert_eq!(ChunkInfo::new(10, 4).total_chunks, 3);
        assert_eq!(ChunkInfo::new(8, 4).total_chunks, 2);
        assert_eq!(ChunkInfo::new(0, 4).total_chunks, 0);
        assert_eq!(ChunkInfo::new(3, 0).chunk_size, 1);
    }

    #[test]
    fn test_build_chunks_preserves_order_and_keys() {
        let selection = sealed_selection("c1", 5);
        let batch_id = BatchId::from("b1");
        let chunks = build_chunks(&batch_id, &selection.winners, 2);

        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[2].items.len(), 1);
        let flattened: Vec<&WinnerId> = chunks
            .iter()
            .flat_map(|c| c.items.iter().map(|i| &i.winner_id))
            .collect();
        let expected: Vec<&WinnerId> = selection.winners.iter().map(|w| &w.id).collect();
        assert_eq!(flattened, expected);

        let item = &chunks[1].items[0];
        assert_eq!(
            item.idempotency_key,
            format!("b1:1:{}", selection.winners[2].id)
        );
        assert!(chunks.iter().all(|c| c.status == ChunkStatus::Pending));
    }
}
