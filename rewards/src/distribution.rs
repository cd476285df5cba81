//! Distribution batch sequencing
//!
//! A privileged distributor pays out staking rewards in batches identified
//! by a `(from_block, to_block, split)` tuple and a strictly increasing
//! transaction index. A new batch may only start where the previous one
//! ended; any cursor mismatch is a fatal rejection, preventing out-of-order
//! or duplicated sub-batches.

use serde::{Deserialize, Serialize};

use crate::error::{Result, RewardsError};

/// Per-distributor batch cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DistributionBatch {
    pub from_block: u64,
    pub to_block: u64,
    pub split_pm: u64,
    pub next_tx_index: u64,
}

impl DistributionBatch {
    /// Validate a sub-batch against the distributor's cursor and return the
    /// advanced cursor.
    ///
    /// `tx_index == 0` opens a new batch: its range must be in the past and
    /// adjacent to the previous batch. Any other index continues the current
    /// batch and must match it exactly.
    pub fn validate_next(
        previous: Option<&DistributionBatch>,
        from_block: u64,
        to_block: u64,
        split_pm: u64,
        tx_index: u64,
        now_block: u64,
    ) -> Result<DistributionBatch> {
        if from_block > to_block {
            return Err(RewardsError::BatchSequence(format!(
                "from block {} is after to block {}",
                from_block, to_block
            )));
        }
        if tx_index == 0 {
            if to_block >= now_block {
                return Err(RewardsError::BatchSequence(format!(
                    "to block {} is not in the past (current block {})",
                    to_block, now_block
                )));
            }
            if let Some(prev) = previous {
                if from_block != prev.to_block + 1 {
                    return Err(RewardsError::BatchSequence(format!(
                        "batch must start at block {}, got {}",
                        prev.to_block + 1,
                        from_block
                    )));
                }
            }
        } else {
            let prev = previous.ok_or_else(|| {
                RewardsError::BatchSequence(format!(
                    "tx index {} without an open batch",
                    tx_index
                ))
            })?;
            if from_block != prev.from_block
                || to_block != prev.to_block
                || split_pm != prev.split_pm
            {
                return Err(RewardsError::BatchSequence(format!(
                    "batch ({}, {}, {}) does not match the open batch ({}, {}, {})",
                    from_block, to_block, split_pm, prev.from_block, prev.to_block, prev.split_pm
                )));
            }
            if tx_index != prev.next_tx_index {
                return Err(RewardsError::BatchSequence(format!(
                    "expected tx index {}, got {}",
                    prev.next_tx_index, tx_index
                )));
            }
        }
        Ok(DistributionBatch {
            from_block,
            to_block,
            split_pm,
            next_tx_index: tx_index + 1,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_genesis_batch() {
        let cursor = DistributionBatch::validate_next(None, 0, 99, 50_000, 0, 200).unwrap();
        assert_eq!(cursor.next_tx_index, 1);
    }

    #[test]
    fn test_continuation_requires_exact_match() {
        let cursor = DistributionBatch::validate_next(None, 0, 99, 50_000, 0, 200).unwrap();

        // Matching continuation advances the index
        let cursor = DistributionBatch::validate_next(Some(&cursor), 0, 99, 50_000, 1, 200).unwrap();
        assert_eq!(cursor.next_tx_index, 2);

        // Wrong index
        assert!(DistributionBatch::validate_next(Some(&cursor), 0, 99, 50_000, 1, 200).is_err());
        // Wrong split
        assert!(DistributionBatch::validate_next(Some(&cursor), 0, 99, 40_000, 2, 200).is_err());
        // Wrong range
        assert!(DistributionBatch::validate_next(Some(&cursor), 0, 98, 50_000, 2, 200).is_err());
    }

    #[test]
    fn test_new_batch_must_be_adjacent() {
        let cursor = DistributionBatch::validate_next(None, 0, 99, 50_000, 0, 200).unwrap();

        // Gap
        assert!(DistributionBatch::validate_next(Some(&cursor), 101, 150, 50_000, 0, 200).is_err());
        // Overlap
        assert!(DistributionBatch::validate_next(Some(&cursor), 99, 150, 50_000, 0, 200).is_err());
        // Adjacent
        let next =
            DistributionBatch::validate_next(Some(&cursor), 100, 150, 30_000, 0, 200).unwrap();
        assert_eq!(next.from_block, 100);
        assert_eq!(next.next_tx_index, 1);
    }

    #[test]
    fn test_batch_range_must_be_past() {
        assert!(DistributionBatch::validate_next(None, 0, 200, 50_000, 0, 200).is_err());
        assert!(DistributionBatch::validate_next(None, 0, 199, 50_000, 0, 200).is_ok());
    }

    #[test]
    fn test_inverted_range_rejected() {
        assert!(DistributionBatch::validate_next(None, 100, 99, 50_000, 0, 200).is_err());
    }

    #[test]
    fn test_index_without_open_batch_rejected() {
        assert!(DistributionBatch::validate_next(None, 0, 99, 50_000, 1, 200).is_err());
    }
}
