//! Fee bucket pool state and operations

use std::collections::BTreeMap;

use tracing::{debug, info};

use meridian_core::constants::BUCKET_LENGTH;
use meridian_core::error::CoreError;
use meridian_core::interfaces::{Address, FeeBucketSource, Token};
use meridian_core::registry::Shared;
use meridian_core::units::{add64, to_external, to_internal};
use meridian_core::AccessControl;

use crate::error::{FeesWalletError, Result};
use crate::events::FeesWalletEvent;

/// Upper bound on buckets walked per collection call. If more buckets are
/// owed, the remainder is collected on a subsequent call; this bounds
/// worst-case work per transaction.
pub const MAX_BUCKET_ITERATIONS: u32 = 24;

fn bucket_of(timestamp: u64) -> u64 {
    timestamp - timestamp % BUCKET_LENGTH
}

/// The fee bucket pool.
///
/// Buckets are keyed by bucket-start timestamp and hold internal units.
/// The sum of all bucket amounts plus already-collected revenue equals the
/// total ever deposited, modulo granularity truncation at the deposit
/// boundary.
pub struct FeesWallet {
    contract_address: Address,
    access: AccessControl,
    /// Single authorized caller of `collect_fees`.
    rewards_collector: Address,
    buckets: BTreeMap<u64, u64>,
    last_collected_at: u64,
    token: Option<Shared<dyn Token>>,
    next_wallet: Option<Shared<FeesWallet>>,
    events: Vec<FeesWalletEvent>,
}

impl FeesWallet {
    pub fn new(
        contract_address: &str,
        access: AccessControl,
        rewards_collector: &str,
        created_at: u64,
    ) -> Self {
        Self {
            contract_address: contract_address.to_string(),
            access,
            rewards_collector: rewards_collector.to_string(),
            buckets: BTreeMap::new(),
            last_collected_at: created_at,
            token: None,
            next_wallet: None,
            events: Vec::new(),
        }
    }

    pub fn contract_address(&self) -> &str {
        &self.contract_address
    }

    /// Swap the token handle (registry change).
    pub fn rewire(&mut self, token: Shared<dyn Token>) {
        self.token = Some(token);
    }

    /// Register the successor pool buckets migrate to.
    pub fn set_next_wallet(&mut self, caller: &str, next: Shared<FeesWallet>) -> Result<()> {
        self.access.only_admin(caller)?;
        self.next_wallet = Some(next);
        Ok(())
    }

    /// Update the address authorized to collect fees.
    pub fn set_rewards_collector(&mut self, caller: &str, collector: &str) -> Result<()> {
        self.access.only_admin(caller)?;
        self.rewards_collector = collector.to_string();
        Ok(())
    }

    // ---- queries ----

    /// Remaining balance of one bucket, external units.
    pub fn get_bucket(&self, bucket_start: u64) -> u128 {
        to_external(self.buckets.get(&bucket_start).copied().unwrap_or(0))
    }

    /// Total uncollected balance across all buckets, external units.
    pub fn total_bucketed(&self) -> u128 {
        to_external(self.buckets.values().copied().sum())
    }

    pub fn last_collected_at(&self) -> u64 {
        self.last_collected_at
    }

    pub fn events(&self) -> &[FeesWalletEvent] {
        &self.events
    }

    pub fn drain_events(&mut self) -> Vec<FeesWalletEvent> {
        std::mem::take(&mut self.events)
    }

    // ---- mutations ----

    /// Amortize a prepaid deposit into consecutive buckets: the first
    /// (partial) bucket receives the pro-rated monthly rate for its
    /// remaining duration, subsequent buckets a full month each until the
    /// amount is exhausted. Pulls the deposit from the caller.
    pub fn fill_fee_buckets(
        &mut self,
        caller: &str,
        amount: u128,
        monthly_rate: u128,
        from_timestamp: u64,
        now: u64,
    ) -> Result<()> {
        let amount_internal = to_internal(amount).map_err(FeesWalletError::Core)?;
        let rate_internal = to_internal(monthly_rate).map_err(FeesWalletError::Core)?;
        if amount_internal == 0 || rate_internal == 0 {
            return Err(FeesWalletError::ZeroAmount);
        }
        let mut bucket_start = bucket_of(from_timestamp);
        let current_bucket = bucket_of(now);
        if bucket_start < current_bucket {
            return Err(FeesWalletError::BackdatedBucket {
                bucket_start,
                current_bucket,
            });
        }

        {
            let token = self.token()?;
            token
                .write()
                .transfer_from(
                    &self.contract_address,
                    caller,
                    &self.contract_address,
                    to_external(amount_internal),
                )
                .map_err(CoreError::Collaborator)?;
        }

        // First, partial bucket: pro-rate the monthly rate over what is
        // left of the bucket.
        let offset = from_timestamp - bucket_start;
        let first = (rate_internal as u128 * (BUCKET_LENGTH - offset) as u128
            / BUCKET_LENGTH as u128) as u64;
        let mut remaining = amount_internal;
        let first = first.min(remaining);
        if first > 0 {
            self.add_to_bucket(bucket_start, first)?;
            remaining -= first;
        }
        bucket_start += BUCKET_LENGTH;
        while remaining > 0 {
            let added = rate_internal.min(remaining);
            self.add_to_bucket(bucket_start, added)?;
            remaining -= added;
            bucket_start += BUCKET_LENGTH;
        }

        info!(
            "fee buckets filled: {} external units at monthly rate {} from {}",
            to_external(amount_internal),
            monthly_rate,
            from_timestamp
        );
        Ok(())
    }

    /// Collect the time-elapsed portion of the buckets, walking forward
    /// from the last collection point, at most [`MAX_BUCKET_ITERATIONS`]
    /// buckets per call. Transfers the sum to the caller. Collecting when
    /// nothing is owed is a no-op.
    pub fn collect_fees(&mut self, caller: &str, now: u64) -> Result<u128> {
        AccessControl::only_designated(caller, &self.rewards_collector, "rewards contract")
            .map_err(FeesWalletError::Core)?;
        let (moves, new_last) = self.plan_collection(now);
        self.last_collected_at = new_last;

        let mut collected: u64 = 0;
        for (bucket_start, withdrawn, remaining) in moves {
            if remaining == 0 {
                self.buckets.remove(&bucket_start);
            } else {
                self.buckets.insert(bucket_start, remaining);
            }
            collected = add64(collected, withdrawn, "collected fees")?;
            self.events.push(FeesWalletEvent::FeesWithdrawnFromBucket {
                bucket_start,
                withdrawn: to_external(withdrawn),
                remaining: to_external(remaining),
            });
        }
        if collected == 0 {
            return Ok(0);
        }

        let external = to_external(collected);
        {
            let token = self.token()?;
            token
                .write()
                .transfer(&self.contract_address, caller, external)
                .map_err(CoreError::Collaborator)?;
        }
        debug!(
            "fees collected: {} external units up to {}",
            external, self.last_collected_at
        );
        Ok(external)
    }

    /// Read-only projection of what collecting at `as_of` would yield,
    /// under the same iteration cap. Only valid for `as_of >= now`.
    pub fn get_outstanding_fees(&self, as_of: u64, now: u64) -> Result<u128> {
        if as_of < now {
            return Err(FeesWalletError::InvalidAsOf { as_of, now });
        }
        let (moves, _) = self.plan_collection(as_of);
        let mut outstanding: u64 = 0;
        for (_, withdrawn, _) in moves {
            outstanding = add64(outstanding, withdrawn, "outstanding fees")?;
        }
        Ok(to_external(outstanding))
    }

    /// Move one bucket's entire remaining balance to the successor pool.
    pub fn migrate_bucket(&mut self, caller: &str, bucket_start: u64) -> Result<()> {
        self.access.only_migration_manager(caller)?;
        if bucket_start % BUCKET_LENGTH != 0 {
            return Err(FeesWalletError::MisalignedBucket(bucket_start));
        }
        let amount = self
            .buckets
            .get(&bucket_start)
            .copied()
            .filter(|amount| *amount > 0)
            .ok_or(FeesWalletError::EmptyBucket(bucket_start))?;
        let next = self
            .next_wallet
            .clone()
            .ok_or(CoreError::NotWired("fees wallet successor"))?;
        let next_address = next.read().contract_address.clone();
        if next_address == self.contract_address {
            return Err(FeesWalletError::SelfMigration);
        }

        let external = to_external(amount);
        {
            let token = self.token()?;
            token
                .write()
                .approve(&self.contract_address, &next_address, external)
                .map_err(CoreError::Collaborator)?;
        }
        next.write()
            .accept_bucket_migration(&self.contract_address, bucket_start, external)?;
        self.buckets.remove(&bucket_start);

        info!(
            "bucket at {} migrated to {}: {} external units",
            bucket_start, next_address, external
        );
        self.events.push(FeesWalletEvent::BucketMigrated {
            bucket_start,
            amount: external,
            to: next_address,
        });
        Ok(())
    }

    /// Accept a migrated bucket from any pre-approved payer.
    pub fn accept_bucket_migration(
        &mut self,
        caller: &str,
        bucket_start: u64,
        amount: u128,
    ) -> Result<()> {
        if bucket_start % BUCKET_LENGTH != 0 {
            return Err(FeesWalletError::MisalignedBucket(bucket_start));
        }
        let internal = to_internal(amount).map_err(FeesWalletError::Core)?;
        if internal == 0 {
            return Err(FeesWalletError::ZeroAmount);
        }
        {
            let token = self.token()?;
            token
                .write()
                .transfer_from(
                    &self.contract_address,
                    caller,
                    &self.contract_address,
                    to_external(internal),
                )
                .map_err(CoreError::Collaborator)?;
        }
        self.add_to_bucket(bucket_start, internal)?;
        self.events.push(FeesWalletEvent::BucketMigrationAccepted {
            from: caller.to_string(),
            bucket_start,
            amount: to_external(internal),
        });
        Ok(())
    }

    /// Sweep the entire token balance to the caller. No bucket bookkeeping
    /// is performed; the bucket map may afterwards promise tokens that no
    /// longer exist.
    pub fn emergency_withdraw(&mut self, caller: &str) -> Result<u128> {
        self.access.only_migration_manager(caller)?;
        let token = self.token()?;
        let amount = token.read().balance_of(&self.contract_address);
        if amount > 0 {
            token
                .write()
                .transfer(&self.contract_address, caller, amount)
                .map_err(CoreError::Collaborator)?;
        }
        self.events.push(FeesWalletEvent::EmergencyWithdrawal {
            caller: caller.to_string(),
            amount,
        });
        Ok(amount)
    }

    // ---- internals ----

    /// Walk buckets from the last collection point up to `now` and compute
    /// the recognizable revenue per bucket: `(bucket_start, withdrawn,
    /// remaining_after)`. Within the current bucket the recognized share is
    /// `remaining * elapsed / remaining_duration`, re-derived each call so
    /// the bucket converges exactly to zero at its end.
    fn plan_collection(&self, now: u64) -> (Vec<(u64, u64, u64)>, u64) {
        let mut last = self.last_collected_at;
        let mut moves = Vec::new();
        let mut iterations = 0u32;
        while last < now && iterations < MAX_BUCKET_ITERATIONS {
            iterations += 1;
            let bucket_start = bucket_of(last);
            let bucket_end = bucket_start + BUCKET_LENGTH;
            let amount = self.buckets.get(&bucket_start).copied().unwrap_or(0);
            if now >= bucket_end {
                // Fully elapsed: everything left is recognized.
                if amount > 0 {
                    moves.push((bucket_start, amount, 0));
                }
                last = bucket_end;
            } else {
                if amount > 0 {
                    let elapsed = now - last;
                    let remaining_duration = bucket_end - last;
                    let share =
                        (amount as u128 * elapsed as u128 / remaining_duration as u128) as u64;
                    if share > 0 {
                        moves.push((bucket_start, share, amount - share));
                    }
                }
                last = now;
            }
        }
        (moves, last)
    }

    fn add_to_bucket(&mut self, bucket_start: u64, added: u64) -> Result<()> {
        let total = {
            let bucket = self.buckets.entry(bucket_start).or_insert(0);
            *bucket = add64(*bucket, added, "bucket total")?;
            *bucket
        };
        self.events.push(FeesWalletEvent::FeesAdded {
            bucket_start,
            added: to_external(added),
            total: to_external(total),
        });
        Ok(())
    }

    fn token(&self) -> Result<&Shared<dyn Token>> {
        Ok(self.token.as_ref().ok_or(CoreError::NotWired("token"))?)
    }
}

impl FeeBucketSource for FeesWallet {
    fn collect_fees(&mut self, caller: &str, now: u64) -> std::result::Result<u128, String> {
        FeesWallet::collect_fees(self, caller, now).map_err(|e| e.to_string())
    }

    fn outstanding_fees(&self, as_of: u64, now: u64) -> std::result::Result<u128, String> {
        self.get_outstanding_fees(as_of, now).map_err(|e| e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bucket_of_aligns_down() {
        assert_eq!(bucket_of(0), 0);
        assert_eq!(bucket_of(BUCKET_LENGTH - 1), 0);
        assert_eq!(bucket_of(BUCKET_LENGTH), BUCKET_LENGTH);
        assert_eq!(bucket_of(BUCKET_LENGTH + 1), BUCKET_LENGTH);
    }
}
