//! Fee bucket pool integration tests

use fees_wallet::{FeesWallet, FeesWalletError, MAX_BUCKET_ITERATIONS};
use meridian_core::constants::{BUCKET_LENGTH, TOKEN_BASE};
use meridian_core::registry::shared;
use meridian_core::testkit::InMemoryToken;
use meridian_core::AccessControl;
use meridian_core::Token;

const WALLET: &str = "fees-wallet";
const REWARDS: &str = "rewards-contract";
const SUBSCRIBER: &str = "subscriptions";
const T0: u64 = BUCKET_LENGTH * 10;

fn ext(tokens: u64) -> u128 {
    tokens as u128 * TOKEN_BASE
}

fn access() -> AccessControl {
    AccessControl::new("fm", "mm", "adm")
}

fn setup() -> (FeesWallet, meridian_core::Shared<InMemoryToken>) {
    let token = shared(InMemoryToken::new());
    token.write().mint(SUBSCRIBER, ext(1_000_000));
    let mut wallet = FeesWallet::new(WALLET, access(), REWARDS, T0);
    wallet.rewire(token.clone());
    (wallet, token)
}

fn fill(wallet: &mut FeesWallet, token: &meridian_core::Shared<InMemoryToken>, amount: u128, rate: u128, from: u64, now: u64) {
    token.write().approve(SUBSCRIBER, WALLET, amount).unwrap();
    wallet
        .fill_fee_buckets(SUBSCRIBER, amount, rate, from, now)
        .unwrap();
}

#[test]
fn test_half_bucket_collections() {
    // Scenario: 1200 filled at a bucket boundary at monthly rate 1200.
    let (mut wallet, token) = setup();
    fill(&mut wallet, &token, ext(1200), ext(1200), T0, T0);
    assert_eq!(wallet.get_bucket(T0), ext(1200));
    assert_eq!(token.read().balance_of(WALLET), ext(1200));

    // Half the bucket elapsed: half the revenue.
    let half = wallet.collect_fees(REWARDS, T0 + BUCKET_LENGTH / 2).unwrap();
    assert_eq!(half, ext(600));

    // The other half at the bucket's end.
    let rest = wallet.collect_fees(REWARDS, T0 + BUCKET_LENGTH).unwrap();
    assert_eq!(rest, ext(600));
    assert_eq!(wallet.get_bucket(T0), 0);

    // Nothing left.
    assert_eq!(wallet.collect_fees(REWARDS, T0 + BUCKET_LENGTH + 1).unwrap(), 0);
    assert_eq!(token.read().balance_of(REWARDS), ext(1200));
}

#[test]
fn test_unevenly_spaced_collections_sum_to_deposit() {
    let (mut wallet, token) = setup();
    fill(&mut wallet, &token, ext(1000), ext(1000), T0, T0);

    let mut collected = 0u128;
    for now in [
        T0 + 7_919,
        T0 + BUCKET_LENGTH / 3,
        T0 + BUCKET_LENGTH / 3 + 11,
        T0 + BUCKET_LENGTH - 1,
        T0 + BUCKET_LENGTH + 5,
    ] {
        collected += wallet.collect_fees(REWARDS, now).unwrap();
    }
    // The re-derived linear share makes the bucket converge to exactly zero
    // by its end, so the parts sum back to the deposit.
    assert_eq!(collected, ext(1000));
    assert_eq!(wallet.get_bucket(T0), 0);
}

#[test]
fn test_deposit_amortizes_across_buckets() {
    let (mut wallet, token) = setup();
    // Mid-bucket start: the first bucket takes only the pro-rated half.
    fill(
        &mut wallet,
        &token,
        ext(2500),
        ext(1000),
        T0 + BUCKET_LENGTH / 2,
        T0,
    );
    assert_eq!(wallet.get_bucket(T0), ext(500));
    assert_eq!(wallet.get_bucket(T0 + BUCKET_LENGTH), ext(1000));
    assert_eq!(wallet.get_bucket(T0 + 2 * BUCKET_LENGTH), ext(1000));
    assert_eq!(wallet.total_bucketed(), ext(2500));
}

#[test]
fn test_backdated_fill_rejected() {
    let (mut wallet, token) = setup();
    token.write().approve(SUBSCRIBER, WALLET, ext(100)).unwrap();
    let err = wallet
        .fill_fee_buckets(SUBSCRIBER, ext(100), ext(100), T0, T0 + BUCKET_LENGTH)
        .unwrap_err();
    assert!(matches!(err, FeesWalletError::BackdatedBucket { .. }));
}

#[test]
fn test_zero_fill_rejected() {
    let (mut wallet, _token) = setup();
    assert_eq!(
        wallet.fill_fee_buckets(SUBSCRIBER, 0, ext(100), T0, T0),
        Err(FeesWalletError::ZeroAmount)
    );
    assert_eq!(
        wallet.fill_fee_buckets(SUBSCRIBER, ext(100), 0, T0, T0),
        Err(FeesWalletError::ZeroAmount)
    );
}

#[test]
fn test_collection_requires_designated_caller() {
    let (mut wallet, token) = setup();
    fill(&mut wallet, &token, ext(100), ext(100), T0, T0);
    assert!(wallet.collect_fees("mallory", T0 + 100).is_err());
}

#[test]
fn test_iteration_cap_spreads_catchup_over_calls() {
    let (mut wallet, token) = setup();
    // 30 buckets of 100 each.
    fill(&mut wallet, &token, ext(3000), ext(100), T0, T0);

    // Collection neglected for 31 bucket lengths: one call walks at most
    // MAX_BUCKET_ITERATIONS buckets.
    let far = T0 + 31 * BUCKET_LENGTH;
    let first = wallet.collect_fees(REWARDS, far).unwrap();
    assert_eq!(first, ext(100 * MAX_BUCKET_ITERATIONS as u64));

    let second = wallet.collect_fees(REWARDS, far).unwrap();
    assert_eq!(second, ext(3000) - first);
    assert_eq!(wallet.total_bucketed(), 0);
}

#[test]
fn test_outstanding_fees_projection() {
    let (mut wallet, token) = setup();
    fill(&mut wallet, &token, ext(1200), ext(1200), T0, T0);

    let now = T0 + 1;
    assert_eq!(
        wallet.get_outstanding_fees(T0, now),
        Err(FeesWalletError::InvalidAsOf { as_of: T0, now })
    );

    let as_of = T0 + BUCKET_LENGTH / 4;
    let projected = wallet.get_outstanding_fees(as_of, now).unwrap();
    assert_eq!(projected, ext(300));
    // The projection matches an actual collection at the same instant.
    assert_eq!(wallet.collect_fees(REWARDS, as_of).unwrap(), projected);
}

#[test]
fn test_bucket_migration_conserves_balance() {
    let (mut wallet, token) = setup();
    fill(&mut wallet, &token, ext(900), ext(300), T0, T0);

    let successor = shared(FeesWallet::new("fees-wallet-v2", access(), REWARDS, T0));
    successor.write().rewire(token.clone());
    wallet.set_next_wallet("adm", successor.clone()).unwrap();

    let target = T0 + BUCKET_LENGTH;
    wallet.migrate_bucket("mm", target).unwrap();

    assert_eq!(wallet.get_bucket(target), 0);
    assert_eq!(successor.read().get_bucket(target), ext(300));
    // Tokens moved with the bucket.
    assert_eq!(token.read().balance_of(WALLET), ext(600));
    assert_eq!(token.read().balance_of("fees-wallet-v2"), ext(300));
}

#[test]
fn test_bucket_migration_guards() {
    let (mut wallet, token) = setup();
    fill(&mut wallet, &token, ext(900), ext(300), T0, T0);
    let successor = shared(FeesWallet::new("fees-wallet-v2", access(), REWARDS, T0));
    successor.write().rewire(token.clone());
    wallet.set_next_wallet("adm", successor).unwrap();

    // Only the migration manager.
    assert!(wallet.migrate_bucket("fm", T0).is_err());
    // Bucket-start must be aligned.
    assert_eq!(
        wallet.migrate_bucket("mm", T0 + 7),
        Err(FeesWalletError::MisalignedBucket(T0 + 7))
    );
    // Empty buckets cannot be migrated.
    let empty = T0 + 5 * BUCKET_LENGTH;
    assert_eq!(
        wallet.migrate_bucket("mm", empty),
        Err(FeesWalletError::EmptyBucket(empty))
    );
}

#[test]
fn test_emergency_withdraw_sweeps_everything() {
    let (mut wallet, token) = setup();
    fill(&mut wallet, &token, ext(900), ext(300), T0, T0);

    let swept = wallet.emergency_withdraw("mm").unwrap();
    assert_eq!(swept, ext(900));
    assert_eq!(token.read().balance_of("mm"), ext(900));
    assert_eq!(token.read().balance_of(WALLET), 0);
}
