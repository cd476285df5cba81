//! Delegation ledger integration tests
//!
//! Exercises the ledger against the in-memory collaborators and checks the
//! aggregate invariants after sequences of delegate / stake-change / import
//! operations.

use delegations::{DelegationEvent, DelegationsDeps, DelegationsError, DelegationsLedger};
use meridian_core::constants::TOKEN_BASE;
use meridian_core::registry::{shared, Shared};
use meridian_core::testkit::{FixedCommittee, RecordingDelegationListener, RecordingStaking};
use meridian_core::{AccessControl, DelegationsView, VOID_ADDRESS};

const STAKING: &str = "staking-contract";

fn ext(tokens: u64) -> u128 {
    tokens as u128 * TOKEN_BASE
}

struct Harness {
    ledger: DelegationsLedger,
    committee: Shared<FixedCommittee>,
    listener: Shared<RecordingDelegationListener>,
    staking: Shared<RecordingStaking>,
}

fn setup() -> Harness {
    let committee = shared(FixedCommittee::new());
    let listener = shared(RecordingDelegationListener::new());
    let staking = shared(RecordingStaking::new());
    let mut ledger = DelegationsLedger::new(
        "delegations-contract",
        AccessControl::new("fm", "mm", "adm"),
        STAKING,
    );
    ledger.rewire(DelegationsDeps {
        committee: committee.clone(),
        rewards: listener.clone(),
        stake_balances: staking.clone(),
    });
    Harness {
        ledger,
        committee,
        listener,
        staking,
    }
}

/// `total_delegated_stake` must equal the sum of own stakes of all owners
/// whose effective delegate is self-delegating (void excluded), and every
/// delegate's uncapped stake must equal the sum of its delegators' stakes.
fn check_invariants(ledger: &DelegationsLedger, owners: &[&str]) {
    let mut expected_total: u128 = 0;
    for owner in owners {
        let (delegate, own_stake) = ledger.get_delegation_info(owner);
        let delegate_is_self = delegate != VOID_ADDRESS && ledger.get_delegation(&delegate) == delegate;
        if delegate_is_self {
            expected_total += own_stake;
        }
    }
    assert_eq!(ledger.get_total_delegated_stake(), expected_total);

    let mut delegates: Vec<String> = owners.iter().map(|o| ledger.get_delegation(o)).collect();
    delegates.sort();
    delegates.dedup();
    for delegate in &delegates {
        let expected: u128 = owners
            .iter()
            .filter(|o| &ledger.get_delegation(o) == delegate)
            .map(|o| ledger.get_delegation_info(o).1)
            .sum();
        assert_eq!(
            meridian_core::units::to_external(DelegationsView::uncapped_stake_of(ledger, delegate)),
            expected,
            "uncapped stake of {} out of sync",
            delegate
        );
    }
}

#[test]
fn test_delegation_moves_effective_weight() {
    // Scenario: a delegator stakes 100 and delegates to guardian g1; g1's
    // effective weight becomes 100. Un-delegating sets it back to 0.
    let mut h = setup();
    h.ledger
        .stake_change(STAKING, "alice", ext(100), 1_000)
        .unwrap();
    assert_eq!(h.ledger.get_delegated_stake("alice"), ext(100));

    h.ledger.delegate("alice", "g1", 1_001).unwrap();
    assert_eq!(h.ledger.get_delegated_stake("g1"), ext(100));
    assert_eq!(h.ledger.get_delegated_stake("alice"), 0);
    assert_eq!(h.ledger.get_total_delegated_stake(), ext(100));

    // The committee saw g1's new effective weight and the network total.
    let changes = h.committee.read().weight_changes.clone();
    assert!(changes.contains(&("g1".to_string(), 100_000, 100_000)));

    // Un-delegate: back to self.
    h.ledger.delegate("alice", "alice", 1_002).unwrap();
    assert_eq!(h.ledger.get_delegated_stake("g1"), 0);
    assert_eq!(h.ledger.get_delegated_stake("alice"), ext(100));
    check_invariants(&h.ledger, &["alice", "g1"]);
}

#[test]
fn test_rewards_settle_before_the_edge_moves() {
    let mut h = setup();
    h.ledger
        .stake_change(STAKING, "alice", ext(100), 1_000)
        .unwrap();
    h.ledger.delegate("alice", "g1", 1_001).unwrap();

    let notifications = h.listener.read().notifications.clone();
    // Stake change first: alice's own (implicit self) delegation at stake 0.
    assert_eq!(notifications[0].guardian, "alice");
    assert_eq!(notifications[0].delegator_stake, 0);
    // Then the delegation change, with pre-change values: alice still held
    // her own 100, g1 held nothing yet.
    assert_eq!(notifications[1].guardian, "alice");
    assert_eq!(notifications[1].delegated_stake, 100_000);
    assert_eq!(notifications[1].delegator_stake, 100_000);
    assert_eq!(notifications[1].next_guardian, "g1");
    assert_eq!(notifications[1].next_guardian_delegated_stake, 0);
}

#[test]
fn test_stake_changes_track_delegate_aggregate() {
    let mut h = setup();
    h.ledger.delegate("alice", "g1", 1_000).unwrap();
    h.ledger.delegate("bob", "g1", 1_001).unwrap();
    h.ledger
        .stake_change(STAKING, "alice", ext(300), 1_002)
        .unwrap();
    h.ledger
        .stake_change(STAKING, "bob", ext(200), 1_003)
        .unwrap();
    h.ledger
        .stake_change(STAKING, "g1", ext(50), 1_004)
        .unwrap();

    assert_eq!(h.ledger.get_delegated_stake("g1"), ext(550));
    assert_eq!(h.ledger.get_total_delegated_stake(), ext(550));

    // Lowering a delegator's stake shrinks the aggregate.
    h.ledger
        .stake_change(STAKING, "alice", ext(120), 1_005)
        .unwrap();
    assert_eq!(h.ledger.get_delegated_stake("g1"), ext(370));
    check_invariants(&h.ledger, &["alice", "bob", "g1"]);
}

#[test]
fn test_batch_stake_change_processes_owners_independently() {
    let mut h = setup();
    h.ledger.delegate("bob", "g1", 1_000).unwrap();
    h.ledger
        .stake_change_batch(
            STAKING,
            &[
                ("alice".to_string(), ext(10)),
                ("bob".to_string(), ext(20)),
                ("g1".to_string(), ext(5)),
            ],
            1_001,
        )
        .unwrap();

    assert_eq!(h.ledger.get_delegated_stake("alice"), ext(10));
    assert_eq!(h.ledger.get_delegated_stake("g1"), ext(25));
    assert_eq!(h.ledger.get_total_delegated_stake(), ext(35));
    check_invariants(&h.ledger, &["alice", "bob", "g1"]);
}

#[test]
fn test_delegating_away_removes_received_stake_from_governance() {
    // g1 receives delegations, then delegates elsewhere itself: everything
    // it holds leaves the governance total (no double counting).
    let mut h = setup();
    h.ledger
        .stake_change(STAKING, "alice", ext(100), 1_000)
        .unwrap();
    h.ledger.delegate("alice", "g1", 1_001).unwrap();
    h.ledger
        .stake_change(STAKING, "g1", ext(40), 1_002)
        .unwrap();
    assert_eq!(h.ledger.get_total_delegated_stake(), ext(140));

    h.ledger.delegate("g1", "g2", 1_003).unwrap();
    // g1 is no longer self-delegating: alice's 100 count for nothing, g1's
    // own 40 now count through g2.
    assert_eq!(h.ledger.get_delegated_stake("g1"), 0);
    assert_eq!(h.ledger.get_delegated_stake("g2"), ext(40));
    assert_eq!(h.ledger.get_total_delegated_stake(), ext(40));
    check_invariants(&h.ledger, &["alice", "g1", "g2"]);
}

#[test]
fn test_delegation_events_carry_both_sides() {
    let mut h = setup();
    h.ledger
        .stake_change(STAKING, "alice", ext(100), 1_000)
        .unwrap();
    h.ledger.drain_events();
    h.ledger.delegate("alice", "g1", 1_001).unwrap();

    let events = h.ledger.drain_events();
    assert_eq!(
        events[0],
        DelegationEvent::Delegated {
            from: "alice".to_string(),
            to: "g1".to_string(),
        }
    );
    // Old delegate loses the stake, new delegate gains it.
    assert_eq!(
        events[1],
        DelegationEvent::DelegatedStakeChanged {
            delegate: "alice".to_string(),
            self_stake: 0,
            delegated_stake: 0,
            delegators: vec!["alice".to_string()],
            delegator_stakes: vec![0],
        }
    );
    assert_eq!(
        events[2],
        DelegationEvent::DelegatedStakeChanged {
            delegate: "g1".to_string(),
            self_stake: 0,
            delegated_stake: ext(100),
            delegators: vec!["alice".to_string()],
            delegator_stakes: vec![ext(100)],
        }
    );
}

#[test]
fn test_import_delegations_bulk_path() {
    let mut h = setup();
    {
        let mut staking = h.staking.write();
        staking.set_stake_balance("d1", ext(10));
        staking.set_stake_balance("d2", ext(20));
        staking.set_stake_balance("d3", ext(30));
    }

    h.ledger
        .import_delegations(
            "adm",
            &["d1".to_string(), "d2".to_string(), "d3".to_string()],
            "g1",
            true,
            1_000,
        )
        .unwrap();

    assert_eq!(h.ledger.get_delegation("d1"), "g1");
    assert_eq!(h.ledger.get_delegated_stake("g1"), ext(60));
    assert_eq!(h.ledger.get_total_delegated_stake(), ext(60));
    check_invariants(&h.ledger, &["d1", "d2", "d3", "g1"]);

    let events = h.ledger.drain_events();
    assert!(events.contains(&DelegationEvent::DelegationsImported {
        from: vec!["d1".to_string(), "d2".to_string(), "d3".to_string()],
        to: "g1".to_string(),
    }));
}

#[test]
fn test_import_rejects_touched_addresses() {
    let mut h = setup();
    h.staking.write().set_stake_balance("d1", ext(10));
    h.ledger.delegate("d1", "g2", 1_000).unwrap();

    assert_eq!(
        h.ledger
            .import_delegations("adm", &["d1".to_string()], "g1", false, 1_001),
        Err(DelegationsError::AlreadyInitialized("d1".to_string()))
    );
}

#[test]
fn test_import_requires_admin_and_finalization_latch() {
    let mut h = setup();
    h.staking.write().set_stake_balance("d1", ext(10));

    assert!(h
        .ledger
        .import_delegations("fm", &["d1".to_string()], "g1", false, 1_000)
        .is_err());

    h.ledger.finalize_delegation_import("adm").unwrap();
    // Finalizing twice is a silent no-op.
    h.ledger.finalize_delegation_import("adm").unwrap();
    assert!(h.ledger.import_is_finalized());

    assert_eq!(
        h.ledger
            .import_delegations("adm", &["d1".to_string()], "g1", false, 1_001),
        Err(DelegationsError::ImportFinalized)
    );
}

#[test]
fn test_width_overflow_rejected_before_mutation() {
    let mut h = setup();
    let too_big = (u64::MAX as u128 + 1) * 1_000_000_000_000_000;
    let err = h
        .ledger
        .stake_change(STAKING, "alice", too_big, 1_000)
        .unwrap_err();
    assert!(matches!(err, DelegationsError::Core(_)));
    assert_eq!(h.ledger.get_delegated_stake("alice"), 0);
    assert_eq!(h.ledger.get_total_delegated_stake(), 0);
}

#[test]
fn test_events_serialize_for_offchain_history() {
    let mut h = setup();
    h.ledger
        .stake_change(STAKING, "alice", ext(100), 1_000)
        .unwrap();
    h.ledger.delegate("alice", "g1", 1_001).unwrap();

    let events = h.ledger.drain_events();
    let json = serde_json::to_string(&events).unwrap();
    let decoded: Vec<DelegationEvent> = serde_json::from_str(&json).unwrap();
    assert_eq!(decoded, events);
}

#[test]
fn test_invariants_hold_under_mixed_sequences() {
    let mut h = setup();
    let owners = ["a", "b", "c", "g1", "g2"];
    h.ledger.stake_change(STAKING, "a", ext(7), 1).unwrap();
    h.ledger.stake_change(STAKING, "b", ext(13), 2).unwrap();
    h.ledger.delegate("a", "g1", 3).unwrap();
    h.ledger.stake_change(STAKING, "c", ext(29), 4).unwrap();
    h.ledger.delegate("b", "g1", 5).unwrap();
    h.ledger.delegate("c", "g2", 6).unwrap();
    h.ledger.stake_change(STAKING, "a", ext(11), 7).unwrap();
    h.ledger.delegate("g1", "g2", 8).unwrap();
    h.ledger.delegate("b", VOID_ADDRESS, 9).unwrap();
    h.ledger.stake_change(STAKING, "g2", ext(3), 10).unwrap();
    h.ledger.delegate("g1", "g1", 11).unwrap();

    check_invariants(&h.ledger, &owners);
}
