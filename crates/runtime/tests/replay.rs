mod common;

use std::sync::Arc;

use runtime::{ReplayVerifier, RuntimeError, World, verify_event_log};
use sim_core::{ChainError, HashChain, SimError};

use common::{add_command, kernel, script, world};

fn rules_digest() -> String {
    world("w1").world_rules_digest
}

fn recorded(ticks: u64) -> World {
    let mut world = World::new(world("w1"), Arc::new(kernel())).unwrap();
    for commands in script(ticks) {
        world.tick(&commands).unwrap();
    }
    world
}

#[test]
fn honest_log_replays() {
    let recorded = recorded(10);
    let verifier = ReplayVerifier::new(Arc::new(kernel()));

    let summary = verifier
        .replay(&world("w1"), &rules_digest(), &script(10), recorded.records())
        .unwrap();

    assert_eq!(summary.ticks, 10);
    assert_eq!(summary.next_tick, 10);
    assert_eq!(summary.chain_head, recorded.snapshot().chain_head);
    assert_eq!(summary.state_hash, recorded.snapshot().state_hash);
}

#[test]
fn forked_input_is_reported_at_the_divergent_tick() {
    let recorded = recorded(10);
    let verifier = ReplayVerifier::new(Arc::new(kernel()));

    let mut inputs = script(10);
    inputs[6] = vec![add_command(6, "counter.b", 1)];

    let err = verifier
        .replay(&world("w1"), &rules_digest(), &inputs, recorded.records())
        .unwrap_err();
    assert!(matches!(
        err,
        RuntimeError::Chain(ChainError::HashChainMismatch { tick_index: 6, .. })
    ));
    assert_eq!(err.error_code(), "hash_chain_mismatch");
}

#[test]
fn forged_state_hash_is_a_divergence() {
    let recorded = recorded(5);
    let mut records = recorded.records().to_vec();
    records[3].state_hash = sim_core::sha256_hex("forged");

    let err = ReplayVerifier::new(Arc::new(kernel()))
        .replay(&world("w1"), &rules_digest(), &script(5), &records)
        .unwrap_err();
    assert!(matches!(err, RuntimeError::StateDivergence { tick_index: 3, .. }));
}

#[test]
fn tampered_record_breaks_linkage_before_replay() {
    let recorded = recorded(5);
    let mut records = recorded.records().to_vec();
    records[2].events_batch_hash = sim_core::sha256_hex("other batch");

    let err = ReplayVerifier::new(Arc::new(kernel()))
        .replay(&world("w1"), &rules_digest(), &script(5), &records)
        .unwrap_err();
    assert!(matches!(
        err,
        RuntimeError::Chain(ChainError::HashChainMismatch { tick_index: 2, .. })
    ));
}

#[test]
fn input_length_must_match_log() {
    let recorded = recorded(4);
    let err = ReplayVerifier::new(Arc::new(kernel()))
        .replay(&world("w1"), &rules_digest(), &script(3), recorded.records())
        .unwrap_err();
    assert!(matches!(
        err,
        RuntimeError::LogLengthMismatch {
            inputs: 3,
            records: 4
        }
    ));
}

#[test]
fn foreign_kernel_version_is_refused() {
    let recorded = recorded(3);
    let mut foreign = world("w1");
    foreign.kernel_version = "9.9.9".to_string();
    let verifier = ReplayVerifier::new(Arc::new(kernel()));

    let err = verifier
        .replay(&foreign, &rules_digest(), &script(3), recorded.records())
        .unwrap_err();
    assert!(matches!(
        &err,
        RuntimeError::KernelVersionMismatch { actual, .. } if actual == "9.9.9"
    ));
    assert_eq!(err.error_code(), "kernel_version_mismatch");

    assert!(World::new(foreign, Arc::new(kernel())).is_err());
}

#[test]
fn stored_digest_must_match_the_packs() {
    let recorded = recorded(3);
    let mut forged = world("w1");
    forged.world_rules_digest = "0".repeat(64);
    let verifier = ReplayVerifier::new(Arc::new(kernel()));

    // even a caller that expects the forged digest is refused
    let err = verifier.check_rules(&forged, &"0".repeat(64)).unwrap_err();
    assert!(matches!(
        &err,
        RuntimeError::RulesDigestMismatch { expected, actual }
            if *expected == rules_digest() && *actual == "0".repeat(64)
    ));

    let err = verifier
        .replay(&forged, &"0".repeat(64), &script(3), recorded.records())
        .unwrap_err();
    assert!(matches!(err, RuntimeError::RulesDigestMismatch { .. }));

    let err = World::new(forged, Arc::new(kernel())).err().unwrap();
    assert_eq!(err.error_code(), "rules_digest_mismatch");
}

#[test]
fn replay_requires_the_expected_digest() {
    let recorded = recorded(3);
    let err = ReplayVerifier::new(Arc::new(kernel()))
        .replay(&world("w1"), &"1".repeat(64), &script(3), recorded.records())
        .unwrap_err();
    assert!(matches!(err, RuntimeError::RulesDigestMismatch { .. }));
}

#[test]
fn rules_digest_is_checked() {
    let genesis = world("w1");
    let verifier = ReplayVerifier::new(Arc::new(kernel()));

    verifier
        .check_rules(&genesis, &genesis.world_rules_digest)
        .unwrap();
    let err = verifier.check_rules(&genesis, "0".repeat(64).as_str()).unwrap_err();
    assert!(matches!(err, RuntimeError::RulesDigestMismatch { .. }));
}

#[test]
fn replay_continues_from_a_mid_chain_envelope() {
    let mut source = World::new(world("w1"), Arc::new(kernel())).unwrap();
    let inputs = script(8);
    for commands in &inputs[..4] {
        source.tick(commands).unwrap();
    }
    let checkpoint = source.snapshot().clone();
    for commands in &inputs[4..] {
        source.tick(commands).unwrap();
    }

    let tail = &source.records()[4..];
    let summary = ReplayVerifier::new(Arc::new(kernel()))
        .replay(&checkpoint, &checkpoint.world_rules_digest, &inputs[4..], tail)
        .unwrap();
    assert_eq!(summary.next_tick, 8);
    assert_eq!(summary.chain_head, source.snapshot().chain_head);
}

#[test]
fn event_log_verifies_without_re_execution() {
    let recorded = recorded(6);
    let log = recorded.log();

    let end = log.verify().unwrap();
    assert_eq!(end.length, 6);
    assert_eq!(end.head, recorded.snapshot().chain_head);

    let batches: Vec<_> = (0..6)
        .map(|tick| log.events_at(tick).unwrap().to_vec())
        .collect();
    let mut tampered = batches.clone();
    tampered[4].pop();

    let genesis = HashChain::genesis("w1");
    assert_eq!(
        verify_event_log(&genesis, log.records(), &batches).unwrap(),
        end
    );
    let err = verify_event_log(&genesis, log.records(), &tampered).unwrap_err();
    assert!(matches!(
        err,
        RuntimeError::Chain(ChainError::HashChainMismatch { tick_index: 4, .. })
    ));
}

#[test]
fn failed_tick_is_not_logged() {
    let mut world = World::new(world("w1"), Arc::new(kernel())).unwrap();
    world.tick(&[]).unwrap();
    let before = world.snapshot().clone();

    assert!(world.tick(&[common::explode_command(1)]).is_err());
    assert_eq!(world.snapshot(), &before);
    assert_eq!(world.log().len(), 1);
    assert_eq!(world.tick_index(), 1);
    assert_eq!(world.rules_digest(), before.world_rules_digest);
}
