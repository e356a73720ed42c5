//! End-to-end poll scenarios: ingest, reverse batch processing, tallying.

mod test_extensions;

use maci_crypto::codec::field_to_biguint;
use maci_crypto::{Field, Keypair};
use maci_poll::error::PollError;
use num_bigint::BigUint;
use test_extensions::{setup, setup_with_batches, INITIAL_CREDITS};

#[test]
fn single_valid_vote_is_tallied() {
    let mut scenario = setup(1, 101);
    let voter = scenario.voters[0];
    scenario.publish_vote(1, 3, 5, 1, &voter, voter.public_key);
    scenario.process_all();
    scenario.tally_all();

    let poll = &scenario.maci.polls[scenario.poll_id];
    assert_eq!(poll.results[3], Field::from(5u64));
    assert_eq!(poll.total_spent_voice_credits, Field::from(25u64));
    assert_eq!(
        poll.state_leaves[1].voice_credit_balance,
        Field::from(INITIAL_CREDITS - 25)
    );
    // The poll spent against its snapshot; the registry is untouched.
    assert_eq!(
        scenario.maci.state_leaves[1].voice_credit_balance,
        Field::from(INITIAL_CREDITS)
    );
}

#[test]
fn key_change_shields_the_follow_up_vote() {
    let mut scenario = setup(1, 102);
    let original = scenario.voters[0];
    let replacement = Keypair::rand(&mut scenario.rng);

    // (a) nonce 1: weight 0, rotate the leaf key to the replacement.
    scenario.publish_vote(1, 0, 0, 1, &original, replacement.public_key);
    // (b) nonce 2: weight 4 on option 0, signed with the replacement key.
    scenario.publish_vote(1, 0, 4, 2, &replacement, replacement.public_key);
    scenario.process_all();

    // Reverse processing decodes (b) first, while the leaf still holds the
    // original key: signature mismatch, placeholder. Then (a) applies.
    let poll = &scenario.maci.polls[scenario.poll_id];
    assert_eq!(poll.ballots[1].votes[0], Field::from(0u64));
    assert_eq!(poll.state_leaves[1].pub_key, replacement.public_key);
    assert_eq!(poll.ballots[1].nonce, Field::from(1u64));

    scenario.tally_all();
    let poll = &scenario.maci.polls[scenario.poll_id];
    assert!(poll.results.iter().all(|r| *r == Field::from(0u64)));
}

#[test]
fn overspending_command_changes_nothing() {
    let mut scenario = setup(1, 103);
    let voter = scenario.voters[0];
    // 11^2 = 121 > 100 credits.
    scenario.publish_vote(1, 0, 11, 1, &voter, voter.public_key);
    scenario.process_all();
    scenario.tally_all();

    let poll = &scenario.maci.polls[scenario.poll_id];
    assert_eq!(poll.ballots[1].nonce, Field::from(0u64));
    assert!(poll.ballots[1].votes.iter().all(|v| *v == Field::from(0u64)));
    assert_eq!(
        poll.state_leaves[1].voice_credit_balance,
        Field::from(INITIAL_CREDITS)
    );
    assert!(poll.results.iter().all(|r| *r == Field::from(0u64)));
}

#[test]
fn topup_raises_the_balance_without_touching_the_ballot() {
    let mut scenario = setup(1, 104);
    scenario.publish_topup(1, 50);
    scenario.process_all();

    let poll = &scenario.maci.polls[scenario.poll_id];
    assert_eq!(
        poll.state_leaves[1].voice_credit_balance,
        Field::from(INITIAL_CREDITS + 50)
    );
    assert_eq!(poll.ballots[1].nonce, Field::from(0u64));
    assert!(poll.ballots[1].votes.iter().all(|v| *v == Field::from(0u64)));
}

#[test]
fn out_of_range_topup_collapses_to_a_no_op() {
    let mut scenario = setup(1, 105);
    scenario.publish_topup(9, 50);
    scenario.process_all();

    let poll = &scenario.maci.polls[scenario.poll_id];
    assert_eq!(
        poll.state_leaves[1].voice_credit_balance,
        Field::from(INITIAL_CREDITS)
    );
    assert_eq!(poll.state_leaves[0].voice_credit_balance, Field::from(0u64));
}

#[test]
fn partial_batch_is_padded_and_packed() {
    let mut scenario = setup(1, 106);
    let voter = scenario.voters[0];
    for nonce in 1..=3 {
        scenario.publish_vote(1, 0, 1, nonce, &voter, voter.public_key);
    }
    let inputs = scenario
        .maci
        .process_messages(scenario.poll_id, &mut scenario.rng)
        .unwrap();

    let poll = &scenario.maci.polls[scenario.poll_id];
    assert_eq!(poll.current_message_batch_index, Some(0));
    assert_eq!(inputs.batch_end_index, 3);
    assert_eq!(inputs.msgs.len(), 5);
    // The two padded slots repeat the last real message.
    assert_eq!(inputs.msgs[3], inputs.msgs[2]);
    assert_eq!(inputs.msgs[4], inputs.msgs[2]);

    // maxVoteOptions | numSignUps << 50 | batchStart << 100 | batchEnd << 150.
    let expected: BigUint = BigUint::from(25u64) + (BigUint::from(1u64) << 50) + (BigUint::from(3u64) << 150);
    assert_eq!(inputs.packed_vals, expected.to_str_radix(10));
}

#[test]
fn processing_lock_rejects_a_second_poll() {
    let mut scenario = setup(1, 107);
    let voter = scenario.voters[0];

    let second_poll = scenario.maci.deploy_poll(
        Field::from(10_000_000u64),
        maci_poll::parameters::MaxValues { max_messages: 25, max_vote_options: 25 },
        maci_poll::parameters::TreeDepths {
            state_tree_depth: test_extensions::STATE_TREE_DEPTH,
            message_tree_depth: test_extensions::MESSAGE_TREE_DEPTH,
            vote_option_tree_depth: test_extensions::VOTE_OPTION_TREE_DEPTH,
        },
        maci_poll::parameters::BatchSizes {
            message_batch_size: 5,
            tally_batch_size: 5,
            subsidy_batch_size: 5,
        },
        scenario.coordinator,
    );

    // Two batches worth of messages keeps poll 0 mid-processing after one
    // call, so the lock stays held.
    for nonce in 1..=6 {
        scenario.publish_vote(1, 0, 1, nonce, &voter, voter.public_key);
    }
    scenario
        .maci
        .process_messages(scenario.poll_id, &mut scenario.rng)
        .unwrap();
    assert_eq!(
        scenario
            .maci
            .process_messages(second_poll, &mut scenario.rng)
            .unwrap_err(),
        PollError::PollAlreadyBeingProcessed { requested: second_poll, current: 0 }
    );

    // Draining poll 0 releases the lock; poll 1 can then run.
    scenario.process_all();
    scenario
        .maci
        .process_messages(second_poll, &mut scenario.rng)
        .unwrap();
}

#[test]
fn accepted_commands_conserve_credits() {
    let mut scenario = setup(3, 108);
    let voters = scenario.voters.clone();
    // Reverse processing resolves the newest message first, so a voter's
    // command chain carries descending nonces in submission order: the
    // weight-6 re-vote below is processed after (and on top of) the
    // weight-4 vote published last.
    scenario.publish_vote(1, 2, 6, 2, &voters[0], voters[0].public_key);
    scenario.publish_vote(2, 7, 9, 1, &voters[1], voters[1].public_key);
    scenario.publish_vote(3, 0, 10, 1, &voters[2], voters[2].public_key);
    scenario.publish_vote(1, 2, 4, 1, &voters[0], voters[0].public_key);
    scenario.process_all();

    let poll = &scenario.maci.polls[scenario.poll_id];
    for (index, ballot) in poll.ballots.iter().enumerate() {
        let spent: BigUint = ballot
            .votes
            .iter()
            .map(|v| field_to_biguint(v) * field_to_biguint(v))
            .sum();
        let balance = field_to_biguint(&poll.state_leaves[index].voice_credit_balance);
        let budget = if index == 0 {
            BigUint::from(0u64)
        } else {
            BigUint::from(INITIAL_CREDITS)
        };
        assert_eq!(balance + spent, budget, "leaf {index} does not balance");
    }
    assert_eq!(poll.ballots[1].votes[2], Field::from(6u64));
    assert_eq!(poll.ballots[1].nonce, Field::from(2u64));
}

#[test]
fn final_roots_are_independent_of_batch_size() {
    let run = |message_batch_size: usize| {
        let mut scenario = setup_with_batches(
            2,
            109,
            maci_poll::parameters::BatchSizes {
                message_batch_size,
                tally_batch_size: 5,
                subsidy_batch_size: 5,
            },
        );
        let voters = scenario.voters.clone();
        for nonce in 1..=4 {
            scenario.publish_vote(1, 1, 1, nonce, &voters[0], voters[0].public_key);
        }
        scenario.publish_vote(2, 4, 7, 1, &voters[1], voters[1].public_key);
        scenario.publish_topup(2, 30);
        scenario.process_all();
        let poll = &scenario.maci.polls[scenario.poll_id];
        (poll.state_tree.as_ref().unwrap().root(), poll.ballot_tree.as_ref().unwrap().root())
    };

    // Same seed, same messages: the settled roots must not depend on how
    // the message log was chunked.
    assert_eq!(run(5), run(25));
}
