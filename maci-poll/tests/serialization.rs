//! Persistence round-trips: a poll serialized mid-lifecycle reloads into an
//! equal poll with identical tree roots.

mod test_extensions;

use maci_crypto::Field;
use maci_poll::logging::discard_logger;
use maci_poll::poll::{Poll, PollJson};
use test_extensions::setup;

#[test]
fn round_trip_before_processing() {
    let mut scenario = setup(2, 130);
    let voters = scenario.voters.clone();
    scenario.publish_vote(1, 3, 5, 1, &voters[0], voters[0].public_key);
    scenario.publish_topup(2, 25);

    let poll = &scenario.maci.polls[scenario.poll_id];
    let encoded = serde_json::to_string_pretty(&poll.to_json()).unwrap();
    let decoded: PollJson = serde_json::from_str(&encoded).unwrap();
    let mut reloaded = Poll::from_json(scenario.poll_id, &decoded, &discard_logger()).unwrap();
    reloaded.restore_state(
        &scenario.maci.state_leaves,
        &scenario.maci.state_tree,
        scenario.maci.num_sign_ups,
    );

    let poll = &scenario.maci.polls[scenario.poll_id];
    assert!(reloaded == *poll);
    assert_eq!(reloaded.message_tree.root(), poll.message_tree.root());
    assert_eq!(reloaded.commands, poll.commands);
}

#[test]
fn round_trip_after_processing_preserves_roots_and_progress() {
    let mut scenario = setup(2, 131);
    let voters = scenario.voters.clone();
    scenario.publish_vote(1, 3, 5, 1, &voters[0], voters[0].public_key);
    scenario.publish_vote(2, 0, 7, 1, &voters[1], voters[1].public_key);
    scenario.process_all();
    scenario.tally_all();

    let poll = &scenario.maci.polls[scenario.poll_id];
    let encoded = serde_json::to_string(&poll.to_json()).unwrap();
    let decoded: PollJson = serde_json::from_str(&encoded).unwrap();
    let mut reloaded = Poll::from_json(scenario.poll_id, &decoded, &discard_logger()).unwrap();
    reloaded.restore_state(
        &scenario.maci.state_leaves,
        &scenario.maci.state_tree,
        scenario.maci.num_sign_ups,
    );

    let poll = &scenario.maci.polls[scenario.poll_id];
    assert!(reloaded == *poll);
    assert_eq!(
        reloaded.state_tree.as_ref().unwrap().root(),
        poll.state_tree.as_ref().unwrap().root()
    );
    assert_eq!(
        reloaded.ballot_tree.as_ref().unwrap().root(),
        poll.ballot_tree.as_ref().unwrap().root()
    );
    assert_eq!(reloaded.results, poll.results);
    assert_eq!(reloaded.num_batches_processed, poll.num_batches_processed);
    assert_eq!(
        reloaded.current_message_batch_index,
        poll.current_message_batch_index
    );
    assert_eq!(reloaded.ballots, poll.ballots);
    assert_eq!(reloaded.state_leaves, poll.state_leaves);
}

#[test]
fn persisted_layout_is_stable() {
    let mut scenario = setup(1, 132);
    let voters = scenario.voters.clone();
    scenario.publish_vote(1, 0, 2, 1, &voters[0], voters[0].public_key);
    scenario.publish_topup(1, 10);

    let value: serde_json::Value =
        serde_json::to_value(scenario.maci.polls[scenario.poll_id].to_json()).unwrap();
    for key in [
        "pollEndTimestamp",
        "treeDepths",
        "batchSizes",
        "maxValues",
        "messages",
        "commands",
        "ballots",
        "encPubKeys",
        "currentMessageBatchIndex",
        "stateLeaves",
        "results",
        "numBatchesProcessed",
    ] {
        assert!(value.get(key).is_some(), "missing persisted key {key}");
    }
    assert_eq!(value["commands"][0]["cmdType"], "1");
    assert_eq!(value["commands"][1]["cmdType"], "2");
    // Big integers travel as decimal strings.
    assert!(value["messages"][0]["data"][0].is_string());
    assert!(value["results"][0].is_string());
}

#[test]
fn copies_do_not_share_mutable_state() {
    let mut scenario = setup(1, 133);
    let voters = scenario.voters.clone();
    scenario.publish_vote(1, 1, 3, 1, &voters[0], voters[0].public_key);

    let original = scenario.maci.polls[scenario.poll_id].clone();
    scenario.process_all();
    scenario.tally_all();

    // The clone kept its pre-processing view.
    assert_eq!(original.num_batches_processed, 0);
    assert!(original.ballots.is_empty());
    assert_eq!(original.results[1], Field::from(0u64));
    let processed = &scenario.maci.polls[scenario.poll_id];
    assert_eq!(processed.results[1], Field::from(3u64));
    // Parameters and messages still agree, so the polls still compare equal.
    assert!(original == *processed);
}
