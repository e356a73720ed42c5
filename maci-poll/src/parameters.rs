//! Poll sizing parameters.

use serde::{Deserialize, Serialize};

/// Depths of the three incremental trees a poll maintains. The state and
/// ballot trees share `state_tree_depth`; the vote-option tree sizes each
/// ballot's vote vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TreeDepths {
    pub state_tree_depth: usize,
    pub message_tree_depth: usize,
    pub vote_option_tree_depth: usize,
}

/// Batch widths of the three processing phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchSizes {
    /// Messages consumed per `process_messages` call. Must be a power of
    /// five so a batch is an aligned message-tree subtree.
    pub message_batch_size: usize,
    pub tally_batch_size: usize,
    pub subsidy_batch_size: usize,
}

/// Caps enforced on ingest and command validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MaxValues {
    pub max_messages: usize,
    pub max_vote_options: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    const GOLDEN_TREE_DEPTHS_JSON: &str = r#"
    {
        "stateTreeDepth": 10,
        "messageTreeDepth": 2,
        "voteOptionTreeDepth": 2
    }
    "#;

    const GOLDEN_BATCH_SIZES_JSON: &str = r#"
    {
        "messageBatchSize": 5,
        "tallyBatchSize": 5,
        "subsidyBatchSize": 5
    }
    "#;

    const GOLDEN_MAX_VALUES_JSON: &str = r#"
    {
        "maxMessages": 25,
        "maxVoteOptions": 25
    }
    "#;

    #[test]
    fn golden_parameters_deserialization() {
        let depths: TreeDepths = serde_json::from_str(GOLDEN_TREE_DEPTHS_JSON)
            .expect("Deserializing TreeDepths should not fail");
        assert_eq!(depths.state_tree_depth, 10);

        let batches: BatchSizes = serde_json::from_str(GOLDEN_BATCH_SIZES_JSON)
            .expect("Deserializing BatchSizes should not fail");
        assert_eq!(batches.message_batch_size, 5);

        let maxes: MaxValues = serde_json::from_str(GOLDEN_MAX_VALUES_JSON)
            .expect("Deserializing MaxValues should not fail");
        assert_eq!(maxes.max_vote_options, 25);
    }

    #[test]
    fn parameters_round_trip_through_json() {
        let depths = TreeDepths {
            state_tree_depth: 10,
            message_tree_depth: 2,
            vote_option_tree_depth: 2,
        };
        let encoded = serde_json::to_string(&depths).expect("Serializing should not fail");
        let decoded: TreeDepths = serde_json::from_str(&encoded).expect("Round trip should not fail");
        assert_eq!(decoded, depths);
    }
}
