//! Per-voter ballots.

use ark_ff::Zero;
use maci_crypto::hashing::hash_left_right;
use maci_crypto::merkle_tree::TREE_ARITY;
use maci_crypto::{Field, IncrementalQuinTree};

/// A voter's running vote state: one weight per option plus the nonce of the
/// last accepted command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ballot {
    pub nonce: Field,
    pub votes: Vec<Field>,
    pub vote_option_tree_depth: usize,
}

impl Ballot {
    /// A fresh ballot: zero nonce, zero weight on every option of a
    /// `vote_option_tree_depth`-deep quinary option tree.
    pub fn blank(vote_option_tree_depth: usize) -> Self {
        Self {
            nonce: Field::zero(),
            votes: vec![Field::zero(); TREE_ARITY.pow(vote_option_tree_depth as u32)],
            vote_option_tree_depth,
        }
    }

    /// Root of the quinary tree holding this ballot's vote weights.
    pub fn votes_root(&self) -> Field {
        self.votes_tree().root()
    }

    /// The vote weights as a quinary tree, for roots and per-option paths.
    pub fn votes_tree(&self) -> IncrementalQuinTree {
        let mut tree = IncrementalQuinTree::new(self.vote_option_tree_depth, Field::zero());
        for vote in &self.votes {
            tree.insert(*vote);
        }
        tree
    }

    /// Ballot leaf hash: nonce bound to the vote-weight root.
    pub fn hash(&self) -> Field {
        hash_left_right(self.nonce, self.votes_root())
    }

    /// The ballot as the circuits consume it.
    pub fn as_circuit_inputs(&self) -> [Field; 2] {
        [self.nonce, self.votes_root()]
    }
}
