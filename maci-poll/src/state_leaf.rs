//! Voter records.

use ark_ff::Zero;
use maci_crypto::hashing::hash4;
use maci_crypto::{Field, PublicKey};

/// One registered voter: key, remaining voice credits, signup time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateLeaf {
    pub pub_key: PublicKey,
    pub voice_credit_balance: Field,
    pub timestamp: Field,
}

impl StateLeaf {
    pub fn new(pub_key: PublicKey, voice_credit_balance: Field, timestamp: Field) -> Self {
        Self { pub_key, voice_credit_balance, timestamp }
    }

    /// The sentinel at index 0 of the state tree: the padding key (unknown
    /// discrete log, so nobody can sign for it) with an empty balance.
    pub fn blank() -> Self {
        Self {
            pub_key: PublicKey::pad_key(),
            voice_credit_balance: Field::zero(),
            timestamp: Field::zero(),
        }
    }

    pub fn hash(&self) -> Field {
        hash4([
            self.pub_key.x,
            self.pub_key.y,
            self.voice_credit_balance,
            self.timestamp,
        ])
    }

    /// The leaf as the circuits consume it.
    pub fn as_circuit_inputs(&self) -> [Field; 4] {
        [
            self.pub_key.x,
            self.pub_key.y,
            self.voice_credit_balance,
            self.timestamp,
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_leaf_uses_the_pad_key() {
        let blank = StateLeaf::blank();
        assert_eq!(blank.pub_key, PublicKey::pad_key());
        assert_eq!(blank.voice_credit_balance, Field::zero());
        assert_eq!(blank.hash(), StateLeaf::blank().hash());
    }

    #[test]
    fn hash_binds_the_balance() {
        let mut leaf = StateLeaf::blank();
        leaf.voice_credit_balance = Field::from(100u64);
        assert_ne!(leaf.hash(), StateLeaf::blank().hash());
    }
}
