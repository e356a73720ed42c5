//! Encrypted messages as they arrive on the wire.

use ark_ff::Zero;
use maci_crypto::hashing::hash5;
use maci_crypto::{Field, PublicKey};

/// Number of field words in a message body: a 7-word command ciphertext
/// padded to a full sponge block plus its authentication tag.
pub const MESSAGE_DATA_LENGTH: usize = 10;

/// Message type of encrypted vote / key-change commands.
pub const MESSAGE_TYPE_VOTE: u64 = 1;
/// Message type of voice-credit topups.
pub const MESSAGE_TYPE_TOPUP: u64 = 2;

/// An opaque 10-word payload plus its type tag. Vote messages carry a
/// command ciphertext; topup messages carry `(state_index, amount)` in the
/// first two words.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Message {
    pub msg_type: Field,
    pub data: [Field; MESSAGE_DATA_LENGTH],
}

impl Message {
    pub fn new(msg_type: Field, data: [Field; MESSAGE_DATA_LENGTH]) -> Self {
        Self { msg_type, data }
    }

    /// The all-zero vote-type message used to right-pad circuit batches.
    pub fn blank() -> Self {
        Self {
            msg_type: Field::from(MESSAGE_TYPE_VOTE),
            data: [Field::zero(); MESSAGE_DATA_LENGTH],
        }
    }

    /// Canonical message hash, the leaf stored in the message tree: the two
    /// five-word halves are compressed separately, then combined with the
    /// encryption public key and a zero pad.
    pub fn hash(&self, enc_pub_key: &PublicKey) -> Field {
        let left = hash5(self.data[..5].try_into().expect("five words"));
        let right = hash5(self.data[5..].try_into().expect("five words"));
        hash5([left, right, enc_pub_key.x, enc_pub_key.y, Field::zero()])
    }

    /// The message as the circuits consume it: type tag followed by the
    /// payload words.
    pub fn as_circuit_inputs(&self) -> Vec<Field> {
        let mut words = Vec::with_capacity(1 + MESSAGE_DATA_LENGTH);
        words.push(self.msg_type);
        words.extend_from_slice(&self.data);
        words
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use maci_crypto::Keypair;
    use rand_chacha::ChaCha20Rng;
    use rand_core::SeedableRng;

    fn message(fill: u64) -> Message {
        let mut data = [Field::zero(); MESSAGE_DATA_LENGTH];
        for (i, word) in data.iter_mut().enumerate() {
            *word = Field::from(fill + i as u64);
        }
        Message::new(Field::from(MESSAGE_TYPE_VOTE), data)
    }

    #[test]
    fn hash_binds_the_encryption_key() {
        let mut rng = ChaCha20Rng::from_seed([9u8; 32]);
        let a = Keypair::rand(&mut rng).public_key;
        let b = Keypair::rand(&mut rng).public_key;
        let msg = message(1);
        assert_ne!(msg.hash(&a), msg.hash(&b));
        assert_eq!(msg.hash(&a), msg.hash(&a));
    }

    #[test]
    fn hash_binds_every_payload_word() {
        let key = PublicKey::pad_key();
        let reference = message(1).hash(&key);
        for i in 0..MESSAGE_DATA_LENGTH {
            let mut tampered = message(1);
            tampered.data[i] += Field::from(1u64);
            assert_ne!(tampered.hash(&key), reference, "word {i} not bound");
        }
    }

    #[test]
    fn circuit_inputs_lead_with_the_type_tag() {
        let msg = message(3);
        let words = msg.as_circuit_inputs();
        assert_eq!(words.len(), 11);
        assert_eq!(words[0], Field::from(MESSAGE_TYPE_VOTE));
        assert_eq!(&words[1..], &msg.data);
    }
}
