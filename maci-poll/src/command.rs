//! Decrypted commands: what messages mean once the coordinator opens them.

use ark_ff::Zero;
use maci_crypto::cipher::{poseidon_decrypt, poseidon_encrypt};
use maci_crypto::codec::{biguint_to_field, field_to_biguint};
use maci_crypto::hashing::hash4;
use maci_crypto::signature::{self, Signature};
use maci_crypto::{CryptoError, Field, PrivateKey, PublicKey};
use num_bigint::BigUint;
use num_traits::One;

use crate::message::{Message, MESSAGE_DATA_LENGTH, MESSAGE_TYPE_VOTE};

/// Width of each small field inside the packed command word.
const PACK_BITS: u32 = 50;
/// Number of packed small fields.
const PACK_SLOTS: u32 = 5;
/// Words of a command plaintext: packed word, new key, salt, signature.
const PLAINTEXT_LENGTH: usize = 7;

/// A vote / key-change command (`msg_type == 1`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VoteCommand {
    pub state_index: Field,
    pub new_pub_key: PublicKey,
    pub vote_option_index: Field,
    pub new_vote_weight: Field,
    pub nonce: Field,
    pub poll_id: Field,
    pub salt: Field,
}

impl VoteCommand {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        state_index: Field,
        new_pub_key: PublicKey,
        vote_option_index: Field,
        new_vote_weight: Field,
        nonce: Field,
        poll_id: Field,
        salt: Field,
    ) -> Self {
        Self {
            state_index,
            new_pub_key,
            vote_option_index,
            new_vote_weight,
            nonce,
            poll_id,
            salt,
        }
    }

    /// The placeholder recorded for messages that fail to decrypt, keeping
    /// the command list aligned with the message list.
    pub fn zero() -> Self {
        Self {
            state_index: Field::zero(),
            new_pub_key: PublicKey::new(Field::zero(), Field::zero()),
            vote_option_index: Field::zero(),
            new_vote_weight: Field::zero(),
            nonce: Field::zero(),
            poll_id: Field::zero(),
            salt: Field::zero(),
        }
    }

    /// The five small fields packed into one word, 50 bits each.
    fn packed(&self) -> Field {
        let packed = field_to_biguint(&self.state_index)
            + (field_to_biguint(&self.vote_option_index) << PACK_BITS)
            + (field_to_biguint(&self.new_vote_weight) << (2 * PACK_BITS))
            + (field_to_biguint(&self.nonce) << (3 * PACK_BITS))
            + (field_to_biguint(&self.poll_id) << (4 * PACK_BITS));
        biguint_to_field(&packed)
    }

    fn unpack(packed: &Field) -> Result<(Field, Field, Field, Field, Field), CryptoError> {
        let value = field_to_biguint(packed);
        if value.bits() > u64::from(PACK_BITS * PACK_SLOTS) {
            return Err(CryptoError::DecryptionFailed);
        }
        let mask = (BigUint::one() << PACK_BITS) - BigUint::one();
        let slot = |i: u32| biguint_to_field(&((value.clone() >> (i * PACK_BITS)) & mask.clone()));
        Ok((slot(0), slot(1), slot(2), slot(3), slot(4)))
    }

    /// The digest the voter signs.
    pub fn digest(&self) -> Field {
        hash4([self.packed(), self.new_pub_key.x, self.new_pub_key.y, self.salt])
    }

    pub fn sign(&self, private_key: &PrivateKey) -> Signature {
        signature::sign(private_key, self.digest())
    }

    pub fn verify_signature(&self, sig: &Signature, public_key: &PublicKey) -> bool {
        signature::verify(public_key, self.digest(), sig)
    }

    /// Encrypt the command and its signature under an ECDH shared key into a
    /// wire message.
    pub fn encrypt(&self, sig: &Signature, shared_key: (Field, Field)) -> Message {
        let plaintext = [
            self.packed(),
            self.new_pub_key.x,
            self.new_pub_key.y,
            self.salt,
            sig.r8.0,
            sig.r8.1,
            sig.s,
        ];
        let ciphertext = poseidon_encrypt(&plaintext, shared_key, Field::zero());
        let data: [Field; MESSAGE_DATA_LENGTH] =
            ciphertext.try_into().expect("command ciphertext fills a message");
        Message::new(Field::from(MESSAGE_TYPE_VOTE), data)
    }

    /// Decrypt a wire message back into a command and its signature.
    ///
    /// # Error
    /// Fails when authentication fails or the packed word has bits above the
    /// five 50-bit slots.
    pub fn decrypt(
        message: &Message,
        shared_key: (Field, Field),
    ) -> Result<(Self, Signature), CryptoError> {
        let plaintext =
            poseidon_decrypt(&message.data, shared_key, Field::zero(), PLAINTEXT_LENGTH)?;
        let (state_index, vote_option_index, new_vote_weight, nonce, poll_id) =
            Self::unpack(&plaintext[0])?;
        let command = Self {
            state_index,
            new_pub_key: PublicKey::new(plaintext[1], plaintext[2]),
            vote_option_index,
            new_vote_weight,
            nonce,
            poll_id,
            salt: plaintext[3],
        };
        let sig = Signature {
            r8: (plaintext[4], plaintext[5]),
            s: plaintext[6],
        };
        Ok((command, sig))
    }
}

/// A voice-credit topup (`msg_type == 2`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TopupCommand {
    pub state_index: Field,
    pub amount: Field,
    pub poll_id: Field,
}

impl TopupCommand {
    pub fn new(state_index: Field, amount: Field, poll_id: Field) -> Self {
        Self { state_index, amount, poll_id }
    }
}

/// Everything a message can decode to. Failed decryptions are stored as
/// `Vote(VoteCommand::zero())` so indices stay aligned with messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Vote(VoteCommand),
    Topup(TopupCommand),
}

#[cfg(test)]
mod tests {
    use super::*;
    use maci_crypto::Keypair;
    use rand_chacha::ChaCha20Rng;
    use rand_core::SeedableRng;

    fn sample_command(new_key: PublicKey) -> VoteCommand {
        VoteCommand::new(
            Field::from(3u64),
            new_key,
            Field::from(7u64),
            Field::from(9u64),
            Field::from(1u64),
            Field::from(0u64),
            Field::from(424242u64),
        )
    }

    #[test]
    fn packing_round_trips() {
        let command = sample_command(PublicKey::pad_key());
        let (si, vo, vw, nonce, poll) = VoteCommand::unpack(&command.packed()).unwrap();
        assert_eq!(si, command.state_index);
        assert_eq!(vo, command.vote_option_index);
        assert_eq!(vw, command.new_vote_weight);
        assert_eq!(nonce, command.nonce);
        assert_eq!(poll, command.poll_id);
    }

    #[test]
    fn unpack_rejects_overflowing_words() {
        let too_big = biguint_to_field(&(BigUint::one() << 250));
        assert!(VoteCommand::unpack(&too_big).is_err());
    }

    #[test]
    fn signature_covers_the_digest() {
        let mut rng = ChaCha20Rng::from_seed([21u8; 32]);
        let voter = Keypair::rand(&mut rng);
        let command = sample_command(voter.public_key);
        let sig = command.sign(&voter.private_key);
        assert!(command.verify_signature(&sig, &voter.public_key));

        let mut altered = command;
        altered.new_vote_weight = Field::from(10u64);
        assert!(!altered.verify_signature(&sig, &voter.public_key));
    }

    #[test]
    fn encrypt_decrypt_round_trips() {
        let mut rng = ChaCha20Rng::from_seed([22u8; 32]);
        let coordinator = Keypair::rand(&mut rng);
        let ephemeral = Keypair::rand(&mut rng);
        let shared = ephemeral.gen_ecdh_shared_key(&coordinator.public_key).unwrap();

        let voter = Keypair::rand(&mut rng);
        let command = sample_command(voter.public_key);
        let sig = command.sign(&voter.private_key);
        let message = command.encrypt(&sig, shared);

        let coordinator_shared = coordinator
            .gen_ecdh_shared_key(&ephemeral.public_key)
            .unwrap();
        let (decrypted, recovered_sig) =
            VoteCommand::decrypt(&message, coordinator_shared).unwrap();
        assert_eq!(decrypted, command);
        assert_eq!(recovered_sig, sig);
        assert!(decrypted.verify_signature(&recovered_sig, &voter.public_key));
    }

    #[test]
    fn decrypt_with_the_wrong_key_fails() {
        let mut rng = ChaCha20Rng::from_seed([23u8; 32]);
        let coordinator = Keypair::rand(&mut rng);
        let ephemeral = Keypair::rand(&mut rng);
        let shared = ephemeral.gen_ecdh_shared_key(&coordinator.public_key).unwrap();

        let command = sample_command(PublicKey::pad_key());
        let sig = command.sign(&coordinator.private_key);
        let message = command.encrypt(&sig, shared);

        let stranger = Keypair::rand(&mut rng);
        let wrong_shared = stranger.gen_ecdh_shared_key(&ephemeral.public_key).unwrap();
        assert!(VoteCommand::decrypt(&message, wrong_shared).is_err());
    }
}
