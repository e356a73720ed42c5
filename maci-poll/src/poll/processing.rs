//! Message processing: the per-command state machine and the reverse batch
//! driver that feeds the `ProcessMessages` circuit.

use ark_ff::{One, Zero};
use maci_crypto::codec::{field_to_biguint, field_to_dec_string, field_to_usize};
use maci_crypto::hashing::{gen_random_salt, hash3, sha256_mod_field};
use maci_crypto::merkle_tree::{MerklePath, MerkleSubrootPath};
use maci_crypto::{Field, PublicKey};
use num_bigint::{BigInt, BigUint};
use rand_core::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};
use slog::{debug, info};

use crate::ballot::Ballot;
use crate::command::VoteCommand;
use crate::error::{PollError, ProcessMessageError};
use crate::maci_state::MaciStateView;
use crate::message::{Message, MESSAGE_TYPE_TOPUP, MESSAGE_TYPE_VOTE};
use crate::poll::{fields_to_strings, path_elements_to_strings, pub_key_pair, Poll};
use crate::state_leaf::StateLeaf;

/// Everything the `ProcessMessages` circuit consumes for one batch, with
/// every field element rendered as a base-10 string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessMessagesCircuitInputs {
    pub poll_end_timestamp: String,
    pub packed_vals: String,
    pub msg_root: String,
    pub msgs: Vec<Vec<String>>,
    pub msg_subroot_path_elements: Vec<Vec<String>>,
    pub batch_end_index: u64,
    pub coord_priv_key: String,
    pub coord_pub_key: [String; 2],
    pub enc_pub_keys: Vec<[String; 2]>,
    pub current_state_root: String,
    pub current_ballot_root: String,
    pub current_sb_commitment: String,
    pub current_sb_salt: String,
    pub current_state_leaves: Vec<[String; 4]>,
    pub current_state_leaves_path_elements: Vec<Vec<Vec<String>>>,
    pub current_ballots: Vec<[String; 2]>,
    pub current_ballots_path_elements: Vec<Vec<Vec<String>>>,
    pub current_vote_weights: Vec<String>,
    pub current_vote_weights_path_elements: Vec<Vec<Vec<String>>>,
    pub new_sb_commitment: String,
    pub new_sb_salt: String,
    pub input_hash: String,
}

/// The witness of one accepted vote command: the pre-mutation leaf, ballot
/// and vote weight together with their inclusion paths in the old trees, and
/// the replacements to apply.
#[derive(Debug, Clone)]
pub struct VoteWitness {
    pub state_leaf_index: usize,
    pub original_state_leaf: StateLeaf,
    pub new_state_leaf: StateLeaf,
    pub original_state_leaf_path: MerklePath,
    pub original_ballot: Ballot,
    pub new_ballot: Ballot,
    pub original_ballot_path: MerklePath,
    pub original_vote_weight: Field,
    pub original_vote_weights_path: MerklePath,
    pub command: VoteCommand,
}

/// Batch-level inputs computed before any mutation of the batch, so the
/// state/ballot commitment opens to the pre-batch roots.
pub(crate) struct PartialInputs {
    pub msgs: Vec<Vec<Field>>,
    pub enc_pub_keys: Vec<PublicKey>,
    pub msg_root: Field,
    pub msg_subroot_path: MerkleSubrootPath,
    pub batch_end_index: usize,
    pub packed_vals: Field,
    pub current_state_root: Field,
    pub current_ballot_root: Field,
    pub current_sb_commitment: Field,
    pub current_sb_salt: Field,
}

/// The per-slot witness columns. The batch loop walks message indices
/// downwards and appends; one final `reverse` leaves the columns in
/// ascending message order, as the circuit expects.
#[derive(Default)]
struct WitnessColumns {
    state_leaves: Vec<StateLeaf>,
    state_leaf_paths: Vec<MerklePath>,
    ballots: Vec<Ballot>,
    ballot_paths: Vec<MerklePath>,
    vote_weights: Vec<Field>,
    vote_weight_paths: Vec<MerklePath>,
}

impl WitnessColumns {
    fn reverse(&mut self) {
        self.state_leaves.reverse();
        self.state_leaf_paths.reverse();
        self.ballots.reverse();
        self.ballot_paths.reverse();
        self.vote_weights.reverse();
        self.vote_weight_paths.reverse();
    }
}

impl Poll {
    /// Validate one decrypted vote command against the current snapshot and
    /// produce its witness. Does not mutate anything; the batch driver
    /// applies the returned replacements.
    ///
    /// The checks run in a fixed order and the first failure decides the
    /// error kind.
    pub fn process_message(
        &self,
        message: &Message,
        enc_pub_key: &PublicKey,
    ) -> Result<VoteWitness, ProcessMessageError> {
        let shared_key = self
            .coordinator_keypair
            .gen_ecdh_shared_key(enc_pub_key)
            .map_err(|_| ProcessMessageError::FailedDecryption)?;
        let (command, signature) = VoteCommand::decrypt(message, shared_key)
            .map_err(|_| ProcessMessageError::FailedDecryption)?;

        // 1. The command must target an existing, non-sentinel leaf.
        let upper_bound = self.ballots.len().min(self.state_tree_ref().next_index());
        let state_leaf_index = field_to_usize(&command.state_index)
            .filter(|index| (1..upper_bound).contains(index))
            .ok_or(ProcessMessageError::InvalidStateLeafIndex)?;
        let state_leaf = &self.state_leaves[state_leaf_index];
        let ballot = &self.ballots[state_leaf_index];

        // 2. Signed by the key currently registered in the leaf.
        if !command.verify_signature(&signature, &state_leaf.pub_key) {
            return Err(ProcessMessageError::InvalidSignature);
        }

        // 3. Strictly sequential nonce.
        if command.nonce != ballot.nonce + Field::one() {
            return Err(ProcessMessageError::InvalidNonce);
        }

        // 4. Option within the poll's configured range.
        let vote_option_index = field_to_usize(&command.vote_option_index)
            .filter(|index| *index < self.max_values.max_vote_options)
            .ok_or(ProcessMessageError::InvalidVoteOptionIndex)?;

        // 5. Refund-and-repay accounting, over signed integers: the previous
        // weight's quadratic cost comes back before the new one is charged.
        let original_vote_weight = ballot.votes[vote_option_index];
        let credits_left = BigInt::from(field_to_biguint(&state_leaf.voice_credit_balance))
            + BigInt::from(field_to_biguint(&original_vote_weight)).pow(2)
            - BigInt::from(field_to_biguint(&command.new_vote_weight)).pow(2);
        let credits_left: BigUint = credits_left
            .try_into()
            .map_err(|_| ProcessMessageError::InsufficientVoiceCredits)?;

        let mut new_state_leaf = *state_leaf;
        new_state_leaf.pub_key = command.new_pub_key;
        new_state_leaf.voice_credit_balance = Field::from(credits_left);

        let mut new_ballot = ballot.clone();
        new_ballot.nonce += Field::one();
        new_ballot.votes[vote_option_index] = command.new_vote_weight;

        Ok(VoteWitness {
            state_leaf_index,
            original_state_leaf: *state_leaf,
            new_state_leaf,
            original_state_leaf_path: self.state_tree_ref().gen_merkle_path(state_leaf_index),
            original_ballot: ballot.clone(),
            new_ballot,
            original_ballot_path: self.ballot_tree_ref().gen_merkle_path(state_leaf_index),
            original_vote_weight,
            original_vote_weights_path: ballot.votes_tree().gen_merkle_path(vote_option_index),
            command,
        })
    }

    /// Process the next message batch, in reverse order of appending, and
    /// emit the `ProcessMessages` circuit inputs.
    ///
    /// The first call acquires the registry's processing lock and snapshots
    /// the signup state; the call that consumes the last batch releases the
    /// lock.
    pub fn process_messages<R: RngCore + CryptoRng>(
        &mut self,
        maci: MaciStateView<'_>,
        rng: &mut R,
    ) -> Result<ProcessMessagesCircuitInputs, PollError> {
        if !self.has_unprocessed_messages() {
            return Err(PollError::MessagesAlreadyProcessed);
        }
        maci.lock.acquire(self.poll_id)?;

        let batch_size = self.batch_sizes.message_batch_size;
        if self.num_batches_processed == 0 {
            let total = self.messages.len();
            let remainder = total % batch_size;
            let first_index = if total == 0 {
                0
            } else if remainder == 0 {
                total - batch_size
            } else {
                total - remainder
            };
            self.current_message_batch_index = Some(first_index);
            self.copy_state_from_maci(maci.state_leaves, maci.state_tree, maci.num_sign_ups);
            self.sb_salts.insert(first_index, Field::zero());
        }

        let batch_index = self
            .current_message_batch_index
            .expect("batch index initialized on the first call");
        assert_eq!(
            batch_index % batch_size,
            0,
            "message batch index {batch_index} is not aligned to the batch size"
        );

        // Batch-level inputs commit to the roots as they stand before this
        // batch mutates them.
        let partial = self.gen_process_messages_circuit_inputs_partial(batch_index);

        let mut columns = WitnessColumns::default();
        for offset in 0..batch_size {
            let message_index = batch_index + batch_size - 1 - offset;
            if message_index >= self.messages.len() {
                self.push_placeholder_slot(&mut columns);
                continue;
            }
            let message = self.messages[message_index];
            let enc_pub_key = self.enc_pub_keys[message_index];

            if message.msg_type == Field::from(MESSAGE_TYPE_VOTE) {
                match self.process_message(&message, &enc_pub_key) {
                    Ok(witness) => {
                        columns.state_leaves.push(witness.original_state_leaf);
                        columns.state_leaf_paths.push(witness.original_state_leaf_path.clone());
                        columns.ballots.push(witness.original_ballot.clone());
                        columns.ballot_paths.push(witness.original_ballot_path.clone());
                        columns.vote_weights.push(witness.original_vote_weight);
                        columns
                            .vote_weight_paths
                            .push(witness.original_vote_weights_path.clone());

                        let index = witness.state_leaf_index;
                        self.state_leaves[index] = witness.new_state_leaf;
                        let leaf_hash = witness.new_state_leaf.hash();
                        self.state_tree_mut().update(index, leaf_hash);
                        let ballot_hash = witness.new_ballot.hash();
                        self.ballots[index] = witness.new_ballot;
                        self.ballot_tree_mut().update(index, ballot_hash);
                    }
                    Err(error) => {
                        debug!(self.logger, "message rejected";
                            "index" => message_index, "reason" => %error);
                        self.push_placeholder_slot(&mut columns);
                    }
                }
            } else if message.msg_type == Field::from(MESSAGE_TYPE_TOPUP) {
                // Out-of-range targets collapse to the sentinel with a zero
                // amount, so the topup becomes a provable no-op.
                let (index, amount) = match field_to_usize(&message.data[0]) {
                    Some(index) if index < self.ballots.len() => (index, message.data[1]),
                    _ => (0, Field::zero()),
                };
                columns.state_leaves.push(self.state_leaves[index]);
                columns
                    .state_leaf_paths
                    .push(self.state_tree_ref().gen_merkle_path(index));
                columns.ballots.push(self.ballots[index].clone());
                columns
                    .ballot_paths
                    .push(self.ballot_tree_ref().gen_merkle_path(index));
                columns.vote_weights.push(self.ballots[index].votes[0]);
                columns
                    .vote_weight_paths
                    .push(self.ballots[index].votes_tree().gen_merkle_path(0));

                self.state_leaves[index].voice_credit_balance += amount;
                let leaf_hash = self.state_leaves[index].hash();
                self.state_tree_mut().update(index, leaf_hash);
            }
            // Other message types cannot be ingested; a slot holding one
            // (hand-edited persistence) is skipped without a witness.
        }
        columns.reverse();

        self.num_batches_processed += 1;
        let next_index = if batch_index > 0 { batch_index - batch_size } else { batch_index };
        self.current_message_batch_index = Some(next_index);

        let mut new_sb_salt = gen_random_salt(rng);
        while self.sb_salts.get(&next_index) == Some(&new_sb_salt) {
            new_sb_salt = gen_random_salt(rng);
        }
        self.sb_salts.insert(next_index, new_sb_salt);

        let new_sb_commitment = hash3([
            self.state_tree_ref().root(),
            self.ballot_tree_ref().root(),
            new_sb_salt,
        ]);
        let input_hash = sha256_mod_field(&[
            partial.packed_vals,
            self.coordinator_keypair.public_key.hash(),
            partial.msg_root,
            partial.current_sb_commitment,
            new_sb_commitment,
            self.poll_end_timestamp,
        ]);

        if self.num_batches_processed * batch_size >= self.messages.len() {
            maci.lock.release(self.poll_id);
        }
        info!(self.logger, "message batch processed";
            "poll_id" => self.poll_id,
            "batch_index" => batch_index,
            "batches_processed" => self.num_batches_processed);

        Ok(ProcessMessagesCircuitInputs {
            poll_end_timestamp: field_to_dec_string(&self.poll_end_timestamp),
            packed_vals: field_to_dec_string(&partial.packed_vals),
            msg_root: field_to_dec_string(&partial.msg_root),
            msgs: partial.msgs.iter().map(|words| fields_to_strings(words)).collect(),
            msg_subroot_path_elements: path_elements_to_strings(&partial.msg_subroot_path.path),
            batch_end_index: partial.batch_end_index as u64,
            coord_priv_key: field_to_dec_string(
                &self.coordinator_keypair.private_key.as_circuit_input(),
            ),
            coord_pub_key: pub_key_pair(&self.coordinator_keypair.public_key),
            enc_pub_keys: partial.enc_pub_keys.iter().map(pub_key_pair).collect(),
            current_state_root: field_to_dec_string(&partial.current_state_root),
            current_ballot_root: field_to_dec_string(&partial.current_ballot_root),
            current_sb_commitment: field_to_dec_string(&partial.current_sb_commitment),
            current_sb_salt: field_to_dec_string(&partial.current_sb_salt),
            current_state_leaves: columns
                .state_leaves
                .iter()
                .map(|leaf| leaf.as_circuit_inputs().map(|v| field_to_dec_string(&v)))
                .collect(),
            current_state_leaves_path_elements: columns
                .state_leaf_paths
                .iter()
                .map(path_elements_to_strings)
                .collect(),
            current_ballots: columns
                .ballots
                .iter()
                .map(|ballot| ballot.as_circuit_inputs().map(|v| field_to_dec_string(&v)))
                .collect(),
            current_ballots_path_elements: columns
                .ballot_paths
                .iter()
                .map(path_elements_to_strings)
                .collect(),
            current_vote_weights: fields_to_strings(&columns.vote_weights),
            current_vote_weights_path_elements: columns
                .vote_weight_paths
                .iter()
                .map(path_elements_to_strings)
                .collect(),
            new_sb_commitment: field_to_dec_string(&new_sb_commitment),
            new_sb_salt: field_to_dec_string(&new_sb_salt),
            input_hash: field_to_dec_string(&input_hash),
        })
    }

    /// The placeholder witness of a slot that mutates nothing: the sentinel
    /// leaf and ballot with paths to index 0. Rejected commands and
    /// out-of-range slots are indistinguishable here, as they are to the
    /// circuit.
    fn push_placeholder_slot(&self, columns: &mut WitnessColumns) {
        columns.state_leaves.push(self.state_leaves[0]);
        columns
            .state_leaf_paths
            .push(self.state_tree_ref().gen_merkle_path(0));
        columns.ballots.push(self.ballots[0].clone());
        columns
            .ballot_paths
            .push(self.ballot_tree_ref().gen_merkle_path(0));
        columns.vote_weights.push(self.ballots[0].votes[0]);
        columns
            .vote_weight_paths
            .push(self.ballots[0].votes_tree().gen_merkle_path(0));
    }

    /// Batch-level circuit inputs for the batch starting at `index`:
    /// padded message/key slices, the message subroot path, the packed
    /// small values and the commitment to the pre-batch roots.
    pub(crate) fn gen_process_messages_circuit_inputs_partial(
        &self,
        index: usize,
    ) -> PartialInputs {
        let batch_size = self.batch_sizes.message_batch_size;
        assert_eq!(index % batch_size, 0, "batch start {index} is not aligned");

        // Slices are right-padded by duplicating the last element (a blank
        // for an empty poll); padded slots never execute, they only square
        // the circuit's input shape.
        let mut messages = self.messages.clone();
        let pad_message = messages.last().copied().unwrap_or_else(Message::blank);
        while messages.len() < index + batch_size {
            messages.push(pad_message);
        }
        let msgs: Vec<Vec<Field>> = messages[index..index + batch_size]
            .iter()
            .map(Message::as_circuit_inputs)
            .collect();

        let mut enc_pub_keys = self.enc_pub_keys.clone();
        let pad_key = enc_pub_keys.last().copied().unwrap_or_else(PublicKey::pad_key);
        while enc_pub_keys.len() < index + batch_size {
            enc_pub_keys.push(pad_key);
        }
        let enc_pub_keys = enc_pub_keys[index..index + batch_size].to_vec();

        // The subroot path comes from a padded clone: the poll's own tree
        // must keep exactly one leaf per ingested message.
        let mut padded_tree = self.message_tree.clone();
        while padded_tree.next_index() < index + batch_size {
            let zero = padded_tree.zero_value();
            padded_tree.insert(zero);
        }
        let msg_subroot_path = padded_tree.gen_merkle_subroot_path(index, index + batch_size);
        assert!(
            msg_subroot_path.verify(padded_tree.root()),
            "message subroot path failed to verify"
        );
        let msg_root = padded_tree.root();

        let batch_end_index = (index + batch_size).min(self.messages.len());
        let packed_vals = Field::from(
            BigUint::from(self.max_values.max_vote_options)
                + (BigUint::from(self.num_sign_ups) << 50)
                + (BigUint::from(index) << 100)
                + (BigUint::from(batch_end_index) << 150),
        );

        let current_state_root = self.state_tree_ref().root();
        let current_ballot_root = self.ballot_tree_ref().root();
        let current_sb_salt = self.sb_salts.get(&index).copied().unwrap_or_else(Field::zero);
        let current_sb_commitment =
            hash3([current_state_root, current_ballot_root, current_sb_salt]);

        PartialInputs {
            msgs,
            enc_pub_keys,
            msg_root,
            msg_subroot_path,
            batch_end_index,
            packed_vals,
            current_state_root,
            current_ballot_root,
            current_sb_commitment,
            current_sb_salt,
        }
    }
}
