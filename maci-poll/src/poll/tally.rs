//! Vote tallying: per-option sums and voice-credit spend accounting, batch
//! by batch, feeding the `TallyVotes` circuit.

use ark_ff::Zero;
use maci_crypto::codec::field_to_dec_string;
use maci_crypto::hashing::{
    gen_random_salt, gen_tree_commitment, hash3, hash_left_right, sha256_mod_field,
};
use maci_crypto::Field;
use num_bigint::BigUint;
use rand_core::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};
use slog::info;

use crate::ballot::Ballot;
use crate::error::PollError;
use crate::poll::{fields_to_strings, path_elements_to_strings, Poll};

/// Everything the `TallyVotes` circuit consumes for one ballot batch, with
/// every field element rendered as a base-10 string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TallyVotesCircuitInputs {
    pub state_root: String,
    pub ballot_root: String,
    pub sb_salt: String,
    pub sb_commitment: String,
    pub current_tally_commitment: String,
    pub new_tally_commitment: String,
    pub packed_vals: String,
    pub input_hash: String,
    pub ballots: Vec<[String; 2]>,
    pub ballot_path_elements: Vec<Vec<Vec<String>>>,
    pub votes: Vec<Vec<String>>,
    pub current_results: Vec<String>,
    pub current_results_root_salt: String,
    pub new_results_root_salt: String,
    pub current_spent_voice_credit_subtotal: String,
    pub current_spent_voice_credit_subtotal_salt: String,
    pub new_spent_voice_credit_subtotal_salt: String,
    pub current_per_vo_spent_voice_credits: Vec<String>,
    pub current_per_vo_spent_voice_credits_root_salt: String,
    pub new_per_vo_spent_voice_credits_root_salt: String,
}

impl Poll {
    /// Whether `tally_votes` has ballot batches left.
    pub fn has_untallied_ballots(&self) -> bool {
        self.num_batches_tallied * self.batch_sizes.tally_batch_size < self.ballots.len()
    }

    /// Salted commitment to the per-option results accumulated so far.
    pub fn gen_results_commitment(&self, salt: Field) -> Field {
        gen_tree_commitment(&self.results, salt, self.tree_depths.vote_option_tree_depth)
    }

    /// Salted commitment to the total voice credits spent by the first
    /// `num_ballots` ballots.
    pub fn gen_spent_voice_credit_subtotal_commitment(
        &self,
        salt: Field,
        num_ballots: Field,
    ) -> Field {
        hash_left_right(self.spent_voice_credit_subtotal(num_ballots), salt)
    }

    /// Salted commitment to the per-option voice-credit spend of the first
    /// `num_ballots` ballots.
    pub fn gen_per_vo_spent_voice_credits_commitment(
        &self,
        salt: Field,
        num_ballots: Field,
    ) -> Field {
        gen_tree_commitment(
            &self.per_vo_spent_subtotals(num_ballots),
            salt,
            self.tree_depths.vote_option_tree_depth,
        )
    }

    fn counted_ballots(&self, num_ballots: Field) -> &[Ballot] {
        let count = maci_crypto::codec::field_to_usize(&num_ballots)
            .unwrap_or(self.ballots.len())
            .min(self.ballots.len());
        &self.ballots[..count]
    }

    fn spent_voice_credit_subtotal(&self, num_ballots: Field) -> Field {
        let mut subtotal = Field::zero();
        for ballot in self.counted_ballots(num_ballots) {
            for vote in &ballot.votes {
                subtotal += *vote * *vote;
            }
        }
        subtotal
    }

    fn per_vo_spent_subtotals(&self, num_ballots: Field) -> Vec<Field> {
        let mut subtotals = vec![Field::zero(); self.results.len()];
        for ballot in self.counted_ballots(num_ballots) {
            for (option, vote) in ballot.votes.iter().enumerate() {
                subtotals[option] += *vote * *vote;
            }
        }
        subtotals
    }

    fn tally_commitment(
        results_commitment: Field,
        spent_commitment: Field,
        per_vo_commitment: Field,
    ) -> Field {
        hash3([results_commitment, spent_commitment, per_vo_commitment])
    }

    /// Tally the next ballot batch and emit the `TallyVotes` circuit inputs.
    ///
    /// # Panics
    /// Panics when called before message processing has consumed every
    /// batch: tallying an unsettled ballot tree is a programmer error.
    pub fn tally_votes<R: RngCore + CryptoRng>(
        &mut self,
        rng: &mut R,
    ) -> Result<TallyVotesCircuitInputs, PollError> {
        assert!(self.state_copied, "tallying requires the state snapshot");
        assert!(
            !self.has_unprocessed_messages(),
            "tallying requires message processing to be complete"
        );
        if !self.has_untallied_ballots() {
            return Err(PollError::BallotsAlreadyTallied);
        }

        let batch_size = self.batch_sizes.tally_batch_size;
        let batch_start = self.num_batches_tallied * batch_size;

        // Commitments to the accumulators as the previous batch left them,
        // under the previous batch's salts (zero for the first).
        let previous_key = batch_start.checked_sub(batch_size);
        let salt_of = |salts: &std::collections::HashMap<usize, Field>| {
            previous_key
                .and_then(|key| salts.get(&key).copied())
                .unwrap_or_else(Field::zero)
        };
        let current_results_root_salt = salt_of(&self.results_root_salts);
        let current_spent_salt = salt_of(&self.spent_voice_credit_subtotal_salts);
        let current_per_vo_salt = salt_of(&self.per_vo_spent_voice_credits_root_salts);
        let current_tally_commitment = if batch_start == 0 {
            Field::zero()
        } else {
            Self::tally_commitment(
                self.gen_results_commitment(current_results_root_salt),
                self.gen_spent_voice_credit_subtotal_commitment(
                    current_spent_salt,
                    Field::from(batch_start as u64),
                ),
                self.gen_per_vo_spent_voice_credits_commitment(
                    current_per_vo_salt,
                    Field::from(batch_start as u64),
                ),
            )
        };
        let current_results = self.results.clone();
        let current_spent_subtotal =
            self.spent_voice_credit_subtotal(Field::from(batch_start as u64));
        let current_per_vo = self.per_vo_spent_subtotals(Field::from(batch_start as u64));

        // Accumulate this batch.
        for ballot in self
            .ballots
            .iter()
            .take((batch_start + batch_size).min(self.ballots.len()))
            .skip(batch_start)
        {
            for (option, vote) in ballot.votes.iter().enumerate() {
                let spent = *vote * *vote;
                self.results[option] += vote;
                self.per_vo_spent_voice_credits[option] += spent;
                self.total_spent_voice_credits += spent;
            }
        }

        // The circuit sees a full batch: pad with blank ballots and prove
        // each slot's membership in the (padded) ballot tree.
        let empty_ballot = Ballot::blank(self.tree_depths.vote_option_tree_depth);
        let mut padded_tree = self.ballot_tree_ref().clone();
        while padded_tree.next_index() < batch_start + batch_size {
            let zero = padded_tree.zero_value();
            padded_tree.insert(zero);
        }
        let mut batch_ballots = Vec::with_capacity(batch_size);
        let mut ballot_paths = Vec::with_capacity(batch_size);
        for index in batch_start..batch_start + batch_size {
            batch_ballots.push(self.ballots.get(index).cloned().unwrap_or_else(|| empty_ballot.clone()));
            ballot_paths.push(padded_tree.gen_merkle_path(index));
        }

        // Fresh salts for the updated accumulators.
        let new_results_root_salt = gen_random_salt(rng);
        let new_spent_salt = gen_random_salt(rng);
        let new_per_vo_salt = gen_random_salt(rng);
        self.results_root_salts.insert(batch_start, new_results_root_salt);
        self.spent_voice_credit_subtotal_salts.insert(batch_start, new_spent_salt);
        self.per_vo_spent_voice_credits_root_salts.insert(batch_start, new_per_vo_salt);

        let counted = Field::from((batch_start + batch_size) as u64);
        let new_tally_commitment = Self::tally_commitment(
            self.gen_results_commitment(new_results_root_salt),
            self.gen_spent_voice_credit_subtotal_commitment(new_spent_salt, counted),
            self.gen_per_vo_spent_voice_credits_commitment(new_per_vo_salt, counted),
        );

        let state_root = self.state_tree_ref().root();
        let ballot_root = self.ballot_tree_ref().root();
        let sb_salt = self
            .current_message_batch_index
            .and_then(|index| self.sb_salts.get(&index))
            .copied()
            .unwrap_or_else(Field::zero);
        let sb_commitment = hash3([state_root, ballot_root, sb_salt]);

        let packed_vals = Field::from(
            BigUint::from(batch_start / batch_size) + (BigUint::from(self.num_sign_ups) << 50),
        );
        let input_hash = sha256_mod_field(&[
            packed_vals,
            sb_commitment,
            current_tally_commitment,
            new_tally_commitment,
        ]);

        self.num_batches_tallied += 1;
        info!(self.logger, "ballot batch tallied";
            "poll_id" => self.poll_id,
            "batch_start" => batch_start,
            "batches_tallied" => self.num_batches_tallied);

        Ok(TallyVotesCircuitInputs {
            state_root: field_to_dec_string(&state_root),
            ballot_root: field_to_dec_string(&ballot_root),
            sb_salt: field_to_dec_string(&sb_salt),
            sb_commitment: field_to_dec_string(&sb_commitment),
            current_tally_commitment: field_to_dec_string(&current_tally_commitment),
            new_tally_commitment: field_to_dec_string(&new_tally_commitment),
            packed_vals: field_to_dec_string(&packed_vals),
            input_hash: field_to_dec_string(&input_hash),
            ballots: batch_ballots
                .iter()
                .map(|ballot| ballot.as_circuit_inputs().map(|v| field_to_dec_string(&v)))
                .collect(),
            ballot_path_elements: ballot_paths.iter().map(path_elements_to_strings).collect(),
            votes: batch_ballots
                .iter()
                .map(|ballot| fields_to_strings(&ballot.votes))
                .collect(),
            current_results: fields_to_strings(&current_results),
            current_results_root_salt: field_to_dec_string(&current_results_root_salt),
            new_results_root_salt: field_to_dec_string(&new_results_root_salt),
            current_spent_voice_credit_subtotal: field_to_dec_string(&current_spent_subtotal),
            current_spent_voice_credit_subtotal_salt: field_to_dec_string(&current_spent_salt),
            new_spent_voice_credit_subtotal_salt: field_to_dec_string(&new_spent_salt),
            current_per_vo_spent_voice_credits: fields_to_strings(&current_per_vo),
            current_per_vo_spent_voice_credits_root_salt: field_to_dec_string(&current_per_vo_salt),
            new_per_vo_spent_voice_credits_root_salt: field_to_dec_string(&new_per_vo_salt),
        })
    }
}
