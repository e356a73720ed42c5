//! Pairwise subsidy calculation: a triangular walk over ballot-batch pairs
//! feeding the `Subsidy` circuit.
//!
//! Each unordered ballot pair `(i, j)` contributes `2 · k_ij · v_i[p] ·
//! v_j[p]` to option `p`, where the coefficient `k_ij = ⌊M · 10^W / (M +
//! v_i · v_j)⌋` dampens identical voting patterns. The grid of batch blocks
//! is walked row by row starting at the diagonal, and the diagonal blocks
//! only take their strict upper triangle, so every pair counts exactly once.

use ark_ff::Zero;
use maci_crypto::codec::{field_to_biguint, field_to_dec_string};
use maci_crypto::hashing::{gen_random_salt, gen_tree_commitment, hash3, sha256_mod_field};
use maci_crypto::Field;
use num_bigint::BigUint;
use rand_core::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};
use slog::info;

use crate::ballot::Ballot;
use crate::error::PollError;
use crate::poll::{fields_to_strings, path_elements_to_strings, Poll};

/// Numerator constant of the subsidy coefficient.
pub const SUBSIDY_M: u64 = 50;
/// Decimal precision of the subsidy coefficient.
pub const SUBSIDY_W: u32 = 4;

/// Everything the `Subsidy` circuit consumes for one batch pair, with every
/// field element rendered as a base-10 string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubsidyCircuitInputs {
    pub state_root: String,
    pub ballot_root: String,
    pub sb_salt: String,
    pub sb_commitment: String,
    pub current_subsidy_salt: String,
    pub new_subsidy_salt: String,
    pub current_subsidy_commitment: String,
    pub new_subsidy_commitment: String,
    pub current_subsidy: Vec<String>,
    pub packed_vals: String,
    pub input_hash: String,
    pub ballots1: Vec<[String; 2]>,
    pub ballots2: Vec<[String; 2]>,
    pub votes1: Vec<Vec<String>>,
    pub votes2: Vec<Vec<String>>,
    pub ballot_path_elements1: Vec<Vec<Vec<String>>>,
    pub ballot_path_elements2: Vec<Vec<Vec<String>>>,
}

/// The dampening coefficient of one ballot pair.
fn subsidy_coefficient(left: &Ballot, right: &Ballot) -> Field {
    let mut dot = BigUint::from(0u64);
    for (a, b) in left.votes.iter().zip(&right.votes) {
        dot += field_to_biguint(a) * field_to_biguint(b);
    }
    let m = BigUint::from(SUBSIDY_M);
    let numerator = m.clone() * BigUint::from(10u64).pow(SUBSIDY_W);
    Field::from(numerator / (m + dot))
}

impl Poll {
    /// Whether the subsidy grid still has blocks to visit.
    pub fn has_unfinished_subsidy_calculation(&self) -> bool {
        let batch_size = self.batch_sizes.subsidy_batch_size;
        self.row_batch_index * batch_size < self.ballots.len()
            && self.col_batch_index * batch_size < self.ballots.len()
    }

    /// Key of the block visited before the current one, where the previous
    /// subsidy salt is stored. On a row change the column wraps to the last
    /// batch of the previous row.
    fn previous_subsidy_key(&self) -> String {
        let num_batches = self
            .ballots
            .len()
            .div_ceil(self.batch_sizes.subsidy_batch_size);
        if self.row_batch_index == 0 && self.col_batch_index == 0 {
            "0-0".to_owned()
        } else if self.col_batch_index > self.row_batch_index {
            format!("{}-{}", self.row_batch_index, self.col_batch_index - 1)
        } else {
            format!("{}-{}", self.row_batch_index - 1, num_batches - 1)
        }
    }

    /// Process the current subsidy block and advance the grid walk.
    ///
    /// # Panics
    /// Panics when called before message processing has consumed every
    /// batch.
    pub fn subsidy_per_batch<R: RngCore + CryptoRng>(
        &mut self,
        rng: &mut R,
    ) -> Result<SubsidyCircuitInputs, PollError> {
        assert!(self.state_copied, "subsidy requires the state snapshot");
        assert!(
            !self.has_unprocessed_messages(),
            "subsidy requires message processing to be complete"
        );
        if !self.has_unfinished_subsidy_calculation() {
            return Err(PollError::SubsidyComplete);
        }

        let batch_size = self.batch_sizes.subsidy_batch_size;
        let row = self.row_batch_index;
        let col = self.col_batch_index;
        let row_start = row * batch_size;
        let col_start = col * batch_size;

        let first_block = row == 0 && col == 0;
        let current_subsidy_salt = if first_block {
            Field::zero()
        } else {
            self.subsidy_salts
                .get(&self.previous_subsidy_key())
                .copied()
                .unwrap_or_else(Field::zero)
        };
        let current_subsidy_commitment = if first_block {
            Field::zero()
        } else {
            gen_tree_commitment(
                &self.subsidy,
                current_subsidy_salt,
                self.tree_depths.vote_option_tree_depth,
            )
        };
        let current_subsidy = self.subsidy.clone();

        let empty_ballot = Ballot::blank(self.tree_depths.vote_option_tree_depth);
        let slice = |start: usize| -> Vec<Ballot> {
            (start..start + batch_size)
                .map(|index| {
                    self.ballots
                        .get(index)
                        .cloned()
                        .unwrap_or_else(|| empty_ballot.clone())
                })
                .collect()
        };
        let row_ballots = slice(row_start);
        let col_ballots = slice(col_start);

        // Accumulate every pair of this block once. A diagonal block pairs
        // each ballot only with its strict successors.
        for (i, left) in row_ballots.iter().enumerate() {
            for (j, right) in col_ballots.iter().enumerate() {
                if row_start == col_start && i >= j {
                    continue;
                }
                let coefficient = subsidy_coefficient(left, right);
                let two = Field::from(2u64);
                for (option, subsidy) in self.subsidy.iter_mut().enumerate() {
                    *subsidy += two * coefficient * left.votes[option] * right.votes[option];
                }
            }
        }

        let new_subsidy_salt = gen_random_salt(rng);
        self.subsidy_salts.insert(format!("{row}-{col}"), new_subsidy_salt);
        let new_subsidy_commitment = gen_tree_commitment(
            &self.subsidy,
            new_subsidy_salt,
            self.tree_depths.vote_option_tree_depth,
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
            BigUint::from(col)
                + (BigUint::from(row) << 50)
                + (BigUint::from(self.num_sign_ups) << 100),
        );
        let input_hash = sha256_mod_field(&[
            packed_vals,
            sb_commitment,
            current_subsidy_commitment,
            new_subsidy_commitment,
        ]);

        // Membership paths of both slices against the padded ballot tree.
        let mut padded_tree = self.ballot_tree_ref().clone();
        let needed = (row_start + batch_size).max(col_start + batch_size);
        while padded_tree.next_index() < needed {
            let zero = padded_tree.zero_value();
            padded_tree.insert(zero);
        }
        let paths = |start: usize| -> Vec<Vec<Vec<String>>> {
            (start..start + batch_size)
                .map(|index| path_elements_to_strings(&padded_tree.gen_merkle_path(index)))
                .collect()
        };
        let ballot_path_elements1 = paths(row_start);
        let ballot_path_elements2 = paths(col_start);

        // Advance: along the row while columns remain, else to the next
        // row's diagonal.
        if (self.col_batch_index + 1) * batch_size < self.ballots.len() {
            self.col_batch_index += 1;
        } else {
            self.row_batch_index += 1;
            self.col_batch_index = self.row_batch_index;
        }
        info!(self.logger, "subsidy block processed";
            "poll_id" => self.poll_id, "row" => row, "col" => col);

        Ok(SubsidyCircuitInputs {
            state_root: field_to_dec_string(&state_root),
            ballot_root: field_to_dec_string(&ballot_root),
            sb_salt: field_to_dec_string(&sb_salt),
            sb_commitment: field_to_dec_string(&sb_commitment),
            current_subsidy_salt: field_to_dec_string(&current_subsidy_salt),
            new_subsidy_salt: field_to_dec_string(&new_subsidy_salt),
            current_subsidy_commitment: field_to_dec_string(&current_subsidy_commitment),
            new_subsidy_commitment: field_to_dec_string(&new_subsidy_commitment),
            current_subsidy: fields_to_strings(&current_subsidy),
            packed_vals: field_to_dec_string(&packed_vals),
            input_hash: field_to_dec_string(&input_hash),
            ballots1: row_ballots
                .iter()
                .map(|ballot| ballot.as_circuit_inputs().map(|v| field_to_dec_string(&v)))
                .collect(),
            ballots2: col_ballots
                .iter()
                .map(|ballot| ballot.as_circuit_inputs().map(|v| field_to_dec_string(&v)))
                .collect(),
            votes1: row_ballots
                .iter()
                .map(|ballot| fields_to_strings(&ballot.votes))
                .collect(),
            votes2: col_ballots
                .iter()
                .map(|ballot| fields_to_strings(&ballot.votes))
                .collect(),
            ballot_path_elements1,
            ballot_path_elements2,
        })
    }
}
