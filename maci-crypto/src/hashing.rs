//! Poseidon-family hashes and salted commitments.
//!
//! All fixed-arity hashes use the circom parameter set (zero domain tag), so
//! roots and commitments computed here match what the circuits recompute in
//! constraints. `sha256_mod_field` is the one exception: circuits compress
//! their public inputs with SHA-256 because it is cheap on-chain, and only
//! the reduced digest enters the field.

use ark_ff::{PrimeField, UniformRand, Zero};
use light_poseidon::{Poseidon, PoseidonHasher};
use rand_core::{CryptoRng, RngCore};
use sha2::{Digest, Sha256};

use crate::codec::field_to_be_bytes;
use crate::merkle_tree::IncrementalQuinTree;
use crate::Field;

fn poseidon(inputs: &[Field]) -> Field {
    let mut hasher =
        Poseidon::<Field>::new_circom(inputs.len()).expect("arity is a supported circom width");
    hasher.hash(inputs).expect("input count matches the hasher arity")
}

/// Poseidon hash of two field elements.
pub fn hash2(inputs: [Field; 2]) -> Field {
    poseidon(&inputs)
}

/// Poseidon hash of three field elements.
pub fn hash3(inputs: [Field; 3]) -> Field {
    poseidon(&inputs)
}

/// Poseidon hash of four field elements.
pub fn hash4(inputs: [Field; 4]) -> Field {
    poseidon(&inputs)
}

/// Poseidon hash of five field elements.
pub fn hash5(inputs: [Field; 5]) -> Field {
    poseidon(&inputs)
}

/// The two-input hash used for Merkle node and commitment construction.
pub fn hash_left_right(left: Field, right: Field) -> Field {
    hash2([left, right])
}

/// SHA-256 over the 32-byte big-endian concatenation of `inputs`, reduced
/// into the field. Matches the on-chain packing of circuit public inputs.
pub fn sha256_mod_field(inputs: &[Field]) -> Field {
    let mut hasher = Sha256::new();
    for input in inputs {
        hasher.update(field_to_be_bytes(input));
    }
    Field::from_be_bytes_mod_order(&hasher.finalize())
}

/// Sample a uniform field element to salt a commitment with.
pub fn gen_random_salt<R: RngCore + CryptoRng>(rng: &mut R) -> Field {
    Field::rand(rng)
}

/// Commit to a list of leaves: fill a quinary tree of the given depth
/// (zero-padded) and hash its root together with the salt.
///
/// # Panics
/// Panics if the leaves do not fit in a tree of the given depth.
pub fn gen_tree_commitment(leaves: &[Field], salt: Field, depth: usize) -> Field {
    let mut tree = IncrementalQuinTree::new(depth, Field::zero());
    for leaf in leaves {
        tree.insert(*leaf);
    }
    hash_left_right(tree.root(), salt)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{field_modulus, field_to_biguint};
    use rand_chacha::ChaCha20Rng;
    use rand_core::SeedableRng;

    #[test]
    fn arity_is_part_of_the_domain() {
        let x = Field::from(7u64);
        let a = hash2([x, Field::zero()]);
        let b = hash3([x, Field::zero(), Field::zero()]);
        assert_ne!(a, b, "padding with zeros must not collide across arities");
    }

    #[test]
    fn hashes_are_deterministic() {
        let inputs = [Field::from(1u64), Field::from(2u64), Field::from(3u64)];
        assert_eq!(hash3(inputs), hash3(inputs));
    }

    #[test]
    fn sha256_digest_is_reduced() {
        let digest = sha256_mod_field(&[Field::from(1u64), Field::from(2u64)]);
        assert!(field_to_biguint(&digest) < field_modulus());
        assert_ne!(digest, sha256_mod_field(&[Field::from(2u64), Field::from(1u64)]));
    }

    #[test]
    fn tree_commitment_matches_manual_construction() {
        let leaves = vec![Field::from(5u64), Field::from(6u64)];
        let salt = Field::from(99u64);
        let mut tree = IncrementalQuinTree::new(2, Field::zero());
        tree.insert(leaves[0]);
        tree.insert(leaves[1]);
        assert_eq!(
            gen_tree_commitment(&leaves, salt, 2),
            hash_left_right(tree.root(), salt)
        );
    }

    #[test]
    fn salts_differ_across_draws() {
        let mut rng = ChaCha20Rng::from_seed([1u8; 32]);
        assert_ne!(gen_random_salt(&mut rng), gen_random_salt(&mut rng));
    }
}
