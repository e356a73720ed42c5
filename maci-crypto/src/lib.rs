//! SNARK-friendly cryptographic primitives for a MACI coordinator.
//!
//! Everything in this crate operates over the BN254 scalar field, the native
//! field of the Groth16 circuits the coordinator produces inputs for. The
//! crate provides:
//!
//! * the Poseidon hash family with circom-compatible parameters
//!   ([`hashing`]),
//! * an incremental, fixed-arity (quinary) Merkle tree with update-in-place,
//!   inclusion paths and subroot paths ([`merkle_tree`]),
//! * Baby Jubjub keypairs, ECDH shared keys and EdDSA-Poseidon signatures
//!   ([`keys`], [`signature`]),
//! * the Poseidon duplex-sponge cipher used to encrypt vote commands
//!   ([`cipher`]),
//! * base-10 string codecs for crossing the JSON boundary ([`codec`]).
//!
//! ```rust
//! use maci_crypto::keys::Keypair;
//! use maci_crypto::hashing::{gen_random_salt, hash_left_right};
//! use rand_chacha::ChaCha20Rng;
//! use rand_core::SeedableRng;
//!
//! let mut rng = ChaCha20Rng::from_seed([0u8; 32]);
//! let coordinator = Keypair::rand(&mut rng);
//! let voter = Keypair::rand(&mut rng);
//!
//! // ECDH is symmetric: both sides derive the same cipher key.
//! let k1 = coordinator.gen_ecdh_shared_key(&voter.public_key).unwrap();
//! let k2 = voter.gen_ecdh_shared_key(&coordinator.public_key).unwrap();
//! assert_eq!(k1, k2);
//!
//! let salt = gen_random_salt(&mut rng);
//! let _commitment = hash_left_right(k1.0, salt);
//! ```

use ark_ff::MontFp;

pub mod cipher;
pub mod codec;
pub mod error;
pub mod hashing;
pub mod keys;
pub mod merkle_tree;
pub mod signature;

pub use error::CryptoError;
pub use keys::{Keypair, PrivateKey, PublicKey};
pub use merkle_tree::{IncrementalQuinTree, MerklePath, MerkleSubrootPath, TREE_ARITY};
pub use signature::Signature;

/// The field every "big" value in the protocol lives in: the BN254 scalar
/// field (often written `SNARK_FIELD_SIZE` in circuit tooling).
pub type Field = ark_bn254::Fr;

/// Zero leaf of the message tree: `keccak256("Maci")` reduced into the field.
/// A constant with no known preimage structure, so nobody can open the empty
/// slots of the tree to anything meaningful.
pub const NOTHING_UP_MY_SLEEVE: Field =
    MontFp!("8370432830353022751713833565135785980866757267633941821328460903436894336785");

/// x-coordinate of the padding public key (a Baby Jubjub point of unknown
/// discrete log). Used as the encryption key slot of topup messages and as
/// the public key of the blank state leaf.
pub const PAD_PUBKEY_X: Field =
    MontFp!("10457101036533406547632367118273992217979173478358440826365724437999023779287");

/// y-coordinate of the padding public key.
pub const PAD_PUBKEY_Y: Field =
    MontFp!("19824078218392094440610104313265183977899662750282163392862422243483260492317");
