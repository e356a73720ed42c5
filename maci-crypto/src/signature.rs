//! EdDSA signatures over Baby Jubjub with a Poseidon challenge.
//!
//! The challenge hash is Poseidon of `[R8.x, R8.y, A.x, A.y, digest]`, the
//! relation the vote circuits verify in constraints. Nonces are derived
//! deterministically from the key material, so signing never consumes
//! randomness.

use ark_ec::{AffineRepr, CurveGroup};
use ark_ed_on_bn254::{EdwardsAffine, EdwardsProjective, Fr as JubjubScalar};
use ark_ff::PrimeField;
use blake2::{Blake2b512, Digest};
use num_bigint::BigUint;

use crate::codec::{field_to_be_bytes, field_to_biguint};
use crate::hashing::hash5;
use crate::keys::{PrivateKey, PublicKey};
use crate::Field;

/// An EdDSA signature: the nonce commitment `R8` and the response scalar,
/// carried as a base-field element so it can travel inside ciphertexts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Signature {
    pub r8: (Field, Field),
    pub s: Field,
}

fn subgroup_order() -> BigUint {
    JubjubScalar::MODULUS.into()
}

fn challenge(r8: (Field, Field), public_key: &PublicKey, digest: Field) -> JubjubScalar {
    let hashed = hash5([r8.0, r8.1, public_key.x, public_key.y, digest]);
    JubjubScalar::from(field_to_biguint(&hashed))
}

/// Sign a field-element digest.
pub fn sign(private_key: &PrivateKey, digest: Field) -> Signature {
    let scalar = private_key.formatted_scalar();
    let public_key = private_key.public_key();

    let mut hasher = Blake2b512::new();
    hasher.update(private_key.nonce_seed());
    hasher.update(field_to_be_bytes(&digest));
    let nonce = JubjubScalar::from_le_bytes_mod_order(&hasher.finalize());

    let r8 = (EdwardsAffine::generator() * nonce).into_affine();
    let r8 = (r8.x, r8.y);
    let response = nonce + challenge(r8, &public_key, digest) * scalar;

    Signature {
        r8,
        s: Field::from(BigUint::from(response.into_bigint())),
    }
}

/// Verify a signature against a public key and digest.
///
/// Malformed inputs (off-curve points, an out-of-range response scalar)
/// verify false rather than erroring: the caller treats every failure mode
/// as the same rejection.
pub fn verify(public_key: &PublicKey, digest: Field, signature: &Signature) -> bool {
    let Ok(a) = public_key.to_affine() else {
        return false;
    };
    let Ok(r8) = PublicKey::new(signature.r8.0, signature.r8.1).to_affine() else {
        return false;
    };
    let s = field_to_biguint(&signature.s);
    if s >= subgroup_order() {
        return false;
    }
    let s = JubjubScalar::from(s);
    let hm = challenge(signature.r8, public_key, digest);

    let lhs = EdwardsAffine::generator() * s;
    let rhs = EdwardsProjective::from(r8) + a * hm;
    lhs == rhs
}
