//! Baby Jubjub keypairs and ECDH shared keys.
//!
//! Keys follow the circom EdDSA key schedule: the raw secret is a field
//! element, and the scalar actually used on the curve is derived from it by
//! hashing, pruning and shifting (so a raw secret leaks nothing about the
//! low-order bits of the scalar). Public keys are affine points of the
//! prime-order subgroup.

use ark_ec::{AffineRepr, CurveGroup};
use ark_ed_on_bn254::{EdwardsAffine, Fr as JubjubScalar};
use ark_ff::{PrimeField, UniformRand, Zero};
use ark_serialize::{CanonicalDeserialize, CanonicalSerialize};
use blake2::{Blake2b512, Digest};
use num_bigint::BigUint;
use rand_core::{CryptoRng, RngCore};

use crate::codec::field_to_be_bytes;
use crate::error::CryptoError;
use crate::hashing::hash2;
use crate::{Field, PAD_PUBKEY_X, PAD_PUBKEY_Y};

const PUBLIC_KEY_PREFIX: &str = "macipk.";
const PRIVATE_KEY_PREFIX: &str = "macisk.";

/// A raw secret: any field element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrivateKey {
    raw: Field,
}

impl PrivateKey {
    pub fn new(raw: Field) -> Self {
        Self { raw }
    }

    pub fn rand<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        Self { raw: Field::rand(rng) }
    }

    /// The scalar that multiplies the generator: Blake2b-512 of the raw
    /// secret, low half pruned, shifted right by the cofactor bits.
    pub(crate) fn formatted_scalar(&self) -> JubjubScalar {
        let digest = Blake2b512::digest(field_to_be_bytes(&self.raw));
        let mut buf = [0u8; 32];
        buf.copy_from_slice(&digest[..32]);
        buf[0] &= 0xF8;
        buf[31] &= 0x7F;
        buf[31] |= 0x40;
        let pruned = BigUint::from_bytes_le(&buf) >> 3;
        JubjubScalar::from(pruned)
    }

    /// Seed material for deterministic signature nonces: the half of the key
    /// digest that the scalar derivation does not consume.
    pub(crate) fn nonce_seed(&self) -> [u8; 32] {
        let digest = Blake2b512::digest(field_to_be_bytes(&self.raw));
        let mut seed = [0u8; 32];
        seed.copy_from_slice(&digest[32..]);
        seed
    }

    /// The formatted scalar lifted back into the base field, the form the
    /// circuits take the coordinator secret in.
    pub fn as_circuit_input(&self) -> Field {
        Field::from(BigUint::from(self.formatted_scalar().into_bigint()))
    }

    pub fn public_key(&self) -> PublicKey {
        let point = (EdwardsAffine::generator() * self.formatted_scalar()).into_affine();
        PublicKey { x: point.x, y: point.y }
    }

    /// Render as `macisk.<hex>`.
    pub fn serialize(&self) -> String {
        format!("{PRIVATE_KEY_PREFIX}{}", hex::encode(field_to_be_bytes(&self.raw)))
    }

    /// Parse a `macisk.<hex>` string.
    pub fn deserialize(value: &str) -> Result<Self, CryptoError> {
        let encoded = value
            .strip_prefix(PRIVATE_KEY_PREFIX)
            .ok_or(CryptoError::InvalidKeyEncoding)?;
        let bytes = hex::decode(encoded).map_err(|_| CryptoError::InvalidKeyEncoding)?;
        if bytes.len() != 32 {
            return Err(CryptoError::InvalidKeyEncoding);
        }
        Ok(Self { raw: Field::from_be_bytes_mod_order(&bytes) })
    }
}

/// An affine Baby Jubjub point.
///
/// Coordinates are stored as plain field elements: encryption keys arrive
/// from untrusted senders and are not guaranteed to be on the curve. Every
/// operation that needs a group element goes through [`PublicKey::to_affine`]
/// and treats a failure as an invalid key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PublicKey {
    pub x: Field,
    pub y: Field,
}

impl PublicKey {
    pub fn new(x: Field, y: Field) -> Self {
        Self { x, y }
    }

    /// The fixed padding key: a point of unknown discrete log used for topup
    /// message slots and the blank state leaf.
    pub fn pad_key() -> Self {
        Self { x: PAD_PUBKEY_X, y: PAD_PUBKEY_Y }
    }

    /// Interpret the coordinates as a point of the prime-order subgroup.
    pub(crate) fn to_affine(self) -> Result<EdwardsAffine, CryptoError> {
        let point = EdwardsAffine::new_unchecked(self.x, self.y);
        if point.is_on_curve() && point.is_in_correct_subgroup_assuming_on_curve() {
            Ok(point)
        } else {
            Err(CryptoError::InvalidCurvePoint)
        }
    }

    /// Poseidon hash of the coordinates, the form the key takes inside
    /// circuit input hashes.
    pub fn hash(&self) -> Field {
        hash2([self.x, self.y])
    }

    /// Render as `macipk.<hex>` (compressed point encoding).
    ///
    /// # Error
    /// Fails when the coordinates are not a curve point; arbitrary coordinate
    /// pairs round-trip through the decimal-pair JSON form instead.
    pub fn serialize(&self) -> Result<String, CryptoError> {
        let point = self.to_affine()?;
        let mut bytes = Vec::new();
        point
            .serialize_compressed(&mut bytes)
            .map_err(|_| CryptoError::InvalidKeyEncoding)?;
        Ok(format!("{PUBLIC_KEY_PREFIX}{}", hex::encode(bytes)))
    }

    /// Parse a `macipk.<hex>` string.
    pub fn deserialize(value: &str) -> Result<Self, CryptoError> {
        let encoded = value
            .strip_prefix(PUBLIC_KEY_PREFIX)
            .ok_or(CryptoError::InvalidKeyEncoding)?;
        let bytes = hex::decode(encoded).map_err(|_| CryptoError::InvalidKeyEncoding)?;
        let point = EdwardsAffine::deserialize_compressed(bytes.as_slice())
            .map_err(|_| CryptoError::InvalidKeyEncoding)?;
        Ok(Self { x: point.x, y: point.y })
    }
}

/// A private key and its public counterpart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Keypair {
    pub private_key: PrivateKey,
    pub public_key: PublicKey,
}

impl Keypair {
    pub fn rand<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        Self::from_private(PrivateKey::rand(rng))
    }

    pub fn from_private(private_key: PrivateKey) -> Self {
        let public_key = private_key.public_key();
        Self { private_key, public_key }
    }

    /// The keypair a reloaded poll carries: the persisted layout does not
    /// include coordinator secrets.
    pub fn blank() -> Self {
        Self::from_private(PrivateKey::new(Field::zero()))
    }

    /// ECDH: both coordinates of the shared point, the cipher key.
    ///
    /// # Error
    /// Fails when the peer's coordinates are not a valid subgroup point.
    pub fn gen_ecdh_shared_key(&self, public_key: &PublicKey) -> Result<(Field, Field), CryptoError> {
        gen_ecdh_shared_key(&self.private_key, public_key)
    }
}

/// ECDH between a private key and a peer public key.
pub fn gen_ecdh_shared_key(
    private_key: &PrivateKey,
    public_key: &PublicKey,
) -> Result<(Field, Field), CryptoError> {
    let point = public_key.to_affine()?;
    let shared = (point * private_key.formatted_scalar()).into_affine();
    Ok((shared.x, shared.y))
}
