//! Poseidon duplex-sponge encryption.
//!
//! The scheme the vote circuits decrypt in constraints: a width-4 Poseidon
//! permutation run in duplex mode, keyed with the two coordinates of an ECDH
//! shared point. Plaintext is absorbed three words at a time; the final
//! squeeze is an authentication tag.

use ark_ff::{Field as _, Zero};
use light_poseidon::parameters::bn254_x5::get_poseidon_parameters;
use light_poseidon::PoseidonParameters;
use num_bigint::BigUint;

use crate::error::CryptoError;
use crate::Field;

const WIDTH: usize = 4;
const RATE: usize = 3;

fn permutation_parameters() -> PoseidonParameters<Field> {
    get_poseidon_parameters::<Field>(WIDTH as u8).expect("width-4 BN254 parameters exist")
}

/// One Poseidon permutation: add round constants, S-box, MDS mix, with the
/// partial rounds sandwiched between two half-sets of full rounds.
fn permute(params: &PoseidonParameters<Field>, state: &mut [Field; WIDTH]) {
    let all_rounds = params.full_rounds + params.partial_rounds;
    let half_full = params.full_rounds / 2;
    for round in 0..all_rounds {
        for (i, word) in state.iter_mut().enumerate() {
            *word += params.ark[round * WIDTH + i];
        }
        if round < half_full || round >= half_full + params.partial_rounds {
            for word in state.iter_mut() {
                *word = word.pow([params.alpha]);
            }
        } else {
            state[0] = state[0].pow([params.alpha]);
        }
        let mut mixed = [Field::zero(); WIDTH];
        for (i, out) in mixed.iter_mut().enumerate() {
            for (j, word) in state.iter().enumerate() {
                *out += *word * params.mds[i][j];
            }
        }
        *state = mixed;
    }
}

fn initial_state(key: (Field, Field), nonce: Field, length: usize) -> [Field; WIDTH] {
    // Domain separation: the plaintext length rides in the top bits of the
    // nonce word, so truncation attacks change the whole keystream.
    let length_tag = Field::from(BigUint::from(length) << 128);
    [Field::zero(), key.0, key.1, nonce + length_tag]
}

fn ciphertext_len(plaintext_len: usize) -> usize {
    plaintext_len.div_ceil(RATE) * RATE + 1
}

/// Encrypt `plaintext` under an ECDH shared key.
pub fn poseidon_encrypt(plaintext: &[Field], key: (Field, Field), nonce: Field) -> Vec<Field> {
    let params = permutation_parameters();
    let mut state = initial_state(key, nonce, plaintext.len());

    let mut padded = plaintext.to_vec();
    padded.resize(plaintext.len().div_ceil(RATE) * RATE, Field::zero());

    let mut ciphertext = Vec::with_capacity(ciphertext_len(plaintext.len()));
    for chunk in padded.chunks(RATE) {
        permute(&params, &mut state);
        for (i, word) in chunk.iter().enumerate() {
            state[i + 1] += word;
            ciphertext.push(state[i + 1]);
        }
    }
    permute(&params, &mut state);
    ciphertext.push(state[1]);
    ciphertext
}

/// Decrypt a ciphertext produced by [`poseidon_encrypt`].
///
/// # Error
/// Fails when the ciphertext length cannot hold `length` words, when the
/// zero padding of the final block does not check out, or when the
/// authentication tag does not match.
pub fn poseidon_decrypt(
    ciphertext: &[Field],
    key: (Field, Field),
    nonce: Field,
    length: usize,
) -> Result<Vec<Field>, CryptoError> {
    if ciphertext.len() != ciphertext_len(length) {
        return Err(CryptoError::CiphertextLengthMismatch {
            got: ciphertext.len(),
            expected: length,
        });
    }

    let params = permutation_parameters();
    let mut state = initial_state(key, nonce, length);

    let body = &ciphertext[..ciphertext.len() - 1];
    let mut plaintext = Vec::with_capacity(body.len());
    for chunk in body.chunks(RATE) {
        permute(&params, &mut state);
        for (i, word) in chunk.iter().enumerate() {
            plaintext.push(*word - state[i + 1]);
            state[i + 1] = *word;
        }
    }

    // Recovered padding slots must be zero under the right key.
    if plaintext[length..].iter().any(|word| !word.is_zero()) {
        return Err(CryptoError::DecryptionFailed);
    }

    permute(&params, &mut state);
    if state[1] != ciphertext[ciphertext.len() - 1] {
        return Err(CryptoError::DecryptionFailed);
    }

    plaintext.truncate(length);
    Ok(plaintext)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> (Field, Field) {
        (Field::from(11u64), Field::from(22u64))
    }

    fn words(n: u64) -> Vec<Field> {
        (1..=n).map(Field::from).collect()
    }

    #[test]
    fn round_trip_for_unaligned_lengths() {
        for len in [1u64, 2, 3, 6, 7, 10] {
            let plaintext = words(len);
            let ciphertext = poseidon_encrypt(&plaintext, key(), Field::zero());
            assert_eq!(ciphertext.len(), (len as usize).div_ceil(3) * 3 + 1);
            let recovered =
                poseidon_decrypt(&ciphertext, key(), Field::zero(), len as usize).unwrap();
            assert_eq!(recovered, plaintext);
        }
    }

    #[test]
    fn wrong_key_fails_authentication() {
        let ciphertext = poseidon_encrypt(&words(7), key(), Field::zero());
        let wrong = (Field::from(11u64), Field::from(23u64));
        assert!(poseidon_decrypt(&ciphertext, wrong, Field::zero(), 7).is_err());
    }

    #[test]
    fn wrong_nonce_fails_authentication() {
        let ciphertext = poseidon_encrypt(&words(7), key(), Field::zero());
        assert!(poseidon_decrypt(&ciphertext, key(), Field::from(1u64), 7).is_err());
    }

    #[test]
    fn tampered_tag_is_rejected() {
        let mut ciphertext = poseidon_encrypt(&words(4), key(), Field::zero());
        let last = ciphertext.len() - 1;
        ciphertext[last] += Field::from(1u64);
        assert!(poseidon_decrypt(&ciphertext, key(), Field::zero(), 4).is_err());
    }

    #[test]
    fn tampered_body_is_rejected() {
        let mut ciphertext = poseidon_encrypt(&words(4), key(), Field::zero());
        ciphertext[0] += Field::from(1u64);
        assert!(poseidon_decrypt(&ciphertext, key(), Field::zero(), 4).is_err());
    }

    #[test]
    fn length_mismatch_is_rejected() {
        let ciphertext = poseidon_encrypt(&words(7), key(), Field::zero());
        assert_eq!(
            poseidon_decrypt(&ciphertext, key(), Field::zero(), 3),
            Err(CryptoError::CiphertextLengthMismatch { got: 10, expected: 3 })
        );
    }
}
