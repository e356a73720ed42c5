//! Crate specific errors

/// Error types for the cryptographic primitives.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CryptoError {
    /// The string is not a canonical base-10 field element
    #[error("'{0}' is not a canonical base-10 field element")]
    InvalidFieldString(String),

    /// A serialized key could not be decoded
    #[error("the serialized key is malformed")]
    InvalidKeyEncoding,

    /// A pair of coordinates does not describe a point of the prime-order
    /// subgroup
    #[error("the coordinates do not describe a valid curve point")]
    InvalidCurvePoint,

    /// Ciphertext authentication failed during decryption
    #[error("ciphertext authentication failed")]
    DecryptionFailed,

    /// The ciphertext length does not match the claimed plaintext length
    #[error("ciphertext of {got} words cannot hold a plaintext of {expected} words")]
    CiphertextLengthMismatch { got: usize, expected: usize },
}
