//! Plaintext key buffers: [`DataKey`] and [`MasterKey`].

use base64::{engine::general_purpose::STANDARD, Engine as _};
use thiserror::Error;
use zeroize::Zeroizing;

use crate::crypto::{cipher::generate_key, KEY_LEN};

/// Errors produced while building key material from external input.
#[derive(Debug, Error)]
pub enum KeyMaterialError {
    /// The encoded key is not valid base64.
    #[error("key is not valid base64")]
    InvalidEncoding,

    /// The decoded key material has an unexpected length.
    #[error("key has invalid length: expected {KEY_LEN} bytes, got {0}")]
    InvalidLength(usize),
}

/// Fixed-size buffer holding a user's plaintext data key.
///
/// Cloned into interceptor call stacks and post-commit callbacks when needed.
/// The buffer is zeroed on drop.
#[derive(Clone, PartialEq, Eq)]
pub struct DataKey(Box<Zeroizing<[u8; KEY_LEN]>>);

impl DataKey {
    /// Generate a fresh random data key.
    pub fn generate() -> Self {
        Self(Box::new(Zeroizing::new(generate_key())))
    }

    /// Copy key bytes out of a slice.
    ///
    /// # Errors
    ///
    /// Returns [`KeyMaterialError::InvalidLength`] if the slice is not [`KEY_LEN`] bytes.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, KeyMaterialError> {
        if bytes.len() != KEY_LEN {
            return Err(KeyMaterialError::InvalidLength(bytes.len()));
        }
        let mut buf = Box::new(Zeroizing::new([0u8; KEY_LEN]));
        buf.copy_from_slice(bytes);
        Ok(Self(buf))
    }

    /// Decode a base64 key.
    ///
    /// # Errors
    ///
    /// Returns [`KeyMaterialError::InvalidEncoding`] for bad base64 and
    /// [`KeyMaterialError::InvalidLength`] if the decoded key is not [`KEY_LEN`] bytes.
    pub fn from_base64(encoded: &str) -> Result<Self, KeyMaterialError> {
        let bytes = Zeroizing::new(
            STANDARD
                .decode(encoded.trim())
                .map_err(|_| KeyMaterialError::InvalidEncoding)?,
        );
        Self::from_slice(&bytes)
    }

    /// Base64 form, used only as the plaintext that gets wrapped. Zeroed on drop.
    pub fn to_base64(&self) -> Zeroizing<String> {
        Zeroizing::new(STANDARD.encode(&self.0[..]))
    }

    /// Borrow the raw key bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0[..]
    }
}

impl std::fmt::Debug for DataKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never print key material, not even in debug builds.
        f.write_str("DataKey([REDACTED])")
    }
}

/// The master key that wraps every data key. Supplied by configuration, never persisted.
#[derive(Clone)]
pub struct MasterKey(DataKey);

impl MasterKey {
    /// Decode the configured base64 master key.
    ///
    /// # Errors
    ///
    /// See [`DataKey::from_base64`].
    pub fn from_base64(encoded: &str) -> Result<Self, KeyMaterialError> {
        DataKey::from_base64(encoded).map(Self)
    }

    /// Build a master key from raw bytes.
    ///
    /// # Errors
    ///
    /// See [`DataKey::from_slice`].
    pub fn from_slice(bytes: &[u8]) -> Result<Self, KeyMaterialError> {
        DataKey::from_slice(bytes).map(Self)
    }

    /// Borrow the raw key bytes.
    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl std::fmt::Debug for MasterKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("MasterKey([REDACTED])")
    }
}
