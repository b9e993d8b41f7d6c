//! AES-256-GCM-SIV field encryption primitives.
//!
//! This module is intentionally free of store and key-management dependencies.
//! It provides the low-level encrypt/decrypt operations used by the key manager
//! and the interceptor.
//!
//! # Ciphertext format
//!
//! ```text
//! base64(nonce[12] || ciphertext || tag[16])
//! ```
//!
//! Standard alphabet with padding. Plaintext is UTF-8.

pub mod cipher;

pub use cipher::{decrypt, encrypt, generate_key, CipherError, KEY_LEN};
