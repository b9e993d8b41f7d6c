//! Per-user data keys, wrapped under a process-wide master key.
//!
//! # Lifecycle
//!
//! 1. The first write on behalf of a user calls
//!    [`KeyManager::get_or_create_user_key`], which generates a random 32-byte
//!    data key, wraps it under the master key and persists a [`UserDataKey`] row.
//! 2. Subsequent calls re-read the row and unwrap the key. Nothing is cached
//!    across calls.
//! 3. [`KeyManager::rotate_user_key`] replaces the wrapped key and bumps
//!    `key_version`. Data written under the previous key is not re-encrypted.
//!
//! # Security invariants
//!
//! - Plaintext data keys are **never** persisted, logged, or included in traces.
//! - [`DataKey`] and [`MasterKey`] buffers are zeroed on drop.
//! - Key rows are read and written with the reentrancy guard set.

pub mod manager;
pub mod material;
pub mod model;

pub use manager::{KeyError, KeyManager};
pub use material::{DataKey, KeyMaterialError, MasterKey};
pub use model::{UserDataKey, USER_ID_ATTRIBUTE};
