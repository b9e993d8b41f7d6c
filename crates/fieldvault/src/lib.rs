//! `fieldvault`: transparent at-rest encryption of sensitive record fields.
//!
//! Typical setup:
//! 1. Load and validate [`Config`] from environment variables.
//! 2. Initialise telemetry with [`telemetry::init_telemetry`].
//! 3. Build a [`FieldVault`] over the store that holds [`UserDataKey`] rows.
//! 4. Wrap each record store with [`FieldVault::wrap`]. Writes through the
//!    wrapper persist ciphertext; reads return plaintext.
//!
//! Each record type opts in by implementing [`SensitiveRecord`], naming the
//! string attributes to encrypt. Every user's attributes are encrypted under
//! that user's data key, which is itself wrapped under the master key.

pub mod config;
pub mod crypto;
pub mod interceptor;
pub mod keys;
pub mod schema;
pub mod telemetry;
pub mod vault;

#[cfg(test)]
mod testing;

pub use config::Config;
pub use interceptor::EncryptingStore;
pub use keys::{DataKey, KeyError, KeyManager, MasterKey, UserDataKey};
pub use schema::{FieldRegistry, RecordSchema, SensitiveField, SensitiveRecord};
pub use vault::FieldVault;
