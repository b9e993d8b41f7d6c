//! Transparent encryption around a record store.
//!
//! # Write path
//!
//! 1. Guarded calls are delegated unchanged.
//! 2. The owner is the acting user, else the record's owner attribute. Without
//!    one the record is stored unencrypted.
//! 3. The owner's data key is resolved with the guard set. A disabled key
//!    manager stores the record unencrypted; any other key failure aborts the
//!    write.
//! 4. Sensitive attributes are encrypted in place and the write is delegated.
//! 5. After a successful write the caller's record is decrypted: on commit if
//!    a unit of work is active, otherwise immediately. A failed write leaves it
//!    encrypted.
//! 6. A record saved again while its decryption is still waiting for commit is
//!    first returned to plaintext, so it is never encrypted twice, and keeps a
//!    single pending decryption.
//!
//! # Read path
//!
//! Every returned record is decrypted in place. Decryption failures are
//! handled per attribute and never fail the read.

pub mod fields;
pub mod store;

pub use fields::{decrypt_fields, encrypt_fields, restore_fields};
pub use store::EncryptingStore;
