//! [`UserDataKey`]: the persisted row holding a user's wrapped data key.

use chrono::{DateTime, Utc};
use common::Record;
use serde::{Deserialize, Serialize};

use crate::schema::{SensitiveField, SensitiveRecord};

/// Attribute name carrying the owning user; unique across rows.
pub const USER_ID_ATTRIBUTE: &str = "userId";

/// One row per user. `encrypted_key` is the data key wrapped under the master
/// key; the plaintext data key is never stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserDataKey {
    /// Primary key, assigned by the store.
    pub id: Option<String>,
    /// Owning user. Unique.
    pub user_id: String,
    /// `base64(nonce || ciphertext || tag)` of the base64-encoded data key.
    pub encrypted_key: String,
    /// Starts at 1, incremented on every rotation.
    #[serde(default = "default_key_version")]
    pub key_version: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn default_key_version() -> u32 {
    1
}

impl UserDataKey {
    /// A fresh, unsaved row at version 1.
    pub fn new(user_id: impl Into<String>, encrypted_key: String) -> Self {
        let now = Utc::now();
        Self {
            id: None,
            user_id: user_id.into(),
            encrypted_key,
            key_version: default_key_version(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Replace the wrapped key and bump the version.
    pub fn rotate(&mut self, encrypted_key: String) {
        self.encrypted_key = encrypted_key;
        self.key_version += 1;
        self.updated_at = Utc::now();
    }
}

impl Record for UserDataKey {
    const KIND: &'static str = "user_data_key";

    fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    fn set_id(&mut self, id: String) {
        self.id = Some(id);
    }

    fn attribute(&self, name: &str) -> Option<String> {
        match name {
            USER_ID_ATTRIBUTE => Some(self.user_id.clone()),
            _ => None,
        }
    }
}

// Key rows carry nothing to encrypt; registering them lets a key store sit
// behind an `EncryptingStore` without any field being touched.
impl SensitiveRecord for UserDataKey {
    fn sensitive_fields() -> Vec<SensitiveField<Self>> {
        Vec::new()
    }
}
