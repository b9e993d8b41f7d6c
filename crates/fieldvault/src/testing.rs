//! Shared fixtures for unit tests.

use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use common::{MemoryStore, Record};

use crate::keys::{MasterKey, UserDataKey, USER_ID_ATTRIBUTE};
use crate::schema::{SensitiveField, SensitiveRecord};

/// Base64 of the fixed 32-byte master key used across tests.
pub fn master_key_b64() -> String {
    STANDARD.encode([7u8; 32])
}

pub fn master_key() -> MasterKey {
    MasterKey::from_slice(&[7u8; 32]).unwrap()
}

/// Key row store enforcing one row per user.
pub fn key_rows() -> Arc<MemoryStore<UserDataKey>> {
    Arc::new(MemoryStore::new().with_unique(USER_ID_ATTRIBUTE))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Todo {
    pub id: Option<String>,
    pub user_id: Option<String>,
    pub title: String,
    pub description: Option<String>,
    pub status: String,
}

impl Record for Todo {
    const KIND: &'static str = "todo";

    fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    fn set_id(&mut self, id: String) {
        self.id = Some(id);
    }

    fn attribute(&self, name: &str) -> Option<String> {
        match name {
            "userId" => self.user_id.clone(),
            "status" => Some(self.status.clone()),
            _ => None,
        }
    }
}

impl SensitiveRecord for Todo {
    fn sensitive_fields() -> Vec<SensitiveField<Self>> {
        vec![
            SensitiveField::new("title", |t: &mut Todo| Some(&mut t.title)),
            SensitiveField::new("description", |t: &mut Todo| t.description.as_mut()),
        ]
    }
}

pub fn todo(user: Option<&str>, title: &str) -> Todo {
    Todo {
        id: None,
        user_id: user.map(str::to_owned),
        title: title.to_owned(),
        description: None,
        status: "open".to_owned(),
    }
}
