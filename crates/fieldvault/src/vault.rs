//! [`FieldVault`]: wires the registry and key manager to record stores.

use std::sync::Arc;

use anyhow::Result;
use common::RecordStore;
use tracing::{info, warn};

use crate::config::Config;
use crate::interceptor::EncryptingStore;
use crate::keys::{KeyManager, UserDataKey};
use crate::schema::{FieldRegistry, RecordSchema, SensitiveRecord};

/// Entry point for wrapping stores with field encryption.
///
/// Cheap to clone; every store wrapped by one vault shares its schema cache
/// and key manager.
#[derive(Debug, Clone)]
pub struct FieldVault {
    registry: FieldRegistry,
    keys: Arc<KeyManager>,
}

impl FieldVault {
    /// Vault over an already-built key manager, with an empty schema registry.
    pub fn new(keys: KeyManager) -> Self {
        Self {
            registry: FieldRegistry::new(),
            keys: Arc::new(keys),
        }
    }

    /// Build a vault from validated configuration, storing key rows in `rows`.
    ///
    /// # Errors
    ///
    /// Returns an error if key management is enabled and the master key is
    /// missing or malformed.
    pub fn from_config(cfg: &Config, rows: Arc<dyn RecordStore<UserDataKey>>) -> Result<Self> {
        let keys = match cfg.master_key()? {
            Some(master) => {
                info!("field encryption enabled");
                KeyManager::new(rows, master)
            }
            None => {
                warn!("field encryption disabled; sensitive fields are stored in plaintext");
                KeyManager::disabled(rows)
            }
        };
        Ok(Self::new(keys))
    }

    /// Compute and cache the schema of `R` ahead of first use.
    pub fn register<R: SensitiveRecord>(&self) -> Arc<RecordSchema<R>> {
        self.registry.register::<R>()
    }

    /// Wrap `store` so that records of `R` are encrypted at rest.
    pub fn wrap<R, S>(&self, store: S) -> EncryptingStore<R, S>
    where
        R: SensitiveRecord,
        S: RecordStore<R>,
    {
        EncryptingStore::new(store, self.registry.clone(), self.keys.clone())
    }

    /// The shared key manager, for rotation.
    pub fn keys(&self) -> &KeyManager {
        &self.keys
    }

    /// The schema registry shared by every store this vault wraps.
    pub fn registry(&self) -> &FieldRegistry {
        &self.registry
    }
}
