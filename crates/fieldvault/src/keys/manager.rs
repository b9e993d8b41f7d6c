//! [`KeyManager`]: per-user data key lifecycle under a master key.

use std::sync::Arc;

use common::{CallContext, Entity, RecordStore, StoreError};
use thiserror::Error;
use tracing::{debug, info};
use zeroize::Zeroizing;

use super::material::{DataKey, KeyMaterialError, MasterKey};
use super::model::{UserDataKey, USER_ID_ATTRIBUTE};
use crate::crypto::{self, CipherError};

/// Errors produced by the key layer.
#[derive(Debug, Error)]
pub enum KeyError {
    /// Key management is disabled or has no master key.
    #[error("key manager unavailable: {0}")]
    Unavailable(&'static str),

    /// Wrapping or unwrapping under the master key failed.
    #[error("master key operation failed: {0}")]
    Cipher(#[from] CipherError),

    /// The unwrapped data key is not a valid 32-byte key.
    #[error("wrapped data key is corrupt: {0}")]
    CorruptWrappedKey(#[from] KeyMaterialError),

    /// The key row could not be read or written.
    #[error("key store failure: {0}")]
    Store(#[from] StoreError),

    /// A uniqueness conflict was reported but no row could be re-read.
    #[error("key row for user vanished after a conflicting insert")]
    Vanished,
}

/// Creates, unwraps, and rotates per-user data keys.
///
/// Key rows live in a [`RecordStore<UserDataKey>`]. Every store call is issued
/// with the reentrancy guard set, so the key store may itself sit behind an
/// encrypting decorator without recursing into key resolution.
///
/// Cheap to clone; clones share the same store handle.
#[derive(Clone)]
pub struct KeyManager {
    rows: Arc<dyn RecordStore<UserDataKey>>,
    master: Option<MasterKey>,
}

impl KeyManager {
    /// Key manager wrapping data keys under `master`.
    pub fn new(rows: Arc<dyn RecordStore<UserDataKey>>, master: MasterKey) -> Self {
        Self {
            rows,
            master: Some(master),
        }
    }

    /// Key manager with key management switched off. Every operation returns
    /// [`KeyError::Unavailable`].
    pub fn disabled(rows: Arc<dyn RecordStore<UserDataKey>>) -> Self {
        Self { rows, master: None }
    }

    /// Returns `true` when a master key is configured.
    pub fn is_enabled(&self) -> bool {
        self.master.is_some()
    }

    /// Return the user's data key, creating and persisting it on first use.
    ///
    /// When two callers race to create the first key for the same user, the
    /// store's uniqueness constraint rejects one insert; the loser re-reads and
    /// returns the winner's key.
    ///
    /// # Errors
    ///
    /// Returns [`KeyError::Unavailable`] when disabled, [`KeyError::Store`] if the
    /// key row cannot be read or written, and [`KeyError::Cipher`] /
    /// [`KeyError::CorruptWrappedKey`] if the stored key cannot be unwrapped.
    pub async fn get_or_create_user_key(
        &self,
        ctx: &CallContext,
        user_id: &str,
    ) -> Result<DataKey, KeyError> {
        let master = self.master()?;
        let ctx = ctx.guarded();

        if let Some(row) = self.find_row(&ctx, user_id).await? {
            return unwrap_with(master, &row.encrypted_key);
        }

        let key = DataKey::generate();
        let row = Entity::new(UserDataKey::new(user_id, wrap_with(master, &key)?));
        match self.rows.save(&ctx, &row).await {
            Ok(()) => {
                info!(user_id = %user_id, version = 1, "data key created");
                Ok(key)
            }
            Err(e) if e.is_conflict() => {
                debug!(user_id = %user_id, "lost data key creation race; re-reading");
                let winner = self.find_row(&ctx, user_id).await?.ok_or(KeyError::Vanished)?;
                unwrap_with(master, &winner.encrypted_key)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Replace the user's data key with a fresh one and bump its version.
    ///
    /// Ciphertexts written under the previous key are **not** re-encrypted and
    /// can no longer be decrypted once this returns.
    ///
    /// # Errors
    ///
    /// Same as [`get_or_create_user_key`](Self::get_or_create_user_key).
    pub async fn rotate_user_key(
        &self,
        ctx: &CallContext,
        user_id: &str,
    ) -> Result<DataKey, KeyError> {
        let master = self.master()?;
        let ctx = ctx.guarded();

        let key = DataKey::generate();
        let wrapped = wrap_with(master, &key)?;

        let (row, created) = match self.find_row(&ctx, user_id).await? {
            Some(mut existing) => {
                existing.rotate(wrapped);
                (existing, false)
            }
            None => (UserDataKey::new(user_id, wrapped), true),
        };
        let version = row.key_version;
        self.rows.save(&ctx, &Entity::new(row)).await?;

        if created {
            info!(user_id = %user_id, version, "data key created during rotation");
        } else {
            info!(user_id = %user_id, version, "data key rotated");
        }
        Ok(key)
    }

    /// Wrap a data key under the master key.
    ///
    /// # Errors
    ///
    /// Returns [`KeyError::Unavailable`] when disabled.
    pub fn wrap_key(&self, key: &DataKey) -> Result<String, KeyError> {
        wrap_with(self.master()?, key)
    }

    /// Unwrap a data key previously produced by [`wrap_key`](Self::wrap_key).
    ///
    /// # Errors
    ///
    /// Returns [`KeyError::Unavailable`] when disabled, [`KeyError::Cipher`] if the
    /// wrapped key fails authentication, and [`KeyError::CorruptWrappedKey`] if it
    /// does not decode to a 32-byte key.
    pub fn unwrap_key(&self, wrapped: &str) -> Result<DataKey, KeyError> {
        unwrap_with(self.master()?, wrapped)
    }

    fn master(&self) -> Result<&MasterKey, KeyError> {
        self.master
            .as_ref()
            .ok_or(KeyError::Unavailable("key management is disabled"))
    }

    async fn find_row(
        &self,
        ctx: &CallContext,
        user_id: &str,
    ) -> Result<Option<UserDataKey>, KeyError> {
        let rows = self.rows.find_by(ctx, USER_ID_ATTRIBUTE, user_id).await?;
        Ok(rows.first().map(Entity::snapshot))
    }
}

fn wrap_with(master: &MasterKey, key: &DataKey) -> Result<String, KeyError> {
    Ok(crypto::encrypt(&key.to_base64(), master.as_bytes())?)
}

fn unwrap_with(master: &MasterKey, wrapped: &str) -> Result<DataKey, KeyError> {
    let encoded = Zeroizing::new(crypto::decrypt(wrapped, master.as_bytes())?);
    Ok(DataKey::from_base64(&encoded)?)
}

impl std::fmt::Debug for KeyManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyManager")
            .field("enabled", &self.is_enabled())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{key_rows, master_key};
    use async_trait::async_trait;
    use common::{MemoryStore, StoreResult};
    use mockall::mock;

    mock! {
        KeyRows {}

        #[async_trait]
        impl RecordStore<UserDataKey> for KeyRows {
            async fn save(&self, ctx: &CallContext, record: &Entity<UserDataKey>) -> StoreResult<()>;
            async fn find_by_id(&self, ctx: &CallContext, id: &str) -> StoreResult<Option<Entity<UserDataKey>>>;
            async fn find_all(&self, ctx: &CallContext) -> StoreResult<Vec<Entity<UserDataKey>>>;
            async fn find_by(&self, ctx: &CallContext, attribute: &str, value: &str) -> StoreResult<Vec<Entity<UserDataKey>>>;
            async fn delete(&self, ctx: &CallContext, id: &str) -> StoreResult<bool>;
        }
    }

    fn manager(rows: &Arc<MemoryStore<UserDataKey>>) -> KeyManager {
        KeyManager::new(rows.clone(), master_key())
    }

    #[tokio::test]
    async fn repeated_calls_return_same_key() {
        let rows = key_rows();
        let keys = manager(&rows);
        let ctx = CallContext::for_user("u1");
        let first = keys.get_or_create_user_key(&ctx, "u1").await.unwrap();
        let second = keys.get_or_create_user_key(&ctx, "u1").await.unwrap();
        assert_eq!(first, second);
        assert_eq!(rows.len(), 1);
    }

    #[tokio::test]
    async fn created_row_is_wrapped_at_version_one() {
        let rows = key_rows();
        let keys = manager(&rows);
        let key = keys
            .get_or_create_user_key(&CallContext::anonymous(), "u1")
            .await
            .unwrap();

        let all = rows.find_all(&CallContext::anonymous()).await.unwrap();
        let row = all[0].snapshot();
        assert_eq!(row.user_id, "u1");
        assert_eq!(row.key_version, 1);
        assert!(row.id.is_some());
        assert_ne!(row.encrypted_key, *key.to_base64());
        assert_eq!(keys.unwrap_key(&row.encrypted_key).unwrap(), key);
    }

    #[tokio::test]
    async fn users_get_distinct_keys() {
        let rows = key_rows();
        let keys = manager(&rows);
        let ctx = CallContext::anonymous();
        let a = keys.get_or_create_user_key(&ctx, "u1").await.unwrap();
        let b = keys.get_or_create_user_key(&ctx, "u2").await.unwrap();
        assert_ne!(a, b);
        assert_eq!(rows.len(), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_first_use_creates_one_row() {
        let rows = key_rows();
        let keys = manager(&rows);

        let mut tasks = Vec::new();
        for _ in 0..16 {
            let keys = keys.clone();
            tasks.push(tokio::spawn(async move {
                keys.get_or_create_user_key(&CallContext::anonymous(), "new-user")
                    .await
            }));
        }

        let mut results = Vec::new();
        for task in tasks {
            results.push(task.await.unwrap().unwrap());
        }

        assert_eq!(rows.len(), 1);
        let stored = rows
            .find_by(&CallContext::anonymous(), USER_ID_ATTRIBUTE, "new-user")
            .await
            .unwrap();
        let persisted = keys.unwrap_key(&stored[0].lock().encrypted_key).unwrap();
        assert!(results.iter().all(|k| *k == persisted));
    }

    #[tokio::test]
    async fn rotation_replaces_key_and_bumps_version() {
        let rows = key_rows();
        let keys = manager(&rows);
        let ctx = CallContext::anonymous();
        let old = keys.get_or_create_user_key(&ctx, "u1").await.unwrap();
        let new = keys.rotate_user_key(&ctx, "u1").await.unwrap();
        assert_ne!(old, new);
        assert_eq!(keys.get_or_create_user_key(&ctx, "u1").await.unwrap(), new);

        let row = rows.find_all(&ctx).await.unwrap()[0].snapshot();
        assert_eq!(rows.len(), 1);
        assert_eq!(row.key_version, 2);
    }

    #[tokio::test]
    async fn rotation_creates_missing_row() {
        let rows = key_rows();
        let keys = manager(&rows);
        let ctx = CallContext::anonymous();
        let key = keys.rotate_user_key(&ctx, "u9").await.unwrap();
        let row = rows.find_all(&ctx).await.unwrap()[0].snapshot();
        assert_eq!(row.key_version, 1);
        assert_eq!(keys.get_or_create_user_key(&ctx, "u9").await.unwrap(), key);
    }

    #[tokio::test]
    async fn disabled_manager_is_unavailable() {
        let rows = key_rows();
        let keys = KeyManager::disabled(rows.clone());
        assert!(!keys.is_enabled());
        let err = keys
            .get_or_create_user_key(&CallContext::anonymous(), "u1")
            .await
            .unwrap_err();
        assert!(matches!(err, KeyError::Unavailable(_)));
        assert!(matches!(
            keys.wrap_key(&DataKey::generate()),
            Err(KeyError::Unavailable(_))
        ));
        assert!(rows.is_empty());
    }

    #[tokio::test]
    async fn wrong_master_key_cannot_unwrap() {
        let rows = key_rows();
        manager(&rows)
            .get_or_create_user_key(&CallContext::anonymous(), "u1")
            .await
            .unwrap();

        let other = KeyManager::new(
            rows.clone(),
            MasterKey::from_slice(&crypto::generate_key()).unwrap(),
        );
        let err = other
            .get_or_create_user_key(&CallContext::anonymous(), "u1")
            .await
            .unwrap_err();
        assert!(matches!(err, KeyError::Cipher(CipherError::Authentication)));
        assert_eq!(rows.len(), 1);
    }

    #[test]
    fn wrapping_needs_only_the_master_key() {
        let key = DataKey::generate();
        let wrapped = wrap_with(&master_key(), &key).unwrap();
        assert_ne!(wrapped, *key.to_base64());
        assert_eq!(unwrap_with(&master_key(), &wrapped).unwrap(), key);
    }

    #[test]
    fn unwrap_rejects_wrapped_garbage() {
        let keys = KeyManager::new(key_rows(), master_key());
        let wrapped_short = crypto::encrypt("c2hvcnQ=", master_key().as_bytes()).unwrap();
        assert!(matches!(
            keys.unwrap_key(&wrapped_short),
            Err(KeyError::CorruptWrappedKey(_))
        ));
    }

    #[tokio::test]
    async fn store_calls_carry_the_guard() {
        let mut rows = MockKeyRows::new();
        rows.expect_find_by()
            .withf(|ctx, attribute, value| {
                ctx.is_guarded() && attribute == USER_ID_ATTRIBUTE && value == "u1"
            })
            .times(1)
            .returning(|_, _, _| Ok(Vec::new()));
        rows.expect_save()
            .withf(|ctx, _| ctx.is_guarded())
            .times(1)
            .returning(|_, _| Ok(()));

        let keys = KeyManager::new(Arc::new(rows), master_key());
        let ctx = CallContext::for_user("u1");
        keys.get_or_create_user_key(&ctx, "u1").await.unwrap();
        assert!(!ctx.is_guarded());
    }

    #[tokio::test]
    async fn store_failure_propagates() {
        let mut rows = MockKeyRows::new();
        rows.expect_find_by()
            .returning(|_, _, _| Err(StoreError::Backend("connection refused".into())));
        rows.expect_save().never();

        let keys = KeyManager::new(Arc::new(rows), master_key());
        let err = keys
            .get_or_create_user_key(&CallContext::anonymous(), "u1")
            .await
            .unwrap_err();
        assert!(matches!(err, KeyError::Store(StoreError::Backend(_))));
    }

    #[tokio::test]
    async fn conflict_without_winner_is_reported() {
        let mut rows = MockKeyRows::new();
        rows.expect_find_by().returning(|_, _, _| Ok(Vec::new()));
        rows.expect_save().returning(|_, _| {
            Err(StoreError::UniqueViolation {
                kind: "user_data_key",
                attribute: USER_ID_ATTRIBUTE.into(),
                value: "u1".into(),
            })
        });

        let keys = KeyManager::new(Arc::new(rows), master_key());
        let err = keys
            .get_or_create_user_key(&CallContext::anonymous(), "u1")
            .await
            .unwrap_err();
        assert!(matches!(err, KeyError::Vanished));
    }
}
