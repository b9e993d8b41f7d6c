//! [`EncryptingStore`]: the encrypting decorator around a [`RecordStore`].

use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use common::{CallContext, Entity, RecordStore, StoreError, StoreResult};
use tracing::{debug, error, warn};

use super::fields::{decrypt_fields, encrypt_fields, restore_fields};
use crate::keys::{DataKey, KeyError, KeyManager};
use crate::schema::{FieldRegistry, RecordSchema, SensitiveRecord};

/// Wraps a store of `R` and encrypts sensitive attributes on the way in and
/// decrypts them on the way out.
///
/// Calls made with a guarded [`CallContext`] pass straight through.
pub struct EncryptingStore<R, S> {
    inner: S,
    registry: FieldRegistry,
    keys: Arc<KeyManager>,
    _record: PhantomData<fn() -> R>,
}

impl<R: SensitiveRecord, S: RecordStore<R>> EncryptingStore<R, S> {
    /// Wrap `inner`, registering the schema of `R` in `registry`.
    pub fn new(inner: S, registry: FieldRegistry, keys: Arc<KeyManager>) -> Self {
        registry.register::<R>();
        Self {
            inner,
            registry,
            keys,
            _record: PhantomData,
        }
    }

    /// The wrapped store.
    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Resolve the data key used to encrypt `record` on write.
    ///
    /// `Ok(None)` means the record is written unencrypted.
    async fn write_key(
        &self,
        ctx: &CallContext,
        schema: &RecordSchema<R>,
        record: &Entity<R>,
    ) -> StoreResult<Option<DataKey>> {
        let Some(user_id) = resolve_owner(ctx, schema, record) else {
            warn!(kind = R::KIND, "no owning user; storing record unencrypted");
            return Ok(None);
        };

        match self.keys.get_or_create_user_key(&ctx.guarded(), &user_id).await {
            Ok(key) => Ok(Some(key)),
            Err(KeyError::Unavailable(reason)) => {
                warn!(kind = R::KIND, reason, "key manager unavailable; storing record unencrypted");
                Ok(None)
            }
            Err(e) => {
                error!(kind = R::KIND, user_id = %user_id, error = %e, "data key resolution failed; aborting write");
                Err(StoreError::Aborted("data key unavailable".into()))
            }
        }
    }

    /// Decrypt every entity in place. Keys are resolved once per owner.
    async fn decrypt_all(&self, ctx: &CallContext, entities: &[Entity<R>]) {
        let schema = self.registry.fields_of::<R>();
        if schema.is_empty() || entities.is_empty() {
            return;
        }

        let mut keys: HashMap<String, Option<DataKey>> = HashMap::new();
        for entity in entities {
            let Some(user_id) = resolve_owner(ctx, &schema, entity) else {
                debug!(kind = R::KIND, "no owning user; returning record as stored");
                continue;
            };
            if !keys.contains_key(&user_id) {
                let key = self.read_key(ctx, &user_id).await;
                keys.insert(user_id.clone(), key);
            }
            if let Some(Some(key)) = keys.get(&user_id) {
                entity.with_mut(|record| decrypt_fields(&schema, record, key));
            }
        }
    }

    async fn read_key(&self, ctx: &CallContext, user_id: &str) -> Option<DataKey> {
        match self.keys.get_or_create_user_key(&ctx.guarded(), user_id).await {
            Ok(key) => Some(key),
            Err(KeyError::Unavailable(reason)) => {
                warn!(kind = R::KIND, reason, "key manager unavailable; returning records as stored");
                None
            }
            Err(e) => {
                error!(kind = R::KIND, user_id = %user_id, error = %e, "data key resolution failed; returning records as stored");
                None
            }
        }
    }
}

/// Owning user for `record`: the acting user first, then the record's owner
/// attribute.
fn resolve_owner<R: SensitiveRecord>(
    ctx: &CallContext,
    schema: &RecordSchema<R>,
    record: &Entity<R>,
) -> Option<String> {
    match ctx.current_user_id() {
        Some(id) if !id.is_empty() => Some(id.to_owned()),
        _ => schema.owner_of(&record.lock()),
    }
}

#[async_trait]
impl<R, S> RecordStore<R> for EncryptingStore<R, S>
where
    R: SensitiveRecord,
    S: RecordStore<R>,
{
    async fn save(&self, ctx: &CallContext, record: &Entity<R>) -> StoreResult<()> {
        if ctx.is_guarded() {
            return self.inner.save(ctx, record).await;
        }
        let schema = self.registry.fields_of::<R>();
        if schema.is_empty() {
            return self.inner.save(ctx, record).await;
        }
        let Some(key) = self.write_key(ctx, &schema, record).await? else {
            return self.inner.save(ctx, record).await;
        };

        let instance = record.instance_key();
        let reopened = ctx
            .active_unit_of_work()
            .is_some_and(|uow| uow.is_pending(instance));

        // Encrypt a draft so the caller's record is untouched if encryption fails.
        record.with_mut(|current| {
            let mut draft = current.clone();
            if reopened {
                // Still ciphertext from an earlier save in this unit of work.
                restore_fields(&schema, &mut draft, &key);
            }
            encrypt_fields(&schema, &mut draft, &key).map(|_| *current = draft)
        })
        .map_err(|e| {
            error!(kind = R::KIND, error = %e, "field encryption failed; aborting write");
            StoreError::Aborted("field encryption failed".into())
        })?;

        // On failure the caller's record stays encrypted.
        self.inner.save(ctx, record).await?;

        match ctx.active_unit_of_work() {
            Some(uow) => {
                let entity = record.clone();
                uow.on_commit_once(instance, move || {
                    entity.with_mut(|current| decrypt_fields(&schema, current, &key));
                });
            }
            None => {
                record.with_mut(|current| decrypt_fields(&schema, current, &key));
            }
        }
        Ok(())
    }

    async fn find_by_id(&self, ctx: &CallContext, id: &str) -> StoreResult<Option<Entity<R>>> {
        let found = self.inner.find_by_id(ctx, id).await?;
        if !ctx.is_guarded() {
            if let Some(entity) = &found {
                self.decrypt_all(ctx, std::slice::from_ref(entity)).await;
            }
        }
        Ok(found)
    }

    async fn find_all(&self, ctx: &CallContext) -> StoreResult<Vec<Entity<R>>> {
        let found = self.inner.find_all(ctx).await?;
        if !ctx.is_guarded() {
            self.decrypt_all(ctx, &found).await;
        }
        Ok(found)
    }

    async fn find_by(
        &self,
        ctx: &CallContext,
        attribute: &str,
        value: &str,
    ) -> StoreResult<Vec<Entity<R>>> {
        let found = self.inner.find_by(ctx, attribute, value).await?;
        if !ctx.is_guarded() {
            self.decrypt_all(ctx, &found).await;
        }
        Ok(found)
    }

    async fn delete(&self, ctx: &CallContext, id: &str) -> StoreResult<bool> {
        self.inner.delete(ctx, id).await
    }
}

impl<R, S: std::fmt::Debug> std::fmt::Debug for EncryptingStore<R, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptingStore")
            .field("inner", &self.inner)
            .field("keys", &self.keys)
            .finish()
    }
}
