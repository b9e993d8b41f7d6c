//! Record store abstraction.
//!
//! Stores are **opaque row stores**: they persist and return whole records and
//! never interpret attribute contents. Encryption is layered on top by
//! decorating a store with another implementation of the same trait.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::{Mutex, MutexGuard};

use crate::context::CallContext;
use crate::error::StoreResult;

/// A persistable record type.
pub trait Record: Clone + Send + Sync + 'static {
    /// Stable name of the record type, used in logs and store errors.
    const KIND: &'static str;

    /// Primary key, `None` until the store assigns one.
    fn id(&self) -> Option<&str>;

    /// Set the primary key. Called by stores on first save.
    fn set_id(&mut self, id: String);

    /// Look up a named attribute as a string.
    ///
    /// Used for finder queries, uniqueness constraints, and owner resolution.
    /// Returns `None` for unknown attributes and absent values.
    fn attribute(&self, _name: &str) -> Option<String> {
        None
    }
}

/// Shared handle to an in-memory record instance.
///
/// Clones refer to the same instance, so a mutation made through one handle
/// (e.g. a deferred post-commit decryption) is visible through all of them.
pub struct Entity<R> {
    inner: Arc<Mutex<R>>,
}

impl<R> Entity<R> {
    /// Wrap a record in a new handle.
    pub fn new(record: R) -> Self {
        Self {
            inner: Arc::new(Mutex::new(record)),
        }
    }

    /// Lock the record for reading or writing.
    ///
    /// Do not hold the guard across an `.await`.
    pub fn lock(&self) -> MutexGuard<'_, R> {
        self.inner.lock()
    }

    /// Run `f` with exclusive access to the record.
    pub fn with_mut<T>(&self, f: impl FnOnce(&mut R) -> T) -> T {
        f(&mut self.inner.lock())
    }

    /// Returns `true` if both handles point at the same instance.
    pub fn same_instance(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Identity of the shared instance, equal across clones. Stable for as long
    /// as any handle to the instance is alive.
    pub fn instance_key(&self) -> usize {
        Arc::as_ptr(&self.inner) as usize
    }
}

impl<R: Clone> Entity<R> {
    /// Copy of the record as it currently stands.
    pub fn snapshot(&self) -> R {
        self.inner.lock().clone()
    }
}

impl<R> Clone for Entity<R> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<R: fmt::Debug> fmt::Debug for Entity<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Entity").field(&*self.inner.lock()).finish()
    }
}

impl<R> From<R> for Entity<R> {
    fn from(record: R) -> Self {
        Self::new(record)
    }
}

/// Read/write interface of a record store for records of type `R`.
///
/// Every call carries the [`CallContext`] of the logical operation it belongs to.
#[async_trait]
pub trait RecordStore<R: Record>: Send + Sync {
    /// Insert or update `record`. Assigns an id on first save.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::UniqueViolation`](crate::StoreError::UniqueViolation)
    /// when a uniqueness constraint rejects the write.
    async fn save(&self, ctx: &CallContext, record: &Entity<R>) -> StoreResult<()>;

    /// Fetch a record by primary key.
    async fn find_by_id(&self, ctx: &CallContext, id: &str) -> StoreResult<Option<Entity<R>>>;

    /// Fetch every record.
    async fn find_all(&self, ctx: &CallContext) -> StoreResult<Vec<Entity<R>>>;

    /// Fetch every record whose `attribute` equals `value`.
    async fn find_by(
        &self,
        ctx: &CallContext,
        attribute: &str,
        value: &str,
    ) -> StoreResult<Vec<Entity<R>>>;

    /// Delete a record by primary key. Returns `true` if a row was removed.
    async fn delete(&self, ctx: &CallContext, id: &str) -> StoreResult<bool>;
}

#[async_trait]
impl<R, S> RecordStore<R> for Arc<S>
where
    R: Record,
    S: RecordStore<R> + ?Sized,
{
    async fn save(&self, ctx: &CallContext, record: &Entity<R>) -> StoreResult<()> {
        (**self).save(ctx, record).await
    }

    async fn find_by_id(&self, ctx: &CallContext, id: &str) -> StoreResult<Option<Entity<R>>> {
        (**self).find_by_id(ctx, id).await
    }

    async fn find_all(&self, ctx: &CallContext) -> StoreResult<Vec<Entity<R>>> {
        (**self).find_all(ctx).await
    }

    async fn find_by(
        &self,
        ctx: &CallContext,
        attribute: &str,
        value: &str,
    ) -> StoreResult<Vec<Entity<R>>> {
        (**self).find_by(ctx, attribute, value).await
    }

    async fn delete(&self, ctx: &CallContext, id: &str) -> StoreResult<bool> {
        (**self).delete(ctx, id).await
    }
}
