//! In-memory record store.

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::debug;

use crate::context::CallContext;
use crate::error::{StoreError, StoreResult};
use crate::store::{Entity, Record, RecordStore};

/// An in-memory [`RecordStore`].
///
/// Rows are kept in insertion order as owned copies, so the store only ever
/// sees the values a record held at the moment it was saved. Suitable for:
/// - Unit and integration tests
/// - Embedders that do not need durability
///
/// Uniqueness constraints can be declared per attribute with
/// [`MemoryStore::with_unique`]. Every operation yields to the scheduler once
/// before touching the rows, which lets concurrent callers interleave the way
/// they would against a networked store.
#[derive(Debug)]
pub struct MemoryStore<R> {
    rows: RwLock<Vec<R>>,
    unique: Vec<&'static str>,
}

impl<R: Record> MemoryStore<R> {
    /// Creates a new empty store with no constraints.
    pub fn new() -> Self {
        Self {
            rows: RwLock::new(Vec::new()),
            unique: Vec::new(),
        }
    }

    /// Declare a uniqueness constraint on `attribute`.
    #[must_use]
    pub fn with_unique(mut self, attribute: &'static str) -> Self {
        self.unique.push(attribute);
        self
    }

    /// Number of stored rows.
    pub fn len(&self) -> usize {
        self.rows.read().len()
    }

    /// Returns `true` if no rows are stored.
    pub fn is_empty(&self) -> bool {
        self.rows.read().is_empty()
    }

    /// Copy of the row exactly as persisted, bypassing any decorator.
    pub fn raw(&self, id: &str) -> Option<R> {
        self.rows
            .read()
            .iter()
            .find(|row| row.id() == Some(id))
            .cloned()
    }

    /// Mutate a persisted row directly. Returns `false` if `id` is unknown.
    ///
    /// Useful for simulating on-disk corruption in tests.
    pub fn update_raw(&self, id: &str, f: impl FnOnce(&mut R)) -> bool {
        let mut rows = self.rows.write();
        match rows.iter_mut().find(|row| row.id() == Some(id)) {
            Some(row) => {
                f(row);
                true
            }
            None => false,
        }
    }

    fn check_unique(&self, rows: &[R], candidate: &R, id: &str) -> StoreResult<()> {
        for &attribute in &self.unique {
            let Some(value) = candidate.attribute(attribute) else {
                continue;
            };
            let taken = rows.iter().any(|row| {
                row.id() != Some(id) && row.attribute(attribute).as_deref() == Some(value.as_str())
            });
            if taken {
                return Err(StoreError::UniqueViolation {
                    kind: R::KIND,
                    attribute: attribute.to_owned(),
                    value,
                });
            }
        }
        Ok(())
    }
}

impl<R: Record> Default for MemoryStore<R> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<R: Record> RecordStore<R> for MemoryStore<R> {
    async fn save(&self, _ctx: &CallContext, record: &Entity<R>) -> StoreResult<()> {
        tokio::task::yield_now().await;

        let mut candidate = record.snapshot();
        let id = match candidate.id() {
            Some(id) => id.to_owned(),
            None => uuid::Uuid::new_v4().to_string(),
        };
        candidate.set_id(id.clone());

        let mut rows = self.rows.write();
        self.check_unique(&rows, &candidate, &id)?;
        match rows.iter_mut().find(|row| row.id() == Some(id.as_str())) {
            Some(row) => *row = candidate,
            None => rows.push(candidate),
        }
        drop(rows);

        // The id is only written back once the row is durable.
        record.with_mut(|r| {
            if r.id().is_none() {
                r.set_id(id.clone());
            }
        });
        debug!(kind = R::KIND, id = %id, "row saved");
        Ok(())
    }

    async fn find_by_id(&self, _ctx: &CallContext, id: &str) -> StoreResult<Option<Entity<R>>> {
        tokio::task::yield_now().await;
        Ok(self.raw(id).map(Entity::new))
    }

    async fn find_all(&self, _ctx: &CallContext) -> StoreResult<Vec<Entity<R>>> {
        tokio::task::yield_now().await;
        Ok(self.rows.read().iter().cloned().map(Entity::new).collect())
    }

    async fn find_by(
        &self,
        _ctx: &CallContext,
        attribute: &str,
        value: &str,
    ) -> StoreResult<Vec<Entity<R>>> {
        tokio::task::yield_now().await;
        Ok(self
            .rows
            .read()
            .iter()
            .filter(|row| row.attribute(attribute).as_deref() == Some(value))
            .cloned()
            .map(Entity::new)
            .collect())
    }

    async fn delete(&self, _ctx: &CallContext, id: &str) -> StoreResult<bool> {
        tokio::task::yield_now().await;
        let mut rows = self.rows.write();
        let before = rows.len();
        rows.retain(|row| row.id() != Some(id));
        Ok(rows.len() != before)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Debug, PartialEq)]
    struct Account {
        id: Option<String>,
        email: String,
        nickname: String,
    }

    impl Record for Account {
        const KIND: &'static str = "account";

        fn id(&self) -> Option<&str> {
            self.id.as_deref()
        }

        fn set_id(&mut self, id: String) {
            self.id = Some(id);
        }

        fn attribute(&self, name: &str) -> Option<String> {
            match name {
                "email" => Some(self.email.clone()),
                "nickname" => Some(self.nickname.clone()),
                _ => None,
            }
        }
    }

    fn account(email: &str, nickname: &str) -> Entity<Account> {
        Entity::new(Account {
            id: None,
            email: email.into(),
            nickname: nickname.into(),
        })
    }

    #[tokio::test]
    async fn save_assigns_id_and_persists_copy() {
        let store = MemoryStore::new();
        let ctx = CallContext::anonymous();
        let a = account("a@example.com", "a");
        store.save(&ctx, &a).await.unwrap();

        let id = a.lock().id.clone().expect("id assigned");
        // Mutating the caller's instance does not touch the stored row.
        a.with_mut(|r| r.nickname = "changed".into());
        assert_eq!(store.raw(&id).unwrap().nickname, "a");
    }

    #[tokio::test]
    async fn save_existing_id_updates_in_place() {
        let store = MemoryStore::new();
        let ctx = CallContext::anonymous();
        let a = account("a@example.com", "a");
        store.save(&ctx, &a).await.unwrap();
        a.with_mut(|r| r.nickname = "renamed".into());
        store.save(&ctx, &a).await.unwrap();
        assert_eq!(store.len(), 1);
        let all = store.find_all(&ctx).await.unwrap();
        assert_eq!(all[0].lock().nickname, "renamed");
    }

    #[tokio::test]
    async fn unique_constraint_rejects_second_row() {
        let store = MemoryStore::new().with_unique("email");
        let ctx = CallContext::anonymous();
        store.save(&ctx, &account("a@example.com", "a")).await.unwrap();
        let err = store
            .save(&ctx, &account("a@example.com", "b"))
            .await
            .unwrap_err();
        assert!(err.is_conflict());
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn rejected_save_leaves_id_unset() {
        let store = MemoryStore::new().with_unique("email");
        let ctx = CallContext::anonymous();
        store.save(&ctx, &account("a@example.com", "a")).await.unwrap();
        let dup = account("a@example.com", "b");
        assert!(store.save(&ctx, &dup).await.is_err());
        assert!(dup.lock().id.is_none());
    }

    #[tokio::test]
    async fn find_by_and_delete() {
        let store = MemoryStore::new();
        let ctx = CallContext::anonymous();
        store.save(&ctx, &account("a@example.com", "x")).await.unwrap();
        store.save(&ctx, &account("b@example.com", "x")).await.unwrap();
        store.save(&ctx, &account("c@example.com", "y")).await.unwrap();

        let xs = store.find_by(&ctx, "nickname", "x").await.unwrap();
        assert_eq!(xs.len(), 2);

        let id = xs[0].lock().id.clone().unwrap();
        assert!(store.delete(&ctx, &id).await.unwrap());
        assert!(!store.delete(&ctx, &id).await.unwrap());
        assert!(store.find_by_id(&ctx, &id).await.unwrap().is_none());
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn update_raw_unknown_id() {
        let store: MemoryStore<Account> = MemoryStore::new();
        assert!(!store.update_raw("missing", |_| {}));
        assert!(store.is_empty());
    }
}
