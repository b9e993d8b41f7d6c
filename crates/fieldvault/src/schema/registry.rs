//! In-memory cache of computed record schemas, keyed by record type.
//!
//! Schemas are static for the process lifetime: each is computed once, on
//! registration or first use, and never invalidated. The cache uses `arc-swap`
//! for lock-free reads on the hot path.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

use arc_swap::ArcSwap;
use tracing::debug;

use super::{RecordSchema, SensitiveRecord};

type SchemaMap = HashMap<TypeId, Arc<dyn Any + Send + Sync>>;

/// Shared, lock-free cache of [`RecordSchema`]s keyed by record type.
///
/// Internally backed by [`ArcSwap`] so readers never block; registering a new
/// type swaps in a copy of the map with the entry added.
#[derive(Clone)]
pub struct FieldRegistry {
    inner: Arc<ArcSwap<SchemaMap>>,
}

impl FieldRegistry {
    /// Create a new, empty [`FieldRegistry`].
    pub fn new() -> Self {
        Self {
            inner: Arc::new(ArcSwap::from_pointee(HashMap::new())),
        }
    }

    /// Return the number of record types currently cached.
    pub fn len(&self) -> usize {
        self.inner.load().len()
    }

    /// Return `true` if no record types are cached.
    pub fn is_empty(&self) -> bool {
        self.inner.load().is_empty()
    }

    /// Compute and cache the schema of `R` if it is not cached yet.
    pub fn register<R: SensitiveRecord>(&self) -> Arc<RecordSchema<R>> {
        self.fields_of::<R>()
    }

    /// The enabled sensitive fields of `R`, computed once and cached by type.
    ///
    /// This is a lock-free read once `R` is cached.
    pub fn fields_of<R: SensitiveRecord>(&self) -> Arc<RecordSchema<R>> {
        let type_id = TypeId::of::<R>();
        if let Some(cached) = lookup::<R>(&self.inner.load(), type_id) {
            return cached;
        }

        let computed: Arc<RecordSchema<R>> = Arc::new(RecordSchema::compute());
        // Two callers racing on a new type may both compute; the first insert wins
        // and both observe the same entry afterwards.
        self.inner.rcu(|current| {
            let mut next = SchemaMap::clone(current);
            next.entry(type_id)
                .or_insert_with(|| computed.clone() as Arc<dyn Any + Send + Sync>);
            next
        });
        let cached = lookup::<R>(&self.inner.load(), type_id).unwrap_or(computed);
        debug!(
            kind = cached.kind(),
            fields = cached.fields().len(),
            "record schema registered"
        );
        cached
    }
}

fn lookup<R: SensitiveRecord>(map: &SchemaMap, type_id: TypeId) -> Option<Arc<RecordSchema<R>>> {
    map.get(&type_id)
        .cloned()
        .and_then(|entry| entry.downcast::<RecordSchema<R>>().ok())
}

impl Default for FieldRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for FieldRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FieldRegistry")
            .field("types", &self.len())
            .finish()
    }
}
