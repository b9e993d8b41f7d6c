//! Sensitive-field discovery and caching.
//!
//! # Responsibilities
//!
//! - Let every record type declare which string attributes are sensitive
//!   ([`SensitiveRecord`]), including those of embedded parts.
//! - Compute each type's [`RecordSchema`] once and cache it by type identity
//!   ([`FieldRegistry`]).
//! - Resolve the attribute naming a record's owner.
//!
//! # Module invariants
//!
//! - **No crypto dependencies.** This module must not import anything from `crate::crypto`
//!   or `crate::keys`.

pub mod field;
pub mod registry;

pub use field::SensitiveField;
pub use registry::FieldRegistry;

use common::Record;

/// Owner attribute consulted when a type does not override it.
pub const DEFAULT_OWNER_ATTRIBUTE: &str = "userId";

/// A record type that declares its sensitive attributes.
pub trait SensitiveRecord: Record {
    /// Every attribute tagged sensitive, in declaration order. Disabled
    /// descriptors may be included; they are filtered out when the schema is
    /// computed.
    fn sensitive_fields() -> Vec<SensitiveField<Self>>;

    /// Name of the attribute holding the owning user's id.
    fn owner_attribute() -> &'static str {
        DEFAULT_OWNER_ATTRIBUTE
    }
}

/// The computed, immutable encryption schema of one record type.
#[derive(Debug)]
pub struct RecordSchema<R> {
    fields: Vec<SensitiveField<R>>,
    owner_attribute: &'static str,
}

impl<R: SensitiveRecord> RecordSchema<R> {
    /// Collect the enabled sensitive fields of `R`.
    pub fn compute() -> Self {
        let fields = R::sensitive_fields()
            .into_iter()
            .filter(SensitiveField::is_enabled)
            .collect();
        Self {
            fields,
            owner_attribute: R::owner_attribute(),
        }
    }

    /// The record kind this schema belongs to.
    pub fn kind(&self) -> &'static str {
        R::KIND
    }

    /// Owner id read off the record itself.
    pub fn owner_of(&self, record: &R) -> Option<String> {
        record
            .attribute(self.owner_attribute)
            .filter(|id| !id.is_empty())
    }
}

impl<R> RecordSchema<R> {
    /// Enabled sensitive fields, in declaration order.
    pub fn fields(&self) -> &[SensitiveField<R>] {
        &self.fields
    }

    /// Returns `true` if the type has nothing to encrypt.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}
