//! [`SensitiveField`]: one attribute of a record type marked for encryption.

use std::fmt;
use std::sync::Arc;

type Accessor<R> = dyn for<'a> Fn(&'a mut R) -> Option<&'a mut String> + Send + Sync;

/// Descriptor of a sensitive string attribute on records of type `R`.
///
/// The accessor returns `None` when the attribute is absent (e.g. an unset
/// optional field); absent attributes are never transformed.
pub struct SensitiveField<R> {
    name: &'static str,
    enabled: bool,
    accessor: Arc<Accessor<R>>,
}

impl<R: 'static> SensitiveField<R> {
    /// Mark the attribute reached through `accessor` as sensitive.
    ///
    /// ```ignore
    /// SensitiveField::new("title", |t: &mut Todo| Some(&mut t.title))
    /// SensitiveField::new("description", |t: &mut Todo| t.description.as_mut())
    /// ```
    pub fn new<F>(name: &'static str, accessor: F) -> Self
    where
        F: for<'a> Fn(&'a mut R) -> Option<&'a mut String> + Send + Sync + 'static,
    {
        Self {
            name,
            enabled: true,
            accessor: Arc::new(accessor),
        }
    }

    /// Toggle encryption for this attribute. Disabled fields are dropped when
    /// the schema is computed.
    #[must_use]
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Lift a descriptor of an embedded part into the outer record type.
    ///
    /// This is how a record picks up the sensitive attributes of a shared base
    /// struct it contains.
    pub fn embed<O: 'static>(self, project: fn(&mut O) -> &mut R) -> SensitiveField<O> {
        let inner = self.accessor;
        SensitiveField::new(self.name, move |outer: &mut O| (*inner)(project(outer)))
            .enabled(self.enabled)
    }
}

impl<R> SensitiveField<R> {
    /// Attribute name, for logs.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Whether the attribute is tagged sensitive-and-enabled.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Borrow the attribute's value, if present.
    pub fn value_mut<'a>(&self, record: &'a mut R) -> Option<&'a mut String> {
        (*self.accessor)(record)
    }
}

impl<R> Clone for SensitiveField<R> {
    fn clone(&self) -> Self {
        Self {
            name: self.name,
            enabled: self.enabled,
            accessor: Arc::clone(&self.accessor),
        }
    }
}

impl<R> fmt::Debug for SensitiveField<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SensitiveField")
            .field("name", &self.name)
            .field("enabled", &self.enabled)
            .finish()
    }
}
