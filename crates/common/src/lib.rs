//! Store-facing vocabulary shared by record stores and the `fieldvault` encryption layer.

pub mod context;
pub mod error;
pub mod memory;
pub mod store;
pub mod unit_of_work;

pub use context::CallContext;
pub use error::{StoreError, StoreResult};
pub use memory::MemoryStore;
pub use store::{Entity, Record, RecordStore};
pub use unit_of_work::UnitOfWork;
