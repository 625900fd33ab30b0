pub mod adapter;
pub mod builder;
pub mod document;
pub mod errors;
pub mod logger;
pub mod memory;
pub mod query;
pub mod types;

use std::sync::Arc;

use crate::adapter::ExecutionAdapter;
use crate::builder::Query;

/// Store façade: hands out per-collection query builders over a shared
/// execution adapter.
pub struct Store<A: ExecutionAdapter> {
    adapter: Arc<A>,
}

impl<A: ExecutionAdapter> Store<A> {
    pub fn new(adapter: A) -> Self {
        Self { adapter: Arc::new(adapter) }
    }

    #[must_use]
    pub const fn with_adapter(adapter: Arc<A>) -> Self {
        Self { adapter }
    }

    /// A fresh query over the named collection. Each builder belongs to a
    /// single logical call sequence; request another for concurrent use.
    #[must_use]
    pub fn collection(&self, name: &str) -> Query<A> {
        Query::new(self.adapter.clone(), name)
    }

    #[must_use]
    pub const fn adapter(&self) -> &Arc<A> {
        &self.adapter
    }
}

impl<A: ExecutionAdapter> Clone for Store<A> {
    fn clone(&self) -> Self {
        Self { adapter: self.adapter.clone() }
    }
}

/// Initializes the logging system.
///
/// This function should be called before any other query operations when
/// file-based logging is wanted.
pub fn init() -> Result<(), Box<dyn std::error::Error>> {
    logger::init()?;
    Ok(())
}
