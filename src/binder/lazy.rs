//! Deferred loaders for lazy slots.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use futures_util::future::BoxFuture;

use crate::binder::slot::{FieldToken, Watched};
use crate::error::{ConfigError, Result};

/// Fetches, decodes and publishes one slot's value.
pub type Loader = Arc<dyn Fn() -> BoxFuture<'static, Result<()>> + Send + Sync>;

/// Loaders of the lazy slots of one bind call, keyed by slot token.
#[derive(Clone, Default)]
pub struct LazyTable {
    loaders: HashMap<FieldToken, Loader>,
}

impl LazyTable {
    pub(crate) fn insert(&mut self, token: FieldToken, loader: Loader) {
        self.loaders.insert(token, loader);
    }

    pub fn contains(&self, token: FieldToken) -> bool {
        self.loaders.contains_key(&token)
    }

    pub fn len(&self) -> usize {
        self.loaders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.loaders.is_empty()
    }

    /// Current value of `slot`, running its loader first if it is empty.
    ///
    /// Concurrent first calls may each run the loader.
    pub async fn try_load<T>(&self, slot: &Watched<T>) -> Result<Arc<T>> {
        if let Some(value) = slot.load() {
            return Ok(value);
        }

        let loader = self.loaders.get(&slot.token()).ok_or(ConfigError::NotFound)?;
        loader().await?;

        slot.load().ok_or(ConfigError::NotFound)
    }
}

impl fmt::Debug for LazyTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LazyTable")
            .field("loaders", &self.loaders.len())
            .finish()
    }
}
