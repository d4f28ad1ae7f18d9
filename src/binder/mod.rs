//! Struct binding: declarative field → `(namespace, key)` tables.
//!
//! # Responsibilities
//! - Load every bound field from the engine when a struct is bound
//! - Keep watched slots current by decoding each change into a fresh value
//!   and swapping it in
//! - Defer lazy slots until first [`LazyTable::try_load`]
//!
//! # Field Kinds
//! ```text
//! field(&mut T)      eager, plain assignment; lazy/watch ignored with a warning
//! slot(&Watched<T>)  atomic; honours watch and lazy
//! ```
//!
//! # Example
//! ```ignore
//! struct App {
//!     name: String,
//!     db: Watched<DbConfig>,
//! }
//!
//! impl Bind for App {
//!     fn bindings<'a>(&'a mut self, b: &mut Bindings<'a>) {
//!         b.field("name", "namespace:app;key:name", &mut self.name)
//!             .slot("db", "namespace:app;key:db;format:json;watch:true", &self.db);
//!     }
//! }
//!
//! let lazy = Binder::new(engine).bind(&mut app).await?;
//! ```

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures_util::future::BoxFuture;
use serde::de::DeserializeOwned;

use crate::config::BinderSettings;
use crate::driver::{DecoderRegistry, Hook};
use crate::engine::Engine;
use crate::error::{ConfigError, Result};

pub mod lazy;
pub mod slot;
pub mod tag;

pub use lazy::{LazyTable, Loader};
pub use slot::{FieldToken, Watched};
pub use tag::BindTag;

/// Types that declare how their fields map to configuration keys.
pub trait Bind {
    fn bindings<'a>(&'a mut self, b: &mut Bindings<'a>);
}

type Assign<'a> = Box<dyn FnOnce(&DecoderRegistry, &str, &[u8]) -> Result<()> + Send + 'a>;

/// Builds a hook that decodes a raw value and publishes it into a slot.
type Publisher = Box<dyn Fn(Arc<DecoderRegistry>, String) -> Hook + Send>;

enum Target<'a> {
    Field(Assign<'a>),
    Slot {
        token: FieldToken,
        publisher: Publisher,
    },
}

struct Binding<'a> {
    name: &'a str,
    tag: &'a str,
    target: Target<'a>,
}

/// The binding table of one struct.
#[derive(Default)]
pub struct Bindings<'a> {
    entries: Vec<Binding<'a>>,
}

impl<'a> Bindings<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a plain field, loaded once at bind time.
    pub fn field<T>(&mut self, name: &'a str, tag: &'a str, target: &'a mut T) -> &mut Self
    where
        T: DeserializeOwned + Send,
    {
        let assign: Assign<'a> = Box::new(move |decoders: &DecoderRegistry, format: &str, raw: &[u8]| {
            *target = decoders.decode(format, raw)?;
            Ok(())
        });
        self.entries.push(Binding {
            name,
            tag,
            target: Target::Field(assign),
        });
        self
    }

    /// Bind an atomic slot; honours `watch` and `lazy`.
    pub fn slot<T>(&mut self, name: &'a str, tag: &'a str, slot: &Watched<T>) -> &mut Self
    where
        T: DeserializeOwned + Send + Sync + 'static,
    {
        let cell = slot.clone();
        let publisher: Publisher = Box::new(move |decoders: Arc<DecoderRegistry>, format: String| -> Hook {
            let cell = cell.clone();
            Arc::new(move |raw: &[u8]| {
                let value: T = decoders.decode(&format, raw)?;
                cell.store(Arc::new(value));
                Ok(())
            })
        });
        self.entries.push(Binding {
            name,
            tag,
            target: Target::Slot {
                token: slot.token(),
                publisher,
            },
        });
        self
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Applies binding tables against an engine.
#[derive(Debug, Clone)]
pub struct Binder {
    engine: Arc<Engine>,
    load_timeout: Duration,
}

impl Binder {
    pub fn new(engine: Arc<Engine>) -> Self {
        Self::with_settings(engine, &BinderSettings::default())
    }

    pub fn with_settings(engine: Arc<Engine>, settings: &BinderSettings) -> Self {
        Self {
            engine,
            load_timeout: settings.load_timeout(),
        }
    }

    /// Bind `target`, returning the loaders of its lazy slots.
    pub async fn bind<B>(&self, target: &mut B) -> Result<LazyTable>
    where
        B: Bind + ?Sized,
    {
        let mut bindings = Bindings::new();
        target.bindings(&mut bindings);
        self.apply(bindings).await
    }

    /// Load, watch or defer every entry of `bindings`.
    ///
    /// Stops at the first failing entry; entries before it stay loaded.
    pub async fn apply(&self, bindings: Bindings<'_>) -> Result<LazyTable> {
        let mut table = LazyTable::default();

        for binding in bindings.entries {
            let name = binding.name;
            self.apply_one(binding, &mut table)
                .await
                .map_err(|e| ConfigError::Field {
                    field: name.to_string(),
                    source: Box::new(e),
                })?;
        }

        Ok(table)
    }

    async fn apply_one(&self, binding: Binding<'_>, table: &mut LazyTable) -> Result<()> {
        let tag: BindTag = binding.tag.parse()?;
        let decoders = self.engine.decoders().clone();
        if !tag.format.is_empty() && !decoders.contains(&tag.format) {
            return Err(ConfigError::UnsupportedFormat(tag.format));
        }

        match binding.target {
            Target::Field(assign) => {
                for (set, option) in [(tag.lazy, "lazy"), (tag.watch, "watch")] {
                    if set {
                        tracing::warn!(
                            field = binding.name,
                            option,
                            "Field {} is not hot-swappable, {} option is ignored",
                            binding.name,
                            option
                        );
                    }
                }

                let raw = self.fetch(&tag.namespace, &tag.key).await?;
                assign(decoders.as_ref(), &tag.format, raw.as_ref())
            }
            Target::Slot { token, publisher } => {
                let publish = publisher(decoders, tag.format.clone());

                if tag.watch && !self.engine.on_key_change_hook(&tag.namespace, &tag.key, publish.clone()) {
                    return Err(ConfigError::NotWatchable {
                        namespace: tag.namespace,
                        key: tag.key,
                        field: binding.name.to_string(),
                    });
                }

                let loader = self.loader(tag.namespace, tag.key, publish);
                if tag.lazy {
                    table.insert(token, loader);
                    Ok(())
                } else {
                    loader().await
                }
            }
        }
    }

    async fn fetch(&self, namespace: &str, key: &str) -> Result<Bytes> {
        fetch(&self.engine, namespace, key, self.load_timeout).await
    }

    fn loader(&self, namespace: String, key: String, publish: Hook) -> Loader {
        let engine = self.engine.clone();
        let timeout = self.load_timeout;

        Arc::new(move || -> BoxFuture<'static, Result<()>> {
            let engine = engine.clone();
            let namespace = namespace.clone();
            let key = key.clone();
            let publish = publish.clone();

            Box::pin(async move {
                let raw = fetch(&engine, &namespace, &key, timeout).await?;
                publish(&raw)
            })
        })
    }
}

async fn fetch(engine: &Engine, namespace: &str, key: &str, timeout: Duration) -> Result<Bytes> {
    tokio::time::timeout(timeout, engine.get_raw_shared(namespace, key))
        .await
        .map_err(|_| ConfigError::Timeout(timeout))?
}
