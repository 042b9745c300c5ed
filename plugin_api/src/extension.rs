use std::{any::Any, collections::HashMap, fmt, sync::Arc};

use serde_json::Value;

use crate::{
    command::{CliEnv, CommandMeta},
    plugin::PluginId,
    schema::Values,
};

/// Type-erased extension value stored in the namespace.
pub type ExtensionValue = Arc<dyn Any + Send + Sync>;

/// Mapping from plugin id to the extension that plugin built for this run.
///
/// Read-only; the namespace of a run is filled through an
/// [`ExtensionsBuilder`] held by the engine. Cloning is cheap.
#[derive(Clone, Default)]
pub struct Extensions {
    entries: HashMap<PluginId, ExtensionValue>,
}

impl Extensions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Typed lookup. `None` when the plugin contributed nothing or the type differs.
    pub fn get<T: Any + Send + Sync>(&self, id: &str) -> Option<Arc<T>> {
        self.entries.get(id)?.clone().downcast::<T>().ok()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &PluginId> {
        self.entries.keys()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

}

/// Write side of a run's namespace. Slots are write-once.
#[derive(Debug, Default)]
pub struct ExtensionsBuilder {
    namespace: Extensions,
}

impl ExtensionsBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `value` under `id`. Returns `false` and keeps the existing entry
    /// if the slot is already taken.
    pub fn insert(&mut self, id: PluginId, value: ExtensionValue) -> bool {
        if self.namespace.entries.contains_key(&id) {
            return false;
        }
        self.namespace.entries.insert(id, value);
        true
    }

    /// Copy of the entries stored so far.
    pub fn snapshot(&self) -> Extensions {
        self.namespace.clone()
    }

    pub fn finish(self) -> Extensions {
        self.namespace
    }
}

impl fmt::Debug for Extensions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut ids: Vec<_> = self.entries.keys().collect();
        ids.sort();
        f.debug_set().entries(ids).finish()
    }
}

/// Read-only view handed to an extension factory.
#[derive(Debug, Clone)]
pub struct ExtensionContext {
    /// The plugin whose extension is being built.
    pub plugin: PluginId,
    /// Extensions built so far by plugins ordered before this one.
    pub extensions: Extensions,
    pub values: Values,
    pub explicit: HashMap<String, bool>,
    pub positionals: Vec<String>,
    pub meta: CommandMeta,
    pub env: CliEnv,
}

impl ExtensionContext {
    pub fn extension<T: Any + Send + Sync>(&self, id: &str) -> Option<Arc<T>> {
        self.extensions.get(id)
    }

    pub fn value(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }
}
