use std::{any::Any, borrow::Borrow, fmt, future::Future, sync::Arc};

use serde::{Deserialize, Serialize};

use crate::{
    command::CommandMeta,
    decorator::BoxFuture,
    extension::{ExtensionContext, ExtensionValue, Extensions},
    setup::SetupContext,
};

/// Unique identifier of a plugin within one run.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PluginId(String);

impl PluginId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PluginId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PluginId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for PluginId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl Borrow<str> for PluginId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// Reference from one plugin to another.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Dependency {
    pub id: PluginId,
    /// Optional dependencies only constrain ordering when present.
    pub optional: bool,
}

impl Dependency {
    pub fn required(id: impl Into<PluginId>) -> Self {
        Self {
            id: id.into(),
            optional: false,
        }
    }

    pub fn optional(id: impl Into<PluginId>) -> Self {
        Self {
            id: id.into(),
            optional: true,
        }
    }
}

impl From<&str> for Dependency {
    fn from(id: &str) -> Self {
        Self::required(id)
    }
}

impl From<PluginId> for Dependency {
    fn from(id: PluginId) -> Self {
        Self::required(id)
    }
}

type SetupFn = Arc<dyn Fn(SetupContext) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;
type ExtensionFn =
    Arc<dyn Fn(ExtensionContext) -> BoxFuture<'static, anyhow::Result<ExtensionValue>> + Send + Sync>;
type OnExtensionFn =
    Arc<dyn Fn(Extensions, CommandMeta) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

/// Descriptor of a plugin.
///
/// Descriptors are immutable templates: the engine never mutates them and
/// the same descriptor can be handed to any number of runs.
#[derive(Clone)]
pub struct Plugin {
    id: PluginId,
    name: Option<String>,
    dependencies: Vec<Dependency>,
    setup: Option<SetupFn>,
    extension: Option<ExtensionFn>,
    on_extension: Option<OnExtensionFn>,
}

impl Plugin {
    pub fn new(id: impl Into<PluginId>) -> Self {
        Self {
            id: id.into(),
            name: None,
            dependencies: Vec::new(),
            setup: None,
            extension: None,
            on_extension: None,
        }
    }

    /// Human readable name used in logs.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn depends_on(mut self, dependency: impl Into<Dependency>) -> Self {
        self.dependencies.push(dependency.into());
        self
    }

    /// Register the setup callback. It receives a registration handle that
    /// stops accepting registrations once the callback has finished.
    pub fn setup<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(SetupContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.setup = Some(Arc::new(
            move |ctx: SetupContext| -> BoxFuture<'static, anyhow::Result<()>> { Box::pin(f(ctx)) },
        ));
        self
    }

    /// Register the factory producing this plugin's extension value.
    pub fn extension<T, F, Fut>(mut self, f: F) -> Self
    where
        T: Any + Send + Sync,
        F: Fn(ExtensionContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        self.extension = Some(Arc::new(
            move |ctx: ExtensionContext| -> BoxFuture<'static, anyhow::Result<ExtensionValue>> {
                let built = f(ctx);
                Box::pin(async move { built.await.map(|value| Arc::new(value) as ExtensionValue) })
            },
        ));
        self
    }

    /// Register a callback run once every extension of the run exists.
    pub fn on_extension<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(Extensions, CommandMeta) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.on_extension = Some(Arc::new(
            move |extensions: Extensions,
                  meta: CommandMeta|
                  -> BoxFuture<'static, anyhow::Result<()>> {
                Box::pin(f(extensions, meta))
            },
        ));
        self
    }

    pub fn id(&self) -> &PluginId {
        &self.id
    }

    /// Display name, falling back to the id.
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(self.id.as_str())
    }

    pub fn dependencies(&self) -> &[Dependency] {
        &self.dependencies
    }

    pub fn has_setup(&self) -> bool {
        self.setup.is_some()
    }

    pub fn has_extension(&self) -> bool {
        self.extension.is_some()
    }

    pub fn has_on_extension(&self) -> bool {
        self.on_extension.is_some()
    }

    pub async fn run_setup(&self, ctx: SetupContext) -> anyhow::Result<()> {
        match &self.setup {
            Some(setup) => setup(ctx).await,
            None => Ok(()),
        }
    }

    /// Build the extension value, or `None` when the plugin declares no factory.
    pub async fn build_extension(
        &self,
        ctx: ExtensionContext,
    ) -> anyhow::Result<Option<ExtensionValue>> {
        match &self.extension {
            Some(factory) => factory(ctx).await.map(Some),
            None => Ok(None),
        }
    }

    pub async fn notify_extensions(
        &self,
        extensions: Extensions,
        meta: CommandMeta,
    ) -> anyhow::Result<()> {
        match &self.on_extension {
            Some(callback) => callback(extensions, meta).await,
            None => Ok(()),
        }
    }
}

impl fmt::Debug for Plugin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Plugin")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("dependencies", &self.dependencies)
            .field("setup", &self.has_setup())
            .field("extension", &self.has_extension())
            .field("on_extension", &self.has_on_extension())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{command::CliEnv, setup::SetupRegistry};

    #[test]
    fn dependency_forms() {
        let plugin = Plugin::new("b")
            .depends_on("a")
            .depends_on(Dependency::optional("c"));
        assert_eq!(
            plugin.dependencies(),
            &[Dependency::required("a"), Dependency::optional("c")]
        );
        assert_eq!(plugin.display_name(), "b");
        assert_eq!(plugin.clone().name("Bee").display_name(), "Bee");
    }

    #[tokio::test]
    async fn callbacks_are_optional() {
        let plugin = Plugin::new("noop");
        let registry = SetupRegistry::new(CliEnv::default());
        plugin.run_setup(registry.open("noop".into())).await.unwrap();
        assert!(registry.into_parts().global_options.is_empty());

        let ext_ctx = ExtensionContext {
            plugin: "noop".into(),
            extensions: Extensions::new(),
            values: Default::default(),
            explicit: Default::default(),
            positionals: Vec::new(),
            meta: CommandMeta::default(),
            env: CliEnv::default(),
        };
        assert!(plugin.build_extension(ext_ctx).await.unwrap().is_none());
        plugin
            .notify_extensions(Extensions::new(), CommandMeta::default())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn extension_value_is_type_erased() {
        let plugin = Plugin::new("num").extension(|_ctx| async { Ok(42u64) });
        let ext_ctx = ExtensionContext {
            plugin: "num".into(),
            extensions: Extensions::new(),
            values: Default::default(),
            explicit: Default::default(),
            positionals: Vec::new(),
            meta: CommandMeta::default(),
            env: CliEnv::default(),
        };
        let value = plugin.build_extension(ext_ctx).await.unwrap().unwrap();
        assert_eq!(value.downcast_ref::<u64>(), Some(&42));
    }
}
