use std::{future::Future, pin::Pin, sync::Arc};

use crate::{command::CommandContext, schema::ValidationErrors};

/// Boxed future used by every type-erased callback.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Executes a command against its context and optionally produces output.
pub type CommandRunner =
    Arc<dyn Fn(Arc<CommandContext>) -> BoxFuture<'static, anyhow::Result<Option<String>>> + Send + Sync>;

/// Produces header or usage text for a command.
pub type Renderer =
    Arc<dyn Fn(Arc<CommandContext>) -> BoxFuture<'static, anyhow::Result<String>> + Send + Sync>;

/// Produces text for an aggregate argument validation error.
pub type ValidationErrorsRenderer = Arc<
    dyn Fn(Arc<CommandContext>, Arc<ValidationErrors>) -> BoxFuture<'static, anyhow::Result<String>>
        + Send
        + Sync,
>;

/// Wraps an inner runner (or renderer) into an outer one.
pub type Decorator<R> = Arc<dyn Fn(R) -> R + Send + Sync>;

/// Fold `decorators` around `base`.
///
/// For decorators registered as `[a, b, c]` the result is `a(b(c(base)))`:
/// code running before the inner call executes in registration order and
/// code running after it executes in reverse.
pub fn compose<R>(base: R, decorators: &[Decorator<R>]) -> R {
    decorators
        .iter()
        .rev()
        .fold(base, |inner, decorate| decorate(inner))
}

/// Build a [`CommandRunner`] from an async closure.
pub fn runner<F, Fut>(f: F) -> CommandRunner
where
    F: Fn(Arc<CommandContext>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<Option<String>>> + Send + 'static,
{
    Arc::new(
        move |ctx: Arc<CommandContext>| -> BoxFuture<'static, anyhow::Result<Option<String>>> {
            Box::pin(f(ctx))
        },
    )
}

/// Build a header or usage [`Renderer`] from an async closure.
pub fn renderer<F, Fut>(f: F) -> Renderer
where
    F: Fn(Arc<CommandContext>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<String>> + Send + 'static,
{
    Arc::new(
        move |ctx: Arc<CommandContext>| -> BoxFuture<'static, anyhow::Result<String>> {
            Box::pin(f(ctx))
        },
    )
}

/// Build a [`ValidationErrorsRenderer`] from an async closure.
pub fn validation_errors_renderer<F, Fut>(f: F) -> ValidationErrorsRenderer
where
    F: Fn(Arc<CommandContext>, Arc<ValidationErrors>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<String>> + Send + 'static,
{
    Arc::new(
        move |ctx: Arc<CommandContext>,
              errors: Arc<ValidationErrors>|
              -> BoxFuture<'static, anyhow::Result<String>> { Box::pin(f(ctx, errors)) },
    )
}
