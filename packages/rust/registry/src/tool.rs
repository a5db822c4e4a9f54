//! The tool body abstraction.

use async_trait::async_trait;
use ingestflow_shared::ToolFailure;
use serde_json::Value;

/// Default parameters attached to a tool descriptor.
pub type Params = serde_json::Map<String, Value>;

/// A transformation unit held in the registry.
///
/// Bodies report failure as a [`ToolFailure`] value; they never see
/// unvalidated input and their output is validated before anyone else sees it.
#[async_trait]
pub trait Tool: Send + Sync {
    async fn call(&self, input: Value, params: &Params) -> Result<Value, ToolFailure>;
}

/// Adapts a synchronous closure into a [`Tool`].
pub struct FnTool<F> {
    f: F,
}

impl<F> FnTool<F>
where
    F: Fn(&Value, &Params) -> Result<Value, ToolFailure> + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

#[async_trait]
impl<F> Tool for FnTool<F>
where
    F: Fn(&Value, &Params) -> Result<Value, ToolFailure> + Send + Sync,
{
    async fn call(&self, input: Value, params: &Params) -> Result<Value, ToolFailure> {
        (self.f)(&input, params)
    }
}
