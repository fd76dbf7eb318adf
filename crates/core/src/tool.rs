//! Tool descriptors, tool providers, and the tool cache.
//!
//! Tools are opaque remote capabilities. A [`ToolProvider`] returns the
//! list of [`ToolDescriptor`]s it serves; each descriptor carries a
//! schema for the model and an invocation handle bound to the provider's
//! connection.

mod cache;
mod error;
mod executor;

use std::fmt::{self, Debug};
use std::pin::Pin;
use std::sync::Arc;

use segment_agent_model::ModelTool;
use serde_json::Value;

pub use cache::{ToolCache, ToolSetSource};
pub use error::{Error, ErrorKind};
pub(crate) use executor::Executor;

/// The result of a tool call.
pub type ToolResult = Result<String, Error>;

/// The invocation handle of a single tool.
///
/// Implementations are usually bound to a connection that is shared by
/// every tool of the same provider.
pub trait ToolInvoker: Send + Sync + 'static {
    /// Invokes the tool with the arguments produced by the model.
    ///
    /// This method must return a future that is fully independent of `self`,
    /// and dropping the future should cancel the invocation.
    fn invoke(
        &self,
        arguments: Value,
    ) -> impl Future<Output = ToolResult> + Send + 'static;
}

/// A source of tool descriptors, such as a remote tool server.
pub trait ToolProvider: Send + Sync + 'static {
    /// Fetches the complete list of tools.
    fn fetch_tools(
        &self,
    ) -> impl Future<Output = Result<Vec<ToolDescriptor>, Error>> + Send + 'static;
}

trait InvokerObject: Send + Sync + 'static {
    fn invoke(
        &self,
        arguments: Value,
    ) -> Pin<Box<dyn Future<Output = ToolResult> + Send>>;
}

struct AnyInvoker<T: ToolInvoker>(T);

impl<T: ToolInvoker> InvokerObject for AnyInvoker<T> {
    #[inline]
    fn invoke(
        &self,
        arguments: Value,
    ) -> Pin<Box<dyn Future<Output = ToolResult> + Send>> {
        Box::pin(self.0.invoke(arguments))
    }
}

/// A named, schema-typed capability the model may invoke.
///
/// Descriptors are immutable and cheap to clone, so one fetched list can
/// be shared by every turn.
#[derive(Clone)]
pub struct ToolDescriptor {
    name: String,
    description: String,
    input_schema: Value,
    invoker: Arc<dyn InvokerObject>,
}

impl ToolDescriptor {
    /// Creates a descriptor.
    pub fn new<N, D, I>(
        name: N,
        description: D,
        input_schema: Value,
        invoker: I,
    ) -> Self
    where
        N: Into<String>,
        D: Into<String>,
        I: ToolInvoker,
    {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema,
            invoker: Arc::new(AnyInvoker(invoker)),
        }
    }

    /// Returns the name of the tool.
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the description of the tool.
    #[inline]
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Returns the JSON schema of the tool's input.
    #[inline]
    pub fn input_schema(&self) -> &Value {
        &self.input_schema
    }

    /// Invokes the tool.
    #[inline]
    pub fn invoke(
        &self,
        arguments: Value,
    ) -> impl Future<Output = ToolResult> + Send + 'static {
        self.invoker.invoke(arguments)
    }

    pub(crate) fn definition(&self) -> ModelTool {
        ModelTool {
            name: self.name.clone(),
            description: self.description.clone(),
            parameters: self.input_schema.clone(),
        }
    }
}

impl Debug for ToolDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolDescriptor")
            .field("name", &self.name)
            .field("description", &self.description)
            .finish_non_exhaustive()
    }
}
