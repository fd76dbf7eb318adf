use std::collections::HashMap;

use futures_util::future::join_all;
use segment_agent_model::{ModelTool, ToolCallRequest, ToolCallResult};

use crate::tool::{Error, ToolDescriptor};

/// An executor that handles tool call requests from the model.
pub struct Executor {
    tools: Vec<ToolDescriptor>,
    index: HashMap<String, usize>,
}

impl Executor {
    pub fn with_tools(tools: &[ToolDescriptor]) -> Self {
        let mut index = HashMap::with_capacity(tools.len());
        for (i, tool) in tools.iter().enumerate() {
            if index.insert(tool.name().to_owned(), i).is_some() {
                warn!("duplicated tool name: {}", tool.name());
            }
        }
        Self {
            tools: tools.to_vec(),
            index,
        }
    }

    /// Returns the tool definitions in the order the provider listed them.
    #[inline]
    pub fn definitions(&self) -> Vec<ModelTool> {
        self.tools.iter().map(ToolDescriptor::definition).collect()
    }

    /// Runs every request concurrently and returns the results in request
    /// order.
    ///
    /// Recoverable failures are turned into an error text the model can
    /// read. The first fatal failure is returned instead.
    pub async fn execute_all(
        &self,
        requests: &[ToolCallRequest],
    ) -> Result<Vec<ToolCallResult>, Error> {
        let span = debug_span!("tool executor", calls = requests.len());
        let futures: Vec<_> = span.in_scope(|| {
            requests
                .iter()
                .map(|req| {
                    let id = req.id.clone();
                    let name = req.name.clone();
                    let fut = self.index.get(&req.name).map(|i| {
                        trace!(
                            "invoking a tool ({id}) with args: {:?}",
                            req.arguments
                        );
                        self.tools[*i].invoke(req.arguments.clone())
                    });
                    async move {
                        let result = match fut {
                            Some(fut) => fut.await,
                            None => {
                                warn!("tool not found: {name}");
                                Err(Error::not_found().with_reason(format!(
                                    "unknown tool `{name}`"
                                )))
                            }
                        };
                        (id, name, result)
                    }
                })
                .collect()
        });

        let mut results = Vec::with_capacity(futures.len());
        for (id, name, result) in join_all(futures).await {
            let content = match result {
                Ok(content) => content,
                Err(err) if err.is_fatal() => {
                    error!("tool `{name}` ({id}) failed: {err}");
                    return Err(err);
                }
                Err(err) => {
                    warn!("tool `{name}` ({id}) returned an error: {err}");
                    format!("Error: {}", err.reason())
                }
            };
            results.push(ToolCallResult { id, content });
        }
        Ok(results)
    }
}
