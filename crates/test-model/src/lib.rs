//! A local fake model for testing purpose.

mod preset;

use std::collections::HashMap;
use std::error::Error as StdError;
use std::fmt::{self, Debug, Display, Formatter};
use std::future::ready;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll, ready};
use std::time::Duration;

use segment_agent_model::{
    ErrorKind, ModelFinishReason, ModelMessage, ModelProvider,
    ModelProviderError, ModelRequest, ModelResponse, ModelResponseEvent,
};
use tokio::time::{Sleep, sleep};

pub use preset::*;

#[derive(Debug)]
pub struct Error {
    message: &'static str,
    kind: ErrorKind,
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.message, self.kind)
    }
}

impl StdError for Error {}

impl ModelProviderError for Error {
    #[inline]
    fn kind(&self) -> ErrorKind {
        self.kind
    }
}

pub struct TestModelResponse {
    preset: PresetResponse,
    event_idx: usize,
    delay: Duration,
    sleep: Option<Pin<Box<Sleep>>>,
}

impl ModelResponse for TestModelResponse {
    type Error = crate::Error;

    fn poll_next_event(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Result<Option<ModelResponseEvent>, Self::Error>> {
        let this = self.get_mut();
        let delay = this.delay;
        let sleep = this.sleep.get_or_insert_with(|| Box::pin(sleep(delay)));
        ready!(sleep.as_mut().poll(cx));
        this.sleep = None;

        let preset_events = &this.preset.events;
        let event = if this.event_idx < preset_events.len() {
            Some(match &preset_events[this.event_idx] {
                PresetEvent::MessageDelta(msg) => {
                    ModelResponseEvent::MessageDelta(msg.clone())
                }
                PresetEvent::ToolCall(req) => {
                    ModelResponseEvent::ToolCall(req.clone())
                }
            })
        } else if this.event_idx == preset_events.len() {
            Some(ModelResponseEvent::Completed(
                if this.preset.has_tool_call() {
                    ModelFinishReason::ToolCalls
                } else {
                    ModelFinishReason::Stop
                },
            ))
        } else {
            // In case this method is called after completion.
            None
        };
        this.event_idx += 1;
        Poll::Ready(Ok(event))
    }
}

#[derive(Clone)]
enum ConversationStep {
    Input,
    AssistantResponse(PresetResponse),
}

type Responder = Arc<dyn Fn(&ModelRequest) -> PresetResponse + Send + Sync>;

/// A local fake model for testing purpose.
///
/// There are two ways to drive the model:
///
/// - A conversation script. Steps are selected by the number of
///   non-system messages in the request, so every user input and tool
///   result in the history must have a matching input step, and every
///   assistant reply must have a response step. If there are no enough
///   steps in the script, an error will be returned.
/// - A responder function, which computes the response from the whole
///   request. This is useful for models that should react to the
///   content of the conversation rather than its length.
///
/// Every request is recorded and can be inspected with
/// [`TestModelProvider::requests`]. Clones share the record.
///
/// # Note
///
/// This type is not optimized for production use, there are heavy memory
/// copies involved. You should only use it for testing.
#[derive(Clone, Default)]
pub struct TestModelProvider {
    conversation_script: Vec<ConversationStep>,
    responder: Option<Responder>,
    delay: Option<Duration>,
    attempts: Arc<Mutex<HashMap<usize, u64>>>,
    requests: Arc<Mutex<Vec<ModelRequest>>>,
}

impl TestModelProvider {
    /// Creates a provider that answers every request with `responder`.
    pub fn with_responder<F>(responder: F) -> Self
    where
        F: Fn(&ModelRequest) -> PresetResponse + Send + Sync + 'static,
    {
        Self {
            responder: Some(Arc::new(responder)),
            ..Default::default()
        }
    }

    #[inline]
    pub fn add_assistant_response_step(&mut self, preset: PresetResponse) {
        self.conversation_script
            .push(ConversationStep::AssistantResponse(preset));
    }

    #[inline]
    pub fn add_user_input_step(&mut self) {
        self.conversation_script.push(ConversationStep::Input);
    }

    /// Adds a step for one tool result message. Add one step per tool
    /// call requested by the previous response.
    #[inline]
    pub fn add_tool_result_step(&mut self) {
        self.conversation_script.push(ConversationStep::Input);
    }

    #[inline]
    pub fn set_delay(&mut self, duration: Duration) {
        self.delay = Some(duration);
    }

    /// Returns all requests received so far.
    pub fn requests(&self) -> Vec<ModelRequest> {
        self.requests
            .lock()
            .map(|requests| requests.clone())
            .unwrap_or_default()
    }

    fn resolve_preset(
        &self,
        req: &ModelRequest,
    ) -> Result<(usize, PresetResponse), Error> {
        let step_idx = req
            .messages
            .iter()
            .filter(|msg| !matches!(msg, ModelMessage::System(_)))
            .count();
        if let Some(responder) = &self.responder {
            return Ok((step_idx, responder(req)));
        }

        match self.conversation_script.get(step_idx) {
            Some(ConversationStep::AssistantResponse(preset)) => {
                Ok((step_idx, preset.clone()))
            }
            Some(ConversationStep::Input) => Err(Error {
                message: "not an assistant response step",
                kind: ErrorKind::Other,
            }),
            None => Err(Error {
                message: "no enough steps",
                kind: ErrorKind::Other,
            }),
        }
    }

    fn check_failures(
        &self,
        step_idx: usize,
        preset: &PresetResponse,
    ) -> Result<(), Error> {
        let Some(failures) = preset.failures else {
            return Ok(());
        };
        let Ok(mut attempts) = self.attempts.lock() else {
            return Ok(());
        };
        let attempt = attempts.entry(step_idx).or_default();
        *attempt += 1;
        if failures == 0 || *attempt <= failures {
            return Err(Error {
                message: "preset failure",
                kind: ErrorKind::Other,
            });
        }
        Ok(())
    }
}

impl ModelProvider for TestModelProvider {
    type Error = crate::Error;
    type Response = TestModelResponse;

    fn send_request(
        &self,
        req: &ModelRequest,
    ) -> impl Future<Output = Result<Self::Response, Self::Error>> + Send + 'static
    {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(req.clone());
        }

        let result = self.resolve_preset(req).and_then(|(step_idx, preset)| {
            self.check_failures(step_idx, &preset)?;
            Ok(TestModelResponse {
                preset,
                event_idx: 0,
                delay: self.delay.unwrap_or(Duration::from_millis(1)),
                sleep: None,
            })
        });
        ready(result)
    }
}

impl Debug for TestModelProvider {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestModelProvider")
            .field("steps", &self.conversation_script.len())
            .field("has_responder", &self.responder.is_some())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::future::poll_fn;
    use std::pin::pin;

    use segment_agent_model::{
        ModelMessage, ModelRequest, ModelTool, ToolCallRequest, ToolCallResult,
    };
    use serde_json::json;

    use super::*;

    async fn collect_response(
        resp: TestModelResponse,
    ) -> (String, Option<ToolCallRequest>) {
        let mut resp = pin!(resp);
        let mut msg = String::new();
        let mut tool_call = None;
        loop {
            let event = poll_fn(|cx| resp.as_mut().poll_next_event(cx))
                .await
                .unwrap()
                .unwrap();
            match event {
                ModelResponseEvent::Completed(_) => break,
                ModelResponseEvent::MessageDelta(delta) => {
                    msg.push_str(&delta);
                }
                ModelResponseEvent::ToolCall(req) => tool_call = Some(req),
            }
        }
        (msg, tool_call)
    }

    fn query_tool() -> ModelTool {
        ModelTool {
            name: "execute_query".to_owned(),
            description: "Runs a Trino SQL query".to_owned(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "query": { "type": "string" }
                }
            }),
        }
    }

    #[tokio::test]
    async fn test_send_request() {
        let mut provider = TestModelProvider::default();
        provider.add_user_input_step();
        provider.add_assistant_response_step(PresetResponse::with_events([
            PresetEvent::MessageDelta("Let me ".to_owned()),
            PresetEvent::MessageDelta("check.".to_owned()),
            PresetEvent::ToolCall(ToolCallRequest {
                id: "call_1".to_owned(),
                name: "execute_query".to_owned(),
                arguments: json!({ "query": "SELECT 1" }),
            }),
        ]));
        provider.add_tool_result_step();
        provider.add_assistant_response_step(PresetResponse::text("Done."));

        let mut req = ModelRequest {
            messages: vec![
                ModelMessage::System("rules".to_owned()),
                ModelMessage::User("Hi".to_owned()),
            ],
            tools: vec![query_tool()],
        };
        let resp = provider.send_request(&req).await.unwrap();
        let (msg, tool_call) = collect_response(resp).await;
        assert_eq!(msg, "Let me check.");
        let tool_call = tool_call.unwrap();
        assert_eq!(tool_call.name, "execute_query");

        req.messages.push(ModelMessage::Assistant {
            content: msg,
            tool_calls: vec![tool_call],
        });
        req.messages.push(ModelMessage::Tool(ToolCallResult {
            id: "call_1".to_owned(),
            content: "1".to_owned(),
        }));
        let resp = provider.send_request(&req).await.unwrap();
        let (msg, tool_call) = collect_response(resp).await;
        assert_eq!(msg, "Done.");
        assert!(tool_call.is_none());

        assert_eq!(provider.requests().len(), 2);
    }

    #[tokio::test]
    async fn test_script_exhausted() {
        let mut provider = TestModelProvider::default();
        provider.add_user_input_step();
        let req = ModelRequest {
            messages: vec![
                ModelMessage::User("Hi".to_owned()),
                ModelMessage::assistant_text("Hello"),
                ModelMessage::User("Again".to_owned()),
            ],
            tools: vec![],
        };
        let err = provider.send_request(&req).await.err().unwrap();
        assert_eq!(err.kind(), ErrorKind::Other);
    }

    #[tokio::test]
    async fn test_failures() {
        let mut provider = TestModelProvider::default();
        provider.add_user_input_step();
        provider.add_assistant_response_step(
            PresetResponse::text("Finally").with_failures(2),
        );
        let req = ModelRequest {
            messages: vec![ModelMessage::User("Hi".to_owned())],
            tools: vec![],
        };
        assert!(provider.send_request(&req).await.is_err());
        assert!(provider.clone().send_request(&req).await.is_err());
        let resp = provider.send_request(&req).await.unwrap();
        let (msg, _) = collect_response(resp).await;
        assert_eq!(msg, "Finally");
    }

    #[tokio::test]
    async fn test_responder() {
        let provider = TestModelProvider::with_responder(|req| {
            let tools = req.tools.len();
            PresetResponse::text(format!("{tools} tools"))
        });
        let req = ModelRequest {
            messages: vec![ModelMessage::User("Hi".to_owned())],
            tools: vec![query_tool()],
        };
        let resp = provider.send_request(&req).await.unwrap();
        let (msg, _) = collect_response(resp).await;
        assert_eq!(msg, "1 tools");
    }
}
