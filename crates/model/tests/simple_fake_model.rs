use std::collections::VecDeque;
use std::error::Error;
use std::fmt::{self, Display, Formatter};
use std::future::ready;
use std::pin::Pin;
use std::task::{self, Poll, ready};
use std::time::Duration;

use segment_agent_model::{
    ErrorKind, ModelFinishReason, ModelMessage, ModelProvider,
    ModelProviderError, ModelRequest, ModelResponse, ModelResponseEvent,
    ToolCallRequest,
};
use serde_json::json;
use tokio::time::{Sleep, sleep};

#[derive(Debug)]
struct FakeModelProviderError(ErrorKind);

impl Display for FakeModelProviderError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Error for FakeModelProviderError {}

impl ModelProviderError for FakeModelProviderError {
    fn kind(&self) -> ErrorKind {
        self.0
    }
}

/// Echoes the last user message word by word, or requests the `echo` tool
/// when the message starts with `call:`.
#[derive(Debug)]
struct FakeModelResponse {
    pending: VecDeque<ModelResponseEvent>,
    sleep: Option<Pin<Box<Sleep>>>,
}

impl FakeModelResponse {
    fn new(input: &str) -> Self {
        let mut pending = VecDeque::new();
        if let Some(text) = input.strip_prefix("call:") {
            pending.push_back(ModelResponseEvent::ToolCall(ToolCallRequest {
                id: "call_0".to_owned(),
                name: "echo".to_owned(),
                arguments: json!({ "text": text.trim() }),
            }));
            pending.push_back(ModelResponseEvent::Completed(
                ModelFinishReason::ToolCalls,
            ));
        } else {
            let words: Vec<_> = format!("You said {input}")
                .split(' ')
                .map(ToString::to_string)
                .collect();
            let last = words.len().saturating_sub(1);
            for (idx, mut word) in words.into_iter().enumerate() {
                if idx != last {
                    word.push(' ');
                }
                pending.push_back(ModelResponseEvent::MessageDelta(word));
            }
            pending
                .push_back(ModelResponseEvent::Completed(ModelFinishReason::Stop));
        }
        Self {
            pending,
            sleep: None,
        }
    }
}

impl ModelResponse for FakeModelResponse {
    type Error = FakeModelProviderError;

    fn poll_next_event(
        self: Pin<&mut Self>,
        cx: &mut task::Context<'_>,
    ) -> Poll<Result<Option<ModelResponseEvent>, Self::Error>> {
        let this = self.get_mut();
        let sleep = this
            .sleep
            .get_or_insert_with(|| Box::pin(sleep(Duration::from_millis(1))));
        ready!(sleep.as_mut().poll(cx));
        this.sleep = None;
        Poll::Ready(Ok(this.pending.pop_front()))
    }
}

struct FakeModelProvider;

impl ModelProvider for FakeModelProvider {
    type Error = FakeModelProviderError;
    type Response = FakeModelResponse;

    fn send_request(
        &self,
        req: &ModelRequest,
    ) -> impl Future<Output = Result<Self::Response, Self::Error>> + Send + 'static
    {
        let last_user = req.messages.iter().rev().find_map(|msg| match msg {
            ModelMessage::User(text) => Some(text.as_str()),
            _ => None,
        });
        let result = match last_user {
            Some(text) => Ok(FakeModelResponse::new(text)),
            None => Err(FakeModelProviderError(ErrorKind::Other)),
        };
        ready(result)
    }
}

mod tests {
    use std::future::poll_fn;

    use super::*;

    async fn collect(
        mut resp: FakeModelResponse,
    ) -> (String, Vec<ToolCallRequest>, Option<ModelFinishReason>) {
        let mut text = String::new();
        let mut tool_calls = vec![];
        let mut finish_reason = None;
        loop {
            let event = poll_fn(|cx| Pin::new(&mut resp).poll_next_event(cx))
                .await
                .unwrap();
            match event {
                Some(ModelResponseEvent::MessageDelta(delta)) => {
                    text.push_str(&delta)
                }
                Some(ModelResponseEvent::ToolCall(req)) => tool_calls.push(req),
                Some(ModelResponseEvent::Completed(reason)) => {
                    finish_reason = Some(reason)
                }
                None => break,
            }
        }
        (text, tool_calls, finish_reason)
    }

    #[tokio::test]
    async fn test_completion() {
        let provider = FakeModelProvider;
        let req = ModelRequest {
            messages: vec![
                ModelMessage::System("Be brief.".to_owned()),
                ModelMessage::User("Good morning".to_owned()),
            ],
            tools: vec![],
        };
        assert_eq!(req.system_prompt(), Some("Be brief."));

        let resp = provider.send_request(&req).await.unwrap();
        let (text, tool_calls, reason) = collect(resp).await;
        assert_eq!(text, "You said Good morning");
        assert!(tool_calls.is_empty());
        assert_eq!(reason, Some(ModelFinishReason::Stop));
    }

    #[tokio::test]
    async fn test_tool_call() {
        let provider = FakeModelProvider;
        let req = ModelRequest {
            messages: vec![ModelMessage::User("call: ping".to_owned())],
            tools: vec![],
        };
        let resp = provider.send_request(&req).await.unwrap();
        let (text, tool_calls, reason) = collect(resp).await;
        assert!(text.is_empty());
        assert_eq!(tool_calls.len(), 1);
        assert_eq!(tool_calls[0].arguments, json!({ "text": "ping" }));
        assert_eq!(reason, Some(ModelFinishReason::ToolCalls));
    }

    #[tokio::test]
    async fn test_error() {
        let provider = FakeModelProvider;
        let req = ModelRequest {
            messages: vec![],
            tools: vec![],
        };
        let result = provider.send_request(&req).await;
        let err = result.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Other);
    }

    #[test]
    fn test_message_serialization() {
        let msg = ModelMessage::Assistant {
            content: String::new(),
            tool_calls: vec![ToolCallRequest {
                id: "call_0".to_owned(),
                name: "execute_query".to_owned(),
                arguments: json!({ "query": "SELECT 1" }),
            }],
        };
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["role"], "assistant");
        assert_eq!(value["content"]["tool_calls"][0]["name"], "execute_query");

        let user = serde_json::to_value(ModelMessage::User("hi".to_owned()))
            .unwrap();
        assert_eq!(user, json!({ "role": "user", "content": "hi" }));

        let back: ModelMessage = serde_json::from_value(value).unwrap();
        assert_eq!(back, msg);
    }
}
