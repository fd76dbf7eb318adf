use std::collections::VecDeque;
use std::pin::Pin;
use std::task::{Context, Poll, ready};

use pin_project_lite::pin_project;
use segment_agent_model::{
    ErrorKind, ModelFinishReason, ModelResponse, ModelResponseEvent,
    ToolCallRequest,
};
use serde_json::{Map, Value};

use crate::Error;
use crate::io::Sse;
use crate::proto::{ChatCompletionChunk, ToolCall};

struct PartialState {
    sse: Sse,
    id: Option<String>,
    // Tool calls are streamed as fragments keyed by `index`, they are only
    // complete after the finish reason arrives.
    tool_calls: Vec<ToolCall>,
    pending_tool_calls: VecDeque<ToolCallRequest>,
    // This field will be cleared after the response returns the complete event.
    pending_finish_reason: Option<ModelFinishReason>,
    finished: bool,
}

impl PartialState {
    fn finish(&mut self, finish_reason: Option<&str>) {
        if self.finished {
            return;
        }
        self.finished = true;

        let mut tool_calls = std::mem::take(&mut self.tool_calls);
        tool_calls.sort_by_key(|t| t.index);
        let has_tool_calls = !tool_calls.is_empty();
        self.pending_tool_calls
            .extend(tool_calls.into_iter().map(into_request));

        self.pending_finish_reason = Some(match finish_reason {
            Some("tool_calls") => ModelFinishReason::ToolCalls,
            Some(_) => ModelFinishReason::Stop,
            None if has_tool_calls => ModelFinishReason::ToolCalls,
            None => ModelFinishReason::Stop,
        });
    }

    fn merge_tool_call(&mut self, tool_call: ToolCall) {
        let existing = match (tool_call.index, &tool_call.id) {
            (Some(index), _) => {
                self.tool_calls.iter_mut().find(|t| t.index == Some(index))
            }
            (None, Some(id)) => self
                .tool_calls
                .iter_mut()
                .find(|t| t.id.as_deref() == Some(id.as_str())),
            (None, None) => self.tool_calls.last_mut(),
        };
        let Some(partial) = existing else {
            self.tool_calls.push(tool_call);
            return;
        };

        // Patch the partial tool call.
        if let Some(id) = tool_call.id {
            if partial.id.as_deref() != Some(id.as_str()) {
                partial.id.get_or_insert_default().push_str(&id);
            }
        }
        if let Some(ty) = tool_call.r#type {
            partial.r#type.get_or_insert(ty);
        }
        if let Some(function) = tool_call.function {
            match partial.function {
                Some(ref mut partial_func) => {
                    if let Some(name) = function.name {
                        partial_func.name.get_or_insert_default().push_str(&name);
                    }
                    if let Some(arguments) = function.arguments {
                        partial_func
                            .arguments
                            .get_or_insert_default()
                            .push_str(&arguments);
                    }
                }
                None => partial.function = Some(function),
            }
        }
    }
}

fn into_request(tool_call: ToolCall) -> ToolCallRequest {
    let (name, arguments) = match tool_call.function {
        Some(function) => (
            function.name.unwrap_or_default(),
            function.arguments.unwrap_or_default(),
        ),
        None => Default::default(),
    };
    let arguments = if arguments.trim().is_empty() {
        Value::Object(Map::new())
    } else {
        serde_json::from_str(&arguments).unwrap_or_else(|err| {
            warn!("tool call `{name}` has malformed arguments: {err}");
            Value::String(arguments)
        })
    };
    ToolCallRequest {
        id: tool_call.id.unwrap_or_default(),
        name,
        arguments,
    }
}

type PinnedFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;
type NextEvent = Result<(Option<ModelResponseEvent>, PartialState), Error>;

pin_project! {
    pub struct OpenAIResponse {
        next_event_fut: Option<PinnedFuture<NextEvent>>,
    }
}

impl OpenAIResponse {
    #[inline]
    pub fn from_sse(sse: Sse) -> Self {
        let partial_state = PartialState {
            sse,
            id: None,
            tool_calls: Default::default(),
            pending_tool_calls: Default::default(),
            pending_finish_reason: Default::default(),
            finished: false,
        };
        let next_event_fut = async move { next_event(partial_state).await };
        Self {
            next_event_fut: Some(Box::pin(next_event_fut)),
        }
    }
}

impl ModelResponse for OpenAIResponse {
    type Error = crate::Error;

    fn poll_next_event(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Result<Option<ModelResponseEvent>, Self::Error>> {
        let this = self.project();
        let Some(next_event_fut) = this.next_event_fut else {
            return Poll::Ready(Ok(None));
        };
        let (event, partial_state) =
            match ready!(next_event_fut.as_mut().poll(cx)) {
                Ok((Some(event), partial_state)) => (event, partial_state),
                Ok((None, _)) => {
                    *this.next_event_fut = None;
                    return Poll::Ready(Ok(None));
                }
                Err(err) => {
                    *this.next_event_fut = None;
                    return Poll::Ready(Err(err));
                }
            };

        // The stream may still have more data to pull, create a new future for
        // the next event.
        let next_event_fut = async move { next_event(partial_state).await };
        *this.next_event_fut = Some(Box::pin(next_event_fut));

        Poll::Ready(Ok(Some(event)))
    }
}

async fn next_event(
    mut partial_state: PartialState,
) -> Result<(Option<ModelResponseEvent>, PartialState), Error> {
    loop {
        // The order of events is important. Message deltas are returned as
        // soon as they arrive, then complete tool calls in index order, and
        // finally the finish reason.
        if let Some(req) = partial_state.pending_tool_calls.pop_front() {
            return Ok((Some(ModelResponseEvent::ToolCall(req)), partial_state));
        }
        if let Some(reason) = partial_state.pending_finish_reason.take() {
            return Ok((
                Some(ModelResponseEvent::Completed(reason)),
                partial_state,
            ));
        }
        if partial_state.finished {
            return Ok((None, partial_state));
        }

        let sse_event = match partial_state.sse.next_event().await {
            Ok(Some(event)) => event,
            Ok(None) => {
                partial_state.finish(None);
                continue;
            }
            Err(err) => {
                return Err(Error::new(format!("{err:?}"), ErrorKind::Other));
            }
        };
        trace!("got sse event: {sse_event}");
        if sse_event == "[DONE]" {
            partial_state.finish(None);
            continue;
        }

        let mut chunk = serde_json::from_str::<ChatCompletionChunk>(&sse_event)
            .map_err(|err| Error::new(format!("{err}"), ErrorKind::Other))?;
        if partial_state.id.get_or_insert_with(|| chunk.id.clone()) != &chunk.id
        {
            return Err(Error::new("chunk id mismatch", ErrorKind::Other));
        };

        // The usage chunk has no choices.
        let Some(choice) = chunk.choices.pop() else {
            continue;
        };

        for tool_call in choice.delta.tool_calls.into_iter().flatten() {
            partial_state.merge_tool_call(tool_call);
        }
        if let Some(finish_reason) = &choice.finish_reason {
            partial_state.finish(Some(finish_reason));
        }
        match choice.delta.content {
            Some(content) if !content.is_empty() => {
                return Ok((
                    Some(ModelResponseEvent::MessageDelta(content)),
                    partial_state,
                ));
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use std::future::poll_fn;
    use std::pin::pin;

    use bytes::Bytes;
    use serde_json::json;

    use super::*;
    use crate::io::Chunks;

    async fn collect(chunks: Vec<Bytes>) -> Vec<ModelResponseEvent> {
        let sse = Sse::new(Chunks::from_vec_deque(chunks.into()));
        let mut resp = pin!(OpenAIResponse::from_sse(sse));
        let mut events = vec![];
        while let Some(event) = poll_fn(|cx| resp.as_mut().poll_next_event(cx))
            .await
            .unwrap()
        {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn test_streamed_tool_calls() {
        let events = collect(vec![Bytes::from_static(include_bytes!(
            "../fixtures/test_response.txt"
        ))])
        .await;

        let tool_calls: Vec<_> = events
            .iter()
            .filter_map(|event| match event {
                ModelResponseEvent::ToolCall(req) => Some(req),
                _ => None,
            })
            .collect();
        assert_eq!(tool_calls.len(), 2);
        assert_eq!(tool_calls[0].id, "call_a");
        assert_eq!(tool_calls[0].name, "execute_query");
        assert_eq!(
            tool_calls[0].arguments,
            json!({ "query": "SELECT state, COUNT(*) AS cnt FROM t GROUP BY state" })
        );
        assert_eq!(tool_calls[1].name, "using_vector_search");
        assert_eq!(tool_calls[1].arguments, json!({ "query": "veneers", "k": 5 }));

        assert_eq!(
            events.last(),
            Some(&ModelResponseEvent::Completed(ModelFinishReason::ToolCalls))
        );
        assert_eq!(
            events.first(),
            Some(&ModelResponseEvent::MessageDelta("Checking.".to_owned()))
        );
    }

    #[tokio::test]
    async fn test_text_only() {
        let events = collect(vec![
            Bytes::from_static(
                b"data: {\"id\":\"c1\",\"choices\":[{\"delta\":{\"content\":\"Hel\"},\"finish_reason\":null}]}\n\n",
            ),
            Bytes::from_static(
                b"data: {\"id\":\"c1\",\"choices\":[{\"delta\":{\"content\":\"lo\"},\"finish_reason\":\"stop\"}]}\n\n",
            ),
            Bytes::from_static(b"data: [DONE]\n\n"),
        ])
        .await;
        assert_eq!(
            events,
            vec![
                ModelResponseEvent::MessageDelta("Hel".to_owned()),
                ModelResponseEvent::MessageDelta("lo".to_owned()),
                ModelResponseEvent::Completed(ModelFinishReason::Stop),
            ]
        );
    }

    #[tokio::test]
    async fn test_chunk_id_mismatch() {
        let sse = Sse::new(Chunks::from_vec_deque(
            vec![
                Bytes::from_static(
                    b"data: {\"id\":\"a\",\"choices\":[{\"delta\":{\"content\":\"x\"},\"finish_reason\":null}]}\n\n",
                ),
                Bytes::from_static(
                    b"data: {\"id\":\"b\",\"choices\":[{\"delta\":{\"content\":\"y\"},\"finish_reason\":null}]}\n\n",
                ),
            ]
            .into(),
        ));
        let mut resp = pin!(OpenAIResponse::from_sse(sse));
        let first = poll_fn(|cx| resp.as_mut().poll_next_event(cx)).await;
        assert!(matches!(first, Ok(Some(ModelResponseEvent::MessageDelta(_)))));
        let second = poll_fn(|cx| resp.as_mut().poll_next_event(cx)).await;
        assert!(second.is_err());
        let third = poll_fn(|cx| resp.as_mut().poll_next_event(cx)).await;
        assert!(matches!(third, Ok(None)));
    }
}
