use std::pin::Pin;
use std::sync::{Arc, Mutex};

use axum::Json;
use axum::Router;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use segment_agent::core::{
    AgentBuilder, ConversationState, InvocationConfig, tool::ToolCache,
};
use segment_agent::feedback::{
    Feedback, FeedbackConfig, FeedbackError, FeedbackSink, LangSmithFeedback,
};
use segment_agent::workflow::FEEDBACK_PROMPT;
use segment_agent::{ResumeToken, RunOutcome, Workflow, WorkflowError};
use segment_agent_test_model::{PresetResponse, TestModelProvider};
use serde_json::{Value, json};
use tokio::net::TcpListener;

#[derive(Clone, Default)]
struct RecordingSink {
    records: Arc<Mutex<Vec<Feedback>>>,
    fail: bool,
}

impl FeedbackSink for RecordingSink {
    fn submit(
        &self,
        feedback: Feedback,
    ) -> Pin<Box<dyn Future<Output = Result<(), FeedbackError>> + Send + '_>>
    {
        self.records.lock().unwrap().push(feedback);
        let result = if self.fail {
            Err(FeedbackError::Status {
                status: 500,
                body: "unavailable".to_owned(),
            })
        } else {
            Ok(())
        };
        Box::pin(async move { result })
    }
}

fn workflow() -> Workflow {
    let model =
        TestModelProvider::with_responder(|_| PresetResponse::text("Florida leads."));
    let agent = AgentBuilder::with_model_provider(model)
        .with_tool_cache(ToolCache::from_tools(vec![]))
        .build();
    Workflow::new(agent)
}

fn state() -> ConversationState {
    ConversationState::from_user_input("Which state has the most profiles?")
}

#[tokio::test]
async fn test_run_without_feedback() {
    let outcome = workflow()
        .run(&state(), &InvocationConfig::default().with_run_id("run-1"))
        .await
        .unwrap();
    let RunOutcome::Completed(outcome) = outcome else {
        panic!("expected a completed run");
    };
    assert_eq!(outcome.run_id.as_str(), "run-1");
    assert_eq!(outcome.answer(), Some("Florida leads."));
}

#[tokio::test]
async fn test_feedback_is_attached_to_the_run() {
    let sink = RecordingSink::default();
    let workflow = workflow().with_feedback(sink.clone());

    let outcome = workflow
        .run(&state(), &InvocationConfig::default().with_run_id("run-1"))
        .await
        .unwrap();
    let RunOutcome::AwaitingFeedback {
        token,
        prompt,
        outcome,
    } = outcome
    else {
        panic!("expected a suspended run");
    };
    assert_eq!(prompt, FEEDBACK_PROMPT);
    assert_eq!(outcome.answer(), Some("Florida leads."));
    assert_eq!(workflow.suspended_runs().await, 1);

    let resumed = workflow
        .resume(&token, "score=5, comment=great, thanks")
        .await
        .unwrap();
    assert_eq!(resumed.run_id.as_str(), "run-1");
    assert_eq!(resumed.state, outcome.state);
    assert_eq!(workflow.suspended_runs().await, 0);

    let records = sink.records.lock().unwrap().clone();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].run_id.as_str(), "run-1");
    assert_eq!(records[0].key, "user_feedback");
    assert_eq!(records[0].score, 5);
    assert_eq!(records[0].comment, "great, thanks");

    let err = workflow.resume(&token, "score=1").await.unwrap_err();
    assert!(matches!(err, WorkflowError::UnknownToken(_)));
}

#[tokio::test]
async fn test_feedback_failures_do_not_fail_the_run() {
    let sink = RecordingSink {
        fail: true,
        ..Default::default()
    };
    let workflow = workflow().with_feedback(sink.clone());

    let token = |outcome: RunOutcome| match outcome {
        RunOutcome::AwaitingFeedback { token, .. } => token,
        RunOutcome::Completed(_) => panic!("expected a suspended run"),
    };

    let first = workflow
        .run(&state(), &InvocationConfig::default())
        .await
        .unwrap();
    let run_id = first.turn().run_id.clone();
    let resumed = workflow
        .resume(&token(first), "score=4, comment=ok")
        .await
        .unwrap();
    assert_eq!(resumed.run_id, run_id);
    assert_eq!(sink.records.lock().unwrap().len(), 1);

    let second = workflow
        .run(&state(), &InvocationConfig::default())
        .await
        .unwrap();
    workflow
        .resume(&token(second), "five stars")
        .await
        .unwrap();
    assert_eq!(sink.records.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_discard_and_unknown_token() {
    let sink = RecordingSink::default();
    let workflow = workflow().with_feedback(sink.clone());

    let outcome = workflow
        .run(&state(), &InvocationConfig::default())
        .await
        .unwrap();
    let RunOutcome::AwaitingFeedback { token, .. } = outcome else {
        panic!("expected a suspended run");
    };
    workflow.discard(&token).await.unwrap();
    assert!(sink.records.lock().unwrap().is_empty());

    let err = workflow
        .resume(&ResumeToken::new("missing"), "score=1, comment=x")
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "no suspended run for token missing");
}

#[tokio::test]
async fn test_oldest_suspended_run_is_dropped() {
    let workflow = workflow()
        .with_feedback(RecordingSink::default())
        .with_max_suspended_runs(2);

    let mut tokens = vec![];
    for i in 0..3 {
        let outcome = workflow
            .run(
                &state(),
                &InvocationConfig::default().with_run_id(format!("run-{i}")),
            )
            .await
            .unwrap();
        let RunOutcome::AwaitingFeedback { token, .. } = outcome else {
            panic!("expected a suspended run");
        };
        tokens.push(token);
    }
    assert_eq!(workflow.suspended_runs().await, 2);

    let err = workflow.discard(&tokens[0]).await.unwrap_err();
    assert!(matches!(err, WorkflowError::UnknownToken(_)));
    let outcome = workflow.discard(&tokens[1]).await.unwrap();
    assert_eq!(outcome.run_id.as_str(), "run-1");
    let outcome = workflow.discard(&tokens[2]).await.unwrap();
    assert_eq!(outcome.run_id.as_str(), "run-2");
    assert_eq!(workflow.suspended_runs().await, 0);
}

#[derive(Clone, Default)]
struct Received(Arc<Mutex<Vec<(Option<String>, Value)>>>);

async fn feedback_handler(
    State(received): State<Received>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> StatusCode {
    let api_key = headers
        .get("x-api-key")
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);
    let authorized = api_key.as_deref() == Some("ls-secret");
    received.0.lock().unwrap().push((api_key, body));
    if authorized {
        StatusCode::OK
    } else {
        StatusCode::UNAUTHORIZED
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_langsmith_feedback() {
    let received = Received::default();
    let app = Router::new()
        .route("/feedback", post(feedback_handler))
        .with_state(received.clone());
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    let endpoint = format!("http://{addr}/");

    let feedback = Feedback {
        run_id: segment_agent::core::RunId::new("run-7"),
        key: "user_feedback".to_owned(),
        score: 1,
        comment: "Great answer!".to_owned(),
    };

    let sink = LangSmithFeedback::new(
        FeedbackConfig::with_api_key("ls-secret").with_endpoint(&endpoint),
    );
    sink.submit(feedback.clone()).await.unwrap();

    let sink = LangSmithFeedback::new(
        FeedbackConfig::with_api_key("wrong").with_endpoint(&endpoint),
    );
    let err = sink.submit(feedback).await.unwrap_err();
    assert!(matches!(err, FeedbackError::Status { status: 401, .. }));

    let received = received.0.lock().unwrap().clone();
    assert_eq!(received.len(), 2);
    assert_eq!(received[0].0.as_deref(), Some("ls-secret"));
    assert_eq!(
        received[0].1,
        json!({
            "run_id": "run-7",
            "key": "user_feedback",
            "score": 1,
            "comment": "Great answer!"
        })
    );
}
