//! Attaches one feedback record to a past run.

use std::process::ExitCode;

use clap::Parser;
use owo_colors::OwoColorize;
use segment_agent::core::RunId;
use segment_agent::feedback::{
    DEFAULT_FEEDBACK_ENDPOINT, Feedback, FeedbackConfig, FeedbackSink,
    LangSmithFeedback, USER_FEEDBACK_KEY,
};

#[derive(Parser)]
#[command(version, about = "Submit feedback for an agent run")]
struct Args {
    /// The run to attach the feedback to.
    #[arg(long)]
    run_id: String,

    /// The score.
    #[arg(long, allow_negative_numbers = true)]
    score: i64,

    /// A free-form comment.
    #[arg(long, default_value = "")]
    comment: String,

    /// The feedback key.
    #[arg(long, default_value = USER_FEEDBACK_KEY)]
    key: String,

    /// The API key of the feedback service.
    #[arg(long, env = "LANGSMITH_API_KEY_FEEDBACK", hide_env_values = true)]
    api_key: String,

    /// The feedback service endpoint.
    #[arg(long, env = "LANGSMITH_ENDPOINT", default_value = DEFAULT_FEEDBACK_ENDPOINT)]
    endpoint: String,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let sink = LangSmithFeedback::new(
        FeedbackConfig::with_api_key(args.api_key).with_endpoint(args.endpoint),
    );
    let feedback = Feedback {
        run_id: RunId::new(args.run_id),
        key: args.key,
        score: args.score,
        comment: args.comment,
    };

    match sink.submit(feedback.clone()).await {
        Ok(()) => {
            println!(
                "{} feedback for run {}",
                "Submitted".bright_green(),
                feedback.run_id
            );
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("{} {err}", "Failed:".bright_red());
            ExitCode::FAILURE
        }
    }
}
