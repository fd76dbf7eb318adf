//! An interactive terminal client for the sales assistant.

#[macro_use]
extern crate tracing;

use std::io::Write as _;
use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use owo_colors::OwoColorize;
use segment_agent::core::{ConversationState, InvocationConfig, TurnOutcome};
use segment_agent::feedback::LangSmithFeedback;
use segment_agent::{Config, RunOutcome, Workflow};
use tokio::io::{self, AsyncBufRead, AsyncBufReadExt, Lines};

const BAR_CHAR: &str = "▎";

#[derive(Debug, Parser)]
#[command(version, about = "Chat with the sales intelligence assistant")]
struct Args {
    /// Fail a turn that takes longer than this many seconds.
    #[arg(long)]
    turn_timeout: Option<u64>,

    /// Never ask for feedback, even if it is configured.
    #[arg(long)]
    no_feedback: bool,

    /// Skip fetching the tools before the first question.
    #[arg(long)]
    no_warm_up: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("{err}");
            return ExitCode::FAILURE;
        }
    };
    debug!("loaded config: {config:?}");

    let mut agent_builder = config.agent_builder();
    if let Some(secs) = args.turn_timeout {
        agent_builder = agent_builder.with_turn_timeout(Duration::from_secs(secs));
    }
    let mut workflow = Workflow::new(agent_builder.build());
    match config.feedback.clone() {
        Some(feedback) if !args.no_feedback => {
            workflow = workflow.with_feedback(LangSmithFeedback::new(feedback));
        }
        _ => {}
    }

    let progress_style = ProgressStyle::with_template("{spinner} {wide_msg}")
        .map(|style| style.tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏"))
        .unwrap_or_else(|_| ProgressStyle::default_spinner());
    let spinner = |message: &'static str| {
        let progress_bar = ProgressBar::new_spinner();
        progress_bar.set_style(progress_style.clone());
        progress_bar.set_message(message);
        progress_bar.enable_steady_tick(Duration::from_millis(100));
        progress_bar
    };

    if !args.no_warm_up {
        let progress_bar = spinner("🔌 Loading tools...");
        let warm_up = workflow.agent().tool_cache().warm_up().await;
        progress_bar.finish_and_clear();
        match warm_up {
            Ok(count) => println!("{}", format!("Loaded {count} tools").dimmed()),
            Err(err) => {
                // The first turn will try again.
                eprintln!("{}", format!("Could not load tools: {err}").yellow());
            }
        }
    }

    // Shared by every read, a fresh reader would drop buffered lines.
    let mut input = io::BufReader::new(io::stdin()).lines();
    let mut state = ConversationState::new();
    loop {
        prompt("> ");
        let Some(line) = read_line(&mut input).await else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let mut next_state = state.clone();
        next_state.push_user_input(line);

        let progress_bar = spinner("🤔 Thinking...");
        let result = workflow
            .run(&next_state, &InvocationConfig::default())
            .await;
        progress_bar.finish_and_clear();

        let outcome = match result {
            Ok(RunOutcome::Completed(outcome)) => outcome,
            Ok(RunOutcome::AwaitingFeedback {
                token,
                prompt: question,
                outcome,
            }) => {
                print_answer(&outcome);
                println!("{}", question.bright_yellow());
                prompt("Rating (empty to skip): ");
                let reply = read_line(&mut input).await.unwrap_or_default();
                let reply = reply.trim();
                let resumed = if reply.is_empty() {
                    workflow.discard(&token).await
                } else {
                    workflow.resume(&token, reply).await
                };
                match resumed {
                    Ok(outcome) => {
                        state = outcome.state;
                    }
                    Err(err) => error!("failed to resume run: {err}"),
                }
                println!();
                continue;
            }
            Err(err) => {
                eprintln!("{}{}", BAR_CHAR.bright_red(), err.bright_red());
                continue;
            }
        };
        print_answer(&outcome);
        println!();
        state = outcome.state;
    }

    ExitCode::SUCCESS
}

fn print_answer(outcome: &TurnOutcome) {
    let answer = outcome.answer().unwrap_or_default();
    for line in answer.lines() {
        println!("{}{}", BAR_CHAR.bright_cyan(), line.bright_white());
    }
    debug!(run_id = %outcome.run_id, steps = outcome.steps, "answered");
}

fn prompt(text: &str) {
    print!("{text}");
    if let Err(err) = std::io::stdout().flush() {
        warn!("failed to flush stdout: {err}");
    }
}

async fn read_line<R>(input: &mut Lines<R>) -> Option<String>
where
    R: AsyncBufRead + Unpin,
{
    match input.next_line().await {
        Ok(line) => line,
        Err(err) => {
            error!("error reading input: {}", err);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_read_line_keeps_buffered_lines() {
        let piped: &[u8] = b"which state leads?\nscore=5, comment=great\n\nlast";
        let mut input = AsyncBufReadExt::lines(piped);
        assert_eq!(
            read_line(&mut input).await.as_deref(),
            Some("which state leads?")
        );
        assert_eq!(
            read_line(&mut input).await.as_deref(),
            Some("score=5, comment=great")
        );
        assert_eq!(read_line(&mut input).await.as_deref(), Some(""));
        assert_eq!(read_line(&mut input).await.as_deref(), Some("last"));
        assert_eq!(read_line(&mut input).await, None);
    }
}
