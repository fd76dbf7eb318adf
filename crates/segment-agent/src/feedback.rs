//! User feedback on agent answers.

use std::fmt::{self, Debug, Formatter};
use std::pin::Pin;
use std::str::FromStr;

use reqwest::{Client, header};
use segment_agent_core::RunId;
use serde::Serialize;

/// The feedback endpoint used when none is configured.
pub const DEFAULT_FEEDBACK_ENDPOINT: &str = "https://api.smith.langchain.com";

/// The key that user ratings are recorded under.
pub const USER_FEEDBACK_KEY: &str = "user_feedback";

/// A rating typed by the user, in the form `score=<int>, comment=<text>`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FeedbackRating {
    /// The score.
    pub score: i64,
    /// The free-form comment, possibly empty.
    pub comment: String,
}

/// The error returned when a rating cannot be parsed.
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum ParseRatingError {
    /// The `score=` part is missing.
    #[error("expected `score=<int>`")]
    MissingScore,
    /// The score is not an integer.
    #[error("invalid score: {0:?}")]
    InvalidScore(String),
    /// The part after the first comma is not `comment=<text>`.
    #[error("expected `comment=<text>` after the score")]
    MissingComment,
}

impl FromStr for FeedbackRating {
    type Err = ParseRatingError;

    /// Parses `score=<int>, comment=<text>`.
    ///
    /// Only the first comma separates the fields, so the comment may
    /// contain commas. The comment part may be omitted.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (score_part, comment_part) = match s.split_once(',') {
            Some((score, comment)) => (score, Some(comment)),
            None => (s, None),
        };

        let score = field(score_part, "score")
            .ok_or(ParseRatingError::MissingScore)?;
        let score = score
            .parse()
            .map_err(|_| ParseRatingError::InvalidScore(score.to_owned()))?;

        let comment = match comment_part {
            Some(part) => field(part, "comment")
                .ok_or(ParseRatingError::MissingComment)?
                .to_owned(),
            None => String::new(),
        };
        Ok(Self { score, comment })
    }
}

fn field<'a>(part: &'a str, key: &str) -> Option<&'a str> {
    let (name, value) = part.split_once('=')?;
    (name.trim() == key).then(|| value.trim())
}

/// A feedback record attached to one run.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Feedback {
    /// The run the feedback is about.
    pub run_id: RunId,
    /// The feedback key.
    pub key: String,
    /// The score.
    pub score: i64,
    /// The comment.
    pub comment: String,
}

impl Feedback {
    /// Creates a user feedback record from a rating.
    pub fn user_rating(run_id: RunId, rating: FeedbackRating) -> Self {
        Self {
            run_id,
            key: USER_FEEDBACK_KEY.to_owned(),
            score: rating.score,
            comment: rating.comment,
        }
    }
}

/// The error returned by a [`FeedbackSink`].
#[derive(Debug, thiserror::Error)]
pub enum FeedbackError {
    /// The request could not be sent.
    #[error("feedback transport error: {0}")]
    Transport(#[from] reqwest::Error),
    /// The endpoint rejected the feedback.
    #[error("feedback endpoint responded with {status}: {body}")]
    Status {
        /// The HTTP status code.
        status: u16,
        /// The response body.
        body: String,
    },
}

/// A destination for feedback records.
///
/// The trait is object safe so that the workflow can hold any sink.
pub trait FeedbackSink: Send + Sync {
    /// Submits one feedback record.
    fn submit(
        &self,
        feedback: Feedback,
    ) -> Pin<Box<dyn Future<Output = Result<(), FeedbackError>> + Send + '_>>;
}

/// Settings of [`LangSmithFeedback`].
#[derive(Clone, PartialEq, Eq)]
pub struct FeedbackConfig {
    api_key: String,
    endpoint: String,
}

impl FeedbackConfig {
    /// Creates settings with the given API key and the default endpoint.
    #[inline]
    pub fn with_api_key<S: Into<String>>(api_key: S) -> Self {
        Self {
            api_key: api_key.into(),
            endpoint: DEFAULT_FEEDBACK_ENDPOINT.to_owned(),
        }
    }

    /// Sets a custom endpoint.
    #[inline]
    pub fn with_endpoint<S: Into<String>>(mut self, endpoint: S) -> Self {
        self.endpoint = endpoint.into().trim_end_matches('/').to_owned();
        self
    }

    /// Returns the endpoint.
    #[inline]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl Debug for FeedbackConfig {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("FeedbackConfig")
            .field("api_key", &"<redacted>")
            .field("endpoint", &self.endpoint)
            .finish()
    }
}

/// Submits feedback to a LangSmith-compatible `/feedback` endpoint.
#[derive(Clone, Debug)]
pub struct LangSmithFeedback {
    client: Client,
    config: FeedbackConfig,
}

impl LangSmithFeedback {
    /// Creates a sink with the given settings.
    #[inline]
    pub fn new(config: FeedbackConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    async fn post(&self, feedback: Feedback) -> Result<(), FeedbackError> {
        let resp = self
            .client
            .post(format!("{}/feedback", self.config.endpoint))
            .header("x-api-key", &self.config.api_key)
            .header(header::ACCEPT, "application/json")
            .json(&feedback)
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(FeedbackError::Status {
                status: status.as_u16(),
                body,
            });
        }
        debug!(run_id = %feedback.run_id, "feedback submitted");
        Ok(())
    }
}

impl FeedbackSink for LangSmithFeedback {
    fn submit(
        &self,
        feedback: Feedback,
    ) -> Pin<Box<dyn Future<Output = Result<(), FeedbackError>> + Send + '_>>
    {
        Box::pin(self.post(feedback))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_parse_rating() {
        assert_eq!(
            "score=5, comment=great".parse(),
            Ok(FeedbackRating {
                score: 5,
                comment: "great".to_owned()
            })
        );
        assert_eq!(
            " score = -1 ,comment= wrong state, try FL ".parse(),
            Ok(FeedbackRating {
                score: -1,
                comment: "wrong state, try FL".to_owned()
            })
        );
        assert_eq!(
            "score=3".parse(),
            Ok(FeedbackRating {
                score: 3,
                comment: String::new()
            })
        );
    }

    #[test]
    fn test_parse_rating_errors() {
        assert_eq!(
            "great answer".parse::<FeedbackRating>(),
            Err(ParseRatingError::MissingScore)
        );
        assert_eq!(
            "score=five, comment=ok".parse::<FeedbackRating>(),
            Err(ParseRatingError::InvalidScore("five".to_owned()))
        );
        assert_eq!(
            "score=5, great".parse::<FeedbackRating>(),
            Err(ParseRatingError::MissingComment)
        );
    }

    #[test]
    fn test_feedback_body() {
        let feedback = Feedback::user_rating(
            RunId::new("019abc7b-ae04-7264-a923-f61395de8d81"),
            FeedbackRating {
                score: 1,
                comment: "Great answer!".to_owned(),
            },
        );
        assert_eq!(
            serde_json::to_value(&feedback).unwrap(),
            json!({
                "run_id": "019abc7b-ae04-7264-a923-f61395de8d81",
                "key": "user_feedback",
                "score": 1,
                "comment": "Great answer!"
            })
        );
    }
}
