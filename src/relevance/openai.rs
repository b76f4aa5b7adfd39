//! Chat-completions backed [`RelevanceJudge`].

use std::fmt;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};
use url::Url;

use crate::http::{HttpTimeouts, build_http_client};
use crate::user_agent::default_api_user_agent;

use super::{RelevanceError, RelevanceJudge};

/// Default API base URL.
pub const DEFAULT_LLM_BASE_URL: &str = "https://api.openai.com/v1";

/// Default chat model.
pub const DEFAULT_LLM_MODEL: &str = "gpt-4o-mini";

const SYSTEM_PROMPT: &str = "You are a helpful assistant that checks whether a book listing \
matches the book a reader is searching for. Reply with only 'yes' or 'no'. If the listing is \
a summary, a condensed or abridged edition, a study guide, or anything other than the full \
original book, reply 'no'. If the book is not in English, reply 'no'.";

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    #[serde(default)]
    content: Option<String>,
}

/// Builds the question put to the model.
#[must_use]
pub fn user_prompt(requested: &str, candidate_title: &str) -> String {
    format!(
        "I am searching for the book '{requested}'. Is '{candidate_title}' the book I am \
         looking for and is it in English?"
    )
}

/// True when any word of the reply is "yes".
#[must_use]
pub fn is_affirmative(reply: &str) -> bool {
    reply
        .split(|c: char| !c.is_alphanumeric())
        .any(|word| word.eq_ignore_ascii_case("yes"))
}

/// Asks an OpenAI-compatible chat-completions endpoint.
#[derive(Clone)]
pub struct OpenAiJudge {
    client: Client,
    endpoint: Url,
    model: String,
    api_key: Option<String>,
}

impl fmt::Debug for OpenAiJudge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenAiJudge")
            .field("endpoint", &self.endpoint.as_str())
            .field("model", &self.model)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .finish_non_exhaustive()
    }
}

impl OpenAiJudge {
    /// Creates a judge. A missing key is reported on first use.
    ///
    /// # Errors
    ///
    /// Returns [`RelevanceError`] if the base URL is invalid or the HTTP
    /// client cannot be built.
    pub fn new(
        base_url: &str,
        model: impl Into<String>,
        api_key: Option<String>,
        timeouts: HttpTimeouts,
    ) -> Result<Self, RelevanceError> {
        let invalid = || RelevanceError::InvalidUrl {
            url: base_url.to_string(),
        };
        let mut base = Url::parse(base_url).map_err(|_| invalid())?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let endpoint = base.join("chat/completions").map_err(|_| invalid())?;
        let client = build_http_client("relevance", default_api_user_agent(), timeouts)
            .map_err(RelevanceError::network)?;
        Ok(Self {
            client,
            endpoint,
            model: model.into(),
            api_key: api_key.filter(|key| !key.trim().is_empty()),
        })
    }

    /// The chat-completions URL requests are sent to.
    #[must_use]
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

#[async_trait]
impl RelevanceJudge for OpenAiJudge {
    #[instrument(skip(self), fields(model = %self.model))]
    async fn is_desired_book(
        &self,
        requested: &str,
        candidate_title: &str,
    ) -> Result<bool, RelevanceError> {
        let api_key = self.api_key.as_deref().ok_or(RelevanceError::MissingApiKey)?;
        let prompt = user_prompt(requested, candidate_title);
        let request = ChatRequest {
            model: &self.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                ChatMessage {
                    role: "user",
                    content: &prompt,
                },
            ],
            temperature: 0.0,
        };

        let response = self
            .client
            .post(self.endpoint.clone())
            .bearer_auth(api_key)
            .json(&request)
            .send()
            .await
            .map_err(RelevanceError::network)?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RelevanceError::http_status(status.as_u16(), &body));
        }

        let body: ChatResponse = response
            .json()
            .await
            .map_err(|e| RelevanceError::parse(e.to_string()))?;
        let reply = body
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| RelevanceError::parse("response carried no choices"))?;

        let accepted = is_affirmative(&reply);
        debug!(reply = %reply.trim(), accepted, "Relevance model answered");
        Ok(accepted)
    }
}
