//! Grounded summarization of ranked citations, with deterministic fallbacks.

use std::fmt::Write as _;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::entity::Entity;
use crate::sources::Citation;

/// Citations shown to the model.
const MAX_PROMPT_CITATIONS: usize = 5;
const MAX_FACTS: usize = 2;
const MAX_SUMMARY_LINES: usize = 2;

const SYSTEM_PROMPT: &str = "You write short notes for travellers. \
Use ONLY information stated in the numbered sources you are given; \
never add facts from elsewhere. \
If the sources say little, say little. \
Reply with strict JSON and nothing else, exactly: \
{\"summary\": \"<at most two lines>\", \
\"facts\": [\"<short did-you-know>\", \"<short did-you-know>\"]}. \
\"facts\" may hold zero, one or two entries.";

#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("GEMINI_API_KEY not set. Get one at https://aistudio.google.com/apikey")]
    ApiKeyNotSet,

    #[error("API rate limit exceeded. Please retry later.")]
    RateLimited,

    #[error("API quota exhausted: {0}")]
    QuotaExhausted(String),

    #[error("API error ({code}): {message}")]
    Api { code: u16, message: String },

    #[error("model returned no text")]
    EmptyResponse,

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    System,
    User,
}

#[derive(Debug, Clone)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// Chat-completion language model that replies with a single JSON document.
#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, LlmError>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct Summary {
    pub summary: String,
    pub facts: Vec<String>,
}

impl Summary {
    /// Used when there is nothing to summarize or no model configured.
    pub fn key_info(entity: &Entity) -> Self {
        Self {
            summary: format!("Key info about {}.", entity.name),
            facts: Vec::new(),
        }
    }

    /// Used when the model call or its output is unusable.
    pub fn highlights(entity: &Entity) -> Self {
        Self {
            summary: format!("Highlights about {}.", entity.name),
            facts: Vec::new(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ModelReply {
    summary: String,
    facts: Vec<String>,
}

#[derive(Debug, thiserror::Error)]
enum ReplyError {
    #[error("invalid JSON reply: {0}")]
    Json(#[from] serde_json::Error),

    #[error("blank summary")]
    BlankSummary,
}

#[derive(Clone, Default)]
pub struct Summarizer {
    model: Option<Arc<dyn ChatModel>>,
}

impl Summarizer {
    pub fn new(model: Option<Arc<dyn ChatModel>>) -> Self {
        Self { model }
    }

    /// Never fails: every error path ends in a templated summary.
    pub async fn summarize(&self, citations: &[Citation], entity: &Entity) -> Summary {
        let Some(model) = self.model.as_ref().filter(|_| !citations.is_empty()) else {
            return Summary::key_info(entity);
        };

        let messages = [
            ChatMessage::system(SYSTEM_PROMPT),
            ChatMessage::user(build_prompt(citations, entity)),
        ];
        let reply = match model.complete(&messages).await {
            Ok(reply) => reply,
            Err(e) => {
                warn!(entity = %entity.name, error = %e, "summary generation failed");
                return Summary::highlights(entity);
            }
        };

        match parse_reply(&reply) {
            Ok(summary) => {
                debug!(entity = %entity.name, facts = summary.facts.len(), "summary generated");
                summary
            }
            Err(e) => {
                warn!(entity = %entity.name, error = %e, "unusable summary reply");
                Summary::highlights(entity)
            }
        }
    }
}

fn build_prompt(citations: &[Citation], entity: &Entity) -> String {
    let mut prompt = format!("Place: {}\n\nSources:\n", entity.name);
    for (i, c) in citations.iter().take(MAX_PROMPT_CITATIONS).enumerate() {
        let _ = writeln!(prompt, "[{}] {}", i + 1, c.title);
        if let Some(snippet) = c.snippet.as_deref().filter(|s| !s.trim().is_empty()) {
            let _ = writeln!(prompt, "{}", snippet.trim());
        }
        let _ = writeln!(prompt, "{}\n", c.url);
    }
    prompt
}

/// Models sometimes wrap JSON in a Markdown code fence.
fn strip_code_fence(reply: &str) -> &str {
    let trimmed = reply.trim();
    let Some(inner) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let inner = inner.strip_prefix("json").unwrap_or(inner);
    inner.strip_suffix("```").unwrap_or(inner).trim()
}

fn parse_reply(reply: &str) -> Result<Summary, ReplyError> {
    let parsed: ModelReply = serde_json::from_str(strip_code_fence(reply))?;

    let summary = parsed
        .summary
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .take(MAX_SUMMARY_LINES)
        .collect::<Vec<_>>()
        .join("\n");
    if summary.is_empty() {
        return Err(ReplyError::BlankSummary);
    }

    let facts = parsed
        .facts
        .into_iter()
        .map(|f| f.trim().to_string())
        .filter(|f| !f.is_empty())
        .take(MAX_FACTS)
        .collect();

    Ok(Summary { summary, facts })
}
