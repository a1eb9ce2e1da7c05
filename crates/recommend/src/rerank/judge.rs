//! LLM-backed qualitative judge
//!
//! Sends the query, an intent summary and the pre-filtered pool in one
//! chat completion and parses one `(id, score, reason)` per project.
//! Replies may wrap the JSON in a fenced block or follow a `<thinking>`
//! section; both forms are accepted before strict validation.

use super::{Judgement, ScoreRequest, Scorer};
use async_trait::async_trait;
use recforge_common::errors::{AppError, Result};
use recforge_common::llm::ChatMessage;
use recforge_common::ChatCompletion;
use regex_lite::Regex;
use serde::Serialize;
use serde_json::Value;
use std::sync::{Arc, OnceLock};
use tracing::{debug, instrument};

const SYSTEM_PROMPT: &str = "\
You are a project-matching judge. A user described what they want to work on; \
you receive their request, a summary of their intent and a list of candidate \
projects with a preliminary final_score (0-100) computed from retrieval signals.

Score every candidate from 0 to 100 for how well it fits the user, and give a \
one-sentence reason. Prefer projects whose status is in_progress over otherwise \
equal active ones. Use final_score as a hint, not as the answer.

Score each candidate exactly once, using its id, and add no other ids. \
You may think inside <thinking></thinking> first. Then reply with JSON only, \
in this shape:
{\"recommendations\": [{\"id\": 1, \"score\": 87, \"reason\": \"...\"}]}";

#[derive(Serialize)]
struct PromptCandidate<'a> {
    id: i64,
    title: &'a str,
    description: &'a str,
    tags: &'a [String],
    status: &'a str,
    final_score: f32,
}

#[derive(Serialize)]
struct PromptIntent<'a> {
    tag_ids: Vec<i64>,
    keywords: &'a [String],
}

/// Qualitative scorer over a chat-completion backend
pub struct LlmJudge {
    client: Arc<dyn ChatCompletion>,
}

impl LlmJudge {
    pub fn new(client: Arc<dyn ChatCompletion>) -> Self {
        Self { client }
    }

    fn build_messages(&self, request: &ScoreRequest) -> Result<Vec<ChatMessage>> {
        let intent = PromptIntent {
            tag_ids: request.tag_ids.iter().copied().collect(),
            keywords: &request.keywords,
        };

        let candidates: Vec<PromptCandidate> = request
            .candidates
            .iter()
            .map(|c| PromptCandidate {
                id: c.project.id,
                title: &c.project.title,
                description: &c.project.description,
                tags: &c.project.tags,
                status: &c.project.status,
                final_score: (c.hint * 10.0).round() / 10.0,
            })
            .collect();

        let user = format!(
            "User request:\n{}\n\nIntent:\n{}\n\nCandidates:\n{}",
            request.query,
            serde_json::to_string(&intent)?,
            serde_json::to_string_pretty(&candidates)?,
        );

        Ok(vec![ChatMessage::system(SYSTEM_PROMPT), ChatMessage::user(user)])
    }
}

#[async_trait]
impl Scorer for LlmJudge {
    fn name(&self) -> &str {
        self.client.model_name()
    }

    #[instrument(skip_all, fields(candidates = request.candidates.len(), model = self.client.model_name()))]
    async fn score(&self, request: &ScoreRequest) -> Result<Vec<Judgement>> {
        let messages = self.build_messages(request)?;
        let reply = self.client.complete(&messages).await?;

        debug!(reply_chars = reply.len(), "Judge replied");

        parse_judgements(&reply)
    }
}

fn fenced_json() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?is)```(?:json)?\s*([\{\[].*?[\}\]])\s*```").ok())
        .as_ref()
}

/// Locate the JSON payload inside a judge reply
pub fn extract_json(reply: &str) -> Option<&str> {
    if let Some(captures) = fenced_json().and_then(|re| re.captures(reply)) {
        return captures.get(1).map(|m| m.as_str());
    }

    let rest = match reply.find("</thinking>") {
        Some(idx) => &reply[idx + "</thinking>".len()..],
        None => reply,
    };

    let start = rest.find(['{', '['])?;
    let end = rest.rfind(['}', ']'])?;
    (end > start).then(|| &rest[start..=end])
}

fn invalid(message: impl Into<String>) -> AppError {
    AppError::InvalidJudgeOutput {
        message: message.into(),
    }
}

/// Parse a judge reply into judgements.
///
/// Accepts `{"recommendations": [...]}` or a bare array. Ids must be
/// integers and scores JSON numbers; anything else rejects the reply.
pub fn parse_judgements(reply: &str) -> Result<Vec<Judgement>> {
    let payload = extract_json(reply).ok_or_else(|| invalid("no JSON found in reply"))?;
    let value: Value = serde_json::from_str(payload).map_err(|e| invalid(e.to_string()))?;

    let entries = match &value {
        Value::Array(entries) => entries,
        Value::Object(map) => match map.get("recommendations") {
            Some(Value::Array(entries)) => entries,
            _ => return Err(invalid("missing recommendations array")),
        },
        _ => return Err(invalid("reply is neither an object nor an array")),
    };

    entries
        .iter()
        .map(|entry| {
            let id = entry
                .get("id")
                .and_then(Value::as_i64)
                .ok_or_else(|| invalid("entry without an integer id"))?;

            let score = match entry.get("score") {
                Some(Value::Number(n)) => n.as_f64().ok_or_else(|| invalid("score out of range"))? as f32,
                _ => return Err(invalid(format!("score for {} is not a number", id))),
            };

            let reason = entry
                .get("reason")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();

            Ok(Judgement { id, score, reason })
        })
        .collect()
}
