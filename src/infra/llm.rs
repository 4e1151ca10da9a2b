use std::time::Duration;

use async_trait::async_trait;
use reqwest::{
    Client,
    header::{AUTHORIZATION, CONTENT_TYPE},
};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::domain::change::ChangeSet;
use crate::domain::message::{ChangeType, CommitMessage};
use crate::error::{AppError, AppResult};
use crate::services::LanguageModelService;

pub const SYSTEM_PROMPT: &str =
    "You are an assistant that writes high-quality Git commit messages.";

const CONNECTION_SYSTEM_PROMPT: &str = "You are a test assistant.";
const CONNECTION_USER_PROMPT: &str = "Testing. Just say `Hi` and nothing else.";

/// Per-file cap on diff text embedded in the prompt, in characters.
pub const DEFAULT_MAX_DIFF_CHARS: usize = 4000;

const TRUNCATION_MARKER: &str = "[diff truncated]";
const ERROR_BODY_PREVIEW: usize = 200;

/// Commit message generator speaking the OpenAI-compatible chat-completion
/// protocol.
pub struct ChatCompletionClient {
    http: Client,
    api_key: Option<String>,
    endpoint: String,
    model: String,
    temperature: Option<f32>,
    max_tokens: Option<u32>,
    max_diff_chars: usize,
}

impl ChatCompletionClient {
    pub fn new(api_key: Option<String>, endpoint: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            api_key,
            endpoint: endpoint.into(),
            model: model.into(),
            temperature: None,
            max_tokens: None,
            max_diff_chars: DEFAULT_MAX_DIFF_CHARS,
        }
    }

    /// Bounds every request; without it the transport defaults apply.
    pub fn with_timeout(mut self, timeout: Duration) -> AppResult<Self> {
        self.http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| AppError::Configuration(format!("failed to build HTTP client: {err}")))?;
        Ok(self)
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_max_diff_chars(mut self, max_diff_chars: usize) -> Self {
        self.max_diff_chars = max_diff_chars;
        self
    }

    fn api_key(&self) -> AppResult<&str> {
        self.api_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty())
            .ok_or(AppError::MissingCredential)
    }

    fn request(&self, system: &str, user: String) -> ChatCompletionRequest {
        ChatCompletionRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: system.to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: user,
                },
            ],
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        }
    }

    async fn complete(&self, api_key: &str, request: &ChatCompletionRequest) -> AppResult<String> {
        debug!(endpoint = %self.endpoint, model = %self.model, "sending chat completion request");

        let response = self
            .http
            .post(&self.endpoint)
            .header(AUTHORIZATION, format!("Bearer {api_key}"))
            .header(CONTENT_TYPE, "application/json")
            .json(request)
            .send()
            .await
            .map_err(|err| AppError::Transport(format!("failed to call {}: {err}", self.endpoint)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unable to read response>".to_string());
            return Err(AppError::Transport(format!(
                "endpoint responded with {status}: {}",
                preview(&body)
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|err| AppError::Transport(format!("failed to read response body: {err}")))?;
        let payload: ChatCompletionResponse = serde_json::from_str(&body).map_err(|err| {
            AppError::MalformedResponse(format!("invalid completion JSON: {err}: {}", preview(&body)))
        })?;

        let content = payload
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .unwrap_or_default();
        if content.trim().is_empty() {
            return Err(AppError::MalformedResponse(
                "completion contained no message content".to_string(),
            ));
        }
        Ok(content)
    }
}

#[async_trait]
impl LanguageModelService for ChatCompletionClient {
    async fn draft_commit_message(&self, changes: &ChangeSet) -> AppResult<CommitMessage> {
        let api_key = self.api_key()?;

        let prompt = build_prompt(changes, self.max_diff_chars);
        debug!(
            files = changes.len(),
            prompt_chars = prompt.len(),
            "built commit message prompt"
        );

        let request = self.request(SYSTEM_PROMPT, prompt);
        let content = self.complete(api_key, &request).await?;
        parse_commit_message(&content)
    }

    async fn check_connection(&self) -> AppResult<String> {
        let api_key = self.api_key()?;
        let request = self.request(CONNECTION_SYSTEM_PROMPT, CONNECTION_USER_PROMPT.to_string());
        let content = self.complete(api_key, &request).await?;
        Ok(content.trim().to_string())
    }
}

#[derive(Debug, Serialize)]
pub struct ChatCompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct DraftPayload {
    summary: Option<String>,
    description: Option<String>,
    #[serde(rename = "type")]
    change_type: Option<String>,
    scope: Option<String>,
}

/// Builds the user prompt: the file list, then one fenced diff per file.
pub fn build_prompt(changes: &ChangeSet, max_diff_chars: usize) -> String {
    let mut prompt = String::from(
        "Write a commit message for the following changes.\n\n\
         Respond with ONLY a JSON object (no markdown, no explanation):\n\
         {\"type\": \"Added|Changed|Deprecated|Removed|Fixed|Security\", \
         \"scope\": \"optional scope\", \
         \"summary\": \"imperative title, at most 72 characters\", \
         \"description\": \"what changed and why; may be empty\"}\n\n\
         - Treat `# @Status:` comments in the diff as the author's stated intent.\n\
         - Pick the type that best matches the nature of the change; omit scope if none applies.\n\
         - The summary is a single line and must not repeat the type or scope \
         (\"Support dark mode\", not \"Added: Support dark mode\").\n\n",
    );

    prompt.push_str(&format!("## Changed files ({})\n", changes.len()));
    for path in changes.files() {
        prompt.push_str(&format!("- {path}\n"));
    }

    prompt.push_str("\n## Diffs\n");
    for (path, diff) in changes.diffs() {
        prompt.push_str(&format!("\n### {path}\n"));
        if diff.trim().is_empty() {
            prompt.push_str("(no textual diff)\n");
            continue;
        }

        let (text, truncated) = truncate_chars(diff, max_diff_chars);
        if truncated {
            warn!(path = %path, limit = max_diff_chars, "diff truncated in prompt");
        }
        prompt.push_str("```diff\n");
        prompt.push_str(text);
        if !text.ends_with('\n') {
            prompt.push('\n');
        }
        if truncated {
            prompt.push_str(TRUNCATION_MARKER);
            prompt.push('\n');
        }
        prompt.push_str("```\n");
    }

    prompt
}

/// Turns model output into a commit message.
///
/// A JSON object with a `summary` wins; otherwise the first non-empty line is
/// the summary and the rest is the description. Either way a leading
/// `Type [scope]:` on the summary is lifted into the message category.
pub fn parse_commit_message(content: &str) -> AppResult<CommitMessage> {
    match find_draft_payload(content) {
        Some(payload) => message_from_payload(payload),
        None => parse_plain_text(content),
    }
}

fn message_from_payload(payload: DraftPayload) -> AppResult<CommitMessage> {
    let summary = payload.summary.unwrap_or_default();
    let mut lines = summary.lines().skip_while(|line| line.trim().is_empty());
    let title = lines.next().unwrap_or_default().trim();
    if title.is_empty() {
        return Err(AppError::MalformedResponse(
            "response JSON has an empty summary".to_string(),
        ));
    }

    // Anything past the first line of the summary belongs to the body.
    let overflow = lines.collect::<Vec<_>>().join("\n");
    let description = payload.description.unwrap_or_default();
    let description = match (overflow.trim().is_empty(), description.trim().is_empty()) {
        (true, _) => description,
        (false, true) => overflow,
        (false, false) => format!("{}\n\n{}", overflow.trim(), description.trim()),
    };

    let change_type = payload.change_type.as_deref().and_then(|value| {
        value
            .parse::<ChangeType>()
            .map_err(|err| debug!("ignoring {err}"))
            .ok()
    });
    Ok(categorize(title, description, change_type, payload.scope))
}

fn parse_plain_text(content: &str) -> AppResult<CommitMessage> {
    let text = strip_code_fence(content);
    let mut lines = text.lines().skip_while(|line| line.trim().is_empty());

    let summary = lines.next().map(clean_summary_line).unwrap_or_default();
    if summary.is_empty() {
        return Err(AppError::MalformedResponse(
            "response did not contain a summary line".to_string(),
        ));
    }

    let rest: Vec<&str> = lines.collect();
    Ok(categorize(&summary, rest.join("\n"), None, None))
}

/// Builds the message, preferring explicit category fields over a prefix
/// found on the summary. The prefix is removed either way.
fn categorize(
    summary: &str,
    description: String,
    change_type: Option<ChangeType>,
    scope: Option<String>,
) -> CommitMessage {
    let (prefix_type, prefix_scope, summary) = split_type_prefix(summary);
    let scope = scope
        .filter(|scope| !scope.trim().is_empty())
        .or(prefix_scope.map(str::to_string));
    CommitMessage::new(summary, description).with_category(change_type.or(prefix_type), scope)
}

/// Splits `Fixed: x`, `Fixed [parser]: x` or `Fixed(parser): x` into its
/// parts. Summaries without a known type prefix come back unchanged.
fn split_type_prefix(summary: &str) -> (Option<ChangeType>, Option<&str>, &str) {
    let unchanged = (None, None, summary);
    let Some((head, rest)) = summary.split_once(':') else {
        return unchanged;
    };
    let rest = rest.trim();
    if rest.is_empty() {
        return unchanged;
    }

    let head = head.trim();
    let (name, scope) = match head.find(['[', '(']) {
        Some(open) => {
            let inner = head[open + 1..].strip_suffix([']', ')']);
            match inner {
                Some(inner) => (&head[..open], Some(inner.trim())),
                None => return unchanged,
            }
        }
        None => (head, None),
    };

    match name.parse::<ChangeType>() {
        Ok(change_type) => (
            Some(change_type),
            scope.filter(|scope| !scope.is_empty()),
            rest,
        ),
        Err(_) => unchanged,
    }
}

fn clean_summary_line(line: &str) -> String {
    // Bullets and headings only ever lead; a trailing hyphen is content.
    let leading = |c: char| matches!(c, '#' | '*' | '`' | '"' | '-') || c.is_whitespace();
    let trailing = |c: char| matches!(c, '*' | '`' | '"') || c.is_whitespace();
    let clean = |text: &str| {
        text.trim_start_matches(leading)
            .trim_end_matches(trailing)
            .to_string()
    };

    let line = clean(line);
    let without_label = line.strip_prefix("Summary:").map(clean);
    without_label.unwrap_or(line)
}

fn strip_code_fence(content: &str) -> &str {
    let trimmed = content.trim();
    let Some(inner) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let inner = inner.split_once('\n').map(|(_, body)| body).unwrap_or("");
    inner.trim_end().strip_suffix("```").unwrap_or(inner).trim()
}

/// Finds the first JSON object carrying a string `summary`: fenced, bare, or
/// embedded in prose. Unrelated objects are skipped.
fn find_draft_payload(content: &str) -> Option<DraftPayload> {
    let trimmed = content.trim();

    if let Some(start) = trimmed.find("```json")
        && let Some(end) = trimmed[start + 7..].find("```")
        && let Some(payload) = draft_payload(trimmed[start + 7..start + 7 + end].trim())
    {
        return Some(payload);
    }

    trimmed
        .match_indices('{')
        .find_map(|(start, _)| draft_payload(&trimmed[start..]))
}

fn draft_payload(text: &str) -> Option<DraftPayload> {
    let mut stream = serde_json::Deserializer::from_str(text).into_iter::<DraftPayload>();
    match stream.next() {
        Some(Ok(payload)) if payload.summary.is_some() => Some(payload),
        _ => None,
    }
}

fn truncate_chars(text: &str, max_chars: usize) -> (&str, bool) {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => (&text[..idx], true),
        None => (text, false),
    }
}

fn preview(body: &str) -> &str {
    truncate_chars(body.trim(), ERROR_BODY_PREVIEW).0
}
