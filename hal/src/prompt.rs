//! User confirmation prompts
//!
//! A prompt shows a title and body with an accept and a decline action and
//! resolves to exactly one response. Dismissing it without choosing is
//! reported separately but callers treat it like a decline.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWriteExt, BufReader, Stdin};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptRequest {
    pub title: String,
    pub body: String,
    pub accept_label: String,
    pub decline_label: String,
}

impl PromptRequest {
    pub fn new(title: &str, body: &str) -> Self {
        Self {
            title: title.to_string(),
            body: body.to_string(),
            accept_label: "Yes, start".to_string(),
            decline_label: "No".to_string(),
        }
    }

    pub fn with_labels(mut self, accept: &str, decline: &str) -> Self {
        self.accept_label = accept.to_string();
        self.decline_label = decline.to_string();
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptResponse {
    Accepted,
    Declined,
    /// Closed without choosing an action
    Dismissed,
}

impl PromptResponse {
    pub fn is_accepted(self) -> bool {
        self == PromptResponse::Accepted
    }
}

#[async_trait::async_trait]
pub trait ConfirmationPrompt: Send {
    async fn confirm(&mut self, request: &PromptRequest) -> PromptResponse;
}

/// Prompt on the controlling terminal, answered with y/n on stdin.
///
/// One buffered reader is kept across prompts, so input typed ahead of
/// a prompt is kept for the next one.
pub struct TerminalPrompt<R = BufReader<Stdin>> {
    reader: R,
    timeout: Option<Duration>,
}

impl TerminalPrompt {
    pub fn new() -> Self {
        Self::with_reader(BufReader::new(tokio::io::stdin()))
    }
}

impl Default for TerminalPrompt {
    fn default() -> Self {
        Self::new()
    }
}

impl<R> TerminalPrompt<R> {
    /// Read answers from `reader` instead of stdin
    pub fn with_reader(reader: R) -> Self {
        Self { reader, timeout: None }
    }

    /// Treat the prompt as dismissed if nobody answers in time
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

impl<R: AsyncBufRead + Unpin> TerminalPrompt<R> {
    async fn read_answer(&mut self) -> std::io::Result<Option<String>> {
        let mut line = String::new();
        let n = self.reader.read_line(&mut line).await?;
        Ok((n > 0).then_some(line))
    }
}

/// Map a typed answer onto a response
pub fn parse_answer(answer: &str, request: &PromptRequest) -> PromptResponse {
    let answer = answer.trim().to_lowercase();
    if answer == "y" || answer == "yes" || answer == request.accept_label.to_lowercase() {
        PromptResponse::Accepted
    } else if answer == "n" || answer == "no" || answer == request.decline_label.to_lowercase() {
        PromptResponse::Declined
    } else {
        PromptResponse::Dismissed
    }
}

#[async_trait::async_trait]
impl<R: AsyncBufRead + Unpin + Send> ConfirmationPrompt for TerminalPrompt<R> {
    async fn confirm(&mut self, request: &PromptRequest) -> PromptResponse {
        let question = format!(
            "\n{}\n{}\n[y] {}  [n] {} > ",
            request.title, request.body, request.accept_label, request.decline_label
        );
        let mut stdout = tokio::io::stdout();
        if let Err(e) = stdout.write_all(question.as_bytes()).await {
            tracing::warn!("Cannot show prompt: {}", e);
            return PromptResponse::Dismissed;
        }
        let _ = stdout.flush().await;

        let answer = match self.timeout {
            Some(timeout) => match tokio::time::timeout(timeout, self.read_answer()).await {
                Ok(answer) => answer,
                Err(_) => {
                    tracing::info!("Prompt timed out after {:?}", timeout);
                    return PromptResponse::Dismissed;
                }
            },
            None => self.read_answer().await,
        };

        match answer {
            Ok(Some(line)) => parse_answer(&line, request),
            Ok(None) => PromptResponse::Dismissed,
            Err(e) => {
                tracing::warn!("Cannot read prompt answer: {}", e);
                PromptResponse::Dismissed
            }
        }
    }
}

#[derive(Debug, Default)]
struct ScriptState {
    responses: VecDeque<PromptResponse>,
    fallback: Option<PromptResponse>,
    asked: Vec<PromptRequest>,
}

/// Prompt answered from a queue of canned responses.
///
/// Clones share their queue and history, so a caller can hand one clone to
/// a service and inspect the other afterwards. An empty queue answers with
/// the fallback, or `Dismissed` when none is set.
#[derive(Debug, Clone, Default)]
pub struct ScriptedPrompt {
    state: Arc<Mutex<ScriptState>>,
}

impl ScriptedPrompt {
    pub fn new(responses: impl IntoIterator<Item = PromptResponse>) -> Self {
        let state = ScriptState {
            responses: responses.into_iter().collect(),
            ..Default::default()
        };
        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    /// Answer every prompt the same way
    pub fn always(response: PromptResponse) -> Self {
        let prompt = Self::default();
        prompt.lock().fallback = Some(response);
        prompt
    }

    /// Requests shown so far
    pub fn asked(&self) -> Vec<PromptRequest> {
        self.lock().asked.clone()
    }

    pub fn times_asked(&self) -> usize {
        self.lock().asked.len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ScriptState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait::async_trait]
impl ConfirmationPrompt for ScriptedPrompt {
    async fn confirm(&mut self, request: &PromptRequest) -> PromptResponse {
        let mut state = self.lock();
        state.asked.push(request.clone());
        let fallback = state.fallback.unwrap_or(PromptResponse::Dismissed);
        state.responses.pop_front().unwrap_or(fallback)
    }
}
