//! Content generation service seam.
//!
//! Pipeline stages talk to a [`ContentGenerator`]; the HTTP backends in
//! [`http`] implement it for hosted models, and tests substitute fakes.

mod http;
mod structured;

pub use http::{AnthropicClient, LlmChoice, OpenAiClient, build_generator};
pub use structured::{StructuredError, extract_json, generate_structured, validate_against};

use crate::error::LlmError;
use async_trait::async_trait;
use std::fmt;
use std::future::Future;
use std::time::Duration;

/// Speaker of a prompt message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

impl ChatRole {
    pub fn as_str(self) -> &'static str {
        match self {
            ChatRole::System => "system",
            ChatRole::User => "user",
            ChatRole::Assistant => "assistant",
        }
    }
}

/// One prompt message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub role: ChatRole,
    pub content: String,
}

/// Which pipeline step a request belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Purpose {
    Skeleton,
    ConversationSummary,
    ExecutiveSummary,
    Section { heading: String },
    Dedup { heading: String },
}

impl fmt::Display for Purpose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Purpose::Skeleton => write!(f, "skeleton"),
            Purpose::ConversationSummary => write!(f, "conversation summary"),
            Purpose::ExecutiveSummary => write!(f, "executive summary"),
            Purpose::Section { heading } => write!(f, "section '{}'", heading),
            Purpose::Dedup { heading } => write!(f, "dedup '{}'", heading),
        }
    }
}

/// A prompt context sent to the generation service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRequest {
    pub purpose: Purpose,
    pub messages: Vec<Message>,
}

impl GenerationRequest {
    pub fn new(purpose: Purpose) -> Self {
        Self {
            purpose,
            messages: Vec::new(),
        }
    }

    pub fn system(self, content: impl Into<String>) -> Self {
        self.push(ChatRole::System, content)
    }

    pub fn user(self, content: impl Into<String>) -> Self {
        self.push(ChatRole::User, content)
    }

    pub fn assistant(self, content: impl Into<String>) -> Self {
        self.push(ChatRole::Assistant, content)
    }

    fn push(mut self, role: ChatRole, content: impl Into<String>) -> Self {
        self.messages.push(Message {
            role,
            content: content.into(),
        });
        self
    }

    /// Concatenated system messages, if any.
    pub fn system_prompt(&self) -> Option<String> {
        let parts: Vec<&str> = self
            .messages
            .iter()
            .filter(|m| m.role == ChatRole::System)
            .map(|m| m.content.as_str())
            .collect();
        if parts.is_empty() {
            None
        } else {
            Some(parts.join("\n\n"))
        }
    }

    /// Content of the most recent user message.
    pub fn last_user(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == ChatRole::User)
            .map(|m| m.content.as_str())
    }
}

/// The external content generation service.
#[async_trait]
pub trait ContentGenerator: Send + Sync {
    /// Generate text for the given prompt context.
    async fn generate(&self, request: &GenerationRequest) -> Result<String, LlmError>;
}

/// Bounded attempts with a fixed delay between them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: usize,
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: usize, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
        }
    }

    /// Retry without waiting between attempts.
    pub fn immediate(max_attempts: usize) -> Self {
        Self::new(max_attempts, Duration::ZERO)
    }
}

/// The last error once a retry budget is spent.
#[derive(Debug, Clone, PartialEq)]
pub struct Exhausted<E> {
    pub attempts: usize,
    pub error: E,
}

/// Run `op` until it succeeds or the policy's attempt budget is spent.
///
/// `op` receives the 1-based attempt number. `on_failure` sees every failed
/// attempt, including the last one.
pub async fn retry<T, E, F, Fut, H>(
    policy: RetryPolicy,
    mut op: F,
    mut on_failure: H,
) -> Result<T, Exhausted<E>>
where
    F: FnMut(usize) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    H: FnMut(usize, &E),
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(error) => {
                on_failure(attempt, &error);
                if attempt >= max_attempts {
                    return Err(Exhausted {
                        attempts: attempt,
                        error,
                    });
                }
            }
        }
        if !policy.delay.is_zero() {
            tokio::time::sleep(policy.delay).await;
        }
        attempt += 1;
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use std::sync::Mutex;

    type Responder = Box<dyn Fn(&GenerationRequest) -> Result<String, LlmError> + Send + Sync>;

    /// Answers requests with a closure and records every request it saw.
    pub struct FnGenerator {
        responder: Responder,
        pub requests: Mutex<Vec<GenerationRequest>>,
    }

    impl FnGenerator {
        pub fn new<F>(f: F) -> Self
        where
            F: Fn(&GenerationRequest) -> Result<String, LlmError> + Send + Sync + 'static,
        {
            Self {
                responder: Box::new(f),
                requests: Mutex::new(Vec::new()),
            }
        }

        pub fn calls(&self) -> usize {
            self.requests.lock().unwrap().len()
        }

        pub fn purposes(&self) -> Vec<Purpose> {
            self.requests
                .lock()
                .unwrap()
                .iter()
                .map(|r| r.purpose.clone())
                .collect()
        }
    }

    #[async_trait]
    impl ContentGenerator for FnGenerator {
        async fn generate(&self, request: &GenerationRequest) -> Result<String, LlmError> {
            self.requests.lock().unwrap().push(request.clone());
            (self.responder)(request)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn test_request_builder() {
        let request = GenerationRequest::new(Purpose::Skeleton)
            .system("be brief")
            .user("first")
            .assistant("reply")
            .user("second");

        assert_eq!(request.messages.len(), 4);
        assert_eq!(request.system_prompt().as_deref(), Some("be brief"));
        assert_eq!(request.last_user(), Some("second"));
    }

    #[test]
    fn test_purpose_display() {
        let purpose = Purpose::Section {
            heading: "Findings".to_string(),
        };
        assert_eq!(purpose.to_string(), "section 'Findings'");
    }

    #[tokio::test]
    async fn test_retry_succeeds_after_failures() {
        let failures = Cell::new(0);
        let result: Result<&str, Exhausted<&str>> = retry(
            RetryPolicy::immediate(3),
            |attempt| async move { if attempt < 3 { Err("boom") } else { Ok("done") } },
            |_, _| failures.set(failures.get() + 1),
        )
        .await;

        assert_eq!(result, Ok("done"));
        assert_eq!(failures.get(), 2);
    }

    #[tokio::test]
    async fn test_retry_exhausts_budget() {
        let mut seen = Vec::new();
        let result: Result<(), Exhausted<String>> = retry(
            RetryPolicy::immediate(3),
            |attempt| async move { Err(format!("fail {}", attempt)) },
            |attempt, _| seen.push(attempt),
        )
        .await;

        assert_eq!(
            result,
            Err(Exhausted {
                attempts: 3,
                error: "fail 3".to_string()
            })
        );
        assert_eq!(seen, vec![1, 2, 3]);
    }

    #[test]
    fn test_zero_attempts_means_one() {
        assert_eq!(RetryPolicy::immediate(0).max_attempts, 1);
    }
}
