//! Schema-constrained generation with repair prompts.

use super::{ContentGenerator, Exhausted, GenerationRequest, RetryPolicy};
use crate::error::{LlmError, SchemaError};
use regex::Regex;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::LazyLock;

static FENCED_JSON: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"```(?:json|JSON)?\s*\n([\s\S]*?)```").unwrap());

/// Why a structured attempt failed.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StructuredError {
    #[error(transparent)]
    Llm(#[from] LlmError),
    #[error(transparent)]
    Schema(#[from] SchemaError),
}

/// Locate and parse the JSON object in a model response.
///
/// Accepts a bare object, a fenced ```json block, or an object embedded in
/// surrounding prose.
pub fn extract_json(text: &str) -> Result<Value, SchemaError> {
    let candidate = if let Some(cap) = FENCED_JSON.captures(text) {
        cap.get(1).map(|m| m.as_str().trim()).unwrap_or_default()
    } else {
        let trimmed = text.trim();
        match (trimmed.find('{'), trimmed.rfind('}')) {
            (Some(start), Some(end)) if start < end => &trimmed[start..=end],
            _ => return Err(SchemaError::NoJson),
        }
    };

    serde_json::from_str(candidate).map_err(|e| SchemaError::Json(e.to_string()))
}

/// Check a value against a JSON schema, collecting every violation.
pub fn validate_against(schema: &Value, instance: &Value) -> Result<(), SchemaError> {
    let validator = jsonschema::validator_for(schema)
        .map_err(|e| SchemaError::Violations(vec![format!("invalid schema: {}", e)]))?;

    let violations: Vec<String> = validator
        .iter_errors(instance)
        .map(|e| {
            let path = e.instance_path.to_string();
            if path.is_empty() {
                e.to_string()
            } else {
                format!("{} at {}", e, path)
            }
        })
        .collect();

    if violations.is_empty() {
        Ok(())
    } else {
        Err(SchemaError::Violations(violations))
    }
}

fn parse_response<T: DeserializeOwned>(text: &str, schema: &Value) -> Result<T, SchemaError> {
    let value = extract_json(text)?;
    validate_against(schema, &value)?;
    serde_json::from_value(value).map_err(|e| SchemaError::Json(e.to_string()))
}

fn repair_prompt(error: &SchemaError, schema: &Value) -> String {
    let schema_text = serde_json::to_string_pretty(schema).unwrap_or_default();
    format!(
        "Your previous output could not be used:\n\n{}\n\nReturn only a JSON object that matches this schema, with no commentary:\n```json\n{}\n```",
        error, schema_text
    )
}

/// Generate a value of type `T` whose JSON form satisfies `schema`.
///
/// Service failures are retried with the same prompt. Schema failures append
/// the offending output and a repair instruction to the conversation before
/// the next attempt. `on_failure` sees each failed attempt that is followed
/// by another one; the last failure is only returned.
pub async fn generate_structured<T, H>(
    generator: &dyn ContentGenerator,
    request: GenerationRequest,
    schema: &Value,
    policy: RetryPolicy,
    mut on_failure: H,
) -> Result<T, Exhausted<StructuredError>>
where
    T: DeserializeOwned,
    H: FnMut(usize, &StructuredError),
{
    let max_attempts = policy.max_attempts.max(1);
    let mut request = request;
    let mut attempt = 1;

    loop {
        let error = match generator.generate(&request).await {
            Ok(text) => match parse_response::<T>(&text, schema) {
                Ok(value) => return Ok(value),
                Err(schema_error) => {
                    if attempt < max_attempts {
                        let repair = repair_prompt(&schema_error, schema);
                        request = request.assistant(text).user(repair);
                    }
                    StructuredError::Schema(schema_error)
                }
            },
            Err(llm_error) => StructuredError::Llm(llm_error),
        };

        if attempt >= max_attempts {
            return Err(Exhausted {
                attempts: attempt,
                error,
            });
        }
        on_failure(attempt, &error);
        if !policy.delay.is_zero() {
            tokio::time::sleep(policy.delay).await;
        }
        attempt += 1;
    }
}
