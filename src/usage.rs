//! Token usage extraction from provider responses.
//!
//! Responses are inspected through a closed, ordered set of usage layouts
//! ([`UsageShape`]). Supporting a new provider means adding a variant and a
//! probe arm, not walking arbitrary fields.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Result, SpendError};

/// Input/output token counts for one call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl TokenUsage {
    pub fn new(input_tokens: u64, output_tokens: u64) -> Self {
        Self {
            input_tokens,
            output_tokens,
        }
    }
}

/// Known layouts of a response's `usage` object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UsageShape {
    /// `usage.prompt_tokens` / `usage.completion_tokens`
    OpenAi {
        prompt_tokens: u64,
        completion_tokens: u64,
    },
    /// `usage.input_tokens` / `usage.output_tokens`
    Anthropic {
        input_tokens: u64,
        output_tokens: u64,
    },
}

impl UsageShape {
    /// Probe a `usage` object. The OpenAI layout is checked first.
    pub fn probe(usage: &Value) -> Option<Self> {
        let field = |name: &str| usage.get(name).and_then(Value::as_u64);

        if let (Some(prompt_tokens), Some(completion_tokens)) =
            (field("prompt_tokens"), field("completion_tokens"))
        {
            return Some(UsageShape::OpenAi {
                prompt_tokens,
                completion_tokens,
            });
        }
        if let (Some(input_tokens), Some(output_tokens)) =
            (field("input_tokens"), field("output_tokens"))
        {
            return Some(UsageShape::Anthropic {
                input_tokens,
                output_tokens,
            });
        }
        None
    }

    pub fn tokens(&self) -> TokenUsage {
        match *self {
            UsageShape::OpenAi {
                prompt_tokens,
                completion_tokens,
            } => TokenUsage::new(prompt_tokens, completion_tokens),
            UsageShape::Anthropic {
                input_tokens,
                output_tokens,
            } => TokenUsage::new(input_tokens, output_tokens),
        }
    }
}

/// Extract token counts from a response shaped as JSON.
pub fn extract(response: &Value) -> Result<TokenUsage> {
    response
        .get("usage")
        .and_then(UsageShape::probe)
        .map(|shape| shape.tokens())
        .ok_or(SpendError::UnrecognizedUsageShape)
}

/// Model name reported by the response itself, if any.
pub fn extract_model(response: &Value) -> Option<&str> {
    response
        .get("model")
        .and_then(Value::as_str)
        .filter(|m| !m.is_empty())
}

/// A value that can report the token usage of the call that produced it.
///
/// Implemented for `serde_json::Value`; SDK response types implement it by
/// mapping their own usage fields.
pub trait ReportsUsage {
    fn token_usage(&self) -> Result<TokenUsage>;

    /// Model name echoed back by the provider.
    fn reported_model(&self) -> Option<&str> {
        None
    }
}

impl ReportsUsage for Value {
    fn token_usage(&self) -> Result<TokenUsage> {
        extract(self)
    }

    fn reported_model(&self) -> Option<&str> {
        extract_model(self)
    }
}

impl ReportsUsage for TokenUsage {
    fn token_usage(&self) -> Result<TokenUsage> {
        Ok(*self)
    }
}

impl<T: ReportsUsage + ?Sized> ReportsUsage for Box<T> {
    fn token_usage(&self) -> Result<TokenUsage> {
        (**self).token_usage()
    }

    fn reported_model(&self) -> Option<&str> {
        (**self).reported_model()
    }
}
