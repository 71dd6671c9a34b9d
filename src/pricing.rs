//! # Pricing Module
//!
//! Static per-model pricing and the cost calculation built on top of it.
//!
//! ## Pricing Structure
//!
//! Each model has two prices, both in USD per million tokens:
//! - Input (prompt) tokens
//! - Output (completion) tokens
//!
//! Amounts are `rust_decimal::Decimal`. `tokens * price / 1_000_000` always
//! terminates in base ten, so per-call costs are exact and never rounded
//! before they are stored. Rounding only happens when a value is displayed.
//!
//! The table is configuration data compiled into the binary; extend it by
//! adding a row to [`PRICING`].

use once_cell::sync::Lazy;
use rust_decimal::Decimal;

use crate::error::{Result, SpendError};

const ONE_MILLION: Decimal = Decimal::from_parts(1_000_000, 0, 0, false, 0);

/// Build a USD amount from its digits and decimal scale (`usd(250, 2)` is 2.50).
const fn usd(digits: u32, scale: u32) -> Decimal {
    Decimal::from_parts(digits, 0, 0, false, scale)
}

/// One row of the pricing table.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PriceEntry {
    pub model: &'static str,
    /// USD per million input tokens
    pub input_per_million: Decimal,
    /// USD per million output tokens
    pub output_per_million: Decimal,
}

impl PriceEntry {
    const fn new(
        model: &'static str,
        input_per_million: Decimal,
        output_per_million: Decimal,
    ) -> Self {
        Self {
            model,
            input_per_million,
            output_per_million,
        }
    }

    /// Cost of a call priced with this entry.
    pub fn cost(&self, input_tokens: u64, output_tokens: u64) -> Decimal {
        let input = Decimal::from(input_tokens) * self.input_per_million / ONE_MILLION;
        let output = Decimal::from(output_tokens) * self.output_per_million / ONE_MILLION;
        (input + output).normalize()
    }

    pub fn provider(&self) -> Provider {
        detect_provider(self.model)
    }
}

pub static PRICING: &[PriceEntry] = &[
    // Anthropic
    PriceEntry::new("claude-3-5-sonnet-20241022", usd(300, 2), usd(1500, 2)),
    PriceEntry::new("claude-3-5-haiku-20241022", usd(80, 2), usd(400, 2)),
    PriceEntry::new("claude-opus-4", usd(1500, 2), usd(7500, 2)),
    PriceEntry::new("claude-sonnet-4", usd(300, 2), usd(1500, 2)),
    // OpenAI
    PriceEntry::new("gpt-4o", usd(250, 2), usd(1000, 2)),
    PriceEntry::new("gpt-4o-mini", usd(15, 2), usd(60, 2)),
    PriceEntry::new("gpt-4-turbo", usd(1000, 2), usd(3000, 2)),
    PriceEntry::new("o1", usd(1500, 2), usd(6000, 2)),
    PriceEntry::new("o1-mini", usd(300, 2), usd(1200, 2)),
    // Google
    PriceEntry::new("gemini-1.5-pro", usd(125, 2), usd(500, 2)),
    PriceEntry::new("gemini-1.5-flash", usd(75, 3), usd(30, 2)),
    PriceEntry::new("gemini-2.0-flash", usd(10, 2), usd(40, 2)),
];

// Longest names first so that "gpt-4o-mini" wins over "gpt-4o".
static BY_LENGTH: Lazy<Vec<&'static PriceEntry>> = Lazy::new(|| {
    let mut entries: Vec<&'static PriceEntry> = PRICING.iter().collect();
    entries.sort_by(|a, b| b.model.len().cmp(&a.model.len()).then(a.model.cmp(b.model)));
    entries
});

/// Resolve a model identifier to its pricing row.
///
/// Most specific match wins:
/// 1. exact name
/// 2. longest known name contained in `model_id` (dated or suffixed ids)
/// 3. longest known name that contains `model_id`
pub fn pricing_for_model(model_id: &str) -> Option<&'static PriceEntry> {
    let m = model_id.trim().to_lowercase();
    if m.is_empty() {
        return None;
    }
    if let Some(p) = PRICING.iter().find(|p| p.model == m) {
        return Some(p);
    }
    if let Some(p) = BY_LENGTH.iter().find(|p| m.contains(p.model)) {
        return Some(*p);
    }
    BY_LENGTH.iter().find(|p| p.model.contains(m.as_str())).copied()
}

/// Price a call. Fails with [`SpendError::UnknownModel`] when the model does not resolve.
pub fn calculate_cost(model_id: &str, input_tokens: u64, output_tokens: u64) -> Result<Decimal> {
    pricing_for_model(model_id)
        .map(|p| p.cost(input_tokens, output_tokens))
        .ok_or_else(|| SpendError::UnknownModel(model_id.to_string()))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    Anthropic,
    OpenAi,
    Google,
    Unknown,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Anthropic => "anthropic",
            Provider::OpenAi => "openai",
            Provider::Google => "google",
            Provider::Unknown => "unknown",
        }
    }
}

pub fn detect_provider(model_id: &str) -> Provider {
    let m = model_id.to_lowercase();
    if m.starts_with("claude") {
        Provider::Anthropic
    } else if m.starts_with("gpt-") || m.starts_with("o1") || m.starts_with("o3") {
        Provider::OpenAi
    } else if m.starts_with("gemini") {
        Provider::Google
    } else {
        Provider::Unknown
    }
}
