use std::env;
use std::path::PathBuf;

use rust_decimal::{Decimal, RoundingStrategy};

use crate::error::{Result, SpendError};

pub const DB_PATH_ENV: &str = "LLM_SPEND_DB_PATH";
pub const DB_DIR_NAME: &str = ".llm-spend";
pub const DB_FILE_NAME: &str = "spend.db";

/// Resolve the store file location.
///
/// Checks `LLM_SPEND_DB_PATH` first, falls back to `~/.llm-spend/spend.db`.
/// Nothing is created here; the store creates the directory on first write.
pub fn default_db_path() -> Result<PathBuf> {
    if let Ok(custom_path) = env::var(DB_PATH_ENV)
        && !custom_path.trim().is_empty()
    {
        return Ok(PathBuf::from(custom_path));
    }

    let base_dirs = directories::BaseDirs::new().ok_or(SpendError::NoHomeDirectory)?;
    Ok(base_dirs.home_dir().join(DB_DIR_NAME).join(DB_FILE_NAME))
}

pub fn format_path(p: &str) -> String {
    if let Some(b) = directories::BaseDirs::new() {
        let home_s = b.home_dir().to_string_lossy();
        if let Some(rest) = p.strip_prefix(&*home_s) {
            return format!("~{rest}");
        }
    }
    p.to_owned()
}

/// `$1.2346` style amount, rounded half away from zero to four places.
pub fn format_currency(v: Decimal) -> String {
    format!(
        "${:.4}",
        v.round_dp_with_strategy(4, RoundingStrategy::MidpointAwayFromZero)
    )
}

/// Integer with thousands separators: `1234567` -> `1,234,567`.
pub fn format_count(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}
