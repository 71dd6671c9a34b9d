use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Function name stored when the call site could only be located by file and line.
pub const UNKNOWN_FUNCTION: &str = "(unknown)";

/// One priced LLM call. Written once, never updated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallRecord {
    /// Row id assigned by the store
    #[serde(default)]
    pub id: Option<i64>,
    /// When the call completed
    pub timestamp: DateTime<Utc>,
    pub provider: String,
    pub model: String,
    #[serde(default)]
    pub label: String,
    pub source_file: String,
    pub source_function: String,
    #[serde(default)]
    pub source_line: u32,
    pub input_tokens: u64,
    pub output_tokens: u64,
    /// Cost at write time, never recomputed
    #[serde(with = "rust_decimal::serde::str")]
    pub cost_usd: Decimal,
    #[serde(default)]
    pub duration_ms: u64,
}

impl CallRecord {
    /// Column order used by CSV export.
    pub const FIELDS: [&'static str; 12] = [
        "id",
        "timestamp",
        "provider",
        "model",
        "label",
        "source_file",
        "source_function",
        "source_line",
        "input_tokens",
        "output_tokens",
        "cost_usd",
        "duration_ms",
    ];
}

/// Where an instrumented call was made from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallSite {
    pub file: String,
    pub function: String,
    pub line: u32,
}

impl CallSite {
    /// Location of the code calling the `#[track_caller]` function this is used in.
    ///
    /// The enclosing function cannot be recovered this way, so it is recorded
    /// as `(unknown)`. The `track!` and `spending!` macros capture it.
    #[track_caller]
    pub fn caller() -> Self {
        let location = std::panic::Location::caller();
        Self {
            file: location.file().to_string(),
            function: UNKNOWN_FUNCTION.to_string(),
            line: location.line(),
        }
    }

    /// Build a call site from the type name of a marker fn item declared in the
    /// calling function, e.g. `app::summarize::{{closure}}::__here`.
    pub fn from_type_name(file: &str, line: u32, marker_type_name: &str) -> Self {
        let path = marker_type_name
            .rsplit_once("::")
            .map(|(head, _marker)| head)
            .unwrap_or(marker_type_name);
        let function = path
            .split("::")
            .filter(|segment| *segment != "{{closure}}")
            .collect::<Vec<_>>()
            .join("::");
        Self {
            file: file.to_string(),
            function: if function.is_empty() {
                UNKNOWN_FUNCTION.to_string()
            } else {
                function
            },
            line,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_type_name_strips_marker_and_closures() {
        let site = CallSite::from_type_name("src/app.rs", 12, "app::jobs::summarize::__here");
        assert_eq!(site.function, "app::jobs::summarize");
        assert_eq!(site.file, "src/app.rs");
        assert_eq!(site.line, 12);

        let site = CallSite::from_type_name(
            "src/app.rs",
            40,
            "app::main::{{closure}}::{{closure}}::__here",
        );
        assert_eq!(site.function, "app::main");
    }

    #[test]
    fn test_from_type_name_without_path() {
        let site = CallSite::from_type_name("x.rs", 1, "__here");
        assert_eq!(site.function, UNKNOWN_FUNCTION);
    }

    #[test]
    fn test_caller_records_file_and_line() {
        let line = line!() + 1;
        let site = CallSite::caller();
        assert!(site.file.ends_with("record.rs"));
        assert_eq!(site.line, line);
        assert_eq!(site.function, UNKNOWN_FUNCTION);
    }
}
