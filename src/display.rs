use std::env;
use std::io::IsTerminal;

#[cfg(feature = "colors")]
use owo_colors::OwoColorize;

// Provide a no-op color shim when "colors" feature is disabled
#[cfg(not(feature = "colors"))]
pub mod color_shim {
    pub trait ColorizeShim {
        fn as_str(&self) -> &str;

        fn bold(&self) -> String {
            self.as_str().to_string()
        }
        fn dimmed(&self) -> String {
            self.as_str().to_string()
        }
        fn cyan(&self) -> String {
            self.as_str().to_string()
        }
        fn green(&self) -> String {
            self.as_str().to_string()
        }
        fn yellow(&self) -> String {
            self.as_str().to_string()
        }
        fn magenta(&self) -> String {
            self.as_str().to_string()
        }
        fn blue(&self) -> String {
            self.as_str().to_string()
        }
    }

    impl ColorizeShim for &str {
        fn as_str(&self) -> &str {
            self
        }
    }
    impl ColorizeShim for String {
        fn as_str(&self) -> &str {
            self.as_str()
        }
    }
}

#[cfg(not(feature = "colors"))]
use color_shim::ColorizeShim as OwoColorize;

use serde_json::{Value, json};

use crate::db::TimeWindow;
use crate::pricing::{PriceEntry, detect_provider};
use crate::report::{GroupBy, GroupRow, Summary};
use crate::utils::{format_count, format_currency, format_path};

/// Applies colors only when enabled.
#[derive(Debug, Clone, Copy)]
pub struct Painter {
    enabled: bool,
}

impl Painter {
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }

    /// Colors on unless `NO_COLOR` is set or stdout is not a terminal.
    pub fn detect() -> Self {
        Self::new(env::var_os("NO_COLOR").is_none() && std::io::stdout().is_terminal())
    }

    fn paint(&self, text: &str, f: impl Fn(&str) -> String) -> String {
        if self.enabled {
            f(text)
        } else {
            text.to_string()
        }
    }

    pub fn header(&self, text: &str) -> String {
        self.paint(text, |t| t.cyan().bold().to_string())
    }

    pub fn title(&self, text: &str) -> String {
        self.paint(text, |t| t.bold().to_string())
    }

    pub fn cost(&self, text: &str) -> String {
        self.paint(text, |t| t.green().to_string())
    }

    pub fn calls(&self, text: &str) -> String {
        self.paint(text, |t| t.yellow().to_string())
    }

    pub fn tokens(&self, text: &str) -> String {
        self.paint(text, |t| t.blue().to_string())
    }

    pub fn provider(&self, text: &str) -> String {
        self.paint(text, |t| t.magenta().to_string())
    }

    pub fn dim(&self, text: &str) -> String {
        self.paint(text, |t| t.dimmed().to_string())
    }
}

#[derive(Clone, Copy)]
enum Align {
    Left,
    Right,
}

struct Column {
    name: &'static str,
    align: Align,
    paint: fn(&Painter, &str) -> String,
}

fn plain(_: &Painter, text: &str) -> String {
    text.to_string()
}

/// Render aligned columns; widths are computed on the uncolored text.
fn render_table(painter: &Painter, columns: &[Column], rows: &[Vec<String>]) -> String {
    let widths: Vec<usize> = columns
        .iter()
        .enumerate()
        .map(|(i, col)| {
            rows.iter()
                .map(|row| row[i].chars().count())
                .chain(std::iter::once(col.name.chars().count()))
                .max()
                .unwrap_or(0)
        })
        .collect();

    let pad = |text: &str, width: usize, align: Align| match align {
        Align::Left => format!("{text:<width$}"),
        Align::Right => format!("{text:>width$}"),
    };

    let mut out = String::new();
    let header: Vec<String> = columns
        .iter()
        .zip(&widths)
        .map(|(col, w)| painter.header(&pad(col.name, *w, col.align)))
        .collect();
    out.push_str(header.join("  ").trim_end());
    out.push('\n');
    let rule: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
    out.push_str(&painter.dim(&rule.join("  ")));
    out.push('\n');

    for row in rows {
        let cells: Vec<String> = columns
            .iter()
            .zip(&widths)
            .zip(row)
            .map(|((col, w), cell)| (col.paint)(painter, &pad(cell, *w, col.align)))
            .collect();
        out.push_str(cells.join("  ").trim_end());
        out.push('\n');
    }
    out
}

fn window_phrase(window: TimeWindow) -> String {
    match window {
        TimeWindow::All => "all time".to_string(),
        TimeWindow::LastDays(1) => "last 1 day".to_string(),
        TimeWindow::LastDays(n) => format!("last {n} days"),
    }
}

/// Display text for a group key; empty keys get a placeholder.
pub fn group_key_display(group_by: GroupBy, key: &str) -> String {
    match (group_by, key.is_empty()) {
        (GroupBy::Label, true) => "(unlabeled)".to_string(),
        (_, true) => "(unknown)".to_string(),
        (GroupBy::File, false) => format_path(key),
        (_, false) => key.to_string(),
    }
}

pub fn render_report(
    rows: &[GroupRow],
    group_by: GroupBy,
    window: TimeWindow,
    painter: &Painter,
) -> String {
    let mut columns = vec![Column {
        name: group_by.title(),
        align: Align::Left,
        paint: plain,
    }];
    if group_by == GroupBy::Model {
        columns.push(Column {
            name: "Provider",
            align: Align::Left,
            paint: Painter::provider,
        });
    }
    columns.extend([
        Column {
            name: "Calls",
            align: Align::Right,
            paint: Painter::calls,
        },
        Column {
            name: "Input Tokens",
            align: Align::Right,
            paint: Painter::tokens,
        },
        Column {
            name: "Output Tokens",
            align: Align::Right,
            paint: Painter::tokens,
        },
        Column {
            name: "Cost (USD)",
            align: Align::Right,
            paint: Painter::cost,
        },
    ]);

    let cells: Vec<Vec<String>> = rows
        .iter()
        .map(|row| {
            let mut cells = vec![group_key_display(group_by, &row.key)];
            if group_by == GroupBy::Model {
                cells.push(detect_provider(&row.key).as_str().to_string());
            }
            cells.push(format_count(row.calls));
            cells.push(format_count(row.input_tokens));
            cells.push(format_count(row.output_tokens));
            cells.push(format_currency(row.cost_usd));
            cells
        })
        .collect();

    let title = format!("Cost by {} ({})", group_by.title(), window_phrase(window));
    format!(
        "{}\n{}",
        painter.title(&title),
        render_table(painter, &columns, &cells)
    )
}

pub fn render_summary(summary: &Summary, window: TimeWindow, painter: &Painter) -> String {
    let none = "(none)".to_string();
    let lines = [
        ("Total Spend:", painter.cost(&format_currency(summary.total_cost))),
        ("Total Calls:", format_count(summary.total_calls)),
        ("Input Tokens:", format_count(summary.total_input_tokens)),
        ("Output Tokens:", format_count(summary.total_output_tokens)),
        (
            "Top File:",
            painter.header(
                &summary
                    .top_file
                    .as_deref()
                    .map(format_path)
                    .unwrap_or_else(|| none.clone()),
            ),
        ),
        (
            "Top Model:",
            painter.provider(summary.top_model.as_deref().unwrap_or(&none)),
        ),
    ];

    let mut out = painter.title(&format!("LLM Spend Summary ({})", window_phrase(window)));
    out.push('\n');
    for (label, value) in lines {
        out.push_str(&format!("  {}  {}\n", painter.title(&format!("{label:<14}")), value));
    }
    out
}

pub fn render_models(entries: &[PriceEntry], painter: &Painter) -> String {
    let mut sorted: Vec<&PriceEntry> = entries.iter().collect();
    sorted.sort_by(|a, b| a.model.cmp(b.model));

    let columns = [
        Column {
            name: "Model",
            align: Align::Left,
            paint: plain,
        },
        Column {
            name: "Provider",
            align: Align::Left,
            paint: Painter::provider,
        },
        Column {
            name: "Input $/1M",
            align: Align::Right,
            paint: Painter::tokens,
        },
        Column {
            name: "Output $/1M",
            align: Align::Right,
            paint: Painter::cost,
        },
    ];
    let cells: Vec<Vec<String>> = sorted
        .iter()
        .map(|p| {
            vec![
                p.model.to_string(),
                p.provider().as_str().to_string(),
                format_currency(p.input_per_million),
                format_currency(p.output_per_million),
            ]
        })
        .collect();

    format!(
        "{}\n{}",
        painter.title("Supported Models & Pricing (per 1M tokens)"),
        render_table(painter, &columns, &cells)
    )
}

fn window_json(window: TimeWindow) -> Value {
    match window {
        TimeWindow::All => Value::Null,
        TimeWindow::LastDays(n) => json!(n),
    }
}

pub fn build_report_json(rows: &[GroupRow], group_by: GroupBy, window: TimeWindow) -> Value {
    json!({
        "group_by": group_by,
        "days": window_json(window),
        "rows": rows,
    })
}

pub fn build_summary_json(summary: &Summary, window: TimeWindow) -> Value {
    json!({
        "days": window_json(window),
        "total_cost_usd": summary.total_cost.to_string(),
        "total_calls": summary.total_calls,
        "total_input_tokens": summary.total_input_tokens,
        "total_output_tokens": summary.total_output_tokens,
        "top_file": summary.top_file,
        "top_model": summary.top_model,
    })
}

pub fn build_models_json(entries: &[PriceEntry]) -> Value {
    let mut sorted: Vec<&PriceEntry> = entries.iter().collect();
    sorted.sort_by(|a, b| a.model.cmp(b.model));
    Value::Array(
        sorted
            .into_iter()
            .map(|p| {
                json!({
                    "model": p.model,
                    "provider": p.provider().as_str(),
                    "input_per_million_usd": p.input_per_million.to_string(),
                    "output_per_million_usd": p.output_per_million.to_string(),
                })
            })
            .collect(),
    )
}

pub fn print_json_output(value: &Value) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
