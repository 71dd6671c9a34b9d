//! Grouped aggregation over stored call records.
//!
//! Totals are exact sums of the per-call `cost_usd` written at record time;
//! nothing is re-priced here, so reports stay stable when prices change.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::Serialize;

use crate::db::{RecordFilter, SpendStore};
use crate::error::Result;
use crate::models::CallRecord;

/// Dimension a report partitions records by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupBy {
    Model,
    File,
    Function,
    Label,
}

impl GroupBy {
    pub fn key<'a>(&self, record: &'a CallRecord) -> &'a str {
        match self {
            GroupBy::Model => &record.model,
            GroupBy::File => &record.source_file,
            GroupBy::Function => &record.source_function,
            GroupBy::Label => &record.label,
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            GroupBy::Model => "Model",
            GroupBy::File => "File",
            GroupBy::Function => "Function",
            GroupBy::Label => "Label",
        }
    }
}

/// Aggregate for one group key.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupRow {
    pub key: String,
    pub calls: u64,
    pub input_tokens: u64,
    pub output_tokens: u64,
    #[serde(with = "rust_decimal::serde::str")]
    pub cost_usd: Decimal,
}

impl GroupRow {
    fn empty(key: &str) -> Self {
        Self {
            key: key.to_string(),
            calls: 0,
            input_tokens: 0,
            output_tokens: 0,
            cost_usd: Decimal::ZERO,
        }
    }

    fn add(&mut self, record: &CallRecord) {
        self.calls += 1;
        self.input_tokens = self.input_tokens.saturating_add(record.input_tokens);
        self.output_tokens = self.output_tokens.saturating_add(record.output_tokens);
        self.cost_usd += record.cost_usd;
    }
}

/// Totals for a window plus the most expensive file and model.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Summary {
    #[serde(with = "rust_decimal::serde::str")]
    pub total_cost: Decimal,
    pub total_calls: u64,
    pub total_input_tokens: u64,
    pub total_output_tokens: u64,
    pub top_file: Option<String>,
    pub top_model: Option<String>,
}

/// Partition `records` by `group_by`, sorted by cost descending then key ascending.
pub fn aggregate<'a, I>(records: I, group_by: GroupBy) -> Vec<GroupRow>
where
    I: IntoIterator<Item = &'a CallRecord>,
{
    // BTreeMap keeps keys ordered, which the stable sort below preserves for ties
    let mut groups: BTreeMap<&str, GroupRow> = BTreeMap::new();
    for record in records {
        let key = group_by.key(record);
        groups
            .entry(key)
            .or_insert_with(|| GroupRow::empty(key))
            .add(record);
    }
    let mut rows: Vec<GroupRow> = groups.into_values().collect();
    rows.sort_by(|a, b| b.cost_usd.cmp(&a.cost_usd));
    rows
}

pub fn summarize(records: &[CallRecord]) -> Summary {
    let top = |group_by| aggregate(records, group_by).into_iter().next().map(|r| r.key);
    Summary {
        total_cost: records.iter().map(|r| r.cost_usd).sum(),
        total_calls: records.len() as u64,
        total_input_tokens: saturating_total(records.iter().map(|r| r.input_tokens)),
        total_output_tokens: saturating_total(records.iter().map(|r| r.output_tokens)),
        top_file: top(GroupBy::File),
        top_model: top(GroupBy::Model),
    }
}

fn saturating_total(counts: impl Iterator<Item = u64>) -> u64 {
    counts.fold(0, u64::saturating_add)
}

/// Grouped report over the records matching `filter`.
pub fn report(
    store: &SpendStore,
    group_by: GroupBy,
    filter: &RecordFilter,
) -> Result<Vec<GroupRow>> {
    let records = store.records(filter)?;
    Ok(aggregate(&records, group_by))
}

/// Single aggregate over the records matching `filter`.
pub fn summary(store: &SpendStore, filter: &RecordFilter) -> Result<Summary> {
    let records = store.records(filter)?;
    Ok(summarize(&records))
}
