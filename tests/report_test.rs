use chrono::{DateTime, SubsecRound, TimeDelta, Utc};
use rust_decimal::Decimal;
use tempfile::TempDir;

use llm_spend::pricing::calculate_cost;
use llm_spend::report::{GroupBy, report, summary};
use llm_spend::{CallRecord, RecordFilter, SpendStore};

fn record(
    at: DateTime<Utc>,
    model: &str,
    file: &str,
    label: &str,
    tokens: (u64, u64),
) -> CallRecord {
    CallRecord {
        id: None,
        timestamp: at.trunc_subsecs(6),
        provider: llm_spend::pricing::detect_provider(model).as_str().to_string(),
        model: model.to_string(),
        label: label.to_string(),
        source_file: file.to_string(),
        source_function: format!("{}::handler", file.trim_end_matches(".rs")),
        source_line: 10,
        input_tokens: tokens.0,
        output_tokens: tokens.1,
        cost_usd: calculate_cost(model, tokens.0, tokens.1).unwrap(),
        duration_ms: 120,
    }
}

/// Store with a mix of recent and old calls across files, models and labels.
fn seeded_store() -> (TempDir, SpendStore) {
    let temp_dir = TempDir::new().unwrap();
    let store = SpendStore::open(temp_dir.path().join("spend.db"));
    let now = Utc::now();
    let days_ago = |d: i64| now - TimeDelta::days(d);

    let calls = [
        record(days_ago(0), "gpt-4o", "src/chat.rs", "chat", (1200, 300)),
        record(days_ago(1), "gpt-4o-mini", "src/chat.rs", "chat", (800, 200)),
        record(days_ago(2), "claude-sonnet-4", "src/summarize.rs", "summary", (5000, 900)),
        record(days_ago(3), "claude-3-5-haiku", "src/classify.rs", "", (300, 5)),
        record(days_ago(10), "gpt-4o", "src/summarize.rs", "summary", (40_000, 2_000)),
        record(days_ago(45), "claude-opus-4", "src/chat.rs", "chat", (10_000, 4_000)),
    ];
    for call in &calls {
        store.append(call).unwrap();
    }
    (temp_dir, store)
}

#[test]
fn test_group_rows_sum_to_summary_total() {
    let (_dir, store) = seeded_store();

    let windows = [
        RecordFilter::default(),
        RecordFilter::last_days(30),
        RecordFilter::last_days(7),
    ];
    for window in windows {
        let totals = summary(&store, &window).unwrap();
        for group_by in [GroupBy::Model, GroupBy::File, GroupBy::Function, GroupBy::Label] {
            let rows = report(&store, group_by, &window).unwrap();
            let cost: Decimal = rows.iter().map(|r| r.cost_usd).sum();
            let calls: u64 = rows.iter().map(|r| r.calls).sum();
            assert_eq!(cost, totals.total_cost, "{group_by:?} over {window:?}");
            assert_eq!(calls, totals.total_calls, "{group_by:?} over {window:?}");
        }
    }
}

#[test]
fn test_report_sorted_by_cost_descending() {
    let (_dir, store) = seeded_store();
    let rows = report(&store, GroupBy::File, &RecordFilter::default()).unwrap();
    assert_eq!(rows.len(), 3);
    assert!(rows.windows(2).all(|w| w[0].cost_usd >= w[1].cost_usd));

    // opus call dominates
    let totals = summary(&store, &RecordFilter::default()).unwrap();
    assert_eq!(totals.top_file.as_deref(), Some("src/chat.rs"));
    assert_eq!(totals.top_model.as_deref(), Some("claude-opus-4"));
}

#[test]
fn test_window_excludes_old_records() {
    let (_dir, store) = seeded_store();
    let all = summary(&store, &RecordFilter::default()).unwrap();
    let month = summary(&store, &RecordFilter::last_days(30)).unwrap();
    let week = summary(&store, &RecordFilter::last_days(7)).unwrap();
    assert_eq!(all.total_calls, 6);
    assert_eq!(month.total_calls, 5);
    assert_eq!(week.total_calls, 4);
    assert!(week.total_cost < month.total_cost && month.total_cost < all.total_cost);
}

#[test]
fn test_clear_older_than_keeps_recent_aggregates() {
    let (_dir, store) = seeded_store();
    let recent = RecordFilter::last_days(7);
    let before = report(&store, GroupBy::Model, &recent).unwrap();
    let before_totals = summary(&store, &recent).unwrap();

    let deleted = store.clear(Some(7)).unwrap();
    assert_eq!(deleted, 2);

    assert_eq!(report(&store, GroupBy::Model, &recent).unwrap(), before);
    let all = summary(&store, &RecordFilter::default()).unwrap();
    assert_eq!(all.total_calls, before_totals.total_calls);
    assert_eq!(all.total_cost, before_totals.total_cost);

    assert_eq!(store.clear(None).unwrap(), 4);
    assert_eq!(summary(&store, &RecordFilter::default()).unwrap().total_calls, 0);
}

#[test]
fn test_model_and_label_filters() {
    let (_dir, store) = seeded_store();

    let gpt4o = RecordFilter::default().with_model("gpt-4o");
    let rows = report(&store, GroupBy::File, &gpt4o).unwrap();
    assert_eq!(rows.iter().map(|r| r.calls).sum::<u64>(), 2);

    let rows = report(&store, GroupBy::Model, &RecordFilter::default().with_label("chat")).unwrap();
    assert_eq!(rows.len(), 3);

    let unknown = RecordFilter::default().with_model("nonexistent-model");
    let rows = report(&store, GroupBy::Model, &unknown).unwrap();
    assert!(rows.is_empty());
}

#[test]
fn test_unlabeled_calls_form_their_own_group() {
    let (_dir, store) = seeded_store();
    let rows = report(&store, GroupBy::Label, &RecordFilter::default()).unwrap();
    let unlabeled = rows.iter().find(|r| r.key.is_empty()).expect("empty label group");
    assert_eq!(unlabeled.calls, 1);
}

#[test]
fn test_missing_store_reports_nothing() {
    let temp_dir = TempDir::new().unwrap();
    let store = SpendStore::open(temp_dir.path().join("missing.db"));

    assert!(report(&store, GroupBy::Model, &RecordFilter::default()).unwrap().is_empty());
    let totals = summary(&store, &RecordFilter::default()).unwrap();
    assert_eq!(totals.total_calls, 0);
    assert_eq!(totals.total_cost, Decimal::ZERO);
    assert!(totals.top_file.is_none());
    assert_eq!(store.clear(None).unwrap(), 0);
    assert!(!store.path().exists());
}
