use llm_spend::{RecordFilter, SpendStore, TokenUsage, Tracker};
use serial_test::serial;
use std::thread;
use std::time::Duration;
use tempfile::TempDir;

/// Test concurrent writers from multiple threads, each with its own store handle
#[test]
fn test_concurrent_appends_are_not_lost() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("test_concurrent.db");

    let handles: Vec<_> = (0..10)
        .map(|i| {
            let db_path = db_path.clone();
            // Add stagger to reduce initial contention
            thread::sleep(Duration::from_millis(i * 5));
            thread::spawn(move || {
                let tracker = Tracker::new(SpendStore::open(db_path), "gpt-4o-mini")
                    .with_label(format!("worker-{i}"));

                for iteration in 0..5 {
                    let mut scope = tracker.scope();
                    scope.set_usage(TokenUsage::new(1000 + i, 100 + iteration));
                    let result = scope.finish();
                    assert!(
                        matches!(result, Ok(Some(_))),
                        "Thread {} iteration {} failed: {:?}",
                        i,
                        iteration,
                        result.err()
                    );
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    let store = SpendStore::open(&db_path);
    let records = store.records(&RecordFilter::default()).unwrap();
    assert_eq!(records.len(), 50);

    for i in 0..10 {
        let label = format!("worker-{i}");
        let own = store
            .records(&RecordFilter::default().with_label(label.as_str()))
            .unwrap();
        assert_eq!(own.len(), 5, "records for {label}");
    }

    let mut ids: Vec<i64> = records.iter().filter_map(|r| r.id).collect();
    ids.sort_unstable();
    ids.dedup();
    assert_eq!(ids.len(), 50);
}

/// Test concurrent readers while a writer is appending
#[test]
fn test_reads_during_writes() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("test_rw.db");
    let store = SpendStore::open(&db_path);
    let tracker = Tracker::new(store.clone(), "claude-3-5-haiku");

    // Create the store before readers start
    let mut scope = tracker.scope();
    scope.set_usage(TokenUsage::new(1, 1));
    scope.finish().unwrap();

    let writer = {
        let tracker = tracker.clone();
        thread::spawn(move || {
            for _ in 0..20 {
                let mut scope = tracker.scope();
                scope.set_usage(TokenUsage::new(10, 10));
                scope.finish().unwrap();
            }
        })
    };
    let readers: Vec<_> = (0..4)
        .map(|_| {
            let store = store.clone();
            thread::spawn(move || {
                for _ in 0..10 {
                    let count = store.records(&RecordFilter::default()).unwrap().len();
                    assert!((1..=21).contains(&count));
                }
            })
        })
        .collect();

    writer.join().unwrap();
    for reader in readers {
        reader.join().unwrap();
    }
    assert_eq!(store.records(&RecordFilter::default()).unwrap().len(), 21);
}

/// Test that the store location can be redirected through the environment
#[test]
#[serial]
fn test_default_store_from_env() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("nested").join("spend.db");
    unsafe { std::env::set_var("LLM_SPEND_DB_PATH", db_path.to_str().unwrap()) };

    let store = SpendStore::open_default().unwrap();
    assert_eq!(store.path(), db_path.as_path());
    assert!(!db_path.exists());

    let tracker = Tracker::new(store, "gpt-4o");
    let mut scope = tracker.scope();
    scope.set_usage(TokenUsage::new(5, 5));
    scope.finish().unwrap();
    assert!(db_path.exists());

    // Clean up
    unsafe { std::env::remove_var("LLM_SPEND_DB_PATH") };
}
