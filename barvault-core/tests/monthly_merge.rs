//! Integration tests for partitioning and the monthly merge store.

use barvault_core::catalog::{ProgressStore, SqliteCatalog};
use barvault_core::clock::FixedClock;
use barvault_core::domain::{MonthKey, PriceRecord};
use barvault_core::pipeline::MonthlyIngest;
use barvault_core::storage::{group_by_month, MonthlyStore};
use barvault_core::DataError;
use serde_json::json;

fn rec(v: serde_json::Value) -> PriceRecord {
    PriceRecord::from_value(v).unwrap()
}

fn v_column(store: &MonthlyStore, key: &MonthKey) -> Vec<Option<i64>> {
    let df = store.read_month(key).unwrap();
    df.column("v").unwrap().i64().unwrap().into_iter().collect()
}

#[test]
fn second_batch_overwrites_january_and_creates_february() {
    let dir = tempfile::tempdir().unwrap();
    let store = MonthlyStore::new(dir.path());
    let catalog = SqliteCatalog::open_in_memory().unwrap();
    let clock = FixedClock::at_month(2024, 3).unwrap();
    let ingest = MonthlyIngest::new(&store, &catalog, &clock);

    ingest
        .save_multi_month(&[rec(json!({"date": "2024-01-15", "v": 1}))], "BTCUSD", "tiingo")
        .unwrap();
    let summary = ingest
        .save_multi_month(
            &[
                rec(json!({"date": "2024-01-15", "v": 2})),
                rec(json!({"date": "2024-02-01", "v": 3})),
            ],
            "BTCUSD",
            "tiingo",
        )
        .unwrap();
    assert_eq!(summary.months_written(), 2);

    let jan = MonthKey::new("BTCUSD", "tiingo", 2024, 1);
    let feb = MonthKey::new("BTCUSD", "tiingo", 2024, 2);
    assert_eq!(v_column(&store, &jan), vec![Some(2)]);
    assert_eq!(v_column(&store, &feb), vec![Some(3)]);

    let jan_progress = catalog.get_progress(&jan).unwrap().unwrap();
    assert_eq!(jan_progress.records_count, 1);
    assert!(jan_progress.is_month_complete);
}

#[test]
fn grouping_buckets_by_month() {
    let records = vec![
        rec(json!({"date": "2024-01-05"})),
        rec(json!({"date": "2024-01-20"})),
        rec(json!({"date": "2024-02-10"})),
    ];
    let grouped = group_by_month(&records).unwrap();

    let sizes: Vec<((i32, u32), usize)> = grouped.iter().map(|(k, v)| (*k, v.len())).collect();
    assert_eq!(sizes, vec![((2024, 1), 2), ((2024, 2), 1)]);
}

#[test]
fn missing_timestamp_is_schema_error_and_creates_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let store = MonthlyStore::new(dir.path());

    let err = store
        .write_month(&[rec(json!({"open": 1}))], "BTCUSD", "tiingo", 2024, 1)
        .unwrap_err();

    assert!(matches!(err, DataError::Schema(_)));
    assert!(store.list_local_files().unwrap().is_empty());
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[test]
fn one_bad_record_aborts_the_whole_batch() {
    let dir = tempfile::tempdir().unwrap();
    let store = MonthlyStore::new(dir.path());
    let catalog = SqliteCatalog::open_in_memory().unwrap();
    let clock = FixedClock::at_month(2024, 3).unwrap();

    let err = MonthlyIngest::new(&store, &catalog, &clock)
        .save_multi_month(
            &[
                rec(json!({"date": "2024-01-05", "v": 1})),
                rec(json!({"v": 2})),
            ],
            "BTCUSD",
            "tiingo",
        )
        .unwrap_err();

    assert!(matches!(err, DataError::Schema(_)));
    assert!(store.list_local_files().unwrap().is_empty());
    assert!(catalog.list_progress().unwrap().is_empty());
}

#[test]
fn rewriting_same_record_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let store = MonthlyStore::new(dir.path());
    let key = MonthKey::new("ETHUSD", "tiingo", 2024, 5);
    let batch = [rec(json!({"timestamp": "2024-05-01T12:00:00Z", "v": 7}))];

    store.write_month(&batch, "ETHUSD", "tiingo", 2024, 5).unwrap();
    let second = store.write_month(&batch, "ETHUSD", "tiingo", 2024, 5).unwrap();

    assert_eq!(second.row_count, 1);
    assert_eq!(v_column(&store, &key), vec![Some(7)]);
}

#[test]
fn offsets_bucket_at_face_value_but_sort_as_instants() {
    // 00:30 at +01:00 is still January 31st in UTC, but buckets into February.
    let records = vec![
        rec(json!({"date": "2024-02-01T00:30:00+01:00", "v": 1})),
        rec(json!({"date": "2024-02-01T00:00:00Z", "v": 2})),
    ];
    let grouped = group_by_month(&records).unwrap();
    assert_eq!(grouped.keys().copied().collect::<Vec<_>>(), vec![(2024, 2)]);

    let dir = tempfile::tempdir().unwrap();
    let store = MonthlyStore::new(dir.path());
    store
        .write_month(&grouped[&(2024, 2)], "BTCUSD", "tiingo", 2024, 2)
        .unwrap();
    let key = MonthKey::new("BTCUSD", "tiingo", 2024, 2);
    assert_eq!(v_column(&store, &key), vec![Some(1), Some(2)]);
}

#[test]
fn new_fields_widen_the_schema() {
    let dir = tempfile::tempdir().unwrap();
    let store = MonthlyStore::new(dir.path());
    store
        .write_month(&[rec(json!({"date": "2024-01-01", "close": 1}))], "X", "Y", 2024, 1)
        .unwrap();
    let file = store
        .write_month(
            &[rec(json!({"date": "2024-01-02", "close": 1.5, "tradesDone": 4}))],
            "X",
            "Y",
            2024,
            1,
        )
        .unwrap();

    let df = store.read_month(&file.key).unwrap();
    let closes: Vec<Option<f64>> = df
        .column("close")
        .unwrap()
        .f64()
        .unwrap()
        .into_iter()
        .collect();
    assert_eq!(closes, vec![Some(1.0), Some(1.5)]);
    assert_eq!(df.column("tradesDone").unwrap().null_count(), 1);
}

#[test]
fn sub_millisecond_records_survive_a_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let store = MonthlyStore::new(dir.path());
    let file = store
        .write_month(
            &[
                rec(json!({"timestamp": "2024-01-01T00:00:00.000100Z", "v": 1})),
                rec(json!({"timestamp": "2024-01-01T00:00:00.000200Z", "v": 2})),
            ],
            "BTCUSD",
            "tiingo",
            2024,
            1,
        )
        .unwrap();

    assert_eq!(file.row_count, 2);
    assert_eq!(v_column(&store, &file.key), vec![Some(1), Some(2)]);
    assert_eq!(
        file.last_timestamp.unwrap().to_rfc3339(),
        "2024-01-01T00:00:00.000200+00:00"
    );
}

#[test]
fn failed_write_leaves_previous_file_untouched() {
    let dir = tempfile::tempdir().unwrap();
    let store = MonthlyStore::new(dir.path());
    let first = store
        .write_month(&[rec(json!({"date": "2024-01-01", "v": 1}))], "BTCUSD", "tiingo", 2024, 1)
        .unwrap();
    let before = std::fs::read(&first.path).unwrap();

    // A directory squatting on the temp path makes the write itself fail.
    std::fs::create_dir(first.path.with_extension("parquet.tmp")).unwrap();
    let err = store
        .write_month(&[rec(json!({"date": "2024-01-02", "v": 2}))], "BTCUSD", "tiingo", 2024, 1)
        .unwrap_err();

    assert!(matches!(err, DataError::Io(_)));
    assert_eq!(std::fs::read(&first.path).unwrap(), before);
    assert_eq!(v_column(&store, &first.key), vec![Some(1)]);
}
