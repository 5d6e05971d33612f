//! Record ↔ DataFrame conversion and parquet I/O helpers.

use crate::domain::record::{EXCHANGE_FIELD, TICKER_FIELD, TIMESTAMP_FIELD};
use crate::domain::PriceRecord;
use crate::error::DataError;
use polars::prelude::*;
use serde_json::Value;
use std::collections::HashSet;
use std::fs;
use std::path::Path;

/// Column type chosen for a JSON field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ColumnKind {
    Int,
    Float,
    Bool,
    Text,
}

/// Normalize records into a frame: `timestamp` as `Datetime(ns)`, payload
/// fields in first-seen order, then `ticker` and `exchange` on every row.
///
/// Fails with a schema error before anything is allocated for a record that
/// has no usable timestamp.
pub fn records_to_frame(
    records: &[PriceRecord],
    ticker: &str,
    exchange: &str,
) -> Result<DataFrame, DataError> {
    let nanos = records
        .iter()
        .map(|r| r.time().and_then(|t| t.epoch_nanos()))
        .collect::<Result<Vec<i64>, _>>()?;

    let mut names: Vec<&str> = Vec::new();
    let mut seen: HashSet<&str> = HashSet::new();
    for record in records {
        for (name, _) in record.payload() {
            if seen.insert(name.as_str()) {
                names.push(name.as_str());
            }
        }
    }

    let mut columns = Vec::with_capacity(names.len() + 3);
    columns.push(
        Column::new(TIMESTAMP_FIELD.into(), nanos)
            .cast(&DataType::Datetime(TimeUnit::Nanoseconds, None))?,
    );
    for name in names {
        let values: Vec<Option<&Value>> = records
            .iter()
            .map(|r| r.get(name).filter(|v| !v.is_null()))
            .collect();
        columns.push(json_column(name, &values));
    }
    let n = records.len();
    columns.push(Column::new(TICKER_FIELD.into(), vec![ticker; n]));
    columns.push(Column::new(EXCHANGE_FIELD.into(), vec![exchange; n]));

    DataFrame::new(columns).map_err(|e| DataError::Parquet(format!("dataframe creation: {e}")))
}

fn infer_kind(values: &[Option<&Value>]) -> ColumnKind {
    let mut kind: Option<ColumnKind> = None;
    for value in values.iter().flatten() {
        let this = match value {
            Value::Number(n) if n.is_i64() => ColumnKind::Int,
            Value::Number(_) => ColumnKind::Float,
            Value::Bool(_) => ColumnKind::Bool,
            _ => ColumnKind::Text,
        };
        kind = Some(match (kind, this) {
            (None, k) => k,
            (Some(a), b) if a == b => a,
            (Some(ColumnKind::Int), ColumnKind::Float)
            | (Some(ColumnKind::Float), ColumnKind::Int) => ColumnKind::Float,
            _ => return ColumnKind::Text,
        });
    }
    // an all-null field is most likely a missing price
    kind.unwrap_or(ColumnKind::Float)
}

fn json_column(name: &str, values: &[Option<&Value>]) -> Column {
    match infer_kind(values) {
        ColumnKind::Int => {
            let v: Vec<Option<i64>> = values.iter().map(|v| v.and_then(Value::as_i64)).collect();
            Column::new(name.into(), v)
        }
        ColumnKind::Float => {
            let v: Vec<Option<f64>> = values.iter().map(|v| v.and_then(Value::as_f64)).collect();
            Column::new(name.into(), v)
        }
        ColumnKind::Bool => {
            let v: Vec<Option<bool>> = values.iter().map(|v| v.and_then(Value::as_bool)).collect();
            Column::new(name.into(), v)
        }
        ColumnKind::Text => {
            let v: Vec<Option<String>> = values
                .iter()
                .map(|v| {
                    v.map(|v| match v {
                        Value::String(s) => s.clone(),
                        other => other.to_string(),
                    })
                })
                .collect();
            Column::new(name.into(), v)
        }
    }
}

/// Dedupe on `timestamp` keeping the last occurrence, then sort ascending.
pub fn canonicalize(lf: LazyFrame) -> LazyFrame {
    lf.unique_stable(
        Some(vec![TIMESTAMP_FIELD.into()]),
        UniqueKeepStrategy::Last,
    )
    .sort(
        [TIMESTAMP_FIELD],
        SortMultipleOptions::default().with_maintain_order(true),
    )
}

/// Union an existing monthly frame with new rows; new rows win on timestamp
/// collisions. Columns missing on either side are filled with nulls and
/// differing types are widened to a common supertype.
pub fn merge_frames(existing: DataFrame, incoming: DataFrame) -> Result<DataFrame, DataError> {
    let args = UnionArgs {
        to_supertypes: true,
        ..Default::default()
    };
    let union = concat_lf_diagonal([existing.lazy(), incoming.lazy()], args)?;
    canonicalize(union)
        .collect()
        .map_err(|e| DataError::Parquet(format!("merge: {e}")))
}

/// Timestamps of a frame as epoch nanoseconds, in row order.
///
/// Files written with a coarser unit are widened first.
pub fn timestamp_nanos(df: &DataFrame) -> Result<Vec<Option<i64>>, DataError> {
    let column = df
        .column(TIMESTAMP_FIELD)?
        .cast(&DataType::Datetime(TimeUnit::Nanoseconds, None))?
        .cast(&DataType::Int64)?;
    let values = column.i64()?;
    Ok(values.into_iter().collect())
}

pub fn read_parquet(path: &Path) -> Result<DataFrame, DataError> {
    let file = fs::File::open(path)
        .map_err(|e| DataError::Parquet(format!("open {}: {e}", path.display())))?;
    ParquetReader::new(file)
        .finish()
        .map_err(|e| DataError::Parquet(format!("read {}: {e}", path.display())))
}

/// Write `df` to `{path}.tmp`, fsync, then rename over `path`.
///
/// On any failure the temp file is removed and `path` keeps its old content.
pub fn write_parquet_atomic(df: &mut DataFrame, path: &Path) -> Result<(), DataError> {
    let tmp_path = path.with_extension("parquet.tmp");

    let result: Result<(), DataError> = (|| {
        let mut file = fs::File::create(&tmp_path)?;
        ParquetWriter::new(&mut file)
            .with_compression(ParquetCompression::Snappy)
            .finish(df)
            .map_err(|e| DataError::Parquet(format!("write parquet: {e}")))?;
        file.sync_all()?;
        fs::rename(&tmp_path, path)?;
        Ok(())
    })();

    if result.is_err() {
        let _ = fs::remove_file(&tmp_path);
    }
    result
}
