//! The per-timestamp reduction loop.
//!
//! The batch is walked one index at a time. At each index every group collects
//! the values its members have there, absent samples are skipped, and each
//! group with at least one value yields one [`OutputPoint`]. Nothing carries
//! over from one index to the next.

use crate::aggregator::MetricSink;
use crate::catalog::Catalog;
use crate::error::GabError;
use crate::functions::Reducer;
use crate::series::TimeSeries;
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// One reduced value, ready for the sink.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputPoint {
    pub key: String,
    pub value: f64,
    pub timestamp: i64,
}

/// What a run sent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub timestamps: usize,
    pub points_sent: usize,
    pub send_failures: usize,
}

/// Formats a value the way Carbon expects it: fixed point, `precision` decimals.
pub fn format_value(value: f64, precision: usize) -> String {
    format!("{:.*}", precision, value)
}

/// Reduces every group at point `index` of a validated batch.
///
/// Points come back in output-key order. The timestamp is read from the first
/// series; if it is not an integer the batch is malformed.
pub fn points_at(
    catalog: &Catalog,
    series: &[TimeSeries],
    reducer: &dyn Reducer,
    index: usize,
) -> Result<Vec<OutputPoint>, GabError> {
    let mut values: BTreeMap<&str, Vec<f64>> = BTreeMap::new();

    for s in series {
        let value = match s.datapoints.get(index).and_then(|p| p.value().value()) {
            Some(value) => value,
            None => continue,
        };
        if let Some(group) = catalog.group_of(&s.target) {
            values.entry(group.key.as_str()).or_default().push(value);
        }
    }

    let raw = series
        .first()
        .and_then(|s| s.datapoints.get(index))
        .map(|p| p.timestamp());
    let timestamp = match raw.and_then(|ts| ts.as_unix()) {
        Some(ts) => ts,
        None => {
            return Err(GabError::MalformedBatch {
                index,
                timestamp: raw.map_or_else(|| "missing".to_string(), |ts| ts.to_string()),
            })
        }
    };

    Ok(values
        .into_iter()
        .filter(|(_, values)| !values.is_empty())
        .map(|(key, values)| OutputPoint {
            key: key.to_string(),
            value: reducer.reduce(&values),
            timestamp,
        })
        .collect())
}

/// Walks the whole batch and hands every point to `sink`.
///
/// A point the sink rejects is logged and counted; the run goes on. A malformed
/// timestamp stops the run.
pub async fn aggregate(
    catalog: &Catalog,
    series: &[TimeSeries],
    reducer: &dyn Reducer,
    sink: &dyn MetricSink,
    precision: usize,
) -> Result<RunSummary, GabError> {
    for s in series.iter().filter(|s| catalog.group_of(&s.target).is_none()) {
        warn!(series = %s.target, "series was not requested, ignoring it");
    }

    let points = series.first().map_or(0, |s| s.len());
    let mut summary = RunSummary::default();

    for index in 0..points {
        for point in points_at(catalog, series, reducer, index)? {
            let value = format_value(point.value, precision);
            match sink.send(&point.key, &value, point.timestamp).await {
                Ok(()) => summary.points_sent += 1,
                Err(e) => {
                    warn!(key = %point.key, timestamp = point.timestamp, error = %e, "could not send metric");
                    summary.send_failures += 1;
                }
            }
        }
        summary.timestamps += 1;
    }

    debug!(
        timestamps = summary.timestamps,
        sent = summary.points_sent,
        failed = summary.send_failures,
        function = reducer.name(),
        "aggregation pass done"
    );
    Ok(summary)
}
