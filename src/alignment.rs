//! Sanity checks on a fetched batch.
//!
//! Every series must have as many points as the first one, and start and end
//! at the same timestamps. Interior timestamps are not compared: once counts
//! and both ends agree, all series are assumed to sit on one uniform grid.

use crate::error::{AlignmentError, Edge, EmptyBatch};
use crate::series::{Sample, TimeSeries, Timestamp};

/// The grid shared by a validated batch.
#[derive(Debug, Clone, PartialEq)]
pub struct Alignment {
    pub points: usize,
    pub first: Timestamp,
    pub last: Timestamp,
}

/// Checks that `series` can be walked index by index.
pub fn validate(series: &[TimeSeries]) -> Result<Alignment, AlignmentError> {
    let reference = series
        .first()
        .ok_or(AlignmentError::EmptyBatch(EmptyBatch::NoSeries))?;
    let (first, last) = match (reference.first(), reference.last()) {
        (Some(first), Some(last)) => (first.timestamp(), last.timestamp()),
        _ => return Err(AlignmentError::EmptyBatch(EmptyBatch::NoPoints)),
    };
    let points = reference.len();

    for (i, other) in series.iter().enumerate().skip(1) {
        if other.len() != points {
            return Err(AlignmentError::LengthMismatch {
                reference: reference.target.clone(),
                expected: points,
                position: i + 1,
                series: other.target.clone(),
                actual: other.len(),
            });
        }
        check_edge(Edge::First, reference, first, i, other, other.first())?;
        check_edge(Edge::Last, reference, last, i, other, other.last())?;
    }

    Ok(Alignment {
        points,
        first: first.clone(),
        last: last.clone(),
    })
}

fn check_edge(
    edge: Edge,
    reference: &TimeSeries,
    expected: &Timestamp,
    i: usize,
    other: &TimeSeries,
    sample: Option<&Sample>,
) -> Result<(), AlignmentError> {
    // lengths already match, so `sample` is only None for an empty reference
    match sample {
        Some(sample) if sample.timestamp() == expected => Ok(()),
        Some(sample) => Err(AlignmentError::BoundaryMismatch {
            edge,
            reference: reference.target.clone(),
            expected: expected.to_string(),
            position: i + 1,
            series: other.target.clone(),
            actual: sample.timestamp().to_string(),
        }),
        None => Ok(()),
    }
}
