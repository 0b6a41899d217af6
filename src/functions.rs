//! Aggregation functions.
//!
//! A function reduces the values a group has at one timestamp to a single
//! value. Functions are pure: same input, same output, no outside state. The
//! engine only calls them with at least one value.

use crate::error::ConfigError;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

/// Reduction applied to each group at each timestamp.
pub trait Reducer: Send + Sync {
    /// Name the function is selected by.
    fn name(&self) -> &str;

    /// Reduces a non-empty list of finite values.
    fn reduce(&self, values: &[f64]) -> f64;
}

/// Built-in functions, selectable by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateFunction {
    /// Arithmetic mean
    Avg,
    /// Sum of all values
    Sum,
    /// Smallest value
    Min,
    /// Largest value
    Max,
    /// Last value in input order
    Last,
    /// Number of values present
    Count,
    /// Spread between largest and smallest value
    Delta,
    /// Population standard deviation
    Stdev,
}

impl AggregateFunction {
    pub const ALL: [AggregateFunction; 8] = [
        AggregateFunction::Avg,
        AggregateFunction::Sum,
        AggregateFunction::Min,
        AggregateFunction::Max,
        AggregateFunction::Last,
        AggregateFunction::Count,
        AggregateFunction::Delta,
        AggregateFunction::Stdev,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AggregateFunction::Avg => "avg",
            AggregateFunction::Sum => "sum",
            AggregateFunction::Min => "min",
            AggregateFunction::Max => "max",
            AggregateFunction::Last => "last",
            AggregateFunction::Count => "count",
            AggregateFunction::Delta => "delta",
            AggregateFunction::Stdev => "stdev",
        }
    }

    /// Applies the function to `values`.
    pub fn apply(&self, values: &[f64]) -> f64 {
        match self {
            AggregateFunction::Avg => sum(values) / values.len() as f64,
            AggregateFunction::Sum => sum(values),
            AggregateFunction::Min => values.iter().copied().fold(f64::INFINITY, f64::min),
            AggregateFunction::Max => values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            AggregateFunction::Last => values.last().copied().unwrap_or(f64::NAN),
            AggregateFunction::Count => values.len() as f64,
            AggregateFunction::Delta => {
                AggregateFunction::Max.apply(values) - AggregateFunction::Min.apply(values)
            }
            AggregateFunction::Stdev => {
                let mean = AggregateFunction::Avg.apply(values);
                let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>()
                    / values.len() as f64;
                variance.sqrt()
            }
        }
    }
}

fn sum(values: &[f64]) -> f64 {
    values.iter().sum()
}

impl Reducer for AggregateFunction {
    fn name(&self) -> &str {
        self.as_str()
    }

    fn reduce(&self, values: &[f64]) -> f64 {
        self.apply(values)
    }
}

impl Display for AggregateFunction {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for AggregateFunction {
    type Err = ConfigError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        AggregateFunction::ALL
            .into_iter()
            .find(|f| f.as_str() == name)
            .ok_or_else(|| ConfigError::UnknownFunction {
                name: name.to_string(),
                known: AggregateFunction::ALL
                    .iter()
                    .map(|f| f.as_str())
                    .collect::<Vec<_>>()
                    .join(", "),
            })
    }
}
