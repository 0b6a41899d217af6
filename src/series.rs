//! Series as returned by the Graphite render API.
//!
//! A render response is a list of `{ "target": ..., "datapoints": [[value, ts], ...] }`
//! objects. Values are numbers or `null` for "no data"; some Graphite versions
//! send them as strings, which are accepted too.

use serde::{Deserialize, Deserializer};
use std::fmt::{Display, Formatter};

/// One sample's value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SampleValue {
    Present(f64),
    /// No data recorded at this timestamp. Not the same as zero.
    Absent,
}

impl SampleValue {
    pub fn value(&self) -> Option<f64> {
        match *self {
            SampleValue::Present(v) => Some(v),
            SampleValue::Absent => None,
        }
    }

    fn from_f64(v: f64) -> Self {
        if v.is_finite() {
            SampleValue::Present(v)
        } else {
            SampleValue::Absent
        }
    }
}

impl From<Option<f64>> for SampleValue {
    fn from(value: Option<f64>) -> Self {
        value.map_or(SampleValue::Absent, SampleValue::from_f64)
    }
}

impl<'de> Deserialize<'de> for SampleValue {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Number(f64),
            Text(String),
        }

        Ok(match Option::<Raw>::deserialize(deserializer)? {
            Some(Raw::Number(v)) => SampleValue::from_f64(v),
            Some(Raw::Text(text)) => text
                .trim()
                .parse::<f64>()
                .map_or(SampleValue::Absent, SampleValue::from_f64),
            None => SampleValue::Absent,
        })
    }
}

/// A sample timestamp exactly as the source sent it.
///
/// Boundary checks compare the raw numbers; the value is only read as Unix
/// seconds when a point is emitted.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(serde_json::Number);

impl Timestamp {
    /// Unix seconds, if the raw value is an integer that fits.
    pub fn as_unix(&self) -> Option<i64> {
        self.0.as_i64()
    }
}

impl From<i64> for Timestamp {
    fn from(secs: i64) -> Self {
        Timestamp(serde_json::Number::from(secs))
    }
}

impl Display for Timestamp {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Sample(pub SampleValue, pub Timestamp);

impl Sample {
    pub fn value(&self) -> SampleValue {
        self.0
    }

    pub fn timestamp(&self) -> &Timestamp {
        &self.1
    }
}

/// The samples of one source metric over the requested window.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TimeSeries {
    pub target: String,
    pub datapoints: Vec<Sample>,
}

impl TimeSeries {
    /// Builds a series from `(value, unix seconds)` pairs.
    pub fn from_points<S, I>(target: S, points: I) -> Self
    where
        S: Into<String>,
        I: IntoIterator<Item = (Option<f64>, i64)>,
    {
        Self {
            target: target.into(),
            datapoints: points
                .into_iter()
                .map(|(value, ts)| Sample(value.into(), ts.into()))
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.datapoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.datapoints.is_empty()
    }

    pub fn first(&self) -> Option<&Sample> {
        self.datapoints.first()
    }

    pub fn last(&self) -> Option<&Sample> {
        self.datapoints.last()
    }
}
