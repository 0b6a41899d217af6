//! Error taxonomy for a batch run.
//!
//! Every fatal condition surfaces as a [`GabError`], whose [`GabError::exit_code`]
//! is what the binary hands back to the shell. Errors that only affect a single
//! data point ([`SendError`]) are logged by the engine and never reach this type.

use std::fmt::{Display, Formatter};
use thiserror::Error;

/// Configuration problems detected before any network activity.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid regex, can't compile: {0}")]
    Pattern(#[from] regex::Error),

    #[error("invalid output template {template:?}: {reason}")]
    Template { template: String, reason: String },

    #[error("no such aggregation function '{name}' (known: {known})")]
    UnknownFunction { name: String, known: String },

    #[error("can't parse {field} date {value:?}: {source}")]
    Timestamp {
        field: &'static str,
        value: String,
        source: std::num::ParseIntError,
    },

    #[error("invalid carbon address {value:?}: {reason}")]
    CarbonAddress { value: String, reason: String },

    #[error("invalid settings: {0}")]
    Settings(#[from] config::ConfigError),
}

/// Failures talking to the Graphite source.
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("request to graphite failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("graphite answered {status} for {url}")]
    Status {
        url: String,
        status: reqwest::StatusCode,
    },

    #[error("invalid graphite url {url:?}: {reason}")]
    Url { url: String, reason: String },
}

/// A single point could not be delivered to the sink.
#[derive(Error, Debug)]
pub enum SendError {
    #[error("carbon connection failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("carbon did not respond within {0:?}")]
    Timeout(std::time::Duration),
}

/// Which end of a series a boundary check looked at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Edge {
    First,
    Last,
}

impl Display for Edge {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Edge::First => write!(f, "first"),
            Edge::Last => write!(f, "last"),
        }
    }
}

/// Why a run had nothing to aggregate.
///
/// Alignment reports the last two kinds. `NoMatches` is decided before any
/// fetch and only ever reaches callers through `Outcome::NothingToDo`, which
/// carries every kind so the binary reports them the same way.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmptyBatch {
    /// No discovered metric matches the pattern.
    NoMatches,
    /// The source returned no series at all.
    NoSeries,
    /// The reference series has no points.
    NoPoints,
}

impl Display for EmptyBatch {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            EmptyBatch::NoMatches => write!(f, "no metrics match"),
            EmptyBatch::NoSeries => write!(f, "no series"),
            EmptyBatch::NoPoints => write!(f, "first series has no points"),
        }
    }
}

/// Outcome of checking that a batch shares one timestamp grid.
///
/// Series positions are 1-based, as operators read them in the log.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AlignmentError {
    #[error("{0} -> nothing to do")]
    EmptyBatch(EmptyBatch),

    #[error(
        "series 1 ({reference}) has {expected} points, whereas series {position} ({series}) has {actual} datapoints"
    )]
    LengthMismatch {
        reference: String,
        expected: usize,
        position: usize,
        series: String,
        actual: usize,
    },

    #[error(
        "series 1 ({reference}) {edge} point is @ {expected}, whereas series {position} ({series}) is @ {actual}"
    )]
    BoundaryMismatch {
        edge: Edge,
        reference: String,
        expected: String,
        position: usize,
        series: String,
        actual: String,
    },
}

impl AlignmentError {
    /// Empty batches end the run successfully.
    pub fn is_empty_batch(&self) -> bool {
        matches!(self, AlignmentError::EmptyBatch(_))
    }
}

/// Top-level error of a run.
#[derive(Error, Debug)]
pub enum GabError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("could not reach graphite: {0}")]
    Connectivity(#[from] SourceError),

    #[error("can't connect to carbon server {addr}: {source}")]
    Sink { addr: String, source: SendError },

    #[error(transparent)]
    Alignment(#[from] AlignmentError),

    #[error("failed to parse timestamp out of series 1 point #{index}: {timestamp}")]
    MalformedBatch { index: usize, timestamp: String },
}

impl GabError {
    /// Process exit code for this error kind.
    ///
    /// 1 for configuration and connectivity problems, 2 for data consistency
    /// problems. An empty batch is not a failure and maps to 0.
    pub fn exit_code(&self) -> u8 {
        match self {
            GabError::Config(_) | GabError::Connectivity(_) | GabError::Sink { .. } => 1,
            GabError::Alignment(e) if e.is_empty_batch() => 0,
            GabError::Alignment(_) | GabError::MalformedBatch { .. } => 2,
        }
    }
}
