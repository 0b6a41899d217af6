//! The run context.
//!
//! [`Aggregator`] ties a [`MetricSource`] to a [`MetricSink`]. One run groups
//! the discovered names and fetches the whole window in a single query. Points
//! are only sent once the batch passes alignment.

use crate::alignment::validate;
use crate::catalog::{Catalog, Grouping};
use crate::engine::{self, RunSummary};
use crate::error::{AlignmentError, EmptyBatch, GabError, SendError, SourceError};
use crate::functions::Reducer;
use crate::series::TimeSeries;
use async_trait::async_trait;
use tracing::{error, info};

/// Where metric names and their history come from.
#[async_trait]
pub trait MetricSource: Send + Sync {
    /// Every metric name the source knows about.
    async fn list_metrics(&self) -> Result<Vec<String>, SourceError>;

    /// One series per target covering `[from, until]`, in any order.
    async fn query(&self, targets: &[String], from: i64, until: i64) -> Result<Vec<TimeSeries>, SourceError>;
}

/// Where aggregated points go.
#[async_trait]
pub trait MetricSink: Send + Sync {
    async fn send(&self, key: &str, value: &str, timestamp: i64) -> Result<(), SendError>;
}

/// How a run ended, when it did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Completed(RunSummary),
    NothingToDo(EmptyBatch),
}

/// Everything one batch run needs: the collaborators, the grouping, and the
/// function to reduce with.
pub struct Aggregator {
    source: Box<dyn MetricSource>,
    sink: Box<dyn MetricSink>,
    grouping: Grouping,
    reducer: Box<dyn Reducer>,
    precision: usize,
}

impl Aggregator {
    pub const DEFAULT_PRECISION: usize = 6;

    pub fn new(
        source: Box<dyn MetricSource>,
        sink: Box<dyn MetricSink>,
        grouping: Grouping,
        reducer: Box<dyn Reducer>,
    ) -> Self {
        Self {
            source,
            sink,
            grouping,
            reducer,
            precision: Self::DEFAULT_PRECISION,
        }
    }

    /// Decimals used when formatting values for the sink.
    pub fn with_precision(mut self, precision: usize) -> Self {
        self.precision = precision;
        self
    }

    /// Lists the source's metrics and groups the ones that match.
    pub async fn discover(&self) -> Result<Catalog, GabError> {
        info!("querying graphite for metrics..");
        let names = self.source.list_metrics().await?;

        info!(known = names.len(), "figuring out which metrics match");
        let catalog = self.grouping.catalog(&names);
        info!(
            matched = catalog.source_metric_names().len(),
            groups = catalog.len(),
            "catalog built"
        );
        Ok(catalog)
    }

    /// Fetches `[from, until]` for the catalog's metrics, checks the batch and
    /// aggregates it.
    pub async fn run(&self, catalog: &Catalog, from: i64, until: i64) -> Result<Outcome, GabError> {
        if catalog.is_empty() {
            info!("no metrics match -> nothing to do");
            return Ok(Outcome::NothingToDo(EmptyBatch::NoMatches));
        }

        let targets = catalog.source_metric_names();
        info!(targets = targets.len(), from, until, "requesting metrics");
        let series = self.source.query(&targets, from, until).await?;
        info!(series = series.len(), "response received");

        let alignment = match validate(&series) {
            Ok(alignment) => alignment,
            Err(AlignmentError::EmptyBatch(reason)) => {
                info!(%reason, "nothing to do");
                return Ok(Outcome::NothingToDo(reason));
            }
            Err(e) => {
                error!(from, until, error = %e, "series are not aligned");
                return Err(e.into());
            }
        };
        info!(
            points = alignment.points,
            first = %alignment.first,
            last = %alignment.last,
            function = self.reducer.name(),
            "aggregating"
        );

        let summary = engine::aggregate(
            catalog,
            &series,
            self.reducer.as_ref(),
            self.sink.as_ref(),
            self.precision,
        )
        .await?;

        info!(
            sent = summary.points_sent,
            failed = summary.send_failures,
            timestamps = summary.timestamps,
            "done"
        );
        Ok(Outcome::Completed(summary))
    }

    /// Discovery followed by a run over `[from, until]`.
    pub async fn process(&self, from: i64, until: i64) -> Result<Outcome, GabError> {
        let catalog = self.discover().await?;
        self.run(&catalog, from, until).await
    }
}
