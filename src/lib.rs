//! gab: batch aggregation of historical Graphite series.
//!
//! gab lists every metric a Graphite server knows, picks the ones matching a
//! regex, and groups them by an output name built from the regex's capture
//! groups. It then fetches the whole time window in one render call, checks
//! that all series share one timestamp grid, reduces each group to one value
//! per timestamp and writes the results to Carbon.
//!
//! Samples without data are left out of a group's reduction rather than
//! counted as zero; a group with no data at a timestamp produces no point.
//!
//! # Example
//!
//! ```rust,no_run
//! use gab::{Aggregator, AggregateFunction, CarbonAddress, CarbonClient, GraphiteClient, Grouping, Settings};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let settings = Settings::new(None)?;
//!
//!     let source = GraphiteClient::new("http://graphite.local", &settings.graphite)?;
//!     let carbon = CarbonAddress::parse("carbon.local", settings.carbon.default_port)?;
//!     let sink = CarbonClient::connect(&carbon, Duration::from_secs(settings.carbon.timeout_secs)).await?;
//!
//!     let aggregator = Aggregator::new(
//!         Box::new(source),
//!         Box::new(sink),
//!         Grouping::new(r"^servers\.(\w+)\.\w+\.cpu$", "dc.$1.cpu.avg")?,
//!         Box::new(AggregateFunction::Avg),
//!     );
//!
//!     let outcome = aggregator.process(1_700_000_000, 1_700_086_400).await?;
//!     println!("{:?}", outcome);
//!     Ok(())
//! }
//! ```

pub mod aggregator;
pub mod alignment;
pub mod carbon;
pub mod catalog;
pub mod config;
pub mod engine;
pub mod error;
pub mod functions;
pub mod graphite;
pub mod series;
pub mod template;
pub mod tests;

pub use aggregator::{Aggregator, MetricSink, MetricSource, Outcome};
pub use alignment::{validate, Alignment};
pub use carbon::CarbonClient;
pub use catalog::{Catalog, Group, Grouping};
pub use config::{CarbonAddress, CliArgs, Plan, Settings};
pub use engine::{OutputPoint, RunSummary};
pub use error::{AlignmentError, ConfigError, GabError, SendError, SourceError};
pub use functions::{AggregateFunction, Reducer};
pub use graphite::GraphiteClient;
pub use series::{Sample, SampleValue, TimeSeries, Timestamp};
pub use template::Template;
