//! gab command-line entry point.
//!
//! ```text
//! gab [--config FILE] <graphite> <carbon> <regex> <out> <func> <from> <to>
//!     graphite: http://mygraphiteserver
//!     carbon:   yourcarbonhost:2003
//!     regex:    regex to match incoming metrics
//!     out:      pattern to construct outgoing metric
//!     func:     function to use: avg, sum, min, max, last, count, delta, stdev
//!     from:     from unix timestamp (empty: 0)
//!     to:       to unix timestamp (empty: now)
//! ```
//!
//! # Exit codes
//!
//! - `0`: success, or nothing to do
//! - `1`: bad arguments or settings, graphite or carbon unreachable
//! - `2`: inconsistent data (misaligned series, unparsable timestamp)
//!
//! # Example
//!
//! ```bash
//! # average cpu per datacenter over one day
//! gab http://graphite.local carbon.local:2003 \
//!   '^servers\.(\w+)\.\w+\.cpu$' 'dc.$1.cpu.avg' avg 1700000000 1700086400
//!
//! # everything up to now, with a longer HTTP timeout
//! GAB_GRAPHITE__TIMEOUT_SECS=300 gab http://graphite.local carbon.local \
//!   '^app\.(?P<svc>\w+)\.requests$' 'total.${svc}.requests' sum '' ''
//! ```

use clap::Parser;
use gab::config::LogSettings;
use gab::{Aggregator, CarbonClient, CliArgs, GabError, GraphiteClient, Outcome, Plan, Settings};
use std::process::ExitCode;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    dotenv::dotenv().ok();

    let cli = match CliArgs::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            // help and version go to stdout and are not errors
            let code = if e.use_stderr() { 1 } else { 0 };
            let _ = e.print();
            return ExitCode::from(code);
        }
    };

    let settings = match Settings::new(cli.config.as_deref()) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("{}", e);
            return ExitCode::from(GabError::from(e).exit_code());
        }
    };
    init_tracing(&settings.log);

    match run(cli, settings).await {
        Ok(Outcome::Completed(summary)) => {
            info!(
                sent = summary.points_sent,
                failed = summary.send_failures,
                "finished"
            );
            ExitCode::SUCCESS
        }
        Ok(Outcome::NothingToDo(reason)) => {
            info!(%reason, "nothing to do");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, "run failed");
            ExitCode::from(e.exit_code())
        }
    }
}

fn init_tracing(log: &LogSettings) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&log.filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn describe(secs: i64) -> String {
    chrono::DateTime::<chrono::Utc>::from_timestamp(secs, 0).map_or_else(|| secs.to_string(), |t| t.to_rfc3339())
}

async fn run(cli: CliArgs, settings: Settings) -> Result<Outcome, GabError> {
    let plan = Plan::from_args(&cli, &settings, chrono::Utc::now().timestamp())?;
    info!(
        from = %describe(plan.from),
        until = %describe(plan.until),
        function = %plan.function,
        "window"
    );

    let source = GraphiteClient::new(&plan.graphite, &settings.graphite)?;
    let sink = CarbonClient::connect(&plan.carbon, Duration::from_secs(settings.carbon.timeout_secs))
        .await
        .map_err(|source| GabError::Sink {
            addr: plan.carbon.to_string(),
            source,
        })?;

    let aggregator = Aggregator::new(
        Box::new(source),
        Box::new(sink),
        plan.grouping,
        Box::new(plan.function),
    )
    .with_precision(settings.output.precision);

    aggregator.process(plan.from, plan.until).await
}
