#[cfg(test)]
mod tests {
    use crate::aggregator::{Aggregator, MetricSink, MetricSource, Outcome};
    use crate::catalog::Grouping;
    use crate::error::{AlignmentError, EmptyBatch, GabError, SendError, SourceError};
    use crate::functions::AggregateFunction;
    use crate::series::TimeSeries;
    use async_trait::async_trait;
    use mockall::*;
    use std::sync::{Arc, Mutex};

    mock! {
        pub Source {}
        #[async_trait]
        impl MetricSource for Source {
            async fn list_metrics(&self) -> Result<Vec<String>, SourceError>;
            async fn query(&self, targets: &[String], from: i64, until: i64) -> Result<Vec<TimeSeries>, SourceError>;
        }
    }

    mock! {
        pub Sink {}
        #[async_trait]
        impl MetricSink for Sink {
            async fn send(&self, key: &str, value: &str, timestamp: i64) -> Result<(), SendError>;
        }
    }

    type Sent = Arc<Mutex<Vec<(String, String, i64)>>>;

    /// Keeps every line it is given.
    struct RecordingSink {
        sent: Sent,
    }

    #[async_trait]
    impl MetricSink for RecordingSink {
        async fn send(&self, key: &str, value: &str, timestamp: i64) -> Result<(), SendError> {
            self.sent
                .lock()
                .unwrap()
                .push((key.to_string(), value.to_string(), timestamp));
            Ok(())
        }
    }

    const CPU_PATTERN: &str = r"^host\.(\w+)\.cpu$";

    fn names(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    fn source(known: Vec<String>, batch: Vec<TimeSeries>) -> MockSource {
        let mut source = MockSource::new();
        source
            .expect_list_metrics()
            .times(1)
            .return_once(move || Ok(known));
        source
            .expect_query()
            .times(1)
            .returning(move |_, _, _| Ok(batch.clone()));
        source
    }

    fn recording() -> (RecordingSink, Sent) {
        let sent: Sent = Arc::new(Mutex::new(Vec::new()));
        (RecordingSink { sent: sent.clone() }, sent)
    }

    fn aggregator(
        source: impl MetricSource + 'static,
        sink: impl MetricSink + 'static,
        template: &str,
        function: AggregateFunction,
    ) -> Aggregator {
        Aggregator::new(
            Box::new(source),
            Box::new(sink),
            Grouping::new(CPU_PATTERN, template).unwrap(),
            Box::new(function),
        )
    }

    fn sorted(sent: &Sent) -> Vec<(String, String, i64)> {
        let mut lines = sent.lock().unwrap().clone();
        lines.sort();
        lines
    }

    #[tokio::test]
    async fn test_mean_of_two_hosts() {
        let batch = vec![
            TimeSeries::from_points("host.a.cpu", vec![(Some(10.0), 100)]),
            TimeSeries::from_points("host.b.cpu", vec![(Some(20.0), 100)]),
        ];
        let mut sink = MockSink::new();
        sink.expect_send()
            .withf(|key, value, timestamp| key == "hosts.cpu" && value == "15.000000" && *timestamp == 100)
            .times(1)
            .returning(|_, _, _| Ok(()));

        let aggregator = aggregator(
            source(names(&["host.a.cpu", "host.b.cpu", "host.a.mem"]), batch),
            sink,
            "hosts.cpu",
            AggregateFunction::Avg,
        );

        match aggregator.process(0, 100).await.unwrap() {
            Outcome::Completed(summary) => {
                assert_eq!(summary.points_sent, 1);
                assert_eq!(summary.send_failures, 0);
                assert_eq!(summary.timestamps, 1);
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_per_host_template_keeps_hosts_apart() {
        let batch = vec![
            TimeSeries::from_points("host.a.cpu", vec![(Some(10.0), 100)]),
            TimeSeries::from_points("host.b.cpu", vec![(Some(20.0), 100)]),
        ];
        let (sink, sent) = recording();
        let aggregator = aggregator(
            source(names(&["host.a.cpu", "host.b.cpu"]), batch),
            sink,
            "cpu.$1",
            AggregateFunction::Avg,
        );

        aggregator.process(0, 100).await.unwrap();
        assert_eq!(
            sorted(&sent),
            vec![
                ("cpu.a".to_string(), "10.000000".to_string(), 100),
                ("cpu.b".to_string(), "20.000000".to_string(), 100),
            ]
        );
    }

    #[tokio::test]
    async fn test_absent_samples() {
        // host.b.cpu has no data at 100, host.a.cpu has none at 200
        let batch = vec![
            TimeSeries::from_points("host.a.cpu", vec![(Some(10.0), 100), (None, 200)]),
            TimeSeries::from_points("host.b.cpu", vec![(None, 100), (Some(30.0), 200)]),
        ];
        let (sink, sent) = recording();
        let aggregator = aggregator(
            source(names(&["host.a.cpu", "host.b.cpu"]), batch),
            sink,
            "hosts.cpu",
            AggregateFunction::Avg,
        );

        aggregator.process(0, 200).await.unwrap();
        assert_eq!(
            sorted(&sent),
            vec![
                ("hosts.cpu".to_string(), "10.000000".to_string(), 100),
                ("hosts.cpu".to_string(), "30.000000".to_string(), 200),
            ]
        );
    }

    #[tokio::test]
    async fn test_all_absent_timestamp_is_skipped() {
        let batch = vec![
            TimeSeries::from_points("host.a.cpu", vec![(Some(10.0), 100), (None, 200)]),
            TimeSeries::from_points("host.b.cpu", vec![(None, 100), (None, 200)]),
        ];
        let (sink, sent) = recording();
        let aggregator = aggregator(
            source(names(&["host.a.cpu", "host.b.cpu"]), batch),
            sink,
            "hosts.cpu",
            AggregateFunction::Sum,
        );

        match aggregator.process(0, 200).await.unwrap() {
            Outcome::Completed(summary) => {
                assert_eq!(summary.timestamps, 2);
                assert_eq!(summary.points_sent, 1);
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert_eq!(sorted(&sent), vec![("hosts.cpu".to_string(), "10.000000".to_string(), 100)]);
    }

    #[tokio::test]
    async fn test_series_order_does_not_matter() {
        let batch = vec![
            TimeSeries::from_points("host.b.cpu", vec![(Some(2.0), 100)]),
            TimeSeries::from_points("host.a.cpu", vec![(Some(1.0), 100)]),
        ];
        let (sink, sent) = recording();
        let aggregator = aggregator(
            source(names(&["host.a.cpu", "host.b.cpu"]), batch),
            sink,
            "$1",
            AggregateFunction::Sum,
        );

        aggregator.process(0, 100).await.unwrap();
        assert_eq!(
            sorted(&sent),
            vec![
                ("a".to_string(), "1.000000".to_string(), 100),
                ("b".to_string(), "2.000000".to_string(), 100),
            ]
        );
    }

    #[tokio::test]
    async fn test_requests_only_matching_metrics() {
        let mut source = MockSource::new();
        source
            .expect_list_metrics()
            .times(1)
            .return_once(|| Ok(names(&["host.b.cpu", "host.a.cpu", "host.a.mem", "other"])));
        source
            .expect_query()
            .withf(|targets, from, until| {
                targets == ["host.a.cpu".to_string(), "host.b.cpu".to_string()] && *from == 10 && *until == 20
            })
            .times(1)
            .returning(|_, _, _| Ok(Vec::new()));

        let aggregator = aggregator(source, MockSink::new(), "$1", AggregateFunction::Avg);
        assert_eq!(
            aggregator.process(10, 20).await.unwrap(),
            Outcome::NothingToDo(EmptyBatch::NoSeries)
        );
    }

    #[tokio::test]
    async fn test_no_matches_skips_query() {
        let mut source = MockSource::new();
        source
            .expect_list_metrics()
            .times(1)
            .return_once(|| Ok(names(&["disk.used", "mem.free"])));
        source.expect_query().never();

        let aggregator = aggregator(source, MockSink::new(), "$1", AggregateFunction::Avg);
        assert_eq!(
            aggregator.process(0, 100).await.unwrap(),
            Outcome::NothingToDo(EmptyBatch::NoMatches)
        );
    }

    #[tokio::test]
    async fn test_empty_reference_series() {
        let batch = vec![
            TimeSeries::from_points("host.a.cpu", Vec::new()),
            TimeSeries::from_points("host.b.cpu", vec![(Some(1.0), 100)]),
        ];
        let aggregator = aggregator(
            source(names(&["host.a.cpu", "host.b.cpu"]), batch),
            MockSink::new(),
            "$1",
            AggregateFunction::Avg,
        );
        assert_eq!(
            aggregator.process(0, 100).await.unwrap(),
            Outcome::NothingToDo(EmptyBatch::NoPoints)
        );
    }

    #[tokio::test]
    async fn test_length_mismatch_aborts_before_sending() {
        let a: Vec<(Option<f64>, i64)> = (0..10).map(|i| (Some(1.0), 100 + 60 * i)).collect();
        let b: Vec<(Option<f64>, i64)> = (0..9).map(|i| (Some(1.0), 100 + 60 * i)).collect();
        let batch = vec![
            TimeSeries::from_points("host.a.cpu", a),
            TimeSeries::from_points("host.b.cpu", b),
        ];
        let mut sink = MockSink::new();
        sink.expect_send().never();

        let aggregator = aggregator(
            source(names(&["host.a.cpu", "host.b.cpu"]), batch),
            sink,
            "hosts.cpu",
            AggregateFunction::Avg,
        );

        let err = aggregator.process(0, 1000).await.unwrap_err();
        assert_eq!(err.exit_code(), 2);
        match err {
            GabError::Alignment(AlignmentError::LengthMismatch { expected, actual, .. }) => {
                assert_eq!(expected, 10);
                assert_eq!(actual, 9);
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_boundary_mismatch_aborts_before_sending() {
        let batch = vec![
            TimeSeries::from_points("host.a.cpu", vec![(Some(1.0), 100), (Some(2.0), 160)]),
            TimeSeries::from_points("host.b.cpu", vec![(Some(1.0), 100), (Some(2.0), 170)]),
        ];
        let mut sink = MockSink::new();
        sink.expect_send().never();

        let aggregator = aggregator(
            source(names(&["host.a.cpu", "host.b.cpu"]), batch),
            sink,
            "hosts.cpu",
            AggregateFunction::Avg,
        );

        let err = aggregator.process(0, 200).await.unwrap_err();
        assert!(matches!(
            err,
            GabError::Alignment(AlignmentError::BoundaryMismatch { .. })
        ));
        assert_eq!(err.exit_code(), 2);
    }

    #[tokio::test]
    async fn test_malformed_timestamp_is_fatal() {
        let batch: Vec<TimeSeries> = serde_json::from_str(
            r#"[{"target": "host.a.cpu", "datapoints": [[1, 100], [2, 160.5], [3, 220]]},
                {"target": "host.b.cpu", "datapoints": [[1, 100], [2, 160.5], [3, 220]]}]"#,
        )
        .unwrap();
        let (sink, sent) = recording();
        let aggregator = aggregator(
            source(names(&["host.a.cpu", "host.b.cpu"]), batch),
            sink,
            "hosts.cpu",
            AggregateFunction::Sum,
        );

        let err = aggregator.process(0, 220).await.unwrap_err();
        assert!(matches!(err, GabError::MalformedBatch { index: 1, .. }));
        assert_eq!(err.exit_code(), 2);
        // the run stops at the bad point
        assert_eq!(sorted(&sent), vec![("hosts.cpu".to_string(), "2.000000".to_string(), 100)]);
    }

    #[tokio::test]
    async fn test_send_failure_does_not_stop_the_run() {
        let batch = vec![
            TimeSeries::from_points("host.a.cpu", vec![(Some(1.0), 100), (Some(3.0), 160)]),
            TimeSeries::from_points("host.b.cpu", vec![(Some(2.0), 100), (Some(4.0), 160)]),
        ];
        let mut sink = MockSink::new();
        sink.expect_send()
            .withf(|key, _, _| key == "a")
            .times(2)
            .returning(|_, _, _| {
                Err(SendError::Io(std::io::Error::new(
                    std::io::ErrorKind::BrokenPipe,
                    "broken pipe",
                )))
            });
        sink.expect_send()
            .withf(|key, _, _| key == "b")
            .times(2)
            .returning(|_, _, _| Ok(()));

        let aggregator = aggregator(
            source(names(&["host.a.cpu", "host.b.cpu"]), batch),
            sink,
            "$1",
            AggregateFunction::Avg,
        );

        match aggregator.process(0, 160).await.unwrap() {
            Outcome::Completed(summary) => {
                assert_eq!(summary.points_sent, 2);
                assert_eq!(summary.send_failures, 2);
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_discovery_failure() {
        let mut source = MockSource::new();
        source.expect_list_metrics().times(1).return_once(|| {
            Err(SourceError::Status {
                url: "http://graphite.local/metrics/index.json".to_string(),
                status: reqwest::StatusCode::BAD_GATEWAY,
            })
        });
        source.expect_query().never();

        let aggregator = aggregator(source, MockSink::new(), "$1", AggregateFunction::Avg);
        let err = aggregator.process(0, 100).await.unwrap_err();
        assert!(matches!(err, GabError::Connectivity(_)));
        assert_eq!(err.exit_code(), 1);
    }

    #[tokio::test]
    async fn test_query_failure() {
        let mut source = MockSource::new();
        source
            .expect_list_metrics()
            .times(1)
            .return_once(|| Ok(names(&["host.a.cpu"])));
        source.expect_query().times(1).returning(|_, _, _| {
            Err(SourceError::Url {
                url: "graphite".to_string(),
                reason: "relative URL without a base".to_string(),
            })
        });

        let aggregator = aggregator(source, MockSink::new(), "$1", AggregateFunction::Avg);
        assert_eq!(aggregator.process(0, 100).await.unwrap_err().exit_code(), 1);
    }

    #[tokio::test]
    async fn test_runs_are_repeatable() {
        let batch = vec![
            TimeSeries::from_points("host.a.cpu", vec![(Some(1.5), 100), (None, 160), (Some(7.0), 220)]),
            TimeSeries::from_points("host.b.cpu", vec![(Some(2.5), 100), (Some(3.0), 160), (None, 220)]),
            TimeSeries::from_points("host.c.cpu", vec![(None, 100), (Some(9.0), 160), (Some(1.0), 220)]),
        ];
        let mut source = MockSource::new();
        source
            .expect_list_metrics()
            .times(1)
            .return_once(|| Ok(names(&["host.a.cpu", "host.b.cpu", "host.c.cpu"])));
        source
            .expect_query()
            .times(2)
            .returning(move |_, _, _| Ok(batch.clone()));

        let (sink, sent) = recording();
        let aggregator = Aggregator::new(
            Box::new(source),
            Box::new(sink),
            Grouping::new(r"^host\.(\w+)\.(cpu)$", "$2").unwrap(),
            Box::new(AggregateFunction::Stdev),
        );

        let catalog = aggregator.discover().await.unwrap();
        aggregator.run(&catalog, 0, 220).await.unwrap();
        let first = sorted(&sent);
        sent.lock().unwrap().clear();
        aggregator.run(&catalog, 0, 220).await.unwrap();
        let second = sorted(&sent);

        assert_eq!(first.len(), 3);
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_precision() {
        let batch = vec![TimeSeries::from_points("host.a.cpu", vec![(Some(2.0 / 3.0), 100)])];
        let (sink, sent) = recording();
        let aggregator = aggregator(
            source(names(&["host.a.cpu"]), batch),
            sink,
            "$1",
            AggregateFunction::Avg,
        )
        .with_precision(2);

        aggregator.process(0, 100).await.unwrap();
        assert_eq!(sorted(&sent), vec![("a".to_string(), "0.67".to_string(), 100)]);
    }
}
