//! Graphite HTTP API client.
//!
//! Discovery uses `/metrics/index.json`, history comes from `/render` with
//! `format=json`.

use crate::aggregator::MetricSource;
use crate::config::GraphiteSettings;
use crate::error::SourceError;
use crate::series::TimeSeries;
use async_trait::async_trait;
use reqwest::{Client, Response, Url};
use std::time::Duration;
use tracing::debug;

pub struct GraphiteClient {
    client: Client,
    base: Url,
}

impl GraphiteClient {
    pub fn new(url: &str, settings: &GraphiteSettings) -> Result<Self, SourceError> {
        let base = Self::parse_base(url)?;
        let client = Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()?;
        Ok(Self { client, base })
    }

    fn parse_base(url: &str) -> Result<Url, SourceError> {
        let invalid = |reason: String| SourceError::Url {
            url: url.to_string(),
            reason,
        };

        // a trailing slash makes `join` append instead of replacing the last segment
        let normalized = format!("{}/", url.trim_end_matches('/'));
        let base = Url::parse(&normalized).map_err(|e| invalid(e.to_string()))?;
        match base.scheme() {
            "http" | "https" => Ok(base),
            other => Err(invalid(format!("unsupported scheme {:?}", other))),
        }
    }

    fn endpoint(&self, path: &str) -> Result<Url, SourceError> {
        self.base.join(path).map_err(|e| SourceError::Url {
            url: self.base.to_string(),
            reason: e.to_string(),
        })
    }

    /// Form fields for a render request.
    fn render_form(targets: &[String], from: i64, until: i64) -> Vec<(&'static str, String)> {
        let mut form: Vec<(&'static str, String)> = targets
            .iter()
            .map(|target| ("target", target.clone()))
            .collect();
        form.push(("from", from.to_string()));
        form.push(("until", until.to_string()));
        form.push(("format", "json".to_string()));
        form
    }

    fn check_status(url: &Url, response: Response) -> Result<Response, SourceError> {
        let status = response.status();
        if status.is_success() {
            Ok(response)
        } else {
            Err(SourceError::Status {
                url: url.to_string(),
                status,
            })
        }
    }
}

#[async_trait]
impl MetricSource for GraphiteClient {
    async fn list_metrics(&self) -> Result<Vec<String>, SourceError> {
        let url = self.endpoint("metrics/index.json")?;
        debug!(%url, "listing metrics");
        let response = self.client.get(url.clone()).send().await?;
        let metrics = Self::check_status(&url, response)?.json::<Vec<String>>().await?;
        Ok(metrics)
    }

    async fn query(&self, targets: &[String], from: i64, until: i64) -> Result<Vec<TimeSeries>, SourceError> {
        let url = self.endpoint("render")?;
        debug!(%url, targets = targets.len(), from, until, "rendering series");
        let response = self
            .client
            .post(url.clone())
            .form(&Self::render_form(targets, from, until))
            .send()
            .await?;
        let series = Self::check_status(&url, response)?.json::<Vec<TimeSeries>>().await?;
        Ok(series)
    }
}
