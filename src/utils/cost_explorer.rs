use chrono::NaiveDate;
use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::collections::HashMap;
use thiserror::Error;

use super::anomaly::{FeedbackAction, RootCause};

const TARGET_PREFIX: &str = "AWSInsightsIndexService";
const AMZ_JSON: &str = "application/x-amz-json-1.1";
const COST_METRIC: &str = "NetUnblendedCost";

#[derive(Debug, Error)]
pub enum CostExplorerError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    /// An error body returned by the service, e.g. `LimitExceededException`.
    #[error("Cost Explorer error {code}: {message}")]
    Api { code: String, message: String },
    #[error("{0} not found in result")]
    MissingMetric(String),
    #[error("Invalid cost amount: {0}")]
    InvalidAmount(String),
    #[error("Invalid result date: {0}")]
    InvalidDate(String),
}

/// Cost Explorer dimension keys used to filter and group costs.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Dimension {
    RecordType,
    LinkedAccount,
    Region,
    Service,
    UsageType,
}

impl Dimension {
    pub fn key(&self) -> &'static str {
        match self {
            Self::RecordType => "RECORD_TYPE",
            Self::LinkedAccount => "LINKED_ACCOUNT",
            Self::Region => "REGION",
            Self::Service => "SERVICE",
            Self::UsageType => "USAGE_TYPE",
        }
    }
}

/// A daily cost query. `end` is exclusive, as Cost Explorer expects.
#[derive(Clone, Debug, PartialEq)]
pub struct CostQuery {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub filters: Vec<(Dimension, String)>,
    pub group_by: Option<Dimension>,
}

impl CostQuery {
    /// Usage costs narrowed to whatever the root cause names.
    pub fn for_root_cause(start: NaiveDate, end: NaiveDate, cause: &RootCause) -> Self {
        let mut filters = vec![(Dimension::RecordType, "Usage".to_string())];
        let fields = [
            (Dimension::LinkedAccount, &cause.linked_account),
            (Dimension::Region, &cause.region),
            (Dimension::Service, &cause.service),
            (Dimension::UsageType, &cause.usage_type),
        ];
        for (dimension, value) in fields {
            if let Some(value) = value {
                filters.push((dimension, value.clone()));
            }
        }

        Self {
            start,
            end,
            filters,
            group_by: cause
                .linked_account
                .is_none()
                .then_some(Dimension::LinkedAccount),
        }
    }

    fn filter_expression(&self) -> Value {
        let mut expressions: Vec<Value> = self
            .filters
            .iter()
            .map(|(dimension, value)| {
                json!({ "Dimensions": { "Key": dimension.key(), "Values": [value] } })
            })
            .collect();

        //? Cost Explorer rejects an `And` with a single operand.
        if expressions.len() == 1 {
            expressions.remove(0)
        } else {
            json!({ "And": expressions })
        }
    }

    fn request_body(&self, next_page_token: Option<&str>) -> Value {
        let mut body = json!({
            "TimePeriod": {
                "Start": self.start.format("%Y-%m-%d").to_string(),
                "End": self.end.format("%Y-%m-%d").to_string(),
            },
            "Granularity": "DAILY",
            "Metrics": [COST_METRIC],
            "Filter": self.filter_expression(),
            "GroupBy": self
                .group_by
                .iter()
                .map(|d| json!({ "Type": "DIMENSION", "Key": d.key() }))
                .collect::<Vec<_>>(),
        });
        if let Some(token) = next_page_token {
            body["NextPageToken"] = json!(token);
        }
        body
    }
}

/// One day of cost for one series.
#[derive(Clone, Debug, PartialEq)]
pub struct CostSample {
    pub date: NaiveDate,
    pub cost: f64,
    pub unit: String,
    /// The group key for grouped queries, `None` for totals.
    pub label: Option<String>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "PascalCase")]
struct GetCostAndUsageResponse {
    #[serde(default)]
    results_by_time: Vec<ResultByTime>,
    #[serde(default)]
    next_page_token: Option<String>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "PascalCase")]
struct ResultByTime {
    time_period: DateInterval,
    #[serde(default)]
    total: HashMap<String, MetricValue>,
    #[serde(default)]
    groups: Vec<Group>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "PascalCase")]
struct DateInterval {
    start: String,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "PascalCase")]
struct Group {
    #[serde(default)]
    keys: Vec<String>,
    #[serde(default)]
    metrics: HashMap<String, MetricValue>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "PascalCase")]
struct MetricValue {
    amount: String,
    #[serde(default)]
    unit: String,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct ProvideAnomalyFeedbackRequest<'a> {
    anomaly_id: &'a str,
    feedback: &'a str,
}

#[derive(Deserialize, Debug)]
struct ApiErrorBody {
    #[serde(rename = "__type", default)]
    kind: String,
    #[serde(alias = "Message", default)]
    message: String,
}

impl MetricValue {
    fn amount(&self) -> Result<f64, CostExplorerError> {
        self.amount
            .parse()
            .map_err(|_| CostExplorerError::InvalidAmount(self.amount.clone()))
    }
}

/// Cost Explorer over its JSON protocol.
///
/// The endpoint is expected to sign requests on our behalf (a SigV4 proxy),
/// so this client only speaks the wire format.
#[derive(Debug, Clone)]
pub struct CostExplorer {
    http_client: Client,
    endpoint: Url,
}

impl CostExplorer {
    pub fn new(endpoint: &str) -> Result<Self, CostExplorerError> {
        Ok(CostExplorer {
            http_client: Client::new(),
            endpoint: Url::parse(endpoint)?,
        })
    }

    async fn call<T: serde::de::DeserializeOwned>(
        &self,
        operation: &str,
        body: &impl Serialize,
    ) -> Result<T, CostExplorerError> {
        let res = self
            .http_client
            .post(self.endpoint.clone())
            .header("X-Amz-Target", format!("{TARGET_PREFIX}.{operation}"))
            .header(reqwest::header::CONTENT_TYPE, AMZ_JSON)
            .body(serde_json::to_vec(body)?)
            .send()
            .await?;

        if !res.status().is_success() {
            let status = res.status();
            let err: ApiErrorBody = res.json().await.unwrap_or(ApiErrorBody {
                kind: status.to_string(),
                message: String::new(),
            });
            let code = err.kind.rsplit('#').next().unwrap_or_default().to_string();
            tracing::warn!("[CE] {} failed: {} {}", operation, code, err.message);
            return Err(CostExplorerError::Api {
                code,
                message: err.message,
            });
        }

        Ok(res.json().await?)
    }

    /// Fetches every page of daily costs for `query`.
    pub async fn get_cost_and_usage(
        &self,
        query: &CostQuery,
    ) -> Result<Vec<CostSample>, CostExplorerError> {
        let mut samples = Vec::new();
        let mut next_page_token: Option<String> = None;
        let mut page = 0;

        loop {
            let body = query.request_body(next_page_token.as_deref());
            let out: GetCostAndUsageResponse = self.call("GetCostAndUsage", &body).await?;
            page += 1;
            tracing::debug!(
                "[CE] GetCostAndUsage page {} returned {} results",
                page,
                out.results_by_time.len()
            );

            for result in out.results_by_time {
                samples.extend(samples_from_result(result, query.group_by.is_some())?);
            }

            match out.next_page_token {
                Some(token) if !token.is_empty() => next_page_token = Some(token),
                _ => break,
            }
        }

        Ok(samples)
    }

    pub async fn provide_anomaly_feedback(
        &self,
        anomaly_id: &str,
        action: FeedbackAction,
    ) -> Result<(), CostExplorerError> {
        tracing::info!(
            "[CE] Providing feedback {} for anomaly {}",
            action.feedback_type(),
            anomaly_id
        );
        let body = ProvideAnomalyFeedbackRequest {
            anomaly_id,
            feedback: action.feedback_type(),
        };
        let _: Value = self.call("ProvideAnomalyFeedback", &body).await?;
        Ok(())
    }
}

fn samples_from_result(
    result: ResultByTime,
    grouped: bool,
) -> Result<Vec<CostSample>, CostExplorerError> {
    let date = NaiveDate::parse_from_str(&result.time_period.start, "%Y-%m-%d")
        .map_err(|_| CostExplorerError::InvalidDate(result.time_period.start.clone()))?;

    if grouped || !result.groups.is_empty() {
        return result
            .groups
            .into_iter()
            .map(|group| -> Result<CostSample, CostExplorerError> {
                let metric = group
                    .metrics
                    .get(COST_METRIC)
                    .ok_or_else(|| CostExplorerError::MissingMetric(COST_METRIC.to_string()))?;
                Ok(CostSample {
                    date,
                    cost: metric.amount()?,
                    unit: metric.unit.clone(),
                    label: group.keys.first().cloned(),
                })
            })
            .collect();
    }

    let metric = result
        .total
        .get(COST_METRIC)
        .ok_or_else(|| CostExplorerError::MissingMetric(COST_METRIC.to_string()))?;
    Ok(vec![CostSample {
        date,
        cost: metric.amount()?,
        unit: metric.unit.clone(),
        label: None,
    }])
}
