use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AnomalyError {
    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Invalid monitor ARN: {0}")]
    InvalidArn(String),
    /// Represents a button id that does not map to any feedback type.
    #[error("Invalid action id: {0}")]
    UnknownAction(String),
    #[error("Action value has no anomaly_id")]
    MissingAnomalyId,
}

/// A cost anomaly as published by AWS Cost Anomaly Detection over SNS.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Anomaly {
    #[serde(default)]
    pub account_id: String,
    #[serde(default)]
    pub anomaly_details_link: String,
    pub anomaly_end_date: DateTime<Utc>,
    pub anomaly_id: String,
    #[serde(default)]
    pub anomaly_score: AnomalyScore,
    pub anomaly_start_date: DateTime<Utc>,
    #[serde(default)]
    pub dimensional_value: String,
    #[serde(default)]
    pub impact: AnomalyImpact,
    #[serde(default)]
    pub monitor_arn: String,
    #[serde(default)]
    pub root_causes: Vec<RootCause>,
    #[serde(default)]
    pub subscription_id: String,
    #[serde(default)]
    pub subscription_name: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AnomalyScore {
    pub current_score: f64,
    pub max_score: f64,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AnomalyImpact {
    #[serde(default)]
    pub max_impact: f64,
    #[serde(default)]
    pub total_actual_spend: f64,
    #[serde(default)]
    pub total_expected_spend: f64,
    #[serde(default)]
    pub total_impact: f64,
    #[serde(default)]
    pub total_impact_percentage: f64,
}

/// One contributing dimension combination. Every field is optional; an
/// organization-wide monitor leaves `linked_account` empty.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RootCause {
    #[serde(
        default,
        deserialize_with = "empty_as_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub linked_account: Option<String>,
    #[serde(
        default,
        deserialize_with = "empty_as_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub linked_account_name: Option<String>,
    #[serde(
        default,
        deserialize_with = "empty_as_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub region: Option<String>,
    #[serde(
        default,
        deserialize_with = "empty_as_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub service: Option<String>,
    #[serde(
        default,
        deserialize_with = "empty_as_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub usage_type: Option<String>,
}

fn empty_as_none<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
    let value = Option::<String>::deserialize(d)?;
    Ok(value.filter(|v| !v.is_empty()))
}

impl RootCause {
    /// Human readable summary, e.g. `prod(123456789012),us-east-1,Amazon EC2`.
    pub fn title(&self) -> String {
        let mut parts = Vec::new();
        if let Some(account) = &self.linked_account {
            let name = self.linked_account_name.as_deref().unwrap_or_default();
            parts.push(format!("{name}({account})"));
        }
        parts.extend(
            [&self.region, &self.service, &self.usage_type]
                .into_iter()
                .flatten()
                .cloned(),
        );
        parts.join(",")
    }
}

impl Anomaly {
    pub fn from_json(raw: &str) -> Result<Self, AnomalyError> {
        Ok(serde_json::from_str(raw)?)
    }

    /// The monitor id from `arn:aws:ce::<account>:anomalymonitor/<id>`.
    pub fn monitor_id(&self) -> Result<String, AnomalyError> {
        let parts: Vec<&str> = self.monitor_arn.splitn(6, ':').collect();
        match parts.as_slice() {
            ["arn", _partition, _service, _region, _account, resource] => Ok(resource
                .strip_prefix("anomalymonitor/")
                .unwrap_or(resource)
                .to_string()),
            _ => Err(AnomalyError::InvalidArn(self.monitor_arn.clone())),
        }
    }
}

/// Block id shared by the three feedback buttons.
pub const ACTIONS_BLOCK_ID: &str = "aws-cost-anomaly-detection-reactor";

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum FeedbackAction {
    Yes,
    No,
    PlannedActivity,
}

impl FeedbackAction {
    pub const ALL: [FeedbackAction; 3] = [Self::Yes, Self::No, Self::PlannedActivity];

    /// The Slack `action_id` of the button.
    pub fn action_id(&self) -> &'static str {
        match self {
            Self::Yes => "yes",
            //? Misspelled on purpose: buttons already posted carry this id.
            Self::PlannedActivity => "planed_activity",
            Self::No => "no",
        }
    }

    /// The AWS `AnomalyFeedbackType` value.
    pub fn feedback_type(&self) -> &'static str {
        match self {
            Self::Yes => "YES",
            Self::No => "NO",
            Self::PlannedActivity => "PLANNED_ACTIVITY",
        }
    }

    pub fn button_text(&self) -> &'static str {
        match self {
            Self::Yes => "Accurate anomaly",
            Self::No => "Not an issue",
            Self::PlannedActivity => "Planned activity",
        }
    }

    pub fn from_action_id(action_id: &str) -> Result<Self, AnomalyError> {
        Self::ALL
            .into_iter()
            .find(|a| a.action_id() == action_id)
            .ok_or_else(|| AnomalyError::UnknownAction(action_id.to_string()))
    }

    /// Form-encoded button value, `anomaly_id=<id>&action=<FEEDBACK>`.
    pub fn button_value(&self, anomaly_id: &str) -> String {
        url::form_urlencoded::Serializer::new(String::new())
            .append_pair("action", self.feedback_type())
            .append_pair("anomaly_id", anomaly_id)
            .finish()
    }
}

/// Pulls `anomaly_id` out of a button value built by [`FeedbackAction::button_value`].
pub fn anomaly_id_from_value(value: &str) -> Result<String, AnomalyError> {
    url::form_urlencoded::parse(value.as_bytes())
        .find(|(key, _)| key == "anomaly_id")
        .map(|(_, v)| v.into_owned())
        .filter(|v| !v.is_empty())
        .ok_or(AnomalyError::MissingAnomalyId)
}
