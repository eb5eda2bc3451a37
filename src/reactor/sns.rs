use anyhow::{Context, Result, anyhow};
use serde::Deserialize;

use super::Handler;
use super::message;
use crate::utils::anomaly::Anomaly;
use crate::utils::database::AnomalySlackMessage;
use crate::utils::generator::GraphGenerator;
use crate::utils::slack::MessageContent;

/// An SNS HTTP(S) delivery.
#[derive(Deserialize, Debug, Default, Clone, PartialEq)]
#[serde(rename_all = "PascalCase", default)]
pub struct SnsNotification {
    #[serde(rename = "Type")]
    pub kind: String,
    pub message_id: String,
    pub token: String,
    pub topic_arn: String,
    pub subject: String,
    pub message: String,
    pub timestamp: String,
    pub signature_version: String,
    pub signature: String,
    #[serde(rename = "SigningCertURL")]
    pub signing_cert_url: String,
    #[serde(rename = "SubscribeURL")]
    pub subscribe_url: String,
    #[serde(rename = "UnsubscribeURL")]
    pub unsubscribe_url: String,
}

impl SnsNotification {
    /// Parses an SNS envelope. A body without `Type`, `MessageId` and
    /// `TopicArn` is taken as a bare notification whose message is the body.
    pub fn parse(body: &str) -> Result<Self, serde_json::Error> {
        let n: SnsNotification = serde_json::from_str(body)?;
        if n.kind.is_empty() && n.message_id.is_empty() && n.topic_arn.is_empty() {
            return Ok(SnsNotification {
                kind: "Notification".to_string(),
                message: body.to_string(),
                ..Default::default()
            });
        }
        Ok(n)
    }
}

impl Handler {
    pub async fn handle_sns(&self, body: &str) -> Result<()> {
        let n = SnsNotification::parse(body).context("failed to decode SNS body")?;
        tracing::debug!("[SNS] Received {} {}", n.kind, n.message_id);

        match n.kind.as_str() {
            "SubscriptionConfirmation" => self.confirm_subscription(&n).await,
            "Notification" => {
                let anomaly = Anomaly::from_json(&n.message).context("failed to decode anomaly")?;
                if let Err(e) = self.post_anomaly_detected(&anomaly).await {
                    tracing::error!("[SNS] Failed to post anomaly detected message: {:#}", e);
                    self.report_error(
                        None,
                        &self.config.slack_channel,
                        format!("[error] failed to post anomaly detected message: {e:#}"),
                    )
                    .await;
                    return Err(e);
                }
                Ok(())
            }
            other => {
                tracing::warn!("[SNS] Ignoring message type {:?}", other);
                Ok(())
            }
        }
    }

    async fn confirm_subscription(&self, n: &SnsNotification) -> Result<()> {
        tracing::info!("[SNS] Confirming subscription for {}", n.topic_arn);
        let res = self
            .http_client
            .get(&n.subscribe_url)
            .send()
            .await
            .context("failed to confirm subscription")?;
        if !res.status().is_success() {
            return Err(anyhow!(
                "failed to confirm subscription: status {}",
                res.status()
            ));
        }

        self.slack
            .post_message(
                &self.config.slack_channel,
                &MessageContent::text(message::subscription_confirmed(&n.topic_arn)),
                None,
                false,
            )
            .await
            .context("failed to post message")?;
        Ok(())
    }

    /// Posts (or refreshes) the alert for `anomaly` and uploads its charts
    /// into the message thread.
    pub async fn post_anomaly_detected(&self, anomaly: &Anomaly) -> Result<()> {
        let channel = &self.config.slack_channel;
        let content =
            message::anomaly_detected(anomaly).context("failed to create message")?;
        let graphs = GraphGenerator::new(&self.cost_explorer, &self.accounts, &self.font)
            .generate(anomaly)
            .await
            .context("failed to generate graphs")?;

        let mut thread_ts = None;
        if let Some(store) = &self.store {
            match store.get(&anomaly.anomaly_id, &self.team_id).await {
                Ok(Some(previous)) => {
                    let update = message::update_total_impact(
                        previous.total_impact,
                        anomaly.impact.total_impact,
                    );
                    self.slack
                        .post_message(
                            channel,
                            &MessageContent::text(update),
                            Some(&previous.slack_message_ts),
                            false,
                        )
                        .await
                        .context("failed to post message")?;
                    self.slack
                        .update_message(channel, &previous.slack_message_ts, &content)
                        .await
                        .context("failed to update message")?;
                    thread_ts = Some(previous.slack_message_ts);
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!("[DB] Failed to get anomaly slack message: {}", e);
                }
            }
        }

        let ts = match thread_ts {
            Some(ts) => ts,
            None => {
                let ts = self
                    .slack
                    .post_message(channel, &content, None, false)
                    .await
                    .context("failed to post message")?;
                if let Some(store) = &self.store {
                    let record = AnomalySlackMessage {
                        anomaly_id: anomaly.anomaly_id.clone(),
                        slack_team_id: self.team_id.clone(),
                        slack_message_ts: ts.clone(),
                        total_impact: anomaly.impact.total_impact,
                    };
                    if let Err(e) = store.save(&record).await {
                        tracing::warn!(
                            "[DB] Failed to save anomaly slack message for {}: {}",
                            anomaly.anomaly_id,
                            e
                        );
                    }
                }
                ts
            }
        };
        tracing::info!(
            "[SNS] Posted anomaly {} in thread {}",
            anomaly.anomaly_id,
            ts
        );

        for graph in &graphs {
            self.slack
                .upload_file(channel, Some(&ts), &graph.name, &graph.title, &graph.chart)
                .await
                .context("failed to upload file")?;
        }

        Ok(())
    }
}
