use anyhow::{Context, Result};
use serde::Deserialize;

use super::Handler;
use super::message;
use crate::utils::anomaly::{
    ACTIONS_BLOCK_ID, AnomalyError, FeedbackAction, anomaly_id_from_value,
};
use crate::utils::slack::MessageContent;

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(default)]
pub struct InteractionPayload {
    #[serde(rename = "type")]
    pub kind: String,
    pub user: InteractionUser,
    pub channel: Option<IdOnly>,
    pub message: Option<MessageRef>,
    pub container: Option<Container>,
    pub actions: Vec<BlockAction>,
}

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(default)]
pub struct InteractionUser {
    pub id: String,
    pub name: String,
    pub username: String,
}

impl InteractionUser {
    fn display_name(&self) -> &str {
        [&self.name, &self.username, &self.id]
            .into_iter()
            .find(|n| !n.is_empty())
            .map(String::as_str)
            .unwrap_or_default()
    }
}

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(default)]
pub struct IdOnly {
    pub id: String,
}

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(default)]
pub struct MessageRef {
    pub ts: String,
}

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(default)]
pub struct Container {
    pub message_ts: String,
    pub channel_id: String,
}

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(default)]
pub struct BlockAction {
    pub action_id: String,
    pub block_id: String,
    pub value: String,
    pub text: Option<ActionText>,
}

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(default)]
pub struct ActionText {
    pub text: String,
}

impl InteractionPayload {
    /// Decodes an interaction request body, either the form-encoded
    /// `payload=<json>` Slack sends or the bare JSON.
    pub fn parse(body: &str) -> Result<Self, AnomalyError> {
        let json = url::form_urlencoded::parse(body.as_bytes())
            .find(|(key, _)| key == "payload")
            .map(|(_, v)| v.into_owned())
            .unwrap_or_else(|| body.to_string());
        Ok(serde_json::from_str(&json)?)
    }

    pub fn feedback_action(&self) -> Option<&BlockAction> {
        self.actions.iter().find(|a| a.block_id == ACTIONS_BLOCK_ID)
    }

    fn channel_id(&self) -> Option<&str> {
        self.channel
            .as_ref()
            .map(|c| c.id.as_str())
            .filter(|id| !id.is_empty())
            .or_else(|| {
                self.container
                    .as_ref()
                    .map(|c| c.channel_id.as_str())
                    .filter(|id| !id.is_empty())
            })
    }

    fn message_ts(&self) -> Option<&str> {
        self.message
            .as_ref()
            .map(|m| m.ts.as_str())
            .filter(|ts| !ts.is_empty())
            .or_else(|| {
                self.container
                    .as_ref()
                    .map(|c| c.message_ts.as_str())
                    .filter(|ts| !ts.is_empty())
            })
    }
}

impl Handler {
    /// Relays a feedback button press to Cost Explorer and acknowledges it in
    /// the alert thread.
    pub async fn handle_slack_action(&self, body: &str) -> Result<()> {
        let payload = InteractionPayload::parse(body).context("failed to decode interaction")?;
        let Some(action) = payload.feedback_action() else {
            tracing::warn!("[FEEDBACK] No action found");
            return Ok(());
        };

        let channel = payload
            .channel_id()
            .unwrap_or(&self.config.slack_channel)
            .to_string();
        let thread_ts = payload.message_ts();
        let user = &payload.user;

        let anomaly_id = match anomaly_id_from_value(&action.value) {
            Ok(id) => id,
            Err(e) => {
                tracing::warn!("[FEEDBACK] Failed to parse action value: {}", e);
                self.report_error(
                    thread_ts,
                    &channel,
                    format!("[error] failed to parse action value: {e}"),
                )
                .await;
                return Err(e.into());
            }
        };

        tracing::info!(
            "[FEEDBACK] anomaly_id={} action_id={} user_id={}",
            anomaly_id,
            action.action_id,
            user.id
        );

        let provided = match FeedbackAction::from_action_id(&action.action_id) {
            Ok(feedback) => self
                .cost_explorer
                .provide_anomaly_feedback(&anomaly_id, feedback)
                .await
                .map(|_| feedback)
                .map_err(anyhow::Error::from),
            Err(e) => Err(e.into()),
        };
        let feedback = match provided {
            Ok(feedback) => feedback,
            Err(e) => {
                tracing::error!("[FEEDBACK] Failed to provide feedback: {}", e);
                self.report_error(
                    thread_ts,
                    &channel,
                    format!("[error] failed to provide feedback: {e}"),
                )
                .await;
                return Err(e);
            }
        };

        let button_text = action
            .text
            .as_ref()
            .map(|t| t.text.as_str())
            .filter(|t| !t.is_empty())
            .unwrap_or(feedback.button_text());
        let reply = message::feedback_provided(button_text, &anomaly_id, user.display_name());
        self.slack
            .post_message(&channel, &MessageContent::text(reply), thread_ts, true)
            .await
            .context("failed to post message")?;
        Ok(())
    }
}
