use reqwest::{Client, Url};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use thiserror::Error;

use super::graph::RenderedChart;

pub const DEFAULT_API_URL: &str = "https://slack.com/api/";

#[derive(Debug, Error)]
pub enum SlackError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),
    #[error("Invalid response: {0}")]
    Json(#[from] serde_json::Error),
    /// Slack answered `ok: false`; holds its `error` code.
    #[error("Slack API error: {0}")]
    Api(String),
}

/// Fallback text plus Block Kit blocks.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MessageContent {
    pub text: String,
    pub blocks: Vec<Value>,
}

impl MessageContent {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            blocks: Vec::new(),
        }
    }
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct AuthTest {
    #[serde(default)]
    pub team_id: String,
    #[serde(default)]
    pub team: String,
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub bot_id: Option<String>,
}

#[derive(Deserialize, Debug)]
struct PostMessageResponse {
    ts: String,
}

#[derive(Deserialize, Debug)]
struct UploadUrlResponse {
    upload_url: String,
    file_id: String,
}

#[derive(Debug, Clone)]
pub struct SlackClient {
    http_client: Client,
    base_url: Url,
    token: String,
}

impl SlackClient {
    pub fn new(base_url: &str, token: &str) -> Result<Self, SlackError> {
        let base_url = if base_url.ends_with('/') {
            Url::parse(base_url)?
        } else {
            Url::parse(&format!("{base_url}/"))?
        };
        Ok(SlackClient {
            http_client: Client::new(),
            base_url,
            token: token.to_string(),
        })
    }

    fn check<T: DeserializeOwned>(method: &str, body: Value) -> Result<T, SlackError> {
        if !body.get("ok").and_then(Value::as_bool).unwrap_or(false) {
            let error = body
                .get("error")
                .and_then(Value::as_str)
                .unwrap_or("unknown_error")
                .to_string();
            tracing::warn!("[SLACK] {} failed: {}", method, error);
            return Err(SlackError::Api(error));
        }
        Ok(serde_json::from_value(body)?)
    }

    async fn call_json<T: DeserializeOwned>(
        &self,
        method: &str,
        payload: &Value,
    ) -> Result<T, SlackError> {
        let url = self.base_url.join(method)?;
        let body: Value = self
            .http_client
            .post(url)
            .bearer_auth(&self.token)
            .json(payload)
            .send()
            .await?
            .json()
            .await?;
        Self::check(method, body)
    }

    async fn call_form<T: DeserializeOwned>(
        &self,
        method: &str,
        params: &[(&str, String)],
    ) -> Result<T, SlackError> {
        let url = self.base_url.join(method)?;
        let body: Value = self
            .http_client
            .post(url)
            .bearer_auth(&self.token)
            .form(params)
            .send()
            .await?
            .json()
            .await?;
        Self::check(method, body)
    }

    pub async fn auth_test(&self) -> Result<AuthTest, SlackError> {
        let me: AuthTest = self.call_form("auth.test", &[]).await?;
        tracing::info!(
            "[SLACK] Authenticated as {} ({}) in team {} ({})",
            me.user,
            me.user_id,
            me.team,
            me.team_id
        );
        Ok(me)
    }

    /// Posts a message and returns its timestamp. With `thread_ts` the message
    /// is a reply; `broadcast` also shows the reply in the channel.
    pub async fn post_message(
        &self,
        channel: &str,
        content: &MessageContent,
        thread_ts: Option<&str>,
        broadcast: bool,
    ) -> Result<String, SlackError> {
        let mut payload = json!({
            "channel": channel,
            "text": content.text,
        });
        if !content.blocks.is_empty() {
            payload["blocks"] = json!(content.blocks);
        }
        if let Some(ts) = thread_ts {
            payload["thread_ts"] = json!(ts);
            if broadcast {
                payload["reply_broadcast"] = json!(true);
            }
        }

        let res: PostMessageResponse = self.call_json("chat.postMessage", &payload).await?;
        tracing::debug!("[SLACK] Posted message {} to {}", res.ts, channel);
        Ok(res.ts)
    }

    pub async fn update_message(
        &self,
        channel: &str,
        ts: &str,
        content: &MessageContent,
    ) -> Result<(), SlackError> {
        let payload = json!({
            "channel": channel,
            "ts": ts,
            "text": content.text,
            "blocks": content.blocks,
        });
        let _: Value = self.call_json("chat.update", &payload).await?;
        tracing::debug!("[SLACK] Updated message {} in {}", ts, channel);
        Ok(())
    }

    /// Uploads a chart into a channel thread and returns the file id.
    pub async fn upload_file(
        &self,
        channel: &str,
        thread_ts: Option<&str>,
        filename: &str,
        title: &str,
        chart: &RenderedChart,
    ) -> Result<String, SlackError> {
        let target: UploadUrlResponse = self
            .call_form(
                "files.getUploadURLExternal",
                &[
                    ("filename", filename.to_string()),
                    ("length", chart.size.to_string()),
                ],
            )
            .await?;

        let upload = self
            .http_client
            .post(&target.upload_url)
            .header(reqwest::header::CONTENT_TYPE, "image/png")
            .body(chart.data.clone())
            .send()
            .await?;
        if !upload.status().is_success() {
            return Err(SlackError::Api(format!(
                "upload of {} failed with status {}",
                filename,
                upload.status()
            )));
        }

        let mut payload = json!({
            "files": [{ "id": target.file_id, "title": title }],
            "channel_id": channel,
        });
        if let Some(ts) = thread_ts {
            payload["thread_ts"] = json!(ts);
        }
        let _: Value = self
            .call_json("files.completeUploadExternal", &payload)
            .await?;

        tracing::info!(
            "[SLACK] Uploaded {} ({} bytes) as {}",
            filename,
            chart.size,
            target.file_id
        );
        Ok(target.file_id)
    }
}
