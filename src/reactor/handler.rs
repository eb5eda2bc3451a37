use ab_glyph::FontArc;
use anyhow::{Context, Result};
use reqwest::Client;

use crate::utils::config::Config;
use crate::utils::cost_explorer::CostExplorer;
use crate::utils::database::AnomalyStore;
use crate::utils::graph::load_font;
use crate::utils::organizations::AccountDirectory;
use crate::utils::slack::{MessageContent, SlackClient};

/// Everything the relay needs to answer one event.
pub struct Handler {
    pub config: Config,
    pub slack: SlackClient,
    pub cost_explorer: CostExplorer,
    pub accounts: AccountDirectory,
    pub store: Option<AnomalyStore>,
    pub font: FontArc,
    pub team_id: String,
    pub(crate) http_client: Client,
}

impl Handler {
    pub async fn new(config: Config) -> Result<Self> {
        let font = load_font(config.font_path.as_deref())?;
        let slack = SlackClient::new(&config.slack_api_url, &config.slack_token)
            .context("invalid Slack API URL")?;
        let cost_explorer = CostExplorer::new(&config.cost_explorer_endpoint)
            .context("invalid Cost Explorer endpoint")?;
        let accounts = AccountDirectory::new(&config.organizations_endpoint)
            .context("invalid Organizations endpoint")?;

        let me = slack.auth_test().await.context("Slack auth.test failed")?;

        let store = match &config.database_path {
            Some(path) => {
                let store = AnomalyStore::new(path)
                    .await
                    .with_context(|| format!("failed to open store at {path}"))?;
                if let Err(e) = store.purge_expired(chrono::Utc::now()).await {
                    tracing::warn!("[DB] Failed to purge expired records: {}", e);
                }
                Some(store)
            }
            None => {
                tracing::info!("[INIT] DATABASE_PATH not set, idempotency disabled");
                None
            }
        };

        Ok(Handler {
            config,
            slack,
            cost_explorer,
            accounts,
            store,
            font,
            team_id: me.team_id,
            http_client: Client::new(),
        })
    }

    #[cfg(test)]
    pub fn with_store(mut self, store: AnomalyStore) -> Self {
        self.store = Some(store);
        self
    }

    /// Posts `[error] <context>: <err>` to the channel unless reporting is off.
    pub(crate) async fn report_error(&self, thread_ts: Option<&str>, channel: &str, text: String) {
        if self.config.no_error_report {
            return;
        }
        if let Err(e) = self
            .slack
            .post_message(channel, &MessageContent::text(text), thread_ts, false)
            .await
        {
            tracing::error!("[SLACK] Failed to report error: {}", e);
        }
    }
}
