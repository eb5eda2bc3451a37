use anyhow::{Context, Result, bail};
use tokio::io::AsyncReadExt;

use crate::reactor::Handler;
use crate::utils::config::Config;

/// What the request body piped on stdin is.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum EventSource {
    Sns,
    SlackAction,
}

impl EventSource {
    pub fn from_arg(arg: Option<&str>) -> Result<Self> {
        match arg.unwrap_or("sns") {
            "sns" => Ok(Self::Sns),
            "slack-action" => Ok(Self::SlackAction),
            other => bail!("unknown event source {other:?}, expected sns or slack-action"),
        }
    }
}

/// Reads one event from stdin and relays it.
pub async fn run(config: Config) -> Result<()> {
    let arg = std::env::args().nth(1);
    let source = EventSource::from_arg(arg.as_deref())?;

    tracing::info!("[INIT] Starting anomaly reactor for {:?}", source);

    let mut body = String::new();
    tokio::io::stdin()
        .read_to_string(&mut body)
        .await
        .context("failed to read request body")?;

    let handler = Handler::new(config).await?;
    dispatch(&handler, source, &body).await
}

pub async fn dispatch(handler: &Handler, source: EventSource, body: &str) -> Result<()> {
    match source {
        EventSource::Sns => handler.handle_sns(body).await,
        EventSource::SlackAction => handler.handle_slack_action(body).await,
    }
}
