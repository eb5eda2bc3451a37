use reqwest::{Client, Url};
use serde::Deserialize;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use thiserror::Error;

const DESCRIBE_ACCOUNT_TARGET: &str = "AWSOrganizationsV20161128.DescribeAccount";
const CACHE_TTL: Duration = Duration::from_secs(5 * 60);

#[derive(Debug, Error)]
pub enum OrganizationsError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),
    #[error("Organizations error {code}: {message}")]
    Api { code: String, message: String },
}

impl OrganizationsError {
    /// Member accounts cannot call DescribeAccount; callers fall back to the id.
    pub fn is_access_denied(&self) -> bool {
        matches!(self, Self::Api { code, .. } if code == "AccessDeniedException")
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Api { code, .. } if code == "AccountNotFoundException")
    }
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "PascalCase")]
struct DescribeAccountResponse {
    account: AccountInfo,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "PascalCase")]
struct AccountInfo {
    #[serde(default)]
    name: Option<String>,
}

#[derive(Deserialize, Debug)]
struct ApiErrorBody {
    #[serde(rename = "__type", default)]
    kind: String,
    #[serde(alias = "Message", default)]
    message: String,
}

#[derive(Debug, Clone)]
struct CachedName {
    name: Option<String>,
    fetched_at: Instant,
}

/// Resolves account ids to display names, caching answers (misses included)
/// for five minutes.
#[derive(Debug)]
pub struct AccountDirectory {
    http_client: Client,
    endpoint: Url,
    cache: Mutex<HashMap<String, CachedName>>,
    ttl: Duration,
}

impl AccountDirectory {
    pub fn new(endpoint: &str) -> Result<Self, OrganizationsError> {
        Ok(AccountDirectory {
            http_client: Client::new(),
            endpoint: Url::parse(endpoint)?,
            cache: Mutex::new(HashMap::new()),
            ttl: CACHE_TTL,
        })
    }

    #[cfg(test)]
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    fn cached(&self, account_id: &str) -> Option<Option<String>> {
        let cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());
        cache
            .get(account_id)
            .filter(|entry| entry.fetched_at.elapsed() < self.ttl)
            .map(|entry| entry.name.clone())
    }

    fn remember(&self, account_id: &str, name: Option<String>) {
        let mut cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());
        cache.insert(
            account_id.to_string(),
            CachedName {
                name,
                fetched_at: Instant::now(),
            },
        );
    }

    /// The account's name, or `None` when it has none.
    pub async fn account_name(&self, account_id: &str) -> Result<Option<String>, OrganizationsError> {
        if let Some(hit) = self.cached(account_id) {
            tracing::debug!("[ORG] Cache hit for account {}", account_id);
            return Ok(hit);
        }

        let res = self
            .http_client
            .post(self.endpoint.clone())
            .header("X-Amz-Target", DESCRIBE_ACCOUNT_TARGET)
            .header(reqwest::header::CONTENT_TYPE, "application/x-amz-json-1.1")
            .body(json!({ "AccountId": account_id }).to_string())
            .send()
            .await?;

        if !res.status().is_success() {
            let status = res.status();
            let err: ApiErrorBody = res.json().await.unwrap_or(ApiErrorBody {
                kind: status.to_string(),
                message: String::new(),
            });
            let code = err.kind.rsplit('#').next().unwrap_or_default().to_string();
            return Err(OrganizationsError::Api {
                code,
                message: err.message,
            });
        }

        let out: DescribeAccountResponse = res.json().await?;
        let name = out.account.name.filter(|n| !n.is_empty());
        self.remember(account_id, name.clone());
        Ok(name)
    }

    /// `name(id)` when the name is known, otherwise the bare id.
    pub async fn label_for(&self, account_id: &str) -> String {
        match self.account_name(account_id).await {
            Ok(Some(name)) => format!("{name}({account_id})"),
            Ok(None) => account_id.to_string(),
            Err(e) if e.is_access_denied() || e.is_not_found() => {
                tracing::debug!("[ORG] No name available for {}: {}", account_id, e);
                self.remember(account_id, None);
                account_id.to_string()
            }
            Err(e) => {
                tracing::warn!("[ORG] Failed to describe account {}: {}", account_id, e);
                account_id.to_string()
            }
        }
    }
}
