use chrono::{DateTime, Months, Utc};
use sqlx::{
    Row, SqlitePool as Pool,
    sqlite::{SqliteConnectOptions, SqlitePool},
};

/// The Slack message posted for an anomaly, kept so a repeated notification
/// updates the thread instead of posting again.
#[derive(Clone, Debug, PartialEq)]
pub struct AnomalySlackMessage {
    pub anomaly_id: String,
    pub slack_team_id: String,
    pub slack_message_ts: String,
    pub total_impact: f64,
}

pub struct AnomalyStore {
    pool: Pool,
}

impl AnomalyStore {
    pub async fn new(path: &str) -> Result<Self, sqlx::Error> {
        let opts = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);

        let pool = SqlitePool::connect_with(opts).await?;

        Self::setup_tables(&pool).await?;

        tracing::info!("[DB] Opened anomaly store at {}", path);
        Ok(AnomalyStore { pool })
    }

    /// A private in-memory store. One connection, since every new in-memory
    /// connection would see an empty database.
    #[cfg(test)]
    pub async fn in_memory() -> Result<Self, sqlx::Error> {
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;

        Self::setup_tables(&pool).await?;

        Ok(AnomalyStore { pool })
    }

    async fn setup_tables(pool: &Pool) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS anomaly_slack_messages (
                anomaly_id TEXT NOT NULL,
                slack_team_id TEXT NOT NULL,
                slack_message_ts TEXT NOT NULL,
                total_impact REAL NOT NULL DEFAULT 0,
                expires_at INTEGER NOT NULL,
                PRIMARY KEY (anomaly_id, slack_team_id)
            )
            "#,
        )
        .execute(pool)
        .await?;

        Ok(())
    }

    /// Inserts `message`, expiring one month from now. Fails if a record for
    /// the same anomaly and team already exists.
    pub async fn save(&self, message: &AnomalySlackMessage) -> Result<(), sqlx::Error> {
        self.save_at(message, Utc::now()).await
    }

    pub async fn save_at(
        &self,
        message: &AnomalySlackMessage,
        now: DateTime<Utc>,
    ) -> Result<(), sqlx::Error> {
        let expires_at = now.checked_add_months(Months::new(1)).unwrap_or(now);

        sqlx::query(
            "INSERT INTO anomaly_slack_messages (anomaly_id, slack_team_id, slack_message_ts, total_impact, expires_at) VALUES (?, ?, ?, ?, ?)"
        )
        .bind(&message.anomaly_id)
        .bind(&message.slack_team_id)
        .bind(&message.slack_message_ts)
        .bind(message.total_impact)
        .bind(expires_at.timestamp())
        .execute(&self.pool)
        .await?;

        tracing::debug!(
            "[DB] Saved message {} for anomaly {}",
            message.slack_message_ts,
            message.anomaly_id
        );
        Ok(())
    }

    pub async fn get(
        &self,
        anomaly_id: &str,
        slack_team_id: &str,
    ) -> Result<Option<AnomalySlackMessage>, sqlx::Error> {
        self.get_at(anomaly_id, slack_team_id, Utc::now()).await
    }

    /// The live record for the key at `now`; expired rows read as absent.
    pub async fn get_at(
        &self,
        anomaly_id: &str,
        slack_team_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<AnomalySlackMessage>, sqlx::Error> {
        let row = sqlx::query(
            "SELECT slack_message_ts, total_impact FROM anomaly_slack_messages WHERE anomaly_id = ? AND slack_team_id = ? AND expires_at > ?"
        )
        .bind(anomaly_id)
        .bind(slack_team_id)
        .bind(now.timestamp())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|row| AnomalySlackMessage {
            anomaly_id: anomaly_id.to_string(),
            slack_team_id: slack_team_id.to_string(),
            slack_message_ts: row.get("slack_message_ts"),
            total_impact: row.get("total_impact"),
        }))
    }

    /// Deletes expired rows, returning how many were removed.
    pub async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM anomaly_slack_messages WHERE expires_at <= ?")
            .bind(now.timestamp())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() > 0 {
            tracing::info!("[DB] Purged {} expired records", result.rows_affected());
        }
        Ok(result.rows_affected())
    }
}
