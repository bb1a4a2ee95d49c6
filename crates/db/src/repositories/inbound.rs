use std::time::Duration;

use chrono::Utc;

use super::{encode_timestamp, InboundLog, RepositoryError};
use crate::DbPool;

pub struct SqlInboundLog {
    pool: DbPool,
}

impl SqlInboundLog {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl InboundLog for SqlInboundLog {
    async fn record_if_new(&self, message_id: &str) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            "INSERT INTO inbound_message (message_id, received_at)
             VALUES (?, ?)
             ON CONFLICT(message_id) DO NOTHING",
        )
        .bind(message_id)
        .bind(encode_timestamp(Utc::now()))
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn purge_older_than(&self, retention: Duration) -> Result<u64, RepositoryError> {
        let retention = chrono::Duration::from_std(retention)
            .map_err(|error| RepositoryError::Decode(format!("retention: {error}")))?;
        let result = sqlx::query("DELETE FROM inbound_message WHERE received_at < ?")
            .bind(encode_timestamp(Utc::now() - retention))
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::SqlInboundLog;
    use crate::repositories::InboundLog;
    use crate::{connect_with_settings, migrations};

    #[tokio::test]
    async fn redelivered_message_is_reported_once() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        let log = SqlInboundLog::new(pool);

        assert!(log.record_if_new("wamid.HBgM1").await.expect("first"));
        assert!(!log.record_if_new("wamid.HBgM1").await.expect("retry"));
        assert!(log.record_if_new("wamid.HBgM2").await.expect("other"));

        assert_eq!(log.purge_older_than(Duration::from_secs(3600)).await.expect("purge"), 0);
        assert_eq!(log.purge_older_than(Duration::ZERO).await.expect("purge"), 2);
        assert!(log.record_if_new("wamid.HBgM1").await.expect("after purge"));
    }
}
