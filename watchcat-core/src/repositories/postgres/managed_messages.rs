// watchcat-core/src/repositories/postgres/managed_messages.rs

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{Pool, Postgres, Row};
use uuid::Uuid;
use watchcat_common::error::Error;
use watchcat_common::models::{normalize_username, ManagedMessage};
use watchcat_common::traits::repository_traits::ManagedMessageRepository;

#[derive(Clone)]
pub struct PostgresManagedMessageRepository {
    pool: Pool<Postgres>,
}

impl PostgresManagedMessageRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

fn row_to_message(r: &PgRow) -> Result<ManagedMessage, Error> {
    Ok(ManagedMessage {
        channel_id: r.try_get("channel_id")?,
        message_id: r.try_get("message_id")?,
        guild_id:   r.try_get("guild_id")?,
        network_id: r.try_get("network_id")?,
        stream_id:  r.try_get("stream_id")?,
        created_at: r.try_get::<DateTime<Utc>, _>("created_at")?,
    })
}

#[async_trait]
impl ManagedMessageRepository for PostgresManagedMessageRepository {
    async fn insert(&self, message: &ManagedMessage) -> Result<(), Error> {
        sqlx::query(
            r#"
            INSERT INTO managed_messages (
                managed_message_id, guild_id, network_id, stream_id,
                channel_id, message_id, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
            .bind(Uuid::new_v4())
            .bind(&message.guild_id)
            .bind(&message.network_id)
            .bind(normalize_username(&message.stream_id))
            .bind(&message.channel_id)
            .bind(&message.message_id)
            .bind(message.created_at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn take(
        &self,
        guild_id: &str,
        network_id: &str,
        stream_id: &str,
    ) -> Result<Option<ManagedMessage>, Error> {
        let row_opt = sqlx::query(
            r#"
            DELETE FROM managed_messages
            WHERE guild_id = $1
              AND network_id = $2
              AND stream_id = $3
            RETURNING guild_id, network_id, stream_id, channel_id, message_id, created_at
            "#,
        )
            .bind(guild_id)
            .bind(network_id)
            .bind(normalize_username(stream_id))
            .fetch_optional(&self.pool)
            .await?;

        row_opt.as_ref().map(row_to_message).transpose()
    }

    async fn find_for_streamer(&self, network_id: &str, stream_id: &str) -> Result<Vec<ManagedMessage>, Error> {
        let rows = sqlx::query(
            r#"
            SELECT guild_id, network_id, stream_id, channel_id, message_id, created_at
            FROM managed_messages
            WHERE network_id = $1
              AND stream_id = $2
            ORDER BY created_at
            "#,
        )
            .bind(network_id)
            .bind(normalize_username(stream_id))
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(row_to_message).collect()
    }

    async fn find_for_channel(&self, channel_id: &str) -> Result<Vec<ManagedMessage>, Error> {
        let rows = sqlx::query(
            r#"
            SELECT guild_id, network_id, stream_id, channel_id, message_id, created_at
            FROM managed_messages
            WHERE channel_id = $1
            ORDER BY created_at
            "#,
        )
            .bind(channel_id)
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(row_to_message).collect()
    }

    async fn find_for_guild(&self, guild_id: &str) -> Result<Vec<ManagedMessage>, Error> {
        let rows = sqlx::query(
            r#"
            SELECT guild_id, network_id, stream_id, channel_id, message_id, created_at
            FROM managed_messages
            WHERE guild_id = $1
            ORDER BY created_at
            "#,
        )
            .bind(guild_id)
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(row_to_message).collect()
    }
}
