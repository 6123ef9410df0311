// watchcat-core/src/repositories/postgres/adapter_state.rs

use async_trait::async_trait;
use sqlx::types::Json;
use sqlx::{Pool, Postgres, Row};
use watchcat_common::error::Error;
use watchcat_common::models::Stream;
use watchcat_common::traits::repository_traits::SnapshotRepository;

/// One JSONB row per network holding the last polled snapshot.
#[derive(Clone)]
pub struct PostgresSnapshotRepository {
    pool: Pool<Postgres>,
}

impl PostgresSnapshotRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SnapshotRepository for PostgresSnapshotRepository {
    async fn load(&self, network_id: &str) -> Result<Vec<Stream>, Error> {
        let row_opt = sqlx::query(
            r#"
            SELECT streams
            FROM adapter_state
            WHERE network_id = $1
            "#,
        )
            .bind(network_id)
            .fetch_optional(&self.pool)
            .await?;

        match row_opt {
            Some(r) => {
                let Json(streams): Json<Vec<Stream>> = r.try_get("streams")?;
                Ok(streams)
            }
            None => Ok(Vec::new()),
        }
    }

    async fn save(&self, network_id: &str, streams: &[Stream]) -> Result<(), Error> {
        sqlx::query(
            r#"
            INSERT INTO adapter_state (network_id, streams, updated_at)
            VALUES ($1, $2, now())
            ON CONFLICT (network_id)
            DO UPDATE SET streams = EXCLUDED.streams,
                          updated_at = now()
            "#,
        )
            .bind(network_id)
            .bind(Json(streams))
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
