// watchcat-core/src/repositories/postgres/guilds.rs
//
// Guild configuration lives in three tables: `guilds` holds the scalar
// settings, `guild_admin_roles` and `guild_watches` hold the two sets.
// Every mutation first upserts the `guilds` row so that the first write for
// a guild creates it.

use std::collections::BTreeMap;
use async_trait::async_trait;
use sqlx::{Pool, Postgres, Row, Transaction};
use watchcat_common::error::Error;
use watchcat_common::models::{normalize_username, GuildConfig, NetworkWatchList};
use watchcat_common::traits::repository_traits::GuildRepository;

#[derive(Clone)]
pub struct PostgresGuildRepository {
    pool: Pool<Postgres>,
}

impl PostgresGuildRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    async fn ensure_guild(tx: &mut Transaction<'_, Postgres>, guild_id: &str) -> Result<(), Error> {
        sqlx::query(
            r#"
            INSERT INTO guilds (guild_id)
            VALUES ($1)
            ON CONFLICT (guild_id) DO NOTHING
            "#,
        )
            .bind(guild_id)
            .execute(&mut **tx)
            .await?;
        Ok(())
    }

    /// Runs one statement after making sure the guild exists and reports
    /// whether it touched any row.
    async fn upsert_and_execute(
        &self,
        guild_id: &str,
        sql: &str,
        binds: &[&str],
    ) -> Result<bool, Error> {
        let mut tx = self.pool.begin().await?;
        Self::ensure_guild(&mut tx, guild_id).await?;

        let mut query = sqlx::query(sql).bind(guild_id);
        for value in binds {
            query = query.bind(*value);
        }
        let result = query.execute(&mut *tx).await?;

        tx.commit().await?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl GuildRepository for PostgresGuildRepository {
    async fn get(&self, guild_id: &str) -> Result<Option<GuildConfig>, Error> {
        let row_opt = sqlx::query(
            r#"
            SELECT guild_id, channel_id, ping_role_id
            FROM guilds
            WHERE guild_id = $1
            "#,
        )
            .bind(guild_id)
            .fetch_optional(&self.pool)
            .await?;

        let Some(r) = row_opt else {
            return Ok(None);
        };

        let mut config = GuildConfig {
            guild_id: r.try_get("guild_id")?,
            channel_id: r.try_get("channel_id")?,
            ping_role_id: r.try_get("ping_role_id")?,
            ..Default::default()
        };

        let roles = sqlx::query(
            r#"
            SELECT role_id
            FROM guild_admin_roles
            WHERE guild_id = $1
            "#,
        )
            .bind(guild_id)
            .fetch_all(&self.pool)
            .await?;
        for r in roles {
            config.admin_role_ids.insert(r.try_get("role_id")?);
        }

        let watches = sqlx::query(
            r#"
            SELECT network_id, username
            FROM guild_watches
            WHERE guild_id = $1
            ORDER BY network_id, username
            "#,
        )
            .bind(guild_id)
            .fetch_all(&self.pool)
            .await?;

        let mut networks: BTreeMap<String, NetworkWatchList> = BTreeMap::new();
        for r in watches {
            let network_id: String = r.try_get("network_id")?;
            let username: String = r.try_get("username")?;
            networks
                .entry(network_id)
                .or_default()
                .watched_usernames
                .insert(username);
        }
        config.networks = networks;

        Ok(Some(config))
    }

    async fn set_channel(&self, guild_id: &str, channel_id: &str) -> Result<bool, Error> {
        self.upsert_and_execute(
            guild_id,
            r#"
            UPDATE guilds
            SET channel_id = $2, updated_at = now()
            WHERE guild_id = $1
              AND channel_id IS DISTINCT FROM $2
            "#,
            &[channel_id],
        ).await
    }

    async fn set_ping_role(&self, guild_id: &str, role_id: &str) -> Result<bool, Error> {
        self.upsert_and_execute(
            guild_id,
            r#"
            UPDATE guilds
            SET ping_role_id = $2, updated_at = now()
            WHERE guild_id = $1
              AND ping_role_id IS DISTINCT FROM $2
            "#,
            &[role_id],
        ).await
    }

    async fn unset_ping_role(&self, guild_id: &str) -> Result<bool, Error> {
        self.upsert_and_execute(
            guild_id,
            r#"
            UPDATE guilds
            SET ping_role_id = NULL, updated_at = now()
            WHERE guild_id = $1
              AND ping_role_id IS NOT NULL
            "#,
            &[],
        ).await
    }

    async fn grant(&self, guild_id: &str, role_id: &str) -> Result<bool, Error> {
        self.upsert_and_execute(
            guild_id,
            r#"
            INSERT INTO guild_admin_roles (guild_id, role_id)
            VALUES ($1, $2)
            ON CONFLICT (guild_id, role_id) DO NOTHING
            "#,
            &[role_id],
        ).await
    }

    async fn revoke(&self, guild_id: &str, role_id: &str) -> Result<bool, Error> {
        self.upsert_and_execute(
            guild_id,
            r#"
            DELETE FROM guild_admin_roles
            WHERE guild_id = $1
              AND role_id = $2
            "#,
            &[role_id],
        ).await
    }

    async fn watch(&self, guild_id: &str, network_id: &str, username: &str) -> Result<bool, Error> {
        let username = normalize_username(username);
        self.upsert_and_execute(
            guild_id,
            r#"
            INSERT INTO guild_watches (guild_id, network_id, username)
            VALUES ($1, $2, $3)
            ON CONFLICT (guild_id, network_id, username) DO NOTHING
            "#,
            &[network_id, &username],
        ).await
    }

    async fn unwatch(&self, guild_id: &str, network_id: &str, username: &str) -> Result<bool, Error> {
        let username = normalize_username(username);
        self.upsert_and_execute(
            guild_id,
            r#"
            DELETE FROM guild_watches
            WHERE guild_id = $1
              AND network_id = $2
              AND username = $3
            "#,
            &[network_id, &username],
        ).await
    }

    async fn delete(&self, guild_id: &str) -> Result<bool, Error> {
        let result = sqlx::query(
            r#"
            DELETE FROM guilds
            WHERE guild_id = $1
            "#,
        )
            .bind(guild_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_watching(&self, network_id: &str, username: &str) -> Result<Vec<GuildConfig>, Error> {
        let rows = sqlx::query(
            r#"
            SELECT guild_id
            FROM guild_watches
            WHERE network_id = $1
              AND username = $2
            ORDER BY guild_id
            "#,
        )
            .bind(network_id)
            .bind(normalize_username(username))
            .fetch_all(&self.pool)
            .await?;

        let mut out = Vec::with_capacity(rows.len());
        for r in rows {
            let guild_id: String = r.try_get("guild_id")?;
            if let Some(config) = self.get(&guild_id).await? {
                out.push(config);
            }
        }
        Ok(out)
    }

    async fn global_watch_list(&self, network_id: &str) -> Result<Vec<String>, Error> {
        let rows = sqlx::query(
            r#"
            SELECT DISTINCT username
            FROM guild_watches
            WHERE network_id = $1
            ORDER BY username
            "#,
        )
            .bind(network_id)
            .fetch_all(&self.pool)
            .await?;

        let mut out = Vec::with_capacity(rows.len());
        for r in rows {
            out.push(r.try_get("username")?);
        }
        Ok(out)
    }
}
