use std::collections::HashSet;

use async_trait::async_trait;
use sqlx::mysql::{MySqlConnectOptions, MySqlPool, MySqlPoolOptions};
use tracing::{debug, info};

use crate::catalog::{parse_timestamp, Map, Mapset};
use crate::config::DatabaseConfig;
use crate::error::MirrorError;
use crate::traits::MetadataStore;

const UPSERT_MAPSET: &str = "REPLACE INTO Mapset VALUES (?,?,?,?,?,?,?,?,?,?,?,?,?,?,?)";
const UPSERT_MAP: &str =
    "REPLACE INTO Map VALUES (?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?)";

/// MySQL (Mapset / Map テーブル)
#[derive(Debug, Clone)]
pub struct MySqlStore {
    pool: MySqlPool,
}

impl MySqlStore {
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, MirrorError> {
        info!(
            "Connecting to MySQL {}@{}:{}/{}",
            config.user, config.host, config.port, config.database
        );

        let options = MySqlConnectOptions::new()
            .host(&config.host)
            .port(config.port)
            .username(&config.user)
            .password(&config.password)
            .database(&config.database);

        // 処理は逐次なので接続は1本で足りる
        let pool = MySqlPoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        Ok(Self { pool })
    }

    pub fn from_pool(pool: MySqlPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MetadataStore for MySqlStore {
    async fn existing_mapset_ids(&self) -> Result<HashSet<i64>, MirrorError> {
        let ids = sqlx::query_scalar::<_, i64>("SELECT CAST(id AS SIGNED) FROM Mapset")
            .fetch_all(&self.pool)
            .await?;
        debug!("{} mapsets already in database", ids.len());
        Ok(ids.into_iter().collect())
    }

    async fn upsert_mapset(&self, mapset: &Mapset) -> Result<(), MirrorError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(UPSERT_MAPSET)
            .bind(mapset.id)
            .bind(mapset.creator_id)
            .bind(&mapset.creator_username)
            .bind(&mapset.creator_avatar_url)
            .bind(&mapset.artist)
            .bind(&mapset.title)
            .bind(&mapset.source)
            .bind(&mapset.tags)
            .bind(&mapset.description)
            .bind(parse_timestamp(mapset.date_submitted.as_deref()))
            .bind(parse_timestamp(mapset.date_last_updated.as_deref()))
            .bind(mapset.ranking_queue_status)
            .bind(parse_timestamp(mapset.ranking_queue_last_updated.as_deref()))
            .bind(mapset.ranking_queue_vote_count)
            .bind(mapset.mapset_ranking_queue_id)
            .execute(&mut *tx)
            .await?;

        for map in &mapset.maps {
            upsert_map(&mut tx, map).await?;
        }

        tx.commit().await?;
        debug!("Upserted mapset {} with {} maps", mapset.id, mapset.maps.len());
        Ok(())
    }
}

async fn upsert_map(
    tx: &mut sqlx::Transaction<'_, sqlx::MySql>,
    map: &Map,
) -> Result<(), MirrorError> {
    sqlx::query(UPSERT_MAP)
        .bind(map.id)
        .bind(map.mapset_id)
        .bind(&map.md5)
        .bind(&map.alternative_md5)
        .bind(map.creator_id)
        .bind(&map.creator_username)
        .bind(map.game_mode)
        .bind(map.ranked_status)
        .bind(&map.artist)
        .bind(&map.title)
        .bind(&map.source)
        .bind(&map.tags)
        .bind(&map.description)
        .bind(&map.difficulty_name)
        .bind(map.length)
        .bind(map.bpm)
        .bind(map.difficulty_rating)
        .bind(map.count_hitobject_normal)
        .bind(map.count_hitobject_long)
        .bind(map.play_count)
        .bind(map.fail_count)
        .bind(map.mods_pending)
        .bind(map.mods_accepted)
        .bind(map.mods_denied)
        .bind(map.mods_ignored)
        .bind(map.online_offset)
        .bind(map.clan_ranked)
        .execute(&mut **tx)
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_placeholder_counts_match_columns() {
        assert_eq!(UPSERT_MAPSET.matches('?').count(), 15);
        assert_eq!(UPSERT_MAP.matches('?').count(), 27);
    }
}
