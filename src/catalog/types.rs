//! カタログAPIの型定義

use chrono::{DateTime, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// Mapset（譜面セット）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mapset {
    pub id: i64,
    pub creator_id: Option<i64>,
    pub creator_username: Option<String>,
    pub creator_avatar_url: Option<String>,
    pub artist: Option<String>,
    pub title: Option<String>,
    pub source: Option<String>,
    pub tags: Option<String>,
    pub description: Option<String>,
    pub date_submitted: Option<String>,
    pub date_last_updated: Option<String>,
    pub ranking_queue_status: Option<i64>,
    pub ranking_queue_last_updated: Option<String>,
    pub ranking_queue_vote_count: Option<i64>,
    pub mapset_ranking_queue_id: Option<i64>,
    #[serde(default)]
    pub maps: Vec<Map>,
}

impl Mapset {
    /// IDだけのMapset（テスト・プレースホルダー用）
    pub fn with_id(id: i64) -> Self {
        Self {
            id,
            creator_id: None,
            creator_username: None,
            creator_avatar_url: None,
            artist: None,
            title: None,
            source: None,
            tags: None,
            description: None,
            date_submitted: None,
            date_last_updated: None,
            ranking_queue_status: None,
            ranking_queue_last_updated: None,
            ranking_queue_vote_count: None,
            mapset_ranking_queue_id: None,
            maps: Vec::new(),
        }
    }
}

/// Map（個別の譜面）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Map {
    pub id: i64,
    pub mapset_id: i64,
    pub md5: String,
    pub alternative_md5: Option<String>,
    pub creator_id: Option<i64>,
    pub creator_username: Option<String>,
    pub game_mode: Option<i64>,
    pub ranked_status: Option<i64>,
    pub artist: Option<String>,
    pub title: Option<String>,
    pub source: Option<String>,
    pub tags: Option<String>,
    pub description: Option<String>,
    pub difficulty_name: Option<String>,
    pub length: Option<i64>,
    pub bpm: Option<f64>,
    pub difficulty_rating: Option<f64>,
    pub count_hitobject_normal: Option<i64>,
    pub count_hitobject_long: Option<i64>,
    pub play_count: Option<i64>,
    pub fail_count: Option<i64>,
    pub mods_pending: Option<i64>,
    pub mods_accepted: Option<i64>,
    pub mods_denied: Option<i64>,
    pub mods_ignored: Option<i64>,
    pub online_offset: Option<i64>,
    pub clan_ranked: Option<i64>,
}

/// `GET /v1/mapsets/ranked`
#[derive(Debug, Deserialize)]
pub(crate) struct RankedResponse {
    pub mapsets: Vec<i64>,
}

/// `GET /v1/mapsets/{id}`
#[derive(Debug, Deserialize)]
pub(crate) struct MapsetResponse {
    pub mapset: Mapset,
}

/// APIの日時文字列をDB用に変換する。解釈できなければ None
pub fn parse_timestamp(value: Option<&str>) -> Option<NaiveDateTime> {
    let value = value?.trim();
    if value.is_empty() {
        return None;
    }

    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.naive_utc())
        .or_else(|_| NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S"))
        .or_else(|_| NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f"))
        .ok()
}
