//! ランク譜面カタログ

mod client;
mod types;

pub use client::QuaverApi;
pub use types::{parse_timestamp, Map, Mapset};
