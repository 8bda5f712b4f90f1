use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;

use tracing::warn;

/// Runtime configuration, environment-driven like the rest of the deployment
/// surface. Unset variables fall back to defaults; unparsable values warn
/// and fall back rather than abort.
#[derive(Debug, Clone)]
pub struct Config {
    pub http_host: String,
    pub http_port: u16,
    pub data_dir: PathBuf,
    pub world_seed: u64,
    pub max_query_tiles: usize,
}

impl Config {
    pub fn from_env() -> Config {
        Config {
            http_host: std::env::var("HTTP_HOST").unwrap_or_else(|_| "0.0.0.0".into()),
            http_port: env_parse("HTTP_PORT", 8080),
            data_dir: std::env::var("WORLD_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("MapData")),
            world_seed: env_parse("WORLD_SEED", 12345),
            max_query_tiles: env_parse("MAP_MAX_TILES", 65_536),
        }
    }
}

fn env_parse<T: FromStr + Display>(key: &str, default: T) -> T {
    match std::env::var(key) {
        Ok(raw) => match raw.parse() {
            Ok(value) => value,
            Err(_) => {
                warn!(key, value = %raw, fallback = %default, "unparsable value, using default");
                default
            }
        },
        Err(_) => default,
    }
}
