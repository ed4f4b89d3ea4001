use std::{env, fmt::Display, fs::read_to_string, path::PathBuf, str::FromStr};

use draw::Strategy;
use tracing::{info, warn};

use crate::utils::parse_participants;

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub kv_url: Option<String>,
    pub data_dir: PathBuf,
    pub participants: Vec<String>,
    pub strategy: Strategy,
}

impl Config {
    pub fn load() -> Self {
        Self {
            port: try_load("RUST_PORT", "1111"),
            kv_url: optional("KV_URL").or_else(|| read_secret("KV_URL")),
            data_dir: try_load("SANTA_DATA_DIR", "data"),
            participants: parse_participants(&optional("SANTA_PARTICIPANTS").unwrap_or_default()),
            strategy: try_load("SANTA_DRAW_STRATEGY", "queue"),
        }
    }
}

fn var(key: &str) -> Result<String, ()> {
    env::var(key).map_err(|_| {
        warn!("Environment variable {key} not found, using default");
    })
}

fn optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn try_load<T: FromStr>(key: &str, default: &str) -> T
where
    T::Err: Display,
{
    var(key)
        .unwrap_or_else(|_| {
            info!("{key} not set, using default: {default}");
            default.to_string()
        })
        .parse()
        .map_err(|e| {
            warn!("Invalid {key} value: {e}");
        })
        .expect("Environment misconfigured!")
}

fn read_secret(secret_name: &str) -> Option<String> {
    let path = format!("/run/secrets/{secret_name}");

    read_to_string(&path)
        .map(|s| s.trim().to_string())
        .map_err(|e| {
            info!("No {secret_name} secret file: {e}");
        })
        .ok()
        .filter(|s| !s.is_empty())
}
