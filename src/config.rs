use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use crate::services::adaptation::AdaptationConfig;
use crate::services::classifier::ClassifierConfig;
use crate::services::explanation::ExplanationConfig;
use crate::services::level::LevelConfig;

#[derive(Debug, Clone)]
pub struct Config {
    pub host: IpAddr,
    pub port: u16,
    pub log_level: String,
}

impl Config {
    pub fn from_env() -> Self {
        let port = env_parse::<u16>("PORT").unwrap_or(3000);
        let host = env_parse::<IpAddr>("HOST").unwrap_or(IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0)));
        let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());

        Self {
            host,
            port,
            log_level,
        }
    }

    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

/// Tunables of the proficiency engine, read once at startup.
#[derive(Debug, Clone, Default)]
pub struct EngineConfig {
    pub classifier: ClassifierConfig,
    pub level: LevelConfig,
    pub explanation: ExplanationConfig,
    pub adaptation: AdaptationConfig,
}

impl EngineConfig {
    pub fn from_env() -> Self {
        Self {
            classifier: ClassifierConfig::from_env(),
            level: LevelConfig::from_env(),
            explanation: ExplanationConfig::from_env(),
            adaptation: AdaptationConfig::from_env(),
        }
    }
}

pub(crate) fn env_string(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

pub(crate) fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    env_string(key)?.trim().parse().ok()
}

pub(crate) fn env_bool(key: &str) -> Option<bool> {
    let value = env_string(key)?;
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
