use std::env;

use serde::Serialize;

const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 8080;
const DEFAULT_LOG_FILTER: &str = "info";

#[derive(Clone, Debug)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub session_string: Option<String>,
    pub log_filter: String,
}

impl Config {
    pub fn load() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let host = lookup("TG_CLEANER_HOST")
            .map(|host| host.trim().to_string())
            .filter(|host| !host.is_empty())
            .unwrap_or_else(|| DEFAULT_HOST.to_string());
        let port = lookup("PORT")
            .and_then(|port| port.trim().parse().ok())
            .unwrap_or(DEFAULT_PORT);
        let session_string = lookup("SESSION_STRING")
            .map(|session| session.trim().to_string())
            .filter(|session| !session.is_empty());
        let log_filter = lookup("TG_CLEANER_LOG")
            .filter(|filter| !filter.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string());

        Self {
            host,
            port,
            session_string,
            log_filter,
        }
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// What `doctor` reports; never includes the session itself.
    pub fn summary(&self) -> ConfigSummary {
        ConfigSummary {
            host: self.host.clone(),
            port: self.port,
            session_seeded: self.session_string.is_some(),
            log_filter: self.log_filter.clone(),
        }
    }
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigSummary {
    pub host: String,
    pub port: u16,
    pub session_seeded: bool,
    pub log_filter: String,
}
