//! Application configuration, persisted via confy and overridable from the
//! command line.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::resolver::DEFAULT_RATE_LIMIT;

const APP_NAME: &str = "bounty";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Directory holding one subdirectory per session, named by start time.
    pub log_directory: PathBuf,
    /// The tracked player; only kills credited to this name are scored.
    pub nickname: String,
    pub rules_file: PathBuf,
    pub output_file: PathBuf,
    /// Clan lookups per second against the public API.
    pub api_rate_limit: u32,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            log_directory: default_log_directory(),
            nickname: String::new(),
            rules_file: PathBuf::from("rules.txt"),
            output_file: PathBuf::from("out.csv"),
            api_rate_limit: DEFAULT_RATE_LIMIT,
        }
    }
}

impl AppConfig {
    pub fn load() -> Result<Self, confy::ConfyError> {
        confy::load(APP_NAME, None)
    }
}

fn default_log_directory() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_default()
        .join(".local/share/starconflict/logs")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_round_trip_through_toml() {
        let cfg = AppConfig::default();
        let text = toml::to_string(&cfg).unwrap();
        let back: AppConfig = toml::from_str(&text).unwrap();
        assert_eq!(back.api_rate_limit, DEFAULT_RATE_LIMIT);
        assert_eq!(back.rules_file, cfg.rules_file);
    }
}
