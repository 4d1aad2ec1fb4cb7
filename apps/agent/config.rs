use alloy::primitives::Address;
use serde::Deserialize;
use std::{collections::HashMap, env, fs, time::Duration};
use thiserror::Error;
use tracing::{info, warn};

pub const DEFAULT_CONFIG_PATH: &str = "degov-agent.yaml";
pub const DEFAULT_OPT_OUT_MARKER: &str = "[degov-agent:skip]";
pub const DEFAULT_OPENROUTER_BASE_URL: &str = "https://openrouter.ai/api/v1";
pub const DEFAULT_OPENROUTER_MODEL: &str = "google/gemini-2.5-flash";
pub const DEFAULT_X_API_BASE_URL: &str = "https://api.x.com";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} environment variable not set")]
    MissingEnv(String),
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("config file {0} lists no DAOs")]
    NoDaos(String),
}

#[derive(Debug, Clone, Deserialize)]
pub struct AgentConfig {
    pub daos: Vec<DaoConfig>,
}

/// One tracked DAO. Every per-DAO job is instantiated from one of these.
#[derive(Debug, Clone, Deserialize)]
pub struct DaoConfig {
    pub code: String,
    pub name: String,
    pub chain_id: i32,
    pub indexer_endpoint: String,
    pub governor: Address,
    pub rpc_url: String,
    pub x_profile: String,
    #[serde(default)]
    pub website: Option<String>,
    #[serde(default)]
    pub explorer: Option<String>,
    #[serde(default = "default_opt_out_marker")]
    pub opt_out_marker: String,
    #[serde(default)]
    pub start_block: i64,
}

fn default_opt_out_marker() -> String {
    DEFAULT_OPT_OUT_MARKER.to_string()
}

impl DaoConfig {
    pub fn proposal_url(&self, proposal_id: &str) -> Option<String> {
        self.website.as_ref().map(|website| {
            format!(
                "{}/proposal/{}",
                website.trim_end_matches('/'),
                proposal_id
            )
        })
    }

    pub fn transaction_url(&self, transaction_hash: &str) -> String {
        match &self.explorer {
            Some(explorer) => format!("{}/tx/{}", explorer.trim_end_matches('/'), transaction_hash),
            None => transaction_hash.to_string(),
        }
    }

    pub fn is_opted_out(&self, description: &str) -> bool {
        let marker = self.opt_out_marker.trim().to_lowercase();
        !marker.is_empty() && description.to_lowercase().contains(&marker)
    }
}

impl AgentConfig {
    pub fn load() -> Result<Self, ConfigError> {
        let path = env::var("DEGOV_AGENT_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        let contents = fs::read_to_string(&path).map_err(|source| ConfigError::Read {
            path: path.clone(),
            source,
        })?;
        let config = Self::from_yaml(&path, &contents)?;

        info!(
            path = %path,
            daos = config.daos.len(),
            "Agent config loaded"
        );

        Ok(config)
    }

    pub fn from_yaml(path: &str, contents: &str) -> Result<Self, ConfigError> {
        let config: AgentConfig = serde_yaml::from_str(contents).map_err(|source| ConfigError::Parse {
            path: path.to_string(),
            source,
        })?;
        if config.daos.is_empty() {
            return Err(ConfigError::NoDaos(path.to_string()));
        }
        Ok(config)
    }

    pub fn profiles(&self) -> Vec<String> {
        let mut profiles: Vec<String> = self.daos.iter().map(|dao| dao.x_profile.clone()).collect();
        profiles.sort();
        profiles.dedup();
        profiles
    }
}

#[derive(Debug, Clone)]
pub struct XCredentials {
    pub access_token: String,
    pub user_id: String,
}

#[derive(Debug, Clone)]
pub struct Secrets {
    pub database_url: String,
    pub private_key: String,
    pub openrouter_api_key: String,
    pub openrouter_model: String,
    pub openrouter_base_url: String,
    pub x_api_base_url: String,
    pub x_profiles: HashMap<String, XCredentials>,
}

impl Secrets {
    pub fn from_env(profiles: &[String]) -> Result<Self, ConfigError> {
        let mut x_profiles = HashMap::new();
        for profile in profiles {
            let prefix = format!("X_{}", profile.to_uppercase().replace('-', "_"));
            x_profiles.insert(
                profile.clone(),
                XCredentials {
                    access_token: required(&format!("{prefix}_ACCESS_TOKEN"))?,
                    user_id: required(&format!("{prefix}_USER_ID"))?,
                },
            );
        }

        Ok(Self {
            database_url: required("DATABASE_URL")?,
            private_key: required("DEGOV_AGENT_PRIVATE_KEY")?,
            openrouter_api_key: required("OPENROUTER_API_KEY")?,
            openrouter_model: env::var("OPENROUTER_MODEL")
                .unwrap_or_else(|_| DEFAULT_OPENROUTER_MODEL.to_string()),
            openrouter_base_url: env::var("OPENROUTER_BASE_URL")
                .unwrap_or_else(|_| DEFAULT_OPENROUTER_BASE_URL.to_string()),
            x_api_base_url: env::var("X_API_BASE_URL")
                .unwrap_or_else(|_| DEFAULT_X_API_BASE_URL.to_string()),
            x_profiles,
        })
    }
}

fn required(name: &str) -> Result<String, ConfigError> {
    match env::var(name) {
        Ok(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(ConfigError::MissingEnv(name.to_string())),
    }
}

/// Intervals, pacing and page sizes shared by every job.
#[derive(Debug, Clone)]
pub struct JobOptions {
    pub discovery_interval: Duration,
    pub status_interval: Duration,
    pub sync_interval: Duration,
    pub vote_relay_interval: Duration,
    pub fulfillment_interval: Duration,
    pub tweet_delay: Duration,
    pub discovery_page_size: usize,
    pub vote_page_size: usize,
    pub ai_attempts: usize,
    pub ai_retry_delay: Duration,
}

impl Default for JobOptions {
    fn default() -> Self {
        Self {
            discovery_interval: Duration::from_secs(3 * 60),
            status_interval: Duration::from_secs(3 * 60),
            sync_interval: Duration::from_secs(60),
            vote_relay_interval: Duration::from_secs(5 * 60),
            fulfillment_interval: Duration::from_secs(2 * 60),
            tweet_delay: Duration::from_secs(1),
            discovery_page_size: 10,
            vote_page_size: 20,
            ai_attempts: 3,
            ai_retry_delay: Duration::from_secs(2),
        }
    }
}

impl JobOptions {
    pub fn from_env() -> Self {
        let mut options = Self::default();
        apply_env_overrides(&mut options);
        options
    }
}

fn apply_env_overrides(options: &mut JobOptions) {
    let intervals: [(&str, &mut Duration); 5] = [
        ("DEGOV_AGENT_DISCOVERY_INTERVAL_SECS", &mut options.discovery_interval),
        ("DEGOV_AGENT_STATUS_INTERVAL_SECS", &mut options.status_interval),
        ("DEGOV_AGENT_SYNC_INTERVAL_SECS", &mut options.sync_interval),
        ("DEGOV_AGENT_VOTE_RELAY_INTERVAL_SECS", &mut options.vote_relay_interval),
        ("DEGOV_AGENT_FULFILLMENT_INTERVAL_SECS", &mut options.fulfillment_interval),
    ];

    for (name, slot) in intervals {
        if let Ok(value) = env::var(name) {
            match value.parse::<u64>() {
                Ok(secs) if secs > 0 => *slot = Duration::from_secs(secs),
                Ok(_) => warn!(variable = name, "Interval override must be positive, keeping default"),
                Err(err) => warn!(error = %err, variable = name, "Failed to parse interval override"),
            }
        }
    }

    if let Ok(value) = env::var("DEGOV_AGENT_TWEET_DELAY_MS") {
        match value.parse::<u64>() {
            Ok(ms) => options.tweet_delay = Duration::from_millis(ms),
            Err(err) => warn!(error = %err, "Failed to parse DEGOV_AGENT_TWEET_DELAY_MS override"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    const SAMPLE: &str = r##"
daos:
  - code: ring-dao
    name: RingDAO
    chain_id: 46
    indexer_endpoint: https://indexer.example.org/graphql
    governor: "0x52cDD25f7C83c335236Ce209fA1ec8e197E96533"
    rpc_url: https://rpc.darwinia.network
    x_profile: degov
    website: https://gov.ringdao.com/
    explorer: https://explorer.darwinia.network
  - code: other-dao
    name: Other
    chain_id: 1
    indexer_endpoint: https://indexer.example.org/other
    governor: "0x0000000000000000000000000000000000000001"
    rpc_url: https://eth.llamarpc.com
    x_profile: degov
    opt_out_marker: "#no-tweet"
"##;

    #[test]
    fn parses_dao_list_with_defaults() {
        let config = AgentConfig::from_yaml("sample.yaml", SAMPLE).unwrap();
        assert_eq!(config.daos.len(), 2);
        let ring = &config.daos[0];
        assert_eq!(ring.code, "ring-dao");
        assert_eq!(ring.opt_out_marker, DEFAULT_OPT_OUT_MARKER);
        assert_eq!(ring.start_block, 0);
        assert_eq!(config.daos[1].opt_out_marker, "#no-tweet");
        assert_eq!(config.profiles(), vec!["degov".to_string()]);
    }

    #[test]
    fn empty_dao_list_is_rejected() {
        let result = AgentConfig::from_yaml("empty.yaml", "daos: []");
        assert!(matches!(result, Err(ConfigError::NoDaos(_))));
    }

    #[test]
    fn builds_links_from_dao_settings() {
        let config = AgentConfig::from_yaml("sample.yaml", SAMPLE).unwrap();
        let ring = &config.daos[0];
        assert_eq!(
            ring.proposal_url("42").as_deref(),
            Some("https://gov.ringdao.com/proposal/42")
        );
        assert_eq!(
            ring.transaction_url("0xabc"),
            "https://explorer.darwinia.network/tx/0xabc"
        );
        assert_eq!(config.daos[1].transaction_url("0xabc"), "0xabc");
        assert_eq!(config.daos[1].proposal_url("42"), None);
    }

    #[test]
    fn opt_out_marker_is_case_insensitive() {
        let config = AgentConfig::from_yaml("sample.yaml", SAMPLE).unwrap();
        let ring = &config.daos[0];
        assert!(ring.is_opted_out("# Title\n\n[DeGov-Agent:Skip] internal housekeeping"));
        assert!(!ring.is_opted_out("# Title\n\nregular proposal"));
    }

    #[test]
    #[serial]
    fn missing_required_env_is_reported() {
        unsafe {
            env::remove_var("DATABASE_URL");
        }
        let result = Secrets::from_env(&[]);
        assert!(matches!(result, Err(ConfigError::MissingEnv(name)) if name == "DATABASE_URL"));
    }

    #[test]
    #[serial]
    fn interval_overrides_apply() {
        unsafe {
            env::set_var("DEGOV_AGENT_SYNC_INTERVAL_SECS", "15");
            env::set_var("DEGOV_AGENT_STATUS_INTERVAL_SECS", "zero");
        }
        let options = JobOptions::from_env();
        assert_eq!(options.sync_interval, Duration::from_secs(15));
        assert_eq!(options.status_interval, JobOptions::default().status_interval);
        unsafe {
            env::remove_var("DEGOV_AGENT_SYNC_INTERVAL_SECS");
            env::remove_var("DEGOV_AGENT_STATUS_INTERVAL_SECS");
        }
    }
}
