use crate::core::{Result, SyncError};
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_COLLECTION: &str = "prospects";
pub const DEFAULT_FIELD_DEBOUNCE: Duration = Duration::from_millis(500);
pub const DEFAULT_GEOMETRY_DEBOUNCE: Duration = Duration::from_millis(500);
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Where flushes are persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PersistenceMode {
    /// Local key-value store only; no network calls.
    #[default]
    Demo,
    /// REST collection behind `api_base_url`.
    Remote,
}

impl FromStr for PersistenceMode {
    type Err = SyncError;

    fn from_str(raw: &str) -> Result<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "demo" | "local" | "offline" => Ok(Self::Demo),
            "remote" | "rest" | "networked" | "api" => Ok(Self::Remote),
            other => Err(SyncError::config(format!(
                "mode must be one of: demo, remote (got '{}')",
                other
            ))),
        }
    }
}

/// What happens to an unflushed patch when the selection moves to another
/// prospect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SwitchPolicy {
    /// Persist the previous prospect's patch in the background.
    #[default]
    Flush,
    /// Drop the previous prospect's patch and restore its view.
    Discard,
}

impl FromStr for SwitchPolicy {
    type Err = SyncError;

    fn from_str(raw: &str) -> Result<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "flush" => Ok(Self::Flush),
            "discard" => Ok(Self::Discard),
            other => Err(SyncError::config(format!(
                "switch policy must be one of: flush, discard (got '{}')",
                other
            ))),
        }
    }
}

/// Synchronizer configuration
#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub mode: PersistenceMode,

    /// Base URL of the REST service, e.g. `https://api.example.com/v1`
    pub api_base_url: Option<String>,

    /// Bearer token sent with every remote request
    pub api_token: Option<String>,

    /// Collection path segment
    pub collection: String,

    /// Idle window before queued field edits are flushed
    pub field_debounce: Duration,

    /// Idle window before vertex edits are flushed
    pub geometry_debounce: Duration,

    pub request_timeout: Duration,

    /// Namespaces local keys; `None` uses the device namespace
    pub user_id: Option<String>,

    /// Directory for the file store; `None` keeps demo data in memory
    pub data_dir: Option<PathBuf>,

    pub switch_policy: SwitchPolicy,

    /// Capacity of the broadcast channel carrying flush outcomes
    pub event_capacity: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            mode: PersistenceMode::Demo,
            api_base_url: None,
            api_token: None,
            collection: DEFAULT_COLLECTION.to_string(),
            field_debounce: DEFAULT_FIELD_DEBOUNCE,
            geometry_debounce: DEFAULT_GEOMETRY_DEBOUNCE,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            user_id: None,
            data_dir: None,
            switch_policy: SwitchPolicy::Flush,
            event_capacity: 64,
        }
    }
}

impl SyncConfig {
    /// Demo-mode configuration
    pub fn demo() -> Self {
        Self::default()
    }

    /// Remote configuration against `base_url`
    pub fn remote(base_url: &str) -> Self {
        Self {
            mode: PersistenceMode::Remote,
            api_base_url: Some(base_url.trim_end_matches('/').to_string()),
            ..Self::default()
        }
    }

    pub fn api_token(mut self, token: &str) -> Self {
        self.api_token = Some(token.to_string());
        self
    }

    pub fn collection(mut self, collection: &str) -> Self {
        self.collection = collection.trim_matches('/').to_string();
        self
    }

    pub fn field_debounce(mut self, delay: Duration) -> Self {
        self.field_debounce = delay;
        self
    }

    pub fn geometry_debounce(mut self, delay: Duration) -> Self {
        self.geometry_debounce = delay;
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn user_id(mut self, user_id: &str) -> Self {
        self.user_id = Some(user_id.to_string());
        self
    }

    pub fn data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = Some(dir.into());
        self
    }

    pub fn switch_policy(mut self, policy: SwitchPolicy) -> Self {
        self.switch_policy = policy;
        self
    }

    /// Loads `.env` if present, then reads `PROSPECT_SYNC_*` variables.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let mut config = Self::default();

        if let Ok(mode) = env::var("PROSPECT_SYNC_MODE") {
            config.mode = mode.parse()?;
        }
        if let Ok(url) = env::var("PROSPECT_SYNC_API_URL") {
            config.api_base_url = Some(url.trim_end_matches('/').to_string());
        }
        config.api_token = env::var("PROSPECT_SYNC_API_TOKEN").ok();
        if let Ok(collection) = env::var("PROSPECT_SYNC_COLLECTION") {
            config = config.collection(&collection);
        }
        if let Some(ms) = parse_millis("PROSPECT_SYNC_DEBOUNCE_MS")? {
            config.field_debounce = ms;
        }
        if let Some(ms) = parse_millis("PROSPECT_SYNC_GEOMETRY_DEBOUNCE_MS")? {
            config.geometry_debounce = ms;
        }
        if let Some(ms) = parse_millis("PROSPECT_SYNC_REQUEST_TIMEOUT_MS")? {
            config.request_timeout = ms;
        }
        config.user_id = env::var("PROSPECT_SYNC_USER_ID").ok();
        config.data_dir = env::var("PROSPECT_SYNC_DATA_DIR").ok().map(PathBuf::from);
        if let Ok(policy) = env::var("PROSPECT_SYNC_SWITCH_POLICY") {
            config.switch_policy = policy.parse()?;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.mode == PersistenceMode::Remote && self.api_base_url.is_none() {
            return Err(SyncError::config("remote mode requires an API base URL"));
        }
        if self.collection.is_empty() {
            return Err(SyncError::config("collection must not be empty"));
        }
        if self.event_capacity == 0 {
            return Err(SyncError::config("event capacity must be positive"));
        }
        Ok(())
    }
}

fn parse_millis(var: &str) -> Result<Option<Duration>> {
    match env::var(var) {
        Ok(raw) => raw
            .trim()
            .parse::<u64>()
            .map(|ms| Some(Duration::from_millis(ms)))
            .map_err(|_| SyncError::config(format!("{} must be a whole number of milliseconds", var))),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SyncConfig::demo();
        assert_eq!(config.mode, PersistenceMode::Demo);
        assert_eq!(config.field_debounce, Duration::from_millis(500));
        assert_eq!(config.collection, "prospects");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder() {
        let config = SyncConfig::remote("https://api.example.com/v1/")
            .api_token("secret")
            .collection("/listings/")
            .field_debounce(Duration::from_millis(450))
            .user_id("u1")
            .switch_policy(SwitchPolicy::Discard);

        assert_eq!(config.api_base_url.as_deref(), Some("https://api.example.com/v1"));
        assert_eq!(config.collection, "listings");
        assert_eq!(config.field_debounce, Duration::from_millis(450));
        assert_eq!(config.switch_policy, SwitchPolicy::Discard);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_remote_without_url_is_rejected() {
        let config = SyncConfig {
            mode: PersistenceMode::Remote,
            ..SyncConfig::default()
        };
        assert!(matches!(config.validate(), Err(SyncError::Config(_))));
    }

    #[test]
    fn test_parse_mode_and_policy() {
        assert_eq!("REMOTE".parse::<PersistenceMode>().unwrap(), PersistenceMode::Remote);
        assert_eq!("local".parse::<PersistenceMode>().unwrap(), PersistenceMode::Demo);
        assert!("cloud".parse::<PersistenceMode>().is_err());
        assert_eq!("discard".parse::<SwitchPolicy>().unwrap(), SwitchPolicy::Discard);
    }
}
