//! Configuration for the Fledge frame runtime.
//!
//! Read from `~/.fledge/config.toml`. Every section is optional; the
//! `resolved_*` accessors fill in defaults so callers never branch on `Option`.
//!
//! ```toml
//! [store]
//! path = "~/.fledge/interest_groups.db"
//!
//! [signals]
//! timeout_secs = 30
//! user_agent = "fledge/0.0.0"
//! require_allow_header = true
//! max_response_bytes = 1048576
//!
//! [protocol]
//! failure_policy = "post_failure"
//! ```

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

const CONFIG_DIR: &str = ".fledge";
const CONFIG_FILE: &str = "config.toml";
const DEFAULT_DB_FILE: &str = "interest_groups.db";

pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_MAX_RESPONSE_BYTES: usize = 1024 * 1024;
pub const DEFAULT_USER_AGENT: &str = concat!("fledge/", env!("CARGO_PKG_VERSION"));

// Default value function for serde (bool::default() is false, so only true needs a fn)
const fn default_true() -> bool {
    true
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FledgeConfig {
    pub store: Option<StoreConfig>,
    pub signals: Option<SignalsConfig>,
    pub protocol: Option<ProtocolConfig>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config at {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config at {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

impl ConfigError {
    #[must_use]
    pub fn path(&self) -> &Path {
        match self {
            ConfigError::Read { path, .. } | ConfigError::Parse { path, .. } => path,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StoreConfig {
    /// Database file. A leading `~/` expands to the home directory.
    pub path: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SignalsConfig {
    pub timeout_secs: Option<u64>,
    pub user_agent: Option<String>,
    /// Require `X-Allow-FLEDGE: true` on signal responses. Default: true.
    #[serde(default = "default_true")]
    pub require_allow_header: bool,
    pub max_response_bytes: Option<usize>,
}

impl Default for SignalsConfig {
    fn default() -> Self {
        Self {
            timeout_secs: None,
            user_agent: None,
            require_allow_header: true,
            max_response_bytes: None,
        }
    }
}

/// What happens to supplied reply ports when a request fails validation.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Post the no-winner marker on every port, then reject the call.
    #[default]
    PostFailure,
    /// Reject the call and leave the ports untouched.
    Silent,
}

impl FailurePolicy {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::PostFailure => "post_failure",
            Self::Silent => "silent",
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProtocolConfig {
    #[serde(default)]
    pub failure_policy: FailurePolicy,
}

/// Signal client settings with every default applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedSignalsConfig {
    pub timeout: Duration,
    pub user_agent: String,
    pub require_allow_header: bool,
    pub max_response_bytes: usize,
}

impl Default for ResolvedSignalsConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            require_allow_header: true,
            max_response_bytes: DEFAULT_MAX_RESPONSE_BYTES,
        }
    }
}

impl FledgeConfig {
    /// Load the config from the default location.
    ///
    /// A missing file (or no home directory) yields the all-defaults config.
    pub fn load() -> Result<Self, ConfigError> {
        match config_path() {
            Some(path) if path.exists() => Self::load_from(&path),
            _ => Ok(Self::default()),
        }
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(err) => {
                tracing::warn!("Failed to read config at {:?}: {}", path, err);
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source: err,
                });
            }
        };

        toml::from_str(&content).map_err(|err| {
            tracing::warn!("Failed to parse config at {:?}: {}", path, err);
            ConfigError::Parse {
                path: path.to_path_buf(),
                source: err,
            }
        })
    }

    #[must_use]
    pub fn path() -> Option<PathBuf> {
        config_path()
    }

    /// Database location; `None` only when no path is configured and there is no home directory.
    #[must_use]
    pub fn resolved_store_path(&self) -> Option<PathBuf> {
        match self.store.as_ref().and_then(|store| store.path.as_deref()) {
            Some(raw) => expand_home(raw),
            None => dirs::home_dir().map(|home| home.join(CONFIG_DIR).join(DEFAULT_DB_FILE)),
        }
    }

    #[must_use]
    pub fn resolved_signals(&self) -> ResolvedSignalsConfig {
        let defaults = ResolvedSignalsConfig::default();
        let Some(signals) = self.signals.as_ref() else {
            return defaults;
        };
        ResolvedSignalsConfig {
            timeout: signals
                .timeout_secs
                .filter(|secs| *secs > 0)
                .map_or(defaults.timeout, Duration::from_secs),
            user_agent: signals
                .user_agent
                .clone()
                .filter(|ua| !ua.trim().is_empty())
                .unwrap_or(defaults.user_agent),
            require_allow_header: signals.require_allow_header,
            max_response_bytes: signals
                .max_response_bytes
                .filter(|bytes| *bytes > 0)
                .unwrap_or(defaults.max_response_bytes),
        }
    }

    #[must_use]
    pub fn failure_policy(&self) -> FailurePolicy {
        self.protocol
            .as_ref()
            .map(|protocol| protocol.failure_policy)
            .unwrap_or_default()
    }
}

#[must_use]
pub fn config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(CONFIG_DIR).join(CONFIG_FILE))
}

fn expand_home(raw: &str) -> Option<PathBuf> {
    match raw.strip_prefix("~/") {
        Some(rest) => dirs::home_dir().map(|home| home.join(rest)),
        None => Some(PathBuf::from(raw)),
    }
}
