/// Configuration for the scraper process
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Environment variable consulted when no config path is passed on the command line
pub const CONFIG_ENV_VAR: &str = "SCRAPER_CONFIG";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {message}")]
    Read { path: String, message: String },

    #[error("Failed to parse config file {path}: {message}")]
    Parse { path: String, message: String },

    #[error("Invalid config: {message}")]
    Invalid { message: String },
}

/// How the per-department sub-pipelines of a cycle are run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    /// One task per department, all in flight together
    #[default]
    Concurrent,
    /// Departments scraped one after another
    Sequential,
}

/// Static settings read once at startup
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScraperConfig {
    /// Index page listing every department
    pub root_url: String,
    /// Directory holding `switch.db`, `store_a.db` and `store_b.db`
    pub data_dir: PathBuf,
    /// Pause between launching two department sub-pipelines
    pub launch_delay_ms: u64,
    /// Pause between the end of one cycle and the start of the next
    pub cycle_interval_secs: u64,
    pub connect_timeout_secs: u64,
    pub request_timeout_secs: u64,
    pub user_agent: String,
    pub mode: ExecutionMode,
    /// Address for the read API; no server is started when unset
    pub bind_address: Option<String>,
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            root_url: "https://www.washington.edu/students/timeschd/AUT2024/".to_string(),
            data_dir: PathBuf::from("data"),
            launch_delay_ms: 250,
            cycle_interval_secs: 30 * 60,
            connect_timeout_secs: 10,
            request_timeout_secs: 30,
            user_agent: concat!("schedule_scraper/", env!("CARGO_PKG_VERSION")).to_string(),
            mode: ExecutionMode::Concurrent,
            bind_address: None,
        }
    }
}

impl ScraperConfig {
    /// Loads and validates a JSON config file. Missing fields take their defaults.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;

        let config: ScraperConfig = serde_json::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Loads the config named by `path`, falling back to [`CONFIG_ENV_VAR`] and
    /// then to the defaults.
    pub fn load(path: Option<PathBuf>) -> Result<Self, ConfigError> {
        match path.or_else(|| std::env::var_os(CONFIG_ENV_VAR).map(PathBuf::from)) {
            Some(path) => Self::load_from_file(&path),
            None => {
                let config = Self::default();
                config.validate()?;
                Ok(config)
            }
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.root()?;
        if self.request_timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                message: "request_timeout_secs must be positive".to_string(),
            });
        }
        Ok(())
    }

    /// The parsed root URL, used as the base for relative department links
    pub fn root(&self) -> Result<Url, ConfigError> {
        Url::parse(&self.root_url).map_err(|e| ConfigError::Invalid {
            message: format!("root_url '{}': {}", self.root_url, e),
        })
    }

    pub fn launch_delay(&self) -> Duration {
        Duration::from_millis(self.launch_delay_ms)
    }

    pub fn cycle_interval(&self) -> Duration {
        Duration::from_secs(self.cycle_interval_secs)
    }
}
