use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::job::{JobWaiter, DEFAULT_MAX_ATTEMPTS, DEFAULT_POLL_INTERVAL};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Dubbing provider settings
    pub provider: ProviderConfig,

    /// Job polling settings
    pub polling: PollingConfig,

    /// Application settings
    pub app: AppConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// ElevenLabs API key; the ELEVENLABS_API_KEY environment variable and
    /// the --api-key flag take precedence
    pub api_key: String,

    /// API endpoint, overridable for self-hosted gateways
    pub base_url: String,

    /// Ask the provider to watermark dubbed audio (free-tier requirement)
    pub watermark: bool,

    /// Default target language code (if not specified on the command line)
    pub default_language: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollingConfig {
    /// Number of status checks before declaring a job timed out
    pub max_attempts: u32,

    /// Seconds between status checks
    pub interval_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Directory for final dubbed videos
    pub output_dir: PathBuf,

    /// Maximum clips dubbed concurrently in batch mode
    pub max_concurrent_jobs: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            provider: ProviderConfig {
                api_key: String::new(),
                base_url: crate::provider::DEFAULT_BASE_URL.to_string(),
                watermark: true,
                default_language: None,
            },
            polling: PollingConfig {
                max_attempts: DEFAULT_MAX_ATTEMPTS,
                interval_secs: DEFAULT_POLL_INTERVAL.as_secs(),
            },
            app: AppConfig {
                output_dir: PathBuf::from("output"),
                max_concurrent_jobs: 3,
            },
        }
    }
}

impl Config {
    /// Load configuration from file or create default
    pub async fn load() -> Result<Self> {
        let config_path = Self::config_path()?;

        if config_path.exists() {
            let content = fs_err::read_to_string(&config_path)
                .context("Failed to read config file")?;

            let config: Config = serde_yaml::from_str(&content)
                .context("Failed to parse config file")?;

            Ok(config)
        } else {
            let config = Self::default();
            config.save().await?;
            Ok(config)
        }
    }

    /// Save configuration to file
    pub async fn save(&self) -> Result<()> {
        let config_path = Self::config_path()?;

        if let Some(parent) = config_path.parent() {
            fs_err::create_dir_all(parent)?;
        }

        let content = serde_yaml::to_string(self)
            .context("Failed to serialize config")?;

        fs_err::write(&config_path, content)
            .context("Failed to write config file")?;

        Ok(())
    }

    /// Get configuration file path
    fn config_path() -> Result<PathBuf> {
        // First try current directory for easy testing
        let local_config = PathBuf::from("config.yaml");
        if local_config.exists() {
            return Ok(local_config);
        }

        let config_dir = dirs::config_dir()
            .context("Could not determine config directory")?;

        Ok(config_dir.join("polydub").join("config.yaml"))
    }

    /// Poll settings as a ready-to-use waiter
    pub fn waiter(&self) -> JobWaiter {
        JobWaiter::new(
            self.polling.max_attempts,
            Duration::from_secs(self.polling.interval_secs),
        )
    }

    /// Display current configuration
    pub fn display(&self) {
        println!("Current Configuration:");
        println!("  Base URL: {}", self.provider.base_url);
        println!(
            "  API Key: {}",
            if self.provider.api_key.is_empty() { "(not set)" } else { "(set)" }
        );
        println!("  Watermark: {}", self.provider.watermark);
        if let Some(lang) = &self.provider.default_language {
            println!("  Default Language: {}", lang);
        }
        println!("  Poll Interval: {}s", self.polling.interval_secs);
        println!("  Max Attempts: {}", self.polling.max_attempts);
        println!("  Output Dir: {}", self.app.output_dir.display());
        println!("  Max Concurrent Jobs: {}", self.app.max_concurrent_jobs);
    }

    /// Interactive configuration setup
    pub async fn interactive_setup(&self) -> Result<()> {
        println!("Interactive configuration setup coming soon!");
        println!("For now, please edit the config file manually:");
        println!("  {}", Self::config_path()?.display());
        Ok(())
    }
}
