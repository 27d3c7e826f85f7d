//! Configuration loading and management.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use prof_recorder::{RecorderContext, SntpClient, sntp};
use serde::{Deserialize, Serialize};

/// Application configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct Config {
    /// Directory holding `.prof` files.
    pub profile_dir: PathBuf,
    /// Whether recorders query a time server at startup.
    pub ntp_enabled: bool,
    /// SNTP server used for clock calibration.
    pub ntp_host: String,
    /// Upper bound for the time server query, in milliseconds.
    pub ntp_timeout_ms: u64,
    /// States that end an entity's lifecycle.
    pub final_states: Vec<String>,
    /// The final state a genuine outcome supersedes.
    pub canceled_state: String,
    /// Uid for events without one. A fresh UUID is used when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("profile_dir", &self.profile_dir)
            .field("ntp_enabled", &self.ntp_enabled)
            .field("ntp_host", &self.ntp_host)
            .field("final_states", &self.final_states)
            .field("canceled_state", &self.canceled_state)
            .finish_non_exhaustive()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            profile_dir: PathBuf::from("."),
            ntp_enabled: true,
            ntp_host: sntp::DEFAULT_NTP_HOST.to_string(),
            ntp_timeout_ms: 1000,
            final_states: vec!["DONE".into(), "FAILED".into(), "CANCELED".into()],
            canceled_state: "CANCELED".into(),
            session_id: None,
        }
    }
}

impl Config {
    /// Loads configuration, optionally from a specific file.
    #[expect(
        clippy::result_large_err,
        reason = "figment::Error is large but only returned at startup"
    )]
    pub fn load_from(config_path: Option<&Path>) -> Result<Self, figment::Error> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        // Load from default config location
        if let Some(config_dir) = dirs_config_path() {
            figment = figment.merge(Toml::file(config_dir.join("config.toml")));
        }

        // Load from specified config file
        if let Some(path) = config_path {
            figment = figment.merge(Toml::file(path));
        }

        // Load from environment variables (PROF_*)
        figment = figment.merge(Env::prefixed("PROF_"));

        figment.extract()
    }

    /// Builds the process-wide recorder context described by this config.
    pub fn recorder_context(&self) -> RecorderContext {
        if self.ntp_enabled {
            RecorderContext::new(SntpClient::new(&self.ntp_host))
                .with_timeout(Duration::from_millis(self.ntp_timeout_ms))
        } else {
            RecorderContext::system_only()
        }
    }
}

/// Returns the platform-specific config directory for prof.
fn dirs_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("prof"))
}
