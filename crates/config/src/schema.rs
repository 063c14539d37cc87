//! Config schema types for the update checker and platform targets.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::platform::Platform;

/// Default GitHub REST endpoint.
pub const DEFAULT_GITHUB_API: &str = "https://api.github.com";

/// User agent sent with every GitHub request.
pub const DEFAULT_USER_AGENT: &str = "claude-skills-remote-update-checker";

/// One day.
pub const DEFAULT_COOLDOWN_SECS: u64 = 24 * 60 * 60;

pub const DEFAULT_TIMEOUT_MS: u64 = 10_000;

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SkillpackConfig {
    pub update_check: UpdateCheckConfig,
    pub targets: TargetsConfig,
}

/// Remote update check settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UpdateCheckConfig {
    /// Minimum seconds between two checks of the same remote source.
    pub cooldown_secs: u64,
    /// Per-request timeout in milliseconds.
    pub timeout_ms: u64,
    /// Base URL of the GitHub REST API (overridable for GitHub Enterprise).
    pub api_base: String,
    pub user_agent: String,
}

impl Default for UpdateCheckConfig {
    fn default() -> Self {
        Self {
            cooldown_secs: DEFAULT_COOLDOWN_SECS,
            timeout_ms: DEFAULT_TIMEOUT_MS,
            api_base: DEFAULT_GITHUB_API.into(),
            user_agent: DEFAULT_USER_AGENT.into(),
        }
    }
}

impl UpdateCheckConfig {
    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Which tool config directories are scanned for manifests.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TargetsConfig {
    pub platforms: Vec<Platform>,
}

impl Default for TargetsConfig {
    fn default() -> Self {
        Self {
            platforms: vec![Platform::Claude],
        }
    }
}
