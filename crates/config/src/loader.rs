use std::{
    path::{Path, PathBuf},
    sync::Mutex,
};

use tracing::{debug, warn};

use crate::schema::SkillpackConfig;

/// Config file name, checked in `./` then in the user config directory.
const CONFIG_FILENAME: &str = "skillpack.toml";

static CONFIG_DIR_OVERRIDE: Mutex<Option<PathBuf>> = Mutex::new(None);
static HOME_DIR_OVERRIDE: Mutex<Option<PathBuf>> = Mutex::new(None);

/// Load config from the given TOML file.
pub fn load_config(path: &Path) -> anyhow::Result<SkillpackConfig> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("failed to read {}: {e}", path.display()))?;
    let config = toml::from_str(&raw)
        .map_err(|e| anyhow::anyhow!("failed to parse {}: {e}", path.display()))?;
    Ok(config)
}

/// Discover and load config from standard locations, then apply
/// environment overrides.
///
/// Search order:
/// 1. `./skillpack.toml` (project-local)
/// 2. `~/.config/skillpack/skillpack.toml` (user-global)
///
/// Returns defaults if no config file is found or the file is invalid.
pub fn discover_and_load() -> SkillpackConfig {
    let mut config = match find_config_file() {
        Some(path) => {
            debug!(path = %path.display(), "loading config");
            load_config(&path).unwrap_or_else(|e| {
                warn!(path = %path.display(), error = %e, "failed to load config, using defaults");
                SkillpackConfig::default()
            })
        },
        None => {
            debug!("no config file found, using defaults");
            SkillpackConfig::default()
        },
    };
    apply_env_overrides(&mut config);
    config
}

/// Apply `SKILLPACK_*` environment variables on top of a loaded config.
pub fn apply_env_overrides(config: &mut SkillpackConfig) {
    apply_env_overrides_with(config, |name| std::env::var(name).ok());
}

fn apply_env_overrides_with(config: &mut SkillpackConfig, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(raw) = lookup("SKILLPACK_COOLDOWN_SECS") {
        match raw.trim().parse() {
            Ok(secs) => config.update_check.cooldown_secs = secs,
            Err(_) => warn!(value = %raw, "ignoring invalid SKILLPACK_COOLDOWN_SECS"),
        }
    }
    if let Some(raw) = lookup("SKILLPACK_TIMEOUT_MS") {
        match raw.trim().parse() {
            Ok(ms) => config.update_check.timeout_ms = ms,
            Err(_) => warn!(value = %raw, "ignoring invalid SKILLPACK_TIMEOUT_MS"),
        }
    }
    if let Some(api) = lookup("SKILLPACK_GITHUB_API")
        && !api.trim().is_empty()
    {
        config.update_check.api_base = api.trim().trim_end_matches('/').to_owned();
    }
}

fn find_config_file() -> Option<PathBuf> {
    let local = PathBuf::from(CONFIG_FILENAME);
    if local.exists() {
        return Some(local);
    }

    let global = config_dir()?.join(CONFIG_FILENAME);
    global.exists().then_some(global)
}

/// Returns the user-global config directory (`~/.config/skillpack/`), or the
/// override set with [`set_config_dir`].
pub fn config_dir() -> Option<PathBuf> {
    if let Some(dir) = read_override(&CONFIG_DIR_OVERRIDE) {
        return Some(dir);
    }
    directories::ProjectDirs::from("", "", "skillpack").map(|d| d.config_dir().to_path_buf())
}

/// Returns the user's home directory, or the override set with
/// [`set_home_dir`]. Falls back to `.` when no home can be determined.
pub fn home_dir() -> PathBuf {
    if let Some(dir) = read_override(&HOME_DIR_OVERRIDE) {
        return dir;
    }
    directories::BaseDirs::new()
        .map(|d| d.home_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("."))
}

pub fn set_config_dir(dir: PathBuf) {
    write_override(&CONFIG_DIR_OVERRIDE, Some(dir));
}

/// Redirect every home-relative path (personal manifests, script install
/// location) to `dir`.
pub fn set_home_dir(dir: PathBuf) {
    write_override(&HOME_DIR_OVERRIDE, Some(dir));
}

pub fn clear_home_dir() {
    write_override(&HOME_DIR_OVERRIDE, None);
}

fn read_override(slot: &Mutex<Option<PathBuf>>) -> Option<PathBuf> {
    slot.lock().unwrap_or_else(|e| e.into_inner()).clone()
}

fn write_override(slot: &Mutex<Option<PathBuf>>, value: Option<PathBuf>) {
    *slot.lock().unwrap_or_else(|e| e.into_inner()) = value;
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn load_config_reads_toml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("skillpack.toml");
        std::fs::write(&path, "[update_check]\ntimeout_ms = 2500\n").unwrap();

        let cfg = load_config(&path).unwrap();
        assert_eq!(cfg.update_check.timeout_ms, 2500);
    }

    #[test]
    fn load_config_reports_invalid_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("skillpack.toml");
        std::fs::write(&path, "[update_check\n").unwrap();

        let err = load_config(&path).unwrap_err();
        assert!(err.to_string().contains("failed to parse"));
    }

    #[test]
    fn env_overrides_replace_values() {
        let mut cfg = SkillpackConfig::default();
        apply_env_overrides_with(&mut cfg, |name| match name {
            "SKILLPACK_COOLDOWN_SECS" => Some("120".into()),
            "SKILLPACK_TIMEOUT_MS" => Some("500".into()),
            "SKILLPACK_GITHUB_API" => Some("https://ghe.example.com/api/v3/".into()),
            _ => None,
        });
        assert_eq!(cfg.update_check.cooldown_secs, 120);
        assert_eq!(cfg.update_check.timeout_ms, 500);
        assert_eq!(cfg.update_check.api_base, "https://ghe.example.com/api/v3");
    }

    #[test]
    fn invalid_env_overrides_are_ignored() {
        let mut cfg = SkillpackConfig::default();
        apply_env_overrides_with(&mut cfg, |name| match name {
            "SKILLPACK_COOLDOWN_SECS" => Some("soon".into()),
            _ => None,
        });
        assert_eq!(
            cfg.update_check.cooldown_secs,
            crate::schema::DEFAULT_COOLDOWN_SECS
        );
    }
}
