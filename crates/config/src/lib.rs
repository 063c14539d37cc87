//! Configuration loading, directory resolution, and environment lookups.
//!
//! Config file: `skillpack.toml`, searched in `./` then `~/.config/skillpack/`.
//! Every field has a default, so a missing file is never an error.

pub mod loader;
pub mod platform;
pub mod schema;
pub mod token;

pub use {
    loader::{
        apply_env_overrides, clear_home_dir, config_dir, discover_and_load,
        home_dir, load_config, set_config_dir, set_home_dir,
    },
    platform::Platform,
    schema::{SkillpackConfig, TargetsConfig, UpdateCheckConfig},
    token::github_token,
};
