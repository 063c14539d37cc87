mod check_commands;
mod checker_commands;

use std::path::PathBuf;

use {
    clap::{Parser, Subcommand},
    skillpack_config::{Platform, SkillpackConfig},
    tracing::debug,
    tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt},
};

#[derive(Parser)]
#[command(
    name = "skillpack",
    about = "skillpack: update checks for skills installed from GitHub",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,

    /// Custom config directory (overrides default ~/.config/skillpack/).
    #[arg(long, global = true, env = "SKILLPACK_CONFIG_DIR")]
    config_dir: Option<PathBuf>,

    /// Home directory used for personal manifests and the checker script.
    #[arg(long, global = true, env = "SKILLPACK_HOME")]
    home: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Check remote sources of installed skills for new commits.
    Check {
        /// Ignore the cooldown.
        #[arg(short, long)]
        force: bool,
        /// Print per-source errors.
        #[arg(short, long)]
        verbose: bool,
        /// Print all results as JSON.
        #[arg(long)]
        json: bool,
        /// Project directory (defaults to the current directory).
        #[arg(long)]
        cwd: Option<PathBuf>,
        /// Tools to scan (overrides `[targets] platforms`).
        #[arg(long = "platform", value_delimiter = ',')]
        platforms: Vec<Platform>,
    },
    /// List manifests, their remote sources, and cache state.
    Sources {
        /// Project directory (defaults to the current directory).
        #[arg(long)]
        cwd: Option<PathBuf>,
        /// Output as JSON.
        #[arg(long)]
        json: bool,
        /// Tools to scan (overrides `[targets] platforms`).
        #[arg(long = "platform", value_delimiter = ',')]
        platforms: Vec<Platform>,
    },
    /// Standalone checker script for session-end hooks.
    Checker {
        #[command(subcommand)]
        action: checker_commands::CheckerAction,
    },
}

/// Logs go to stderr so stdout carries only command output.
fn init_telemetry(cli: &Cli) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    let registry = tracing_subscriber::registry().with(filter);

    if cli.json_logs {
        registry
            .with(
                fmt::layer()
                    .json()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_ansi(true)
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    init_telemetry(&cli);

    debug!(version = env!("CARGO_PKG_VERSION"), "skillpack starting");

    // Apply directory overrides before loading config
    if let Some(ref dir) = cli.config_dir {
        skillpack_config::set_config_dir(dir.clone());
    }
    if let Some(ref dir) = cli.home {
        skillpack_config::set_home_dir(dir.clone());
    }

    let mut config = skillpack_config::discover_and_load();

    match cli.command {
        Commands::Check {
            force,
            verbose,
            json,
            cwd,
            platforms,
        } => {
            override_platforms(&mut config, platforms);
            let cwd = resolve_cwd(cwd)?;
            check_commands::handle_check(&config, &cwd, check_commands::CheckFlags {
                force,
                verbose,
                json,
            })
            .await
        },
        Commands::Sources {
            cwd,
            json,
            platforms,
        } => {
            override_platforms(&mut config, platforms);
            let cwd = resolve_cwd(cwd)?;
            check_commands::handle_sources(&config, &cwd, json)
        },
        Commands::Checker { action } => checker_commands::handle_checker(action, &config),
    }
}

fn resolve_cwd(cwd: Option<PathBuf>) -> anyhow::Result<PathBuf> {
    match cwd {
        Some(dir) => Ok(dir),
        None => Ok(std::env::current_dir()?),
    }
}

fn override_platforms(config: &mut SkillpackConfig, platforms: Vec<Platform>) {
    if !platforms.is_empty() {
        config.targets.platforms = platforms;
    }
}
