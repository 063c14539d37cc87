//! CLI commands for the standalone checker script.

use clap::Subcommand;

use {
    serde_json::json,
    skillpack_config::SkillpackConfig,
    skillpack_skills::script::{
        HookRegistrar, ScriptInstall, ScriptSettings, checker_script_contents_with,
        checker_script_install_path, ensure_checker_installed,
    },
};

#[derive(Subcommand)]
pub enum CheckerAction {
    /// Write the generated script to stdout.
    Print,
    /// Print where the script is installed.
    Path,
    /// Install the script and show the hook registration it needs.
    Install,
}

pub fn handle_checker(action: CheckerAction, config: &SkillpackConfig) -> anyhow::Result<()> {
    let settings = ScriptSettings::from_config(&config.update_check, &config.targets.platforms);

    match action {
        CheckerAction::Print => print!("{}", checker_script_contents_with(&settings)),
        CheckerAction::Path => println!("{}", checker_script_install_path().display()),
        CheckerAction::Install => {
            let path = checker_script_install_path();
            let mut registrar = PrintingRegistrar::default();
            match ensure_checker_installed(&path, &settings, &mut registrar)? {
                ScriptInstall::Installed => println!("Installed {}", path.display()),
                ScriptInstall::UpToDate => println!("{} is up to date", path.display()),
            }
            println!("\nAdd this to your host settings to run it on session end:");
            println!("{}", serde_json::to_string_pretty(&registrar.settings())?);
        },
    }

    Ok(())
}

/// Collects registrations as a `hooks` settings fragment instead of editing
/// the host's settings file.
#[derive(Default)]
struct PrintingRegistrar {
    hooks: serde_json::Map<String, serde_json::Value>,
}

impl PrintingRegistrar {
    fn settings(&self) -> serde_json::Value {
        json!({ "hooks": self.hooks })
    }
}

impl HookRegistrar for PrintingRegistrar {
    fn register(
        &mut self,
        event: &str,
        matcher: &str,
        command: &str,
    ) -> skillpack_skills::Result<()> {
        let groups = self
            .hooks
            .entry(event.to_owned())
            .or_insert_with(|| json!([]));
        let Some(groups) = groups.as_array_mut() else {
            return Err(skillpack_skills::Error::message(format!(
                "hooks for {event} are not a list"
            )));
        };
        groups.push(json!({
            "matcher": matcher,
            "hooks": [{ "type": "command", "command": command }],
        }));
        Ok(())
    }
}
