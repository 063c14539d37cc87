//! `check` and `sources`: one update pass, and a read-only listing.

use std::path::Path;

use {
    serde_json::json,
    skillpack_config::SkillpackConfig,
    skillpack_skills::{
        CheckOptions, HttpFetcher, format_update_report, manifest_paths_for, read_manifest,
        run_update_checks, runner::short_sha,
    },
    tracing::info,
};

pub struct CheckFlags {
    pub force: bool,
    pub verbose: bool,
    pub json: bool,
}

/// Run one pass. Per-source failures never make the command fail.
pub async fn handle_check(
    config: &SkillpackConfig,
    cwd: &Path,
    flags: CheckFlags,
) -> anyhow::Result<()> {
    let paths = manifest_paths_for(cwd, &config.targets.platforms);
    let token = skillpack_config::github_token();
    let options = CheckOptions {
        force: flags.force,
        ..CheckOptions::from_config(&config.update_check, token.as_ref())
    };

    info!(
        manifests = paths.len(),
        force = flags.force,
        authenticated = token.is_some(),
        "checking remote skill sources"
    );
    let report = run_update_checks(&paths, &HttpFetcher::default(), &options).await;

    if flags.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    if flags.verbose {
        for line in report.error_lines() {
            println!("{line}");
        }
    }
    let text = format_update_report(&report.updates);
    if !text.is_empty() {
        print!("{text}");
    }
    Ok(())
}

pub fn handle_sources(config: &SkillpackConfig, cwd: &Path, as_json: bool) -> anyhow::Result<()> {
    let paths = manifest_paths_for(cwd, &config.targets.platforms);
    let mut entries: Vec<serde_json::Value> = Vec::new();

    for path in &paths {
        let exists = path.is_file();
        let manifest = read_manifest(path);
        let sources = manifest.remote_sources();

        if as_json {
            let sources: Vec<_> = sources
                .iter()
                .map(|source| {
                    let entry = manifest.cache_entry(source);
                    json!({
                        "remoteSource": source,
                        "lastCheckedAt": entry.and_then(|e| e.last_checked_at.as_deref()),
                        "lastSeenSha": entry.and_then(|e| e.last_seen_sha.as_deref()),
                    })
                })
                .collect();
            entries.push(json!({
                "path": path,
                "exists": exists,
                "sources": sources,
            }));
            continue;
        }

        if !exists {
            println!("{} (missing)", path.display());
            continue;
        }
        println!("{}", path.display());
        if sources.is_empty() {
            println!("  no remote sources");
        }
        for source in &sources {
            let entry = manifest.cache_entry(source);
            let sha = entry
                .and_then(|e| e.last_seen_sha.as_deref())
                .map(short_sha)
                .unwrap_or("-");
            let checked = entry
                .and_then(|e| e.last_checked_at.as_deref())
                .unwrap_or("never");
            println!("  {source}  sha={sha}  checked={checked}");
        }
    }

    if as_json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
    }
    Ok(())
}
