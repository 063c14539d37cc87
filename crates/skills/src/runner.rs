//! One check pass over every manifest: the native counterpart of the
//! generated hook script's main loop.

use std::path::PathBuf;

use {
    indexmap::IndexMap,
    serde::Serialize,
    tracing::{debug, info, warn},
};

use crate::{
    check::{CheckOptions, CheckStatus, RemoteUpdateCheckResult, check_remote_source_for_update},
    fetch::FetchText,
    manifest::ManifestStore,
    types::RemoteCacheEntry,
};

/// Number of sha characters shown in the report.
pub const SHORT_SHA_LEN: usize = 7;

pub const REPORT_HEADER: &str = "\u{1F4E1} Remote skill updates detected:";
pub const REPORT_FOOTER: &str = "\u{1F4A1} Reinstall the affected skills to pull the latest version \
                                 (skills installed from a remote source are not updated \
                                 automatically).";

/// A source whose latest sha moved since it was last seen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateNotice {
    pub remote_source: String,
    pub previous_sha: String,
    pub latest_sha: String,
}

/// Results for one manifest file.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestRun {
    pub path: PathBuf,
    pub results: Vec<RemoteUpdateCheckResult>,
    /// Whether the touched cache entries were written back.
    pub persisted: bool,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    pub manifests: Vec<ManifestRun>,
    pub updates: Vec<UpdateNotice>,
}

impl RunReport {
    pub fn results(&self) -> impl Iterator<Item = &RemoteUpdateCheckResult> {
        self.manifests.iter().flat_map(|m| m.results.iter())
    }

    pub fn has_updates(&self) -> bool {
        !self.updates.is_empty()
    }

    /// `[remote-skill-check] error <source> <message>` for each failed source.
    pub fn error_lines(&self) -> Vec<String> {
        self.results()
            .filter_map(|r| {
                r.error
                    .as_deref()
                    .map(|e| format!("[remote-skill-check] error {} {e}", r.remote_source))
            })
            .collect()
    }
}

/// Check every remote source in every manifest, sequentially.
///
/// Manifests without remote sources are skipped without touching the file.
/// Each manifest's touched cache entries are merged back once, under the
/// manifest lock; a failed write is logged and the pass continues.
pub async fn run_update_checks(
    paths: &[PathBuf],
    fetcher: &dyn FetchText,
    options: &CheckOptions<'_>,
) -> RunReport {
    let mut report = RunReport::default();

    for path in paths {
        let store = ManifestStore::new(path.clone());
        let mut manifest = store.load();
        let sources = manifest.remote_sources();
        if sources.is_empty() {
            debug!(path = %path.display(), "no remote sources");
            continue;
        }

        let mut results = Vec::with_capacity(sources.len());
        let mut touched: IndexMap<String, RemoteCacheEntry> = IndexMap::new();

        for source in &sources {
            let outcome = check_remote_source_for_update(source, &manifest, fetcher, options).await;
            let result = outcome.result;
            manifest = outcome.updated_manifest;

            if matches!(
                result.status(),
                CheckStatus::FetchError
                    | CheckStatus::Baseline
                    | CheckStatus::NoUpdate
                    | CheckStatus::UpdateAvailable
            ) && let Some(entry) = manifest.cache_entry(source)
            {
                touched.insert(source.clone(), entry.clone());
            }

            if result.has_update
                && let (Some(previous), Some(latest)) = (&result.cached_sha, &result.latest_sha)
            {
                info!(remote_source = %source, previous = %previous, latest = %latest, "remote skill update available");
                report.updates.push(UpdateNotice {
                    remote_source: source.clone(),
                    previous_sha: previous.clone(),
                    latest_sha: latest.clone(),
                });
            }
            results.push(result);
        }

        let persisted = persist(&store, &touched);
        report.manifests.push(ManifestRun {
            path: path.clone(),
            results,
            persisted,
        });
    }

    report
}

fn persist(store: &ManifestStore, touched: &IndexMap<String, RemoteCacheEntry>) -> bool {
    if touched.is_empty() {
        return false;
    }
    match store.merge_remote_cache(touched) {
        Ok(_) => true,
        Err(e) => {
            warn!(path = %store.path().display(), error = %e, "failed to persist remote cache");
            false
        },
    }
}

/// First [`SHORT_SHA_LEN`] characters of a sha.
pub fn short_sha(sha: &str) -> &str {
    match sha.char_indices().nth(SHORT_SHA_LEN) {
        Some((idx, _)) => &sha[..idx],
        None => sha,
    }
}

/// Advisory report listing each updated source with shortened shas.
/// Empty when there is nothing to report.
pub fn format_update_report(updates: &[UpdateNotice]) -> String {
    if updates.is_empty() {
        return String::new();
    }
    let mut out = format!("\n{REPORT_HEADER}\n");
    for update in updates {
        out.push_str(&format!(
            "  - {}\n     {} -> {}\n",
            update.remote_source,
            short_sha(&update.previous_sha),
            short_sha(&update.latest_sha),
        ));
    }
    out.push_str(&format!("\n{REPORT_FOOTER}\n"));
    out
}
