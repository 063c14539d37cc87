use std::{
    fs::OpenOptions,
    path::{Path, PathBuf},
};

use {
    chrono::{DateTime, FixedOffset},
    fd_lock::RwLock,
    indexmap::IndexMap,
    skillpack_config::Platform,
    tracing::{debug, warn},
};

use crate::{
    error::{Error, Result},
    types::{RemoteCacheEntry, SkillsManifest},
};

/// File name of the manifest inside a tool's `skills/` directory.
pub const MANIFEST_FILE_NAME: &str = ".skills-manifest.json";

/// Read a manifest, treating a missing or unparseable file as empty.
pub fn read_manifest(path: &Path) -> SkillsManifest {
    ManifestStore::new(path.to_path_buf()).load()
}

/// Write a manifest as pretty-printed JSON, creating parent directories.
pub fn write_manifest(path: &Path, manifest: &SkillsManifest) -> Result<()> {
    ManifestStore::new(path.to_path_buf()).save(manifest)
}

/// Personal and project manifest paths for Claude Code, deduplicated.
pub fn default_manifest_paths(cwd: &Path) -> Vec<PathBuf> {
    manifest_paths_for(cwd, &[Platform::Claude])
}

/// Personal (`~/<tool>/skills/`) then project (`<cwd>/<tool>/skills/`)
/// manifest paths for each platform, deduplicated in order.
pub fn manifest_paths_for(cwd: &Path, platforms: &[Platform]) -> Vec<PathBuf> {
    let home = skillpack_config::home_dir();
    let mut paths: Vec<PathBuf> = Vec::new();
    for platform in platforms {
        for base in [home.as_path(), cwd] {
            let path = manifest_path_in(base, *platform);
            if !paths.contains(&path) {
                paths.push(path);
            }
        }
    }
    paths
}

/// Manifest location for a platform under `base` (a home or project root).
pub fn manifest_path_in(base: &Path, platform: Platform) -> PathBuf {
    base.join(platform.config_dir_name())
        .join("skills")
        .join(MANIFEST_FILE_NAME)
}

/// Manifest storage for one installation scope.
pub struct ManifestStore {
    path: PathBuf,
}

impl ManifestStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the manifest; missing or corrupt files yield an empty manifest.
    pub fn load(&self) -> SkillsManifest {
        let data = match std::fs::read_to_string(&self.path) {
            Ok(data) => data,
            Err(e) => {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!(path = %self.path.display(), error = %e, "failed to read manifest, treating as empty");
                }
                return SkillsManifest::default();
            },
        };
        serde_json::from_str(&data).unwrap_or_else(|e| {
            warn!(path = %self.path.display(), error = %e, "could not parse manifest, treating as empty");
            SkillsManifest::default()
        })
    }

    /// Overwrite the manifest with a single full-file write.
    pub fn save(&self, manifest: &SkillsManifest) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let data = serde_json::to_string_pretty(manifest)?;
        std::fs::write(&self.path, data)?;
        Ok(())
    }

    /// Replace the given cache entries in the on-disk manifest.
    ///
    /// Holds an exclusive lock on `<manifest>.lock` while it re-reads the
    /// current file, merges only `entries`, and writes through a temp file +
    /// rename. Skills and other cache entries written concurrently by other
    /// processes are preserved, and an entry is never replaced by one with
    /// an older `lastCheckedAt`. Returns the manifest as written.
    pub fn merge_remote_cache(
        &self,
        entries: &IndexMap<String, RemoteCacheEntry>,
    ) -> Result<SkillsManifest> {
        let parent = self.path.parent().unwrap_or(Path::new("."));
        std::fs::create_dir_all(parent)?;

        let lock_path = self.lock_path();
        let lock_file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&lock_path)?;
        let mut lock = RwLock::new(lock_file);
        let _guard = lock.write().map_err(|source| Error::Lock {
            path: lock_path.clone(),
            source,
        })?;

        let mut manifest = self.load();
        let mut stale = 0usize;
        for (source, entry) in entries {
            if let Some(current) = manifest.remote_cache.get(source)
                && checked_later(current, entry)
            {
                stale += 1;
                continue;
            }
            manifest.remote_cache.insert(source.clone(), entry.clone());
        }

        let tmp = self.path.with_extension("json.tmp");
        let data = serde_json::to_string_pretty(&manifest)?;
        std::fs::write(&tmp, data)?;
        std::fs::rename(&tmp, &self.path)?;

        debug!(
            path = %self.path.display(),
            updated = entries.len() - stale,
            stale,
            "merged remote cache"
        );
        Ok(manifest)
    }

    fn lock_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| MANIFEST_FILE_NAME.into());
        name.push(".lock");
        self.path.with_file_name(name)
    }
}

/// True when `current` was checked strictly after `incoming`.
fn checked_later(current: &RemoteCacheEntry, incoming: &RemoteCacheEntry) -> bool {
    let parse = |entry: &RemoteCacheEntry| -> Option<DateTime<FixedOffset>> {
        DateTime::parse_from_rfc3339(entry.last_checked_at.as_deref()?.trim()).ok()
    };
    match (parse(current), parse(incoming)) {
        (Some(current), Some(incoming)) => current > incoming,
        (Some(_), None) => true,
        _ => false,
    }
}
