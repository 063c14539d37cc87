use std::collections::HashSet;

use {
    indexmap::IndexMap,
    serde::{Deserialize, Serialize},
    serde_json::{Map, Value},
};

// ── Skills manifest ──────────────────────────────────────────────────────────

/// Contents of a `.skills-manifest.json` file: installed skills for one scope
/// plus the remote update cache.
///
/// Deserialization never fails on well-formed JSON: unexpected shapes are
/// kept verbatim in `extra` or dropped (for malformed cache entries) so a
/// rewrite doesn't lose data written by installers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "Value", rename_all = "camelCase")]
pub struct SkillsManifest {
    /// Install records keyed by package identifier. Opaque apart from
    /// their `source` field.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skills: Option<Map<String, Value>>,
    /// Update cache keyed by remote source string (not skill name), in file
    /// order.
    #[serde(skip_serializing_if = "IndexMap::is_empty")]
    pub remote_cache: IndexMap<String, RemoteCacheEntry>,
    /// Any other top-level keys.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl From<Value> for SkillsManifest {
    fn from(value: Value) -> Self {
        let Value::Object(mut root) = value else {
            return Self::default();
        };

        let skills = match root.remove("skills") {
            Some(Value::Object(map)) => Some(map),
            Some(other) => {
                root.insert("skills".into(), other);
                None
            },
            None => None,
        };

        let remote_cache = match root.remove("remoteCache") {
            Some(Value::Object(map)) => map
                .into_iter()
                .filter_map(|(source, entry)| {
                    serde_json::from_value::<RemoteCacheEntry>(entry)
                        .ok()
                        .map(|entry| (source, entry))
                })
                .collect(),
            _ => IndexMap::new(),
        };

        Self {
            skills,
            remote_cache,
            extra: root,
        }
    }
}

impl SkillsManifest {
    pub fn cache_entry(&self, remote_source: &str) -> Option<&RemoteCacheEntry> {
        self.remote_cache.get(remote_source)
    }

    /// Deduplicated, non-blank remote sources across all install records, in
    /// first-seen order. Records that aren't objects or lack a source are
    /// skipped.
    pub fn remote_sources(&self) -> Vec<String> {
        match &self.skills {
            Some(skills) => collect_remote_sources(skills.values()),
            None => Vec::new(),
        }
    }

    /// Record (or replace) an install record for `package`.
    pub fn insert_skill(&mut self, package: impl Into<String>, record: Value) {
        self.skills
            .get_or_insert_with(Map::new)
            .insert(package.into(), record);
    }
}

/// Deduplicate the remote sources of any collection of install records.
pub fn collect_remote_sources<'a, R>(records: impl IntoIterator<Item = &'a R>) -> Vec<String>
where
    R: RemoteSourced + ?Sized + 'a,
{
    let mut seen: HashSet<&str> = HashSet::new();
    records
        .into_iter()
        .filter_map(|record| record.remote_source())
        .filter(|source| seen.insert(*source))
        .map(ToOwned::to_owned)
        .collect()
}

/// The one capability the update checker needs from an install record.
pub trait RemoteSourced {
    /// Trimmed, non-blank remote source, if the record has one.
    fn remote_source(&self) -> Option<&str>;
}

impl RemoteSourced for Value {
    fn remote_source(&self) -> Option<&str> {
        self.as_object()?
            .get("source")?
            .as_str()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}

/// Per remote source: when it was last checked and the last sha seen.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteCacheEntry {
    /// ISO-8601 timestamp of the last check attempt, successful or not.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_checked_at: Option<String>,
    /// Latest commit sha observed for the source's path.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_seen_sha: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

// ── Parsed remote source ─────────────────────────────────────────────────────

/// `owner/repo[/sub/path]` split into its parts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedRemoteSource {
    pub owner: String,
    pub repo: String,
    /// Sub-path within the repository, without a leading slash.
    pub repo_path: Option<String>,
}
