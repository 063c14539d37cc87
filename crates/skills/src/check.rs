//! Per-source update check: cooldown, fetch, baseline, and sha comparison.

use std::{collections::BTreeMap, time::Duration};

use {
    chrono::{DateTime, SecondsFormat, TimeDelta, Utc},
    secrecy::{ExposeSecret, SecretString},
    serde::Serialize,
    skillpack_config::{
        UpdateCheckConfig,
        schema::{DEFAULT_COOLDOWN_SECS, DEFAULT_GITHUB_API, DEFAULT_USER_AGENT},
    },
    tracing::debug,
};

use crate::{
    fetch::{DEFAULT_TIMEOUT, FetchRequest, FetchText},
    source::build_commits_url_with_base,
    types::{RemoteCacheEntry, SkillsManifest},
};

pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(DEFAULT_COOLDOWN_SECS);

/// Error reported for sources that can't be turned into an API URL.
pub const INVALID_SOURCE_ERROR: &str = "Invalid remoteSource format";

/// Terminal state of one check attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckStatus {
    SkippedCooldown,
    Unparseable,
    FetchError,
    /// First sha observed for the source; recorded without notifying.
    Baseline,
    NoUpdate,
    UpdateAvailable,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteUpdateCheckResult {
    pub remote_source: String,
    status: CheckStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latest_sha: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cached_sha: Option<String>,
    pub has_update: bool,
    pub skipped_by_cooldown: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RemoteUpdateCheckResult {
    pub fn status(&self) -> CheckStatus {
        self.status
    }

    fn new(remote_source: &str, status: CheckStatus, cached_sha: Option<String>) -> Self {
        Self {
            remote_source: remote_source.to_owned(),
            status,
            latest_sha: None,
            cached_sha,
            has_update: status == CheckStatus::UpdateAvailable,
            skipped_by_cooldown: status == CheckStatus::SkippedCooldown,
            error: None,
        }
    }
}

/// A check result plus the manifest with the source's cache entry updated.
#[derive(Debug, Clone)]
pub struct CheckOutcome {
    pub result: RemoteUpdateCheckResult,
    pub updated_manifest: SkillsManifest,
}

/// Knobs for [`check_remote_source_for_update`].
#[derive(Debug, Clone)]
pub struct CheckOptions<'a> {
    pub now: DateTime<Utc>,
    pub cooldown: Duration,
    /// Ignore the cooldown.
    pub force: bool,
    pub timeout: Duration,
    pub github_token: Option<&'a SecretString>,
    pub api_base: &'a str,
    pub user_agent: &'a str,
}

impl Default for CheckOptions<'_> {
    fn default() -> Self {
        Self {
            now: Utc::now(),
            cooldown: DEFAULT_COOLDOWN,
            force: false,
            timeout: DEFAULT_TIMEOUT,
            github_token: None,
            api_base: DEFAULT_GITHUB_API,
            user_agent: DEFAULT_USER_AGENT,
        }
    }
}

impl<'a> CheckOptions<'a> {
    pub fn from_config(
        config: &'a UpdateCheckConfig,
        github_token: Option<&'a SecretString>,
    ) -> Self {
        Self {
            now: Utc::now(),
            cooldown: config.cooldown(),
            force: false,
            timeout: config.timeout(),
            github_token,
            api_base: &config.api_base,
            user_agent: &config.user_agent,
        }
    }
}

/// Check one remote source for a newer commit.
///
/// Never fails: invalid sources and fetch errors are reported through
/// `result.error`. Every fetch attempt advances `lastCheckedAt` so a broken
/// source is retried only after the cooldown; `lastSeenSha` changes only
/// when a sha was actually obtained.
pub async fn check_remote_source_for_update(
    remote_source: &str,
    manifest: &SkillsManifest,
    fetcher: &dyn FetchText,
    options: &CheckOptions<'_>,
) -> CheckOutcome {
    let mut updated_manifest = manifest.clone();
    let cache_entry = manifest
        .cache_entry(remote_source)
        .cloned()
        .unwrap_or_default();
    let cached_sha = cache_entry.last_seen_sha.clone();

    if !options.force
        && should_skip_by_cooldown(
            cache_entry.last_checked_at.as_deref(),
            options.now,
            options.cooldown,
        )
    {
        debug!(%remote_source, "skipped by cooldown");
        return CheckOutcome {
            result: RemoteUpdateCheckResult::new(
                remote_source,
                CheckStatus::SkippedCooldown,
                cached_sha,
            ),
            updated_manifest,
        };
    }

    let Some(url) = build_commits_url_with_base(options.api_base, remote_source) else {
        debug!(%remote_source, "unparseable remote source");
        let mut result =
            RemoteUpdateCheckResult::new(remote_source, CheckStatus::Unparseable, cached_sha);
        result.error = Some(INVALID_SOURCE_ERROR.to_owned());
        return CheckOutcome {
            result,
            updated_manifest,
        };
    };

    let request = FetchRequest {
        headers: request_headers(options.user_agent, options.github_token),
        timeout: options.timeout,
    };
    let checked_at = format_timestamp(options.now);

    let text = match fetcher.fetch_text(&url, &request).await {
        Ok(text) => text,
        Err(e) => {
            debug!(%remote_source, error = %e, "update check failed");
            updated_manifest
                .remote_cache
                .insert(remote_source.to_owned(), RemoteCacheEntry {
                    last_checked_at: Some(checked_at),
                    ..cache_entry
                });
            let mut result =
                RemoteUpdateCheckResult::new(remote_source, CheckStatus::FetchError, cached_sha);
            result.error = Some(e.to_string());
            return CheckOutcome {
                result,
                updated_manifest,
            };
        },
    };

    let latest_sha = extract_latest_sha(&text);
    let last_seen_sha = latest_sha.clone().or(cache_entry.last_seen_sha.clone());
    updated_manifest
        .remote_cache
        .insert(remote_source.to_owned(), RemoteCacheEntry {
            last_checked_at: Some(checked_at),
            last_seen_sha,
            ..cache_entry
        });

    let status = match (&cached_sha, &latest_sha) {
        (None, Some(_)) => CheckStatus::Baseline,
        (Some(cached), Some(latest)) if cached != latest => CheckStatus::UpdateAvailable,
        _ => CheckStatus::NoUpdate,
    };
    debug!(%remote_source, ?status, latest = ?latest_sha, "update check complete");

    let mut result = RemoteUpdateCheckResult::new(remote_source, status, cached_sha);
    result.latest_sha = latest_sha;
    CheckOutcome {
        result,
        updated_manifest,
    }
}

/// True when the last check happened less than `cooldown` before `now`.
/// Missing or unparseable timestamps never skip.
pub fn should_skip_by_cooldown(
    last_checked_at: Option<&str>,
    now: DateTime<Utc>,
    cooldown: Duration,
) -> bool {
    let Some(last) = last_checked_at.and_then(|s| DateTime::parse_from_rfc3339(s.trim()).ok())
    else {
        return false;
    };
    let elapsed = now.signed_duration_since(last.with_timezone(&Utc));
    match TimeDelta::from_std(cooldown) {
        Ok(cooldown) => elapsed < cooldown,
        // Longer than chrono can represent: effectively never re-check.
        Err(_) => true,
    }
}

/// Sha of the first commit in a GitHub commits-API response, if the body
/// has that shape.
pub fn extract_latest_sha(json_text: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(json_text).ok()?;
    value
        .as_array()?
        .first()?
        .as_object()?
        .get("sha")?
        .as_str()
        .filter(|sha| !sha.is_empty())
        .map(ToOwned::to_owned)
}

/// Headers sent with every commits-API request.
pub fn request_headers(
    user_agent: &str,
    github_token: Option<&SecretString>,
) -> BTreeMap<String, String> {
    let mut headers = BTreeMap::new();
    headers.insert("user-agent".to_owned(), user_agent.to_owned());
    headers.insert("accept".to_owned(), "application/vnd.github+json".to_owned());
    if let Some(token) = github_token {
        headers.insert(
            "authorization".to_owned(),
            format!("Bearer {}", token.expose_secret()),
        );
    }
    headers
}

/// ISO-8601 with millisecond precision and a `Z` suffix.
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use std::sync::{
        Mutex,
        atomic::{AtomicUsize, Ordering},
    };

    use {
        super::*,
        crate::fetch::FetchError,
        async_trait::async_trait,
        serde_json::json,
    };

    const SOURCE: &str = "owner/repo/path";

    fn at(iso: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(iso).unwrap().with_timezone(&Utc)
    }

    /// Fetcher returning a canned response and recording what it was asked.
    struct StubFetcher {
        response: Result<String, String>,
        calls: AtomicUsize,
        seen: Mutex<Vec<(String, FetchRequest)>>,
    }

    impl StubFetcher {
        fn sha(sha: &str) -> Self {
            Self::body(json!([{ "sha": sha }]).to_string())
        }

        fn body(body: impl Into<String>) -> Self {
            Self {
                response: Ok(body.into()),
                calls: AtomicUsize::new(0),
                seen: Mutex::new(Vec::new()),
            }
        }

        fn failing(message: &str) -> Self {
            Self {
                response: Err(message.into()),
                calls: AtomicUsize::new(0),
                seen: Mutex::new(Vec::new()),
            }
        }

        fn last_request(&self) -> (String, FetchRequest) {
            self.seen.lock().unwrap().last().cloned().unwrap()
        }
    }

    #[async_trait]
    impl FetchText for StubFetcher {
        async fn fetch_text(
            &self,
            url: &str,
            request: &FetchRequest,
        ) -> Result<String, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.seen
                .lock()
                .unwrap()
                .push((url.to_owned(), request.clone()));
            self.response.clone().map_err(FetchError::Message)
        }
    }

    fn forced<'a>(now: &str) -> CheckOptions<'a> {
        CheckOptions {
            now: at(now),
            force: true,
            ..Default::default()
        }
    }

    fn manifest_with(entry: RemoteCacheEntry) -> SkillsManifest {
        let mut manifest = SkillsManifest::default();
        manifest.remote_cache.insert(SOURCE.into(), entry);
        manifest
    }

    fn cached(sha: &str, checked: &str) -> RemoteCacheEntry {
        RemoteCacheEntry {
            last_checked_at: Some(checked.into()),
            last_seen_sha: Some(sha.into()),
            ..Default::default()
        }
    }

    #[test]
    fn cooldown_window() {
        let now = at("2026-01-01T00:00:00.000Z");
        let last = Some("2025-12-31T23:59:30.000Z");
        assert!(should_skip_by_cooldown(last, now, Duration::from_secs(60)));
        assert!(!should_skip_by_cooldown(last, now, Duration::from_secs(10)));
    }

    #[test]
    fn cooldown_ignores_missing_or_invalid_timestamps() {
        let now = at("2026-01-01T00:00:00.000Z");
        assert!(!should_skip_by_cooldown(None, now, DEFAULT_COOLDOWN));
        assert!(!should_skip_by_cooldown(Some("yesterday"), now, DEFAULT_COOLDOWN));
    }

    #[test]
    fn extracts_sha_from_first_commit() {
        assert_eq!(
            extract_latest_sha(r#"[{"sha":"abc123"},{"sha":"def"}]"#).as_deref(),
            Some("abc123")
        );
    }

    #[test]
    fn malformed_responses_yield_no_sha() {
        for body in [
            "",
            "not json",
            "[]",
            "{}",
            r#"{"sha":"abc"}"#,
            r#"[null]"#,
            r#"[{"sha":""}]"#,
            r#"[{"sha":42}]"#,
            r#"["abc"]"#,
        ] {
            assert_eq!(extract_latest_sha(body), None, "body: {body}");
        }
    }

    #[tokio::test]
    async fn baseline_is_recorded_without_notifying() {
        let fetcher = StubFetcher::sha("aaa");
        let outcome = check_remote_source_for_update(
            SOURCE,
            &SkillsManifest::default(),
            &fetcher,
            &forced("2026-01-01T00:00:00.000Z"),
        )
        .await;

        assert_eq!(outcome.result.status(), CheckStatus::Baseline);
        assert!(!outcome.result.has_update);
        assert_eq!(outcome.result.latest_sha.as_deref(), Some("aaa"));
        assert_eq!(outcome.result.cached_sha, None);
        let entry = outcome.updated_manifest.cache_entry(SOURCE).unwrap();
        assert_eq!(entry.last_seen_sha.as_deref(), Some("aaa"));
        assert_eq!(
            entry.last_checked_at.as_deref(),
            Some("2026-01-01T00:00:00.000Z")
        );
    }

    #[tokio::test]
    async fn changed_sha_is_an_update() {
        let fetcher = StubFetcher::sha("bbb");
        let manifest = manifest_with(cached("aaa", "2025-12-31T00:00:00.000Z"));
        let outcome = check_remote_source_for_update(
            SOURCE,
            &manifest,
            &fetcher,
            &forced("2026-01-01T00:00:00.000Z"),
        )
        .await;

        assert_eq!(outcome.result.status(), CheckStatus::UpdateAvailable);
        assert!(outcome.result.has_update);
        assert_eq!(outcome.result.cached_sha.as_deref(), Some("aaa"));
        assert_eq!(outcome.result.latest_sha.as_deref(), Some("bbb"));
        assert_eq!(
            outcome
                .updated_manifest
                .cache_entry(SOURCE)
                .unwrap()
                .last_seen_sha
                .as_deref(),
            Some("bbb")
        );
        // The input manifest is left untouched.
        assert_eq!(
            manifest.cache_entry(SOURCE).unwrap().last_seen_sha.as_deref(),
            Some("aaa")
        );
    }

    #[tokio::test]
    async fn same_sha_is_not_an_update() {
        let fetcher = StubFetcher::sha("aaa");
        let manifest = manifest_with(cached("aaa", "2025-12-31T00:00:00.000Z"));
        let outcome = check_remote_source_for_update(
            SOURCE,
            &manifest,
            &fetcher,
            &forced("2026-01-01T00:00:00.000Z"),
        )
        .await;

        assert_eq!(outcome.result.status(), CheckStatus::NoUpdate);
        assert!(!outcome.result.has_update);
        assert_eq!(outcome.result.error, None);
    }

    #[tokio::test]
    async fn cooldown_skips_without_fetching() {
        let fetcher = StubFetcher::sha("bbb");
        let manifest = manifest_with(cached("aaa", "2026-01-01T00:00:00.000Z"));
        let options = CheckOptions {
            now: at("2026-01-01T00:10:00.000Z"),
            cooldown: Duration::from_secs(24 * 60 * 60),
            force: false,
            ..Default::default()
        };

        let outcome = check_remote_source_for_update(SOURCE, &manifest, &fetcher, &options).await;

        assert!(outcome.result.skipped_by_cooldown);
        assert_eq!(outcome.result.status(), CheckStatus::SkippedCooldown);
        assert_eq!(outcome.result.cached_sha.as_deref(), Some("aaa"));
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 0);
        assert_eq!(outcome.updated_manifest, manifest);
    }

    #[tokio::test]
    async fn force_bypasses_cooldown() {
        let fetcher = StubFetcher::sha("bbb");
        let manifest = manifest_with(cached("aaa", "2026-01-01T00:00:00.000Z"));
        let outcome = check_remote_source_for_update(
            SOURCE,
            &manifest,
            &fetcher,
            &forced("2026-01-01T00:10:00.000Z"),
        )
        .await;

        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
        assert!(outcome.result.has_update);
    }

    #[tokio::test]
    async fn forwards_timeout_and_token() {
        let fetcher = StubFetcher::sha("aaa");
        let token = SecretString::new("ghp_test_token".into());
        let options = CheckOptions {
            timeout: Duration::from_millis(5000),
            github_token: Some(&token),
            ..forced("2026-01-01T00:00:00.000Z")
        };

        check_remote_source_for_update(SOURCE, &SkillsManifest::default(), &fetcher, &options)
            .await;

        let (url, request) = fetcher.last_request();
        assert_eq!(
            url,
            "https://api.github.com/repos/owner/repo/commits?per_page=1&path=path"
        );
        assert_eq!(request.timeout, Duration::from_millis(5000));
        assert_eq!(
            request.headers.get("authorization").map(String::as_str),
            Some("Bearer ghp_test_token")
        );
        assert_eq!(
            request.headers.get("accept").map(String::as_str),
            Some("application/vnd.github+json")
        );
    }

    #[tokio::test]
    async fn no_token_means_no_authorization_header() {
        let fetcher = StubFetcher::sha("aaa");
        check_remote_source_for_update(
            SOURCE,
            &SkillsManifest::default(),
            &fetcher,
            &forced("2026-01-01T00:00:00.000Z"),
        )
        .await;

        let (_, request) = fetcher.last_request();
        assert!(!request.headers.contains_key("authorization"));
        assert_eq!(
            request.headers.get("user-agent").map(String::as_str),
            Some(DEFAULT_USER_AGENT)
        );
    }

    #[tokio::test]
    async fn fetch_failure_advances_timestamp_and_keeps_sha() {
        let fetcher = StubFetcher::failing("Request timeout after 10000ms");
        let manifest = manifest_with(cached("aaa", "2025-12-01T00:00:00.000Z"));
        let outcome = check_remote_source_for_update(
            SOURCE,
            &manifest,
            &fetcher,
            &forced("2026-01-01T00:00:00.000Z"),
        )
        .await;

        assert_eq!(outcome.result.status(), CheckStatus::FetchError);
        assert!(!outcome.result.has_update);
        assert_eq!(
            outcome.result.error.as_deref(),
            Some("Request timeout after 10000ms")
        );
        let entry = outcome.updated_manifest.cache_entry(SOURCE).unwrap();
        assert_eq!(
            entry.last_checked_at.as_deref(),
            Some("2026-01-01T00:00:00.000Z")
        );
        assert_eq!(entry.last_seen_sha.as_deref(), Some("aaa"));
    }

    #[tokio::test]
    async fn fetch_failure_on_fresh_source_records_check_time() {
        let fetcher = StubFetcher::failing("HTTP 500");
        let outcome = check_remote_source_for_update(
            SOURCE,
            &SkillsManifest::default(),
            &fetcher,
            &forced("2026-01-01T00:00:00.000Z"),
        )
        .await;

        let entry = outcome.updated_manifest.cache_entry(SOURCE).unwrap();
        assert!(entry.last_checked_at.is_some());
        assert!(entry.last_seen_sha.is_none());
    }

    #[tokio::test]
    async fn malformed_body_is_not_an_error() {
        let fetcher = StubFetcher::body(r#"{"message":"Not Found"}"#);
        let manifest = manifest_with(cached("aaa", "2025-12-01T00:00:00.000Z"));
        let outcome = check_remote_source_for_update(
            SOURCE,
            &manifest,
            &fetcher,
            &forced("2026-01-01T00:00:00.000Z"),
        )
        .await;

        assert_eq!(outcome.result.status(), CheckStatus::NoUpdate);
        assert_eq!(outcome.result.error, None);
        assert_eq!(outcome.result.latest_sha, None);
        let entry = outcome.updated_manifest.cache_entry(SOURCE).unwrap();
        assert_eq!(entry.last_seen_sha.as_deref(), Some("aaa"));
        assert_eq!(
            entry.last_checked_at.as_deref(),
            Some("2026-01-01T00:00:00.000Z")
        );
    }

    #[tokio::test]
    async fn invalid_source_is_reported_without_touching_cache() {
        let fetcher = StubFetcher::sha("aaa");
        let manifest = SkillsManifest::default();
        let options = forced("2026-01-01T00:00:00.000Z");
        let outcome =
            check_remote_source_for_update("lonely", &manifest, &fetcher, &options).await;

        assert_eq!(outcome.result.status(), CheckStatus::Unparseable);
        assert_eq!(outcome.result.error.as_deref(), Some(INVALID_SOURCE_ERROR));
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 0);
        assert!(outcome.updated_manifest.cache_entry("lonely").is_none());
    }

    #[test]
    fn result_serializes_camel_case() {
        let mut result =
            RemoteUpdateCheckResult::new("o/r", CheckStatus::UpdateAvailable, Some("aaa".into()));
        result.latest_sha = Some("bbb".into());
        assert_eq!(
            serde_json::to_value(&result).unwrap(),
            json!({
                "remoteSource": "o/r",
                "status": "update_available",
                "latestSha": "bbb",
                "cachedSha": "aaa",
                "hasUpdate": true,
                "skippedByCooldown": false
            })
        );
    }
}
