//! Remote source identifiers: `owner/repo[/sub/path]` or a github.com URL.

use crate::types::ParsedRemoteSource;

pub use skillpack_config::schema::DEFAULT_GITHUB_API;

const GITHUB_URL_PREFIXES: &[&str] = &["https://github.com/", "http://github.com/"];

/// Parse a remote source string.
///
/// An optional `http(s)://github.com/` prefix is stripped (case-insensitive),
/// the rest is split on `/` and empty segments are dropped. Returns `None`
/// when fewer than two segments remain.
pub fn parse_remote_source(remote_source: &str) -> Option<ParsedRemoteSource> {
    let trimmed = strip_github_prefix(remote_source.trim());
    let mut parts = trimmed.split('/').filter(|part| !part.is_empty());

    let owner = parts.next()?;
    let repo = parts.next()?;
    let rest: Vec<&str> = parts.collect();
    let repo_path = (!rest.is_empty()).then(|| rest.join("/"));

    Some(ParsedRemoteSource {
        owner: owner.to_owned(),
        repo: repo.to_owned(),
        repo_path,
    })
}

fn strip_github_prefix(s: &str) -> &str {
    for prefix in GITHUB_URL_PREFIXES {
        if let Some(head) = s.get(..prefix.len())
            && head.eq_ignore_ascii_case(prefix)
        {
            return &s[prefix.len()..];
        }
    }
    s
}

/// GitHub commits-API URL returning the single latest commit for the
/// source, scoped to its sub-path when it has one.
pub fn build_commits_url(remote_source: &str) -> Option<String> {
    build_commits_url_with_base(DEFAULT_GITHUB_API, remote_source)
}

/// Same as [`build_commits_url`] against a custom API base
/// (GitHub Enterprise, test servers).
pub fn build_commits_url_with_base(api_base: &str, remote_source: &str) -> Option<String> {
    let parsed = parse_remote_source(remote_source)?;
    let base = format!(
        "{}/repos/{}/{}/commits?per_page=1",
        api_base.trim_end_matches('/'),
        urlencoding::encode(&parsed.owner),
        urlencoding::encode(&parsed.repo),
    );
    Some(match parsed.repo_path {
        Some(path) => format!("{base}&path={}", urlencoding::encode(&path)),
        None => base,
    })
}
