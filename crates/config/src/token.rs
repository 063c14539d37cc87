use secrecy::SecretString;

/// Environment variables holding a GitHub token, checked in order.
pub const GITHUB_TOKEN_VARS: &[&str] = &["GITHUB_TOKEN", "GH_TOKEN"];

/// GitHub token for authenticated API requests, if one is configured.
///
/// Authenticated requests get 5000 req/hour instead of 60. A missing token
/// is not an error.
pub fn github_token() -> Option<SecretString> {
    github_token_with(|name| std::env::var(name).ok())
}

/// Token lookup against a custom environment, so tests don't touch the
/// process environment.
pub fn github_token_with(lookup: impl Fn(&str) -> Option<String>) -> Option<SecretString> {
    GITHUB_TOKEN_VARS
        .iter()
        .filter_map(|name| lookup(name))
        .map(|value| value.trim().to_owned())
        .find(|value| !value.is_empty())
        .map(SecretString::new)
}
