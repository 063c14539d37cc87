//! Standalone update checker for hosts that run a command on session end.
//!
//! The generated program is dependency-free CommonJS so it runs under a bare
//! `node` with no install step. Its tunables (cooldown, timeout, API base,
//! user agent, token variables, manifest locations, report text) are emitted
//! from the same constants the native checker uses, so both stay in step.
//! The marker line carries [`REMOTE_UPDATE_CHECKER_VERSION`] and a
//! fingerprint of everything generated, so an installed copy is replaced
//! whenever the settings or the body change.

use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use {
    serde_json::Value,
    sha2::{Digest, Sha256},
    skillpack_config::{
        Platform, UpdateCheckConfig, home_dir,
        schema::{DEFAULT_GITHUB_API, DEFAULT_USER_AGENT},
        token::GITHUB_TOKEN_VARS,
    },
    tracing::{debug, info, warn},
};

use crate::{
    check::{DEFAULT_COOLDOWN, INVALID_SOURCE_ERROR},
    error::Result,
    fetch::DEFAULT_TIMEOUT,
    manifest::MANIFEST_FILE_NAME,
    runner::{REPORT_FOOTER, REPORT_HEADER, SHORT_SHA_LEN},
};

pub const REMOTE_UPDATE_CHECKER_VERSION: &str = "3";

/// File name of the installed checker.
pub const CHECKER_SCRIPT_FILE_NAME: &str = "remote-skill-update-check.js";

/// Host lifecycle event the checker is registered on.
pub const SESSION_END_EVENT: &str = "SessionEnd";

/// Matcher used when registering the hook (every session).
pub const HOOK_MATCHER: &str = "*";

/// Hex digits of the content fingerprint carried in the marker.
const FINGERPRINT_LEN: usize = 12;

/// Comment embedded in the script: the version plus a fingerprint of the
/// generated constants and body. An installed file containing it is current
/// for these settings.
pub fn checker_script_marker(settings: &ScriptSettings) -> String {
    marker_for(&script_constants(settings))
}

fn marker_for(constants: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(constants.as_bytes());
    hasher.update(SCRIPT_BODY.as_bytes());
    let digest = format!("{:x}", hasher.finalize());
    format!(
        "/* remote-skill-update-checker v{REMOTE_UPDATE_CHECKER_VERSION} {} */",
        &digest[..FINGERPRINT_LEN]
    )
}

/// Values baked into a generated script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptSettings {
    pub cooldown: Duration,
    pub timeout: Duration,
    pub api_base: String,
    pub user_agent: String,
    /// Tool directories scanned for manifests, under home then cwd.
    pub platforms: Vec<Platform>,
}

impl Default for ScriptSettings {
    fn default() -> Self {
        Self {
            cooldown: DEFAULT_COOLDOWN,
            timeout: DEFAULT_TIMEOUT,
            api_base: DEFAULT_GITHUB_API.to_owned(),
            user_agent: DEFAULT_USER_AGENT.to_owned(),
            platforms: vec![Platform::Claude],
        }
    }
}

impl ScriptSettings {
    pub fn from_config(config: &UpdateCheckConfig, platforms: &[Platform]) -> Self {
        Self {
            cooldown: config.cooldown(),
            timeout: config.timeout(),
            api_base: config.api_base.clone(),
            user_agent: config.user_agent.clone(),
            platforms: platforms.to_vec(),
        }
    }
}

/// Checker source with default settings.
pub fn checker_script_contents() -> String {
    checker_script_contents_with(&ScriptSettings::default())
}

pub fn checker_script_contents_with(settings: &ScriptSettings) -> String {
    let constants = script_constants(settings);
    let mut script = format!(
        r##"#!/usr/bin/env node
{marker}
'use strict';

const fs = require('fs');
const path = require('path');
const os = require('os');
const http = require('http');
const https = require('https');

"##,
        marker = marker_for(&constants),
    );
    script.push_str(&constants);
    script.push_str(SCRIPT_BODY);
    script
}

fn script_constants(settings: &ScriptSettings) -> String {
    let tool_dirs: Vec<&str> = settings
        .platforms
        .iter()
        .map(|p| p.config_dir_name())
        .collect();

    format!(
        r##"const COOLDOWN_MS = {cooldown_ms};
const TIMEOUT_MS = {timeout_ms};
const API_BASE = {api_base};
const USER_AGENT = {user_agent};
const TOKEN_ENV_VARS = {token_vars};
const TOOL_DIRS = {tool_dirs};
const MANIFEST_FILE_NAME = {manifest_name};
const INVALID_SOURCE_ERROR = {invalid_source};
const SHORT_SHA_LEN = {short_sha_len};
const REPORT_HEADER = {report_header};
const REPORT_FOOTER = {report_footer};
"##,
        cooldown_ms = settings.cooldown.as_millis(),
        timeout_ms = settings.timeout.as_millis(),
        api_base = js_literal(&settings.api_base),
        user_agent = js_literal(&settings.user_agent),
        token_vars = Value::from(GITHUB_TOKEN_VARS.to_vec()),
        tool_dirs = Value::from(tool_dirs),
        manifest_name = js_literal(MANIFEST_FILE_NAME),
        invalid_source = js_literal(INVALID_SOURCE_ERROR),
        short_sha_len = SHORT_SHA_LEN,
        report_header = js_literal(REPORT_HEADER),
        report_footer = js_literal(REPORT_FOOTER),
    )
}

/// JSON string literals are valid JS string literals.
fn js_literal(s: &str) -> String {
    Value::from(s).to_string()
}

const SCRIPT_BODY: &str = r##"
function parseArgs(argv) {
  const args = new Set(argv.slice(2));
  return {
    force: args.has('--force') || args.has('-f'),
    verbose: args.has('--verbose') || args.has('-v'),
  };
}

function githubToken() {
  for (const name of TOKEN_ENV_VARS) {
    const value = (process.env[name] || '').trim();
    if (value) return value;
  }
  return null;
}

function readManifest(file) {
  try {
    const data = JSON.parse(fs.readFileSync(file, 'utf-8'));
    return data && typeof data === 'object' && !Array.isArray(data) ? data : {};
  } catch {
    return {};
  }
}

function isPlainObject(value) {
  return Boolean(value) && typeof value === 'object' && !Array.isArray(value);
}

function checkedLater(existing, incoming) {
  if (!isPlainObject(existing)) return false;
  const a = Date.parse(existing.lastCheckedAt);
  const b = Date.parse(incoming.lastCheckedAt);
  if (Number.isNaN(a)) return false;
  return Number.isNaN(b) || a > b;
}

// Re-read right before writing and replace only our keys, so entries written
// by a concurrent run for other sources survive. An entry checked later on
// disk than ours is kept.
function mergeRemoteCache(file, touched) {
  try {
    const current = readManifest(file);
    const cache = isPlainObject(current.remoteCache) ? current.remoteCache : {};
    for (const [source, entry] of Object.entries(touched)) {
      if (!checkedLater(cache[source], entry)) cache[source] = entry;
    }
    current.remoteCache = cache;
    fs.mkdirSync(path.dirname(file), { recursive: true });
    const tmp = file + '.tmp';
    fs.writeFileSync(tmp, JSON.stringify(current, null, 2), 'utf-8');
    fs.renameSync(tmp, file);
  } catch {
    // best-effort
  }
}

function manifestPaths() {
  const paths = [];
  for (const dir of TOOL_DIRS) {
    for (const base of [os.homedir(), process.cwd()]) {
      const file = path.join(base, dir, 'skills', MANIFEST_FILE_NAME);
      if (!paths.includes(file)) paths.push(file);
    }
  }
  return paths;
}

function remoteSources(manifest) {
  const skills = isPlainObject(manifest.skills) ? manifest.skills : {};
  const seen = new Set();
  for (const record of Object.values(skills)) {
    if (!isPlainObject(record) || typeof record.source !== 'string') continue;
    const source = record.source.trim();
    if (source) seen.add(source);
  }
  return Array.from(seen);
}

function parseRemoteSource(input) {
  const stripped = String(input).trim().replace(/^https?:\/\/github\.com\//i, '');
  const parts = stripped.split('/').filter(Boolean);
  if (parts.length < 2) return null;
  return { owner: parts[0], repo: parts[1], repoPath: parts.slice(2).join('/') || null };
}

function commitsUrl(source) {
  const parsed = parseRemoteSource(source);
  if (!parsed) return null;
  let url =
    API_BASE.replace(/\/+$/, '') +
    '/repos/' +
    encodeURIComponent(parsed.owner) +
    '/' +
    encodeURIComponent(parsed.repo) +
    '/commits?per_page=1';
  if (parsed.repoPath) url += '&path=' + encodeURIComponent(parsed.repoPath);
  return url;
}

function inCooldown(lastCheckedAt, now) {
  if (!lastCheckedAt) return false;
  const last = Date.parse(lastCheckedAt);
  if (Number.isNaN(last)) return false;
  return now.getTime() - last < COOLDOWN_MS;
}

function fetchText(url, token) {
  return new Promise((resolve, reject) => {
    const headers = { 'user-agent': USER_AGENT, accept: 'application/vnd.github+json' };
    if (token) headers.authorization = 'Bearer ' + token;
    const transport = url.startsWith('http:') ? http : https;

    const req = transport.request(url, { method: 'GET', headers }, (res) => {
      let body = '';
      res.setEncoding('utf8');
      res.on('data', (chunk) => (body += chunk));
      res.on('end', () => {
        clearTimeout(timer);
        const status = res.statusCode || 0;
        if (status >= 200 && status < 300) resolve(body);
        else reject(new Error('HTTP ' + status));
      });
    });
    const timer = setTimeout(() => {
      req.destroy();
      reject(new Error('Request timeout after ' + TIMEOUT_MS + 'ms'));
    }, TIMEOUT_MS);
    req.on('error', (err) => {
      clearTimeout(timer);
      reject(err);
    });
    req.end();
  });
}

function extractLatestSha(text) {
  try {
    const data = JSON.parse(text);
    const first = Array.isArray(data) ? data[0] : null;
    if (isPlainObject(first) && typeof first.sha === 'string' && first.sha) return first.sha;
    return null;
  } catch {
    return null;
  }
}

async function main() {
  const { force, verbose } = parseArgs(process.argv);
  const now = new Date();
  const token = githubToken();
  const updates = [];

  for (const file of manifestPaths()) {
    const manifest = readManifest(file);
    const sources = remoteSources(manifest);
    if (!sources.length) continue;

    const cache = isPlainObject(manifest.remoteCache) ? manifest.remoteCache : {};
    const touched = {};

    for (const source of sources) {
      const prev = isPlainObject(cache[source]) ? cache[source] : {};
      const prevSha = typeof prev.lastSeenSha === 'string' && prev.lastSeenSha ? prev.lastSeenSha : null;

      if (!force && inCooldown(prev.lastCheckedAt, now)) continue;

      const url = commitsUrl(source);
      if (!url) {
        if (verbose) console.log('[remote-skill-check] error', source, INVALID_SOURCE_ERROR);
        continue;
      }

      try {
        const latestSha = extractLatestSha(await fetchText(url, token));
        touched[source] = Object.assign({}, prev, { lastCheckedAt: now.toISOString() });
        if (latestSha) touched[source].lastSeenSha = latestSha;
        if (prevSha && latestSha && prevSha !== latestSha) {
          updates.push({ source, prevSha, latestSha });
        }
      } catch (e) {
        touched[source] = Object.assign({}, prev, { lastCheckedAt: now.toISOString() });
        if (verbose) {
          console.log('[remote-skill-check] error', source, String(e && e.message ? e.message : e));
        }
      }
    }

    if (Object.keys(touched).length) mergeRemoteCache(file, touched);
  }

  if (updates.length) {
    console.log('\n' + REPORT_HEADER);
    for (const u of updates) {
      console.log('  -', u.source);
      console.log('    ', u.prevSha.slice(0, SHORT_SHA_LEN), '->', u.latestSha.slice(0, SHORT_SHA_LEN));
    }
    console.log('\n' + REPORT_FOOTER + '\n');
  }
}

main().catch(() => {
  // advisory only; never fail the host hook
});
"##;

/// `~/.claude/scripts/remote-skill-update-check.js`
pub fn checker_script_install_path() -> PathBuf {
    checker_script_install_path_in(&home_dir())
}

pub fn checker_script_install_path_in(home: &Path) -> PathBuf {
    home.join(Platform::Claude.config_dir_name())
        .join("scripts")
        .join(CHECKER_SCRIPT_FILE_NAME)
}

/// Shell command a host runs to invoke the installed checker.
pub fn checker_hook_command(script_path: &Path) -> String {
    format!("node \"{}\"", script_path.display())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptInstall {
    /// The script was (re)written.
    Installed,
    /// An installed copy already carries the current marker.
    UpToDate,
}

/// Write the script generated from `settings` to `path` unless the file
/// there already carries the same marker. Marks the file executable on unix.
pub fn install_checker_script(path: &Path, settings: &ScriptSettings) -> Result<ScriptInstall> {
    let marker = checker_script_marker(settings);
    if let Ok(existing) = std::fs::read_to_string(path)
        && existing.lines().any(|line| line == marker)
    {
        debug!(path = %path.display(), "checker script up to date");
        return Ok(ScriptInstall::UpToDate);
    }

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, checker_script_contents_with(settings))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if let Err(e) = std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755)) {
            warn!(path = %path.display(), error = %e, "failed to mark checker script executable");
        }
    }

    info!(path = %path.display(), %marker, "installed checker script");
    Ok(ScriptInstall::Installed)
}

/// Registers a shell command against a host lifecycle event.
pub trait HookRegistrar {
    fn register(&mut self, event: &str, matcher: &str, command: &str) -> Result<()>;
}

/// Install the checker and register it on [`SESSION_END_EVENT`].
pub fn ensure_checker_installed(
    path: &Path,
    settings: &ScriptSettings,
    registrar: &mut dyn HookRegistrar,
) -> Result<ScriptInstall> {
    let outcome = install_checker_script(path, settings)?;
    registrar.register(SESSION_END_EVENT, HOOK_MATCHER, &checker_hook_command(path))?;
    Ok(outcome)
}
