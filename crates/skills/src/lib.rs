//! Remote skill update tracking.
//!
//! Installers record the remote source of each skill in a
//! `.skills-manifest.json`; this crate reads those manifests, asks the
//! GitHub commits API for the latest sha of each source, keeps a per-source
//! cache with a cooldown, and reports sources that moved. It also generates
//! and installs a standalone checker script for session-end hooks.

pub mod check;
pub mod error;
pub mod fetch;
pub mod manifest;
pub mod runner;
pub mod script;
pub mod source;
pub mod types;

pub use {
    check::{
        CheckOptions, CheckOutcome, CheckStatus, RemoteUpdateCheckResult,
        check_remote_source_for_update, extract_latest_sha, should_skip_by_cooldown,
    },
    error::{Error, Result},
    fetch::{FetchError, FetchRequest, FetchText, HttpFetcher},
    manifest::{
        ManifestStore, default_manifest_paths, manifest_paths_for, read_manifest, write_manifest,
    },
    runner::{RunReport, UpdateNotice, format_update_report, run_update_checks},
    source::{build_commits_url, parse_remote_source},
    types::{ParsedRemoteSource, RemoteCacheEntry, RemoteSourced, SkillsManifest},
};
