use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::context::RepoContext;
use crate::error::{Error, Result};
use crate::extract::{ChangeRecord, ChangeType, RemoteChanges, StrategyKind};

const API_VERSION: &str = "7.0";

/// Cap on records produced per fetch.
pub const MAX_FILES: usize = 15;
/// Files whose new content exceeds this many characters are skipped.
pub const MAX_FILE_SIZE: usize = 50_000;

/// Extensions that never contain reviewable text.
const BINARY_EXTENSIONS: &[&str] = &[
    "png", "jpg", "jpeg", "gif", "bmp", "ico", "webp", "pdf", "zip", "gz", "tar", "7z", "jar",
    "exe", "dll", "so", "dylib", "bin", "woff", "woff2", "ttf", "eot", "mp3", "mp4", "mov",
];

/// Minimal HTTP seam so the fetcher is testable without a network.
pub trait HttpGateway {
    fn get(&self, url: &str) -> Result<String>;
}

/// Real gateway over ureq. An access token, when configured, is sent as a
/// bearer credential.
pub struct UreqGateway {
    access_token: Option<String>,
}

impl UreqGateway {
    pub fn new(access_token: Option<String>) -> Self {
        Self { access_token }
    }
}

impl HttpGateway for UreqGateway {
    fn get(&self, url: &str) -> Result<String> {
        let mut request = ureq::get(url);
        if let Some(ref token) = self.access_token {
            request = request.set("Authorization", &format!("Bearer {token}"));
        }
        match request.call() {
            Ok(response) => response
                .into_string()
                .map_err(|e| Error::Fetch(format!("failed to read response body: {e}"))),
            Err(ureq::Error::Status(code, _)) => {
                Err(Error::Fetch(format!("request failed with status {code}")))
            }
            Err(e) => Err(Error::Fetch(format!("request failed: {e}"))),
        }
    }
}

// --- REST response types ---

#[derive(Debug, Deserialize)]
struct IterationList {
    #[serde(default)]
    value: Vec<Iteration>,
}

#[derive(Debug, Deserialize)]
struct Iteration {
    id: u64,
    #[serde(rename = "sourceRefCommit")]
    source_ref_commit: Option<CommitRef>,
    #[serde(rename = "commonRefCommit")]
    common_ref_commit: Option<CommitRef>,
    #[serde(rename = "targetRefCommit")]
    target_ref_commit: Option<CommitRef>,
}

#[derive(Debug, Deserialize)]
struct CommitRef {
    #[serde(rename = "commitId")]
    commit_id: String,
}

/// The change list arrives under either `changeEntries` or `value` depending
/// on the server version; both are accepted.
#[derive(Debug, Deserialize)]
struct ChangeList {
    #[serde(default, rename = "changeEntries")]
    change_entries: Vec<ChangeEntry>,
    #[serde(default)]
    value: Vec<ChangeEntry>,
}

impl ChangeList {
    fn entries(self) -> Vec<ChangeEntry> {
        if self.change_entries.is_empty() {
            self.value
        } else {
            self.change_entries
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChangeEntry {
    item: Option<ChangeItem>,
    #[serde(default, rename = "changeType")]
    change_type: String,
}

#[derive(Debug, Deserialize, Default)]
struct ChangeItem {
    path: Option<String>,
    #[serde(default, rename = "isFolder")]
    is_folder: bool,
    #[serde(default, rename = "gitObjectType")]
    git_object_type: Option<String>,
}

/// Fetches a pull request's latest revision pair over the REST API and turns
/// the changed files into records with before/after content.
pub struct AdoFetcher<G = UreqGateway> {
    gateway: G,
}

impl AdoFetcher<UreqGateway> {
    pub fn new(access_token: Option<String>) -> Self {
        Self {
            gateway: UreqGateway::new(access_token),
        }
    }
}

impl<G: HttpGateway> AdoFetcher<G> {
    pub fn with_gateway(gateway: G) -> Self {
        Self { gateway }
    }

    fn get_json<T: for<'de> Deserialize<'de>>(&self, url: &str) -> Result<T> {
        let body = self.gateway.get(url)?;
        serde_json::from_str(&body)
            .map_err(|e| Error::Fetch(format!("failed to parse API response: {e}")))
    }

    /// Latest iteration's (source, comparison) commit pair.
    fn latest_iteration(&self, ctx: &RepoContext) -> Result<(u64, String, String)> {
        let url = format!(
            "{}/pullRequests/{}/iterations?api-version={}",
            ctx.api_base(),
            ctx.pull_request_id,
            API_VERSION
        );
        let list: IterationList = self.get_json(&url)?;
        let last = list
            .value
            .into_iter()
            .last()
            .ok_or_else(|| Error::Fetch("pull request has no iterations".to_string()))?;

        let source = last
            .source_ref_commit
            .map(|c| c.commit_id)
            .ok_or_else(|| Error::Fetch("iteration has no source commit".to_string()))?;
        let comparison = last
            .common_ref_commit
            .or(last.target_ref_commit)
            .map(|c| c.commit_id)
            .ok_or_else(|| Error::Fetch("iteration has no comparison commit".to_string()))?;
        Ok((last.id, source, comparison))
    }

    fn list_changes(&self, ctx: &RepoContext, iteration: u64) -> Result<Vec<ChangeEntry>> {
        let url = format!(
            "{}/pullRequests/{}/iterations/{}/changes?api-version={}",
            ctx.api_base(),
            ctx.pull_request_id,
            iteration,
            API_VERSION
        );
        let list: ChangeList = self.get_json(&url)?;
        Ok(list.entries())
    }

    fn item_content(&self, ctx: &RepoContext, path: &str, commit: &str) -> Result<String> {
        let encoded = utf8_percent_encode(path, NON_ALPHANUMERIC);
        let url = format!(
            "{}/items?path={}&versionDescriptor.versionType=commit&versionDescriptor.version={}&includeContent=true&$format=text&api-version={}",
            ctx.api_base(),
            encoded,
            commit,
            API_VERSION
        );
        self.gateway.get(&url)
    }

    /// Fetch the changed files of the latest revision. Failures at the
    /// iteration or change-list step abort with an error (the caller turns
    /// that into an empty result); per-file problems skip only that file.
    fn fetch_impl(&self, ctx: &RepoContext) -> Result<Vec<ChangeRecord>> {
        let (iteration, source_commit, comparison_commit) = self.latest_iteration(ctx)?;
        let entries = self.list_changes(ctx, iteration)?;
        debug!(iteration, entries = entries.len(), "listed iteration changes");

        let mut records = Vec::new();
        for entry in entries {
            if records.len() >= MAX_FILES {
                break;
            }
            let item = entry.item.unwrap_or_default();
            let Some(path) = item.path else {
                continue;
            };
            if item.is_folder
                || item.git_object_type.as_deref() == Some("tree")
                || path.ends_with('/')
            {
                continue;
            }
            let change_type = parse_change_type(&entry.change_type);
            if change_type == ChangeType::Delete {
                continue;
            }
            if is_binary_path(&path) {
                continue;
            }

            let new_content = match self.item_content(ctx, &path, &source_commit) {
                Ok(content) => content,
                Err(e) => {
                    warn!(path, error = %e, "skipping file, new content unavailable");
                    continue;
                }
            };
            if new_content.chars().count() > MAX_FILE_SIZE {
                debug!(path, "skipping oversized file");
                continue;
            }

            let original_content = if change_type == ChangeType::Add {
                None
            } else {
                match self.item_content(ctx, &path, &comparison_commit) {
                    Ok(content) => Some(content),
                    Err(e) => {
                        warn!(path, error = %e, "original content unavailable");
                        None
                    }
                }
            };

            records.push(ChangeRecord {
                filename: path.trim_start_matches('/').to_string(),
                content: new_content.clone(),
                original_content,
                new_content: Some(new_content),
                additions: Vec::new(),
                deletions: Vec::new(),
                has_new_code: true,
                change_type,
                source: StrategyKind::Remote,
                element: None,
            });
        }
        Ok(records)
    }
}

impl<G: HttpGateway> RemoteChanges for AdoFetcher<G> {
    fn fetch(&self, ctx: &RepoContext) -> Vec<ChangeRecord> {
        match self.fetch_impl(ctx) {
            Ok(records) => records,
            Err(e) => {
                warn!(error = %e, "remote content fetch failed, falling through");
                Vec::new()
            }
        }
    }
}

fn parse_change_type(raw: &str) -> ChangeType {
    let lower = raw.to_ascii_lowercase();
    if lower.contains("delete") {
        ChangeType::Delete
    } else if lower.contains("add") {
        ChangeType::Add
    } else {
        ChangeType::Edit
    }
}

fn is_binary_path(path: &str) -> bool {
    path.rsplit_once('.')
        .map(|(_, ext)| {
            let ext = ext.to_ascii_lowercase();
            BINARY_EXTENSIONS.contains(&ext.as_str())
        })
        .unwrap_or(false)
}
