pub mod strategies;

use tracing::debug;

use crate::context::RepoContext;
use crate::page::{NodePath, PageSnapshot};

/// Which part of the page a review was requested for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    /// Only the first extracted record.
    Current,
    /// Every extracted record.
    All,
    /// The user's live text selection, nothing else.
    Selected,
}

impl Scope {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "current" => Some(Scope::Current),
            "all" => Some(Scope::All),
            "selected" | "selection" => Some(Scope::Selected),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeType {
    Add,
    Edit,
    Delete,
}

/// One extracted line with its 1-based display position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineEntry {
    pub line: u32,
    pub content: String,
}

/// Which extraction strategy produced a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrategyKind {
    Selection,
    Remote,
    AdditionMarkers,
    SidePanel,
    ContainerScan,
    EditorLines,
    CodeBlocks,
    VisibleText,
}

impl StrategyKind {
    pub fn name(self) -> &'static str {
        match self {
            StrategyKind::Selection => "selection",
            StrategyKind::Remote => "remote",
            StrategyKind::AdditionMarkers => "addition-markers",
            StrategyKind::SidePanel => "side-panel",
            StrategyKind::ContainerScan => "container-scan",
            StrategyKind::EditorLines => "editor-lines",
            StrategyKind::CodeBlocks => "code-blocks",
            StrategyKind::VisibleText => "visible-text",
        }
    }
}

/// One file's worth of extracted new/changed content, the unit of review.
///
/// Created by exactly one strategy, read-only afterwards, lives for one
/// review pass.
#[derive(Debug, Clone)]
pub struct ChangeRecord {
    pub filename: String,
    pub content: String,
    /// Populated only for records sourced from the remote content API.
    pub original_content: Option<String>,
    pub new_content: Option<String>,
    pub additions: Vec<LineEntry>,
    pub deletions: Vec<LineEntry>,
    pub has_new_code: bool,
    pub change_type: ChangeType,
    pub source: StrategyKind,
    /// Path of the page element this record was read from, for inline
    /// annotation placement. Absent for remote and selection records.
    pub element: Option<NodePath>,
}

impl ChangeRecord {
    /// The text that actually gets reviewed: `additions` is authoritative
    /// whenever present, raw `content` is a fallback only.
    pub fn review_payload(&self) -> String {
        if self.additions.is_empty() {
            self.content.clone()
        } else {
            self.additions
                .iter()
                .map(|a| a.content.as_str())
                .collect::<Vec<_>>()
                .join("\n")
        }
    }
}

/// Seam for the remote content fetcher. Returns an empty list on any failure
/// so the chain can fall through to page-scanning strategies.
pub trait RemoteChanges {
    fn fetch(&self, ctx: &RepoContext) -> Vec<ChangeRecord>;
}

/// A remote source that never yields anything (offline / tests).
pub struct NoRemote;

impl RemoteChanges for NoRemote {
    fn fetch(&self, _ctx: &RepoContext) -> Vec<ChangeRecord> {
        Vec::new()
    }
}

/// Run the extraction strategy chain over a page.
///
/// Strategies are tried in fixed priority order; the first one to yield a
/// non-empty sequence wins and nothing after it runs. `Selected` scope runs
/// only the selection strategy; an empty selection is an empty result, not a
/// fallback. An empty return is the terminal "nothing to review" outcome.
pub fn extract_changes(
    scope: Scope,
    page: &PageSnapshot,
    remote: &dyn RemoteChanges,
) -> Vec<ChangeRecord> {
    if scope == Scope::Selected {
        return strategies::selection(page);
    }

    let chain: Vec<(StrategyKind, Box<dyn Fn() -> Vec<ChangeRecord> + '_>)> = vec![
        (
            StrategyKind::Remote,
            Box::new(|| match RepoContext::from_url(&page.url) {
                Some(ctx) => remote.fetch(&ctx),
                None => Vec::new(),
            }),
        ),
        (
            StrategyKind::AdditionMarkers,
            Box::new(|| strategies::addition_markers(page)),
        ),
        (
            StrategyKind::SidePanel,
            Box::new(|| strategies::side_panel(page)),
        ),
        (
            StrategyKind::ContainerScan,
            Box::new(|| strategies::container_scan(page)),
        ),
        (
            StrategyKind::EditorLines,
            Box::new(|| strategies::editor_lines(page)),
        ),
        (
            StrategyKind::CodeBlocks,
            Box::new(|| strategies::code_blocks(page)),
        ),
        (
            StrategyKind::VisibleText,
            Box::new(|| strategies::visible_text(page)),
        ),
    ];

    let mut records = first_non_empty(&chain);

    if scope == Scope::Current {
        records.truncate(1);
    }
    records
}

/// Generic first-non-empty-wins reducer over an ordered strategy list.
fn first_non_empty(
    chain: &[(StrategyKind, Box<dyn Fn() -> Vec<ChangeRecord> + '_>)],
) -> Vec<ChangeRecord> {
    for (kind, run) in chain {
        let records = run();
        if !records.is_empty() {
            debug!(strategy = kind.name(), count = records.len(), "strategy yielded records");
            return records;
        }
    }
    debug!("no strategy yielded records");
    Vec::new()
}
