//! Page-scanning extraction strategies, in chain priority order.
//!
//! Each strategy is a pure function over a snapshot: it either recognizes the
//! page shape it was written for and yields records, or yields nothing and
//! lets the chain fall through. Selector vocabularies are deliberately broad
//! because the markup they probe is unversioned.

use std::sync::LazyLock;

use regex::Regex;

use crate::page::{classify_line, LineKind, PageNode, PageSnapshot, Vocabulary, ADDITION_TERMS};

use super::{ChangeRecord, ChangeType, LineEntry, StrategyKind};

const ADDITION_MARKER_VOCAB: Vocabulary = Vocabulary {
    tags: &["ins"],
    class_terms: ADDITION_TERMS,
};

const RIGHT_PANEL_VOCAB: Vocabulary = Vocabulary {
    tags: &[],
    class_terms: &[
        "right-pane",
        "rightpane",
        "right-side",
        "modified-pane",
        "modified-content",
        "new-content",
        "target-side",
    ],
};

const DIFF_CONTAINER_VOCAB: Vocabulary = Vocabulary {
    tags: &[],
    class_terms: &[
        "diff-container",
        "diff-frame",
        "file-container",
        "file-diff",
        "compare-content",
        "repos-summary",
        "change-entry",
    ],
};

const LINE_VOCAB: Vocabulary = Vocabulary {
    tags: &[],
    class_terms: &["line", "row"],
};

const EDITOR_VOCAB: Vocabulary = Vocabulary {
    tags: &[],
    class_terms: &["view-lines", "editor-lines", "lines-content"],
};

const VIEW_LINE_VOCAB: Vocabulary = Vocabulary {
    tags: &[],
    class_terms: &["view-line", "editor-line"],
};

const CODE_BLOCK_VOCAB: Vocabulary = Vocabulary {
    tags: &["pre", "code"],
    class_terms: &["code-block", "highlight", "hljs", "monospace"],
};

const MAIN_CONTENT_VOCAB: Vocabulary = Vocabulary {
    tags: &["main", "article"],
    class_terms: &["main-content", "page-content", "content-area", "hub-content"],
};

const FILE_NAME_TERMS: &[&str] = &["file-name", "filename", "file-path", "filepath"];

/// Minimum extracted content length for a container-scan record.
const MIN_CONTAINER_CONTENT: usize = 20;
/// Minimum content length for a generic code block.
const MIN_CODE_BLOCK_CONTENT: usize = 50;
/// Minimum content length for the visible-area fallback.
const MIN_VISIBLE_CONTENT: usize = 100;

/// Strategy 1: the user's live selection, verbatim. Short-circuits the chain;
/// an empty selection is an empty result, never a fallback.
pub fn selection(page: &PageSnapshot) -> Vec<ChangeRecord> {
    let Some(text) = page.selection() else {
        return Vec::new();
    };
    if text.trim().is_empty() {
        return Vec::new();
    }
    vec![ChangeRecord {
        filename: "selection".to_string(),
        content: text.to_string(),
        original_content: None,
        new_content: None,
        additions: Vec::new(),
        deletions: Vec::new(),
        has_new_code: true,
        change_type: ChangeType::Edit,
        source: StrategyKind::Selection,
        element: None,
    }]
}

/// Strategy 3: elements whose class/role marks an inserted line. All marker
/// text on the page is concatenated into a single record.
pub fn addition_markers(page: &PageSnapshot) -> Vec<ChangeRecord> {
    let hits = page.containers(&ADDITION_MARKER_VOCAB);
    if hits.is_empty() {
        return Vec::new();
    }

    let mut additions = Vec::new();
    for hit in &hits {
        for raw in hit.node.text().lines() {
            let stripped = strip_line_number(raw);
            if stripped.trim().is_empty() {
                continue;
            }
            additions.push(LineEntry {
                line: additions.len() as u32 + 1,
                content: stripped,
            });
        }
    }
    if additions.is_empty() {
        return Vec::new();
    }

    let content = join_lines(&additions);
    vec![page_record(
        StrategyKind::AdditionMarkers,
        "changed-lines".to_string(),
        content,
        additions,
        Vec::new(),
        Some(hits[0].path.clone()),
    )]
}

/// Strategy 4: locate the "right/modified" panel and classify its line
/// elements by class-name substring. Deletions are recognized and discarded.
pub fn side_panel(page: &PageSnapshot) -> Vec<ChangeRecord> {
    let panels = page.containers(&RIGHT_PANEL_VOCAB);
    let Some(panel) = panels.first() else {
        return Vec::new();
    };

    let (additions, deletions) = classify_lines(panel.node);
    if additions.is_empty() {
        return Vec::new();
    }

    let content = join_lines(&additions);
    vec![page_record(
        StrategyKind::SidePanel,
        "modified-panel".to_string(),
        content,
        additions,
        deletions,
        Some(panel.path.clone()),
    )]
}

/// Strategy 5: scan every diff/file container and classify its child lines,
/// keeping only records above a minimal content threshold.
pub fn container_scan(page: &PageSnapshot) -> Vec<ChangeRecord> {
    let mut records = Vec::new();
    for (idx, hit) in page.containers(&DIFF_CONTAINER_VOCAB).iter().enumerate() {
        let (additions, deletions) = classify_lines(hit.node);
        if additions.is_empty() {
            continue;
        }
        let content = join_lines(&additions);
        if content.len() <= MIN_CONTAINER_CONTENT {
            continue;
        }
        records.push(page_record(
            StrategyKind::ContainerScan,
            container_filename(hit.node, idx),
            content,
            additions,
            deletions,
            Some(hit.path.clone()),
        ));
    }
    records
}

/// Strategy 6: read a code-editor-style line list directly, with no
/// addition/deletion classification.
pub fn editor_lines(page: &PageSnapshot) -> Vec<ChangeRecord> {
    let mut records = Vec::new();
    for (idx, hit) in page.containers(&EDITOR_VOCAB).iter().enumerate() {
        let lines = matching_descendants(hit.node, &VIEW_LINE_VOCAB);
        let content = if lines.is_empty() {
            hit.node.text()
        } else {
            lines
                .iter()
                .map(|l| l.text())
                .collect::<Vec<_>>()
                .join("\n")
        };
        let content = content.trim().to_string();
        if content.is_empty() {
            continue;
        }
        records.push(page_record(
            StrategyKind::EditorLines,
            format!("editor-{}", idx + 1),
            content,
            Vec::new(),
            Vec::new(),
            Some(hit.path.clone()),
        ));
    }
    records
}

/// Strategy 7: any preformatted/code-styled element above a minimal length.
pub fn code_blocks(page: &PageSnapshot) -> Vec<ChangeRecord> {
    let mut records = Vec::new();
    for (idx, hit) in page.containers(&CODE_BLOCK_VOCAB).iter().enumerate() {
        let content = hit.node.text().trim().to_string();
        if content.len() < MIN_CODE_BLOCK_CONTENT {
            continue;
        }
        records.push(page_record(
            StrategyKind::CodeBlocks,
            format!("code-block-{}", idx + 1),
            content,
            Vec::new(),
            Vec::new(),
            Some(hit.path.clone()),
        ));
    }
    records
}

/// Strategy 8, last resort: all visible text under the main content area,
/// accepted only above a length threshold.
pub fn visible_text(page: &PageSnapshot) -> Vec<ChangeRecord> {
    let mains = page.containers(&MAIN_CONTENT_VOCAB);
    let content = if mains.is_empty() {
        page.root.text()
    } else {
        mains
            .iter()
            .map(|h| h.node.text())
            .collect::<Vec<_>>()
            .join("\n")
    };
    let content = content.trim().to_string();
    if content.len() < MIN_VISIBLE_CONTENT {
        return Vec::new();
    }
    let element = mains.first().map(|h| h.path.clone());
    vec![page_record(
        StrategyKind::VisibleText,
        "visible-content".to_string(),
        content,
        Vec::new(),
        Vec::new(),
        element,
    )]
}

fn page_record(
    source: StrategyKind,
    filename: String,
    content: String,
    additions: Vec<LineEntry>,
    deletions: Vec<LineEntry>,
    element: Option<crate::page::NodePath>,
) -> ChangeRecord {
    ChangeRecord {
        filename,
        content,
        original_content: None,
        new_content: None,
        has_new_code: !additions.is_empty(),
        additions,
        deletions,
        change_type: ChangeType::Edit,
        source,
        element,
    }
}

/// Classify the topmost line-like descendants of `container`, returning
/// (additions, deletions). Neutral lines are dropped.
fn classify_lines(container: &PageNode) -> (Vec<LineEntry>, Vec<LineEntry>) {
    let mut additions = Vec::new();
    let mut deletions = Vec::new();
    for (idx, line) in matching_descendants(container, &LINE_VOCAB)
        .into_iter()
        .enumerate()
    {
        let stripped = strip_line_number(&line.text());
        if stripped.trim().is_empty() {
            continue;
        }
        let entry = LineEntry {
            line: idx as u32 + 1,
            content: stripped,
        };
        match classify_line(container, line) {
            LineKind::Addition => additions.push(entry),
            LineKind::Deletion => deletions.push(entry),
            LineKind::Neutral => {}
        }
    }
    (additions, deletions)
}

/// Topmost descendants of `root` (excluding `root`) matching `vocab`.
fn matching_descendants<'a>(root: &'a PageNode, vocab: &Vocabulary) -> Vec<&'a PageNode> {
    fn walk<'a>(node: &'a PageNode, vocab: &Vocabulary, out: &mut Vec<&'a PageNode>) {
        for child in &node.children {
            if child.matches(vocab) {
                out.push(child);
            } else {
                walk(child, vocab, out);
            }
        }
    }
    let mut out = Vec::new();
    walk(root, vocab, &mut out);
    out
}

fn container_filename(container: &PageNode, idx: usize) -> String {
    let name_vocab = Vocabulary {
        tags: &[],
        class_terms: FILE_NAME_TERMS,
    };
    let named = matching_descendants(container, &name_vocab)
        .first()
        .map(|n| n.text().trim().to_string())
        .filter(|t| !t.is_empty());
    named.unwrap_or_else(|| format!("file-{}", idx + 1))
}

static LINE_NUMBER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*\+?\s*\d+[\s:|]\s*").unwrap());

/// Remove a leading line-number token ("12 ", "12: ", "+12 ") from one line.
fn strip_line_number(line: &str) -> String {
    LINE_NUMBER_RE.replace(line, "").trim_end().to_string()
}

fn join_lines(entries: &[LineEntry]) -> String {
    entries
        .iter()
        .map(|e| e.content.as_str())
        .collect::<Vec<_>>()
        .join("\n")
}
