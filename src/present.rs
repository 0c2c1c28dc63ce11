use std::collections::HashSet;
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::info;

use crate::extract::ChangeRecord;
use crate::page::{NodePath, PageNode, PageSnapshot, Vocabulary};
use crate::review::{Issue, ReviewResult, Severity, Summary};
use crate::store::ReviewStats;

/// Line-like elements an annotation can attach to.
const LINE_VOCAB: Vocabulary = Vocabulary {
    tags: &[],
    class_terms: &["line", "row"],
};

const NOTICE_TTL: Duration = Duration::from_secs(5);

/// Effect seam for rendering review progress. The orchestrator only ever
/// talks to this trait.
pub trait Presenter {
    fn pass_started(&mut self, files: usize);
    fn file_reviewed(&mut self, record: &ChangeRecord, result: &ReviewResult);
    fn pass_completed(&mut self, stats: &ReviewStats);
    fn pass_failed(&mut self, message: &str);
}

/// Which findings the panel currently shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FindingFilter {
    All,
    SummaryOnly,
    Severity(Severity),
}

#[derive(Debug, Clone)]
pub struct PanelEntry {
    pub filename: String,
    pub issue: Issue,
}

/// A best-effort inline marker attached to a line element on the page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Annotation {
    pub path: NodePath,
    pub severity: Severity,
    pub title: String,
}

/// In-memory model of the findings panel.
///
/// Severity counters are recomputed on demand from everything rendered, never
/// tracked incrementally, so they cannot drift from what the user sees. The
/// filter changes visibility only; counts always describe the full
/// population.
#[derive(Default)]
pub struct Panel {
    summaries: Vec<(String, Summary)>,
    entries: Vec<PanelEntry>,
    filter: Option<FindingFilter>,
    annotated: HashSet<NodePath>,
}

impl Panel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_filter(&mut self, filter: FindingFilter) {
        self.filter = Some(filter);
    }

    /// Drop everything rendered so far, including annotation bookkeeping.
    pub fn clear(&mut self) {
        self.summaries.clear();
        self.entries.clear();
        self.annotated.clear();
    }

    /// Render one file's parsed review into the panel.
    pub fn push_result(&mut self, record: &ChangeRecord, result: &ReviewResult) {
        if let Some(ref summary) = result.summary {
            self.summaries.push((record.filename.clone(), summary.clone()));
        }
        for issue in &result.issues {
            self.entries.push(PanelEntry {
                filename: record.filename.clone(),
                issue: issue.clone(),
            });
        }
    }

    pub fn summaries(&self) -> &[(String, Summary)] {
        &self.summaries
    }

    /// Entries visible under the current filter.
    pub fn visible(&self) -> Vec<&PanelEntry> {
        match self.filter.unwrap_or(FindingFilter::All) {
            FindingFilter::All => self.entries.iter().collect(),
            FindingFilter::SummaryOnly => Vec::new(),
            FindingFilter::Severity(severity) => self
                .entries
                .iter()
                .filter(|e| e.issue.severity == severity)
                .collect(),
        }
    }

    /// Severity counters over the full rendered population.
    pub fn counts(&self) -> ReviewStats {
        let mut stats = ReviewStats::default();
        stats.files = self.summaries.len() as u64;
        for entry in &self.entries {
            match entry.issue.severity {
                Severity::Critical => stats.critical += 1,
                Severity::Warning => stats.warnings += 1,
                Severity::Suggestion => stats.suggestions += 1,
            }
        }
        stats
    }

    /// Compute inline annotations for one file's issues.
    ///
    /// Placement is best effort: a record without an element path, an issue
    /// without a usable line number, a stale path, or a line index past the
    /// end all skip silently. A line element is annotated at most once.
    pub fn annotate(
        &mut self,
        page: &PageSnapshot,
        record: &ChangeRecord,
        issues: &[Issue],
    ) -> Vec<Annotation> {
        let Some(ref base) = record.element else {
            return Vec::new();
        };
        let Some(root) = page.resolve(base) else {
            return Vec::new();
        };

        let lines = line_paths(root, base);
        let mut out = Vec::new();
        for issue in issues {
            let line = issue.line.primary();
            if line == 0 {
                continue;
            }
            let Some(path) = lines.get(line as usize - 1) else {
                continue;
            };
            if !self.annotated.insert(path.clone()) {
                continue;
            }
            out.push(Annotation {
                path: path.clone(),
                severity: issue.severity,
                title: issue.title.clone(),
            });
        }
        out
    }
}

/// Absolute paths of the topmost line-like descendants of `root`, in
/// document order. `base` is the absolute path of `root` itself.
fn line_paths(root: &PageNode, base: &NodePath) -> Vec<NodePath> {
    let mut paths = Vec::new();
    let mut prefix = base.clone();
    for (idx, child) in root.children.iter().enumerate() {
        prefix.push(idx);
        collect_line_paths(child, &mut prefix, &mut paths);
        prefix.pop();
    }
    paths
}

fn collect_line_paths(node: &PageNode, prefix: &mut NodePath, paths: &mut Vec<NodePath>) {
    if node.matches(&LINE_VOCAB) {
        paths.push(prefix.clone());
        return;
    }
    for (idx, child) in node.children.iter().enumerate() {
        prefix.push(idx);
        collect_line_paths(child, prefix, paths);
        prefix.pop();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeKind {
    Info,
    Error,
}

#[derive(Debug, Clone)]
pub struct Notice {
    pub message: String,
    pub kind: NoticeKind,
    deadline: Instant,
}

/// Single-slot transient notice with a dismissal deadline. Showing a new
/// notice replaces the current one; expiry is observed on read.
#[derive(Default)]
pub struct Notifier {
    current: Option<Notice>,
}

impl Notifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn show(&mut self, message: impl Into<String>, kind: NoticeKind) {
        self.show_for(message, kind, NOTICE_TTL);
    }

    pub fn show_for(&mut self, message: impl Into<String>, kind: NoticeKind, ttl: Duration) {
        self.current = Some(Notice {
            message: message.into(),
            kind,
            deadline: Instant::now() + ttl,
        });
    }

    pub fn dismiss(&mut self) {
        self.current = None;
    }

    /// The current notice, if it has not passed its deadline.
    pub fn active(&mut self, now: Instant) -> Option<&Notice> {
        if let Some(ref notice) = self.current
            && now >= notice.deadline
        {
            self.current = None;
        }
        self.current.as_ref()
    }
}

/// Presenter that writes findings to stdout, for direct CLI runs.
#[derive(Default)]
pub struct ConsolePresenter;

impl Presenter for ConsolePresenter {
    fn pass_started(&mut self, files: usize) {
        info!(files, "review pass started");
        println!("Reviewing {files} file(s)...");
    }

    fn file_reviewed(&mut self, record: &ChangeRecord, result: &ReviewResult) {
        println!("\n{}", record.filename);
        if let Some(ref summary) = result.summary {
            println!("  {} (risk: {})", summary.description, summary.risk_level.name());
        }
        if result.issues.is_empty() {
            println!("  no issues found");
        }
        for issue in &result.issues {
            println!(
                "  [{}] line {}: {}",
                issue.severity.name(),
                issue.line,
                issue.title
            );
            if !issue.description.is_empty() {
                println!("      {}", issue.description);
            }
            if let Some(ref suggestion) = issue.suggestion {
                println!("      suggestion: {suggestion}");
            }
        }
    }

    fn pass_completed(&mut self, stats: &ReviewStats) {
        println!(
            "\nDone: {} file(s), {} critical, {} warning(s), {} suggestion(s)",
            stats.files, stats.critical, stats.warnings, stats.suggestions
        );
    }

    fn pass_failed(&mut self, message: &str) {
        eprintln!("Review failed: {message}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::{ChangeType, StrategyKind};
    use crate::page::testutil::{node, snapshot};
    use crate::review::LineRef;

    fn issue(severity: Severity, line: u32, title: &str) -> Issue {
        Issue {
            line: LineRef::Number(line),
            severity,
            title: title.to_string(),
            ..Default::default()
        }
    }

    fn record_with_element(element: Option<NodePath>) -> ChangeRecord {
        ChangeRecord {
            filename: "a.rs".to_string(),
            content: "code".to_string(),
            original_content: None,
            new_content: None,
            additions: vec![],
            deletions: vec![],
            has_new_code: true,
            change_type: ChangeType::Edit,
            source: StrategyKind::ContainerScan,
            element,
        }
    }

    fn result_with(issues: Vec<Issue>) -> ReviewResult {
        ReviewResult {
            summary: Some(Summary::default()),
            issues,
        }
    }

    #[test]
    fn test_panel_counts_full_population() {
        let mut panel = Panel::new();
        let record = record_with_element(None);
        panel.push_result(
            &record,
            &result_with(vec![
                issue(Severity::Critical, 1, "a"),
                issue(Severity::Warning, 2, "b"),
                issue(Severity::Warning, 3, "c"),
            ]),
        );
        panel.set_filter(FindingFilter::Severity(Severity::Critical));

        // Filter narrows visibility, not the counters
        assert_eq!(panel.visible().len(), 1);
        let counts = panel.counts();
        assert_eq!(counts.critical, 1);
        assert_eq!(counts.warnings, 2);
        assert_eq!(counts.files, 1);
    }

    #[test]
    fn test_panel_summary_only_hides_issues() {
        let mut panel = Panel::new();
        let record = record_with_element(None);
        panel.push_result(&record, &result_with(vec![issue(Severity::Warning, 1, "a")]));
        panel.set_filter(FindingFilter::SummaryOnly);
        assert!(panel.visible().is_empty());
        assert_eq!(panel.summaries().len(), 1);
    }

    #[test]
    fn test_panel_clear_resets_annotations() {
        let mut panel = Panel::new();
        let page = line_page();
        let record = record_with_element(Some(vec![0]));
        let issues = vec![issue(Severity::Critical, 1, "a")];

        assert_eq!(panel.annotate(&page, &record, &issues).len(), 1);
        assert!(panel.annotate(&page, &record, &issues).is_empty());
        panel.clear();
        assert_eq!(panel.annotate(&page, &record, &issues).len(), 1);
    }

    /// body > div(container) > [div.code-line x3]
    fn line_page() -> PageSnapshot {
        snapshot(
            "u",
            node(
                "body",
                &[],
                "",
                vec![node(
                    "div",
                    &["diff-container"],
                    "",
                    vec![
                        node("div", &["code-line"], "one", vec![]),
                        node("div", &["code-line"], "two", vec![]),
                        node("div", &["code-line"], "three", vec![]),
                    ],
                )],
            ),
        )
    }

    #[test]
    fn test_annotate_nth_line() {
        let mut panel = Panel::new();
        let page = line_page();
        let record = record_with_element(Some(vec![0]));
        let annotations = panel.annotate(
            &page,
            &record,
            &[issue(Severity::Warning, 2, "second line")],
        );
        assert_eq!(annotations.len(), 1);
        assert_eq!(annotations[0].path, vec![0, 1]);
        assert_eq!(annotations[0].title, "second line");
    }

    #[test]
    fn test_annotate_skips_out_of_range_and_zero_lines() {
        let mut panel = Panel::new();
        let page = line_page();
        let record = record_with_element(Some(vec![0]));
        let annotations = panel.annotate(
            &page,
            &record,
            &[
                issue(Severity::Warning, 0, "no line"),
                issue(Severity::Warning, 99, "past the end"),
            ],
        );
        assert!(annotations.is_empty());
    }

    #[test]
    fn test_annotate_skips_stale_path_and_missing_element() {
        let mut panel = Panel::new();
        let page = line_page();
        let issues = vec![issue(Severity::Warning, 1, "a")];

        let no_element = record_with_element(None);
        assert!(panel.annotate(&page, &no_element, &issues).is_empty());

        let stale = record_with_element(Some(vec![7, 7]));
        assert!(panel.annotate(&page, &stale, &issues).is_empty());
    }

    #[test]
    fn test_annotate_range_line_uses_first_line() {
        let mut panel = Panel::new();
        let page = line_page();
        let record = record_with_element(Some(vec![0]));
        let issues = vec![Issue {
            line: LineRef::Range("3-5".to_string()),
            severity: Severity::Critical,
            title: "range".to_string(),
            ..Default::default()
        }];
        let annotations = panel.annotate(&page, &record, &issues);
        assert_eq!(annotations.len(), 1);
        assert_eq!(annotations[0].path, vec![0, 2]);
    }

    #[test]
    fn test_notifier_replaces_and_expires() {
        let mut notifier = Notifier::new();
        notifier.show_for("first", NoticeKind::Info, Duration::from_secs(60));
        notifier.show_for("second", NoticeKind::Error, Duration::from_secs(60));

        let now = Instant::now();
        let active = notifier.active(now).unwrap();
        assert_eq!(active.message, "second");
        assert_eq!(active.kind, NoticeKind::Error);

        // Past the deadline the slot empties on read
        assert!(notifier.active(now + Duration::from_secs(120)).is_none());
        assert!(notifier.active(now).is_none());
    }

    #[test]
    fn test_notifier_dismiss() {
        let mut notifier = Notifier::new();
        notifier.show("hello", NoticeKind::Info);
        notifier.dismiss();
        assert!(notifier.active(Instant::now()).is_none());
    }
}
