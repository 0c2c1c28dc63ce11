use serde::Deserialize;

/// A rendered page captured by the browser-side collaborator.
///
/// The markup the capture comes from is unversioned and inconsistent, so
/// nothing here assumes a particular structure; extraction strategies probe
/// it through class/tag vocabularies. The snapshot is a pure value: building
/// one by hand in tests stands in for any real rendering surface.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct PageSnapshot {
    pub url: String,
    /// The user's live text selection at capture time, verbatim.
    pub selection: Option<String>,
    pub root: PageNode,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct PageNode {
    pub tag: String,
    pub classes: Vec<String>,
    pub text: Option<String>,
    pub children: Vec<PageNode>,
}

/// Index path from the snapshot root to a node. Stands in for the captured
/// element reference used by inline annotation placement; stale paths are a
/// normal outcome there, not an error.
pub type NodePath = Vec<usize>;

/// A matched node together with its path.
#[derive(Debug, Clone)]
pub struct NodeHit<'a> {
    pub path: NodePath,
    pub node: &'a PageNode,
}

/// A fixed set of tag names and class substrings that identify a kind of
/// element on an arbitrarily-rendered page.
#[derive(Debug, Clone, Copy)]
pub struct Vocabulary {
    pub tags: &'static [&'static str],
    pub class_terms: &'static [&'static str],
}

/// Classification of a line-like element inside a diff rendering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineKind {
    Addition,
    Deletion,
    Neutral,
}

/// Class substrings that mark an inserted line.
pub const ADDITION_TERMS: &[&str] = &[
    "addition",
    "added",
    "add-line",
    "insert",
    "diff-add",
    "line-add",
    "new-line",
    "green",
    "plus",
];

/// Class substrings that mark a removed line. Recognized so they can be
/// discarded, since removed code is never reviewed.
pub const DELETION_TERMS: &[&str] = &[
    "deletion", "deleted", "removed", "delete", "diff-del", "line-del", "minus", "red",
];

impl PageNode {
    /// True if any class contains `term` (case-insensitive).
    pub fn has_class_term(&self, term: &str) -> bool {
        self.classes
            .iter()
            .any(|c| c.to_ascii_lowercase().contains(term))
    }

    fn has_any_class_term(&self, terms: &[&str]) -> bool {
        terms.iter().any(|t| self.has_class_term(t))
    }

    /// True if any descendant (including self) matches one of `terms`.
    fn subtree_has_class_term(&self, terms: &[&str]) -> bool {
        self.has_any_class_term(terms)
            || self.children.iter().any(|c| c.subtree_has_class_term(terms))
    }

    pub fn matches(&self, vocab: &Vocabulary) -> bool {
        vocab.tags.iter().any(|t| self.tag.eq_ignore_ascii_case(t))
            || self.has_any_class_term(vocab.class_terms)
    }

    /// Concatenated text content of this node's subtree, in document order.
    pub fn text(&self) -> String {
        let mut out = String::new();
        self.collect_text(&mut out);
        out
    }

    fn collect_text(&self, out: &mut String) {
        if let Some(ref t) = self.text {
            out.push_str(t);
        }
        for child in &self.children {
            child.collect_text(out);
        }
    }
}

impl PageSnapshot {
    /// All topmost elements matching `vocab`, in document order. Matched
    /// subtrees are not descended into, so nested matches do not duplicate.
    pub fn containers<'a>(&'a self, vocab: &Vocabulary) -> Vec<NodeHit<'a>> {
        let mut hits = Vec::new();
        collect_matches(&self.root, vocab, &mut Vec::new(), &mut hits);
        hits
    }

    /// Resolve a previously captured path, if the snapshot still has it.
    pub fn resolve(&self, path: &[usize]) -> Option<&PageNode> {
        let mut node = &self.root;
        for &idx in path {
            node = node.children.get(idx)?;
        }
        Some(node)
    }

    pub fn selection(&self) -> Option<&str> {
        self.selection.as_deref()
    }
}

fn collect_matches<'a>(
    node: &'a PageNode,
    vocab: &Vocabulary,
    path: &mut Vec<usize>,
    hits: &mut Vec<NodeHit<'a>>,
) {
    if node.matches(vocab) {
        hits.push(NodeHit {
            path: path.clone(),
            node,
        });
        return;
    }
    for (idx, child) in node.children.iter().enumerate() {
        path.push(idx);
        collect_matches(child, vocab, path, hits);
        path.pop();
    }
}

/// Classify a line-like element as addition/deletion/neutral.
///
/// An element counts as an addition when its own class, its parent's class, or
/// any descendant's class matches the addition vocabulary; deletions are
/// matched the same way. Addition wins the tie-break.
pub fn classify_line(parent: &PageNode, line: &PageNode) -> LineKind {
    if line.subtree_has_class_term(ADDITION_TERMS) || parent.has_any_class_term(ADDITION_TERMS) {
        return LineKind::Addition;
    }
    if line.subtree_has_class_term(DELETION_TERMS) || parent.has_any_class_term(DELETION_TERMS) {
        return LineKind::Deletion;
    }
    LineKind::Neutral
}


#[cfg(test)]
mod tests {
    use super::testutil::{node, snapshot};
    use super::*;

    const DIFF_VOCAB: Vocabulary = Vocabulary {
        tags: &[],
        class_terms: &["diff-container"],
    };

    #[test]
    fn test_text_concatenates_subtree() {
        let n = node(
            "div",
            &[],
            "let ",
            vec![node("span", &[], "x = 1;", vec![])],
        );
        assert_eq!(n.text(), "let x = 1;");
    }

    #[test]
    fn test_containers_topmost_only() {
        let root = node(
            "body",
            &[],
            "",
            vec![node(
                "div",
                &["diff-container"],
                "",
                vec![node("div", &["diff-container"], "", vec![])],
            )],
        );
        let page = snapshot("https://example.test", root);
        let hits = page.containers(&DIFF_VOCAB);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].path, vec![0]);
    }

    #[test]
    fn test_containers_document_order() {
        let root = node(
            "body",
            &[],
            "",
            vec![
                node("div", &[], "", vec![node("div", &["diff-container"], "a", vec![])]),
                node("div", &["diff-container"], "b", vec![]),
            ],
        );
        let page = snapshot("u", root);
        let hits = page.containers(&DIFF_VOCAB);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].node.text(), "a");
        assert_eq!(hits[1].node.text(), "b");
    }

    #[test]
    fn test_resolve_path() {
        let root = node(
            "body",
            &[],
            "",
            vec![node("div", &[], "", vec![node("span", &[], "hit", vec![])])],
        );
        let page = snapshot("u", root);
        assert_eq!(page.resolve(&[0, 0]).unwrap().text(), "hit");
        assert!(page.resolve(&[0, 3]).is_none());
    }

    #[test]
    fn test_classify_own_class() {
        let parent = node("div", &[], "", vec![]);
        let add = node("div", &["repos-line-addition"], "x", vec![]);
        let del = node("div", &["repos-line-deletion"], "x", vec![]);
        let plain = node("div", &["code-line"], "x", vec![]);
        assert_eq!(classify_line(&parent, &add), LineKind::Addition);
        assert_eq!(classify_line(&parent, &del), LineKind::Deletion);
        assert_eq!(classify_line(&parent, &plain), LineKind::Neutral);
    }

    #[test]
    fn test_classify_parent_class() {
        let parent = node("div", &["added-content"], "", vec![]);
        let line = node("div", &["code-line"], "x", vec![]);
        assert_eq!(classify_line(&parent, &line), LineKind::Addition);
    }

    #[test]
    fn test_classify_descendant_class() {
        let parent = node("div", &[], "", vec![]);
        let line = node(
            "div",
            &["code-line"],
            "",
            vec![node("span", &["insert-marker"], "x", vec![])],
        );
        assert_eq!(classify_line(&parent, &line), LineKind::Addition);
    }

    #[test]
    fn test_classify_addition_wins_tiebreak() {
        let parent = node("div", &[], "", vec![]);
        let line = node("div", &["diff-add", "red-anchor"], "x", vec![]);
        assert_eq!(classify_line(&parent, &line), LineKind::Addition);
    }

    #[test]
    fn test_classify_case_insensitive() {
        let parent = node("div", &[], "", vec![]);
        let line = node("div", &["Repos-Line-Addition"], "x", vec![]);
        assert_eq!(classify_line(&parent, &line), LineKind::Addition);
    }

    #[test]
    fn test_snapshot_deserializes_with_defaults() {
        let json = r#"{"root": {"tag": "body", "children": [{"tag": "pre", "text": "code"}]}}"#;
        let page: PageSnapshot = serde_json::from_str(json).unwrap();
        assert!(page.selection.is_none());
        assert_eq!(page.root.children[0].text(), "code");
    }
}
