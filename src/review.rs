use serde::{Deserialize, Deserializer, Serialize};

/// Issue priority tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
    Warning,
    Suggestion,
}

impl Severity {
    pub fn name(self) -> &'static str {
        match self {
            Severity::Critical => "critical",
            Severity::Warning => "warning",
            Severity::Suggestion => "suggestion",
        }
    }
}

impl Default for Severity {
    fn default() -> Self {
        Severity::Suggestion
    }
}

fn lenient_severity<'de, D: Deserializer<'de>>(d: D) -> Result<Severity, D::Error> {
    let raw = String::deserialize(d).unwrap_or_default();
    let lower = raw.to_ascii_lowercase();
    Ok(if lower.contains("critical") || lower.contains("error") {
        Severity::Critical
    } else if lower.contains("warn") {
        Severity::Warning
    } else {
        Severity::Suggestion
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl Default for RiskLevel {
    fn default() -> Self {
        RiskLevel::Low
    }
}

impl RiskLevel {
    pub fn name(self) -> &'static str {
        match self {
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
        }
    }
}

fn lenient_risk<'de, D: Deserializer<'de>>(d: D) -> Result<RiskLevel, D::Error> {
    let raw = String::deserialize(d).unwrap_or_default();
    let lower = raw.to_ascii_lowercase();
    Ok(if lower.contains("high") {
        RiskLevel::High
    } else if lower.contains("medium") {
        RiskLevel::Medium
    } else {
        RiskLevel::Low
    })
}

/// A line reference from the model, either a plain number or a free-form
/// range string like `"10-14"`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum LineRef {
    Number(u32),
    Range(String),
}

impl Default for LineRef {
    fn default() -> Self {
        LineRef::Number(0)
    }
}

impl LineRef {
    /// First line of the reference, for inline placement.
    pub fn primary(&self) -> u32 {
        match self {
            LineRef::Number(n) => *n,
            LineRef::Range(s) => {
                let digits: String = s.chars().take_while(|c| c.is_ascii_digit()).collect();
                digits.parse().unwrap_or(0)
            }
        }
    }
}

impl std::fmt::Display for LineRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LineRef::Number(n) => write!(f, "{n}"),
            LineRef::Range(s) => write!(f, "{s}"),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct Issue {
    #[serde(default)]
    pub line: LineRef,
    #[serde(default, deserialize_with = "lenient_severity")]
    pub severity: Severity,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub suggestion: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub main_changes: Vec<String>,
    #[serde(default)]
    pub new_exports: Vec<String>,
    #[serde(default, deserialize_with = "lenient_risk")]
    pub risk_level: RiskLevel,
}

/// Parsed outcome of one model reply. Never null: absent pieces default to
/// empty.
#[derive(Debug, Clone, Serialize, Default)]
pub struct ReviewResult {
    pub summary: Option<Summary>,
    pub issues: Vec<Issue>,
}

/// Decode the model's free-form reply into a `ReviewResult`.
///
/// The model is not contractually guaranteed to emit clean JSON, so this is a
/// total function with layered recovery: strict parse, then code-fence strip,
/// then first `{...}` span, then first `[...]` span, and finally an empty
/// result. The pipeline's correctness must not depend on model formatting.
pub fn parse_review_output(raw: &str) -> ReviewResult {
    let stripped = strip_markdown_fences(raw);
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(&stripped) {
        return shape_result(value);
    }

    if let Some(span) = enclosed_span(raw, '{', '}')
        && let Ok(value) = serde_json::from_str::<serde_json::Value>(span)
    {
        return shape_result(value);
    }

    if let Some(span) = enclosed_span(raw, '[', ']')
        && let Ok(value) = serde_json::from_str::<serde_json::Value>(span)
    {
        return shape_result(value);
    }

    ReviewResult::default()
}

/// Apply the shape rules to a parsed JSON value: an object contributes
/// `.summary` (absent unless a well-formed object) and `.issues` (empty
/// unless an array); a bare array is the legacy issues-only shape.
fn shape_result(value: serde_json::Value) -> ReviewResult {
    if value.is_array() {
        return ReviewResult {
            summary: None,
            issues: issues_from(&value),
        };
    }
    let Some(object) = value.as_object() else {
        return ReviewResult::default();
    };
    let summary = object
        .get("summary")
        .filter(|v| v.is_object())
        .and_then(|v| serde_json::from_value::<Summary>(v.clone()).ok());
    let issues = object.get("issues").map(issues_from).unwrap_or_default();
    ReviewResult { summary, issues }
}

fn issues_from(value: &serde_json::Value) -> Vec<Issue> {
    let Some(items) = value.as_array() else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(|item| serde_json::from_value::<Issue>(item.clone()).ok())
        .collect()
}

/// Remove markdown code fences (` ```json ... ``` `) that models sometimes
/// wrap output in, returning the inner content.
fn strip_markdown_fences(input: &str) -> String {
    let trimmed = input.trim();

    if let Some(rest) = trimmed.strip_prefix("```") {
        // Skip the optional language tag on the opening fence line
        let after_tag = if let Some(pos) = rest.find('\n') {
            &rest[pos + 1..]
        } else {
            return String::new();
        };

        if let Some(pos) = after_tag.rfind("```") {
            return after_tag[..pos].trim().to_string();
        }
        return after_tag.trim().to_string();
    }

    trimmed.to_string()
}

/// The span from the first `open` to the last `close`, if both exist in
/// order.
fn enclosed_span(input: &str, open: char, close: char) -> Option<&str> {
    let start = input.find(open)?;
    let end = input.rfind(close)?;
    if end <= start {
        return None;
    }
    Some(&input[start..=end])
}
