use std::collections::HashMap;

use crate::config::{Depth, FocusAreas, ReviewSettings};
use crate::error::{Error, Result};
use crate::extract::ChangeRecord;

const FULL_REVIEW: &str = include_str!("prompt_templates/full-review.md");
const ADDITIONS_REVIEW: &str = include_str!("prompt_templates/additions-review.md");

/// Known template variable names for validation.
const KNOWN_VARIABLES: &[&str] = &[
    "filename",
    "original_content",
    "new_content",
    "changed_code",
    "focus_areas",
    "depth_instruction",
];

/// Per-side character limit when both file versions go into the prompt.
const FULL_SIDE_LIMIT: usize = 20_000;
/// Character limit for extracted additions when only one side is available.
const ADDITIONS_LIMIT: usize = 15_000;

const TRUNCATION_MARKER: &str = "\n... [content truncated]";

/// Build the review prompt for one changed file.
///
/// When the record carries the full new file content, the prompt shows both
/// versions and instructs the model to review only the delta; an added file
/// has an empty original side. Records without the full content (page
/// scraping) fall back to the addition-only form.
pub fn build_prompt(settings: &ReviewSettings, record: &ChangeRecord) -> Result<String> {
    let mut vars = HashMap::new();
    vars.insert("filename".to_string(), record.filename.clone());
    vars.insert(
        "focus_areas".to_string(),
        focus_phrase(&settings.focus),
    );
    vars.insert(
        "depth_instruction".to_string(),
        depth_instruction(settings.depth).to_string(),
    );

    match record.new_content {
        Some(ref new_content) => {
            let original = record.original_content.as_deref().unwrap_or("");
            vars.insert(
                "original_content".to_string(),
                truncate_chars(original, FULL_SIDE_LIMIT),
            );
            vars.insert(
                "new_content".to_string(),
                truncate_chars(new_content, FULL_SIDE_LIMIT),
            );
            render_template(FULL_REVIEW, &vars)
        }
        None => {
            vars.insert(
                "changed_code".to_string(),
                truncate_chars(&record.review_payload(), ADDITIONS_LIMIT),
            );
            render_template(ADDITIONS_REVIEW, &vars)
        }
    }
}

/// Human-readable list of the enabled focus areas.
fn focus_phrase(focus: &FocusAreas) -> String {
    let mut phrases = Vec::new();
    if focus.bugs {
        phrases.push("logic errors and bugs");
    }
    if focus.security {
        phrases.push("security vulnerabilities");
    }
    if focus.performance {
        phrases.push("performance problems");
    }
    if focus.style {
        phrases.push("code style and formatting");
    }
    if focus.naming {
        phrases.push("naming and readability");
    }
    if focus.docs {
        phrases.push("documentation and comments");
    }
    if focus.tests {
        phrases.push("test coverage");
    }
    if phrases.is_empty() {
        return "general code quality".to_string();
    }
    phrases.join(", ")
}

fn depth_instruction(depth: Depth) -> &'static str {
    match depth {
        Depth::Quick => "Be brief. Report only critical problems.",
        Depth::Standard => "Provide a balanced review covering the most important findings.",
        Depth::Thorough => "Be exhaustive. Report every issue you find, however small.",
    }
}

/// Cap `input` at `max` characters, appending a marker when cut.
fn truncate_chars(input: &str, max: usize) -> String {
    if input.chars().count() <= max {
        return input.to_string();
    }
    let mut out: String = input.chars().take(max).collect();
    out.push_str(TRUNCATION_MARKER);
    out
}

/// Render a template string by substituting `{{variable}}` placeholders.
/// Errors on unknown variables (strict mode).
pub fn render_template(template: &str, vars: &HashMap<String, String>) -> Result<String> {
    let mut result = String::with_capacity(template.len());
    let mut chars = template.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '{' && chars.peek() == Some(&'{') {
            chars.next(); // consume second {
            let mut var_name = String::new();
            let mut found_close = false;

            while let Some(c2) = chars.next() {
                if c2 == '}' && chars.peek() == Some(&'}') {
                    chars.next(); // consume second }
                    found_close = true;
                    break;
                }
                var_name.push(c2);
            }

            if !found_close {
                return Err(Error::Prompt(format!(
                    "unclosed template variable: {{{{{var_name}"
                )));
            }

            let var_name = var_name.trim();
            if !KNOWN_VARIABLES.contains(&var_name) {
                return Err(Error::Prompt(format!(
                    "unknown template variable: {var_name}"
                )));
            }

            match vars.get(var_name) {
                Some(value) => result.push_str(value),
                None => {
                    return Err(Error::Prompt(format!(
                        "missing value for template variable: {var_name}"
                    )));
                }
            }
        } else {
            result.push(c);
        }
    }

    Ok(result)
}
