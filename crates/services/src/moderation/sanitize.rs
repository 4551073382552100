//! Tag name cleanup.

use once_cell::sync::Lazy;
use regex::Regex;

use domains::{DomainError, Result};

static SCRIPT_BLOCKS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)<(script|style)\b[^>]*>.*?</(script|style)\s*>")
        .expect("Invalid script regex")
});

static MARKUP: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<[^>]*>").expect("Invalid markup regex"));

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("Invalid whitespace regex"));

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TagLimits {
    pub min_length: usize,
    pub max_length: usize,
}

impl Default for TagLimits {
    fn default() -> Self {
        Self { min_length: 3, max_length: 128 }
    }
}

/// Strips markup from a submitted tag name and checks its length in
/// characters.
pub fn sanitize_tag_name(raw: &str, limits: &TagLimits) -> Result<String> {
    let without_scripts = SCRIPT_BLOCKS.replace_all(raw, "");
    let text = MARKUP.replace_all(&without_scripts, "");
    let name = WHITESPACE.replace_all(text.trim(), " ").into_owned();

    let length = name.chars().count();
    if length == 0 {
        return Err(DomainError::Validation("tag name is required".into()));
    }
    if length < limits.min_length {
        return Err(DomainError::Validation(format!(
            "tag name must be at least {} characters",
            limits.min_length
        )));
    }
    if length > limits.max_length {
        return Err(DomainError::Validation(format!(
            "tag name must be at most {} characters",
            limits.max_length
        )));
    }
    Ok(name)
}
