//! Placeholder substitution on document XML.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

use crate::error::Result;

/// Variable name to substitution text.
pub type PlaceholderMap = HashMap<String, String>;

static PLACEHOLDER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\{\{\s*([A-Za-z_][A-Za-z0-9_.\-]*)\s*\}\}").expect("placeholder regex")
});

static ENTITY_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^&(?:[A-Za-z_][A-Za-z0-9_.\-]*|#[0-9]+|#x[0-9A-Fa-f]+);").expect("entity regex")
});

/// Substitutes variables into a text blob.
pub trait TemplateRenderer {
    fn render(&self, source: &str, data: &PlaceholderMap) -> Result<String>;
}

/// Replaces `{{ name }}` placeholders.
#[derive(Clone, Debug)]
pub struct PlaceholderRenderer {
    /// XML-escape substituted values.
    pub escape_values: bool,
    /// Leave placeholders with no value untouched instead of blanking them.
    pub keep_unknown: bool,
}

impl Default for PlaceholderRenderer {
    fn default() -> Self {
        Self {
            escape_values: true,
            keep_unknown: false,
        }
    }
}

impl TemplateRenderer for PlaceholderRenderer {
    fn render(&self, source: &str, data: &PlaceholderMap) -> Result<String> {
        let mut missing: Vec<String> = Vec::new();
        let out = PLACEHOLDER_RE.replace_all(source, |caps: &Captures<'_>| {
            let name = caps.get(1).map_or("", |m| m.as_str());
            match data.get(name) {
                Some(value) if self.escape_values => escape_text(value),
                Some(value) => value.clone(),
                None => {
                    if !missing.iter().any(|m| m == name) {
                        missing.push(name.to_string());
                    }
                    if self.keep_unknown {
                        caps[0].to_string()
                    } else {
                        String::new()
                    }
                }
            }
        });
        if !missing.is_empty() {
            log::debug!("no value for placeholders: {}", missing.join(", "));
        }
        Ok(out.into_owned())
    }
}

/// Distinct placeholder names in order of first appearance.
pub fn placeholders(source: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for caps in PLACEHOLDER_RE.captures_iter(source) {
        let name = &caps[1];
        if !out.iter().any(|n| n == name) {
            out.push(name.to_string());
        }
    }
    out
}

/// Rewrites `&` that does not start an entity or character reference as
/// `&amp;`. Well-formed XML comes back unchanged.
pub fn escape_bare_ampersands(xml: &str) -> String {
    if !xml.contains('&') {
        return xml.to_string();
    }
    let mut out = String::with_capacity(xml.len() + 16);
    let mut rest = xml;
    while let Some(pos) = rest.find('&') {
        out.push_str(&rest[..pos]);
        let tail = &rest[pos..];
        if ENTITY_RE.is_match(tail) {
            out.push('&');
        } else {
            out.push_str("&amp;");
        }
        rest = &tail[1..];
    }
    out.push_str(rest);
    out
}

/// Escapes character data for element content.
pub fn escape_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(ch),
        }
    }
    out
}
