//! Raw-text clean-up of WordprocessingML produced by Word.
//!
//! Word tags runs with revision-save ids, sprinkles proofing markers between
//! them and splits what the author typed as one word into several runs with
//! identical formatting. A placeholder such as `{{name}}` can therefore end up
//! spread over two `<w:t>` nodes, where a literal text substitution never sees
//! it. The passes below undo that without parsing the document: everything
//! outside the removed spans is kept byte for byte.

use std::fmt;

use serde::Deserialize;

pub const DEFAULT_STRIP_TAGS: &[&str] = &[
    "w:proofErr",
    "w:noProof",
    "w:lang",
    "w:lastRenderedPageBreak",
];

pub const DEFAULT_REVISION_ATTRIBUTES: &[&str] = &[
    "w:rsidR",
    "w:rsidRPr",
    "w:rsidRDefault",
    "w:rsidP",
    "w:rsidDel",
    "w:rsidSect",
    "w:rsidTr",
];

const EMPTY_PROPERTIES: &[&str] = &["<w:rPr></w:rPr>", "<w:pPr></w:pPr>", "<w:rPr/>", "<w:pPr/>"];

const RUN_OPEN: &str = "<w:r";
const RUN_CLOSE: &str = "</w:r";
const TEXT_OPEN: &str = "<w:t";
const TEXT_CLOSE: &str = "</w:t";

/// A span the sanitizer left alone because its markup did not have the
/// expected shape. Offsets are byte positions in the pass input.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SanitizeWarning {
    UnclosedTag { tag: String, offset: usize },
    NonEmptyTag { tag: String, offset: usize },
    UnclosedRun { offset: usize },
    UnclosedText { offset: usize },
}

impl fmt::Display for SanitizeWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnclosedTag { tag, offset } => {
                write!(f, "tag {tag} at byte {offset} has no closing '>'")
            }
            Self::NonEmptyTag { tag, offset } => {
                write!(f, "tag {tag} at byte {offset} has content; left in place")
            }
            Self::UnclosedRun { offset } => write!(f, "run at byte {offset} is never closed"),
            Self::UnclosedText { offset } => {
                write!(f, "text node at byte {offset} is never closed")
            }
        }
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
pub struct SanitizeRules {
    /// Element names removed wherever found (`w:proofErr`, ...).
    #[serde(default = "default_strip_tags")]
    pub strip_tags: Vec<String>,

    /// Attribute names removed from every element (`w:rsidR`, ...).
    #[serde(default = "default_revision_attributes")]
    pub revision_attributes: Vec<String>,

    #[serde(default = "default_true")]
    pub merge_runs: bool,
}

impl Default for SanitizeRules {
    fn default() -> Self {
        Self {
            strip_tags: default_strip_tags(),
            revision_attributes: default_revision_attributes(),
            merge_runs: true,
        }
    }
}

fn default_strip_tags() -> Vec<String> {
    DEFAULT_STRIP_TAGS.iter().map(|s| s.to_string()).collect()
}

fn default_revision_attributes() -> Vec<String> {
    DEFAULT_REVISION_ATTRIBUTES.iter().map(|s| s.to_string()).collect()
}

fn default_true() -> bool {
    true
}

/// Result of a single pass.
#[derive(Clone, Debug, Default)]
pub struct PassOutput {
    pub xml: String,
    /// Tags, attributes or runs removed by the pass.
    pub count: usize,
    /// Empty property elements dropped afterwards.
    pub collapsed: usize,
    pub warnings: Vec<SanitizeWarning>,
}

#[derive(Clone, Debug, Default)]
pub struct SanitizeReport {
    pub xml: String,
    pub removed_tags: usize,
    pub removed_attributes: usize,
    pub collapsed_properties: usize,
    pub merged_runs: usize,
    pub warnings: Vec<SanitizeWarning>,
}

impl SanitizeReport {
    pub fn changed(&self) -> bool {
        self.removed_tags + self.removed_attributes + self.collapsed_properties + self.merged_runs
            > 0
    }
}

/// Runs every pass: transient tags, revision attributes, empty properties,
/// then run merging.
pub fn sanitize(xml: &str, rules: &SanitizeRules) -> SanitizeReport {
    let tags = strip_tags(xml, &rules.strip_tags);
    let attrs = strip_revision_attributes(&tags.xml, &rules.revision_attributes);

    let mut warnings = tags.warnings;
    warnings.extend(attrs.warnings);
    let mut collapsed_properties = attrs.collapsed;
    let mut out = attrs.xml;

    // Dropping a marker such as <w:noProof/> can empty a <w:rPr> too.
    if tags.count > 0 && attrs.count == 0 {
        let c = collapse_empty_properties(&out);
        collapsed_properties += c.collapsed;
        out = c.xml;
    }

    let mut merged_runs = 0;
    if rules.merge_runs {
        let merged = merge_duplicated_runs(&out);
        merged_runs = merged.count;
        warnings.extend(merged.warnings);
        out = merged.xml;
    }

    SanitizeReport {
        xml: out,
        removed_tags: tags.count,
        removed_attributes: attrs.count,
        collapsed_properties,
        merged_runs,
        warnings,
    }
}

/// Finds the next `tag` at or after `from` that is followed by whitespace,
/// `/` or `>`, so `<w:t` never matches `<w:tab` or `<w:tbl`.
pub fn find_tag(xml: &str, tag: &str, from: usize) -> Option<usize> {
    let mut p = from;
    loop {
        let found = p + xml.get(p..)?.find(tag)?;
        match xml.as_bytes().get(found + tag.len()) {
            Some(b) if *b == b'/' || *b == b'>' || b.is_ascii_whitespace() => return Some(found),
            _ => p = found + tag.len(),
        }
    }
}

fn find_from(xml: &str, pat: &str, from: usize) -> Option<usize> {
    xml.get(from..)?.find(pat).map(|i| from + i)
}

/// Offset of the closing quote of a value opened at `at` with `"` or `'`.
fn quoted_value_end(xml: &str, at: usize) -> Option<usize> {
    let quote = match xml.as_bytes().get(at)? {
        b'"' => "\"",
        b'\'' => "'",
        _ => return None,
    };
    find_from(xml, quote, at + 1)
}

fn start_token(tag: &str) -> String {
    if tag.starts_with('<') {
        tag.to_string()
    } else {
        format!("<{tag}")
    }
}

/// Removes every element whose start token matches one of `tags`.
///
/// Self-closing elements and elements closed right after their start tag are
/// removed whole. An element with content is left in place and reported.
pub fn strip_tags<S: AsRef<str>>(xml: &str, tags: &[S]) -> PassOutput {
    let mut content = xml.to_string();
    let mut count = 0usize;
    let mut warnings = Vec::new();

    for tag in tags {
        let token = start_token(tag.as_ref());
        let close = format!("</{}>", &token[1..]);
        let mut p = 0usize;
        while let Some(start) = find_tag(&content, &token, p) {
            let Some(end) = find_from(&content, ">", start) else {
                warnings.push(SanitizeWarning::UnclosedTag {
                    tag: token.clone(),
                    offset: start,
                });
                break;
            };
            let self_closing = content[..end].ends_with('/');
            if self_closing {
                content.replace_range(start..=end, "");
            } else if content[end + 1..].starts_with(&close) {
                content.replace_range(start..end + 1 + close.len(), "");
            } else {
                warnings.push(SanitizeWarning::NonEmptyTag {
                    tag: token.clone(),
                    offset: start,
                });
                p = end + 1;
                continue;
            }
            count += 1;
            p = start;
        }
    }

    PassOutput {
        xml: content,
        count,
        collapsed: 0,
        warnings,
    }
}

/// Removes the listed attributes from every element.
///
/// An attribute is `name="value"` or `name='value'` preceded by whitespace and
/// sitting inside a tag; the same text inside character data is kept. A tag
/// made of nothing but a revision attribute (`<w:rsidR="00AB">`) is dropped
/// whole. When anything was removed, property elements left empty are
/// collapsed.
pub fn strip_revision_attributes<S: AsRef<str>>(xml: &str, names: &[S]) -> PassOutput {
    let mut content = xml.to_string();
    let mut count = 0usize;

    for name in names {
        let name = name.as_ref();
        let token = format!("{name}=");

        let mut p = 0usize;
        while let Some(found) = find_from(&content, &token, p) {
            p = found + token.len();
            let bytes = content.as_bytes();
            let preceded_by_space = found > 0 && bytes[found - 1].is_ascii_whitespace();
            if !preceded_by_space {
                continue;
            }
            let Some(value_end) = quoted_value_end(&content, found + token.len()) else {
                continue;
            };
            let gt = find_from(&content, ">", found);
            let lt = find_from(&content, "<", found);
            let in_tag = gt.is_some_and(|g| lt.map_or(true, |l| g < l) && value_end < g);
            if !in_tag {
                continue;
            }
            let mut start = found;
            while start > 0 && content.as_bytes()[start - 1].is_ascii_whitespace() {
                start -= 1;
            }
            content.replace_range(start..=value_end, "");
            count += 1;
            p = start;
        }

        let fused = format!("<{name}=");
        let mut p = 0usize;
        while let Some(found) = find_from(&content, &fused, p) {
            let value_start = found + fused.len();
            let Some(q) = quoted_value_end(&content, value_start) else {
                p = value_start;
                continue;
            };
            let rest = &content[q + 1..];
            let trimmed = rest.trim_start();
            let close_len = if trimmed.starts_with("/>") {
                2
            } else if trimmed.starts_with('>') {
                1
            } else {
                p = value_start;
                continue;
            };
            let end = q + 1 + (rest.len() - trimmed.len()) + close_len;
            content.replace_range(found..end, "");
            count += 1;
            p = found;
        }
    }

    let mut out = PassOutput {
        xml: content,
        count,
        collapsed: 0,
        warnings: Vec::new(),
    };
    if count > 0 {
        let c = collapse_empty_properties(&out.xml);
        out.collapsed = c.collapsed;
        out.xml = c.xml;
    }
    out
}

/// Drops run/paragraph property elements that carry nothing.
pub fn collapse_empty_properties(xml: &str) -> PassOutput {
    let mut content = xml.to_string();
    let mut collapsed = 0usize;
    for empty in EMPTY_PROPERTIES {
        let n = content.matches(empty).count();
        if n > 0 {
            content = content.replace(empty, "");
            collapsed += n;
        }
    }
    PassOutput {
        xml: content,
        count: 0,
        collapsed,
        warnings: Vec::new(),
    }
}

/// Joins consecutive runs whose opening markup is byte-identical.
///
/// For each `<w:r`, the span from the run start through its first `<w:t` is
/// how the run opens. While the text node's `</w:t>` is followed by
/// `</w:r>` and that same opening, the closing/opening pair is cut out so both
/// texts end up in one node. `count` is the number of joins.
///
/// A run whose text node is left open is not joined, so a second pass over
/// the output changes nothing even for broken markup.
pub fn merge_duplicated_runs(xml: &str) -> PassOutput {
    let mut content = xml.to_string();
    let mut count = 0usize;
    let mut warnings = Vec::new();

    let mut run_pos = 0usize;
    while let Some(run_open) = find_tag(&content, RUN_OPEN, run_pos) {
        run_pos = run_open + RUN_OPEN.len();
        if content[run_pos..].starts_with("/>") {
            continue;
        }
        let Some(text_open) = find_tag(&content, TEXT_OPEN, run_open) else {
            // No text node anywhere after this point.
            break;
        };

        let opening = &content[run_open..text_open + TEXT_OPEN.len()];
        let joint = format!("{TEXT_CLOSE}>{RUN_CLOSE}>{opening}");

        loop {
            let Some(run_close) = find_tag(&content, RUN_CLOSE, run_open) else {
                warnings.push(SanitizeWarning::UnclosedRun { offset: run_open });
                break;
            };
            if text_open > run_close {
                // The text node belongs to a later run.
                break;
            }
            let Some(text_close) = find_tag(&content, TEXT_CLOSE, text_open) else {
                warnings.push(SanitizeWarning::UnclosedText { offset: text_open });
                break;
            };
            if text_close > run_close {
                break;
            }
            if find_tag(&content, RUN_OPEN, text_open).is_some_and(|r| r < text_close) {
                // A run starts inside this text node.
                warnings.push(SanitizeWarning::UnclosedText { offset: text_open });
                break;
            }

            let after = text_close + joint.len();
            let delimited = matches!(content.as_bytes().get(after), Some(b' ' | b'>'));
            if !delimited || !content[text_close..].starts_with(&joint) {
                break;
            }
            let Some(end) = find_from(&content, ">", after) else {
                warnings.push(SanitizeWarning::UnclosedTag {
                    tag: TEXT_OPEN.to_string(),
                    offset: after,
                });
                break;
            };
            content.replace_range(text_close..=end, "");
            count += 1;
        }
    }

    PassOutput {
        xml: content,
        count,
        collapsed: 0,
        warnings,
    }
}
