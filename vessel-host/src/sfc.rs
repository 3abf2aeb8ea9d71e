//! Single-file component parsing
//!
//! A component file is a sequence of top-level blocks:
//!
//! ```text
//! <template> ... </template>
//! <script lang="ts"> ... </script>
//! <style scoped> ... </style>
//! ```
//!
//! Parsing never fails outright. Structural problems are collected in
//! [`SfcDescriptor::errors`] in the order they were found; whatever could be
//! recovered before the first fatal problem is still returned.

use crate::markup::{line_at, scan_start_tag};
use std::collections::BTreeMap;
use thiserror::Error;

/// One top-level block of a component file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SfcBlock {
    pub tag: String,
    pub content: String,
    pub attrs: BTreeMap<String, Option<String>>,
    /// Line of the block's start tag
    pub line: usize,
}

impl SfcBlock {
    /// Value of an attribute; `Some("")` for a bare attribute
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .get(name)
            .map(|value| value.as_deref().unwrap_or(""))
    }

    pub fn lang(&self) -> Option<&str> {
        self.attr("lang").filter(|lang| !lang.is_empty())
    }
}

/// Structural problem in a component file
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SfcError {
    #[error("Single file component can contain only one <{tag}> element (line {line})")]
    DuplicateBlock { tag: String, line: usize },

    #[error("Element <{tag}> opened on line {line} is missing its end tag")]
    MissingEndTag { tag: String, line: usize },

    #[error("Start tag on line {line} is never terminated")]
    UnterminatedStartTag { line: usize },
}

/// Result of splitting a component file into blocks
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SfcDescriptor {
    pub template: Option<SfcBlock>,
    pub script: Option<SfcBlock>,
    pub styles: Vec<SfcBlock>,
    pub custom_blocks: Vec<SfcBlock>,
    pub errors: Vec<SfcError>,
}

impl SfcDescriptor {
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}

/// Split `source` into its top-level blocks
pub fn parse_component(source: &str) -> SfcDescriptor {
    let lower = source.to_ascii_lowercase();
    let bytes = source.as_bytes();
    let mut descriptor = SfcDescriptor::default();
    let mut pos = 0;

    while let Some(offset) = source[pos..].find('<') {
        let lt = pos + offset;

        if source[lt..].starts_with("<!--") {
            match source[lt..].find("-->") {
                Some(end) => {
                    pos = lt + end + 3;
                    continue;
                }
                None => break,
            }
        }

        if !bytes.get(lt + 1).is_some_and(u8::is_ascii_alphabetic) {
            // stray end tags and text at the top level are ignored
            pos = lt + 1;
            continue;
        }

        let line = line_at(source, lt);
        let Some(start) = scan_start_tag(source, lt) else {
            descriptor.errors.push(SfcError::UnterminatedStartTag { line });
            break;
        };
        let tag = start.name.to_ascii_lowercase();
        let attrs: BTreeMap<_, _> = start.attrs.into_iter().collect();

        let (content, next) = if start.self_closing {
            (String::new(), start.end)
        } else {
            match find_end_tag(&lower, start.end, &tag, tag == "template") {
                Some((close_start, close_end)) => {
                    (source[start.end..close_start].to_string(), close_end)
                }
                None => {
                    descriptor.errors.push(SfcError::MissingEndTag { tag, line });
                    break;
                }
            }
        };

        let block = SfcBlock {
            tag: tag.clone(),
            content,
            attrs,
            line,
        };
        match tag.as_str() {
            "template" | "script" => {
                let slot = if tag == "template" {
                    &mut descriptor.template
                } else {
                    &mut descriptor.script
                };
                if slot.is_some() {
                    descriptor.errors.push(SfcError::DuplicateBlock { tag, line });
                } else {
                    *slot = Some(block);
                }
            }
            "style" => descriptor.styles.push(block),
            _ => descriptor.custom_blocks.push(block),
        }
        pos = next;
    }

    descriptor
}

/// Locate `</tag>` matching a block opened before `from`
///
/// With `nested`, inner `<tag>` elements must be closed first. Returns the
/// offsets of the end tag's `<` and just past its `>`.
fn find_end_tag(lower: &str, from: usize, tag: &str, nested: bool) -> Option<(usize, usize)> {
    let open = format!("<{tag}");
    let close = format!("</{tag}");
    let mut depth = 1usize;
    let mut pos = from;
    loop {
        let next_close = find_tag(lower, pos, &close)?;
        if nested {
            if let Some(next_open) = find_tag(lower, pos, &open) {
                if next_open < next_close {
                    depth += 1;
                    pos = next_open + open.len();
                    continue;
                }
            }
        }
        let gt = next_close + lower[next_close..].find('>')?;
        depth -= 1;
        if depth == 0 {
            return Some((next_close, gt + 1));
        }
        pos = gt + 1;
    }
}

fn find_tag(haystack: &str, from: usize, pattern: &str) -> Option<usize> {
    let mut pos = from;
    while let Some(offset) = haystack[pos..].find(pattern) {
        let at = pos + offset;
        let boundary = haystack.as_bytes().get(at + pattern.len());
        if boundary.map_or(true, |b| b.is_ascii_whitespace() || *b == b'>' || *b == b'/') {
            return Some(at);
        }
        pos = at + 1;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_template_script_and_style() {
        let source = r#"<template>
  <div>{{ message }}</div>
</template>

<script lang="ts">
export default { data() { return { message: 'hi' } } }
</script>

<style scoped>
div { color: red; }
</style>
"#;
        let descriptor = parse_component(source);
        assert!(!descriptor.has_errors());

        let template = descriptor.template.unwrap();
        assert_eq!(template.content.trim(), "<div>{{ message }}</div>");
        assert_eq!(template.line, 1);

        let script = descriptor.script.unwrap();
        assert_eq!(script.lang(), Some("ts"));
        assert_eq!(script.line, 5);
        assert!(script.content.contains("export default"));

        assert_eq!(descriptor.styles.len(), 1);
        assert_eq!(descriptor.styles[0].attr("scoped"), Some(""));
    }

    #[test]
    fn test_nested_template_elements() {
        let source = "<template><div><template v-if=\"x\"><b>x</b></template></div></template>";
        let descriptor = parse_component(source);
        assert!(!descriptor.has_errors());
        assert_eq!(
            descriptor.template.unwrap().content,
            "<div><template v-if=\"x\"><b>x</b></template></div>"
        );
    }

    #[test]
    fn test_script_content_is_not_scanned_for_tags() {
        let source = "<script>const s = '<div>'; if (a < b) {}</script>";
        let descriptor = parse_component(source);
        assert!(!descriptor.has_errors());
        assert_eq!(
            descriptor.script.unwrap().content,
            "const s = '<div>'; if (a < b) {}"
        );
    }

    #[test]
    fn test_duplicate_blocks_reported_in_order() {
        let source = "<template><a/></template>\n<template><b/></template>\n<script></script>\n<script></script>";
        let descriptor = parse_component(source);
        assert_eq!(
            descriptor.errors,
            vec![
                SfcError::DuplicateBlock {
                    tag: "template".into(),
                    line: 2
                },
                SfcError::DuplicateBlock {
                    tag: "script".into(),
                    line: 4
                },
            ]
        );
        assert_eq!(descriptor.template.unwrap().content, "<a/>");
    }

    #[test]
    fn test_missing_end_tag() {
        let descriptor = parse_component("<template><div></div>\n<script>let a = 1;");
        assert_eq!(
            descriptor.errors,
            vec![SfcError::MissingEndTag {
                tag: "template".into(),
                line: 1
            }]
        );
    }

    #[test]
    fn test_unterminated_start_tag() {
        let descriptor = parse_component("<template><p/></template>\n<script lang=\"ts\"");
        assert_eq!(
            descriptor.errors,
            vec![SfcError::UnterminatedStartTag { line: 2 }]
        );
        assert!(descriptor.template.is_some());
    }

    #[test]
    fn test_comments_and_custom_blocks() {
        let source = "<!-- <script>nope</script> -->\n<i18n>{ \"en\": {} }</i18n>";
        let descriptor = parse_component(source);
        assert!(descriptor.script.is_none());
        assert_eq!(descriptor.custom_blocks.len(), 1);
        assert_eq!(descriptor.custom_blocks[0].tag, "i18n");
    }

    #[test]
    fn test_empty_file() {
        assert_eq!(parse_component(""), SfcDescriptor::default());
    }
}
