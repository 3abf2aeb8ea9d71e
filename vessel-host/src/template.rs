//! Template compilation
//!
//! A component's markup is compiled into a [`RenderUnit`]: a validated
//! element tree with a single root. Hosts render from the unit; the runtime
//! only guarantees it is well formed.

use crate::markup::{is_tag_open, line_at, read_name, scan_start_tag};
use std::collections::BTreeSet;
use thiserror::Error;

/// Markup used when a component file has no template block
pub const PLACEHOLDER_TEMPLATE: &str = r#"<p color="red">NO TEMPLATE DEFINED</p>"#;

const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param", "source",
    "track", "wbr",
];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TemplateError {
    #[error("Template is empty")]
    Empty,

    #[error("Template must contain exactly one root element, found {0}")]
    MultipleRoots(usize),

    #[error("Text \"{0}\" outside the root element")]
    TextOutsideRoot(String),

    #[error("Element <{tag}> opened on line {line} is never closed")]
    UnclosedElement { tag: String, line: usize },

    #[error("Unexpected closing tag </{tag}> on line {line}")]
    UnexpectedClosingTag { tag: String, line: usize },

    #[error("Unterminated tag on line {line}")]
    UnterminatedTag { line: usize },

    #[error("Unterminated comment on line {line}")]
    UnterminatedComment { line: usize },

    #[error("Unterminated interpolation on line {line}")]
    UnterminatedInterpolation { line: usize },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub name: String,
    pub value: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TextSegment {
    Literal(String),
    Interpolation(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Element(Element),
    Text(Vec<TextSegment>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    pub tag: String,
    pub attrs: Vec<Attribute>,
    pub children: Vec<Node>,
    pub self_closing: bool,
}

impl Element {
    fn write_markup(&self, out: &mut String) {
        out.push('<');
        out.push_str(&self.tag);
        for attr in &self.attrs {
            out.push(' ');
            out.push_str(&attr.name);
            if let Some(value) = &attr.value {
                out.push_str("=\"");
                out.push_str(&value.replace('"', "&quot;"));
                out.push('"');
            }
        }
        if is_void(&self.tag) {
            out.push('>');
            return;
        }
        if self.self_closing && self.children.is_empty() {
            out.push_str(" />");
            return;
        }
        out.push('>');
        for child in &self.children {
            match child {
                Node::Element(element) => element.write_markup(out),
                Node::Text(segments) => {
                    for segment in segments {
                        match segment {
                            TextSegment::Literal(text) => out.push_str(text),
                            TextSegment::Interpolation(expr) => {
                                out.push_str("{{ ");
                                out.push_str(expr);
                                out.push_str(" }}");
                            }
                        }
                    }
                }
            }
        }
        out.push_str("</");
        out.push_str(&self.tag);
        out.push('>');
    }

    fn walk<'a>(&'a self, visit: &mut dyn FnMut(&'a Element)) {
        visit(self);
        for child in &self.children {
            if let Node::Element(element) = child {
                element.walk(visit);
            }
        }
    }
}

/// A compiled, renderable template
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderUnit {
    root: Element,
}

impl RenderUnit {
    pub fn root(&self) -> &Element {
        &self.root
    }

    /// Normalized markup of the whole tree
    pub fn to_markup(&self) -> String {
        let mut out = String::new();
        self.root.write_markup(&mut out);
        out
    }

    /// Interpolated expressions in document order
    pub fn interpolations(&self) -> Vec<&str> {
        let mut found = Vec::new();
        self.root.walk(&mut |element| {
            for child in &element.children {
                if let Node::Text(segments) = child {
                    for segment in segments {
                        if let TextSegment::Interpolation(expr) = segment {
                            found.push(expr.as_str());
                        }
                    }
                }
            }
        });
        found
    }

    /// Every element tag used in the tree
    pub fn tags(&self) -> BTreeSet<&str> {
        let mut tags = BTreeSet::new();
        self.root.walk(&mut |element| {
            tags.insert(element.tag.as_str());
        });
        tags
    }
}

/// Compiles component markup into a [`RenderUnit`]
pub trait TemplateCompiler {
    fn compile(&self, markup: &str) -> Result<RenderUnit, TemplateError>;
}

/// Default compiler: validates structure and builds the element tree
#[derive(Debug, Clone, Copy, Default)]
pub struct MarkupCompiler;

impl TemplateCompiler for MarkupCompiler {
    fn compile(&self, markup: &str) -> Result<RenderUnit, TemplateError> {
        parse_template(markup).map(|root| RenderUnit { root })
    }
}

fn is_void(tag: &str) -> bool {
    VOID_ELEMENTS.contains(&tag.to_ascii_lowercase().as_str())
}

struct TreeBuilder {
    /// Open elements with the offset of their start tag
    stack: Vec<(Element, usize)>,
    roots: Vec<Node>,
}

impl TreeBuilder {
    fn attach(&mut self, node: Node) {
        match self.stack.last_mut() {
            Some((parent, _)) => parent.children.push(node),
            None => self.roots.push(node),
        }
    }
}

fn parse_template(markup: &str) -> Result<Element, TemplateError> {
    let bytes = markup.as_bytes();
    let mut tree = TreeBuilder {
        stack: Vec::new(),
        roots: Vec::new(),
    };
    let mut pos = 0;

    while pos < bytes.len() {
        let at = pos;
        let line = || line_at(markup, at);

        if markup[pos..].starts_with("<!--") {
            let end = markup[pos..]
                .find("-->")
                .ok_or_else(|| TemplateError::UnterminatedComment { line: line() })?;
            pos += end + 3;
            continue;
        }

        // Declarations such as <!DOCTYPE html> carry nothing to render
        if markup[pos..].starts_with("<!") {
            let end = markup[pos..]
                .find('>')
                .ok_or_else(|| TemplateError::UnterminatedTag { line: line() })?;
            pos += end + 1;
            continue;
        }

        if markup[pos..].starts_with("</") {
            let (name, after) = read_name(markup, pos + 2);
            let gt = markup[after..]
                .find('>')
                .ok_or_else(|| TemplateError::UnterminatedTag { line: line() })?;
            match tree.stack.pop() {
                Some((element, _)) if element.tag.eq_ignore_ascii_case(name) => {
                    tree.attach(Node::Element(element));
                }
                _ => {
                    return Err(TemplateError::UnexpectedClosingTag {
                        tag: name.to_string(),
                        line: line(),
                    })
                }
            }
            pos = after + gt + 1;
            continue;
        }

        if is_tag_open(bytes, pos) {
            let start = scan_start_tag(markup, pos)
                .ok_or_else(|| TemplateError::UnterminatedTag { line: line() })?;
            let element = Element {
                tag: start.name,
                attrs: start
                    .attrs
                    .into_iter()
                    .map(|(name, value)| Attribute { name, value })
                    .collect(),
                children: Vec::new(),
                self_closing: start.self_closing,
            };
            if element.self_closing || is_void(&element.tag) {
                tree.attach(Node::Element(element));
            } else {
                tree.stack.push((element, pos));
            }
            pos = start.end;
            continue;
        }

        let end = text_end(markup, pos)?;
        let text = &markup[pos..end];
        let collapsible = text.trim().is_empty() && text.contains('\n');
        if !collapsible {
            tree.attach(Node::Text(split_interpolations(text)));
        }
        pos = end;
    }

    if let Some((element, offset)) = tree.stack.pop() {
        return Err(TemplateError::UnclosedElement {
            tag: element.tag,
            line: line_at(markup, offset),
        });
    }

    let mut elements = Vec::new();
    for node in tree.roots {
        match node {
            Node::Element(element) => elements.push(element),
            Node::Text(segments) => {
                let text = segments_text(&segments);
                if !text.trim().is_empty() {
                    return Err(TemplateError::TextOutsideRoot(text.trim().to_string()));
                }
            }
        }
    }
    match elements.len() {
        0 => Err(TemplateError::Empty),
        1 => Ok(elements.remove(0)),
        n => Err(TemplateError::MultipleRoots(n)),
    }
}

fn starts_markup(bytes: &[u8], pos: usize) -> bool {
    bytes[pos] == b'<'
        && bytes
            .get(pos + 1)
            .is_some_and(|b| b.is_ascii_alphabetic() || *b == b'/' || *b == b'!')
}

/// End of a text run starting at `start`; interpolations may contain `<`
///
/// The run always covers at least one character, so callers make progress.
fn text_end(markup: &str, start: usize) -> Result<usize, TemplateError> {
    let bytes = markup.as_bytes();
    let mut pos = start;
    while pos < bytes.len() {
        if markup[pos..].starts_with("{{") {
            let close = markup[pos + 2..]
                .find("}}")
                .ok_or_else(|| TemplateError::UnterminatedInterpolation {
                    line: line_at(markup, pos),
                })?;
            pos += close + 4;
            continue;
        }
        if pos > start && starts_markup(bytes, pos) {
            break;
        }
        pos += markup[pos..].chars().next().map_or(1, char::len_utf8);
    }
    Ok(pos)
}

fn split_interpolations(text: &str) -> Vec<TextSegment> {
    let mut segments = Vec::new();
    let mut rest = text;
    while let Some(open) = rest.find("{{") {
        if open > 0 {
            segments.push(TextSegment::Literal(rest[..open].to_string()));
        }
        let after = &rest[open + 2..];
        // text_end already guaranteed the closing braces
        let close = after.find("}}").unwrap_or(after.len());
        segments.push(TextSegment::Interpolation(after[..close].trim().to_string()));
        rest = after.get(close + 2..).unwrap_or("");
    }
    if !rest.is_empty() {
        segments.push(TextSegment::Literal(rest.to_string()));
    }
    segments
}

fn segments_text(segments: &[TextSegment]) -> String {
    segments
        .iter()
        .map(|segment| match segment {
            TextSegment::Literal(text) => text.clone(),
            TextSegment::Interpolation(expr) => format!("{{{{ {expr} }}}}"),
        })
        .collect()
}
