//! TypeScript type stripping
//!
//! Extension scripts written in TypeScript are turned into plain JavaScript by
//! deleting type syntax at the token level. Nothing is type checked. Line
//! structure is preserved so engine stack traces still point at the right
//! line of the original file.
//!
//! Handled syntax:
//!
//! - annotations on parameters, declarations, class fields and return types
//! - optional (`?`) and definite (`!`) markers, non-null assertions
//! - `this` parameter annotations
//! - `interface`, `type`, `declare` and `import type` / `export type`
//! - generic parameter and argument lists, `as` / `satisfies` casts
//! - `implements` clauses, accessibility and `readonly` modifiers,
//!   abstract members, overload signatures, index signatures
//! - constructor parameter properties and `enum` declarations, which are
//!   lowered to plain assignments
//!
//! Namespaces and angle-bracket casts (`<T>value`) are not supported.

use thiserror::Error;

/// Errors raised while stripping types
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TranspileError {
    #[error("Unterminated string literal on line {line}")]
    UnterminatedString { line: usize },

    #[error("Unterminated template literal on line {line}")]
    UnterminatedTemplate { line: usize },

    #[error("Unterminated comment on line {line}")]
    UnterminatedComment { line: usize },

    #[error("Unterminated regular expression on line {line}")]
    UnterminatedRegex { line: usize },

    #[error("Unbalanced '{token}' on line {line}")]
    Unbalanced { token: String, line: usize },

    #[error("Malformed enum declaration on line {line}")]
    MalformedEnum { line: usize },
}

/// Strip TypeScript type syntax from `source`, producing JavaScript
pub fn strip_types(source: &str) -> Result<String, TranspileError> {
    let tokens = Lexer::new(source).run()?;
    let mut stripper = Stripper::new(source, tokens)?;
    stripper.run()?;
    Ok(stripper.finish())
}

fn line_of(source: &str, offset: usize) -> usize {
    source[..offset.min(source.len())].matches('\n').count() + 1
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Ident,
    Number,
    Str,
    Template,
    Regex,
    Punct,
}

#[derive(Debug, Clone, Copy)]
struct Token {
    kind: Kind,
    start: usize,
    end: usize,
}

const PUNCTUATORS: &[&str] = &[
    "...", "===", "!==", "**=", "<<=", "&&=", "||=", "??=", "=>", "==", "!=", "<=", "&&", "||",
    "??", "?.", "++", "--", "+=", "-=", "*=", "/=", "%=", "&=", "|=", "^=", "**", "<<",
];

const REGEX_KEYWORDS: &[&str] = &[
    "return", "typeof", "instanceof", "in", "of", "new", "delete", "void", "throw", "case", "do",
    "else", "yield", "await",
];

const CONTROL_KEYWORDS: &[&str] = &[
    "if", "for", "while", "switch", "with", "return", "typeof", "instanceof", "in", "of", "new",
    "delete", "void", "throw", "case", "do", "else", "yield", "await", "super", "import",
];

const EXPRESSION_KEYWORDS: &[&str] = &[
    "return", "typeof", "instanceof", "in", "of", "new", "delete", "void", "throw", "case", "do",
    "else", "yield", "await", "export", "import", "default", "extends", "let", "const", "var",
];

const MODIFIERS: &[&str] = &[
    "public",
    "private",
    "protected",
    "readonly",
    "override",
    "declare",
    "abstract",
];

/// Operators that may follow a non-null assertion (`x! + y`)
const BINARY_OPERATORS: &[&str] = &[
    "+", "-", "*", "/", "%", "**", "<", ">", "<=", ">=", "==", "===", "!=", "!==", "&&", "||",
    "??", "&", "|", "^", "<<", "?", "+=", "-=", "*=", "/=", "%=", "**=", "&&=", "||=", "??=",
    "&=", "|=", "^=", "<<=",
];

const INCOMPLETE_TYPE_TAIL: &[&str] = &[
    "|", "&", "=>", ".", ",", ":", "?", "<", "(", "[", "{", "keyof", "typeof", "extends", "is",
    "new", "readonly", "infer", "unique", "asserts",
];

fn is_ident_start(b: u8) -> bool {
    b.is_ascii_alphabetic() || b == b'_' || b == b'$' || b == b'#' || b == b'\\' || b >= 0x80
}

fn is_ident_part(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b == b'$' || b == b'\\' || b >= 0x80
}

struct Lexer<'a> {
    src: &'a str,
    bytes: &'a [u8],
    pos: usize,
    tokens: Vec<Token>,
}

impl<'a> Lexer<'a> {
    fn new(src: &'a str) -> Self {
        Self {
            src,
            bytes: src.as_bytes(),
            pos: 0,
            tokens: Vec::new(),
        }
    }

    fn run(mut self) -> Result<Vec<Token>, TranspileError> {
        while self.pos < self.bytes.len() {
            let b = self.bytes[self.pos];
            let start = self.pos;
            match b {
                b' ' | b'\t' | b'\n' | b'\r' => self.pos += 1,
                b'/' if self.peek(1) == Some(b'/') => self.skip_line_comment(),
                b'/' if self.peek(1) == Some(b'*') => self.skip_block_comment()?,
                b'\'' | b'"' => {
                    self.pos = scan_string(self.src, start)?;
                    self.push(Kind::Str, start);
                }
                b'`' => {
                    self.pos = scan_template(self.src, start)?;
                    self.push(Kind::Template, start);
                }
                b'0'..=b'9' => self.number(start),
                b'.' if self.peek(1).is_some_and(|n| n.is_ascii_digit()) => self.number(start),
                b'/' if self.regex_allowed() => {
                    self.pos = scan_regex(self.src, start)?;
                    self.push(Kind::Regex, start);
                }
                _ if is_ident_start(b) => {
                    self.pos += 1;
                    while self.pos < self.bytes.len() && is_ident_part(self.bytes[self.pos]) {
                        self.pos += 1;
                    }
                    self.push(Kind::Ident, start);
                }
                _ => self.punct(start),
            }
        }
        Ok(self.tokens)
    }

    fn peek(&self, offset: usize) -> Option<u8> {
        self.bytes.get(self.pos + offset).copied()
    }

    fn push(&mut self, kind: Kind, start: usize) {
        self.tokens.push(Token {
            kind,
            start,
            end: self.pos,
        });
    }

    fn skip_line_comment(&mut self) {
        while self.pos < self.bytes.len() && self.bytes[self.pos] != b'\n' {
            self.pos += 1;
        }
    }

    fn skip_block_comment(&mut self) -> Result<(), TranspileError> {
        match self.src[self.pos + 2..].find("*/") {
            Some(offset) => {
                self.pos += offset + 4;
                Ok(())
            }
            None => Err(TranspileError::UnterminatedComment {
                line: line_of(self.src, self.pos),
            }),
        }
    }

    fn number(&mut self, start: usize) {
        self.pos += 1;
        while self.pos < self.bytes.len() {
            let b = self.bytes[self.pos];
            let exponent_sign = (b == b'+' || b == b'-')
                && matches!(self.bytes[self.pos - 1], b'e' | b'E')
                && !self.src[start..self.pos].starts_with("0x");
            if b.is_ascii_alphanumeric() || b == b'_' || b == b'.' || exponent_sign {
                self.pos += 1;
            } else {
                break;
            }
        }
        self.push(Kind::Number, start);
    }

    fn punct(&mut self, start: usize) {
        let rest = &self.src[start..];
        let multi = PUNCTUATORS.iter().find(|p| {
            rest.starts_with(**p)
                && !(**p == "?." && rest.as_bytes().get(2).is_some_and(u8::is_ascii_digit))
        });
        let len = match multi {
            Some(p) => p.len(),
            None => rest.chars().next().map_or(1, char::len_utf8),
        };
        self.pos += len;
        self.push(Kind::Punct, start);
    }

    fn regex_allowed(&self) -> bool {
        let Some(prev) = self.tokens.last() else {
            return true;
        };
        let text = &self.src[prev.start..prev.end];
        match prev.kind {
            Kind::Punct => !matches!(text, ")" | "]" | "}"),
            Kind::Ident => REGEX_KEYWORDS.contains(&text),
            _ => false,
        }
    }
}

fn scan_string(src: &str, start: usize) -> Result<usize, TranspileError> {
    let bytes = src.as_bytes();
    let quote = bytes[start];
    let mut pos = start + 1;
    while pos < bytes.len() {
        match bytes[pos] {
            b'\\' => pos += 2,
            b'\n' => break,
            b if b == quote => return Ok(pos + 1),
            _ => pos += 1,
        }
    }
    Err(TranspileError::UnterminatedString {
        line: line_of(src, start),
    })
}

/// Returns the offset just past the closing backtick
fn scan_template(src: &str, start: usize) -> Result<usize, TranspileError> {
    let bytes = src.as_bytes();
    let mut pos = start + 1;
    while pos < bytes.len() {
        match bytes[pos] {
            b'\\' => pos += 2,
            b'`' => return Ok(pos + 1),
            b'$' if bytes.get(pos + 1) == Some(&b'{') => {
                pos = skip_substitution(src, pos + 2)?;
            }
            _ => pos += 1,
        }
    }
    Err(TranspileError::UnterminatedTemplate {
        line: line_of(src, start),
    })
}

/// Skip a `${ ... }` body starting just after `${`; returns the offset past `}`
fn skip_substitution(src: &str, start: usize) -> Result<usize, TranspileError> {
    let bytes = src.as_bytes();
    let mut depth = 1usize;
    let mut pos = start;
    while pos < bytes.len() {
        match bytes[pos] {
            b'{' => {
                depth += 1;
                pos += 1;
            }
            b'}' => {
                depth -= 1;
                pos += 1;
                if depth == 0 {
                    return Ok(pos);
                }
            }
            b'\'' | b'"' => pos = scan_string(src, pos)?,
            b'`' => pos = scan_template(src, pos)?,
            b'/' if bytes.get(pos + 1) == Some(&b'/') => {
                while pos < bytes.len() && bytes[pos] != b'\n' {
                    pos += 1;
                }
            }
            b'/' if bytes.get(pos + 1) == Some(&b'*') => match src[pos + 2..].find("*/") {
                Some(offset) => pos += offset + 4,
                None => {
                    return Err(TranspileError::UnterminatedComment {
                        line: line_of(src, pos),
                    })
                }
            },
            _ => pos += 1,
        }
    }
    Err(TranspileError::UnterminatedTemplate {
        line: line_of(src, start),
    })
}

fn scan_regex(src: &str, start: usize) -> Result<usize, TranspileError> {
    let bytes = src.as_bytes();
    let mut pos = start + 1;
    let mut in_class = false;
    while pos < bytes.len() {
        match bytes[pos] {
            b'\\' => pos += 2,
            b'\n' => break,
            b'[' => {
                in_class = true;
                pos += 1;
            }
            b']' => {
                in_class = false;
                pos += 1;
            }
            b'/' if !in_class => {
                pos += 1;
                while pos < bytes.len() && is_ident_part(bytes[pos]) {
                    pos += 1;
                }
                return Ok(pos);
            }
            _ => pos += 1,
        }
    }
    Err(TranspileError::UnterminatedRegex {
        line: line_of(src, start),
    })
}

/// Rewrite the `${ ... }` bodies of a template literal
fn transform_template(text: &str) -> Result<String, TranspileError> {
    let bytes = text.as_bytes();
    let mut out = String::with_capacity(text.len());
    let mut copied = 0;
    let mut pos = 1;
    while pos < bytes.len() {
        match bytes[pos] {
            b'\\' => pos += 2,
            b'$' if bytes.get(pos + 1) == Some(&b'{') => {
                let body_start = pos + 2;
                let body_end = skip_substitution(text, body_start)?;
                out.push_str(&text[copied..body_start]);
                out.push_str(&strip_types(&text[body_start..body_end - 1])?);
                out.push('}');
                copied = body_end;
                pos = body_end;
            }
            _ => pos += 1,
        }
    }
    out.push_str(&text[copied..]);
    Ok(out)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ParamsKind {
    Function,
    Method,
    Arrow,
    Catch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FrameKind {
    Root,
    Block,
    Object,
    Class { extends: bool },
    Params(ParamsKind),
    Paren,
    Bracket,
    ImportList,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Decl {
    None,
    Binding,
    Init,
}

#[derive(Debug)]
struct Frame {
    kind: FrameKind,
    ternary: u32,
    decl: Decl,
    /// For parameter lists: where the owning declaration starts
    decl_start: usize,
    /// For constructor parameter lists: names of parameter properties
    properties: Option<Vec<String>>,
}

impl Frame {
    fn new(kind: FrameKind) -> Self {
        Self {
            kind,
            ternary: 0,
            decl: Decl::None,
            decl_start: 0,
            properties: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct TypeStop {
    brace: bool,
    arrow: bool,
    newline: bool,
    operators: bool,
}

struct Stripper<'a> {
    src: &'a str,
    toks: Vec<Token>,
    partner: Vec<Option<usize>>,
    removed: Vec<bool>,
    replacement: Vec<Option<String>>,
    append: Vec<Option<String>>,
    frames: Vec<Frame>,
    class_heading: Option<bool>,
    last_params: Option<(usize, ParamsKind, usize)>,
    pending_properties: Option<(Vec<String>, bool)>,
    last_colon_ternary: bool,
}

impl<'a> Stripper<'a> {
    fn new(src: &'a str, toks: Vec<Token>) -> Result<Self, TranspileError> {
        let partner = match_brackets(src, &toks)?;
        let n = toks.len();
        Ok(Self {
            src,
            toks,
            partner,
            removed: vec![false; n],
            replacement: vec![None; n],
            append: vec![None; n],
            frames: vec![Frame::new(FrameKind::Root)],
            class_heading: None,
            last_params: None,
            pending_properties: None,
            last_colon_ternary: false,
        })
    }

    fn len(&self) -> usize {
        self.toks.len()
    }

    fn text(&self, i: usize) -> &'a str {
        let tok = self.toks[i];
        &self.src[tok.start..tok.end]
    }

    fn is(&self, i: usize, s: &str) -> bool {
        i < self.len() && self.text(i) == s
    }

    fn is_kind(&self, i: usize, kind: Kind) -> bool {
        i < self.len() && self.toks[i].kind == kind
    }

    fn newline_between(&self, a: usize, b: usize) -> bool {
        b < self.len() && self.src[self.toks[a].end..self.toks[b].start].contains('\n')
    }

    fn prev_live(&self, i: usize) -> Option<usize> {
        (0..i).rev().find(|&j| !self.removed[j])
    }

    fn top(&self) -> &Frame {
        // the root frame is never popped
        &self.frames[self.frames.len() - 1]
    }

    fn top_mut(&mut self) -> &mut Frame {
        let last = self.frames.len() - 1;
        &mut self.frames[last]
    }

    fn remove(&mut self, from: usize, to: usize) {
        for slot in &mut self.removed[from..to.min(self.toks.len())] {
            *slot = true;
        }
    }

    fn ends_expression(&self, i: usize) -> bool {
        match self.toks[i].kind {
            Kind::Ident => !EXPRESSION_KEYWORDS.contains(&self.text(i)),
            Kind::Punct => matches!(self.text(i), ")" | "]" | "}"),
            _ => true,
        }
    }

    fn type_complete(&self, last: usize) -> bool {
        !INCOMPLETE_TYPE_TAIL.contains(&self.text(last))
    }

    fn at_statement_start(&self, i: usize) -> bool {
        if !matches!(self.top().kind, FrameKind::Root | FrameKind::Block) {
            return false;
        }
        match self.prev_live(i) {
            None => true,
            Some(p) => {
                let text = self.text(p);
                if matches!(text, ";" | "{" | "}") {
                    return true;
                }
                let continues = self.toks[p].kind == Kind::Punct
                    && !matches!(text, ")" | "]" | "++" | "--");
                self.newline_between(p, i) && !continues
            }
        }
    }

    fn run(&mut self) -> Result<(), TranspileError> {
        let mut i = 0;
        while i < self.len() {
            if self.removed[i] {
                i += 1;
                continue;
            }
            self.end_field_initializer(i);
            i = match self.toks[i].kind {
                Kind::Template => {
                    let text = self.text(i);
                    if text.contains("${") {
                        let rewritten = transform_template(text)?;
                        if rewritten != text {
                            self.removed[i] = true;
                            self.replacement[i] = Some(rewritten);
                        }
                    }
                    i + 1
                }
                Kind::Ident => self.ident(i)?,
                Kind::Punct => self.punct(i),
                _ => i + 1,
            };
        }
        Ok(())
    }

    /// A class field initializer without a semicolon ends at the line break
    fn end_field_initializer(&mut self, i: usize) {
        let in_initializer =
            matches!(self.top().kind, FrameKind::Class { .. }) && self.top().decl == Decl::Init;
        if !in_initializer {
            return;
        }
        if let Some(p) = self.prev_live(i) {
            if self.newline_between(p, i) && self.ends_expression(p) {
                self.top_mut().decl = Decl::None;
            }
        }
    }

    fn ident(&mut self, i: usize) -> Result<usize, TranspileError> {
        let word = self.text(i);

        if self.at_statement_start(i) {
            if let Some(next) = self.declaration(i)? {
                return Ok(next);
            }
        }

        let after_dot = self.prev_live(i).is_some_and(|p| matches!(self.text(p), "." | "?."));
        if after_dot {
            return Ok(self.generic_arguments(i));
        }

        match word {
            "let" | "const" | "var"
                if self.is_kind(i + 1, Kind::Ident) || self.is(i + 1, "{") || self.is(i + 1, "[") =>
            {
                self.top_mut().decl = Decl::Binding;
            }
            "this" if self.is_this_parameter(i) => {
                let mut end = self.skip_type(i + 2, TypeStop::default());
                if self.is(end, ",") {
                    end += 1;
                }
                self.remove(i, end);
                return Ok(end);
            }
            "class" => self.class_heading = Some(false),
            "extends" if self.class_heading.is_some() => self.class_heading = Some(true),
            "implements" if self.class_heading.is_some() => {
                let end = (i..self.len()).find(|&j| self.is(j, "{")).unwrap_or(self.len());
                self.remove(i, end);
                return Ok(end);
            }
            "as" | "satisfies" => {
                let type_follows = i + 1 < self.len()
                    && (matches!(self.toks[i + 1].kind, Kind::Ident | Kind::Str | Kind::Number)
                        || self.is(i + 1, "{")
                        || self.is(i + 1, "[")
                        || self.is(i + 1, "("));
                let casts = self.top().kind != FrameKind::ImportList
                    && self.prev_live(i).is_some_and(|p| self.ends_expression(p))
                    && type_follows;
                if casts {
                    let stop = TypeStop {
                        newline: true,
                        operators: true,
                        ..TypeStop::default()
                    };
                    let end = self.skip_type(i + 1, stop);
                    self.remove(i, end);
                    return Ok(end);
                }
            }
            "type"
                if self.top().kind == FrameKind::ImportList && self.is_kind(i + 1, Kind::Ident) =>
            {
                let mut end = i + 2;
                if self.is(end, "as") {
                    end += 2;
                }
                if self.is(end, ",") {
                    end += 1;
                }
                self.remove(i, end);
                return Ok(end);
            }
            _ if MODIFIERS.contains(&word) => {
                if let Some(next) = self.modifier(i) {
                    return Ok(next);
                }
            }
            _ => {}
        }

        Ok(self.generic_arguments(i))
    }

    /// Statement-level TypeScript declarations; returns the next index if one was consumed
    fn declaration(&mut self, i: usize) -> Result<Option<usize>, TranspileError> {
        let word = self.text(i);
        let next_ident = self.is_kind(i + 1, Kind::Ident);
        match word {
            "interface" if next_ident => {
                let open = (i..self.len()).find(|&j| self.is(j, "{"));
                let end = open
                    .and_then(|o| self.partner[o])
                    .map_or(self.len(), |close| close + 1);
                self.remove(i, end);
                Ok(Some(end))
            }
            "type" if next_ident && (self.is(i + 2, "=") || self.is(i + 2, "<")) => {
                let end = self.statement_end(i + 1);
                self.remove(i, end);
                Ok(Some(end))
            }
            "declare" if next_ident => {
                let end = self.statement_end(i + 1);
                self.remove(i, end);
                Ok(Some(end))
            }
            "import" if self.is(i + 1, "type") && !self.is(i + 2, "=") && !self.is(i + 2, ",") => {
                let end = self.statement_end(i + 1);
                self.remove(i, end);
                Ok(Some(end))
            }
            "export" if self.is(i + 1, "type") && (self.is(i + 2, "{") || self.is(i + 2, "*")) => {
                let end = self.statement_end(i + 1);
                self.remove(i, end);
                Ok(Some(end))
            }
            "export"
                if matches!(
                    self.toks.get(i + 1).map(|_| self.text(i + 1)),
                    Some("interface" | "declare" | "enum")
                ) || (self.is(i + 1, "type") && self.is_kind(i + 2, Kind::Ident))
                    || (self.is(i + 1, "const") && self.is(i + 2, "enum")) =>
            {
                self.remove(i, i + 1);
                Ok(Some(i + 1))
            }
            "abstract" if self.is(i + 1, "class") => {
                self.remove(i, i + 1);
                Ok(Some(i + 1))
            }
            "enum" if next_ident && self.is(i + 2, "{") => self.lower_enum(i, i).map(Some),
            "const"
                if self.is(i + 1, "enum")
                    && self.is_kind(i + 2, Kind::Ident)
                    && self.is(i + 3, "{") =>
            {
                self.lower_enum(i, i + 1).map(Some)
            }
            _ => Ok(None),
        }
    }

    fn modifier(&mut self, i: usize) -> Option<usize> {
        let word = self.text(i);
        let next_is_member = i + 1 < self.len()
            && (matches!(self.toks[i + 1].kind, Kind::Ident | Kind::Str | Kind::Number)
                || self.is(i + 1, "[")
                || self.is(i + 1, "*"));
        if !next_is_member {
            return None;
        }
        match self.top().kind {
            FrameKind::Class { .. } if matches!(word, "declare" | "abstract") => {
                let end = self.member_end(i);
                self.remove(i, end);
                Some(end)
            }
            FrameKind::Class { .. } => {
                self.remove(i, i + 1);
                Some(i + 1)
            }
            FrameKind::Params(ParamsKind::Method) if self.top().properties.is_some() => {
                let mut name = i + 1;
                while name < self.len() && MODIFIERS.contains(&self.text(name)) {
                    name += 1;
                }
                if self.is_kind(name, Kind::Ident) {
                    let property = self.text(name).to_string();
                    if let Some(properties) = self.top_mut().properties.as_mut() {
                        properties.push(property);
                    }
                }
                self.remove(i, name);
                Some(name)
            }
            _ => None,
        }
    }

    /// Remove `<...>` type arguments or parameters following the identifier at `i`
    fn generic_arguments(&mut self, i: usize) -> usize {
        if !self.is(i + 1, "<") {
            return i + 1;
        }
        let Some(end) = self.type_argument_end(i + 1) else {
            return i + 1;
        };
        let heading = self.prev_live(i).is_some_and(|p| {
            matches!(self.text(p), "class" | "extends" | "implements" | "function")
        }) || self.class_heading.is_some();
        let follows = end < self.len()
            && (self.is(end, "(")
                || self.toks[end].kind == Kind::Template
                || (heading
                    && (self.is(end, "{")
                        || self.is(end, "extends")
                        || self.is(end, "implements"))));
        if follows {
            self.remove(i + 1, end);
            return end;
        }
        i + 1
    }

    /// Index just past the `>` closing the list opened at `open`, if it looks like a type list
    fn type_argument_end(&self, open: usize) -> Option<usize> {
        let mut angle = 0i32;
        let mut nested = 0i32;
        let mut j = open;
        while j < self.len() {
            let text = self.text(j);
            match self.toks[j].kind {
                Kind::Ident | Kind::Str | Kind::Number => {}
                Kind::Punct => match text {
                    "<" => angle += 1,
                    ">" => {
                        angle -= 1;
                        if angle == 0 && nested == 0 {
                            return Some(j + 1);
                        }
                    }
                    "(" | "[" | "{" => nested += 1,
                    ")" | "]" | "}" => {
                        nested -= 1;
                        if nested < 0 {
                            return None;
                        }
                    }
                    "," | "." | "|" | "&" | "=>" | "?" | "=" | "..." | "-" => {}
                    ":" | ";" if nested > 0 => {}
                    _ => return None,
                },
                _ => return None,
            }
            j += 1;
        }
        None
    }

    fn punct(&mut self, i: usize) -> usize {
        match self.text(i) {
            "(" => self.open_paren(i),
            "[" => {
                let index_signature = matches!(self.top().kind, FrameKind::Class { .. })
                    && self.is_kind(i + 1, Kind::Ident)
                    && self.is(i + 2, ":");
                if index_signature {
                    let end = self.member_end(i);
                    self.remove(i, end);
                    return end;
                }
                self.frames.push(Frame::new(FrameKind::Bracket));
                i + 1
            }
            "{" => self.open_brace(i),
            ")" | "]" | "}" => self.close(i),
            ":" => self.colon(i),
            "?" => {
                let optional_marker = match self.top().kind {
                    FrameKind::Params(_) => {
                        self.is(i + 1, ":")
                            || self.is(i + 1, ")")
                            || self.is(i + 1, ",")
                            || self.is(i + 1, "=")
                    }
                    FrameKind::Class { .. } => {
                        self.is(i + 1, ":")
                            || self.is(i + 1, "(")
                            || self.is(i + 1, ";")
                            || self.is(i + 1, "=")
                    }
                    _ => false,
                };
                if optional_marker {
                    self.remove(i, i + 1);
                } else {
                    self.top_mut().ternary += 1;
                }
                i + 1
            }
            "!" => {
                if self.is_non_null_assertion(i) {
                    self.remove(i, i + 1);
                }
                i + 1
            }
            "=" => {
                let top = self.top_mut();
                if top.decl == Decl::Binding || matches!(top.kind, FrameKind::Class { .. }) {
                    top.decl = Decl::Init;
                }
                i + 1
            }
            "," => {
                if self.top().decl == Decl::Init {
                    self.top_mut().decl = Decl::Binding;
                }
                i + 1
            }
            ";" => {
                self.top_mut().decl = Decl::None;
                i + 1
            }
            _ => i + 1,
        }
    }

    /// `this: T` as the first parameter only types the receiver
    fn is_this_parameter(&self, i: usize) -> bool {
        matches!(
            self.top().kind,
            FrameKind::Params(ParamsKind::Function | ParamsKind::Method)
        ) && self.is(i + 1, ":")
            && self.prev_live(i).is_some_and(|p| self.text(p) == "(")
    }

    fn is_non_null_assertion(&self, i: usize) -> bool {
        let Some(prev) = self.prev_live(i) else {
            return false;
        };
        if !self.ends_expression(prev) || self.toks[prev].end != self.toks[i].start {
            return false;
        }
        if i + 1 >= self.len() || self.newline_between(i, i + 1) {
            return true;
        }
        let next = self.text(i + 1);
        match self.toks[i + 1].kind {
            Kind::Punct => {
                matches!(next, "." | "?." | "[" | "(" | ")" | "," | ";" | "]" | "}" | ":" | "=")
                    || BINARY_OPERATORS.contains(&next)
            }
            Kind::Ident => matches!(next, "as" | "satisfies" | "in" | "instanceof"),
            _ => false,
        }
    }

    fn open_paren(&mut self, i: usize) -> usize {
        let mut frame = Frame::new(FrameKind::Paren);
        if let Some((kind, start)) = self.params_kind(i) {
            frame.kind = FrameKind::Params(kind);
            frame.decl_start = start;
            let is_constructor = kind == ParamsKind::Method
                && self.prev_live(i).is_some_and(|p| self.text(p) == "constructor");
            if is_constructor {
                frame.properties = Some(Vec::new());
            }
        }
        self.frames.push(frame);
        i + 1
    }

    fn params_kind(&self, i: usize) -> Option<(ParamsKind, usize)> {
        let close = self.partner[i]?;
        let after = close + 1;
        let prev = self.prev_live(i);
        let prev_text = prev.map(|p| self.text(p));

        let function_kw = match prev {
            Some(p) if self.text(p) == "function" => Some(p),
            Some(p) => self.prev_live(p).filter(|&pp| {
                self.text(pp) == "function"
                    || (self.text(pp) == "*"
                        && self.prev_live(pp).is_some_and(|f| self.text(f) == "function"))
            }),
            None => None,
        };
        if let Some(kw) = function_kw {
            let kw = if self.text(kw) == "*" {
                self.prev_live(kw).unwrap_or(kw)
            } else {
                kw
            };
            return Some((ParamsKind::Function, self.declaration_start(kw)));
        }

        if matches!(self.top().kind, FrameKind::Class { .. }) && self.top().decl != Decl::Init {
            let name = prev.unwrap_or(i);
            return Some((ParamsKind::Method, self.member_start(name)));
        }
        if prev_text == Some("catch") {
            return Some((ParamsKind::Catch, i));
        }
        if self.is(after, "=>") {
            return Some((ParamsKind::Arrow, i));
        }

        let named = prev.is_some_and(|p| {
            self.is_kind(p, Kind::Ident) && !CONTROL_KEYWORDS.contains(&self.text(p)) && p + 1 == i
        });
        if named && self.is(after, "{") {
            return Some((ParamsKind::Method, prev.unwrap_or(i)));
        }
        if self.is(after, ":") && self.top().ternary == 0 {
            let stop = TypeStop {
                arrow: true,
                ..TypeStop::default()
            };
            let end = self.skip_type(after + 1, stop);
            if self.is(end, "=>") {
                return Some((ParamsKind::Arrow, i));
            }
            if named && self.top().kind == FrameKind::Object {
                return Some((ParamsKind::Method, prev.unwrap_or(i)));
            }
        }
        None
    }

    /// Walk back from a `function` keyword over `async` / `export` / `default`
    fn declaration_start(&self, kw: usize) -> usize {
        let mut start = kw;
        while let Some(p) = self.prev_live(start) {
            if matches!(self.text(p), "async" | "export" | "default") {
                start = p;
            } else {
                break;
            }
        }
        start
    }

    /// Walk back from a class member name over its modifiers
    fn member_start(&self, name: usize) -> usize {
        let mut start = name;
        while start > 0 {
            let p = start - 1;
            let text = self.text(p);
            if MODIFIERS.contains(&text)
                || matches!(text, "static" | "async" | "get" | "set" | "*")
            {
                start = p;
            } else {
                break;
            }
        }
        start
    }

    fn open_brace(&mut self, i: usize) -> usize {
        if let Some(extends) = self.class_heading.take() {
            self.frames.push(Frame::new(FrameKind::Class { extends }));
            return i + 1;
        }

        let kind = self.brace_kind(i);
        if kind == FrameKind::Block {
            if let Some((properties, extends)) = self.pending_properties.take() {
                self.insert_properties(i, &properties, extends);
            }
        }
        self.frames.push(Frame::new(kind));
        i + 1
    }

    fn brace_kind(&self, i: usize) -> FrameKind {
        let Some(prev) = self.prev_live(i) else {
            return FrameKind::Block;
        };
        let text = self.text(prev);
        match self.toks[prev].kind {
            Kind::Punct => match text {
                ")" | "=>" | ";" | "{" | "}" => FrameKind::Block,
                ":" if !self.last_colon_ternary
                    && matches!(self.top().kind, FrameKind::Root | FrameKind::Block)
                    && self.top().decl == Decl::None =>
                {
                    FrameKind::Block
                }
                _ => FrameKind::Object,
            },
            Kind::Ident => match text {
                "import" | "export" => FrameKind::ImportList,
                "return" | "typeof" | "case" | "in" | "of" | "new" | "yield" | "await"
                | "void" | "delete" | "throw" | "default" | "let" | "const" | "var" => {
                    FrameKind::Object
                }
                _ => FrameKind::Block,
            },
            _ => FrameKind::Block,
        }
    }

    fn insert_properties(&mut self, open: usize, properties: &[String], extends: bool) {
        if properties.is_empty() {
            return;
        }
        let assignments: String = properties
            .iter()
            .map(|name| format!(" this.{name} = {name};"))
            .collect();

        let mut anchor = open;
        if extends {
            let body_end = self.partner[open].unwrap_or(self.len());
            let super_call = (open + 1..body_end)
                .find(|&j| self.is(j, "super") && self.is(j + 1, "("))
                .and_then(|j| self.partner[j + 1]);
            if let Some(close) = super_call {
                anchor = if self.is(close + 1, ";") { close + 1 } else { close };
            }
        }
        let slot = &mut self.append[anchor];
        slot.get_or_insert_with(String::new).push_str(&assignments);
    }

    fn close(&mut self, i: usize) -> usize {
        if self.frames.len() > 1 {
            let frame = self.frames.pop();
            if matches!(self.top().kind, FrameKind::Class { .. }) {
                self.top_mut().decl = Decl::None;
            }
            if let Some(Frame {
                kind: FrameKind::Params(kind),
                decl_start,
                properties,
                ..
            }) = frame
            {
                self.last_params = Some((i, kind, decl_start));
                if let Some(properties) = properties {
                    let extends = matches!(self.top().kind, FrameKind::Class { extends: true });
                    self.pending_properties = Some((properties, extends));
                }
                if !self.is(i + 1, ":") {
                    return self.drop_signature(i + 1, kind, decl_start);
                }
            }
        }
        i + 1
    }

    /// Remove overload and abstract signatures: a function or class method
    /// whose parameter list (and return type) is not followed by a body
    fn drop_signature(&mut self, next: usize, kind: ParamsKind, start: usize) -> usize {
        let in_class = matches!(self.top().kind, FrameKind::Class { .. });
        let bodiless = match kind {
            ParamsKind::Function => !self.is(next, "{"),
            ParamsKind::Method if in_class => !self.is(next, "{"),
            _ => false,
        };
        if !bodiless {
            return next;
        }
        let end = if self.is(next, ";") { next + 1 } else { next };
        self.remove(start, end);
        self.pending_properties = None;
        end
    }

    fn colon(&mut self, i: usize) -> usize {
        if self.top().ternary > 0 {
            self.top_mut().ternary -= 1;
            self.last_colon_ternary = true;
            return i + 1;
        }
        self.last_colon_ternary = false;

        let prev = self.prev_live(i);
        if let Some((close, kind, start)) = self.last_params {
            if prev == Some(close) && kind != ParamsKind::Catch {
                let stop = TypeStop {
                    brace: kind != ParamsKind::Arrow,
                    arrow: kind == ParamsKind::Arrow,
                    newline: kind != ParamsKind::Arrow,
                    ..TypeStop::default()
                };
                let end = self.skip_type(i + 1, stop);
                self.remove(i, end);
                return self.drop_signature(end, kind, start);
            }
        }

        let stop = match self.top().kind {
            FrameKind::Params(_) => Some(TypeStop::default()),
            FrameKind::Class { .. } => Some(TypeStop {
                newline: true,
                ..TypeStop::default()
            }),
            _ if self.top().decl == Decl::Binding => Some(TypeStop {
                newline: true,
                ..TypeStop::default()
            }),
            _ => None,
        };
        match stop {
            Some(stop) => {
                let end = self.skip_type(i + 1, stop);
                self.remove(i, end);
                end
            }
            None => i + 1,
        }
    }

    /// Index of the first token after the type starting at `i`
    fn skip_type(&self, mut i: usize, stop: TypeStop) -> usize {
        let mut depth = 0i32;
        let mut last: Option<usize> = None;
        while i < self.len() {
            let text = self.text(i);
            let punct = self.toks[i].kind == Kind::Punct;
            if depth == 0 {
                if punct && matches!(text, "," | ")" | "]" | "}" | ";" | "=" | ":" | "?" | ">") {
                    break;
                }
                if let Some(last) = last {
                    if self.type_complete(last) {
                        if stop.brace && text == "{" {
                            break;
                        }
                        if stop.arrow && text == "=>" {
                            break;
                        }
                        if stop.newline
                            && self.newline_between(last, i)
                            && !matches!(text, "|" | "&" | ".")
                        {
                            break;
                        }
                        if stop.operators
                            && punct
                            && !matches!(text, "|" | "&" | "." | "(" | "[" | "{" | "<" | "=>")
                        {
                            break;
                        }
                    }
                }
            }
            if punct {
                match text {
                    "(" | "[" | "{" | "<" => depth += 1,
                    ")" | "]" | "}" | ">" => depth -= 1,
                    _ => {}
                }
            }
            last = Some(i);
            i += 1;
        }
        i
    }

    /// End (exclusive) of a statement starting at `i`
    fn statement_end(&self, i: usize) -> usize {
        let mut depth = 0i32;
        let mut j = i;
        while j < self.len() {
            let text = self.text(j);
            if depth == 0 && j > i && self.newline_between(j - 1, j) && self.type_complete(j - 1) {
                let continues = matches!(
                    text,
                    "|" | "&" | "." | "=>" | "extends" | "?" | ":" | "=" | "," | "{"
                );
                if !continues {
                    return j;
                }
            }
            if self.toks[j].kind == Kind::Punct {
                match text {
                    "(" | "[" | "{" | "<" => depth += 1,
                    ")" | "]" | "}" | ">" => {
                        depth -= 1;
                        if depth < 0 {
                            return j;
                        }
                    }
                    ";" if depth == 0 => return j + 1,
                    _ => {}
                }
            }
            j += 1;
        }
        j
    }

    /// End (exclusive) of a class member starting at `i`
    fn member_end(&self, i: usize) -> usize {
        let mut depth = 0i32;
        let mut j = i;
        while j < self.len() {
            let text = self.text(j);
            if depth == 0 && j > i && self.newline_between(j - 1, j) && self.type_complete(j - 1) {
                return j;
            }
            if self.toks[j].kind == Kind::Punct {
                match text {
                    "(" | "[" | "{" | "<" => depth += 1,
                    ")" | "]" | "}" | ">" => {
                        depth -= 1;
                        if depth < 0 {
                            return j;
                        }
                    }
                    ";" if depth == 0 => return j + 1,
                    _ => {}
                }
            }
            j += 1;
        }
        j
    }

    /// Lower `enum Name { ... }` (optionally `const enum`) to an object IIFE
    fn lower_enum(&mut self, start: usize, keyword: usize) -> Result<usize, TranspileError> {
        let line = line_of(self.src, self.toks[keyword].start);
        let name_idx = keyword + 1;
        let open = keyword + 2;
        let close = self
            .partner
            .get(open)
            .copied()
            .flatten()
            .ok_or(TranspileError::MalformedEnum { line })?;
        let name = self.text(name_idx);

        let mut body = String::new();
        let mut next_value: Option<f64> = Some(0.0);
        let mut previous_key: Option<String> = None;
        let mut j = open + 1;
        while j < close {
            let key = match self.toks[j].kind {
                Kind::Ident => format!("\"{}\"", self.text(j)),
                Kind::Str => self.text(j).to_string(),
                _ => return Err(TranspileError::MalformedEnum { line }),
            };
            j += 1;

            let mut initializer: Option<(usize, usize)> = None;
            if self.is(j, "=") {
                let init_start = j + 1;
                let mut depth = 0i32;
                let mut k = init_start;
                while k < close {
                    match self.text(k) {
                        "(" | "[" | "{" => depth += 1,
                        ")" | "]" | "}" => depth -= 1,
                        "," if depth == 0 => break,
                        _ => {}
                    }
                    k += 1;
                }
                if k == init_start {
                    return Err(TranspileError::MalformedEnum { line });
                }
                initializer = Some((init_start, k));
                j = k;
            }

            match initializer {
                Some((a, b)) if b == a + 1 && self.toks[a].kind == Kind::Str => {
                    body.push_str(&format!("{name}[{key}] = {}; ", self.text(a)));
                    next_value = None;
                }
                Some((a, b)) if b == a + 1 && self.toks[a].kind == Kind::Number => {
                    let literal = self.text(a);
                    body.push_str(&format!("{name}[{name}[{key}] = {literal}] = {key}; "));
                    next_value = literal.replace('_', "").parse::<f64>().ok().map(|v| v + 1.0);
                }
                Some((a, b)) => {
                    let expr = &self.src[self.toks[a].start..self.toks[b - 1].end];
                    body.push_str(&format!("{name}[{name}[{key}] = ({expr})] = {key}; "));
                    next_value = None;
                }
                None => {
                    let value = match (next_value, &previous_key) {
                        (Some(v), _) => format_number(v),
                        (None, Some(prev)) => format!("{name}[{prev}] + 1"),
                        (None, None) => "0".to_string(),
                    };
                    body.push_str(&format!("{name}[{name}[{key}] = {value}] = {key}; "));
                    next_value = next_value.map(|v| v + 1.0);
                }
            }
            previous_key = Some(key);

            if self.is(j, ",") {
                j += 1;
            }
        }

        let lowered =
            format!("var {name}; (function ({name}) {{ {body}}})({name} || ({name} = {{}}));");
        self.remove(start, close + 1);
        self.replacement[start] = Some(lowered);
        Ok(close + 1)
    }

    fn finish(self) -> String {
        let mut out = String::with_capacity(self.src.len());
        let mut cursor = 0;
        for (i, tok) in self.toks.iter().enumerate() {
            let trivia = &self.src[cursor..tok.start];
            if self.removed[i] {
                if trivia.contains('\n') || self.replacement[i].is_some() {
                    out.push_str(trivia);
                }
                if let Some(replacement) = &self.replacement[i] {
                    out.push_str(replacement);
                }
            } else {
                out.push_str(trivia);
                out.push_str(&self.src[tok.start..tok.end]);
            }
            if let Some(extra) = &self.append[i] {
                out.push_str(extra);
            }
            cursor = tok.end;
        }
        out.push_str(&self.src[cursor..]);
        out
    }
}

fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        value.to_string()
    }
}

fn match_brackets(src: &str, toks: &[Token]) -> Result<Vec<Option<usize>>, TranspileError> {
    let mut partner = vec![None; toks.len()];
    let mut stack: Vec<usize> = Vec::new();
    for (i, tok) in toks.iter().enumerate() {
        if tok.kind != Kind::Punct {
            continue;
        }
        let text = &src[tok.start..tok.end];
        match text {
            "(" | "[" | "{" => stack.push(i),
            ")" | "]" | "}" => {
                let expected = match text {
                    ")" => "(",
                    "]" => "[",
                    _ => "{",
                };
                match stack.pop() {
                    Some(open) if &src[toks[open].start..toks[open].end] == expected => {
                        partner[open] = Some(i);
                        partner[i] = Some(open);
                    }
                    _ => {
                        return Err(TranspileError::Unbalanced {
                            token: text.to_string(),
                            line: line_of(src, tok.start),
                        })
                    }
                }
            }
            _ => {}
        }
    }
    if let Some(open) = stack.pop() {
        return Err(TranspileError::Unbalanced {
            token: src[toks[open].start..toks[open].end].to_string(),
            line: line_of(src, toks[open].start),
        });
    }
    Ok(partner)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strip(source: &str) -> String {
        let out = strip_types(source).unwrap();
        out.split_whitespace().collect::<Vec<_>>().join(" ")
    }

    #[test]
    fn test_declaration_annotation() {
        assert_eq!(strip("let x: number = 1;"), "let x = 1;");
        assert_eq!(
            strip("const a: string[] = [], b: Map<string, number> = new Map();"),
            "const a = [], b = new Map();"
        );
    }

    #[test]
    fn test_function_parameters_and_return_type() {
        assert_eq!(
            strip("function add(a: number, b?: number): number { return a + (b ?? 0); }"),
            "function add(a, b) { return a + (b ?? 0); }"
        );
    }

    #[test]
    fn test_arrow_function_types() {
        assert_eq!(
            strip("const f = (x: number): string => String(x);"),
            "const f = (x) => String(x);"
        );
        assert_eq!(
            strip("items.map((item: { id: string }) => item.id);"),
            "items.map((item) => item.id);"
        );
    }

    #[test]
    fn test_interface_and_type_alias_removed() {
        let source = "interface Props {\n  a: string;\n}\ntype Id = string | number;\nconst id = 1;";
        assert_eq!(strip(source), "const id = 1;");
    }

    #[test]
    fn test_multiline_union_alias_removed() {
        let source = "type Mode =\n  | 'light'\n  | 'dark'\nconst mode = 'light';";
        assert_eq!(strip(source), "const mode = 'light';");
    }

    #[test]
    fn test_casts_and_non_null() {
        assert_eq!(strip("const el = document as any;"), "const el = document;");
        assert_eq!(strip("const v = (input as string).trim();"), "const v = (input).trim();");
        assert_eq!(strip("foo!.bar(baz!);"), "foo.bar(baz);");
        assert_eq!(strip("const ok = a !== b;"), "const ok = a !== b;");
    }

    #[test]
    fn test_non_null_before_binary_operator() {
        assert_eq!(strip("const r = x! + y!.z;"), "const r = x + y.z;");
        assert_eq!(strip("if (a! && b! > 1) {}"), "if (a && b > 1) {}");
        assert_eq!(strip("const n = !done;"), "const n = !done;");
    }

    #[test]
    fn test_this_parameter_removed() {
        assert_eq!(
            strip("function g(this: any, a: number) { return a; }"),
            "function g( a) { return a; }"
        );
        assert_eq!(
            strip("function h(this: Window) { return this; }"),
            "function h() { return this; }"
        );
        let class = strip("class C {\n  m(this: C, x: string) { return x; }\n}");
        assert!(class.contains("m( x) { return x; }"), "{class}");
    }

    #[test]
    fn test_truncated_const_enum() {
        assert!(strip_types("const enum \\").is_ok());
        assert!(strip_types("const enum E").is_ok());
        assert_eq!(
            strip_types("const enum E {").unwrap_err(),
            TranspileError::Unbalanced {
                token: "{".into(),
                line: 1
            }
        );
    }

    #[test]
    fn test_generics() {
        assert_eq!(strip("const m = new Map<string, number>();"), "const m = new Map();");
        assert_eq!(
            strip("function id<T>(x: T): T { return x; }"),
            "function id(x) { return x; }"
        );
        assert_eq!(strip("if (a < b && c > d) {}"), "if (a < b && c > d) {}");
    }

    #[test]
    fn test_plain_javascript_untouched() {
        let source = "const o = { a: 1, b: c ? 1 : 2 };\nlabel: for (const k in o) { break label; }\nconst r = /a:b/g;";
        assert_eq!(strip_types(source).unwrap(), source);
    }

    #[test]
    fn test_class_members() {
        let source = "class Counter implements Tick {\n  private count: number = 0;\n  readonly label?: string;\n  tick(): void { this.count += 1; }\n}";
        let out = strip(source);
        assert!(out.starts_with("class Counter {"), "{out}");
        assert!(out.contains("count = 0;"), "{out}");
        assert!(out.contains("label;"), "{out}");
        assert!(out.contains("tick() { this.count += 1; }"), "{out}");
        assert!(!out.contains("private"), "{out}");
        assert!(!out.contains("implements"), "{out}");
    }

    #[test]
    fn test_constructor_parameter_properties() {
        let out = strip("class A {\n  constructor(private step: number) {}\n}");
        assert!(out.contains("{ this.step = step;}"), "{out}");
        assert!(!out.contains("private"), "{out}");
        assert!(!out.contains("number"), "{out}");

        let derived = strip("class B extends A {\n  constructor(public x: number) { super(1); }\n}");
        assert!(derived.contains("super(1); this.x = x;"), "{derived}");
    }

    #[test]
    fn test_overloads_and_abstract_members_removed() {
        let out = strip("function f(a: string): void;\nfunction f(a: any) { return a; }");
        assert_eq!(out, "function f(a) { return a; }");

        let class = strip("abstract class S {\n  abstract area(): number;\n  name(): string { return 's'; }\n}");
        assert!(!class.contains("area"), "{class}");
        assert!(class.contains("class S {"), "{class}");
    }

    #[test]
    fn test_enum_lowering() {
        let out = strip("enum Color { Red, Green = 5, Blue, Named = 'n' }");
        assert!(out.starts_with("var Color;"), "{out}");
        assert!(out.contains(r#"Color[Color["Red"] = 0] = "Red";"#), "{out}");
        assert!(out.contains(r#"Color[Color["Green"] = 5] = "Green";"#), "{out}");
        assert!(out.contains(r#"Color[Color["Blue"] = 6] = "Blue";"#), "{out}");
        assert!(out.contains(r#"Color["Named"] = 'n';"#), "{out}");
    }

    #[test]
    fn test_template_substitutions_are_stripped() {
        assert_eq!(strip("const s = `v=${(x as any).y}`;"), "const s = `v=${(x).y}`;");
    }

    #[test]
    fn test_declare_and_type_imports_removed() {
        let out = strip("declare const VERSION: string;\nimport type { A } from './a';\nconst v = 1;");
        assert_eq!(out, "const v = 1;");
    }

    #[test]
    fn test_catch_clause_annotation() {
        assert_eq!(
            strip("try { run(); } catch (e: unknown) { log(e); }"),
            "try { run(); } catch (e) { log(e); }"
        );
    }

    #[test]
    fn test_preserves_line_count() {
        let source = "interface A {\n  x: number\n}\nthrow new Error('line 4');";
        let out = strip_types(source).unwrap();
        assert_eq!(out.lines().count(), source.lines().count());
    }

    #[test]
    fn test_unterminated_string() {
        let err = strip_types("const a = 'oops;\n").unwrap_err();
        assert_eq!(err, TranspileError::UnterminatedString { line: 1 });
    }

    #[test]
    fn test_unbalanced_braces() {
        assert!(matches!(
            strip_types("function f() {").unwrap_err(),
            TranspileError::Unbalanced { .. }
        ));
    }
}
