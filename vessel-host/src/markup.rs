//! Tag scanning shared by the component file and template parsers

/// A parsed start tag
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct StartTag {
    pub name: String,
    pub attrs: Vec<(String, Option<String>)>,
    pub self_closing: bool,
    /// Offset just past the closing `>`
    pub end: usize,
}

/// 1-based line number of `offset`
pub(crate) fn line_at(source: &str, offset: usize) -> usize {
    source.as_bytes()[..offset.min(source.len())]
        .iter()
        .filter(|&&b| b == b'\n')
        .count()
        + 1
}

/// `<` at `pos` opens an element
pub(crate) fn is_tag_open(bytes: &[u8], pos: usize) -> bool {
    bytes.get(pos) == Some(&b'<') && bytes.get(pos + 1).is_some_and(u8::is_ascii_alphabetic)
}

fn is_name_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b':' | b'.')
}

/// Read a tag name starting at `pos`; returns the name and the offset after it
pub(crate) fn read_name(source: &str, pos: usize) -> (&str, usize) {
    let bytes = source.as_bytes();
    let mut end = pos;
    while end < bytes.len() && is_name_byte(bytes[end]) {
        end += 1;
    }
    (&source[pos..end], end)
}

/// Parse the start tag whose `<` sits at `lt`
///
/// Returns `None` when the tag is never closed by a `>`.
pub(crate) fn scan_start_tag(source: &str, lt: usize) -> Option<StartTag> {
    let bytes = source.as_bytes();
    let (name, name_end) = read_name(source, lt + 1);

    let mut quote: Option<u8> = None;
    let mut pos = name_end;
    while pos < bytes.len() {
        let b = bytes[pos];
        match quote {
            Some(q) if b == q => quote = None,
            Some(_) => {}
            None if b == b'"' || b == b'\'' => quote = Some(b),
            None if b == b'>' => break,
            None => {}
        }
        pos += 1;
    }
    if pos >= bytes.len() {
        return None;
    }

    let inner = source[name_end..pos].trim_end();
    let (inner, self_closing) = match inner.strip_suffix('/') {
        Some(rest) => (rest, true),
        None => (inner, false),
    };

    Some(StartTag {
        name: name.to_string(),
        attrs: parse_attrs(inner),
        self_closing,
        end: pos + 1,
    })
}

/// Parse an attribute list such as `lang="ts" scoped data-x=1`
pub(crate) fn parse_attrs(src: &str) -> Vec<(String, Option<String>)> {
    let bytes = src.as_bytes();
    let mut attrs = Vec::new();
    let mut pos = 0;
    while pos < bytes.len() {
        while pos < bytes.len() && (bytes[pos].is_ascii_whitespace() || bytes[pos] == b'/') {
            pos += 1;
        }
        let start = pos;
        while pos < bytes.len() && !bytes[pos].is_ascii_whitespace() && bytes[pos] != b'=' {
            pos += 1;
        }
        if start == pos {
            break;
        }
        let name = src[start..pos].to_string();

        let mut lookahead = pos;
        while lookahead < bytes.len() && bytes[lookahead].is_ascii_whitespace() {
            lookahead += 1;
        }
        if bytes.get(lookahead) != Some(&b'=') {
            attrs.push((name, None));
            continue;
        }
        pos = lookahead + 1;
        while pos < bytes.len() && bytes[pos].is_ascii_whitespace() {
            pos += 1;
        }

        let value = match bytes.get(pos) {
            Some(&q) if q == b'"' || q == b'\'' => {
                let value_start = pos + 1;
                let value_end = src[value_start..]
                    .find(q as char)
                    .map_or(src.len(), |offset| value_start + offset);
                pos = (value_end + 1).min(src.len());
                &src[value_start..value_end]
            }
            _ => {
                let value_start = pos;
                while pos < bytes.len() && !bytes[pos].is_ascii_whitespace() {
                    pos += 1;
                }
                &src[value_start..pos]
            }
        };
        attrs.push((name, Some(value.to_string())));
    }
    attrs
}
