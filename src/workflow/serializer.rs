//! Document Serialization
//!
//! Renders the assembled element tree as indented XML text. No semantic
//! validation happens here: malformed trees pass through unchanged, the
//! consuming scheduler owns vocabulary and grammar checks.
//!
//! Escaping is entity-aware: a well-formed entity reference (`&name;`)
//! in text content passes through verbatim so the references declared in
//! the document header keep working; every other `&` escapes normally.

use crate::workflow::model::{Element, Node};

/// Two-space indentation per nesting level.
const INDENT: &str = "  ";

/// Renders an element tree as pretty-printed XML.
///
/// An element whose only child is text renders on a single line; element
/// children nest one level deeper; an element with no children
/// self-closes.
pub fn to_pretty_xml(root: &Element) -> String {
    let mut out = String::new();
    write_element(&mut out, root, 0);
    out
}

fn write_element(out: &mut String, element: &Element, depth: usize) {
    let pad = INDENT.repeat(depth);

    out.push_str(&pad);
    out.push('<');
    out.push_str(&element.name);
    for (name, value) in &element.attrs {
        out.push(' ');
        out.push_str(name);
        out.push_str("=\"");
        out.push_str(&escape_attr(value));
        out.push('"');
    }

    match element.children.as_slice() {
        [] => out.push_str("/>\n"),
        [Node::Text(text)] => {
            out.push('>');
            out.push_str(&escape_text(text));
            out.push_str("</");
            out.push_str(&element.name);
            out.push_str(">\n");
        }
        children => {
            out.push_str(">\n");
            for child in children {
                match child {
                    Node::Element(el) => write_element(out, el, depth + 1),
                    Node::Text(text) => {
                        out.push_str(&INDENT.repeat(depth + 1));
                        out.push_str(&escape_text(text));
                        out.push('\n');
                    }
                }
            }
            out.push_str(&pad);
            out.push_str("</");
            out.push_str(&element.name);
            out.push_str(">\n");
        }
    }
}

/// Escapes text content, letting entity references through.
///
/// # Example
///
/// ```
/// use cyclegen::workflow::serializer::escape_text;
///
/// assert_eq!(escape_text("&account; a < b"), "&account; a &lt; b");
/// ```
pub fn escape_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let bytes = text.as_bytes();

    for (i, ch) in text.char_indices() {
        match ch {
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '&' => {
                if is_entity_reference(bytes, i) {
                    out.push('&');
                } else {
                    out.push_str("&amp;");
                }
            }
            other => out.push(other),
        }
    }

    out
}

/// Escapes an attribute value: text escaping plus double quotes.
pub fn escape_attr(value: &str) -> String {
    escape_text(value).replace('"', "&quot;")
}

/// Checks whether the `&` at byte offset `start` begins a well-formed
/// entity reference (`&name;` with a nonempty name of word characters,
/// dots or dashes).
fn is_entity_reference(bytes: &[u8], start: usize) -> bool {
    let mut i = start + 1;
    while i < bytes.len() {
        match bytes[i] {
            b';' => return i > start + 1,
            b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' | b'_' | b'.' | b'-' => i += 1,
            _ => return false,
        }
    }
    false
}
