//! Tolerant HTML tokenizer and tree builder
//!
//! Handles what report pages actually contain: elements, attributes in any
//! quoting style, void and raw-text elements, comments, doctypes, and the
//! common implied end tags (`li`, `p`, `option`, table cells). Anything that
//! does not look like markup is kept as text. Never fails.

use super::{Attribute, Document, Element, NodeId, NodeKind, Quote, RAW_TEXT_ELEMENTS};

/// Elements that implicitly close an open `<p>`
const CLOSES_P: &[&str] = &[
    "address", "article", "aside", "blockquote", "div", "dl", "fieldset", "footer", "form", "h1",
    "h2", "h3", "h4", "h5", "h6", "header", "hr", "nav", "ol", "p", "pre", "section", "table",
    "ul",
];

/// Parse `html` and append the resulting nodes to `parent`
pub(crate) fn parse_into(doc: &mut Document, parent: NodeId, html: &str) {
    let lower = html.to_ascii_lowercase();
    let bytes = html.as_bytes();
    let len = bytes.len();
    let mut stack = vec![parent];
    let mut pos = 0;
    let mut text_start = 0;

    while pos < len {
        if bytes[pos] != b'<' {
            pos += 1;
            continue;
        }
        let rest = &html[pos..];

        if rest.starts_with("<!--") {
            flush_text(doc, &stack, &html[text_start..pos]);
            let end = rest[4..].find("-->").map(|i| pos + 4 + i).unwrap_or(len);
            let top = current(&stack);
            doc.append(top, NodeKind::Comment(html[pos + 4..end].to_string()));
            pos = (end + 3).min(len);
            text_start = pos;
            continue;
        }

        if rest.starts_with("<!") {
            flush_text(doc, &stack, &html[text_start..pos]);
            let end = rest.find('>').map(|i| pos + i).unwrap_or(len);
            let top = current(&stack);
            doc.append(top, NodeKind::Doctype(html[pos + 2..end].to_string()));
            pos = (end + 1).min(len);
            text_start = pos;
            continue;
        }

        if rest.starts_with("</") {
            let (name, name_end) = read_name(&lower, pos + 2);
            if !name.is_empty() {
                flush_text(doc, &stack, &html[text_start..pos]);
                let end = html[name_end..]
                    .find('>')
                    .map(|i| name_end + i + 1)
                    .unwrap_or(len);
                close_element(doc, &mut stack, &name);
                pos = end;
                text_start = pos;
                continue;
            }
            pos += 1;
            continue;
        }

        if bytes.get(pos + 1).is_some_and(|b| b.is_ascii_alphabetic()) {
            flush_text(doc, &stack, &html[text_start..pos]);
            let tag = read_start_tag(html, &lower, pos + 1);
            apply_implied_end_tags(doc, &mut stack, &tag.element.tag);

            let top = current(&stack);
            let is_void = tag.element.is_void();
            let name = tag.element.tag.clone();
            let id = doc.append(top, NodeKind::Element(tag.element));
            pos = tag.end;

            if is_void || tag.self_closing {
                text_start = pos;
                continue;
            }

            if RAW_TEXT_ELEMENTS.contains(&name.as_str()) {
                let closing = format!("</{}", name);
                let content_end = lower[pos..]
                    .find(&closing)
                    .map(|i| pos + i)
                    .unwrap_or(len);
                if content_end > pos {
                    doc.append(id, NodeKind::Text(html[pos..content_end].to_string()));
                }
                pos = html[content_end..]
                    .find('>')
                    .map(|i| content_end + i + 1)
                    .unwrap_or(len);
                text_start = pos;
                continue;
            }

            stack.push(id);
            text_start = pos;
            continue;
        }

        // A '<' that does not open markup is plain text
        pos += 1;
    }

    flush_text(doc, &stack, &html[text_start.min(len)..]);
}

fn current(stack: &[NodeId]) -> NodeId {
    stack.last().copied().unwrap_or(Document::ROOT)
}

fn flush_text(doc: &mut Document, stack: &[NodeId], text: &str) {
    if !text.is_empty() {
        doc.append(current(stack), NodeKind::Text(text.to_string()));
    }
}

fn tag_of(doc: &Document, id: NodeId) -> Option<&str> {
    doc.element(id).map(|el| el.tag.as_str())
}

/// Pop up to and including the nearest open element named `name`.
/// Stray end tags are ignored; the fragment parent (stack[0]) is never popped.
fn close_element(doc: &Document, stack: &mut Vec<NodeId>, name: &str) {
    if let Some(idx) = stack
        .iter()
        .enumerate()
        .skip(1)
        .rev()
        .find(|&(_, &id)| tag_of(doc, id) == Some(name))
        .map(|(idx, _)| idx)
    {
        stack.truncate(idx);
    }
}

fn apply_implied_end_tags(doc: &Document, stack: &mut Vec<NodeId>, opening: &str) {
    let pop_while = |stack: &mut Vec<NodeId>, names: &[&str]| {
        while stack.len() > 1 {
            match stack.last().and_then(|&id| tag_of(doc, id)) {
                Some(tag) if names.contains(&tag) => {
                    stack.pop();
                }
                _ => break,
            }
        }
    };
    match opening {
        "li" => pop_while(stack, &["li"]),
        "option" => pop_while(stack, &["option"]),
        "tr" => pop_while(stack, &["td", "th", "tr"]),
        "td" | "th" => pop_while(stack, &["td", "th"]),
        "dt" | "dd" => pop_while(stack, &["dt", "dd"]),
        _ => {}
    }
    if CLOSES_P.contains(&opening) {
        pop_while(stack, &["p"]);
    }
}

/// Read a tag or attribute name starting at `start`; returns (lowercase name, end)
fn read_name(lower: &str, start: usize) -> (String, usize) {
    let bytes = lower.as_bytes();
    let mut end = start;
    while end < bytes.len() {
        let b = bytes[end];
        if b.is_ascii_whitespace() || b == b'>' || b == b'/' || b == b'=' {
            break;
        }
        end += 1;
    }
    (lower[start..end].to_string(), end)
}

struct StartTag {
    element: Element,
    self_closing: bool,
    /// Byte offset just past the closing '>'
    end: usize,
}

fn read_start_tag(html: &str, lower: &str, start: usize) -> StartTag {
    let bytes = html.as_bytes();
    let len = bytes.len();
    let (tag, mut pos) = read_name(lower, start);
    let mut element = Element::new(&tag);
    let mut self_closing = false;

    loop {
        while pos < len && bytes[pos].is_ascii_whitespace() {
            pos += 1;
        }
        if pos >= len {
            break;
        }
        match bytes[pos] {
            b'>' => {
                pos += 1;
                break;
            }
            b'/' => {
                if bytes.get(pos + 1) == Some(&b'>') {
                    self_closing = true;
                    pos += 2;
                    break;
                }
                pos += 1;
                continue;
            }
            _ => {}
        }

        let (name, name_end) = read_name(lower, pos);
        if name.is_empty() {
            // Lone '=' or similar junk
            pos += 1;
            continue;
        }
        pos = name_end;
        while pos < len && bytes[pos].is_ascii_whitespace() {
            pos += 1;
        }
        if bytes.get(pos) != Some(&b'=') {
            element.attrs.push(Attribute {
                name,
                value: None,
                quote: Quote::None,
            });
            continue;
        }
        pos += 1;
        while pos < len && bytes[pos].is_ascii_whitespace() {
            pos += 1;
        }
        let (value, quote, value_end) = match bytes.get(pos) {
            Some(&q @ (b'"' | b'\'')) => {
                let close = html[pos + 1..]
                    .find(q as char)
                    .map(|i| pos + 1 + i)
                    .unwrap_or(len);
                let quote = if q == b'"' { Quote::Double } else { Quote::Single };
                (
                    html[pos + 1..close].to_string(),
                    quote,
                    (close + 1).min(len),
                )
            }
            _ => {
                let mut end = pos;
                while end < len && !bytes[end].is_ascii_whitespace() && bytes[end] != b'>' {
                    end += 1;
                }
                (html[pos..end].to_string(), Quote::None, end)
            }
        };
        element.attrs.push(Attribute {
            name,
            value: Some(value),
            quote,
        });
        pos = value_end;
    }

    StartTag {
        element,
        self_closing,
        end: pos,
    }
}

#[cfg(test)]
mod tests {
    use crate::dom::{Document, NodeKind, Quote};

    #[test]
    fn test_round_trip_preserves_markup() {
        let html = r#"<div class="changelog"><p>fixed <b>BUG-1</b></p><br/><!-- note --></div>"#;
        let doc = Document::parse(html);
        assert_eq!(doc.to_html(), r#"<div class="changelog"><p>fixed <b>BUG-1</b></p><br><!-- note --></div>"#);
    }

    #[test]
    fn test_attribute_quoting_styles() {
        let doc = Document::parse(r#"<a href='x' id=one title="t" hidden>go</a>"#);
        let a = doc.elements()[0];
        let el = doc.element(a).unwrap();
        assert_eq!(el.attr("href"), Some("x"));
        assert_eq!(el.attrs[0].quote, Quote::Single);
        assert_eq!(el.attr("id"), Some("one"));
        assert_eq!(el.attrs[1].quote, Quote::None);
        assert!(el.has_attr("hidden"));
        assert_eq!(doc.to_html(), r#"<a href='x' id=one title="t" hidden>go</a>"#);
    }

    #[test]
    fn test_void_and_raw_text_elements() {
        let doc = Document::parse(
            "<input type=checkbox value=a><script>if (a < b) { x = '</p>'; }</script>",
        );
        let els = doc.elements();
        assert_eq!(els.len(), 2);
        assert!(doc.children(els[0]).is_empty());
        let script_children = doc.children(els[1]);
        assert_eq!(script_children.len(), 1);
        match &doc.node(script_children[0]).unwrap().kind {
            NodeKind::Text(t) => assert_eq!(t, "if (a < b) { x = '</p>'; }"),
            other => panic!("expected text, got {:?}", other),
        }
    }

    #[test]
    fn test_implied_list_item_end() {
        let doc = Document::parse("<ul><li>one<li>two</ul>");
        let ul = doc.elements()[0];
        assert_eq!(doc.children(ul).len(), 2);
        assert_eq!(doc.to_html(), "<ul><li>one</li><li>two</li></ul>");
    }

    #[test]
    fn test_stray_end_tag_is_ignored() {
        let doc = Document::parse("<div>a</span>b</div>");
        assert_eq!(doc.to_html(), "<div>ab</div>");
    }

    #[test]
    fn test_lone_angle_bracket_is_text() {
        let doc = Document::parse("<div>1 < 2</div>");
        assert_eq!(doc.to_html(), "<div>1 < 2</div>");
    }

    #[test]
    fn test_unclosed_elements_close_at_end() {
        let doc = Document::parse("<div><p>open");
        assert_eq!(doc.to_html(), "<div><p>open</p></div>");
    }

    #[test]
    fn test_doctype_preserved() {
        let doc = Document::parse("<!DOCTYPE html><html><body></body></html>");
        assert_eq!(doc.to_html(), "<!DOCTYPE html><html><body></body></html>");
    }
}
