//! In-memory document model for rendered report pages
//!
//! Global invariants enforced:
//! - Node ids are stable for the lifetime of a document (arena storage)
//! - Markup that is not touched serializes back to the same text it was parsed from,
//!   modulo tag-internal whitespace and tag name case
//! - Every operation on a missing or detached node is a no-op

pub mod parser;
pub mod selector;

pub use selector::Selector;

/// Document node identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(pub usize);

/// Elements that never have children or an end tag
pub(crate) const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "track",
    "wbr",
];

/// Elements whose content is raw text up to the matching end tag
pub(crate) const RAW_TEXT_ELEMENTS: &[&str] = &["script", "style", "textarea", "title"];

/// How an attribute value was quoted in the source markup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quote {
    Double,
    Single,
    None,
}

/// Element attribute, value kept exactly as written (entities are not decoded)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub name: String,
    /// `None` for boolean attributes such as `checked`
    pub value: Option<String>,
    pub quote: Quote,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    pub tag: String,
    pub attrs: Vec<Attribute>,
}

impl Element {
    pub fn new(tag: &str) -> Self {
        Self {
            tag: tag.to_ascii_lowercase(),
            attrs: Vec::new(),
        }
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|a| a.name.eq_ignore_ascii_case(name))
            .map(|a| a.value.as_deref().unwrap_or(""))
    }

    pub fn has_attr(&self, name: &str) -> bool {
        self.attrs.iter().any(|a| a.name.eq_ignore_ascii_case(name))
    }

    pub fn set_attr(&mut self, name: &str, value: Option<&str>) {
        if let Some(existing) = self
            .attrs
            .iter_mut()
            .find(|a| a.name.eq_ignore_ascii_case(name))
        {
            existing.value = value.map(str::to_string);
            if existing.value.is_some() && existing.quote == Quote::None {
                existing.quote = Quote::Double;
            }
            return;
        }
        self.attrs.push(Attribute {
            name: name.to_ascii_lowercase(),
            value: value.map(str::to_string),
            quote: Quote::Double,
        });
    }

    pub fn remove_attr(&mut self, name: &str) {
        self.attrs.retain(|a| !a.name.eq_ignore_ascii_case(name));
    }

    /// Whitespace-separated `class` tokens
    pub fn classes(&self) -> impl Iterator<Item = &str> {
        self.attr("class").unwrap_or("").split_ascii_whitespace()
    }

    pub fn has_class(&self, class: &str) -> bool {
        self.classes().any(|c| c == class)
    }

    pub fn is_void(&self) -> bool {
        VOID_ELEMENTS.contains(&self.tag.as_str())
    }
}

/// Kind of document node
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    /// The document root (always node 0)
    Root,
    Element(Element),
    /// Character data, stored as raw markup (already escaped)
    Text(String),
    Comment(String),
    Doctype(String),
}

#[derive(Debug, Clone)]
pub struct Node {
    pub kind: NodeKind,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
}

/// Arena-backed HTML document
#[derive(Debug, Clone)]
pub struct Document {
    nodes: Vec<Node>,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    pub const ROOT: NodeId = NodeId(0);

    /// Create an empty document containing only the root node
    pub fn new() -> Self {
        Self {
            nodes: vec![Node {
                kind: NodeKind::Root,
                parent: None,
                children: Vec::new(),
            }],
        }
    }

    /// Parse markup into a new document
    pub fn parse(html: &str) -> Self {
        let mut doc = Self::new();
        parser::parse_into(&mut doc, Self::ROOT, html);
        doc
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.0)
    }

    pub fn element(&self, id: NodeId) -> Option<&Element> {
        match self.node(id).map(|n| &n.kind) {
            Some(NodeKind::Element(el)) => Some(el),
            _ => None,
        }
    }

    pub fn element_mut(&mut self, id: NodeId) -> Option<&mut Element> {
        match self.nodes.get_mut(id.0).map(|n| &mut n.kind) {
            Some(NodeKind::Element(el)) => Some(el),
            _ => None,
        }
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.node(id).map(|n| n.children.as_slice()).unwrap_or(&[])
    }

    /// Allocate a node and append it to `parent`'s children
    pub(crate) fn append(&mut self, parent: NodeId, kind: NodeKind) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            kind,
            parent: Some(parent),
            children: Vec::new(),
        });
        if let Some(p) = self.nodes.get_mut(parent.0) {
            p.children.push(id);
        }
        id
    }

    /// True if the node is still reachable from the root
    pub fn is_attached(&self, id: NodeId) -> bool {
        let mut current = Some(id);
        while let Some(node_id) = current {
            if node_id == Self::ROOT {
                return true;
            }
            current = self.node(node_id).and_then(|n| n.parent);
        }
        false
    }

    /// All attached elements in document order
    pub fn elements(&self) -> Vec<NodeId> {
        let mut out = Vec::new();
        self.collect_descendants(Self::ROOT, &mut out);
        out
    }

    fn collect_descendants(&self, id: NodeId, out: &mut Vec<NodeId>) {
        for &child in self.children(id) {
            if self.element(child).is_some() {
                out.push(child);
            }
            self.collect_descendants(child, out);
        }
    }

    /// Element descendants of `scope` in document order (scope itself excluded)
    pub fn descendants(&self, scope: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        self.collect_descendants(scope, &mut out);
        out
    }

    /// Serialize the whole document
    pub fn to_html(&self) -> String {
        self.inner_html(Self::ROOT)
    }

    /// Serialize the children of a node
    pub fn inner_html(&self, id: NodeId) -> String {
        let mut out = String::new();
        for &child in self.children(id) {
            self.write_node(child, &mut out);
        }
        out
    }

    /// Serialize a node including its own tags
    pub fn outer_html(&self, id: NodeId) -> String {
        let mut out = String::new();
        self.write_node(id, &mut out);
        out
    }

    fn write_node(&self, id: NodeId, out: &mut String) {
        let Some(node) = self.node(id) else {
            return;
        };
        match &node.kind {
            NodeKind::Root => {
                for &child in &node.children {
                    self.write_node(child, out);
                }
            }
            NodeKind::Text(text) => out.push_str(text),
            NodeKind::Comment(text) => {
                out.push_str("<!--");
                out.push_str(text);
                out.push_str("-->");
            }
            NodeKind::Doctype(text) => {
                out.push_str("<!");
                out.push_str(text);
                out.push('>');
            }
            NodeKind::Element(el) => {
                out.push('<');
                out.push_str(&el.tag);
                for attr in &el.attrs {
                    out.push(' ');
                    out.push_str(&attr.name);
                    if let Some(value) = &attr.value {
                        match attr.quote {
                            Quote::Single => {
                                out.push_str("='");
                                out.push_str(value);
                                out.push('\'');
                            }
                            Quote::Double => {
                                out.push_str("=\"");
                                out.push_str(&value.replace('"', "&quot;"));
                                out.push('"');
                            }
                            Quote::None => {
                                out.push('=');
                                out.push_str(value);
                            }
                        }
                    }
                }
                out.push('>');
                if el.is_void() {
                    return;
                }
                for &child in &node.children {
                    self.write_node(child, out);
                }
                out.push_str("</");
                out.push_str(&el.tag);
                out.push('>');
            }
        }
    }

    /// Replace the children of `id` with the parsed fragment
    pub fn replace_children(&mut self, id: NodeId, html: &str) {
        if self.node(id).is_none() {
            return;
        }
        let old = std::mem::take(&mut self.nodes[id.0].children);
        for child in old {
            self.nodes[child.0].parent = None;
        }
        parser::parse_into(self, id, html);
    }

    /// Insert the parsed fragment before the existing children of `id`
    pub fn prepend_html(&mut self, id: NodeId, html: &str) {
        if self.node(id).is_none() {
            return;
        }
        let existing = std::mem::take(&mut self.nodes[id.0].children);
        parser::parse_into(self, id, html);
        self.nodes[id.0].children.extend(existing);
    }

    fn style_declarations(&self, id: NodeId) -> Vec<(String, String)> {
        self.element(id)
            .and_then(|el| el.attr("style"))
            .unwrap_or("")
            .split(';')
            .filter_map(|decl| {
                let (prop, value) = decl.split_once(':')?;
                let prop = prop.trim().to_ascii_lowercase();
                if prop.is_empty() {
                    return None;
                }
                Some((prop, value.trim().to_string()))
            })
            .collect()
    }

    fn write_style(&mut self, id: NodeId, decls: &[(String, String)]) {
        let Some(el) = self.element_mut(id) else {
            return;
        };
        if decls.is_empty() {
            el.remove_attr("style");
        } else {
            let style = decls
                .iter()
                .map(|(p, v)| format!("{}: {}", p, v))
                .collect::<Vec<_>>()
                .join("; ");
            el.set_attr("style", Some(&style));
        }
    }
}

/// Query and mutation capability that page controllers operate on
///
/// Every method treats a missing node as an empty selection: lookups return
/// `None`/empty and mutations do nothing.
pub trait DomQuery {
    /// All attached elements matching `selector`, in document order
    fn query_all(&self, selector: &Selector) -> Vec<NodeId>;

    /// Element descendants of `scope` matching `selector`, in document order
    fn find_within(&self, scope: NodeId, selector: &Selector) -> Vec<NodeId>;

    fn matches(&self, node: NodeId, selector: &Selector) -> bool;

    fn parent(&self, node: NodeId) -> Option<NodeId>;

    /// The immediately following element sibling, skipping text and comments
    fn next_element_sibling(&self, node: NodeId) -> Option<NodeId>;

    fn attribute(&self, node: NodeId, name: &str) -> Option<String>;

    fn is_visible(&self, node: NodeId) -> bool;

    fn set_visible(&mut self, node: NodeId, visible: bool);

    fn is_checked(&self, node: NodeId) -> bool;

    fn set_checked(&mut self, node: NodeId, checked: bool);

    fn inner_html(&self, node: NodeId) -> String;

    fn set_inner_html(&mut self, node: NodeId, html: &str);

    fn prepend_html(&mut self, node: NodeId, html: &str);

    /// Flip visibility; returns the new state
    fn toggle_visible(&mut self, node: NodeId) -> bool {
        let visible = !self.is_visible(node);
        self.set_visible(node, visible);
        visible
    }

    /// jQuery-style `.next(selector)`: the next element sibling, only if it matches
    fn next_matching(&self, node: NodeId, selector: &Selector) -> Option<NodeId> {
        self.next_element_sibling(node)
            .filter(|&sibling| self.matches(sibling, selector))
    }
}

impl DomQuery for Document {
    fn query_all(&self, selector: &Selector) -> Vec<NodeId> {
        self.elements()
            .into_iter()
            .filter(|&id| self.matches(id, selector))
            .collect()
    }

    fn find_within(&self, scope: NodeId, selector: &Selector) -> Vec<NodeId> {
        if !self.is_attached(scope) {
            return Vec::new();
        }
        self.descendants(scope)
            .into_iter()
            .filter(|&id| self.matches(id, selector))
            .collect()
    }

    fn matches(&self, node: NodeId, selector: &Selector) -> bool {
        self.element(node).is_some_and(|el| selector.matches(el))
    }

    fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.node(node).and_then(|n| n.parent)
    }

    fn next_element_sibling(&self, node: NodeId) -> Option<NodeId> {
        let parent = self.parent(node)?;
        let siblings = self.children(parent);
        let pos = siblings.iter().position(|&s| s == node)?;
        siblings[pos + 1..]
            .iter()
            .copied()
            .find(|&s| self.element(s).is_some())
    }

    fn attribute(&self, node: NodeId, name: &str) -> Option<String> {
        self.element(node)
            .and_then(|el| el.attr(name))
            .map(str::to_string)
    }

    fn is_visible(&self, node: NodeId) -> bool {
        if self.element(node).is_none() {
            return false;
        }
        !self
            .style_declarations(node)
            .iter()
            .any(|(prop, value)| prop == "display" && is_display_none(value))
    }

    fn set_visible(&mut self, node: NodeId, visible: bool) {
        if self.element(node).is_none() {
            return;
        }
        let mut decls: Vec<(String, String)> = self
            .style_declarations(node)
            .into_iter()
            .filter(|(prop, _)| prop != "display")
            .collect();
        if !visible {
            decls.push(("display".to_string(), "none".to_string()));
        }
        self.write_style(node, &decls);
    }

    fn is_checked(&self, node: NodeId) -> bool {
        self.element(node).is_some_and(|el| el.has_attr("checked"))
    }

    fn set_checked(&mut self, node: NodeId, checked: bool) {
        if let Some(el) = self.element_mut(node) {
            if checked {
                if !el.has_attr("checked") {
                    el.set_attr("checked", None);
                }
            } else {
                el.remove_attr("checked");
            }
        }
    }

    fn inner_html(&self, node: NodeId) -> String {
        Document::inner_html(self, node)
    }

    fn set_inner_html(&mut self, node: NodeId, html: &str) {
        self.replace_children(node, html);
    }

    fn prepend_html(&mut self, node: NodeId, html: &str) {
        Document::prepend_html(self, node, html);
    }
}

/// `none`, ignoring a trailing `!important`
fn is_display_none(value: &str) -> bool {
    let value = value.trim();
    let value = match value.len().checked_sub("!important".len()) {
        Some(cut)
            if value.is_char_boundary(cut)
                && value[cut..].eq_ignore_ascii_case("!important") =>
        {
            value[..cut].trim_end()
        }
        _ => value,
    };
    value.eq_ignore_ascii_case("none")
}

#[cfg(test)]
mod tests;
