//! Headless markup tree: a lenient HTML reader on top of `quick-xml`, an
//! arena of nodes addressed by [`NodeId`], and the queries the locate engine
//! needs (document order, range containment, class mutation, text wrapping).

use std::collections::HashSet;
use std::fmt::Write as _;

use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;

use crate::error::Error;

/// Elements that never have children and never get an end tag.
const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "track", "wbr",
];

/// Elements closed implicitly when a sibling of the same name opens.
const SELF_NESTING_CLOSERS: &[&str] = &["li", "p", "td", "th", "tr"];

/// Stable handle to a node. Ids are never reused, so a handle stays valid
/// across wraps and unwraps (an unwrapped wrapper is merely detached).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize)]
pub struct NodeId(usize);

impl NodeId {
    /// Arena slot, stable for the life of the document.
    pub fn index(self) -> usize {
        return self.0;
    }
}

/// An element's tag and attributes. Tag and attribute names are lowercased.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    pub attrs: Vec<(String, String)>,
    pub name: String,
}

/// Node payload. Text and comment content is kept in its raw (escaped) form
/// so serialization round-trips the source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeData {
    Comment(String),
    Doctype(String),
    Document,
    Element(Element),
    Text(String),
}

#[derive(Debug, Clone)]
/// One arena slot.
struct Node {
    /// Children in document order.
    children: Vec<NodeId>,
    /// Payload.
    data: NodeData,
    /// `None` for the root and for detached nodes.
    parent: Option<NodeId>,
}

/// Explicit-stack traversal step. Tree walks never recurse: unclosed
/// inline tags can nest tens of thousands deep.
#[derive(Debug, Clone, Copy)]
enum Visit {
    /// Before the node's children.
    Enter(NodeId),
    /// After the node's children.
    Exit(NodeId),
}

/// Pre-order position of every attached node plus the position of the last
/// node in its subtree. Recomputed on demand; mutations invalidate it.
#[derive(Debug, Clone)]
pub struct DocumentOrder {
    /// `(first, last)` per node, indexed by [`NodeId::index`].
    spans: Vec<Option<(usize, usize)>>,
}

impl DocumentOrder {
    /// Pre-order index, or `None` for detached nodes.
    pub fn position(&self, node: NodeId) -> Option<usize> {
        return self.spans.get(node.0).copied().flatten().map(|(start, _)| return start);
    }

    /// `(first, last)` pre-order indices covered by the node's subtree.
    pub fn span(&self, node: NodeId) -> Option<(usize, usize)> {
        return self.spans.get(node.0).copied().flatten();
    }

    /// Whether `node` lies wholly after `start` opens and before `end` opens,
    /// i.e. inside a DOM range set after `start` and before `end`.
    pub fn contained_between(&self, node: NodeId, start: NodeId, end: NodeId) -> bool {
        let (Some((first, last)), Some(start_pos), Some(end_pos)) =
            (self.span(node), self.position(start), self.position(end))
        else {
            return false;
        };
        return first > start_pos && last < end_pos;
    }

    /// Whether any part of `node`'s subtree overlaps the open interval
    /// between `start` and `end`. Ancestors of the range count.
    pub fn intersects_between(&self, node: NodeId, start: NodeId, end: NodeId) -> bool {
        let (Some((first, last)), Some(start_pos), Some(end_pos)) =
            (self.span(node), self.position(start), self.position(end))
        else {
            return false;
        };
        return last > start_pos && first < end_pos;
    }
}

/// Arena-backed markup tree.
#[derive(Debug, Clone)]
pub struct Document {
    /// Slot 0 is the root.
    nodes: Vec<Node>,
}

impl Default for Document {
    fn default() -> Self {
        return Self {
            nodes: vec![Node {
                children: Vec::new(),
                data: NodeData::Document,
                parent: None,
            }],
        };
    }
}

impl Document {
    /// Parse markup leniently: unknown entities and stray `&`/`<` are kept as
    /// text, unmatched end tags are dropped, unclosed elements close at EOF.
    ///
    /// # Errors
    ///
    /// Returns `Error::MarkupParse` if the tokenizer rejects the input outright.
    pub fn parse(markup: &str) -> Result<Self, Error> {
        let prepared = escape_stray_delimiters(markup);
        let mut reader = Reader::from_str(&prepared);
        let config = reader.config_mut();
        config.trim_text(false);
        config.check_end_names = false;
        config.allow_unmatched_ends = true;

        let mut doc = Self::default();
        let mut open: Vec<NodeId> = vec![doc.root()];

        loop {
            let event = reader.read_event().map_err(|e| {
                return Error::MarkupParse {
                    reason: format!("at byte {}: {e}", reader.error_position()),
                };
            })?;
            let parent = open.last().copied().unwrap_or_else(|| return doc.root());
            match event {
                Event::Start(start) => {
                    let element = element_from_start(&start);
                    let closes_sibling = SELF_NESTING_CLOSERS.contains(&element.name.as_str())
                        && doc.tag(parent) == Some(element.name.as_str());
                    let parent = if closes_sibling {
                        open.pop();
                        open.last().copied().unwrap_or_else(|| return doc.root())
                    } else {
                        parent
                    };
                    let is_void = VOID_ELEMENTS.contains(&element.name.as_str());
                    let id = doc.append(parent, NodeData::Element(element));
                    if !is_void {
                        open.push(id);
                    }
                },
                Event::Empty(start) => {
                    doc.append(parent, NodeData::Element(element_from_start(&start)));
                },
                Event::End(end) => {
                    let name = String::from_utf8_lossy(end.name().as_ref()).to_ascii_lowercase();
                    if let Some(depth) = open.iter().rposition(|id| return doc.tag(*id) == Some(name.as_str()))
                        && depth > 0
                    {
                        open.truncate(depth);
                    }
                },
                Event::Text(text) => doc.append_text(parent, &String::from_utf8_lossy(&text)),
                Event::CData(data) => {
                    let raw = format!("<![CDATA[{}]]>", String::from_utf8_lossy(&data));
                    doc.append_text(parent, &raw);
                },
                Event::GeneralRef(reference) => {
                    let raw = format!("&{};", String::from_utf8_lossy(&reference));
                    doc.append_text(parent, &raw);
                },
                Event::Comment(comment) => {
                    doc.append(parent, NodeData::Comment(String::from_utf8_lossy(&comment).into_owned()));
                },
                Event::DocType(doctype) => {
                    let raw = String::from_utf8_lossy(&doctype).trim().to_string();
                    doc.append(parent, NodeData::Doctype(raw));
                },
                Event::Decl(_) | Event::PI(_) => {},
                Event::Eof => break,
            }
        }

        return Ok(doc);
    }

    pub fn root(&self) -> NodeId {
        return NodeId(0);
    }

    /// The `<body>` element if present, otherwise the document root.
    pub fn body(&self) -> NodeId {
        return self
            .descendants(self.root())
            .into_iter()
            .find(|id| return self.tag(*id) == Some("body"))
            .unwrap_or_else(|| return self.root());
    }

    pub fn data(&self, node: NodeId) -> Option<&NodeData> {
        return self.nodes.get(node.0).map(|n| return &n.data);
    }

    pub fn parent(&self, node: NodeId) -> Option<NodeId> {
        return self.nodes.get(node.0).and_then(|n| return n.parent);
    }

    pub fn children(&self, node: NodeId) -> &[NodeId] {
        return self.nodes.get(node.0).map_or(&[], |n| return n.children.as_slice());
    }

    pub fn element(&self, node: NodeId) -> Option<&Element> {
        return match self.data(node)? {
            NodeData::Element(element) => Some(element),
            _ => None,
        };
    }

    /// Lowercased tag name for elements.
    pub fn tag(&self, node: NodeId) -> Option<&str> {
        return self.element(node).map(|e| return e.name.as_str());
    }

    pub fn is_element(&self, node: NodeId) -> bool {
        return self.element(node).is_some();
    }

    /// Raw text for text nodes.
    pub fn text(&self, node: NodeId) -> Option<&str> {
        return match self.data(node)? {
            NodeData::Text(text) => Some(text.as_str()),
            _ => None,
        };
    }

    /// Raw content for comment nodes.
    pub fn comment(&self, node: NodeId) -> Option<&str> {
        return match self.data(node)? {
            NodeData::Comment(text) => Some(text.as_str()),
            _ => None,
        };
    }

    /// Attribute value by case-insensitive name.
    pub fn attr(&self, node: NodeId, name: &str) -> Option<&str> {
        return self
            .element(node)?
            .attrs
            .iter()
            .find(|(key, _)| return key.eq_ignore_ascii_case(name))
            .map(|(_, value)| return value.as_str());
    }

    /// Set or replace an attribute.
    pub fn set_attr(&mut self, node: NodeId, name: &str, value: &str) {
        let Some(Node { data: NodeData::Element(element), .. }) = self.nodes.get_mut(node.0) else {
            return;
        };
        match element.attrs.iter_mut().find(|(key, _)| return key.eq_ignore_ascii_case(name)) {
            Some((_, existing)) => *existing = value.to_string(),
            None => element.attrs.push((name.to_ascii_lowercase(), value.to_string())),
        }
    }

    /// Remove an attribute if present.
    pub fn remove_attr(&mut self, node: NodeId, name: &str) {
        if let Some(Node { data: NodeData::Element(element), .. }) = self.nodes.get_mut(node.0) {
            element.attrs.retain(|(key, _)| return !key.eq_ignore_ascii_case(name));
        }
    }

    pub fn has_class(&self, node: NodeId, class: &str) -> bool {
        return self
            .attr(node, "class")
            .is_some_and(|classes| return classes.split_ascii_whitespace().any(|c| return c == class));
    }

    /// Add a class token. Returns `false` if the node already carried it.
    pub fn add_class(&mut self, node: NodeId, class: &str) -> bool {
        if !self.is_element(node) || self.has_class(node, class) {
            return false;
        }
        let updated = match self.attr(node, "class") {
            Some(existing) if !existing.trim().is_empty() => format!("{} {class}", existing.trim()),
            _ => class.to_string(),
        };
        self.set_attr(node, "class", &updated);
        return true;
    }

    /// Remove a class token. Returns `true` if the node carried it.
    pub fn remove_class(&mut self, node: NodeId, class: &str) -> bool {
        if !self.has_class(node, class) {
            return false;
        }
        let remaining: Vec<String> = self
            .attr(node, "class")
            .unwrap_or_default()
            .split_ascii_whitespace()
            .filter(|c| return *c != class)
            .map(String::from)
            .collect();
        if remaining.is_empty() {
            self.remove_attr(node, "class");
        } else {
            self.set_attr(node, "class", &remaining.join(" "));
        }
        return true;
    }

    // ── Traversal ──────────────────────────────────────────────────────

    /// All descendants in document (pre-)order, excluding `node` itself.
    pub fn descendants(&self, node: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self.children(node).iter().rev().copied().collect();
        while let Some(next) = stack.pop() {
            out.push(next);
            stack.extend(self.children(next).iter().rev().copied());
        }
        return out;
    }

    /// Ancestors from the parent up to the root.
    pub fn ancestors(&self, node: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut current = self.parent(node);
        while let Some(id) = current {
            out.push(id);
            current = self.parent(id);
        }
        return out;
    }

    /// Nearest node satisfying `predicate`, starting with `node` itself.
    pub fn closest(&self, node: NodeId, predicate: impl Fn(&Self, NodeId) -> bool) -> Option<NodeId> {
        if predicate(self, node) {
            return Some(node);
        }
        return self.ancestors(node).into_iter().find(|id| return predicate(self, *id));
    }

    /// Nearest element (inclusive) with the given tag.
    pub fn closest_tag(&self, node: NodeId, tag: &str) -> Option<NodeId> {
        return self.closest(node, |doc, id| return doc.tag(id) == Some(tag));
    }

    /// Whether `ancestor` strictly contains `node`.
    pub fn is_ancestor(&self, ancestor: NodeId, node: NodeId) -> bool {
        return self.ancestors(node).contains(&ancestor);
    }

    /// Deepest node containing both `a` and `b` (inclusive of either).
    pub fn common_ancestor(&self, a: NodeId, b: NodeId) -> NodeId {
        let mut chain_a = vec![a];
        chain_a.extend(self.ancestors(a));
        let mut chain_b: HashSet<NodeId> = self.ancestors(b).into_iter().collect();
        chain_b.insert(b);
        return chain_a
            .into_iter()
            .find(|id| return chain_b.contains(id))
            .unwrap_or_else(|| return self.root());
    }

    /// Compute pre-order positions for all attached nodes.
    pub fn order(&self) -> DocumentOrder {
        let mut spans: Vec<Option<(usize, usize)>> = vec![None; self.nodes.len()];
        let mut counter = 0_usize;
        let mut stack = vec![Visit::Enter(self.root())];
        while let Some(visit) = stack.pop() {
            match visit {
                Visit::Enter(node) => {
                    if let Some(slot) = spans.get_mut(node.0) {
                        *slot = Some((counter, counter));
                    }
                    counter = counter.saturating_add(1);
                    stack.push(Visit::Exit(node));
                    stack.extend(self.children(node).iter().rev().map(|child| return Visit::Enter(*child)));
                },
                Visit::Exit(node) => {
                    if let Some(Some((_, last))) = spans.get_mut(node.0) {
                        *last = counter.saturating_sub(1);
                    }
                },
            }
        }
        return DocumentOrder { spans };
    }

    // ── Mutation ───────────────────────────────────────────────────────

    /// Append a new node as the last child of `parent`.
    pub fn append(&mut self, parent: NodeId, data: NodeData) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            children: Vec::new(),
            data,
            parent: Some(parent),
        });
        if let Some(p) = self.nodes.get_mut(parent.0) {
            p.children.push(id);
        }
        return id;
    }

    /// Append text, merging with a trailing text sibling so entity
    /// references do not fragment a run into several nodes.
    fn append_text(&mut self, parent: NodeId, raw: &str) {
        let last = self.children(parent).last().copied();
        if let Some(last) = last
            && let Some(Node { data: NodeData::Text(existing), .. }) = self.nodes.get_mut(last.0)
        {
            existing.push_str(raw);
            return;
        }
        self.append(parent, NodeData::Text(raw.to_string()));
    }

    /// Replace `node` in its parent with a new element that contains it.
    /// Returns the wrapper, or `None` for detached nodes.
    pub fn wrap(&mut self, node: NodeId, tag: &str, attrs: Vec<(String, String)>) -> Option<NodeId> {
        let parent = self.parent(node)?;
        let slot = self.children(parent).iter().position(|c| return *c == node)?;
        let wrapper = NodeId(self.nodes.len());
        self.nodes.push(Node {
            children: vec![node],
            data: NodeData::Element(Element {
                attrs,
                name: tag.to_ascii_lowercase(),
            }),
            parent: Some(parent),
        });
        if let Some(p) = self.nodes.get_mut(parent.0)
            && let Some(entry) = p.children.get_mut(slot)
        {
            *entry = wrapper;
        }
        if let Some(n) = self.nodes.get_mut(node.0) {
            n.parent = Some(wrapper);
        }
        return Some(wrapper);
    }

    /// Splice a wrapper's children into its parent and detach the wrapper.
    pub fn unwrap(&mut self, wrapper: NodeId) {
        let Some(parent) = self.parent(wrapper) else {
            return;
        };
        let Some(slot) = self.children(parent).iter().position(|c| return *c == wrapper) else {
            return;
        };
        let children = self
            .nodes
            .get_mut(wrapper.0)
            .map(|n| return std::mem::take(&mut n.children))
            .unwrap_or_default();
        for child in &children {
            if let Some(n) = self.nodes.get_mut(child.0) {
                n.parent = Some(parent);
            }
        }
        if let Some(p) = self.nodes.get_mut(parent.0) {
            p.children.splice(slot..=slot, children);
        }
        if let Some(w) = self.nodes.get_mut(wrapper.0) {
            w.parent = None;
        }
    }

    // ── Serialization ──────────────────────────────────────────────────

    /// Markup of the whole document.
    pub fn to_html(&self) -> String {
        return self.inner_html(self.root());
    }

    /// Markup of a node's children.
    pub fn inner_html(&self, node: NodeId) -> String {
        let mut out = String::new();
        for child in self.children(node) {
            self.write_node(*child, &mut out);
        }
        return out;
    }

    /// Markup of a node including its own tag.
    pub fn outer_html(&self, node: NodeId) -> String {
        let mut out = String::new();
        self.write_node(node, &mut out);
        return out;
    }

    /// Serialize a node and its subtree.
    fn write_node(&self, node: NodeId, out: &mut String) {
        let mut stack = vec![Visit::Enter(node)];
        while let Some(visit) = stack.pop() {
            let node = match visit {
                Visit::Enter(node) => node,
                Visit::Exit(node) => {
                    if let Some(name) = self.tag(node) {
                        let _ = write!(out, "</{name}>");
                    }
                    continue;
                },
            };
            match self.data(node) {
                Some(NodeData::Document) => {
                    stack.extend(self.children(node).iter().rev().map(|child| return Visit::Enter(*child)));
                },
                Some(NodeData::Doctype(raw)) => {
                    let _ = write!(out, "<!DOCTYPE {raw}>");
                },
                Some(NodeData::Comment(raw)) => {
                    let _ = write!(out, "<!--{raw}-->");
                },
                Some(NodeData::Text(raw)) => out.push_str(raw),
                Some(NodeData::Element(element)) => {
                    let _ = write!(out, "<{}", element.name);
                    for (key, value) in &element.attrs {
                        let _ = write!(out, " {key}=\"{}\"", value.replace('"', "&quot;"));
                    }
                    out.push('>');
                    if !VOID_ELEMENTS.contains(&element.name.as_str()) {
                        stack.push(Visit::Exit(node));
                        stack.extend(self.children(node).iter().rev().map(|child| return Visit::Enter(*child)));
                    }
                },
                None => {},
            }
        }
    }
}

/// Whether raw text holds anything besides whitespace and non-breaking spaces.
pub fn has_visible_text(raw: &str) -> bool {
    return !raw
        .replace("&nbsp;", " ")
        .replace("&#160;", " ")
        .replace("&#xa0;", " ")
        .replace("&#xA0;", " ")
        .replace('\u{a0}', " ")
        .trim()
        .is_empty();
}

/// Normalize an inline style for fingerprint comparison: lowercase, no whitespace.
pub fn normalize_style(style: &str) -> String {
    return style
        .chars()
        .filter(|c| return !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect();
}

/// Element with lowercased names from a start tag. Valueless attributes get an empty value.
fn element_from_start(start: &BytesStart<'_>) -> Element {
    let name = String::from_utf8_lossy(start.name().as_ref()).to_ascii_lowercase();
    let attrs = start
        .html_attributes()
        .flatten()
        .map(|attr| {
            let key = String::from_utf8_lossy(attr.key.as_ref()).to_ascii_lowercase();
            let value = String::from_utf8_lossy(&attr.value).into_owned();
            return (key, value);
        })
        .collect();
    return Element { attrs, name };
}

/// Escape `&` that does not start an entity and `<` that does not start a
/// tag, comment, or declaration. Filings are full of "AT&T" and "x < y".
fn escape_stray_delimiters(markup: &str) -> String {
    let mut out = String::with_capacity(markup.len());
    let mut rest = markup;
    while let Some(c) = rest.chars().next() {
        let after = rest.get(c.len_utf8()..).unwrap_or_default();
        match c {
            '&' if !starts_entity(after) => out.push_str("&amp;"),
            '<' if !starts_markup(after) => out.push_str("&lt;"),
            other => out.push(other),
        }
        rest = after;
    }
    return out;
}

/// `name;`, `#123;`, or `#x1f;` within a short window.
fn starts_entity(after: &str) -> bool {
    let Some(end) = after.char_indices().take(12).find(|(_, c)| return *c == ';').map(|(i, _)| return i) else {
        return false;
    };
    let body = after.get(..end).unwrap_or_default();
    if let Some(numeric) = body.strip_prefix('#') {
        return match numeric.strip_prefix(['x', 'X']) {
            Some(hex) => !hex.is_empty() && hex.chars().all(|c| return c.is_ascii_hexdigit()),
            None => !numeric.is_empty() && numeric.chars().all(|c| return c.is_ascii_digit()),
        };
    }
    return !body.is_empty() && body.chars().all(|c| return c.is_ascii_alphanumeric());
}

/// A tag name, end tag, comment, declaration, or processing instruction follows.
fn starts_markup(after: &str) -> bool {
    return after
        .chars()
        .next()
        .is_some_and(|c| return c.is_ascii_alphabetic() || matches!(c, '/' | '!' | '?'));
}
