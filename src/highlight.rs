//! Range highlighting over the markup tree.
//!
//! The highlight set is simply every element carrying [`HIGHLIGHT_CLASS`].
//! Text runs that cannot carry a class are wrapped in a marked `<span>`;
//! [`clear`] removes both kinds of mark and restores the original tree shape.

use tracing::debug;

use crate::dom::{Document, NodeData, NodeId, has_visible_text};

/// Class applied to every highlighted element.
pub const HIGHLIGHT_CLASS: &str = "highlighted";

/// Attribute identifying spans created by text wrapping.
pub const WRAP_ATTR: &str = "data-highlight-wrap";

/// Table parts, marked whenever contained.
const TABLE_TAGS: &[&str] = &["table", "thead", "tbody", "tfoot", "tr", "td", "th"];

/// Inline formatting elements, marked whenever contained.
const INLINE_TAGS: &[&str] = &["a", "b", "em", "font", "i", "small", "span", "strong", "sub", "sup", "u"];

/// Classes filers use for tagged numeric values.
const VALUE_CLASSES: &[&str] = &["financial-value", "fin-value", "numeric-value", "xbrl-value"];

/// Classes filers put on table wrappers.
const TABLE_CLASSES: &[&str] = &["table", "financial-table"];

/// Mark one element. Returns `false` if it was already marked or is not an element.
pub fn mark(doc: &mut Document, node: NodeId) -> bool {
    return doc.add_class(node, HIGHLIGHT_CLASS);
}

/// Whether the node is an element carrying the highlight class.
pub fn is_highlighted(doc: &Document, node: NodeId) -> bool {
    return doc.has_class(node, HIGHLIGHT_CLASS);
}

/// Current highlight set in document order.
pub fn highlighted(doc: &Document) -> Vec<NodeId> {
    return doc
        .descendants(doc.root())
        .into_iter()
        .filter(|node| return is_highlighted(doc, *node))
        .collect();
}

/// Remove every highlight: unwrap text wrappers and strip the class.
/// Returns how many marks were removed.
pub fn clear(doc: &mut Document) -> usize {
    let marked = highlighted(doc);
    let mut removed = 0_usize;
    for node in &marked {
        if doc.attr(*node, WRAP_ATTR).is_some() {
            doc.unwrap(*node);
        } else {
            doc.remove_class(*node, HIGHLIGHT_CLASS);
        }
        removed = removed.saturating_add(1);
    }
    if removed > 0 {
        debug!(removed, "cleared highlights");
    }
    return removed;
}

/// Mark everything inside `scope` that lies strictly between `start` and
/// `end`, then mark every table the range touches in full.
///
/// With `wrap_text`, visible text runs inside the range are first wrapped in
/// highlighted spans. Already-highlighted subtrees are skipped, so repeating
/// a call is a no-op. Returns the number of newly marked nodes.
pub fn highlight_range(doc: &mut Document, start: NodeId, end: NodeId, scope: NodeId, wrap_text: bool) -> usize {
    let mut marked = 0_usize;

    if wrap_text {
        marked = marked.saturating_add(wrap_text_runs(doc, start, end, scope));
    }

    let order = doc.order();
    let mut stack: Vec<NodeId> = doc.children(scope).iter().rev().copied().collect();
    while let Some(node) = stack.pop() {
        if !doc.is_element(node) {
            continue;
        }
        if is_highlighted(doc, node) {
            continue;
        }
        if order.contained_between(node, start, end) && qualifies(doc, node) && mark(doc, node) {
            marked = marked.saturating_add(1);
        }
        stack.extend(doc.children(node).iter().rev().copied());
    }

    let tables: Vec<NodeId> = doc
        .descendants(doc.root())
        .into_iter()
        .filter(|node| return doc.tag(*node) == Some("table") && order.intersects_between(*node, start, end))
        .collect();
    for table in tables {
        if mark(doc, table) {
            marked = marked.saturating_add(1);
        }
        for inner in doc.descendants(table) {
            if mark(doc, inner) {
                marked = marked.saturating_add(1);
            }
        }
    }

    debug!(marked, "highlighted range");
    return marked;
}

/// Whether a contained element earns a mark of its own.
fn qualifies(doc: &Document, node: NodeId) -> bool {
    let Some(tag) = doc.tag(node) else {
        return false;
    };
    if TABLE_TAGS.contains(&tag) || INLINE_TAGS.contains(&tag) || tag.starts_with("ix:") {
        return true;
    }
    if VALUE_CLASSES.iter().chain(TABLE_CLASSES).any(|class| return doc.has_class(node, class)) {
        return true;
    }
    return doc
        .children(node)
        .iter()
        .any(|child| return doc.text(*child).is_some_and(has_visible_text));
}

/// Wrap each visible text run between the boundaries in a highlighted span.
fn wrap_text_runs(doc: &mut Document, start: NodeId, end: NodeId, scope: NodeId) -> usize {
    let order = doc.order();
    let runs: Vec<NodeId> = doc
        .descendants(scope)
        .into_iter()
        .filter(|node| {
            let Some(NodeData::Text(raw)) = doc.data(*node) else {
                return false;
            };
            let already = doc
                .parent(*node)
                .is_some_and(|parent| return doc.attr(parent, WRAP_ATTR).is_some());
            return !already && has_visible_text(raw) && order.contained_between(*node, start, end);
        })
        .collect();

    let mut wrapped = 0_usize;
    for run in runs {
        let attrs = vec![
            ("class".to_string(), HIGHLIGHT_CLASS.to_string()),
            (WRAP_ATTR.to_string(), String::new()),
        ];
        if doc.wrap(run, "span", attrs).is_some() {
            wrapped = wrapped.saturating_add(1);
        }
    }
    return wrapped;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn by_id(doc: &Document, id: &str) -> NodeId {
        return doc
            .descendants(doc.root())
            .into_iter()
            .find(|node| return doc.attr(*node, "id") == Some(id))
            .unwrap();
    }

    fn tags(doc: &Document, nodes: &[NodeId]) -> Vec<String> {
        return nodes.iter().map(|n| return doc.tag(*n).unwrap_or("#text").to_string()).collect();
    }

    const PROSE: &str = r#"<div id="scope"><a id="s"></a><p id="p1">Revenue grew</p><div id="empty"><br></div><p id="p2"><b>12%</b></p><a id="e"></a><p id="after">later</p></div>"#;

    #[test]
    fn marks_only_qualifying_nodes_inside_range() {
        let mut doc = Document::parse(PROSE).unwrap();
        let (s, e, scope) = (by_id(&doc, "s"), by_id(&doc, "e"), by_id(&doc, "scope"));
        let marked = highlight_range(&mut doc, s, e, scope, false);
        assert_eq!(marked, 2);
        let set = highlighted(&doc);
        assert_eq!(tags(&doc, &set), vec!["p", "b"]);
        assert!(!is_highlighted(&doc, by_id(&doc, "after")));
        assert!(!is_highlighted(&doc, by_id(&doc, "empty")));
        assert!(!is_highlighted(&doc, s));
    }

    #[test]
    fn second_pass_is_a_no_op() {
        let mut doc = Document::parse(PROSE).unwrap();
        let (s, e, scope) = (by_id(&doc, "s"), by_id(&doc, "e"), by_id(&doc, "scope"));
        highlight_range(&mut doc, s, e, scope, true);
        let once = doc.to_html();
        let set = highlighted(&doc);
        assert_eq!(highlight_range(&mut doc, s, e, scope, true), 0);
        assert_eq!(doc.to_html(), once);
        assert_eq!(highlighted(&doc), set);
    }

    #[test]
    fn partially_covered_table_is_marked_whole() {
        let html = r#"<div id="scope"><table id="t"><tr><td>a</td><td><a id="s"></a>b</td></tr><tr><td>c</td></tr></table><p>d</p><a id="e"></a></div>"#;
        let mut doc = Document::parse(html).unwrap();
        let (s, e, scope) = (by_id(&doc, "s"), by_id(&doc, "e"), by_id(&doc, "scope"));
        highlight_range(&mut doc, s, e, scope, false);
        let table = by_id(&doc, "t");
        assert!(is_highlighted(&doc, table));
        for node in doc.descendants(table) {
            if doc.is_element(node) {
                assert!(is_highlighted(&doc, node), "{:?} left unmarked", doc.tag(node));
            }
        }
    }

    #[test]
    fn wrapped_text_is_marked_and_clear_restores_markup() {
        let html = r#"<div id="scope"><!--m-->loose text<!--m--> outside</div>"#;
        let mut doc = Document::parse(html).unwrap();
        let scope = by_id(&doc, "scope");
        let comments: Vec<NodeId> = doc.children(scope).iter().copied().filter(|n| return doc.comment(*n).is_some()).collect();
        let (start, end) = (*comments.first().unwrap(), *comments.get(1).unwrap());
        assert_eq!(highlight_range(&mut doc, start, end, scope, true), 1);
        assert!(doc.to_html().contains(r#"<span class="highlighted" data-highlight-wrap="">loose text</span>"#));
        assert_eq!(clear(&mut doc), 1);
        assert_eq!(doc.to_html(), html);
    }

    #[test]
    fn clear_keeps_existing_classes() {
        let html = r#"<div id="scope"><a id="s"></a><span class="fin-value">1.2</span><a id="e"></a></div>"#;
        let mut doc = Document::parse(html).unwrap();
        let (s, e, scope) = (by_id(&doc, "s"), by_id(&doc, "e"), by_id(&doc, "scope"));
        highlight_range(&mut doc, s, e, scope, false);
        assert!(doc.to_html().contains(r#"class="fin-value highlighted""#));
        clear(&mut doc);
        assert_eq!(doc.to_html(), html);
        assert!(highlighted(&doc).is_empty());
    }
}
