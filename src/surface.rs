//! The render-surface handle the engine drives, and a headless implementation.
//!
//! The engine never touches a browser. Everything it needs from the place the
//! markup is shown (tree access, element boxes, scrolling, scale transform,
//! resize notification) goes through [`RenderSurface`].

use std::cell::OnceCell;
use std::collections::HashMap;

use tracing::debug;

use crate::dom::{Document, NodeData, NodeId, has_visible_text, normalize_style};
use crate::error::Error;
use crate::types::{Point, Rect, ScrollBehavior, Viewport};

/// What the engine needs from a rendering backend.
pub trait RenderSurface {
    /// Mounted tree.
    fn document(&self) -> &Document;

    /// Mutable tree access. Implementations must treat any call as a layout
    /// invalidation.
    fn document_mut(&mut self) -> &mut Document;

    /// Replace the surface's content with new markup.
    ///
    /// # Errors
    ///
    /// Returns `Error::MarkupParse` when the markup cannot be read as a tree.
    /// The surface must still show the raw markup in that case.
    fn inject(&mut self, markup: &str) -> Result<(), Error>;

    /// Box of a node in document coordinates at the current scale.
    fn rect(&self, node: NodeId) -> Rect;

    /// Visible window and scroll offset.
    fn viewport(&self) -> Viewport;

    /// Move the viewport's top-left corner to `target` (scaled coordinates).
    fn scroll_to(&mut self, target: Point, behavior: ScrollBehavior);

    /// Apply a CSS-style scale transform with a compensating width (percent
    /// of the container) so the scaled content still fills it.
    fn set_transform(&mut self, scale: f64, width_percent: f64);

    /// Tell height-reporting listeners the layout changed size.
    fn notify_resize(&mut self);

    /// Generic reveal: bring the node's top edge to the top of the viewport.
    fn reveal(&mut self, node: NodeId, behavior: ScrollBehavior) {
        let rect = self.rect(node);
        let x = self.viewport().scroll_x;
        self.scroll_to(Point { x, y: rect.y }, behavior);
    }
}

// ── Headless layout ────────────────────────────────────────────────────

/// Height of one estimated line box.
const LINE_HEIGHT: f64 = 20.0;
/// Advance of one estimated character.
const CHAR_WIDTH: f64 = 8.0;
/// Height given to every image.
const IMAGE_HEIGHT: f64 = 150.0;
/// Height of a horizontal rule.
const RULE_HEIGHT: f64 = 10.0;

/// Tags laid out as blocks by the estimator.
const BLOCK_TAGS: &[&str] = &[
    "address", "article", "aside", "blockquote", "body", "center", "dd", "div", "dl", "dt", "figure", "footer",
    "form", "h1", "h2", "h3", "h4", "h5", "h6", "header", "hr", "html", "li", "main", "nav", "ol", "p", "pre",
    "section", "table", "tbody", "td", "tfoot", "th", "thead", "tr", "ul",
];

/// Whether a tag is block-level for layout and scroll purposes.
pub fn is_block_tag(tag: &str) -> bool {
    return BLOCK_TAGS.contains(&tag);
}

/// Running state of the block-flow estimator.
struct Flow {
    /// Characters that fit on one line.
    chars_per_line: usize,
    /// Characters placed on the open line.
    line_chars: usize,
    /// Estimated box per node, indexed by [`NodeId::index`].
    rects: Vec<Rect>,
    /// Content width.
    width: f64,
    /// Top of the open line.
    y: f64,
}

impl Flow {
    /// Close the current line box if it holds anything.
    fn flush(&mut self) {
        if self.line_chars > 0 {
            self.y += LINE_HEIGHT;
            self.line_chars = 0;
        }
    }

    /// Bottom edge of the content placed so far, counting an open line.
    fn bottom(&self) -> f64 {
        if self.line_chars > 0 {
            return self.y + LINE_HEIGHT;
        }
        return self.y;
    }

    /// Flow `chars` characters, wrapping onto new lines as they fill.
    fn place_text(&mut self, chars: usize) {
        let mut remaining = chars;
        while remaining > 0 {
            let room = self.chars_per_line.saturating_sub(self.line_chars);
            if remaining < room {
                self.line_chars = self.line_chars.saturating_add(remaining);
                break;
            }
            remaining = remaining.saturating_sub(room);
            self.line_chars = 0;
            self.y += LINE_HEIGHT;
        }
    }

    /// Store the box for a node.
    fn record(&mut self, node: NodeId, rect: Rect) {
        if let Some(slot) = self.rects.get_mut(node.index()) {
            *slot = rect;
        }
    }
}

/// Estimate a block-flow layout for the whole tree at scale 1.
fn estimate_layout(doc: &Document, width: f64) -> Vec<Rect> {
    let mut flow = Flow {
        chars_per_line: whole_count((width / CHAR_WIDTH).floor().max(1.0)),
        line_chars: 0,
        rects: vec![Rect::default(); node_capacity(doc)],
        width,
        y: 0.0,
    };
    lay_out(doc, &mut flow);
    return flow.rects;
}

/// Convert a floored, positive count to `usize`.
#[allow(
    clippy::as_conversions,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    reason = "floored and clamped to at least 1"
)]
fn whole_count(value: f64) -> usize {
    return value as usize;
}

/// Arena size needed to index every attached node.
fn node_capacity(doc: &Document) -> usize {
    return doc
        .descendants(doc.root())
        .into_iter()
        .map(|id| return id.index())
        .max()
        .unwrap_or(0)
        .saturating_add(1);
}

/// Characters a text run occupies, one trailing space per word.
fn visible_chars(raw: &str) -> usize {
    if !has_visible_text(raw) {
        return 0;
    }
    return raw.split_whitespace().map(|w| return w.chars().count().saturating_add(1)).sum();
}

/// Pending work for the layout walk. Closing steps carry what the element
/// needs to size itself once its children are placed.
enum Step {
    /// A block element whose children are placed.
    CloseBlock {
        /// The element.
        node: NodeId,
        /// Top edge where the block started.
        top: f64,
    },
    /// An inline element whose children are placed.
    CloseInline {
        /// Characters on the open line when the element started.
        before: usize,
        /// The element.
        node: NodeId,
        /// Line top where the element started.
        top: f64,
    },
    /// A node not yet placed.
    Enter(NodeId),
}

/// Walk the tree in document order, placing every node.
fn lay_out(doc: &Document, flow: &mut Flow) {
    let mut stack = vec![Step::Enter(doc.root())];
    while let Some(step) = stack.pop() {
        match step {
            Step::Enter(node) => enter_node(doc, node, flow, &mut stack),
            Step::CloseBlock { node, top } => {
                flow.flush();
                let width = flow.width;
                flow.record(node, Rect::new(0.0, top, width, flow.y - top));
            },
            Step::CloseInline { before, node, top } => {
                let moved = flow.y > top || flow.line_chars != before;
                let (width, height) = if moved {
                    (flow.width.min(CHAR_WIDTH * 80.0), flow.bottom() - top)
                } else {
                    (0.0, 0.0)
                };
                flow.record(node, Rect::new(0.0, top, width, height));
            },
        }
    }
}

/// Queue a node's children so the first child is placed first.
fn push_children(doc: &Document, node: NodeId, stack: &mut Vec<Step>) {
    stack.extend(doc.children(node).iter().rev().map(|child| return Step::Enter(*child)));
}

/// Place a leaf, or open an element and queue its children.
fn enter_node(doc: &Document, node: NodeId, flow: &mut Flow, stack: &mut Vec<Step>) {
    match doc.data(node) {
        Some(NodeData::Document) => push_children(doc, node, stack),
        Some(NodeData::Text(raw)) => {
            let chars = visible_chars(raw);
            let top = flow.y;
            if chars == 0 {
                flow.record(node, Rect::new(0.0, top, 0.0, 0.0));
                return;
            }
            flow.place_text(chars);
            let shown = chars.min(flow.chars_per_line);
            let width = f64::from(u32::try_from(shown).unwrap_or(u32::MAX)) * CHAR_WIDTH;
            let height = flow.bottom() - top;
            flow.record(node, Rect::new(0.0, top, width, height));
        },
        Some(NodeData::Element(element)) => {
            let hidden = doc
                .attr(node, "style")
                .is_some_and(|style| return normalize_style(style).contains("display:none"));
            if hidden {
                flow.record(node, Rect::new(0.0, flow.y, 0.0, 0.0));
                return;
            }
            let tag = element.name.as_str();
            if is_block_tag(tag) || tag == "img" {
                flow.flush();
                let top = flow.y;
                match tag {
                    "hr" => flow.y += RULE_HEIGHT,
                    "img" => flow.y += IMAGE_HEIGHT,
                    _ => {},
                }
                stack.push(Step::CloseBlock { node, top });
            } else {
                stack.push(Step::CloseInline {
                    before: flow.line_chars,
                    node,
                    top: flow.y,
                });
            }
            push_children(doc, node, stack);
        },
        Some(NodeData::Comment(_) | NodeData::Doctype(_)) => {
            flow.record(node, Rect::new(0.0, flow.bottom(), 0.0, 0.0));
        },
        None => {},
    }
}

// ── Headless surface ───────────────────────────────────────────────────

/// In-memory render surface with an estimated layout. Tests pin exact boxes
/// with [`HeadlessSurface::pin_rect`] to model a settled (or unsettled) layout.
#[derive(Debug)]
pub struct HeadlessSurface {
    /// Mounted tree.
    document: Document,
    /// Estimated boxes, computed on first use after a mutation.
    layout: OnceCell<Vec<Rect>>,
    /// Boxes fixed by [`HeadlessSurface::pin_rect`].
    pinned: HashMap<NodeId, Rect>,
    /// Times [`RenderSurface::notify_resize`] was called.
    resize_notifications: u32,
    /// Current transform scale.
    scale: f64,
    /// Every scroll applied, oldest first.
    scroll_history: Vec<(Point, ScrollBehavior)>,
    /// Visible window and scroll offset.
    viewport: Viewport,
    /// Compensating container width.
    width_percent: f64,
}

impl HeadlessSurface {
    pub fn new(width: f64, height: f64) -> Self {
        return Self {
            document: Document::default(),
            layout: OnceCell::new(),
            pinned: HashMap::new(),
            resize_notifications: 0,
            scale: 1.0,
            scroll_history: Vec::new(),
            viewport: Viewport {
                height,
                scroll_x: 0.0,
                scroll_y: 0.0,
                width,
            },
            width_percent: 100.0,
        };
    }

    /// Fix a node's unscaled box, overriding the estimate.
    pub fn pin_rect(&mut self, node: NodeId, rect: Rect) {
        self.pinned.insert(node, rect);
    }

    pub fn scale(&self) -> f64 {
        return self.scale;
    }

    pub fn width_percent(&self) -> f64 {
        return self.width_percent;
    }

    pub fn resize_notifications(&self) -> u32 {
        return self.resize_notifications;
    }

    /// Every scroll applied so far, oldest first.
    pub fn scroll_history(&self) -> &[(Point, ScrollBehavior)] {
        return &self.scroll_history;
    }

    /// Current markup, highlights included.
    pub fn html(&self) -> String {
        return self.document.to_html();
    }

    /// Pinned box if any, otherwise the estimate at scale 1.
    fn unscaled_rect(&self, node: NodeId) -> Rect {
        if let Some(rect) = self.pinned.get(&node) {
            return *rect;
        }
        let layout = self
            .layout
            .get_or_init(|| return estimate_layout(&self.document, self.viewport.width));
        return layout.get(node.index()).copied().unwrap_or_default();
    }
}

impl RenderSurface for HeadlessSurface {
    fn document(&self) -> &Document {
        return &self.document;
    }

    fn document_mut(&mut self) -> &mut Document {
        self.layout = OnceCell::new();
        return &mut self.document;
    }

    fn inject(&mut self, markup: &str) -> Result<(), Error> {
        self.layout = OnceCell::new();
        self.pinned.clear();
        self.viewport.scroll_x = 0.0;
        self.viewport.scroll_y = 0.0;
        match Document::parse(markup) {
            Ok(document) => {
                self.document = document;
                return Ok(());
            },
            Err(e) => {
                // Keep the raw markup viewable as a single opaque text run.
                let mut fallback = Document::default();
                let root = fallback.root();
                fallback.append(root, NodeData::Text(markup.to_string()));
                self.document = fallback;
                return Err(e);
            },
        }
    }

    fn rect(&self, node: NodeId) -> Rect {
        let rect = self.unscaled_rect(node);
        return Rect::new(rect.x * self.scale, rect.y * self.scale, rect.width * self.scale, rect.height * self.scale);
    }

    fn viewport(&self) -> Viewport {
        return self.viewport;
    }

    fn scroll_to(&mut self, target: Point, behavior: ScrollBehavior) {
        let clamped = Point {
            x: target.x.max(0.0),
            y: target.y.max(0.0),
        };
        debug!(x = clamped.x, y = clamped.y, ?behavior, "scroll");
        self.viewport.scroll_x = clamped.x;
        self.viewport.scroll_y = clamped.y;
        self.scroll_history.push((clamped, behavior));
    }

    fn set_transform(&mut self, scale: f64, width_percent: f64) {
        self.scale = scale;
        self.width_percent = width_percent;
    }

    fn notify_resize(&mut self) {
        self.resize_notifications = self.resize_notifications.saturating_add(1);
    }
}
