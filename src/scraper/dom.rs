//! Minimal typed view of an HTML tree.
//!
//! Table interpretation only needs tag names, attributes, element children and
//! text, so it is written against [`DomNode`] rather than a concrete parser.
//! [`scraper::ElementRef`] is the implementation used in production.

use scraper::{ElementRef, Html};

pub trait DomNode: Sized + Clone {
    /// Lower-case tag name.
    fn tag(&self) -> &str;
    fn attribute(&self, name: &str) -> Option<&str>;
    /// Element children in document order (text nodes skipped).
    fn element_children(&self) -> Vec<Self>;
    /// Every element below this one, depth-first in document order.
    /// Must not recurse: nesting depth is unbounded in real pages.
    fn descendants(&self) -> Vec<Self>;
    /// Concatenated text of all descendants, unmodified.
    fn text_content(&self) -> String;
}

impl<'a> DomNode for ElementRef<'a> {
    fn tag(&self) -> &str {
        self.value().name()
    }

    fn attribute(&self, name: &str) -> Option<&str> {
        self.value().attr(name)
    }

    fn element_children(&self) -> Vec<Self> {
        self.children().filter_map(ElementRef::wrap).collect()
    }

    fn descendants(&self) -> Vec<Self> {
        (**self)
            .descendants()
            .skip(1)
            .filter_map(ElementRef::wrap)
            .collect()
    }

    fn text_content(&self) -> String {
        self.text().collect()
    }
}

/// Root element of a parsed page.
pub fn document_root(doc: &Html) -> ElementRef<'_> {
    doc.root_element()
}

/// Descendants whose tag is one of `tags`, in document order.
pub fn find_all<N: DomNode>(node: &N, tags: &[&str]) -> Vec<N> {
    node.descendants()
        .into_iter()
        .filter(|n| tags.contains(&n.tag()))
        .collect()
}

/// Direct children whose tag is one of `tags`.
pub fn children_tagged<N: DomNode>(node: &N, tags: &[&str]) -> Vec<N> {
    node.element_children()
        .into_iter()
        .filter(|c| tags.contains(&c.tag()))
        .collect()
}

/// A cell counts as bold if it, or anything inside it, is `<b>`/`<strong>`
/// or carries an inline `font-weight: bold`.
pub fn is_bold<N: DomNode>(node: &N) -> bool {
    std::iter::once(node.clone())
        .chain(node.descendants())
        .any(|n| matches!(n.tag(), "b" | "strong") || has_bold_style(&n))
}

fn has_bold_style<N: DomNode>(node: &N) -> bool {
    node.attribute("style").is_some_and(|style| {
        let compact: String = style
            .chars()
            .filter(|c| !c.is_whitespace())
            .flat_map(char::to_lowercase)
            .collect();
        compact.contains("font-weight:bold")
    })
}
