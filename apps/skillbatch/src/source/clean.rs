//! Markup stripping for vacancy descriptions.

use scraper::{Html, Node};

/// Elements whose text content is never part of the readable description.
const HIDDEN_ELEMENTS: &[&str] = &["script", "style", "template", "noscript"];

/// Parses `raw` as an HTML fragment, keeps the visible text nodes, and collapses
/// every whitespace run to a single space.
pub fn strip_markup(raw: &str) -> String {
    if raw.trim().is_empty() {
        return String::new();
    }

    let fragment = Html::parse_fragment(raw);
    let mut parts: Vec<&str> = Vec::new();

    for node in fragment.tree.root().descendants() {
        let Node::Text(text) = node.value() else {
            continue;
        };
        let hidden = node
            .parent()
            .and_then(|p| p.value().as_element())
            .is_some_and(|el| HIDDEN_ELEMENTS.contains(&el.name()));
        if !hidden {
            parts.push(&**text);
        }
    }

    collapse_whitespace(&parts.join(" "))
}

pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
