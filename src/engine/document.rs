//! Document trees shared between the engine and the build core.
//!
//! A parsed document is a flat list of [`Node`]s (its body) plus a string
//! metadata map. The build core finds elements by name, reads their text
//! and splices node lists around; nothing more is needed from a tree.

use std::collections::BTreeMap;
use std::path::PathBuf;

/// HTML elements that never take a closing tag.
pub const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "track",
    "wbr",
];

pub fn is_void(name: &str) -> bool {
    VOID_ELEMENTS.contains(&name.to_ascii_lowercase().as_str())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    /// Raw source text, kept verbatim (including comments and doctypes).
    Text(String),
    Element(Element),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Element {
    pub name: String,
    /// Attribute values are kept unescaped, in source order.
    pub attrs: Vec<(String, String)>,
    pub children: Vec<Node>,
    /// 1-based source line of the opening tag (0 when synthesized).
    pub line: usize,
}

impl Element {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_children(mut self, children: Vec<Node>) -> Self {
        self.children = children;
        self
    }

    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Concatenated text of every descendant text node.
    pub fn text_content(&self) -> String {
        let mut out = String::new();
        collect_text(&self.children, &mut out);
        out
    }
}

impl Node {
    pub fn text(text: impl Into<String>) -> Self {
        Node::Text(text.into())
    }

    pub fn as_element(&self) -> Option<&Element> {
        match self {
            Node::Element(el) => Some(el),
            Node::Text(_) => None,
        }
    }

    pub fn text_content(&self) -> String {
        match self {
            Node::Text(t) => t.clone(),
            Node::Element(el) => el.text_content(),
        }
    }
}

impl From<Element> for Node {
    fn from(el: Element) -> Self {
        Node::Element(el)
    }
}

fn collect_text(nodes: &[Node], out: &mut String) {
    for node in nodes {
        match node {
            Node::Text(t) => out.push_str(t),
            Node::Element(el) => collect_text(&el.children, out),
        }
    }
}

/// Every element named `name` in document order, including nested ones.
pub fn find_all<'a>(nodes: &'a [Node], name: &str) -> Vec<&'a Element> {
    let mut found = Vec::new();
    find_into(nodes, name, &mut found);
    found
}

fn find_into<'a>(nodes: &'a [Node], name: &str, found: &mut Vec<&'a Element>) {
    for node in nodes {
        if let Node::Element(el) = node {
            if el.name == name {
                found.push(el);
            }
            find_into(&el.children, name, found);
        }
    }
}

/// Serialize nodes back to markup. Text is written verbatim.
pub fn write_markup(nodes: &[Node], out: &mut String) {
    for node in nodes {
        match node {
            Node::Text(t) => out.push_str(t),
            Node::Element(el) => {
                write_open_tag(el, out);
                if el.children.is_empty() && is_void(&el.name) {
                    continue;
                }
                write_markup(&el.children, out);
                out.push_str("</");
                out.push_str(&el.name);
                out.push('>');
            }
        }
    }
}

pub fn write_open_tag(el: &Element, out: &mut String) {
    out.push('<');
    out.push_str(&el.name);
    for (key, value) in &el.attrs {
        out.push(' ');
        out.push_str(key);
        if !value.is_empty() {
            out.push_str("=\"");
            out.push_str(&value.replace('"', "&quot;"));
            out.push('"');
        }
    }
    out.push('>');
}

pub fn to_markup(nodes: &[Node]) -> String {
    let mut out = String::new();
    write_markup(nodes, &mut out);
    out
}

/// A parsed source document.
///
/// `meta` starts out as the document's front matter; the renderer adds the
/// zone metadata (`theme`, `packages`, `root`) before conversion. `theme` is
/// the include-resolved tree of the theme the document selected, cloned from
/// the zone's theme set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Document {
    pub path: PathBuf,
    pub meta: BTreeMap<String, String>,
    pub body: Vec<Node>,
    pub theme: Option<Vec<Node>>,
}

impl Document {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    /// Comma-separated `packages` metadata as a list, blanks dropped.
    pub fn packages(&self) -> Vec<String> {
        self.meta
            .get("packages")
            .map(|p| {
                p.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn el(name: &str, children: Vec<Node>) -> Node {
        Element::new(name).with_children(children).into()
    }

    #[test]
    fn text_content_concatenates_descendants() {
        let node = el("p", vec![Node::text("a "), el("em", vec![Node::text("b")])]);
        assert_eq!(node.text_content(), "a b");
    }

    #[test]
    fn find_all_includes_nested_matches() {
        let nodes = vec![
            el("x:include", vec![Node::text("a.lex")]),
            el("div", vec![el("x:include", vec![Node::text("b.lex")])]),
        ];
        let found: Vec<String> = find_all(&nodes, "x:include")
            .iter()
            .map(|e| e.text_content())
            .collect();
        assert_eq!(found, vec!["a.lex", "b.lex"]);
    }

    #[test]
    fn markup_writes_void_elements_without_closing_tag() {
        let mut img = Element::new("img");
        img.attrs.push(("src".into(), "a.png".into()));
        let nodes = vec![img.into(), el("p", vec![Node::text("hi")])];
        assert_eq!(to_markup(&nodes), r#"<img src="a.png"><p>hi</p>"#);
    }

    #[test]
    fn markup_escapes_quotes_in_attributes() {
        let mut a = Element::new("a");
        a.attrs.push(("title".into(), r#"say "hi""#.into()));
        a.attrs.push(("hidden".into(), String::new()));
        assert_eq!(
            to_markup(&[a.into()]),
            r#"<a title="say &quot;hi&quot;" hidden></a>"#
        );
    }

    #[test]
    fn packages_split_and_trimmed() {
        let mut doc = Document::new("a.lex");
        doc.meta.insert("packages".into(), " blog, ,extra ".into());
        assert_eq!(doc.packages(), vec!["blog", "extra"]);
        assert!(Document::new("b.lex").packages().is_empty());
    }
}
