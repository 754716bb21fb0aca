//! Parser for lex source text: front matter followed by HTML-like markup.
//!
//! ```text
//! ---
//! title: About
//! theme: blog
//! ---
//! # About
//!
//! <blog:note kind="aside">Markdown text and elements mix freely.</blog:note>
//! ```
//!
//! The parser is forgiving. Stray closing tags are dropped, unclosed
//! elements are closed at the end of the enclosing element, and a `<` that
//! does not start a tag is plain text. Each repair is recorded in the log.

use super::document::{Document, Element, Node, is_void};
use super::Log;
use std::collections::BTreeMap;
use std::path::Path;

/// Elements whose content is raw text up to the matching closing tag.
const RAW_TEXT_ELEMENTS: &[&str] = &["script", "style"];

pub fn parse_document(text: &str, path: &Path) -> (Document, Log) {
    let mut log = Log::default();
    let (meta, body, first_line) = split_front_matter(text, path, &mut log);
    let nodes = parse_markup(body, first_line, path, &mut log);
    let doc = Document {
        path: path.to_path_buf(),
        meta,
        body: nodes,
        theme: None,
    };
    (doc, log)
}

/// Split a leading `---` block of `key: value` lines off the text.
///
/// Returns the metadata, the remaining body and the 1-based line the body
/// starts on. Without a closed block the whole text is body.
fn split_front_matter<'a>(
    text: &'a str,
    path: &Path,
    log: &mut Log,
) -> (BTreeMap<String, String>, &'a str, usize) {
    let mut meta = BTreeMap::new();
    let Some(rest) = text
        .strip_prefix("---\n")
        .or_else(|| text.strip_prefix("---\r\n"))
    else {
        return (meta, text, 1);
    };

    let mut offset = 0;
    for (i, line) in rest.split_inclusive('\n').enumerate() {
        offset += line.len();
        let trimmed = line.trim_end_matches(['\n', '\r']);
        if trimmed == "---" {
            return (meta, &rest[offset..], i + 3);
        }
        if trimmed.trim().is_empty() {
            continue;
        }
        match trimmed.split_once(':') {
            Some((key, value)) => {
                meta.insert(key.trim().to_string(), value.trim().to_string());
            }
            None => log.warning(path, i + 2, format!("ignoring front matter line '{trimmed}'")),
        }
    }

    log.warning(path, 1, "front matter is never closed, treating it as text");
    (BTreeMap::new(), text, 1)
}

/// Parse markup into nodes. `first_line` is the line `src` starts on.
pub fn parse_markup(src: &str, first_line: usize, path: &Path, log: &mut Log) -> Vec<Node> {
    let mut parser = MarkupParser {
        src,
        pos: 0,
        line: first_line,
        path,
        log,
        stack: vec![Element::new("")],
    };
    parser.run();
    parser.finish()
}

struct MarkupParser<'a, 'l> {
    src: &'a str,
    pos: usize,
    line: usize,
    path: &'a Path,
    log: &'l mut Log,
    /// Open elements; index 0 is the synthetic document root.
    stack: Vec<Element>,
}

impl MarkupParser<'_, '_> {
    fn run(&mut self) {
        while self.pos < self.src.len() {
            let rest = &self.src[self.pos..];
            let Some(lt) = rest.find('<') else {
                self.push_text(self.src.len());
                break;
            };
            if lt > 0 {
                self.push_text(self.pos + lt);
            }
            self.tag();
        }
    }

    /// Handle the `<` at `self.pos`.
    fn tag(&mut self) {
        let src = self.src;
        let rest = &src[self.pos..];
        if rest.starts_with("<!--") {
            let end = rest
                .find("-->")
                .map(|i| self.pos + i + 3)
                .unwrap_or(self.src.len());
            self.push_text(end);
        } else if rest.starts_with("<!") || rest.starts_with("<?") {
            let end = rest
                .find('>')
                .map(|i| self.pos + i + 1)
                .unwrap_or(self.src.len());
            self.push_text(end);
        } else if let Some(name_rest) = rest.strip_prefix("</") {
            match name_rest.find('>') {
                Some(i) if is_name(name_rest[..i].trim()) => {
                    let name = name_rest[..i].trim().to_string();
                    let line = self.line;
                    self.advance(self.pos + 2 + i + 1);
                    self.close(&name, line);
                }
                _ => self.push_text(self.pos + 1),
            }
        } else if rest[1..].starts_with(|c: char| c.is_ascii_alphabetic()) {
            match find_tag_end(rest) {
                Some(end) => {
                    let (element, self_closing) = parse_open_tag(&rest[1..end], self.line);
                    self.advance(self.pos + end + 1);
                    self.open(element, self_closing);
                }
                None => self.push_text(self.pos + 1),
            }
        } else {
            self.push_text(self.pos + 1);
        }
    }

    fn open(&mut self, element: Element, self_closing: bool) {
        if self_closing || is_void(&element.name) {
            self.append(element.into());
            return;
        }
        let lower = element.name.to_ascii_lowercase();
        if RAW_TEXT_ELEMENTS.contains(&lower.as_str()) {
            self.raw_text(element, &lower);
            return;
        }
        self.stack.push(element);
    }

    fn raw_text(&mut self, mut element: Element, lower: &str) {
        let closing = format!("</{lower}");
        let src = self.src;
        let rest = &src[self.pos..];
        let found = rest.to_ascii_lowercase().find(&closing);
        let (content_end, resume) = match found {
            Some(i) => {
                let close_end = rest[i..]
                    .find('>')
                    .map(|j| i + j + 1)
                    .unwrap_or(rest.len());
                (self.pos + i, self.pos + close_end)
            }
            None => {
                self.log.warning(
                    self.path,
                    element.line,
                    format!("<{}> is never closed", element.name),
                );
                (self.src.len(), self.src.len())
            }
        };
        let content = &src[self.pos..content_end];
        if !content.is_empty() {
            element.children.push(Node::text(content));
        }
        self.advance(resume);
        self.append(element.into());
    }

    fn close(&mut self, name: &str, line: usize) {
        let Some(depth) = self.stack.iter().skip(1).rposition(|el| el.name == name) else {
            self.log
                .warning(self.path, line, format!("ignoring unexpected closing tag </{name}>"));
            return;
        };
        let target = depth + 1;
        while self.stack.len() > target + 1 {
            self.fold_top(Some(line));
        }
        self.fold_top(None);
    }

    /// Pop the innermost open element into its parent. `implicit` carries
    /// the line of the tag that forced the close, if any.
    fn fold_top(&mut self, implicit: Option<usize>) {
        let Some(element) = self.stack.pop() else {
            return;
        };
        if let Some(line) = implicit {
            self.log.warning(
                self.path,
                line,
                format!(
                    "<{}> opened on line {} is never closed",
                    element.name, element.line
                ),
            );
        }
        self.append(element.into());
    }

    fn append(&mut self, node: Node) {
        if let Some(parent) = self.stack.last_mut() {
            parent.children.push(node);
        }
    }

    fn push_text(&mut self, end: usize) {
        let text = &self.src[self.pos..end];
        if !text.is_empty() {
            self.append(Node::text(text));
        }
        self.advance(end);
    }

    fn advance(&mut self, to: usize) {
        self.line += self.src[self.pos..to].matches('\n').count();
        self.pos = to;
    }

    fn finish(mut self) -> Vec<Node> {
        while self.stack.len() > 1 {
            let line = self.line;
            self.fold_top(Some(line));
        }
        self.stack.pop().map(|root| root.children).unwrap_or_default()
    }
}

fn is_name(s: &str) -> bool {
    let mut chars = s.chars();
    chars.next().is_some_and(|c| c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, ':' | '-' | '_' | '.'))
}

/// Byte index of the `>` ending the tag that starts `s`, skipping quoted
/// attribute values.
fn find_tag_end(s: &str) -> Option<usize> {
    let mut quote = None;
    for (i, c) in s.char_indices().skip(1) {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '"' | '\'') => quote = Some(c),
            (None, '>') => return Some(i),
            (None, '<') => return None,
            _ => {}
        }
    }
    None
}

/// Parse the inside of an opening tag (`name a="b" c`, without `<` `>`).
fn parse_open_tag(inner: &str, line: usize) -> (Element, bool) {
    let (inner, self_closing) = match inner.trim_end().strip_suffix('/') {
        Some(stripped) => (stripped, true),
        None => (inner, false),
    };
    let name_end = inner
        .find(|c: char| c.is_whitespace())
        .unwrap_or(inner.len());
    let mut element = Element::new(&inner[..name_end]);
    element.line = line;

    let mut rest = inner[name_end..].trim_start();
    while !rest.is_empty() {
        let key_end = rest
            .find(|c: char| c.is_whitespace() || c == '=')
            .unwrap_or(rest.len());
        let key = rest[..key_end].to_string();
        rest = rest[key_end..].trim_start();

        let mut value = String::new();
        if let Some(after_eq) = rest.strip_prefix('=') {
            let after_eq = after_eq.trim_start();
            let (v, remaining) = match after_eq.chars().next() {
                Some(q @ ('"' | '\'')) => match after_eq[1..].find(q) {
                    Some(close) => (&after_eq[1..close + 1], &after_eq[close + 2..]),
                    None => (&after_eq[1..], ""),
                },
                _ => {
                    let end = after_eq
                        .find(char::is_whitespace)
                        .unwrap_or(after_eq.len());
                    (&after_eq[..end], &after_eq[end..])
                }
            };
            value = v.to_string();
            rest = remaining.trim_start();
        }
        if !key.is_empty() {
            element.attrs.push((key, value));
        }
    }
    (element, self_closing)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::document::{find_all, to_markup};

    fn parse(text: &str) -> (Document, Log) {
        parse_document(text, Path::new("doc.lex"))
    }

    #[test]
    fn front_matter_is_split_into_meta() {
        let (doc, log) = parse("---\ntitle: Hello: World\ntheme: blog\n---\nBody\n");
        assert!(log.is_empty());
        assert_eq!(doc.meta["title"], "Hello: World");
        assert_eq!(doc.meta["theme"], "blog");
        assert_eq!(to_markup(&doc.body), "Body\n");
    }

    #[test]
    fn unclosed_front_matter_is_body() {
        let (doc, log) = parse("---\ntitle: x\n");
        assert!(doc.meta.is_empty());
        assert_eq!(to_markup(&doc.body), "---\ntitle: x\n");
        assert_eq!(log.len(), 1);
    }

    #[test]
    fn elements_and_text_nest() {
        let (doc, log) = parse("a <b>bold <i>it</i></b> c");
        assert!(log.is_empty());
        assert_eq!(doc.body.len(), 3);
        let b = doc.body[1].as_element().unwrap();
        assert_eq!(b.name, "b");
        assert_eq!(b.text_content(), "bold it");
    }

    #[test]
    fn namespaced_self_closing_element() {
        let (doc, _) = parse("<blog:content/>");
        let el = doc.body[0].as_element().unwrap();
        assert_eq!(el.name, "blog:content");
        assert!(el.children.is_empty());
    }

    #[test]
    fn attributes_quoted_unquoted_and_flags() {
        let (doc, _) = parse(r#"<a href="x y" data-n=3 title='q "t"' hidden>l</a>"#);
        let a = doc.body[0].as_element().unwrap();
        assert_eq!(a.attr("href"), Some("x y"));
        assert_eq!(a.attr("data-n"), Some("3"));
        assert_eq!(a.attr("title"), Some(r#"q "t""#));
        assert_eq!(a.attr("hidden"), Some(""));
    }

    #[test]
    fn quoted_gt_does_not_end_tag() {
        let (doc, _) = parse(r#"<p title="a>b">x</p>"#);
        assert_eq!(doc.body[0].as_element().unwrap().attr("title"), Some("a>b"));
    }

    #[test]
    fn void_elements_need_no_close() {
        let (doc, log) = parse("<p>a<br>b</p>");
        assert!(log.is_empty());
        let p = doc.body[0].as_element().unwrap();
        assert_eq!(p.children.len(), 3);
    }

    #[test]
    fn script_content_is_raw() {
        let (doc, log) = parse("<script>if (a < b) { x(); }</script>after");
        assert!(log.is_empty());
        let script = doc.body[0].as_element().unwrap();
        assert_eq!(script.text_content(), "if (a < b) { x(); }");
        assert_eq!(doc.body[1], Node::text("after"));
    }

    #[test]
    fn stray_closing_tag_is_reported_and_dropped() {
        let (doc, log) = parse("text</div>more");
        assert_eq!(to_markup(&doc.body), "textmore");
        let d = log.iter().next().unwrap();
        assert!(d.message.contains("</div>"));
    }

    #[test]
    fn unclosed_element_closed_at_end_with_line() {
        let (doc, log) = parse("line1\n<div>\nbody\n");
        assert_eq!(doc.body[1].as_element().unwrap().name, "div");
        let d = log.iter().next().unwrap();
        assert!(d.message.contains("opened on line 2"));
    }

    #[test]
    fn closing_outer_tag_closes_inner_ones() {
        let (doc, log) = parse("<div><span>x</div>");
        let div = doc.body[0].as_element().unwrap();
        assert_eq!(div.children[0].as_element().unwrap().name, "span");
        assert_eq!(log.len(), 1);
    }

    #[test]
    fn lone_less_than_is_text() {
        let (doc, log) = parse("1 < 2 and 3 <= 4");
        assert!(log.is_empty());
        assert_eq!(to_markup(&doc.body), "1 < 2 and 3 <= 4");
    }

    #[test]
    fn comments_and_doctype_are_text() {
        let (doc, _) = parse("<!DOCTYPE html><!-- <b> -->x");
        assert!(find_all(&doc.body, "b").is_empty());
        assert_eq!(to_markup(&doc.body), "<!DOCTYPE html><!-- <b> -->x");
    }

    #[test]
    fn element_lines_count_front_matter() {
        let (doc, _) = parse("---\na: b\n---\n\n<p>x</p>");
        let p = doc
            .body
            .iter()
            .find_map(Node::as_element)
            .unwrap();
        assert_eq!(p.line, 5);
    }
}
