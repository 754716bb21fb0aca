//! The built-in lex engine: markup trees in, HTML pages out.
//!
//! Conversion runs in three steps:
//!
//! 1. **Packages**: an element `<pkg:name>` whose prefix is one of the
//!    document's packages is replaced by the body of
//!    `<dir>/<pkg>/<name>.lex`, looked up along the module search path.
//! 2. **Body**: the expanded body is serialized back to markup and rendered
//!    as CommonMark. Elements pass through as raw HTML.
//! 3. **Theme**: the rendered body is placed into the theme tree at
//!    `<theme:content/>`. `<theme:title/>`, `<theme:root/>` and
//!    `<theme:meta name="key"/>` are filled from document metadata. Without
//!    a theme tree the page gets a bare maud layout.

use super::document::{Document, Element, Node, is_void, to_markup, write_open_tag};
use super::markup;
use super::{ConvertOptions, Engine, Log};
use maud::{DOCTYPE, Markup, PreEscaped, html};
use pulldown_cmark::{Options, Parser, html::push_html};
use std::path::{Path, PathBuf};

/// Baked into generated pages as `<meta name="generator">`.
const GENERATOR: &str = concat!("esmero ", env!("CARGO_PKG_VERSION"));

/// Package partials may themselves use packages, up to this depth.
const MAX_PACKAGE_DEPTH: usize = 8;

#[derive(Debug, Clone, Copy, Default)]
pub struct LexEngine;

impl Engine for LexEngine {
    fn parse(&self, text: &str, path: &Path) -> (Document, Log) {
        markup::parse_document(text, path)
    }

    fn convert(&self, doc: &Document, options: &ConvertOptions<'_>) -> (String, Log) {
        let mut log = Log::default();
        let packages = Packages {
            names: options
                .packages
                .iter()
                .filter(|p| p.as_str() != options.theme)
                .map(String::as_str)
                .collect(),
            module_path: options.module_path,
        };
        let body = packages.expand(doc.body.clone(), &doc.path, 0, &mut log);
        let content = render_markdown(&to_markup(&body));
        let title = page_title(doc);

        let page = match &doc.theme {
            Some(theme) => {
                let mut out = String::with_capacity(content.len() * 2);
                fill_theme(theme, options.theme, doc, &title, &content, &mut out);
                out
            }
            None => {
                log.warning(
                    &doc.path,
                    0,
                    format!("theme '{}' not found, using the default layout", options.theme),
                );
                default_layout(&title, &content).into_string()
            }
        };
        (page, log)
    }
}

struct Packages<'a> {
    names: Vec<&'a str>,
    module_path: &'a [PathBuf],
}

impl Packages<'_> {
    fn expand(&self, nodes: Vec<Node>, path: &Path, depth: usize, log: &mut Log) -> Vec<Node> {
        let mut out = Vec::with_capacity(nodes.len());
        for node in nodes {
            let mut el = match node {
                Node::Element(el) => el,
                text => {
                    out.push(text);
                    continue;
                }
            };
            match self.partial_for(&el) {
                Some((pkg, name)) if depth >= MAX_PACKAGE_DEPTH => {
                    log.warning(
                        path,
                        el.line,
                        format!("<{pkg}:{name}> nested too deeply, left unexpanded"),
                    );
                    out.push(el.into());
                }
                Some((pkg, name)) => match self.load(pkg, name, log) {
                    Some(body) => out.extend(self.expand(body, path, depth + 1, log)),
                    None => {
                        log.warning(
                            path,
                            el.line,
                            format!("<{pkg}:{name}> not found on the module path"),
                        );
                        out.push(el.into());
                    }
                },
                None => {
                    el.children = self.expand(el.children, path, depth, log);
                    out.push(el.into());
                }
            }
        }
        out
    }

    fn partial_for<'e>(&self, el: &'e Element) -> Option<(&'e str, &'e str)> {
        let (pkg, name) = el.name.split_once(':')?;
        self.names.contains(&pkg).then_some((pkg, name))
    }

    fn load(&self, pkg: &str, name: &str, log: &mut Log) -> Option<Vec<Node>> {
        let file = self
            .module_path
            .iter()
            .map(|dir| dir.join(pkg).join(format!("{name}.lex")))
            .find(|candidate| candidate.is_file())?;
        match std::fs::read_to_string(&file) {
            Ok(text) => {
                let (partial, partial_log) = markup::parse_document(&text, &file);
                log.append(partial_log);
                Some(partial.body)
            }
            Err(err) => {
                log.error(&file, 0, format!("cannot read package partial: {err}"));
                None
            }
        }
    }
}

/// Render CommonMark with tables and strikethrough; raw HTML passes through.
pub fn render_markdown(source: &str) -> String {
    let options = Options::ENABLE_TABLES | Options::ENABLE_STRIKETHROUGH;
    let mut out = String::with_capacity(source.len() * 2);
    push_html(&mut out, Parser::new_ext(source, options));
    out
}

/// `title` metadata, else the file stem.
fn page_title(doc: &Document) -> String {
    doc.meta.get("title").cloned().unwrap_or_else(|| {
        doc.path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default()
    })
}

fn escape(text: &str) -> String {
    html! { (text) }.into_string()
}

fn fill_theme(
    nodes: &[Node],
    theme: &str,
    doc: &Document,
    title: &str,
    content: &str,
    out: &mut String,
) {
    for node in nodes {
        let el = match node {
            Node::Text(t) => {
                out.push_str(t);
                continue;
            }
            Node::Element(el) => el,
        };
        match el.name.strip_prefix(theme).and_then(|n| n.strip_prefix(':')) {
            Some("content") => out.push_str(content),
            Some("title") => out.push_str(&escape(title)),
            Some("root") => out.push_str(&escape(
                doc.meta.get("root").map(String::as_str).unwrap_or(""),
            )),
            Some("meta") => {
                let value = el
                    .attr("name")
                    .and_then(|key| doc.meta.get(key))
                    .map(String::as_str)
                    .unwrap_or("");
                out.push_str(&escape(value));
            }
            _ => {
                write_open_tag(el, out);
                if el.children.is_empty() && is_void(&el.name) {
                    continue;
                }
                fill_theme(&el.children, theme, doc, title, content, out);
                out.push_str("</");
                out.push_str(&el.name);
                out.push('>');
            }
        }
    }
}

fn default_layout(title: &str, content: &str) -> Markup {
    html! {
        (DOCTYPE)
        html lang="en" {
            head {
                meta charset="utf-8";
                meta name="viewport" content="width=device-width, initial-scale=1";
                meta name="generator" content=(GENERATOR);
                title { (title) }
            }
            body {
                (PreEscaped(content))
            }
        }
    }
}
