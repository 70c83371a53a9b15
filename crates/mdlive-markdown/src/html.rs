//! HTML fragment parsing and serialization for document nodes.

use std::io::Read;

use itertools::Itertools;
use miette::Diagnostic;
use scraper::{ElementRef, Html};
use thiserror::Error;

use crate::node::{Attributes, Element, Node};

const VOID_ELEMENTS: [&str; 13] = [
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "track",
    "wbr",
];

#[derive(Debug, Error, Diagnostic)]
pub enum HtmlError {
    #[error("HTML parsing error: {}", errors.join("; "))]
    #[diagnostic(
        code(mdlive_markdown::html::parsing),
        help("The input is not well-formed HTML.")
    )]
    Parse { errors: Vec<String> },

    #[error("Failed to read HTML input: {0}")]
    #[diagnostic(code(mdlive_markdown::html::io))]
    Io(#[from] std::io::Error),
}

/// Parses `html` as a fragment in body context.
///
/// Any error reported by the HTML5 tree builder makes the whole parse fail.
/// Comments, doctypes and processing instructions are not part of the result.
pub fn parse_html_fragment(html: &str) -> Result<Vec<Node>, HtmlError> {
    let fragment = Html::parse_fragment(html);

    if !fragment.errors.is_empty() {
        return Err(HtmlError::Parse {
            errors: fragment.errors.iter().map(|e| e.to_string()).collect(),
        });
    }

    Ok(map_children(fragment.root_element()))
}

/// Reads `reader` to the end and parses the content with [`parse_html_fragment`].
pub fn parse_html_reader<R: Read>(mut reader: R) -> Result<Vec<Node>, HtmlError> {
    let mut html = String::new();
    reader.read_to_string(&mut html)?;
    parse_html_fragment(&html)
}

fn map_children(parent: ElementRef<'_>) -> Vec<Node> {
    parent
        .children()
        .filter_map(|child| match child.value() {
            scraper::Node::Text(text) => Some(Node::Text(text.to_string())),
            scraper::Node::Element(_) => ElementRef::wrap(child).map(map_element),
            scraper::Node::Document
            | scraper::Node::Fragment
            | scraper::Node::Doctype(_)
            | scraper::Node::Comment(_)
            | scraper::Node::ProcessingInstruction(_) => None,
        })
        .collect()
}

fn map_element(element: ElementRef<'_>) -> Node {
    Node::Element(Element {
        tag: element.value().name().to_lowercase().into(),
        attrs: element.value().attrs().collect::<Attributes>(),
        children: map_children(element),
    })
}

pub fn serialize_html(nodes: &[Node]) -> String {
    let mut out = String::new();
    for node in nodes {
        write_node(&mut out, node);
    }
    out
}

fn write_node(out: &mut String, node: &Node) {
    match node {
        Node::Text(text) => out.push_str(&escape_text(text)),
        Node::Element(element) => {
            out.push('<');
            out.push_str(&element.tag);
            if !element.attrs.is_empty() {
                out.push(' ');
                out.push_str(
                    &element
                        .attrs
                        .iter()
                        .map(|(k, v)| format!("{}=\"{}\"", k, escape_attr(v)))
                        .join(" "),
                );
            }
            out.push('>');

            // Void elements have no content model; children are dropped.
            if VOID_ELEMENTS.contains(&element.tag.as_str()) {
                return;
            }

            for child in &element.children {
                write_node(out, child);
            }
            out.push_str("</");
            out.push_str(&element.tag);
            out.push('>');
        }
    }
}

fn escape_text(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

fn escape_attr(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('"', "&quot;")
        .replace('<', "&lt;")
}
