use std::{convert::Infallible, fmt, str::FromStr};

use markdown::mdast;

use crate::html::{parse_html_fragment, serialize_html};
use crate::node::{Element, Node, attr_keys};

/// A parsed document: the ordered top-level nodes of a markdown text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "json", derive(serde::Serialize, serde::Deserialize))]
pub struct Document {
    pub nodes: Vec<Node>,
}

impl FromStr for Document {
    type Err = Infallible;

    fn from_str(content: &str) -> Result<Self, Self::Err> {
        Ok(Self::new(parse_markdown(content)))
    }
}

impl fmt::Display for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_html())
    }
}

impl Document {
    pub fn new(nodes: Vec<Node>) -> Self {
        Self { nodes }
    }

    pub fn to_html(&self) -> String {
        serialize_html(&self.nodes)
    }

    pub fn to_text(&self) -> String {
        self.nodes.iter().map(Node::to_text).collect()
    }

    #[cfg(feature = "json")]
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

/// Converts CommonMark + GFM text into document nodes.
///
/// This never fails: when the markdown parser rejects the input, the whole
/// text becomes a single text leaf.
pub fn parse_markdown(content: &str) -> Vec<Node> {
    match markdown::to_mdast(content, &markdown::ParseOptions::gfm()) {
        Ok(root) => from_mdast_node(root),
        Err(_) => vec![Node::Text(content.to_string())],
    }
}

fn from_mdast_node(node: mdast::Node) -> Vec<Node> {
    match node {
        mdast::Node::Root(mdast::Root { children, .. })
        | mdast::Node::FootnoteDefinition(mdast::FootnoteDefinition { children, .. }) => {
            from_mdast_children(children)
        }
        mdast::Node::Paragraph(mdast::Paragraph { children, .. }) => {
            vec![Node::element("p", from_mdast_children(children))]
        }
        mdast::Node::Heading(mdast::Heading {
            children, depth, ..
        }) => vec![Node::element(
            format!("h{}", depth.clamp(1, 6)),
            from_mdast_children(children),
        )],
        mdast::Node::Text(mdast::Text { value, .. }) => vec![Node::Text(value)],
        mdast::Node::Emphasis(mdast::Emphasis { children, .. }) => {
            vec![Node::element("em", from_mdast_children(children))]
        }
        mdast::Node::Strong(mdast::Strong { children, .. }) => {
            vec![Node::element("strong", from_mdast_children(children))]
        }
        mdast::Node::Delete(mdast::Delete { children, .. }) => {
            vec![Node::element("del", from_mdast_children(children))]
        }
        mdast::Node::InlineCode(mdast::InlineCode { value, .. })
        | mdast::Node::InlineMath(mdast::InlineMath { value, .. }) => {
            vec![Node::element("code", vec![Node::Text(value)])]
        }
        mdast::Node::Code(mdast::Code {
            value, lang, meta, ..
        }) => {
            let mut pre = Element::new("pre");
            if let Some(lang) = lang {
                pre = pre.with_attr(attr_keys::EXT, lang);
            }
            if let Some(meta) = meta {
                pre = pre.with_attr(attr_keys::META, meta);
            }
            vec![pre.with_child(Node::Text(value)).into()]
        }
        mdast::Node::Math(mdast::Math { value, .. }) => vec![
            Element::new("pre")
                .with_attr(attr_keys::EXT, "math")
                .with_child(Node::Text(value))
                .into(),
        ],
        mdast::Node::Link(mdast::Link {
            children,
            url,
            title,
            ..
        }) => {
            let mut a = Element::new("a").with_attr(attr_keys::HREF, url);
            if let Some(title) = title {
                a = a.with_attr(attr_keys::TITLE, title);
            }
            vec![a.with_children(from_mdast_children(children)).into()]
        }
        mdast::Node::Image(mdast::Image {
            alt, url, title, ..
        }) => {
            let mut img = Element::new("img")
                .with_attr(attr_keys::SRC, url)
                .with_attr(attr_keys::ALT, alt);
            if let Some(title) = title {
                img = img.with_attr(attr_keys::TITLE, title);
            }
            vec![img.into()]
        }
        mdast::Node::List(mdast::List {
            children,
            ordered,
            start,
            ..
        }) => {
            let mut list = Element::new(if ordered { "ol" } else { "ul" });
            if let Some(start) = start.filter(|s| ordered && *s != 1) {
                list = list.with_attr(attr_keys::START, start.to_string());
            }
            vec![list.with_children(from_mdast_children(children)).into()]
        }
        mdast::Node::ListItem(mdast::ListItem {
            children, checked, ..
        }) => {
            let mut li = Element::new("li");
            if let Some(checked) = checked {
                li = li.with_attr(attr_keys::CHECKED, checked.to_string());
            }
            vec![li.with_children(unwrap_tight_paragraphs(children)).into()]
        }
        mdast::Node::Blockquote(mdast::Blockquote { children, .. }) => {
            vec![Node::element("blockquote", from_mdast_children(children))]
        }
        mdast::Node::Table(mdast::Table {
            children, align, ..
        }) => {
            let rows = children
                .into_iter()
                .enumerate()
                .map(|(row, node)| match node {
                    mdast::Node::TableRow(mdast::TableRow { children, .. }) => {
                        table_row(children, &align, row == 0)
                    }
                    other => Node::element("tr", from_mdast_node(other)),
                })
                .collect();
            vec![Node::element("table", rows)]
        }
        mdast::Node::ThematicBreak(_) => vec![Node::element("hr", Vec::new())],
        mdast::Node::Break(_) => vec![Node::element("br", Vec::new())],
        mdast::Node::Html(mdast::Html { value, .. }) => {
            parse_html_fragment(&value).unwrap_or_else(|_| vec![Node::Text(value)])
        }
        mdast::Node::Yaml(mdast::Yaml { value, .. }) => vec![
            Element::new("pre")
                .with_attr(attr_keys::EXT, "yaml")
                .with_child(Node::Text(value))
                .into(),
        ],
        mdast::Node::Toml(mdast::Toml { value, .. }) => vec![
            Element::new("pre")
                .with_attr(attr_keys::EXT, "toml")
                .with_child(Node::Text(value))
                .into(),
        ],
        mdast::Node::FootnoteReference(mdast::FootnoteReference { label, identifier, .. })
        | mdast::Node::LinkReference(mdast::LinkReference {
            label, identifier, ..
        })
        | mdast::Node::ImageReference(mdast::ImageReference {
            label, identifier, ..
        }) => vec![Node::Text(label.unwrap_or(identifier))],
        mdast::Node::Definition(_) => Vec::new(),
        other => other
            .children()
            .cloned()
            .map(from_mdast_children)
            .unwrap_or_default(),
    }
}

fn from_mdast_children(children: Vec<mdast::Node>) -> Vec<Node> {
    children.into_iter().flat_map(from_mdast_node).collect()
}

/// Tight list items hold their inline content directly rather than in a paragraph.
fn unwrap_tight_paragraphs(children: Vec<mdast::Node>) -> Vec<Node> {
    match children.as_slice() {
        [mdast::Node::Paragraph(_)] => children
            .into_iter()
            .flat_map(|child| match child {
                mdast::Node::Paragraph(mdast::Paragraph { children, .. }) => {
                    from_mdast_children(children)
                }
                other => from_mdast_node(other),
            })
            .collect(),
        _ => from_mdast_children(children),
    }
}

fn table_row(cells: Vec<mdast::Node>, align: &[mdast::AlignKind], header: bool) -> Node {
    let cells = cells
        .into_iter()
        .enumerate()
        .map(|(column, cell)| {
            let mut td = Element::new(if header { "th" } else { "td" });
            match align.get(column) {
                Some(mdast::AlignKind::Left) => td = td.with_attr(attr_keys::ALIGN, "left"),
                Some(mdast::AlignKind::Center) => td = td.with_attr(attr_keys::ALIGN, "center"),
                Some(mdast::AlignKind::Right) => td = td.with_attr(attr_keys::ALIGN, "right"),
                Some(mdast::AlignKind::None) | None => {}
            }
            let children = match cell {
                mdast::Node::TableCell(mdast::TableCell { children, .. }) => {
                    from_mdast_children(children)
                }
                other => from_mdast_node(other),
            };
            td.with_children(children).into()
        })
        .collect();

    Node::element("tr", cells)
}
