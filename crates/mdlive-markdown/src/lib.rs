//! # mdlive-markdown: document trees for mdlive
//!
//! This crate holds the document model shared by every mdlive crate and the two
//! parser services the evaluator relies on:
//!
//! - **Parse Markdown**: convert CommonMark + GFM text into a [`Node`] tree
//! - **Parse HTML**: read a single HTML fragment into nodes, failing on malformed input
//! - **Serialize HTML**: write nodes back out as HTML text
//!
//! ## Quick Start
//!
//! ```rust
//! use mdlive_markdown::Document;
//!
//! let doc = "# Hello\n\n```eval\n(module)\n```".parse::<Document>().unwrap();
//!
//! assert_eq!(doc.nodes.len(), 2);
//! assert_eq!(doc.to_html(), "<h1>Hello</h1><pre ext=\"eval\">(module)</pre>");
//! ```
//!
//! ### Working with HTML fragments
//!
//! ```rust
//! use mdlive_markdown::{Node, parse_html_fragment, serialize_html};
//!
//! let nodes = parse_html_fragment("<b>ok</b>").unwrap();
//! assert_eq!(nodes, vec![Node::element("b", vec!["ok".into()])]);
//! assert_eq!(serialize_html(&nodes), "<b>ok</b>");
//! ```
mod document;
mod html;
mod node;

pub use document::{Document, parse_markdown};
pub use html::{HtmlError, parse_html_fragment, parse_html_reader, serialize_html};
pub use node::{Attributes, Element, Node, attr_keys};
