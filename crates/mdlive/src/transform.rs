use mdlive_markdown::{Document, Element, Node, attr_keys};
use mdlive_sandbox::{Context, EvalOptions, Runtime, WasmRuntime};

use crate::{Error, eval::evaluate};

/// Value of the `ext` attribute that marks an evaluable fragment.
pub const EVAL_EXT: &str = "eval";
pub const RESULT_CLASS: &str = "eval-result";
pub const FRAGMENT_ATTR: &str = "data-fragment";

/// The code of `element` when it is an evaluable fragment.
pub fn fragment_code(element: &Element) -> Option<&str> {
    if element.attr(attr_keys::EXT) == Some(EVAL_EXT) {
        element.sole_text()
    } else {
        None
    }
}

pub fn is_fragment(node: &Node) -> bool {
    node.as_element().and_then(fragment_code).is_some()
}

pub fn contains_fragment(nodes: &[Node]) -> bool {
    nodes.iter().any(|node| node.find(&is_fragment).is_some())
}

/// Evaluates every fragment of `document` with the WebAssembly runtime.
pub fn transform(document: Document, options: &EvalOptions) -> Result<Document, Error> {
    transform_with(&WasmRuntime, document, options)
}

/// Evaluates every fragment of `document` in one context created by `runtime`.
///
/// A document without fragments is returned as is and no context is created.
/// Otherwise all fragments share one context, in document order, so a fragment
/// can use definitions exported by the ones before it. Each fragment is
/// replaced by a `div.eval-result` holding its output or its error; a failing
/// fragment never stops the traversal.
pub fn transform_with<R: Runtime>(
    runtime: &R,
    document: Document,
    options: &EvalOptions,
) -> Result<Document, Error> {
    if !contains_fragment(&document.nodes) {
        tracing::debug!("document has no fragments");
        return Ok(document);
    }

    let mut context = runtime.create_context(options)?;
    let mut transformer = Transformer {
        context: &mut context,
        options,
        index: 0,
    };
    let nodes = transformer.nodes(document.nodes);
    tracing::debug!(fragments = transformer.index, "document transformed");

    Ok(Document::new(nodes))
}

struct Transformer<'a, C> {
    context: &'a mut C,
    options: &'a EvalOptions,
    index: usize,
}

impl<C: Context> Transformer<'_, C> {
    fn nodes(&mut self, nodes: Vec<Node>) -> Vec<Node> {
        nodes.into_iter().map(|node| self.node(node)).collect()
    }

    fn node(&mut self, node: Node) -> Node {
        let element = match node {
            Node::Element(element) => element,
            text => return text,
        };

        if let Some(code) = fragment_code(&element) {
            let index = self.index;
            self.index += 1;
            let outcome = evaluate(self.context, index, code, self.options);

            return Element::new("div")
                .with_attr(attr_keys::CLASS, RESULT_CLASS)
                .with_attr(FRAGMENT_ATTR, index.to_string())
                .with_children(outcome.into_nodes())
                .into();
        }

        let children = self.nodes(element.children);
        Node::Element(Element {
            children,
            ..element
        })
    }
}
