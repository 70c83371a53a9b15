use mdlive_markdown::{Element, Node, attr_keys};
use mdlive_sandbox::{Context, EvalOptions, Message, MessageKind, Scope, UnitId};

use crate::classify::classify;

pub const WARNING_CLASS: &str = "eval-warning";
pub const ERROR_CLASS: &str = "eval-error";

/// Result of evaluating one fragment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Success {
        nodes: Vec<Node>,
        messages: Vec<Message>,
    },
    Failure(Node),
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success { .. })
    }

    /// The nodes that replace the fragment: output first, then one node per
    /// diagnostic in emission order.
    pub fn into_nodes(self) -> Vec<Node> {
        match self {
            Outcome::Success {
                mut nodes,
                messages,
            } => {
                nodes.extend(messages.into_iter().map(message_node));
                nodes
            }
            Outcome::Failure(node) => vec![node],
        }
    }
}

fn message_node(message: Message) -> Node {
    let class = match message.kind {
        MessageKind::Warning => WARNING_CLASS,
        MessageKind::Error => ERROR_CLASS,
    };

    Element::new("pre")
        .with_attr(attr_keys::CLASS, class)
        .with_child(message.text)
        .into()
}

/// Runs one fragment in `context` and converts what it did into an [`Outcome`].
///
/// Diagnostics are only kept for a fragment that completes; a failing fragment
/// is reported by its error alone.
pub fn evaluate<C: Context>(
    context: &mut C,
    index: usize,
    code: &str,
    options: &EvalOptions,
) -> Outcome {
    let unit = UnitId::new(context.id(), index);
    let scope = Scope::begin();

    match context.run(unit, code, options) {
        Ok(output) => {
            let messages = scope.finish();
            Outcome::Success {
                nodes: classify(&output),
                messages,
            }
        }
        Err(err) => {
            drop(scope);
            tracing::debug!(%unit, error = %err, "fragment evaluation failed");
            Outcome::Failure(message_node(Message::new(MessageKind::Error, err)))
        }
    }
}
