use std::fmt;

use mdlive_markdown::{Attributes, Element, Node};
use smol_str::SmolStr;
use thiserror::Error;

use crate::{
    ops::{Emitter, OpError, Operation, Operations, ParamNum},
    policy::{DeclaringContext, OpRef, Policy},
    spec::{Escape, Spec, Term, Value},
};

/// Why an escape was refused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Refusal {
    UnknownOperation,
    Arity { expected: ParamNum, got: usize },
    NotAllowed { module: SmolStr },
}

impl fmt::Display for Refusal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Refusal::UnknownOperation => write!(f, "operation is not registered"),
            Refusal::Arity { expected, got } => {
                write!(f, "expected {} arguments, got {}", expected, got)
            }
            Refusal::NotAllowed { module } => {
                write!(f, "not allowed from module \"{}\"", module)
            }
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BuildError {
    #[error("Spec is not fully instantiated: \"{0}\" is unbound")]
    NotGround(SmolStr),
    #[error("Unsafe escape \"{op}\": {reason}")]
    UnsafeSpec { op: SmolStr, reason: Refusal },
    #[error("Operation \"{op}\" failed: {source}")]
    Operation {
        op: SmolStr,
        #[source]
        source: OpError,
    },
}

/// Builds `spec` after proving every escape in it safe.
///
/// The whole spec is verified before anything is built: a spec with an unbound
/// variable fails with [`BuildError::NotGround`], and an escape naming an
/// unregistered operation, calling it with the wrong number of arguments or
/// calling an operation `policy` does not allow for `context` fails with
/// [`BuildError::UnsafeSpec`]. No operation runs unless all escapes pass.
pub fn build_safe(
    spec: &Spec,
    context: &DeclaringContext,
    operations: &Operations,
    policy: &impl Policy,
) -> Result<Vec<Node>, BuildError> {
    if let Some(name) = spec.unbound() {
        return Err(BuildError::NotGround(name.clone()));
    }

    let escapes = spec.escapes();
    for escape in &escapes {
        check(escape, context, operations, policy)?;
    }
    tracing::debug!(
        module = context.module(),
        escapes = escapes.len(),
        "spec approved"
    );

    let mut nodes = Vec::new();
    build(spec, operations, &mut nodes)?;
    Ok(nodes)
}

fn check(
    escape: &Escape,
    context: &DeclaringContext,
    operations: &Operations,
    policy: &impl Policy,
) -> Result<(), BuildError> {
    let refuse = |reason: Refusal| {
        tracing::debug!(op = %escape.op, module = context.module(), %reason, "escape refused");
        Err(BuildError::UnsafeSpec {
            op: escape.op.clone(),
            reason,
        })
    };

    let Some(operation) = operations.get(&escape.op) else {
        return refuse(Refusal::UnknownOperation);
    };

    if !operation.num_params.is_valid(escape.args.len()) {
        return refuse(Refusal::Arity {
            expected: operation.num_params,
            got: escape.args.len(),
        });
    }

    let op = OpRef {
        module: &operation.module,
        name: &escape.op,
        arity: escape.args.len(),
    };
    if !policy.is_allowed(&op, context) {
        return refuse(Refusal::NotAllowed {
            module: SmolStr::new(context.module()),
        });
    }

    Ok(())
}

fn build(spec: &Spec, operations: &Operations, out: &mut Vec<Node>) -> Result<(), BuildError> {
    match spec {
        Spec::Text(text) => out.push(Node::text(text.as_str())),
        Spec::Var(name) => return Err(BuildError::NotGround(name.clone())),
        Spec::Element {
            tag,
            attrs,
            children,
        } => {
            let attrs = attrs
                .iter()
                .map(|(key, term)| Ok((key.clone(), ground(term)?.to_string())))
                .collect::<Result<Attributes, BuildError>>()?;
            let mut built = Vec::with_capacity(children.len());
            for child in children {
                build(child, operations, &mut built)?;
            }

            out.push(Node::Element(Element {
                tag: tag.clone(),
                attrs,
                children: built,
            }));
        }
        Spec::Escape(escape) => {
            let operation = operations.get(&escape.op).ok_or_else(|| BuildError::UnsafeSpec {
                op: escape.op.clone(),
                reason: Refusal::UnknownOperation,
            })?;
            out.extend(invoke(escape, operation)?);
        }
    }

    Ok(())
}

fn invoke(escape: &Escape, operation: &Operation) -> Result<Vec<Node>, BuildError> {
    let args = escape.args.iter().map(ground).collect::<Result<Vec<_>, _>>()?;
    let mut emitter = Emitter::default();

    (operation.func)(&args, &mut emitter).map_err(|source| BuildError::Operation {
        op: escape.op.clone(),
        source,
    })?;

    Ok(emitter.into_nodes())
}

fn ground(term: &Term) -> Result<Value, BuildError> {
    term.value()
        .map_err(|name| BuildError::NotGround(name.clone()))
}
