use std::{fmt, sync::Arc};

use itertools::Itertools;
use mdlive_markdown::{Element, Node, attr_keys};
use rustc_hash::FxHashMap;
use smol_str::SmolStr;
use thiserror::Error;

use crate::spec::Value;

/// Module that owns the operations of [`Operations::builtin`].
pub const BUILTIN_MODULE: &str = "html";

type OpName = String;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum OpError {
    #[error("Invalid types for \"{0}\", got {1:?}")]
    InvalidTypes(OpName, Vec<Value>),
    #[error("{0}")]
    Runtime(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamNum {
    None,
    Fixed(u8),
    Range(u8, u8),
}

impl ParamNum {
    pub fn is_valid(&self, num_args: usize) -> bool {
        let Ok(num_args) = u8::try_from(num_args) else {
            return false;
        };

        match self {
            ParamNum::None => num_args == 0,
            ParamNum::Fixed(n) => num_args == *n,
            ParamNum::Range(min, max) => num_args >= *min && num_args <= *max,
        }
    }
}

impl fmt::Display for ParamNum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamNum::None => write!(f, "0"),
            ParamNum::Fixed(n) => write!(f, "{}", n),
            ParamNum::Range(min, max) => write!(f, "{}..={}", min, max),
        }
    }
}

/// Collects the nodes an operation contributes to the tree under construction.
#[derive(Debug, Default)]
pub struct Emitter {
    nodes: Vec<Node>,
}

impl Emitter {
    pub fn text(&mut self, value: impl Into<String>) {
        self.nodes.push(Node::text(value));
    }

    pub fn node(&mut self, node: impl Into<Node>) {
        self.nodes.push(node.into());
    }

    pub fn into_nodes(self) -> Vec<Node> {
        self.nodes
    }
}

pub type OpFn = Arc<dyn Fn(&[Value], &mut Emitter) -> Result<(), OpError> + Send + Sync>;

#[derive(Clone)]
pub struct Operation {
    pub module: SmolStr,
    pub num_params: ParamNum,
    pub func: OpFn,
}

impl fmt::Debug for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Operation")
            .field("module", &self.module)
            .field("num_params", &self.num_params)
            .finish_non_exhaustive()
    }
}

/// Registry of the operations an escape may name.
#[derive(Debug, Clone, Default)]
pub struct Operations {
    ops: FxHashMap<SmolStr, Operation>,
}

impl Operations {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding the pure text helpers of the `html` module.
    pub fn builtin() -> Self {
        let mut ops = Self::new();

        ops.register(
            BUILTIN_MODULE,
            "text",
            ParamNum::Fixed(1),
            |args, out| match args {
                [value] => {
                    out.text(value.to_string());
                    Ok(())
                }
                _ => Err(OpError::InvalidTypes("text".to_string(), args.to_vec())),
            },
        );
        ops.register(
            BUILTIN_MODULE,
            "upcase",
            ParamNum::Fixed(1),
            |args, out| match args {
                [Value::Text(s)] => {
                    out.text(s.to_uppercase());
                    Ok(())
                }
                _ => Err(OpError::InvalidTypes("upcase".to_string(), args.to_vec())),
            },
        );
        ops.register(
            BUILTIN_MODULE,
            "join",
            ParamNum::Range(1, u8::MAX),
            |args, out| match args {
                [Value::Text(sep), rest @ ..] => {
                    out.text(rest.iter().join(sep));
                    Ok(())
                }
                _ => Err(OpError::InvalidTypes("join".to_string(), args.to_vec())),
            },
        );
        ops.register(
            BUILTIN_MODULE,
            "link",
            ParamNum::Fixed(2),
            |args, out| match args {
                [Value::Text(href), label] => {
                    out.node(
                        Element::new("a")
                            .with_attr(attr_keys::HREF, href.as_str())
                            .with_child(label.to_string()),
                    );
                    Ok(())
                }
                _ => Err(OpError::InvalidTypes("link".to_string(), args.to_vec())),
            },
        );

        ops
    }

    pub fn register(
        &mut self,
        module: impl Into<SmolStr>,
        name: impl Into<SmolStr>,
        num_params: ParamNum,
        func: impl Fn(&[Value], &mut Emitter) -> Result<(), OpError> + Send + Sync + 'static,
    ) -> &mut Self {
        self.ops.insert(
            name.into(),
            Operation {
                module: module.into(),
                num_params,
                func: Arc::new(func),
            },
        );
        self
    }

    pub fn get(&self, name: &str) -> Option<&Operation> {
        self.ops.get(name)
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}
