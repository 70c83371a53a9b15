//! # mdlive: live fragments in markdown documents
//!
//! `mdlive` walks a document tree, runs every fragment marked as evaluable in
//! an isolated WebAssembly context and puts what the fragment printed back
//! where the fragment was. Fragments are fenced code blocks with the `eval`
//! info string:
//!
//! ````markdown
//! ```eval
//! (module
//!   (import "host" "print" (func $print (param i32 i32)))
//!   (memory (export "memory") 1)
//!   (data (i32.const 0) "<b>ok</b>")
//!   (func (export "run") (call $print (i32.const 0) (i32.const 9))))
//! ```
//! ````
//!
//! Output that is one well-formed HTML element is kept as HTML, anything else
//! is read as markdown. A fragment that fails, runs out of time or exceeds its
//! memory quota is replaced by an error block; the rest of the document is
//! still rendered.
//!
//! ## Quick Start
//!
//! ````rust
//! use mdlive::{Document, EvalOptions, transform};
//!
//! let markdown = r#"
//! ```eval
//! (module
//!   (import "host" "print" (func $print (param i32 i32)))
//!   (memory (export "memory") 1)
//!   (data (i32.const 0) "<b>ok</b>")
//!   (func (export "run") (call $print (i32.const 0) (i32.const 9))))
//! ```
//! "#;
//!
//! let document = markdown.parse::<Document>().unwrap();
//! let transformed = transform(document, &EvalOptions::default()).unwrap();
//!
//! assert_eq!(
//!     transformed.to_html(),
//!     r#"<div class="eval-result" data-fragment="0"><b>ok</b></div>"#
//! );
//! ````
//!
//! ## Building trees safely
//!
//! Trees generated by code rather than parsed can be built with
//! [`build_safe`], which refuses any spec that calls an operation the policy
//! does not allow.
mod classify;
mod error;
mod eval;
mod transform;

pub use classify::{classify, is_single_element};
pub use error::Error;
pub use eval::{ERROR_CLASS, Outcome, WARNING_CLASS, evaluate};
pub use transform::{
    EVAL_EXT, FRAGMENT_ATTR, RESULT_CLASS, contains_fragment, fragment_code, is_fragment,
    transform, transform_with,
};

pub use mdlive_html::{
    BuildError, DeclaringContext, Escape, Operations, Policy, Spec, Term, Whitelist, build_safe,
};
pub use mdlive_markdown::{Document, Element, Node};
pub use mdlive_sandbox::{
    CapabilitySet, Context, DEFAULT_MEMORY_LIMIT, DEFAULT_TIME_LIMIT, EvalOptions, ExecError,
    Message, MessageKind, Runtime, SandboxError, WasmRuntime,
};
