//! # mdlive-html: capability-checked tree building
//!
//! Builds node trees from declarative [`Spec`]s. A spec may embed computed
//! sub-trees as [`Escape`]s that call registered operations; before anything
//! is built, every escape is checked against a [`Policy`] on behalf of the
//! declaring module and the whole build is refused if any check fails.
//!
//! ```rust
//! use mdlive_html::{DeclaringContext, Operations, Spec, Whitelist, build_safe};
//!
//! let spec = Spec::element("p", vec![Spec::escape("upcase", vec!["ok".into()])]);
//! let policy = Whitelist::new().allow("html", "upcase");
//!
//! let nodes = build_safe(&spec, &DeclaringContext::new("page"), &Operations::builtin(), &policy).unwrap();
//! assert_eq!(nodes[0].to_string(), "<p>OK</p>");
//!
//! let denied = Spec::escape("link", vec!["/x".into(), "x".into()]);
//! assert!(build_safe(&denied, &DeclaringContext::new("page"), &Operations::builtin(), &policy).is_err());
//! ```
mod builder;
mod ops;
mod policy;
mod spec;

pub use builder::{BuildError, Refusal, build_safe};
pub use ops::{BUILTIN_MODULE, Emitter, OpError, OpFn, Operation, Operations, ParamNum};
pub use policy::{DeclaringContext, OpRef, Policy, Whitelist};
pub use spec::{Escape, Spec, Term, Value};
