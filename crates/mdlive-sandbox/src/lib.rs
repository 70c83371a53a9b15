//! # mdlive-sandbox: isolated fragment execution
//!
//! Execution contexts that run untrusted WebAssembly fragments under a wall
//! clock deadline and a memory quota, with an explicit set of granted host
//! modules, plus a scoped collector for the diagnostics they raise.
//!
//! ```rust
//! use mdlive_sandbox::{Context, EvalOptions, Runtime, UnitId, WasmRuntime, with_collection};
//!
//! let code = r#"
//! (module
//!   (import "host" "print" (func $print (param i32 i32)))
//!   (import "host" "warn" (func $warn (param i32 i32)))
//!   (memory (export "memory") 1)
//!   (data (i32.const 0) "hi")
//!   (func (export "run")
//!     (call $warn (i32.const 0) (i32.const 2))
//!     (call $print (i32.const 0) (i32.const 2))))
//! "#;
//!
//! let options = EvalOptions::default();
//! let mut ctx = WasmRuntime.create_context(&options).unwrap();
//! let unit = UnitId::new(ctx.id(), 0);
//!
//! let (output, messages) = with_collection(|| ctx.run(unit, code, &options));
//! assert_eq!(output.unwrap(), "hi");
//! assert_eq!(messages[0].text, "Warning: hi");
//! ```
mod diagnostics;
mod error;
mod options;
mod quota;
mod runtime;
mod wasm;

pub use diagnostics::{Message, MessageKind, Scope, with_collection};
pub use error::{ExecError, SandboxError};
pub use options::{
    CapabilitySet, DEFAULT_MEMORY_LIMIT, DEFAULT_TIME_LIMIT, EvalOptions, HOST_MODULE,
};
pub use runtime::{Context, ContextId, Runtime, UnitId};
pub use wasm::{SHARED_MODULE, WasmContext, WasmRuntime};
